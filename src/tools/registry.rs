// Session registry
//
// Holds one tool session per namespace and the flat, namespaced tool catalog
// handed to the completion endpoint. Immutable once built.

use anyhow::Context;
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::mcp::{McpConnection, McpServerConfig};
use super::session::ToolSession;
use super::types::ToolDefinition;
use crate::errors::AgentError;

/// Joins a namespace and a session-local tool name
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Build the namespaced name of a session tool
pub fn namespaced_name(namespace: &str, local_name: &str) -> String {
    format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, local_name)
}

/// A started session and the tools it contributes
pub struct SessionHandle {
    namespace: String,
    session: Arc<dyn ToolSession>,
    tools: Vec<ToolDefinition>,
}

impl SessionHandle {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn session(&self) -> &Arc<dyn ToolSession> {
        &self.session
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("namespace", &self.namespace)
            .field("tools", &self.tools.len())
            .finish()
    }
}

/// List a session's tools under its namespace
pub async fn catalog(namespace: &str, session: &dyn ToolSession) -> anyhow::Result<Vec<ToolDefinition>> {
    let tools = session
        .list_tools()
        .await
        .context("tools/list failed")?;

    Ok(tools
        .into_iter()
        .map(|tool| ToolDefinition {
            name: namespaced_name(namespace, &tool.name),
            description: tool
                .description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| format!("Tool from MCP server '{}'", namespace)),
            input_schema: tool.input_schema,
        })
        .collect())
}

/// Wrap an already-started session, listing its tools
pub async fn attach(namespace: &str, session: Arc<dyn ToolSession>) -> Result<SessionHandle, AgentError> {
    let tools = catalog(namespace, session.as_ref())
        .await
        .map_err(|source| AgentError::SessionInit {
            namespace: namespace.to_string(),
            source,
        })?;

    tracing::info!("Tool session '{}' ready with {} tool(s)", namespace, tools.len());

    Ok(SessionHandle {
        namespace: namespace.to_string(),
        session,
        tools,
    })
}

/// Launch an MCP server, handshake and list its tools within the startup timeout
pub async fn register(namespace: &str, config: &McpServerConfig) -> Result<SessionHandle, AgentError> {
    let init_error = |source: anyhow::Error| AgentError::SessionInit {
        namespace: namespace.to_string(),
        source,
    };

    let timeout = config.startup_timeout();
    let start = async {
        let connection = McpConnection::connect(namespace, config)
            .await
            .map_err(init_error)?;
        attach(namespace, Arc::new(connection)).await
    };

    match tokio::time::timeout(timeout, start).await {
        Ok(handle) => handle,
        Err(_) => Err(init_error(anyhow::anyhow!(
            "startup did not complete within {}s",
            timeout.as_secs()
        ))),
    }
}

/// Namespaced view over every started session
#[derive(Debug, Default)]
pub struct SessionRegistry {
    handles: Vec<SessionHandle>,
    tools: Vec<ToolDefinition>,
}

impl SessionRegistry {
    /// Start every enabled server concurrently, in namespace order
    ///
    /// The first failure drops the other in-flight starts, which kills their
    /// child processes, and no registry is produced.
    pub async fn from_config(servers: &BTreeMap<String, McpServerConfig>) -> Result<Self, AgentError> {
        let starts = servers
            .iter()
            .filter(|(namespace, config)| {
                if !config.enabled {
                    tracing::debug!("Skipping disabled MCP server '{}'", namespace);
                }
                config.enabled
            })
            .map(|(namespace, config)| register(namespace, config));

        let handles = try_join_all(starts).await?;
        Self::from_handles(handles)
    }

    /// Build a registry from sessions that are already running
    pub async fn from_sessions(sessions: Vec<(String, Arc<dyn ToolSession>)>) -> Result<Self, AgentError> {
        let mut handles = Vec::with_capacity(sessions.len());
        for (namespace, session) in sessions {
            handles.push(attach(&namespace, session).await?);
        }
        Self::from_handles(handles)
    }

    /// Aggregate handles into the flat catalog, rejecting name collisions
    pub fn from_handles(handles: Vec<SessionHandle>) -> Result<Self, AgentError> {
        let mut seen = HashSet::new();
        let mut tools = Vec::new();

        for handle in &handles {
            for tool in &handle.tools {
                if !seen.insert(tool.name.clone()) {
                    return Err(AgentError::SessionInit {
                        namespace: handle.namespace.clone(),
                        source: anyhow::anyhow!("duplicate tool name '{}'", tool.name),
                    });
                }
                tools.push(tool.clone());
            }
        }

        Ok(Self { handles, tools })
    }

    /// Flat tool catalog in namespace order
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(|h| h.namespace.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Find the session owning a namespaced tool name
    ///
    /// The longest registered namespace whose `namespace__` prefixes the name
    /// wins; the rest of the name is the local name verbatim, separators
    /// included.
    pub fn resolve<'a>(&self, name: &'a str) -> Result<(&SessionHandle, &'a str), AgentError> {
        self.handles
            .iter()
            .filter_map(|handle| {
                name.strip_prefix(handle.namespace.as_str())
                    .and_then(|rest| rest.strip_prefix(NAMESPACE_SEPARATOR))
                    .map(|local| (handle, local))
            })
            .max_by_key(|(handle, _)| handle.namespace.len())
            .ok_or_else(|| AgentError::Routing(name.to_string()))
    }

    /// Terminate every session
    pub async fn shutdown(&self) {
        for handle in &self.handles {
            if let Err(e) = handle.session.shutdown().await {
                tracing::warn!("Failed to shut down tool session '{}': {:#}", handle.namespace, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::session::SessionTool;
    use crate::tools::types::CallToolResult;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    struct StaticSession(Vec<&'static str>);

    #[async_trait]
    impl ToolSession for StaticSession {
        async fn list_tools(&self) -> anyhow::Result<Vec<SessionTool>> {
            Ok(self
                .0
                .iter()
                .map(|name| SessionTool {
                    name: name.to_string(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                })
                .collect())
        }

        async fn call_tool(&self, name: &str, _input: Map<String, Value>) -> anyhow::Result<CallToolResult> {
            Ok(CallToolResult::success(name))
        }
    }

    fn session(tools: Vec<&'static str>) -> Arc<dyn ToolSession> {
        Arc::new(StaticSession(tools))
    }

    #[tokio::test]
    async fn test_catalog_prefixes_names() {
        let tools = catalog("everything1", &StaticSession(vec!["echo", "add"])).await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["everything1__echo", "everything1__add"]);
        assert_eq!(tools[0].description, "Tool from MCP server 'everything1'");
    }

    #[tokio::test]
    async fn test_resolve_keeps_separators_in_local_name() {
        let registry = SessionRegistry::from_sessions(vec![("fs".to_string(), session(vec!["read__raw"]))])
            .await
            .unwrap();

        let (handle, local) = registry.resolve("fs__read__raw").unwrap();
        assert_eq!(handle.namespace(), "fs");
        assert_eq!(local, "read__raw");
    }

    #[tokio::test]
    async fn test_resolve_prefers_longest_namespace() {
        let registry = SessionRegistry::from_sessions(vec![
            ("a".to_string(), session(vec!["b__c"])),
            ("a__b".to_string(), session(vec!["d"])),
        ])
        .await
        .unwrap();

        let (handle, local) = registry.resolve("a__b__d").unwrap();
        assert_eq!(handle.namespace(), "a__b");
        assert_eq!(local, "d");

        let (handle, local) = registry.resolve("a__b__c").unwrap();
        assert_eq!(handle.namespace(), "a__b");
        assert_eq!(local, "c");
    }

    #[tokio::test]
    async fn test_resolve_unknown_namespace() {
        let registry = SessionRegistry::from_sessions(vec![("fs".to_string(), session(vec!["read"]))])
            .await
            .unwrap();

        assert!(matches!(registry.resolve("web__fetch"), Err(AgentError::Routing(_))));
        assert!(matches!(registry.resolve("fsread"), Err(AgentError::Routing(_))));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let result = SessionRegistry::from_sessions(vec![
            ("a".to_string(), session(vec!["b__c"])),
            ("a__b".to_string(), session(vec!["c"])),
        ])
        .await;

        assert!(matches!(result, Err(AgentError::SessionInit { .. })));
    }

    #[tokio::test]
    async fn test_catalog_in_namespace_order() {
        let registry = SessionRegistry::from_sessions(vec![
            ("alpha".to_string(), session(vec!["one"])),
            ("beta".to_string(), session(vec!["two", "three"])),
        ])
        .await
        .unwrap();

        let names: Vec<_> = registry.tools().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["alpha__one", "beta__two", "beta__three"]);
        assert_eq!(registry.namespaces().collect::<Vec<_>>(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_empty_config_yields_empty_registry() {
        let registry = SessionRegistry::from_config(&BTreeMap::new()).await.unwrap();
        assert!(registry.is_empty());
        assert!(registry.tools().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_servers_skipped() {
        let mut config = McpServerConfig::new("nonexistent_command_12345", vec![]);
        config.enabled = false;
        let servers = BTreeMap::from([("off".to_string(), config)]);

        let registry = SessionRegistry::from_config(&servers).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_is_session_init_error() {
        let servers = BTreeMap::from([(
            "broken".to_string(),
            McpServerConfig::new("nonexistent_command_12345", vec![]),
        )]);

        match SessionRegistry::from_config(&servers).await {
            Err(AgentError::SessionInit { namespace, .. }) => assert_eq!(namespace, "broken"),
            other => panic!("expected SessionInit, got {:?}", other.map(|_| ())),
        }
    }
}
