// MCP server launch configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Variables a child process inherits from ours when present
#[cfg(unix)]
pub const INHERITED_ENV_VARS: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

#[cfg(windows)]
pub const INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;

/// MCP server configuration (STDIO transport)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Command to execute
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides, applied on top of the inherited set
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Whether server is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds allowed for spawn + handshake + tool discovery
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_startup_timeout() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

impl McpServerConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: BTreeMap::new(),
            enabled: true,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
        }
    }

    /// Validate the configuration
    pub fn validate(&self, name: &str) -> anyhow::Result<()> {
        if self.command.trim().is_empty() {
            anyhow::bail!("MCP server '{}': 'command' must not be empty", name);
        }
        if self.startup_timeout_secs == 0 {
            anyhow::bail!("MCP server '{}': 'startup_timeout_secs' must be positive", name);
        }
        Ok(())
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Environment the child process runs with
    ///
    /// Only the inherited set crosses over from our environment, so PATH is
    /// always present unless `env` overrides it.
    pub fn effective_env(&self) -> BTreeMap<String, String> {
        self.effective_env_from(|key| std::env::var(key).ok())
    }

    fn effective_env_from(&self, lookup: impl Fn(&str) -> Option<String>) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = INHERITED_ENV_VARS
            .iter()
            .filter_map(|key| {
                lookup(key)
                    // Skip exported shell functions
                    .filter(|value| !value.starts_with("()"))
                    .map(|value| (key.to_string(), value))
            })
            .collect();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}
