// Configuration loader
// Reads the JSON (or TOML) config file and resolves the API key

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Config;
use crate::errors::{api_key_missing_error, config_parse_error};

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// `<config dir>/aterm/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("aterm").join("config.json"))
}

/// Load configuration from an explicit path or the default location
///
/// An explicit path must exist. A missing default file yields the defaults
/// with no tool sessions. The API key is resolved last, so the returned
/// config always carries one.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => read_config_file(&path)?,
            other => {
                tracing::info!(
                    "No config file at {}; running without tool sessions",
                    other
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "<unknown config dir>".to_string())
                );
                Config::default()
            }
        },
    };

    config.api_key = resolve_api_key(std::env::var(API_KEY_ENV).ok(), &config.api_key)?;
    Ok(config)
}

/// Read and parse one config file; `.toml` files are TOML, everything else JSON
pub fn read_config_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config = parse_config(&contents, is_toml(path))
        .map_err(|e| anyhow::anyhow!(config_parse_error(&path.display().to_string(), &format!("{:#}", e))))?;

    tracing::debug!(
        "Loaded config from {} ({} MCP server(s))",
        path.display(),
        config.mcp_servers.len()
    );
    Ok(config)
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"))
}

pub fn parse_config(contents: &str, toml_format: bool) -> Result<Config> {
    if toml_format {
        toml::from_str(contents).context("Failed to parse TOML config")
    } else {
        serde_json::from_str(contents).context("Failed to parse JSON config")
    }
}

/// The environment wins over the file; blank values count as missing
pub fn resolve_api_key(env_key: Option<String>, file_key: &str) -> Result<String> {
    if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
        return Ok(key);
    }
    if !file_key.trim().is_empty() {
        return Ok(file_key.to_string());
    }
    bail!(api_key_missing_error());
}
