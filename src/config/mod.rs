// Configuration module
// Public interface for configuration loading

mod loader;
mod settings;

pub use loader::{default_config_path, load_config, parse_config, read_config_file, resolve_api_key, API_KEY_ENV};
pub use settings::{Config, ConfigOverrides, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
