pub mod generate;
pub mod parse;
pub mod types;
pub mod version;

use regex::Regex;
use std::path::{Path, PathBuf};

pub use parse::{load_config, load_config_from_str, validate, ConfigError};
pub use types::{
    ChannelKind, DestinationDescriptor, FlushMode, PipelineConfig, RawWorkflowConfig,
    RetryConfig, RetryPolicyConfig, SinkChannel, SourceChannel, SourceDescriptor,
    WorkflowConfig,
};

const ENV_VAR_PATTERN: &str = r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Expands environment variables in a string.
/// Supports $env{VAR_NAME} syntax.
/// If an environment variable is not set, it's left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    let re = Regex::new(ENV_VAR_PATTERN).unwrap();

    re.replace_all(text, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}

/// Returns the names of `$env{...}` references still present in `text`,
/// sorted and deduplicated.
pub fn unexpanded_env_vars(text: &str) -> Vec<String> {
    let re = Regex::new(ENV_VAR_PATTERN).unwrap();
    let mut names: Vec<String> = re
        .captures_iter(text)
        .map(|cap| cap[1].to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Expands tilde (~) in paths to the user's home directory.
/// Returns the path unchanged if it doesn't start with tilde or home directory cannot be determined.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Resolves the config file path based on explicit argument or default locations.
/// Returns the first existing path from:
/// 1. Explicit path (if provided, with tilde expansion)
/// 2. ~/.config/cyberflow/workflow.yml
/// 3. /etc/cyberflow/workflow.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/cyberflow/workflow.yml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Per-user config location, used by `config init` when writing a new file.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/cyberflow/workflow.yml"))
}
