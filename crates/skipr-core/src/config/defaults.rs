//! Default configuration values

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "skipr.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "skipr.yaml";

/// Names of the naming heuristics that can be enabled
pub const HEURISTIC_NAMES: &[&str] = &[
    "direct-name",
    "directory-namespace",
    "extension-base",
    "interface-implementation",
    "catch-all",
];

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".skipr.toml",
        ".skipr.yaml",
    ]
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# skipr configuration

[engine]
concurrency = 0
keep_going = false
batching = "auto"
cache_dir = ".skipr/cache"
tool = "dotnet"
progress_capacity = 256

[selection]
heuristics = []
coverage = true

[ignore]
patterns = []
ignore_file = ".skiprignore"
"#;
