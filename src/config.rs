use crate::errors::ConfigError;
use crate::logging::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name searched for by [`Config::discover`]
pub const CONFIG_FILE: &str = "typbind.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub instances: InstanceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default = "default_false")]
    pub span_events: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

/// What `register` does with a second descriptor for the same native type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// First registration wins; the duplicate is logged and ignored
    #[default]
    KeepFirst,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// How many parent links to follow when deciding whether a
    /// `reference_internal` wrapper may be cached
    #[serde(default = "default_parent_chain_depth")]
    pub parent_chain_depth: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            span_events: false,
        }
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            parent_chain_depth: default_parent_chain_depth(),
        }
    }
}

fn default_level() -> String { "info".to_string() }
fn default_false() -> bool { false }
fn default_parent_chain_depth() -> usize { 16 }

impl LoggingConfig {
    pub fn to_log_config(&self) -> LogConfig {
        let level = self.level.parse().unwrap_or(tracing::Level::INFO);
        LogConfig::new()
            .with_level(level)
            .with_format(self.format)
            .with_span_events(self.span_events)
    }
}

impl Config {
    /// Load configuration from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::parse(&content),
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Find and load `typbind.toml` from the current directory or its parents
    pub fn discover() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Self::default(),
        }
    }

    /// Find and load `typbind.toml` from `start` or its parents
    ///
    /// Files that fail to parse are skipped so a broken file deeper in the
    /// tree does not hide a valid one above it.
    pub fn discover_from(start: &Path) -> Self {
        for dir in start.ancestors() {
            let config_path = dir.join(CONFIG_FILE);
            if !config_path.exists() {
                continue;
            }
            match Self::load(&config_path) {
                Ok(config) => {
                    tracing::debug!(path = %config_path.display(), "Loaded configuration");
                    return config;
                }
                Err(err) => {
                    tracing::warn!(path = %config_path.display(), error = %err, "Skipping unreadable configuration");
                }
            }
        }

        Self::default()
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.registry.on_duplicate, DuplicatePolicy::KeepFirst);
        assert_eq!(config.instances.parent_chain_depth, 16);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[registry]
on_duplicate = "error"

[instances]
parent_chain_depth = 4
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.registry.on_duplicate, DuplicatePolicy::Error);
        assert_eq!(config.instances.parent_chain_depth, 4);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_load_json_and_toml() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("typbind.json");
        fs::write(&json_path, r#"{"logging": {"level": "debug", "format": "json"}}"#).unwrap();
        let config = Config::load(&json_path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        let toml_path = dir.path().join(CONFIG_FILE);
        config.save(&toml_path).unwrap();
        assert_eq!(Config::load(&toml_path).unwrap(), config);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typbind.yaml");
        fs::write(&path, "registry: {}").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_discover_walks_up_from_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("crate").join("src");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[logging]\nlevel = \"trace\"\nformat = \"compact\"\n").unwrap();

        let config = Config::discover_from(&nested);
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_discover_skips_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("inner");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[instances]\nparent_chain_depth = 2\n").unwrap();
        fs::write(nested.join(CONFIG_FILE), "[instances\n").unwrap();

        let config = Config::discover_from(&nested);
        assert_eq!(config.instances.parent_chain_depth, 2);
    }

    #[test]
    fn test_discover_without_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::discover_from(dir.path());
        assert_eq!(config.registry, RegistryConfig::default());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_logging_section_maps_to_log_config() {
        let config = Config::parse("[logging]\nlevel = \"warn\"\nformat = \"json\"\nspan_events = true\n").unwrap();
        let log = config.logging.to_log_config();
        assert_eq!(log.level, tracing::Level::WARN);
        assert_eq!(log.format, LogFormat::Json);
        assert!(log.span_events);
        assert_eq!(log.directives(), "typbind=warn");

        let fallback = LoggingConfig { level: "loud".to_string(), ..LoggingConfig::default() };
        assert_eq!(fallback.to_log_config().level, tracing::Level::INFO);
    }

    #[test]
    fn test_generate_default_parses_back() {
        let generated = Config::generate_default();
        assert!(generated.contains("parent_chain_depth"));
        assert_eq!(Config::parse(&generated).unwrap(), Config::default());
    }
}
