pub mod layers;

mod merge;


use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use toml::Value as TomlValue;
use tracing::debug;

pub use merge::merge_toml_values;

use crate::{DiffConfig, DiscoveryConfig, LoggingConfig, SandboxConfig, ScannerConfig};
use layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};

/// File looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "sentinel.toml";

const ENV_CONFIG_PATH: &str = "SENTINEL_CONFIG_PATH";
const ENV_SANDBOX_ROOT: &str = "SENTINEL_SANDBOX_ROOT";
const ENV_SCAN_TIMEOUT: &str = "SENTINEL_SCAN_TIMEOUT_SECS";
const ENV_LOG_LEVEL: &str = "SENTINEL_LOG_LEVEL";

/// Scanners whose `SENTINEL_<NAME>_BIN` override is read from the environment.
pub const KNOWN_SCANNERS: [&str; 2] = ["checkov", "tflint"];

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub scanners: HashMap<String, ScannerConfig>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SentinelConfig {
    /// Settings for `name`, or defaults when the scanner has no section.
    pub fn scanner(&self, name: &str) -> ScannerConfig {
        self.scanners.get(name).cloned().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        self.sandbox.validate()?;
        self.diff.validate()?;
        self.logging.validate()?;
        for (name, scanner) in &self.scanners {
            scanner.validate(name)?;
        }
        Ok(())
    }
}

/// Loads and validates [`SentinelConfig`] from its layers.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: SentinelConfig,
    layer_stack: ConfigLayerStack,
}

impl ConfigManager {
    /// Load configuration for the current working directory and process
    /// environment.
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Self::load_with(&cwd, &|key| std::env::var(key).ok())
    }

    /// Load configuration with an explicit working directory and environment
    /// lookup.
    pub fn load_with(workspace: &Path, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut layer_stack = ConfigLayerStack::default();

        let workspace_config = workspace.join(CONFIG_FILE_NAME);
        if workspace_config.is_file() {
            let toml = load_toml_from_file(&workspace_config)?;
            layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::Workspace {
                    file: workspace_config,
                },
                toml,
            ));
        }

        if let Some(explicit) = non_empty(env(ENV_CONFIG_PATH)) {
            let file = PathBuf::from(explicit);
            let toml = load_toml_from_file(&file).with_context(|| {
                format!(
                    "Failed to load configuration from {ENV_CONFIG_PATH}={}",
                    file.display()
                )
            })?;
            layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::Explicit { file },
                toml,
            ));
        }

        if let Some(overrides) = environment_layer(env)? {
            layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::Environment,
                overrides,
            ));
        }

        let config: SentinelConfig = layer_stack
            .effective_config()
            .try_into()
            .context("Failed to deserialize effective configuration")?;
        config
            .validate()
            .context("Configuration failed validation")?;

        debug!(
            layers = layer_stack.layers().len(),
            base_dir = %config.sandbox.base_dir.display(),
            "loaded configuration"
        );

        Ok(Self {
            config,
            layer_stack,
        })
    }

    /// Parse a single TOML document on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<SentinelConfig> {
        let config: SentinelConfig =
            toml::from_str(content).context("Failed to parse configuration")?;
        config
            .validate()
            .context("Configuration failed validation")?;
        Ok(config)
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn into_config(self) -> SentinelConfig {
        self.config
    }

    pub fn layer_stack(&self) -> &ConfigLayerStack {
        &self.layer_stack
    }
}

fn load_toml_from_file(path: &Path) -> Result<TomlValue> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Translate `SENTINEL_*` variables into a TOML layer.
fn environment_layer(env: &dyn Fn(&str) -> Option<String>) -> Result<Option<TomlValue>> {
    let mut root = toml::Table::new();

    if let Some(base_dir) = non_empty(env(ENV_SANDBOX_ROOT)) {
        let mut sandbox = toml::Table::new();
        sandbox.insert("base_dir".into(), TomlValue::String(base_dir));
        root.insert("sandbox".into(), TomlValue::Table(sandbox));
    }

    if let Some(level) = non_empty(env(ENV_LOG_LEVEL)) {
        let mut logging = toml::Table::new();
        logging.insert("level".into(), TomlValue::String(level));
        root.insert("logging".into(), TomlValue::Table(logging));
    }

    let timeout = match non_empty(env(ENV_SCAN_TIMEOUT)) {
        Some(raw) => Some(
            raw.parse::<u32>()
                .with_context(|| format!("{ENV_SCAN_TIMEOUT} must be a whole number of seconds"))?,
        ),
        None => None,
    };

    let mut scanners = toml::Table::new();
    for name in KNOWN_SCANNERS {
        let mut entry = toml::Table::new();
        let key = format!("SENTINEL_{}_BIN", name.to_ascii_uppercase());
        if let Some(binary) = non_empty(env(&key)) {
            entry.insert("binary".into(), TomlValue::String(binary));
        }
        if let Some(seconds) = timeout {
            entry.insert(
                "timeout_seconds".into(),
                TomlValue::Integer(i64::from(seconds)),
            );
        }
        if !entry.is_empty() {
            scanners.insert(name.to_string(), TomlValue::Table(entry));
        }
    }
    if !scanners.is_empty() {
        root.insert("scanners".into(), TomlValue::Table(scanners));
    }

    if root.is_empty() {
        Ok(None)
    } else {
        Ok(Some(TomlValue::Table(root)))
    }
}
