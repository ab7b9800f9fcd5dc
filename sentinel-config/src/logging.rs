use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingConfig {
    const LEVELS: [&'static str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

    fn default_level() -> String {
        "info".to_string()
    }

    pub fn validate(&self) -> Result<()> {
        let level = self.level.trim().to_ascii_lowercase();
        ensure!(
            Self::LEVELS.contains(&level.as_str()),
            "logging.level must be one of {}",
            Self::LEVELS.join(", ")
        );
        Ok(())
    }
}
