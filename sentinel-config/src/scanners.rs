use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// Per-scanner settings, keyed by scanner name under `[scanners.<name>]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScannerConfig {
    #[serde(default = "ScannerConfig::default_enabled")]
    pub enabled: bool,
    /// Explicit executable; tried before any discovery.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// Overrides the scanner's built-in timeout.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            binary: None,
            timeout_seconds: None,
        }
    }
}

impl ScannerConfig {
    const fn default_enabled() -> bool {
        true
    }

    pub fn timeout_or(&self, builtin: Duration) -> Duration {
        self.timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(builtin)
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if let Some(binary) = &self.binary {
            ensure!(
                !binary.as_os_str().is_empty(),
                "scanners.{name}.binary must not be empty"
            );
        }
        if let Some(seconds) = self.timeout_seconds {
            ensure!(
                seconds > 0,
                "scanners.{name}.timeout_seconds must be at least 1"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_falls_back_to_builtin() {
        let config = ScannerConfig::default();
        assert_eq!(
            config.timeout_or(Duration::from_secs(300)),
            Duration::from_secs(300)
        );

        let config = ScannerConfig {
            timeout_seconds: Some(5),
            ..ScannerConfig::default()
        };
        assert_eq!(
            config.timeout_or(Duration::from_secs(300)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn empty_binary_is_rejected() {
        let config = ScannerConfig {
            binary: Some(PathBuf::new()),
            ..ScannerConfig::default()
        };
        assert!(config.validate("checkov").is_err());
    }
}
