use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SandboxConfig {
    /// Directory under which one sandbox per session is allocated.
    #[serde(default = "SandboxConfig::default_base_dir")]
    pub base_dir: PathBuf,
    /// Sandboxes older than this are removed by the retention sweep.
    #[serde(default = "SandboxConfig::default_retention_hours")]
    pub retention_hours: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            base_dir: Self::default_base_dir(),
            retention_hours: Self::default_retention_hours(),
        }
    }
}

impl SandboxConfig {
    fn default_base_dir() -> PathBuf {
        std::env::temp_dir().join("sentinel-sandboxes")
    }

    const fn default_retention_hours() -> u64 {
        24
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.base_dir.as_os_str().is_empty(),
            "sandbox.base_dir must not be empty"
        );
        ensure!(
            self.retention_hours > 0,
            "sandbox.retention_hours must be at least 1"
        );
        Ok(())
    }
}
