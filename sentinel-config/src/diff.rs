use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiffConfig {
    /// Unchanged lines kept around each change before the rest is collapsed.
    #[serde(default = "DiffConfig::default_context_lines")]
    pub context_lines: usize,
    /// Emit every unchanged line and no hunk headers.
    #[serde(default)]
    pub full_context: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            context_lines: Self::default_context_lines(),
            full_context: false,
        }
    }
}

impl DiffConfig {
    const MAX_CONTEXT_LINES: usize = 1_000;

    const fn default_context_lines() -> usize {
        3
    }

    /// Context radius handed to the diff engine; `None` disables collapsing.
    pub fn context(&self) -> Option<usize> {
        if self.full_context {
            None
        } else {
            Some(self.context_lines)
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.context_lines <= Self::MAX_CONTEXT_LINES,
            "diff.context_lines must be at most {}",
            Self::MAX_CONTEXT_LINES
        );
        Ok(())
    }
}
