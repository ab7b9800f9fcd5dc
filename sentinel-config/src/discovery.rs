use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where scanner executables are looked for when no explicit binary is set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Search path in `PATH` syntax. `None` uses the process `PATH`.
    #[serde(default)]
    pub search_path: Option<String>,
    /// Virtual environments searched after the search path, relative to the
    /// working directory unless absolute.
    #[serde(default = "DiscoveryConfig::default_venv_dirs")]
    pub venv_dirs: Vec<PathBuf>,
    /// Also search `$VIRTUAL_ENV`.
    #[serde(default = "DiscoveryConfig::default_true")]
    pub use_virtual_env: bool,
    /// Fall back to `python -m <module>` for Python-packaged scanners.
    #[serde(default = "DiscoveryConfig::default_true")]
    pub python_module_fallback: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_path: None,
            venv_dirs: Self::default_venv_dirs(),
            use_virtual_env: true,
            python_module_fallback: true,
        }
    }
}

impl DiscoveryConfig {
    fn default_venv_dirs() -> Vec<PathBuf> {
        vec![PathBuf::from(".venv"), PathBuf::from("backend/.venv")]
    }

    const fn default_true() -> bool {
        true
    }

    /// The effective search path, falling back to the process `PATH`.
    pub fn effective_search_path(&self) -> Option<OsString> {
        match &self.search_path {
            Some(path) => Some(OsString::from(path)),
            None => std::env::var_os("PATH"),
        }
    }
}
