//! Configuration for the Sentinel workspace.
//!
//! Settings are layered from built-in defaults, a `sentinel.toml` in the
//! working directory, an explicit file named by `SENTINEL_CONFIG_PATH`, and
//! finally environment overrides. Every section deserializes with serde
//! defaults so partial files are valid.

pub mod diff;
pub mod discovery;
pub mod loader;
pub mod logging;
pub mod sandbox;
pub mod scanners;

pub use diff::DiffConfig;
pub use discovery::DiscoveryConfig;
pub use loader::layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};
pub use loader::{CONFIG_FILE_NAME, ConfigManager, SentinelConfig, merge_toml_values};
pub use logging::LoggingConfig;
pub use sandbox::SandboxConfig;
pub use scanners::ScannerConfig;
