#![allow(dead_code)]

use std::path::{Path, PathBuf};

use sentinel_config::{DiscoveryConfig, ScannerConfig, SentinelConfig};
use sentinel_core::ToolRegistry;

/// Config whose sandboxes live under `base` and whose scanner discovery only
/// looks at `search_path`.
pub fn isolated_config(base: &Path, search_path: &Path) -> SentinelConfig {
    let mut config = SentinelConfig::default();
    config.sandbox.base_dir = base.to_path_buf();
    config.discovery = DiscoveryConfig {
        search_path: Some(search_path.display().to_string()),
        venv_dirs: Vec::new(),
        use_virtual_env: false,
        python_module_fallback: false,
    };
    config
}

pub fn with_timeout(mut config: SentinelConfig, scanner: &str, seconds: u64) -> SentinelConfig {
    config.scanners.insert(
        scanner.to_string(),
        ScannerConfig {
            timeout_seconds: Some(seconds),
            ..ScannerConfig::default()
        },
    );
    config
}

pub fn registry(config: &SentinelConfig) -> ToolRegistry {
    ToolRegistry::from_config(config).expect("registry should build")
}

/// Write an executable shell script named `name` into `dir`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    {
        let mut file = std::fs::File::create(&path).expect("create script");
        writeln!(file, "#!/bin/sh").expect("write shebang");
        file.write_all(body.as_bytes()).expect("write script");
        file.sync_all().expect("sync script");
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path
}
