use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sentinel_config::DiscoveryConfig;
use sentinel_exec::{CommandExecutor, CommandInvocation};
use tracing::{debug, warn};

const PYTHON_IMPORT_TIMEOUT: Duration = Duration::from_secs(15);

/// A runnable scanner command: the program plus any leading arguments
/// (`-m checkov` when running through an interpreter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub program: PathBuf,
    pub prefix_args: Vec<String>,
}

impl Located {
    pub fn program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }
}

#[async_trait]
pub trait LocateStrategy: Send + Sync {
    fn label(&self) -> &'static str;

    async fn locate(&self, tool: &str) -> Option<Located>;
}

fn lookup(name: impl AsRef<std::ffi::OsStr>, search_path: Option<&OsString>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    which::which_in(name, search_path, cwd).ok()
}

/// Configured binary (`scanners.<name>.binary` or `SENTINEL_<NAME>_BIN`).
pub struct ExplicitOverride {
    binary: PathBuf,
    search_path: Option<OsString>,
}

impl ExplicitOverride {
    pub fn new(binary: impl Into<PathBuf>, search_path: Option<OsString>) -> Self {
        Self {
            binary: binary.into(),
            search_path,
        }
    }
}

#[async_trait]
impl LocateStrategy for ExplicitOverride {
    fn label(&self) -> &'static str {
        "explicit override"
    }

    async fn locate(&self, tool: &str) -> Option<Located> {
        if self.binary.is_file() {
            return Some(Located::program(self.binary.clone()));
        }
        if let Some(found) = lookup(&self.binary, self.search_path.as_ref()) {
            return Some(Located::program(found));
        }
        warn!(
            target: "sentinel.scan",
            scanner = tool,
            binary = %self.binary.display(),
            "configured scanner binary does not resolve; continuing discovery"
        );
        None
    }
}

pub struct SearchPath {
    search_path: Option<OsString>,
}

impl SearchPath {
    pub fn new(search_path: Option<OsString>) -> Self {
        Self { search_path }
    }
}

#[async_trait]
impl LocateStrategy for SearchPath {
    fn label(&self) -> &'static str {
        "search path"
    }

    async fn locate(&self, tool: &str) -> Option<Located> {
        lookup(tool, self.search_path.as_ref()).map(Located::program)
    }
}

/// Console scripts inside Python virtual environments.
pub struct VirtualEnv {
    venvs: Vec<PathBuf>,
}

impl VirtualEnv {
    pub fn new(venvs: Vec<PathBuf>) -> Self {
        Self { venvs }
    }

    fn candidates(venv: &Path, tool: &str) -> [PathBuf; 2] {
        [
            venv.join("bin").join(tool),
            venv.join("Scripts").join(format!("{tool}.exe")),
        ]
    }
}

#[async_trait]
impl LocateStrategy for VirtualEnv {
    fn label(&self) -> &'static str {
        "virtual environment"
    }

    async fn locate(&self, tool: &str) -> Option<Located> {
        self.venvs
            .iter()
            .flat_map(|venv| Self::candidates(venv, tool))
            .find(|candidate| candidate.is_file())
            .map(Located::program)
    }
}

/// `python -m <module>` when an interpreter on the search path can import
/// the module.
pub struct PythonModule {
    module: &'static str,
    search_path: Option<OsString>,
    executor: Arc<dyn CommandExecutor>,
}

impl PythonModule {
    pub fn new(
        module: &'static str,
        search_path: Option<OsString>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            module,
            search_path,
            executor,
        }
    }

    async fn importable(&self, python: &Path) -> bool {
        let script = format!(
            "import importlib.util, sys; sys.exit(0 if importlib.util.find_spec({:?}) else 1)",
            self.module
        );
        let invocation = CommandInvocation::new(python, std::env::temp_dir())
            .with_args(["-c".to_string(), script])
            .with_timeout(PYTHON_IMPORT_TIMEOUT);
        match self.executor.execute(&invocation).await {
            Ok(output) => output.status.success(),
            Err(error) => {
                debug!(target: "sentinel.scan", python = %python.display(), %error, "python import check failed");
                false
            }
        }
    }
}

#[async_trait]
impl LocateStrategy for PythonModule {
    fn label(&self) -> &'static str {
        "python module"
    }

    async fn locate(&self, _tool: &str) -> Option<Located> {
        for interpreter in ["python3", "python"] {
            let Some(python) = lookup(interpreter, self.search_path.as_ref()) else {
                continue;
            };
            if self.importable(&python).await {
                return Some(Located {
                    program: python,
                    prefix_args: vec!["-m".to_string(), self.module.to_string()],
                });
            }
        }
        None
    }
}

/// Ordered strategies; the first hit wins.
pub struct DiscoveryChain {
    tool: &'static str,
    strategies: Vec<Box<dyn LocateStrategy>>,
}

impl DiscoveryChain {
    pub fn new(tool: &'static str, strategies: Vec<Box<dyn LocateStrategy>>) -> Self {
        Self { tool, strategies }
    }

    /// The standard chain: explicit binary, search path, virtual
    /// environments, then the Python module fallback when `module` is set.
    pub fn standard(
        tool: &'static str,
        module: Option<&'static str>,
        binary: Option<&Path>,
        config: &DiscoveryConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let search_path = config.effective_search_path();
        let mut strategies: Vec<Box<dyn LocateStrategy>> = Vec::new();

        if let Some(binary) = binary {
            strategies.push(Box::new(ExplicitOverride::new(binary, search_path.clone())));
        }
        strategies.push(Box::new(SearchPath::new(search_path.clone())));

        let mut venvs = Vec::new();
        if config.use_virtual_env
            && let Some(active) = std::env::var_os("VIRTUAL_ENV")
        {
            venvs.push(PathBuf::from(active));
        }
        venvs.extend(config.venv_dirs.iter().cloned());
        if !venvs.is_empty() {
            strategies.push(Box::new(VirtualEnv::new(venvs)));
        }

        if config.python_module_fallback
            && let Some(module) = module
        {
            strategies.push(Box::new(PythonModule::new(module, search_path, executor)));
        }

        Self::new(tool, strategies)
    }

    pub fn tool(&self) -> &'static str {
        self.tool
    }

    pub async fn locate(&self) -> Option<Located> {
        for strategy in &self.strategies {
            if let Some(found) = strategy.locate(self.tool).await {
                debug!(
                    target: "sentinel.scan",
                    scanner = self.tool,
                    strategy = strategy.label(),
                    program = %found.program.display(),
                    "located scanner"
                );
                return Some(found);
            }
        }
        None
    }
}
