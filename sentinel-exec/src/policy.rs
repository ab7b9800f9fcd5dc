use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use sentinel_commons::SandboxPaths;

use crate::executor::CommandInvocation;

pub trait CommandPolicy: Send + Sync {
    fn check(&self, invocation: &CommandInvocation) -> Result<()>;
}

/// Refuses invocations whose working directory or declared paths lie
/// outside a sandbox root.
#[derive(Clone)]
pub struct SandboxGuardPolicy {
    sandbox: Arc<dyn SandboxPaths>,
}

impl SandboxGuardPolicy {
    pub fn new(sandbox: Arc<dyn SandboxPaths>) -> Self {
        Self { sandbox }
    }

    fn ensure_within_sandbox(&self, path: &Path) -> Result<()> {
        if !self.sandbox.contains(path) {
            bail!(
                "path `{}` escapes the sandbox root `{}`",
                path.display(),
                self.sandbox.sandbox_root().display()
            );
        }
        Ok(())
    }
}

impl CommandPolicy for SandboxGuardPolicy {
    fn check(&self, invocation: &CommandInvocation) -> Result<()> {
        self.ensure_within_sandbox(&invocation.working_dir)?;

        for path in &invocation.touched_paths {
            self.ensure_within_sandbox(path)?;
        }

        Ok(())
    }
}
