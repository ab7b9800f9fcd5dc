//! Shared helpers reused across the Sentinel crates. The goal is to keep the
//! sandbox containment rules in one place so that the file store, the patch
//! engine, and the scanner orchestrator all agree on what "inside the
//! sandbox" means.

pub mod paths;

pub use paths::{
    PathGuardError, SandboxPaths, normalize_path, normalize_report_path, paths_match, resolve,
    to_posix_relative,
};
