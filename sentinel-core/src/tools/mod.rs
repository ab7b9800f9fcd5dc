//! The tool surface exposed to hosts: JSON in, JSON out.

mod error;
mod registry;

pub use error::ToolExecutionError;
pub use registry::ToolRegistry;

/// Tool names accepted by [`ToolRegistry::execute_tool`].
pub mod names {
    pub const APPLY_PATCH: &str = "apply_patch";
    pub const SCAN_IAC: &str = "scan_iac";
    pub const LIST_FILES: &str = "list_files";
    pub const READ_FILE: &str = "read_file";
    pub const WRITE_FILE: &str = "write_file";

    pub const ALL: [&str; 5] = [APPLY_PATCH, SCAN_IAC, LIST_FILES, READ_FILE, WRITE_FILE];
}
