pub mod atomic;
pub mod diff;

pub use atomic::{TEMP_FILE_PREFIX, write_atomic};
pub use diff::{DiffLine, DiffLineKind, compute_diff_lines, count_changes, replay};
