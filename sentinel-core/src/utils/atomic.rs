use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

/// Prefix of in-flight temporary files; listings skip these.
pub const TEMP_FILE_PREFIX: &str = ".sentinel-tmp-";

/// Write `contents` to `path` through a temporary file in the same
/// directory, fsync it, then rename it into place.
///
/// Readers observe either the previous file or the complete new one. On any
/// failure the temporary file is removed when its handle drops.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "target path must have a parent directory",
        )
    })?;
    let mut temp_file = Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .tempfile_in(parent)?;
    temp_file.write_all(contents)?;
    temp_file.as_file_mut().sync_all()?;
    temp_file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
