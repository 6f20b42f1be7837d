//! Exclusive file creation.
//!
//! Content is written to a temp file in the destination directory and then
//! persisted with no-clobber semantics: the destination either appears with
//! its full content or the call fails with `AlreadyExists`. Readers never see
//! a half-written file.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Create `path` with `bytes`, failing with [`io::ErrorKind::AlreadyExists`]
/// if it is already present.
pub fn atomic_write_new(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    let path = path.as_ref();

    let mut tmp = NamedTempFile::new_in(parent_dir(path))?;
    tmp.write_all(bytes)?;

    // The temp file is removed when the error drops.
    tmp.persist_noclobber(path).map_err(|err| err.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
