use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{IntrospectError, Result};

/// Write the script text and add the owner-execute bit to its existing mode.
/// Overwrites any previous file.
pub fn write_script(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).map_err(|e| IntrospectError::io(path, e))?;
    make_executable(path)?;
    debug!(path = %path.display(), bytes = text.len(), "Materialized script");
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
        .map_err(|e| IntrospectError::io(path, e))?
        .permissions();
    perms.set_mode(perms.mode() | 0o100);
    fs::set_permissions(path, perms).map_err(|e| IntrospectError::io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
