//! Mount point preconditions.

use std::path::Path;

use score_common::PathError;

/// Check that `path` can host a mount.
///
/// The directory must exist, be empty and be traversable by the current
/// user. Nothing is created or modified.
pub fn validate_mount_target(path: &Path) -> Result<(), PathError> {
    let display: String = path.display().to_string();

    let metadata: std::fs::Metadata = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PathError::NotFound {
                path: display.clone(),
            }
        } else {
            PathError::from_io(display.clone(), e)
        }
    })?;

    if !metadata.is_dir() {
        return Err(PathError::NotADirectory { path: display });
    }

    let mut entries: std::fs::ReadDir =
        std::fs::read_dir(path).map_err(|e| PathError::from_io(display.clone(), e))?;
    if entries.next().is_some() {
        return Err(PathError::NotEmpty { path: display });
    }

    if !is_executable(path) {
        return Err(PathError::NotExecutable { path: display });
    }

    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}
