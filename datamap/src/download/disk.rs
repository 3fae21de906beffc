//! Free-space preflight checks.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::{DownloadError, DownloadResult};

/// Reports free space on the filesystem holding a path.
pub trait SpaceProbe: Send + Sync {
    /// Bytes available to an unprivileged writer at `path`.
    ///
    /// `path` must exist.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// [`SpaceProbe`] backed by `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsProbe;

impl SpaceProbe for StatvfsProbe {
    #[cfg(unix)]
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::mem::MaybeUninit;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat = MaybeUninit::<libc::statvfs>::uninit();

        // SAFETY: c_path is a valid NUL-terminated string and stat points to
        // writable memory of the right size.
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: statvfs returned 0, so the struct is initialised.
        let stat = unsafe { stat.assume_init() };
        #[allow(clippy::unnecessary_cast)]
        let available = stat.f_frsize as u64 * stat.f_bavail as u64;
        Ok(available)
    }

    #[cfg(not(unix))]
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "free space query not supported on this platform",
        ))
    }
}

/// Closest existing directory at or above `path`.
///
/// Output directories are checked before they are created, so the probe
/// has to look at whatever already exists.
pub fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    let mut current = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    loop {
        if current.exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return PathBuf::from("."),
        }
    }
}

/// Fail with `InsufficientSpace` if fewer than `required` bytes are free
/// where `target` will be written.
///
/// If free space cannot be determined the check passes with a warning.
pub fn ensure_space(probe: &dyn SpaceProbe, target: &Path, required: u64) -> DownloadResult<()> {
    if required == 0 {
        return Ok(());
    }

    let probe_path = nearest_existing_ancestor(target);
    match probe.available_bytes(&probe_path) {
        Ok(available) if available < required => Err(DownloadError::InsufficientSpace {
            path: probe_path,
            required,
            available,
        }),
        Ok(available) => {
            debug!(path = %probe_path.display(), required, available, "Disk space check passed");
            Ok(())
        }
        Err(e) => {
            warn!(
                path = %probe_path.display(),
                error = %e,
                "Could not determine free disk space, continuing"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Probe reporting a fixed amount of free space.
    pub struct FixedSpace(pub u64);

    impl SpaceProbe for FixedSpace {
        fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.0)
        }
    }

    struct BrokenProbe;

    impl SpaceProbe for BrokenProbe {
        fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Other, "no statvfs"))
        }
    }

    #[test]
    fn test_insufficient_space_rejected() {
        let dir = TempDir::new().unwrap();
        let err = ensure_space(&FixedSpace(1000), dir.path(), 7168).unwrap_err();

        match err {
            DownloadError::InsufficientSpace {
                required,
                available,
                ..
            } => {
                assert_eq!(required, 7168);
                assert_eq!(available, 1000);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_exact_space_accepted() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_space(&FixedSpace(7168), dir.path(), 7168).is_ok());
    }

    #[test]
    fn test_probe_failure_assumes_space() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_space(&BrokenProbe, dir.path(), u64::MAX).is_ok());
    }

    #[test]
    fn test_zero_required_skips_probe() {
        assert!(ensure_space(&FixedSpace(0), Path::new("/nonexistent"), 0).is_ok());
    }

    #[test]
    fn test_nearest_existing_ancestor_walks_up() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("a").join("b").join("c");
        assert_eq!(nearest_existing_ancestor(&missing), dir.path());
    }

    #[test]
    fn test_nearest_existing_ancestor_relative() {
        assert_eq!(
            nearest_existing_ancestor(Path::new("surely-missing-dir/v1")),
            PathBuf::from(".")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_statvfs_probe_reports_space() {
        let dir = TempDir::new().unwrap();
        assert!(StatvfsProbe.available_bytes(dir.path()).is_ok());
    }
}
