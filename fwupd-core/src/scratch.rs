// Licensed under the Apache-2.0 license

//! RAII scratch-directory guard, modeled on `softwareUtils::RemovablePath`
//! in `examples/original_source/bmc/software_utils.hpp`: remove the path on
//! drop unless the caller disarms it after a successful promotion.

use std::path::{Path, PathBuf};

pub struct ScratchGuard {
    path: Option<PathBuf>,
}

impl ScratchGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().expect("guard already disarmed")
    }

    /// Clear the guard's path so drop does not remove it -- used once the
    /// scratch directory has been renamed into its final location (spec.md
    /// 4.1 step 6).
    pub fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("failed to remove scratch directory {path:?}: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_directory_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        {
            let _guard = ScratchGuard::new(&scratch);
        }
        assert!(!scratch.exists());
    }

    #[test]
    fn disarmed_guard_leaves_directory_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        {
            let mut guard = ScratchGuard::new(&scratch);
            guard.disarm();
        }
        assert!(scratch.exists());
    }
}
