use log::{debug, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::verbose;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    Deleted,
    /// Protection is active; the file is removed once it is released.
    Deferred,
}

#[derive(Debug, Default)]
struct GuardState {
    protected: bool,
    deferred: Vec<PathBuf>,
}

/// Deletion protection shared between the session controller, which sets and
/// clears it, and the generic cleanup path, which must honour it.
#[derive(Debug, Clone, Default)]
pub struct DeletionGuard {
    inner: Arc<Mutex<GuardState>>,
}

impl DeletionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GuardState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn protect(&self) {
        self.state().protected = true;
    }

    pub fn is_protected(&self) -> bool {
        self.state().protected
    }

    pub fn deferred_count(&self) -> usize {
        self.state().deferred.len()
    }

    /// Generic cleanup: never deletes while protection is active.
    pub async fn cleanup(&self, path: &Path) -> Cleanup {
        {
            let mut state = self.state();
            if state.protected {
                verbose!(1, "Deletion protected, deferring removal of {}", path.display());
                state.deferred.push(path.to_path_buf());
                return Cleanup::Deferred;
            }
        }
        remove_capture(path).await;
        Cleanup::Deleted
    }

    /// Clears protection and removes every file deferred meanwhile.
    pub async fn release(&self) -> usize {
        let deferred = {
            let mut state = self.state();
            state.protected = false;
            std::mem::take(&mut state.deferred)
        };
        for path in &deferred {
            remove_capture(path).await;
        }
        deferred.len()
    }
}

/// Best-effort removal; failures are logged and swallowed.
pub async fn remove_capture(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("{} already removed", path.display())
        }
        Err(err) => warn!("Failed to remove {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"frame,ms\n1,16.6\n").unwrap();
        path
    }

    #[tokio::test]
    async fn unprotected_cleanup_deletes() {
        let dir = TempDir::new().unwrap();
        let path = touch(&dir, "A(1_1).csv");
        let guard = DeletionGuard::new();

        assert_eq!(guard.cleanup(&path).await, Cleanup::Deleted);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn protection_holds_across_unrelated_endings() {
        let dir = TempDir::new().unwrap();
        let first = touch(&dir, "A(1_1).csv");
        let second = touch(&dir, "B(2_2).csv");
        let guard = DeletionGuard::new();
        guard.protect();

        assert_eq!(guard.cleanup(&first).await, Cleanup::Deferred);
        assert_eq!(guard.cleanup(&second).await, Cleanup::Deferred);
        assert!(first.exists());
        assert!(second.exists());
        assert_eq!(guard.deferred_count(), 2);

        assert_eq!(guard.release().await, 2);
        assert!(!guard.is_protected());
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[tokio::test]
    async fn removing_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        remove_capture(&dir.path().join("gone.csv")).await;
    }
}
