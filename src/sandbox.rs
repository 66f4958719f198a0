//! Ephemeral working directories.
//!
//! Every scenario gets its own sandbox. The root is exclusively owned by the
//! scenario that acquired it and is never shared between threads.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{HarnessError, Result};

const SANDBOX_PREFIX: &str = "bmtest-";

/// An empty directory acquired for one scenario run.
///
/// Dropping a `Sandbox` removes the directory tree as a fallback; call
/// [`Sandbox::release`] to observe removal errors.
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Create a new empty directory in the system temp location.
    pub fn acquire() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(SANDBOX_PREFIX)
            .tempdir()
            .map_err(|source| HarnessError::Sandbox {
                path: std::env::temp_dir(),
                source,
            })?;
        Ok(Self { dir })
    }

    /// Create a new empty directory under `base`, creating `base` if needed.
    pub fn acquire_in(base: &Path) -> Result<Self> {
        let sandbox_err = |source| HarnessError::Sandbox {
            path: base.to_path_buf(),
            source,
        };
        fs::create_dir_all(base).map_err(sandbox_err)?;
        let dir = tempfile::Builder::new()
            .prefix(SANDBOX_PREFIX)
            .tempdir_in(base)
            .map_err(sandbox_err)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete every direct child of the root, keeping the root itself.
    ///
    /// Symbolic links are unlinked, never followed, so nothing outside the
    /// root is touched.
    pub fn clear_contents(&self) -> Result<()> {
        let root = self.path();
        let entries = fs::read_dir(root).map_err(|source| HarnessError::Sandbox {
            path: root.to_path_buf(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| HarnessError::Sandbox {
                path: root.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            remove_entry(&path, &entry)?;
        }
        Ok(())
    }

    /// Remove the directory tree entirely.
    pub fn release(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| HarnessError::Sandbox { path, source })
    }
}

fn remove_entry(path: &Path, entry: &fs::DirEntry) -> Result<()> {
    let sandbox_err = |source| HarnessError::Sandbox {
        path: path.to_path_buf(),
        source,
    };
    // DirEntry::file_type does not traverse symlinks.
    let file_type = entry.file_type().map_err(sandbox_err)?;
    if file_type.is_dir() {
        fs::remove_dir_all(path).map_err(sandbox_err)
    } else {
        fs::remove_file(path).map_err(sandbox_err)
    }
}

/// Resolve the `local` sandbox base: `.bmtest/<timestamp>/` under `root`.
pub fn local_base(root: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    root.join(".bmtest").join(stamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_empty_directory() {
        let sandbox = Sandbox::acquire().unwrap();
        assert!(sandbox.path().is_dir());
        assert_eq!(fs::read_dir(sandbox.path()).unwrap().count(), 0);
    }

    #[test]
    fn sandboxes_are_distinct() {
        let a = Sandbox::acquire().unwrap();
        let b = Sandbox::acquire().unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn clear_contents_keeps_root() {
        let sandbox = Sandbox::acquire().unwrap();
        let root = sandbox.path();
        fs::write(root.join("build_master.json"), "{}").unwrap();
        fs::create_dir_all(root.join("include/myproject")).unwrap();
        fs::write(root.join("include/myproject/defines.h"), "").unwrap();

        sandbox.clear_contents().unwrap();

        assert!(root.is_dir());
        assert_eq!(fs::read_dir(root).unwrap().count(), 0);
    }

    #[test]
    fn clear_contents_on_empty_root() {
        let sandbox = Sandbox::acquire().unwrap();
        sandbox.clear_contents().unwrap();
        assert!(sandbox.path().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn clear_contents_does_not_follow_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("keep.txt"), "keep").unwrap();

        let sandbox = Sandbox::acquire().unwrap();
        std::os::unix::fs::symlink(outside.path(), sandbox.path().join("link")).unwrap();

        sandbox.clear_contents().unwrap();

        assert!(!sandbox.path().join("link").exists());
        assert!(outside.path().join("keep.txt").exists());
    }

    #[test]
    fn release_removes_tree() {
        let sandbox = Sandbox::acquire().unwrap();
        let root = sandbox.path().to_path_buf();
        fs::create_dir_all(root.join("source")).unwrap();
        fs::write(root.join("source/main.c"), "int main() {}").unwrap();

        sandbox.release().unwrap();

        assert!(!root.exists());
    }

    #[test]
    fn drop_removes_tree() {
        let root = {
            let sandbox = Sandbox::acquire().unwrap();
            fs::write(sandbox.path().join("meson.build"), "").unwrap();
            sandbox.path().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn acquire_in_creates_base() {
        let base = tempfile::tempdir().unwrap();
        let nested = base.path().join("runs/one");
        let sandbox = Sandbox::acquire_in(&nested).unwrap();
        assert!(sandbox.path().starts_with(&nested));
        assert!(sandbox.path().is_dir());
    }

    #[test]
    fn local_base_is_under_dot_bmtest() {
        let base = local_base(Path::new("/work"));
        assert!(base.starts_with("/work/.bmtest"));
    }
}
