//! Filesystem queries relative to the sandbox a process ran in.

use std::path::{Path, PathBuf};

use crate::process::InvocationResult;

/// Existence queries resolved against a sandbox root. Never fails on a
/// missing path.
pub trait SandboxPaths {
    fn root(&self) -> &Path;

    /// Resolve `path` against the root. Absolute paths are kept.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().join(path)
        }
    }

    /// Anything at `path`, including a dangling symlink.
    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).symlink_metadata().is_ok()
    }

    fn exists_file(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn exists_dir(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }
}

/// A bare sandbox root, for steps that spawn no process.
impl SandboxPaths for Path {
    fn root(&self) -> &Path {
        self
    }
}

/// An invocation result paired with the sandbox root it ran against.
#[derive(Debug, Clone)]
pub struct Outcome {
    result: InvocationResult,
    root: PathBuf,
}

impl Outcome {
    pub fn new(result: InvocationResult, root: impl Into<PathBuf>) -> Self {
        Self {
            result,
            root: root.into(),
        }
    }

    pub fn result(&self) -> &InvocationResult {
        &self.result
    }
}

impl SandboxPaths for Outcome {
    fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Invocation;
    use std::fs;

    fn outcome_in(dir: &Path) -> Outcome {
        let result = Invocation::new("true", dir).run().unwrap();
        Outcome::new(result, dir)
    }

    #[test]
    fn file_and_dir_queries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("include/myproject")).unwrap();
        fs::write(dir.path().join("build_master.json"), "{}").unwrap();
        let outcome = outcome_in(dir.path());

        assert!(outcome.exists_file(Path::new("build_master.json")));
        assert!(!outcome.exists_dir(Path::new("build_master.json")));
        assert!(outcome.exists_dir(Path::new("include/myproject")));
        assert!(!outcome.exists_file(Path::new("include/myproject")));
        assert!(outcome.exists(Path::new("include")));
    }

    #[test]
    fn missing_paths_are_false() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = outcome_in(dir.path());
        assert!(!outcome.exists_file(Path::new("source/main.c")));
        assert!(!outcome.exists_dir(Path::new("source")));
        assert!(!outcome.exists(Path::new("../definitely/not/here")));
    }

    #[test]
    fn absolute_paths_are_not_rebased() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        fs::write(other.path().join("meson.build"), "").unwrap();
        let outcome = outcome_in(dir.path());

        let absolute = other.path().join("meson.build");
        assert_eq!(outcome.resolve(&absolute), absolute);
        assert!(outcome.exists_file(&absolute));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("link")).unwrap();
        let outcome = outcome_in(dir.path());
        assert!(outcome.exists(Path::new("link")));
        assert!(!outcome.exists_file(Path::new("link")));
    }

    #[test]
    fn bare_root_answers_queries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("source")).unwrap();
        let root: &Path = dir.path();
        assert!(root.exists_dir(Path::new("source")));
        assert!(!SandboxPaths::exists(root, Path::new("include")));
        assert_eq!(SandboxPaths::resolve(root, Path::new("x")), dir.path().join("x"));
    }

    #[test]
    fn sandbox_root_resolves_to_itself() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = outcome_in(dir.path());
        assert!(outcome.exists_dir(Path::new("")));
        assert_eq!(outcome.root(), dir.path());
        assert!(outcome.result().success());
    }
}
