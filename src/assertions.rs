//! Assertions over captured output and the sandbox filesystem.
//!
//! Each assertion returns `Err(AssertionFailure)` carrying the raw captured
//! context instead of panicking, so the runner can record it and move on to
//! the next scenario.

use std::path::Path;

use regex::Regex;

use crate::error::AssertionFailure;
use crate::inspect::SandboxPaths;
use crate::process::InvocationResult;

type AssertResult = Result<(), AssertionFailure>;

/// Exit code must be 0.
pub fn assert_success(result: &InvocationResult) -> AssertResult {
    if result.success() {
        return Ok(());
    }
    Err(AssertionFailure::ExitCode {
        actual: result.exit_code(),
        stdout: result.stdout().to_vec(),
        stderr: result.stderr().to_string(),
    })
}

/// Exit code must be anything but 0.
pub fn assert_failure(result: &InvocationResult) -> AssertResult {
    if !result.success() {
        return Ok(());
    }
    Err(AssertionFailure::UnexpectedSuccess {
        stdout: result.stdout().to_vec(),
        stderr: result.stderr().to_string(),
    })
}

/// Nothing at all was written to stderr.
pub fn assert_stderr_absent(result: &InvocationResult) -> AssertResult {
    if result.stderr().is_absent() {
        return Ok(());
    }
    Err(AssertionFailure::StderrPresent {
        lines: result.stderr().lines().to_vec(),
    })
}

fn compile(pattern: &str) -> Result<Regex, AssertionFailure> {
    Regex::new(pattern).map_err(|e| AssertionFailure::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// `pattern` must be found somewhere in `subject` (search, not full match).
pub fn assert_matches(subject: &str, pattern: &str) -> AssertResult {
    let re = compile(pattern)?;
    if re.is_match(subject) {
        Ok(())
    } else {
        Err(AssertionFailure::NoMatch {
            subject: subject.to_string(),
            pattern: pattern.to_string(),
        })
    }
}

/// Line `index` must exist and match `pattern`.
pub fn assert_line_matches(lines: &[String], index: usize, pattern: &str) -> AssertResult {
    match lines.get(index) {
        Some(line) => assert_matches(line, pattern),
        None => Err(AssertionFailure::MissingLine {
            index,
            lines: lines.to_vec(),
        }),
    }
}

/// At least one element must match; stops at the first that does.
pub fn assert_any_matches(lines: &[String], pattern: &str) -> AssertResult {
    let re = compile(pattern)?;
    if lines.iter().any(|line| re.is_match(line)) {
        Ok(())
    } else {
        Err(AssertionFailure::NoLineMatch {
            pattern: pattern.to_string(),
            lines: lines.to_vec(),
        })
    }
}

pub fn assert_file_exists(sandbox: &(impl SandboxPaths + ?Sized), path: &Path) -> AssertResult {
    if sandbox.exists_file(path) {
        return Ok(());
    }
    Err(AssertionFailure::MissingFile {
        path: path.to_path_buf(),
    })
}

pub fn assert_dir_exists(sandbox: &(impl SandboxPaths + ?Sized), path: &Path) -> AssertResult {
    if sandbox.exists_dir(path) {
        return Ok(());
    }
    Err(AssertionFailure::MissingDir {
        path: path.to_path_buf(),
    })
}

/// Nothing (file, directory or link) may exist at `path`.
pub fn assert_absent(sandbox: &(impl SandboxPaths + ?Sized), path: &Path) -> AssertResult {
    if !sandbox.exists(path) {
        return Ok(());
    }
    Err(AssertionFailure::UnexpectedPath {
        path: path.to_path_buf(),
    })
}
