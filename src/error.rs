//! Error types for the harness.
//!
//! `HarnessError` covers everything that stops a scenario from running a
//! step (launch failures, timeouts, sandbox I/O). `AssertionFailure` covers
//! a step that ran but produced the wrong observable state. Both embed the
//! raw captured context so a failure can be diagnosed without rerunning.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::loader::LoadError;
use crate::process::CapturedStream;

/// Result type alias using [`HarnessError`].
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors raised while driving a scenario.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Failed to spawn '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(
        "'{program}' timed out after {limit:?}, process tree killed\nstdout: {stdout:?}\nstderr: {stderr}"
    )]
    Timeout {
        program: String,
        limit: Duration,
        stdout: Vec<String>,
        stderr: CapturedStream,
    },

    #[error("Failed to capture {stream} of '{program}': reader thread panicked")]
    Capture {
        program: String,
        stream: &'static str,
    },

    #[error("Failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Sandbox error at {}: {source}", .path.display())]
    Sandbox {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A failed assertion on captured output or on the sandbox filesystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssertionFailure {
    #[error("Exit code: expected 0, got {actual}\nstdout: {stdout:?}\nstderr: {stderr}")]
    ExitCode {
        actual: i32,
        stdout: Vec<String>,
        stderr: String,
    },

    #[error("Exit code: expected non-zero, got 0\nstdout: {stdout:?}\nstderr: {stderr}")]
    UnexpectedSuccess { stdout: Vec<String>, stderr: String },

    #[error("stderr: expected nothing, got {lines:?}")]
    StderrPresent { lines: Vec<String> },

    #[error("String {subject:?} doesn't match the regex {pattern:?}")]
    NoMatch { subject: String, pattern: String },

    #[error("Line {index}: missing, output has {} line(s): {lines:?}", .lines.len())]
    MissingLine { index: usize, lines: Vec<String> },

    #[error("No match found for regex {pattern:?} in {lines:?}")]
    NoLineMatch { pattern: String, lines: Vec<String> },

    #[error("Invalid regex {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("File '{}' is expected to exist but it doesn't", .path.display())]
    MissingFile { path: PathBuf },

    #[error("Directory '{}' is expected to exist but it doesn't", .path.display())]
    MissingDir { path: PathBuf },

    #[error("Path '{}' is expected to be absent but it exists", .path.display())]
    UnexpectedPath { path: PathBuf },
}
