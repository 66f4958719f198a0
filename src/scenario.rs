//! Scenario model and builder.
//!
//! A scenario is an ordered list of steps; each step performs one action
//! (usually a subprocess call) and then verifies a list of checks against
//! its outcome. The builder methods append the canonical step sequences for
//! the tool under test, parameterized by options instead of duplicated per
//! variant.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::assertions;
use crate::error::AssertionFailure;
use crate::inspect::Outcome;

/// Manifest file written by `init` and read by `--update-meson-build`.
pub const MANIFEST: &str = "build_master.json";
/// Build script generated from the manifest.
pub const BUILD_SCRIPT: &str = "meson.build";
/// First line of `--version`.
pub const VERSION_PATTERN: &str = r"^Build Master \d+\.\d+\.\d+$";
/// Second line of `--version`.
pub const BUILD_TYPE_PATTERN: &str = r"^Build Type: (Debug|Release)$";
/// Build directory configured by the default validator (`meson setup build`).
pub const VALIDATION_DIR: &str = "build";

/// Source-language flavour of a generated project skeleton.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variant {
    #[default]
    C,
    Cpp,
}

impl Variant {
    pub fn header_ext(self) -> &'static str {
        match self {
            Variant::C => "h",
            Variant::Cpp => "hpp",
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            Variant::C => "source/main.c",
            Variant::Cpp => "source/main.cpp",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Variant::C => Variant::Cpp,
            Variant::Cpp => Variant::C,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Variant::C => "c",
            Variant::Cpp => "cpp",
        }
    }

    /// The files that distinguish this variant from the other one.
    pub fn distinguishing_files(self, canonical_name: &str) -> [PathBuf; 3] {
        let include = Path::new("include").join(canonical_name);
        [
            include.join(format!("api_defines.{}", self.header_ext())),
            include.join(format!("defines.{}", self.header_ext())),
            PathBuf::from(self.entry_point()),
        ]
    }
}

/// Options for the `init` step sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    pub name: String,
    pub canonical_name: String,
    pub variant: Variant,
    /// Explicit target directory; relative paths resolve against the sandbox.
    pub directory: Option<PathBuf>,
    pub force: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            name: "MyProject".to_string(),
            canonical_name: "myproject".to_string(),
            variant: Variant::C,
            directory: None,
            force: false,
        }
    }
}

impl InitOptions {
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "init".to_string(),
            format!("--name={}", self.name),
            format!("--canonical_name={}", self.canonical_name),
        ];
        if self.variant == Variant::Cpp {
            args.push("--create-cpp".to_string());
        }
        if let Some(dir) = &self.directory {
            args.push(format!("--directory={}", dir.display()));
        }
        if self.force {
            args.push("--force".to_string());
        }
        args
    }

    /// Regeneration options pointing at the same target directory.
    pub fn regenerate(&self) -> RegenerateOptions {
        RegenerateOptions {
            force: true,
            directory: self.directory.clone(),
        }
    }
}

/// Options for the regenerate-and-validate step sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegenerateOptions {
    pub force: bool,
    pub directory: Option<PathBuf>,
}

impl RegenerateOptions {
    fn args(&self) -> Vec<String> {
        let mut args = vec!["--update-meson-build".to_string()];
        if self.force {
            args.push("--force".to_string());
        }
        if let Some(dir) = &self.directory {
            args.push(format!("--directory={}", dir.display()));
        }
        args
    }
}

fn in_target(directory: Option<&Path>, rel: impl AsRef<Path>) -> PathBuf {
    match directory {
        Some(dir) => dir.join(rel),
        None => rel.as_ref().to_path_buf(),
    }
}

/// What a step does before its checks run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the tool under test with these arguments in the sandbox root.
    Tool { args: Vec<String> },
    /// Clone `url` into `dest` (relative to the sandbox) with the version-control client.
    Clone { url: String, dest: PathBuf },
    /// Run the external validator against `directory` (sandbox root if unset).
    Validate { directory: Option<PathBuf> },
    /// Delete a file or directory inside the sandbox. Missing paths are ignored.
    Remove { path: PathBuf },
    /// Delete the sandbox contents, keeping the root.
    ClearSandbox,
}

impl Action {
    /// Whether the action spawns a process whose output checks can inspect.
    pub fn spawns_process(&self) -> bool {
        matches!(
            self,
            Action::Tool { .. } | Action::Clone { .. } | Action::Validate { .. }
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Tool { args } => write!(f, "tool {}", args.join(" ")),
            Action::Clone { url, dest } => write!(f, "clone {url} {}", dest.display()),
            Action::Validate { directory: Some(dir) } => write!(f, "validate {}", dir.display()),
            Action::Validate { directory: None } => write!(f, "validate ."),
            Action::Remove { path } => write!(f, "remove {}", path.display()),
            Action::ClearSandbox => write!(f, "clear sandbox"),
        }
    }
}

/// A single verification against a step's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Success,
    Failure,
    StderrAbsent,
    StdoutLine { index: usize, pattern: String },
    AnyStdoutLine { pattern: String },
    FileExists(PathBuf),
    DirExists(PathBuf),
    Absent(PathBuf),
}

impl Check {
    /// Whether the check inspects process output rather than the sandbox.
    pub fn reads_output(&self) -> bool {
        !matches!(
            self,
            Check::FileExists(_) | Check::DirExists(_) | Check::Absent(_)
        )
    }

    /// Verify a filesystem check against the sandbox root alone. Output
    /// checks have nothing to inspect here and yield `None`.
    pub fn verify_sandbox(&self, root: &Path) -> Option<Result<(), AssertionFailure>> {
        match self {
            Check::FileExists(path) => Some(assertions::assert_file_exists(root, path)),
            Check::DirExists(path) => Some(assertions::assert_dir_exists(root, path)),
            Check::Absent(path) => Some(assertions::assert_absent(root, path)),
            _ => None,
        }
    }

    pub fn verify(&self, outcome: &Outcome) -> Result<(), AssertionFailure> {
        let result = outcome.result();
        match self {
            Check::Success => assertions::assert_success(result),
            Check::Failure => assertions::assert_failure(result),
            Check::StderrAbsent => assertions::assert_stderr_absent(result),
            Check::StdoutLine { index, pattern } => {
                assertions::assert_line_matches(result.stdout(), *index, pattern)
            }
            Check::AnyStdoutLine { pattern } => {
                assertions::assert_any_matches(result.stdout(), pattern)
            }
            Check::FileExists(path) => assertions::assert_file_exists(outcome, path),
            Check::DirExists(path) => assertions::assert_dir_exists(outcome, path),
            Check::Absent(path) => assertions::assert_absent(outcome, path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub label: String,
    pub action: Action,
    pub checks: Vec<Check>,
}

/// A named, ordered sequence of steps run in one sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<Step>,
}

/// Builds a [`Scenario`] from the canonical step sequences.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    scenario: Scenario,
}

impl ScenarioBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scenario: Scenario {
                name: name.into(),
                description: None,
                steps: Vec::new(),
            },
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.scenario.description = Some(description.into());
        self
    }

    /// Append an arbitrary step.
    pub fn step(mut self, label: impl Into<String>, action: Action, checks: Vec<Check>) -> Self {
        self.scenario.steps.push(Step {
            label: label.into(),
            action,
            checks,
        });
        self
    }

    /// `--version` prints the semantic version and the build type, nothing on stderr.
    pub fn version(self) -> Self {
        self.step(
            "version",
            Action::Tool {
                args: vec!["--version".to_string()],
            },
            vec![
                Check::Success,
                Check::StderrAbsent,
                Check::StdoutLine {
                    index: 0,
                    pattern: VERSION_PATTERN.to_string(),
                },
                Check::StdoutLine {
                    index: 1,
                    pattern: BUILD_TYPE_PATTERN.to_string(),
                },
            ],
        )
    }

    /// `init` creates the skeleton for the selected variant and none of the other's files.
    pub fn init(self, opts: &InitOptions) -> Self {
        let dir = opts.directory.as_deref();
        let include = Path::new("include");
        let mut checks = vec![
            Check::Success,
            Check::StderrAbsent,
            Check::FileExists(in_target(dir, MANIFEST)),
            Check::DirExists(in_target(dir, "source")),
            Check::DirExists(in_target(dir, include)),
            Check::DirExists(in_target(dir, include.join(&opts.canonical_name))),
        ];
        checks.extend(
            opts.variant
                .distinguishing_files(&opts.canonical_name)
                .into_iter()
                .map(|file| Check::FileExists(in_target(dir, file))),
        );
        checks.extend(
            opts.variant
                .other()
                .distinguishing_files(&opts.canonical_name)
                .into_iter()
                .map(|file| Check::Absent(in_target(dir, file))),
        );

        let label = format!("init ({})", opts.variant.label());
        self.step(label, Action::Tool { args: opts.args() }, checks)
    }

    /// `init` without `--force` over an existing manifest must be refused.
    pub fn init_refused(self, opts: &InitOptions) -> Self {
        let unforced = InitOptions {
            force: false,
            ..opts.clone()
        };
        self.step(
            "init over existing manifest",
            Action::Tool {
                args: unforced.args(),
            },
            vec![Check::Failure],
        )
    }

    /// Regenerate `meson.build` and have the external validator accept it.
    pub fn regenerate(self, opts: &RegenerateOptions) -> Self {
        let dir = opts.directory.as_deref();
        let label = if opts.force {
            "regenerate meson.build (forced)"
        } else {
            "regenerate meson.build"
        };
        self.step(
            label,
            Action::Tool { args: opts.args() },
            vec![
                Check::Success,
                Check::FileExists(in_target(dir, BUILD_SCRIPT)),
            ],
        )
        .step(
            "validate meson.build",
            Action::Validate {
                directory: opts.directory.clone(),
            },
            vec![Check::Success],
        )
    }

    /// Regeneration without a manifest must fail and write nothing.
    pub fn regenerate_refused(self, opts: &RegenerateOptions) -> Self {
        let dir = opts.directory.as_deref();
        self.step(
            "regenerate without manifest",
            Action::Tool { args: opts.args() },
            vec![Check::Failure, Check::Absent(in_target(dir, BUILD_SCRIPT))],
        )
    }

    /// Clone an external repository into the sandbox root.
    pub fn clone_fixture(self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.step(
            format!("clone {url}"),
            Action::Clone {
                url,
                dest: PathBuf::from("."),
            },
            vec![Check::Success, Check::FileExists(PathBuf::from(MANIFEST))],
        )
    }

    /// Drop the validator's build directory so the next validation starts fresh.
    pub fn discard_validation(self, opts: &RegenerateOptions) -> Self {
        let path = in_target(opts.directory.as_deref(), VALIDATION_DIR);
        self.step(
            format!("remove {}", path.display()),
            Action::Remove { path },
            Vec::new(),
        )
    }

    pub fn clear_sandbox(self) -> Self {
        self.step(
            "clear sandbox",
            Action::ClearSandbox,
            vec![
                Check::DirExists(PathBuf::from(".")),
                Check::Absent(PathBuf::from(MANIFEST)),
            ],
        )
    }

    pub fn build(self) -> Scenario {
        self.scenario
    }
}
