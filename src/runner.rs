//! Scenario execution engine.
//!
//! Runs each scenario in its own sandbox, one step after another, and
//! records the first failure. The sandbox is released whether the scenario
//! passed, failed or could not finish.

use crate::error::{HarnessError, Result};
use crate::inspect::Outcome;
use crate::process::{Invocation, InvocationResult};
use crate::sandbox::{self, Sandbox};
use crate::scenario::{Action, Scenario, Step};
use crate::schema::{HarnessConfig, SandboxDir};
use std::path::{Component, Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of running a single scenario.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub steps_run: usize,
    pub steps_total: usize,
    pub failures: Vec<String>,
}

impl ScenarioResult {
    fn aborted(scenario: &Scenario, failure: String) -> Self {
        Self {
            name: scenario.name.clone(),
            passed: false,
            duration: Duration::ZERO,
            steps_run: 0,
            steps_total: scenario.steps.len(),
            failures: vec![failure],
        }
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Drives scenarios against the configured tool, version-control client and
/// validator.
#[derive(Debug, Clone)]
pub struct Harness {
    config: HarnessConfig,
    sandbox_base: Option<PathBuf>,
}

impl Harness {
    /// Relative program paths and sandbox locations are anchored to the
    /// current directory, since every call runs inside a sandbox.
    pub fn new(mut config: HarnessConfig) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        for program in [
            &mut config.tool,
            &mut config.git,
            &mut config.validator.program,
        ] {
            *program = anchor_program(program, &cwd);
        }
        let sandbox_base = match &config.sandbox_dir {
            None => None,
            Some(SandboxDir::Local) => Some(sandbox::local_base(&cwd)),
            Some(SandboxDir::Path(p)) => Some(cwd.join(p)),
        };
        Self {
            config,
            sandbox_base,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    fn timeout(&self) -> Option<Duration> {
        match self.config.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn acquire_sandbox(&self) -> Result<Sandbox> {
        match &self.sandbox_base {
            Some(base) => Sandbox::acquire_in(base),
            None => Sandbox::acquire(),
        }
    }

    fn invocation(&self, program: &str, cwd: &Path) -> Invocation {
        Invocation::new(program, cwd)
            .inherit_env(self.config.inherit_env)
            .envs(&self.config.env)
            .timeout(self.timeout())
    }

    /// Run every scenario whose name contains `filter`.
    ///
    /// Scenarios run concurrently unless the configuration asks for serial
    /// execution. Results are returned in declaration order either way.
    pub fn run_all(&self, scenarios: &[Scenario], filter: Option<&str>) -> Vec<ScenarioResult> {
        let selected: Vec<&Scenario> = scenarios
            .iter()
            .filter(|s| filter.is_none_or(|f| s.name.contains(f)))
            .collect();

        if self.config.serial {
            return selected.into_iter().map(|s| self.run_scenario(s)).collect();
        }

        thread::scope(|scope| {
            let handles: Vec<_> = selected
                .iter()
                .map(|scenario| (*scenario, scope.spawn(move || self.run_scenario(scenario))))
                .collect();

            handles
                .into_iter()
                .map(|(scenario, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        ScenarioResult::aborted(scenario, "Scenario thread panicked".to_string())
                    })
                })
                .collect()
        })
    }

    /// Run one scenario in a fresh sandbox.
    pub fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        let steps_total = scenario.steps.len();

        let sandbox = match self.acquire_sandbox() {
            Ok(sandbox) => sandbox,
            Err(e) => {
                return ScenarioResult::aborted(scenario, format!("Failed to create sandbox: {e}"));
            }
        };
        debug!(scenario = %scenario.name, sandbox = %sandbox.path().display(), "sandbox acquired");

        let mut failures = Vec::new();
        let mut steps_run = 0;
        for (i, step) in scenario.steps.iter().enumerate() {
            steps_run = i + 1;
            if let Err(e) = self.run_step(step, &sandbox) {
                failures.push(format!("Step {} ({}): {e}", i + 1, step.label));
                break;
            }
        }

        // Always runs, regardless of how the steps went.
        if let Err(e) = sandbox.release() {
            warn!(scenario = %scenario.name, error = %e, "sandbox release failed");
            failures.push(format!("Sandbox release failed: {e}"));
        }

        let result = ScenarioResult {
            name: scenario.name.clone(),
            passed: failures.is_empty(),
            duration: start.elapsed(),
            steps_run,
            steps_total,
            failures,
        };
        info!(
            scenario = %result.name,
            passed = result.passed,
            steps = result.steps_run,
            "scenario finished"
        );
        result
    }

    fn run_step(&self, step: &Step, sandbox: &Sandbox) -> Result<()> {
        debug!(step = %step.label, action = %step.action, "running step");
        if !step.action.spawns_process()
            && let Some(check) = step.checks.iter().find(|c| c.reads_output())
        {
            return Err(HarnessError::Config(format!(
                "{check:?} inspects process output, but '{}' runs no process",
                step.action
            )));
        }

        match self.execute(&step.action, sandbox)? {
            Some(result) => {
                let outcome = Outcome::new(result, sandbox.path());
                for check in &step.checks {
                    check.verify(&outcome)?;
                }
            }
            None => {
                for check in &step.checks {
                    if let Some(verdict) = check.verify_sandbox(sandbox.path()) {
                        verdict?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Perform a step's action. Sandbox-only actions produce no invocation.
    fn execute(&self, action: &Action, sandbox: &Sandbox) -> Result<Option<InvocationResult>> {
        let root = sandbox.path();
        let invocation = match action {
            Action::Tool { args } => self.invocation(&self.config.tool, root).args(args),
            Action::Clone { url, dest } => self
                .invocation(&self.config.git, root)
                .args(["clone", url.as_str()])
                .arg(dest.display().to_string()),
            Action::Validate { directory } => self.validation(root, directory.as_deref())?,
            Action::Remove { path } => {
                remove_within(root, path)?;
                return Ok(None);
            }
            Action::ClearSandbox => {
                sandbox.clear_contents()?;
                return Ok(None);
            }
        };
        invocation.run().map(Some)
    }

    fn validation(&self, root: &Path, directory: Option<&Path>) -> Result<Invocation> {
        let validator = &self.config.validator;
        let target = match directory {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };
        let invocation = match &validator.directory_flag {
            Some(flag) => self
                .invocation(&validator.program, root)
                .args(&validator.args)
                .arg(format!("{flag}={}", target.display())),
            None => {
                if !target.is_dir() {
                    return Err(HarnessError::Config(format!(
                        "validator directory does not exist: {}",
                        target.display()
                    )));
                }
                self.invocation(&validator.program, &target)
                    .args(&validator.args)
            }
        };
        Ok(invocation)
    }
}

/// Bare names are left for `PATH` lookup; relative paths become absolute.
fn anchor_program(program: &str, cwd: &Path) -> String {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        cwd.join(path).display().to_string()
    } else {
        program.to_string()
    }
}

/// Remove a file or directory that must lie inside the sandbox.
fn remove_within(root: &Path, path: &Path) -> Result<()> {
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.as_os_str().is_empty() {
        return Err(HarnessError::Config(format!(
            "refusing to remove path outside the sandbox: {}",
            path.display()
        )));
    }

    let full = root.join(path);
    let sandbox_err = |source| HarnessError::Sandbox {
        path: full.clone(),
        source,
    };
    match std::fs::symlink_metadata(&full) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(sandbox_err(e)),
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&full).map_err(sandbox_err),
        Ok(_) => std::fs::remove_file(&full).map_err(sandbox_err),
    }
}
