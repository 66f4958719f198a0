use bmtest::runner::{Harness, ScenarioResult};
use bmtest::schema::{HarnessConfig, SandboxDir};
use bmtest::{loader, logging, schema, suite};
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with checkmarks
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// JUnit XML output for CI systems
    Junit,
}

#[derive(Parser)]
#[command(name = "bmtest")]
#[command(about = "Black-box acceptance tests for the build_master tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the acceptance suite
    Run {
        /// Configuration file (defaults to bmtest.yaml in the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Tool under test (overrides the configuration)
        #[arg(short, long)]
        tool: Option<String>,
        /// Filter scenarios by name pattern (substring match)
        #[arg(short, long)]
        filter: Option<String>,
        /// Output format
        #[arg(short, long, default_value = "human")]
        output: OutputFormat,
        /// Skip scenarios that clone external repositories
        #[arg(long)]
        skip_external: bool,
        /// Run scenarios one after another
        #[arg(long)]
        serial: bool,
        /// Show debug logs on stderr
        #[arg(short, long)]
        verbose: bool,
        /// Directory for sandboxes (overrides the configuration).
        /// Use "local" for .bmtest/<timestamp>/, or specify a path.
        #[arg(long)]
        sandbox_dir: Option<String>,
    },
    /// Check a configuration file and list the scenarios it would run
    Validate {
        /// Path to the configuration file
        config: PathBuf,
    },
    /// Scaffold a configuration file
    Init {
        /// Output path for the new configuration
        #[arg(default_value = "bmtest.yaml")]
        path: PathBuf,
    },
    /// Output the configuration schema
    Schema,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            tool,
            filter,
            output,
            skip_external,
            serial,
            verbose,
            sandbox_dir,
        } => {
            logging::init(verbose);

            let mut config = match load(config.as_deref()) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error loading config: {e}");
                    std::process::exit(1);
                }
            };

            // CLI flags override the configuration
            if let Some(tool) = tool {
                config.tool = tool;
            }
            if serial {
                config.serial = true;
            }
            if let Some(dir) = sandbox_dir {
                config.sandbox_dir = Some(SandboxDir::from(dir));
            }
            if let Some(ref f) = filter {
                debug!(filter = %f, "filtering scenarios");
            }

            let scenarios = suite::standard(&config, skip_external);
            let harness = Harness::new(config);

            let run_start = Instant::now();
            let results = harness.run_all(&scenarios, filter.as_deref());
            let total_time = run_start.elapsed();

            let total_passed = results.iter().filter(|r| r.passed).count();
            let total_failed = results.len() - total_passed;

            match output {
                OutputFormat::Human => print!("{}", format_human(&results)),
                OutputFormat::Json => {
                    let output = serde_json::json!({
                        "passed": total_passed,
                        "failed": total_failed,
                        "results": results,
                    });
                    match serde_json::to_string_pretty(&output) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing results: {e}");
                            std::process::exit(1);
                        }
                    }
                }
                OutputFormat::Junit => print!("{}", format_junit_xml(&results, total_time)),
            }

            if total_failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Validate { config } => {
            let config = match loader::load_config(&config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("✗ {}: {e}", config.display());
                    std::process::exit(1);
                }
            };

            let scenarios = suite::standard(&config, false);
            for scenario in &scenarios {
                println!("✓ {} ({} steps)", scenario.name, scenario.steps.len());
            }
            println!(
                "\nConfiguration valid: {} scenario(s), tool '{}'",
                scenarios.len(),
                config.tool
            );
        }
        Command::Init { path } => {
            if path.exists() {
                eprintln!("Error: file already exists: {}", path.display());
                std::process::exit(1);
            }
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
                && let Err(e) = fs::create_dir_all(parent)
            {
                eprintln!("Error creating directory: {e}");
                std::process::exit(1);
            }
            if let Err(e) = fs::write(&path, TEMPLATE) {
                eprintln!("Error writing file: {e}");
                std::process::exit(1);
            }
            println!("Created: {}", path.display());
        }
        Command::Schema => {
            let schema = schema::generate_schema();
            match serde_json::to_string_pretty(&schema) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing schema: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Explicit path, else a config file in the current directory, else defaults.
fn load(path: Option<&Path>) -> Result<HarnessConfig, loader::LoadError> {
    match path {
        Some(path) => loader::load_config(path),
        None => loader::load_config_from_dir(Path::new(".")),
    }
}

const TEMPLATE: &str = r#"version: 1

# Tool under test; ${VAR} references are expanded
tool: build_master
git: git

validator:
  program: meson
  args: [setup, build]
  # directory_flag: --directory

# Seconds per invocation, 0 disables the limit
timeout: 600

# serial: true
# sandbox_dir: local
# env:
#   PATH: /usr/local/bin:/usr/bin:/bin

fixtures:
  - url: https://github.com/ravi688/HPML.git
  - url: https://github.com/ravi688/MeshLib.git
  - url: https://github.com/ravi688/PhyMacParser.git
  - url: https://github.com/ravi688/SafeMemory.git
  - url: https://github.com/ravi688/Common.git
  - url: https://github.com/ravi688/GLSLCommon.git
  - url: https://github.com/ravi688/DiskManager.git
  - url: https://github.com/ravi688/BufferLib.git
  - url: https://github.com/ravi688/Calltrace.git
  - url: https://github.com/ravi688/ttf2mesh.git
  - url: https://github.com/ravi688/NetSocket.git
"#;

fn format_human(results: &[ScenarioResult]) -> String {
    let mut out = String::new();
    for result in results {
        let mark = if result.passed { '✓' } else { '✗' };
        let _ = writeln!(
            out,
            "  {mark} {} ({:.2?}, {}/{} steps)",
            result.name, result.duration, result.steps_run, result.steps_total
        );
        for failure in &result.failures {
            for line in failure.lines() {
                let _ = writeln!(out, "    {line}");
            }
        }
    }
    let passed = results.iter().filter(|r| r.passed).count();
    let _ = writeln!(out, "\n{passed} passed, {} failed", results.len() - passed);
    out
}

/// Format scenario results as JUnit XML.
fn format_junit_xml(results: &[ScenarioResult], total_time: Duration) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let tests = results.len();
    let failures = results.iter().filter(|r| !r.passed).count();

    let _ = writeln!(
        xml,
        "<testsuites tests=\"{tests}\" failures=\"{failures}\" time=\"{:.3}\">",
        total_time.as_secs_f64()
    );
    let _ = writeln!(
        xml,
        "  <testsuite name=\"build_master\" tests=\"{tests}\" failures=\"{failures}\" time=\"{:.3}\">",
        total_time.as_secs_f64()
    );

    for result in results {
        let _ = writeln!(
            xml,
            "    <testcase name=\"{}\" time=\"{:.3}\">",
            escape_xml(&result.name),
            result.duration.as_secs_f64()
        );

        if !result.passed {
            let message = result
                .failures
                .first()
                .and_then(|s| s.lines().next())
                .unwrap_or("Scenario failed");
            let _ = writeln!(xml, "      <failure message=\"{}\">", escape_xml(message));
            for failure in &result.failures {
                let _ = writeln!(xml, "{}", escape_xml(failure));
            }
            xml.push_str("      </failure>\n");
        }

        xml.push_str("    </testcase>\n");
    }

    xml.push_str("  </testsuite>\n");
    xml.push_str("</testsuites>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
