//! The standard suite against scripted stand-ins for build_master.

mod common;

use bmtest::runner::{Harness, ScenarioResult};
use bmtest::schema::SandboxDir;
use bmtest::suite;
use common::Stand;
use std::fs;

fn by_name<'a>(results: &'a [ScenarioResult], name: &str) -> &'a ScenarioResult {
    results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no result named {name}"))
}

#[test]
fn test_standard_suite_passes_against_conforming_tool() {
    let stand = Stand::new();
    stand.add_fixture("HPML");
    stand.add_fixture("Calltrace");
    let config = stand.config(&["HPML", "Calltrace"]);

    let scenarios = suite::standard(&config, false);
    let results = Harness::new(config).run_all(&scenarios, None);

    assert_eq!(results.len(), 12);
    for result in &results {
        assert!(
            result.passed,
            "{} failed: {:?}",
            result.name, result.failures
        );
        assert_eq!(result.steps_run, result.steps_total, "{}", result.name);
    }
}

#[test]
fn test_missing_fixture_fails_only_its_scenario() {
    let stand = Stand::new();
    stand.add_fixture("HPML");
    let config = stand.config(&["HPML", "NetSocket"]);

    let scenarios = suite::standard(&config, false);
    let results = Harness::new(config).run_all(&scenarios, Some("external/"));

    assert_eq!(results.len(), 2);
    assert!(by_name(&results, "external/HPML").passed);
    let missing = by_name(&results, "external/NetSocket");
    assert!(!missing.passed);
    assert_eq!(missing.steps_run, 1);
    assert!(missing.failures[0].contains("not found"), "{:?}", missing.failures);
}

#[test]
fn test_skip_external() {
    let stand = Stand::new();
    let config = stand.config(&["HPML"]);
    let scenarios = suite::standard(&config, true);
    assert!(scenarios.iter().all(|s| !s.name.starts_with("external/")));
}

#[test]
fn test_stderr_noise_fails_version_and_init() {
    // Warn on stderr for every command, otherwise conforming.
    let noisy = common::BUILD_MASTER.replacen(
        "cmd=\"$1\"",
        "echo 'warning: deprecated' >&2\ncmd=\"$1\"",
        1,
    );
    let stand = Stand::with_tool(&noisy);
    let config = stand.config(&[]);
    let scenarios = suite::standard(&config, true);
    let results = Harness::new(config).run_all(&scenarios, None);

    let version = by_name(&results, "version");
    assert!(!version.passed);
    assert!(version.failures[0].contains("warning: deprecated"));
    assert!(!by_name(&results, "init/c").passed);
    // Only exit codes matter here.
    assert!(by_name(&results, "regenerate/missing-manifest").passed);
}

#[test]
fn test_tool_writing_both_variants_fails_init() {
    let sloppy = common::BUILD_MASTER.replacen(
        ": > \"$dir/source/main.$s\"",
        ": > \"$dir/source/main.c\"\n        : > \"$dir/source/main.cpp\"",
        1,
    );
    let stand = Stand::with_tool(&sloppy);
    let config = stand.config(&[]);
    let scenarios = suite::standard(&config, true);
    let results = Harness::new(config).run_all(&scenarios, Some("init/c"));

    for result in &results {
        assert!(!result.passed, "{} should fail", result.name);
        assert!(
            result.failures[0].contains("source/main.c"),
            "{:?}",
            result.failures
        );
    }
}

#[test]
fn test_overwriting_tool_fails_refusal_scenario() {
    let careless = common::BUILD_MASTER.replacen(
        "[ \"$force\" -eq 0 ]; then\n            echo \"Error: $dir",
        "false; then\n            echo \"Error: $dir",
        1,
    );
    assert_ne!(careless, common::BUILD_MASTER);
    let stand = Stand::with_tool(&careless);
    let config = stand.config(&[]);
    let scenarios = suite::standard(&config, true);
    let results = Harness::new(config).run_all(&scenarios, Some("refuses-overwrite"));

    assert_eq!(results.len(), 1);
    assert!(!results[0].passed);
    assert_eq!(results[0].steps_run, 2);
    assert!(results[0].failures[0].contains("Step 2"));
}

#[test]
fn test_version_format_is_enforced() {
    let wrong = common::BUILD_MASTER.replacen("Build Master 1.4.2", "build_master v1.4", 1);
    let stand = Stand::with_tool(&wrong);
    let config = stand.config(&[]);
    let scenarios = suite::standard(&config, true);
    let results = Harness::new(config).run_all(&scenarios, Some("version"));
    assert!(!results[0].passed);
    assert!(results[0].failures[0].contains("build_master v1.4"));
}

#[test]
fn test_sandboxes_are_removed_after_suite() {
    let stand = Stand::new();
    let base = tempfile::tempdir().unwrap();
    let mut config = stand.config(&[]);
    config.sandbox_dir = Some(SandboxDir::Path(base.path().join("sandboxes")));

    let scenarios = suite::standard(&config, true);
    let results = Harness::new(config).run_all(&scenarios, None);
    assert!(results.iter().all(|r| r.passed), "{results:?}");

    let leftovers = fs::read_dir(base.path().join("sandboxes")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_serial_and_parallel_agree() {
    let stand = Stand::new();
    let config = stand.config(&[]);
    let scenarios = suite::standard(&config, true);

    let parallel = Harness::new(config.clone()).run_all(&scenarios, None);
    let serial = Harness::new(bmtest::HarnessConfig {
        serial: true,
        ..config
    })
    .run_all(&scenarios, None);

    let summarize = |results: &[ScenarioResult]| {
        results
            .iter()
            .map(|r| (r.name.clone(), r.passed, r.steps_run))
            .collect::<Vec<_>>()
    };
    assert_eq!(summarize(&parallel), summarize(&serial));
}
