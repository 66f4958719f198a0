//! The standard acceptance suite for the build tool.

use crate::scenario::{InitOptions, RegenerateOptions, Scenario, ScenarioBuilder, Variant};
use crate::schema::HarnessConfig;

/// Directory used by the explicit-directory `init` variants, relative to the sandbox.
pub const TARGET_DIRECTORY: &str = "out/project";

/// Build the standard scenarios in their canonical order.
///
/// External fixture scenarios follow the local ones, one per configured
/// fixture, unless `skip_external` is set.
pub fn standard(config: &HarnessConfig, skip_external: bool) -> Vec<Scenario> {
    let c = InitOptions::default();
    let cpp = InitOptions::default().with_variant(Variant::Cpp);

    let mut scenarios = vec![
        ScenarioBuilder::new("version")
            .describe("--version reports the semantic version and build type")
            .version()
            .build(),
        init_scenario("init/c", &c),
        init_scenario("init/cpp", &cpp),
        init_scenario("init/c/directory", &c.clone().with_directory(TARGET_DIRECTORY)),
        init_scenario(
            "init/cpp/directory",
            &cpp.clone().with_directory(TARGET_DIRECTORY),
        ),
        ScenarioBuilder::new("regenerate/forced-twice")
            .describe("Forced regeneration is repeatable")
            .init(&c)
            .regenerate(&c.regenerate())
            .discard_validation(&c.regenerate())
            .regenerate(&c.regenerate())
            .build(),
        ScenarioBuilder::new("regenerate/unforced")
            .describe("Regeneration without --force succeeds on a fresh project")
            .init(&c)
            .regenerate(&RegenerateOptions {
                force: false,
                ..c.regenerate()
            })
            .build(),
        ScenarioBuilder::new("init/after-clear")
            .describe("init succeeds again once the sandbox has been emptied")
            .init(&c)
            .clear_sandbox()
            .init(&c)
            .build(),
        ScenarioBuilder::new("init/refuses-overwrite")
            .describe("init refuses to overwrite a manifest unless forced")
            .init(&c)
            .init_refused(&c)
            .init(&c.clone().forced())
            .build(),
        ScenarioBuilder::new("regenerate/missing-manifest")
            .describe("Regeneration fails without a manifest")
            .regenerate_refused(&RegenerateOptions {
                force: true,
                directory: None,
            })
            .build(),
    ];

    if !skip_external {
        scenarios.extend(config.fixtures.iter().map(|fixture| {
            ScenarioBuilder::new(format!("external/{}", fixture.display_name()))
                .describe(format!("Regenerate and validate {}", fixture.url))
                .clone_fixture(fixture.url.clone())
                .regenerate(&RegenerateOptions {
                    force: true,
                    directory: None,
                })
                .build()
        }));
    }

    scenarios
}

/// `init` then forced regeneration of the same target.
fn init_scenario(name: &str, opts: &InitOptions) -> Scenario {
    ScenarioBuilder::new(name)
        .describe(format!(
            "init creates the {} skeleton and a valid meson.build",
            opts.variant.label()
        ))
        .init(opts)
        .regenerate(&opts.regenerate())
        .build()
}
