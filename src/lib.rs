//! Black-box acceptance harness for the `build_master` build-configuration
//! generator.
//!
//! Every scenario runs the tool as a subprocess inside its own throwaway
//! sandbox and checks only observable effects: exit codes, captured output
//! and the files left behind.

pub mod assertions;
pub mod env;
pub mod error;
pub mod inspect;
pub mod loader;
pub mod logging;
pub mod process;
pub mod runner;
pub mod sandbox;
pub mod scenario;
pub mod schema;
pub mod suite;

pub use error::{AssertionFailure, HarnessError, Result};
pub use runner::{Harness, ScenarioResult};
pub use scenario::{Scenario, ScenarioBuilder};
pub use schema::HarnessConfig;
