//! Plugin Fixture Harness - end-to-end fixtures for agent plugins
//!
//! This library provisions ephemeral tracker issues, a database container, a
//! scaffolded repository and its remote, runs an autonomous agent against
//! them, verifies what the agent did, and tears every resource down again
//! from a single manifest file.

pub mod config;
pub mod container;
pub mod credentials;
pub mod env;
pub mod error;
pub mod fixture;
pub mod git;
pub mod lifecycle;
pub mod manifest;
pub mod poll;
pub mod runner;
pub mod scaffold;
pub mod scm;
pub mod tracker;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{HarnessConfig, Validate, ValidationResult};
pub use container::{ContainerRuntime, DockerCli, PgContainer};
pub use error::{Error, Result};
pub use fixture::{Catalog, FixtureKind, FixturePlan, FixtureSelector, IssueDef, RunStamp};
pub use lifecycle::{
    run_agent, setup, teardown, SetupContext, StepOutcome, TeardownContext, TeardownReport,
    TeardownStep,
};
pub use manifest::{Manifest, ManifestIssue, ManifestStore};
pub use poll::{poll_until, PollOptions};
pub use runner::{
    parse_terminal_result, AgentRunConfig, AgentRunResult, AgentRunner, ClaudeRunner,
    TerminalResult,
};
pub use scm::{GhCli, SourceControl};
pub use tracker::{IssueTracker, LinearClient};
pub use verify::{Check, VerificationReport, Verifier};
