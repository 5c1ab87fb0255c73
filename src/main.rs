//! Plugin Fixture Harness CLI
//!
//! Provisions, runs against, and tears down end-to-end test fixtures.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use fixture_harness::credentials::Redactor;
use fixture_harness::env::{load_env_file, ENV_FILE_NAME};
use fixture_harness::{
    run_agent, setup, teardown, Catalog, ClaudeRunner, DockerCli, FixtureSelector, GhCli,
    HarnessConfig, LinearClient, ManifestStore, Result, RunStamp, SetupContext, StepOutcome,
    TeardownContext, Validate, Verifier,
};

#[derive(Parser)]
#[command(name = "fixture-harness", version, about = "End-to-end fixtures for agent plugins")]
struct Cli {
    /// Test suite root holding the manifest, fixtures and scaffolded repos.
    #[arg(long, global = true, default_value = "tests")]
    tests_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision a fixture and write the manifest.
    Setup {
        /// Single-issue fixture key (default S).
        #[arg(long, conflicts_with = "project")]
        issue: Option<String>,

        /// Provision the full multi-wave project instead of one issue.
        #[arg(long)]
        project: bool,
    },
    /// Remove every resource listed in the manifest.
    Teardown,
    /// Run the agent against the provisioned fixture and verify its effects.
    Run,
    /// Print the current manifest.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if e.is_precondition() {
                eprintln!("ERROR: {}", e);
            } else {
                tracing::error!(error = %e, "command failed");
            }
            ExitCode::FAILURE
        }
    }
}

/// Runs one command; `Ok(false)` means it completed but reported failures.
async fn run(cli: Cli) -> Result<bool> {
    load_env_file(&cli.tests_dir.join(ENV_FILE_NAME))?;

    let config = HarnessConfig::load(&cli.tests_dir)?;
    for warning in config.validate().into_result()? {
        tracing::warn!("{}", warning);
    }

    let store = ManifestStore::new(&config.tests_dir);

    match cli.command {
        Command::Setup { issue, project } => {
            let selector = if project {
                FixtureSelector::Project
            } else {
                FixtureSelector::Single(issue)
            };

            let catalog = Catalog::builtin()?;
            catalog.validate().into_result()?;
            let plan = catalog.plan(&selector)?;

            let tracker = LinearClient::new(config.api_key()?);
            let containers = DockerCli::new()
                .with_image(&config.database_image)
                .with_ready_timeout(config.db_ready_timeout_duration());
            let scm = GhCli::new();
            let ctx = SetupContext {
                config: &config,
                store: &store,
                tracker: &tracker,
                scm: &scm,
                containers: &containers,
            };

            match setup(&ctx, &plan, RunStamp::now()).await {
                Ok(manifest) => {
                    println!("Setup complete!");
                    println!("  Project: {}", manifest.project_name);
                    for issue in &manifest.issues {
                        println!("  {}: {} - {}", issue.key, issue.identifier, issue.title);
                    }
                    println!("  Repo: {}", manifest.test_repo_path.display());
                    if let Some(repo) = &manifest.github_repo {
                        println!("  GitHub: https://github.com/{}", repo);
                    }
                    Ok(true)
                }
                Err(e) => {
                    if store.exists() {
                        eprintln!("Setup failed partway; run `fixture-harness teardown` to clean up.");
                    }
                    Err(e)
                }
            }
        }
        Command::Teardown => {
            let tracker = LinearClient::new(config.api_key()?);
            let scm = GhCli::new();
            let containers = DockerCli::new();
            let ctx = TeardownContext {
                store: &store,
                tracker: &tracker,
                scm: &scm,
                containers: &containers,
            };

            let report = teardown(&ctx).await?;
            for (step, outcome) in &report.steps {
                match outcome {
                    StepOutcome::Done(msg) => println!("  {}: {}", step, msg),
                    StepOutcome::Skipped(msg) => println!("  {}: skipped ({})", step, msg),
                    StepOutcome::Failed(msg) => println!("  {}: WARNING {}", step, msg),
                }
            }
            println!("Teardown complete!");
            Ok(true)
        }
        Command::Run => {
            let api_key = config.api_key()?;
            let manifest = store.read()?;
            let runner = ClaudeRunner::with_cli_path(&config.agent_cli)
                .with_redactor(Redactor::new().with_secret("LINEAR_API_KEY", api_key));

            let result = run_agent(&config, &manifest, &runner).await?;
            println!(
                "Agent finished in {}s (exit code {:?})",
                result.duration.as_secs(),
                result.exit_code
            );
            if let Some(terminal) = &result.terminal {
                println!("  is_error: {}", terminal.is_error);
                if let Some(cost) = terminal.total_cost_usd {
                    println!("  cost_usd: ${:.2}", cost);
                }
                if let Some(turns) = terminal.num_turns {
                    println!("  num_turns: {}", turns);
                }
            } else {
                println!("  WARNING: could not parse a result record from agent output");
            }

            let tracker = LinearClient::new(api_key);
            let scm = GhCli::new();
            let report = Verifier::new(&tracker, &scm).verify(&manifest, &result).await?;
            for check in &report.checks {
                println!("{}", check);
            }
            Ok(report.all_passed())
        }
        Command::Status => {
            if !store.exists() {
                println!("No fixture provisioned.");
                return Ok(true);
            }
            let manifest = store.read()?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            Ok(true)
        }
    }
}
