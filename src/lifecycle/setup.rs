//! Forward provisioning sequence.

use std::collections::BTreeMap;

use crate::config::HarnessConfig;
use crate::container::ContainerRuntime;
use crate::credentials::write_mcp_config;
use crate::error::{Error, Result};
use crate::fixture::{FixturePlan, RunStamp};
use crate::manifest::{Manifest, ManifestIssue, ManifestStore};
use crate::scaffold::{default_injections, Scaffolder};
use crate::scm::SourceControl;
use crate::tracker::{IssueTracker, NewIssue, StateKind, TrackedIssue};

/// Everything setup needs.
pub struct SetupContext<'a> {
    pub config: &'a HarnessConfig,
    pub store: &'a ManifestStore,
    pub tracker: &'a dyn IssueTracker,
    pub scm: &'a dyn SourceControl,
    pub containers: &'a dyn ContainerRuntime,
}

/// Provisions `plan` and returns the final manifest.
///
/// The manifest is written after every step that creates a resource. If a
/// step fails, the manifest on disk lists exactly what teardown must remove.
pub async fn setup(ctx: &SetupContext<'_>, plan: &FixturePlan, stamp: RunStamp) -> Result<Manifest> {
    let api_key = ctx.config.api_key()?;
    if ctx.store.exists() {
        return Err(Error::ManifestExists(ctx.store.path().to_path_buf()));
    }

    tracing::info!("resolving team");
    let team = ctx.tracker.resolve_team(ctx.config.team_key.as_deref()).await?;
    tracing::info!(team = %team.key, id = %team.id, "resolved team");

    let backlog = ctx.tracker.state_id(&team.id, StateKind::Backlog).await?;
    if backlog.is_none() {
        tracing::warn!("no backlog state found, using team default");
    }

    let project_name = plan.project_name(&stamp);
    tracing::info!(name = %project_name, "creating project");
    let project = ctx
        .tracker
        .create_project(
            &project_name,
            &plan.project_content().unwrap_or_default(),
            &team.id,
        )
        .await?;

    let mut manifest = Manifest {
        created_at: stamp.0,
        project_id: project.id.clone(),
        project_name,
        team_id: team.id.clone(),
        team_key: team.key,
        issues: Vec::with_capacity(plan.issues.len()),
        dependency_map: plan.dependency_map(),
        waves: plan.wave_map(),
        test_repo_path: ctx.config.repos_dir().join(stamp.repo_dir_name()),
        github_repo: None,
        pg_container_id: None,
        database_url: None,
    };
    ctx.store.create(&manifest)?;
    tracing::info!(path = ?ctx.store.path(), "wrote manifest");

    let mut created: BTreeMap<&str, TrackedIssue> = BTreeMap::new();
    for def in &plan.issues {
        let issue = ctx
            .tracker
            .create_issue(&NewIssue {
                title: def.title.clone(),
                description: def.description.clone(),
                team_id: team.id.clone(),
                project_id: project.id.clone(),
                priority: def.priority,
                state_id: backlog.clone(),
            })
            .await?;
        tracing::info!(key = %def.key, issue = %issue.identifier, title = %def.title, "created issue");

        manifest.issues.push(ManifestIssue {
            key: def.key.clone(),
            id: issue.id.clone(),
            identifier: issue.identifier.clone(),
            title: def.title.clone(),
            wave: def.wave,
            blocked_by_keys: def.blocked_by_keys.clone(),
        });
        ctx.store.write(&manifest)?;
        created.insert(&def.key, issue);
    }

    for def in &plan.issues {
        for blocker_key in &def.blocked_by_keys {
            let (Some(blocked), Some(blocker)) =
                (created.get(def.key.as_str()), created.get(blocker_key.as_str()))
            else {
                return Err(Error::Config(format!(
                    "{} is blocked by unknown issue {}",
                    def.key, blocker_key
                )));
            };
            ctx.tracker
                .create_blocks_relation(&blocked.id, &blocker.id)
                .await?;
            tracing::info!(
                blocker = %blocker.identifier,
                blocked = %blocked.identifier,
                "created blocks relation"
            );
        }
    }

    if plan.needs_db() {
        tracing::info!("starting database container");
        let pg = ctx.containers.start_postgres(&stamp.slug()).await?;
        manifest.pg_container_id = Some(pg.container_id);
        manifest.database_url = Some(pg.database_url);
        ctx.store.write(&manifest)?;
    }

    let repo_dir = manifest.test_repo_path.clone();
    std::fs::create_dir_all(ctx.config.repos_dir())?;

    let remote = plan.provisions_remote();
    let mut scaffolder = Scaffolder::new(ctx.config.fixtures_dir());
    if remote {
        scaffolder = scaffolder
            .with_injections(default_injections())
            .with_install_command(ctx.config.install_command.clone());
    }

    tracing::info!(repo = ?repo_dir, "scaffolding repository");
    scaffolder.copy_template(&repo_dir)?;
    if let Some(url) = &manifest.database_url {
        scaffolder.write_env(&repo_dir, url)?;
    }
    scaffolder.install(&repo_dir)?;
    scaffolder.commit(&repo_dir)?;

    if remote {
        let name = stamp.remote_repo_name();
        tracing::info!(org = %ctx.config.github_org, name = %name, "creating remote repository");
        let full_name = ctx
            .scm
            .create_repo(&ctx.config.github_org, &name, &repo_dir)?;
        manifest.github_repo = Some(full_name.clone());
        ctx.store.write(&manifest)?;

        tracing::info!(repo = %full_name, "pushing initial commit");
        ctx.scm.push(&full_name, &repo_dir)?;

        // After the initial commit so the key never enters history.
        write_mcp_config(&repo_dir, api_key)?;
    }

    tracing::info!(
        project = %manifest.project_name,
        issues = manifest.issues.len(),
        repo = ?manifest.test_repo_path,
        "setup complete"
    );
    Ok(manifest)
}
