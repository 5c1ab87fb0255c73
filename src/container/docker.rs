//! Docker CLI implementation of [`ContainerRuntime`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::poll::{poll_until, PollOptions};

use super::{database_url, ContainerRuntime, PgContainer, DB_NAME, DB_PASSWORD, DB_USER};

const PG_PORT: &str = "5432";
const DEFAULT_IMAGE: &str = "postgres:16-alpine";

/// Runs containers through the `docker` CLI.
pub struct DockerCli {
    cli_path: String,
    image: String,
    ready_timeout: Duration,
    ready_interval: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Creates an adapter using `docker` and the default database image.
    pub fn new() -> Self {
        Self {
            cli_path: "docker".to_string(),
            image: DEFAULT_IMAGE.to_string(),
            ready_timeout: Duration::from_secs(30),
            ready_interval: Duration::from_secs(1),
        }
    }

    /// Sets the CLI binary.
    pub fn with_cli_path(mut self, cli_path: impl Into<String>) -> Self {
        self.cli_path = cli_path.into();
        self
    }

    /// Sets the database image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Sets the readiness deadline.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    async fn docker(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.cli_path)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Container(format!("failed to run docker: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Container(format!(
                "docker {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Resolves the published port and waits for the database to accept connections.
    async fn await_ready(&self, container_id: &str) -> Result<u16> {
        let port_output = self.docker(&["port", container_id, PG_PORT]).await?;
        let port = parse_host_port(&port_output).ok_or_else(|| {
            Error::Container(format!("unexpected docker port output: {}", port_output))
        })?;

        let opts = PollOptions::new("database to become ready")
            .with_interval(self.ready_interval)
            .with_timeout(self.ready_timeout);
        poll_until(|| self.is_ready(container_id), |ready| *ready, &opts).await?;
        Ok(port)
    }

    async fn is_ready(&self, container_id: &str) -> bool {
        self.docker(&["exec", container_id, "pg_isready", "-U", DB_USER, "-d", DB_NAME])
            .await
            .is_ok()
    }
}

/// Extracts the host port from `docker port` output such as `0.0.0.0:49153`.
pub(crate) fn parse_host_port(output: &str) -> Option<u16> {
    let first = output.lines().next()?.trim();
    first.rsplit(':').next()?.trim().parse().ok()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start_postgres(&self, run_id: &str) -> Result<PgContainer> {
        let name = format!("test-pg-{}", run_id);
        let user = format!("POSTGRES_USER={}", DB_USER);
        let password = format!("POSTGRES_PASSWORD={}", DB_PASSWORD);
        let db = format!("POSTGRES_DB={}", DB_NAME);
        let publish = format!("0:{}", PG_PORT);

        tracing::info!(name = %name, image = %self.image, "starting database container");
        let container_id = self
            .docker(&[
                "run", "-d", "--name", &name, "-e", &user, "-e", &password, "-e", &db, "-p",
                &publish, &self.image,
            ])
            .await?;

        match self.await_ready(&container_id).await {
            Ok(port) => {
                tracing::info!(container = %container_id, port, "database ready");
                Ok(PgContainer {
                    database_url: database_url(port),
                    container_id,
                    port,
                })
            }
            Err(e) => {
                // The caller never sees this id, so it cannot clean up.
                if let Err(rm) = self.remove(&container_id).await {
                    tracing::warn!(container = %container_id, error = %rm, "failed to remove container");
                }
                Err(e)
            }
        }
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        self.docker(&["rm", "-f", container_id]).await?;
        tracing::info!(container = %container_id, "removed container");
        Ok(())
    }
}
