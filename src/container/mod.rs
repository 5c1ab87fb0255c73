//! Container-runtime adapter for the fixture database.

mod docker;

pub use docker::DockerCli;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Credentials baked into every fixture database.
pub const DB_USER: &str = "test";
pub const DB_PASSWORD: &str = "test";
pub const DB_NAME: &str = "testdb";

/// A running, ready database container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgContainer {
    pub container_id: String,
    /// Host port mapped to the database port.
    pub port: u16,
    pub database_url: String,
}

/// Builds the connection string for a fixture database on `port`.
pub fn database_url(port: u16) -> String {
    format!(
        "postgresql://{}:{}@localhost:{}/{}",
        DB_USER, DB_PASSWORD, port, DB_NAME
    )
}

/// Narrow operation set over the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Starts a database container named after `run_id` on an ephemeral host
    /// port and waits until it accepts connections.
    async fn start_postgres(&self, run_id: &str) -> Result<PgContainer>;

    /// Forcibly removes a container.
    async fn remove(&self, container_id: &str) -> Result<()>;
}
