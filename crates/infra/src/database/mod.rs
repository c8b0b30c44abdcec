//! Postgres client wrapper
//!
//! Owns a single `tokio_postgres` connection and routes every statement
//! through the dependency's resilience manager. The bootstrap connect+ping is
//! itself a managed operation, so a database that is down at startup goes
//! through the same recovery path as one that fails later.

use std::future::Future;
use std::sync::Arc;

use snipvault_common::resilience::{Clock, OperationError, ResilienceManager, SystemClock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::InfraResult;
use crate::managed::run_managed;

/// Resilience-managed Postgres client.
pub struct DatabaseClient<C: Clock = SystemClock> {
    client: Arc<tokio_postgres::Client>,
    manager: Arc<ResilienceManager<C>>,
}

impl<C: Clock> DatabaseClient<C> {
    /// Connect to Postgres under the manager.
    ///
    /// Each bootstrap attempt opens a fresh connection, spawns its driver
    /// task, and pings with a trivial statement; failed attempts feed the
    /// manager's failure counter like any other operation.
    pub async fn connect(
        database_url: &str,
        manager: Arc<ResilienceManager<C>>,
    ) -> InfraResult<Self> {
        let url = database_url.to_string();
        let client = run_managed(&manager, &CancellationToken::new(), move || {
            let url = url.clone();
            async move {
                let (client, connection) =
                    tokio_postgres::connect(&url, tokio_postgres::NoTls).await?;
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        warn!(error = %err, "postgres connection driver exited with error");
                    }
                });
                client.batch_execute("SELECT 1").await?;
                Ok::<_, OperationError>(Arc::new(client))
            }
        })
        .await?;

        info!("database connection established");
        Ok(Self { client, manager })
    }

    /// Run a statement closure under the manager.
    ///
    /// The closure receives the shared client and may be invoked more than
    /// once by the recovery loop; repository callers keep their SQL
    /// idempotent or parameterized accordingly.
    pub async fn with_retry<T, F, Fut>(
        &self,
        caller: &CancellationToken,
        statement: F,
    ) -> InfraResult<T>
    where
        T: Send + 'static,
        F: Fn(Arc<tokio_postgres::Client>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, tokio_postgres::Error>> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let value = run_managed(&self.manager, caller, move || {
            let work = statement(Arc::clone(&client));
            async move { work.await.map_err(|err| Box::new(err) as OperationError) }
        })
        .await?;
        Ok(value)
    }

    /// Cheap liveness check through the managed path.
    pub async fn ping(&self, caller: &CancellationToken) -> InfraResult<()> {
        self.with_retry(caller, |client| async move {
            client.batch_execute("SELECT 1").await
        })
        .await
    }

    /// The manager guarding this dependency.
    pub fn manager(&self) -> &ResilienceManager<C> {
        &self.manager
    }
}
