//! Object-storage gateway client
//!
//! Thin HTTP adapter for the S3-compatible gateway that stores snippet
//! files, with every call routed through the dependency's resilience
//! manager. Bucket and credentials are explicit construction-time fields;
//! nothing is read from globals.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use snipvault_common::resilience::{Clock, OperationError, ResilienceManager, SystemClock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::errors::{InfraError, InfraResult};
use crate::managed::run_managed;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Non-success answer from the gateway, carried as the operation's own
/// error through the resilience taxonomy.
#[derive(Debug, Error)]
#[error("storage gateway returned {status}: {message}")]
pub struct GatewayError {
    /// HTTP status the gateway answered with.
    pub status: StatusCode,
    /// Response body, truncated by the gateway itself.
    pub message: String,
}

/// One entry in a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectEntry {
    /// Object key within the bucket.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    objects: Vec<ObjectEntry>,
}

/// Resilience-managed client for the object-storage gateway.
pub struct StorageClient<C: Clock = SystemClock> {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    access_token: Option<String>,
    manager: Arc<ResilienceManager<C>>,
}

impl<C: Clock> StorageClient<C> {
    /// Build a client from validated configuration.
    pub fn new(config: StorageConfig, manager: Arc<ResilienceManager<C>>) -> InfraResult<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(InfraError::Config("storage endpoint must not be empty".into()));
        }
        if config.bucket.trim().is_empty() {
            return Err(InfraError::Config("storage bucket must not be empty".into()));
        }

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            bucket: config.bucket,
            access_token: config.access_token,
            manager,
        })
    }

    /// Create the configured bucket if it does not exist yet.
    ///
    /// An already-existing bucket (409) counts as success.
    pub async fn ensure_bucket(&self, caller: &CancellationToken) -> InfraResult<()> {
        let url = self.bucket_url();
        let http = self.http.clone();
        let token = self.access_token.clone();
        run_managed(&self.manager, caller, move || {
            let request = with_token(http.put(&url), token.as_deref());
            async move {
                let response = request.send().await?;
                if response.status() == StatusCode::CONFLICT {
                    return Ok(());
                }
                check_status(response).await?;
                Ok(())
            }
        })
        .await?;
        info!(bucket = %self.bucket, "storage bucket ready");
        Ok(())
    }

    /// Store an object under `key`, replacing any previous content.
    pub async fn put_object(
        &self,
        caller: &CancellationToken,
        key: &str,
        bytes: Vec<u8>,
    ) -> InfraResult<()> {
        let url = self.object_url(key);
        let http = self.http.clone();
        let token = self.access_token.clone();
        debug!(key, size = bytes.len(), "storing object");
        run_managed(&self.manager, caller, move || {
            let request = with_token(http.put(&url), token.as_deref()).body(bytes.clone());
            async move {
                check_status(request.send().await?).await?;
                Ok(())
            }
        })
        .await?;
        Ok(())
    }

    /// Fetch an object's content.
    pub async fn get_object(&self, caller: &CancellationToken, key: &str) -> InfraResult<Vec<u8>> {
        let url = self.object_url(key);
        let http = self.http.clone();
        let token = self.access_token.clone();
        let bytes = run_managed(&self.manager, caller, move || {
            let request = with_token(http.get(&url), token.as_deref());
            async move {
                let response = check_status(request.send().await?).await?;
                let body = response.bytes().await?;
                Ok(body.to_vec())
            }
        })
        .await?;
        Ok(bytes)
    }

    /// Delete an object. Deleting an absent key is not an error at the
    /// gateway; its answer is passed through as-is.
    pub async fn remove_object(&self, caller: &CancellationToken, key: &str) -> InfraResult<()> {
        let url = self.object_url(key);
        let http = self.http.clone();
        let token = self.access_token.clone();
        debug!(key, "removing object");
        run_managed(&self.manager, caller, move || {
            let request = with_token(http.delete(&url), token.as_deref());
            async move {
                check_status(request.send().await?).await?;
                Ok(())
            }
        })
        .await?;
        Ok(())
    }

    /// List objects in the bucket, optionally restricted to a key prefix.
    pub async fn list_objects(
        &self,
        caller: &CancellationToken,
        prefix: Option<&str>,
    ) -> InfraResult<Vec<ObjectEntry>> {
        let url = self.bucket_url();
        let http = self.http.clone();
        let token = self.access_token.clone();
        let prefix = prefix.map(str::to_string);
        let entries = run_managed(&self.manager, caller, move || {
            let mut request = with_token(http.get(&url), token.as_deref());
            if let Some(prefix) = &prefix {
                request = request.query(&[("prefix", prefix.as_str())]);
            }
            async move {
                let response = check_status(request.send().await?).await?;
                let listing: ListResponse = response.json().await?;
                Ok(listing.objects)
            }
        })
        .await?;
        Ok(entries)
    }

    /// The manager guarding this dependency.
    pub fn manager(&self) -> &ResilienceManager<C> {
        &self.manager
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.base_url, self.bucket)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.bucket, key)
    }
}

fn with_token(request: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Map a non-success status into a [`GatewayError`], carrying the body as
/// the message.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OperationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Box::new(GatewayError { status, message }))
}

#[cfg(test)]
mod tests {
    use snipvault_common::resilience::{MockClock, ResilienceConfig};

    use super::*;

    fn test_manager() -> Arc<ResilienceManager<MockClock>> {
        Arc::new(
            ResilienceManager::with_clock(ResilienceConfig::default(), MockClock::new())
                .expect("manager"),
        )
    }

    fn config() -> StorageConfig {
        StorageConfig {
            endpoint: "localhost:9000".into(),
            bucket: "snippets".into(),
            access_token: None,
            use_tls: false,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn builds_object_urls() {
        let client = StorageClient::new(config(), test_manager()).expect("client");
        assert_eq!(client.bucket_url(), "http://localhost:9000/snippets");
        assert_eq!(client.object_url("a1b2/readme.md"), "http://localhost:9000/snippets/a1b2/readme.md");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_empty_endpoint_and_bucket() {
        let mut bad = config();
        bad.endpoint = "  ".into();
        assert!(matches!(
            StorageClient::new(bad, test_manager()),
            Err(InfraError::Config(_))
        ));

        let mut bad = config();
        bad.bucket = String::new();
        assert!(matches!(
            StorageClient::new(bad, test_manager()),
            Err(InfraError::Config(_))
        ));
    }
}
