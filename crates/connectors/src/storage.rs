//! Object storage for best-effort result archival.
//!
//! The pipeline never propagates storage failures to the caller; they are
//! logged and swallowed at the orchestration layer. Implementations here just
//! report them as typed errors.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use quarry_error::{ErrorCode, ErrorContext, QuarryError, Result};

use crate::credentials::CredentialsProvider;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, content: &[u8], content_type: &str) -> Result<()>;
}

/// Writes objects with a plain HTTP PUT, bearer-authenticated when a
/// credentials provider is attached.
pub struct HttpObjectStore {
    base_url: String,
    client: reqwest::Client,
    credentials: Option<Arc<dyn CredentialsProvider>>,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, path: &str, content: &[u8], content_type: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(content.to_vec());

        if let Some(credentials) = &self.credentials {
            let token = credentials.access_token().await?;
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| storage_error(path, format!("PUT failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(storage_error(
                path,
                format!("PUT returned status {}", response.status()),
            ));
        }

        Ok(())
    }
}

/// Filesystem-backed store used by tests and local development.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, content: &[u8], _content_type: &str) -> Result<()> {
        let target = self.root.join(path.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(path, format!("mkdir failed: {}", e)))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| storage_error(path, format!("write failed: {}", e)))
    }
}

fn storage_error(path: &str, message: String) -> QuarryError {
    QuarryError::new(ErrorCode::StorageWriteFailed, message).with_context(ErrorContext::Storage {
        path: path.to_string(),
    })
}
