//! HTTP client for the control API of a running server.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{Response, StatusCode};

use crate::hub::FileView;
use crate::lockfile::LockFile;
use crate::server::api::{RemovedCount, WatchRequest};

/// Result of asking the server to watch a path.
#[derive(Debug)]
pub enum WatchOutcome {
    Added(FileView),
    AlreadyWatched,
}

#[derive(Clone)]
pub struct ServerClient {
    client: reqwest::Client,
    base: String,
}

impl ServerClient {
    pub fn new(port: u16) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base: format!("http://localhost:{port}"),
        }
    }

    /// Client for the server recorded in the lock file.
    pub fn from_lock(lock: &LockFile) -> Result<Self> {
        let info = lock
            .read()?
            .ok_or_else(|| anyhow!("livemd is not running. Start it with `livemd start`"))?;
        Ok(Self::new(info.port))
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub async fn watch(&self, path: &Path, active: bool) -> Result<WatchOutcome> {
        let request = WatchRequest {
            path: path.display().to_string(),
            active: Some(active),
        };
        let response = self
            .client
            .post(self.url("/api/watch"))
            .json(&request)
            .send()
            .await
            .with_context(|| self.unreachable())?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(WatchOutcome::AlreadyWatched);
        }
        let response = check(response).await?;
        Ok(WatchOutcome::Added(response.json().await?))
    }

    pub async fn remove(&self, path: &Path) -> Result<()> {
        let response = self
            .client
            .delete(self.url("/api/watch"))
            .query(&[("path", path.display().to_string())])
            .send()
            .await
            .with_context(|| self.unreachable())?;
        check(response).await?;
        Ok(())
    }

    pub async fn files(&self) -> Result<Vec<FileView>> {
        let response = self
            .client
            .get(self.url("/api/files"))
            .send()
            .await
            .with_context(|| self.unreachable())?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn remove_deleted(&self) -> Result<usize> {
        let response = self
            .client
            .post(self.url("/api/files/remove-deleted"))
            .send()
            .await
            .with_context(|| self.unreachable())?;
        let count: RemovedCount = check(response).await?.json().await?;
        Ok(count.removed)
    }

    pub async fn shutdown(&self) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/shutdown"))
            .send()
            .await
            .with_context(|| self.unreachable())?;
        check(response).await?;
        Ok(())
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base)
    }

    fn unreachable(&self) -> String {
        format!("cannot reach livemd at {}", self.base)
    }
}

/// Turn a non-success response into an error carrying the server's message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(str::to_string))
        .unwrap_or(body);
    bail!("server returned {status}: {message}")
}
