//! Acquisition engine interface.
//!
//! The downloader is a black box reached over HTTP: given a locator it
//! fetches content into the shared media directory and reports progress.
//! The core never inspects its protocol; it only consumes the small
//! surface below. [`MockEngine`] is exposed for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ledger::records::Observation;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Request(String),

    #[error("engine returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("engine response malformed: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EngineError::Malformed(err.to_string())
        } else {
            EngineError::Request(err.to_string())
        }
    }
}

/// The surface the core consumes from the downloader.
#[async_trait]
pub trait AcquisitionEngine: Send + Sync {
    /// Submit a locator; returns the engine-assigned content identifier.
    async fn add_by_locator(&self, locator: &str) -> Result<String>;

    /// Snapshot of everything the engine is currently tracking.
    async fn list_active(&self) -> Result<Vec<Observation>>;

    /// Look up one tracked item; absent is not an error.
    async fn get_by_id(&self, id: &str) -> Result<Option<Observation>>;

    /// Stop downloading an item. Already-fetched data stays on disk.
    async fn cancel(&self, id: &str) -> Result<()>;

    /// Release engine resources at shutdown.
    async fn close(&self) -> Result<()>;
}

/// Wire shape of one download as the daemon reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DownloadStatus {
    id: String,
    name: String,
    locator: String,
    total_bytes: u64,
    completed_bytes: u64,
}

impl From<DownloadStatus> for Observation {
    fn from(status: DownloadStatus) -> Self {
        Observation {
            id: status.id,
            display_name: status.name,
            locator: status.locator,
            total_size: status.total_bytes,
            bytes_completed: status.completed_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
struct AddDownloadRequest<'a> {
    locator: &'a str,
}

#[derive(Debug, Deserialize)]
struct AddDownloadResponse {
    id: String,
}

/// HTTP client for the external downloader daemon.
#[derive(Clone)]
pub struct HttpAcquisitionClient {
    client: Client,
    base_url: String,
}

impl HttpAcquisitionClient {
    pub fn new(base_url: String, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .build()
            .map_err(|e| EngineError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl AcquisitionEngine for HttpAcquisitionClient {
    async fn add_by_locator(&self, locator: &str) -> Result<String> {
        let url = self.url("/api/downloads");
        let response = self
            .client
            .post(&url)
            .json(&AddDownloadRequest { locator })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EngineError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let added: AddDownloadResponse = response.json().await?;
        debug!(id = %added.id, "Engine accepted locator");
        Ok(added.id)
    }

    async fn list_active(&self) -> Result<Vec<Observation>> {
        let url = self.url("/api/downloads");
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(EngineError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let statuses: Vec<DownloadStatus> = response.json().await?;
        Ok(statuses.into_iter().map(Observation::from).collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Observation>> {
        let url = self.url(&format!("/api/downloads/{id}"));
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EngineError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let status: DownloadStatus = response.json().await?;
        Ok(Some(status.into()))
    }

    async fn cancel(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/api/downloads/{id}"));
        let response = self.client.delete(&url).send().await?;

        // Cancelling something the engine forgot is fine.
        if response.status() == reqwest::StatusCode::NOT_FOUND
            || response.status().is_success()
        {
            return Ok(());
        }
        Err(EngineError::Status {
            status: response.status().as_u16(),
            url,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory engine double for tests. Exposed (not cfg(test)) so the
/// integration tests in `tests/` can drive the full pipeline without a
/// daemon.
#[derive(Default)]
pub struct MockEngine {
    observations: Mutex<HashMap<String, Observation>>,
    added_locators: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an observation the engine will report.
    pub fn insert(&self, obs: Observation) {
        self.observations.lock().unwrap().insert(obs.id.clone(), obs);
    }

    /// Drop an observation, as if the engine forgot the item.
    pub fn forget(&self, id: &str) {
        self.observations.lock().unwrap().remove(id);
    }

    /// Locators submitted via `add_by_locator`, in order.
    pub fn added_locators(&self) -> Vec<String> {
        self.added_locators.lock().unwrap().clone()
    }

    /// Ids cancelled via `cancel`, in order.
    pub fn cancelled_ids(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl AcquisitionEngine for MockEngine {
    async fn add_by_locator(&self, locator: &str) -> Result<String> {
        self.added_locators.lock().unwrap().push(locator.to_string());

        let observations = self.observations.lock().unwrap();
        if let Some(obs) = observations.values().find(|o| o.locator == locator) {
            return Ok(obs.id.clone());
        }
        Err(EngineError::Request(format!("unknown locator: {locator}")))
    }

    async fn list_active(&self) -> Result<Vec<Observation>> {
        let mut all: Vec<Observation> =
            self.observations.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Observation>> {
        Ok(self.observations.lock().unwrap().get(id).cloned())
    }

    async fn cancel(&self, id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(id.to_string());
        self.observations.lock().unwrap().remove(id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
