//! User configuration document with debounced persistence.
//!
//! [`ConfigStore`] owns the current configuration record. `save` updates it
//! right away and hands the content to a background task that waits for the
//! edits to settle before persisting the latest content through a
//! [`ConfigBackend`]. Rapid saves coalesce into a single write.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, warn};

use gatelink_core::transport::BoxFuture;

/// Default quiet period before a save is persisted.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Errors from persisting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("config request failed: {0}")]
    Http(String),

    #[error("bad config response: {0}")]
    Decode(String),

    #[error("config store stopped")]
    Stopped,
}

/// A stored configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub id: u64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

/// Where configuration content is persisted.
pub trait ConfigBackend: Send + Sync {
    /// Store `content` as the new body of config `id`; returns the updated record.
    fn persist<'a>(
        &'a self,
        id: u64,
        content: &'a str,
    ) -> BoxFuture<'a, Result<ConfigRecord, ConfigError>>;
}

/// Persists configuration through the account API.
///
/// Issues `PATCH {api_base}/api/1/configs/{id}` with `{"content": ...}`.
#[derive(Debug, Clone)]
pub struct HttpConfigBackend {
    client: reqwest::Client,
    api_base: String,
}

impl HttpConfigBackend {
    pub fn new(api_base: &str) -> Self {
        Self::with_client(reqwest::Client::new(), api_base)
    }

    pub fn with_client(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, id: u64) -> String {
        format!("{}/api/1/configs/{}", self.api_base, id)
    }
}

impl ConfigBackend for HttpConfigBackend {
    fn persist<'a>(
        &'a self,
        id: u64,
        content: &'a str,
    ) -> BoxFuture<'a, Result<ConfigRecord, ConfigError>> {
        Box::pin(async move {
            let response = self
                .client
                .patch(self.endpoint(id))
                .json(&serde_json::json!({ "content": content }))
                .send()
                .await
                .map_err(|e| ConfigError::Http(e.to_string()))?
                .error_for_status()
                .map_err(|e| ConfigError::Http(e.to_string()))?;

            response
                .json::<ConfigRecord>()
                .await
                .map_err(|e| ConfigError::Decode(e.to_string()))
        })
    }
}

enum Update {
    Save(String),
    Flush(oneshot::Sender<Result<(), ConfigError>>),
}

/// Owner of the user's configuration document.
///
/// Must be created inside a Tokio runtime. Dropping the store persists any
/// pending content before the background task exits.
pub struct ConfigStore {
    record: Arc<Mutex<ConfigRecord>>,
    updates: mpsc::UnboundedSender<Update>,
}

impl ConfigStore {
    pub fn new(record: ConfigRecord, backend: Arc<dyn ConfigBackend>) -> Self {
        Self::with_debounce(record, backend, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(
        record: ConfigRecord,
        backend: Arc<dyn ConfigBackend>,
        debounce: Duration,
    ) -> Self {
        let record = Arc::new(Mutex::new(record));
        let (updates, rx) = mpsc::unbounded_channel();
        tokio::spawn(autosave_loop(rx, record.clone(), backend, debounce));
        Self { record, updates }
    }

    /// Current configuration content.
    pub fn load(&self) -> String {
        lock(&self.record).content.clone()
    }

    /// Current configuration record.
    pub fn record(&self) -> ConfigRecord {
        lock(&self.record).clone()
    }

    /// Replace the content and schedule it to be persisted.
    pub fn save(&self, content: impl Into<String>) {
        let content = content.into();
        lock(&self.record).content = content.clone();
        if self.updates.send(Update::Save(content)).is_err() {
            warn!("config autosave task is gone, save not persisted");
        }
    }

    /// Persist pending content now instead of waiting for the debounce.
    pub async fn flush(&self) -> Result<(), ConfigError> {
        let (tx, rx) = oneshot::channel();
        self.updates
            .send(Update::Flush(tx))
            .map_err(|_| ConfigError::Stopped)?;
        rx.await.map_err(|_| ConfigError::Stopped)?
    }
}

async fn autosave_loop(
    mut rx: mpsc::UnboundedReceiver<Update>,
    record: Arc<Mutex<ConfigRecord>>,
    backend: Arc<dyn ConfigBackend>,
    debounce: Duration,
) {
    let mut pending: Option<String> = None;

    loop {
        let update = if pending.is_some() {
            tokio::select! {
                update = rx.recv() => update,
                _ = time::sleep(debounce) => {
                    if let Some(content) = pending.take() {
                        if let Err(e) = persist(&record, backend.as_ref(), content).await {
                            warn!(error = %e, "config autosave failed");
                        }
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match update {
            Some(Update::Save(content)) => pending = Some(content),
            Some(Update::Flush(done)) => {
                let result = match pending.take() {
                    Some(content) => persist(&record, backend.as_ref(), content).await,
                    None => Ok(()),
                };
                let _ = done.send(result);
            }
            None => {
                if let Some(content) = pending.take() {
                    if let Err(e) = persist(&record, backend.as_ref(), content).await {
                        warn!(error = %e, "final config save failed");
                    }
                }
                break;
            }
        }
    }

    debug!("config autosave loop ended");
}

async fn persist(
    record: &Mutex<ConfigRecord>,
    backend: &dyn ConfigBackend,
    content: String,
) -> Result<(), ConfigError> {
    let id = lock(record).id;
    let saved = backend.persist(id, &content).await?;
    debug!(id, len = content.len(), "config persisted");

    let mut current = lock(record);
    if current.content == content {
        *current = saved;
    } else {
        // A newer save is already queued; keep its content.
        current.id = saved.id;
        current.modified_at = saved.modified_at;
    }
    Ok(())
}

fn lock(record: &Mutex<ConfigRecord>) -> MutexGuard<'_, ConfigRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}
