use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{
    error,
    warn,
};

use crate::core::{
    DuplicateScope,
    ForgeError,
};

pub mod api;

pub use api::NoteInfo;

use api::{
    add_note_params,
    flagged_query,
    request_body,
    set_card_flag_params,
    update_note_params,
    ApiResponse,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Anki is not running. Please launch Anki and ensure AnkiConnect is enabled.")]
    Offline,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Protocol(String),
}

impl StoreError {
    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Offline | StoreError::Transport(_))
    }
}

/// Fixed-attempt, fixed-delay retry applied to transport failures only.
/// Protocol errors (duplicate note, unknown id) are final on first sight.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 1, delay: Duration::from_secs(1) }
    }
}

/// Per-card outcome of a review-marker write across a note's sibling cards.
#[derive(Debug, Clone)]
pub struct MarkerDetail {
    pub card_id: u64,
    pub changed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MarkerReport {
    pub details: Vec<MarkerDetail>,
}

impl MarkerReport {
    /// At least one sibling card took the marker.
    pub fn succeeded(&self) -> bool {
        self.details.iter().any(|d| d.changed)
    }
}

/// Capability surface the reconciliation engine needs from the note store.
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn health_check(&self) -> bool;

    /// Best-effort query; any failure is logged and yields an empty list.
    async fn find_flagged(&self, deck: &str, flag: u8) -> Vec<u64>;

    /// Best-effort batch fetch; empty input or failure yields an empty list.
    async fn fetch_by_ids(&self, ids: &[u64]) -> Vec<NoteInfo>;

    async fn create(
        &self,
        deck: &str,
        front: &str,
        back: &str,
        scope: DuplicateScope,
    ) -> Result<u64, StoreError>;

    async fn update(&self, note_id: u64, front: &str, back: &str) -> Result<(), StoreError>;

    async fn delete(&self, note_id: u64) -> Result<(), StoreError>;

    async fn list_decks(&self) -> Result<Vec<String>, StoreError>;

    async fn set_review_marker(&self, note_id: u64, marker: u8)
        -> Result<MarkerReport, StoreError>;
}

/// AnkiConnect client. Owns its HTTP connection pool; constructed once and
/// passed to whoever needs store access.
pub struct AnkiClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl AnkiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ForgeError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url: base_url.into(), retry: RetryPolicy::default() })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<T, StoreError> {
        let body = request_body(action, params);
        let attempts = self.retry.attempts.max(1);

        for attempt in 1..=attempts {
            let sent = self.http.post(&self.base_url).json(&body).send().await;
            let response = match sent {
                Ok(r) => r,
                Err(e) => {
                    let err = if e.is_connect() {
                        StoreError::Offline
                    } else {
                        StoreError::Transport(e.to_string())
                    };
                    if attempt < attempts {
                        warn!("{} attempt {}/{} failed: {}", action, attempt, attempts, err);
                        sleep(self.retry.delay).await;
                        continue;
                    }
                    return Err(err);
                }
            };

            let parsed: ApiResponse<T> = response
                .json()
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;

            if let Some(error) = parsed.error {
                return Err(StoreError::Protocol(error));
            }
            return parsed
                .result
                .ok_or_else(|| StoreError::Protocol(format!("{}: empty result", action)));
        }

        unreachable!("retry loop always returns")
    }

    /// For actions whose successful result is null (update, delete).
    async fn call_unit(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        match self.call::<serde_json::Value>(action, params).await {
            Ok(_) => Ok(()),
            // updateNoteFields and deleteNotes report success as result: null,
            // which call() treats as an empty result.
            Err(StoreError::Protocol(msg)) if msg.ends_with("empty result") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CardStore for AnkiClient {
    async fn health_check(&self) -> bool {
        match self.call::<u32>("version", None).await {
            Ok(_) => true,
            Err(e) => {
                error!("AnkiConnect health check failed: {}", e);
                false
            }
        }
    }

    async fn find_flagged(&self, deck: &str, flag: u8) -> Vec<u64> {
        let params = serde_json::json!({ "query": flagged_query(deck, flag) });
        match self.call::<Vec<u64>>("findNotes", Some(params)).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("findNotes failed for deck {}: {}", deck, e);
                Vec::new()
            }
        }
    }

    async fn fetch_by_ids(&self, ids: &[u64]) -> Vec<NoteInfo> {
        if ids.is_empty() {
            return Vec::new();
        }
        let params = serde_json::json!({ "notes": ids });
        match self.call::<Vec<NoteInfo>>("notesInfo", Some(params)).await {
            Ok(notes) => notes,
            Err(e) => {
                error!("notesInfo failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn create(
        &self,
        deck: &str,
        front: &str,
        back: &str,
        scope: DuplicateScope,
    ) -> Result<u64, StoreError> {
        let params = add_note_params(deck, front, back, scope);
        self.call::<u64>("addNote", Some(params)).await
    }

    async fn update(&self, note_id: u64, front: &str, back: &str) -> Result<(), StoreError> {
        let params = update_note_params(note_id, front, back);
        self.call_unit("updateNoteFields", Some(params)).await
    }

    async fn delete(&self, note_id: u64) -> Result<(), StoreError> {
        let params = serde_json::json!({ "notes": [note_id] });
        self.call_unit("deleteNotes", Some(params)).await
    }

    async fn list_decks(&self) -> Result<Vec<String>, StoreError> {
        self.call::<Vec<String>>("deckNames", None).await
    }

    async fn set_review_marker(
        &self,
        note_id: u64,
        marker: u8,
    ) -> Result<MarkerReport, StoreError> {
        let note = match self.fetch_by_ids(&[note_id]).await.into_iter().next() {
            Some(note) => note,
            None => {
                return Err(StoreError::Protocol(format!("no note found with id {}", note_id)))
            }
        };

        let mut report = MarkerReport::default();
        for card_id in note.cards {
            let params = set_card_flag_params(card_id, marker);
            match self.call_unit("setSpecificValueOfCard", Some(params)).await {
                Ok(()) => {
                    report.details.push(MarkerDetail { card_id, changed: true, error: None })
                }
                Err(e) => report.details.push(MarkerDetail {
                    card_id,
                    changed: false,
                    error: Some(e.to_string()),
                }),
            }
        }
        Ok(report)
    }
}
