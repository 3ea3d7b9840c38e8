//! Sequential bulk tagging over the current selection.
//!
//! ```text
//! Idle → ValidatingCredential ─┬─▶ Aborted → Idle
//!                              └─▶ Resolving(i) → Updating(i) → … → Complete → Idle
//! ```
//!
//! Items are processed strictly one after another: item `i + 1` is not
//! started until item `i`'s update has returned. Item failures are recorded
//! and never stop the batch.

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::task::JoinHandle;

use super::merge::{build_tag, merge_tags};
use super::resolver::FileResolver;
use super::schema::{FileRecord, Tag, TagValueType, JOB_FOLDER_KEY};
use super::selection::SelectionRegistry;
use crate::error::{Result, TagError};
use crate::relay::credential::CredentialGate;
use crate::relay::RelayClient;

/// Delay before the gallery is refreshed, giving the remote index time to settle.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Aborted { reason: String },
    Started { total: usize },
    Item { index: usize, total: usize, filename: String },
    CredentialExpired { filename: String },
    Finished { succeeded: usize, failed: usize },
}

/// Receives running status for the user.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Re-renders the gallery once a batch has changed something.
pub trait GalleryRefresher: Send + Sync {
    fn refresh(&self);
}

/// Progress sink that only writes to the log.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Aborted { reason } => tracing::warn!(%reason, "Tagging aborted"),
            ProgressEvent::Started { total } => tracing::info!(total, "Tagging files"),
            ProgressEvent::Item {
                index,
                total,
                filename,
            } => tracing::info!(index, total, %filename, "Processing"),
            ProgressEvent::CredentialExpired { filename } => {
                tracing::warn!(%filename, "Token expired")
            }
            ProgressEvent::Finished { succeeded, failed } => {
                tracing::info!(succeeded, failed, "Tagging finished")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ValidatingCredential,
    Aborted,
    Processing,
    Resolving { index: usize },
    Updating { index: usize },
    Succeeded { index: usize },
    Failed { index: usize },
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    Success,
    ResolutionFailed,
    UpdateFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub filename: String,
    pub status: ItemStatus,
    #[serde(
        rename = "detail",
        serialize_with = "error_message",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<TagError>,
}

impl ItemOutcome {
    fn success(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            status: ItemStatus::Success,
            error: None,
        }
    }

    fn failed(filename: &str, status: ItemStatus, error: TagError) -> Self {
        Self {
            filename: filename.to_string(),
            status,
            error: Some(error),
        }
    }

    /// Human-readable reason the item failed.
    pub fn detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

fn error_message<S: Serializer>(
    error: &Option<TagError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.collect_str(e),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub key: String,
    pub value: String,
    pub items: Vec<ItemOutcome>,
    pub success_count: usize,
    pub error_count: usize,
    pub refresh_scheduled: bool,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        format!("{} succeeded, {} failed", self.success_count, self.error_count)
    }
}

pub struct BulkTagger {
    relay: Arc<dyn RelayClient>,
    gate: CredentialGate,
    resolver: FileResolver,
    selection: SelectionRegistry,
    progress: Arc<dyn ProgressSink>,
    refresher: Arc<dyn GalleryRefresher>,
    refresh_delay: Duration,
    pending_refresh: Option<JoinHandle<()>>,
    phase: Phase,
}

impl BulkTagger {
    pub fn new(
        relay: Arc<dyn RelayClient>,
        gate: CredentialGate,
        refresher: Arc<dyn GalleryRefresher>,
    ) -> Self {
        Self {
            resolver: FileResolver::new(Arc::clone(&relay), gate.clone()),
            relay,
            gate,
            selection: SelectionRegistry::new(),
            progress: Arc::new(TracingProgress),
            refresher,
            refresh_delay: DEFAULT_REFRESH_DELAY,
            pending_refresh: None,
            phase: Phase::Idle,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn selection(&self) -> &SelectionRegistry {
        &self.selection
    }

    pub fn toggle(&mut self, filename: &str, handle: &str, thumbnail_id: &str) -> bool {
        self.selection.toggle(filename, handle, thumbnail_id)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn resolver_mut(&mut self) -> &mut FileResolver {
        &mut self.resolver
    }

    /// Tags every file in the job folder `number`.
    pub async fn add_to_job_folder(&mut self, number: &str) -> Result<BatchReport> {
        let number = number.trim();
        if number.is_empty() {
            return Err(TagError::InvalidTagValue {
                value_type: TagValueType::String.as_str().to_string(),
                value: number.to_string(),
            });
        }
        self.apply_tag(JOB_FOLDER_KEY, number, TagValueType::String).await
    }

    /// Applies one tag to every selected file.
    ///
    /// Fails only when nothing can start: no credential, or a value that does
    /// not parse as `value_type`. In both cases the selection is untouched
    /// and no request is made.
    pub async fn apply_tag(
        &mut self,
        key: &str,
        value: &str,
        value_type: TagValueType,
    ) -> Result<BatchReport> {
        self.enter(Phase::ValidatingCredential);
        let new_tag = match self.gate.require().and_then(|_| build_tag(key, value, value_type)) {
            Ok(tag) => tag,
            Err(e) => {
                self.enter(Phase::Aborted);
                self.progress.report(&ProgressEvent::Aborted {
                    reason: e.to_string(),
                });
                self.enter(Phase::Idle);
                return Err(e);
            }
        };

        self.enter(Phase::Processing);
        let filenames = self.selection.filenames();
        let total = filenames.len();
        self.progress.report(&ProgressEvent::Started { total });

        let mut items = Vec::with_capacity(total);
        for (index, filename) in filenames.iter().enumerate() {
            self.progress.report(&ProgressEvent::Item {
                index: index + 1,
                total,
                filename: filename.clone(),
            });
            let outcome = self.process_item(index, filename, &new_tag).await;
            self.enter(if outcome.status == ItemStatus::Success {
                Phase::Succeeded { index }
            } else {
                Phase::Failed { index }
            });
            items.push(outcome);
        }

        let success_count = items
            .iter()
            .filter(|i| i.status == ItemStatus::Success)
            .count();
        let error_count = items.len() - success_count;

        self.selection.clear();
        self.progress.report(&ProgressEvent::Finished {
            succeeded: success_count,
            failed: error_count,
        });

        let refresh_scheduled = success_count > 0;
        if refresh_scheduled {
            self.schedule_refresh();
        }

        self.enter(Phase::Complete);
        self.enter(Phase::Idle);

        Ok(BatchReport {
            key: key.to_string(),
            value: value.to_string(),
            items,
            success_count,
            error_count,
            refresh_scheduled,
        })
    }

    /// Waits for a scheduled gallery refresh, if any.
    pub async fn wait_for_refresh(&mut self) {
        if let Some(handle) = self.pending_refresh.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Gallery refresh task failed");
            }
        }
    }

    async fn process_item(&mut self, index: usize, filename: &str, new_tag: &Tag) -> ItemOutcome {
        self.enter(Phase::Resolving { index });
        let record = match self.resolver.resolve(filename).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(%filename, "Could not find file");
                let error = TagError::ResolutionFailed {
                    filename: filename.to_string(),
                    reason: "no matching file".to_string(),
                };
                return ItemOutcome::failed(filename, ItemStatus::ResolutionFailed, error);
            }
            Err(e) => {
                self.note_expiry(&e, filename);
                tracing::error!(%filename, error = %e, "Search error");
                return ItemOutcome::failed(filename, ItemStatus::ResolutionFailed, e);
            }
        };
        self.selection.attach(filename, record.clone());

        self.enter(Phase::Updating { index });
        let updated = match self.gate.require() {
            Ok(credential) => self.relay.update_file(&record, new_tag, &credential).await,
            Err(e) => Err(e),
        };

        match updated {
            Ok(()) => {
                self.refresh_cached(filename, &record, new_tag).await;
                ItemOutcome::success(filename)
            }
            Err(e) => {
                self.note_expiry(&e, filename);
                tracing::error!(
                    %filename,
                    file_id = %record.id,
                    error = %e,
                    "Error tagging file"
                );
                ItemOutcome::failed(filename, ItemStatus::UpdateFailed, e)
            }
        }
    }

    /// Replaces the cached pre-update record. When the re-search does not
    /// return one, the locally merged record is cached instead so the next
    /// update still carries the tag just written.
    async fn refresh_cached(&mut self, filename: &str, record: &FileRecord, new_tag: &Tag) {
        let reason = match self.resolver.refresh(filename).await {
            Ok(Some(_)) => return,
            Ok(None) => "no matching file".to_string(),
            Err(e) => e.to_string(),
        };
        tracing::warn!(%filename, %reason, "Cache refresh failed, caching local merge");
        let mut merged = record.clone();
        merged.tags = merge_tags(&record.tags, new_tag.clone());
        self.resolver.remember(filename, merged);
    }

    // TODO: decide whether a first expiry should stop the batch instead of
    // failing every remaining item with the same 401.
    fn note_expiry(&self, error: &TagError, filename: &str) {
        if error.is_expired() {
            self.progress.report(&ProgressEvent::CredentialExpired {
                filename: filename.to_string(),
            });
        }
    }

    fn schedule_refresh(&mut self) {
        let refresher = Arc::clone(&self.refresher);
        let delay = self.refresh_delay;
        if let Some(previous) = self.pending_refresh.take() {
            previous.abort();
        }
        self.pending_refresh = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            refresher.refresh();
        }));
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "Tagger phase");
        self.phase = phase;
    }
}
