use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use chrono::Utc;
use shared::{
    domain::{Category, EditError, Entry, EntryId, SourceMode, Submission},
    protocol::NotifyPayload,
};
use storage::{object_key, BlobStore, MissingBlobStore};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub mod error;
pub mod notify;
pub mod validation;

pub use error::SubmissionError;
pub use notify::{build_payload, MissingNotifier, Notifier, WebhookNotifier};
pub use validation::{validate, EntryField, FieldKey, ValidationErrors};

/// How long the success state is held before the form resets.
pub const SUCCESS_DISPLAY_INTERVAL: Duration = Duration::from_secs(3);
const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Idle,
    Validating,
    Uploading { index: usize, total: usize },
    Notifying,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    PhaseChanged(SubmissionPhase),
    UploadProgress { entry_id: EntryId, percent: u8 },
    Submitted { recordings: usize },
    Failed { message: String },
    Reset { category: Category },
}

#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub payload: NotifyPayload,
}

#[derive(Default)]
struct ProgressTracker {
    percents: StdMutex<HashMap<EntryId, u8>>,
}

impl ProgressTracker {
    fn set(&self, entry_id: EntryId, percent: u8) {
        self.percents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry_id, percent);
    }

    fn get(&self, entry_id: EntryId) -> Option<u8> {
        self.percents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entry_id)
            .copied()
    }

    fn snapshot(&self) -> HashMap<EntryId, u8> {
        self.percents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        self.percents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Owns the in-progress submission and drives upload-then-notify.
///
/// `submit` borrows the controller mutably for its whole run, so edits and a
/// second submit cannot interleave with an attempt in flight. Observers follow
/// along through [`SubmissionController::subscribe_events`].
pub struct SubmissionController {
    submission: Submission,
    phase: SubmissionPhase,
    last_error: Option<String>,
    progress: Arc<ProgressTracker>,
    blob_store: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<ControllerEvent>,
    success_display: Duration,
}

impl SubmissionController {
    pub fn new(category: Category) -> Self {
        Self::new_with_dependencies(
            category,
            Arc::new(MissingBlobStore),
            Arc::new(MissingNotifier),
        )
    }

    pub fn new_with_dependencies(
        category: Category,
        blob_store: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            submission: Submission::new(category),
            phase: SubmissionPhase::Idle,
            last_error: None,
            progress: Arc::new(ProgressTracker::default()),
            blob_store,
            notifier,
            events,
            success_display: SUCCESS_DISPLAY_INTERVAL,
        }
    }

    pub fn with_success_display(mut self, interval: Duration) -> Self {
        self.success_display = interval;
        self
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn category(&self) -> Category {
        self.submission.category
    }

    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.submission.entry(index)
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase
    }

    pub fn is_submitting(&self) -> bool {
        self.phase != SubmissionPhase::Idle
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn progress(&self, entry_id: EntryId) -> Option<u8> {
        self.progress.get(entry_id)
    }

    pub fn progress_snapshot(&self) -> HashMap<EntryId, u8> {
        self.progress.snapshot()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn set_submitter_name(&mut self, name: impl Into<String>) {
        self.submission.submitter_name = name.into();
    }

    pub fn set_submitter_email(&mut self, email: impl Into<String>) {
        self.submission.submitter_email = email.into();
    }

    /// Replaces the whole submission with fresh defaults for `category`.
    pub fn switch_category(&mut self, category: Category) {
        if category == self.submission.category {
            return;
        }
        debug!(from = %self.submission.category, to = %category, "switching category");
        self.reset(category);
    }

    pub fn add_entry(&mut self) -> EntryId {
        self.submission.add_entry()
    }

    pub fn update_entry(&mut self, index: usize, entry: Entry) -> Result<(), EditError> {
        self.submission.update_entry(index, entry)
    }

    pub fn remove_entry(&mut self, index: usize) -> Result<Entry, EditError> {
        let removed = self.submission.remove_entry(index)?;
        if self.submission.entries.is_empty() {
            warn!("last recording removed; submission will not validate until one is added");
        }
        Ok(removed)
    }

    pub fn validate(&self) -> ValidationErrors {
        validate(&self.submission)
    }

    /// Uploads every entry in order, then notifies once.
    ///
    /// On failure the entered fields are left untouched and the returned error
    /// carries the message to show; nothing uploaded in the failed attempt is
    /// reused by the next one.
    pub async fn submit(&mut self) -> Result<SubmissionReceipt, SubmissionError> {
        self.last_error = None;
        self.set_phase(SubmissionPhase::Validating);

        let errors = self.validate();
        if !errors.is_empty() {
            return Err(self.fail(SubmissionError::Validation(errors)));
        }

        self.progress.clear();
        let payload = match self.upload_and_notify().await {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail(err)),
        };

        self.set_phase(SubmissionPhase::Success);
        let _ = self.events.send(ControllerEvent::Submitted {
            recordings: payload.recordings.len(),
        });
        info!(
            recordings = payload.recordings.len(),
            submission_type = %payload.submission_type,
            "submission delivered"
        );

        tokio::time::sleep(self.success_display).await;
        self.reset(self.submission.category);

        Ok(SubmissionReceipt { payload })
    }

    async fn upload_and_notify(&mut self) -> Result<NotifyPayload, SubmissionError> {
        let staged = self.resolve_locations().await?;

        self.set_phase(SubmissionPhase::Notifying);
        let payload = build_payload(&staged, Utc::now())?;
        self.notifier.notify(&payload).await?;
        Ok(payload)
    }

    /// Copy of the submission with every entry's location filled in.
    async fn resolve_locations(&mut self) -> Result<Submission, SubmissionError> {
        let mut staged = self.submission.clone();
        let category = staged.category;
        let total = staged.entries.len();
        // Keys must stay distinct even when two uploads start in the same millisecond.
        let mut last_millis = i64::MIN;

        for (index, entry) in staged.entries.iter_mut().enumerate() {
            match entry.source_mode {
                SourceMode::Reference => {
                    entry.resolved_location = entry.reference_url.clone();
                }
                SourceMode::Upload => {
                    let Some(file) = entry.local_file.as_ref() else {
                        return Err(SubmissionError::Unknown(format!(
                            "recording {} has no file to upload",
                            entry.id
                        )));
                    };

                    self.set_phase(SubmissionPhase::Uploading { index, total });
                    let millis = Utc::now()
                        .timestamp_millis()
                        .max(last_millis.saturating_add(1));
                    last_millis = millis;
                    let key = object_key(category, millis, &file.file_name);
                    info!(
                        entry_id = %entry.id,
                        index,
                        key = %key,
                        size_bytes = file.size_bytes,
                        "uploading recording"
                    );

                    let listener = self.progress_listener(entry.id);
                    let location = self
                        .blob_store
                        .upload_blob(file, &key, &listener)
                        .await
                        .map_err(|source| SubmissionError::Upload {
                            index,
                            entry_id: entry.id,
                            source,
                        })?;
                    entry.resolved_location = Some(location);
                }
            }
        }

        Ok(staged)
    }

    fn progress_listener(&self, entry_id: EntryId) -> impl Fn(u8) + Send + Sync + 'static {
        let progress = self.progress.clone();
        let events = self.events.clone();
        move |percent| {
            progress.set(entry_id, percent);
            let _ = events.send(ControllerEvent::UploadProgress { entry_id, percent });
        }
    }

    fn fail(&mut self, err: SubmissionError) -> SubmissionError {
        let message = err.user_message();
        match &err {
            SubmissionError::Validation(errors) => {
                debug!(problems = errors.len(), "submission rejected by validation")
            }
            other => error!(error = %other, "submission failed"),
        }

        self.set_phase(SubmissionPhase::Error);
        let _ = self.events.send(ControllerEvent::Failed {
            message: message.clone(),
        });
        self.last_error = Some(message);
        self.set_phase(SubmissionPhase::Idle);
        err
    }

    fn reset(&mut self, category: Category) {
        self.submission = Submission::new(category);
        self.progress.clear();
        self.set_phase(SubmissionPhase::Idle);
        let _ = self.events.send(ControllerEvent::Reset { category });
    }

    fn set_phase(&mut self, phase: SubmissionPhase) {
        if self.phase == phase {
            return;
        }
        self.phase = phase;
        let _ = self.events.send(ControllerEvent::PhaseChanged(phase));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
