use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use shared::{
    domain::Submission,
    error::NotifyError,
    protocol::{format_submission_date, NotifyPayload, RecordingPayload},
};
use tracing::{error, info};

use crate::error::SubmissionError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &NotifyPayload) -> Result<(), NotifyError>;
}

pub struct MissingNotifier;

#[async_trait]
impl Notifier for MissingNotifier {
    async fn notify(&self, _payload: &NotifyPayload) -> Result<(), NotifyError> {
        Err(NotifyError::Transport(
            "webhook endpoint is not configured".to_string(),
        ))
    }
}

/// Posts the payload as JSON to a fixed endpoint; anything but 2xx is a failure.
pub struct WebhookNotifier {
    http: Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, payload: &NotifyPayload) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                error!(error = %err, "webhook request failed");
                NotifyError::Transport(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string();
            error!(status = status.as_u16(), %reason, "webhook rejected submission");
            return Err(NotifyError::Status {
                status: status.as_u16(),
                reason,
            });
        }

        info!(
            recordings = payload.recordings.len(),
            submission_type = %payload.submission_type,
            "webhook accepted submission"
        );
        Ok(())
    }
}

/// Aggregates a submission whose entries all carry a resolved location.
pub fn build_payload(
    submission: &Submission,
    submitted_at: DateTime<Utc>,
) -> Result<NotifyPayload, SubmissionError> {
    let with_feedback = submission.category.requires_feedback();
    let recordings = submission
        .entries
        .iter()
        .map(|entry| {
            let url = entry.resolved_location.clone().ok_or_else(|| {
                SubmissionError::Unknown(format!("recording {} has no location", entry.id))
            })?;
            Ok(RecordingPayload {
                url,
                client_name: entry.name.clone(),
                interaction_date: entry.occurred_on.clone(),
                timestamp_notes: entry.notes.clone(),
                strengths: with_feedback.then(|| entry.strengths.clone()),
                improvements: with_feedback.then(|| entry.improvements.clone()),
            })
        })
        .collect::<Result<Vec<_>, SubmissionError>>()?;

    Ok(NotifyPayload {
        full_name: submission.submitter_name.clone(),
        email: submission.submitter_email.clone(),
        submission_type: submission.category,
        submission_date: format_submission_date(submitted_at),
        recordings,
    })
}
