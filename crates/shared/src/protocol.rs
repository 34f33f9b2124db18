use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Category;

/// Body of the single webhook call made per successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyPayload {
    pub full_name: String,
    pub email: String,
    pub submission_type: Category,
    pub submission_date: String,
    pub recordings: Vec<RecordingPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingPayload {
    pub url: String,
    pub client_name: String,
    pub interaction_date: String,
    pub timestamp_notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strengths: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvements: Option<String>,
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-05-01T09:30:00.000Z`.
pub fn format_submission_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn marketing_recordings_omit_feedback_fields() {
        let payload = NotifyPayload {
            full_name: "John Doe".into(),
            email: "john.doe@example.com".into(),
            submission_type: Category::Marketing,
            submission_date: format_submission_date(
                Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            ),
            recordings: vec![RecordingPayload {
                url: "https://example.com/deck.pdf".into(),
                client_name: "Q4 Sales Deck".into(),
                interaction_date: "2024-05-01".into(),
                timestamp_notes: String::new(),
                strengths: None,
                improvements: None,
            }],
        };

        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(
            value,
            json!({
                "full_name": "John Doe",
                "email": "john.doe@example.com",
                "submission_type": "marketing",
                "submission_date": "2024-05-01T09:30:00.000Z",
                "recordings": [{
                    "url": "https://example.com/deck.pdf",
                    "client_name": "Q4 Sales Deck",
                    "interaction_date": "2024-05-01",
                    "timestamp_notes": ""
                }]
            })
        );
    }
}
