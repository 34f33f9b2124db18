//! Pre-network checks over a [`Submission`].

use std::{collections::BTreeMap, fmt};

use once_cell::sync::Lazy;
use regex::Regex;
use shared::domain::{Category, Submission};

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryField {
    Name,
    Strengths,
    Improvements,
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    SubmitterName,
    SubmitterEmail,
    /// The entry list as a whole (empty).
    Entries,
    Entry { index: usize, field: EntryField },
}

/// Field-level problems keyed by field or entry position. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<FieldKey, String>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.errors.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.errors.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.errors.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.errors.iter().map(|(key, msg)| (*key, msg.as_str()))
    }

    pub fn for_entry(&self, index: usize) -> impl Iterator<Item = (EntryField, &str)> {
        self.errors.iter().filter_map(move |(key, msg)| match key {
            FieldKey::Entry { index: i, field } if *i == index => Some((*field, msg.as_str())),
            _ => None,
        })
    }

    fn insert(&mut self, key: FieldKey, message: impl Into<String>) {
        self.errors.insert(key, message.into());
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, message) in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            match key {
                FieldKey::Entry { index, .. } => write!(f, "recording {}: {message}", index + 1)?,
                _ => f.write_str(message)?,
            }
        }
        Ok(())
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

pub fn validate(submission: &Submission) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    if submission.submitter_name.is_empty() {
        errors.insert(FieldKey::SubmitterName, "Full name is required");
    }
    if submission.submitter_email.is_empty() {
        errors.insert(FieldKey::SubmitterEmail, "Email is required");
    } else if !is_valid_email(&submission.submitter_email) {
        errors.insert(
            FieldKey::SubmitterEmail,
            "Please enter a valid email address",
        );
    }

    if submission.entries.is_empty() {
        errors.insert(FieldKey::Entries, "At least one recording is required");
    }

    let category = submission.category;
    for (index, entry) in submission.entries.iter().enumerate() {
        let key = |field| FieldKey::Entry { index, field };

        if entry.name.trim().is_empty() {
            let message = match category {
                Category::Sales => "Client name is required",
                Category::Marketing => "Document name is required",
            };
            errors.insert(key(EntryField::Name), message);
        }
        if category.requires_feedback() {
            if entry.strengths.trim().is_empty() {
                errors.insert(key(EntryField::Strengths), "Strengths are required");
            }
            if entry.improvements.trim().is_empty() {
                errors.insert(
                    key(EntryField::Improvements),
                    "Areas for improvement are required",
                );
            }
        }
        if !entry.has_source() {
            errors.insert(key(EntryField::Source), "A recording is required");
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use shared::domain::LocalFile;

    use super::*;

    fn complete(category: Category) -> Submission {
        let mut submission = Submission::new(category);
        submission.submitter_name = "John Doe".into();
        submission.submitter_email = "john.doe@example.com".into();
        let entry = &mut submission.entries[0];
        entry.name = "Jane Smith".into();
        entry.strengths = "Good rapport".into();
        entry.improvements = "Weak close".into();
        entry.choose_file(LocalFile::new("/tmp/call.mp3", "call.mp3", 10, "audio/mpeg"));
        submission
    }

    #[test]
    fn complete_submissions_are_valid() {
        assert!(validate(&complete(Category::Sales)).is_empty());

        let mut marketing = complete(Category::Marketing);
        marketing.add_entry();
        let second = &mut marketing.entries[1];
        second.name = "Q4 Sales Deck".into();
        second.set_reference_url("https://example.com/deck.pdf");
        assert!(validate(&marketing).is_empty());
    }

    #[test]
    fn malformed_emails_flag_only_the_email_field() {
        for email in ["", "johnexample.com", "john@example", "john doe@example.com"] {
            let mut submission = complete(Category::Sales);
            submission.submitter_email = email.into();

            let errors = validate(&submission);
            assert_eq!(
                errors.keys().collect::<Vec<_>>(),
                vec![FieldKey::SubmitterEmail],
                "email {email:?}"
            );
        }

        let mut submission = complete(Category::Sales);
        submission.submitter_email = String::new();
        assert_eq!(
            validate(&submission).get(FieldKey::SubmitterEmail),
            Some("Email is required")
        );
    }

    #[test]
    fn sales_requires_feedback_fields() {
        let mut submission = complete(Category::Sales);
        submission.entries[0].strengths = "  ".into();
        submission.entries[0].improvements.clear();

        let errors = validate(&submission);
        let fields: Vec<_> = errors.for_entry(0).map(|(field, _)| field).collect();
        assert_eq!(fields, vec![EntryField::Strengths, EntryField::Improvements]);
    }

    #[test]
    fn marketing_never_requires_feedback_fields() {
        let mut submission = complete(Category::Marketing);
        submission.entries[0].strengths.clear();
        submission.entries[0].improvements.clear();
        assert!(validate(&submission).is_empty());
    }

    #[test]
    fn entry_without_source_or_name_is_flagged_by_position() {
        let mut submission = complete(Category::Marketing);
        submission.add_entry();

        let errors = validate(&submission);
        assert_eq!(
            errors.get(FieldKey::Entry {
                index: 1,
                field: EntryField::Name
            }),
            Some("Document name is required")
        );
        assert!(errors.contains(FieldKey::Entry {
            index: 1,
            field: EntryField::Source
        }));
        assert_eq!(errors.for_entry(0).count(), 0);
    }

    #[test]
    fn empty_entry_list_is_a_validation_error() {
        let mut submission = complete(Category::Sales);
        submission.remove_entry(0).expect("remove");

        let errors = validate(&submission);
        assert!(errors.contains(FieldKey::Entries));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn only_empty_name_and_url_are_rejected() {
        let mut submission = complete(Category::Marketing);
        submission.submitter_name = "   ".into();
        submission.entries[0].set_reference_url("  ");
        assert!(validate(&submission).is_empty());

        submission.submitter_name.clear();
        submission.entries[0].set_reference_url("");
        let errors = validate(&submission);
        assert!(errors.contains(FieldKey::SubmitterName));
        assert!(errors.contains(FieldKey::Entry {
            index: 0,
            field: EntryField::Source
        }));
    }

    #[test]
    fn whitespace_client_name_is_rejected() {
        let mut submission = complete(Category::Sales);
        submission.entries[0].name = "  ".into();
        assert!(validate(&submission).contains(FieldKey::Entry {
            index: 0,
            field: EntryField::Name
        }));
    }

    #[test]
    fn display_joins_messages() {
        let mut submission = complete(Category::Sales);
        submission.submitter_name.clear();
        submission.entries[0].name.clear();
        assert_eq!(
            validate(&submission).to_string(),
            "Full name is required; recording 1: Client name is required"
        );
    }
}
