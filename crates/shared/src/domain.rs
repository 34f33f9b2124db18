use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(EntryId);

const MARKETING_DEFAULT_STRENGTHS: &str = "Brand consistency, Visual appeal, Message clarity";
const MARKETING_DEFAULT_IMPROVEMENTS: &str =
    "Target audience focus, Call-to-action placement, Content hierarchy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Sales call recordings; feedback fields are required.
    Sales,
    /// Marketing materials; feedback fields are pre-filled and optional.
    Marketing,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Marketing => "marketing",
        }
    }

    /// Top-level folder uploads of this category are stored under.
    pub fn storage_folder(self) -> &'static str {
        match self {
            Self::Sales => "recordings",
            Self::Marketing => "marketing",
        }
    }

    pub fn requires_feedback(self) -> bool {
        matches!(self, Self::Sales)
    }

    pub fn default_strengths(self) -> &'static str {
        match self {
            Self::Sales => "",
            Self::Marketing => MARKETING_DEFAULT_STRENGTHS,
        }
    }

    pub fn default_improvements(self) -> &'static str {
        match self {
            Self::Sales => "",
            Self::Marketing => MARKETING_DEFAULT_IMPROVEMENTS,
        }
    }

    pub fn entry_name_label(self) -> &'static str {
        match self {
            Self::Sales => "Client/Lead Name",
            Self::Marketing => "Document / Asset Name",
        }
    }

    pub fn date_label(self) -> &'static str {
        match self {
            Self::Sales => "Date of Interaction",
            Self::Marketing => "Content Creation Date",
        }
    }

    pub fn reference_placeholder(self) -> &'static str {
        match self {
            Self::Sales => "https://example.com/recording.mp3",
            Self::Marketing => "https://example.com/presentation.pdf",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown submission category '{0}' (expected 'sales' or 'marketing')")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sales") {
            Ok(Self::Sales)
        } else if s.eq_ignore_ascii_case("marketing") {
            Ok(Self::Marketing)
        } else {
            Err(UnknownCategory(s.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    #[default]
    Upload,
    Reference,
}

/// A file picked for upload. Only its metadata is held; content is read by the
/// blob store at transfer time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: String,
}

impl LocalFile {
    pub fn new(
        path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        size_bytes: u64,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            size_bytes,
            content_type: content_type.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{}' is not a regular file", path.display()),
            ));
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size_bytes: metadata.len(),
            content_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub source_mode: SourceMode,
    pub local_file: Option<LocalFile>,
    pub reference_url: Option<String>,
    pub resolved_location: Option<String>,
    pub name: String,
    pub occurred_on: String,
    pub notes: String,
    pub strengths: String,
    pub improvements: String,
}

impl Entry {
    pub fn new(id: EntryId, category: Category) -> Self {
        Self {
            id,
            source_mode: SourceMode::Upload,
            local_file: None,
            reference_url: None,
            resolved_location: None,
            name: String::new(),
            occurred_on: today(),
            notes: String::new(),
            strengths: category.default_strengths().to_string(),
            improvements: category.default_improvements().to_string(),
        }
    }

    /// Switches the source mode, dropping whatever the other mode had collected.
    pub fn set_source_mode(&mut self, mode: SourceMode) {
        if self.source_mode == mode {
            return;
        }
        self.source_mode = mode;
        match mode {
            SourceMode::Upload => self.reference_url = None,
            SourceMode::Reference => self.local_file = None,
        }
        self.resolved_location = None;
    }

    pub fn choose_file(&mut self, file: LocalFile) {
        self.set_source_mode(SourceMode::Upload);
        self.local_file = Some(file);
    }

    pub fn set_reference_url(&mut self, url: impl Into<String>) {
        self.set_source_mode(SourceMode::Reference);
        self.reference_url = Some(url.into());
    }

    /// Whether the entry carries something the current mode can resolve to a location.
    pub fn has_source(&self) -> bool {
        match self.source_mode {
            SourceMode::Upload => self.local_file.is_some(),
            SourceMode::Reference => self
                .reference_url
                .as_deref()
                .is_some_and(|url| !url.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub submitter_name: String,
    pub submitter_email: String,
    pub category: Category,
    pub entries: Vec<Entry>,
    next_entry_id: i64,
}

impl Submission {
    /// Fresh submission holding a single default entry.
    pub fn new(category: Category) -> Self {
        let mut submission = Self {
            submitter_name: String::new(),
            submitter_email: String::new(),
            category,
            entries: Vec::new(),
            next_entry_id: 1,
        };
        submission.add_entry();
        submission
    }

    pub fn add_entry(&mut self) -> EntryId {
        let id = EntryId(self.next_entry_id);
        self.next_entry_id += 1;
        self.entries.push(Entry::new(id, self.category));
        id
    }

    /// Replaces the entry at `index`; the stored id is kept.
    pub fn update_entry(&mut self, index: usize, mut entry: Entry) -> Result<(), EditError> {
        let slot = self
            .entries
            .get_mut(index)
            .ok_or(EditError::NoSuchEntry { index })?;
        entry.id = slot.id;
        *slot = entry;
        Ok(())
    }

    pub fn remove_entry(&mut self, index: usize) -> Result<Entry, EditError> {
        if index >= self.entries.len() {
            return Err(EditError::NoSuchEntry { index });
        }
        Ok(self.entries.remove(index))
    }

    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("no entry at position {index}")]
    NoSuchEntry { index: usize },
}

fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marketing_entries_start_with_default_feedback() {
        let submission = Submission::new(Category::Marketing);
        let entry = &submission.entries[0];
        assert_eq!(entry.strengths, MARKETING_DEFAULT_STRENGTHS);
        assert_eq!(entry.improvements, MARKETING_DEFAULT_IMPROVEMENTS);

        let sales = Submission::new(Category::Sales);
        assert!(sales.entries[0].strengths.is_empty());
        assert!(sales.entries[0].improvements.is_empty());
    }

    #[test]
    fn entry_ids_stay_unique_after_removal() {
        let mut submission = Submission::new(Category::Sales);
        let second = submission.add_entry();
        submission.remove_entry(0).expect("remove first");
        let third = submission.add_entry();

        assert_ne!(second, third);
        assert_eq!(submission.entries.len(), 2);
    }

    #[test]
    fn update_entry_keeps_original_id() {
        let mut submission = Submission::new(Category::Sales);
        let original = submission.entries[0].id;

        let mut replacement = Entry::new(EntryId(99), Category::Sales);
        replacement.name = "Jane Smith".into();
        submission.update_entry(0, replacement).expect("update");

        assert_eq!(submission.entries[0].id, original);
        assert_eq!(submission.entries[0].name, "Jane Smith");
        assert_eq!(
            submission.update_entry(5, Entry::new(EntryId(1), Category::Sales)),
            Err(EditError::NoSuchEntry { index: 5 })
        );
    }

    #[test]
    fn removing_last_entry_is_allowed() {
        let mut submission = Submission::new(Category::Marketing);
        submission.remove_entry(0).expect("remove");
        assert!(submission.entries.is_empty());
        assert!(submission.remove_entry(0).is_err());
    }

    #[test]
    fn switching_source_mode_clears_other_input() {
        let mut entry = Entry::new(EntryId(1), Category::Sales);
        entry.choose_file(LocalFile::new("/tmp/a.mp3", "a.mp3", 10, "audio/mpeg"));
        assert!(entry.has_source());

        entry.set_reference_url("https://example.com/a.mp3");
        assert!(entry.local_file.is_none());
        assert_eq!(entry.source_mode, SourceMode::Reference);

        entry.set_source_mode(SourceMode::Upload);
        assert!(entry.reference_url.is_none());
        assert!(!entry.has_source());
    }

    #[test]
    fn any_non_empty_reference_url_is_a_source() {
        let mut entry = Entry::new(EntryId(1), Category::Sales);
        entry.set_reference_url("");
        assert!(!entry.has_source());

        entry.set_reference_url("   ");
        assert!(entry.has_source());
    }

    #[test]
    fn parses_category_names() {
        assert_eq!("Sales".parse::<Category>().expect("sales"), Category::Sales);
        assert_eq!(
            "marketing".parse::<Category>().expect("marketing"),
            Category::Marketing
        );
        assert!("support".parse::<Category>().is_err());
        assert_eq!(Category::Sales.storage_folder(), "recordings");
    }

    #[tokio::test]
    async fn local_file_reads_size_and_content_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("call 1.mp3");
        tokio::fs::write(&path, b"0123456789").await.expect("write");

        let file = LocalFile::from_path(&path).await.expect("local file");
        assert_eq!(file.file_name, "call 1.mp3");
        assert_eq!(file.size_bytes, 10);
        assert_eq!(file.content_type, "audio/mpeg");
    }
}
