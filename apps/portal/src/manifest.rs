use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use client_core::SubmissionController;
use serde::Deserialize;
use shared::domain::{Category, LocalFile};

/// A submission described on disk.
///
/// ```toml
/// full_name = "John Doe"
/// email = "john.doe@example.com"
/// category = "sales"
///
/// [[recordings]]
/// file = "calls/acme.mp3"
/// name = "Jane Smith"
/// date = "2024-05-01"
/// notes = "0:45 objection handling"
/// strengths = "Clear pricing walkthrough"
/// improvements = "Ask for the next meeting"
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    pub category: Category,
    #[serde(default)]
    pub recordings: Vec<ManifestRecording>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestRecording {
    pub file: Option<PathBuf>,
    pub url: Option<String>,
    #[serde(default)]
    pub name: String,
    pub date: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub strengths: Option<String>,
    pub improvements: Option<String>,
}

impl Manifest {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read manifest '{}'", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid manifest '{}'", path.display()))
    }

    /// Replays the manifest as form edits. Relative file paths are resolved
    /// against `base_dir`.
    pub async fn apply(
        &self,
        base_dir: &Path,
        controller: &mut SubmissionController,
    ) -> anyhow::Result<()> {
        controller.switch_category(self.category);
        controller.set_submitter_name(self.full_name.as_str());
        controller.set_submitter_email(self.email.as_str());

        if self.recordings.is_empty() {
            while !controller.submission().entries.is_empty() {
                controller.remove_entry(0)?;
            }
            return Ok(());
        }

        for (index, recording) in self.recordings.iter().enumerate() {
            if index >= controller.submission().entries.len() {
                controller.add_entry();
            }
            let mut entry = controller
                .entry(index)
                .cloned()
                .with_context(|| format!("recording {} is missing", index + 1))?;

            match (&recording.file, &recording.url) {
                (Some(_), Some(_)) => {
                    bail!("recording {} sets both `file` and `url`", index + 1)
                }
                (Some(file), None) => {
                    let path = base_dir.join(file);
                    let local = LocalFile::from_path(&path)
                        .await
                        .with_context(|| format!("cannot open '{}'", path.display()))?;
                    entry.choose_file(local);
                }
                (None, Some(url)) => entry.set_reference_url(url.as_str()),
                (None, None) => {}
            }

            entry.name = recording.name.clone();
            entry.notes = recording.notes.clone();
            if let Some(date) = &recording.date {
                entry.occurred_on = date.clone();
            }
            if let Some(strengths) = &recording.strengths {
                entry.strengths = strengths.clone();
            }
            if let Some(improvements) = &recording.improvements {
                entry.improvements = improvements.clone();
            }

            controller.update_entry(index, entry)?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/manifest_tests.rs"]
mod tests;
