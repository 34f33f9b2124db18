use std::{fs, io::ErrorKind, path::Path};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use storage::{S3Config, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub s3_bucket: Option<String>,
    pub aws_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub s3_endpoint: Option<String>,
    pub webhook_url: Option<String>,
    pub upload_max_attempts: u32,
    pub success_display_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            s3_bucket: None,
            aws_region: "us-east-1".into(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            s3_endpoint: None,
            webhook_url: None,
            upload_max_attempts: DEFAULT_MAX_ATTEMPTS,
            success_display_ms: 3000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    s3_bucket: Option<String>,
    aws_region: Option<String>,
    aws_access_key_id: Option<String>,
    aws_secret_access_key: Option<String>,
    s3_endpoint: Option<String>,
    webhook_url: Option<String>,
    upload_max_attempts: Option<u32>,
    success_display_ms: Option<u64>,
}

/// Defaults, then `path` if it exists, then environment variables.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };

    resolve_settings(raw.as_deref(), |name| std::env::var(name).ok())
        .with_context(|| format!("invalid settings file '{}'", path.display()))
}

pub(crate) fn resolve_settings(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        let file_cfg: FileSettings = toml::from_str(raw)?;
        if let Some(v) = file_cfg.s3_bucket {
            settings.s3_bucket = Some(v);
        }
        if let Some(v) = file_cfg.aws_region {
            settings.aws_region = v;
        }
        if let Some(v) = file_cfg.aws_access_key_id {
            settings.aws_access_key_id = Some(v);
        }
        if let Some(v) = file_cfg.aws_secret_access_key {
            settings.aws_secret_access_key = Some(v);
        }
        if let Some(v) = file_cfg.s3_endpoint {
            settings.s3_endpoint = Some(v);
        }
        if let Some(v) = file_cfg.webhook_url {
            settings.webhook_url = Some(v);
        }
        if let Some(v) = file_cfg.upload_max_attempts {
            settings.upload_max_attempts = v;
        }
        if let Some(v) = file_cfg.success_display_ms {
            settings.success_display_ms = v;
        }
    }

    let lookup = |names: &[&str]| names.iter().rev().find_map(|name| env(name));

    if let Some(v) = lookup(&["S3_BUCKET", "APP__S3_BUCKET"]) {
        settings.s3_bucket = Some(v);
    }
    if let Some(v) = lookup(&["AWS_REGION", "APP__AWS_REGION"]) {
        settings.aws_region = v;
    }
    if let Some(v) = lookup(&["AWS_ACCESS_KEY_ID", "APP__AWS_ACCESS_KEY_ID"]) {
        settings.aws_access_key_id = Some(v);
    }
    if let Some(v) = lookup(&["AWS_SECRET_ACCESS_KEY", "APP__AWS_SECRET_ACCESS_KEY"]) {
        settings.aws_secret_access_key = Some(v);
    }
    if let Some(v) = lookup(&["S3_ENDPOINT", "APP__S3_ENDPOINT"]) {
        settings.s3_endpoint = Some(v);
    }
    if let Some(v) = lookup(&["WEBHOOK_URL", "APP__WEBHOOK_URL"]) {
        settings.webhook_url = Some(v);
    }
    if let Some(v) = lookup(&["APP__UPLOAD_MAX_ATTEMPTS"]) {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.upload_max_attempts = parsed;
        }
    }
    if let Some(v) = lookup(&["APP__SUCCESS_DISPLAY_MS"]) {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.success_display_ms = parsed;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn s3_config(&self) -> anyhow::Result<S3Config> {
        let bucket = required(&self.s3_bucket, "s3_bucket / S3_BUCKET")?;
        let access_key_id = required(&self.aws_access_key_id, "aws_access_key_id / AWS_ACCESS_KEY_ID")?;
        let secret_access_key = required(
            &self.aws_secret_access_key,
            "aws_secret_access_key / AWS_SECRET_ACCESS_KEY",
        )?;

        let mut config = S3Config::new(bucket, &self.aws_region, access_key_id, secret_access_key);
        config.endpoint = self.s3_endpoint.clone();
        config.max_attempts = self.upload_max_attempts.max(1);
        Ok(config)
    }

    pub fn webhook_url(&self) -> anyhow::Result<&str> {
        required(&self.webhook_url, "webhook_url / WEBHOOK_URL")
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> anyhow::Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("missing required setting {name}"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
