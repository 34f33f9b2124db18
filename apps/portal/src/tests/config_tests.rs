use super::*;
use std::collections::HashMap;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn defaults_apply_without_file_or_env() {
    let settings = resolve_settings(None, env_from(&[])).expect("settings");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.aws_region, "us-east-1");
    assert_eq!(settings.upload_max_attempts, DEFAULT_MAX_ATTEMPTS);
    assert_eq!(settings.success_display_ms, 3000);
}

#[test]
fn environment_overrides_file_values() {
    let file = r#"
        s3_bucket = "from-file"
        aws_region = "eu-west-1"
        webhook_url = "https://hooks.example.com/file"
        success_display_ms = 500
    "#;
    let settings = resolve_settings(
        Some(file),
        env_from(&[("S3_BUCKET", "from-env"), ("AWS_ACCESS_KEY_ID", "AKID")]),
    )
    .expect("settings");

    assert_eq!(settings.s3_bucket.as_deref(), Some("from-env"));
    assert_eq!(settings.aws_region, "eu-west-1");
    assert_eq!(settings.aws_access_key_id.as_deref(), Some("AKID"));
    assert_eq!(
        settings.webhook_url.as_deref(),
        Some("https://hooks.example.com/file")
    );
    assert_eq!(settings.success_display_ms, 500);
}

#[test]
fn prefixed_variables_win_over_plain_ones() {
    let settings = resolve_settings(
        None,
        env_from(&[
            ("WEBHOOK_URL", "https://plain.example.com"),
            ("APP__WEBHOOK_URL", "https://prefixed.example.com"),
            ("APP__UPLOAD_MAX_ATTEMPTS", "5"),
        ]),
    )
    .expect("settings");

    assert_eq!(settings.webhook_url().expect("url"), "https://prefixed.example.com");
    assert_eq!(settings.upload_max_attempts, 5);
}

#[test]
fn unparsable_numbers_in_env_are_ignored() {
    let settings = resolve_settings(None, env_from(&[("APP__SUCCESS_DISPLAY_MS", "soon")]))
        .expect("settings");
    assert_eq!(settings.success_display_ms, 3000);
}

#[test]
fn unknown_file_keys_are_rejected() {
    let err = resolve_settings(Some("bucket = \"typo\""), env_from(&[])).unwrap_err();
    assert!(err.to_string().contains("bucket"), "{err}");
}

#[test]
fn s3_config_requires_bucket_and_credentials() {
    let settings = resolve_settings(
        None,
        env_from(&[("S3_BUCKET", "b"), ("AWS_ACCESS_KEY_ID", "AKID")]),
    )
    .expect("settings");
    let err = settings.s3_config().unwrap_err();
    assert!(err.to_string().contains("AWS_SECRET_ACCESS_KEY"), "{err}");

    let blank = resolve_settings(None, env_from(&[("WEBHOOK_URL", "  ")])).expect("settings");
    assert!(blank.webhook_url().is_err());
}

#[test]
fn s3_config_carries_endpoint_and_attempts() {
    let settings = resolve_settings(
        Some("s3_endpoint = \"http://127.0.0.1:9000\"\nupload_max_attempts = 0"),
        env_from(&[
            ("S3_BUCKET", "portal"),
            ("AWS_REGION", "ap-south-1"),
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]),
    )
    .expect("settings");

    let config = settings.s3_config().expect("s3 config");
    assert_eq!(config.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
    assert_eq!(config.max_attempts, 1);
    assert_eq!(
        config.public_url("recordings/1-a.mp3"),
        "https://portal.s3.ap-south-1.amazonaws.com/recordings/1-a.mp3"
    );
}

#[test]
fn missing_settings_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings(&dir.path().join("absent.toml")).expect("settings");
    assert_eq!(settings.success_display_ms, Settings::default().success_display_ms);
}
