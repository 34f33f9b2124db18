use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use client_core::{
    ControllerEvent, EntryField, FieldKey, SubmissionController, SubmissionPhase, WebhookNotifier,
};
use shared::domain::Category;
use storage::S3BlobStore;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod manifest;

use config::load_settings;
use manifest::Manifest;

#[derive(Parser, Debug)]
#[command(name = "portal", about = "Submit call recordings and marketing materials for review")]
struct Cli {
    /// Settings file; environment variables override it.
    #[arg(long, default_value = "portal.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a manifest without uploading anything.
    Validate { manifest: PathBuf },
    /// Upload the manifest's files and send the submission.
    Submit { manifest: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Validate { manifest } => validate(&manifest).await,
        Command::Submit { manifest } => submit(&cli.config, &manifest).await,
    }
}

async fn load_into(path: &Path, controller: &mut SubmissionController) -> Result<()> {
    let manifest = Manifest::load(path).await?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    manifest.apply(base_dir, controller).await
}

async fn validate(path: &Path) -> Result<()> {
    let mut controller = SubmissionController::new(Category::Sales);
    load_into(path, &mut controller).await?;

    let errors = controller.validate();
    if errors.is_empty() {
        println!(
            "{} is ready: {} {}",
            path.display(),
            controller.submission().entries.len(),
            noun(controller.category())
        );
        return Ok(());
    }

    for (key, message) in errors.iter() {
        println!("  {}: {message}", field_label(key));
    }
    Err(anyhow!("manifest has {} problem(s)", errors.len()))
}

async fn submit(config_path: &Path, path: &Path) -> Result<()> {
    let settings = load_settings(config_path)?;
    let s3_config = settings.s3_config()?;
    info!(
        bucket = %s3_config.bucket,
        region = %s3_config.region,
        endpoint = ?s3_config.endpoint,
        "storage configured"
    );
    let blob_store = S3BlobStore::new(s3_config);
    let notifier = WebhookNotifier::new(settings.webhook_url()?);

    let mut controller = SubmissionController::new_with_dependencies(
        Category::Sales,
        Arc::new(blob_store),
        Arc::new(notifier),
    )
    .with_success_display(Duration::from_millis(settings.success_display_ms));
    load_into(path, &mut controller).await?;

    let printer = tokio::spawn(print_events(controller.subscribe_events()));
    let category = controller.category();
    let result = controller.submit().await;
    drop(controller);
    let _ = printer.await;

    match result {
        Ok(receipt) => {
            println!(
                "Success! Your {} have been uploaded ({} total).",
                noun(category),
                receipt.payload.recordings.len()
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err.user_message());
            Err(anyhow!("submission was not delivered"))
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<ControllerEvent>) {
    loop {
        match events.recv().await {
            Ok(ControllerEvent::PhaseChanged(SubmissionPhase::Uploading { index, total })) => {
                println!("uploading {}/{total}", index + 1);
            }
            Ok(ControllerEvent::PhaseChanged(SubmissionPhase::Notifying)) => {
                println!("sending submission");
            }
            Ok(ControllerEvent::UploadProgress { entry_id, percent }) => {
                println!("  recording {entry_id}: {percent}%");
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

fn noun(category: Category) -> &'static str {
    match category {
        Category::Sales => "recordings",
        Category::Marketing => "materials",
    }
}

fn field_label(key: FieldKey) -> String {
    match key {
        FieldKey::SubmitterName => "full_name".into(),
        FieldKey::SubmitterEmail => "email".into(),
        FieldKey::Entries => "recordings".into(),
        FieldKey::Entry { index, field } => {
            let field = match field {
                EntryField::Name => "name",
                EntryField::Strengths => "strengths",
                EntryField::Improvements => "improvements",
                EntryField::Source => "file",
            };
            format!("recordings[{}].{field}", index + 1)
        }
    }
}
