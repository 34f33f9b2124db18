use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
    header::{AUTHORIZATION, ETAG},
    Client, Method, Response, StatusCode,
};
use sha2::{Digest, Sha256};
use shared::{domain::LocalFile, error::UploadError};
use thiserror::Error;
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    sigv4::{self, Credentials, SignableRequest, Signer},
    BlobStore, ProgressListener, MAX_UPLOAD_BYTES,
};

pub const DEFAULT_PART_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_OBJECT_TAGGING: &str = "source=gametape-portal";

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub credentials: Credentials,
    /// Path-style endpoint override for S3-compatible servers.
    pub endpoint: Option<String>,
    /// Files up to this size go up in one PUT; larger ones use multipart, one part in flight.
    pub part_size: u64,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// `key=value` pairs sent as `x-amz-tagging` on new objects.
    pub object_tagging: Option<String>,
}

impl S3Config {
    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            credentials: Credentials {
                access_key_id: access_key_id.into(),
                secret_access_key: secret_access_key.into(),
            },
            endpoint: None,
            part_size: DEFAULT_PART_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            object_tagging: Some(DEFAULT_OBJECT_TAGGING.to_string()),
        }
    }

    /// Public location of an object; independent of any endpoint override.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{key}",
            self.bucket, self.region
        )
    }

    fn request_url(&self, key: &str, query: &[(String, String)]) -> Result<Url, S3Error> {
        let encoded_key = sigv4::uri_encode(key, false);
        let raw = match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{encoded_key}",
                endpoint.trim_end_matches('/'),
                sigv4::uri_encode(&self.bucket, true)
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{encoded_key}",
                self.bucket, self.region
            ),
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| S3Error::Protocol(format!("invalid object url '{raw}': {e}")))?;
        if !query.is_empty() {
            url.set_query(Some(&sigv4::canonical_query(query)));
        }
        Ok(url)
    }
}

#[derive(Debug, Error)]
enum S3Error {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("{operation} returned {status}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("failed to read upload source: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Protocol(String),
}

impl S3Error {
    fn is_network(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_connect() || err.is_timeout() || err.is_request())
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => self.is_network(),
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl From<S3Error> for UploadError {
    fn from(value: S3Error) -> Self {
        if value.is_network() {
            return UploadError::network();
        }
        let detail = value.to_string();
        match value {
            S3Error::Status { status, .. } if status == StatusCode::FORBIDDEN => {
                UploadError::access_denied()
            }
            _ if detail.contains("AccessDenied") || detail.contains("Access Denied") => {
                UploadError::access_denied()
            }
            _ => UploadError::unknown(detail),
        }
    }
}

struct CompletedPart {
    part_number: u32,
    etag: String,
}

struct ProgressReporter<'a> {
    listener: &'a dyn ProgressListener,
    total: u64,
    sent: u64,
    last: Option<u8>,
}

impl<'a> ProgressReporter<'a> {
    fn new(listener: &'a dyn ProgressListener, total: u64) -> Self {
        Self {
            listener,
            total,
            sent: 0,
            last: None,
        }
    }

    fn advance(&mut self, bytes: u64) {
        self.sent = (self.sent + bytes).min(self.total);
        self.emit(percent_of(self.sent, self.total));
    }

    fn finish(&mut self) {
        self.emit(100);
    }

    fn emit(&mut self, percent: u8) {
        if self.last.is_some_and(|last| last >= percent) {
            return;
        }
        self.last = Some(percent);
        self.listener.on_progress(percent);
    }
}

fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

pub struct S3BlobStore {
    http: Client,
    config: S3Config,
    signer: Signer,
}

impl S3BlobStore {
    pub fn new(config: S3Config) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: S3Config) -> Self {
        let signer = Signer::new(config.credentials.clone(), config.region.clone());
        Self {
            http,
            config,
            signer,
        }
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    fn object_headers(&self, content_type: &str) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        if let Some(tagging) = &self.config.object_tagging {
            headers.insert("x-amz-tagging".to_string(), tagging.clone());
        }
        headers
    }

    async fn put_object(
        &self,
        file: &LocalFile,
        key: &str,
        size_bytes: u64,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<(), S3Error> {
        let mut body = Vec::new();
        File::open(&file.path)
            .await?
            .take(size_bytes)
            .read_to_end(&mut body)
            .await?;
        let headers = self.object_headers(&file.content_type);
        self.send("PutObject", Method::PUT, key, &[], &headers, &body)
            .await?;
        reporter.advance(body.len() as u64);
        Ok(())
    }

    async fn put_multipart(
        &self,
        file: &LocalFile,
        key: &str,
        size_bytes: u64,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<(), S3Error> {
        let upload_id = self.create_multipart_upload(file, key).await?;
        debug!(key, upload_id = %upload_id, "multipart upload started");

        let outcome = match self.upload_parts(file, key, &upload_id, size_bytes, reporter).await {
            Ok(parts) => {
                self.complete_multipart_upload(key, &upload_id, &parts)
                    .await
            }
            Err(err) => Err(err),
        };

        if outcome.is_err() {
            self.abort_multipart_upload(key, &upload_id).await;
        }
        outcome
    }

    async fn create_multipart_upload(&self, file: &LocalFile, key: &str) -> Result<String, S3Error> {
        let query = [("uploads".to_string(), String::new())];
        let headers = self.object_headers(&file.content_type);
        let body = self
            .send("CreateMultipartUpload", Method::POST, key, &query, &headers, &[])
            .await?
            .text()
            .await?;

        extract_xml_text(&body, "UploadId")
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                S3Error::Protocol(format!(
                    "CreateMultipartUpload response missing UploadId: {body}"
                ))
            })
    }

    async fn upload_parts(
        &self,
        file: &LocalFile,
        key: &str,
        upload_id: &str,
        size_bytes: u64,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<Vec<CompletedPart>, S3Error> {
        // Never send more than was measured, even if the file grows mid-upload.
        let mut source = File::open(&file.path).await?.take(size_bytes);
        let mut parts = Vec::new();
        let mut part_number: u32 = 1;

        loop {
            let mut chunk = Vec::new();
            (&mut source)
                .take(self.config.part_size)
                .read_to_end(&mut chunk)
                .await?;
            if chunk.is_empty() {
                break;
            }

            let query = [
                ("partNumber".to_string(), part_number.to_string()),
                ("uploadId".to_string(), upload_id.to_string()),
            ];
            let response = self
                .send("UploadPart", Method::PUT, key, &query, &BTreeMap::new(), &chunk)
                .await?;
            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    S3Error::Protocol(format!("UploadPart {part_number} response missing ETag"))
                })?;

            parts.push(CompletedPart { part_number, etag });
            reporter.advance(chunk.len() as u64);
            part_number += 1;
        }

        if parts.is_empty() {
            return Err(S3Error::Protocol(format!(
                "'{}' was empty when read for upload",
                file.path.display()
            )));
        }
        Ok(parts)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), S3Error> {
        let query = [("uploadId".to_string(), upload_id.to_string())];
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/xml".to_string());

        let body = completion_body(parts);
        let response_body = self
            .send(
                "CompleteMultipartUpload",
                Method::POST,
                key,
                &query,
                &headers,
                body.as_bytes(),
            )
            .await?
            .text()
            .await?;

        // S3 may report a failed completion inside a 200 response.
        if response_body.contains("<Error>") {
            return Err(S3Error::Protocol(format!(
                "CompleteMultipartUpload failed: {response_body}"
            )));
        }
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) {
        let query = [("uploadId".to_string(), upload_id.to_string())];
        if let Err(err) = self
            .send("AbortMultipartUpload", Method::DELETE, key, &query, &BTreeMap::new(), &[])
            .await
        {
            warn!(key, upload_id, error = %err, "failed to abort multipart upload");
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        key: &str,
        query: &[(String, String)],
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<Response, S3Error> {
        let mut attempt = 1;
        loop {
            match self
                .send_once(operation, method.clone(), key, query, headers, body)
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(operation, attempt, error = %err, "retrying S3 request");
                    tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(
        &self,
        operation: &'static str,
        method: Method,
        key: &str,
        query: &[(String, String)],
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<Response, S3Error> {
        let url = self.config.request_url(key, query)?;
        let host = host_header(&url)?;
        let payload_sha256 = hex::encode(Sha256::digest(body));
        let now = Utc::now();

        let mut signed_headers = headers.clone();
        signed_headers.insert("x-amz-content-sha256".to_string(), payload_sha256.clone());
        signed_headers.insert("x-amz-date".to_string(), sigv4::amz_date(now));

        let authorization = self.signer.authorization(
            &SignableRequest {
                method: method.as_str(),
                host: &host,
                path: url.path(),
                query,
                headers: &signed_headers,
                payload_sha256: &payload_sha256,
            },
            now,
        );

        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, authorization)
            .body(body.to_vec());
        for (name, value) in &signed_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(S3Error::Status {
            operation,
            status,
            body,
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload_blob(
        &self,
        file: &LocalFile,
        key: &str,
        progress: &dyn ProgressListener,
    ) -> Result<String, UploadError> {
        if file.size_bytes > MAX_UPLOAD_BYTES {
            warn!(
                key,
                size_bytes = file.size_bytes,
                "refusing upload above size ceiling"
            );
            return Err(UploadError::size_limit());
        }

        let size_bytes = match tokio::fs::metadata(&file.path).await {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                error!(key, path = %file.path.display(), error = %err, "cannot stat upload source");
                return Err(S3Error::from(err).into());
            }
        };
        if size_bytes > MAX_UPLOAD_BYTES {
            warn!(
                key,
                selected_size = file.size_bytes,
                size_bytes,
                "upload source grew past size ceiling"
            );
            return Err(UploadError::size_limit());
        }

        let mut reporter = ProgressReporter::new(progress, size_bytes);
        let result = if size_bytes <= self.config.part_size {
            self.put_object(file, key, size_bytes, &mut reporter).await
        } else {
            self.put_multipart(file, key, size_bytes, &mut reporter).await
        };

        match result {
            Ok(()) => {
                reporter.finish();
                info!(key, size_bytes, "upload complete");
                Ok(self.config.public_url(key))
            }
            Err(err) => {
                error!(
                    key,
                    bucket = %self.config.bucket,
                    region = %self.config.region,
                    content_type = %file.content_type,
                    size_bytes,
                    error = %err,
                    "S3 upload failed"
                );
                Err(err.into())
            }
        }
    }
}

fn host_header(url: &Url) -> Result<String, S3Error> {
    let host = url
        .host_str()
        .ok_or_else(|| S3Error::Protocol(format!("object url '{url}' has no host")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn extract_xml_text<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}

fn completion_body(parts: &[CompletedPart]) -> String {
    let mut xml = String::from("<CompleteMultipartUpload>");
    for part in parts {
        xml.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            part.part_number, part.etag
        ));
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}
