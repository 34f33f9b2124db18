//! AWS Signature Version 4 for S3 requests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Everything that goes into the canonical request. `path` must already be
/// URI-encoded; `headers` are lowercase names and exclude `host`.
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub headers: &'a BTreeMap<String, String>,
    pub payload_sha256: &'a str,
}

#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
    region: String,
}

impl Signer {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self, request: &SignableRequest<'_>, at: DateTime<Utc>) -> String {
        let signature = self.signature(request, at);
        format!(
            "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={signature}",
            self.credentials.access_key_id,
            self.scope(at),
            signed_headers(request),
        )
    }

    pub fn signature(&self, request: &SignableRequest<'_>, at: DateTime<Utc>) -> String {
        let string_to_sign = self.string_to_sign(request, at);
        let key = self.signing_key(at);
        hex::encode(hmac(&key, string_to_sign.as_bytes()))
    }

    fn string_to_sign(&self, request: &SignableRequest<'_>, at: DateTime<Utc>) -> String {
        let canonical = canonical_request(request);
        format!(
            "{ALGORITHM}\n{}\n{}\n{}",
            amz_date(at),
            self.scope(at),
            hex::encode(Sha256::digest(canonical.as_bytes()))
        )
    }

    fn scope(&self, at: DateTime<Utc>) -> String {
        format!("{}/{}/{SERVICE}/aws4_request", short_date(at), self.region)
    }

    fn signing_key(&self, at: DateTime<Utc>) -> Vec<u8> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let date_key = hmac(secret.as_bytes(), short_date(at).as_bytes());
        let region_key = hmac(&date_key, self.region.as_bytes());
        let service_key = hmac(&region_key, SERVICE.as_bytes());
        hmac(&service_key, b"aws4_request")
    }
}

pub fn amz_date(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

fn short_date(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d").to_string()
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac key of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn canonical_request(request: &SignableRequest<'_>) -> String {
    let mut canonical_headers = format!("host:{}\n", request.host.trim());
    for (name, value) in request.headers {
        canonical_headers.push_str(&format!("{name}:{}\n", value.trim()));
    }

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        canonical_query(request.query),
        canonical_headers,
        signed_headers(request),
        request.payload_sha256
    )
}

fn signed_headers(request: &SignableRequest<'_>) -> String {
    let mut names: Vec<&str> = request.headers.keys().map(String::as_str).collect();
    names.push("host");
    names.sort_unstable();
    names.join(";")
}

/// Sorted `key=value` pairs joined by `&`, both sides URI-encoded.
pub fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
