//! Request signing for the object-storage backends.
//!
//! Both S3 and Aliyun OSS use a four-step HMAC-SHA256 scheme: build a
//! canonical request, hash it into a string-to-sign, derive a scoped
//! signing key from the secret, and sign. They differ in header names,
//! key-derivation prefixes and the canonical URI.
//!
//! | | S3 (SigV4) | OSS (V4) |
//! |---|---|---|
//! | Algorithm | `AWS4-HMAC-SHA256` | `OSS4-HMAC-SHA256` |
//! | Key prefix | `AWS4` | `aliyun_v4` |
//! | Scope terminator | `aws4_request` | `aliyun_v4_request` |
//! | Canonical URI | `/<key>` (virtual-hosted) | `/<bucket>/<key>` |
//! | Payload hash | SHA-256 of the empty body | `UNSIGNED-PAYLOAD` |
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`, `hex`).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::env_var;

type HmacSha256 = Hmac<Sha256>;

/// Access key pair, plus an optional session token for temporary credentials.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Load from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
    /// optionally `AWS_SESSION_TOKEN`.
    pub fn aws_from_env() -> docchat_core::Result<Self> {
        Ok(Self {
            access_key_id: env_var("AWS_ACCESS_KEY_ID")?,
            secret_access_key: env_var("AWS_SECRET_ACCESS_KEY")?,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }

    /// Load from `OSS_ACCESS_KEY_ID`, `OSS_ACCESS_KEY_SECRET` and
    /// optionally `OSS_SESSION_TOKEN`.
    pub fn oss_from_env() -> docchat_core::Result<Self> {
        Ok(Self {
            access_key_id: env_var("OSS_ACCESS_KEY_ID")?,
            secret_access_key: env_var("OSS_ACCESS_KEY_SECRET")?,
            session_token: std::env::var("OSS_SESSION_TOKEN").ok(),
        })
    }
}

/// A GET request to sign: host, canonical path and query parameters.
pub struct RequestParts<'a> {
    pub host: &'a str,
    /// Already URI-encoded path, starting with `/`.
    pub path: &'a str,
    pub query: &'a [(String, String)],
}

// ============ AWS SigV4 ============

/// Headers (including `Authorization`) for an S3 GET request.
pub fn sign_s3_get(
    creds: &Credentials,
    region: &str,
    req: &RequestParts<'_>,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(b"");

    let mut headers = vec![
        ("host".to_string(), req.host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers = signed_header_list(&headers);
    let canonical_request = format!(
        "GET\n{}\n{}\n{}\n{}\n{}",
        req.path,
        canonical_query(req.query),
        canonical_headers(&headers),
        signed_headers,
        payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(
        &format!("AWS4{}", creds.secret_access_key),
        &date_stamp,
        region,
        "s3",
        "aws4_request",
    );
    let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    headers.retain(|(k, _)| k != "host");
    headers.push(("authorization".to_string(), authorization));
    headers
}

// ============ OSS V4 ============

/// Headers (including `Authorization`) for an OSS GET request.
///
/// `region` is the bare region id (`cn-hangzhou`), not the `oss-` endpoint
/// label. `resource` is the encoded object path within the bucket,
/// starting with `/`.
pub fn sign_oss_get(
    creds: &Credentials,
    region: &str,
    bucket: &str,
    resource: &str,
    query: &[(String, String)],
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let oss_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = "UNSIGNED-PAYLOAD".to_string();

    let mut headers = vec![
        ("x-oss-content-sha256".to_string(), payload_hash.clone()),
        ("x-oss-date".to_string(), oss_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-oss-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    // No additional headers are signed.
    let canonical_request = format!(
        "GET\n/{}{}\n{}\n{}\n\n{}",
        bucket,
        resource,
        canonical_query(query),
        canonical_headers(&headers),
        payload_hash
    );

    let scope = format!("{}/{}/oss/aliyun_v4_request", date_stamp, region);
    let string_to_sign = format!(
        "OSS4-HMAC-SHA256\n{}\n{}\n{}",
        oss_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(
        &format!("aliyun_v4{}", creds.secret_access_key),
        &date_stamp,
        region,
        "oss",
        "aliyun_v4_request",
    );
    let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

    headers.push((
        "authorization".to_string(),
        format!(
            "OSS4-HMAC-SHA256 Credential={}/{},Signature={}",
            creds.access_key_id, scope, signature
        ),
    ));
    headers
}

// ============ Helpers ============

/// Sorted, encoded `k=v&k=v` query string.
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut sorted: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    sorted.sort();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encode an object key for a request path, keeping `/` separators.
pub fn encode_key_path(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

fn canonical_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect()
}

fn signed_header_list(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

/// Compute the hex-encoded SHA-256 hash of data.
pub fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive a scoped signing key.
///
/// ```text
/// kDate    = HMAC(prefix + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, terminator)
/// ```
fn derive_signing_key(
    prefixed_secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
    terminator: &str,
) -> Vec<u8> {
    let k_date = hmac_sha256(prefixed_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, terminator.as_bytes())
}

/// URI-encode a string per RFC 3986.
///
/// Encodes all characters except unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
pub fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
