//! Aliyun OSS blob store.
//!
//! Lists and downloads objects through the OSS REST API, signed with OSS
//! Signature V4 (`OSS4-HMAC-SHA256`). Listing uses `ListObjects` (v1): each
//! page's `NextMarker` becomes the cursor for the next page.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! backend = "oss"
//! bucket = "acme-docs"
//! region = "oss-cn-hangzhou"        # or "cn-hangzhou"
//! # endpoint_url = "oss-cn-hangzhou-internal.aliyuncs.com"
//! ```
//!
//! # Environment Variables
//!
//! - `OSS_ACCESS_KEY_ID`: required
//! - `OSS_ACCESS_KEY_SECRET`: required
//! - `OSS_SESSION_TOKEN`: optional (STS credentials)

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use docchat_core::storage::{BlobStore, KeyPage};
use docchat_core::{Error, Result};
use tracing::debug;

use crate::config::StorageConfig;
use crate::http::{build_client, read_text, status_error, transport_error};
use crate::listing::{parse_listing, KeyFilter};
use crate::signing::{canonical_query, encode_key_path, sign_oss_get, Credentials};

const NAME: &str = "oss";

pub struct OssBlobStore {
    config: StorageConfig,
    creds: Credentials,
    client: reqwest::Client,
    filter: KeyFilter,
    closed: AtomicBool,
}

impl OssBlobStore {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let creds = Credentials::oss_from_env()?;
        Self::with_credentials(config, creds)
    }

    pub fn with_credentials(config: StorageConfig, creds: Credentials) -> Result<Self> {
        let client = build_client(
            NAME,
            std::time::Duration::from_secs(config.timeout_secs),
        )?;
        Self::with_client(config, creds, client)
    }

    /// Use a caller-built HTTP client, e.g. one that resolves the bucket
    /// host to a private endpoint.
    pub fn with_client(
        config: StorageConfig,
        creds: Credentials,
        client: reqwest::Client,
    ) -> Result<Self> {
        let filter = KeyFilter::new(
            &config.prefix,
            &config.include_globs,
            &config.exclude_globs,
        )?;
        Ok(Self {
            config,
            creds,
            client,
            filter,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::unavailable(NAME, "store has been closed"));
        }
        Ok(())
    }

    /// Region id used in the signing scope (`cn-hangzhou`).
    fn region_id(&self) -> &str {
        self.config
            .region
            .strip_prefix("oss-")
            .unwrap_or(&self.config.region)
    }

    /// `(scheme, host)` with the bucket as a subdomain of the endpoint.
    fn endpoint(&self) -> (&str, String) {
        let (scheme, endpoint) = match self.config.endpoint_url {
            Some(ref url) => {
                let scheme = if url.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                (scheme, host)
            }
            None => ("https", format!("oss-{}.aliyuncs.com", self.region_id())),
        };
        (scheme, format!("{}.{}", self.config.bucket, endpoint))
    }

    async fn signed_get(
        &self,
        resource: &str,
        query: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let headers = sign_oss_get(
            &self.creds,
            self.region_id(),
            &self.config.bucket,
            resource,
            query,
            Utc::now(),
        );

        let (scheme, host) = self.endpoint();
        let query_string = canonical_query(query);
        let url = if query_string.is_empty() {
            format!("{}://{}{}", scheme, host, resource)
        } else {
            format!("{}://{}{}?{}", scheme, host, resource, query_string)
        };

        let mut builder = self.client.get(&url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.send().await.map_err(|e| transport_error(NAME, e))
    }
}

#[async_trait]
impl BlobStore for OssBlobStore {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_page(&self, cursor: Option<&str>) -> Result<KeyPage> {
        self.check_open()?;

        let mut query = vec![("max-keys".to_string(), self.config.page_size.to_string())];
        if !self.config.prefix.is_empty() {
            query.push(("prefix".to_string(), self.config.prefix.clone()));
        }
        if let Some(marker) = cursor {
            query.push(("marker".to_string(), marker.to_string()));
        }

        let resp = self.signed_get("/", &query).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::FatalConfig(format!(
                "OSS bucket '{}' does not exist",
                self.config.bucket
            )));
        }
        let xml = read_text(NAME, resp, None).await?;
        let listing = parse_listing(NAME, &xml)?;

        let listed = listing.keys.len();
        let keys: Vec<String> = listing
            .keys
            .into_iter()
            .filter(|k| self.filter.matches(k))
            .collect();
        debug!(bucket = %self.config.bucket, listed, kept = keys.len(), "oss list page");

        let next = if listing.is_truncated {
            match listing.next_marker {
                Some(marker) => Some(marker),
                None => return Err(Error::transient(NAME, "truncated listing without NextMarker")),
            }
        } else {
            None
        };
        Ok(KeyPage { keys, next })
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.check_open()?;
        let resource = format!("/{}", encode_key_path(key));
        let resp = self.signed_get(&resource, &[]).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(NAME, status, &body, Some(key)));
        }
        let bytes = resp.bytes().await.map_err(|e| transport_error(NAME, e))?;
        debug!(key, bytes = bytes.len(), "oss get object");
        Ok(bytes.to_vec())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(region: &str, endpoint: Option<&str>) -> OssBlobStore {
        let config = StorageConfig {
            backend: "oss".into(),
            bucket: "pdfs".into(),
            region: region.into(),
            prefix: String::new(),
            include_globs: vec!["**/*.pdf".into()],
            exclude_globs: vec![],
            endpoint_url: endpoint.map(str::to_string),
            page_size: 1000,
            timeout_secs: 5,
        };
        let creds = Credentials {
            access_key_id: "id".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        };
        OssBlobStore::with_credentials(config, creds).unwrap()
    }

    #[test]
    fn test_region_id_accepts_endpoint_label() {
        assert_eq!(store("oss-cn-hangzhou", None).region_id(), "cn-hangzhou");
        assert_eq!(store("cn-beijing", None).region_id(), "cn-beijing");
    }

    #[test]
    fn test_default_endpoint() {
        let binding = store("oss-cn-hangzhou", None);
        let (scheme, host) = binding.endpoint();
        assert_eq!(scheme, "https");
        assert_eq!(host, "pdfs.oss-cn-hangzhou.aliyuncs.com");
    }

    #[test]
    fn test_custom_endpoint() {
        let (_, host) =
            store("cn-hangzhou", Some("https://oss-cn-hangzhou-internal.aliyuncs.com")).endpoint();
        assert_eq!(host, "pdfs.oss-cn-hangzhou-internal.aliyuncs.com");
    }
}
