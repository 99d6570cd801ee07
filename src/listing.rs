//! Object listing helpers shared by the S3 and OSS blob stores.
//!
//! - [`parse_listing`] reads a `ListBucketResult` document (both
//!   `ListObjectsV2` continuation tokens and `ListObjects` markers).
//! - [`KeyFilter`] applies the configured prefix and include/exclude globs.

use docchat_core::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Fields of interest from one `ListBucketResult` page.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListingXml {
    pub keys: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
    pub next_marker: Option<String>,
}

/// Parse a bucket listing. Directory placeholders (keys ending in `/`) are dropped.
pub fn parse_listing(backend: &str, xml: &str) -> Result<ListingXml> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut listing = ListingXml::default();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::transient(backend, format!("malformed listing: {}", e)))?
                    .into_owned();
                let tail: Vec<&str> = path.iter().rev().take(2).map(String::as_str).collect();
                match tail.as_slice() {
                    ["Key", "Contents"] => {
                        if !text.ends_with('/') {
                            listing.keys.push(text);
                        }
                    }
                    ["IsTruncated", "ListBucketResult"] => listing.is_truncated = text == "true",
                    ["NextContinuationToken", "ListBucketResult"] => {
                        listing.next_continuation_token = Some(text)
                    }
                    ["NextMarker", "ListBucketResult"] => listing.next_marker = Some(text),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::transient(
                    backend,
                    format!("malformed listing at byte {}: {}", reader.error_position(), e),
                ))
            }
            _ => {}
        }
    }

    Ok(listing)
}

/// Prefix + glob filter applied to listed keys.
///
/// Globs match the key relative to the prefix.
pub struct KeyFilter {
    prefix: String,
    include: GlobSet,
    exclude: GlobSet,
}

impl KeyFilter {
    pub fn new(prefix: &str, include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        let rel_key = if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix)
                .map(|s| s.trim_start_matches('/'))
                .unwrap_or(key)
        };
        !self.exclude.is_match(rel_key) && self.include.is_match(rel_key)
    }
}

/// Build a [`GlobSet`] from a list of glob pattern strings.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::FatalConfig(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::FatalConfig(format!("invalid glob set: {}", e)))
}
