use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current build metadata for one release channel, in the exact wire shape
/// the board page consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub release_channel: String,
    pub build_number: String,
    pub version_hash: String,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cannot derive an origin from {url}")]
    BadUrl { url: String },
    #[error("no script assets referenced by {url}")]
    NoAssets { url: String },
    #[error("no build metadata in any script asset of {url}")]
    MetadataNotFound { url: String },
}

static SCRIPT_ASSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"src="(/assets/[0-9A-Za-z._-]+\.js)""#).expect("valid regex"));
static BUILD_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"buildNumber["']?\s*[:=]\s*["'](\d+)["']"#).expect("valid regex"));
static VERSION_HASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"versionHash["']?\s*[:=]\s*["']([0-9a-f]{7,40})["']"#).expect("valid regex")
});

/// Fetches the channel's app page and digs the build number and version hash
/// out of its script bundles. The metadata lives in the last-listed bundle on
/// current deployments, so assets are scanned newest-first.
pub struct UpstreamClient {
    http: reqwest::Client,
    channel: String,
    page_url: String,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, channel: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            http,
            channel: channel.into(),
            page_url: page_url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<ReleaseRecord, UpstreamError> {
        let origin = origin_of(&self.page_url).ok_or_else(|| UpstreamError::BadUrl {
            url: self.page_url.clone(),
        })?;
        let page = self.get_text(&self.page_url).await?;

        let assets = script_assets(&page);
        if assets.is_empty() {
            return Err(UpstreamError::NoAssets {
                url: self.page_url.clone(),
            });
        }

        for asset in assets.iter().rev() {
            let script = self.get_text(&format!("{origin}{asset}")).await?;
            if let Some((build_number, version_hash)) = extract_build_metadata(&script) {
                return Ok(ReleaseRecord {
                    release_channel: self.channel.clone(),
                    build_number,
                    version_hash,
                });
            }
        }

        Err(UpstreamError::MetadataNotFound {
            url: self.page_url.clone(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, UpstreamError> {
        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

/// Script asset paths in document order, duplicates removed.
pub fn script_assets(page: &str) -> Vec<String> {
    let mut assets = Vec::new();
    for capture in SCRIPT_ASSET_RE.captures_iter(page) {
        let path = capture[1].to_string();
        if !assets.contains(&path) {
            assets.push(path);
        }
    }
    assets
}

pub fn extract_build_metadata(script: &str) -> Option<(String, String)> {
    let build = BUILD_NUMBER_RE.captures(script)?[1].to_string();
    let hash = VERSION_HASH_RE.captures(script)?[1].to_string();
    Some((build, hash))
}

#[async_trait::async_trait]
impl crate::fetcher::VersionFetcher for UpstreamClient {
    async fn get(&self) -> Result<ReleaseRecord, UpstreamError> {
        self.fetch().await
    }
}

/// `scheme://host` prefix of a URL, without any path.
pub fn origin_of(url: &str) -> Option<&str> {
    let scheme_end = url.find("://")?;
    let rest = &url[scheme_end + 3..];
    if rest.is_empty() {
        return None;
    }
    match rest.find('/') {
        Some(slash) => Some(&url[..scheme_end + 3 + slash]),
        None => Some(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PAGE: &str = r#"<!doctype html>
<html>
  <head>
    <script src="/assets/9f2b3c.vendor.js" defer></script>
    <script src="/assets/0a1b2c3d.main.js" defer></script>
    <script src="/assets/0a1b2c3d.main.js" defer></script>
  </head>
  <body></body>
</html>"#;

    #[test]
    fn script_assets_are_ordered_and_deduplicated() {
        let assets = script_assets(SAMPLE_PAGE);
        assert_eq!(
            assets,
            vec![
                "/assets/9f2b3c.vendor.js".to_string(),
                "/assets/0a1b2c3d.main.js".to_string(),
            ]
        );
    }

    #[test]
    fn metadata_is_extracted_from_bundle_source() {
        let script = r#"var env={releaseChannel:"canary",buildNumber:"71420",versionHash:"83e36a5ba7"};"#;
        let (build, hash) = extract_build_metadata(script).expect("metadata present");
        assert_eq!(build, "71420");
        assert_eq!(hash, "83e36a5ba7");
    }

    #[test]
    fn bundles_without_metadata_yield_none() {
        assert!(extract_build_metadata("console.log('nothing to see');").is_none());
        // A build number alone is not enough to produce a record.
        assert!(extract_build_metadata(r#"buildNumber:"123""#).is_none());
    }

    #[test]
    fn origin_keeps_scheme_and_host_only() {
        assert_eq!(
            origin_of("https://canary.example.com/login"),
            Some("https://canary.example.com")
        );
        assert_eq!(origin_of("https://example.com"), Some("https://example.com"));
        assert_eq!(origin_of("not a url"), None);
    }
}
