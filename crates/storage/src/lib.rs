use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use sitemapper_core::CrawlError;

/// Cache key: lowercase hex SHA-256 of the exact URL string as passed in.
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// One cached response, stored as a single JSON file named by the URL hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Disk-backed response cache with an optional sibling body store. Reads
/// treat every failure as a miss; writes are logged and ignored on failure —
/// a cache problem must never fail a crawl.
pub struct ResponseCache {
    dir: PathBuf,
    body_dir: Option<PathBuf>,
}

impl ResponseCache {
    pub async fn open(
        dir: impl Into<PathBuf>,
        body_dir: Option<PathBuf>,
    ) -> Result<Self, CrawlError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CrawlError::Storage(format!("cache dir {}: {e}", dir.display())))?;
        if let Some(body_dir) = &body_dir {
            fs::create_dir_all(body_dir).await.map_err(|e| {
                CrawlError::Storage(format!("body dir {}: {e}", body_dir.display()))
            })?;
        }
        Ok(Self { dir, body_dir })
    }

    pub fn body_dir(&self) -> Option<&Path> {
        self.body_dir.as_deref()
    }

    /// Missing file, unreadable file, and unparseable JSON are all a miss.
    /// A hit re-populates the body store so cached runs still feed the
    /// extractor.
    pub async fn get(&self, url: &str) -> Option<CacheRecord> {
        let hash = url_hash(url);
        let raw = fs::read(self.dir.join(&hash)).await.ok()?;
        let record: CacheRecord = serde_json::from_slice(&raw).ok()?;
        if let Some(body_dir) = &self.body_dir {
            if let Err(e) = fs::write(body_dir.join(&hash), record.body.as_bytes()).await {
                warn!(hash = %hash, "body store rehydrate failed: {}", e);
            }
        }
        debug!(url = %url, hash = %hash, "cache hit");
        Some(record)
    }

    pub async fn set(&self, url: &str, status: u16, content_type: Option<&str>, body: &str) {
        let hash = url_hash(url);
        let record = CacheRecord {
            url: url.to_string(),
            timestamp: Utc::now(),
            status,
            content_type: content_type.map(|ct| ct.to_string()),
            body: body.to_string(),
        };
        match serde_json::to_vec(&record) {
            Ok(json) => {
                if let Err(e) = fs::write(self.dir.join(&hash), json).await {
                    warn!(url = %url, "cache write failed: {}", e);
                }
            }
            Err(e) => warn!(url = %url, "cache serialize failed: {}", e),
        }
        if let Some(body_dir) = &self.body_dir {
            if let Err(e) = fs::write(body_dir.join(&hash), body.as_bytes()).await {
                warn!(url = %url, "body store write failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        // SHA-256("abc")
        assert_eq!(
            url_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(url_hash("https://ex/").len(), 64);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::open(tmp.path().join("cache"), None).await.unwrap();
        cache
            .set("https://ex/", 200, Some("text/html"), "<html></html>")
            .await;
        let record = cache.get("https://ex/").await.unwrap();
        assert_eq!(record.url, "https://ex/");
        assert_eq!(record.status, 200);
        assert_eq!(record.content_type.as_deref(), Some("text/html"));
        assert_eq!(record.body, "<html></html>");
    }

    #[tokio::test]
    async fn missing_entry_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::open(tmp.path().join("cache"), None).await.unwrap();
        assert!(cache.get("https://ex/none").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("cache");
        let cache = ResponseCache::open(dir.clone(), None).await.unwrap();
        std::fs::write(dir.join(url_hash("https://ex/bad")), "not json").unwrap();
        assert!(cache.get("https://ex/bad").await.is_none());
    }

    #[tokio::test]
    async fn body_store_is_written_on_set_and_rehydrated_on_get() {
        let tmp = TempDir::new().unwrap();
        let body_dir = tmp.path().join("bodies");
        let cache = ResponseCache::open(tmp.path().join("cache"), Some(body_dir.clone()))
            .await
            .unwrap();
        cache.set("https://ex/p", 200, Some("text/html"), "body-text").await;

        let hash = url_hash("https://ex/p");
        assert_eq!(
            std::fs::read_to_string(body_dir.join(&hash)).unwrap(),
            "body-text"
        );

        // wipe the body file; a cache hit must bring it back
        std::fs::remove_file(body_dir.join(&hash)).unwrap();
        cache.get("https://ex/p").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(body_dir.join(&hash)).unwrap(),
            "body-text"
        );
    }
}
