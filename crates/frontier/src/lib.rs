use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;
use tracing::debug;

use sitemapper_core::{CrawlObserver, UrlNormalizer};

/// One pending fetch. Fallback eligibility was captured at discovery time and
/// rides along unchanged through retry re-enqueues.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: String,
    pub attempts: u32,
    pub can_http_fallback: bool,
    pub can_no_port_fallback: bool,
    /// Sitemap semantics stick across the fetch: a `text/plain` body is only
    /// parsed as sitemap XML when the entry carried this at enqueue time.
    pub is_sitemap: bool,
}

/// Frontier queue plus every set the engine shares across workers. All URLs
/// stored anywhere in here are normalized.
pub struct CrawlFrontier {
    queue: Mutex<VecDeque<FrontierEntry>>,
    in_flight: AtomicUsize,
    seen: DashSet<String>,
    discovered: DashSet<String>,
    failed: DashMap<String, String>,
    referrers: DashMap<String, HashSet<String>>,
    html_hashes: DashSet<String>,
    normalizer: UrlNormalizer,
    observer: Arc<dyn CrawlObserver>,
}

impl CrawlFrontier {
    pub fn new(normalizer: UrlNormalizer, observer: Arc<dyn CrawlObserver>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            seen: DashSet::new(),
            discovered: DashSet::new(),
            failed: DashMap::new(),
            referrers: DashMap::new(),
            html_hashes: DashSet::new(),
            normalizer,
            observer,
        }
    }

    pub fn normalizer(&self) -> &UrlNormalizer {
        &self.normalizer
    }

    pub fn observer(&self) -> &dyn CrawlObserver {
        self.observer.as_ref()
    }

    /// Add a discovered reference. Records the referrer edge for every
    /// discovery (seen or not), then dedups against `seen`. Returns true if a
    /// new frontier entry was created.
    pub async fn enqueue(
        &self,
        raw_url: &str,
        from_additional_host: bool,
        source: Option<&str>,
        is_sitemap: bool,
    ) -> bool {
        let (was_http, was_portless) = self.normalizer.pre_normalization_flags(raw_url);
        let Some(url) = self.normalizer.normalize(raw_url) else {
            return false;
        };

        if let Some(source) = source {
            self.referrers
                .entry(url.clone())
                .or_default()
                .insert(source.to_string());
        }
        self.observer.on_enqueue(&url, source);

        if !self.seen.insert(url.clone()) {
            return false;
        }

        let entry = FrontierEntry {
            url,
            attempts: 0,
            can_http_fallback: was_http,
            can_no_port_fallback: was_portless && !from_additional_host,
            is_sitemap,
        };
        debug!(url = %entry.url, is_sitemap, "enqueued");
        self.queue.lock().await.push_back(entry);
        true
    }

    /// Re-queue a retry. Bypasses dedup: the URL is already in `seen`.
    pub async fn requeue(&self, entry: FrontierEntry) {
        self.queue.lock().await.push_back(entry);
    }

    /// Pop the next entry. The in-flight counter goes up while the queue lock
    /// is still held, so the idle check can never observe an empty queue with
    /// a zero counter mid-handoff.
    pub async fn pop(&self) -> Option<FrontierEntry> {
        let mut queue = self.queue.lock().await;
        let entry = queue.pop_front()?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(entry)
    }

    /// Balance a prior `pop` once the entry's processing is finished,
    /// including any re-enqueues it performed.
    pub fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Quiescence: nothing queued and nothing being processed.
    pub async fn is_idle(&self) -> bool {
        let queue = self.queue.lock().await;
        queue.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Idempotent insert into the discovered set.
    pub fn mark_discovered(&self, url: &str) -> bool {
        let inserted = self.discovered.insert(url.to_string());
        if inserted {
            self.observer.on_discover(url);
        }
        inserted
    }

    /// Keep the last error string per URL.
    pub fn record_failure(&self, url: &str, error: &str) {
        self.failed.insert(url.to_string(), error.to_string());
    }

    pub fn record_html_hash(&self, hash: String) {
        self.html_hashes.insert(hash);
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn is_seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.len()
    }

    pub fn is_discovered(&self, url: &str) -> bool {
        self.discovered.contains(url)
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn discovered_urls(&self) -> Vec<String> {
        self.discovered.iter().map(|u| u.key().clone()).collect()
    }

    /// (url, last error) pairs for the failure report.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.failed
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn failure_of(&self, url: &str) -> Option<String> {
        self.failed.get(url).map(|e| e.value().clone())
    }

    /// Sorted referrers of a URL; empty when nothing ever linked to it.
    pub fn referrers_of(&self, url: &str) -> Vec<String> {
        let mut sources: Vec<String> = self
            .referrers
            .get(url)
            .map(|e| e.value().iter().cloned().collect())
            .unwrap_or_default();
        sources.sort_unstable();
        sources
    }

    pub fn html_hashes(&self) -> Vec<String> {
        self.html_hashes.iter().map(|h| h.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemapper_core::NoopObserver;

    fn frontier() -> CrawlFrontier {
        let normalizer = UrlNormalizer::from_seed("https://ex:8080/", false).unwrap();
        CrawlFrontier::new(normalizer, Arc::new(NoopObserver))
    }

    #[tokio::test]
    async fn enqueue_normalizes_and_dedups() {
        let f = frontier();
        assert!(f.enqueue("http://ex/a", false, None, false).await);
        // same page under a different surface form
        assert!(!f.enqueue("https://ex:8080/a#frag", false, None, false).await);
        assert_eq!(f.queue_len().await, 1);
        assert!(f.is_seen("https://ex:8080/a"));
    }

    #[tokio::test]
    async fn fallback_flags_come_from_the_raw_reference() {
        let f = frontier();
        f.enqueue("http://ex/a", false, None, false).await;
        let entry = f.pop().await.unwrap();
        assert!(entry.can_http_fallback);
        assert!(entry.can_no_port_fallback);

        f.enqueue("https://ex:8080/b", false, None, false).await;
        let entry = f.pop().await.unwrap();
        assert!(!entry.can_http_fallback);
        assert!(!entry.can_no_port_fallback);
    }

    #[tokio::test]
    async fn additional_host_references_never_get_port_fallback() {
        let f = frontier();
        f.enqueue("http://ex/c", true, None, false).await;
        let entry = f.pop().await.unwrap();
        assert!(entry.can_http_fallback);
        assert!(!entry.can_no_port_fallback);
    }

    #[tokio::test]
    async fn referrer_edges_accumulate_for_seen_urls() {
        let f = frontier();
        f.enqueue("https://ex/c", false, Some("https://ex:8080/a"), false)
            .await;
        f.enqueue("https://ex/c", false, Some("https://ex:8080/b"), false)
            .await;
        assert_eq!(
            f.referrers_of("https://ex:8080/c"),
            vec!["https://ex:8080/a".to_string(), "https://ex:8080/b".to_string()]
        );
        assert_eq!(f.queue_len().await, 1);
    }

    #[tokio::test]
    async fn unnormalizable_references_are_dropped() {
        let f = frontier();
        assert!(!f.enqueue("mailto:x@ex", false, Some("https://ex/"), false).await);
        assert_eq!(f.seen_count(), 0);
    }

    #[tokio::test]
    async fn idle_only_after_pop_is_balanced() {
        let f = frontier();
        f.enqueue("https://ex/a", false, None, false).await;
        assert!(!f.is_idle().await);
        let _entry = f.pop().await.unwrap();
        assert!(!f.is_idle().await);
        f.finish();
        assert!(f.is_idle().await);
    }

    #[tokio::test]
    async fn discovered_insert_is_idempotent() {
        let f = frontier();
        assert!(f.mark_discovered("https://ex:8080/a"));
        assert!(!f.mark_discovered("https://ex:8080/a"));
        assert_eq!(f.discovered_count(), 1);
    }
}
