/// Diagnostic hook into the crawl. All methods default to no-ops so callers
/// only override the points they care about.
pub trait CrawlObserver: Send + Sync {
    fn on_enqueue(&self, _url: &str, _source: Option<&str>) {}
    fn on_fetch_start(&self, _url: &str, _attempt: u32) {}
    fn on_fetch_complete(&self, _url: &str, _outcome: &str) {}
    fn on_discover(&self, _url: &str) {}
}

pub struct NoopObserver;

impl CrawlObserver for NoopObserver {}
