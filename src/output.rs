use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use sitemapper_frontier::CrawlFrontier;

#[derive(Debug, Serialize)]
struct FailedUrl {
    url: String,
    referrers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FailureGroup {
    error: String,
    urls: Vec<FailedUrl>,
}

/// One URL per line, ASCII-sorted, newline-terminated.
pub async fn write_discovered(path: &str, mut urls: Vec<String>) -> Result<()> {
    urls.sort_unstable();
    let mut out = String::new();
    for url in &urls {
        out.push_str(url);
        out.push('\n');
    }
    tokio::fs::write(path, out)
        .await
        .with_context(|| format!("write {path}"))
}

/// YAML report of failed URLs grouped by verbatim error string. Groups are
/// sorted by error, URLs within a group by URL, referrers ASCII-sorted.
pub async fn write_failed(path: &str, frontier: &CrawlFrontier) -> Result<()> {
    let groups = failure_groups(frontier);
    let yaml = serde_yaml::to_string(&groups).context("serialize failure report")?;
    tokio::fs::write(path, yaml)
        .await
        .with_context(|| format!("write {path}"))
}

fn failure_groups(frontier: &CrawlFrontier) -> Vec<FailureGroup> {
    let mut by_error: BTreeMap<String, Vec<FailedUrl>> = BTreeMap::new();
    for (url, error) in frontier.failures() {
        let referrers = frontier.referrers_of(&url);
        by_error
            .entry(error)
            .or_default()
            .push(FailedUrl { url, referrers });
    }
    by_error
        .into_iter()
        .map(|(error, mut urls)| {
            urls.sort_by(|a, b| a.url.cmp(&b.url));
            FailureGroup { error, urls }
        })
        .collect()
}
