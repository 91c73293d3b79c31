use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use sitemapper_core::{AppConfig, FetchConfig};
use sitemapper_fetch::{fetch_url, FetchOutcome, HttpFetcher};

/// Re-probe a file of previously failed URLs with the normal fetch policy
/// (retries, no cache, no fallbacks) and report what recovered.
pub async fn run(config: AppConfig, file: &str) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read URL file {file}"))?;
    let urls: Vec<String> = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect();
    if urls.is_empty() {
        info!("nothing to recheck");
        return Ok(());
    }

    let fetch_config = FetchConfig {
        timeout: Duration::from_secs(config.http.timeout_seconds),
        user_agent: config.http.user_agent.clone(),
        max_retries: config.general.max_retries,
        preferred_port: None,
    };
    let client = Arc::new(HttpFetcher::new(&fetch_config)?);
    let fetch_config = Arc::new(fetch_config);
    let semaphore = Arc::new(Semaphore::new(config.general.concurrency.max(1)));

    info!(count = urls.len(), "rechecking URLs");
    let mut handles = Vec::with_capacity(urls.len());
    for url in urls {
        let permit = semaphore.clone().acquire_owned().await?;
        let client = Arc::clone(&client);
        let fetch_config = Arc::clone(&fetch_config);
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            let mut attempts = 0;
            loop {
                match fetch_url(
                    client.as_ref(),
                    &url,
                    attempts,
                    false,
                    false,
                    None,
                    &fetch_config,
                )
                .await
                {
                    FetchOutcome::Retry => attempts += 1,
                    FetchOutcome::Success(page) => {
                        info!(url = %url, status = page.status, "recovered");
                        return true;
                    }
                    FetchOutcome::Failed(error) => {
                        warn!(url = %url, "still failing: {}", error);
                        return false;
                    }
                }
            }
        }));
    }

    let mut recovered = 0usize;
    let mut still_failing = 0usize;
    for handle in handles {
        match handle.await {
            Ok(true) => recovered += 1,
            _ => still_failing += 1,
        }
    }
    info!(recovered, still_failing, "recheck complete");
    Ok(())
}
