use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use sitemapper_core::{
    looks_like_html, AppConfig, FetchClient, FetchConfig, NoopObserver, UrlNormalizer,
};
use sitemapper_extract::ExtractorDriver;
use sitemapper_fetch::{fetch_url, FetchOutcome, HttpFetcher};
use sitemapper_frontier::{CrawlFrontier, FrontierEntry};
use sitemapper_parser::{classify_response, ExtractConfig};
use sitemapper_storage::{url_hash, ResponseCache};

use crate::output;

/// Crawl parameters that come from the command line rather than the config
/// file.
pub struct CrawlArgs {
    pub seeds: Vec<String>,
    pub additional_hosts: Vec<String>,
    pub follow_all: bool,
    pub content_only: bool,
    pub preserve_query_order: bool,
}

pub async fn run_crawl(config: AppConfig, args: CrawlArgs) -> Result<()> {
    let first_seed = args
        .seeds
        .first()
        .context("at least one seed URL is required")?;
    let seed_url =
        Url::parse(first_seed).with_context(|| format!("invalid seed URL {first_seed}"))?;
    let main_host = seed_url
        .host_str()
        .context("seed URL has no host")?
        .to_string();
    let normalizer = UrlNormalizer::from_seed(first_seed, args.preserve_query_order)?;

    let extract_cfg = ExtractConfig {
        main_host,
        additional_hosts: args.additional_hosts.iter().cloned().collect::<HashSet<_>>(),
        scheme: normalizer.scheme().to_string(),
        follow_all: args.follow_all,
        content_only: args.content_only,
    };

    if config.cache.body_dir.is_some() && config.cache.dir.is_none() {
        warn!("body directory configured without a cache directory, bodies will not be kept");
    }
    let cache = match &config.cache.dir {
        Some(dir) => Some(Arc::new(
            ResponseCache::open(dir, config.cache.body_dir.as_ref().map(PathBuf::from)).await?,
        )),
        None => None,
    };

    let fetch_config = FetchConfig {
        timeout: Duration::from_secs(config.http.timeout_seconds),
        user_agent: config.http.user_agent.clone(),
        max_retries: config.general.max_retries,
        preferred_port: normalizer.preferred_port(),
    };

    let client: Arc<dyn FetchClient> = Arc::new(HttpFetcher::new(&fetch_config)?);
    let frontier = Arc::new(CrawlFrontier::new(normalizer, Arc::new(NoopObserver)));

    crawl_with_client(
        client,
        Arc::clone(&frontier),
        cache.clone(),
        fetch_config,
        extract_cfg,
        &args.seeds,
        config.general.concurrency,
    )
    .await;

    info!(
        discovered = frontier.discovered_count(),
        failed = frontier.failed_count(),
        seen = frontier.seen_count(),
        "crawl finished"
    );

    output::write_discovered(&config.general.output, frontier.discovered_urls()).await?;
    output::write_failed(&config.general.failed_output, &frontier).await?;
    info!(
        output = %config.general.output,
        failed_output = %config.general.failed_output,
        "outputs written"
    );

    if let Some(command) = &config.extractor.command {
        let body_dir = cache.as_ref().and_then(|c| c.body_dir());
        let Some(body_dir) = body_dir else {
            warn!("extractor requested but no body directory configured, skipping");
            return Ok(());
        };
        let output_dir = config
            .extractor
            .output_dir
            .clone()
            .unwrap_or_else(|| "extracted".to_string());
        let driver = ExtractorDriver {
            command: command.clone(),
            body_dir: body_dir.to_path_buf(),
            output_dir: PathBuf::from(output_dir),
        };
        driver.run(&frontier.html_hashes()).await?;
    }

    Ok(())
}

/// The worker pool over an explicit client, so tests drive the whole engine
/// without a network.
pub(crate) async fn crawl_with_client(
    client: Arc<dyn FetchClient>,
    frontier: Arc<CrawlFrontier>,
    cache: Option<Arc<ResponseCache>>,
    fetch_config: FetchConfig,
    extract_cfg: ExtractConfig,
    seeds: &[String],
    concurrency: usize,
) {
    for seed in seeds {
        frontier.enqueue(seed, false, None, false).await;
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let concurrency = concurrency.max(1);
    info!(workers = concurrency, "spawning crawl workers");

    let fetch_config = Arc::new(fetch_config);
    let extract_cfg = Arc::new(extract_cfg);
    let mut handles = Vec::with_capacity(concurrency);
    for worker_id in 0..concurrency {
        let client = Arc::clone(&client);
        let frontier = Arc::clone(&frontier);
        let cache = cache.clone();
        let fetch_config = Arc::clone(&fetch_config);
        let extract_cfg = Arc::clone(&extract_cfg);
        let mut shutdown = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            let mut idle_count = 0u32;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = async {
                        // Workers never exit on an empty frontier: another
                        // worker may still be about to enqueue.
                        let Some(entry) = frontier.pop().await else {
                            idle_count += 1;
                            if idle_count % 100 == 1 {
                                debug!(worker_id, "frontier empty, waiting");
                            }
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            return;
                        };
                        idle_count = 0;
                        process_entry(
                            worker_id,
                            entry,
                            client.as_ref(),
                            &frontier,
                            cache.as_deref(),
                            &fetch_config,
                            &extract_cfg,
                        )
                        .await;
                        frontier.finish();
                    } => {}
                }
            }
        }));
    }

    // Work can grow the frontier at any time, so quiescence is re-checked
    // rather than waited on once.
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if frontier.is_idle().await {
            break;
        }
    }
    let _ = shutdown_tx.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

async fn process_entry(
    worker_id: usize,
    entry: FrontierEntry,
    client: &dyn FetchClient,
    frontier: &CrawlFrontier,
    cache: Option<&ResponseCache>,
    fetch_config: &FetchConfig,
    extract_cfg: &ExtractConfig,
) {
    info!(worker_id, url = %entry.url, attempt = entry.attempts, "fetching");
    frontier.observer().on_fetch_start(&entry.url, entry.attempts);
    let outcome = fetch_url(
        client,
        &entry.url,
        entry.attempts,
        entry.can_http_fallback,
        entry.can_no_port_fallback,
        cache,
        fetch_config,
    )
    .await;

    match outcome {
        FetchOutcome::Retry => {
            frontier.observer().on_fetch_complete(&entry.url, "retry");
            let mut retry = entry;
            retry.attempts += 1;
            debug!(worker_id, url = %retry.url, attempt = retry.attempts, "re-enqueued for retry");
            frontier.requeue(retry).await;
        }
        FetchOutcome::Failed(error) => {
            frontier.observer().on_fetch_complete(&entry.url, "failed");
            if looks_like_html(&entry.url) {
                warn!(worker_id, url = %entry.url, "giving up: {}", error);
                frontier.record_failure(&entry.url, &error);
            } else {
                debug!(worker_id, url = %entry.url, "asset fetch failed: {}", error);
            }
        }
        FetchOutcome::Success(page) => {
            frontier.observer().on_fetch_complete(
                &entry.url,
                if page.from_cache { "cache-hit" } else { "fetched" },
            );
            let Ok(base) = Url::parse(&entry.url) else {
                return;
            };
            let refs = classify_response(
                page.content_type.as_deref(),
                &page.body,
                &base,
                entry.is_sitemap,
                extract_cfg,
            );
            for (raw, fixed) in &refs.fixups {
                debug!(worker_id, url = %entry.url, raw = %raw, fixed = %fixed, "repaired swallowed authority");
            }
            if refs.sitemap_detected {
                debug!(worker_id, url = %entry.url, "body parsed as sitemap");
            }
            if refs.is_html && frontier.mark_discovered(&entry.url) {
                frontier.record_html_hash(url_hash(&entry.url));
            }
            let mut enqueued = 0usize;
            for r in refs.refs {
                if frontier
                    .enqueue(&r.url, r.from_additional_host, Some(&entry.url), r.is_sitemap)
                    .await
                {
                    enqueued += 1;
                }
            }
            if enqueued > 0 {
                info!(worker_id, url = %entry.url, enqueued, "new URLs enqueued");
            }
        }
    }
}
