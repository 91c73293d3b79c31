use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use sitemapper_core::{CrawlError, FetchClient, FetchConfig, HttpResponse};
use sitemapper_storage::ResponseCache;

/// Statuses worth another attempt before giving up on a URL.
const RETRYABLE_STATUS: &[u16] = &[408, 429, 500, 502, 503, 504];

/// reqwest-backed transport. Status codes are never transport errors here;
/// only timeouts, DNS, TLS, and connection failures surface as `Err`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FetchClient for HttpFetcher {
    async fn get(&self, url: &str) -> Result<HttpResponse, CrawlError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = resp
            .text()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(HttpResponse {
            status,
            content_type,
            body,
            final_url,
        })
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Success(FetchedPage),
    /// Transient failure; the caller re-enqueues with `attempts + 1`.
    Retry,
    /// Terminal failure with the error string to report.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    /// URL the body actually came from (after redirects or fallback).
    pub fetched_url: String,
    pub from_cache: bool,
}

/// Fetch a single frontier URL: cache first, then the network with transient
/// retry and authority fallbacks. Each fallback axis fires at most once and
/// derives from the frontier URL, so a port-stripped attempt does not leak
/// into the later http attempt. Results are always recorded under the
/// frontier URL regardless of which variant produced them.
#[allow(clippy::too_many_arguments)]
pub async fn fetch_url(
    client: &dyn FetchClient,
    url: &str,
    attempts: u32,
    can_http_fallback: bool,
    can_no_port_fallback: bool,
    cache: Option<&ResponseCache>,
    config: &FetchConfig,
) -> FetchOutcome {
    if let Some(cache) = cache {
        if let Some(record) = cache.get(url).await {
            return FetchOutcome::Success(FetchedPage {
                status: record.status,
                content_type: record.content_type,
                body: record.body,
                fetched_url: record.url,
                from_cache: true,
            });
        }
    }

    let base = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => return FetchOutcome::Failed(format!("invalid URL: {e}")),
    };
    let mut current = base.clone();
    let mut tried_no_port = false;
    let mut tried_http = false;

    loop {
        match client.get(current.as_str()).await {
            Ok(resp) => {
                if RETRYABLE_STATUS.contains(&resp.status) && attempts < config.max_retries {
                    debug!(url = %url, status = resp.status, attempts, "transient status, will retry");
                    return FetchOutcome::Retry;
                }
                if resp.status < 200 || resp.status >= 300 {
                    return FetchOutcome::Failed(format!("HTTP {}", resp.status));
                }
                if let Some(cache) = cache {
                    cache
                        .set(url, resp.status, resp.content_type.as_deref(), &resp.body)
                        .await;
                }
                return FetchOutcome::Success(FetchedPage {
                    status: resp.status,
                    content_type: resp.content_type,
                    body: resp.body,
                    fetched_url: resp.final_url,
                    from_cache: false,
                });
            }
            Err(e) => {
                if can_no_port_fallback
                    && !tried_no_port
                    && config.preferred_port.is_some()
                    && base.port() == config.preferred_port
                {
                    tried_no_port = true;
                    let mut next = base.clone();
                    let _ = next.set_port(None);
                    warn!(url = %url, fallback = %next, "transport error, retrying without preferred port: {}", e);
                    current = next;
                    continue;
                }
                if can_http_fallback && !tried_http && base.scheme() == "https" {
                    tried_http = true;
                    let mut next = base.clone();
                    if next.set_scheme("http").is_ok() {
                        warn!(url = %url, fallback = %next, "transport error, retrying over http: {}", e);
                        current = next;
                        continue;
                    }
                }
                if attempts < config.max_retries {
                    debug!(url = %url, attempts, "transport error, will retry: {}", e);
                    return FetchOutcome::Retry;
                }
                return FetchOutcome::Failed(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted transport: answers from a table and records every requested
    /// URL in order.
    struct ScriptedClient {
        responses: Vec<(String, Result<HttpResponse, String>)>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<(String, Result<HttpResponse, String>)>) -> Self {
            Self {
                responses,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FetchClient for ScriptedClient {
        async fn get(&self, url: &str) -> Result<HttpResponse, CrawlError> {
            self.requests.lock().unwrap().push(url.to_string());
            for (pattern, response) in &self.responses {
                if pattern == url {
                    return response.clone().map_err(CrawlError::Network);
                }
            }
            Err(CrawlError::Network("connection refused".to_string()))
        }
    }

    fn ok_html(url: &str) -> (String, Result<HttpResponse, String>) {
        (
            url.to_string(),
            Ok(HttpResponse {
                status: 200,
                content_type: Some("text/html".to_string()),
                body: "<html></html>".to_string(),
                final_url: url.to_string(),
            }),
        )
    }

    fn status(url: &str, status: u16) -> (String, Result<HttpResponse, String>) {
        (
            url.to_string(),
            Ok(HttpResponse {
                status,
                content_type: None,
                body: String::new(),
                final_url: url.to_string(),
            }),
        )
    }

    fn config() -> FetchConfig {
        FetchConfig {
            max_retries: 3,
            preferred_port: Some(8080),
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn success_passes_the_body_through() {
        let client = ScriptedClient::new(vec![ok_html("https://ex/")]);
        let out = fetch_url(&client, "https://ex/", 0, false, false, None, &config()).await;
        match out {
            FetchOutcome::Success(page) => {
                assert_eq!(page.status, 200);
                assert!(!page.from_cache);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_status_retries_until_attempts_run_out() {
        let client = ScriptedClient::new(vec![status("https://ex/", 503)]);
        let cfg = config();
        assert!(matches!(
            fetch_url(&client, "https://ex/", 0, false, false, None, &cfg).await,
            FetchOutcome::Retry
        ));
        // attempts exhausted: the transient status becomes a plain HTTP error
        match fetch_url(&client, "https://ex/", 3, false, false, None, &cfg).await {
            FetchOutcome::Failed(e) => assert_eq!(e, "HTTP 503"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_status_fails_immediately() {
        let client = ScriptedClient::new(vec![status("https://ex/gone", 404)]);
        match fetch_url(&client, "https://ex/gone", 0, false, false, None, &config()).await {
            FetchOutcome::Failed(e) => assert_eq!(e, "HTTP 404"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn fallbacks_fire_in_order_from_the_frontier_url() {
        // every variant transport-fails; watch the request order
        let client = ScriptedClient::new(vec![]);
        let out = fetch_url(
            &client,
            "https://ex:8080/x",
            3,
            true,
            true,
            None,
            &config(),
        )
        .await;
        assert!(matches!(out, FetchOutcome::Failed(_)));
        assert_eq!(
            client.requests(),
            vec![
                "https://ex:8080/x".to_string(),
                "https://ex/x".to_string(),
                "http://ex:8080/x".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn no_port_fallback_recovers() {
        let client = ScriptedClient::new(vec![ok_html("https://ex/x")]);
        let out = fetch_url(
            &client,
            "https://ex:8080/x",
            0,
            false,
            true,
            None,
            &config(),
        )
        .await;
        match out {
            FetchOutcome::Success(page) => assert_eq!(page.fetched_url, "https://ex/x"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_fallback_requires_an_https_url() {
        let client = ScriptedClient::new(vec![]);
        let cfg = FetchConfig {
            max_retries: 0,
            preferred_port: None,
            ..FetchConfig::default()
        };
        let out = fetch_url(&client, "http://ex/x", 0, true, true, None, &cfg).await;
        assert!(matches!(out, FetchOutcome::Failed(_)));
        assert_eq!(client.requests(), vec!["http://ex/x".to_string()]);
    }

    #[tokio::test]
    async fn transport_error_retries_while_attempts_remain() {
        let client = ScriptedClient::new(vec![]);
        let out = fetch_url(&client, "https://ex/y", 1, false, false, None, &config()).await;
        assert!(matches!(out, FetchOutcome::Retry));
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_the_network() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = ResponseCache::open(tmp.path().join("cache"), None)
            .await
            .unwrap();
        cache
            .set("https://ex/cached", 200, Some("text/html"), "cached body")
            .await;

        let client = ScriptedClient::new(vec![]);
        let out = fetch_url(
            &client,
            "https://ex/cached",
            0,
            false,
            false,
            Some(&cache),
            &config(),
        )
        .await;
        match out {
            FetchOutcome::Success(page) => {
                assert!(page.from_cache);
                assert_eq!(page.body, "cached body");
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn successful_fetches_are_recorded_under_the_frontier_url() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = ResponseCache::open(tmp.path().join("cache"), None)
            .await
            .unwrap();
        // only the port-stripped variant answers
        let client = ScriptedClient::new(vec![ok_html("https://ex/x")]);
        let out = fetch_url(
            &client,
            "https://ex:8080/x",
            0,
            false,
            true,
            Some(&cache),
            &config(),
        )
        .await;
        assert!(matches!(out, FetchOutcome::Success(_)));
        let record = cache.get("https://ex:8080/x").await.unwrap();
        assert_eq!(record.url, "https://ex:8080/x");
        assert_eq!(record.body, "<html></html>");
    }
}
