use std::time::Duration;

use async_trait::async_trait;

use crate::error::CrawlError;

/// Transport seam between the engine and the network. The production
/// implementation wraps reqwest; tests substitute scripted responses.
#[async_trait]
pub trait FetchClient: Send + Sync + 'static {
    async fn get(&self, url: &str) -> Result<HttpResponse, CrawlError>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    /// URL the response actually came from, after redirects.
    pub final_url: String,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_retries: u32,
    /// Non-default port of the first seed, if it had one. Drives both port
    /// injection during normalization and the no-port authority fallback.
    pub preferred_port: Option<u16>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: String::new(),
            max_retries: 3,
            preferred_port: None,
        }
    }
}

/// A reference produced by the link extractor or sitemap parser, before
/// normalization. The engine derives fallback eligibility from this form.
#[derive(Debug, Clone)]
pub struct RawRef {
    pub url: String,
    pub from_additional_host: bool,
    pub is_sitemap: bool,
}
