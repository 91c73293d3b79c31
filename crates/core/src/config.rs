use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_failed_output")]
    pub failed_output: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// Directory for the hash-keyed response cache. Caching is off when unset.
    pub dir: Option<String>,
    /// Sibling directory for raw bodies, keyed by the same hash.
    pub body_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractorConfig {
    /// External main-content extractor invocation (program plus leading args).
    pub command: Option<String>,
    pub output_dir: Option<String>,
}

fn default_concurrency() -> usize {
    20
}
fn default_max_retries() -> u32 {
    3
}
fn default_output() -> String {
    "discovered.txt".to_string()
}
fn default_failed_output() -> String {
    "failed.yaml".to_string()
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; sitemapper/0.1)".to_string()
}
