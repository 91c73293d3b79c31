pub mod config;
pub mod error;
pub mod observer;
pub mod types;
pub mod urlnorm;

pub use config::AppConfig;
pub use error::CrawlError;
pub use observer::{CrawlObserver, NoopObserver};
pub use types::*;
pub use urlnorm::{looks_like_html, UrlNormalizer};
