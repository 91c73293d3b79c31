use url::Url;

use crate::error::CrawlError;

/// Maps any reference to its canonical form under the first seed's scheme and
/// port preferences. Two references are the same page iff they normalize to
/// the same string.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    scheme: String,
    preferred_port: Option<u16>,
    preserve_query_order: bool,
}

impl UrlNormalizer {
    pub fn from_seed(seed: &str, preserve_query_order: bool) -> Result<Self, CrawlError> {
        let url = Url::parse(seed)
            .map_err(|e| CrawlError::InvalidUrl(format!("seed {seed}: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CrawlError::InvalidUrl(format!(
                "seed {seed}: unsupported scheme {}",
                url.scheme()
            )));
        }
        Ok(Self {
            scheme: url.scheme().to_string(),
            // Url::port() is None for scheme-default ports, so a default port
            // never becomes a preference.
            preferred_port: url.port(),
            preserve_query_order,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn preferred_port(&self) -> Option<u16> {
        self.preferred_port
    }

    /// Canonical string form, or None for anything unparseable or non-http(s).
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        let promoted;
        let raw = if raw.starts_with("//") {
            promoted = format!("{}:{}", self.scheme, raw);
            &promoted
        } else {
            raw
        };

        let mut url = Url::parse(raw).ok()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }

        if self.scheme == "https" && url.scheme() == "http" {
            url.set_scheme("https").ok()?;
        }
        if url.port().is_none() {
            if let Some(port) = self.preferred_port {
                let _ = url.set_port(Some(port));
            }
        }

        if !self.preserve_query_order {
            if let Some(query) = url.query() {
                if query.contains('&') {
                    // Sort the raw &-separated components; re-encoding pairs
                    // could change percent-escapes and thus URL identity.
                    let mut parts: Vec<&str> = query.split('&').collect();
                    parts.sort_unstable();
                    url.set_query(Some(&parts.join("&")));
                }
            }
        }

        let path = url.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            url.set_path(&path[..path.len() - 1]);
        }
        url.set_fragment(None);

        Some(url.to_string())
    }

    /// Fallback eligibility is captured from the reference as written, before
    /// any normalization: (was plain http, had no explicit port).
    pub fn pre_normalization_flags(&self, raw: &str) -> (bool, bool) {
        let raw = raw.trim();
        let promoted;
        let raw = if raw.starts_with("//") {
            promoted = format!("{}:{}", self.scheme, raw);
            &promoted
        } else {
            raw
        };
        match Url::parse(raw) {
            Ok(url) => (url.scheme() == "http", url.port().is_none()),
            Err(_) => (false, false),
        }
    }
}

const HTML_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "jsp", "cgi", "pl"];

/// Whether a failed URL is worth reporting: documents, not assets.
pub fn looks_like_html(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => return false,
    };
    if path.is_empty() || path == "/" || path.ends_with('/') {
        return true;
    }
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((_, ext)) => HTML_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}
