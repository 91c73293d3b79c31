pub mod links;
pub mod sitemap;
pub mod textscan;

use std::collections::HashSet;

use url::Url;

use sitemapper_core::RawRef;

/// Host policy and extraction toggles, fixed for the whole crawl.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub main_host: String,
    pub additional_hosts: HashSet<String>,
    /// Scheme of the first seed; additional-host references are rewritten
    /// onto it.
    pub scheme: String,
    pub follow_all: bool,
    pub content_only: bool,
}

/// Everything a fetched body contributed to the crawl.
#[derive(Debug, Default)]
pub struct PageRefs {
    pub refs: Vec<RawRef>,
    /// (as written, repaired) pairs from the authority-in-path repair.
    pub fixups: Vec<(String, String)>,
    /// Non-empty sitemap parse output; such pages are never "discovered".
    pub sitemap_detected: bool,
    pub is_html: bool,
}

/// Lowercased media type with parameters stripped (`text/html; charset=..` →
/// `text/html`).
pub fn media_type(content_type: Option<&str>) -> String {
    content_type
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Dispatch a response body on its content type and collect references.
pub fn classify_response(
    content_type: Option<&str>,
    body: &str,
    base_url: &Url,
    entry_is_sitemap: bool,
    cfg: &ExtractConfig,
) -> PageRefs {
    let mt = media_type(content_type);
    match mt.as_str() {
        "application/xml" | "text/xml" => parse_as_sitemap(body, base_url, cfg),
        "text/plain" if entry_is_sitemap => parse_as_sitemap(body, base_url, cfg),
        "text/html" => {
            let mut out = links::extract(body, base_url, cfg);
            out.is_html = true;
            out
        }
        "application/javascript" | "text/css" if !cfg.content_only => {
            let mut out = PageRefs::default();
            for candidate in textscan::scan(body) {
                if let Some((url, from_additional)) =
                    links::process_candidate(&candidate, base_url, cfg)
                {
                    out.refs.push(RawRef {
                        url,
                        from_additional_host: from_additional,
                        is_sitemap: false,
                    });
                }
            }
            out
        }
        _ => PageRefs::default(),
    }
}

fn parse_as_sitemap(body: &str, base_url: &Url, cfg: &ExtractConfig) -> PageRefs {
    let parsed = sitemap::parse(body);
    let mut out = PageRefs {
        sitemap_detected: !parsed.pages.is_empty() || !parsed.sitemaps.is_empty(),
        ..PageRefs::default()
    };
    for (locs, is_sitemap) in [(&parsed.pages, false), (&parsed.sitemaps, true)] {
        for loc in locs {
            if let Some((url, from_additional)) = links::process_candidate(loc, base_url, cfg) {
                out.refs.push(RawRef {
                    url,
                    from_additional_host: from_additional,
                    is_sitemap,
                });
            }
        }
    }
    out
}
