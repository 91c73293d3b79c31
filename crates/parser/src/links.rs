use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use sitemapper_core::RawRef;

use crate::{textscan, ExtractConfig, PageRefs};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap());

// Phone-shaped: optional leading +, then digits with common separators.
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9()][0-9()\s.\-]*$").unwrap());

const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

const DATA_ATTRS: &[&str] = &["data-url", "data-href", "data-src", "data-link"];

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Walk an HTML document and collect every same-site reference it makes.
pub fn extract(html: &str, base_url: &Url, cfg: &ExtractConfig) -> PageRefs {
    let document = Html::parse_document(html);
    let mut out = PageRefs::default();
    let mut seen_here: HashSet<String> = HashSet::new();

    // <a href> / <link href>, with rel routing
    if let Some(sel) = selector("a[href], link[href]") {
        for el in document.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let rel = el.value().attr("rel").unwrap_or("").to_ascii_lowercase();
            if !cfg.follow_all && rel.split_whitespace().any(|t| t == "nofollow") {
                continue;
            }
            let is_sitemap_rel = rel.split_whitespace().any(|t| t == "sitemap");
            if let Some((url, from_additional)) = process_candidate(href, base_url, cfg) {
                push_ref(&mut out, &mut seen_here, url, from_additional, is_sitemap_rel);
            }
            if let Some(fixed) = fixup_authority_in_path(href, base_url, cfg) {
                if let Some((url, from_additional)) = process_candidate(&fixed, base_url, cfg) {
                    out.fixups.push((href.to_string(), fixed));
                    push_ref(&mut out, &mut seen_here, url, from_additional, is_sitemap_rel);
                }
            }
        }
    }

    // src-carrying embeds
    if let Some(sel) = selector(
        "script[src], img[src], iframe[src], video[src], audio[src], source[src], embed[src]",
    ) {
        for el in document.select(&sel) {
            if let Some(src) = el.value().attr("src") {
                if let Some((url, from_additional)) = process_candidate(src, base_url, cfg) {
                    push_ref(&mut out, &mut seen_here, url, from_additional, false);
                }
            }
        }
    }

    // data-* URL attributes
    if let Some(sel) = selector("[data-url], [data-href], [data-src], [data-link]") {
        for el in document.select(&sel) {
            for attr in DATA_ATTRS {
                if let Some(val) = el.value().attr(attr) {
                    if let Some((url, from_additional)) = process_candidate(val, base_url, cfg) {
                        push_ref(&mut out, &mut seen_here, url, from_additional, false);
                    }
                }
            }
        }
    }

    // <meta http-equiv="refresh" content="N; URL=...">
    if let Some(sel) = selector("meta[http-equiv][content]") {
        for el in document.select(&sel) {
            let equiv = el.value().attr("http-equiv").unwrap_or("");
            if !equiv.eq_ignore_ascii_case("refresh") {
                continue;
            }
            let content = el.value().attr("content").unwrap_or("");
            if let Some(target) = meta_refresh_url(content) {
                if let Some((url, from_additional)) = process_candidate(&target, base_url, cfg) {
                    push_ref(&mut out, &mut seen_here, url, from_additional, false);
                }
            }
        }
    }

    // first token of each srcset entry
    if let Some(sel) = selector("[srcset]") {
        for el in document.select(&sel) {
            let srcset = el.value().attr("srcset").unwrap_or("");
            for entry in srcset.split(',') {
                if let Some(tok) = entry.split_whitespace().next() {
                    if let Some((url, from_additional)) = process_candidate(tok, base_url, cfg) {
                        push_ref(&mut out, &mut seen_here, url, from_additional, false);
                    }
                }
            }
        }
    }

    // heuristic pass over the raw source for URLs hiding in scripts and styles
    if !cfg.content_only {
        for candidate in textscan::scan(html) {
            if let Some((url, from_additional)) = process_candidate(&candidate, base_url, cfg) {
                push_ref(&mut out, &mut seen_here, url, from_additional, false);
            }
        }
    }

    out
}

fn push_ref(
    out: &mut PageRefs,
    seen_here: &mut HashSet<String>,
    url: String,
    from_additional_host: bool,
    is_sitemap: bool,
) {
    if seen_here.insert(url.clone()) {
        out.refs.push(RawRef {
            url,
            from_additional_host,
            is_sitemap,
        });
    }
}

/// Candidate pipeline: scheme rejects, entity decode, email/phone rejects,
/// resolution, host filter with additional-host rewrite. Returns the resolved
/// pre-normalization URL and whether it came from an additional host.
pub(crate) fn process_candidate(
    raw: &str,
    base: &Url,
    cfg: &ExtractConfig,
) -> Option<(String, bool)> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    if SKIPPED_SCHEMES.iter().any(|s| raw.starts_with(s)) {
        return None;
    }

    let decoded = html_escape::decode_html_entities(raw);
    if EMAIL_RE.is_match(&decoded) || is_phone_like(&decoded) {
        return None;
    }

    let resolved = base.join(&decoded).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    let host = resolved.host_str()?;

    if host == cfg.main_host {
        Some((resolved.to_string(), false))
    } else if cfg.additional_hosts.contains(host) {
        let mut rewritten = resolved.clone();
        rewritten.set_host(Some(&cfg.main_host)).ok()?;
        let _ = rewritten.set_scheme(&cfg.scheme);
        let _ = rewritten.set_port(None);
        Some((rewritten.to_string(), true))
    } else {
        None
    }
}

/// A malformed relative href whose resolved path visibly contains an
/// authority (`<baseDir>/<host>/...`): the protocol was swallowed by relative
/// resolution. Reconstructs `<scheme>://<host>/...`. Never fires for
/// references that already parsed as absolute.
fn fixup_authority_in_path(raw: &str, base: &Url, cfg: &ExtractConfig) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || Url::parse(raw).is_ok() {
        return None;
    }
    let resolved = base.join(raw).ok()?;
    let base_path = base.path();
    let base_dir = &base_path[..=base_path.rfind('/')?];
    let rest = resolved.path().strip_prefix(base_dir)?;
    let first = rest.split('/').next()?;
    if first.is_empty() || (first != cfg.main_host && !cfg.additional_hosts.contains(first)) {
        return None;
    }
    let mut fixed = format!("{}://{}", cfg.scheme, rest);
    if let Some(query) = resolved.query() {
        fixed.push('?');
        fixed.push_str(query);
    }
    Some(fixed)
}

fn meta_refresh_url(content: &str) -> Option<String> {
    let lower = content.to_ascii_lowercase();
    let idx = lower.find("url=")?;
    let val = content[idx + 4..]
        .trim()
        .trim_matches(|c| c == '"' || c == '\'');
    if val.is_empty() {
        None
    } else {
        Some(val.to_string())
    }
}

fn is_phone_like(s: &str) -> bool {
    if !PHONE_RE.is_match(s) {
        return false;
    }
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&digits)
}
