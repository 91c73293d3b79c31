use once_cell::sync::Lazy;
use regex::Regex;

// Quoted absolute URLs and site-root paths in scripts, styles, and markup.
static QUOTED_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](https?://[^"'\s]{5,})["']"#).unwrap());

static QUOTED_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](/[a-zA-Z0-9_/\-\.]{2,})["']"#).unwrap());

static CSS_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'"()\s]{2,})['"]?\s*\)"#).unwrap());

static LOWER_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+$").unwrap());

/// Heuristic sweep over raw text for URL-shaped strings. Template
/// placeholders, near-empty matches, and bare lowercase words are code
/// tokens, not references.
pub fn scan(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for re in [&*QUOTED_URL_RE, &*QUOTED_PATH_RE, &*CSS_URL_RE] {
        for cap in re.captures_iter(text) {
            let candidate = &cap[1];
            if keep(candidate) {
                out.push(candidate.to_string());
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

fn keep(candidate: &str) -> bool {
    if candidate.len() < 2 || candidate.contains("${") || candidate.contains("{{") {
        return false;
    }
    !LOWER_WORD_RE.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_quoted_urls_paths_and_css_refs() {
        let text = r#"
            var api = "https://ex/api/v1";
            const page = '/docs/intro';
            .hero { background: url(/img/hero.jpg); }
        "#;
        let got = scan(text);
        assert_eq!(
            got,
            vec!["/docs/intro", "/img/hero.jpg", "https://ex/api/v1"]
        );
    }

    #[test]
    fn drops_template_placeholders() {
        let text = r#"fetch("/api/${id}"); load('/items/{{slug}}');"#;
        assert!(scan(text).is_empty());
    }

    #[test]
    fn drops_single_lowercase_words() {
        let text = r#"css: url(center); mode = "wrap";"#;
        assert!(scan(text).is_empty());
    }

    #[test]
    fn drops_near_empty_matches() {
        let text = r#"url(a)"#;
        assert!(scan(text).is_empty());
    }
}
