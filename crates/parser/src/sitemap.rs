use tracing::debug;
use xml::reader::{EventReader, XmlEvent};

/// `<loc>` contents split by enclosing element: `<url>` entries are pages,
/// `<sitemap>` entries are nested sitemaps.
#[derive(Debug, Default)]
pub struct SitemapRefs {
    pub pages: Vec<String>,
    pub sitemaps: Vec<String>,
}

/// Stream-parse sitemap XML (`urlset` or `sitemapindex`). Tag names are
/// matched case-insensitively; attributes and elements like `<lastmod>` are
/// ignored. A parse error ends the walk and whatever was collected up to that
/// point is returned.
pub fn parse(content: &str) -> SitemapRefs {
    let mut refs = SitemapRefs::default();
    let mut in_url = false;
    let mut in_sitemap = false;
    let mut in_loc = false;
    let mut loc = String::new();

    for event in EventReader::from_str(content) {
        match event {
            Ok(XmlEvent::StartElement { name, .. }) => {
                match name.local_name.to_ascii_lowercase().as_str() {
                    "url" => in_url = true,
                    "sitemap" => in_sitemap = true,
                    "loc" => {
                        in_loc = true;
                        loc.clear();
                    }
                    _ => {}
                }
            }
            Ok(XmlEvent::Characters(data)) | Ok(XmlEvent::CData(data)) => {
                if in_loc {
                    loc.push_str(&data);
                }
            }
            Ok(XmlEvent::EndElement { name }) => {
                match name.local_name.to_ascii_lowercase().as_str() {
                    "url" => in_url = false,
                    "sitemap" => in_sitemap = false,
                    "loc" => {
                        in_loc = false;
                        let url = loc.trim().to_string();
                        if !url.is_empty() {
                            if in_url {
                                refs.pages.push(url);
                            } else if in_sitemap {
                                refs.sitemaps.push(url);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Err(e) => {
                debug!("sitemap parse aborted, keeping partial result: {}", e);
                break;
            }
            _ => {}
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://ex/a</loc><lastmod>2024-01-01</lastmod></url>
              <url><loc> https://ex/b </loc><priority>0.5</priority></url>
            </urlset>"#;
        let refs = parse(xml);
        assert_eq!(refs.pages, vec!["https://ex/a", "https://ex/b"]);
        assert!(refs.sitemaps.is_empty());
    }

    #[test]
    fn parses_a_sitemap_index() {
        let xml = r#"<sitemapindex>
              <sitemap><loc>https://ex/s1.xml</loc></sitemap>
              <sitemap><loc>https://ex/s2.xml</loc></sitemap>
            </sitemapindex>"#;
        let refs = parse(xml);
        assert!(refs.pages.is_empty());
        assert_eq!(refs.sitemaps, vec!["https://ex/s1.xml", "https://ex/s2.xml"]);
    }

    #[test]
    fn tag_names_are_case_insensitive() {
        let xml = r#"<URLSET><URL><LOC>https://ex/a</LOC></URL></URLSET>"#;
        let refs = parse(xml);
        assert_eq!(refs.pages, vec!["https://ex/a"]);
    }

    #[test]
    fn malformed_xml_returns_what_was_collected() {
        let xml = r#"<urlset>
              <url><loc>https://ex/ok</loc></url>
              <url><loc>https://ex/also-ok</loc></url>
              <url><loc>https://ex/lost"#;
        let refs = parse(xml);
        assert_eq!(refs.pages, vec!["https://ex/ok", "https://ex/also-ok"]);
    }

    #[test]
    fn loc_outside_url_or_sitemap_is_ignored() {
        let xml = r#"<urlset><loc>https://ex/stray</loc></urlset>"#;
        let refs = parse(xml);
        assert!(refs.pages.is_empty());
        assert!(refs.sitemaps.is_empty());
    }
}
