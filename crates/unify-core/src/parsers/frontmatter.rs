//! YAML frontmatter extraction for Markdown pages.
//!
//! Frontmatter size is bounded by the engine's file-size cap before any
//! content reaches this module; serde_yaml's internal limits cover nesting
//! depth within that bound.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Split result: the raw YAML block (if any) and the remaining body.
#[derive(Debug, Clone)]
pub struct Frontmatter {
    /// Raw YAML text between the `---` delimiters, without them.
    pub raw: String,
    /// Content after the closing delimiter (or the whole input when no
    /// frontmatter is present).
    pub body: String,
    /// An opening `---` was found at the start of the file.
    pub present: bool,
    /// The closing `---` was found. `present && !closed` means a dangling
    /// opener; the whole remainder is treated as body.
    pub closed: bool,
}

/// Split a document into frontmatter and body.
///
/// The opening delimiter must be the first non-whitespace content; the
/// closing delimiter is the next line starting with `---`.
pub fn split(content: &str) -> Frontmatter {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return Frontmatter {
            raw: String::new(),
            body: content.to_string(),
            present: false,
            closed: false,
        };
    }
    let after_open = &trimmed[3..];
    match after_open.find("\n---") {
        Some(end) => {
            let raw = after_open[..end].trim().to_string();
            let mut body = &after_open[end + 4..];
            // The closing delimiter line may carry trailing whitespace.
            if let Some(nl) = body.find('\n') {
                body = &body[nl + 1..];
            } else {
                body = "";
            }
            Frontmatter {
                raw,
                body: body.to_string(),
                present: true,
                closed: true,
            }
        }
        None => Frontmatter {
            raw: String::new(),
            body: after_open.to_string(),
            present: true,
            closed: false,
        },
    }
}

/// Typed page metadata. Unknown keys (`og:*`, `html_*`, `body_*`, and any
/// user extras) are collected in `extra` for downstream synthesis.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub layout: Option<String>,
    pub excerpt: Option<String>,
    /// Structured data emitted as `application/ld+json`.
    pub schema: Option<serde_yaml::Value>,
    /// Raw lines appended verbatim to the merged head.
    pub head_html: Option<String>,
    /// Objects emitted as meta/link/script elements. Each object's `tag`
    /// key selects the element (default `meta`); remaining keys become
    /// attributes.
    pub head: Option<Vec<BTreeMap<String, serde_yaml::Value>>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl PageMeta {
    /// Parse the raw YAML block. An empty block yields the default.
    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Attribute pairs for the synthesized root element:
    /// `html_lang: en` becomes `("lang", "en")` under prefix `html_`,
    /// `html_data_theme` becomes `data-theme`.
    pub fn root_attrs(&self, prefix: &str) -> Vec<(String, String)> {
        let mut attrs = Vec::new();
        for (key, value) in &self.extra {
            if let Some(rest) = key.strip_prefix(prefix) {
                if rest.is_empty() {
                    continue;
                }
                let name = rest.replace('_', "-");
                attrs.push((name, yaml_scalar_to_string(value)));
            }
        }
        attrs
    }

    /// `og:*` keys, in declared (map) order.
    pub fn open_graph(&self) -> Vec<(String, String)> {
        self.extra
            .iter()
            .filter(|(key, _)| key.starts_with("og:"))
            .map(|(key, value)| (key.clone(), yaml_scalar_to_string(value)))
            .collect()
    }
}

/// Render a YAML scalar as an attribute value. Non-scalars fall back to
/// their JSON rendering.
pub fn yaml_scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        let fm = split("---\ntitle: Hello\n---\n# Body\n");
        assert!(fm.present && fm.closed);
        assert_eq!(fm.raw, "title: Hello");
        assert_eq!(fm.body, "# Body\n");
    }

    #[test]
    fn test_split_no_frontmatter() {
        let fm = split("# Just a heading\n");
        assert!(!fm.present);
        assert_eq!(fm.body, "# Just a heading\n");
    }

    #[test]
    fn test_split_unclosed() {
        let fm = split("---\ntitle: dangling");
        assert!(fm.present);
        assert!(!fm.closed);
        assert!(fm.raw.is_empty());
    }

    #[test]
    fn test_split_crlf() {
        let fm = split("---\r\ntitle: t\r\n---\r\nbody");
        assert!(fm.present && fm.closed);
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn test_split_body_preserves_later_dashes() {
        let fm = split("---\na: 1\n---\nfirst\n---\nsecond");
        assert!(fm.closed);
        assert!(fm.body.contains("first"));
        assert!(fm.body.contains("---\nsecond"));
    }

    #[test]
    fn test_parse_known_keys() {
        let meta = PageMeta::parse("title: Post\nlayout: blog\nexcerpt: short").unwrap();
        assert_eq!(meta.title.as_deref(), Some("Post"));
        assert_eq!(meta.layout.as_deref(), Some("blog"));
        assert_eq!(meta.excerpt.as_deref(), Some("short"));
    }

    #[test]
    fn test_parse_empty_is_default() {
        let meta = PageMeta::parse("   \n").unwrap();
        assert!(meta.title.is_none());
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn test_parse_invalid_yaml_errors() {
        assert!(PageMeta::parse("title: [unclosed").is_err());
    }

    #[test]
    fn test_root_attrs_prefix_mapping() {
        let meta = PageMeta::parse("html_lang: en\nhtml_data_theme: dark\nbody_class: docs").unwrap();
        let html = meta.root_attrs("html_");
        assert!(html.contains(&("lang".to_string(), "en".to_string())));
        assert!(html.contains(&("data-theme".to_string(), "dark".to_string())));
        let body = meta.root_attrs("body_");
        assert_eq!(body, vec![("class".to_string(), "docs".to_string())]);
    }

    #[test]
    fn test_open_graph_keys() {
        let meta = PageMeta::parse("\"og:title\": T\n\"og:image\": /i.png\ntitle: x").unwrap();
        let og = meta.open_graph();
        assert_eq!(og.len(), 2);
        assert!(og.contains(&("og:title".to_string(), "T".to_string())));
    }

    #[test]
    fn test_head_array_objects() {
        let meta = PageMeta::parse(
            "head:\n  - tag: link\n    rel: preload\n    href: /f.woff2\n  - name: robots\n    content: noindex",
        )
        .unwrap();
        let head = meta.head.unwrap();
        assert_eq!(head.len(), 2);
        assert_eq!(
            head[0].get("tag").and_then(|v| v.as_str()),
            Some("link")
        );
        assert!(head[1].get("tag").is_none());
    }

    #[test]
    fn test_title_excerpt_roundtrip() {
        let fm = split("---\ntitle: Exact Title\nexcerpt: Exact excerpt.\n---\nbody");
        let meta = PageMeta::parse(&fm.raw).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Exact Title"));
        assert_eq!(meta.excerpt.as_deref(), Some("Exact excerpt."));
    }
}
