//! Head parsing, deduplication, and tier-ordered merging.
//!
//! Fragments merge in layout → fragment(s) → page order. `title`, `meta`,
//! and `base` are last-wins (the page overrides the layout, in the layout's
//! position); `link`, `script`, and `style` are first-wins (the layout's
//! loaded resource is authoritative). Elements carrying
//! `data-allow-duplicate` are never deduplicated. Elements with no dedup
//! key (keyless meta, inline script, inline style) are kept in tier order.

use crate::parsers::html::{self, Attr, Element};
use std::collections::HashMap;

/// Origin tier of a head fragment, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeadTier {
    Layout,
    Fragment,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverridePolicy {
    LastWins,
    FirstWins,
}

/// One parsed head element.
#[derive(Debug, Clone)]
pub struct HeadElement {
    /// Lowercased tag name.
    pub tag: String,
    pub attrs: Vec<Attr>,
    /// Inline text content (title, inline script/style).
    pub text: String,
    /// Original element text, preserved on emission.
    pub raw: String,
}

impl HeadElement {
    /// Reconstruct the element when no original text is available: the
    /// dedup-key attribute first, remaining attributes alphabetically.
    pub fn reconstruct(&self) -> String {
        let key_attr = key_attr_name(&self.tag, &self.attrs);
        let mut ordered: Vec<&Attr> = self.attrs.iter().collect();
        ordered.sort_by(|a, b| {
            let a_is_key = Some(a.name.as_str()) == key_attr;
            let b_is_key = Some(b.name.as_str()) == key_attr;
            b_is_key.cmp(&a_is_key).then_with(|| a.name.cmp(&b.name))
        });
        let owned: Vec<Attr> = ordered.into_iter().cloned().collect();
        let open = html::render_open_tag(&self.tag, &owned);
        if html::is_void_element(&self.tag) {
            open
        } else {
            format!("{open}{}</{}>", self.text, self.tag)
        }
    }

    fn emit(&self) -> String {
        if self.raw.is_empty() {
            self.reconstruct()
        } else {
            self.raw.clone()
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }
}

/// Which attribute carries the dedup identity for reconstruction ordering.
fn key_attr_name<'a>(tag: &str, attrs: &'a [Attr]) -> Option<&'a str> {
    let preferred: &[&str] = match tag {
        "meta" => &["charset", "name", "property", "http-equiv"],
        "link" => &["rel"],
        "script" => &["src"],
        "style" => &["href"],
        _ => &[],
    };
    for want in preferred {
        if let Some(attr) = attrs.iter().find(|a| a.name == *want) {
            return Some(attr.name.as_str());
        }
    }
    None
}

/// Parse a head fragment into its top-level elements. Comments and bare
/// text are dropped.
pub fn parse_head_fragment(fragment: &str) -> Vec<HeadElement> {
    let mut items = Vec::new();
    let mut covered_until = 0usize;
    for element in html::parse_elements(fragment) {
        if element.tag.start < covered_until {
            continue;
        }
        covered_until = element.end.max(element.tag.end);
        items.push(to_head_element(&element, fragment));
    }
    items
}

fn to_head_element(element: &Element, fragment: &str) -> HeadElement {
    HeadElement {
        tag: element.tag.name.clone(),
        attrs: element.tag.attrs.clone(),
        text: element.inner(fragment).to_string(),
        raw: element.outer(fragment).to_string(),
    }
}

/// Dedup key per the head contract. `None` means the element is always
/// kept.
fn dedup_key(item: &HeadElement) -> Option<String> {
    if item.has_attr("data-allow-duplicate") {
        return None;
    }
    match item.tag.as_str() {
        "title" => Some("title".to_string()),
        "base" => Some("base".to_string()),
        "meta" => {
            if item.has_attr("charset") {
                Some("meta:charset".to_string())
            } else if let Some(v) = item.attr("name") {
                Some(format!("meta:name:{v}"))
            } else if let Some(v) = item.attr("property") {
                Some(format!("meta:property:{v}"))
            } else if let Some(v) = item.attr("http-equiv") {
                Some(format!("meta:http-equiv:{v}"))
            } else {
                None
            }
        }
        "link" => {
            let rel = item.attr("rel")?;
            if rel.eq_ignore_ascii_case("canonical") || rel.eq_ignore_ascii_case("icon") {
                Some(format!("link:rel:{}", rel.to_ascii_lowercase()))
            } else {
                let href = item.attr("href").unwrap_or("");
                Some(format!("link:{rel}:{href}"))
            }
        }
        "script" => item.attr("src").map(|src| format!("script:src:{src}")),
        "style" => item.attr("href").map(|href| format!("style:href:{href}")),
        _ => None,
    }
}

fn policy_for(tag: &str) -> OverridePolicy {
    match tag {
        "title" | "meta" | "base" => OverridePolicy::LastWins,
        _ => OverridePolicy::FirstWins,
    }
}

/// Merge head fragments in order. Later fragments override earlier ones for
/// last-wins tags (replacing in place, so the layout's element position is
/// kept) and are dropped for first-wins tags.
pub fn merge_heads(fragments: &[(HeadTier, &str)]) -> String {
    let mut items: Vec<HeadElement> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (_, fragment) in fragments {
        for item in parse_head_fragment(fragment) {
            match dedup_key(&item) {
                None => items.push(item),
                Some(key) => match by_key.get(&key) {
                    Some(&index) => {
                        if policy_for(&item.tag) == OverridePolicy::LastWins {
                            items[index] = item;
                        }
                    }
                    None => {
                        by_key.insert(key, items.len());
                        items.push(item);
                    }
                },
            }
        }
    }

    let rendered: Vec<String> = items.iter().map(|i| i.emit()).collect();
    rendered.join("\n")
}

/// Inner content of the document's `<head>` element, if any.
pub fn extract_head(document: &str) -> Option<String> {
    html::first_element_named(document, "head").map(|e| e.inner(document).to_string())
}

/// Rewrite `document` so its head contains exactly `merged`. Creates the
/// head element when the document lacks one.
pub fn inject_head(document: &str, merged: &str) -> String {
    if let Some(head) = html::first_element_named(document, "head") {
        let replacement = format!("\n{merged}\n");
        return html::apply_edits(
            document,
            vec![(head.inner_start, head.inner_end, replacement)],
        );
    }
    if merged.is_empty() {
        return document.to_string();
    }
    let block = format!("<head>\n{merged}\n</head>");
    for token in html::scan(document) {
        if let html::Token::Open(tag) = &token {
            if tag.name == "html" {
                let insert = format!("\n{block}");
                return html::apply_edits(document, vec![(tag.end, tag.end, insert)]);
            }
            if tag.name == "body" {
                let insert = format!("{block}\n");
                return html::apply_edits(document, vec![(tag.start, tag.start, insert)]);
            }
        }
    }
    format!("{block}\n{document}")
}
