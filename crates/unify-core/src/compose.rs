//! DOM cascade composition: fold a page into its layout chain.
//!
//! Three alignment schemes are attempted in order. Area matching pairs
//! `unify-*` class tokens between page and layout; landmark matching pairs
//! the semantic elements {header, nav, main, aside, footer}; ordered fill
//! drops the whole page body into the layout's first `<main>`. All editing
//! is span-splicing on the layout text, applied back-to-front.

use crate::head::{self, HeadTier};
use crate::parsers::html::{self, Attr, Element};
use std::collections::HashMap;

/// Landmark elements used by the fallback alignment scheme.
pub const LANDMARKS: &[&str] = &["header", "nav", "main", "aside", "footer"];

/// Elements whose raw text belongs to the head when they appear at the top
/// level of a fragment.
const HEADISH: &[&str] = &["title", "meta", "link", "base"];

/// A document decomposed for cascade processing.
#[derive(Debug, Clone, Default)]
pub struct DocumentParts {
    /// Head fragment (inner of `<head>`, or top-level head-ish elements of
    /// a fragment, or synthesized frontmatter head).
    pub head: String,
    /// Body fragment (inner of `<body>`, or the fragment minus head-ish
    /// elements).
    pub body: String,
    pub html_attrs: Vec<Attr>,
    pub body_attrs: Vec<Attr>,
}

/// Decompose a page or composed document. Works on full documents and bare
/// fragments alike.
pub fn split_document(text: &str) -> DocumentParts {
    let head = html::first_element_named(text, "head");
    let body = html::first_element_named(text, "body");
    let html_attrs = html::first_element_named(text, "html")
        .map(|e| e.tag.attrs)
        .unwrap_or_default();
    let body_attrs = body.as_ref().map(|e| e.tag.attrs.clone()).unwrap_or_default();

    let head_fragment = head.as_ref().map(|e| e.inner(text).to_string());

    if let Some(body_el) = body {
        return DocumentParts {
            head: head_fragment.unwrap_or_default(),
            body: body_el.inner(text).to_string(),
            html_attrs,
            body_attrs,
        };
    }

    // Fragment: pull top-level head-ish elements out of the body flow.
    let (headish, mut removals) = top_level_headish(text);
    let head_fragment = match head_fragment {
        Some(inner) => inner,
        None => headish,
    };
    if let Some(head_el) = head {
        removals.push((head_el.tag.start, head_el.end, String::new()));
    }
    let body_fragment = html::apply_edits(text, removals);
    DocumentParts {
        head: head_fragment,
        body: body_fragment,
        html_attrs,
        body_attrs,
    }
}

/// Top-level head-ish elements of a fragment: their concatenated raw text
/// and the edits that remove them.
fn top_level_headish(text: &str) -> (String, Vec<(usize, usize, String)>) {
    let mut fragment = String::new();
    let mut removals = Vec::new();
    for element in top_level_elements(text) {
        if HEADISH.contains(&element.tag.name.as_str()) {
            if !fragment.is_empty() {
                fragment.push('\n');
            }
            fragment.push_str(element.outer(text));
            removals.push((element.tag.start, element.end, String::new()));
        }
    }
    (fragment, removals)
}

fn top_level_elements(text: &str) -> Vec<Element> {
    let mut out = Vec::new();
    let mut covered = 0usize;
    for element in html::parse_elements(text) {
        if element.tag.start < covered {
            continue;
        }
        covered = element.end.max(element.tag.end);
        out.push(element);
    }
    out
}

/// Area elements (class token `unify-*`), outermost only.
fn area_elements(text: &str) -> Vec<Element> {
    let mut out = Vec::new();
    let mut covered = 0usize;
    for element in html::parse_elements(text) {
        if element.tag.area_tokens().is_empty() {
            continue;
        }
        if element.tag.start < covered {
            continue;
        }
        covered = element.end;
        out.push(element);
    }
    out
}

/// First page element per area token, document order.
fn page_area_index(elements: &[Element]) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (i, element) in elements.iter().enumerate() {
        for token in element.tag.area_tokens() {
            map.entry(token.to_string()).or_insert(i);
        }
    }
    map
}

/// Merge element attributes for an aligned pair: class tokens are the
/// layout-then-page union with first occurrence kept; other attributes are
/// page-wins by name.
pub fn merge_attrs(layout: &[Attr], page: &[Attr]) -> Vec<Attr> {
    let mut out: Vec<Attr> = Vec::new();
    let mut class_value: Option<String> = None;

    let layout_class = layout.iter().find(|a| a.name == "class");
    let page_class = page.iter().find(|a| a.name == "class");
    if layout_class.is_some() || page_class.is_some() {
        let mut tokens: Vec<&str> = Vec::new();
        for source in [layout_class, page_class].into_iter().flatten() {
            for token in source.value.as_deref().unwrap_or("").split_ascii_whitespace() {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        }
        class_value = Some(tokens.join(" "));
    }

    for attr in layout {
        if attr.name == "class" {
            if let Some(value) = class_value.take() {
                out.push(Attr::new("class", value));
            }
            continue;
        }
        match page.iter().find(|p| p.name == attr.name) {
            Some(page_attr) => out.push(page_attr.clone()),
            None => out.push(attr.clone()),
        }
    }
    for attr in page {
        if attr.name == "class" {
            if let Some(value) = class_value.take() {
                out.push(Attr::new("class", value));
            }
            continue;
        }
        if !out.iter().any(|a| a.name == attr.name) {
            out.push(attr.clone());
        }
    }
    out
}

/// Compose a child document into one layout. Returns the composed full
/// document text.
pub fn compose_step(child: &DocumentParts, layout_text: &str) -> String {
    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    // Head source for the layout side, with removal edits when the layout
    // is a fragment carrying top-level head-ish elements.
    let layout_head = match head::extract_head(layout_text) {
        Some(inner) => inner,
        None => {
            let (fragment, removals) = top_level_headish(layout_text);
            edits.extend(removals);
            fragment
        }
    };

    let page_elements = html::parse_elements(&child.body);
    let page_area_map = page_area_index(&page_elements);
    let layout_areas = area_elements(layout_text);

    // Scheme selection. Area matching applies when both sides carry
    // `unify-*` tokens; even with zero token overlap the page is then
    // area-driven and unmatched layout areas keep their defaults. The
    // landmark scheme applies only to token-free pages. Anything that
    // placed no content falls through to ordered fill.
    let mut replaced = 0usize;
    let area_scheme = !page_area_map.is_empty() && !layout_areas.is_empty();
    if area_scheme {
        for area in &layout_areas {
            if area.tag.self_closing || html::is_void_element(&area.tag.name) {
                continue;
            }
            let matched = area
                .tag
                .area_tokens()
                .into_iter()
                .find_map(|token| page_area_map.get(token).copied());
            let Some(page_index) = matched else {
                continue; // unmatched areas retain layout defaults
            };
            let page_el = &page_elements[page_index];
            let merged = merge_attrs(&area.tag.attrs, &page_el.tag.attrs);
            let replacement = format!(
                "{}{}</{}>",
                html::render_open_tag(&area.tag.name, &merged),
                page_el.inner(&child.body),
                area.tag.name
            );
            edits.push((area.tag.start, area.end, replacement));
            replaced += 1;
        }
    } else if page_area_map.is_empty() {
        let page_landmarks = landmark_map(&child.body);
        if !page_landmarks.is_empty() {
            replaced += apply_landmarks(child, layout_text, &page_landmarks, &mut edits);
        }
    }

    if replaced == 0 && !area_scheme {
        apply_ordered_fill(&child.body, layout_text, &mut edits);
    }

    let composed = html::apply_edits(layout_text, edits);

    // Head merge: layout tier first, the child's pre-merged head last.
    let merged_head = head::merge_heads(&[
        (HeadTier::Layout, layout_head.as_str()),
        (HeadTier::Page, child.head.as_str()),
    ]);
    let composed = head::inject_head(&composed, &merged_head);

    merge_root_attrs(&composed, &child.html_attrs, &child.body_attrs)
}

/// Page landmark elements by name, top-level first occurrence, plus the
/// wrapped leftover content under the `main` key.
fn landmark_map(body: &str) -> HashMap<String, String> {
    let top = top_level_elements(body);
    let mut map: HashMap<String, String> = HashMap::new();
    let mut removals: Vec<(usize, usize, String)> = Vec::new();
    let mut saw_landmark = false;

    for element in &top {
        let name = element.tag.name.as_str();
        if LANDMARKS.contains(&name) {
            saw_landmark = true;
            map.entry(name.to_string())
                .or_insert_with(|| element.inner(body).to_string());
            removals.push((element.tag.start, element.end, String::new()));
        }
    }
    if !saw_landmark {
        return HashMap::new();
    }

    // Content outside every landmark is wrapped into <main> before
    // placement.
    let leftover = html::apply_edits(body, removals);
    if !leftover.trim().is_empty() {
        map.entry("main".to_string())
            .and_modify(|main| {
                main.push('\n');
                main.push_str(leftover.trim());
            })
            .or_insert_with(|| leftover.trim().to_string());
    }
    map
}

fn apply_landmarks(
    child: &DocumentParts,
    layout_text: &str,
    page_landmarks: &HashMap<String, String>,
    edits: &mut Vec<(usize, usize, String)>,
) -> usize {
    let page_elements = html::parse_elements(&child.body);
    let mut replaced = 0usize;
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    for element in html::parse_elements(layout_text) {
        let name = element.tag.name.as_str();
        if !LANDMARKS.contains(&name) || seen.contains(name) {
            continue;
        }
        let Some(content) = page_landmarks.get(name) else {
            continue;
        };
        seen.insert(name.to_string());
        let page_attrs = page_elements
            .iter()
            .find(|e| e.tag.name == name)
            .map(|e| e.tag.attrs.clone())
            .unwrap_or_default();
        let merged = merge_attrs(&element.tag.attrs, &page_attrs);
        let replacement = format!(
            "{}{}</{}>",
            html::render_open_tag(name, &merged),
            content,
            name
        );
        edits.push((element.tag.start, element.end, replacement));
        replaced += 1;
    }
    replaced
}

/// Scheme 3: page body into the layout's first `<main>`, else appended to
/// `<body>`, else appended at the end.
fn apply_ordered_fill(body: &str, layout_text: &str, edits: &mut Vec<(usize, usize, String)>) {
    if let Some(main) = html::first_element_named(layout_text, "main") {
        edits.push((main.inner_start, main.inner_end, body.to_string()));
        return;
    }
    if let Some(body_el) = html::first_element_named(layout_text, "body") {
        edits.push((body_el.inner_end, body_el.inner_end, body.to_string()));
        return;
    }
    edits.push((layout_text.len(), layout_text.len(), body.to_string()));
}

/// Merge child `html`/`body` attributes onto the composed document's root
/// tags.
fn merge_root_attrs(composed: &str, html_attrs: &[Attr], body_attrs: &[Attr]) -> String {
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    if !html_attrs.is_empty() {
        if let Some(element) = html::first_element_named(composed, "html") {
            let merged = merge_attrs(&element.tag.attrs, html_attrs);
            edits.push((
                element.tag.start,
                element.tag.end,
                html::render_open_tag("html", &merged),
            ));
        }
    }
    if !body_attrs.is_empty() {
        if let Some(element) = html::first_element_named(composed, "body") {
            let merged = merge_attrs(&element.tag.attrs, body_attrs);
            edits.push((
                element.tag.start,
                element.tag.end,
                html::render_open_tag("body", &merged),
            ));
        }
    }
    if edits.is_empty() {
        composed.to_string()
    } else {
        html::apply_edits(composed, edits)
    }
}

/// Compose a page through its layout chain, innermost first, and apply the
/// final output rules.
pub fn compose_chain(page: DocumentParts, layout_texts: &[String]) -> String {
    let mut parts = page;
    let mut composed = String::new();
    for layout_text in layout_texts {
        composed = compose_step(&parts, layout_text);
        parts = split_document(&composed);
    }
    finalize(&composed)
}

/// Synthesize the page-tier head fragment from Markdown frontmatter:
/// `title`, `description` (falling back to `excerpt`), `author`, `og:*`
/// metas, `schema` as `application/ld+json`, the `head` object array, and
/// raw `head_html` lines.
pub fn frontmatter_head(meta: &crate::parsers::frontmatter::PageMeta) -> String {
    let mut out: Vec<String> = Vec::new();
    if let Some(title) = &meta.title {
        out.push(format!("<title>{}</title>", escape_text(title)));
    }
    let description = meta.description.as_ref().or(meta.excerpt.as_ref());
    if let Some(description) = description {
        out.push(meta_named("description", description));
    }
    if let Some(author) = &meta.author {
        out.push(meta_named("author", author));
    }
    for (property, content) in meta.open_graph() {
        out.push(format!(
            "<meta property=\"{}\" content=\"{}\">",
            escape_attr(&property),
            escape_attr(&content)
        ));
    }
    if let Some(schema) = &meta.schema {
        if let Ok(json) = serde_json::to_string(schema) {
            out.push(format!(
                "<script type=\"application/ld+json\">{json}</script>"
            ));
        }
    }
    if let Some(entries) = &meta.head {
        for entry in entries {
            out.push(render_head_entry(entry));
        }
    }
    if let Some(raw) = &meta.head_html {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    out.join("\n")
}

/// Render one `head:` array object. The `tag` key picks the element
/// (default `meta`); remaining keys become attributes in name order.
fn render_head_entry(
    entry: &std::collections::BTreeMap<String, serde_yaml::Value>,
) -> String {
    use crate::parsers::frontmatter::yaml_scalar_to_string;
    let tag = entry
        .get("tag")
        .and_then(|v| v.as_str())
        .unwrap_or("meta")
        .to_ascii_lowercase();
    let attrs: Vec<Attr> = entry
        .iter()
        .filter(|(key, _)| key.as_str() != "tag")
        .map(|(key, value)| Attr::new(key.clone(), escape_attr(&yaml_scalar_to_string(value))))
        .collect();
    let open = html::render_open_tag(&tag, &attrs);
    if html::is_void_element(&tag) {
        open
    } else {
        format!("{open}</{tag}>")
    }
}

fn meta_named(name: &str, content: &str) -> String {
    format!(
        "<meta name=\"{name}\" content=\"{}\">",
        escape_attr(content)
    )
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Final emission rules: strip `data-unify` and legacy `data-layer`
/// attributes, drop documentation-only `<style data-unify-docs>` blocks.
pub fn finalize(composed: &str) -> String {
    let stripped = html::remove_elements(composed, |tag| {
        tag.name == "style" && tag.has_attr("data-unify-docs")
    });
    let stripped = html::strip_attr_everywhere(&stripped, "data-unify");
    html::strip_attr_everywhere(&stripped, "data-layer")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> DocumentParts {
        DocumentParts {
            body: body.to_string(),
            ..Default::default()
        }
    }

    const LAYOUT: &str = "<html><head><title>Site</title></head><body>\
<header class=\"unify-header\">default header</header>\
<main class=\"unify-content\">default content</main>\
</body></html>";

    #[test]
    fn test_area_replacement() {
        let child = page("<main class=\"unify-content\"><p>Body</p></main>");
        let out = compose_step(&child, LAYOUT);
        assert!(out.contains("<main class=\"unify-content\"><p>Body</p></main>"));
        assert!(
            out.contains("default header"),
            "unmatched area keeps layout default"
        );
    }

    #[test]
    fn test_area_attr_merge_page_wins() {
        let child = page(
            "<main class=\"unify-content wide\" data-page=\"1\"><p>x</p></main>",
        );
        let layout = "<body><main class=\"unify-content\" data-page=\"0\" id=\"m\">d</main></body>";
        let out = compose_step(&child, layout);
        assert!(out.contains("class=\"unify-content wide\""), "class union: {out}");
        assert!(out.contains("data-page=\"1\""), "page attr wins: {out}");
        assert!(out.contains("id=\"m\""), "layout-only attr kept: {out}");
    }

    #[test]
    fn test_class_union_preserves_first_occurrence() {
        let merged = merge_attrs(
            &[Attr::new("class", "a b")],
            &[Attr::new("class", "b c")],
        );
        assert_eq!(merged, vec![Attr::new("class", "a b c")]);
    }

    #[test]
    fn test_merge_attrs_page_only_class() {
        let merged = merge_attrs(&[Attr::new("id", "x")], &[Attr::new("class", "c")]);
        assert!(merged.contains(&Attr::new("id", "x")));
        assert!(merged.contains(&Attr::new("class", "c")));
        assert_eq!(merged.iter().filter(|a| a.name == "class").count(), 1);
    }

    #[test]
    fn test_landmark_scheme() {
        let child = page("<header><h1>Page</h1></header><p>loose text</p>");
        let layout = "<html><body><header>default</header><main>default</main></body></html>";
        let out = compose_step(&child, layout);
        assert!(out.contains("<header><h1>Page</h1></header>"));
        assert!(
            out.contains("<main><p>loose text</p></main>"),
            "loose content wraps into main: {out}"
        );
    }

    #[test]
    fn test_ordered_fill_into_first_main() {
        let child = page("<p>just content</p>");
        let layout = "<html><body><nav>n</nav><main>default</main></body></html>";
        let out = compose_step(&child, layout);
        assert!(out.contains("<main><p>just content</p></main>"));
        assert!(out.contains("<nav>n</nav>"));
    }

    #[test]
    fn test_ordered_fill_appends_to_body_without_main() {
        let child = page("<p>content</p>");
        let layout = "<html><body><footer>f</footer></body></html>";
        let out = compose_step(&child, layout);
        assert!(out.contains("<footer>f</footer><p>content</p></body>"));
    }

    #[test]
    fn test_head_merge_page_title_wins() {
        let mut child = page("<main class=\"unify-content\">x</main>");
        child.head = "<title>Post</title>".to_string();
        let out = compose_step(&child, LAYOUT);
        assert_eq!(out.matches("<title>").count(), 1);
        assert!(out.contains("<title>Post</title>"));
    }

    #[test]
    fn test_fragment_layout_headish_not_duplicated() {
        let mut child = page("<main class=\"unify-content\">x</main>");
        child.head = "<title>Post</title>".to_string();
        let layout =
            "<title>Blog</title><body><main class=\"unify-content\">default</main></body>";
        let out = compose_step(&child, layout);
        assert_eq!(out.matches("<title>").count(), 1, "out: {out}");
        assert!(out.contains("<title>Post</title>"));
    }

    #[test]
    fn test_split_document_full() {
        let parts = split_document(
            "<html lang=\"en\"><head><title>T</title></head><body class=\"b\">content</body></html>",
        );
        assert_eq!(parts.head, "<title>T</title>");
        assert_eq!(parts.body, "content");
        assert_eq!(parts.html_attrs, vec![Attr::new("lang", "en")]);
        assert_eq!(parts.body_attrs, vec![Attr::new("class", "b")]);
    }

    #[test]
    fn test_split_document_fragment_extracts_headish() {
        let parts = split_document("<title>Post</title><main class=\"unify-content\">x</main>");
        assert_eq!(parts.head, "<title>Post</title>");
        assert_eq!(parts.body, "<main class=\"unify-content\">x</main>");
    }

    #[test]
    fn test_chain_composition_title_override() {
        let child = DocumentParts {
            head: "<title>Post</title>".to_string(),
            body: "<main class=\"unify-content\"><p>Body</p></main>".to_string(),
            ..Default::default()
        };
        let blog =
            "<title>Blog</title><body><main class=\"unify-content\">default</main></body>"
                .to_string();
        let site = "<html><head><title>Site</title></head><body><main class=\"unify-content\">default</main></body></html>".to_string();
        let out = compose_chain(child, &[blog, site]);
        assert_eq!(out.matches("<title>").count(), 1);
        assert!(out.contains("<title>Post</title>"));
        assert!(out.contains("<main class=\"unify-content\"><p>Body</p></main>"));
    }

    #[test]
    fn test_finalize_strips_unify_attrs_and_docs_styles() {
        let composed = "<html data-unify=\"base\"><head><style data-unify-docs>.x{}</style></head><body data-layer=\"2\"><main>x</main></body></html>";
        let out = finalize(composed);
        assert!(!out.contains("data-unify"));
        assert!(!out.contains("data-layer"));
        assert!(!out.contains("data-unify-docs"));
        assert!(out.contains("<main>x</main>"));
    }

    #[test]
    fn test_root_attr_merge_from_frontmatter() {
        let child = DocumentParts {
            body: "<p>x</p>".to_string(),
            html_attrs: vec![Attr::new("lang", "en"), Attr::new("data-theme", "dark")],
            body_attrs: vec![Attr::new("class", "docs")],
            ..Default::default()
        };
        let layout = "<html lang=\"de\"><body class=\"site\"><main>d</main></body></html>";
        let out = compose_step(&child, layout);
        assert!(out.contains("lang=\"en\""), "page overrides layout lang: {out}");
        assert!(out.contains("data-theme=\"dark\""));
        assert!(out.contains("class=\"site docs\""), "body class union: {out}");
    }

    #[test]
    fn test_frontmatter_head_synthesis() {
        use crate::parsers::frontmatter::PageMeta;
        let meta = PageMeta::parse(
            "title: A & B\ndescription: \"Quote \\\"d\\\"\"\nauthor: Ada\n\"og:title\": Open",
        )
        .unwrap();
        let head = frontmatter_head(&meta);
        assert!(head.contains("<title>A &amp; B</title>"));
        assert!(head.contains("<meta name=\"description\" content=\"Quote &quot;d&quot;\">"));
        assert!(head.contains("<meta name=\"author\" content=\"Ada\">"));
        assert!(head.contains("<meta property=\"og:title\" content=\"Open\">"));
    }

    #[test]
    fn test_frontmatter_head_excerpt_fallback() {
        use crate::parsers::frontmatter::PageMeta;
        let meta = PageMeta::parse("excerpt: short form").unwrap();
        let head = frontmatter_head(&meta);
        assert!(head.contains("<meta name=\"description\" content=\"short form\">"));

        let meta = PageMeta::parse("description: real\nexcerpt: short").unwrap();
        let head = frontmatter_head(&meta);
        assert!(head.contains("content=\"real\""));
        assert!(!head.contains("content=\"short\""));
    }

    #[test]
    fn test_frontmatter_head_schema_and_entries() {
        use crate::parsers::frontmatter::PageMeta;
        let meta = PageMeta::parse(
            "schema:\n  \"@type\": Article\nhead:\n  - tag: link\n    rel: preload\n    href: /f.woff2\nhead_html: \"<meta name=\\\"robots\\\" content=\\\"noindex\\\">\"",
        )
        .unwrap();
        let head = frontmatter_head(&meta);
        assert!(head.contains("application/ld+json"));
        assert!(head.contains("\"@type\":\"Article\""));
        assert!(head.contains("<link href=\"/f.woff2\" rel=\"preload\">"));
        assert!(head.contains("<meta name=\"robots\" content=\"noindex\">"));
    }

    #[test]
    fn test_page_areas_with_arealess_layout_falls_back_to_fill() {
        let child = page("<div class=\"unify-hero\">h</div>");
        let layout = "<html><body><main>default</main></body></html>";
        let out = compose_step(&child, layout);
        assert!(
            out.contains("<main><div class=\"unify-hero\">h</div></main>"),
            "content must not be dropped: {out}"
        );
    }
}
