//! Bounded HTML tag scanner.
//!
//! The composer and head merger need tag names, attributes, and byte spans,
//! not a live DOM. This scanner tokenizes tags in a single pass, pairs them
//! into elements with a stack, and never panics on malformed input: stray
//! `<`, unterminated quotes, and unclosed tags degrade to text or to
//! end-of-input spans. Inputs beyond [`MAX_SCAN_INPUT`] are not scanned at
//! all and callers fall back to pass-through behaviour.

use std::fmt::Write as _;

/// Scan bound; larger inputs are passed through unmodified.
pub const MAX_SCAN_INPUT: usize = 10 * 1024 * 1024;

/// Elements with no closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is raw text until the matching close tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// One parsed attribute. `value: None` is a boolean attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: Option<String>,
}

impl Attr {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// A parsed open tag with its byte span.
#[derive(Debug, Clone)]
pub struct Tag {
    /// Lowercased element name.
    pub name: String,
    pub attrs: Vec<Attr>,
    /// Byte offset of `<`.
    pub start: usize,
    /// Byte offset just past `>`.
    pub end: usize,
    pub self_closing: bool,
}

impl Tag {
    /// Attribute value by (lowercase) name. Boolean attributes yield `""`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    pub fn class_tokens(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_ascii_whitespace().collect())
            .unwrap_or_default()
    }

    /// Class tokens of the `unify-*` form marking cascade areas.
    pub fn area_tokens(&self) -> Vec<&str> {
        self.class_tokens()
            .into_iter()
            .filter(|t| t.starts_with("unify-"))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum Token {
    Open(Tag),
    Close {
        name: String,
        start: usize,
        end: usize,
    },
    Comment {
        start: usize,
        end: usize,
    },
    Doctype {
        start: usize,
        end: usize,
    },
}

/// A paired element: open tag, inner span, and full span.
///
/// Void and self-closing elements have an empty inner span and `end`
/// coinciding with the open tag's end. Elements left unclosed at end of
/// input extend to the end of the document.
#[derive(Debug, Clone)]
pub struct Element {
    pub tag: Tag,
    pub inner_start: usize,
    pub inner_end: usize,
    pub end: usize,
}

impl Element {
    pub fn inner<'a>(&self, html: &'a str) -> &'a str {
        &html[self.inner_start..self.inner_end]
    }

    pub fn outer<'a>(&self, html: &'a str) -> &'a str {
        &html[self.tag.start..self.end]
    }
}

/// Tokenize every tag in the input. Returns an empty stream for inputs over
/// the scan bound.
pub fn scan(html: &str) -> Vec<Token> {
    if html.len() > MAX_SCAN_INPUT {
        return Vec::new();
    }
    let bytes = html.as_bytes();
    let lower = html.to_ascii_lowercase();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let Some(offset) = html[i..].find('<') else {
            break;
        };
        let at = i + offset;

        if html[at..].starts_with("<!--") {
            let end = match html[at + 4..].find("-->") {
                Some(p) => at + 4 + p + 3,
                None => html.len(),
            };
            tokens.push(Token::Comment { start: at, end });
            i = end;
            continue;
        }

        if html[at..].starts_with("<!") {
            let end = match html[at..].find('>') {
                Some(p) => at + p + 1,
                None => html.len(),
            };
            tokens.push(Token::Doctype { start: at, end });
            i = end;
            continue;
        }

        if html[at..].starts_with("</") {
            let name_start = at + 2;
            let name_end = scan_name(bytes, name_start);
            if name_end == name_start {
                // `</>` or garbage; treat as text.
                i = at + 2;
                continue;
            }
            let end = match html[name_end..].find('>') {
                Some(p) => name_end + p + 1,
                None => html.len(),
            };
            tokens.push(Token::Close {
                name: lower[name_start..name_end].to_string(),
                start: at,
                end,
            });
            i = end;
            continue;
        }

        let name_start = at + 1;
        let name_end = scan_name(bytes, name_start);
        if name_end == name_start {
            // Lone `<`; treat as text.
            i = at + 1;
            continue;
        }

        let name = lower[name_start..name_end].to_string();
        let (attrs, tag_end, self_closing) = scan_attrs(html, name_end);
        let tag = Tag {
            name: name.clone(),
            attrs,
            start: at,
            end: tag_end,
            self_closing,
        };
        tokens.push(Token::Open(tag));
        i = tag_end;

        // Raw text elements swallow everything until their close tag.
        if !self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            let close_marker = format!("</{name}");
            i = match lower[tag_end..].find(&close_marker) {
                Some(p) => tag_end + p,
                None => html.len(),
            };
        }
    }
    tokens
}

/// Tag and attribute names: ASCII letters, digits, `-`, `_`, `:`.
fn scan_name(bytes: &[u8], start: usize) -> usize {
    if start >= bytes.len() || !bytes[start].is_ascii_alphabetic() {
        return start;
    }
    let mut i = start;
    while i < bytes.len()
        && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'-' | b'_' | b':'))
    {
        i += 1;
    }
    i
}

/// Parse attributes starting right after the tag name. Returns the attrs,
/// the offset just past `>`, and the self-closing flag. Tolerates unquoted,
/// single-quoted, double-quoted, and boolean attributes.
fn scan_attrs(html: &str, mut i: usize) -> (Vec<Attr>, usize, bool) {
    let bytes = html.as_bytes();
    let mut attrs = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return (attrs, html.len(), false);
        }
        match bytes[i] {
            b'>' => return (attrs, i + 1, false),
            b'/' => {
                if bytes.get(i + 1) == Some(&b'>') {
                    return (attrs, i + 2, true);
                }
                i += 1;
            }
            _ => {
                let name_start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'=' | b'>' | b'/')
                {
                    i += 1;
                }
                if i == name_start {
                    // Unparseable byte; skip it.
                    i += 1;
                    continue;
                }
                let name = html[name_start..i].to_ascii_lowercase();
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if bytes.get(i) == Some(&b'=') {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    let value = match bytes.get(i) {
                        Some(&q @ (b'"' | b'\'')) => {
                            let value_start = i + 1;
                            match html[value_start..].find(q as char) {
                                Some(p) => {
                                    i = value_start + p + 1;
                                    html[value_start..value_start + p].to_string()
                                }
                                None => {
                                    // Unterminated quote: consume the rest.
                                    i = html.len();
                                    html[value_start..].to_string()
                                }
                            }
                        }
                        _ => {
                            let value_start = i;
                            while i < bytes.len()
                                && !bytes[i].is_ascii_whitespace()
                                && bytes[i] != b'>'
                            {
                                i += 1;
                            }
                            html[value_start..i].to_string()
                        }
                    };
                    attrs.push(Attr::new(name, value));
                } else {
                    attrs.push(Attr::boolean(name));
                }
            }
        }
    }
}

/// Pair tokens into elements, ordered by open-tag position.
pub fn parse_elements(html: &str) -> Vec<Element> {
    let tokens = scan(html);
    let mut stack: Vec<Tag> = Vec::new();
    let mut out: Vec<Element> = Vec::new();

    for token in tokens {
        match token {
            Token::Open(tag) => {
                if tag.self_closing || is_void_element(&tag.name) {
                    let end = tag.end;
                    out.push(Element {
                        inner_start: end,
                        inner_end: end,
                        end,
                        tag,
                    });
                } else {
                    stack.push(tag);
                }
            }
            Token::Close { name, start, end } => {
                let Some(open_at) = stack.iter().rposition(|t| t.name == name) else {
                    continue; // stray close tag
                };
                // Anything above the match is implicitly closed here.
                while stack.len() > open_at + 1 {
                    let tag = stack.pop().expect("stack length checked");
                    let inner_start = tag.end;
                    out.push(Element {
                        inner_start,
                        inner_end: start,
                        end: start,
                        tag,
                    });
                }
                let tag = stack.pop().expect("stack length checked");
                let inner_start = tag.end;
                out.push(Element {
                    inner_start,
                    inner_end: start,
                    end,
                    tag,
                });
            }
            Token::Comment { .. } | Token::Doctype { .. } => {}
        }
    }

    // Unclosed elements extend to the end of input.
    while let Some(tag) = stack.pop() {
        let inner_start = tag.end;
        out.push(Element {
            inner_start,
            inner_end: html.len(),
            end: html.len(),
            tag,
        });
    }

    out.sort_by_key(|e| e.tag.start);
    out
}

/// First element with the given (lowercase) name.
pub fn first_element_named(html: &str, name: &str) -> Option<Element> {
    parse_elements(html)
        .into_iter()
        .find(|e| e.tag.name == name)
}

/// Render an open tag from a name and attribute list. Double quotes are
/// used unless the value itself contains one.
pub fn render_open_tag(name: &str, attrs: &[Attr]) -> String {
    let mut out = String::with_capacity(name.len() + 2 + attrs.len() * 16);
    out.push('<');
    out.push_str(name);
    for attr in attrs {
        out.push(' ');
        out.push_str(&attr.name);
        if let Some(value) = &attr.value {
            if value.contains('"') {
                let _ = write!(out, "='{value}'");
            } else {
                let _ = write!(out, "=\"{value}\"");
            }
        }
    }
    out.push('>');
    out
}

/// Remove an attribute from every open tag that carries it. Tags are
/// re-rendered; the rest of the document is untouched.
pub fn strip_attr_everywhere(html: &str, attr_name: &str) -> String {
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    for token in scan(html) {
        if let Token::Open(tag) = token {
            if tag.has_attr(attr_name) {
                let kept: Vec<Attr> = tag
                    .attrs
                    .iter()
                    .filter(|a| a.name != attr_name)
                    .cloned()
                    .collect();
                let mut rendered = render_open_tag(&tag.name, &kept);
                if tag.self_closing {
                    rendered.pop();
                    rendered.push_str(" />");
                }
                edits.push((tag.start, tag.end, rendered));
            }
        }
    }
    apply_edits(html, edits)
}

/// Remove whole elements matching the predicate (outer span, including the
/// close tag).
pub fn remove_elements(html: &str, pred: impl Fn(&Tag) -> bool) -> String {
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut covered_until = 0usize;
    for element in parse_elements(html) {
        if element.tag.start < covered_until {
            continue; // nested inside an element already removed
        }
        if pred(&element.tag) {
            edits.push((element.tag.start, element.end, String::new()));
            covered_until = element.end;
        }
    }
    apply_edits(html, edits)
}

/// Apply non-overlapping `(start, end, replacement)` edits. Edits are
/// applied back-to-front so earlier offsets stay valid.
pub fn apply_edits(html: &str, mut edits: Vec<(usize, usize, String)>) -> String {
    edits.sort_by_key(|(start, _, _)| *start);
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0usize;
    for (start, end, replacement) in edits {
        if start < cursor {
            continue; // overlapping edit; first one wins
        }
        out.push_str(&html[cursor..start]);
        out.push_str(&replacement);
        cursor = end;
    }
    out.push_str(&html[cursor..]);
    out
}
