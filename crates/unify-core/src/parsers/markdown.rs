//! Markdown rendering, treated as an opaque transform by the pipeline.

use pulldown_cmark::{Event, Options, Parser};

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options
}

/// Render Markdown to an HTML fragment.
pub fn render(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, parser_options());
    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

/// True when the Markdown body carries a literal `<head>` element outside
/// code fences. Fenced and indented code never produce HTML events, so the
/// event scan gives the fence-awareness for free.
pub fn contains_head_element(markdown: &str) -> bool {
    let parser = Parser::new_ext(markdown, parser_options());
    for event in parser {
        let raw = match &event {
            Event::Html(html) | Event::InlineHtml(html) => html.as_ref(),
            _ => continue,
        };
        let lowered = raw.to_ascii_lowercase();
        if lowered.contains("<head>") || lowered.contains("<head ") {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_heading_and_paragraph() {
        let html = render("# Title\n\nSome *emphasis*.");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>emphasis</em>"));
    }

    #[test]
    fn test_render_table_extension() {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_render_passes_raw_html_through() {
        let html = render("before\n\n<main class=\"unify-content\">x</main>\n\nafter");
        assert!(html.contains("<main class=\"unify-content\">x</main>"));
    }

    #[test]
    fn test_head_detected_in_html_block() {
        assert!(contains_head_element("text\n\n<head><title>x</title></head>\n"));
    }

    #[test]
    fn test_head_in_fence_not_detected() {
        let markdown = "```html\n<head><title>x</title></head>\n```\n";
        assert!(!contains_head_element(markdown));
    }

    #[test]
    fn test_head_in_inline_code_not_detected() {
        assert!(!contains_head_element("use `<head>` for metadata"));
    }

    #[test]
    fn test_header_element_is_not_head() {
        assert!(!contains_head_element("<header>site</header>\n"));
    }
}
