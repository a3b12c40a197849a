//! Markdown rendering and HTML sanitization
//!
//! Raw bodies are rendered to HTML with pulldown-cmark, then cleaned
//! through ammonia against a per-context tag allow-list. The output is
//! a pure, deterministic function of the input, so derived HTML bodies
//! are always recomputed from the raw body, never edited directly.

use std::collections::HashSet;

use pulldown_cmark::{html, Options, Parser};

/// Tags allowed in post bodies
const POST_ALLOWED_TAGS: [&str; 16] = [
    "a", "abbr", "acronym", "b", "blockquote", "code", "em", "i", "li", "ol", "pre", "strong",
    "ul", "h1", "h2", "h3",
];

/// Tags allowed in comment bodies (smaller set, no block elements)
const COMMENT_ALLOWED_TAGS: [&str; 8] = ["a", "abbr", "acronym", "b", "code", "em", "i", "strong"];

fn render_markdown(raw: &str) -> String {
    let parser = Parser::new_ext(raw, Options::empty());
    let mut out = String::with_capacity(raw.len() * 2);
    html::push_html(&mut out, parser);
    out
}

fn sanitize(dirty: &str, allowed: &[&str], allow_paragraphs: bool) -> String {
    let mut tags: HashSet<&str> = allowed.iter().copied().collect();
    if allow_paragraphs {
        tags.insert("p");
    }

    ammonia::Builder::default()
        .tags(tags)
        .link_rel(Some("noopener noreferrer"))
        .clean(dirty)
        .to_string()
}

/// Render a post body to sanitized HTML
pub fn post_html(raw: &str) -> String {
    sanitize(&render_markdown(raw), &POST_ALLOWED_TAGS, true)
}

/// Render a comment body to sanitized HTML
///
/// Comments do not keep paragraph or heading structure.
pub fn comment_html(raw: &str) -> String {
    sanitize(&render_markdown(raw), &COMMENT_ALLOWED_TAGS, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_html_renders_markdown() {
        let html = post_html("# Title\n\nSome *emphasis* and **bold**.");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>emphasis</em>"));
        assert!(html.contains("<strong>bold</strong>"));
    }

    #[test]
    fn post_html_strips_disallowed_tags() {
        let html = post_html("hello <script>alert('x')</script> <img src=x> world");
        assert!(!html.contains("<script"));
        assert!(!html.contains("<img"));
        assert!(html.contains("hello"));
        assert!(html.contains("world"));
    }

    #[test]
    fn post_html_is_deterministic() {
        let raw = "a [link](https://example.com) and `code`";
        assert_eq!(post_html(raw), post_html(raw));
    }

    #[test]
    fn comment_html_allows_fewer_tags_than_posts() {
        let raw = "# Heading\n\n> quoted\n\n*fine*";
        let as_post = post_html(raw);
        let as_comment = comment_html(raw);

        assert!(as_post.contains("<h1>"));
        assert!(as_post.contains("<blockquote>"));
        assert!(!as_comment.contains("<h1>"));
        assert!(!as_comment.contains("<blockquote>"));
        assert!(as_comment.contains("<em>fine</em>"));
    }

    #[test]
    fn links_get_rel_attributes() {
        let html = comment_html("[here](https://example.com)");
        assert!(html.contains("rel=\"noopener noreferrer\""));
        assert!(html.contains("href=\"https://example.com\""));
    }
}
