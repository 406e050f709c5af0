//! DOM sanitisation
//!
//! A typed visitor over the parsed tree that produces an owned, clean tree
//! ready for Markdown rendering. The removal set, the element whitelist
//! and the attribute policy are data tables: anything in the removal set
//! is dropped with its subtree, anything outside the whitelist is unwrapped
//! (children promoted in place, text preserved), and the only attribute
//! that survives is `href` on anchors, rewritten absolute against the
//! final URL.

use ego_tree::NodeRef;
use scraper::node::Node;
use url::Url;

/// A node in the sanitised tree
#[derive(Debug, Clone, PartialEq)]
pub enum CleanNode {
    Element {
        tag: &'static str,
        href: Option<String>,
        children: Vec<CleanNode>,
    },
    Text(String),
}

impl CleanNode {
    pub fn element(tag: &'static str, children: Vec<CleanNode>) -> Self {
        Self::Element {
            tag,
            href: None,
            children,
        }
    }
}

/// Elements that survive sanitisation as themselves
const KEEP_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "ul", "ol", "li", "a", "pre", "code", "blockquote",
    "table", "thead", "tbody", "tfoot", "tr", "th", "td", "em", "i", "strong", "b", "hr", "br",
    "dl", "dt", "dd", "sup", "sub", "abbr", "mark", "del", "ins", "details", "summary",
];

/// Elements dropped with their whole subtree. `head` and `title` are here
/// so a whole-document walk never leaks non-content text.
const DROP_TAGS: &[&str] = &[
    "img", "picture", "source", "video", "audio", "iframe", "embed", "object", "canvas", "svg",
    "script", "style", "noscript", "form", "button", "input", "select", "textarea", "link", "nav",
    "header", "footer", "aside", "head", "title", "meta", "base",
];

/// `role` values that mark page chrome
const DROP_ROLES: &[&str] = &["banner", "navigation", "contentinfo"];

/// Class fragments that mark ads, social chrome and sidebars
const DROP_CLASS_FRAGMENTS: &[&str] = &["sidebar", "ad-", "advertisement", "social", "share", "related"];

/// Sanitise the subtree rooted at `root`, resolving anchors against `base`
pub fn sanitize(root: NodeRef<'_, Node>, base: &Url) -> Vec<CleanNode> {
    clean_children(root, base)
}

fn clean_children(node: NodeRef<'_, Node>, base: &Url) -> Vec<CleanNode> {
    let mut out = Vec::new();
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                out.push(CleanNode::Text(text.to_string()));
            }
            Node::Element(el) => {
                let tag = el.name();
                if should_drop(el) {
                    continue;
                }
                if tag == "figure" {
                    if let Some(caption) = find_figcaption(child) {
                        let children = clean_children(caption, base);
                        if !children.is_empty() {
                            out.push(CleanNode::element("p", children));
                        }
                    }
                    continue;
                }
                match keep_tag(tag) {
                    Some(kept) => {
                        let href = if kept == "a" {
                            el.attr("href").map(|h| resolve_href(h, base))
                        } else {
                            None
                        };
                        out.push(CleanNode::Element {
                            tag: kept,
                            href,
                            children: clean_children(child, base),
                        });
                    }
                    // Outside the whitelist: promote children in place
                    None => out.extend(clean_children(child, base)),
                }
            }
            _ => {}
        }
    }
    out
}

fn keep_tag(tag: &str) -> Option<&'static str> {
    KEEP_TAGS.iter().find(|t| **t == tag).copied()
}

fn should_drop(el: &scraper::node::Element) -> bool {
    let tag = el.name();
    if DROP_TAGS.contains(&tag) {
        return true;
    }
    if el.attr("aria-live").is_some() {
        return true;
    }
    if let Some(role) = el.attr("role") {
        if DROP_ROLES.contains(&role.to_ascii_lowercase().as_str()) {
            return true;
        }
    }
    if let Some(class) = el.attr("class") {
        let class = class.to_ascii_lowercase();
        if DROP_CLASS_FRAGMENTS.iter().any(|f| class.contains(f)) {
            return true;
        }
    }
    if let Some(id) = el.attr("id") {
        if id.to_ascii_lowercase().contains("ad-") {
            return true;
        }
    }
    false
}

fn find_figcaption<'a>(figure: NodeRef<'a, Node>) -> Option<NodeRef<'a, Node>> {
    figure.descendants().find(|n| {
        matches!(n.value(), Node::Element(el) if el.name() == "figcaption")
    })
}

/// Resolve an href against the base URL; malformed hrefs pass through as-is
fn resolve_href(href: &str, base: &Url) -> String {
    match base.join(href) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Render the sanitised tree back to minimal HTML (tag + href only)
pub fn render_html(nodes: &[CleanNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            CleanNode::Text(text) => out.push_str(&escape_html(text)),
            CleanNode::Element { tag, href, children } => {
                if matches!(*tag, "br" | "hr") {
                    out.push_str(&format!("<{tag}>"));
                    continue;
                }
                match href {
                    Some(href) => {
                        out.push_str(&format!("<{tag} href=\"{}\">", escape_html(href)))
                    }
                    None => out.push_str(&format!("<{tag}>")),
                }
                out.push_str(&render_html(children));
                out.push_str(&format!("</{tag}>"));
            }
        }
    }
    out
}

/// Collect anchor targets in document order, de-duplicated
pub fn collect_links(nodes: &[CleanNode]) -> Vec<String> {
    let mut links = Vec::new();
    walk_links(nodes, &mut links);
    links
}

fn walk_links(nodes: &[CleanNode], out: &mut Vec<String>) {
    for node in nodes {
        if let CleanNode::Element { href, children, .. } = node {
            if let Some(href) = href {
                if !out.contains(href) {
                    out.push(href.clone());
                }
            }
            walk_links(children, out);
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn clean(html: &str) -> Vec<CleanNode> {
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/dir/page").unwrap();
        sanitize(doc.tree.root(), &base)
    }

    fn html_of(html: &str) -> String {
        render_html(&clean(html))
    }

    #[test]
    fn test_drops_scripts_styles_and_media() {
        let out = html_of(
            "<body><script>evil()</script><style>p{}</style><img src=x>\
             <iframe src=y></iframe><p>kept</p></body>",
        );
        assert!(!out.contains("script"));
        assert!(!out.contains("style"));
        assert!(!out.contains("img"));
        assert!(!out.contains("iframe"));
        assert!(out.contains("<p>kept</p>"));
    }

    #[test]
    fn test_drops_chrome_by_role_and_class() {
        let out = html_of(
            "<div role=\"navigation\">menu</div>\
             <div class=\"left-sidebar\">side</div>\
             <div class=\"share-buttons\">share</div>\
             <div id=\"ad-top\">buy</div>\
             <div aria-live=\"polite\">toast</div>\
             <p>body</p>",
        );
        assert!(!out.contains("menu"));
        assert!(!out.contains("side"));
        assert!(!out.contains("share"));
        assert!(!out.contains("buy"));
        assert!(!out.contains("toast"));
        assert!(out.contains("body"));
    }

    #[test]
    fn test_unwraps_unknown_elements_preserving_text() {
        let out = html_of("<div><span>one</span> <section><p>two</p></section></div>");
        assert!(!out.contains("div"));
        assert!(!out.contains("span"));
        assert!(!out.contains("section"));
        assert!(out.contains("one"));
        assert!(out.contains("<p>two</p>"));
    }

    #[test]
    fn test_figure_becomes_caption_paragraph() {
        let out = html_of("<figure><img src=x><figcaption>A chart</figcaption></figure>");
        assert_eq!(out.trim(), "<p>A chart</p>");

        let out = html_of("<figure><img src=x></figure>");
        assert!(!out.contains("figure"));
        assert!(!out.contains("img"));
    }

    #[test]
    fn test_anchor_hrefs_are_rewritten_absolute() {
        let out = html_of("<p><a href=\"/about\">About</a> <a href=\"other.html\">Other</a></p>");
        assert!(out.contains("href=\"https://example.com/about\""));
        assert!(out.contains("href=\"https://example.com/dir/other.html\""));
    }

    #[test]
    fn test_absolute_and_malformed_hrefs() {
        let out = html_of("<a href=\"https://other.com/x\">x</a>");
        assert!(out.contains("href=\"https://other.com/x\""));

        // A scheme-relative monstrosity url::Url cannot join stays as-is
        let doc = Html::parse_document("<a href=\"http://[bad\">x</a>");
        let base = Url::parse("https://example.com/").unwrap();
        let nodes = sanitize(doc.tree.root(), &base);
        let links = collect_links(&nodes);
        assert_eq!(links, vec!["http://[bad".to_string()]);
    }

    #[test]
    fn test_attribute_scrub_keeps_only_href() {
        let out = html_of(
            "<p class=\"x\" style=\"color:red\" onclick=\"evil()\">t</p>\
             <a href=\"/a\" target=\"_blank\" rel=\"nofollow\">a</a>",
        );
        assert!(!out.contains("class"));
        assert!(!out.contains("style"));
        assert!(!out.contains("onclick"));
        assert!(!out.contains("target"));
        assert!(!out.contains("rel"));
        assert!(out.contains("href=\"https://example.com/a\""));
    }

    #[test]
    fn test_collect_links_dedups_in_order() {
        let nodes = clean(
            "<a href=\"/a\">1</a><a href=\"/b\">2</a><a href=\"/a\">3</a>",
        );
        let links = collect_links(&nodes);
        assert_eq!(
            links,
            vec![
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ]
        );
    }

    #[test]
    fn test_text_is_escaped_in_rendered_html() {
        let out = html_of("<p>a &lt; b &amp; c</p>");
        assert!(out.contains("a &lt; b &amp; c"));
    }
}
