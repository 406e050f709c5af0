//! Markdown rendering over the sanitised tree
//!
//! ATX headings, fenced code blocks, `-` bullets, `*` emphasis. Whitespace
//! is tightened at the end: CRLF normalised, trailing spaces dropped, runs
//! of blank lines collapsed, and the whole document trimmed. Tightening is
//! idempotent.

use super::sanitize::CleanNode;

/// Render a sanitised tree to tightened Markdown
pub fn to_markdown(nodes: &[CleanNode]) -> String {
    let mut out = String::new();
    render_blocks(nodes, &mut out);
    tighten(&out)
}

/// Apply a length cap, appending a truncation marker when it fires
pub fn cap_length(markdown: String, max_length: usize) -> String {
    if max_length == 0 || markdown.len() <= max_length {
        return markdown;
    }
    let mut end = max_length;
    while end > 0 && !markdown.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n\n[…truncated]", &markdown[..end])
}

/// Normalise CRLF, drop trailing spaces, collapse blank-line runs, trim.
/// Running this twice equals running it once.
pub fn tighten(s: &str) -> String {
    let normalized = s.replace("\r\n", "\n");
    let mut out: Vec<&str> = Vec::new();
    let mut blanks = 0usize;
    for line in normalized.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blanks += 1;
            if blanks <= 1 {
                out.push("");
            }
        } else {
            blanks = 0;
            out.push(line);
        }
    }
    out.join("\n").trim_matches('\n').trim().to_string()
}

fn is_block(node: &CleanNode) -> bool {
    matches!(
        node,
        CleanNode::Element { tag, .. } if matches!(
            *tag,
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" | "ul" | "ol" | "li" | "pre"
                | "blockquote" | "table" | "thead" | "tbody" | "tfoot" | "tr" | "hr" | "dl"
                | "dt" | "dd" | "details" | "summary"
        )
    )
}

fn render_blocks(nodes: &[CleanNode], out: &mut String) {
    let mut inline_run: Vec<&CleanNode> = Vec::new();
    for node in nodes {
        if is_block(node) {
            flush_inline_run(&mut inline_run, out);
            render_block(node, out);
        } else {
            inline_run.push(node);
        }
    }
    flush_inline_run(&mut inline_run, out);
}

fn flush_inline_run(run: &mut Vec<&CleanNode>, out: &mut String) {
    if run.is_empty() {
        return;
    }
    let text = inline_of(run.drain(..));
    if !text.trim().is_empty() {
        out.push_str(text.trim());
        out.push_str("\n\n");
    }
}

fn render_block(node: &CleanNode, out: &mut String) {
    let CleanNode::Element { tag, children, .. } = node else {
        return;
    };
    match *tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag[1..].parse::<usize>().unwrap_or(1);
            let text = inline_children(children);
            if !text.trim().is_empty() {
                out.push_str(&"#".repeat(level));
                out.push(' ');
                out.push_str(text.trim());
                out.push_str("\n\n");
            }
        }
        "p" | "summary" => {
            let text = inline_children(children);
            if !text.trim().is_empty() {
                out.push_str(text.trim());
                out.push_str("\n\n");
            }
        }
        "ul" => {
            render_list(children, out, None);
            out.push('\n');
        }
        "ol" => {
            render_list(children, out, Some(1));
            out.push('\n');
        }
        // A stray li outside a list renders as a single bullet
        "li" => {
            let text = inline_children(children);
            if !text.trim().is_empty() {
                out.push_str("- ");
                out.push_str(text.trim());
                out.push_str("\n\n");
            }
        }
        "pre" => {
            let code = raw_text(children);
            out.push_str("```\n");
            out.push_str(code.trim_matches('\n'));
            out.push_str("\n```\n\n");
        }
        "blockquote" => {
            let mut inner = String::new();
            render_blocks(children, &mut inner);
            for line in tighten(&inner).lines() {
                if line.is_empty() {
                    out.push_str(">\n");
                } else {
                    out.push_str("> ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        "table" => render_table(children, out),
        "hr" => out.push_str("---\n\n"),
        "dl" => {
            render_blocks(children, out);
        }
        "dt" => {
            let text = inline_children(children);
            if !text.trim().is_empty() {
                out.push_str("**");
                out.push_str(text.trim());
                out.push_str("**\n\n");
            }
        }
        "dd" => {
            let text = inline_children(children);
            if !text.trim().is_empty() {
                out.push_str(text.trim());
                out.push_str("\n\n");
            }
        }
        "details" => render_blocks(children, out),
        // Row groups reaching block level outside a table
        "thead" | "tbody" | "tfoot" | "tr" => render_table_rows(std::slice::from_ref(node), out, &mut false),
        _ => {}
    }
}

fn render_list(items: &[CleanNode], out: &mut String, numbering: Option<usize>) {
    let mut index = numbering.unwrap_or(0);
    for item in items {
        let CleanNode::Element { tag, children, .. } = item else {
            continue;
        };
        if *tag != "li" {
            continue;
        }
        let marker = match numbering {
            Some(_) => {
                let m = format!("{index}. ");
                index += 1;
                m
            }
            None => "- ".to_string(),
        };

        // Inline content first, nested lists and blocks indented below
        let (inline_nodes, block_nodes): (Vec<&CleanNode>, Vec<&CleanNode>) =
            children.iter().partition(|c| !is_block(c));
        let text = inline_of(inline_nodes.into_iter());
        out.push_str(&marker);
        out.push_str(text.trim());
        out.push('\n');

        if !block_nodes.is_empty() {
            let mut nested = String::new();
            for block in block_nodes {
                render_block(block, &mut nested);
            }
            for line in tighten(&nested).lines() {
                if !line.is_empty() {
                    out.push_str("  ");
                    out.push_str(line);
                }
                out.push('\n');
            }
        }
    }
}

fn render_table(children: &[CleanNode], out: &mut String) {
    let mut separator_emitted = false;
    render_table_rows(children, out, &mut separator_emitted);
    out.push('\n');
}

fn render_table_rows(nodes: &[CleanNode], out: &mut String, separator_emitted: &mut bool) {
    for node in nodes {
        let CleanNode::Element { tag, children, .. } = node else {
            continue;
        };
        match *tag {
            "thead" | "tbody" | "tfoot" => render_table_rows(children, out, separator_emitted),
            "tr" => {
                let cells: Vec<(bool, String)> = children
                    .iter()
                    .filter_map(|c| match c {
                        CleanNode::Element { tag, children, .. }
                            if matches!(*tag, "th" | "td") =>
                        {
                            Some((*tag == "th", inline_children(children).trim().to_string()))
                        }
                        _ => None,
                    })
                    .collect();
                if cells.is_empty() {
                    continue;
                }
                out.push('|');
                for (_, text) in &cells {
                    out.push(' ');
                    out.push_str(text);
                    out.push_str(" |");
                }
                out.push('\n');
                let header_row = cells.iter().all(|(is_th, _)| *is_th);
                if header_row && !*separator_emitted {
                    out.push('|');
                    for _ in &cells {
                        out.push_str(" --- |");
                    }
                    out.push('\n');
                    *separator_emitted = true;
                }
            }
            _ => {}
        }
    }
}

fn inline_children(children: &[CleanNode]) -> String {
    inline_of(children.iter())
}

/// Render inline content, collapsing whitespace runs the way HTML does
fn inline_of<'a>(nodes: impl Iterator<Item = &'a CleanNode>) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            CleanNode::Text(text) => out.push_str(&collapse_whitespace(text)),
            CleanNode::Element { tag, href, children } => match *tag {
                "em" | "i" => wrap_inline(&mut out, children, "*"),
                "strong" | "b" => wrap_inline(&mut out, children, "**"),
                "del" => wrap_inline(&mut out, children, "~~"),
                "code" => {
                    let code = raw_text(children);
                    let code = code.trim();
                    if !code.is_empty() {
                        out.push('`');
                        out.push_str(code);
                        out.push('`');
                    }
                }
                "a" => {
                    let text = inline_children(children);
                    let text = text.trim();
                    match href {
                        Some(href) if !text.is_empty() => {
                            out.push_str(&format!("[{text}]({href})"));
                        }
                        _ => out.push_str(text),
                    }
                }
                "br" => out.push('\n'),
                "sup" | "sub" | "abbr" | "mark" | "ins" => {
                    out.push_str(&inline_children(children))
                }
                // Block content nested in an inline run: render its text
                _ => out.push_str(&inline_children(children)),
            },
        }
    }
    out
}

fn wrap_inline(out: &mut String, children: &[CleanNode], marker: &str) {
    let text = inline_children(children);
    let text = text.trim();
    if !text.is_empty() {
        out.push_str(marker);
        out.push_str(text);
        out.push_str(marker);
    }
}

/// Text content with whitespace preserved (for code blocks)
fn raw_text(nodes: &[CleanNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            CleanNode::Text(text) => out.push_str(text),
            CleanNode::Element { children, .. } => out.push_str(&raw_text(children)),
        }
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::sanitize::sanitize;
    use scraper::Html;
    use url::Url;

    fn md(html: &str) -> String {
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        to_markdown(&sanitize(doc.tree.root(), &base))
    }

    #[test]
    fn test_headings_are_atx() {
        let out = md("<h1>Title</h1><h2>Sub</h2><h3>Deep</h3>");
        assert!(out.contains("# Title"));
        assert!(out.contains("## Sub"));
        assert!(out.contains("### Deep"));
    }

    #[test]
    fn test_paragraphs_and_emphasis() {
        let out = md("<p>Plain <em>soft</em> and <strong>hard</strong>.</p>");
        assert_eq!(out, "Plain *soft* and **hard**.");
    }

    #[test]
    fn test_unordered_list_uses_dashes() {
        let out = md("<ul><li>one</li><li>two</li></ul>");
        assert!(out.contains("- one"));
        assert!(out.contains("- two"));
    }

    #[test]
    fn test_ordered_list_numbers() {
        let out = md("<ol><li>first</li><li>second</li></ol>");
        assert!(out.contains("1. first"));
        assert!(out.contains("2. second"));
    }

    #[test]
    fn test_fenced_code_preserves_whitespace() {
        let out = md("<pre><code>fn main() {\n    run();\n}</code></pre>");
        assert!(out.contains("```\nfn main() {\n    run();\n}\n```"));
    }

    #[test]
    fn test_inline_code() {
        let out = md("<p>call <code>init()</code> first</p>");
        assert_eq!(out, "call `init()` first");
    }

    #[test]
    fn test_blockquote_prefix() {
        let out = md("<blockquote><p>wise words</p></blockquote>");
        assert!(out.contains("> wise words"));
    }

    #[test]
    fn test_links_render_as_markdown_links() {
        let out = md("<p><a href=\"/about\">About us</a></p>");
        assert_eq!(out, "[About us](https://example.com/about)");
    }

    #[test]
    fn test_table_cells() {
        let out = md(
            "<table><thead><tr><th>Name</th><th>Age</th></tr></thead>\
             <tbody><tr><td>Ada</td><td>36</td></tr></tbody></table>",
        );
        assert!(out.contains("| Name | Age |"));
        assert!(out.contains("| --- | --- |"));
        assert!(out.contains("| Ada | 36 |"));
    }

    #[test]
    fn test_hr_and_br() {
        let out = md("<p>a<br>b</p><hr><p>c</p>");
        assert!(out.contains("a\nb"));
        assert!(out.contains("---"));
    }

    #[test]
    fn test_tighten_is_idempotent() {
        let messy = "a  \r\nb\n\n\n\n\nc   \n\n";
        let once = tighten(messy);
        let twice = tighten(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "a\nb\n\nc");
    }

    #[test]
    fn test_markdown_output_is_tighten_stable() {
        let out = md("<h1>T</h1><p>one</p><p>two</p><ul><li>x</li></ul>");
        assert_eq!(out, tighten(&out));
    }

    #[test]
    fn test_cap_length() {
        let long = "x".repeat(100);
        let capped = cap_length(long.clone(), 10);
        assert!(capped.starts_with("xxxxxxxxxx"));
        assert!(capped.ends_with("[…truncated]"));
        assert_eq!(cap_length(long.clone(), 0), long);
        assert_eq!(cap_length(long.clone(), 200), long);
    }

    #[test]
    fn test_cap_length_respects_char_boundaries() {
        let s = "é".repeat(10);
        let capped = cap_length(s, 3);
        assert!(capped.ends_with("[…truncated]"));
    }

    #[test]
    fn test_whitespace_collapse_in_inline_text() {
        let out = md("<p>a\n   b\t\tc</p>");
        assert_eq!(out, "a b c");
    }
}
