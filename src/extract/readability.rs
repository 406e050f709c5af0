//! Main-content detection
//!
//! A readability-style heuristic: text-bearing leaf blocks are scored by
//! length and punctuation weight, scores propagate to their parent and
//! grandparent, and the best-scoring subtree wins after a link-density
//! penalty and class/id hints. Callers retry once with relaxed thresholds
//! before falling back to the whole body.

use std::collections::HashMap;

use ego_tree::NodeId;
use scraper::{ElementRef, Html};

/// Scoring thresholds
#[derive(Debug, Clone, Copy)]
pub struct ReadabilityConfig {
    /// Shortest paragraph that contributes to a candidate's score
    pub min_paragraph_len: usize,
    /// Lowest adjusted score that still counts as main content
    pub min_score: f32,
}

/// First-attempt thresholds
pub const DEFAULT: ReadabilityConfig = ReadabilityConfig {
    min_paragraph_len: 25,
    min_score: 20.0,
};

/// Retry thresholds: lower char floor, wider candidate net
pub const RELAXED: ReadabilityConfig = ReadabilityConfig {
    min_paragraph_len: 10,
    min_score: 5.0,
};

/// Tags whose text contributes score to their ancestors
const PARAGRAPH_TAGS: &[&str] = &["p", "td", "pre", "blockquote", "li"];

const POSITIVE_HINTS: &[&str] = &["article", "content", "main", "post", "body", "entry"];
const NEGATIVE_HINTS: &[&str] = &["comment", "sidebar", "ad-", "promo", "footer", "menu", "nav"];

/// Find the subtree most likely to hold the article body
pub fn find_main_content(doc: &Html, cfg: &ReadabilityConfig) -> Option<NodeId> {
    let mut scores: HashMap<NodeId, f32> = HashMap::new();

    for node in doc.tree.nodes() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if !PARAGRAPH_TAGS.contains(&el.value().name()) {
            continue;
        }
        let text: String = el.text().collect();
        let text = text.trim();
        if text.len() < cfg.min_paragraph_len {
            continue;
        }

        // 1 point for existing, 1 per comma, up to 3 for length
        let score =
            1.0 + text.matches(',').count() as f32 + (text.len() as f32 / 100.0).min(3.0);

        if let Some(parent) = node.parent() {
            *scores.entry(parent.id()).or_default() += score;
            if let Some(grandparent) = parent.parent() {
                *scores.entry(grandparent.id()).or_default() += score / 2.0;
            }
        }
    }

    let mut best: Option<(NodeId, f32)> = None;
    for (id, raw) in scores {
        let Some(node) = doc.tree.get(id) else {
            continue;
        };
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        let adjusted = (raw + hint_weight(&el)) * (1.0 - link_density(&el));
        if adjusted >= cfg.min_score && best.map_or(true, |(_, s)| adjusted > s) {
            best = Some((id, adjusted));
        }
    }
    best.map(|(id, _)| id)
}

/// Fraction of a subtree's text that sits inside anchors
fn link_density(el: &ElementRef) -> f32 {
    let total: usize = el.text().map(str::len).sum();
    if total == 0 {
        return 0.0;
    }
    let mut linked = 0usize;
    for descendant in el.descendants() {
        if let Some(child) = ElementRef::wrap(descendant) {
            if child.value().name() == "a" {
                linked += child.text().map(str::len).sum::<usize>();
            }
        }
    }
    (linked as f32 / total as f32).min(1.0)
}

/// Class and id hints, readability-style
fn hint_weight(el: &ElementRef) -> f32 {
    let mut haystack = String::new();
    if let Some(class) = el.value().attr("class") {
        haystack.push_str(&class.to_ascii_lowercase());
    }
    if let Some(id) = el.value().attr("id") {
        haystack.push(' ');
        haystack.push_str(&id.to_ascii_lowercase());
    }
    if haystack.is_empty() {
        return 0.0;
    }
    let mut weight = 0.0;
    if POSITIVE_HINTS.iter().any(|h| haystack.contains(h)) {
        weight += 25.0;
    }
    if NEGATIVE_HINTS.iter().any(|h| haystack.contains(h)) {
        weight -= 25.0;
    }
    weight
}
