//! Inline marker grammar.
//!
//! | token                                  | block            |
//! |----------------------------------------|------------------|
//! | `[VIEW_CHART:SYMBOL:RANGE]`            | chart            |
//! | `[VIEW_CHART:chart-SYMBOL]` (legacy)   | chart, range 1D  |
//! | `[VIEW_ARTICLE:id]`                    | article card     |
//! | `[IMAGE_CARD:id]`                      | image card       |
//! | `[EVENT_CARD:id]`                      | event card       |
//! | `[HR]`                                 | horizontal rule  |

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::block::ChartRef;
use crate::card::CardKind;

const LEGACY_CHART_PREFIX: &str = "chart-";

/// Marker keywords as they appear right after the opening bracket.
const KEYWORDS: [&str; 5] = [
    "VIEW_CHART:",
    "VIEW_ARTICLE:",
    "IMAGE_CARD:",
    "EVENT_CARD:",
    "HR]",
];

fn marker_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(
            r"\[(?:VIEW_CHART:(?P<chart>[^\[\]\s]+)|VIEW_ARTICLE:(?P<article>[^\[\]\s]+)|IMAGE_CARD:(?P<image>[^\[\]\s]+)|EVENT_CARD:(?P<event>[^\[\]\s]+)|(?P<hr>HR))\]",
        )
        .expect("marker regex must compile")
    })
}

/// A parsed inline marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Chart(ChartRef),
    Card { kind: CardKind, id: String },
    HorizontalRule,
}

/// A complete marker located in a buffer, with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMatch {
    pub start: usize,
    pub end: usize,
    pub marker: Marker,
}

/// Find the earliest complete, well-formed marker in `text`.
pub fn find_marker(text: &str) -> Option<MarkerMatch> {
    marker_regex().captures_iter(text).find_map(|caps| {
        let span = caps.get(0)?;
        let marker = parse_captures(&caps)?;
        Some(MarkerMatch {
            start: span.start(),
            end: span.end(),
            marker,
        })
    })
}

/// Remove every marker token from `text`.
pub fn strip_markers(text: &str) -> Cow<'_, str> {
    marker_regex().replace_all(text, "")
}

/// Parse the body of a `VIEW_CHART` marker.
///
/// `SYMBOL:RANGE` is the current form; `chart-SYMBOL` and a bare `SYMBOL`
/// default the range to `1D`.
pub fn parse_chart_body(body: &str) -> Option<ChartRef> {
    let (symbol, range) = match body.split_once(':') {
        Some((symbol, range)) => (symbol, range),
        None => (body, ChartRef::DEFAULT_RANGE),
    };
    let symbol = symbol.strip_prefix(LEGACY_CHART_PREFIX).unwrap_or(symbol);
    if symbol.is_empty() || range.is_empty() {
        return None;
    }
    Some(ChartRef::new(symbol, range))
}

/// Whether `text` begins with something that may become a marker once more
/// bytes arrive.
///
/// This is a withhold-on-ambiguity heuristic: it can hold back ordinary text
/// that starts with `[V` and the like until a paragraph break or the final
/// flush releases it.
pub fn looks_like_marker_prefix(text: &str) -> bool {
    let Some(tail) = text.trim_start().strip_prefix('[') else {
        return false;
    };
    let head_len = tail
        .find(|c: char| !(c.is_ascii_uppercase() || c == '_' || c == ':' || c == ']'))
        .unwrap_or(tail.len());
    let head = &tail[..head_len];
    if head.is_empty() {
        return tail.is_empty();
    }
    KEYWORDS
        .iter()
        .any(|keyword| keyword.starts_with(head) || head.starts_with(keyword))
}

fn parse_captures(caps: &Captures<'_>) -> Option<Marker> {
    if let Some(body) = caps.name("chart") {
        return parse_chart_body(body.as_str()).map(Marker::Chart);
    }
    if caps.name("hr").is_some() {
        return Some(Marker::HorizontalRule);
    }
    [
        ("article", CardKind::Article),
        ("image", CardKind::Image),
        ("event", CardKind::Event),
    ]
    .into_iter()
    .find_map(|(group, kind)| {
        caps.name(group).map(|id| Marker::Card {
            kind,
            id: id.as_str().to_owned(),
        })
    })
}
