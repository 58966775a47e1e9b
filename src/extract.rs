//! Incremental block extraction.
//!
//! [`extract`] is re-run over the whole unconsumed buffer after every content
//! delta. It emits only blocks that are lexically whole and hands back the
//! rest, so a chunk boundary can never surface half a marker or half an
//! emphasis run.

use tracing::{debug, warn};

use crate::block::BlockBody;
use crate::card::{find_card, CardKind, DataCard};
use crate::marker::{find_marker, looks_like_marker_prefix, Marker};

/// Upper bound on loop passes for one call.
pub const MAX_PASSES: usize = 100;

/// Trailing text at or under this many chars is held back until more arrives.
pub const SHORT_TAIL_CHARS: usize = 20;

const PARAGRAPH_BREAK: &str = "\n\n";

/// Whether trailing text may still be withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// Mid-stream: withhold anything that may still be incomplete.
    #[default]
    Streaming,
    /// End of turn: whatever is left becomes a final text block.
    Final,
}

/// Blocks that are safe to emit now plus the unconsumed buffer tail.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    pub blocks: Vec<BlockBody>,
    pub remaining: String,
}

/// Extract every block that can be safely emitted from `buffer`.
pub fn extract(buffer: &str, cards: &[DataCard]) -> Extraction {
    extract_with(buffer, cards, ExtractMode::Streaming)
}

/// Extract blocks, then in [`ExtractMode::Final`] release the remainder as text.
pub fn extract_with(buffer: &str, cards: &[DataCard], mode: ExtractMode) -> Extraction {
    let mut blocks = Vec::new();
    let mut rest = buffer;
    let mut passes = 0;

    while !rest.is_empty() {
        if passes == MAX_PASSES {
            warn!(
                passes,
                remaining = rest.len(),
                "block extraction hit its pass limit; deferring the rest of the buffer"
            );
            break;
        }
        passes += 1;

        match next_step(rest, cards, mode) {
            Step::Emit { body, consumed } => {
                blocks.extend(body);
                rest = &rest[consumed..];
            }
            Step::EmitMarker { body, consumed } => {
                blocks.push(body);
                rest = rest[consumed..].trim_start();
            }
            Step::EmitThenHold { body, consumed } => {
                blocks.extend(body);
                rest = &rest[consumed..];
                break;
            }
            Step::Hold => break,
        }
    }

    if mode == ExtractMode::Final && !rest.is_empty() {
        if let Some(found) = find_marker(rest) {
            if matches!(found.marker, Marker::Card { .. }) {
                warn!(
                    marker = &rest[found.start..found.end],
                    "card never arrived for marker; flushing it as literal text"
                );
            }
        }
        blocks.extend(text_block(rest));
        rest = "";
    }

    Extraction {
        blocks,
        remaining: rest.to_owned(),
    }
}

enum Step {
    Emit {
        body: Option<BlockBody>,
        consumed: usize,
    },
    EmitMarker {
        body: BlockBody,
        consumed: usize,
    },
    EmitThenHold {
        body: Option<BlockBody>,
        consumed: usize,
    },
    Hold,
}

fn next_step(rest: &str, cards: &[DataCard], mode: ExtractMode) -> Step {
    match find_marker(rest) {
        Some(found) if found.start > 0 => text_before_marker(&rest[..found.start], mode),
        Some(found) => match resolve_marker(found.marker, cards) {
            Some(body) => Step::EmitMarker {
                body,
                consumed: found.end,
            },
            None => Step::Hold,
        },
        None => text_step(rest),
    }
}

fn resolve_marker(marker: Marker, cards: &[DataCard]) -> Option<BlockBody> {
    match marker {
        Marker::HorizontalRule => Some(BlockBody::HorizontalRule),
        Marker::Chart(data) => Some(BlockBody::Chart { data }),
        Marker::Card { kind, id } => {
            let Some(card) = find_card(cards, kind, &id) else {
                debug!(kind = kind.as_str(), id = %id, "marker waiting for its card");
                return None;
            };
            let data = card.data.clone();
            Some(match kind {
                CardKind::Image => BlockBody::Image { data },
                CardKind::Event => BlockBody::Event { data },
                _ => BlockBody::Article { data },
            })
        }
    }
}

/// Cut the text that precedes a complete marker.
///
/// Mid-stream, an opener left dangling in front of the marker holds the
/// opener, the marker and everything after it until the closer arrives.
fn text_before_marker(text: &str, mode: ExtractMode) -> Step {
    if mode == ExtractMode::Final {
        return Step::Emit {
            body: text_block(text),
            consumed: text.len(),
        };
    }
    if let Some(step) = paragraph_step(text) {
        return step;
    }

    match self_complete_cut(text) {
        None => Step::Emit {
            body: text_block(text),
            consumed: text.len(),
        },
        Some(0) => Step::Hold,
        Some(cut) => Step::EmitThenHold {
            body: text_block(&text[..cut]),
            consumed: cut,
        },
    }
}

/// Cut plain text when no marker remains in the buffer.
fn text_step(rest: &str) -> Step {
    if let Some(step) = paragraph_step(rest) {
        return step;
    }

    if let Some(cut) = self_complete_cut(rest) {
        let head = &rest[..cut];
        if is_short(head) {
            return Step::Hold;
        }
        return Step::EmitThenHold {
            body: text_block(head),
            consumed: cut,
        };
    }

    if is_short(rest) || looks_like_marker_prefix(rest) {
        return Step::Hold;
    }

    Step::Emit {
        body: text_block(rest),
        consumed: rest.len(),
    }
}

fn paragraph_step(text: &str) -> Option<Step> {
    text.find(PARAGRAPH_BREAK).map(|pos| {
        let consumed = pos + PARAGRAPH_BREAK.len();
        Step::Emit {
            body: text_block(&text[..consumed]),
            consumed,
        }
    })
}

/// Earliest offset whose head contains no dangling opener of its own.
fn self_complete_cut(text: &str) -> Option<usize> {
    let mut cut = incomplete_markdown_start(text)?;
    while let Some(earlier) = incomplete_markdown_start(&text[..cut]) {
        cut = earlier;
    }
    Some(cut)
}

fn text_block(text: &str) -> Option<BlockBody> {
    if text.trim().is_empty() {
        None
    } else {
        Some(BlockBody::text(text))
    }
}

fn is_short(text: &str) -> bool {
    text.chars().count() <= SHORT_TAIL_CHARS
}

/// Byte offset of the earliest opening token in `text` that is still waiting
/// for its closer: an unmatched `[`, a `](` link without `)`, or an emphasis
/// run of `*` with no closing run of the same length.
pub fn incomplete_markdown_start(text: &str) -> Option<usize> {
    let bracket = text
        .rfind('[')
        .filter(|&open| !text[open..].contains(']'));
    let link = text
        .rfind("](")
        .filter(|&pos| !text[pos..].contains(')'))
        .map(|pos| text[..pos].rfind('[').unwrap_or(pos));
    let emphasis = unmatched_emphasis_start(text);

    [bracket, link, emphasis].into_iter().flatten().min()
}

/// Start of the first `*` run that no later run of the same length closes.
///
/// A run with whitespace on both sides (a list bullet or a multiplication
/// sign) is literal and skipped. A run at the very end of the text is always
/// treated as emphasis since its right side is not known yet.
pub fn unmatched_emphasis_start(text: &str) -> Option<usize> {
    let mut open: Vec<(usize, usize)> = Vec::new();

    for (start, len) in asterisk_runs(text) {
        let before = text[..start].chars().next_back();
        let after = text[start + len..].chars().next();
        let spaced_before = before.map_or(true, char::is_whitespace);
        let spaced_after = after.is_some_and(char::is_whitespace);
        if spaced_before && spaced_after {
            continue;
        }

        match open.last() {
            Some(&(_, top_len)) if top_len == len => {
                open.pop();
            }
            _ => open.push((start, len)),
        }
    }

    open.first().map(|&(start, _)| start)
}

fn asterisk_runs(text: &str) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'*' {
            let start = idx;
            while idx < bytes.len() && bytes[idx] == b'*' {
                idx += 1;
            }
            runs.push((start, idx - start));
        } else {
            idx += 1;
        }
    }
    runs
}
