//! Safe truncation points for progressive "typewriter" reveal of text blocks.

use unicode_segmentation::UnicodeSegmentation;

use crate::extract::unmatched_emphasis_start;

/// Byte length of the longest prefix of `content` that shows at most
/// `target_graphemes` graphemes without splitting an emphasis marker.
///
/// A cut inside a `*` run moves forward past the run when that run closes an
/// earlier one, and back before it otherwise. An opening run is only shown
/// once its closing run of the same length is visible too.
pub fn safe_reveal_len(content: &str, target_graphemes: usize) -> usize {
    let mut end = content
        .grapheme_indices(true)
        .nth(target_graphemes)
        .map_or(content.len(), |(idx, _)| idx);
    if end >= content.len() {
        return content.len();
    }

    let bytes = content.as_bytes();
    if end > 0 && bytes[end - 1] == b'*' && bytes[end] == b'*' {
        let run_start = content[..end].trim_end_matches('*').len();
        let run_end = end + (content[end..].len() - content[end..].trim_start_matches('*').len());
        end = if unmatched_emphasis_start(&content[..run_end]).is_none() {
            run_end
        } else {
            run_start
        };
    }

    match unmatched_emphasis_start(&content[..end]) {
        Some(open) => open,
        None => end,
    }
}

/// Visible prefix for a reveal animation frame.
pub fn reveal(content: &str, target_graphemes: usize) -> &str {
    &content[..safe_reveal_len(content, target_graphemes)]
}
