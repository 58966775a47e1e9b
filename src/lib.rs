//! Streaming block extraction for incrementally delivered assistant answers.
//!
//! Invariant: a block is only emitted once it is lexically whole. Inline
//! markers, emphasis runs and links split across deltas stay in the pending
//! buffer until the rest arrives or the turn ends.
//!
//! # Public API Overview
//! - Apply server events to a per-turn [`SessionAccumulator`] and read the
//!   resulting [`StreamingState`].
//! - Run the pure [`extract`] engine directly over a buffer and known cards.
//! - Locate or strip inline markers with [`find_marker`] and [`strip_markers`].
//! - Compute safe typewriter cut points with [`safe_reveal_len`].

pub mod block;
pub mod card;
pub mod extract;
pub mod marker;
pub mod protocol;
pub mod reveal;
pub mod session;

pub use crate::block::{BlockBody, BlockKind, ChartRef, ContentBlock};
pub use crate::card::{find_card, merge_cards, CardKind, DataCard};
pub use crate::extract::{extract, extract_with, ExtractMode, Extraction};
pub use crate::marker::{find_marker, looks_like_marker_prefix, strip_markers, Marker, MarkerMatch};
pub use crate::protocol::{ClientMessage, HistoryEntry, Role, ServerEvent};
pub use crate::reveal::{reveal, safe_reveal_len};
pub use crate::session::{
    Applied, Message, SessionAccumulator, StreamingState, ThinkingStep, TurnMetadata,
};
