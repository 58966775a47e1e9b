//! Per-turn state accumulated from server events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::block::{BlockBody, ChartRef, ContentBlock};
use crate::card::{merge_cards, DataCard};
use crate::extract::{extract_with, ExtractMode};
use crate::protocol::{HistoryEntry, Role, ServerEvent};

/// Progress annotation streamed before or alongside content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingStep {
    pub phase: String,
    pub content: String,
    pub timestamp: String,
}

/// Out-of-band identifiers and payloads attached to a turn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMetadata {
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
    pub event_data: Option<Value>,
}

/// Externally observable state of the turn being streamed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingState {
    pub is_streaming: bool,
    pub blocks: Vec<ContentBlock>,
    pub thinking: Vec<ThinkingStep>,
    pub data_cards: Vec<DataCard>,
    pub metadata: TurnMetadata,
    pub error: Option<String>,
}

/// A finalized turn, handed to conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub content_blocks: Vec<ContentBlock>,
    pub data_cards: Vec<DataCard>,
    pub thinking_steps: Vec<ThinkingStep>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// The user side of a turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: text.into(),
            content_blocks: Vec::new(),
            data_cards: Vec::new(),
            thinking_steps: Vec::new(),
            timestamp: now_rfc3339(),
            error: None,
        }
    }

    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The event carried nothing for this turn, or the turn already ended.
    Ignored,
    /// State changed; `new_blocks` were appended.
    Updated { new_blocks: usize },
    /// The turn ended with `done` or `error`.
    Finished(Box<Message>),
}

/// Owns the extraction buffer, block-id counter and known cards of one turn.
///
/// Events must be applied one at a time in arrival order. Once `done` or
/// `error` is applied the accumulator is frozen and ignores further events.
#[derive(Debug, Clone)]
pub struct SessionAccumulator {
    turn_id: String,
    state: StreamingState,
    raw_content: String,
    buffer: String,
    next_block: u64,
}

impl Default for SessionAccumulator {
    fn default() -> Self {
        Self::begin_turn()
    }
}

impl SessionAccumulator {
    pub fn begin_turn() -> Self {
        Self::with_turn_id(Uuid::new_v4().to_string())
    }

    pub fn with_turn_id(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            state: StreamingState {
                is_streaming: true,
                ..StreamingState::default()
            },
            raw_content: String::new(),
            buffer: String::new(),
            next_block: 0,
        }
    }

    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    pub fn state(&self) -> &StreamingState {
        &self.state
    }

    /// Concatenation of every `content` delta received so far.
    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    /// Text received but not yet emitted as blocks.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn is_finished(&self) -> bool {
        !self.state.is_streaming
    }

    pub fn apply(&mut self, event: ServerEvent) -> Applied {
        if self.is_finished() {
            debug!(turn = %self.turn_id, "ignoring event after turn ended");
            return Applied::Ignored;
        }

        match event {
            ServerEvent::Connected => Applied::Ignored,
            ServerEvent::Metadata {
                data_cards,
                event_data,
                conversation_id,
            } => {
                merge_cards(&mut self.state.data_cards, data_cards);
                if event_data.is_some() {
                    self.state.metadata.event_data = event_data;
                }
                if conversation_id.is_some() {
                    self.state.metadata.conversation_id = conversation_id;
                }
                Applied::Updated { new_blocks: 0 }
            }
            ServerEvent::Thinking { phase, content } => {
                self.state.thinking.push(ThinkingStep {
                    phase,
                    content,
                    timestamp: now_rfc3339(),
                });
                Applied::Updated { new_blocks: 0 }
            }
            ServerEvent::Content { content } => {
                self.raw_content.push_str(&content);
                self.buffer.push_str(&content);
                let new_blocks = self.run_extraction(ExtractMode::Streaming);
                Applied::Updated { new_blocks }
            }
            ServerEvent::ChartBlock { symbol, time_range } => {
                self.push_block(BlockBody::Chart {
                    data: ChartRef::new(symbol, time_range),
                });
                Applied::Updated { new_blocks: 1 }
            }
            ServerEvent::Done {
                conversation_id,
                message_id,
            } => {
                self.run_extraction(ExtractMode::Final);
                if conversation_id.is_some() {
                    self.state.metadata.conversation_id = conversation_id;
                }
                self.state.metadata.message_id = message_id;
                self.state.is_streaming = false;
                Applied::Finished(Box::new(self.to_message()))
            }
            ServerEvent::Error { error } => {
                warn!(turn = %self.turn_id, %error, "turn failed");
                self.state.error = Some(error);
                self.state.is_streaming = false;
                Applied::Finished(Box::new(self.to_message()))
            }
        }
    }

    fn run_extraction(&mut self, mode: ExtractMode) -> usize {
        let extraction = extract_with(&self.buffer, &self.state.data_cards, mode);
        let count = extraction.blocks.len();
        for body in extraction.blocks {
            self.push_block(body);
        }
        self.buffer = extraction.remaining;
        count
    }

    fn push_block(&mut self, body: BlockBody) {
        let id = format!("{}-{}", self.turn_id, self.next_block);
        self.next_block += 1;
        self.state.blocks.push(ContentBlock::new(id, body));
    }

    fn to_message(&self) -> Message {
        Message {
            id: self
                .state
                .metadata
                .message_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            role: Role::Assistant,
            content: self.raw_content.clone(),
            content_blocks: self.state.blocks.clone(),
            data_cards: self.state.data_cards.clone(),
            thinking_steps: self.state.thinking.clone(),
            timestamp: now_rfc3339(),
            error: self.state.error.clone(),
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|error| {
            warn!(%error, "failed to format timestamp");
            String::new()
        })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{Applied, SessionAccumulator};
    use crate::block::{BlockBody, BlockKind, ChartRef};
    use crate::card::{CardKind, DataCard};
    use crate::protocol::{Role, ServerEvent};

    fn done() -> ServerEvent {
        ServerEvent::Done {
            conversation_id: Some("conv".to_owned()),
            message_id: Some("msg-1".to_owned()),
        }
    }

    fn finished(applied: Applied) -> super::Message {
        match applied {
            Applied::Finished(message) => *message,
            other => panic!("expected finished turn, got {other:?}"),
        }
    }

    #[test]
    fn block_ids_increase_from_zero_within_turn() {
        let mut acc = SessionAccumulator::with_turn_id("t");
        acc.apply(ServerEvent::content("[HR][HR]"));
        acc.apply(ServerEvent::ChartBlock {
            symbol: "QQQ".to_owned(),
            time_range: "1M".to_owned(),
        });

        let ids: Vec<&str> = acc.state().blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["t-0", "t-1", "t-2"]);
        assert_eq!(
            acc.state().blocks[2].body,
            BlockBody::Chart {
                data: ChartRef::new("QQQ", "1M"),
            }
        );
    }

    #[test]
    fn content_deltas_accumulate_and_extract() {
        let mut acc = SessionAccumulator::with_turn_id("t");
        assert_eq!(
            acc.apply(ServerEvent::content("Intro text [VIEW_CHA")),
            Applied::Updated { new_blocks: 0 }
        );
        assert_eq!(
            acc.apply(ServerEvent::content("RT:AAPL:1D] more text")),
            Applied::Updated { new_blocks: 2 }
        );
        assert_eq!(acc.pending(), "more text");
        assert_eq!(acc.raw_content(), "Intro text [VIEW_CHART:AAPL:1D] more text");
    }

    #[test]
    fn metadata_unblocks_card_marker_on_next_content() {
        let mut acc = SessionAccumulator::with_turn_id("t");
        acc.apply(ServerEvent::content("[EVENT_CARD:42]"));
        assert!(acc.state().blocks.is_empty());

        acc.apply(ServerEvent::Metadata {
            data_cards: vec![DataCard::new(CardKind::Event, "42", json!({"title": "CPI"}))],
            event_data: None,
            conversation_id: None,
        });
        assert!(acc.state().blocks.is_empty(), "metadata must not re-scan");

        assert_eq!(
            acc.apply(ServerEvent::content("")),
            Applied::Updated { new_blocks: 1 }
        );
        assert_eq!(acc.state().blocks[0].kind(), BlockKind::Event);
    }

    #[test]
    fn thinking_steps_keep_arrival_order() {
        let mut acc = SessionAccumulator::with_turn_id("t");
        for phase in ["search", "analyze"] {
            acc.apply(ServerEvent::Thinking {
                phase: phase.to_owned(),
                content: format!("{phase}..."),
            });
        }
        let phases: Vec<&str> = acc.state().thinking.iter().map(|s| s.phase.as_str()).collect();
        assert_eq!(phases, vec!["search", "analyze"]);
        assert!(acc.state().blocks.is_empty());
    }

    #[test]
    fn done_flushes_remainder_and_builds_message() {
        let mut acc = SessionAccumulator::with_turn_id("t");
        acc.apply(ServerEvent::content("Revenue grew.\n\nMargins held *steady"));
        let message = finished(acc.apply(done()));

        assert_eq!(message.id, "msg-1");
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "Revenue grew.\n\nMargins held *steady");
        let texts: Vec<&str> = message
            .content_blocks
            .iter()
            .filter_map(|b| b.content())
            .collect();
        assert_eq!(texts, vec!["Revenue grew.\n\n", "Margins held *steady"]);
        assert!(acc.is_finished());
        assert!(acc.pending().is_empty());
        assert_eq!(acc.state().metadata.conversation_id.as_deref(), Some("conv"));
    }

    #[test]
    fn error_keeps_blocks_and_stops_extraction() {
        let mut acc = SessionAccumulator::with_turn_id("t");
        acc.apply(ServerEvent::content("[HR] partial"));
        let message = finished(acc.apply(ServerEvent::Error {
            error: "upstream timeout".to_owned(),
        }));

        assert_eq!(message.error.as_deref(), Some("upstream timeout"));
        assert_eq!(message.content_blocks.len(), 1);
        assert_eq!(acc.pending(), "partial");
        assert_eq!(acc.state().error.as_deref(), Some("upstream timeout"));
    }

    #[test]
    fn events_after_terminal_are_ignored() {
        let mut acc = SessionAccumulator::with_turn_id("t");
        acc.apply(done());
        assert_eq!(acc.apply(ServerEvent::content("late")), Applied::Ignored);
        assert!(acc.raw_content().is_empty());
    }

    #[test]
    fn no_text_is_lost_across_arbitrary_chunking() {
        let full = "Apple **beat** estimates. [VIEW_CHART:AAPL:3M]\n\nServices grew [link](https://x.y) fast.\n\nOutlook *cautious* overall";
        for chunk in [1, 2, 3, 7, 13] {
            let mut acc = SessionAccumulator::with_turn_id("t");
            let chars: Vec<char> = full.chars().collect();
            for piece in chars.chunks(chunk) {
                acc.apply(ServerEvent::content(piece.iter().collect::<String>()));
            }
            let message = finished(acc.apply(done()));

            let emitted: String = message
                .content_blocks
                .iter()
                .filter_map(|b| b.content())
                .collect();
            let strip = |text: &str| -> String {
                crate::marker::strip_markers(text)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect()
            };
            assert_eq!(strip(&emitted), strip(full), "chunk size {chunk}");
            assert_eq!(
                message
                    .content_blocks
                    .iter()
                    .filter(|b| b.kind() == BlockKind::Chart)
                    .count(),
                1
            );
        }
    }
}
