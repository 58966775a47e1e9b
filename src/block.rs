use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminant of a [`ContentBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Chart,
    Article,
    Image,
    Event,
    HorizontalRule,
}

/// Symbol and range requested by an inline chart marker or a `chart_block` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRef {
    pub symbol: String,
    pub time_range: String,
}

impl ChartRef {
    pub const DEFAULT_RANGE: &'static str = "1D";

    #[must_use]
    pub fn new(symbol: impl Into<String>, time_range: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            time_range: time_range.into(),
        }
    }
}

/// Payload of a block, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockBody {
    Text { content: String },
    Chart { data: ChartRef },
    Article { data: Value },
    Image { data: Value },
    Event { data: Value },
    HorizontalRule,
}

impl BlockBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Text { .. } => BlockKind::Text,
            Self::Chart { .. } => BlockKind::Chart,
            Self::Article { .. } => BlockKind::Article,
            Self::Image { .. } => BlockKind::Image,
            Self::Event { .. } => BlockKind::Event,
            Self::HorizontalRule => BlockKind::HorizontalRule,
        }
    }

    /// Raw text for `text` blocks.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            _ => None,
        }
    }
}

/// One renderable unit of assistant output.
///
/// Blocks are immutable once emitted; the id is assigned by the session
/// accumulator and is unique within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    #[serde(flatten)]
    pub body: BlockBody,
}

impl ContentBlock {
    #[must_use]
    pub fn new(id: impl Into<String>, body: BlockBody) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.body.kind()
    }

    pub fn content(&self) -> Option<&str> {
        self.body.content()
    }
}
