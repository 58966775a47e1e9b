//! Out-of-band reference cards delivered in `metadata` events.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};
use tracing::warn;

/// Kind of structured payload a [`DataCard`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CardKind {
    Article,
    Image,
    Event,
    Stock,
    Chart,
    EventList,
    /// A kind this client does not know; such cards are never merged.
    #[serde(other)]
    Unknown,
}

impl CardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Image => "image",
            Self::Event => "event",
            Self::Stock => "stock",
            Self::Chart => "chart",
            Self::EventList => "event-list",
            Self::Unknown => "unknown",
        }
    }
}

/// Structured metadata referenced by id from inline markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCard {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CardKind,
    #[serde(default)]
    pub data: Value,
}

impl DataCard {
    #[must_use]
    pub fn new(kind: CardKind, id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            kind,
            data,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.data.get("title").and_then(Value::as_str)
    }

    pub fn url(&self) -> Option<&str> {
        self.data.get("url").and_then(Value::as_str)
    }

    fn same_key(&self, other: &DataCard) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

/// Servers send ids both as strings and as bare numbers; markers always carry text.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Look up a card by `(kind, id)`.
pub fn find_card<'a>(cards: &'a [DataCard], kind: CardKind, id: &str) -> Option<&'a DataCard> {
    cards.iter().find(|card| card.kind == kind && card.id == id)
}

/// Merge newly delivered cards into `known`.
///
/// A card whose `(kind, id)` already exists replaces the earlier one in place;
/// anything else is appended in arrival order. Cards of an unknown kind are
/// skipped one at a time.
pub fn merge_cards(known: &mut Vec<DataCard>, incoming: impl IntoIterator<Item = DataCard>) {
    for card in incoming {
        if card.kind == CardKind::Unknown {
            warn!(id = %card.id, "skipping card of unknown kind");
            continue;
        }
        match known.iter_mut().find(|existing| existing.same_key(&card)) {
            Some(existing) => *existing = card,
            None => known.push(card),
        }
    }
}
