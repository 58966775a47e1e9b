use proptest::prelude::*;
use serde_json::json;
use stream_blocks::extract::incomplete_markdown_start;
use stream_blocks::{
    extract, find_marker, strip_markers, Applied, BlockBody, BlockKind, CardKind, ChartRef, DataCard,
    SessionAccumulator, ServerEvent,
};

const PLAIN_FRAGMENTS: &[&str] = &[
    "Shares", "rose", "4%", "after", "guidance", " ", " ", "\n", "\n\n", "*", "**", "[", "]",
    "(", ")", "](", "[VIEW_ART", "https://x.y",
];

const MARKER_FRAGMENTS: &[&str] = &[
    "[HR]",
    "[VIEW_CHART:AAPL:1D]",
    "[VIEW_CHART:chart-MSFT]",
    "[EVENT_CARD:1]",
    "[EVENT_CARD:2]",
];

fn plain_text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(PLAIN_FRAGMENTS), 0..40)
        .prop_map(|parts| parts.concat())
}

fn marked_text() -> impl Strategy<Value = String> {
    let all: Vec<&'static str> = PLAIN_FRAGMENTS
        .iter()
        .chain(MARKER_FRAGMENTS)
        .copied()
        .collect();
    prop::collection::vec(prop::sample::select(all), 0..40).prop_map(|parts| parts.concat())
}

fn chunked(text: &str, sizes: &[usize]) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut idx = 0;
    let mut size_iter = sizes.iter().cycle();
    while idx < chars.len() {
        let size = size_iter.next().copied().unwrap_or(1).max(1);
        let end = (idx + size).min(chars.len());
        out.push(chars[idx..end].iter().collect());
        idx = end;
    }
    out
}

fn visible(text: &str) -> String {
    strip_markers(text)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn event_card() -> DataCard {
    DataCard::new(CardKind::Event, "1", json!({"title": "earnings"}))
}

proptest! {
    #[test]
    fn no_text_is_lost(text in marked_text(), sizes in prop::collection::vec(1usize..9, 1..6)) {
        let mut acc = SessionAccumulator::with_turn_id("p");
        acc.apply(ServerEvent::Metadata {
            data_cards: vec![event_card()],
            event_data: None,
            conversation_id: None,
        });
        for piece in chunked(&text, &sizes) {
            acc.apply(ServerEvent::content(piece));
        }
        let Applied::Finished(message) = acc.apply(ServerEvent::Done {
            conversation_id: None,
            message_id: None,
        }) else {
            panic!("done must finish the turn");
        };

        let emitted: String = message
            .content_blocks
            .iter()
            .filter_map(|block| block.content())
            .collect();
        prop_assert_eq!(visible(&emitted), visible(&text));
        prop_assert_eq!(message.content, text);
    }

    #[test]
    fn streamed_text_blocks_are_lexically_whole(text in plain_text()) {
        let mut acc = SessionAccumulator::with_turn_id("p");
        let mut seen = 0;
        for ch in text.chars() {
            acc.apply(ServerEvent::content(ch.to_string()));
            for block in &acc.state().blocks[seen..] {
                let content = block.content().unwrap_or_default();
                let last_paragraph = content.rsplit("\n\n").next().unwrap_or_default();
                prop_assert_eq!(incomplete_markdown_start(last_paragraph), None, "block {:?}", content);
                prop_assert!(!content.ends_with('['));
            }
            seen = acc.state().blocks.len();
        }
    }

    #[test]
    fn text_blocks_stay_lexically_whole_around_markers(text in marked_text()) {
        let mut acc = SessionAccumulator::with_turn_id("p");
        acc.apply(ServerEvent::Metadata {
            data_cards: vec![event_card()],
            event_data: None,
            conversation_id: None,
        });
        let mut seen = 0;
        for ch in text.chars() {
            acc.apply(ServerEvent::content(ch.to_string()));
            for block in &acc.state().blocks[seen..] {
                let Some(content) = block.content() else {
                    continue;
                };
                let last_paragraph = content.rsplit("\n\n").next().unwrap_or_default();
                prop_assert_eq!(incomplete_markdown_start(last_paragraph), None, "block {:?}", content);
                prop_assert!(!content.ends_with('['));
                prop_assert!(find_marker(content).is_none(), "marker leaked into {:?}", content);
            }
            seen = acc.state().blocks.len();
        }
    }

    #[test]
    fn card_blocks_never_precede_their_card(text in marked_text()) {
        let mut acc = SessionAccumulator::with_turn_id("p");
        for ch in text.chars() {
            acc.apply(ServerEvent::content(ch.to_string()));
        }
        prop_assert!(acc
            .state()
            .blocks
            .iter()
            .all(|block| block.kind() != BlockKind::Event));
    }

    #[test]
    fn re_extraction_is_idempotent(text in marked_text(), with_card in any::<bool>()) {
        let cards = if with_card { vec![event_card()] } else { Vec::new() };
        let first = extract(&text, &cards);
        let second = extract(&first.remaining, &cards);
        prop_assert!(second.blocks.is_empty());
        prop_assert_eq!(second.remaining, first.remaining);
    }
}

#[test]
fn scenario_chart_between_text() {
    let out = extract("Intro text [VIEW_CHART:AAPL:1D] more text", &[]);
    assert_eq!(
        out.blocks,
        vec![
            BlockBody::text("Intro text "),
            BlockBody::Chart {
                data: ChartRef::new("AAPL", "1D"),
            },
        ]
    );
    assert_eq!(out.remaining, "more text");
}

#[test]
fn scenario_truncated_marker() {
    let out = extract("Check out [VIEW_ART", &[]);
    assert!(out.blocks.is_empty());
    assert_eq!(out.remaining, "Check out [VIEW_ART");
}

#[test]
fn scenario_paragraph_break() {
    let out = extract("Revenue grew.\n\nMargins held steady.", &[]);
    assert_eq!(out.blocks, vec![BlockBody::text("Revenue grew.\n\n")]);
    assert_eq!(out.remaining, "Margins held steady.");
}

#[test]
fn dangling_emphasis_in_front_of_a_marker_is_withheld() {
    let out = extract("The chart below is the key one *[HR]", &[]);
    assert_eq!(out.blocks, vec![BlockBody::text("The chart below is the key one ")]);
    assert_eq!(out.remaining, "*[HR]");
}

#[test]
fn scenario_event_card_arrives_after_marker() {
    let mut acc = SessionAccumulator::with_turn_id("d");
    acc.apply(ServerEvent::content("Key date: [EVENT_CARD:42]"));
    acc.apply(ServerEvent::content(" and more commentary follows"));
    assert!(acc
        .state()
        .blocks
        .iter()
        .all(|block| block.kind() != BlockKind::Event));
    let before = acc.state().blocks.len();

    acc.apply(ServerEvent::Metadata {
        data_cards: vec![DataCard::new(CardKind::Event, "42", json!({"title": "FOMC"}))],
        event_data: Some(json!({"42": {"date": "2026-10-28"}})),
        conversation_id: None,
    });
    assert_eq!(acc.state().blocks.len(), before);

    acc.apply(ServerEvent::content(""));
    let kinds: Vec<BlockKind> = acc.state().blocks[before..]
        .iter()
        .map(|block| block.kind())
        .collect();
    assert_eq!(kinds, vec![BlockKind::Event, BlockKind::Text]);
    assert!(acc.state().metadata.event_data.is_some());
}
