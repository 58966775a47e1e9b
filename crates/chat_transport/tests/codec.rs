use chat_transport::{decode_server_event, encode_client_message, DecodeError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use stream_blocks::{
    BlockKind, CardKind, ClientMessage, HistoryEntry, Role, ServerEvent, SessionAccumulator,
};

#[test]
fn decodes_known_events() {
    assert_eq!(
        decode_server_event(r#"{"type":"content","content":"Hello"}"#).unwrap(),
        Some(ServerEvent::content("Hello"))
    );
    assert_eq!(
        decode_server_event(r#"{"type":"connected"}"#).unwrap(),
        Some(ServerEvent::Connected)
    );
    assert_eq!(
        decode_server_event(r#"{"type":"done","conversationId":"c1","messageId":"m1"}"#).unwrap(),
        Some(ServerEvent::Done {
            conversation_id: Some("c1".to_owned()),
            message_id: Some("m1".to_owned()),
        })
    );
}

#[test]
fn chart_block_range_defaults_to_one_day() {
    assert_eq!(
        decode_server_event(r#"{"type":"chart_block","symbol":"TSLA"}"#).unwrap(),
        Some(ServerEvent::ChartBlock {
            symbol: "TSLA".to_owned(),
            time_range: "1D".to_owned(),
        })
    );
}

#[test]
fn unknown_event_types_are_skipped() {
    assert_eq!(
        decode_server_event(r#"{"type":"heartbeat","at":1}"#).unwrap(),
        None
    );
}

#[test]
fn malformed_frames_are_errors() {
    assert!(matches!(
        decode_server_event("{not json"),
        Err(DecodeError::Json(_))
    ));
    assert!(matches!(
        decode_server_event(r#"{"content":"x"}"#),
        Err(DecodeError::MissingType)
    ));

    let err = decode_server_event(r#"{"type":"chart_block"}"#).unwrap_err();
    match err {
        DecodeError::Payload { event_type, .. } => assert_eq!(event_type, "chart_block"),
        other => panic!("expected payload error, got {other:?}"),
    }
}

#[test]
fn chat_message_encodes_camel_case_fields() {
    let frame = encode_client_message(&ClientMessage::Chat {
        message: "And margins?".to_owned(),
        conversation_history: vec![HistoryEntry {
            role: Role::Assistant,
            content: "Revenue grew.".to_owned(),
        }],
        selected_tickers: vec!["NVDA".to_owned()],
        timezone: "Europe/Berlin".to_owned(),
    })
    .unwrap();

    let value: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "chat",
            "message": "And margins?",
            "conversationHistory": [{"role": "assistant", "content": "Revenue grew."}],
            "selectedTickers": ["NVDA"],
            "timezone": "Europe/Berlin",
        })
    );
}

#[test]
fn metadata_survives_numeric_ids_and_unknown_card_kinds() {
    let frame = r#"{"type":"metadata","dataCards":[
        {"id":42,"type":"event","data":{"title":"FOMC"}},
        {"id":"n-1","type":"news"},
        {"id":"1","type":"article"}
    ]}"#;

    let Some(event) = decode_server_event(frame).unwrap() else {
        panic!("metadata should decode");
    };
    let mut acc = SessionAccumulator::with_turn_id("c");
    acc.apply(ServerEvent::content("Key date: [EVENT_CARD:42]"));
    acc.apply(event);
    acc.apply(ServerEvent::content(""));

    let cards: Vec<(CardKind, &str)> = acc
        .state()
        .data_cards
        .iter()
        .map(|card| (card.kind, card.id.as_str()))
        .collect();
    assert_eq!(cards, vec![(CardKind::Event, "42"), (CardKind::Article, "1")]);
    assert_eq!(
        acc.state().blocks.last().map(|block| block.kind()),
        Some(BlockKind::Event)
    );
}
