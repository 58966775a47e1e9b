use chat_transport::url::{chat_url, events_url, DEFAULT_BASE_URL};
use chat_transport::{normalize_http_base, normalize_ws_url, TransportError};

#[test]
fn ws_url_falls_back_to_default_base() {
    assert_eq!(normalize_ws_url("").unwrap(), "ws://localhost:3001/ws");
    assert_eq!(normalize_ws_url("   ").unwrap(), "ws://localhost:3001/ws");
    assert_eq!(DEFAULT_BASE_URL, "http://localhost:3001");
}

#[test]
fn ws_url_maps_http_schemes_and_appends_path() {
    assert_eq!(
        normalize_ws_url("https://chat.example.com/").unwrap(),
        "wss://chat.example.com/ws"
    );
    assert_eq!(
        normalize_ws_url("http://10.0.0.2:3001").unwrap(),
        "ws://10.0.0.2:3001/ws"
    );
}

#[test]
fn ws_url_keeps_existing_socket_path() {
    assert_eq!(
        normalize_ws_url("wss://chat.example.com/ws").unwrap(),
        "wss://chat.example.com/ws"
    );
}

#[test]
fn ws_url_rejects_foreign_schemes() {
    assert!(matches!(
        normalize_ws_url("ftp://chat.example.com"),
        Err(TransportError::InvalidUrl(_))
    ));
}

#[test]
fn http_base_drops_socket_path_and_builds_endpoints() {
    let base = normalize_http_base("wss://chat.example.com/ws").unwrap();
    assert_eq!(base, "https://chat.example.com");
    assert_eq!(events_url(&base), "https://chat.example.com/events");
    assert_eq!(chat_url(&base), "https://chat.example.com/chat");
}
