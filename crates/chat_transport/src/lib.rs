//! Connection management for the streaming chat backend.
//!
//! This crate owns the physical channel only: endpoint normalization, frame
//! decoding, the reconnect policy and the async driver that feeds decoded
//! events into a [`stream_blocks::SessionAccumulator`]. Block extraction
//! itself lives in `stream_blocks` and never sees a socket.
//!
//! Two transports are provided behind the [`Connector`] seam: a WebSocket
//! ([`WsConnector`]) and an SSE downlink with a POST uplink ([`SseConnector`]).

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod reconnect;
pub mod sse;
pub mod transport;
pub mod url;
pub mod ws;

pub use client::{ChatClient, ChatTurn, ClientUpdate, TurnProgress};
pub use codec::{decode_server_event, encode_client_message};
pub use config::{ClientConfig, TransportKind};
pub use error::{ClientError, DecodeError, TransportError};
pub use http::SseConnector;
pub use lifecycle::{ConnectionState, Effect, Lifecycle};
pub use reconnect::ReconnectPolicy;
pub use sse::SseFrameParser;
pub use transport::{Connection, Connector, Peer};
pub use url::{normalize_http_base, normalize_ws_url};
pub use ws::WsConnector;
