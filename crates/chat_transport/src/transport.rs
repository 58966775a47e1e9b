use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// One live bidirectional text channel to the server.
///
/// Dropping the connection closes it; the adapter's pump tasks stop once
/// they observe their channel ends going away.
#[derive(Debug)]
pub struct Connection {
    /// Encoded client messages to deliver to the server.
    pub outgoing: mpsc::UnboundedSender<String>,
    /// Raw server frames. `None` from `recv` means the connection closed.
    pub incoming: mpsc::UnboundedReceiver<String>,
}

/// The server side of an in-memory [`Connection`].
#[derive(Debug)]
pub struct Peer {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl Connection {
    /// A connected pair backed by channels only.
    pub fn in_memory() -> (Self, Peer) {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        (
            Self { outgoing, incoming },
            Peer {
                to_client,
                from_client,
            },
        )
    }
}

/// Opens connections for the client driver.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'static, Result<Connection, TransportError>>;
}
