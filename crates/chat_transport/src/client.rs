use std::future::pending;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use stream_blocks::{
    Applied, ClientMessage, ContentBlock, DataCard, HistoryEntry, Message, ServerEvent,
    SessionAccumulator, ThinkingStep,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::codec::{decode_server_event, encode_client_message};
use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::lifecycle::{ConnectionState, Effect, Lifecycle, TeardownSignal};
use crate::reconnect::ReconnectPolicy;
use crate::transport::{Connection, Connector};

/// Notice surfaced when a send is attempted without an open connection.
pub const NOT_CONNECTED_NOTICE: &str =
    "Not connected. Please wait for the connection to be re-established.";

type ConnectAttempt = BoxFuture<'static, Result<Connection, TransportError>>;

/// A user turn to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub message: String,
    pub selected_tickers: Vec<String>,
}

impl ChatTurn {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            selected_tickers: Vec::new(),
        }
    }

    pub fn with_tickers<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_tickers = tickers.into_iter().map(Into::into).collect();
        self
    }
}

/// What one server event changed in the in-flight turn.
///
/// Only additions are carried, so a long answer costs one copy of each block
/// rather than one copy of every earlier block per delta.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnProgress {
    pub turn_id: String,
    /// Blocks emitted by this event, in order.
    pub new_blocks: Vec<ContentBlock>,
    pub new_thinking: Vec<ThinkingStep>,
    /// Every known card, present only when a `metadata` event changed them.
    pub data_cards: Option<Vec<DataCard>>,
    /// Blocks emitted so far in the turn, including `new_blocks`.
    pub total_blocks: usize,
    pub is_streaming: bool,
    pub error: Option<String>,
}

impl TurnProgress {
    fn since(
        accumulator: &SessionAccumulator,
        blocks_before: usize,
        thinking_before: usize,
        cards_changed: bool,
    ) -> Self {
        let state = accumulator.state();
        Self {
            turn_id: accumulator.turn_id().to_owned(),
            new_blocks: state.blocks.iter().skip(blocks_before).cloned().collect(),
            new_thinking: state.thinking.iter().skip(thinking_before).cloned().collect(),
            data_cards: cards_changed.then(|| state.data_cards.clone()),
            total_blocks: state.blocks.len(),
            is_streaming: state.is_streaming,
            error: state.error.clone(),
        }
    }
}

/// Observable output of the client driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientUpdate {
    /// Externally visible connectivity, reported after the grace period.
    Connectivity(bool),
    State(ConnectionState),
    /// Sent after every event that changed the in-flight turn.
    Streaming(TurnProgress),
    TurnFinished(Message),
    /// The connection dropped mid-turn; its partial state was discarded.
    TurnAbandoned,
    Notice(String),
    ReconnectFailed,
}

#[derive(Debug)]
enum Command {
    Connect,
    Retry,
    Send {
        turn: ChatTurn,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Shutdown,
}

/// Handle to the task that owns the connection and the in-flight turn.
///
/// All events, commands and timers are processed one at a time by a single
/// task, so extraction for one event always finishes before the next event is
/// looked at.
#[derive(Debug)]
pub struct ChatClient {
    commands: mpsc::UnboundedSender<Command>,
    teardown: TeardownSignal,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ChatClient {
    /// Start the driver task. Must be called inside a tokio runtime.
    pub fn spawn<C: Connector>(
        config: ClientConfig,
        connector: C,
    ) -> (Self, mpsc::UnboundedReceiver<ClientUpdate>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (updates, update_rx) = mpsc::unbounded_channel();
        let teardown: TeardownSignal = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));

        let driver = Driver {
            lifecycle: Lifecycle::with_teardown_signal(
                ReconnectPolicy::from_config(&config),
                Arc::clone(&teardown),
            ),
            config,
            connector,
            connection: None,
            pending_connect: None,
            reconnect_at: None,
            offline_at: None,
            turn: None,
            history: Vec::new(),
            updates,
            connected: Arc::clone(&connected),
            reported_state: ConnectionState::Disconnected,
        };
        let task = tokio::spawn(driver.run(command_rx));

        (
            Self {
                commands,
                teardown,
                connected,
                task,
            },
            update_rx,
        )
    }

    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Leave the failed state and start over with a fresh attempt budget.
    pub fn retry(&self) {
        let _ = self.commands.send(Command::Retry);
    }

    pub async fn send(&self, turn: ChatTurn) -> Result<(), ClientError> {
        if self.is_shut_down() {
            return Err(ClientError::Closed);
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send { turn, reply })
            .map_err(|_| ClientError::Closed)?;
        response.await.map_err(|_| ClientError::Closed)?
    }

    /// Tear the session down. The flag is set before this returns, so no
    /// reconnect can be scheduled afterwards.
    pub fn shutdown(&self) {
        self.teardown.store(true, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.teardown.load(Ordering::Acquire)
    }

    /// Wait for the driver task to exit.
    pub async fn join(self) {
        if let Err(error) = self.task.await {
            warn!(%error, "chat client task ended abnormally");
        }
    }
}

struct PendingTurn {
    user: Message,
    accumulator: SessionAccumulator,
}

struct Driver<C> {
    config: ClientConfig,
    connector: C,
    lifecycle: Lifecycle,
    connection: Option<Connection>,
    pending_connect: Option<ConnectAttempt>,
    reconnect_at: Option<Instant>,
    offline_at: Option<Instant>,
    turn: Option<PendingTurn>,
    history: Vec<HistoryEntry>,
    updates: mpsc::UnboundedSender<ClientUpdate>,
    connected: Arc<AtomicBool>,
    reported_state: ConnectionState,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown();
                        break;
                    };
                    if self.handle_command(command).is_break() {
                        break;
                    }
                }
                result = wait_connect(&mut self.pending_connect) => {
                    self.pending_connect = None;
                    self.on_connect_result(result);
                }
                frame = next_frame(&mut self.connection) => match frame {
                    Some(frame) => self.on_frame(&frame),
                    None => self.on_connection_lost(),
                },
                () = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    let effects = self.lifecycle.on_reconnect_due();
                    self.apply(effects);
                }
                () = wait_until(self.offline_at) => {
                    self.offline_at = None;
                    let effects = self.lifecycle.on_offline_notice_due();
                    self.apply(effects);
                }
            }
        }
        debug!("chat client driver stopped");
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect => {
                let effects = self.lifecycle.connect();
                self.apply(effects);
            }
            Command::Retry => {
                let effects = self.lifecycle.retry();
                self.apply(effects);
            }
            Command::Send { turn, reply } => {
                let result = self.send(turn);
                let _ = reply.send(result);
            }
            Command::Shutdown => {
                self.shutdown();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn shutdown(&mut self) {
        let effects = self.lifecycle.teardown();
        self.apply(effects);
        self.turn = None;
        info!("chat client shut down");
    }

    fn open(&self) -> ConnectAttempt {
        let attempt = self.connector.connect();
        match self.config.connect_timeout {
            Some(limit) => async move {
                match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::ConnectTimeout(limit)),
                }
            }
            .boxed(),
            None => attempt,
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenSocket => self.pending_connect = Some(self.open()),
                Effect::CloseSocket => {
                    self.pending_connect = None;
                    self.connection = None;
                }
                Effect::ScheduleReconnect(delay) => self.reconnect_at = Some(Instant::now() + delay),
                Effect::CancelReconnect => self.reconnect_at = None,
                Effect::ScheduleOfflineNotice(grace) => {
                    self.offline_at = Some(Instant::now() + grace)
                }
                Effect::CancelOfflineNotice => self.offline_at = None,
                Effect::Connectivity(online) => {
                    self.connected.store(online, Ordering::Release);
                    self.emit(ClientUpdate::Connectivity(online));
                }
                Effect::ReconnectsExhausted => self.emit(ClientUpdate::ReconnectFailed),
            }
        }

        let state = self.lifecycle.state();
        if state != self.reported_state {
            self.reported_state = state;
            self.emit(ClientUpdate::State(state));
        }
    }

    fn on_connect_result(&mut self, result: Result<Connection, TransportError>) {
        match result {
            Ok(connection) => {
                self.connection = Some(connection);
                let effects = self.lifecycle.on_open();
                self.apply(effects);
            }
            Err(error) => {
                warn!(%error, "connect attempt failed");
                let effects = self.lifecycle.on_closed();
                self.apply(effects);
            }
        }
    }

    fn on_connection_lost(&mut self) {
        self.connection = None;
        if let Some(turn) = self.turn.take() {
            info!(
                turn = turn.accumulator.turn_id(),
                "connection lost mid-turn, abandoning it"
            );
            self.emit(ClientUpdate::TurnAbandoned);
        }
        let effects = self.lifecycle.on_closed();
        self.apply(effects);
    }

    fn on_frame(&mut self, frame: &str) {
        let event = match decode_server_event(frame) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("dropping frame with unknown event type");
                return;
            }
            Err(error) => {
                warn!(%error, "dropping malformed server frame");
                return;
            }
        };

        if event == ServerEvent::Connected {
            debug!("server acknowledged connection");
            return;
        }

        let Some(turn) = self.turn.as_mut() else {
            debug!(?event, "dropping event outside of a turn");
            return;
        };
        let cards_changed = matches!(event, ServerEvent::Metadata { .. });
        let blocks_before = turn.accumulator.state().blocks.len();
        let thinking_before = turn.accumulator.state().thinking.len();
        let applied = turn.accumulator.apply(event);
        let progress = TurnProgress::since(
            &turn.accumulator,
            blocks_before,
            thinking_before,
            cards_changed,
        );

        match applied {
            Applied::Ignored => {}
            Applied::Updated { .. } => self.emit(ClientUpdate::Streaming(progress)),
            Applied::Finished(message) => {
                self.emit(ClientUpdate::Streaming(progress));
                if let Some(turn) = self.turn.take() {
                    self.history.push(turn.user.history_entry());
                }
                if let Some(error) = message.error.as_deref() {
                    info!(error, "turn ended with a server error");
                }
                self.history.push(message.history_entry());
                self.emit(ClientUpdate::TurnFinished(*message));
            }
        }
    }

    fn send(&mut self, turn: ChatTurn) -> Result<(), ClientError> {
        let message = turn.message.trim();
        if message.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let outgoing = match &self.connection {
            Some(connection) if self.lifecycle.is_open() => connection.outgoing.clone(),
            _ => {
                self.emit(ClientUpdate::Notice(NOT_CONNECTED_NOTICE.to_owned()));
                return Err(ClientError::NotConnected);
            }
        };
        if self.turn.is_some() {
            return Err(ClientError::TurnInFlight);
        }

        let frame = encode_client_message(&ClientMessage::Chat {
            message: message.to_owned(),
            conversation_history: self.history.clone(),
            selected_tickers: turn.selected_tickers,
            timezone: self.config.timezone.clone(),
        })?;
        if outgoing.send(frame).is_err() {
            self.emit(ClientUpdate::Notice(NOT_CONNECTED_NOTICE.to_owned()));
            return Err(ClientError::NotConnected);
        }

        let accumulator = SessionAccumulator::begin_turn();
        debug!(turn = accumulator.turn_id(), "turn sent");
        self.emit(ClientUpdate::Streaming(TurnProgress::since(
            &accumulator,
            0,
            0,
            false,
        )));
        self.turn = Some(PendingTurn {
            user: Message::user(message),
            accumulator,
        });
        Ok(())
    }

    fn emit(&self, update: ClientUpdate) {
        let _ = self.updates.send(update);
    }
}

async fn wait_connect(attempt: &mut Option<ConnectAttempt>) -> Result<Connection, TransportError> {
    match attempt {
        Some(attempt) => attempt.await,
        None => pending().await,
    }
}

async fn next_frame(connection: &mut Option<Connection>) -> Option<String> {
    match connection {
        Some(connection) => connection.incoming.recv().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
