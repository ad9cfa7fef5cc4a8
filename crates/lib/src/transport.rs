//! Contract with the streaming connection.
//!
//! The transport owns the socket (and its own reconnect-on-error policy). The core only
//! asks it to connect, disconnect, send, and receives its events through one [`EventSink`].

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,
    #[error("transport closed")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Events emitted by the transport. Per connection: zero or more start/chunk*/end cycles,
/// at most one `SessionId`, and `Error` at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A bot answer with this id begins.
    Start { id: String },
    /// Next fragment of the answer currently streaming.
    Chunk { text: String },
    /// The answer with this id is complete.
    End { id: String },
    /// The remote side assigned a session id to this connection.
    SessionId { id: String },
    Error(TransportError),
}

/// An event stamped with the connection generation whose sink emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Single-subscriber event hook handed to the transport. Each supervisor initialization
/// hands out a sink with a new generation, so events from a torn-down connection can be
/// told apart from current ones.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fails with `Closed` once the controller is gone.
    pub fn send(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .map_err(|_| TransportError::Closed)
    }
}

/// Streaming connection used by the controller.
pub trait Transport {
    /// Install the event hook. Called once per supervisor initialization; reconnects reuse it.
    fn install_listener(&mut self, sink: EventSink);

    /// Open (or re-open) the connection. Completion is observed through events.
    fn connect(&mut self);

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn can_send_message(&self) -> bool;

    /// Ask a question on behalf of the user message `user_message_id`.
    fn ask(
        &mut self,
        user_message_id: &str,
        message: &str,
        topic_id: &str,
    ) -> Result<(), TransportError>;

    fn send_feedback(&mut self, message_id: &str, rating: i32) -> Result<(), TransportError>;

    /// Adopt an existing remote session (resume) or clear it.
    fn set_session_id(&mut self, session_id: Option<String>);
}
