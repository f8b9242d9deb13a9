//! Seams between the session controller and the outside world.
//!
//! The controller never touches sockets or clocks directly. It drives a
//! [`Transport`] (one persistent connection at a time) and a [`Timer`] (one
//! cancellable reconnect timer), and it is fed [`TransportEvent`]s by whatever
//! runtime hosts it.

/// Tag identifying one connection attempt. Every `connect` gets a fresh one.
pub type Generation = u64;

/// Lifecycle of the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Errors returned synchronously by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection is not open, so nothing was written.
    #[error("connection is not open")]
    NotReady,
}

/// What happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The handshake completed; the connection is open.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// Informational; always followed by `Closed`.
    Error(String),
    /// Terminal event of a connection attempt.
    Closed { code: u16, reason: String },
}

/// A raw event, tagged with the generation of the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: Generation,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(generation: Generation, kind: TransportEventKind) -> Self {
        Self { generation, kind }
    }
}

/// One persistent bidirectional connection at a time.
///
/// Implementations report progress asynchronously as [`TransportEvent`]s carrying
/// the generation passed to [`Transport::connect`]. Each connection attempt ends
/// with exactly one `Closed`, possibly preceded by `Opened`.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Opens a new connection, abandoning any previous one.
    fn connect(&mut self, generation: Generation);

    /// Writes a text frame. Fails with [`TransportError::NotReady`] unless open.
    fn send(&mut self, payload: &str) -> Result<(), TransportError>;

    /// Requests an orderly shutdown of the current connection.
    fn close(&mut self, code: u16);
}

/// Handle to a scheduled reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// Schedules the controller's reconnect wake-ups.
///
/// When a scheduled timer fires, the host delivers the handle back through
/// `SessionController::on_reconnect_due`.
#[cfg_attr(test, mockall::automock)]
pub trait Timer {
    fn schedule(&mut self, delay: std::time::Duration) -> TimerHandle;

    /// Cancels a scheduled timer. Cancelling a fired or unknown handle is a no-op.
    fn cancel(&mut self, handle: TimerHandle);
}
