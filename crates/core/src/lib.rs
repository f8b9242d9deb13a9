//! DocuChat core
//!
//! The connection lifecycle and message-delivery engine behind the chat client.
//! Everything here is synchronous and free of I/O: sockets and clocks are reached
//! through the [`Transport`] and [`Timer`] traits, which the host runtime
//! implements.

pub mod error;
pub mod log;
pub mod protocol;
pub mod queue;
pub mod reconnect;
pub mod session;
pub mod transport;
pub mod upload;

pub use error::SessionError;
pub use log::{Author, ChatEntry, ConversationLog, DeliveryState};
pub use reconnect::{ReconnectAttempt, ReconnectDecision, ReconnectPolicy};
pub use session::{SessionController, SessionSnapshot, SessionState};
pub use transport::{
    ConnectionState, Generation, Timer, TimerHandle, Transport, TransportError, TransportEvent,
    TransportEventKind,
};
pub use upload::{UploadPanel, UploadStatus};
