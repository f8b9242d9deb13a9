//! WebSocket transport for the DocuChat session engine.
//!
//! [`WsTransport`] implements [`docuchat_core::Transport`] on top of
//! `tokio-tungstenite`. Each `connect` spawns one task that owns the socket for
//! that connection attempt and reports everything it sees as
//! [`TransportEvent`](docuchat_core::TransportEvent)s tagged with the attempt's
//! generation.

mod transport;

pub use transport::WsTransport;
