use crate::protocol::MalformedFrame;

/// Everything that can go wrong in a chat session.
///
/// None of these are fatal. Each one is recovered locally: sends are queued,
/// bad frames are dropped, closures trigger a reconnect, and upload failures
/// become a status line.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport unavailable; message queued")]
    TransportUnavailable,
    #[error(transparent)]
    MalformedInboundFrame(#[from] MalformedFrame),
    #[error("connection closed with code {code}: {reason}")]
    ConnectionClosed { code: u16, reason: String },
    #[error("upload failed: {0}")]
    UploadFailed(String),
}
