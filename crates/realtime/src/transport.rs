//! Handles the persistent WebSocket connection to the document chat service.

use docuchat_core::{
    ConnectionState, Generation, Transport, TransportError, TransportEvent, TransportEventKind,
    protocol::{ABNORMAL_CLOSURE, NO_STATUS_RECEIVED},
};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{CloseFrame, Message as WsMessage, frame::coding::CloseCode},
};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// A command for the task that owns the socket.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(u16),
}

/// The connection attempt currently owned by the transport.
struct Connection {
    generation: Generation,
    outbound: mpsc::UnboundedSender<Outbound>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

/// A [`Transport`] over `tokio-tungstenite`.
///
/// Must be used from within a tokio runtime: `connect` spawns the connection task.
pub struct WsTransport {
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    current: Option<Connection>,
}

impl WsTransport {
    /// Creates a transport for `url` that reports events on `events`.
    pub fn new(url: impl Into<String>, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            url: url.into(),
            events,
            current: None,
        }
    }

    /// State of the current connection attempt, as seen by its socket task.
    pub fn state(&self) -> ConnectionState {
        self.current
            .as_ref()
            .map(|conn| *conn.state.borrow())
            .unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, generation: Generation) {
        if let Some(previous) = self.current.take() {
            debug!(generation = previous.generation, "Abandoning previous connection.");
            previous.task.abort();
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let span = info_span!("ws_connection", generation, url = %self.url);
        let task = tokio::spawn(
            run_connection(
                self.url.clone(),
                generation,
                outbound_rx,
                state_tx,
                self.events.clone(),
            )
            .instrument(span),
        );

        self.current = Some(Connection {
            generation,
            outbound: outbound_tx,
            state: state_rx,
            task,
        });
    }

    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        let Some(conn) = &self.current else {
            return Err(TransportError::NotReady);
        };
        if *conn.state.borrow() != ConnectionState::Open {
            return Err(TransportError::NotReady);
        }
        conn.outbound
            .send(Outbound::Text(payload.to_owned()))
            .map_err(|_| TransportError::NotReady)
    }

    fn close(&mut self, code: u16) {
        let Some(conn) = &self.current else {
            return;
        };
        let state = *conn.state.borrow();
        match state {
            ConnectionState::Open => {
                if conn.outbound.send(Outbound::Close(code)).is_err() {
                    debug!(generation = conn.generation, "Connection task already finished.");
                }
            }
            ConnectionState::Connecting => {
                // No socket to close yet; drop the handshake and report the closure ourselves.
                conn.task.abort();
                let _ = self.events.send(TransportEvent::new(
                    conn.generation,
                    TransportEventKind::Closed {
                        code,
                        reason: "closed before the handshake completed".to_string(),
                    },
                ));
                self.current = None;
            }
            ConnectionState::Closing | ConnectionState::Disconnected => {}
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(conn) = self.current.take() {
            conn.task.abort();
        }
    }
}

/// Runs one connection attempt from handshake to closure.
///
/// Emits `Opened` once the handshake completes, `Message` for every text frame,
/// and always finishes with exactly one `Closed`.
async fn run_connection(
    url: String,
    generation: Generation,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let emit = |kind: TransportEventKind| {
        if events.send(TransportEvent::new(generation, kind)).is_err() {
            debug!("Event receiver dropped.");
        }
    };

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            error!(error = %e, "Failed to connect to chat WebSocket.");
            state.send_replace(ConnectionState::Disconnected);
            emit(TransportEventKind::Error(e.to_string()));
            emit(TransportEventKind::Closed {
                code: ABNORMAL_CLOSURE,
                reason: e.to_string(),
            });
            return;
        }
    };
    info!("Connected to chat WebSocket.");
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    state.send_replace(ConnectionState::Open);
    emit(TransportEventKind::Opened);

    let (code, reason) = loop {
        tokio::select! {
            // Frames queued by the session.
            Some(command) = outbound.recv() => {
                match command {
                    Outbound::Text(payload) => {
                        if let Err(e) = ws_tx.send(WsMessage::Text(payload.into())).await {
                            error!(error = %e, "Failed to write to chat WebSocket.");
                            emit(TransportEventKind::Error(e.to_string()));
                            break (ABNORMAL_CLOSURE, e.to_string());
                        }
                    }
                    Outbound::Close(code) => {
                        info!(code, "Closing chat WebSocket.");
                        state.send_replace(ConnectionState::Closing);
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        if let Err(e) = ws_tx.send(WsMessage::Close(Some(frame))).await {
                            emit(TransportEventKind::Error(e.to_string()));
                            break (ABNORMAL_CLOSURE, e.to_string());
                        }
                    }
                }
            },
            // Frames from the service.
            msg_result = ws_rx.next() => {
                match msg_result {
                    Some(Ok(WsMessage::Text(text))) => {
                        emit(TransportEventKind::Message(text.to_string()));
                    }
                    Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => emit(TransportEventKind::Message(text)),
                        Err(_) => warn!(len = data.len(), "Dropping non-UTF-8 binary frame."),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "Chat WebSocket closed by server.");
                        break match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                            None => (NO_STATUS_RECEIVED, String::new()),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "Error reading from chat WebSocket.");
                        emit(TransportEventKind::Error(e.to_string()));
                        break (ABNORMAL_CLOSURE, e.to_string());
                    }
                    None => {
                        let reason = "connection ended without a close frame".to_string();
                        warn!("Chat WebSocket ended without a close frame.");
                        emit(TransportEventKind::Error(reason.clone()));
                        break (ABNORMAL_CLOSURE, reason);
                    }
                }
            },
        }
    };

    // Flushes the close handshake reply, if any; the socket is done either way.
    let _ = ws_tx.close().await;
    state.send_replace(ConnectionState::Disconnected);
    emit(TransportEventKind::Closed { code, reason });
}
