//! Session Controller
//!
//! Orchestrates one chat session: it owns the [`Transport`], applies the
//! [`ReconnectPolicy`], drains the [`OutboundQueue`] and appends to the
//! [`ConversationLog`] in response to transport events and user actions.
//!
//! The controller is a plain synchronous state machine. A host runtime feeds it
//! one input at a time (`start`, `handle_event`, `on_reconnect_due`,
//! `send_user_message`, `shutdown`), and each input runs to completion before the
//! next, so no locking is involved.
//!
//! ```text
//! Idle ──start──▶ Connecting ──opened──▶ Open
//!                     ▲                    │
//!       timer / eager │                    │ closed(code)
//!                     └──── Disconnected ◀─┘
//!
//! any ──shutdown──▶ Closing ──▶ Disconnected (terminal)
//! ```

use crate::{
    error::SessionError,
    log::{ChatEntry, ConversationLog},
    protocol::{self, NORMAL_CLOSURE},
    queue::OutboundQueue,
    reconnect::{ReconnectAttempt, ReconnectDecision, ReconnectPolicy},
    transport::{
        ConnectionState, Generation, Timer, TimerHandle, Transport, TransportEvent,
        TransportEventKind,
    },
    upload::UploadPanel,
};
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub(crate) mod testing;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not started.
    Idle,
    Connecting,
    Open,
    Closing,
    Disconnected,
}

impl From<SessionState> for ConnectionState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Idle | SessionState::Disconnected => ConnectionState::Disconnected,
            SessionState::Connecting => ConnectionState::Connecting,
            SessionState::Open => ConnectionState::Open,
            SessionState::Closing => ConnectionState::Closing,
        }
    }
}

/// A read-only view of the session for front-ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub entries: Vec<ChatEntry>,
    pub bot_composing: bool,
    pub connection: ConnectionState,
    pub upload_status: String,
    pub selected_file: Option<String>,
    pub queued: usize,
}

pub struct SessionController<T, S> {
    transport: T,
    timer: S,
    policy: ReconnectPolicy,
    state: SessionState,
    generation: Generation,
    log: ConversationLog,
    queue: OutboundQueue,
    attempt: ReconnectAttempt,
    pending_reconnect: Option<TimerHandle>,
    /// Set once a queued message has forced an early reconnect in this outage.
    eager_spent: bool,
    bot_composing: bool,
    shut_down: bool,
}

impl<T: Transport, S: Timer> SessionController<T, S> {
    /// Creates an idle controller. Nothing happens until [`Self::start`].
    pub fn new(transport: T, timer: S, policy: ReconnectPolicy, log: ConversationLog) -> Self {
        Self {
            transport,
            timer,
            policy,
            state: SessionState::Idle,
            generation: 0,
            log,
            queue: OutboundQueue::new(),
            attempt: ReconnectAttempt::default(),
            pending_reconnect: None,
            eager_spent: false,
            bot_composing: false,
            shut_down: false,
        }
    }

    // --- Inputs ---

    /// Opens the first connection.
    pub fn start(&mut self) {
        if self.shut_down || self.state != SessionState::Idle {
            debug!(state = ?self.state, "Ignoring start on a session that is not idle.");
            return;
        }
        info!("Starting chat session.");
        self.connect();
    }

    /// Applies one event from the transport.
    ///
    /// Events from any generation but the current one are stale and ignored, as
    /// is everything after [`Self::shutdown`].
    pub fn handle_event(&mut self, event: TransportEvent) {
        if self.shut_down {
            debug!(generation = event.generation, "Session shut down; dropping transport event.");
            return;
        }
        if event.generation != self.generation {
            debug!(
                generation = event.generation,
                current = self.generation,
                "Dropping event from an abandoned connection."
            );
            return;
        }
        match event.kind {
            TransportEventKind::Opened => self.on_opened(),
            TransportEventKind::Message(raw) => self.receive_message(&raw),
            TransportEventKind::Error(description) => {
                warn!(generation = self.generation, error = %description, "Connection error.");
            }
            TransportEventKind::Closed { code, reason } => self.on_closed(code, reason),
        }
    }

    /// Called by the host when the timer behind `handle` fires.
    pub fn on_reconnect_due(&mut self, handle: TimerHandle) {
        if self.shut_down || self.pending_reconnect != Some(handle) {
            debug!(?handle, "Ignoring stale reconnect timer.");
            return;
        }
        self.pending_reconnect = None;
        if self.state == SessionState::Disconnected {
            info!(attempt = self.attempt.count, "Reconnecting.");
            self.connect();
        }
    }

    /// Records a user message and sends it, or queues it until the connection is open.
    ///
    /// Returns the id of the new log entry, or `None` once the session is shut down.
    pub fn send_user_message(&mut self, text: &str) -> Option<u64> {
        if self.shut_down {
            debug!("Session shut down; ignoring user message.");
            return None;
        }
        let id = self.log.append_user(text);
        self.bot_composing = true;
        // Queue first so a message sent while older ones are still waiting
        // cannot overtake them.
        self.queue.enqueue(id, protocol::encode_query(text));

        match self.state {
            SessionState::Open => {
                self.drain();
                if !self.queue.is_empty() {
                    debug!(error = %SessionError::TransportUnavailable, queued = self.queue.len(), "Send deferred.");
                }
            }
            SessionState::Disconnected => {
                debug!(error = %SessionError::TransportUnavailable, queued = self.queue.len(), "Send deferred.");
                self.eager_reconnect();
            }
            SessionState::Idle | SessionState::Connecting | SessionState::Closing => {
                debug!(state = ?self.state, queued = self.queue.len(), "Message queued until the connection opens.");
            }
        }
        Some(id)
    }

    /// Tears the session down for good.
    ///
    /// Cancels any pending reconnect, closes the connection normally, abandons its
    /// generation, and marks messages that never left the queue as failed.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        info!(state = ?self.state, "Shutting down chat session.");
        let was = self.state;
        self.state = SessionState::Closing;
        self.shut_down = true;

        if let Some(handle) = self.pending_reconnect.take() {
            self.timer.cancel(handle);
        }
        if was != SessionState::Idle {
            self.transport.close(NORMAL_CLOSURE);
        }
        self.generation += 1;

        for unsent in self.queue.take_all() {
            self.log.mark_failed(unsent.entry_id);
        }
        self.bot_composing = false;
        self.state = SessionState::Disconnected;
    }

    // --- Transitions ---

    fn connect(&mut self) {
        self.generation += 1;
        self.state = SessionState::Connecting;
        debug!(generation = self.generation, "Opening connection.");
        self.transport.connect(self.generation);
    }

    fn on_opened(&mut self) {
        if self.state != SessionState::Connecting {
            warn!(state = ?self.state, "Unexpected open event; ignoring.");
            return;
        }
        info!(generation = self.generation, "Connection established.");
        self.state = SessionState::Open;
        self.attempt = ReconnectAttempt::default();
        self.eager_spent = false;
        self.drain();
    }

    fn on_closed(&mut self, code: u16, reason: String) {
        if !matches!(self.state, SessionState::Open | SessionState::Connecting) {
            debug!(code, state = ?self.state, "Ignoring close event.");
            return;
        }
        self.state = SessionState::Disconnected;
        // A reply to a query already on the wire will not arrive on a new
        // connection; queued queries are still answered once they drain.
        if self.queue.is_empty() {
            self.bot_composing = false;
        }

        let closed = SessionError::ConnectionClosed { code, reason };
        match self.policy.decide(code, self.attempt.count) {
            ReconnectDecision::Stop => {
                info!(%closed, "Connection closed normally; not reconnecting.");
                // Nothing is scheduled, so the next send may reconnect early again.
                self.eager_spent = false;
            }
            ReconnectDecision::RetryAfter(_) if !self.queue.is_empty() && !self.eager_spent => {
                warn!(%closed, queued = self.queue.len(), "Connection lost with messages waiting.");
                self.eager_reconnect();
            }
            ReconnectDecision::RetryAfter(delay) => {
                warn!(%closed, delay_ms = delay.as_millis() as u64, "Connection lost; scheduling reconnect.");
                self.schedule_reconnect(delay);
            }
        }
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        if let Some(previous) = self.pending_reconnect.take() {
            self.timer.cancel(previous);
        }
        self.pending_reconnect = Some(self.timer.schedule(delay));
        self.attempt.count += 1;
        self.attempt.next_delay = Some(delay);
    }

    /// Reconnects right away instead of waiting for the timer, once per outage.
    fn eager_reconnect(&mut self) {
        if self.eager_spent {
            debug!("Early reconnect already attempted; waiting for the scheduled one.");
            return;
        }
        self.eager_spent = true;
        if let Some(handle) = self.pending_reconnect.take() {
            self.timer.cancel(handle);
        }
        info!("Reconnecting early to deliver a queued message.");
        self.connect();
    }

    fn drain(&mut self) {
        let transport = &mut self.transport;
        let report = self.queue.drain(|payload| transport.send(payload));
        for id in report.sent {
            self.log.mark_delivered(id);
        }
    }

    fn receive_message(&mut self, raw: &str) {
        match protocol::parse_inbound(raw) {
            Ok(reply) => {
                self.log.append_bot(reply.response, reply.sources);
            }
            Err(e) => {
                warn!(error = %SessionError::from(e), "Discarding inbound frame.");
            }
        }
        self.bot_composing = false;
    }

    // --- Read surface ---

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.into()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    pub fn bot_composing(&self) -> bool {
        self.bot_composing
    }

    pub fn reconnect_attempt(&self) -> ReconnectAttempt {
        self.attempt
    }

    pub fn pending_reconnect(&self) -> Option<TimerHandle> {
        self.pending_reconnect
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn timer(&self) -> &S {
        &self.timer
    }

    /// Captures what a front-end needs to render the session.
    pub fn snapshot(&self, upload: &UploadPanel) -> SessionSnapshot {
        SessionSnapshot {
            entries: self.log.entries().to_vec(),
            bot_composing: self.bot_composing,
            connection: self.connection_state(),
            upload_status: upload.status().to_string(),
            selected_file: upload.selected_file_name().map(str::to_owned),
            queued: self.queue.len(),
        }
    }
}
