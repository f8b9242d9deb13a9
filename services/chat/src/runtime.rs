//! Chat Session Runtime
//!
//! Hosts a [`SessionController`] on tokio. One task owns the controller and the
//! upload panel and feeds them, one input at a time, from three sources: user
//! commands from a [`ChatHandle`], events from the [`WsTransport`], and internal
//! wake-ups (reconnect timers firing and uploads finishing). After every input
//! the task publishes a fresh [`SessionSnapshot`] on a `watch` channel.

use crate::{config::Config, upload::Uploader};
use anyhow::Context;
use docuchat_core::{
    ConnectionState, ConversationLog, SessionController, SessionError, SessionSnapshot, Timer,
    TimerHandle, TransportEvent, TransportEventKind, UploadPanel,
};
use docuchat_realtime::WsTransport;
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// How long shutdown waits for the server to answer our close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Returned by [`ChatHandle`] methods once the session task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("chat session has shut down")]
pub struct SessionClosed;

#[derive(Debug)]
enum Command {
    SendMessage(String),
    SelectFiles(Vec<PathBuf>),
    Upload,
    Shutdown,
}

#[derive(Debug)]
enum Internal {
    ReconnectDue(TimerHandle),
    UploadFinished(Result<(), SessionError>),
}

// --- Timer ---

/// A [`Timer`] backed by `tokio::time::sleep` tasks.
///
/// Each firing is posted to the session task, which hands the handle back to the
/// controller.
struct TokioTimer {
    due: mpsc::UnboundedSender<Internal>,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
    next: u64,
}

impl TokioTimer {
    fn new(due: mpsc::UnboundedSender<Internal>) -> Self {
        Self {
            due,
            tasks: HashMap::new(),
            next: 0,
        }
    }
}

impl Timer for TokioTimer {
    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        self.tasks.retain(|_, task| !task.is_finished());
        self.next += 1;
        let handle = TimerHandle(self.next);
        let due = self.due.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = due.send(Internal::ReconnectDue(handle));
        });
        self.tasks.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

// --- Handle ---

/// The front-end's side of a running chat session.
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl ChatHandle {
    /// Sends a user message. It is queued if the connection is not open.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<(), SessionClosed> {
        self.command(Command::SendMessage(text.into())).await
    }

    /// Replaces the upload panel's file selection.
    pub async fn select_files(&self, files: Vec<PathBuf>) -> Result<(), SessionClosed> {
        self.command(Command::SelectFiles(files)).await
    }

    /// Uploads the current selection in the background.
    pub async fn upload(&self) -> Result<(), SessionClosed> {
        self.command(Command::Upload).await
    }

    /// A receiver that is notified whenever the session's visible state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Closes the connection normally and waits for the session task to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        if self.commands.send(Command::Shutdown).await.is_err() {
            debug!("Session task already stopped.");
        }
        self.task.await.context("Chat session task failed")?;
        Ok(())
    }

    async fn command(&self, command: Command) -> Result<(), SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)
    }
}

/// Starts a chat session for `config` on the current tokio runtime.
pub fn spawn_session(config: &Config, uploader: Arc<dyn Uploader>) -> ChatHandle {
    let (command_tx, command_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let log = match &config.greeting {
        Some(greeting) => ConversationLog::with_greeting(greeting.clone()),
        None => ConversationLog::new(),
    };
    let controller = SessionController::new(
        WsTransport::new(config.ws_url.clone(), event_tx),
        TokioTimer::new(internal_tx.clone()),
        config.reconnect,
        log,
    );
    let upload = UploadPanel::new();
    let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot(&upload));

    let runtime = SessionRuntime {
        controller,
        upload,
        uploader,
        commands: command_rx,
        transport_events: event_rx,
        internal_tx,
        internal_rx,
        snapshots: snapshot_tx,
    };
    let span = info_span!("chat_session", url = %config.ws_url);
    let task = tokio::spawn(runtime.run().instrument(span));

    ChatHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
        task,
    }
}

// --- Session task ---

struct SessionRuntime {
    controller: SessionController<WsTransport, TokioTimer>,
    upload: UploadPanel,
    uploader: Arc<dyn Uploader>,
    commands: mpsc::Receiver<Command>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionRuntime {
    async fn run(mut self) {
        self.controller.start();
        self.publish();

        loop {
            tokio::select! {
                Some(event) = self.transport_events.recv() => {
                    self.controller.handle_event(event);
                },
                Some(internal) = self.internal_rx.recv() => {
                    self.handle_internal(internal);
                },
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                },
            }
            self.publish();
        }

        self.shutdown().await;
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendMessage(text) => {
                self.controller.send_user_message(&text);
            }
            Command::SelectFiles(files) => self.upload.select_files(files),
            Command::Upload => self.start_upload(),
            Command::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::ReconnectDue(handle) => self.controller.on_reconnect_due(handle),
            Internal::UploadFinished(outcome) => self.upload.finish_upload(outcome),
        }
    }

    fn start_upload(&mut self) {
        let Some(files) = self.upload.begin_upload() else {
            return;
        };
        let uploader = Arc::clone(&self.uploader);
        let done = self.internal_tx.clone();
        tokio::spawn(
            async move {
                let outcome = uploader
                    .upload(&files)
                    .await
                    .map(|_| ())
                    .map_err(SessionError::from);
                if let Err(e) = &outcome {
                    error!(error = %e, "Document upload failed.");
                }
                let _ = done.send(Internal::UploadFinished(outcome));
            }
            .in_current_span(),
        );
    }

    async fn shutdown(&mut self) {
        let was_open = self.controller.connection_state() == ConnectionState::Open;
        self.controller.shutdown();
        self.publish();

        if was_open {
            // Let the socket task finish the close handshake before the transport is dropped.
            let closed = tokio::time::timeout(CLOSE_GRACE, async {
                while let Some(event) = self.transport_events.recv().await {
                    if matches!(event.kind, TransportEventKind::Closed { .. }) {
                        break;
                    }
                }
            })
            .await;
            if closed.is_err() {
                warn!("Server did not finish the close handshake in time.");
            }
        }
        info!("Chat session finished.");
    }

    fn publish(&self) {
        let next = self.controller.snapshot(&self.upload);
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
