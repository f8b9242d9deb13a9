//! In-memory transport and timer used by the controller tests.

use super::SessionController;
use crate::{
    log::ConversationLog,
    reconnect::ReconnectPolicy,
    transport::{
        Generation, Timer, TimerHandle, Transport, TransportError, TransportEvent,
        TransportEventKind,
    },
};
use std::time::Duration;

/// Records every call; `send` succeeds only while `open` is set.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    pub connects: Vec<Generation>,
    pub sent: Vec<String>,
    pub closes: Vec<u16>,
    pub open: bool,
}

impl Transport for FakeTransport {
    fn connect(&mut self, generation: Generation) {
        self.connects.push(generation);
    }

    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotReady);
        }
        self.sent.push(payload.to_string());
        Ok(())
    }

    fn close(&mut self, code: u16) {
        self.open = false;
        self.closes.push(code);
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeTimer {
    pub scheduled: Vec<Duration>,
    pub cancelled: Vec<TimerHandle>,
    next: u64,
}

impl Timer for FakeTimer {
    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        self.scheduled.push(delay);
        self.next += 1;
        TimerHandle(self.next)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.cancelled.push(handle);
    }
}

pub(crate) fn controller() -> SessionController<FakeTransport, FakeTimer> {
    SessionController::new(
        FakeTransport::default(),
        FakeTimer::default(),
        ReconnectPolicy::default(),
        ConversationLog::new(),
    )
}

/// A started controller whose first connection (generation 1) is open.
pub(crate) fn opened_controller() -> SessionController<FakeTransport, FakeTimer> {
    let mut session = controller();
    session.start();
    session.transport_mut().open = true;
    session.handle_event(TransportEvent::new(1, TransportEventKind::Opened));
    session
}
