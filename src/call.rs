//! Incoming-call state machine.
//!
//! At most one call prompt exists at a time. A call arriving while another is
//! `Ringing` or `Resolving` is dropped, not queued, and every session ends in
//! `Resolved` exactly once no matter how often or how late `resolve` runs.

use crate::channel::ChannelEvent;
use crate::error::{DomofonError, SessionResult};
use crate::model::{CallEvent, DomofonId};
use crate::ui::{Screen, ScreenId, UiCollaborator};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Door-open seam, already bound to the tenant that received the call.
#[async_trait]
pub trait DoorAction: Send + Sync + 'static {
    async fn open(&self, domofon: DomofonId) -> SessionResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallState {
    Ringing,
    Resolving,
    Resolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallAction {
    Accept,
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSession {
    pub event: CallEvent,
    pub state: CallState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    DoorOpened,
    /// The prompt was still dismissed; the failure went to `alert`.
    DoorOpenFailed(DomofonError),
    Rejected,
    /// No call was ringing, e.g. a duplicate tap after resolution.
    Ignored,
}

struct ActiveCall {
    id: u64,
    session: CallSession,
}

pub struct CallController {
    door: Arc<dyn DoorAction>,
    ui: Arc<dyn UiCollaborator>,
    active: Mutex<Option<ActiveCall>>,
    next_id: AtomicU64,
}

impl CallController {
    pub fn new(door: Arc<dyn DoorAction>, ui: Arc<dyn UiCollaborator>) -> Self {
        Self {
            door,
            ui,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Snapshot of the non-resolved session, if one exists.
    pub fn active(&self) -> Option<CallSession> {
        self.active.lock().as_ref().map(|call| call.session.clone())
    }

    /// Starts ringing for `event` unless a call is already in progress.
    /// Returns whether the call was presented.
    pub fn on_call(&self, event: CallEvent) -> bool {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            debug!(
                active = %current.session.event.domofon_id,
                dropped = %event.domofon_id,
                state = ?current.session.state,
                "call already in progress, dropping event"
            );
            return false;
        }
        *active = Some(ActiveCall {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            session: CallSession {
                event: event.clone(),
                state: CallState::Ringing,
            },
        });

        // Still under the lock: a concurrent finish cannot dismiss before this prompt exists.
        info!(domofon_id = %event.domofon_id, "presenting incoming call");
        self.ui.present(Screen::IncomingCall(event));
        self.ui.play_alert_sound();
        true
    }

    /// Resolves the ringing call. Only the first call after `on_call` has any
    /// effect; the door is opened at most once per session.
    pub async fn resolve(&self, action: CallAction) -> CallOutcome {
        let (id, event) = {
            let mut active = self.active.lock();
            match active.as_mut() {
                Some(call) if call.session.state == CallState::Ringing => {
                    call.session.state = CallState::Resolving;
                    (call.id, call.session.event.clone())
                }
                _ => {
                    debug!(?action, "no ringing call, resolve ignored");
                    return CallOutcome::Ignored;
                }
            }
        };

        // Dismisses even if this future is dropped while the door request is pending.
        let _finish = FinishOnDrop {
            controller: self,
            id,
        };

        match action {
            CallAction::Accept => match self.door.open(event.domofon_id).await {
                Ok(()) => {
                    info!(domofon_id = %event.domofon_id, "door opened from call");
                    CallOutcome::DoorOpened
                }
                Err(err) => {
                    warn!(domofon_id = %event.domofon_id, error = %err, "door open failed");
                    self.ui.alert(&door_failure_message(&err));
                    CallOutcome::DoorOpenFailed(err)
                }
            },
            CallAction::Reject => {
                info!(domofon_id = %event.domofon_id, "call rejected");
                CallOutcome::Rejected
            }
        }
    }

    /// Releases any in-progress call without touching the door, e.g. on logout.
    /// Returns whether a prompt was dismissed.
    pub fn abandon(&self) -> bool {
        self.finish(None)
    }

    /// Moves the call `id` (or whichever call is active, for `None`) to
    /// `Resolved` and discards it.
    fn finish(&self, id: Option<u64>) -> bool {
        let mut active = self.active.lock();
        if !active
            .as_ref()
            .is_some_and(|call| id.map_or(true, |id| call.id == id))
        {
            return false;
        }
        let Some(call) = active.take() else {
            return false;
        };
        let mut session = call.session;
        session.state = CallState::Resolved;
        debug!(domofon_id = %session.event.domofon_id, state = ?session.state, "call session released");

        // The dismissal belongs to this call; the next one cannot be presented until the lock drops.
        self.ui.stop_alert_sound();
        self.ui.dismiss(ScreenId::IncomingCall);
        true
    }

    /// Feeds channel events into the controller until the channel is dropped.
    pub async fn run(&self, mut events: broadcast::Receiver<ChannelEvent>) {
        loop {
            match events.recv().await {
                Ok(ChannelEvent::Call(event)) => {
                    self.on_call(event);
                }
                Ok(ChannelEvent::StateChange(state)) => {
                    debug!(?state, "channel state observed by call controller");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "call controller lagged behind channel");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

struct FinishOnDrop<'a> {
    controller: &'a CallController,
    id: u64,
}

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.controller.finish(Some(self.id));
    }
}

fn door_failure_message(err: &DomofonError) -> String {
    if err.is_retryable() {
        "Не удалось открыть дверь: сервер недоступен, попробуйте ещё раз".to_owned()
    } else {
        format!("Не удалось открыть дверь: {}", err.message)
    }
}
