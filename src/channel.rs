//! Persistent push channel scoped to one tenant, with automatic reconnect.
//!
//! The connection lives in a single background task that walks
//! `Connecting -> Connected -> Backoff -> Connecting ...` until it is torn
//! down. Attempts are strictly sequential: the next connect starts only after
//! the previous frame stream has been dropped.

#[cfg(feature = "ws")]
pub mod ws;

use crate::error::SessionResult;
use crate::model::{CallEvent, DomofonId, TenantId};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(feature = "ws")]
pub use ws::WsConnector;

const EVENT_CAPACITY: usize = 64;

/// Inbound text frames of one open connection. An error item or the end of
/// the stream means the socket closed.
pub type FrameStream = BoxStream<'static, SessionResult<String>>;

/// Opens the transport for a tenant's call feed.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, tenant: TenantId) -> SessionResult<FrameStream>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Call(CallEvent),
    StateChange(ChannelState),
}

/// Delay between a socket close and the next connect attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    Fixed {
        delay_ms: u64,
    },
    /// Doubles from `base_ms` up to `max_ms`. With `jitter`, the delay is
    /// drawn uniformly from the upper half of the capped value.
    Exponential {
        base_ms: u64,
        max_ms: u64,
        #[serde(default)]
        jitter: bool,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed { delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (0-based, reset after a
    /// successful open).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            ReconnectPolicy::Exponential {
                base_ms,
                max_ms,
                jitter,
            } => {
                let factor = 1u64 << attempt.min(32);
                let capped = base_ms.saturating_mul(factor).min(max_ms);
                let millis = if jitter && capped > 1 {
                    let half = capped / 2;
                    half + rand::thread_rng().gen_range(0..=capped - half)
                } else {
                    capped
                };
                Duration::from_millis(millis)
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PushFrame {
    Call {
        domofon_id: DomofonId,
        #[serde(default)]
        snapshot_url: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Decodes one inbound frame. Unknown types and undecodable text yield `None`.
pub(crate) fn decode_frame(text: &str) -> Option<CallEvent> {
    match serde_json::from_str::<PushFrame>(text) {
        Ok(PushFrame::Call {
            domofon_id,
            snapshot_url,
        }) => Some(CallEvent::new(domofon_id, snapshot_url)),
        Ok(PushFrame::Unknown) => {
            debug!("ignoring push frame of unknown type");
            None
        }
        Err(err) => {
            debug!(error = %err, "dropping malformed push frame");
            None
        }
    }
}

struct Shared {
    state: watch::Sender<ChannelState>,
    events: broadcast::Sender<ChannelEvent>,
}

impl Shared {
    fn set_state(&self, next: ChannelState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(state = ?next, "channel state changed");
            // No subscribers is fine; state is still observable through `watch`.
            let _ = self.events.send(ChannelEvent::StateChange(next));
        }
    }

    fn dispatch(&self, frame: &str) {
        if let Some(event) = decode_frame(frame) {
            info!(domofon_id = %event.domofon_id, "incoming call pushed");
            let _ = self.events.send(ChannelEvent::Call(event));
        }
    }
}

struct Active {
    tenant: TenantId,
    task: JoinHandle<()>,
}

async fn stop(active: Active) {
    active.task.abort();
    // Waiting for the task guarantees its socket has been dropped.
    let _ = active.task.await;
}

/// One logical push connection, re-established automatically.
pub struct RealtimeChannel {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
    active: Mutex<Option<Active>>,
}

impl RealtimeChannel {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connector,
            policy,
            shared: Arc::new(Shared { state, events }),
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Receives `Call` and `StateChange` events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    /// Tenant the channel is currently bound to, if any.
    pub async fn tenant(&self) -> Option<TenantId> {
        self.active.lock().await.as_ref().map(|active| active.tenant)
    }

    /// Starts the connection for `tenant`.
    ///
    /// A no-op when a connection for the same tenant is already running. A
    /// connection for another tenant is torn down first.
    pub async fn connect(&self, tenant: TenantId) {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if current.tenant == tenant && !current.task.is_finished() {
                debug!(tenant = %tenant, "channel already running");
                return;
            }
        }
        if let Some(previous) = active.take() {
            info!(from = %previous.tenant, to = %tenant, "switching channel identity");
            stop(previous).await;
            self.shared.set_state(ChannelState::Disconnected);
        }

        let task = tokio::spawn(run_connection(
            Arc::clone(&self.connector),
            self.policy.clone(),
            Arc::clone(&self.shared),
            tenant,
        ));
        *active = Some(Active { tenant, task });
    }

    /// Closes the connection and cancels any pending reconnect. Safe in any state.
    pub async fn disconnect(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            info!(tenant = %previous.tenant, "disconnecting channel");
            stop(previous).await;
        }
        self.shared.set_state(ChannelState::Disconnected);
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.task.abort();
        }
    }
}

async fn run_connection(
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
    tenant: TenantId,
) {
    let mut attempt: u32 = 0;
    loop {
        shared.set_state(ChannelState::Connecting);
        match connector.connect(tenant).await {
            Ok(mut frames) => {
                attempt = 0;
                shared.set_state(ChannelState::Connected);
                info!(tenant = %tenant, "push channel connected");
                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(text) => shared.dispatch(&text),
                        Err(err) => {
                            warn!(tenant = %tenant, error = %err, "push channel error");
                            break;
                        }
                    }
                }
                drop(frames);
                info!(tenant = %tenant, "push channel closed");
            }
            Err(err) => {
                warn!(tenant = %tenant, error = %err, attempt, "push channel connect failed");
            }
        }

        shared.set_state(ChannelState::Backoff);
        let delay = policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(tenant = %tenant, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        tokio::time::sleep(delay).await;
    }
}
