#![allow(dead_code)]

use async_trait::async_trait;
use domofon_session::call::DoorAction;
use domofon_session::channel::{Connector, FrameStream};
use domofon_session::error::{DomofonError, ErrorCode, SessionResult};
use domofon_session::gateway::DataGateway;
use domofon_session::model::{
    Apartment, DomofonId, Intercom, Location, MediaType, MediaUrls, TenantId,
};
use domofon_session::phone::PhoneNumber;
use domofon_session::ui::{Screen, ScreenId, UiCollaborator};
use futures::channel::mpsc as frames;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub fn unavailable() -> DomofonError {
    DomofonError::new(ErrorCode::Unavailable, "connection refused")
}

pub fn call_frame(domofon_id: i64) -> String {
    format!(r#"{{"type":"call","domofon_id":{domofon_id},"snapshot_url":"https://x/y.jpg"}}"#)
}

/// Everything the core asked the UI to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum UiCall {
    Present(Screen),
    Dismiss(ScreenId),
    Alert(String),
    PlaySound,
    StopSound,
}

pub struct RecordingUi {
    calls: Mutex<Vec<UiCall>>,
    notify: mpsc::UnboundedSender<UiCall>,
}

impl RecordingUi {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<UiCall>) {
        let (notify, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                notify,
            }),
            rx,
        )
    }

    fn record(&self, call: UiCall) {
        self.calls.lock().push(call.clone());
        let _ = self.notify.send(call);
    }

    pub fn calls(&self) -> Vec<UiCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&UiCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn incoming_presented(&self) -> usize {
        self.count(|call| matches!(call, UiCall::Present(Screen::IncomingCall(_))))
    }

    pub fn incoming_dismissed(&self) -> usize {
        self.count(|call| matches!(call, UiCall::Dismiss(ScreenId::IncomingCall)))
    }

    pub fn alerts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                UiCall::Alert(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl UiCollaborator for RecordingUi {
    fn present(&self, screen: Screen) {
        self.record(UiCall::Present(screen));
    }

    fn dismiss(&self, screen: ScreenId) {
        self.record(UiCall::Dismiss(screen));
    }

    fn alert(&self, message: &str) {
        self.record(UiCall::Alert(message.to_owned()));
    }

    fn play_alert_sound(&self) {
        self.record(UiCall::PlaySound);
    }

    fn stop_alert_sound(&self) {
        self.record(UiCall::StopSound);
    }
}

/// Door action with a call counter, optional latency and optional failure.
#[derive(Default)]
pub struct FakeDoor {
    pub opened: Mutex<Vec<DomofonId>>,
    pub fail: AtomicBool,
    pub hang: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeDoor {
    pub fn opens(&self) -> usize {
        self.opened.lock().len()
    }
}

#[async_trait]
impl DoorAction for FakeDoor {
    async fn open(&self, domofon: DomofonId) -> SessionResult<()> {
        self.opened.lock().push(domofon);
        if self.hang.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

/// In-memory data gateway with per-operation counters.
pub struct FakeGateway {
    pub tenants: HashMap<String, TenantId>,
    pub intercoms: Mutex<Vec<Intercom>>,
    pub apartments: Mutex<Vec<Apartment>>,
    pub snapshots: Mutex<HashMap<DomofonId, String>>,
    pub intercom_fetches: AtomicUsize,
    pub apartment_fetches: AtomicUsize,
    pub opened: Mutex<Vec<(TenantId, DomofonId, u32)>>,
    pub fail_lists: AtomicBool,
    pub fail_open: AtomicBool,
    pub list_delay: Mutex<Option<Duration>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            tenants: HashMap::from([("79002288610".to_owned(), TenantId(42))]),
            intercoms: Mutex::new(vec![
                intercom(7, "Подъезд 1"),
                intercom(9, "Калитка"),
                intercom(3, "Консьерж"),
            ]),
            apartments: Mutex::new(vec![Apartment {
                id: 1,
                location: Location {
                    readable_address: Some("ул. Ленина, 1".into()),
                    apartments_number: Some("12".into()),
                },
                paid_before: None,
                tenants: Vec::new(),
            }]),
            snapshots: Mutex::new(HashMap::from([(DomofonId(7), "https://cam/7.jpg".to_owned())])),
            intercom_fetches: AtomicUsize::new(0),
            apartment_fetches: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
            fail_lists: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            list_delay: Mutex::new(None),
        }
    }

    pub fn intercom_fetches(&self) -> usize {
        self.intercom_fetches.load(Ordering::SeqCst)
    }

    async fn list_latency(&self) {
        let delay = *self.list_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

pub fn intercom(id: i64, name: &str) -> Intercom {
    Intercom {
        id: DomofonId(id),
        name: name.to_owned(),
        camera_id: None,
    }
}

#[async_trait]
impl DataGateway for FakeGateway {
    async fn check_tenant(&self, phone: &PhoneNumber) -> SessionResult<TenantId> {
        self.tenants
            .get(phone.as_str())
            .copied()
            .ok_or_else(|| DomofonError::new(ErrorCode::NotFound, "tenant not registered"))
    }

    async fn list_intercoms(&self, _tenant: TenantId) -> SessionResult<Vec<Intercom>> {
        self.intercom_fetches.fetch_add(1, Ordering::SeqCst);
        self.list_latency().await;
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.intercoms.lock().clone())
    }

    async fn list_apartments(&self, _tenant: TenantId) -> SessionResult<Vec<Apartment>> {
        self.apartment_fetches.fetch_add(1, Ordering::SeqCst);
        self.list_latency().await;
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.apartments.lock().clone())
    }

    async fn open_door(
        &self,
        tenant: TenantId,
        domofon: DomofonId,
        door: u32,
    ) -> SessionResult<()> {
        self.opened.lock().push((tenant, domofon, door));
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    async fn snapshot_urls(
        &self,
        _tenant: TenantId,
        intercoms: &[DomofonId],
        _media: &[MediaType],
    ) -> SessionResult<Vec<MediaUrls>> {
        let snapshots = self.snapshots.lock();
        Ok(intercoms
            .iter()
            .map(|id| MediaUrls {
                jpeg: snapshots.get(id).cloned(),
                mp4: None,
            })
            .collect())
    }
}

/// One connect attempt observed by [`ScriptedConnector`].
pub struct Attempt {
    pub tenant: TenantId,
    pub at: Instant,
    frames: Option<frames::UnboundedSender<SessionResult<String>>>,
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        self.frames.is_some()
    }

    pub fn push(&self, text: &str) {
        if let Some(frames) = &self.frames {
            frames
                .unbounded_send(Ok(text.to_owned()))
                .expect("socket still open");
        }
    }

    pub fn fail(&self) {
        if let Some(frames) = &self.frames {
            let _ = frames.unbounded_send(Err(unavailable()));
        }
    }

    /// True once the channel has dropped its end of the socket.
    pub fn is_closed(&self) -> bool {
        self.frames.as_ref().map_or(true, |frames| frames.is_closed())
    }

    /// Server-side close.
    pub fn close(self) {
        drop(self);
    }
}

/// Connector whose sockets are driven by the test.
pub struct ScriptedConnector {
    attempts: mpsc::UnboundedSender<Attempt>,
    refuse: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Attempt>) {
        let (attempts, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                attempts,
                refuse: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    /// Makes the next `count` connect attempts fail.
    pub fn refuse_next(&self, count: usize) {
        self.refuse.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, tenant: TenantId) -> SessionResult<FrameStream> {
        let at = Instant::now();
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            let _ = self.attempts.send(Attempt {
                tenant,
                at,
                frames: None,
            });
            return Err(unavailable());
        }

        let (tx, rx) = frames::unbounded();
        let _ = self.attempts.send(Attempt {
            tenant,
            at,
            frames: Some(tx),
        });
        Ok(rx.boxed())
    }
}
