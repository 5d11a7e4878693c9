//! Session context: the single owner of the session, list cache, push channel
//! and call controller for one signed-in user.

use crate::cache::CacheStore;
use crate::call::{CallAction, CallController, CallOutcome, DoorAction};
use crate::channel::{Connector, RealtimeChannel};
use crate::config::ClientConfig;
use crate::error::{invalid_argument, unauthenticated, DomofonError, ErrorCode, SessionResult};
use crate::gateway::DataGateway;
use crate::mapping::{apartments_key, intercoms_key};
use crate::model::{Apartment, DomofonId, Intercom, MediaType, Session, TenantId, MAIN_DOOR};
use crate::resolver::{Credential, IdentityResolver};
use crate::ui::{Screen, UiCollaborator};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Value type of the session's list cache.
#[derive(Clone, Debug)]
pub enum Listing {
    Intercoms(Arc<[Intercom]>),
    Apartments(Arc<[Apartment]>),
}

struct TenantDoor {
    gateway: Arc<dyn DataGateway>,
    tenant: TenantId,
}

#[async_trait]
impl DoorAction for TenantDoor {
    async fn open(&self, domofon: DomofonId) -> SessionResult<()> {
        self.gateway.open_door(self.tenant, domofon, MAIN_DOOR).await
    }
}

struct CallRuntime {
    controller: Arc<CallController>,
    pump: JoinHandle<()>,
}

pub struct SessionContext {
    gateway: Arc<dyn DataGateway>,
    resolver: Arc<dyn IdentityResolver>,
    ui: Arc<dyn UiCollaborator>,
    channel: RealtimeChannel,
    cache: CacheStore<Listing>,
    session: RwLock<Option<Session>>,
    calls: Mutex<Option<CallRuntime>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl SessionContext {
    pub fn new(
        gateway: Arc<dyn DataGateway>,
        resolver: Arc<dyn IdentityResolver>,
        connector: Arc<dyn Connector>,
        ui: Arc<dyn UiCollaborator>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            gateway,
            resolver,
            ui,
            channel: RealtimeChannel::new(connector, config.reconnect.clone()),
            cache: CacheStore::with_ttl(config.cache_ttl()),
            session: RwLock::new(None),
            calls: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Wires the HTTP gateway, WebSocket channel and configured resolver.
    #[cfg(all(feature = "http", feature = "ws"))]
    pub fn from_config(config: &ClientConfig, ui: Arc<dyn UiCollaborator>) -> SessionResult<Self> {
        let gateway: Arc<dyn DataGateway> =
            Arc::new(crate::gateway::HttpGateway::from_config(config)?);
        let resolver = crate::resolver::build_resolver(&config.resolver, Arc::clone(&gateway));
        let connector = Arc::new(crate::channel::WsConnector::from_config(config));
        Ok(Self::new(gateway, resolver, connector, ui, config))
    }

    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    pub fn tenant(&self) -> Option<TenantId> {
        self.session.read().as_ref().map(Session::tenant_id)
    }

    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }

    pub fn cache(&self) -> &CacheStore<Listing> {
        &self.cache
    }

    pub fn call_controller(&self) -> Option<Arc<CallController>> {
        self.calls
            .lock()
            .as_ref()
            .map(|runtime| Arc::clone(&runtime.controller))
    }

    /// Resolves `credential` and, on success, opens the push channel.
    ///
    /// Signing in again as the same tenant returns the existing session. A
    /// different tenant is refused until [`SessionContext::logout`].
    pub async fn login(&self, credential: Credential) -> SessionResult<Session> {
        let _lifecycle = self.lifecycle.lock().await;

        let tenant = match self.resolver.resolve(&credential).await {
            Ok(tenant) => tenant,
            Err(err) => {
                warn!(resolver = self.resolver.name(), error = %err, "identity resolution failed");
                self.ui.alert(&login_failure_message(&err));
                return Err(err);
            }
        };

        if let Some(existing) = self.session() {
            if existing.tenant_id() == tenant {
                debug!(tenant = %tenant, "already signed in");
                return Ok(existing);
            }
            return Err(invalid_argument(
                "another tenant is signed in; log out first",
            ));
        }

        let session = Session::new(tenant);
        *self.session.write() = Some(session.clone());
        self.start_calls(tenant);
        self.channel.connect(tenant).await;
        info!(tenant = %tenant, resolver = self.resolver.name(), "session established");
        self.ui.present(Screen::Main);
        Ok(session)
    }

    fn start_calls(&self, tenant: TenantId) {
        let controller = Arc::new(CallController::new(
            Arc::new(TenantDoor {
                gateway: Arc::clone(&self.gateway),
                tenant,
            }),
            Arc::clone(&self.ui),
        ));
        // Subscribe before the channel connects so no early call is missed.
        let events = self.channel.subscribe();
        let pump = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.run(events).await })
        };
        if let Some(previous) = self.calls.lock().replace(CallRuntime { controller, pump }) {
            previous.pump.abort();
        }
    }

    /// Tears down the channel, call controller and cached lists.
    pub async fn logout(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.channel.disconnect().await;
        let runtime = self.calls.lock().take();
        if let Some(runtime) = runtime {
            runtime.pump.abort();
            runtime.controller.abandon();
        }
        self.cache.clear();
        let closed = self.session.write().take();
        if let Some(session) = closed {
            info!(tenant = %session.tenant_id(), "session closed");
            self.ui.present(Screen::PhoneAuth);
        }
    }

    fn require_tenant(&self) -> SessionResult<TenantId> {
        self.tenant()
            .ok_or_else(|| unauthenticated("no active session"))
    }

    fn report(&self, err: &DomofonError) {
        warn!(error = %err, retryable = err.is_retryable(), "gateway call failed");
        self.ui.alert(&failure_message(err));
    }

    /// Intercom list for the signed-in tenant, served from cache while fresh.
    pub async fn intercoms(&self) -> SessionResult<Arc<[Intercom]>> {
        let tenant = self.require_tenant()?;
        let gateway = Arc::clone(&self.gateway);
        let listing = self
            .cache
            .get_default(&intercoms_key(tenant), move || async move {
                let intercoms = gateway.list_intercoms(tenant).await?;
                Ok::<_, DomofonError>(Listing::Intercoms(intercoms.into()))
            })
            .await;
        match listing {
            Ok(Listing::Intercoms(intercoms)) => Ok(intercoms),
            Ok(Listing::Apartments(_)) => Err(listing_mismatch()),
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Apartment list (with occupants) for the signed-in tenant.
    pub async fn apartments(&self) -> SessionResult<Arc<[Apartment]>> {
        let tenant = self.require_tenant()?;
        let gateway = Arc::clone(&self.gateway);
        let listing = self
            .cache
            .get_default(&apartments_key(tenant), move || async move {
                let apartments = gateway.list_apartments(tenant).await?;
                Ok::<_, DomofonError>(Listing::Apartments(apartments.into()))
            })
            .await;
        match listing {
            Ok(Listing::Apartments(apartments)) => Ok(apartments),
            Ok(Listing::Intercoms(_)) => Err(listing_mismatch()),
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    pub async fn show_intercoms(&self) -> SessionResult<()> {
        let intercoms = self.intercoms().await?;
        self.ui.present(Screen::Intercoms(intercoms));
        Ok(())
    }

    pub async fn show_apartments(&self) -> SessionResult<()> {
        let apartments = self.apartments().await?;
        self.ui.present(Screen::Apartments(apartments));
        Ok(())
    }

    /// Last fetched intercom list regardless of age, for stale fallback.
    pub fn cached_intercoms(&self) -> Option<Arc<[Intercom]>> {
        let tenant = self.tenant()?;
        match self.cache.peek_stale(&intercoms_key(tenant))? {
            Listing::Intercoms(intercoms) => Some(intercoms),
            Listing::Apartments(_) => None,
        }
    }

    /// Forces the next list reads to hit the gateway.
    pub fn invalidate_listings(&self) {
        if let Some(tenant) = self.tenant() {
            self.cache.invalidate(&intercoms_key(tenant));
            self.cache.invalidate(&apartments_key(tenant));
        }
    }

    /// Opens the main door of `domofon`. List caches are left untouched.
    pub async fn open_door(&self, domofon: DomofonId) -> SessionResult<()> {
        let tenant = self.require_tenant()?;
        let concierge = self
            .cached_intercoms()
            .is_some_and(|intercoms| {
                intercoms
                    .iter()
                    .any(|intercom| intercom.id == domofon && !intercom.can_open())
            });
        if concierge {
            return Err(invalid_argument(format!(
                "intercom {domofon} is a concierge desk and cannot be opened"
            )));
        }

        match self.gateway.open_door(tenant, domofon, MAIN_DOOR).await {
            Ok(()) => {
                info!(tenant = %tenant, domofon_id = %domofon, "door opened");
                Ok(())
            }
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Fetches a still image link for `domofon` and presents it.
    pub async fn snapshot(&self, domofon: DomofonId) -> SessionResult<Option<String>> {
        let tenant = self.require_tenant()?;
        let urls = match self
            .gateway
            .snapshot_urls(tenant, &[domofon], &[MediaType::Jpeg])
            .await
        {
            Ok(urls) => urls,
            Err(err) => {
                self.report(&err);
                return Err(err);
            }
        };

        let url = urls.into_iter().next().and_then(|urls| urls.jpeg);
        match &url {
            Some(url) => self.ui.present(Screen::Snapshot {
                domofon_id: domofon,
                url: url.clone(),
            }),
            None => self.ui.alert("Снимок с камеры недоступен"),
        }
        Ok(url)
    }

    /// Resolves the ringing call, if any.
    pub async fn resolve_call(&self, action: CallAction) -> SessionResult<CallOutcome> {
        let controller = self
            .call_controller()
            .ok_or_else(|| unauthenticated("no active session"))?;
        Ok(controller.resolve(action).await)
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        if let Some(runtime) = self.calls.get_mut().take() {
            runtime.pump.abort();
        }
    }
}

fn listing_mismatch() -> DomofonError {
    DomofonError::new(ErrorCode::Internal, "cache key holds a different listing")
}

fn failure_message(err: &DomofonError) -> String {
    if err.is_retryable() {
        "Сервер недоступен, попробуйте позже".to_owned()
    } else {
        format!("Ошибка: {}", err.message)
    }
}

fn login_failure_message(err: &DomofonError) -> String {
    match err.code {
        ErrorCode::InvalidInput => format!("Ошибка авторизации: {}", err.message),
        ErrorCode::Unavailable => "Сервер недоступен, попробуйте позже".to_owned(),
        _ => "Ошибка авторизации".to_owned(),
    }
}
