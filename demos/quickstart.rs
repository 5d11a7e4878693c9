use async_trait::async_trait;
use domofon_session::channel::{Connector, FrameStream};
use domofon_session::gateway::DataGateway;
use domofon_session::model::{Apartment, DomofonId, Intercom, MediaType, MediaUrls};
use domofon_session::phone::PhoneNumber;
use domofon_session::{
    build_resolver, CallAction, ChannelState, ClientConfig, Credential, Screen, ScreenId,
    SessionContext, SessionResult, TenantId, UiCollaborator,
};
use futures::channel::mpsc;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

struct DemoGateway;

#[async_trait]
impl DataGateway for DemoGateway {
    async fn check_tenant(&self, phone: &PhoneNumber) -> SessionResult<TenantId> {
        println!("gateway: checking {phone}");
        Ok(TenantId(42))
    }

    async fn list_intercoms(&self, _tenant: TenantId) -> SessionResult<Vec<Intercom>> {
        Ok(vec![
            Intercom {
                id: DomofonId(7),
                name: "Подъезд 1".into(),
                camera_id: Some(70),
            },
            Intercom {
                id: DomofonId(8),
                name: "Консьерж".into(),
                camera_id: Some(80),
            },
        ])
    }

    async fn list_apartments(&self, _tenant: TenantId) -> SessionResult<Vec<Apartment>> {
        Ok(Vec::new())
    }

    async fn open_door(&self, tenant: TenantId, domofon: DomofonId, door: u32) -> SessionResult<()> {
        println!("gateway: tenant {tenant} opens door {door} of intercom {domofon}");
        Ok(())
    }

    async fn snapshot_urls(
        &self,
        _tenant: TenantId,
        intercoms: &[DomofonId],
        _media: &[MediaType],
    ) -> SessionResult<Vec<MediaUrls>> {
        Ok(intercoms
            .iter()
            .map(|id| MediaUrls {
                jpeg: Some(format!("https://example.invalid/{id}.jpg")),
                mp4: None,
            })
            .collect())
    }
}

/// Hands out a single in-process socket; frames are pushed through `server`.
struct DemoConnector {
    socket: Mutex<Option<mpsc::UnboundedReceiver<SessionResult<String>>>>,
}

#[async_trait]
impl Connector for DemoConnector {
    async fn connect(&self, _tenant: TenantId) -> SessionResult<FrameStream> {
        let socket = self.socket.lock().ok().and_then(|mut slot| slot.take());
        match socket {
            Some(rx) => Ok(rx.boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

struct ConsoleUi;

impl UiCollaborator for ConsoleUi {
    fn present(&self, screen: Screen) {
        match screen {
            Screen::Intercoms(intercoms) => {
                for intercom in intercoms.iter() {
                    let lock = if intercom.can_open() { "open" } else { "view only" };
                    println!("ui: intercom {} {} ({lock})", intercom.id, intercom.name);
                }
            }
            other => println!("ui: present {:?}", other.id()),
        }
    }

    fn dismiss(&self, screen: ScreenId) {
        println!("ui: dismiss {screen:?}");
    }

    fn alert(&self, message: &str) {
        println!("ui: alert {message}");
    }

    fn play_alert_sound(&self) {
        println!("ui: ring ring");
    }

    fn stop_alert_sound(&self) {
        println!("ui: silence");
    }
}

#[tokio::main]
async fn main() -> SessionResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::default();
    let (server, socket) = mpsc::unbounded();
    let gateway: Arc<dyn DataGateway> = Arc::new(DemoGateway);
    let ctx = SessionContext::new(
        Arc::clone(&gateway),
        build_resolver(&config.resolver, gateway),
        Arc::new(DemoConnector {
            socket: Mutex::new(Some(socket)),
        }),
        Arc::new(ConsoleUi),
        &config,
    );

    let session = ctx.login(Credential::Phone("8 (900) 228-86-10".into())).await?;
    println!("signed in as tenant {}", session.tenant_id());

    let mut state = ctx.channel().watch_state();
    let _ = state.wait_for(|s| *s == ChannelState::Connected).await;

    let _ = server.unbounded_send(Ok(
        r#"{"type":"call","domofon_id":7,"snapshot_url":null}"#.to_owned(),
    ));
    while ctx
        .call_controller()
        .and_then(|controller| controller.active())
        .is_none()
    {
        tokio::task::yield_now().await;
    }

    let outcome = ctx.resolve_call(CallAction::Accept).await?;
    println!("call resolved: {outcome:?}");

    ctx.show_intercoms().await?;
    ctx.snapshot(DomofonId(7)).await?;
    ctx.logout().await;
    Ok(())
}
