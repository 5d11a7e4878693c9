use crate::model::{Apartment, CallEvent, DomofonId, Intercom};
use std::sync::Arc;

/// Identifies a screen without its payload, used for dismissal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScreenId {
    PhoneAuth,
    Main,
    Intercoms,
    Apartments,
    Snapshot,
    IncomingCall,
}

/// A screen together with the data it renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    PhoneAuth,
    Main,
    Intercoms(Arc<[Intercom]>),
    Apartments(Arc<[Apartment]>),
    Snapshot { domofon_id: DomofonId, url: String },
    IncomingCall(CallEvent),
}

impl Screen {
    pub fn id(&self) -> ScreenId {
        match self {
            Screen::PhoneAuth => ScreenId::PhoneAuth,
            Screen::Main => ScreenId::Main,
            Screen::Intercoms(_) => ScreenId::Intercoms,
            Screen::Apartments(_) => ScreenId::Apartments,
            Screen::Snapshot { .. } => ScreenId::Snapshot,
            Screen::IncomingCall(_) => ScreenId::IncomingCall,
        }
    }
}

/// Rendering, alert and audio surface implemented by the host application.
///
/// Calls are fire-and-forget; implementations must not block. Call prompt
/// updates are made while the call controller holds its state lock, so an
/// implementation must not call back into the controller from these methods.
pub trait UiCollaborator: Send + Sync + 'static {
    fn present(&self, screen: Screen);

    fn dismiss(&self, screen: ScreenId);

    fn alert(&self, message: &str);

    fn play_alert_sound(&self);

    fn stop_alert_sound(&self);
}
