#![forbid(unsafe_code)]

pub mod cache;
pub mod call;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod mapping;
pub mod model;
pub mod phone;
pub mod resolver;
pub mod ui;

pub use cache::{CacheKey, CacheStore};
pub use call::{CallAction, CallController, CallOutcome, CallState};
pub use channel::{ChannelEvent, ChannelState, Connector, RealtimeChannel, ReconnectPolicy};
pub use config::ClientConfig;
pub use context::{Listing, SessionContext};
pub use error::{DomofonError, ErrorCode, SessionResult};
pub use gateway::DataGateway;
pub use model::{CallEvent, DomofonId, Session, TenantId};
pub use resolver::{build_resolver, Credential, IdentityResolver, ResolverConfig};
pub use ui::{Screen, ScreenId, UiCollaborator};
