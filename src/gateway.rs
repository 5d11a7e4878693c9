#[cfg(feature = "http")]
pub mod http;

use crate::error::SessionResult;
use crate::model::{Apartment, DomofonId, Intercom, MediaType, MediaUrls, TenantId};
use crate::phone::PhoneNumber;
use async_trait::async_trait;

#[cfg(feature = "http")]
pub use http::HttpGateway;

/// Remote data service consumed by the session layer.
///
/// Every call except the identity check is scoped to a resolved tenant.
#[async_trait]
pub trait DataGateway: Send + Sync + 'static {
    /// Resolves the tenant registered for `phone`.
    async fn check_tenant(&self, phone: &PhoneNumber) -> SessionResult<TenantId>;

    async fn list_intercoms(&self, tenant: TenantId) -> SessionResult<Vec<Intercom>>;

    async fn list_apartments(&self, tenant: TenantId) -> SessionResult<Vec<Apartment>>;

    /// Opens sub-door `door` of intercom `domofon`.
    async fn open_door(&self, tenant: TenantId, domofon: DomofonId, door: u32)
        -> SessionResult<()>;

    /// Looks up media links for each of `intercoms`, in request order.
    async fn snapshot_urls(
        &self,
        tenant: TenantId,
        intercoms: &[DomofonId],
        media: &[MediaType],
    ) -> SessionResult<Vec<MediaUrls>>;
}
