use crate::error::{invalid_argument, not_found, SessionResult};
use crate::gateway::DataGateway;
use crate::mapping::{IdentityMapping, MappedIdentity};
use crate::model::TenantId;
use crate::phone::PhoneNumber;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// What the caller presents to prove who they are.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    /// Raw phone number as typed or shared by the host.
    Phone(String),
    /// Host platform user id.
    PlatformUser(i64),
}

/// Strategy turning a credential into a tenant identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn resolve(&self, credential: &Credential) -> SessionResult<TenantId>;
}

/// Asks the data gateway which tenant owns a phone number.
pub struct GatewayResolver {
    gateway: Arc<dyn DataGateway>,
}

impl GatewayResolver {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl IdentityResolver for GatewayResolver {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn resolve(&self, credential: &Credential) -> SessionResult<TenantId> {
        let Credential::Phone(raw) = credential else {
            return Err(invalid_argument(
                "gateway resolver requires a phone number",
            ));
        };
        let phone = PhoneNumber::parse(raw)?;
        debug!(phone = %phone, "checking tenant with gateway");
        let tenant = self.gateway.check_tenant(&phone).await?;
        info!(tenant = %tenant, "tenant resolved by gateway");
        Ok(tenant)
    }
}

/// Resolves from a locally provisioned table; no network round trip.
pub struct LocalMappingResolver {
    mapping: IdentityMapping,
}

impl LocalMappingResolver {
    pub fn new(mapping: IdentityMapping) -> Self {
        Self { mapping }
    }
}

#[async_trait]
impl IdentityResolver for LocalMappingResolver {
    fn name(&self) -> &'static str {
        "local_mapping"
    }

    async fn resolve(&self, credential: &Credential) -> SessionResult<TenantId> {
        let found = match credential {
            Credential::PlatformUser(user_id) => self.mapping.by_platform_user(*user_id),
            Credential::Phone(raw) => self.mapping.by_phone(&PhoneNumber::parse(raw)?),
        };
        found
            .map(|identity| identity.tenant_id)
            .ok_or_else(|| not_found("no provisioned identity for this user"))
    }
}

/// Selects the single resolver active in a deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ResolverConfig {
    #[default]
    Gateway,
    LocalMapping {
        #[serde(default)]
        identities: Vec<MappedIdentity>,
    },
}

pub fn build_resolver(
    config: &ResolverConfig,
    gateway: Arc<dyn DataGateway>,
) -> Arc<dyn IdentityResolver> {
    match config {
        ResolverConfig::Gateway => Arc::new(GatewayResolver::new(gateway)),
        ResolverConfig::LocalMapping { identities } => Arc::new(LocalMappingResolver::new(
            IdentityMapping::new(identities.iter().cloned()),
        )),
    }
}
