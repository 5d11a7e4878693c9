use crate::cache::CacheKey;
use crate::model::TenantId;
use crate::phone::PhoneNumber;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deterministic cache key for a tenant's intercom list.
pub fn intercoms_key(tenant: TenantId) -> CacheKey {
    CacheKey::new(format!("tenant:{tenant}:intercoms"))
}

/// Deterministic cache key for a tenant's apartment list.
pub fn apartments_key(tenant: TenantId) -> CacheKey {
    CacheKey::new(format!("tenant:{tenant}:apartments"))
}

/// A pre-provisioned identity: host platform user bound to a tenant and chat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedIdentity {
    pub platform_user_id: i64,
    pub tenant_id: TenantId,
    pub chat_id: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Local identity table used by deployments that skip the network identity check.
#[derive(Clone, Debug, Default)]
pub struct IdentityMapping {
    by_user: HashMap<i64, MappedIdentity>,
}

impl IdentityMapping {
    pub fn new(identities: impl IntoIterator<Item = MappedIdentity>) -> Self {
        let by_user = identities
            .into_iter()
            .map(|identity| (identity.platform_user_id, identity))
            .collect();
        Self { by_user }
    }

    pub fn by_platform_user(&self, user_id: i64) -> Option<&MappedIdentity> {
        self.by_user.get(&user_id)
    }

    /// Entries whose phone cannot be normalised never match.
    pub fn by_phone(&self, phone: &PhoneNumber) -> Option<&MappedIdentity> {
        self.by_user.values().find(|identity| {
            identity
                .phone
                .as_deref()
                .and_then(|raw| PhoneNumber::parse(raw).ok())
                .is_some_and(|candidate| &candidate == phone)
        })
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}
