use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Sub-door index used for every door-open request.
pub const MAIN_DOOR: u32 = 0;

/// Resolved tenant identity; all gateway calls are scoped to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl TenantId {
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single intercom unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomofonId(pub i64);

impl DomofonId {
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DomofonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An authenticated session. The tenant never changes for the lifetime of the value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    tenant_id: TenantId,
    pub established_at: OffsetDateTime,
}

impl Session {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            established_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Unsolicited "someone is at the door" notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    pub domofon_id: DomofonId,
    pub snapshot_url: Option<String>,
    pub received_at: OffsetDateTime,
}

impl CallEvent {
    pub fn new(domofon_id: DomofonId, snapshot_url: Option<String>) -> Self {
        Self {
            domofon_id,
            snapshot_url,
            received_at: OffsetDateTime::now_utc(),
        }
    }
}

const CONCIERGE_MARKER: &str = "консьерж";

/// A controllable door unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intercom {
    pub id: DomofonId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub camera_id: Option<i64>,
}

impl Intercom {
    /// Concierge desks expose a camera but cannot be opened remotely.
    pub fn is_concierge(&self) -> bool {
        self.name.to_lowercase().contains(CONCIERGE_MARKER)
    }

    pub fn can_open(&self) -> bool {
        !self.is_concierge()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub readable_address: Option<String>,
    #[serde(default)]
    pub apartments_number: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupantStatus {
    #[serde(default)]
    pub role: i32,
}

/// A person registered in an apartment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: OccupantStatus,
}

impl Occupant {
    const OWNER_ROLE: i32 = 1;

    pub fn is_owner(&self) -> bool {
        self.status.role == Self::OWNER_ROLE
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apartment {
    pub id: i64,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub paid_before: Option<String>,
    #[serde(default)]
    pub tenants: Vec<Occupant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "JPEG")]
    Jpeg,
    #[serde(rename = "MP4")]
    Mp4,
}

/// Media links returned for one intercom by the snapshot lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUrls {
    #[serde(default)]
    pub jpeg: Option<String>,
    #[serde(default)]
    pub mp4: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concierge_intercoms_cannot_open() {
        let lobby = Intercom {
            id: DomofonId(1),
            name: "Консьерж подъезд 2".into(),
            camera_id: Some(10),
        };
        let gate = Intercom {
            id: DomofonId(2),
            name: "Калитка".into(),
            camera_id: None,
        };
        assert!(lobby.is_concierge());
        assert!(!lobby.can_open());
        assert!(gate.can_open());
    }

    #[test]
    fn apartment_tolerates_sparse_payload() {
        let raw = r#"{"id": 5, "tenants": [{"name": "Anna", "phone": "79002288610", "status": {"role": 1}}]}"#;
        let apartment: Apartment = serde_json::from_str(raw).expect("decode");
        assert_eq!(apartment.location, Location::default());
        assert!(apartment.tenants[0].is_owner());
    }

    #[test]
    fn media_type_wire_names() {
        let encoded = serde_json::to_string(&[MediaType::Jpeg, MediaType::Mp4]).expect("encode");
        assert_eq!(encoded, r#"["JPEG","MP4"]"#);
    }
}
