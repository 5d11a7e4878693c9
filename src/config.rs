//! Client configuration with layered loading.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. An optional TOML file
//! 3. `DOMOFON_*` environment variables (top-level keys only)

use crate::channel::ReconnectPolicy;
use crate::error::{invalid_argument, SessionResult};
use crate::resolver::ResolverConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "DOMOFON_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the data gateway.
    pub api_url: String,
    /// Sent as `x-api-key` on every gateway request.
    pub api_token: String,
    /// Push endpoint; the tenant id is appended as the last path segment.
    pub push_url: String,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
    pub resolver: ResolverConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/tg-bot".into(),
            api_token: String::new(),
            push_url: "ws://localhost:8000/ws".into(),
            cache_ttl_secs: 300,
            request_timeout_secs: 10,
            reconnect: ReconnectPolicy::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> SessionResult<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| invalid_argument(format!("configuration error: {e}")))
    }

    /// Parses TOML content over the defaults without consulting the environment.
    pub fn from_toml_str(content: &str) -> SessionResult<Self> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| invalid_argument(format!("configuration error: {e}")))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
