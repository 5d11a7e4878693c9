//! HTTP implementation of [`DataGateway`] against the intercom REST service.

use crate::config::ClientConfig;
use crate::error::{
    http_error, invalid_argument, not_found, serde_error, unauthenticated, unavailable,
    DomofonError, ErrorCode, SessionResult,
};
use crate::gateway::DataGateway;
use crate::model::{Apartment, DomofonId, Intercom, MediaType, MediaUrls, TenantId};
use crate::phone::PhoneNumber;
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "x-api-key";

/// REST-backed gateway. Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct CheckTenantRequest {
    phone: u64,
}

#[derive(Deserialize)]
struct CheckTenantResponse {
    tenant_id: Option<TenantId>,
}

#[derive(Serialize)]
struct OpenDoorRequest {
    door_id: u32,
}

#[derive(Serialize)]
struct MediaUrlsRequest<'a> {
    intercoms_id: &'a [DomofonId],
    media_type: &'a [MediaType],
}

#[derive(Deserialize)]
struct ValidationError {
    #[serde(default)]
    detail: Vec<ValidationDetail>,
}

#[derive(Deserialize)]
struct ValidationDetail {
    msg: String,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_token: &str,
        timeout: Duration,
    ) -> SessionResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(api_token)
                .map_err(|e| invalid_argument(format!("invalid API token header value: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(http_error)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> SessionResult<Self> {
        Self::new(&config.api_url, &config.api_token, config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(http_error)?;
        decode(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<T> {
        let body = self.post(path, body).await?;
        serde_json::from_str(&body).map_err(serde_error)
    }

    /// Posts `body` and returns the raw response text of a successful call.
    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> SessionResult<String> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(http_error)?;
        checked_body(response).await
    }

    async fn intercoms_of(&self, tenant: TenantId, apartment: i64) -> SessionResult<Vec<Intercom>> {
        self.get_json(&format!(
            "/domo.apartment/{apartment}/domofon?tenant_id={tenant}"
        ))
        .await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> SessionResult<T> {
    let body = checked_body(response).await?;
    serde_json::from_str(&body).map_err(serde_error)
}

async fn checked_body(response: reqwest::Response) -> SessionResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(http_error)?;
    debug!(status = %status, bytes = body.len(), "gateway response received");
    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    Ok(body)
}

fn status_error(status: StatusCode, body: &str) -> DomofonError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            unauthenticated(format!("gateway rejected credentials ({status})"))
        }
        StatusCode::NOT_FOUND => not_found(format!("gateway returned {status}")),
        StatusCode::UNPROCESSABLE_ENTITY => {
            let message = serde_json::from_str::<ValidationError>(body)
                .ok()
                .and_then(|err| err.detail.into_iter().next())
                .map(|detail| detail.msg)
                .unwrap_or_else(|| body.to_owned());
            invalid_argument(format!("validation failed: {message}"))
        }
        _ => {
            warn!(status = %status, body = %body, "gateway request failed");
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                unavailable(format!("gateway returned {status}"))
            } else {
                DomofonError::new(
                    ErrorCode::Internal,
                    format!("gateway returned {status}: {body}"),
                )
            }
        }
    }
}

#[async_trait]
impl DataGateway for HttpGateway {
    async fn check_tenant(&self, phone: &PhoneNumber) -> SessionResult<TenantId> {
        let response: CheckTenantResponse = self
            .post_json(
                "/check-tenant",
                &CheckTenantRequest {
                    phone: phone.as_u64(),
                },
            )
            .await?;
        response
            .tenant_id
            .ok_or_else(|| unauthenticated("gateway returned no tenant id"))
    }

    async fn list_intercoms(&self, tenant: TenantId) -> SessionResult<Vec<Intercom>> {
        let apartments = self.list_apartments(tenant).await?;
        let per_apartment = try_join_all(
            apartments
                .iter()
                .map(|apartment| self.intercoms_of(tenant, apartment.id)),
        )
        .await?;

        // Shared entrances show up under every apartment they serve.
        let mut seen = HashSet::new();
        Ok(per_apartment
            .into_iter()
            .flatten()
            .filter(|intercom| seen.insert(intercom.id))
            .collect())
    }

    async fn list_apartments(&self, tenant: TenantId) -> SessionResult<Vec<Apartment>> {
        self.get_json(&format!("/domo.apartment?tenant_id={tenant}"))
            .await
    }

    async fn open_door(
        &self,
        tenant: TenantId,
        domofon: DomofonId,
        door: u32,
    ) -> SessionResult<()> {
        // The service answers with an empty or informational body.
        self.post(
            &format!("/domo.domofon/{domofon}/open?tenant_id={tenant}"),
            &OpenDoorRequest { door_id: door },
        )
        .await?;
        Ok(())
    }

    async fn snapshot_urls(
        &self,
        tenant: TenantId,
        intercoms: &[DomofonId],
        media: &[MediaType],
    ) -> SessionResult<Vec<MediaUrls>> {
        self.post_json(
            &format!("/domo.domofon/urlsOnType?tenant_id={tenant}"),
            &MediaUrlsRequest {
                intercoms_id: intercoms,
                media_type: media,
            },
        )
        .await
    }
}
