use crate::channel::{Connector, FrameStream};
use crate::config::ClientConfig;
use crate::error::{ws_error, SessionResult};
use crate::model::TenantId;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// WebSocket transport for the call feed. Receive-only.
#[derive(Clone, Debug)]
pub struct WsConnector {
    push_url: String,
}

impl WsConnector {
    pub fn new(push_url: impl Into<String>) -> Self {
        Self {
            push_url: push_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.push_url)
    }

    pub fn endpoint(&self, tenant: TenantId) -> String {
        format!("{}/{}", self.push_url, tenant)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, tenant: TenantId) -> SessionResult<FrameStream> {
        let url = self.endpoint(tenant);
        let (socket, response) = connect_async(url.as_str()).await.map_err(ws_error)?;
        debug!(url = %url, status = %response.status(), "push socket open");

        let frames = stream::unfold(Some(socket), |socket| async move {
            let mut socket = socket?;
            loop {
                match socket.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Some((Ok(text.as_str().to_owned()), Some(socket)));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "push socket closed by server");
                        // Flushes the close reply so the server sees a clean shutdown.
                        if let Err(err) = socket.close(None).await {
                            debug!(error = %err, "close handshake not completed");
                        }
                        return None;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Some((Err(ws_error(err)), None)),
                    None => return None,
                }
            }
        });
        Ok(frames.boxed())
    }
}
