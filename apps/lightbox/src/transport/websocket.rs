//! WebSocket push listener. Decodes tagged JSON events off the socket and
//! forwards them over an mpsc; the reader task dies quietly when the socket
//! closes, which downgrades the client to poll-only operation.

use crate::protocol::PushEvent;
use crate::transport::{PushEvents, TransportError};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WsPush {
    url: Url,
}

impl WsPush {
    /// Derive the push endpoint from the service base URL: same host,
    /// `ws`/`wss` scheme, `/events` path, and a per-process client id.
    pub fn from_server(server: &Url) -> Result<Self, TransportError> {
        let mut url = server.clone();
        let scheme = match server.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::Push(format!("cannot derive ws url from {server}")))?;
        url.set_path("/events");
        url.set_query(Some(&format!("client=client-{}", Uuid::new_v4())));
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PushEvents for WsPush {
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<PushEvent>, TransportError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| TransportError::Push(err.to_string()))?;
        let (_write, mut read) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<PushEvent>(&text) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(err) => trace!("ignoring undecodable push frame: {err}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        debug!("push socket read failed: {err}");
                        break;
                    }
                }
            }
            debug!("push listener finished");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ws_url_from_http_base() {
        let base = Url::parse("http://127.0.0.1:5000").unwrap();
        let push = WsPush::from_server(&base).unwrap();
        assert_eq!(push.url().scheme(), "ws");
        assert_eq!(push.url().path(), "/events");
        assert!(push.url().query().unwrap().starts_with("client=client-"));
    }

    #[test]
    fn derives_wss_url_from_https_base() {
        let base = Url::parse("https://example.com").unwrap();
        let push = WsPush::from_server(&base).unwrap();
        assert_eq!(push.url().scheme(), "wss");
    }
}
