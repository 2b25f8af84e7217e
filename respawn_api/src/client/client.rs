//! Revolt HTTP-and-WebSocket client.
//!
//! The client supports an **optional HTTP proxy** for REST traffic.
//! Supported proxy formats:
//! * `http://USERNAME:PASSWORD@IP:PORT`
//! * `http://IP:PORT` *(user / password omitted)*

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use reqwest::{Client, ClientBuilder, Method, Proxy, Response};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::error::{handle_api_error, RevoltError};
use crate::websocket::event_handler::EventHandler;
use crate::websocket::gateway::ConnectionState;

pub(crate) type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

pub const DEFAULT_API_URL: &str = "https://api.revolt.chat";
pub const DEFAULT_WS_URL: &str = "wss://ws.revolt.chat/";

const USER_AGENT: &str = concat!("respawn_bot/", env!("CARGO_PKG_VERSION"));

/// Credential used for both REST headers and gateway authentication.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthToken {
    /// Bot account token, sent as `X-Bot-Token`.
    Bot(String),
    /// User session token, sent as `X-Session-Token`.
    Session(String),
}

impl AuthToken {
    fn header_name(&self) -> &'static str {
        match self {
            AuthToken::Bot(_) => "X-Bot-Token",
            AuthToken::Session(_) => "X-Session-Token",
        }
    }

    pub fn secret(&self) -> &str {
        match self {
            AuthToken::Bot(t) | AuthToken::Session(t) => t,
        }
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = match self {
            AuthToken::Bot(_) => "Bot",
            AuthToken::Session(_) => "Session",
        };
        write!(f, "{kind}(<redacted>)")
    }
}

/// Main client to interact with the Revolt API.
#[derive(Clone)]
pub struct RevoltClient {
    /* ───────────────────────── Public configuration ───────────────────────── */
    pub base_url: String,
    pub ws_url: String,
    /// Optional HTTP proxy – *must* start with `http://` or `https://`.
    pub proxy: Option<String>,

    /* ───────────────────────── Internal plumbing ──────────────────────────── */
    pub(crate) http: Client,
    pub(crate) token: Arc<Mutex<Option<AuthToken>>>,
    pub(crate) ws_tx: Arc<Mutex<Option<WsSink>>>,
    pub(crate) event_handler: Arc<Mutex<Option<Arc<dyn EventHandler>>>>,
    pub(crate) connection_state: Arc<Mutex<ConnectionState>>,
}

impl Debug for RevoltClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevoltClient")
            .field("base_url", &self.base_url)
            .field("ws_url", &self.ws_url)
            .field("proxy", &self.proxy)
            .field("http", &"reqwest::Client")
            .field("event_handler", &"Arc<Mutex<Option<Arc<dyn EventHandler>>>>")
            .field("connection_state", &self.connection_state)
            .finish()
    }
}

impl RevoltClient {
    /// Construct a new [`RevoltClient`].
    ///
    /// # Parameters
    /// * `base_url` – REST endpoint (e.g. `https://api.revolt.chat`).
    /// * `ws_url`   – WebSocket endpoint (`wss://…`); if `None`, defaults to
    ///   [`DEFAULT_WS_URL`].
    /// * `proxy`    – **Optional** proxy URL, accepted in the formats described
    ///   at the top of this file.
    pub fn new(
        base_url: String,
        ws_url: Option<String>,
        proxy: Option<String>,
    ) -> Result<Self, RevoltError> {
        let mut builder = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .use_rustls_tls();

        if let Some(ref p) = proxy {
            let full = if p.starts_with("http://") || p.starts_with("https://") {
                p.clone()
            } else {
                format!("http://{p}")
            };
            builder = builder.proxy(Proxy::all(&full)?);
        }

        let ws_url = ws_url.unwrap_or_else(|| DEFAULT_WS_URL.to_string());
        Url::parse(&base_url)?;
        Url::parse(&ws_url)?;

        Ok(Self {
            base_url,
            ws_url,
            proxy,
            http: builder.build()?,
            token: Arc::new(Mutex::new(None)),
            ws_tx: Arc::new(Mutex::new(None)),
            event_handler: Arc::new(Mutex::new(None)),
            connection_state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
        })
    }

    /* ─────────────────────────── Runtime helpers ─────────────────────────── */

    /// Manually set or clear the auth token.
    pub async fn set_token(&self, token: Option<AuthToken>) {
        *self.token.lock().await = token;
    }

    pub(crate) async fn current_token(&self) -> Option<AuthToken> {
        self.token.lock().await.clone()
    }

    /// Join `segments` onto the REST base url.
    pub fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.trim_end_matches('/').to_string();
        for seg in segments {
            url.push('/');
            url.push_str(seg.trim_matches('/'));
        }
        url
    }

    /// Build an authenticated `reqwest::RequestBuilder`.
    async fn authed_request(
        &self,
        method: Method,
        url: &str,
        extra_headers: Option<&[(&str, &str)]>,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, url)
            .header("Accept", "application/json");

        if let Some(t) = self.current_token().await {
            req = req.header(t.header_name(), t.secret());
        }

        if let Some(hdrs) = extra_headers {
            for (k, v) in hdrs {
                req = req.header(*k, *v);
            }
        }

        req
    }

    /* ───────────── Convenience wrappers around HTTP verbs ───────────── */

    pub async fn authed_get(
        &self,
        url: &str,
        extra_headers: Option<&[(&str, &str)]>,
    ) -> Result<Response, RevoltError> {
        self.authed_request(Method::GET, url, extra_headers)
            .await
            .send()
            .await
            .map_err(RevoltError::ReqwestError)
    }

    pub async fn authed_post<T: serde::Serialize>(
        &self,
        url: &str,
        body: &T,
        extra_headers: Option<&[(&str, &str)]>,
    ) -> Result<Response, RevoltError> {
        self.authed_request(Method::POST, url, extra_headers)
            .await
            .json(body)
            .send()
            .await
            .map_err(RevoltError::ReqwestError)
    }
}

/// Parse the body as JSON **iff** the response status is success.
pub async fn parse_json_if_ok<T: serde::de::DeserializeOwned>(
    resp: Response,
) -> Result<T, RevoltError> {
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(RevoltError::ReqwestError)?;

    if !status.is_success() {
        if let Ok(api_err) = serde_json::from_slice::<crate::types::error_types::Error>(&bytes) {
            return Err(handle_api_error(api_err));
        }

        return Err(RevoltError::HttpStatus {
            code: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).to_string(),
        });
    }

    serde_json::from_slice::<T>(&bytes).map_err(RevoltError::SerdeError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_segments_without_double_slashes() {
        let client =
            RevoltClient::new("https://api.example.test/".into(), None, None).expect("client");
        assert_eq!(
            client.endpoint(&["channels", "/01ABC/", "messages"]),
            "https://api.example.test/channels/01ABC/messages"
        );
        assert_eq!(client.ws_url, DEFAULT_WS_URL);
    }

    #[test]
    fn malformed_urls_are_rejected() {
        let err = RevoltClient::new("not a url".into(), None, None).expect_err("bad base");
        assert!(matches!(err, RevoltError::InvalidUrl(_)));
        assert!(RevoltClient::new(
            "https://api.example.test".into(),
            Some("::ws".into()),
            None
        )
        .is_err());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = AuthToken::Bot("super-secret".into());
        assert_eq!(format!("{token:?}"), "Bot(<redacted>)");
        assert_eq!(token.header_name(), "X-Bot-Token");
        assert_eq!(AuthToken::Session("x".into()).header_name(), "X-Session-Token");
    }
}
