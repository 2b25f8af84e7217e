//! Gateway connection: connect, authenticate, heartbeat, read loop with
//! reconnection, and dispatch into the registered [`EventHandler`].

use std::{sync::Arc, time::Duration};

use async_recursion::async_recursion;
use futures::{stream::SplitStream, SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    time::{interval, sleep, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::{
    client::RevoltClient,
    error::RevoltError,
    types::message::Message as RevoltMessage,
    websocket::event_handler::{
        ChannelDeleteEvent, EventHandler, MessageReactEvent, ReadyEvent,
    },
    ClientToServerEvent, ServerToClientEvent,
};

type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

const HEARTBEAT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 10;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Connection state for the WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Reconnecting,
}

/// Exponential backoff capped at [`MAX_BACKOFF`].
fn next_backoff(current: Duration) -> Duration {
    std::cmp::min(current * 2, MAX_BACKOFF)
}

impl RevoltClient {
    pub async fn event_handler<E: EventHandler>(&self, handler: E) {
        *self.event_handler.lock().await = Some(Arc::new(handler));
    }

    /// Open the gateway, authenticate, and spawn the heartbeat and read loop.
    /// Returns once the first connection is established.
    pub async fn start(&self) -> Result<(), RevoltError> {
        if self.ws_tx.lock().await.is_some() {
            return Err(RevoltError::Other(
                "WebSocket is already running on this client!".into(),
            ));
        }

        *self.connection_state.lock().await = ConnectionState::Connecting;

        let read = match self.connect_and_authenticate().await {
            Ok(read) => read,
            Err(e) => {
                *self.connection_state.lock().await = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        tokio::spawn({
            let client = self.clone();
            async move {
                let mut ticker = interval(HEARTBEAT);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    match client.connection_state().await {
                        ConnectionState::Disconnected => break,
                        ConnectionState::Connected => {
                            if let Err(e) = client.ping(None).await {
                                debug!(error = %e, "heartbeat ping failed");
                            }
                        }
                        _ => {}
                    }
                }
            }
        });

        tokio::spawn({
            let client = self.clone();
            async move { client.read_loop_with_reconnect(read).await }
        });

        Ok(())
    }

    /// Connect, store the writer half, and send `Authenticate` if a token is set.
    async fn connect_and_authenticate(&self) -> Result<WsRead, RevoltError> {
        // Installing twice is an error we don't care about.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let (stream, _response) = connect_async(self.ws_url.as_str()).await?;
        let (write, read) = stream.split();

        *self.ws_tx.lock().await = Some(write);
        *self.connection_state.lock().await = ConnectionState::Connected;

        if let Some(token) = self.current_token().await {
            if let Err(e) = self.send_authenticate(token.secret()).await {
                *self.ws_tx.lock().await = None;
                return Err(e);
            }
        }

        info!(url = %self.ws_url, "gateway connected");
        Ok(read)
    }

    /// Main WebSocket read loop with automatic reconnection handling
    async fn read_loop_with_reconnect(&self, read: WsRead) {
        self.read_loop(read).await;

        let mut retry_count = 0;
        let mut retry_delay = INITIAL_BACKOFF;

        loop {
            if self.connection_state().await == ConnectionState::Closing {
                debug!("gateway closing, not reconnecting");
                *self.connection_state.lock().await = ConnectionState::Disconnected;
                break;
            }

            *self.connection_state.lock().await = ConnectionState::Reconnecting;
            warn!(
                attempt = retry_count + 1,
                max = MAX_RETRIES,
                delay = ?retry_delay,
                "gateway connection lost, reconnecting"
            );
            sleep(retry_delay).await;

            match self.connect_and_authenticate().await {
                Ok(read) => {
                    retry_count = 0;
                    retry_delay = INITIAL_BACKOFF;
                    self.read_loop(read).await;
                }
                Err(e) => {
                    warn!(error = %e, "reconnection attempt failed");
                    retry_count += 1;
                    if retry_count >= MAX_RETRIES {
                        error!("maximum reconnection attempts reached, giving up");
                        *self.connection_state.lock().await = ConnectionState::Disconnected;
                        break;
                    }
                    retry_delay = next_backoff(retry_delay);
                }
            }
        }
    }

    /// Receive frames until the socket closes or errors, forwarding parsed
    /// events to the handler.
    async fn read_loop(&self, mut read: WsRead) {
        while let Some(msg) = read.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "gateway read error");
                    break;
                }
            };

            match msg {
                WsMessage::Text(txt) => match serde_json::from_str::<ServerToClientEvent>(&txt) {
                    Ok(event) => self.handle_event(event).await,
                    Err(err) => warn!(error = %err, raw = %txt.as_str(), "failed to deserialize event"),
                },
                WsMessage::Binary(bin) => match rmp_serde::from_slice::<ServerToClientEvent>(&bin) {
                    Ok(event) => self.handle_event(event).await,
                    Err(err) => warn!(error = %err, "failed to deserialize MsgPack event"),
                },
                WsMessage::Close(cf) => {
                    info!(frame = ?cf, "gateway close frame received");
                    break;
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }

        *self.ws_tx.lock().await = None;
    }

    /// Get the current WebSocket connection state
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.lock().await
    }

    /// Recursively handle events, including "Bulk" which contains multiple sub-events.
    #[async_recursion]
    async fn handle_event(&self, event: ServerToClientEvent) {
        if let ServerToClientEvent::Bulk { v } = event {
            for sub_event in v {
                self.handle_event(sub_event).await;
            }
            return;
        }

        let Some(handler) = self.event_handler.lock().await.clone() else {
            return;
        };

        handler.on_event(self, &event).await;

        match &event {
            ServerToClientEvent::Error { error } => {
                warn!(error = %error, "gateway reported an error");
                handler.on_error_event(self, error).await;
            }
            ServerToClientEvent::Authenticated => {
                handler.on_authenticated(self).await;
            }
            ServerToClientEvent::Ready {
                users,
                servers,
                channels,
            } => {
                let evt = ReadyEvent {
                    users: users.clone(),
                    servers: servers.clone(),
                    channels: channels.clone(),
                };
                handler.on_ready(self, &evt).await;
            }
            ServerToClientEvent::Message {
                id,
                channel,
                author,
                content,
                extra,
            } => {
                let mut payload = serde_json::json!({
                    "_id": id,
                    "channel": channel,
                    "author": author,
                    "content": content,
                });
                if let (Some(obj), Some(extra_obj)) = (payload.as_object_mut(), extra.as_object()) {
                    for (k, v) in extra_obj {
                        obj.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }

                match serde_json::from_value::<RevoltMessage>(payload) {
                    Ok(message) => handler.on_message(self, &message).await,
                    Err(e) => warn!(error = %e, "could not parse event into `Message`"),
                }
            }
            ServerToClientEvent::MessageReact {
                id,
                channel_id,
                user_id,
                emoji_id,
            } => {
                let evt = MessageReactEvent {
                    id: id.clone(),
                    channel_id: channel_id.clone(),
                    user_id: user_id.clone(),
                    emoji_id: emoji_id.clone(),
                };
                handler.on_message_react(self, &evt).await;
            }
            ServerToClientEvent::ChannelDelete { id } => {
                let evt = ChannelDeleteEvent { id: id.clone() };
                handler.on_channel_delete(self, &evt).await;
            }
            ServerToClientEvent::Logout => {
                warn!("session logged out by the server");
            }
            _ => {}
        }
    }

    /// Send an `Authenticate` event with the given token.
    pub async fn send_authenticate(&self, token: &str) -> Result<(), RevoltError> {
        self.send_ws(ClientToServerEvent::Authenticate {
            token: token.to_string(),
        })
        .await
    }

    /// Send a Ping to the server. If `data` is None, defaults to 0.
    pub async fn ping(&self, data: Option<i64>) -> Result<(), RevoltError> {
        self.send_ws(ClientToServerEvent::Ping {
            data: data.unwrap_or(0),
        })
        .await
    }

    async fn send_ws(&self, payload: ClientToServerEvent) -> Result<(), RevoltError> {
        let mut guard = self.ws_tx.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(RevoltError::Other("WebSocket not connected!".into()));
        };

        let text = serde_json::to_string(&payload)?;
        writer.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    /// Send a close frame and stop reconnecting.
    pub async fn close_ws(&self, reason: Option<&str>) -> Result<(), RevoltError> {
        *self.connection_state.lock().await = ConnectionState::Closing;

        let mut guard = self.ws_tx.lock().await;
        if let Some(writer) = guard.as_mut() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: reason.unwrap_or("Closing").into(),
            };
            writer.send(WsMessage::Close(Some(frame))).await?;
        }
        *guard = None;
        Ok(())
    }
}
