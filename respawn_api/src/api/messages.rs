use async_trait::async_trait;
use ulid::Ulid;

use crate::{
    client::{parse_json_if_ok, RevoltClient},
    error::RevoltError,
    types::message::{DataMessageSend, Message},
};

/// Trait that holds the methods for message endpoints.
#[async_trait]
pub trait MessagesApi {
    /// Send a fully-specified message to the given channel.
    ///
    /// A fresh ULID nonce is generated when `body.nonce` is empty.
    async fn send_message(
        &self,
        channel_id: &str,
        body: DataMessageSend,
    ) -> Result<Message, RevoltError>;

    /// Send a plain text message.
    async fn send_text(&self, channel_id: &str, content: &str) -> Result<Message, RevoltError> {
        self.send_message(channel_id, DataMessageSend::text(content))
            .await
    }
}

#[async_trait]
impl MessagesApi for RevoltClient {
    async fn send_message(
        &self,
        channel_id: &str,
        mut body: DataMessageSend,
    ) -> Result<Message, RevoltError> {
        let url = self.endpoint(&["channels", channel_id, "messages"]);

        let nonce = body
            .nonce
            .get_or_insert_with(|| Ulid::new().to_string())
            .clone();

        // Revolt deduplicates retried sends on the idempotency key.
        let headers = [("Idempotency-Key", nonce.as_str())];
        let resp = self.authed_post(&url, &body, Some(&headers)).await?;

        parse_json_if_ok(resp).await
    }
}
