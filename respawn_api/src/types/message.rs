use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Request body for `POST /channels/{target}/messages`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataMessageSend {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<ReplyIntent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<SendableEmbed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masquerade: Option<Masquerade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactions: Option<Interactions>,
}

impl DataMessageSend {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Reply to `message` without pinging its author.
    pub fn in_reply_to(mut self, message: &Message) -> Self {
        self.replies = Some(vec![ReplyIntent {
            id: message.id.clone(),
            mention: false,
        }]);
        self
    }

    /// Offer `emojis` as clickable reactions under the message.
    pub fn with_reactions<I, S>(mut self, emojis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let reactions: Vec<String> = emojis.into_iter().map(Into::into).collect();
        if !reactions.is_empty() {
            self.interactions = Some(Interactions {
                reactions: Some(reactions),
                restrict_reactions: Some(true),
            });
        }
        self
    }

    pub fn with_embed(mut self, embed: SendableEmbed) -> Self {
        self.embeds.get_or_insert_with(Vec::new).push(embed);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub nonce: Option<String>,
    pub channel: String,
    pub author: String,
    pub user: Option<crate::types::user::User>,
    pub content: Option<String>,
    pub edited: Option<String>, // ISO8601
    pub mentions: Option<Vec<String>>,
    pub replies: Option<Vec<String>>,
    pub reactions: Option<HashMap<String, Vec<String>>>,
    pub interactions: Option<Interactions>,
    pub masquerade: Option<Masquerade>,
    pub flags: Option<u32>,
}

impl Message {
    /// Whether the message was posted by a bot account, when the payload says.
    pub fn from_bot(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.bot.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyIntent {
    pub id: String,
    pub mention: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendableEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colour: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Masquerade {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colour: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interactions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restrict_reactions: Option<bool>,
}
