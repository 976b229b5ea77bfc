//! JSON frames exchanged over a chat channel.
//!
//! Client frames may carry `userId` and `senderRole` fields; those are
//! accepted for wire compatibility but never trusted. Identity comes from
//! the verified token, the role from the store.

use serde::{Deserialize, Serialize};

use crate::db::ChatMessage;

/// Client → server frames, tagged on `"type"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "auth", rename_all = "camelCase")]
    Auth {
        token: Option<String>,
        /// Accepted but ignored; only the token's identity is authoritative.
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename = "send", rename_all = "camelCase")]
    Send {
        message: String,
        #[serde(default)]
        user_id: Option<String>,
        /// Ignored server-side; the persisted role comes from the store.
        #[serde(default)]
        sender_role: Option<String>,
        #[serde(default)]
        target_user_id: Option<String>,
    },
    #[serde(rename = "getHistory", rename_all = "camelCase")]
    GetHistory {
        #[serde(default)]
        user_id: Option<String>,
        target_user_id: String,
    },
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "history")]
    History { messages: Vec<ChatMessage> },
    #[serde(rename = "message")]
    Message {
        #[serde(flatten)]
        message: ChatMessage,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
