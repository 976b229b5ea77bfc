//! Chat message models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted chat message. `sender_role` is captured from the store at
/// send time, never from the inbound frame.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "senderRole")]
    pub sender_role: String,
    #[serde(rename = "targetUserId")]
    pub target_user_id: Option<String>,
    pub message: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Insert form of a chat message; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub user_id: String,
    pub sender_role: String,
    pub target_user_id: Option<String>,
    pub message: String,
}
