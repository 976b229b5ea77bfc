//! Per-channel chat routing.
//!
//! Every channel walks Unauthenticated → Authenticated → Closed. The only
//! frame processed before authentication is `auth`; auth failures are hard
//! (error frame, then close), malformed payloads after auth are soft
//! (dropped, channel stays open).
//!
//! The load-bearing invariant: any field that affects authorization or
//! attribution (`senderRole`, claimed `userId`) is re-derived server-side.
//! Identity comes from the verified token, the role from the store at the
//! moment of use.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::auth::TokenService;
use crate::db::{NewChatMessage, Store, User};

use super::{ClientFrame, ConnectionRegistry, ServerFrame};

/// What the transport should do after a frame has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Close,
}

/// One live channel, owned by its connection task. `identity` is set once
/// the auth handshake succeeds and never changes afterwards.
pub struct ChannelHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<ServerFrame>,
    identity: Option<String>,
}

impl ChannelHandle {
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }
}

#[derive(Clone)]
pub struct ChatRouter {
    store: Store,
    tokens: TokenService,
    registry: Arc<ConnectionRegistry>,
}

impl ChatRouter {
    pub fn new(store: Store, tokens: TokenService, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            tokens,
            registry,
        }
    }

    /// Open a new channel. The returned receiver is the channel's outbound
    /// frame queue; the connection task pumps it into the transport.
    pub fn connect(&self) -> (ChannelHandle, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChannelHandle {
                conn_id: Uuid::new_v4(),
                tx,
                identity: None,
            },
            rx,
        )
    }

    /// Tear the channel down. Unconditional: runs on transport close and on
    /// transport error alike, so no stale registry entry can survive.
    pub fn disconnect(&self, chan: &ChannelHandle) {
        if let Some(user_id) = &chan.identity {
            self.registry.unregister(user_id, chan.conn_id);
            trace!(user_id = %user_id, "Chat channel unregistered");
        }
    }

    /// Process one inbound frame.
    pub async fn handle_frame(&self, chan: &mut ChannelHandle, raw: &str) -> FrameOutcome {
        let frame = match serde_json::from_str::<ClientFrame>(raw) {
            Ok(frame) => frame,
            Err(e) => {
                // Schema failures are soft: drop the frame, keep the channel.
                trace!(error = %e, "Dropping malformed chat frame");
                return FrameOutcome::Continue;
            }
        };

        match frame {
            ClientFrame::Auth { token, user_id: _ } => self.handle_auth(chan, token).await,
            ClientFrame::Send {
                message,
                target_user_id,
                user_id: _,
                sender_role: _,
            } => self.handle_send(chan, message, target_user_id).await,
            ClientFrame::GetHistory {
                target_user_id,
                user_id: _,
            } => self.handle_get_history(chan, target_user_id).await,
        }
    }

    /// Auth handshake. The claimed `userId` in the frame is never consulted;
    /// registration happens under the verified token subject.
    async fn handle_auth(&self, chan: &mut ChannelHandle, token: Option<String>) -> FrameOutcome {
        if chan.identity.is_some() {
            // Already authenticated; drop the duplicate handshake.
            return FrameOutcome::Continue;
        }

        let Some(token) = token else {
            return self.reject(chan, "Authentication required");
        };

        let claims = match self.tokens.verify(&token) {
            Ok(claims) => claims,
            Err(e) => {
                trace!(error = %e, "Chat auth token rejected");
                return self.reject(chan, "Invalid authentication token");
            }
        };

        // The token's role claim is a snapshot; the account itself is the
        // authority on existence and suspension.
        let user = match self.store.get_user(&claims.sub).await {
            Ok(Some(user)) if !user.suspended => user,
            Ok(_) => return self.reject(chan, "Invalid authentication token"),
            Err(e) => {
                warn!(error = %e, "Store lookup failed during chat auth");
                return self.reject(chan, "Authentication failed");
            }
        };

        chan.identity = Some(user.id.clone());
        self.registry
            .register(&user.id, chan.conn_id, chan.tx.clone());
        trace!(user_id = %user.id, "Chat channel authenticated");

        match self.store.get_chat_messages_for_user(&user.id).await {
            Ok(messages) => {
                let _ = chan.tx.send(ServerFrame::History { messages });
            }
            Err(e) => warn!(error = %e, user_id = %user.id, "Failed to load chat history"),
        }
        FrameOutcome::Continue
    }

    async fn handle_send(
        &self,
        chan: &mut ChannelHandle,
        message: String,
        target_user_id: Option<String>,
    ) -> FrameOutcome {
        let Some(sender_id) = chan.identity.clone() else {
            // Not authenticated; the frame is not processed as a message.
            return FrameOutcome::Continue;
        };
        if message.trim().is_empty() {
            return FrameOutcome::Continue;
        }

        // Re-derive the sender's role from the store, never from the frame.
        let sender = match self.store.get_user(&sender_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                let _ = chan.tx.send(ServerFrame::Error {
                    message: "User not found".to_string(),
                });
                return FrameOutcome::Continue;
            }
            Err(e) => {
                warn!(error = %e, "Store lookup failed for chat send");
                return FrameOutcome::Continue;
            }
        };

        // Only admins route to a chosen counterpart.
        let target = if sender.is_admin() {
            target_user_id
        } else {
            None
        };

        let persisted = match self
            .store
            .create_chat_message(NewChatMessage {
                user_id: sender.id.clone(),
                sender_role: sender.role.clone(),
                target_user_id: target,
                message,
            })
            .await
        {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Failed to persist chat message");
                return FrameOutcome::Continue;
            }
        };

        self.fan_out(&sender, persisted).await;
        FrameOutcome::Continue
    }

    /// Deliver a persisted message: echo to the sender, then to every
    /// connected admin (non-admin sender) or to the selected target (admin
    /// sender). All sends are best-effort; offline recipients catch up on
    /// their next history replay.
    async fn fan_out(&self, sender: &User, msg: crate::db::ChatMessage) {
        let frame = ServerFrame::Message {
            message: msg.clone(),
        };

        self.registry.send_to(&sender.id, frame.clone());

        if sender.is_admin() {
            if let Some(target) = msg.target_user_id.as_deref() {
                if target != sender.id {
                    self.registry.send_to(target, frame);
                }
            }
            return;
        }

        match self.store.admin_ids().await {
            Ok(admin_ids) => {
                for admin_id in admin_ids {
                    if admin_id != sender.id {
                        self.registry.send_to(&admin_id, frame.clone());
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to enumerate admins for fan-out"),
        }
    }

    /// Targeted history replay; admin only. A non-admin request is silently
    /// ignored, the same as any other frame it is not authorized to send.
    async fn handle_get_history(
        &self,
        chan: &mut ChannelHandle,
        target_user_id: String,
    ) -> FrameOutcome {
        let Some(requester_id) = chan.identity.clone() else {
            return FrameOutcome::Continue;
        };

        let is_admin = match self.store.get_user(&requester_id).await {
            Ok(Some(user)) => user.is_admin(),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Store lookup failed for history request");
                return FrameOutcome::Continue;
            }
        };
        if !is_admin {
            return FrameOutcome::Continue;
        }

        match self.store.get_chat_messages_for_user(&target_user_id).await {
            Ok(messages) => {
                let _ = chan.tx.send(ServerFrame::History { messages });
            }
            Err(e) => warn!(error = %e, "Failed to load targeted chat history"),
        }
        FrameOutcome::Continue
    }

    fn reject(&self, chan: &ChannelHandle, message: &str) -> FrameOutcome {
        let _ = chan.tx.send(ServerFrame::Error {
            message: message.to_string(),
        });
        FrameOutcome::Close
    }
}
