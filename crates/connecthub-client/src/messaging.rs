//! Conversation and thread state for the messages surface.
//!
//! Thread loads are guarded by a generation counter captured when the
//! load starts: a late-arriving response for a conversation the user has
//! already navigated away from is dropped instead of overwriting fresher
//! state.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use connecthub_gateway::{cond_and, cond_eq, Gateway, Order, QueryBuilder};
use connecthub_shared::constants::MESSAGE_PAGE_SIZE;
use connecthub_shared::{ConversationSummary, Message, MessageId, UserId, ValidationError};

use crate::error::{ClientError, Result};
use crate::events::EventBus;

/// Token for an in-flight thread load. Committing is refused when a newer
/// load has started since.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadRequest {
    pub partner: UserId,
    generation: u64,
}

/// Owns the conversation summaries and the currently open thread.
pub struct MessagingController {
    gateway: Arc<Gateway>,
    events: EventBus,
    pub conversations: Vec<ConversationSummary>,
    pub active_partner: Option<UserId>,
    /// Messages of the open thread in chronological order.
    pub thread: Vec<Message>,
    generation: u64,
}

impl MessagingController {
    pub fn new(gateway: Arc<Gateway>, events: EventBus) -> Self {
        Self {
            gateway,
            events,
            conversations: Vec::new(),
            active_partner: None,
            thread: Vec::new(),
            generation: 0,
        }
    }

    /// Refetch the conversation summary list (last message previews and
    /// unread counts).
    pub async fn refresh_conversations(&mut self) -> Result<()> {
        let me = self.gateway.current_user_id()?;
        self.conversations = self
            .gateway
            .rpc(
                "get_user_conversations",
                serde_json::json!({ "user_id": me }),
            )
            .await?;
        Ok(())
    }

    /// Case-insensitive partner-name filter over the summary list.
    pub fn filtered_conversations(&self, query: &str) -> Vec<&ConversationSummary> {
        let query = query.to_lowercase();
        self.conversations
            .iter()
            .filter(|c| {
                query.is_empty()
                    || c.partner_display_name
                        .as_deref()
                        .unwrap_or("")
                        .to_lowercase()
                        .contains(&query)
                    || c.partner_username
                        .as_deref()
                        .unwrap_or("")
                        .to_lowercase()
                        .contains(&query)
            })
            .collect()
    }

    pub fn unread_total(&self) -> i64 {
        self.conversations.iter().map(|c| c.unread_count.max(0)).sum()
    }

    /// Switch the open thread and invalidate any load still in flight.
    pub fn begin_open(&mut self, partner: UserId) -> ThreadRequest {
        self.active_partner = Some(partner);
        self.thread.clear();
        self.generation += 1;
        ThreadRequest {
            partner,
            generation: self.generation,
        }
    }

    /// Leave the thread view. Pending loads for it become stale.
    pub fn close_thread(&mut self) {
        self.active_partner = None;
        self.thread.clear();
        self.generation += 1;
    }

    /// Fetch the thread for a request started with [`Self::begin_open`].
    pub async fn load_thread(&self, request: &ThreadRequest) -> Result<Vec<Message>> {
        let me = self.gateway.current_user_id()?;
        let messages = self
            .gateway
            .select(
                "messages",
                QueryBuilder::new()
                    .select("*")
                    .or([
                        cond_and([
                            cond_eq("sender_id", me),
                            cond_eq("receiver_id", request.partner),
                        ]),
                        cond_and([
                            cond_eq("sender_id", request.partner),
                            cond_eq("receiver_id", me),
                        ]),
                    ])
                    .order("created_at", Order::Asc)
                    .limit(MESSAGE_PAGE_SIZE),
            )
            .await?;
        Ok(messages)
    }

    /// Commit a loaded thread. Returns `false` (dropping the response)
    /// when a newer open superseded the request.
    pub fn commit_thread(&mut self, request: &ThreadRequest, messages: Vec<Message>) -> bool {
        if request.generation != self.generation || self.active_partner != Some(request.partner) {
            return false;
        }
        self.thread = messages;
        true
    }

    /// Open a conversation: load its messages and mark them read.
    pub async fn open_thread(&mut self, partner: UserId) -> Result<()> {
        let request = self.begin_open(partner);
        let messages = self.load_thread(&request).await?;
        if self.commit_thread(&request, messages) {
            self.mark_thread_read().await?;
        }
        Ok(())
    }

    /// Send a message in the open thread.
    ///
    /// The id is generated client-side and the message is appended
    /// immediately, so rapid sends render in send order regardless of
    /// network timing; the realtime echo of the insert deduplicates by
    /// id. The append is reverted if the insert fails.
    pub async fn send_message(&mut self, content: &str) -> Result<MessageId> {
        let me = self.gateway.current_user_id()?;
        let partner = self
            .active_partner
            .ok_or(ClientError::NotFound("conversation"))?;
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let message = Message {
            id: MessageId::new(),
            sender_id: me,
            receiver_id: partner,
            content: content.to_string(),
            created_at: Utc::now(),
            read_at: None,
        };
        self.thread.push(message.clone());

        if let Err(err) = self.gateway.insert_only("messages", &message).await {
            warn!(partner = %partner, error = %err, "sending message failed");
            self.thread.retain(|m| m.id != message.id);
            self.events.toast_error("Could not send message");
            return Err(err.into());
        }

        if let Some(conv) = self
            .conversations
            .iter_mut()
            .find(|c| c.partner_id == partner)
        {
            conv.last_message = Some(message.content.clone());
            conv.last_message_at = Some(message.created_at);
            conv.last_sender_id = Some(me);
        }

        Ok(message.id)
    }

    /// Idempotent merge of an incoming message into the open thread.
    /// Returns `false` when the message is already present by id.
    pub fn apply_incoming(&mut self, message: Message) -> bool {
        if self.thread.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.thread.push(message);
        true
    }

    /// Set the read timestamp on every unread message from the open
    /// conversation partner, remotely and locally.
    pub async fn mark_thread_read(&mut self) -> Result<()> {
        let me = self.gateway.current_user_id()?;
        let partner = self
            .active_partner
            .ok_or(ClientError::NotFound("conversation"))?;

        let now = Utc::now();
        self.gateway
            .update(
                "messages",
                QueryBuilder::new()
                    .eq("sender_id", partner)
                    .eq("receiver_id", me)
                    .is_null("read_at"),
                &serde_json::json!({ "read_at": now }),
            )
            .await?;

        for message in &mut self.thread {
            if message.receiver_id == me && message.read_at.is_none() {
                message.read_at = Some(now);
            }
        }
        if let Some(conv) = self
            .conversations
            .iter_mut()
            .find(|c| c.partner_id == partner)
        {
            conv.unread_count = 0;
        }
        Ok(())
    }
}
