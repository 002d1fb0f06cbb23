//! Events pushed to the rendering layer.
//!
//! Controllers never talk to the UI directly; they emit [`UiEvent`]s over
//! an unbounded channel and the rendering layer decides how to show them
//! (toast, badge update, list re-render).

use serde::Serialize;
use tokio::sync::mpsc;

use connecthub_shared::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastPayload {
    pub level: ToastLevel,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadUpdatedPayload {
    pub partner_id: UserId,
}

/// Everything the rendering layer can be told asynchronously.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Transient notification (action failures, confirmations).
    Toast(ToastPayload),
    /// A message was appended to the open thread.
    ThreadUpdated(ThreadUpdatedPayload),
    /// The conversation summary list changed (unread counts, previews).
    ConversationsUpdated,
    /// Accepted/pending connection lists changed.
    ConnectionsUpdated,
}

/// Cloneable sender half of the UI event channel.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl EventBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            tracing::error!("Failed to emit event: UI receiver dropped");
        }
    }

    pub fn toast_error(&self, message: impl Into<String>) {
        self.emit(UiEvent::Toast(ToastPayload {
            level: ToastLevel::Error,
            message: message.into(),
        }));
    }

    pub fn toast_info(&self, message: impl Into<String>) {
        self.emit(UiEvent::Toast(ToastPayload {
            level: ToastLevel::Info,
            message: message.into(),
        }));
    }
}
