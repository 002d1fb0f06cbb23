//! Realtime sync bridge.
//!
//! Subscribes to change events on the `messages` and `connections` tables
//! scoped to the current user and keeps the messaging/connection
//! controllers consistent without full page reloads:
//!
//! - a message insert for the open thread is appended in place (idempotent
//!   by id) and marked read;
//! - a message insert for any other thread only refreshes the conversation
//!   summary list;
//! - any connection event belonging to the user triggers a full refetch of
//!   the accepted and pending lists.
//!
//! The bridge trusts events delivered after [`RealtimeEvent::ChannelOpen`];
//! re-registering listeners after a reconnect is the realtime task's job.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use connecthub_gateway::realtime::{
    spawn_realtime, ChangeEvent, ChangeKind, RealtimeCommand, RealtimeEvent, TableSubscription,
};
use connecthub_gateway::{Gateway, GatewayError};
use connecthub_shared::{Connection, Message, UserId};

use crate::connections::ConnectionsController;
use crate::error::Result;
use crate::events::{EventBus, ThreadUpdatedPayload, UiEvent};
use crate::messaging::MessagingController;

/// Where an incoming message insert is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageRoute {
    /// The sender is the open conversation partner: append directly.
    AppendToThread,
    /// A different thread: refresh previews and unread counts only.
    RefreshSummaries,
    /// Not addressed to the current user.
    Ignore,
}

fn route_message(
    current_user: UserId,
    active_partner: Option<UserId>,
    message: &Message,
) -> MessageRoute {
    if message.receiver_id != current_user {
        return MessageRoute::Ignore;
    }
    if active_partner == Some(message.sender_id) {
        MessageRoute::AppendToThread
    } else {
        MessageRoute::RefreshSummaries
    }
}

/// Whether a connection change involves the current user. Delete events
/// only carry the old row.
fn connection_concerns(user: UserId, change: &ChangeEvent) -> bool {
    let involved = |value: &Option<serde_json::Value>| {
        value
            .as_ref()
            .and_then(|v| serde_json::from_value::<Connection>(v.clone()).ok())
            .is_some_and(|c| c.involves(user))
    };
    involved(&change.record) || involved(&change.old_record)
}

/// Handle to a running bridge. Dropping it without calling
/// [`SyncHandle::shutdown`] leaves the task running until the process
/// exits; views must shut it down exactly once when they unmount or the
/// user changes.
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<RealtimeCommand>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Sender for registering additional listeners on the same channel.
    pub fn command_sender(&self) -> mpsc::Sender<RealtimeCommand> {
        self.cmd_tx.clone()
    }

    /// Close the realtime channel and wait for the bridge loop to end.
    pub async fn shutdown(self) {
        if self.cmd_tx.send(RealtimeCommand::Shutdown).await.is_err() {
            debug!("realtime task already gone");
        }
        if let Err(err) = self.task.await {
            warn!(error = %err, "sync bridge task ended abnormally");
        }
    }
}

/// Start the realtime channel, register the user-scoped listeners, and
/// spawn the processing loop. The command sender is also stored in
/// [`AppState`](crate::state::AppState) so other surfaces can add
/// listeners on the same channel.
pub async fn spawn_sync(
    gateway: Arc<Gateway>,
    state: &crate::state::SharedState,
    events: EventBus,
    messaging: Arc<Mutex<MessagingController>>,
    connections: Arc<Mutex<ConnectionsController>>,
) -> Result<SyncHandle> {
    let user = gateway.current_user_id()?;
    let (cmd_tx, event_rx) = spawn_realtime(gateway.config().realtime_url());

    {
        let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.realtime_cmd_tx = Some(cmd_tx.clone());
    }

    let listeners = [
        TableSubscription::inserts("messages", Some(format!("receiver_id=eq.{user}"))),
        // The change feed cannot filter "either column equals", so take
        // all connection events and narrow client-side.
        TableSubscription::all_events("connections", None),
    ];
    for listener in listeners {
        if cmd_tx
            .send(RealtimeCommand::Subscribe(listener))
            .await
            .is_err()
        {
            return Err(GatewayError::ChannelClosed.into());
        }
    }

    info!(user = %user, "realtime sync bridge started");

    let task = tokio::spawn(sync_loop(user, events, messaging, connections, event_rx));

    Ok(SyncHandle { cmd_tx, task })
}

/// Main loop: receives realtime notifications in delivery order and
/// dispatches them to the controllers.
async fn sync_loop(
    user: UserId,
    events: EventBus,
    messaging: Arc<Mutex<MessagingController>>,
    connections: Arc<Mutex<ConnectionsController>>,
    mut event_rx: mpsc::Receiver<RealtimeEvent>,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            RealtimeEvent::ChannelOpen => {
                debug!("realtime channel open, events trusted");
            }
            RealtimeEvent::ChannelClosed => {
                warn!("realtime channel dropped, waiting for rejoin");
            }
            RealtimeEvent::Change(change) => {
                handle_change(user, &events, &messaging, &connections, change).await;
            }
        }
    }

    info!("realtime sync bridge ended");
}

async fn handle_change(
    user: UserId,
    events: &EventBus,
    messaging: &Arc<Mutex<MessagingController>>,
    connections: &Arc<Mutex<ConnectionsController>>,
    change: ChangeEvent,
) {
    match change.table.as_str() {
        "messages" => {
            if change.kind != ChangeKind::Insert {
                return;
            }
            let Some(record) = change.record else {
                return;
            };
            let message: Message = match serde_json::from_value(record) {
                Ok(message) => message,
                Err(err) => {
                    warn!(error = %err, "undecodable message record in change event");
                    return;
                }
            };

            let mut messaging = messaging.lock().await;
            match route_message(user, messaging.active_partner, &message) {
                MessageRoute::Ignore => {}
                MessageRoute::AppendToThread => {
                    let partner = message.sender_id;
                    // Duplicate delivery of the same insert is a no-op.
                    if messaging.apply_incoming(message) {
                        events.emit(UiEvent::ThreadUpdated(ThreadUpdatedPayload {
                            partner_id: partner,
                        }));
                        if let Err(err) = messaging.mark_thread_read().await {
                            warn!(error = %err, "mark-as-read after realtime insert failed");
                        }
                    }
                }
                MessageRoute::RefreshSummaries => {
                    if let Err(err) = messaging.refresh_conversations().await {
                        warn!(error = %err, "conversation refresh after realtime insert failed");
                        return;
                    }
                    events.emit(UiEvent::ConversationsUpdated);
                }
            }
        }

        "connections" => {
            if !connection_concerns(user, &change) {
                return;
            }
            // Full refetch: the small cardinality makes it cheaper than
            // incremental reconciliation and avoids merge bugs.
            let mut connections = connections.lock().await;
            if let Err(err) = connections.refresh().await {
                warn!(error = %err, "connection refresh after realtime event failed");
                return;
            }
            events.emit(UiEvent::ConnectionsUpdated);
        }

        other => {
            debug!(table = %other, "change event for unhandled table");
        }
    }
}
