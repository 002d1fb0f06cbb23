//! Realtime change-feed channel with the tokio mpsc command/notification
//! pattern.
//!
//! The websocket runs in a dedicated tokio task. External code talks to it
//! through typed command and notification channels, keeping the transport
//! fully asynchronous and decoupled. The task owns the subscription
//! registry: after every reconnect it re-joins the channel with all
//! registered listeners, so consumers only need to trust events that
//! arrive after [`RealtimeEvent::ChannelOpen`].

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use connecthub_shared::constants::{REALTIME_HEARTBEAT_SECS, REALTIME_RECONNECT_SECS};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the realtime task.
#[derive(Debug)]
pub enum RealtimeCommand {
    /// Register a change listener. Takes effect immediately and survives
    /// reconnects.
    Subscribe(TableSubscription),
    /// Gracefully close the channel and end the task.
    Shutdown,
}

/// Notifications sent *from* the realtime task to the application.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// The channel joined (or re-joined after a reconnect) with all
    /// registered listeners in place. Events are trusted from this point.
    ChannelOpen,
    /// A row-level change on a subscribed table.
    Change(ChangeEvent),
    /// The connection dropped; the task will reconnect and re-join.
    ChannelClosed,
}

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A row-level change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    /// The new row (insert/update).
    pub record: Option<serde_json::Value>,
    /// The previous row (update/delete), when the backend sends it.
    pub old_record: Option<serde_json::Value>,
}

/// One (event type, table, optional column filter) listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSubscription {
    /// `None` subscribes to all event kinds on the table.
    pub kind: Option<ChangeKind>,
    pub table: String,
    /// Column filter in `column=eq.value` form.
    pub filter: Option<String>,
}

impl TableSubscription {
    /// Insert events only.
    pub fn inserts(table: &str, filter: Option<String>) -> Self {
        Self {
            kind: Some(ChangeKind::Insert),
            table: table.to_string(),
            filter,
        }
    }

    /// All event kinds.
    pub fn all_events(table: &str, filter: Option<String>) -> Self {
        Self {
            kind: None,
            table: table.to_string(),
            filter,
        }
    }

    fn event_str(&self) -> &'static str {
        match self.kind {
            Some(ChangeKind::Insert) => "INSERT",
            Some(ChangeKind::Update) => "UPDATE",
            Some(ChangeKind::Delete) => "DELETE",
            None => "*",
        }
    }

    fn to_config(&self) -> serde_json::Value {
        let mut config = serde_json::json!({
            "event": self.event_str(),
            "schema": "public",
            "table": self.table,
        });
        if let Some(ref filter) = self.filter {
            config["filter"] = serde_json::Value::String(filter.clone());
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Wire frames
// ---------------------------------------------------------------------------

const TOPIC_CHANGES: &str = "realtime:public";
const TOPIC_HEARTBEAT: &str = "phoenix";
const EVENT_JOIN: &str = "phx_join";
const EVENT_REPLY: &str = "phx_reply";
const EVENT_HEARTBEAT: &str = "heartbeat";
const EVENT_CHANGES: &str = "postgres_changes";

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    payload: serde_json::Value,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
}

fn join_frame(subscriptions: &[TableSubscription], reference: u64) -> Frame {
    let configs: Vec<serde_json::Value> = subscriptions.iter().map(|s| s.to_config()).collect();
    Frame {
        topic: TOPIC_CHANGES.to_string(),
        event: EVENT_JOIN.to_string(),
        payload: serde_json::json!({ "config": { "postgres_changes": configs } }),
        reference: Some(reference.to_string()),
    }
}

fn heartbeat_frame(reference: u64) -> Frame {
    Frame {
        topic: TOPIC_HEARTBEAT.to_string(),
        event: EVENT_HEARTBEAT.to_string(),
        payload: serde_json::json!({}),
        reference: Some(reference.to_string()),
    }
}

/// Extract a [`ChangeEvent`] from a `postgres_changes` frame payload.
fn parse_change(payload: &serde_json::Value) -> Option<ChangeEvent> {
    let data = payload.get("data")?;
    let kind = ChangeKind::from_wire(data.get("type")?.as_str()?)?;
    let table = data.get("table")?.as_str()?.to_string();

    let non_null = |v: Option<&serde_json::Value>| {
        v.filter(|v| !v.is_null()).cloned()
    };

    Some(ChangeEvent {
        kind,
        table,
        record: non_null(data.get("record")),
        old_record: non_null(data.get("old_record")),
    })
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Spawn the realtime channel in a background tokio task.
///
/// Returns channels for sending commands and receiving notifications.
/// Dropping the notification receiver ends the task.
pub fn spawn_realtime(url: String) -> (mpsc::Sender<RealtimeCommand>, mpsc::Receiver<RealtimeEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(256);

    tokio::spawn(run_channel(url, cmd_rx, event_tx));

    (cmd_tx, event_rx)
}

async fn run_channel(
    url: String,
    mut cmd_rx: mpsc::Receiver<RealtimeCommand>,
    event_tx: mpsc::Sender<RealtimeEvent>,
) {
    let mut subscriptions: Vec<TableSubscription> = Vec::new();
    let mut next_ref: u64 = 0;

    info!("realtime channel task started");

    'outer: loop {
        let mut ws = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _resp)) => ws,
            Err(e) => {
                warn!(error = %e, "realtime connect failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(REALTIME_RECONNECT_SECS)) => {
                        continue 'outer;
                    }
                    cmd = cmd_rx.recv() => match cmd {
                        Some(RealtimeCommand::Subscribe(sub)) => {
                            register(&mut subscriptions, sub);
                            continue 'outer;
                        }
                        Some(RealtimeCommand::Shutdown) | None => break 'outer,
                    }
                }
            }
        };

        next_ref += 1;
        if send_frame(&mut ws, &join_frame(&subscriptions, next_ref))
            .await
            .is_err()
        {
            tokio::time::sleep(Duration::from_secs(REALTIME_RECONNECT_SECS)).await;
            continue 'outer;
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(REALTIME_HEARTBEAT_SECS));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat.reset();

        let mut opened = false;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(RealtimeCommand::Subscribe(sub)) => {
                        if register(&mut subscriptions, sub) {
                            next_ref += 1;
                            if send_frame(&mut ws, &join_frame(&subscriptions, next_ref))
                                .await
                                .is_err()
                            {
                                let _ = event_tx.send(RealtimeEvent::ChannelClosed).await;
                                break;
                            }
                        }
                    }
                    Some(RealtimeCommand::Shutdown) | None => {
                        let _ = ws.close(None).await;
                        info!("realtime channel shut down");
                        break 'outer;
                    }
                },

                _ = heartbeat.tick() => {
                    next_ref += 1;
                    if send_frame(&mut ws, &heartbeat_frame(next_ref)).await.is_err() {
                        let _ = event_tx.send(RealtimeEvent::ChannelClosed).await;
                        break;
                    }
                },

                msg = ws.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let frame: Frame = match serde_json::from_str(&text) {
                            Ok(f) => f,
                            Err(e) => {
                                debug!(error = %e, "unparseable realtime frame");
                                continue;
                            }
                        };

                        if frame.event == EVENT_REPLY && frame.topic == TOPIC_CHANGES {
                            if !opened {
                                opened = true;
                                if event_tx.send(RealtimeEvent::ChannelOpen).await.is_err() {
                                    break 'outer;
                                }
                            }
                        } else if frame.event == EVENT_CHANGES {
                            match parse_change(&frame.payload) {
                                Some(change) => {
                                    debug!(
                                        table = %change.table,
                                        kind = ?change.kind,
                                        "change event received"
                                    );
                                    if event_tx.send(RealtimeEvent::Change(change)).await.is_err() {
                                        break 'outer;
                                    }
                                }
                                None => debug!("change frame without usable payload"),
                            }
                        } else {
                            debug!(event = %frame.event, "ignoring realtime frame");
                        }
                    }
                    Some(Ok(WsMessage::Ping(_)))
                    | Some(Ok(WsMessage::Pong(_)))
                    | Some(Ok(WsMessage::Binary(_)))
                    | Some(Ok(WsMessage::Frame(_))) => {}
                    Some(Ok(WsMessage::Close(_))) | None => {
                        warn!("realtime connection closed by server");
                        let _ = event_tx.send(RealtimeEvent::ChannelClosed).await;
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "realtime read error");
                        let _ = event_tx.send(RealtimeEvent::ChannelClosed).await;
                        break;
                    }
                }
            }
        }

        // Connection lost: back off, then reconnect and re-join with the
        // full subscription registry.
        tokio::time::sleep(Duration::from_secs(REALTIME_RECONNECT_SECS)).await;
    }

    info!("realtime channel task ended");
}

/// Add a subscription to the registry unless an identical one exists.
fn register(subscriptions: &mut Vec<TableSubscription>, sub: TableSubscription) -> bool {
    if subscriptions.contains(&sub) {
        return false;
    }
    subscriptions.push(sub);
    true
}

async fn send_frame(
    ws: &mut WsStream,
    frame: &Frame,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to encode realtime frame");
            return Ok(());
        }
    };
    ws.send(WsMessage::Text(text)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frame_carries_all_listeners() {
        let subs = vec![
            TableSubscription::inserts("messages", Some("receiver_id=eq.u1".into())),
            TableSubscription::all_events("connections", None),
        ];
        let frame = join_frame(&subs, 7);

        assert_eq!(frame.topic, TOPIC_CHANGES);
        assert_eq!(frame.event, EVENT_JOIN);
        assert_eq!(frame.reference.as_deref(), Some("7"));

        let configs = frame.payload["config"]["postgres_changes"]
            .as_array()
            .unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0]["event"], "INSERT");
        assert_eq!(configs[0]["filter"], "receiver_id=eq.u1");
        assert_eq!(configs[1]["event"], "*");
        assert!(configs[1].get("filter").is_none());
    }

    #[test]
    fn parse_change_extracts_record() {
        let payload = serde_json::json!({
            "data": {
                "type": "INSERT",
                "table": "messages",
                "record": { "id": "m1", "content": "hello" },
                "old_record": null
            }
        });
        let change = parse_change(&payload).unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.table, "messages");
        assert_eq!(change.record.unwrap()["content"], "hello");
        assert!(change.old_record.is_none());
    }

    #[test]
    fn parse_change_rejects_unknown_type() {
        let payload = serde_json::json!({
            "data": { "type": "TRUNCATE", "table": "messages" }
        });
        assert!(parse_change(&payload).is_none());
    }

    #[test]
    fn register_dedups_identical_listeners() {
        let mut subs = Vec::new();
        let sub = TableSubscription::inserts("messages", None);
        assert!(register(&mut subs, sub.clone()));
        assert!(!register(&mut subs, sub));
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn frame_roundtrip() {
        let frame = heartbeat_frame(3);
        let text = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&text).unwrap();
        assert_eq!(back.topic, TOPIC_HEARTBEAT);
        assert_eq!(back.event, EVENT_HEARTBEAT);
        assert_eq!(back.reference.as_deref(), Some("3"));
    }
}
