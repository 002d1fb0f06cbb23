//! Connection-status reconciliation and connection actions.
//!
//! A [`ConnectionStatusMap`] is built in one O(n) pass over the user's
//! connection rows and answers "what is my relationship with profile X"
//! in O(1). The [`ConnectionsController`] layers the accepted/pending
//! lists and the send/accept/decline/remove actions on top of it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use connecthub_gateway::{cond_eq, Gateway, QueryBuilder};
use connecthub_shared::{
    Connection, ConnectionId, ConnectionState, ConnectionStatus, Profile, UserId,
};

use crate::error::{ClientError, Result};
use crate::events::{EventBus, UiEvent};
use crate::optimistic::InFlight;

// ---------------------------------------------------------------------------
// Status map
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatusEntry {
    status: ConnectionStatus,
    connection_id: ConnectionId,
    created_at_nanos: i64,
}

/// O(1) relationship lookup for any other profile, derived from the
/// current user's connection rows. A pure function of its input:
/// reconciling the same row set twice yields an identical map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatusMap {
    entries: HashMap<UserId, StatusEntry>,
}

impl ConnectionStatusMap {
    /// Build the map from a set of connection rows.
    ///
    /// Rows not involving `current_user` are skipped, as are
    /// self-referencing rows. If the store holds more than one row for a
    /// pair (should not happen given the uniqueness invariant, but it is
    /// not enforced at this layer), the most recently created row wins,
    /// with the row id as tiebreak, and the anomaly is logged.
    pub fn build(current_user: UserId, rows: &[Connection]) -> Self {
        let mut entries: HashMap<UserId, StatusEntry> = HashMap::new();

        for row in rows {
            if row.user1_id == row.user2_id {
                warn!(row = %row.id, "self-referencing connection row ignored");
                continue;
            }
            let Some(other) = row.other_party(current_user) else {
                continue;
            };

            let status = match row.status {
                ConnectionState::Accepted => ConnectionStatus::Accepted,
                ConnectionState::Pending if row.user1_id == current_user => {
                    ConnectionStatus::PendingSent
                }
                ConnectionState::Pending => ConnectionStatus::PendingReceived,
            };
            let candidate = StatusEntry {
                status,
                connection_id: row.id,
                created_at_nanos: row
                    .created_at
                    .timestamp_nanos_opt()
                    .unwrap_or(row.created_at.timestamp()),
            };

            match entries.entry(other) {
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                Entry::Occupied(mut slot) => {
                    warn!(
                        other = %other,
                        kept = %slot.get().connection_id,
                        dropped = %row.id,
                        "duplicate connection rows for one pair"
                    );
                    let current = *slot.get();
                    let newer = (candidate.created_at_nanos, candidate.connection_id.0)
                        > (current.created_at_nanos, current.connection_id.0);
                    if newer {
                        slot.insert(candidate);
                    }
                }
            }
        }

        Self { entries }
    }

    /// The reconciled status with `other`; `None` when no row exists.
    pub fn status_for(&self, other: UserId) -> ConnectionStatus {
        self.entries
            .get(&other)
            .map(|e| e.status)
            .unwrap_or(ConnectionStatus::None)
    }

    pub fn connection_id_for(&self, other: UserId) -> Option<ConnectionId> {
        self.entries.get(&other).map(|e| e.connection_id)
    }

    /// Optimistic local transition. `created_at` keeps the duplicate
    /// tiebreak stable across a later rebuild.
    pub fn set(
        &mut self,
        other: UserId,
        status: ConnectionStatus,
        connection_id: ConnectionId,
        created_at: DateTime<Utc>,
    ) {
        self.entries.insert(
            other,
            StatusEntry {
                status,
                connection_id,
                created_at_nanos: created_at
                    .timestamp_nanos_opt()
                    .unwrap_or(created_at.timestamp()),
            },
        );
    }

    /// Optimistic local removal (decline / disconnect).
    pub fn remove(&mut self, other: UserId) {
        self.entries.remove(&other);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// A connection row joined with the other party's profile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEntry {
    pub connection: Connection,
    pub partner: Profile,
}

#[derive(Debug, Clone, Serialize)]
struct NewConnection {
    user1_id: UserId,
    user2_id: UserId,
    status: ConnectionState,
}

/// Owns the accepted/pending lists shown on the connections surface.
pub struct ConnectionsController {
    gateway: Arc<Gateway>,
    events: EventBus,
    pub accepted: Vec<ConnectionEntry>,
    pub pending_received: Vec<ConnectionEntry>,
    pub pending_sent: Vec<ConnectionEntry>,
    pub status: ConnectionStatusMap,
    in_flight: InFlight<UserId>,
}

impl ConnectionsController {
    pub fn new(gateway: Arc<Gateway>, events: EventBus) -> Self {
        Self {
            gateway,
            events,
            accepted: Vec::new(),
            pending_received: Vec::new(),
            pending_sent: Vec::new(),
            status: ConnectionStatusMap::default(),
            in_flight: InFlight::new(),
        }
    }

    /// Full refetch of rows + partner profiles. Small expected
    /// cardinality makes this cheaper than incremental reconciliation.
    pub async fn refresh(&mut self) -> Result<()> {
        let me = self.gateway.current_user_id()?;

        let rows: Vec<Connection> = self
            .gateway
            .select(
                "connections",
                QueryBuilder::new()
                    .select("*")
                    .or([cond_eq("user1_id", me), cond_eq("user2_id", me)]),
            )
            .await?;

        let status = ConnectionStatusMap::build(me, &rows);

        let partner_ids: Vec<UserId> = rows.iter().filter_map(|r| r.other_party(me)).collect();
        let profiles: Vec<Profile> = if partner_ids.is_empty() {
            Vec::new()
        } else {
            self.gateway
                .select(
                    "profiles",
                    QueryBuilder::new()
                        .select("*")
                        .in_list("id", partner_ids.iter().copied()),
                )
                .await?
        };
        let profiles_by_id: HashMap<UserId, Profile> =
            profiles.into_iter().map(|p| (p.id, p)).collect();

        self.accepted.clear();
        self.pending_received.clear();
        self.pending_sent.clear();

        for row in rows {
            let Some(other) = row.other_party(me) else {
                continue;
            };
            // Only the winning row of a duplicated pair gets a list entry.
            if status.connection_id_for(other) != Some(row.id) {
                continue;
            }
            let Some(partner) = profiles_by_id.get(&other).cloned() else {
                continue;
            };
            let entry = ConnectionEntry {
                connection: row,
                partner,
            };
            match status.status_for(other) {
                ConnectionStatus::Accepted => self.accepted.push(entry),
                ConnectionStatus::PendingReceived => self.pending_received.push(entry),
                ConnectionStatus::PendingSent => self.pending_sent.push(entry),
                ConnectionStatus::None => {}
            }
        }

        self.status = status;
        Ok(())
    }

    /// Send a connection request: `none` -> `pending_sent` immediately,
    /// reverted if the insert fails.
    pub async fn send_request(&mut self, target: UserId) -> Result<()> {
        let me = self.gateway.current_user_id()?;
        if target == me {
            return Err(ClientError::PermissionDenied(
                "cannot send a connection request to yourself".into(),
            ));
        }
        if !self.status.status_for(target).can_send_request() {
            return Ok(());
        }
        if !self.in_flight.try_begin(target) {
            return Ok(());
        }

        let placeholder = ConnectionId::new();
        self.status
            .set(target, ConnectionStatus::PendingSent, placeholder, Utc::now());

        let result: std::result::Result<Vec<Connection>, _> = self
            .gateway
            .insert(
                "connections",
                &NewConnection {
                    user1_id: me,
                    user2_id: target,
                    status: ConnectionState::Pending,
                },
            )
            .await;
        self.in_flight.finish(&target);

        match result {
            Ok(rows) => {
                if let Some(row) = rows.into_iter().next() {
                    self.status.set(
                        target,
                        ConnectionStatus::PendingSent,
                        row.id,
                        row.created_at,
                    );
                }
                self.events.emit(UiEvent::ConnectionsUpdated);
                Ok(())
            }
            Err(err) => {
                warn!(target = %target, error = %err, "sending connection request failed");
                self.status.remove(target);
                self.events.toast_error("Could not send connection request");
                Err(err.into())
            }
        }
    }

    /// Accept a pending request. Only the recipient may accept: anything
    /// else is a no-op plus a failure toast.
    pub async fn accept(&mut self, other: UserId) -> Result<()> {
        if !self.status.status_for(other).can_accept() {
            self.events
                .toast_error("Only the recipient can accept this request");
            return Err(ClientError::PermissionDenied(
                "only the recipient of a pending request can accept it".into(),
            ));
        }
        let Some(connection_id) = self.status.connection_id_for(other) else {
            return Err(ClientError::NotFound("connection"));
        };
        if !self.in_flight.try_begin(other) {
            return Ok(());
        }

        // Capture for exact restore on failure.
        let prior_status = self.status.clone();
        let prior_accepted = self.accepted.clone();
        let prior_pending = self.pending_received.clone();

        self.status
            .set(other, ConnectionStatus::Accepted, connection_id, Utc::now());
        if let Some(pos) = self
            .pending_received
            .iter()
            .position(|e| e.connection.id == connection_id)
        {
            let mut entry = self.pending_received.remove(pos);
            entry.connection.status = ConnectionState::Accepted;
            self.accepted.push(entry);
        }

        let result = self
            .gateway
            .update(
                "connections",
                QueryBuilder::new().eq("id", connection_id),
                &serde_json::json!({ "status": "accepted" }),
            )
            .await;
        self.in_flight.finish(&other);

        match result {
            Ok(()) => {
                self.events.emit(UiEvent::ConnectionsUpdated);
                Ok(())
            }
            Err(err) => {
                warn!(other = %other, error = %err, "accepting connection failed");
                self.status = prior_status;
                self.accepted = prior_accepted;
                self.pending_received = prior_pending;
                self.events.toast_error("Could not accept connection request");
                Err(err.into())
            }
        }
    }

    /// Decline a received request, cancel a sent one, or remove an
    /// accepted connection. All of these delete the row.
    pub async fn disconnect(&mut self, other: UserId) -> Result<()> {
        let Some(connection_id) = self.status.connection_id_for(other) else {
            return Ok(());
        };
        if !self.in_flight.try_begin(other) {
            return Ok(());
        }

        let prior_status = self.status.clone();
        let prior_accepted = self.accepted.clone();
        let prior_received = self.pending_received.clone();
        let prior_sent = self.pending_sent.clone();

        self.status.remove(other);
        let drop_entry = |list: &mut Vec<ConnectionEntry>| {
            list.retain(|e| e.connection.id != connection_id);
        };
        drop_entry(&mut self.accepted);
        drop_entry(&mut self.pending_received);
        drop_entry(&mut self.pending_sent);

        let result = self
            .gateway
            .delete("connections", QueryBuilder::new().eq("id", connection_id))
            .await;
        self.in_flight.finish(&other);

        match result {
            Ok(()) => {
                self.events.emit(UiEvent::ConnectionsUpdated);
                Ok(())
            }
            Err(err) => {
                warn!(other = %other, error = %err, "removing connection failed");
                self.status = prior_status;
                self.accepted = prior_accepted;
                self.pending_received = prior_received;
                self.pending_sent = prior_sent;
                self.events.toast_error("Could not update connection");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use connecthub_gateway::{AuthUser, GatewayConfig, Session};

    fn conn(
        user1: UserId,
        user2: UserId,
        status: ConnectionState,
        secs: i64,
    ) -> Connection {
        Connection {
            id: ConnectionId::new(),
            user1_id: user1,
            user2_id: user2,
            status,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn pending_direction_depends_on_requester() {
        let u = UserId::new();
        let v = UserId::new();
        let rows = vec![conn(u, v, ConnectionState::Pending, 0)];

        let from_u = ConnectionStatusMap::build(u, &rows);
        let from_v = ConnectionStatusMap::build(v, &rows);

        assert_eq!(from_u.status_for(v), ConnectionStatus::PendingSent);
        assert_eq!(from_v.status_for(u), ConnectionStatus::PendingReceived);
    }

    #[test]
    fn accepted_is_symmetric() {
        let u = UserId::new();
        let v = UserId::new();
        let rows = vec![conn(v, u, ConnectionState::Accepted, 0)];

        assert_eq!(
            ConnectionStatusMap::build(u, &rows).status_for(v),
            ConnectionStatus::Accepted
        );
        assert_eq!(
            ConnectionStatusMap::build(v, &rows).status_for(u),
            ConnectionStatus::Accepted
        );
    }

    #[test]
    fn exactly_one_status_per_party() {
        let me = UserId::new();
        let a = UserId::new();
        let b = UserId::new();
        let stranger1 = UserId::new();
        let stranger2 = UserId::new();
        let rows = vec![
            conn(me, a, ConnectionState::Pending, 0),
            conn(b, me, ConnectionState::Accepted, 1),
            // not mine, must be skipped
            conn(stranger1, stranger2, ConnectionState::Accepted, 2),
        ];

        let map = ConnectionStatusMap::build(me, &rows);
        assert_eq!(map.len(), 2);
        assert_eq!(map.status_for(a), ConnectionStatus::PendingSent);
        assert_eq!(map.status_for(b), ConnectionStatus::Accepted);
        assert_eq!(map.status_for(stranger1), ConnectionStatus::None);
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let me = UserId::new();
        let a = UserId::new();
        let b = UserId::new();
        let rows = vec![
            conn(me, a, ConnectionState::Pending, 0),
            conn(b, me, ConnectionState::Accepted, 5),
        ];
        assert_eq!(
            ConnectionStatusMap::build(me, &rows),
            ConnectionStatusMap::build(me, &rows)
        );
    }

    #[test]
    fn duplicate_pair_picks_most_recent_row() {
        let me = UserId::new();
        let v = UserId::new();
        let older = conn(me, v, ConnectionState::Pending, 0);
        let newer = conn(v, me, ConnectionState::Pending, 10);

        // Same result whichever order the store returns the rows in.
        let map1 = ConnectionStatusMap::build(me, &[older.clone(), newer.clone()]);
        let map2 = ConnectionStatusMap::build(me, &[newer.clone(), older.clone()]);

        assert_eq!(map1.connection_id_for(v), Some(newer.id));
        assert_eq!(map1.status_for(v), ConnectionStatus::PendingReceived);
        assert_eq!(map1, map2);
    }

    #[test]
    fn self_rows_never_enter_the_map() {
        let me = UserId::new();
        let rows = vec![conn(me, me, ConnectionState::Accepted, 0)];
        assert!(ConnectionStatusMap::build(me, &rows).is_empty());
    }

    #[test]
    fn send_request_transition_is_visible_from_both_sides() {
        // Scenario: U has no connections, sends a request to V.
        let u = UserId::new();
        let v = UserId::new();
        let mut map = ConnectionStatusMap::build(u, &[]);
        assert_eq!(map.status_for(v), ConnectionStatus::None);

        let row = conn(u, v, ConnectionState::Pending, 0);
        map.set(v, ConnectionStatus::PendingSent, row.id, row.created_at);
        assert_eq!(map.status_for(v), ConnectionStatus::PendingSent);

        // V sees the mirrored state once the row reaches them.
        let from_v = ConnectionStatusMap::build(v, &[row]);
        assert_eq!(from_v.status_for(u), ConnectionStatus::PendingReceived);
    }

    // -- controller ---------------------------------------------------------

    fn session_for(user: UserId) -> Session {
        Session {
            access_token: "token".into(),
            refresh_token: None,
            user: AuthUser {
                id: user,
                email: None,
            },
        }
    }

    fn controller_with_session(
        base_url: String,
        me: UserId,
    ) -> (
        ConnectionsController,
        tokio::sync::mpsc::UnboundedReceiver<UiEvent>,
    ) {
        let gateway = Gateway::new(GatewayConfig {
            base_url,
            ..GatewayConfig::default()
        })
        .unwrap();
        gateway.restore_session(session_for(me));
        let (events, rx) = EventBus::new();
        (ConnectionsController::new(Arc::new(gateway), events), rx)
    }

    #[tokio::test]
    async fn accept_is_a_no_op_for_the_sender() {
        let me = UserId::new();
        let v = UserId::new();
        // No HTTP expectations: the permission check must fail before any
        // request is issued.
        let (mut controller, _rx) =
            controller_with_session("http://127.0.0.1:9".into(), me);

        let row = conn(me, v, ConnectionState::Pending, 0);
        controller.status = ConnectionStatusMap::build(me, &[row]);

        let err = controller.accept(v).await.unwrap_err();
        assert!(matches!(err, ClientError::PermissionDenied(_)));
        assert_eq!(controller.status.status_for(v), ConnectionStatus::PendingSent);
    }

    #[tokio::test]
    async fn accepting_moves_the_entry_and_updates_both_lists() {
        // Scenario: V accepts U's pending request.
        let mut server = mockito::Server::new_async().await;
        let me = UserId::new(); // V
        let u = UserId::new();
        let connection_id = uuid::Uuid::new_v4();

        server
            .mock("GET", "/rest/v1/connections")
            .match_query(mockito::Matcher::Any)
            .with_body(format!(
                r#"[{{"id":"{connection_id}","user1_id":"{u}","user2_id":"{me}",
                     "status":"pending","created_at":"2024-05-01T10:00:00Z"}}]"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(mockito::Matcher::Any)
            .with_body(format!(r#"[{{"id":"{u}","username":"u-man"}}]"#))
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/rest/v1/connections")
            .match_query(mockito::Matcher::UrlEncoded(
                "id".into(),
                format!("eq.{connection_id}"),
            ))
            .with_status(204)
            .create_async()
            .await;

        let (mut controller, _rx) = controller_with_session(server.url(), me);
        controller.refresh().await.unwrap();
        assert_eq!(controller.pending_received.len(), 1);
        assert!(controller.accepted.is_empty());

        controller.accept(u).await.unwrap();
        patch.assert_async().await;

        assert!(controller.pending_received.is_empty());
        assert_eq!(controller.accepted.len(), 1);
        assert_eq!(controller.accepted[0].partner.id, u);
        assert_eq!(controller.status.status_for(u), ConnectionStatus::Accepted);
    }

    #[tokio::test]
    async fn failed_send_request_reverts_to_none() {
        let mut server = mockito::Server::new_async().await;
        let me = UserId::new();
        let v = UserId::new();
        server
            .mock("POST", "/rest/v1/connections")
            .with_status(500)
            .with_body(r#"{"message":"boom"}"#)
            .create_async()
            .await;

        let (mut controller, _rx) = controller_with_session(server.url(), me);
        assert!(controller.send_request(v).await.is_err());
        assert_eq!(controller.status.status_for(v), ConnectionStatus::None);
    }
}
