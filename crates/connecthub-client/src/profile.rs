//! Another user's profile page: profile + hobbies + counts + the
//! connection action buttons.
//!
//! A missing profile is a value (`not_found`), never an error; the
//! UI renders an explicit not-found view for it.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use connecthub_gateway::{cond_and, cond_eq, Gateway, QueryBuilder};
use connecthub_shared::{
    Connection, ConnectionId, ConnectionState, ConnectionStatus, Hobby, Profile, UserId,
};

use crate::connections::ConnectionStatusMap;
use crate::error::{ClientError, Result};
use crate::events::{EventBus, UiEvent};

/// The loaded profile plus its derived display fields.
#[derive(Debug, Clone)]
pub struct ProfileView {
    pub profile: Profile,
    pub hobbies: Vec<Hobby>,
    pub connection_count: u64,
    pub community_count: u64,
}

impl ProfileView {
    /// Hobbies grouped by category, categories in first-seen order.
    /// Uncategorised hobbies land under "Other".
    pub fn hobbies_by_category(&self) -> Vec<(String, Vec<&Hobby>)> {
        let mut groups: Vec<(String, Vec<&Hobby>)> = Vec::new();
        for hobby in &self.hobbies {
            let category = hobby.category.as_deref().unwrap_or("Other");
            match groups.iter_mut().find(|(name, _)| name == category) {
                Some((_, members)) => members.push(hobby),
                None => groups.push((category.to_string(), vec![hobby])),
            }
        }
        groups
    }
}

/// Owns one viewed profile.
pub struct ProfileController {
    gateway: Arc<Gateway>,
    events: EventBus,
    pub view: Option<ProfileView>,
    pub not_found: bool,
    pub is_own_profile: bool,
    /// Relationship between the viewer and this profile. Own profiles are
    /// an out-of-band case and never enter the status logic.
    pub connection_status: ConnectionStatus,
    pub connection_id: Option<ConnectionId>,
    action_pending: bool,
}

impl ProfileController {
    pub fn new(gateway: Arc<Gateway>, events: EventBus) -> Self {
        Self {
            gateway,
            events,
            view: None,
            not_found: false,
            is_own_profile: false,
            connection_status: ConnectionStatus::None,
            connection_id: None,
            action_pending: false,
        }
    }

    /// Load a profile with its hobbies, counts, and the viewer's
    /// relationship to it.
    pub async fn load(&mut self, profile_id: UserId) -> Result<()> {
        self.view = None;
        self.not_found = false;
        self.connection_status = ConnectionStatus::None;
        self.connection_id = None;

        let viewer = self.gateway.session().map(|s| s.user.id);
        self.is_own_profile = viewer == Some(profile_id);

        #[derive(Debug, Deserialize)]
        struct HobbyJoin {
            hobbies: Option<Hobby>,
        }

        let (profile, hobby_joins) = tokio::join!(
            self.gateway.select_maybe::<Profile>(
                "profiles",
                QueryBuilder::new().select("*").eq("id", profile_id),
            ),
            self.gateway.select::<HobbyJoin>(
                "user_hobbies",
                QueryBuilder::new()
                    .select("hobbies(*)")
                    .eq("user_id", profile_id),
            ),
        );

        let Some(profile) = profile? else {
            self.not_found = true;
            return Ok(());
        };
        let hobbies: Vec<Hobby> = hobby_joins?.into_iter().filter_map(|j| j.hobbies).collect();

        let (connection_count, community_count) = tokio::join!(
            self.gateway.count(
                "connections",
                QueryBuilder::new()
                    .or([
                        cond_eq("user1_id", profile_id),
                        cond_eq("user2_id", profile_id),
                    ])
                    .eq("status", "accepted"),
            ),
            self.gateway.count(
                "community_members",
                QueryBuilder::new().eq("user_id", profile_id),
            ),
        );

        self.view = Some(ProfileView {
            profile,
            hobbies,
            connection_count: connection_count?,
            community_count: community_count?,
        });

        if let Some(me) = viewer {
            if !self.is_own_profile {
                let row: Option<Connection> = self
                    .gateway
                    .select_maybe(
                        "connections",
                        QueryBuilder::new().select("*").or([
                            cond_and([
                                cond_eq("user1_id", me),
                                cond_eq("user2_id", profile_id),
                            ]),
                            cond_and([
                                cond_eq("user1_id", profile_id),
                                cond_eq("user2_id", me),
                            ]),
                        ]),
                    )
                    .await?;
                if let Some(row) = row {
                    self.connection_id = Some(row.id);
                    self.connection_status =
                        ConnectionStatusMap::build(me, &[row]).status_for(profile_id);
                }
            }
        }
        Ok(())
    }

    fn target(&self) -> Result<UserId> {
        self.view
            .as_ref()
            .map(|v| v.profile.id)
            .ok_or(ClientError::NotFound("profile"))
    }

    /// Send a connection request to the viewed profile.
    pub async fn connect(&mut self) -> Result<()> {
        let me = self.gateway.current_user_id()?;
        let target = self.target()?;
        if self.is_own_profile || !self.connection_status.can_send_request() {
            return Ok(());
        }
        if self.action_pending {
            return Ok(());
        }
        self.action_pending = true;
        self.connection_status = ConnectionStatus::PendingSent;

        let result: std::result::Result<Vec<Connection>, _> = self
            .gateway
            .insert(
                "connections",
                &serde_json::json!({
                    "user1_id": me,
                    "user2_id": target,
                    "status": ConnectionState::Pending,
                }),
            )
            .await;
        self.action_pending = false;

        match result {
            Ok(rows) => {
                self.connection_id = rows.into_iter().next().map(|r| r.id);
                self.events.emit(UiEvent::ConnectionsUpdated);
                Ok(())
            }
            Err(err) => {
                warn!(target = %target, error = %err, "sending connection request failed");
                self.connection_status = ConnectionStatus::None;
                self.events.toast_error("Could not send connection request");
                Err(err.into())
            }
        }
    }

    /// Accept the viewed profile's pending request. Only valid when the
    /// viewer is the recipient; otherwise a no-op plus a failure toast.
    pub async fn accept(&mut self) -> Result<()> {
        if !self.connection_status.can_accept() {
            self.events
                .toast_error("Only the recipient can accept this request");
            return Err(ClientError::PermissionDenied(
                "only the recipient of a pending request can accept it".into(),
            ));
        }
        let Some(connection_id) = self.connection_id else {
            return Err(ClientError::NotFound("connection"));
        };
        if self.action_pending {
            return Ok(());
        }
        self.action_pending = true;
        self.connection_status = ConnectionStatus::Accepted;

        let result = self
            .gateway
            .update(
                "connections",
                QueryBuilder::new().eq("id", connection_id),
                &serde_json::json!({ "status": "accepted" }),
            )
            .await;
        self.action_pending = false;

        match result {
            Ok(()) => {
                if let Some(view) = self.view.as_mut() {
                    view.connection_count += 1;
                }
                self.events.emit(UiEvent::ConnectionsUpdated);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "accepting connection failed");
                self.connection_status = ConnectionStatus::PendingReceived;
                self.events.toast_error("Could not accept connection request");
                Err(err.into())
            }
        }
    }

    /// Decline a pending request or remove an accepted connection.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(connection_id) = self.connection_id else {
            return Ok(());
        };
        if self.action_pending {
            return Ok(());
        }
        self.action_pending = true;

        let prior_status = self.connection_status;
        self.connection_status = ConnectionStatus::None;

        let result = self
            .gateway
            .delete("connections", QueryBuilder::new().eq("id", connection_id))
            .await;
        self.action_pending = false;

        match result {
            Ok(()) => {
                self.connection_id = None;
                if prior_status == ConnectionStatus::Accepted {
                    if let Some(view) = self.view.as_mut() {
                        view.connection_count = view.connection_count.saturating_sub(1);
                    }
                }
                self.events.emit(UiEvent::ConnectionsUpdated);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "removing connection failed");
                self.connection_status = prior_status;
                self.events.toast_error("Could not update connection");
                Err(err.into())
            }
        }
    }
}
