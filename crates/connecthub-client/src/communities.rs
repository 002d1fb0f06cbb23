//! Community browsing, membership, and the member list.
//!
//! `member_count` is a denormalised counter maintained by optimistic
//! increments with rollback; it is never recomputed from the join table
//! client-side.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use connecthub_gateway::{cond_and, cond_eq, cond_in, Gateway, Order, QueryBuilder};
use connecthub_shared::validate::validate_community_name;
use connecthub_shared::{
    Community, CommunityId, Connection, ConnectionState, ConnectionStatus, MemberRole, Profile,
    UserId,
};

use crate::connections::ConnectionStatusMap;
use crate::error::{ClientError, Result};
use crate::events::{EventBus, UiEvent};
use crate::optimistic::{with_rollback, InFlight};

// ---------------------------------------------------------------------------
// Composed view types
// ---------------------------------------------------------------------------

/// Admin set of a community. Non-empty by construction: the owner is
/// always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admins {
    owner: UserId,
    others: Vec<UserId>,
}

impl Admins {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            others: Vec::new(),
        }
    }

    pub fn add(&mut self, user: UserId) {
        if user != self.owner && !self.others.contains(&user) {
            self.others.push(user);
        }
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.owner == user || self.others.contains(&user)
    }

    /// Always at least one entry.
    pub fn all(&self) -> Vec<UserId> {
        let mut all = Vec::with_capacity(1 + self.others.len());
        all.push(self.owner);
        all.extend(self.others.iter().copied());
        all
    }
}

/// A community plus the fields derived for the detail view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityView {
    pub community: Community,
    pub is_member: bool,
    pub admins: Admins,
}

impl CommunityView {
    pub fn new(community: Community, is_member: bool) -> Self {
        let admins = Admins::new(community.created_by);
        Self {
            community,
            is_member,
            admins,
        }
    }
}

/// A community row in the browse list, merged with the current user's
/// membership.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityWithMembership {
    pub community: Community,
    pub is_member: bool,
}

#[derive(Debug, Clone, Serialize)]
struct NewMember {
    community_id: CommunityId,
    user_id: UserId,
    role: MemberRole,
}

// ---------------------------------------------------------------------------
// Browse list controller
// ---------------------------------------------------------------------------

pub struct CommunitiesController {
    gateway: Arc<Gateway>,
    events: EventBus,
    pub communities: Vec<CommunityWithMembership>,
    in_flight: InFlight<CommunityId>,
}

impl CommunitiesController {
    pub fn new(gateway: Arc<Gateway>, events: EventBus) -> Self {
        Self {
            gateway,
            events,
            communities: Vec::new(),
            in_flight: InFlight::new(),
        }
    }

    /// Fetch all communities and the user's memberships concurrently and
    /// merge them.
    pub async fn refresh(&mut self) -> Result<()> {
        let me = self.gateway.current_user_id()?;

        #[derive(Debug, Deserialize)]
        struct MembershipRow {
            community_id: CommunityId,
        }

        let (communities, memberships) = tokio::join!(
            self.gateway
                .select::<Community>("communities", QueryBuilder::new().select("*")),
            self.gateway.select::<MembershipRow>(
                "community_members",
                QueryBuilder::new()
                    .select("community_id")
                    .eq("user_id", me),
            ),
        );

        let member_of: std::collections::HashSet<CommunityId> =
            memberships?.into_iter().map(|m| m.community_id).collect();

        self.communities = communities?
            .into_iter()
            .map(|community| CommunityWithMembership {
                is_member: member_of.contains(&community.id),
                community,
            })
            .collect();
        Ok(())
    }

    pub fn mine(&self) -> Vec<&CommunityWithMembership> {
        self.communities.iter().filter(|c| c.is_member).collect()
    }

    pub fn discoverable(&self) -> Vec<&CommunityWithMembership> {
        self.communities.iter().filter(|c| !c.is_member).collect()
    }

    /// Search on name/description plus an optional category filter.
    pub fn filtered<'a>(
        &self,
        source: Vec<&'a CommunityWithMembership>,
        search: &str,
        category: Option<&str>,
    ) -> Vec<&'a CommunityWithMembership> {
        let query = search.to_lowercase();
        source
            .into_iter()
            .filter(|c| {
                let matches_search = query.is_empty()
                    || c.community.name.to_lowercase().contains(&query)
                    || c.community
                        .description
                        .as_deref()
                        .unwrap_or("")
                        .to_lowercase()
                        .contains(&query);
                let matches_category = match category {
                    None => true,
                    Some(cat) => c.community.category.as_deref() == Some(cat),
                };
                matches_search && matches_category
            })
            .collect()
    }

    /// Create a community; the creator becomes a member with role=admin.
    pub async fn create(
        &mut self,
        name: &str,
        description: &str,
        category: &str,
    ) -> Result<CommunityId> {
        validate_community_name(name)?;
        let me = self.gateway.current_user_id()?;

        let rows: Vec<Community> = self
            .gateway
            .insert(
                "communities",
                &serde_json::json!({
                    "name": name,
                    "description": description,
                    "category": category,
                    "created_by": me,
                }),
            )
            .await?;
        let community = rows
            .into_iter()
            .next()
            .ok_or(ClientError::NotFound("community"))?;

        self.gateway
            .insert_only(
                "community_members",
                &NewMember {
                    community_id: community.id,
                    user_id: me,
                    role: MemberRole::Admin,
                },
            )
            .await?;

        // No refetch needed, the new community goes straight into the list.
        self.communities.insert(
            0,
            CommunityWithMembership {
                community: community.clone(),
                is_member: true,
            },
        );
        Ok(community.id)
    }

    /// Join: membership and counter change immediately, reverted exactly
    /// if the insert fails.
    pub async fn join(&mut self, community_id: CommunityId) -> Result<()> {
        let me = self.gateway.current_user_id()?;
        let Some(pos) = self
            .communities
            .iter()
            .position(|c| c.community.id == community_id)
        else {
            return Err(ClientError::NotFound("community"));
        };
        if self.communities[pos].is_member {
            return Ok(());
        }
        if !self.in_flight.try_begin(community_id) {
            return Ok(());
        }

        let payload = NewMember {
            community_id,
            user_id: me,
            role: MemberRole::Member,
        };
        let mutation = self.gateway.insert_only("community_members", &payload);
        let result = with_rollback(
            &mut self.communities[pos],
            |c| {
                c.is_member = true;
                c.community.member_count += 1;
            },
            mutation,
        )
        .await;
        self.in_flight.finish(&community_id);

        if let Err(err) = result {
            warn!(community = %community_id, error = %err, "joining community failed");
            self.events.toast_error("Could not join community");
            return Err(err.into());
        }
        Ok(())
    }

    /// Leave: the counter clamps at zero.
    pub async fn leave(&mut self, community_id: CommunityId) -> Result<()> {
        let me = self.gateway.current_user_id()?;
        let Some(pos) = self
            .communities
            .iter()
            .position(|c| c.community.id == community_id)
        else {
            return Err(ClientError::NotFound("community"));
        };
        if !self.communities[pos].is_member {
            return Ok(());
        }
        if !self.in_flight.try_begin(community_id) {
            return Ok(());
        }

        let mutation = self.gateway.delete(
            "community_members",
            QueryBuilder::new()
                .eq("community_id", community_id)
                .eq("user_id", me),
        );
        let result = with_rollback(
            &mut self.communities[pos],
            |c| {
                c.is_member = false;
                c.community.member_count = (c.community.member_count - 1).max(0);
            },
            mutation,
        )
        .await;
        self.in_flight.finish(&community_id);

        if let Err(err) = result {
            warn!(community = %community_id, error = %err, "leaving community failed");
            self.events.toast_error("Could not leave community");
            return Err(err.into());
        }
        Ok(())
    }
}

/// Load a community detail view. Not-found is a value, not an error.
pub async fn load_community(
    gateway: &Gateway,
    community_id: CommunityId,
) -> Result<Option<CommunityView>> {
    let me = gateway.session().map(|s| s.user.id);

    let membership_query = me.map(|me| {
        QueryBuilder::new()
            .select("user_id")
            .eq("community_id", community_id)
            .eq("user_id", me)
    });

    let (community, membership) = tokio::join!(
        gateway.select_maybe::<Community>(
            "communities",
            QueryBuilder::new().select("*").eq("id", community_id),
        ),
        async {
            match membership_query {
                Some(query) => gateway
                    .select_maybe::<serde_json::Value>("community_members", query)
                    .await,
                None => Ok(None),
            }
        },
    );

    let Some(community) = community? else {
        return Ok(None);
    };
    Ok(Some(CommunityView::new(community, membership?.is_some())))
}

// ---------------------------------------------------------------------------
// Member list
// ---------------------------------------------------------------------------

/// One row of the member list, merged with the viewer's relationship.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub profile: Profile,
    pub role: MemberRole,
    pub joined_at: Option<DateTime<Utc>>,
    /// The real reconciled relationship; `None` for the viewer's own row.
    pub relation: ConnectionStatus,
    pub is_self: bool,
}

impl MemberView {
    /// What the row's connection button shows. The viewer's own row
    /// displays as connected without a backing Connection row: display
    /// state, never persisted as a relationship.
    pub fn display_status(&self) -> ConnectionStatus {
        if self.is_self {
            ConnectionStatus::Accepted
        } else {
            self.relation
        }
    }
}

/// Lazily loaded member tab of a community detail page.
pub struct MembersController {
    gateway: Arc<Gateway>,
    events: EventBus,
    pub community_id: CommunityId,
    pub members: Vec<MemberView>,
    in_flight: InFlight<UserId>,
}

impl MembersController {
    pub fn new(gateway: Arc<Gateway>, events: EventBus, community_id: CommunityId) -> Self {
        Self {
            gateway,
            events,
            community_id,
            members: Vec::new(),
            in_flight: InFlight::new(),
        }
    }

    /// Fetch membership rows, member profiles, and the viewer's
    /// connections to them, then merge.
    pub async fn refresh(&mut self) -> Result<()> {
        let me = self.gateway.current_user_id()?;

        #[derive(Debug, Deserialize)]
        struct MemberRow {
            user_id: UserId,
            #[serde(default)]
            role: MemberRole,
            joined_at: Option<DateTime<Utc>>,
        }

        let rows: Vec<MemberRow> = self
            .gateway
            .select(
                "community_members",
                QueryBuilder::new()
                    .select("user_id, role, joined_at")
                    .eq("community_id", self.community_id)
                    .order("joined_at", Order::Asc),
            )
            .await?;

        let member_ids: Vec<UserId> = rows.iter().map(|r| r.user_id).collect();
        let other_ids: Vec<UserId> = member_ids.iter().copied().filter(|id| *id != me).collect();

        let profiles: Vec<Profile> = if member_ids.is_empty() {
            Vec::new()
        } else {
            self.gateway
                .select(
                    "profiles",
                    QueryBuilder::new()
                        .select("*")
                        .in_list("id", member_ids.iter().copied()),
                )
                .await?
        };
        let profiles_by_id: HashMap<UserId, Profile> =
            profiles.into_iter().map(|p| (p.id, p)).collect();

        let connections: Vec<Connection> = if other_ids.is_empty() {
            Vec::new()
        } else {
            self.gateway
                .select(
                    "connections",
                    QueryBuilder::new().select("*").or([
                        cond_and([
                            cond_eq("user1_id", me),
                            cond_in("user2_id", other_ids.iter().copied()),
                        ]),
                        cond_and([
                            cond_eq("user2_id", me),
                            cond_in("user1_id", other_ids.iter().copied()),
                        ]),
                    ]),
                )
                .await?
        };
        let status = ConnectionStatusMap::build(me, &connections);

        self.members = rows
            .into_iter()
            .filter_map(|row| {
                // Deleted accounts can leave dangling membership rows.
                let profile = profiles_by_id.get(&row.user_id).cloned()?;
                let is_self = row.user_id == me;
                Some(MemberView {
                    relation: if is_self {
                        ConnectionStatus::None
                    } else {
                        status.status_for(row.user_id)
                    },
                    is_self,
                    role: row.role,
                    joined_at: row.joined_at,
                    profile,
                })
            })
            .collect();
        Ok(())
    }

    /// Connect with a member straight from the list.
    pub async fn connect(&mut self, member_id: UserId) -> Result<()> {
        let me = self.gateway.current_user_id()?;
        let Some(pos) = self.members.iter().position(|m| m.profile.id == member_id) else {
            return Err(ClientError::NotFound("member"));
        };
        if self.members[pos].is_self || !self.members[pos].relation.can_send_request() {
            return Ok(());
        }
        if !self.in_flight.try_begin(member_id) {
            return Ok(());
        }

        let payload = serde_json::json!({
            "user1_id": me,
            "user2_id": member_id,
            "status": ConnectionState::Pending,
        });
        let mutation = self.gateway.insert_only("connections", &payload);
        let result = with_rollback(
            &mut self.members[pos].relation,
            |relation| *relation = ConnectionStatus::PendingSent,
            mutation,
        )
        .await;
        self.in_flight.finish(&member_id);

        if let Err(err) = result {
            warn!(member = %member_id, error = %err, "sending connection request failed");
            self.events.toast_error("Could not send connection request");
            return Err(err.into());
        }
        self.events.emit(UiEvent::ConnectionsUpdated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connecthub_gateway::{AuthUser, GatewayConfig, Session};

    fn community(name: &str, category: &str, member_count: i64) -> Community {
        Community {
            id: CommunityId::new(),
            name: name.into(),
            description: Some(format!("{name} description")),
            category: Some(category.into()),
            image_url: None,
            created_by: UserId::new(),
            member_count,
            created_at: None,
        }
    }

    fn controller_at(
        base_url: String,
        me: UserId,
    ) -> (
        CommunitiesController,
        tokio::sync::mpsc::UnboundedReceiver<UiEvent>,
    ) {
        let gateway = Gateway::new(GatewayConfig {
            base_url,
            ..GatewayConfig::default()
        })
        .unwrap();
        gateway.restore_session(Session {
            access_token: "token".into(),
            refresh_token: None,
            user: AuthUser {
                id: me,
                email: None,
            },
        });
        let (events, rx) = EventBus::new();
        (CommunitiesController::new(Arc::new(gateway), events), rx)
    }

    #[test]
    fn admins_always_include_the_owner() {
        let owner = UserId::new();
        let other = UserId::new();
        let mut admins = Admins::new(owner);
        assert_eq!(admins.all(), vec![owner]);

        admins.add(other);
        admins.add(other); // duplicate
        admins.add(owner); // owner re-added
        assert_eq!(admins.all().len(), 2);
        assert!(admins.contains(owner));
        assert!(admins.contains(other));
    }

    #[test]
    fn own_member_row_displays_connected_without_a_relationship() {
        let me = UserId::new();
        let view = MemberView {
            profile: Profile {
                id: me,
                username: Some("me".into()),
                display_name: None,
                email: None,
                profile_picture: None,
                bio: None,
                location: None,
                is_admin: false,
                push_notifications: true,
                hobby_embedding: None,
                created_at: None,
            },
            role: MemberRole::Member,
            joined_at: None,
            relation: ConnectionStatus::None,
            is_self: true,
        };
        assert_eq!(view.display_status(), ConnectionStatus::Accepted);
        // The underlying relationship stays `none`.
        assert_eq!(view.relation, ConnectionStatus::None);
    }

    #[test]
    fn list_filter_combines_search_and_category() {
        let (mut ctl, _rx) = controller_at("http://127.0.0.1:9".into(), UserId::new());
        ctl.communities = vec![
            CommunityWithMembership {
                community: community("Rust Hackers", "Technology", 10),
                is_member: false,
            },
            CommunityWithMembership {
                community: community("Trail Runners", "Lifestyle", 5),
                is_member: true,
            },
        ];

        let all: Vec<&CommunityWithMembership> = ctl.communities.iter().collect();
        let hits = ctl.filtered(all.clone(), "rust", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].community.name, "Rust Hackers");

        let by_category = ctl.filtered(all.clone(), "", Some("Lifestyle"));
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].community.name, "Trail Runners");

        assert!(ctl.filtered(all, "rust", Some("Lifestyle")).is_empty());
        assert_eq!(ctl.mine().len(), 1);
        assert_eq!(ctl.discoverable().len(), 1);
    }

    #[tokio::test]
    async fn join_increments_the_counter_and_sticks_on_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/community_members")
            .with_status(201)
            .create_async()
            .await;

        let (mut ctl, _rx) = controller_at(server.url(), UserId::new());
        ctl.communities = vec![CommunityWithMembership {
            community: community("Chess Club", "Lifestyle", 5),
            is_member: false,
        }];
        let id = ctl.communities[0].community.id;

        ctl.join(id).await.unwrap();
        assert!(ctl.communities[0].is_member);
        assert_eq!(ctl.communities[0].community.member_count, 6);
    }

    #[tokio::test]
    async fn failed_join_reverts_to_the_exact_prior_count() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/community_members")
            .with_status(500)
            .with_body(r#"{"message":"boom"}"#)
            .create_async()
            .await;

        let (mut ctl, _rx) = controller_at(server.url(), UserId::new());
        ctl.communities = vec![CommunityWithMembership {
            community: community("Chess Club", "Lifestyle", 5),
            is_member: false,
        }];
        let id = ctl.communities[0].community.id;

        assert!(ctl.join(id).await.is_err());
        assert!(!ctl.communities[0].is_member);
        assert_eq!(ctl.communities[0].community.member_count, 5);
    }

    #[tokio::test]
    async fn leave_clamps_the_counter_at_zero() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/rest/v1/community_members")
            .match_query(mockito::Matcher::Any)
            .with_status(204)
            .create_async()
            .await;

        let (mut ctl, _rx) = controller_at(server.url(), UserId::new());
        ctl.communities = vec![CommunityWithMembership {
            community: community("Ghost Town", "Lifestyle", 0),
            is_member: true,
        }];
        let id = ctl.communities[0].community.id;

        ctl.leave(id).await.unwrap();
        assert!(!ctl.communities[0].is_member);
        assert_eq!(ctl.communities[0].community.member_count, 0);
    }
}
