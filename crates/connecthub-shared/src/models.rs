//! Row shapes of the remote store, mirrored field-for-field.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be decoded
//! straight from gateway responses and handed to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    CommunityId, ConnectionId, ConnectionState, HobbyId, MemberRole, MessageId, PostId, UserId,
};

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A user profile. Created at signup, mutated via settings, never deleted
/// by this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Public URL of the stored avatar, if one was uploaded.
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Grants access to the admin dashboard.
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "default_true")]
    pub push_notifications: bool,
    /// Opaque embedding vector over the user's hobbies, maintained by the
    /// remote embedding procedure. Never interpreted client-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hobby_embedding: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Name shown in lists and headers: display name, else username,
    /// else a placeholder.
    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("Anonymous")
    }
}

/// Partial update sent to the `profiles` table from the settings surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_notifications: Option<bool>,
}

// ---------------------------------------------------------------------------
// Hobbies
// ---------------------------------------------------------------------------

/// A tag from the fixed hobby catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hobby {
    pub id: HobbyId,
    pub name: String,
    pub category: Option<String>,
}

/// Join row between a profile and a hobby. At most one per
/// (user, hobby) pair, enforced by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserHobby {
    pub user_id: UserId,
    pub hobby_id: HobbyId,
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// A connection between two profiles. `user1_id` sent the request;
/// `user2_id` received it. At most one row per unordered pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub status: ConnectionState,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn involves(&self, user: UserId) -> bool {
        self.user1_id == user || self.user2_id == user
    }

    /// The party that is not `user`, or `None` if `user` is not on the row.
    pub fn other_party(&self, user: UserId) -> Option<UserId> {
        if self.user1_id == user {
            Some(self.user2_id)
        } else if self.user2_id == user {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A direct message. `read_at` is set exactly once, when the receiver
/// views the thread; content is never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_unread_for(&self, user: UserId) -> bool {
        self.receiver_id == user && self.read_at.is_none()
    }
}

/// One row of the `get_user_conversations` procedure: a conversation
/// partner plus preview fields for the summary list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub partner_id: UserId,
    pub partner_username: Option<String>,
    pub partner_display_name: Option<String>,
    pub partner_profile_picture: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_sender_id: Option<UserId>,
    #[serde(default)]
    pub unread_count: i64,
}

// ---------------------------------------------------------------------------
// Communities
// ---------------------------------------------------------------------------

/// A named group. `member_count` is a denormalised counter maintained by
/// optimistic increments, not recomputed from the join table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub created_by: UserId,
    #[serde(default)]
    pub member_count: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Membership row. The creator is inserted with `role = admin` when the
/// community is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityMember {
    pub community_id: CommunityId,
    pub user_id: UserId,
    #[serde(default)]
    pub role: MemberRole,
    pub joined_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// A post, optionally attached to a community. Like and comment counts
/// are derived from their own tables at read time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub community_id: Option<CommunityId>,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Presence of a row means "liked". At most one per (post, user).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Like {
    pub post_id: PostId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: uuid::Uuid,
    pub post_id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

/// One candidate returned by `get_weighted_recommendations`. Scores are
/// computed entirely by the remote procedure; all components are 0..1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationRow {
    pub id: UserId,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub hobbies: Vec<String>,
    #[serde(default)]
    pub shared_interests: Vec<String>,
    #[serde(default)]
    pub mutual_count: i64,
    #[serde(default)]
    pub exact_match_score: f64,
    #[serde(default)]
    pub ai_match_score: f64,
    #[serde(default)]
    pub total_score: f64,
}

// ---------------------------------------------------------------------------
// Admin dashboard
// ---------------------------------------------------------------------------

/// Aggregate totals for the admin dashboard, assembled from count-only
/// queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: u64,
    pub total_communities: u64,
    pub total_messages: u64,
    pub total_connections: u64,
    pub new_users_today: u64,
}
