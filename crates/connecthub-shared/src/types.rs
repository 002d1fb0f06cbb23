use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile id, as issued by the backend auth service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Primary key of a `connections` row.
    ConnectionId
);
uuid_id!(
    /// Primary key of a `communities` row.
    CommunityId
);
uuid_id!(
    /// Primary key of a `posts` row.
    PostId
);
uuid_id!(
    /// Primary key of a `messages` row.
    MessageId
);
uuid_id!(
    /// Primary key of a `hobbies` row (fixed catalog).
    HobbyId
);

/// Stored state of a `connections` row. Rejection and removal delete the
/// row, so no terminal "rejected" value exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Pending,
    Accepted,
}

/// Relationship between the current user and some other profile, as seen
/// from the current user's side. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    None,
    PendingSent,
    PendingReceived,
    Accepted,
}

impl ConnectionStatus {
    /// Whether a "connect" action still makes sense for this party.
    pub fn can_send_request(self) -> bool {
        matches!(self, ConnectionStatus::None)
    }

    /// Only the recipient of a pending request may accept it.
    pub fn can_accept(self) -> bool {
        matches!(self, ConnectionStatus::PendingReceived)
    }
}

/// Role within a community.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Admin,
}

impl Default for MemberRole {
    fn default() -> Self {
        MemberRole::Member
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_serde_uses_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        let back: ConnectionState = serde_json::from_str("\"accepted\"").unwrap();
        assert_eq!(back, ConnectionState::Accepted);
    }

    #[test]
    fn ids_are_transparent_uuids() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn accept_is_recipient_only() {
        assert!(ConnectionStatus::PendingReceived.can_accept());
        assert!(!ConnectionStatus::PendingSent.can_accept());
        assert!(!ConnectionStatus::Accepted.can_accept());
        assert!(!ConnectionStatus::None.can_accept());
    }
}
