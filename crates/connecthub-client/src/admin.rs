//! Admin dashboard: aggregate totals behind the `is_admin` gate.

use std::sync::Arc;

use chrono::{NaiveTime, Utc};

use connecthub_gateway::{Gateway, QueryBuilder};
use connecthub_shared::{AdminStats, Profile};

use crate::error::{ClientError, Result};

pub struct AdminController {
    gateway: Arc<Gateway>,
    pub stats: AdminStats,
    pub authorized: bool,
}

impl AdminController {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            stats: AdminStats::default(),
            authorized: false,
        }
    }

    /// Assemble the dashboard totals. Non-admin viewers are rejected
    /// before any query is issued.
    pub async fn refresh(&mut self, viewer: &Profile) -> Result<()> {
        if !viewer.is_admin {
            self.authorized = false;
            return Err(ClientError::PermissionDenied(
                "the admin dashboard requires the admin flag".into(),
            ));
        }
        self.authorized = true;

        let midnight = Utc::now()
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc()
            .to_rfc3339();

        let (users, communities, messages, connections, new_today) = tokio::join!(
            self.gateway.count("profiles", QueryBuilder::new()),
            self.gateway.count("communities", QueryBuilder::new()),
            self.gateway.count("messages", QueryBuilder::new()),
            self.gateway.count("connections", QueryBuilder::new()),
            self.gateway.count(
                "profiles",
                QueryBuilder::new().gte("created_at", &midnight),
            ),
        );

        self.stats = AdminStats {
            total_users: users?,
            total_communities: communities?,
            total_messages: messages?,
            total_connections: connections?,
            new_users_today: new_today?,
        };
        Ok(())
    }
}
