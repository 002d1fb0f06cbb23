//! Recommendation list building for the discover surface.
//!
//! The candidate list arrives pre-scored from the remote
//! `get_weighted_recommendations` procedure; this module only merges it
//! with the local connection-status map, filters, and shapes it for
//! rendering. No score is ever recomputed client-side.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, warn};

use connecthub_gateway::{cond_eq, Gateway, QueryBuilder};
use connecthub_shared::constants::{
    INTEREST_FILTER_LIMIT, RECOMMENDATION_SCORE_FLOOR, STRONG_AI_MATCH, STRONG_EXACT_MATCH,
};
use connecthub_shared::{
    Connection, ConnectionId, ConnectionState, ConnectionStatus, RecommendationRow, UserId,
};

use crate::connections::ConnectionStatusMap;
use crate::error::Result;
use crate::events::EventBus;
use crate::optimistic::InFlight;

/// A scored candidate shaped for the UI.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedUser {
    pub id: UserId,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub hobbies: Vec<String>,
    pub shared_interests: Vec<String>,
    pub mutual_connections: i64,
    /// Combined score rounded to a 0-100 integer.
    pub match_score: u8,
    pub exact_match_score: f64,
    pub ai_match_score: f64,
}

impl From<RecommendationRow> for RecommendedUser {
    fn from(row: RecommendationRow) -> Self {
        let match_score = (row.total_score * 100.0).round().clamp(0.0, 100.0) as u8;
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            profile_picture: row.profile_picture,
            bio: row.bio,
            location: row.location,
            hobbies: row.hobbies,
            shared_interests: row.shared_interests,
            mutual_connections: row.mutual_count.max(0),
            match_score,
            exact_match_score: row.exact_match_score,
            ai_match_score: row.ai_match_score,
        }
    }
}

impl RecommendedUser {
    /// One-line explanation of the match, derived from the score
    /// breakdown.
    pub fn match_reason(&self) -> String {
        if self.exact_match_score > STRONG_EXACT_MATCH {
            let named: Vec<&str> = self
                .shared_interests
                .iter()
                .take(2)
                .map(String::as_str)
                .collect();
            return format!("Strong overlap in {}.", named.join(" & "));
        }
        if self.ai_match_score > STRONG_AI_MATCH && self.shared_interests.is_empty() {
            return "AI found deep similarities in your hobby profiles despite different keywords."
                .to_string();
        }
        "Matched based on overall social compatibility.".to_string()
    }
}

/// Client-side search and interest filtering. Both checks commute and are
/// applied after the recommendation exclusion filter.
#[derive(Debug, Clone, Default)]
pub struct DiscoverFilter {
    pub search: String,
    pub interests: Vec<String>,
}

impl DiscoverFilter {
    fn matches(&self, user: &RecommendedUser) -> bool {
        let query = self.search.to_lowercase();
        let matches_search = query.is_empty()
            || user
                .display_name
                .as_deref()
                .unwrap_or("")
                .to_lowercase()
                .contains(&query)
            || user
                .username
                .as_deref()
                .unwrap_or("")
                .to_lowercase()
                .contains(&query);

        let matches_interests = self.interests.is_empty()
            || user.hobbies.iter().any(|h| self.interests.contains(h));

        matches_search && matches_interests
    }
}

/// Candidates eligible for the "Recommended" tab: not already connected,
/// not already requested by the current user, and at or above the quality
/// floor. A candidate who has requested *us* stays eligible.
fn is_recommendable(user: &RecommendedUser, status: ConnectionStatus) -> bool {
    let is_new = status != ConnectionStatus::Accepted && status != ConnectionStatus::PendingSent;
    let is_high_quality = user.match_score >= RECOMMENDATION_SCORE_FLOOR;
    is_new && is_high_quality
}

/// Owns the discover view state: the scored candidate list plus the
/// connection-status map it is merged with.
pub struct DiscoverController {
    gateway: Arc<Gateway>,
    events: EventBus,
    pub candidates: Vec<RecommendedUser>,
    pub status: ConnectionStatusMap,
    /// Set when the scoring procedure failed; the UI shows an error state
    /// instead of an empty list.
    pub load_failed: bool,
    in_flight: InFlight<UserId>,
}

impl DiscoverController {
    pub fn new(gateway: Arc<Gateway>, events: EventBus) -> Self {
        Self {
            gateway,
            events,
            candidates: Vec::new(),
            status: ConnectionStatusMap::default(),
            load_failed: false,
            in_flight: InFlight::new(),
        }
    }

    /// Fetch the scored candidates and the connection rows concurrently
    /// and merge them. Without a signed-in user this is a no-op with
    /// empty results.
    pub async fn refresh(&mut self) -> Result<()> {
        let Some(me) = self.gateway.session().map(|s| s.user.id) else {
            self.candidates.clear();
            self.status = ConnectionStatusMap::default();
            return Ok(());
        };

        let (rec_result, conn_result) = tokio::join!(
            self.gateway.rpc::<Vec<RecommendationRow>>(
                "get_weighted_recommendations",
                serde_json::json!({ "query_user_id": me }),
            ),
            self.gateway.select::<Connection>(
                "connections",
                QueryBuilder::new()
                    .select("*")
                    .or([cond_eq("user1_id", me), cond_eq("user2_id", me)]),
            ),
        );

        let rows = match rec_result {
            Ok(rows) => rows,
            Err(err) => {
                // Never fall back to unscored data.
                error!(error = %err, "recommendation procedure failed");
                self.candidates.clear();
                self.load_failed = true;
                self.events.toast_error("Could not load recommendations");
                return Err(err.into());
            }
        };
        let connections = match conn_result {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, "connection fetch failed");
                self.candidates.clear();
                self.load_failed = true;
                self.events.toast_error("Could not load recommendations");
                return Err(err.into());
            }
        };

        self.status = ConnectionStatusMap::build(me, &connections);
        self.candidates = rows.into_iter().map(RecommendedUser::from).collect();
        self.load_failed = false;
        Ok(())
    }

    /// The "Recommended" tab: exclusion filter first, then search and
    /// interest filtering.
    pub fn recommended(&self, filter: &DiscoverFilter) -> Vec<&RecommendedUser> {
        self.candidates
            .iter()
            .filter(|u| is_recommendable(u, self.status.status_for(u.id)))
            .filter(|u| filter.matches(u))
            .collect()
    }

    /// The "All" tab: everyone the procedure returned, search/interest
    /// filtered.
    pub fn all(&self, filter: &DiscoverFilter) -> Vec<&RecommendedUser> {
        self.candidates
            .iter()
            .filter(|u| filter.matches(u))
            .collect()
    }

    /// The first distinct hobby tags across all candidates, for the
    /// filter palette.
    pub fn available_interests(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut interests = Vec::new();
        for user in &self.candidates {
            for hobby in &user.hobbies {
                if seen.insert(hobby.clone()) {
                    interests.push(hobby.clone());
                    if interests.len() == INTEREST_FILTER_LIMIT {
                        return interests;
                    }
                }
            }
        }
        interests
    }

    /// Send a connection request from a candidate card:
    /// `none` -> `pending_sent` immediately, reverted on failure.
    pub async fn connect(&mut self, target: UserId) -> Result<()> {
        let me = self.gateway.current_user_id()?;
        if !self.status.status_for(target).can_send_request() {
            return Ok(());
        }
        if !self.in_flight.try_begin(target) {
            return Ok(());
        }

        self.status.set(
            target,
            ConnectionStatus::PendingSent,
            ConnectionId::new(),
            chrono::Utc::now(),
        );

        let result = self
            .gateway
            .insert_only(
                "connections",
                &serde_json::json!({
                    "user1_id": me,
                    "user2_id": target,
                    "status": ConnectionState::Pending,
                }),
            )
            .await;
        self.in_flight.finish(&target);

        if let Err(err) = result {
            warn!(target = %target, error = %err, "sending connection request failed");
            self.status.remove(target);
            self.events.toast_error("Could not send connection request");
            return Err(err.into());
        }
        Ok(())
    }
}
