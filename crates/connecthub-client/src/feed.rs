//! Post feeds: the global feed and community post lists.
//!
//! Like and comment counts are derived from their own tables at read
//! time, not stored counters; the like toggle is optimistic with exact
//! rollback.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use connecthub_gateway::{Gateway, Order, QueryBuilder};
use connecthub_shared::{CommunityId, Like, Post, PostId, Profile, UserId};

use crate::error::{ClientError, Result};
use crate::events::EventBus;
use crate::optimistic::{with_rollback, InFlight};

/// A post joined with its author and derived counts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub post: Post,
    pub author: Profile,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
}

/// Flip the liked flag and move the derived count by exactly one.
fn toggle(view: &mut PostView) {
    view.is_liked = !view.is_liked;
    view.like_count += if view.is_liked { 1 } else { -1 };
}

#[derive(Debug, Deserialize)]
struct CommentRef {
    post_id: PostId,
}

/// Join posts with authors and derived counts.
fn build_post_views(
    posts: Vec<Post>,
    authors: &HashMap<UserId, Profile>,
    likes: &[Like],
    comments: &[CommentRef],
    me: UserId,
) -> Vec<PostView> {
    let mut like_counts: HashMap<PostId, i64> = HashMap::new();
    let mut liked_by_me: HashSet<PostId> = HashSet::new();
    for like in likes {
        *like_counts.entry(like.post_id).or_insert(0) += 1;
        if like.user_id == me {
            liked_by_me.insert(like.post_id);
        }
    }

    let mut comment_counts: HashMap<PostId, i64> = HashMap::new();
    for comment in comments {
        *comment_counts.entry(comment.post_id).or_insert(0) += 1;
    }

    posts
        .into_iter()
        .filter_map(|post| {
            let author = authors.get(&post.user_id).cloned()?;
            Some(PostView {
                like_count: like_counts.get(&post.id).copied().unwrap_or(0),
                comment_count: comment_counts.get(&post.id).copied().unwrap_or(0),
                is_liked: liked_by_me.contains(&post.id),
                post,
                author,
            })
        })
        .collect()
}

/// Owns one post list: the global feed (`scope = None`) or one
/// community's posts.
pub struct FeedController {
    gateway: Arc<Gateway>,
    events: EventBus,
    pub scope: Option<CommunityId>,
    pub posts: Vec<PostView>,
    in_flight: InFlight<PostId>,
}

impl FeedController {
    pub fn new(gateway: Arc<Gateway>, events: EventBus, scope: Option<CommunityId>) -> Self {
        Self {
            gateway,
            events,
            scope,
            posts: Vec::new(),
            in_flight: InFlight::new(),
        }
    }

    /// Fetch posts, then authors/likes/comments concurrently, and merge.
    pub async fn refresh(&mut self) -> Result<()> {
        let me = self.gateway.current_user_id()?;

        let mut query = QueryBuilder::new()
            .select("*")
            .order("created_at", Order::Desc);
        if let Some(community_id) = self.scope {
            query = query.eq("community_id", community_id);
        }
        let posts: Vec<Post> = self.gateway.select("posts", query).await?;

        if posts.is_empty() {
            self.posts.clear();
            return Ok(());
        }

        let post_ids: Vec<PostId> = posts.iter().map(|p| p.id).collect();
        let author_ids: HashSet<UserId> = posts.iter().map(|p| p.user_id).collect();

        let (authors, likes, comments) = tokio::join!(
            self.gateway.select::<Profile>(
                "profiles",
                QueryBuilder::new()
                    .select("*")
                    .in_list("id", author_ids.iter().copied()),
            ),
            self.gateway.select::<Like>(
                "likes",
                QueryBuilder::new()
                    .select("post_id, user_id")
                    .in_list("post_id", post_ids.iter().copied()),
            ),
            self.gateway.select::<CommentRef>(
                "comments",
                QueryBuilder::new()
                    .select("post_id")
                    .in_list("post_id", post_ids.iter().copied()),
            ),
        );

        let authors: HashMap<UserId, Profile> =
            authors?.into_iter().map(|p| (p.id, p)).collect();

        self.posts = build_post_views(posts, &authors, &likes?, &comments?, me);
        Ok(())
    }

    /// Create a post and prepend it to the list. `author` is the current
    /// user's cached profile.
    pub async fn create_post(&mut self, author: &Profile, content: &str) -> Result<PostId> {
        let content = content.trim();
        if content.is_empty() {
            return Err(connecthub_shared::ValidationError::EmptyMessage.into());
        }
        let me = self.gateway.current_user_id()?;

        let rows: Vec<Post> = self
            .gateway
            .insert(
                "posts",
                &serde_json::json!({
                    "content": content,
                    "community_id": self.scope,
                    "user_id": me,
                }),
            )
            .await?;
        let post = rows.into_iter().next().ok_or(ClientError::NotFound("post"))?;
        let id = post.id;

        self.posts.insert(
            0,
            PostView {
                post,
                author: author.clone(),
                like_count: 0,
                comment_count: 0,
                is_liked: false,
            },
        );
        Ok(id)
    }

    /// Like or unlike: the flag and count flip immediately, reverted
    /// exactly if the row mutation fails.
    pub async fn toggle_like(&mut self, post_id: PostId) -> Result<()> {
        let me = self.gateway.current_user_id()?;
        let Some(pos) = self.posts.iter().position(|p| p.post.id == post_id) else {
            return Err(ClientError::NotFound("post"));
        };
        if !self.in_flight.try_begin(post_id) {
            return Ok(());
        }

        let was_liked = self.posts[pos].is_liked;
        let result = if was_liked {
            let mutation = self.gateway.delete(
                "likes",
                QueryBuilder::new()
                    .eq("post_id", post_id)
                    .eq("user_id", me),
            );
            with_rollback(&mut self.posts[pos], toggle, mutation).await
        } else {
            let payload = serde_json::json!({ "post_id": post_id, "user_id": me });
            let mutation = self.gateway.insert_only("likes", &payload);
            with_rollback(&mut self.posts[pos], toggle, mutation).await
        };
        self.in_flight.finish(&post_id);

        if let Err(err) = result {
            warn!(post = %post_id, error = %err, "toggling like failed");
            self.events.toast_error("Could not update like");
            return Err(err.into());
        }
        Ok(())
    }
}
