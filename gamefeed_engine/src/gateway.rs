use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{FeedError, FeedResult};
use crate::models::{
    Comment, CommentId, EntityKind, LikeStatus, PostId, PostSummary, RepostStatus, Suggestion,
};

/// Remote operations the engine depends on.
#[async_trait]
pub trait FeedGateway: Send + Sync + 'static {
    async fn toggle_like(&self, post_id: PostId) -> FeedResult<LikeStatus>;

    /// Toggles the viewer's repost. With `commentary` set the call is always
    /// additive; without it, an existing repost (plain or commented) is removed.
    async fn toggle_repost(
        &self,
        post_id: PostId,
        commentary: Option<String>,
    ) -> FeedResult<RepostStatus>;

    async fn list_comments(&self, post_id: PostId) -> FeedResult<Vec<Comment>>;

    async fn create_comment(
        &self,
        post_id: PostId,
        parent_id: Option<CommentId>,
        body: &str,
    ) -> FeedResult<()>;

    async fn delete_post(&self, post_id: PostId) -> FeedResult<()>;

    async fn search_suggestions(
        &self,
        query: &str,
        kind: EntityKind,
    ) -> FeedResult<Vec<Suggestion>>;

    async fn fetch_post(&self, post_id: PostId) -> FeedResult<PostSummary>;

    /// `Ok(None)` means the backend has no bulk endpoint.
    async fn fetch_posts_bulk(
        &self,
        _ids: &BTreeSet<PostId>,
    ) -> FeedResult<Option<HashMap<PostId, PostSummary>>> {
        Ok(None)
    }
}

/// Loads several posts, preferring the bulk endpoint and falling back to one
/// request per id. Ids the backend no longer knows are skipped.
pub async fn fetch_posts<G>(gateway: &G, ids: &BTreeSet<PostId>) -> FeedResult<Vec<PostSummary>>
where
    G: FeedGateway + ?Sized,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(mut found) = gateway.fetch_posts_bulk(ids).await? {
        return Ok(ids.iter().filter_map(|id| found.remove(id)).collect());
    }

    debug!(count = ids.len(), "bulk post fetch unavailable, fetching one by one");
    let mut posts = Vec::with_capacity(ids.len());
    for id in ids {
        match gateway.fetch_post(*id).await {
            Ok(post) => posts.push(post),
            Err(FeedError::NotFound(_)) => {
                warn!(post_id = id, "post disappeared before it could be fetched");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(posts)
}
