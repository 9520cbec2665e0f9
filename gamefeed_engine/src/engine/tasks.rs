use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::error;

use crate::gateway::{fetch_posts, FeedGateway};
use crate::interactions::InteractionRequest;
use crate::models::{CommentId, InteractionKind, PostId, Tally};
use crate::search::SuggestionQuery;

use super::messages::FeedMessage;

fn deliver(tx: &UnboundedSender<FeedMessage>, message: FeedMessage, name: &str) {
    if tx.send(message).is_err() {
        error!(message = name, "failed to deliver message, engine is gone");
    }
}

pub(super) fn load_posts(
    gateway: Arc<dyn FeedGateway>,
    tx: UnboundedSender<FeedMessage>,
    ids: BTreeSet<PostId>,
) {
    tokio::spawn(async move {
        let result = fetch_posts(gateway.as_ref(), &ids).await;
        deliver(&tx, FeedMessage::PostsLoaded(result), "PostsLoaded");
    });
}

pub(super) fn run_interaction(
    gateway: Arc<dyn FeedGateway>,
    tx: UnboundedSender<FeedMessage>,
    request: InteractionRequest,
) {
    tokio::spawn(async move {
        let result = match request.kind {
            InteractionKind::Like => gateway.toggle_like(request.post_id).await.map(Tally::from),
            InteractionKind::Repost => gateway
                .toggle_repost(request.post_id, request.commentary.clone())
                .await
                .map(Tally::from),
        };
        deliver(
            &tx,
            FeedMessage::InteractionResolved { request, result },
            "InteractionResolved",
        );
    });
}

pub(super) fn load_comments(
    gateway: Arc<dyn FeedGateway>,
    tx: UnboundedSender<FeedMessage>,
    post_id: PostId,
    generation: u64,
) {
    tokio::spawn(async move {
        let result = gateway.list_comments(post_id).await;
        deliver(
            &tx,
            FeedMessage::CommentsLoaded {
                post_id,
                generation,
                result,
            },
            "CommentsLoaded",
        );
    });
}

pub(super) fn create_comment(
    gateway: Arc<dyn FeedGateway>,
    tx: UnboundedSender<FeedMessage>,
    post_id: PostId,
    parent_id: Option<CommentId>,
    body: String,
    bump_epoch: Option<u64>,
) {
    tokio::spawn(async move {
        let result = gateway.create_comment(post_id, parent_id, &body).await;
        deliver(
            &tx,
            FeedMessage::CommentCreated {
                post_id,
                bump_epoch,
                result,
            },
            "CommentCreated",
        );
    });
}

pub(super) fn delete_post(
    gateway: Arc<dyn FeedGateway>,
    tx: UnboundedSender<FeedMessage>,
    post_id: PostId,
) {
    tokio::spawn(async move {
        let result = gateway.delete_post(post_id).await;
        deliver(&tx, FeedMessage::PostDeleted { post_id, result }, "PostDeleted");
    });
}

pub(super) fn search_suggestions(
    gateway: Arc<dyn FeedGateway>,
    tx: UnboundedSender<FeedMessage>,
    query: SuggestionQuery,
) {
    tokio::spawn(async move {
        let result = gateway.search_suggestions(&query.text, query.kind).await;
        deliver(
            &tx,
            FeedMessage::SuggestionsLoaded { query, result },
            "SuggestionsLoaded",
        );
    });
}

/// Sends `message` once `delay` has passed, unless the handle is aborted first.
pub(super) fn schedule(
    tx: UnboundedSender<FeedMessage>,
    delay: Duration,
    message: FeedMessage,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        deliver(&tx, message, "timer");
    })
}
