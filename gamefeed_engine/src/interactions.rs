//! Optimistic like/repost state per post.
//!
//! Every (post, kind) pair is either idle or has exactly one request in
//! flight. Toggles made while a request is in flight only move the displayed
//! value; once the server answers, its value becomes the baseline and at most
//! one follow-up request reconciles it with the viewer's latest intent.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{FeedError, FeedResult};
use crate::models::{InteractionKind, Post, PostId, Tally};

pub const MAX_COMMENTARY_CHARS: usize = 280;

/// A remote toggle the effect layer has to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRequest {
    pub post_id: PostId,
    pub kind: InteractionKind,
    pub sequence: u64,
    pub commentary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Server value applied, nothing left to send.
    Settled(Tally),
    /// Server value became the baseline but the viewer toggled again meanwhile.
    FollowUp(InteractionRequest),
    /// Restored to the values shown before the failed toggle.
    RolledBack(Tally),
    /// The request was superseded; its result was ignored.
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct PendingToggle {
    rollback: Tally,
    sequence: u64,
}

#[derive(Debug, Default)]
pub struct InteractionBoard {
    posts: HashMap<PostId, Post>,
    order: Vec<PostId>,
    pending: HashMap<(PostId, InteractionKind), PendingToggle>,
    next_sequence: u64,
}

impl InteractionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a post. Any request in flight for it is superseded.
    pub fn upsert(&mut self, post: Post) {
        let id = post.id;
        self.pending.retain(|(post_id, _), _| *post_id != id);
        if self.posts.insert(id, post).is_none() {
            self.order.push(id);
        }
    }

    pub fn remove(&mut self, post_id: PostId) -> Option<Post> {
        self.pending.retain(|(id, _), _| *id != post_id);
        self.order.retain(|id| *id != post_id);
        self.posts.remove(&post_id)
    }

    pub fn post(&self, post_id: PostId) -> Option<&Post> {
        self.posts.get(&post_id)
    }

    /// Posts in the order they were first inserted.
    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.order.iter().filter_map(|id| self.posts.get(id))
    }

    pub fn is_pending(&self, post_id: PostId, kind: InteractionKind) -> bool {
        self.pending.contains_key(&(post_id, kind))
    }

    /// Flips the displayed flag and counter. Returns the request to send, or
    /// `None` when the toggle was queued behind one already in flight.
    pub fn toggle(
        &mut self,
        post_id: PostId,
        kind: InteractionKind,
    ) -> FeedResult<Option<InteractionRequest>> {
        let post = self
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| FeedError::NotFound(format!("post {post_id}")))?;
        let shown = post.tally(kind);
        post.set_tally(kind, shown.flipped());

        let key = (post_id, kind);
        if self.pending.contains_key(&key) {
            debug!(post_id, ?kind, "toggle queued behind in-flight request");
            return Ok(None);
        }
        let sequence = self.bump_sequence();
        self.pending.insert(
            key,
            PendingToggle {
                rollback: shown,
                sequence,
            },
        );
        Ok(Some(InteractionRequest {
            post_id,
            kind,
            sequence,
            commentary: None,
        }))
    }

    /// Reposts with commentary. Additive: an existing repost is kept and the
    /// counter only moves if the viewer had not reposted yet.
    pub fn repost_with_commentary(
        &mut self,
        post_id: PostId,
        commentary: &str,
    ) -> FeedResult<InteractionRequest> {
        let commentary = validate_commentary(commentary)?;
        let key = (post_id, InteractionKind::Repost);
        if self.pending.contains_key(&key) {
            return Err(FeedError::InFlight);
        }
        let post = self
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| FeedError::NotFound(format!("post {post_id}")))?;
        let shown = post.tally(InteractionKind::Repost);
        let optimistic = if shown.active { shown } else { shown.flipped() };
        post.set_tally(InteractionKind::Repost, optimistic);

        let sequence = self.bump_sequence();
        self.pending.insert(
            key,
            PendingToggle {
                rollback: shown,
                sequence,
            },
        );
        Ok(InteractionRequest {
            post_id,
            kind: InteractionKind::Repost,
            sequence,
            commentary: Some(commentary),
        })
    }

    /// Applies the server's authoritative answer to `request`.
    pub fn confirm(&mut self, request: &InteractionRequest, server: Tally) -> Resolution {
        let key = (request.post_id, request.kind);
        if !self.is_current(request) {
            return Resolution::Stale;
        }
        let Some(post) = self.posts.get_mut(&request.post_id) else {
            self.pending.remove(&key);
            return Resolution::Stale;
        };

        let intent = post.tally(request.kind).active;
        if intent == server.active {
            post.set_tally(request.kind, server);
            self.pending.remove(&key);
            return Resolution::Settled(server);
        }

        post.set_tally(request.kind, server.flipped());
        let sequence = self.bump_sequence();
        self.pending.insert(
            key,
            PendingToggle {
                rollback: server,
                sequence,
            },
        );
        debug!(post_id = request.post_id, kind = ?request.kind, "replaying queued toggle");
        Resolution::FollowUp(InteractionRequest {
            post_id: request.post_id,
            kind: request.kind,
            sequence,
            commentary: None,
        })
    }

    /// Undoes `request` after a failed call, dropping any toggles queued
    /// behind it.
    pub fn roll_back(&mut self, request: &InteractionRequest) -> Resolution {
        if !self.is_current(request) {
            return Resolution::Stale;
        }
        let key = (request.post_id, request.kind);
        let Some(pending) = self.pending.remove(&key) else {
            return Resolution::Stale;
        };
        match self.posts.get_mut(&request.post_id) {
            Some(post) => {
                post.set_tally(request.kind, pending.rollback);
                Resolution::RolledBack(pending.rollback)
            }
            None => Resolution::Stale,
        }
    }

    /// Optimistically counts a new comment. Returns the count shown before.
    pub fn bump_comment_count(&mut self, post_id: PostId) -> Option<u64> {
        let post = self.posts.get_mut(&post_id)?;
        let previous = post.counters.comment_count;
        post.counters.comment_count = previous + 1;
        Some(previous)
    }

    pub fn set_comment_count(&mut self, post_id: PostId, count: u64) {
        if let Some(post) = self.posts.get_mut(&post_id) {
            post.counters.comment_count = count;
        }
    }

    fn is_current(&self, request: &InteractionRequest) -> bool {
        self.pending
            .get(&(request.post_id, request.kind))
            .is_some_and(|pending| pending.sequence == request.sequence)
    }

    fn bump_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}

fn validate_commentary(raw: &str) -> FeedResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FeedError::Validation("Commentary cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_COMMENTARY_CHARS {
        return Err(FeedError::Validation(format!(
            "Commentary is limited to {MAX_COMMENTARY_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counters, PostContent, ViewerFlags};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn post(id: PostId, liked: bool, likes: u64) -> Post {
        Post {
            id,
            author_id: 1,
            content: PostContent {
                text: Some("great soundtrack".into()),
                media_ref: None,
            },
            counters: Counters {
                like_count: likes,
                repost_count: 2,
                comment_count: 3,
            },
            viewer: ViewerFlags {
                has_liked: liked,
                has_reposted: false,
            },
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    /// Server that simply toggles its own copy of the tally.
    fn server_toggle(server: &mut Tally, request: &InteractionRequest) -> Tally {
        if request.commentary.is_some() {
            if !server.active {
                *server = server.flipped();
            }
        } else {
            *server = server.flipped();
        }
        *server
    }

    #[test]
    fn toggle_is_optimistic_and_server_wins() {
        let mut board = InteractionBoard::new();
        board.upsert(post(1, false, 5));

        let request = board.toggle(1, InteractionKind::Like).unwrap().expect("request");
        assert_eq!(board.post(1).unwrap().tally(InteractionKind::Like), Tally::new(true, 6));

        // Someone else liked it concurrently.
        let resolution = board.confirm(&request, Tally::new(true, 9));
        assert_eq!(resolution, Resolution::Settled(Tally::new(true, 9)));
        assert_eq!(board.post(1).unwrap().tally(InteractionKind::Like), Tally::new(true, 9));
        assert!(!board.is_pending(1, InteractionKind::Like));
    }

    #[test]
    fn failure_restores_exact_previous_values() {
        let mut board = InteractionBoard::new();
        board.upsert(post(1, true, 1));
        let before = board.post(1).unwrap().clone();

        let request = board.toggle(1, InteractionKind::Like).unwrap().expect("request");
        board.toggle(1, InteractionKind::Like).unwrap();
        board.toggle(1, InteractionKind::Like).unwrap();

        assert_eq!(
            board.roll_back(&request),
            Resolution::RolledBack(Tally::new(true, 1))
        );
        assert_eq!(board.post(1).unwrap(), &before);
    }

    #[test]
    fn double_click_sends_one_request_and_settles_on_server_state() {
        let mut board = InteractionBoard::new();
        board.upsert(post(1, false, 5));

        let first = board.toggle(1, InteractionKind::Like).unwrap().expect("request");
        assert_eq!(board.toggle(1, InteractionKind::Like).unwrap(), None);
        assert_eq!(board.post(1).unwrap().tally(InteractionKind::Like), Tally::new(false, 5));

        // The first toggle landed; the viewer has since changed their mind.
        match board.confirm(&first, Tally::new(true, 6)) {
            Resolution::FollowUp(next) => {
                assert_eq!(next.sequence, first.sequence + 1);
                assert_eq!(
                    board.post(1).unwrap().tally(InteractionKind::Like),
                    Tally::new(false, 5)
                );
                assert_eq!(
                    board.confirm(&next, Tally::new(false, 5)),
                    Resolution::Settled(Tally::new(false, 5))
                );
            }
            other => panic!("expected follow-up, got {other:?}"),
        }
    }

    #[test]
    fn toggle_parity_holds_for_any_number_of_clicks() {
        for clicks in 1..=7u32 {
            let mut board = InteractionBoard::new();
            board.upsert(post(1, false, 10));
            let mut server = Tally::new(false, 10);
            let mut in_flight = Vec::new();

            for _ in 0..clicks {
                if let Some(request) = board.toggle(1, InteractionKind::Like).unwrap() {
                    in_flight.push(request);
                }
            }
            while let Some(request) = in_flight.pop() {
                let answer = server_toggle(&mut server, &request);
                if let Resolution::FollowUp(next) = board.confirm(&request, answer) {
                    in_flight.push(next);
                }
            }

            let expected = if clicks % 2 == 1 {
                Tally::new(true, 11)
            } else {
                Tally::new(false, 10)
            };
            assert_eq!(board.post(1).unwrap().tally(InteractionKind::Like), expected);
            assert_eq!(server, expected);
        }
    }

    #[test]
    fn commentary_repost_is_additive() {
        let mut board = InteractionBoard::new();
        board.upsert(post(1, false, 0));

        let request = board.repost_with_commentary(1, "  must play  ").unwrap();
        assert_eq!(request.commentary.as_deref(), Some("must play"));
        assert_eq!(board.post(1).unwrap().tally(InteractionKind::Repost), Tally::new(true, 3));
        board.confirm(&request, Tally::new(true, 3));

        let again = board.repost_with_commentary(1, "still great").unwrap();
        assert_eq!(board.post(1).unwrap().tally(InteractionKind::Repost), Tally::new(true, 3));
        board.confirm(&again, Tally::new(true, 3));

        // Plain toggle while reposted removes both variants.
        let undo = board.toggle(1, InteractionKind::Repost).unwrap().expect("request");
        assert_eq!(undo.commentary, None);
        assert_eq!(board.post(1).unwrap().tally(InteractionKind::Repost), Tally::new(false, 2));
    }

    #[test]
    fn commentary_is_validated_before_any_change() {
        let mut board = InteractionBoard::new();
        board.upsert(post(1, false, 0));
        let before = board.post(1).unwrap().clone();

        assert!(matches!(
            board.repost_with_commentary(1, "   "),
            Err(FeedError::Validation(_))
        ));
        let long = "x".repeat(MAX_COMMENTARY_CHARS + 1);
        assert!(matches!(
            board.repost_with_commentary(1, &long),
            Err(FeedError::Validation(_))
        ));
        assert_eq!(board.post(1).unwrap(), &before);

        board.toggle(1, InteractionKind::Repost).unwrap();
        assert!(matches!(
            board.repost_with_commentary(1, "hello"),
            Err(FeedError::InFlight)
        ));
    }

    #[test]
    fn unknown_post_is_rejected() {
        let mut board = InteractionBoard::new();
        assert!(matches!(
            board.toggle(404, InteractionKind::Like),
            Err(FeedError::NotFound(_))
        ));
    }

    #[test]
    fn results_for_reloaded_posts_are_ignored() {
        let mut board = InteractionBoard::new();
        board.upsert(post(1, false, 5));
        let request = board.toggle(1, InteractionKind::Like).unwrap().expect("request");

        board.upsert(post(1, false, 7));
        assert_eq!(board.confirm(&request, Tally::new(true, 6)), Resolution::Stale);
        assert_eq!(board.roll_back(&request), Resolution::Stale);
        assert_eq!(board.post(1).unwrap().tally(InteractionKind::Like), Tally::new(false, 7));
    }

    #[test]
    fn kinds_are_tracked_independently() {
        let mut board = InteractionBoard::new();
        board.upsert(post(1, false, 5));
        let like = board.toggle(1, InteractionKind::Like).unwrap();
        let repost = board.toggle(1, InteractionKind::Repost).unwrap();
        assert!(like.is_some());
        assert!(repost.is_some());
        assert!(board.is_pending(1, InteractionKind::Like));
        assert!(board.is_pending(1, InteractionKind::Repost));
    }
}
