use tracing::{debug, info, warn};

use crate::comments::build_forest;
use crate::error::{FeedError, FeedResult};
use crate::interactions::{InteractionRequest, Resolution};
use crate::models::{Comment, EntityKind, PostId, PostSummary, Suggestion, Tally};
use crate::search::{DebounceOutcome, SuggestionQuery};

use super::state::Notice;
use super::FeedEngine;

pub(super) enum FeedMessage {
    PostsLoaded(FeedResult<Vec<PostSummary>>),
    InteractionResolved {
        request: InteractionRequest,
        result: FeedResult<Tally>,
    },
    CommentsLoaded {
        post_id: PostId,
        generation: u64,
        result: FeedResult<Vec<Comment>>,
    },
    CommentCreated {
        post_id: PostId,
        /// Count epoch of the optimistic bump, if the post was in the feed.
        bump_epoch: Option<u64>,
        result: FeedResult<()>,
    },
    PostDeleted {
        post_id: PostId,
        result: FeedResult<()>,
    },
    SearchDebounceElapsed {
        kind: EntityKind,
        ticket: u64,
    },
    SuggestionsLoaded {
        query: SuggestionQuery,
        result: FeedResult<Vec<Suggestion>>,
    },
    AutosaveElapsed {
        ticket: u64,
    },
}

impl FeedEngine {
    pub(super) fn handle_message(&mut self, message: FeedMessage) {
        match message {
            FeedMessage::PostsLoaded(result) => {
                self.finish_request();
                match result {
                    Ok(posts) => {
                        info!(count = posts.len(), "posts loaded");
                        self.insert_posts(posts);
                    }
                    Err(err) => self.report_failure(None, "Could not load posts", &err),
                }
            }
            FeedMessage::InteractionResolved { request, result } => {
                self.finish_request();
                self.resolve_interaction(request, result);
            }
            FeedMessage::CommentsLoaded {
                post_id,
                generation,
                result,
            } => {
                self.finish_request();
                self.apply_comments(post_id, generation, result);
            }
            FeedMessage::CommentCreated {
                post_id,
                bump_epoch,
                result,
            } => {
                self.finish_request();
                if let Some(thread) = self.threads.get_mut(&post_id) {
                    thread.submissions_in_flight = thread.submissions_in_flight.saturating_sub(1);
                }
                match result {
                    Ok(()) => {
                        info!(post_id, "comment created, refreshing thread");
                        self.spawn_load_comments(post_id);
                    }
                    Err(err) => {
                        if let Some(epoch) = bump_epoch {
                            self.undo_comment_bump(post_id, epoch);
                        }
                        if let Some(thread) = self.threads.get_mut(&post_id) {
                            thread.submit_error = Some(err.user_message());
                        }
                        self.report_failure(Some(post_id), "Could not post comment", &err);
                    }
                }
            }
            FeedMessage::PostDeleted { post_id, result } => {
                self.finish_request();
                match result {
                    Ok(()) | Err(FeedError::NotFound(_)) => {
                        info!(post_id, "post deleted");
                        self.forget_post(post_id);
                    }
                    Err(err) => self.report_failure(Some(post_id), "Could not delete post", &err),
                }
            }
            FeedMessage::SearchDebounceElapsed { kind, ticket } => {
                if self
                    .search_timers
                    .get(&kind)
                    .is_some_and(|(timer_ticket, _)| *timer_ticket == ticket)
                {
                    self.search_timers.remove(&kind);
                }
                let now = self.clock.now();
                match self.search.coordinator_mut(kind).debounce_elapsed(ticket, now) {
                    DebounceOutcome::Fire(query) => self.spawn_search(query),
                    DebounceOutcome::Cached | DebounceOutcome::Ignored => {}
                }
            }
            FeedMessage::SuggestionsLoaded { query, result } => {
                self.finish_request();
                if let Err(err) = &result {
                    warn!(kind = ?query.kind, generation = query.generation, error = %err, "suggestion query failed");
                    if err.is_auth() {
                        self.notices.push(Notice::error(err.user_message()));
                    }
                }
                let now = self.clock.now();
                self.search
                    .coordinator_mut(query.kind)
                    .apply_response(&query, result, now);
            }
            FeedMessage::AutosaveElapsed { ticket } => {
                if ticket != self.composer.autosave_ticket {
                    return;
                }
                self.autosave_timer = None;
                self.persist_draft();
            }
        }
    }

    fn resolve_interaction(&mut self, request: InteractionRequest, result: FeedResult<Tally>) {
        let resolution = match result {
            Ok(server) => self.board.confirm(&request, server),
            Err(err) => {
                let resolution = self.board.roll_back(&request);
                if resolution != Resolution::Stale {
                    warn!(
                        post_id = request.post_id,
                        kind = ?request.kind,
                        error = %err,
                        "interaction failed, rolled back"
                    );
                    self.report_failure(Some(request.post_id), "Could not update", &err);
                }
                resolution
            }
        };
        match resolution {
            Resolution::FollowUp(next) => self.spawn_interaction(next),
            Resolution::Stale => {
                debug!(post_id = request.post_id, sequence = request.sequence, "ignoring superseded interaction result");
            }
            Resolution::Settled(_) | Resolution::RolledBack(_) => {}
        }
    }

    fn apply_comments(
        &mut self,
        post_id: PostId,
        generation: u64,
        result: FeedResult<Vec<Comment>>,
    ) {
        let Some(thread) = self.threads.get_mut(&post_id) else {
            return;
        };
        if thread.fetch_generation != generation {
            debug!(post_id, generation, "ignoring superseded comment list");
            return;
        }
        thread.is_loading = false;
        match result {
            Ok(comments) => {
                thread.forest = build_forest(&comments);
                thread.error = None;
                thread.supersede_bumps();
                self.board.set_comment_count(post_id, comments.len() as u64);
            }
            Err(err) => {
                thread.error = Some(err.user_message());
                self.report_failure(Some(post_id), "Could not load comments", &err);
            }
        }
    }

    /// Takes back one optimistic +1, unless a fetched count replaced it.
    fn undo_comment_bump(&mut self, post_id: PostId, epoch: u64) {
        let Some(thread) = self.threads.get_mut(&post_id) else {
            return;
        };
        if thread.count_epoch != epoch || thread.unconfirmed_bumps == 0 {
            debug!(post_id, epoch, "comment count already refreshed, nothing to undo");
            return;
        }
        thread.unconfirmed_bumps -= 1;
        if let Some(count) = self.board.post(post_id).map(|p| p.counters.comment_count) {
            self.board.set_comment_count(post_id, count.saturating_sub(1));
        }
    }

    pub(super) fn report_failure(&mut self, post_id: Option<PostId>, what: &str, err: &FeedError) {
        warn!(post_id = ?post_id, error = %err, "{what}");
        let notice = if err.is_auth() {
            Notice::error(err.user_message())
        } else {
            Notice::warning(format!("{what}. {}", err.user_message()))
        };
        self.notices.push(match post_id {
            Some(id) => notice.for_post(id),
            None => notice,
        });
    }
}
