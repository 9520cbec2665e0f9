//! The effect layer: owns the reducers, runs gateway calls and timers as tokio
//! tasks, and folds their results back in on the owner's turn.
//!
//! A `FeedEngine` is meant to be owned by one UI loop. Spawned tasks never
//! touch its state; they post a message that is applied by
//! [`FeedEngine::process_messages`] or [`FeedEngine::next_message`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::comments::MAX_COMMENT_CHARS;
use crate::config::FeedConfig;
use crate::drafts::{Draft, DraftPersistence};
use crate::error::{FeedError, FeedResult};
use crate::gateway::FeedGateway;
use crate::interactions::InteractionBoard;
use crate::models::{CommentId, EntityKind, InteractionKind, Post, PostId, PostSummary, Suggestion};
use crate::search::{InputOutcome, SearchCoordinator, SearchRouter};
use crate::storage::KeyValueStore;

mod messages;
mod spawners;
mod state;
mod tasks;

use messages::FeedMessage;

pub use state::{CommentThreadState, ComposerState, Notice, NoticeLevel};

pub struct FeedEngine {
    gateway: Arc<dyn FeedGateway>,
    clock: Arc<dyn Clock>,
    tx: UnboundedSender<FeedMessage>,
    rx: UnboundedReceiver<FeedMessage>,
    board: InteractionBoard,
    threads: HashMap<PostId, CommentThreadState>,
    search: SearchRouter,
    search_debounce: Duration,
    search_timers: HashMap<EntityKind, (u64, JoinHandle<()>)>,
    drafts: DraftPersistence,
    composer: ComposerState,
    autosave_delay: Duration,
    autosave_timer: Option<JoinHandle<()>>,
    notices: Vec<Notice>,
    in_flight: usize,
}

impl FeedEngine {
    pub fn new(
        gateway: Arc<dyn FeedGateway>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &FeedConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cache_ttl = to_chrono(config.search.cache_ttl);
        let search = SearchRouter::new(
            config.search.user_sigil,
            SearchCoordinator::new(
                EntityKind::Catalog,
                config.search.catalog_min_chars,
                cache_ttl,
            ),
            SearchCoordinator::new(EntityKind::User, config.search.user_min_chars, cache_ttl),
        );
        let drafts = DraftPersistence::new(store, clock.clone(), to_chrono(config.drafts.ttl));
        Self {
            gateway,
            clock,
            tx,
            rx,
            board: InteractionBoard::new(),
            threads: HashMap::new(),
            search,
            search_debounce: config.search.debounce,
            search_timers: HashMap::new(),
            drafts,
            composer: ComposerState::default(),
            autosave_delay: config.drafts.idle_delay,
            autosave_timer: None,
            notices: Vec::new(),
            in_flight: 0,
        }
    }

    /// Applies every message that has already arrived. Returns how many.
    pub fn process_messages(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Waits for the next message and applies it.
    pub async fn next_message(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => {
                self.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// No request in flight and no timer pending.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.search_timers.is_empty() && self.autosave_timer.is_none()
    }

    pub async fn run_until_idle(&mut self) {
        while !self.is_idle() {
            if !self.next_message().await {
                break;
            }
        }
    }

    /// Cancels pending timers. In-flight requests still finish, but their
    /// results are only applied if messages are processed again.
    pub fn shutdown(&mut self) {
        for kind in [EntityKind::Catalog, EntityKind::User] {
            self.cancel_search_timer(kind);
        }
        self.cancel_autosave_timer();
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Inserts or replaces posts. A replaced post's comment count is the
    /// server's, so earlier optimistic bumps no longer apply to it.
    pub fn insert_posts(&mut self, posts: impl IntoIterator<Item = PostSummary>) {
        for summary in posts {
            if let Some(thread) = self.threads.get_mut(&summary.id) {
                thread.supersede_bumps();
            }
            self.board.upsert(summary.into());
        }
    }

    /// Fetches posts into the feed, in bulk when the backend allows it.
    pub fn load_posts(&mut self, ids: impl IntoIterator<Item = PostId>) {
        let ids: BTreeSet<PostId> = ids.into_iter().collect();
        if ids.is_empty() {
            return;
        }
        self.in_flight += 1;
        tasks::load_posts(self.gateway.clone(), self.tx.clone(), ids);
    }

    /// Drops a post and its comment thread, e.g. on navigation away.
    pub fn forget_post(&mut self, post_id: PostId) {
        self.board.remove(post_id);
        self.threads.remove(&post_id);
    }

    pub fn post(&self, post_id: PostId) -> Option<&Post> {
        self.board.post(post_id)
    }

    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.board.posts()
    }

    pub fn is_pending(&self, post_id: PostId, kind: InteractionKind) -> bool {
        self.board.is_pending(post_id, kind)
    }

    pub fn toggle(&mut self, post_id: PostId, kind: InteractionKind) -> FeedResult<()> {
        if let Some(request) = self.board.toggle(post_id, kind)? {
            self.spawn_interaction(request);
        }
        Ok(())
    }

    pub fn toggle_like(&mut self, post_id: PostId) -> FeedResult<()> {
        self.toggle(post_id, InteractionKind::Like)
    }

    pub fn toggle_repost(&mut self, post_id: PostId) -> FeedResult<()> {
        self.toggle(post_id, InteractionKind::Repost)
    }

    pub fn repost_with_commentary(&mut self, post_id: PostId, commentary: &str) -> FeedResult<()> {
        let request = self.board.repost_with_commentary(post_id, commentary)?;
        self.spawn_interaction(request);
        Ok(())
    }

    pub fn delete_post(&mut self, post_id: PostId) {
        self.in_flight += 1;
        tasks::delete_post(self.gateway.clone(), self.tx.clone(), post_id);
    }

    /// (Re)fetches the whole comment list of a post.
    pub fn open_comments(&mut self, post_id: PostId) {
        self.spawn_load_comments(post_id);
    }

    pub fn comments(&self, post_id: PostId) -> Option<&CommentThreadState> {
        self.threads.get(&post_id)
    }

    /// Counts the comment immediately, sends it, and re-fetches the thread once
    /// the server accepted it.
    pub fn submit_comment(
        &mut self,
        post_id: PostId,
        parent_id: Option<CommentId>,
        body: &str,
    ) -> FeedResult<()> {
        let body = body.trim();
        if body.is_empty() {
            return Err(FeedError::Validation("Comment cannot be empty".into()));
        }
        if body.chars().count() > MAX_COMMENT_CHARS {
            return Err(FeedError::Validation(format!(
                "Comments are limited to {MAX_COMMENT_CHARS} characters"
            )));
        }

        let bumped = self.board.bump_comment_count(post_id).is_some();
        let thread = self.threads.entry(post_id).or_default();
        thread.submissions_in_flight += 1;
        thread.submit_error = None;
        let bump_epoch = if bumped {
            thread.unconfirmed_bumps += 1;
            Some(thread.count_epoch)
        } else {
            None
        };
        self.spawn_create_comment(post_id, parent_id, body.to_string(), bump_epoch);
        Ok(())
    }

    pub fn search_input(&mut self, raw: &str) {
        let routed = self.search.input_changed(raw);
        if let Some(previous) = routed.switched_from {
            self.cancel_search_timer(previous);
        }
        match routed.outcome {
            InputOutcome::Schedule { ticket } => self.restart_search_timer(routed.kind, ticket),
            InputOutcome::Cancelled => self.cancel_search_timer(routed.kind),
        }
    }

    pub fn search(&self) -> &SearchRouter {
        &self.search
    }

    /// Suggestions of the kind the search box currently targets.
    pub fn suggestions(&self) -> &[Suggestion] {
        self.search.active().results()
    }

    pub fn clear_search(&mut self) {
        for kind in [EntityKind::Catalog, EntityKind::User] {
            self.cancel_search_timer(kind);
        }
        self.search.reset_all();
    }

    /// Records the composer's contents and restarts the idle autosave timer.
    pub fn edit_draft(&mut self, draft: Draft) {
        self.composer.draft = Some(draft);
        self.restart_autosave_timer();
    }

    pub fn save_draft_now(&mut self) {
        self.cancel_autosave_timer();
        self.persist_draft();
    }

    /// Loads a surviving draft into the composer.
    pub fn restore_draft(&mut self) -> Option<Draft> {
        match self.drafts.load() {
            Ok(Some(saved)) => {
                debug!(saved_at = %saved.saved_at, "draft restored");
                self.composer.draft = Some(saved.draft.clone());
                self.composer.last_saved = Some(saved.clone());
                Some(saved.draft)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "failed to read draft");
                self.notices.push(Notice::warning("Saved draft could not be read."));
                None
            }
        }
    }

    /// Call after the composed review was submitted successfully.
    pub fn finish_draft(&mut self) {
        self.cancel_autosave_timer();
        self.composer = ComposerState {
            autosave_ticket: self.composer.autosave_ticket,
            ..ComposerState::default()
        };
        if let Err(err) = self.drafts.clear() {
            warn!(error = %err, "failed to clear draft");
        }
    }

    pub fn composer(&self) -> &ComposerState {
        &self.composer
    }
}

impl Drop for FeedEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}
