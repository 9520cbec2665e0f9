use tracing::warn;

use crate::interactions::InteractionRequest;
use crate::models::{CommentId, EntityKind, PostId};
use crate::search::SuggestionQuery;

use super::messages::FeedMessage;
use super::state::Notice;
use super::tasks;
use super::FeedEngine;

impl FeedEngine {
    pub(super) fn spawn_interaction(&mut self, request: InteractionRequest) {
        self.in_flight += 1;
        tasks::run_interaction(self.gateway.clone(), self.tx.clone(), request);
    }

    pub(super) fn spawn_load_comments(&mut self, post_id: PostId) {
        let thread = self.threads.entry(post_id).or_default();
        thread.fetch_generation += 1;
        thread.is_loading = true;
        thread.error = None;
        let generation = thread.fetch_generation;
        self.in_flight += 1;
        tasks::load_comments(self.gateway.clone(), self.tx.clone(), post_id, generation);
    }

    pub(super) fn spawn_create_comment(
        &mut self,
        post_id: PostId,
        parent_id: Option<CommentId>,
        body: String,
        bump_epoch: Option<u64>,
    ) {
        self.in_flight += 1;
        tasks::create_comment(
            self.gateway.clone(),
            self.tx.clone(),
            post_id,
            parent_id,
            body,
            bump_epoch,
        );
    }

    pub(super) fn spawn_search(&mut self, query: SuggestionQuery) {
        self.in_flight += 1;
        tasks::search_suggestions(self.gateway.clone(), self.tx.clone(), query);
    }

    pub(super) fn restart_search_timer(&mut self, kind: EntityKind, ticket: u64) {
        self.cancel_search_timer(kind);
        let handle = tasks::schedule(
            self.tx.clone(),
            self.search_debounce,
            FeedMessage::SearchDebounceElapsed { kind, ticket },
        );
        self.search_timers.insert(kind, (ticket, handle));
    }

    pub(super) fn cancel_search_timer(&mut self, kind: EntityKind) {
        if let Some((_, handle)) = self.search_timers.remove(&kind) {
            handle.abort();
        }
    }

    pub(super) fn restart_autosave_timer(&mut self) {
        self.cancel_autosave_timer();
        self.composer.autosave_ticket += 1;
        let ticket = self.composer.autosave_ticket;
        self.autosave_timer = Some(tasks::schedule(
            self.tx.clone(),
            self.autosave_delay,
            FeedMessage::AutosaveElapsed { ticket },
        ));
    }

    pub(super) fn cancel_autosave_timer(&mut self) {
        if let Some(handle) = self.autosave_timer.take() {
            handle.abort();
        }
    }

    /// Writes the composer's current draft to the slot, best effort.
    pub(super) fn persist_draft(&mut self) {
        let Some(draft) = self.composer.draft.clone() else {
            return;
        };
        match self.drafts.save(&draft) {
            Ok(saved) => self.composer.last_saved = Some(saved),
            Err(err) => {
                warn!(error = %err, "failed to save draft");
                self.notices.push(Notice::warning("Draft could not be saved."));
            }
        }
    }

    pub(super) fn finish_request(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}
