//! Search-as-you-type coordination.
//!
//! The coordinator is a plain state machine: the engine feeds it keystrokes,
//! debounce expiries and responses, and performs whatever timer or request
//! each call asks for. Every fired query gets a fresh generation; only the
//! response for the newest live generation is ever shown.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::FeedError;
use crate::models::{EntityKind, Suggestion};

pub const DEFAULT_SIGIL: char = '@';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionQuery {
    pub text: String,
    pub kind: EntityKind,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// (Re)start the debounce timer; report back with this ticket.
    Schedule { ticket: u64 },
    /// Input too short: cancel the timer, results were cleared.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceOutcome {
    Fire(SuggestionQuery),
    /// Served from the cache, nothing to send.
    Cached,
    /// The timer was superseded by later input.
    Ignored,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    suggestions: Vec<Suggestion>,
    stored_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SearchCoordinator {
    kind: EntityKind,
    min_chars: usize,
    cache_ttl: Duration,
    ticket: u64,
    pending: Option<String>,
    generation: u64,
    live_generation: Option<u64>,
    results: Vec<Suggestion>,
    shown_query: Option<String>,
    message: Option<String>,
    loading: bool,
    cache: HashMap<String, CacheEntry>,
}

impl SearchCoordinator {
    pub fn new(kind: EntityKind, min_chars: usize, cache_ttl: Duration) -> Self {
        Self {
            kind,
            min_chars,
            cache_ttl,
            ticket: 0,
            pending: None,
            generation: 0,
            live_generation: None,
            results: Vec::new(),
            shown_query: None,
            message: None,
            loading: false,
            cache: HashMap::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn results(&self) -> &[Suggestion] {
        &self.results
    }

    /// The query whose results are currently shown.
    pub fn shown_query(&self) -> Option<&str> {
        self.shown_query.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Highest generation handed out so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn input_changed(&mut self, text: &str) -> InputOutcome {
        self.ticket += 1;
        let trimmed = text.trim();
        if trimmed.chars().count() < self.min_chars {
            self.pending = None;
            self.clear_results();
            return InputOutcome::Cancelled;
        }
        self.pending = Some(trimmed.to_string());
        self.loading = true;
        InputOutcome::Schedule { ticket: self.ticket }
    }

    pub fn debounce_elapsed(&mut self, ticket: u64, now: DateTime<Utc>) -> DebounceOutcome {
        if ticket != self.ticket {
            return DebounceOutcome::Ignored;
        }
        let Some(text) = self.pending.take() else {
            return DebounceOutcome::Ignored;
        };
        self.generation += 1;
        self.live_generation = Some(self.generation);

        let key = normalize(&text);
        if let Some(entry) = self.cache.get(&key) {
            if now - entry.stored_at < self.cache_ttl {
                debug!(kind = ?self.kind, query = %text, "suggestions served from cache");
                self.results = entry.suggestions.clone();
                self.shown_query = Some(text);
                self.message = None;
                self.loading = false;
                return DebounceOutcome::Cached;
            }
            self.cache.remove(&key);
        }

        DebounceOutcome::Fire(SuggestionQuery {
            text,
            kind: self.kind,
            generation: self.generation,
        })
    }

    /// Applies a response if it belongs to the newest live generation.
    /// Returns whether it was applied.
    pub fn apply_response(
        &mut self,
        query: &SuggestionQuery,
        result: Result<Vec<Suggestion>, FeedError>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.live_generation != Some(query.generation) {
            debug!(
                kind = ?self.kind,
                generation = query.generation,
                live = ?self.live_generation,
                "discarding stale suggestions"
            );
            return false;
        }
        self.loading = false;
        self.shown_query = Some(query.text.clone());
        match result {
            Ok(suggestions) => {
                if !suggestions.is_empty() {
                    self.cache.insert(
                        normalize(&query.text),
                        CacheEntry {
                            suggestions: suggestions.clone(),
                            stored_at: now,
                        },
                    );
                }
                self.results = suggestions;
                self.message = None;
            }
            Err(err) => {
                self.results.clear();
                self.message = Some(match err {
                    FeedError::Network(_) => "Could not load suggestions.".to_string(),
                    other => other.user_message(),
                });
            }
        }
        true
    }

    /// Drops shown results, pending input and any in-flight generation.
    pub fn reset(&mut self) {
        self.ticket += 1;
        self.pending = None;
        self.clear_results();
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn clear_results(&mut self) {
        self.live_generation = None;
        self.results.clear();
        self.shown_query = None;
        self.message = None;
        self.loading = false;
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutedInput {
    pub kind: EntityKind,
    pub outcome: InputOutcome,
    /// Set when this input moved the search to a different kind.
    pub switched_from: Option<EntityKind>,
}

/// One search box, two coordinators: input starting with the sigil searches
/// users, anything else searches the catalog.
#[derive(Debug)]
pub struct SearchRouter {
    sigil: char,
    catalog: SearchCoordinator,
    users: SearchCoordinator,
    active: EntityKind,
}

impl SearchRouter {
    pub fn new(sigil: char, catalog: SearchCoordinator, users: SearchCoordinator) -> Self {
        Self {
            sigil,
            catalog,
            users,
            active: EntityKind::Catalog,
        }
    }

    pub fn active_kind(&self) -> EntityKind {
        self.active
    }

    pub fn active(&self) -> &SearchCoordinator {
        self.coordinator(self.active)
    }

    pub fn coordinator(&self, kind: EntityKind) -> &SearchCoordinator {
        match kind {
            EntityKind::Catalog => &self.catalog,
            EntityKind::User => &self.users,
        }
    }

    pub fn coordinator_mut(&mut self, kind: EntityKind) -> &mut SearchCoordinator {
        match kind {
            EntityKind::Catalog => &mut self.catalog,
            EntityKind::User => &mut self.users,
        }
    }

    /// Splits raw input into the kind it targets and the query text.
    pub fn parse<'a>(&self, raw: &'a str) -> (EntityKind, &'a str) {
        match raw.trim_start().strip_prefix(self.sigil) {
            Some(rest) => (EntityKind::User, rest),
            None => (EntityKind::Catalog, raw),
        }
    }

    pub fn input_changed(&mut self, raw: &str) -> RoutedInput {
        let (kind, text) = self.parse(raw);
        let switched_from = if kind != self.active {
            let previous = self.active;
            self.coordinator_mut(previous).reset();
            self.active = kind;
            Some(previous)
        } else {
            None
        };
        let outcome = self.coordinator_mut(kind).input_changed(text);
        RoutedInput {
            kind,
            outcome,
            switched_from,
        }
    }

    pub fn reset_all(&mut self) {
        self.catalog.reset();
        self.users.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn suggestion(id: i64, name: &str) -> Suggestion {
        Suggestion {
            id,
            display_name: name.to_string(),
            thumbnail_ref: None,
        }
    }

    fn catalog() -> SearchCoordinator {
        SearchCoordinator::new(EntityKind::Catalog, 2, Duration::minutes(30))
    }

    fn fire(coordinator: &mut SearchCoordinator, text: &str) -> SuggestionQuery {
        let InputOutcome::Schedule { ticket } = coordinator.input_changed(text) else {
            panic!("expected {text:?} to schedule a query");
        };
        match coordinator.debounce_elapsed(ticket, now()) {
            DebounceOutcome::Fire(query) => query,
            other => panic!("expected a fired query, got {other:?}"),
        }
    }

    #[test]
    fn short_input_never_schedules() {
        let mut search = catalog();
        assert_eq!(search.input_changed(" z "), InputOutcome::Cancelled);
        assert_eq!(search.input_changed(""), InputOutcome::Cancelled);
        assert_eq!(search.generation(), 0);
    }

    #[test]
    fn only_the_last_keystroke_fires() {
        let mut search = catalog();
        let InputOutcome::Schedule { ticket: first } = search.input_changed("ze") else {
            panic!("expected schedule");
        };
        let InputOutcome::Schedule { ticket: second } = search.input_changed("zel") else {
            panic!("expected schedule");
        };
        assert_eq!(search.debounce_elapsed(first, now()), DebounceOutcome::Ignored);
        assert_eq!(
            search.debounce_elapsed(second, now()),
            DebounceOutcome::Fire(SuggestionQuery {
                text: "zel".into(),
                kind: EntityKind::Catalog,
                generation: 1,
            })
        );
    }

    #[test]
    fn late_response_for_older_query_is_discarded() {
        let mut search = catalog();
        let older = fire(&mut search, "ze");
        let newer = fire(&mut search, "zel");
        assert!(newer.generation > older.generation);

        assert!(search.apply_response(&newer, Ok(vec![suggestion(2, "Zelda")]), now()));
        assert!(!search.apply_response(&older, Ok(vec![suggestion(1, "Zero")]), now()));

        assert_eq!(search.results(), &[suggestion(2, "Zelda")]);
        assert_eq!(search.shown_query(), Some("zel"));
        assert!(!search.is_loading());
    }

    #[test]
    fn older_response_is_discarded_even_before_the_newer_arrives() {
        let mut search = catalog();
        let older = fire(&mut search, "ze");
        let _newer = fire(&mut search, "zel");
        assert!(!search.apply_response(&older, Ok(vec![suggestion(1, "Zero")]), now()));
        assert!(search.results().is_empty());
    }

    #[test]
    fn failure_shows_message_and_empty_results() {
        let mut search = catalog();
        let first = fire(&mut search, "halo");
        search.apply_response(&first, Ok(vec![suggestion(1, "Halo")]), now());

        let second = fire(&mut search, "halo 2");
        assert!(search.apply_response(
            &second,
            Err(FeedError::Network("timed out".into())),
            now()
        ));
        assert!(search.results().is_empty());
        assert_eq!(search.message(), Some("Could not load suggestions."));
    }

    #[test]
    fn repeated_query_is_served_from_cache_until_expiry() {
        let mut search = catalog();
        let query = fire(&mut search, "Hades");
        search.apply_response(&query, Ok(vec![suggestion(7, "Hades")]), now());
        search.input_changed("x");

        let InputOutcome::Schedule { ticket } = search.input_changed("  hades ") else {
            panic!("expected schedule");
        };
        assert_eq!(search.debounce_elapsed(ticket, now()), DebounceOutcome::Cached);
        assert_eq!(search.results(), &[suggestion(7, "Hades")]);

        let InputOutcome::Schedule { ticket } = search.input_changed("hades") else {
            panic!("expected schedule");
        };
        let later = now() + Duration::minutes(31);
        assert!(matches!(
            search.debounce_elapsed(ticket, later),
            DebounceOutcome::Fire(_)
        ));
    }

    #[test]
    fn empty_responses_are_not_cached() {
        let mut search = catalog();
        let query = fire(&mut search, "qwxz");
        search.apply_response(&query, Ok(Vec::new()), now());
        let again = fire(&mut search, "qwxz");
        assert_eq!(again.generation, 2);
    }

    #[test]
    fn cleared_cache_sends_the_query_again() {
        let mut search = catalog();
        let query = fire(&mut search, "hades");
        search.apply_response(&query, Ok(vec![suggestion(7, "Hades")]), now());

        let InputOutcome::Schedule { ticket } = search.input_changed("hades") else {
            panic!("expected schedule");
        };
        assert_eq!(search.debounce_elapsed(ticket, now()), DebounceOutcome::Cached);

        search.clear_cache();
        let again = fire(&mut search, "hades");
        assert_eq!(again.text, "hades");
        assert_eq!(again.generation, 3);
    }

    #[test]
    fn sigil_routes_to_users_with_shorter_minimum() {
        let mut router = SearchRouter::new(
            DEFAULT_SIGIL,
            catalog(),
            SearchCoordinator::new(EntityKind::User, 1, Duration::minutes(30)),
        );
        assert_eq!(router.parse("@k"), (EntityKind::User, "k"));
        assert_eq!(router.parse("kirby"), (EntityKind::Catalog, "kirby"));

        let routed = router.input_changed("@");
        assert_eq!(routed.kind, EntityKind::User);
        assert_eq!(routed.outcome, InputOutcome::Cancelled);
        assert_eq!(routed.switched_from, Some(EntityKind::Catalog));

        let routed = router.input_changed("@k");
        assert!(matches!(routed.outcome, InputOutcome::Schedule { .. }));
        assert_eq!(routed.switched_from, None);
    }

    #[test]
    fn switching_kind_clears_the_other_kind() {
        let mut router = SearchRouter::new(
            DEFAULT_SIGIL,
            catalog(),
            SearchCoordinator::new(EntityKind::User, 1, Duration::minutes(30)),
        );
        let RoutedInput {
            outcome: InputOutcome::Schedule { ticket },
            ..
        } = router.input_changed("portal")
        else {
            panic!("expected schedule");
        };
        let DebounceOutcome::Fire(query) = router
            .coordinator_mut(EntityKind::Catalog)
            .debounce_elapsed(ticket, now())
        else {
            panic!("expected fire");
        };

        router.input_changed("@gl");
        let catalog = router.coordinator_mut(EntityKind::Catalog);
        assert!(!catalog.apply_response(&query, Ok(vec![suggestion(1, "Portal")]), now()));
        assert!(catalog.results().is_empty());
        assert_eq!(router.active_kind(), EntityKind::User);
    }
}
