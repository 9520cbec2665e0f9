//! Autosave slot for the review composer.
//!
//! There is exactly one slot per installation, not one per target or user:
//! opening a second composer before the first draft expires reads and
//! overwrites the same value. Keying by (user, composition context) would fix
//! that but changes what earlier clients stored, so it is left as is.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::models::EntityId;
use crate::storage::KeyValueStore;

pub const DRAFT_STORAGE_KEY: &str = "reviewDraft";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    pub target_entity_id: Option<EntityId>,
    pub target_display_name: String,
    pub body: String,
    pub attachment_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDraft {
    pub draft: Draft,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDraft {
    target_entity_id: Option<EntityId>,
    target_display_name: String,
    body: String,
    attachment_ref: Option<String>,
    saved_at_epoch: i64,
}

pub struct DraftPersistence {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl DraftPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Overwrites the slot with `draft`, stamped with the current time.
    pub fn save(&self, draft: &Draft) -> Result<SavedDraft, StoreError> {
        let saved_at = self.clock.now();
        let stored = StoredDraft {
            target_entity_id: draft.target_entity_id,
            target_display_name: draft.target_display_name.clone(),
            body: draft.body.clone(),
            attachment_ref: draft.attachment_ref.clone(),
            saved_at_epoch: saved_at.timestamp_millis(),
        };
        self.store
            .set(DRAFT_STORAGE_KEY, &serde_json::to_string(&stored)?)?;
        debug!(chars = draft.body.chars().count(), "draft saved");
        Ok(SavedDraft {
            draft: draft.clone(),
            saved_at,
        })
    }

    /// Returns the stored draft unless it is older than the TTL or unreadable,
    /// in which case the slot is emptied.
    pub fn load(&self) -> Result<Option<SavedDraft>, StoreError> {
        let Some(raw) = self.store.get(DRAFT_STORAGE_KEY)? else {
            return Ok(None);
        };

        let parsed = serde_json::from_str::<StoredDraft>(&raw)
            .ok()
            .and_then(|stored| {
                let saved_at = Utc.timestamp_millis_opt(stored.saved_at_epoch).single()?;
                Some((stored, saved_at))
            });
        let Some((stored, saved_at)) = parsed else {
            warn!("discarding unreadable draft");
            self.store.delete(DRAFT_STORAGE_KEY)?;
            return Ok(None);
        };

        let age = self.clock.now() - saved_at;
        if age > self.ttl {
            debug!(age_minutes = age.num_minutes(), "discarding expired draft");
            self.store.delete(DRAFT_STORAGE_KEY)?;
            return Ok(None);
        }

        Ok(Some(SavedDraft {
            draft: Draft {
                target_entity_id: stored.target_entity_id,
                target_display_name: stored.target_display_name,
                body: stored.body,
                attachment_ref: stored.attachment_ref,
            },
            saved_at,
        }))
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(DRAFT_STORAGE_KEY)
    }
}
