use crate::comments::CommentForest;
use crate::drafts::{Draft, SavedDraft};
use crate::models::PostId;

#[derive(Debug, Default)]
pub struct CommentThreadState {
    pub forest: CommentForest,
    pub is_loading: bool,
    pub error: Option<String>,
    pub submit_error: Option<String>,
    /// Tags each list request; only the newest one may replace the forest.
    pub(super) fetch_generation: u64,
    pub(super) submissions_in_flight: u32,
    /// Optimistic +1s on the post's comment count not yet replaced by a
    /// fetched list. Bumps from an older epoch were already superseded.
    pub(super) unconfirmed_bumps: u32,
    pub(super) count_epoch: u64,
}

impl CommentThreadState {
    pub fn is_submitting(&self) -> bool {
        self.submissions_in_flight > 0
    }

    /// Forgets outstanding bumps once the count came from the server.
    pub(super) fn supersede_bumps(&mut self) {
        self.count_epoch += 1;
        self.unconfirmed_bumps = 0;
    }
}

#[derive(Debug, Default)]
pub struct ComposerState {
    pub draft: Option<Draft>,
    pub last_saved: Option<SavedDraft>,
    pub(super) autosave_ticket: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// A recoverable event for the view layer to surface inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub post_id: Option<PostId>,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
            post_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            post_id: None,
        }
    }

    pub fn for_post(mut self, post_id: PostId) -> Self {
        self.post_id = Some(post_id);
        self
    }
}
