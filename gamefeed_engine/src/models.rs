use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PostId = i64;
pub type CommentId = i64;
pub type EntityId = i64;

/// Which entity family a suggestion query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Catalog,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Catalog => "catalog",
            EntityKind::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Like,
    Repost,
}

/// A viewer flag together with the counter it contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub active: bool,
    pub count: u64,
}

impl Tally {
    pub fn new(active: bool, count: u64) -> Self {
        Self { active, count }
    }

    /// The optimistic result of toggling: flag inverted, counter moved by one.
    pub fn flipped(self) -> Self {
        if self.active {
            Self {
                active: false,
                count: self.count.saturating_sub(1),
            }
        } else {
            Self {
                active: true,
                count: self.count + 1,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: PostId,
    pub author_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub repost_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub has_liked: bool,
    #[serde(default)]
    pub has_reposted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostContent {
    pub text: Option<String>,
    pub media_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub like_count: u64,
    pub repost_count: u64,
    pub comment_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewerFlags {
    pub has_liked: bool,
    pub has_reposted: bool,
}

/// A review as held in the feed. Only the interaction board mutates the
/// counters and viewer flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub author_id: i64,
    pub content: PostContent,
    pub counters: Counters,
    pub viewer: ViewerFlags,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn tally(&self, kind: InteractionKind) -> Tally {
        match kind {
            InteractionKind::Like => Tally::new(self.viewer.has_liked, self.counters.like_count),
            InteractionKind::Repost => {
                Tally::new(self.viewer.has_reposted, self.counters.repost_count)
            }
        }
    }

    pub fn set_tally(&mut self, kind: InteractionKind, tally: Tally) {
        match kind {
            InteractionKind::Like => {
                self.viewer.has_liked = tally.active;
                self.counters.like_count = tally.count;
            }
            InteractionKind::Repost => {
                self.viewer.has_reposted = tally.active;
                self.counters.repost_count = tally.count;
            }
        }
    }
}

impl From<PostSummary> for Post {
    fn from(summary: PostSummary) -> Self {
        Self {
            id: summary.id,
            author_id: summary.author_id,
            content: PostContent {
                text: summary.text,
                media_ref: summary.media_ref,
            },
            counters: Counters {
                like_count: summary.like_count,
                repost_count: summary.repost_count,
                comment_count: summary.comment_count,
            },
            viewer: ViewerFlags {
                has_liked: summary.has_liked,
                has_reposted: summary.has_reposted,
            },
            created_at: summary.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatus {
    pub liked: bool,
    pub like_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepostStatus {
    pub reposted: bool,
    pub repost_count: u64,
}

impl From<LikeStatus> for Tally {
    fn from(status: LikeStatus) -> Self {
        Tally::new(status.liked, status.like_count)
    }
}

impl From<RepostStatus> for Tally {
    fn from(status: RepostStatus) -> Self {
        Tally::new(status.reposted, status.repost_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub author_name: String,
    pub body: String,
    #[serde(default)]
    pub media_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: EntityId,
    pub display_name: String,
    #[serde(default)]
    pub thumbnail_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepostInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionQueryInput {
    pub query: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkPostsInput {
    pub ids: Vec<PostId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flipping_moves_counter_with_flag() {
        let off = Tally::new(false, 5);
        assert_eq!(off.flipped(), Tally::new(true, 6));
        assert_eq!(off.flipped().flipped(), off);
    }

    #[test]
    fn flipping_an_active_zero_counter_does_not_underflow() {
        assert_eq!(Tally::new(true, 0).flipped(), Tally::new(false, 0));
    }

    #[test]
    fn comment_wire_shape_tolerates_missing_optionals() {
        let raw = r#"{"id":7,"authorName":"mika","body":"nice","createdAt":"2024-05-01T10:00:00Z"}"#;
        let comment: Comment = serde_json::from_str(raw).expect("decode comment");
        assert_eq!(comment.parent_id, None);
        assert_eq!(comment.author_name, "mika");
        assert_eq!(comment.media_ref, None);
    }
}
