use anyhow::{bail, Result};
use gamefeed_engine::drafts::Draft;
use gamefeed_engine::engine::{FeedEngine, NoticeLevel};
use gamefeed_engine::models::{CommentId, EntityId, InteractionKind, Post, PostId};

/// Loads one post into the engine, failing if the backend does not have it.
async fn load_post(engine: &mut FeedEngine, post_id: PostId) -> Result<()> {
    engine.load_posts([post_id]);
    engine.run_until_idle().await;
    if engine.post(post_id).is_none() {
        print_notices(engine);
        bail!("post {post_id} not found");
    }
    Ok(())
}

pub async fn like(engine: &mut FeedEngine, post_id: PostId) -> Result<()> {
    load_post(engine, post_id).await?;
    engine.toggle(post_id, InteractionKind::Like)?;
    engine.run_until_idle().await;
    print_post(engine, post_id);
    print_notices(engine);
    Ok(())
}

pub async fn repost(engine: &mut FeedEngine, post_id: PostId, commentary: Option<&str>) -> Result<()> {
    load_post(engine, post_id).await?;
    match commentary {
        Some(text) => engine.repost_with_commentary(post_id, text)?,
        None => engine.toggle(post_id, InteractionKind::Repost)?,
    }
    engine.run_until_idle().await;
    print_post(engine, post_id);
    print_notices(engine);
    Ok(())
}

pub async fn comments(engine: &mut FeedEngine, post_id: PostId) -> Result<()> {
    engine.open_comments(post_id);
    engine.run_until_idle().await;
    print_thread(engine, post_id);
    print_notices(engine);
    Ok(())
}

pub async fn comment(
    engine: &mut FeedEngine,
    post_id: PostId,
    parent_id: Option<CommentId>,
    body: &str,
) -> Result<()> {
    load_post(engine, post_id).await?;
    engine.submit_comment(post_id, parent_id, body)?;
    engine.run_until_idle().await;
    print_post(engine, post_id);
    print_thread(engine, post_id);
    print_notices(engine);
    Ok(())
}

pub async fn suggest(engine: &mut FeedEngine, text: &str) -> Result<()> {
    engine.search_input(text);
    engine.run_until_idle().await;
    let coordinator = engine.search().active();
    if let Some(message) = coordinator.message() {
        println!("{message}");
    } else if coordinator.results().is_empty() {
        println!("No {} matches.", coordinator.kind().as_str());
    }
    for suggestion in coordinator.results() {
        println!("{:>8}  {}", suggestion.id, suggestion.display_name);
    }
    print_notices(engine);
    Ok(())
}

pub fn draft_save(
    engine: &mut FeedEngine,
    target_entity_id: Option<EntityId>,
    target_display_name: String,
    attachment_ref: Option<String>,
    body: String,
) -> Result<()> {
    engine.edit_draft(Draft {
        target_entity_id,
        target_display_name,
        body,
        attachment_ref,
    });
    engine.save_draft_now();
    let saved_at = engine.composer().last_saved.as_ref().map(|saved| saved.saved_at);
    match saved_at {
        Some(at) => println!("Draft saved at {}", at.to_rfc3339()),
        None => print_notices(engine),
    }
    Ok(())
}

pub fn draft_show(engine: &mut FeedEngine) -> Result<()> {
    match engine.restore_draft() {
        Some(draft) => {
            if let Some(saved) = &engine.composer().last_saved {
                println!("Saved at {}", saved.saved_at.to_rfc3339());
            }
            match draft.target_entity_id {
                Some(id) => println!("Review of {} ({id})", draft.target_display_name),
                None => println!("Review (no game selected)"),
            }
            if let Some(attachment) = &draft.attachment_ref {
                println!("Attachment: {attachment}");
            }
            println!();
            println!("{}", draft.body);
        }
        None => println!("No saved draft."),
    }
    print_notices(engine);
    Ok(())
}

pub fn draft_clear(engine: &mut FeedEngine) -> Result<()> {
    engine.finish_draft();
    println!("Draft cleared.");
    Ok(())
}

pub async fn delete(engine: &mut FeedEngine, post_id: PostId) -> Result<()> {
    engine.delete_post(post_id);
    engine.run_until_idle().await;
    if engine.notices().is_empty() {
        println!("Post {post_id} deleted.");
    }
    print_notices(engine);
    Ok(())
}

pub async fn posts(engine: &mut FeedEngine, ids: Vec<PostId>) -> Result<()> {
    engine.load_posts(ids);
    engine.run_until_idle().await;
    let loaded: Vec<PostId> = engine.posts().map(|post| post.id).collect();
    if loaded.is_empty() {
        println!("No posts found.");
    }
    for post_id in loaded {
        print_post(engine, post_id);
    }
    print_notices(engine);
    Ok(())
}

fn print_post(engine: &FeedEngine, post_id: PostId) {
    let Some(post) = engine.post(post_id) else {
        return;
    };
    println!("{}", format_post(post));
}

fn format_post(post: &Post) -> String {
    let liked = if post.viewer.has_liked { "♥" } else { "♡" };
    let reposted = if post.viewer.has_reposted { " (reposted)" } else { "" };
    format!(
        "#{} by {}: {}\n    {liked} {}  ⟲ {}{reposted}  💬 {}",
        post.id,
        post.author_id,
        post.content.text.as_deref().unwrap_or("[media]"),
        post.counters.like_count,
        post.counters.repost_count,
        post.counters.comment_count,
    )
}

fn print_thread(engine: &FeedEngine, post_id: PostId) {
    let Some(thread) = engine.comments(post_id) else {
        return;
    };
    if let Some(error) = &thread.error {
        println!("Comments unavailable: {error}");
        return;
    }
    if thread.forest.is_empty() {
        println!("No comments yet.");
        return;
    }
    for (depth, comment) in thread.forest.walk() {
        println!(
            "{}[{}] {}: {}",
            "  ".repeat(depth),
            comment.id,
            comment.author_name,
            comment.body
        );
    }
}

fn print_notices(engine: &mut FeedEngine) {
    for notice in engine.take_notices() {
        let label = match notice.level {
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        match notice.post_id {
            Some(post_id) => eprintln!("{label} (post {post_id}): {}", notice.message),
            None => eprintln!("{label}: {}", notice.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gamefeed_engine::models::PostSummary;

    #[test]
    fn post_line_shows_viewer_state_and_counters() {
        let post: Post = PostSummary {
            id: 3,
            author_id: 9,
            text: Some("Loved it".into()),
            media_ref: None,
            like_count: 6,
            repost_count: 1,
            comment_count: 4,
            has_liked: true,
            has_reposted: false,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
        .into();
        assert_eq!(
            format_post(&post),
            "#3 by 9: Loved it\n    ♥ 6  ⟲ 1  💬 4"
        );
    }
}
