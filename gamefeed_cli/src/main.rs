use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gamefeed_engine::clock::SystemClock;
use gamefeed_engine::config::FeedConfig;
use gamefeed_engine::models::{CommentId, EntityId, PostId};
use gamefeed_engine::storage::FileStore;
use gamefeed_engine::telemetry;
use gamefeed_engine::{FeedEngine, HttpGateway};

mod commands;

#[derive(Parser)]
#[command(author, version, about = "Game review feed client")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Toggle your like on a post
    Like { post: PostId },
    /// Toggle your repost, or repost with commentary
    Repost {
        post: PostId,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Print the comment thread of a post
    Comments { post: PostId },
    /// Comment on a post, optionally as a reply
    Comment {
        post: PostId,
        #[arg(long)]
        parent: Option<CommentId>,
        body: String,
    },
    /// Look up games, or users when the text starts with the user sigil
    Suggest { text: String },
    /// Manage the review draft
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
    /// Delete one of your posts
    Delete { post: PostId },
    /// Fetch posts by id
    Posts {
        #[arg(required = true)]
        ids: Vec<PostId>,
    },
}

#[derive(Subcommand)]
enum DraftAction {
    /// Overwrite the draft slot
    Save {
        #[arg(long)]
        target_id: Option<EntityId>,
        #[arg(long, default_value = "")]
        target_name: String,
        #[arg(long)]
        attachment: Option<String>,
        body: String,
    },
    /// Print the draft if it has not expired
    Show,
    /// Empty the draft slot
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let args = Args::parse();

    let config = FeedConfig::from_env().context("failed to load configuration")?;
    let store = Arc::new(FileStore::new(config.paths.store_path.clone()));
    let gateway = HttpGateway::new(
        &config.api.base_url,
        config.api.request_timeout,
        store.clone(),
    )
    .context("failed to set up the API client")?;
    tracing::debug!(
        api = gateway.base_url(),
        store = %store.path().display(),
        "client configured"
    );

    let mut engine = FeedEngine::new(Arc::new(gateway), store, Arc::new(SystemClock), &config);

    match args.command {
        Command::Like { post } => commands::like(&mut engine, post).await,
        Command::Repost { post, comment } => {
            commands::repost(&mut engine, post, comment.as_deref()).await
        }
        Command::Comments { post } => commands::comments(&mut engine, post).await,
        Command::Comment { post, parent, body } => {
            commands::comment(&mut engine, post, parent, &body).await
        }
        Command::Suggest { text } => commands::suggest(&mut engine, &text).await,
        Command::Draft { action } => match action {
            DraftAction::Save {
                target_id,
                target_name,
                attachment,
                body,
            } => commands::draft_save(&mut engine, target_id, target_name, attachment, body),
            DraftAction::Show => commands::draft_show(&mut engine),
            DraftAction::Clear => commands::draft_clear(&mut engine),
        },
        Command::Delete { post } => commands::delete(&mut engine, post).await,
        Command::Posts { ids } => commands::posts(&mut engine, ids).await,
    }
}
