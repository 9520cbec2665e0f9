//! Client-side engine for the game review feed: optimistic likes and reposts,
//! threaded comments, search-as-you-type and composer drafts.

pub mod api;
pub mod clock;
pub mod comments;
pub mod config;
pub mod drafts;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod interactions;
pub mod models;
pub mod search;
pub mod storage;
pub mod telemetry;

pub use api::HttpGateway;
pub use engine::FeedEngine;
pub use error::{FeedError, FeedResult};
pub use gateway::FeedGateway;
