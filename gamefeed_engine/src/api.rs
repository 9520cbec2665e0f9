use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{FeedError, FeedResult};
use crate::gateway::FeedGateway;
use crate::models::{
    BulkPostsInput, Comment, CommentId, CreateCommentInput, EntityKind, LikeStatus, PostId,
    PostSummary, RepostInput, RepostStatus, Suggestion, SuggestionQueryInput,
};
use crate::storage::{KeyValueStore, AUTH_TOKEN_KEY};

/// [`FeedGateway`] over the review backend's JSON API.
#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    client: Client,
    credentials: Arc<dyn KeyValueStore>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "error")]
    message: Option<String>,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let base = sanitize_base_url(base_url.into())?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base,
            client,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> FeedResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| FeedError::Network(format!("invalid base URL: {err}")))?;
        url.set_path(path.trim_start_matches('/'));
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credentials.get(AUTH_TOKEN_KEY) {
            Ok(Some(token)) if !token.is_empty() => request.bearer_auth(token),
            Ok(_) => request,
            Err(err) => {
                warn!(error = %err, "could not read stored credential");
                request
            }
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> FeedResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| transport_error(err, what))?;
        self.check_status(response, what).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> FeedResult<T> {
        let response = self.send(request, what).await?;
        response
            .json()
            .await
            .map_err(|err| FeedError::Network(format!("{what}: invalid response: {err}")))
    }

    async fn check_status(&self, response: Response, what: &str) -> FeedResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let raw = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&raw)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| format!("{what} failed with status {status}"));

        Err(self.rejection(status, detail))
    }

    /// Maps a failed status to a `FeedError`. A 401 also drops the stored
    /// token, which is useless to every later request.
    fn rejection(&self, status: StatusCode, detail: String) -> FeedError {
        if status == StatusCode::UNAUTHORIZED {
            if let Err(err) = self.credentials.delete(AUTH_TOKEN_KEY) {
                warn!(error = %err, "failed to clear stored credential");
            }
        }
        status_error(status, detail)
    }
}

fn status_error(status: StatusCode, detail: String) -> FeedError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FeedError::Auth(detail),
        StatusCode::NOT_FOUND => FeedError::NotFound(detail),
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => FeedError::Validation(detail),
        _ => FeedError::Network(detail),
    }
}

#[async_trait]
impl FeedGateway for HttpGateway {
    async fn toggle_like(&self, post_id: PostId) -> FeedResult<LikeStatus> {
        let url = self.url(&format!("/posts/{post_id}/like"))?;
        self.send_json(self.client.post(url), "toggle like").await
    }

    async fn toggle_repost(
        &self,
        post_id: PostId,
        commentary: Option<String>,
    ) -> FeedResult<RepostStatus> {
        let url = self.url(&format!("/posts/{post_id}/repost"))?;
        let request = self.client.post(url).json(&RepostInput { commentary });
        self.send_json(request, "toggle repost").await
    }

    async fn list_comments(&self, post_id: PostId) -> FeedResult<Vec<Comment>> {
        let url = self.url(&format!("/posts/{post_id}/comments"))?;
        self.send_json(self.client.get(url), "list comments").await
    }

    async fn create_comment(
        &self,
        post_id: PostId,
        parent_id: Option<CommentId>,
        body: &str,
    ) -> FeedResult<()> {
        let url = self.url(&format!("/posts/{post_id}/comments"))?;
        let payload = CreateCommentInput {
            parent_id,
            body: body.to_string(),
        };
        self.send(self.client.post(url).json(&payload), "create comment")
            .await?;
        Ok(())
    }

    async fn delete_post(&self, post_id: PostId) -> FeedResult<()> {
        let url = self.url(&format!("/posts/{post_id}"))?;
        self.send(self.client.delete(url), "delete post").await?;
        Ok(())
    }

    async fn search_suggestions(
        &self,
        query: &str,
        kind: EntityKind,
    ) -> FeedResult<Vec<Suggestion>> {
        let url = self.url("/suggestions")?;
        let payload = SuggestionQueryInput {
            query: query.to_string(),
            kind,
        };
        self.send_json(self.client.post(url).json(&payload), "search suggestions")
            .await
    }

    async fn fetch_post(&self, post_id: PostId) -> FeedResult<PostSummary> {
        let url = self.url(&format!("/posts/{post_id}"))?;
        self.send_json(self.client.get(url), "fetch post").await
    }

    async fn fetch_posts_bulk(
        &self,
        ids: &BTreeSet<PostId>,
    ) -> FeedResult<Option<HashMap<PostId, PostSummary>>> {
        let url = self.url("/posts/bulk")?;
        let payload = BulkPostsInput {
            ids: ids.iter().copied().collect(),
        };
        let response = self
            .authorize(self.client.post(url).json(&payload))
            .send()
            .await
            .map_err(|err| transport_error(err, "bulk fetch posts"))?;

        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            debug!(status = %response.status(), "bulk endpoint not offered by backend");
            return Ok(None);
        }

        let response = self.check_status(response, "bulk fetch posts").await?;
        let posts: HashMap<PostId, PostSummary> = response
            .json()
            .await
            .map_err(|err| FeedError::Network(format!("bulk fetch posts: invalid response: {err}")))?;
        Ok(Some(posts))
    }
}

fn transport_error(err: reqwest::Error, what: &str) -> FeedError {
    if err.is_timeout() {
        FeedError::Network(format!("{what}: request timed out"))
    } else {
        FeedError::Network(format!("{what}: {err}"))
    }
}

fn sanitize_base_url(mut base: String) -> Result<String> {
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("http://{base}");
    }
    while base.ends_with('/') {
        base.pop();
    }
    let _ = Url::parse(&base).context("invalid base URL")?;
    Ok(base)
}
