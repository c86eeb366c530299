use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use perspectiva_types::Comment;
use perspectiva_types::api::{CreateCommentRequest, ErrorResponse, UpdateCommentRequest};

use crate::error::ClientError;

/// The comment operations the cache and controller need from the server.
#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn list(&self, theme: &str) -> Result<Vec<Comment>, ClientError>;

    async fn create(&self, theme: &str, comment: &CreateCommentRequest) -> Result<Comment, ClientError>;

    async fn update(&self, theme: &str, comment_id: &str, payload: &str) -> Result<Comment, ClientError>;

    async fn delete(&self, theme: &str, comment_id: &str) -> Result<(), ClientError>;
}

/// `CommentApi` over HTTP against `<base_url>/api/comments`.
#[derive(Debug, Clone)]
pub struct HttpCommentApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCommentApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token,
        }
    }

    fn url(&self) -> String {
        format!("{}/api/comments", self.base_url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

/// Turn a non-2xx response into `ClientError::Rejected`, keeping the
/// server's error message when it sent one.
async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    warn!("Comment API rejected request ({}): {}", status, message);

    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Mutations answer with an array whose first element is the stored
/// comment; the write only counts as confirmed when it has `created_at`.
fn confirmed_comment(body: Vec<Value>) -> Result<Comment, ClientError> {
    let first = body.into_iter().next().ok_or(ClientError::Unconfirmed)?;
    if first.get("created_at").is_none_or(Value::is_null) {
        return Err(ClientError::Unconfirmed);
    }
    Ok(serde_json::from_value(first)?)
}

#[async_trait]
impl CommentApi for HttpCommentApi {
    async fn list(&self, theme: &str) -> Result<Vec<Comment>, ClientError> {
        debug!("Fetching comments for theme '{}'", theme);
        let resp = self
            .client
            .get(self.url())
            .query(&[("theme", theme)])
            .send()
            .await?;

        let bytes = check_status(resp).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn create(&self, theme: &str, comment: &CreateCommentRequest) -> Result<Comment, ClientError> {
        let req = self.client.post(self.url()).query(&[("theme", theme)]).json(comment);
        let resp = self.authorized(req).send().await?;

        let bytes = check_status(resp).await?.bytes().await?;
        confirmed_comment(serde_json::from_slice(&bytes)?)
    }

    async fn update(&self, theme: &str, comment_id: &str, payload: &str) -> Result<Comment, ClientError> {
        let body = UpdateCommentRequest {
            payload: payload.to_string(),
            comment_id: comment_id.to_string(),
        };
        let req = self.client.patch(self.url()).query(&[("theme", theme)]).json(&body);
        let resp = self.authorized(req).send().await?;

        let bytes = check_status(resp).await?.bytes().await?;
        confirmed_comment(serde_json::from_slice(&bytes)?)
    }

    async fn delete(&self, theme: &str, comment_id: &str) -> Result<(), ClientError> {
        let req = self
            .client
            .delete(self.url())
            .query(&[("theme", theme), ("comment_id", comment_id)]);
        let resp = self.authorized(req).send().await?;

        let bytes = check_status(resp).await?.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        match body.get("message") {
            Some(Value::String(_)) => Ok(()),
            _ => Err(ClientError::Unconfirmed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stored(id: &str, payload: &str) -> Value {
        json!({
            "id": id,
            "created_at": "2026-03-01T10:00:00.000Z",
            "updated_at": "2026-03-01T10:00:00.000Z",
            "user_email": "ana@example.com",
            "payload": payload,
            "reply_of": null,
            "theme": "intro",
        })
    }

    fn new_comment(payload: &str) -> CreateCommentRequest {
        CreateCommentRequest {
            user_email: "ana@example.com".into(),
            payload: payload.into(),
            reply_of: None,
            theme: Some("intro".into()),
        }
    }

    #[tokio::test]
    async fn list_sends_theme_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/comments"))
            .and(query_param("theme", "intro"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored("1", "hi")])))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpCommentApi::new(server.uri(), None);
        let comments = api.list("intro").await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].payload, "hi");
    }

    #[tokio::test]
    async fn create_carries_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/comments"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([stored("7", "hello")])))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpCommentApi::new(format!("{}/", server.uri()), Some("tok".into()));
        let created = api.create("intro", &new_comment("hello")).await.unwrap();
        assert_eq!(created.id, "7");
    }

    #[tokio::test]
    async fn create_without_created_at_is_unconfirmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "payload": "hello" }])))
            .mount(&server)
            .await;

        let api = HttpCommentApi::new(server.uri(), Some("tok".into()));
        let err = api.create("intro", &new_comment("hello")).await.unwrap_err();
        assert!(matches!(err, ClientError::Unconfirmed));
    }

    #[tokio::test]
    async fn update_sends_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(query_param("theme", "intro"))
            .and(body_json(json!({ "payload": "edited", "commentId": "1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored("1", "edited")])))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpCommentApi::new(server.uri(), Some("tok".into()));
        let updated = api.update("intro", "1", "edited").await.unwrap();
        assert_eq!(updated.payload, "edited");
    }

    #[tokio::test]
    async fn rejection_keeps_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "error": "Comment belongs to another user" })),
            )
            .mount(&server)
            .await;

        let api = HttpCommentApi::new(server.uri(), Some("tok".into()));
        match api.update("intro", "1", "edited").await {
            Err(ClientError::Rejected { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Comment belongs to another user");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_needs_message() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(query_param("comment_id", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Comment deleted" })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(query_param("comment_id", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let api = HttpCommentApi::new(server.uri(), Some("tok".into()));
        api.delete("intro", "1").await.unwrap();
        assert!(matches!(api.delete("intro", "2").await, Err(ClientError::Unconfirmed)));
    }
}
