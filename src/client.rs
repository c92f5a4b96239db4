use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Shown when a successful reply carries neither a usable `message` nor
/// `reply` field.
pub const FALLBACK_REPLY: &str = "Sorry, I didn't catch that. Please try again.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not reach the assistant: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("the assistant returned status {status}")]
    Status { status: StatusCode },
    #[error("the assistant reply was not valid JSON: {0}")]
    MalformedReply(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    /// Intent key -> follow-up question, when the server offers quick replies.
    pub related: Option<BTreeMap<String, String>>,
}

#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn send_message(&self, token: &str, text: &str) -> Result<AssistantReply, ApiError>;
}

/// Response body of `POST /api/message`. Both text fields are optional on the
/// wire; precedence is resolved by [`ReplyEnvelope::reply_text`].
#[derive(Debug, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub related: Option<BTreeMap<String, String>>,
}

impl ReplyEnvelope {
    /// `message` wins over `reply`; empty strings fall through to the
    /// placeholder just like absent fields.
    pub fn reply_text(&self) -> &str {
        non_empty(&self.message)
            .or_else(|| non_empty(&self.reply))
            .unwrap_or(FALLBACK_REPLY)
    }

    pub fn into_reply(self) -> AssistantReply {
        let text = self.reply_text().to_string();
        AssistantReply {
            text,
            related: self.related,
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

#[derive(Clone)]
pub struct HttpAssistantClient {
    http: reqwest::Client,
    server_url: Url,
}

impl HttpAssistantClient {
    /// No request timeout is configured; a send settles when the transport
    /// settles, and cancellation is the caller's lever.
    pub fn new(server_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_url,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/message",
            self.server_url.as_str().trim_end_matches('/')
        )
    }
}

#[async_trait]
impl AssistantApi for HttpAssistantClient {
    async fn send_message(&self, token: &str, text: &str) -> Result<AssistantReply, ApiError> {
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&serde_json::json!({ "message": text }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            // The body is deliberately not inspected on failure.
            return Err(ApiError::Status { status });
        }

        let body = resp.bytes().await?;
        let envelope: ReplyEnvelope =
            serde_json::from_slice(&body).map_err(ApiError::MalformedReply)?;
        Ok(envelope.into_reply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::net::SocketAddr;

    fn envelope(message: Option<&str>, reply: Option<&str>) -> ReplyEnvelope {
        ReplyEnvelope {
            message: message.map(str::to_string),
            reply: reply.map(str::to_string),
            related: None,
        }
    }

    #[test]
    fn message_field_wins_over_reply() {
        assert_eq!(envelope(Some("A"), Some("B")).reply_text(), "A");
    }

    #[test]
    fn reply_field_used_when_message_absent_or_empty() {
        assert_eq!(envelope(None, Some("B")).reply_text(), "B");
        assert_eq!(envelope(Some(""), Some("B")).reply_text(), "B");
    }

    #[test]
    fn placeholder_when_both_fields_unusable() {
        assert_eq!(envelope(None, None).reply_text(), FALLBACK_REPLY);
        assert_eq!(envelope(Some(""), Some("")).reply_text(), FALLBACK_REPLY);
    }

    async fn spawn_server(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr) -> HttpAssistantClient {
        HttpAssistantClient::new(Url::parse(&format!("http://{addr}")).unwrap())
    }

    #[tokio::test]
    async fn posts_bearer_token_and_message_body() {
        let app = Router::new().route(
            "/api/message",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(serde_json::json!({
                    "message": format!("auth={} text={}", auth, body["message"].as_str().unwrap_or_default()),
                }))
            }),
        );
        let addr = spawn_server(app).await;

        let reply = client_for(addr)
            .send_message("sesame", "hello")
            .await
            .unwrap();
        assert_eq!(reply.text, "auth=Bearer sesame text=hello");
        assert!(reply.related.is_none());
    }

    #[tokio::test]
    async fn related_map_is_decoded() {
        let app = Router::new().route(
            "/api/message",
            post(|| async {
                Json(serde_json::json!({
                    "reply": "You get 20 days.",
                    "related": { "carry_over": "Can leave carry over?" },
                }))
            }),
        );
        let addr = spawn_server(app).await;

        let reply = client_for(addr).send_message("sesame", "leave").await.unwrap();
        let related = reply.related.unwrap();
        assert_eq!(
            related.get("carry_over").map(String::as_str),
            Some("Can leave carry over?")
        );
    }

    #[tokio::test]
    async fn non_success_status_maps_to_status_error() {
        let app = Router::new().route(
            "/api/message",
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let addr = spawn_server(app).await;

        let err = client_for(addr)
            .send_message("sesame", "hello")
            .await
            .unwrap_err();
        match err {
            ApiError::Status { status } => assert_eq!(status.as_u16(), 500),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_success_body_maps_to_malformed_reply() {
        let app = Router::new().route("/api/message", post(|| async { "not json" }));
        let addr = spawn_server(app).await;

        let err = client_for(addr)
            .send_message("sesame", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MalformedReply(_)));
    }
}
