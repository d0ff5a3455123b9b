//! Session server HTTP surface.
//!
//! The [`SessionServer`] trait decouples discovery and dispatch from the
//! transport so tests can substitute an in-memory server. Every call is a
//! single attempt; retries belong to the next poll cycle.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::models::session::{ProjectPayload, RemoteSession, SessionActivity, Worktree};
use crate::{AppError, Result};

/// Text part of a message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessagePart {
    /// Always `"text"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Prompt text.
    pub text: String,
}

/// Model selector sent with a message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelRef {
    /// Provider identifier.
    #[serde(rename = "providerID")]
    pub provider_id: String,
    /// Model identifier within the provider.
    #[serde(rename = "modelID")]
    pub model_id: String,
}

impl ModelRef {
    /// Split `provider/model-id` on the first `/`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (provider, model) = raw.trim().split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self {
            provider_id: provider.to_owned(),
            model_id: model.to_owned(),
        })
    }
}

/// Body of `POST /session/:id/message`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessageRequest {
    /// Message parts.
    pub parts: Vec<MessagePart>,
    /// Agent to handle the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
}

impl MessageRequest {
    /// A single-part text message.
    #[must_use]
    pub fn text(text: impl Into<String>, agent: Option<String>, model: Option<&str>) -> Self {
        Self {
            parts: vec![MessagePart {
                kind: "text".into(),
                text: text.into(),
            }],
            agent,
            model: model.and_then(ModelRef::parse),
        }
    }
}

/// Remote calls the dispatcher makes against a session server.
///
/// `base_url` selects the server; `directory` scopes the call to a
/// workspace and is always sent as a query-string value.
pub trait SessionServer: Send + Sync {
    /// `GET /project/current`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Remote` on transport failure, non-OK status, or
    /// malformed JSON.
    fn current_project<'a>(
        &'a self,
        base_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ProjectPayload>> + Send + 'a>>;

    /// `GET /project`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Remote` on any failure.
    fn list_projects<'a>(
        &'a self,
        base_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ProjectPayload>>> + Send + 'a>>;

    /// `GET /session?directory=&roots=true`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Remote` on any failure.
    fn list_sessions<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteSession>>> + Send + 'a>>;

    /// `GET /session/status`, keyed by session id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Remote` on any failure.
    fn session_statuses<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, SessionActivity>>> + Send + 'a>>;

    /// `POST /session?directory=`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Remote` on any failure.
    fn create_session<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteSession>> + Send + 'a>>;

    /// `PATCH /session/:id` with a new title.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Remote` on any failure.
    fn set_title<'a>(
        &'a self,
        base_url: &'a str,
        session_id: &'a str,
        directory: &'a str,
        title: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// `POST /session/:id/message`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Remote` on any failure.
    fn post_message<'a>(
        &'a self,
        base_url: &'a str,
        session_id: &'a str,
        directory: &'a str,
        message: &'a MessageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// `GET /experimental/worktree?directory=`: known isolated workspace paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Remote` on any failure.
    fn list_worktrees<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;

    /// `POST /experimental/worktree?directory=`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Remote` on any failure.
    fn create_worktree<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
        name: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Worktree>> + Send + 'a>>;
}

/// [`SessionServer`] over HTTP with a per-request timeout.
#[derive(Clone)]
pub struct HttpSessionServer {
    http: reqwest::Client,
}

impl HttpSessionServer {
    /// Build a client whose every request fails after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to create http client: {err}")))?;
        Ok(Self { http })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: reqwest::Url) -> Result<T> {
        let response = self.http.get(url.clone()).send().await?;
        decode(&url, response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &reqwest::Url,
    ) -> Result<T> {
        let response = request.send().await?;
        decode(url, response).await
    }
}

async fn decode<T: DeserializeOwned>(
    url: &reqwest::Url,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Remote(format!("{url} returned {status}")));
    }
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|err| AppError::Remote(format!("malformed response from {url}: {err}")))
}

/// Join `path` onto `base_url` and append `query` (percent-encoded).
fn endpoint(base_url: &str, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Url> {
    let raw = format!("{}{path}", base_url.trim_end_matches('/'));
    let parsed = if query.is_empty() {
        reqwest::Url::parse(&raw)
    } else {
        reqwest::Url::parse_with_params(&raw, query)
    };
    parsed.map_err(|err| AppError::Remote(format!("invalid server url {raw}: {err}")))
}

impl SessionServer for HttpSessionServer {
    fn current_project<'a>(
        &'a self,
        base_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ProjectPayload>> + Send + 'a>> {
        Box::pin(async move {
            self.get_json(endpoint(base_url, "/project/current", &[])?)
                .await
        })
    }

    fn list_projects<'a>(
        &'a self,
        base_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ProjectPayload>>> + Send + 'a>> {
        Box::pin(async move { self.get_json(endpoint(base_url, "/project", &[])?).await })
    }

    fn list_sessions<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteSession>>> + Send + 'a>> {
        Box::pin(async move {
            self.get_json(endpoint(
                base_url,
                "/session",
                &[("directory", directory), ("roots", "true")],
            )?)
            .await
        })
    }

    fn session_statuses<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, SessionActivity>>> + Send + 'a>> {
        Box::pin(async move {
            let raw: HashMap<String, Value> = self
                .get_json(endpoint(
                    base_url,
                    "/session/status",
                    &[("directory", directory)],
                )?)
                .await?;
            Ok(raw
                .into_iter()
                .map(|(id, status)| {
                    let tag = status.get("type").and_then(Value::as_str).unwrap_or("idle");
                    (id, SessionActivity::from_tag(tag))
                })
                .collect())
        })
    }

    fn create_session<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteSession>> + Send + 'a>> {
        Box::pin(async move {
            let url = endpoint(base_url, "/session", &[("directory", directory)])?;
            let request = self.http.post(url.clone()).json(&json!({}));
            self.send_json(request, &url).await
        })
    }

    fn set_title<'a>(
        &'a self,
        base_url: &'a str,
        session_id: &'a str,
        directory: &'a str,
        title: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let url = endpoint(
                base_url,
                &format!("/session/{session_id}"),
                &[("directory", directory)],
            )?;
            let request = self
                .http
                .patch(url.clone())
                .json(&json!({ "title": title }));
            let _: Value = self.send_json(request, &url).await?;
            Ok(())
        })
    }

    fn post_message<'a>(
        &'a self,
        base_url: &'a str,
        session_id: &'a str,
        directory: &'a str,
        message: &'a MessageRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let url = endpoint(
                base_url,
                &format!("/session/{session_id}/message"),
                &[("directory", directory)],
            )?;
            let sent = self
                .http
                .post(url.clone())
                .json(message)
                .send()
                .await;
            match sent {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(AppError::Remote(format!(
                    "{url} returned {}",
                    response.status()
                ))),
                // The server holds the request open while the agent works;
                // a timeout after the request was sent means it was accepted.
                Err(err) if err.is_timeout() => {
                    debug!(session_id, "message post timed out waiting for reply; treating as delivered");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn list_worktrees<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            let raw: Vec<Value> = self
                .get_json(endpoint(
                    base_url,
                    "/experimental/worktree",
                    &[("directory", directory)],
                )?)
                .await?;
            Ok(raw
                .into_iter()
                .filter_map(|entry| match entry {
                    Value::String(path) => Some(path),
                    Value::Object(fields) => fields
                        .get("directory")
                        .and_then(Value::as_str)
                        .map(ToOwned::to_owned),
                    _ => None,
                })
                .collect())
        })
    }

    fn create_worktree<'a>(
        &'a self,
        base_url: &'a str,
        directory: &'a str,
        name: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Worktree>> + Send + 'a>> {
        Box::pin(async move {
            let url = endpoint(
                base_url,
                "/experimental/worktree",
                &[("directory", directory)],
            )?;
            let body = match name {
                Some(name) => json!({ "name": name }),
                None => json!({}),
            };
            let request = self.http.post(url.clone()).json(&body);
            self.send_json(request, &url).await
        })
    }
}
