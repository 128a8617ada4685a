//! HTTP implementation of [`TaskApi`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use taskboard_common::{
    AuthUser, Comment, Identity, Notification, ProjectId, Task, TaskDraft, TaskId, UserId,
};

use super::TaskApi;
use crate::error::ApiError;

/// Called after a request carrying the credential was answered with 401.
pub type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    id: UserId,
    username: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Default)]
struct AuthState {
    token: RwLock<Option<String>>,
    on_unauthorized: RwLock<Option<UnauthorizedHook>>,
}

/// REST client. Cheap to clone; clones share the credential.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    auth: Arc<AuthState>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            auth: Arc::new(AuthState::default()),
        }
    }

    /// Exchange credentials for a token. On success the token is kept and
    /// sent with every later request.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, ApiError> {
        let req = self
            .http
            .post(self.url("/auth/login"))
            .json(&LoginRequest { username, password });
        let resp: LoginResponse = self.send(req).await?;
        tracing::info!(user_id = resp.id, username = %resp.username, "logged in");

        self.set_token(resp.token.clone());
        Ok(Identity {
            token: resp.token,
            user: AuthUser {
                id: resp.id,
                username: resp.username,
                email: resp.email,
                full_name: resp.full_name,
            },
        })
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.auth.token.write() = Some(token.into());
    }

    pub fn clear_token(&self) {
        self.auth.token.write().take();
    }

    pub fn token(&self) -> Option<String> {
        self.auth.token.read().clone()
    }

    /// Install the callback fired on 401. Replaces any previous hook.
    pub fn set_unauthorized_hook(&self, hook: UnauthorizedHook) {
        *self.auth.on_unauthorized.write() = Some(hook);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = self.execute(req).await?;
        Ok(resp.json().await?)
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<(), ApiError> {
        self.execute(req).await.map(|_| ())
    }

    /// Attach the bearer credential, send, and map failures to [`ApiError`].
    async fn execute(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let token = self.token();
        let req = match &token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let err = ApiError::from_response(status, &body);
        tracing::warn!(status = status.as_u16(), code = %err.code, message = %err.message, "request failed");
        if err.is_unauthorized() && token.is_some() {
            self.handle_unauthorized();
        }
        Err(err)
    }

    fn handle_unauthorized(&self) {
        self.clear_token();
        let hook = self.auth.on_unauthorized.read().clone();
        tracing::warn!("credential rejected, signing out");
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[async_trait]
impl TaskApi for ApiClient {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, ApiError> {
        self.send(self.http.get(self.url("/tasks"))).await
    }

    async fn fetch_project_tasks(&self, project: ProjectId) -> Result<Vec<Task>, ApiError> {
        self.send(self.http.get(self.url(&format!("/tasks/project/{project}"))))
            .await
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        self.send(self.http.post(self.url("/tasks")).json(draft)).await
    }

    async fn update_task(&self, id: TaskId, draft: &TaskDraft) -> Result<Task, ApiError> {
        self.send(self.http.put(self.url(&format!("/tasks/{id}"))).json(draft))
            .await
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        self.send_empty(self.http.delete(self.url(&format!("/tasks/{id}"))))
            .await
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.send(self.http.get(self.url("/notifications"))).await
    }

    async fn fetch_unread_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.send(self.http.get(self.url("/notifications/unread")))
            .await
    }

    async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
        let resp: CountResponse = self
            .send(self.http.get(self.url("/notifications/unread/count")))
            .await?;
        Ok(resp.count)
    }

    async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError> {
        self.send_empty(self.http.put(self.url(&format!("/notifications/{id}/read"))))
            .await
    }

    async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        self.send_empty(self.http.put(self.url("/notifications/read-all")))
            .await
    }

    async fn fetch_comments(&self, task: TaskId) -> Result<Vec<Comment>, ApiError> {
        self.send(self.http.get(self.url(&format!("/tasks/{task}/comments"))))
            .await
    }

    async fn create_comment(&self, task: TaskId, content: &str) -> Result<Comment, ApiError> {
        let req = self
            .http
            .post(self.url(&format!("/tasks/{task}/comments")))
            .json(&CommentRequest { content });
        self.send(req).await
    }

    async fn delete_comment(&self, task: TaskId, comment: i64) -> Result<(), ApiError> {
        self.send_empty(
            self.http
                .delete(self.url(&format!("/tasks/{task}/comments/{comment}"))),
        )
        .await
    }
}
