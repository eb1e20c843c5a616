// Test doubles shared by the unit tests

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::auth::{strip_token_prefix, Navigator};
use crate::error::Result;
use crate::transport::{ApiRequest, ApiResponse, Transport};

enum RefreshReply {
    Issue { access: String, refresh: String },
    Fail(u16),
}

struct BackendState {
    valid_token: String,
    refresh_calls: usize,
    requests: Vec<ApiRequest>,
}

/// In-process stand-in for the remote API.
///
/// Resource paths answer 401 unless the request carries the currently valid
/// bearer token. `/api/refresh` rotates the valid token (or fails) after an
/// optional delay.
pub(crate) struct FakeBackend {
    state: Mutex<BackendState>,
    refresh_reply: RefreshReply,
    refresh_delay: Duration,
    include_user: bool,
    reject_everything: bool,
    routes: HashMap<String, (u16, String)>,
    public_routes: HashMap<String, (u16, String)>,
    slow_paths: HashMap<String, Duration>,
}

impl FakeBackend {
    pub fn new(valid_token: &str) -> Self {
        Self {
            state: Mutex::new(BackendState {
                valid_token: valid_token.to_string(),
                refresh_calls: 0,
                requests: Vec::new(),
            }),
            refresh_reply: RefreshReply::Fail(401),
            refresh_delay: Duration::ZERO,
            include_user: false,
            reject_everything: false,
            routes: HashMap::new(),
            public_routes: HashMap::new(),
            slow_paths: HashMap::new(),
        }
    }

    pub fn issuing(mut self, access: &str, refresh: &str) -> Self {
        self.refresh_reply = RefreshReply::Issue {
            access: access.to_string(),
            refresh: refresh.to_string(),
        };
        self
    }

    pub fn failing_refresh(mut self, status: u16) -> Self {
        self.refresh_reply = RefreshReply::Fail(status);
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_user(mut self) -> Self {
        self.include_user = true;
        self
    }

    /// Every resource request gets 401, whatever token it carries
    pub fn rejecting_everything(mut self) -> Self {
        self.reject_everything = true;
        self
    }

    /// Fixed reply for an authorized request to `path`
    pub fn with_route(mut self, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .insert(path.to_string(), (status, body.to_string()));
        self
    }

    /// Fixed reply for `path`, whatever credentials the request carries
    pub fn with_public_route(mut self, path: &str, status: u16, body: &str) -> Self {
        self.public_routes
            .insert(path.to_string(), (status, body.to_string()));
        self
    }

    /// Answer requests to `path` only after `delay`. The verdict on the
    /// bearer is taken when the answer is produced.
    pub fn with_slow_path(mut self, path: &str, delay: Duration) -> Self {
        self.slow_paths.insert(path.to_string(), delay);
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    async fn refresh(&self) -> ApiResponse {
        self.state.lock().unwrap().refresh_calls += 1;

        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }

        match &self.refresh_reply {
            RefreshReply::Issue { access, refresh } => {
                self.state.lock().unwrap().valid_token = strip_token_prefix(access).to_string();
                let mut body = serde_json::json!({
                    "access_token": access,
                    "refresh_token": refresh,
                });
                if self.include_user {
                    body["user"] = serde_json::json!({
                        "id": 42,
                        "name": "Petugas Legalisir",
                        "email": "petugas@example.ac.id"
                    });
                }
                ApiResponse::new(StatusCode::OK, body.to_string())
            }
            RefreshReply::Fail(status) => ApiResponse::new(
                StatusCode::from_u16(*status).unwrap(),
                r#"{"message":"Invalid refresh token"}"#,
            ),
        }
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        // Let other in-flight requests interleave
        tokio::task::yield_now().await;

        self.state.lock().unwrap().requests.push(request.clone());

        if request.path == "/api/refresh" {
            return Ok(self.refresh().await);
        }

        if let Some(delay) = self.slow_paths.get(&request.path) {
            tokio::time::sleep(*delay).await;
        }

        if let Some((status, body)) = self.public_routes.get(&request.path) {
            return Ok(ApiResponse::new(
                StatusCode::from_u16(*status).unwrap(),
                body.clone(),
            ));
        }

        let authorized = {
            let state = self.state.lock().unwrap();
            request.bearer_token() == Some(state.valid_token.as_str())
        };
        if self.reject_everything || !authorized {
            return Ok(ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"message":"Unauthenticated."}"#,
            ));
        }

        let (status, body) = self
            .routes
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| (200, r#"{"ok":true}"#.to_string()));
        Ok(ApiResponse::new(StatusCode::from_u16(status).unwrap(), body))
    }
}

/// Navigator that remembers every redirect
#[derive(Default)]
pub(crate) struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.paths.lock().unwrap().len()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_string());
    }
}
