use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::{CredentialStore, RefreshCoordinator};
use crate::error::{is_auth_failure_status, ClientError, Result};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// HTTP client that behaves as if the caller always holds a valid token
///
/// - attaches the stored access token as a bearer credential
/// - on 401/419, waits for (or starts) the single shared token renewal
/// - replays the failed request once with the renewed token
pub struct AuthenticatedHttpClient {
    /// Transport for resource requests
    transport: Arc<dyn Transport>,

    /// Shared refresh gate and queue
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthenticatedHttpClient {
    pub fn new(transport: Arc<dyn Transport>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            transport,
            coordinator,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send a request, refreshing and replaying it at most once on auth failure.
    ///
    /// Non-success statuses come back as [`ClientError::Api`]; a 401/419 is
    /// only returned that way if the replay was rejected too.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

        self.attach_credentials(&mut request)?;
        let response = self.send(&request, &request_id).await?;

        let status = response.status.as_u16();
        if !is_auth_failure_status(status) {
            return into_result(response);
        }
        if request.is_retried() {
            tracing::warn!(request_id = %request_id, status, "Auth failure after retry, giving up");
            return into_result(response);
        }

        tracing::warn!(
            request_id = %request_id,
            status,
            "Received {}, refreshing token and retrying...",
            status
        );

        let token = self
            .coordinator
            .ensure_fresh_token(request.bearer_token())
            .await?;

        request.mark_retried();
        request.set_bearer(&token)?;

        let response = self.send(&request, &request_id).await?;
        if is_auth_failure_status(response.status.as_u16()) {
            tracing::warn!(request_id = %request_id, "Auth failure after retry, giving up");
        }
        into_result(response)
    }

    /// Send a request and decode the JSON body
    pub async fn execute_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.execute(request).await?.json()
    }

    /// `GET path` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute_json(ApiRequest::get(path)).await
    }

    /// Bearer from the store, unless the caller set Authorization explicitly
    fn attach_credentials(&self, request: &mut ApiRequest) -> Result<()> {
        if request.has_authorization() {
            return Ok(());
        }
        if let Some(token) = self.store().access_token() {
            request.set_bearer(&token)?;
        }
        Ok(())
    }

    async fn send(&self, request: &ApiRequest, request_id: &str) -> Result<ApiResponse> {
        tracing::debug!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            retried = request.is_retried(),
            "Sending HTTP request"
        );

        let response = self.transport.send(request.clone()).await?;

        tracing::debug!(
            request_id = %request_id,
            status = %response.status,
            "Received HTTP response"
        );
        Ok(response)
    }
}

fn into_result(response: ApiResponse) -> Result<ApiResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::api(response))
    }
}
