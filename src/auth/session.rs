// Session lifecycle: login, register, logout and the cached profile

use std::sync::Arc;

use super::store::CredentialStore;
use super::types::{
    ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, StatusReply,
    TokenResponse, UserProfile,
};
use crate::error::{ClientError, Result};
use crate::http_client::AuthenticatedHttpClient;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Session operations on top of the credential store.
///
/// Login and register go through the raw transport: a 401 there means bad
/// credentials, not an expired token.
pub struct AuthSession {
    transport: Arc<dyn Transport>,
    client: Arc<AuthenticatedHttpClient>,
}

impl AuthSession {
    pub fn new(transport: Arc<dyn Transport>, client: Arc<AuthenticatedHttpClient>) -> Self {
        Self { transport, client }
    }

    fn store(&self) -> &Arc<dyn CredentialStore> {
        self.client.store()
    }

    /// Log in with email and password and persist the issued tokens
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<UserProfile>> {
        tracing::info!("Logging in as {}", email);
        let request = ApiRequest::post("/api/login").json(&LoginRequest { email, password })?;
        self.issue_tokens(request).await
    }

    /// Create an account and persist the issued tokens
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<Option<UserProfile>> {
        tracing::info!("Registering {}", email);
        let request = ApiRequest::post("/api/register").json(&RegisterRequest {
            name,
            email,
            password,
            password_confirmation,
        })?;
        self.issue_tokens(request).await
    }

    async fn issue_tokens(&self, request: ApiRequest) -> Result<Option<UserProfile>> {
        let response = self.send_public(request).await?;
        let data: TokenResponse = response.json()?;
        let creds = data.credentials();
        self.store()
            .set_credentials(&creds.access_token, &creds.refresh_token, data.user.as_ref())?;

        tracing::info!("Session stored");
        Ok(data.user)
    }

    /// Send a request that needs no session. Validation failures (422) come
    /// back as [`ClientError::Api`] with the field errors in the body.
    async fn send_public(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::api(response))
        }
    }

    /// Ask for a password reset link. Returns the server's status text.
    pub async fn forgot_password(&self, email: &str) -> Result<String> {
        tracing::info!("Requesting password reset for {}", email);
        let request =
            ApiRequest::post("/api/forgot-password").json(&ForgotPasswordRequest { email })?;
        let response = self.send_public(request).await?;
        Ok(status_text(&response, "Password reset link sent"))
    }

    /// Set a new password using the token from the reset email
    pub async fn reset_password(
        &self,
        token: &str,
        email: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<String> {
        tracing::info!("Resetting password for {}", email);
        let request = ApiRequest::post("/api/reset-password").json(&ResetPasswordRequest {
            token,
            email,
            password,
            password_confirmation,
        })?;
        let response = self.send_public(request).await?;
        Ok(status_text(&response, "Password has been reset"))
    }

    /// Send the email verification link again (needs a session)
    pub async fn resend_email_verification(&self) -> Result<String> {
        let response = self
            .client
            .execute(ApiRequest::post("/api/email/verification-notification"))
            .await?;
        Ok(status_text(&response, "Verification link sent"))
    }

    /// Tell the server to revoke the token, then forget it locally.
    ///
    /// Local credentials are cleared even if the server call fails.
    pub async fn logout(&self) -> Result<()> {
        if let Some(token) = self.store().access_token() {
            let result: Result<()> = async {
                let mut request = ApiRequest::post("/api/logout");
                request.set_bearer(&token)?;
                let response = self.transport.send(request).await?;
                if response.is_success() {
                    Ok(())
                } else {
                    Err(ClientError::api(response))
                }
            }
            .await;

            if let Err(e) = result {
                tracing::warn!("Logout error: {}", e);
            }
        }

        self.store().clear_credentials()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Cached profile, no network round-trip
    pub fn current_user(&self) -> Option<UserProfile> {
        if self.store().access_token().is_none() {
            return None;
        }
        self.store().user_profile()
    }

    /// Fetch the profile from `/api/user` and cache it
    pub async fn fetch_user(&self) -> Result<UserProfile> {
        let user: UserProfile = self.client.get_json("/api/user").await?;
        self.store().set_user_profile(&user)?;
        Ok(user)
    }
}

/// `status` (or `message`) of an acknowledgement body, else `fallback`
fn status_text(response: &ApiResponse, fallback: &str) -> String {
    response
        .json::<StatusReply>()
        .unwrap_or_default()
        .into_text(fallback)
}
