// Authentication types

use serde::{Deserialize, Serialize};

/// Separator between the token id and the secret in `"<id>|<secret>"` tokens
pub const TOKEN_DELIMITER: char = '|';

/// Strip the `"<id>|"` prefix the auth endpoint puts on issued tokens.
///
/// Only the text after the first delimiter is the usable bearer secret.
/// Tokens without a delimiter come back unchanged, so stripping twice is harmless.
pub fn strip_token_prefix(raw: &str) -> &str {
    match raw.split_once(TOKEN_DELIMITER) {
        Some((_, secret)) => secret,
        None => raw,
    }
}

/// Cached copy of the authenticated identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Access/refresh token pair, already stripped of any id prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    /// Build a pair from raw endpoint tokens, stripping the id prefix
    pub fn from_raw(access_token: &str, refresh_token: &str) -> Self {
        Self {
            access_token: strip_token_prefix(access_token).to_string(),
            refresh_token: strip_token_prefix(refresh_token).to_string(),
        }
    }
}

/// Refresh request body
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Token response shared by login, register and refresh
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl TokenResponse {
    pub fn credentials(&self) -> CredentialPair {
        CredentialPair::from_raw(&self.access_token, &self.refresh_token)
    }
}

/// Login request body
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Registration request body
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub password_confirmation: &'a str,
}

/// Password reset link request body
#[derive(Debug, Serialize)]
pub struct ForgotPasswordRequest<'a> {
    pub email: &'a str,
}

/// New password, authorized by the emailed reset token
#[derive(Debug, Serialize)]
pub struct ResetPasswordRequest<'a> {
    pub token: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub password_confirmation: &'a str,
}

/// `{status}` acknowledgement of the password and verification endpoints
#[derive(Debug, Default, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusReply {
    pub fn into_text(self, fallback: &str) -> String {
        self.status
            .or(self.message)
            .unwrap_or_else(|| fallback.to_string())
    }
}
