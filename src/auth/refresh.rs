// Token refresh call against the remote auth endpoint

use crate::error::RefreshError;
use crate::transport::{ApiRequest, Transport};

use super::types::{RefreshRequest, TokenResponse};

/// Default path of the refresh endpoint
pub const DEFAULT_REFRESH_PATH: &str = "/api/refresh";

/// Exchange a refresh token for a new token pair.
///
/// `transport` must be the raw transport, never the authenticated client,
/// so the refresh call cannot recurse into another refresh.
pub async fn request_token_refresh(
    transport: &dyn Transport,
    refresh_path: &str,
    refresh_token: &str,
) -> Result<TokenResponse, RefreshError> {
    tracing::info!("Refreshing access token...");

    let request = ApiRequest::post(refresh_path)
        .json(&RefreshRequest { refresh_token })
        .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

    let response = transport
        .send(request)
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    if !response.is_success() {
        let message = response.error_message();
        tracing::error!(
            status = response.status.as_u16(),
            body = %message,
            "Token refresh rejected"
        );
        return Err(RefreshError::Rejected {
            status: response.status.as_u16(),
            message,
        });
    }

    let data: TokenResponse = response
        .json()
        .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

    if data.access_token.is_empty() || data.refresh_token.is_empty() {
        return Err(RefreshError::InvalidResponse(
            "Refresh response does not contain both tokens".to_string(),
        ));
    }

    tracing::info!("Access token refreshed");

    Ok(data)
}
