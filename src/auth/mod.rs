// Authentication module
// Credential storage, token renewal and session lifecycle

mod coordinator;
mod navigator;
mod refresh;
mod session;
mod store;
mod types;

pub use coordinator::{RefreshCoordinator, RefreshOutcome, DEFAULT_LOGIN_PATH};
pub use navigator::{LoginRedirect, Navigator};
pub use refresh::{request_token_refresh, DEFAULT_REFRESH_PATH};
pub use session::AuthSession;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredentials};
pub use types::{strip_token_prefix, CredentialPair, TokenResponse, UserProfile, TOKEN_DELIMITER};
