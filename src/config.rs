use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::path::PathBuf;

use crate::auth::{DEFAULT_LOGIN_PATH, DEFAULT_REFRESH_PATH};
use crate::permohonan::DEFAULT_PER_PAGE;

const APP_DIR: &str = "legalisir-console";

/// Legalisir Console - staff client for diploma legalization requests
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend base URL
    #[arg(short = 'u', long, env = "BACKEND_URL", default_value = "http://localhost:8000")]
    pub backend_url: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "10")]
    pub http_timeout: u64,

    /// Where the session tokens are kept
    #[arg(short = 'c', long, env = "CREDENTIALS_FILE")]
    pub credentials_file: Option<String>,

    /// Path the client navigates to when the session is gone
    #[arg(long, env = "LOGIN_PATH", default_value = DEFAULT_LOGIN_PATH)]
    pub login_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Create an account
    Register,
    /// End the session
    Logout,
    /// Ask for a password reset link
    ForgotPassword {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Set a new password using the token from the reset link
    ResetPassword {
        token: String,
        #[arg(short, long)]
        email: String,
    },
    /// Send the email verification link again
    ResendVerification,
    /// Show the logged-in user
    Whoami {
        /// Fetch the profile from the server instead of the cache
        #[arg(long)]
        refresh: bool,
    },
    /// List requests
    List {
        /// Only show requests with this status code (1-7)
        #[arg(short, long)]
        status: Option<u8>,
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: u32,
    },
    /// Show one request
    Show { id: u64 },
    /// Count requests per status
    Stats {
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: u32,
    },
    /// Submit a new request
    Create {
        #[arg(long)]
        nomor_ijazah: String,
        #[arg(long, default_value_t = 1)]
        jumlah_lembar: u32,
        #[arg(long)]
        keperluan: String,
        /// Stored path of the uploaded scan
        #[arg(long)]
        file: Option<String>,
    },
    /// Download the diploma scan of a request
    Download {
        id: u64,
        /// The applicant's upload
        #[arg(long, conflicts_with = "verified")]
        original: bool,
        /// The stamped copy
        #[arg(long)]
        verified: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Verify a request
    Verify { id: u64 },
    /// Reject a request
    Reject {
        id: u64,
        #[arg(short, long)]
        reason: String,
    },
    /// Download the spreadsheet export
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub backend_url: String,

    // Timeouts (seconds)
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub credentials_file: PathBuf,

    // Navigation
    pub login_path: String,
    pub refresh_path: String,

    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args)?, command))
    }

    /// Build config from parsed arguments plus the env-only settings
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let credentials_file = match args.credentials_file {
            Some(path) => expand_tilde(&path),
            None => default_credentials_file()
                .context("No config directory found (use -c or set CREDENTIALS_FILE)")?,
        };

        Ok(Config {
            backend_url: args.backend_url.trim_end_matches('/').to_string(),
            http_connect_timeout: parse_seconds(std::env::var("HTTP_CONNECT_TIMEOUT").ok(), 10),
            http_request_timeout: args.http_timeout,
            credentials_file,
            login_path: args.login_path,
            refresh_path: std::env::var("REFRESH_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REFRESH_PATH.to_string()),
            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.backend_url)
            .with_context(|| format!("BACKEND_URL is not a valid URL: {}", self.backend_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("BACKEND_URL must use http or https: {}", self.backend_url);
        }

        if self.http_request_timeout == 0 || self.http_connect_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        if !self.login_path.starts_with('/') {
            anyhow::bail!("LOGIN_PATH must start with '/': {}", self.login_path);
        }

        Ok(())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn default_credentials_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("credentials.json"))
}

/// Parse a whole number of seconds, falling back on anything unparseable
fn parse_seconds(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
