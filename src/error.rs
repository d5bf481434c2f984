use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("No GitHub App is configured for the {purpose} purpose{}", org_suffix(.organization))]
    NoConfigurationForPurpose {
        purpose: String,
        organization: Option<String>,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown GitHub App: {0}")]
    UnknownApp(u64),

    #[error("GitHub App {app_id} has no installation for organization {organization}")]
    NoInstallation { app_id: u64, organization: String },

    #[error("Could not mint a token for installation {installation_id} of app {app_id} ({status}): {message}")]
    TokenMint {
        app_id: u64,
        installation_id: u64,
        status: u16,
        message: String,
    },

    #[error("Invalid private key for GitHub App {app_id}: {message}")]
    PrivateKey { app_id: u64, message: String },

    #[error("JWT signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("GitHub API error: {0}")]
    GitHub(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited. Resets at {0}. Please wait and retry.")]
    RateLimited(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

fn org_suffix(organization: &Option<String>) -> String {
    organization
        .as_ref()
        .map(|org| format!(" (organization {org})"))
        .unwrap_or_default()
}

impl From<octocrab::Error> for PortalError {
    fn from(err: octocrab::Error) -> Self {
        PortalError::GitHub(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
