//! GitHub App installation tokens selected by purpose, and the cached
//! organization, repository and team objects built on them.

pub mod commands;
pub mod config;
pub mod display;
pub mod entities;
pub mod error;
pub mod github;
pub mod settings;
pub mod webhook;

pub use error::{PortalError, Result};
pub use github::purpose::{AppAuthenticationType, AppPurpose};
pub use github::token_manager::GitHubTokenManager;
pub use github::GithubClient;
