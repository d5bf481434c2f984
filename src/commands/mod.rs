pub mod add_app;
pub mod apps;
pub mod approve;
pub mod create_repo;
pub mod installations;
pub mod members;
pub mod orgs;
pub mod repos;
pub mod teams;
pub mod token;
pub mod validate;
pub mod webhook;

use crate::config::{load_config, Config};
use crate::error::{PortalError, Result};
use crate::github::purpose::AppPurpose;
use crate::github::GithubClient;
use std::path::PathBuf;

/// Flags shared by every subcommand.
pub struct Global {
    pub json: bool,
    pub verbose: bool,
    pub config: Option<PathBuf>,
}

pub fn load_client(global: &Global) -> Result<(Config, GithubClient)> {
    let config = load_config(global.config.as_deref())?;
    if config.apps.is_empty() {
        return Err(PortalError::Config(
            "No GitHub Apps configured. Run `orgportal add-app` first.".into(),
        ));
    }
    let client = GithubClient::from_config(&config, global.verbose)?;
    Ok((config, client))
}

pub fn resolve_purpose(
    client: &GithubClient,
    flag: &Option<String>,
    default: AppPurpose,
) -> Result<AppPurpose> {
    match flag {
        Some(id) => client.manager().registry().resolve(id),
        None => Ok(default),
    }
}

/// The organization named on the command line, or every active configured one.
pub fn resolve_orgs(org_flag: &Option<String>, client: &GithubClient) -> Result<Vec<String>> {
    if let Some(org) = org_flag {
        return Ok(vec![org.clone()]);
    }

    let names: Vec<String> = client
        .manager()
        .settings()
        .organizations()
        .into_iter()
        .filter(|o| o.active)
        .map(|o| o.name.clone())
        .collect();
    if names.is_empty() {
        return Err(PortalError::InvalidParameter(
            "no --org given and no organizations configured".into(),
        ));
    }
    Ok(names)
}
