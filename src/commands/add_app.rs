use crate::config::{load_config, save_config, AppConfiguration};
use crate::commands::Global;
use crate::display;
use crate::error::{PortalError, Result};
use std::path::PathBuf;

pub struct AddAppArgs {
    pub app_id: u64,
    pub slug: String,
    pub name: Option<String>,
    pub private_key_file: PathBuf,
    pub purposes: Vec<String>,
    pub base_url: Option<String>,
    pub webhook_secret: Option<String>,
}

/// Registers a GitHub App in the config file.
pub fn run(args: AddAppArgs, global: &Global) -> Result<()> {
    let mut config = load_config(global.config.as_deref())?;

    if config.app(args.app_id).is_some() {
        return Err(PortalError::InvalidParameter(format!(
            "app {} is already configured",
            args.app_id
        )));
    }
    if !args.private_key_file.exists() {
        return Err(PortalError::InvalidParameter(format!(
            "private key file {} does not exist",
            args.private_key_file.display()
        )));
    }

    let registry = config.purpose_registry()?;
    let purposes = args
        .purposes
        .iter()
        .map(|p| registry.resolve(p).map(|purpose| purpose.id().to_string()))
        .collect::<Result<Vec<_>>>()?;

    config.apps.push(AppConfiguration {
        app_id: args.app_id,
        slug: args.slug,
        friendly_name: args.name,
        private_key: None,
        private_key_file: Some(args.private_key_file),
        webhook_secret: args.webhook_secret,
        base_url: args.base_url,
        purposes,
    });
    config.validate(&[])?;

    let path = save_config(&config, global.config.as_deref())?;
    display::success(&format!(
        "Added app {} to {}",
        args.app_id,
        path.display()
    ));
    Ok(())
}
