use crate::commands::{load_client, Global};
use crate::display;
use crate::error::Result;
use crate::github::purpose::AppPurpose;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PurposeRow {
    pub purpose: String,
    pub name: String,
    pub app: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub apps: usize,
    pub organizations: usize,
    pub purposes: Vec<PurposeRow>,
}

/// Eager configuration check: every required purpose has an app, every
/// organization (static or dynamic) points at configured apps, and every app
/// can sign a JWT with its key.
pub async fn run(require: &[String], global: &Global) -> Result<()> {
    let (config, client) = load_client(global)?;
    let manager = client.manager();

    let required = require
        .iter()
        .map(|id| manager.registry().resolve(id))
        .collect::<Result<Vec<AppPurpose>>>()?;

    config.validate(&required)?;
    manager.validate(&required)?;

    for app in manager.applications() {
        app.tokens().create_app_jwt()?;
    }

    let purposes = manager
        .registry()
        .all()
        .into_iter()
        .map(|purpose| PurposeRow {
            purpose: purpose.id().to_string(),
            name: purpose.name().to_string(),
            app: manager
                .app_for_purpose(&purpose, None)
                .ok()
                .map(|app| format!("{} ({})", app.slug(), app.id())),
        })
        .collect();

    let report = ValidationReport {
        apps: manager.applications().len(),
        organizations: manager.settings().organizations().len(),
        purposes,
    };

    display::output(global.json, &report, |r| {
        display::section_header("Purposes");
        let mut table = display::new_table(&["Purpose", "Name", "App"]);
        for row in &r.purposes {
            table.add_row(vec![
                row.purpose.as_str(),
                row.name.as_str(),
                row.app.as_deref().unwrap_or("-"),
            ]);
        }
        println!("{table}");
        display::success(&format!(
            "Configuration valid: {} app(s), {} organization(s)",
            r.apps, r.organizations
        ));
    });

    Ok(())
}
