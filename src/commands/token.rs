use crate::commands::{load_client, resolve_purpose, Global};
use crate::display;
use crate::error::Result;
use crate::github::purpose::{AppAuthenticationType, AppPurpose};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TokenReport {
    pub organization: String,
    pub purpose: String,
    pub app_id: u64,
    pub app_slug: String,
    pub installation_id: u64,
    pub requested: String,
    pub expires: String,
    pub minutes_remaining: i64,
    pub authorization: String,
}

pub async fn run(
    org: &str,
    purpose: &Option<String>,
    installation: Option<u64>,
    global: &Global,
) -> Result<()> {
    let (_, client) = load_client(global)?;
    let purpose = resolve_purpose(&client, purpose, AppPurpose::Data)?;
    let manager = client.manager();

    let app = manager.app_for_purpose(&purpose, Some(org))?;
    let auth_type = match installation {
        Some(installation_id) => AppAuthenticationType::ForceSpecificInstallation { installation_id },
        None => AppAuthenticationType::BestAvailable,
    };
    let token = manager.get_organization_token(org, &purpose, auth_type).await?;

    let report = TokenReport {
        organization: token.organization_name.clone(),
        purpose: purpose.id().to_string(),
        app_id: app.id(),
        app_slug: app.slug().to_string(),
        installation_id: token.installation_id,
        requested: token.requested.to_rfc3339(),
        expires: token.expires.to_rfc3339(),
        minutes_remaining: (token.expires - Utc::now()).num_minutes(),
        authorization: display::mask_header(token.header_value()),
    };

    display::output(global.json, &report, |r| {
        display::section_header("Installation token");
        let mut table = display::new_table(&["Field", "Value"]);
        table.add_row(vec!["Organization", &r.organization]);
        table.add_row(vec!["Purpose", &r.purpose]);
        table.add_row(vec!["App", &format!("{} ({})", r.app_slug, r.app_id)]);
        table.add_row(vec!["Installation", &r.installation_id.to_string()]);
        table.add_row(vec!["Expires", &r.expires]);
        table.add_row(vec!["Remaining", &format!("{} min", r.minutes_remaining)]);
        table.add_row(vec!["Authorization", &r.authorization]);
        println!("{table}");
    });

    client.check_rate_limit_if_verbose(org, &purpose).await;

    Ok(())
}
