use crate::commands::{load_client, Global};
use crate::display;
use crate::error::{PortalError, Result};
use crate::webhook::{verify_signature, WebhookEnvelope};
use std::path::Path;

/// Verifies a saved delivery against the app's webhook secret and prints
/// where it would be routed.
pub async fn run(app_id: u64, signature: &str, payload: &Path, global: &Global) -> Result<()> {
    let (_, client) = load_client(global)?;
    let secret = client.manager().webhook_secret(app_id)?;

    let body = tokio::fs::read(payload).await?;
    if !verify_signature(secret, signature, &body) {
        return Err(PortalError::InvalidParameter(format!(
            "signature does not match {} for app {app_id}",
            payload.display()
        )));
    }

    let envelope = WebhookEnvelope::parse(&body)?;
    display::output(global.json, &envelope, |e| {
        display::success("Signature valid");
        let mut table = display::new_table(&["Field", "Value"]);
        let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        table.add_row(vec!["Action".to_string(), or_dash(&e.action)]);
        table.add_row(vec![
            "Installation".to_string(),
            e.installation_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
        table.add_row(vec!["Organization".to_string(), or_dash(&e.organization)]);
        table.add_row(vec!["Repository".to_string(), or_dash(&e.repository)]);
        table.add_row(vec!["Sender".to_string(), or_dash(&e.sender)]);
        println!("{table}");
    });

    Ok(())
}
