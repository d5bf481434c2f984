use crate::commands::{load_client, Global};
use crate::display;
use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct InstallationSummary {
    pub app_id: u64,
    pub installation_id: u64,
    pub account: String,
    pub repository_selection: String,
    pub problems: Vec<String>,
}

pub async fn run(app_filter: Option<u64>, global: &Global) -> Result<()> {
    let (_, client) = load_client(global)?;

    let apps = match app_filter {
        Some(app_id) => vec![client.manager().application(app_id)?],
        None => client.manager().applications(),
    };

    let mut summaries = Vec::new();
    for app in apps {
        match app.get_installations().await {
            Ok(installations) => {
                for inst in installations {
                    summaries.push(InstallationSummary {
                        app_id: app.id(),
                        installation_id: inst.id,
                        account: inst.account.login.clone(),
                        repository_selection: inst
                            .repository_selection
                            .clone()
                            .unwrap_or_else(|| "-".to_string()),
                        problems: inst.problems(),
                    });
                }
            }
            Err(e) => {
                tracing::warn!(app_id = app.id(), error = %e, "listing installations failed");
                display::warn(&format!(
                    "Failed to list installations for app {} ({}): {e}",
                    app.id(),
                    app.slug()
                ));
            }
        }
    }

    display::output(global.json, &summaries, |data| {
        render_installations_table(data);
    });

    Ok(())
}

fn render_installations_table(installations: &[InstallationSummary]) {
    if installations.is_empty() {
        display::warn("No installations found.");
        return;
    }

    display::section_header("Installations");

    let mut table = display::new_table(&["App ID", "Installation", "Account", "Repositories", "Problems"]);

    for inst in installations {
        let problems = if inst.problems.is_empty() {
            "-".to_string()
        } else {
            inst.problems.join("; ")
        };
        table.add_row(vec![
            &inst.app_id.to_string(),
            &inst.installation_id.to_string(),
            &inst.account,
            &inst.repository_selection,
            &problems,
        ]);
    }

    println!("{table}");
    println!("\n{} installation(s) found.", installations.len());
}
