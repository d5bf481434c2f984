use crate::commands::{load_client, Global};
use crate::display;
use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AppSummary {
    pub app_id: u64,
    pub slug: String,
    pub name: String,
    pub purposes: Vec<String>,
}

pub async fn run(global: &Global) -> Result<()> {
    let (_, client) = load_client(global)?;

    let summaries: Vec<AppSummary> = client
        .manager()
        .applications()
        .into_iter()
        .map(|app| AppSummary {
            app_id: app.id(),
            slug: app.slug().to_string(),
            name: app.friendly_name().to_string(),
            purposes: app.purposes().iter().map(|p| p.id().to_string()).collect(),
        })
        .collect();

    display::output(global.json, &summaries, |data| {
        render_apps_table(data);
    });

    Ok(())
}

fn render_apps_table(apps: &[AppSummary]) {
    if apps.is_empty() {
        display::warn("No GitHub Apps configured.");
        return;
    }

    display::section_header("GitHub Apps");

    let mut table = display::new_table(&["App ID", "Slug", "Name", "Default purposes"]);

    for app in apps {
        let purposes = if app.purposes.is_empty() {
            "-".to_string()
        } else {
            app.purposes.join(", ")
        };
        table.add_row(vec![
            &app.app_id.to_string(),
            &app.slug,
            &app.name,
            &purposes,
        ]);
    }

    println!("{table}");
    println!("\n{} app(s) configured.", apps.len());
}
