use crate::commands::{load_client, Global};
use crate::display;
use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct OrgSummary {
    pub name: String,
    pub active: bool,
    pub installations: Vec<String>,
    pub purpose_overrides: Vec<String>,
    pub url: String,
}

pub async fn run(global: &Global) -> Result<()> {
    let (_, client) = load_client(global)?;

    let summaries: Vec<OrgSummary> = client
        .manager()
        .settings()
        .organizations()
        .into_iter()
        .map(|o| {
            let mut purpose_overrides: Vec<String> = o
                .purpose_apps
                .iter()
                .map(|(purpose, app_id)| format!("{purpose} → {app_id}"))
                .collect();
            purpose_overrides.sort();
            OrgSummary {
                name: o.name.clone(),
                active: o.active,
                installations: o
                    .installations
                    .iter()
                    .map(|i| format!("{}:{}", i.app_id, i.installation_id))
                    .collect(),
                purpose_overrides,
                url: format!("https://github.com/{}", o.name),
            }
        })
        .collect();

    display::output(global.json, &summaries, |data| {
        render_orgs_table(data);
    });

    Ok(())
}

fn render_orgs_table(orgs: &[OrgSummary]) {
    if orgs.is_empty() {
        display::warn("No organizations configured.");
        return;
    }

    display::section_header("Organizations");

    let mut table = display::new_table(&["Name", "Active", "Installations (app:id)", "Overrides", "URL"]);

    for org in orgs {
        table.add_row(vec![
            &org.name,
            &org.active.to_string(),
            &or_dash(&org.installations),
            &or_dash(&org.purpose_overrides),
            &org.url,
        ]);
    }

    println!("{table}");
    println!("\n{} organization(s) configured.", orgs.len());
}

fn or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}
