use crate::commands::{load_client, resolve_orgs, resolve_purpose, Global};
use crate::display;
use crate::error::Result;
use crate::github::collections::ApiCost;
use crate::github::purpose::AppPurpose;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TeamRow {
    pub org: String,
    pub slug: String,
    pub name: String,
    pub privacy: String,
    pub description: String,
}

pub async fn run(org: &Option<String>, purpose: &Option<String>, global: &Global) -> Result<()> {
    let (_, client) = load_client(global)?;
    let purpose = resolve_purpose(&client, purpose, AppPurpose::Data)?;
    let orgs = resolve_orgs(org, &client)?;

    let mut rows = Vec::new();
    let mut cost = ApiCost::default();
    for org_name in &orgs {
        let organization = client.organization(org_name).with_purpose(purpose.clone());
        match organization.get_teams().await {
            Ok(teams) => {
                cost += teams.cost;
                rows.extend(teams.items.into_iter().map(|t| TeamRow {
                    org: org_name.clone(),
                    slug: t.slug,
                    name: t.name,
                    privacy: t.privacy.unwrap_or_else(|| "-".to_string()),
                    description: t.description.unwrap_or_default(),
                }));
            }
            Err(e) => display::warn(&format!("Failed to fetch teams for {org_name}: {e}")),
        }
    }

    rows.sort_by(|a, b| (&a.org, &a.slug).cmp(&(&b.org, &b.slug)));

    display::output(global.json, &rows, |data| {
        render_teams_table(data);
    });
    display::cost(global.verbose, &cost);

    Ok(())
}

fn render_teams_table(teams: &[TeamRow]) {
    if teams.is_empty() {
        display::warn("No teams found.");
        return;
    }

    display::section_header("Teams");

    let mut table = display::new_table(&["Org", "Slug", "Name", "Privacy", "Description"]);
    for t in teams {
        table.add_row(vec![&t.org, &t.slug, &t.name, &t.privacy, &t.description]);
    }

    println!("{table}");
    println!("\n{} team(s) found.", teams.len());
}
