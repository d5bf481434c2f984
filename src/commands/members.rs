use crate::commands::{load_client, resolve_purpose, Global};
use crate::display;
use crate::entities::MemberRoleFilter;
use crate::error::{PortalError, Result};
use crate::github::purpose::AppPurpose;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MemberRow {
    pub login: String,
    pub id: u64,
    pub site_admin: bool,
}

fn parse_role(role: &str) -> Result<MemberRoleFilter> {
    match role.to_ascii_lowercase().as_str() {
        "all" => Ok(MemberRoleFilter::All),
        "admin" => Ok(MemberRoleFilter::Admin),
        "member" => Ok(MemberRoleFilter::Member),
        other => Err(PortalError::InvalidParameter(format!(
            "unknown role '{other}' (expected all, admin or member)"
        ))),
    }
}

/// Team member listings have no role filter.
fn check_role_scope(team: &Option<String>, role: MemberRoleFilter) -> Result<()> {
    match team {
        Some(slug) if role != MemberRoleFilter::All => Err(PortalError::InvalidParameter(format!(
            "--role cannot be combined with --team {slug}"
        ))),
        _ => Ok(()),
    }
}

/// Organization members, or a team's members when `team` is given.
pub async fn run(
    org: &str,
    team: &Option<String>,
    role: &str,
    purpose: &Option<String>,
    global: &Global,
) -> Result<()> {
    let role = parse_role(role)?;
    check_role_scope(team, role)?;
    let (_, client) = load_client(global)?;
    let purpose = resolve_purpose(&client, purpose, AppPurpose::Data)?;
    let organization = client.organization(org).with_purpose(purpose);

    let members = match team {
        Some(slug) => organization.team(slug).get_members().await?,
        None => organization.get_members(role).await?,
    };

    let mut rows: Vec<MemberRow> = members
        .items
        .into_iter()
        .map(|m| MemberRow {
            login: m.login,
            id: m.id,
            site_admin: m.site_admin,
        })
        .collect();
    rows.sort_by_key(|r| r.login.to_lowercase());

    let title = match team {
        Some(slug) => format!("Members of {org}/{slug}"),
        None => format!("Members of {org}"),
    };
    display::output(global.json, &rows, |data| {
        if data.is_empty() {
            display::warn("No members found.");
            return;
        }
        display::section_header(&title);
        let mut table = display::new_table(&["Login", "ID", "Site Admin"]);
        for r in data {
            table.add_row(vec![
                &r.login,
                &r.id.to_string(),
                &if r.site_admin { "yes" } else { "" }.to_string(),
            ]);
        }
        println!("{table}");
        println!("\n{} member(s) found.", data.len());
    });
    display::cost(global.verbose, &members.cost);

    Ok(())
}
