use crate::commands::{load_client, Global};
use crate::display;
use crate::error::{PortalError, Result};
use crate::github::models::TeamRole;

fn parse_team_role(role: &str) -> Result<TeamRole> {
    match role.to_ascii_lowercase().as_str() {
        "member" => Ok(TeamRole::Member),
        "maintainer" => Ok(TeamRole::Maintainer),
        other => Err(PortalError::InvalidParameter(format!(
            "unknown team role '{other}' (expected member or maintainer)"
        ))),
    }
}

/// Approves a request to join `team`, inviting the user to the organization
/// first when they are not a member yet.
pub async fn run(org: &str, team: &str, user: &str, role: &str, global: &Global) -> Result<()> {
    let role = parse_team_role(role)?;
    let (_, client) = load_client(global)?;

    let approval = client
        .organization(org)
        .approve_join_request(team, user, role)
        .await?;

    display::output(global.json, &approval, |a| {
        if let Some(invitation) = &a.organization_invitation {
            display::success(&format!(
                "Invited {} to {} ({})",
                a.login, a.organization, invitation.state
            ));
        }
        display::success(&format!(
            "Added {} to {}/{} as {} ({})",
            a.login, a.organization, a.team, a.team_membership.role, a.team_membership.state
        ));
    });

    Ok(())
}
