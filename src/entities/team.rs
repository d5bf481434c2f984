use super::EntityContext;
use crate::error::Result;
use crate::github::collections::{Cached, Collection};
use crate::github::models::{Member, RepositorySummary, TeamMembership, TeamRole, TeamSummary};
use tracing::info;

pub struct Team {
    slug: String,
    ctx: EntityContext,
}

impl Team {
    pub(crate) fn new(slug: &str, ctx: EntityContext) -> Self {
        Self {
            slug: slug.to_string(),
            ctx,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    fn route(&self) -> String {
        format!("/orgs/{}/teams/{}", self.ctx.organization(), self.slug)
    }

    fn members_route(&self) -> String {
        format!("{}/members?per_page=100", self.route())
    }

    pub async fn get_details(&self) -> Result<Cached<TeamSummary>> {
        self.ctx.get_cached(&self.route()).await
    }

    pub async fn get_members(&self) -> Result<Collection<Member>> {
        self.ctx.get_collection(&self.members_route()).await
    }

    pub async fn get_repositories(&self) -> Result<Collection<RepositorySummary>> {
        self.ctx
            .get_collection(&format!("{}/repos?per_page=100", self.route()))
            .await
    }

    pub async fn add_membership(&self, login: &str, role: TeamRole) -> Result<TeamMembership> {
        let octocrab = self.ctx.write_client().await?;
        let membership: TeamMembership = octocrab
            .put(
                format!("{}/memberships/{login}", self.route()),
                Some(&serde_json::json!({ "role": role })),
            )
            .await?;
        info!(
            organization = self.ctx.organization(),
            team = %self.slug,
            login,
            state = %membership.state,
            "set team membership"
        );
        self.ctx.invalidate(&[self.members_route()]).await?;
        Ok(membership)
    }
}
