use super::{org_repos_route, EntityContext};
use crate::error::Result;
use crate::github::collections::{Cached, Collection};
use crate::github::models::{Collaborator, RepositorySummary, TeamSummary};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollaboratorAffiliation {
    #[default]
    Direct,
    Outside,
    All,
}

impl CollaboratorAffiliation {
    fn as_query(self) -> &'static str {
        match self {
            CollaboratorAffiliation::Direct => "direct",
            CollaboratorAffiliation::Outside => "outside",
            CollaboratorAffiliation::All => "all",
        }
    }
}

/// Fields to change on a repository; `None` leaves a field alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepositoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

pub struct Repository {
    owner: String,
    name: String,
    ctx: EntityContext,
}

impl Repository {
    pub(crate) fn new(owner: &str, name: &str, ctx: EntityContext) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            ctx,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    fn route(&self) -> String {
        format!("/repos/{}/{}", self.owner, self.name)
    }

    pub async fn get_details(&self) -> Result<Cached<RepositorySummary>> {
        self.ctx.get_cached(&self.route()).await
    }

    pub async fn get_teams(&self) -> Result<Collection<TeamSummary>> {
        self.ctx
            .get_collection(&format!("{}/teams?per_page=100", self.route()))
            .await
    }

    pub async fn get_collaborators(
        &self,
        affiliation: CollaboratorAffiliation,
    ) -> Result<Collection<Collaborator>> {
        self.ctx
            .get_collection(&format!(
                "{}/collaborators?per_page=100&affiliation={}",
                self.route(),
                affiliation.as_query()
            ))
            .await
    }

    pub async fn update(&self, patch: &RepositoryPatch) -> Result<RepositorySummary> {
        let octocrab = self.ctx.write_client().await?;
        let updated: RepositorySummary = octocrab.patch(self.route(), Some(patch)).await?;
        info!(
            organization = self.ctx.organization(),
            repository = %self.full_name(),
            "updated repository"
        );
        self.ctx
            .invalidate(&[self.route(), org_repos_route(&self.owner)])
            .await?;
        Ok(updated)
    }
}
