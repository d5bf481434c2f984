use super::{org_repos_route, EntityContext, Repository, Team};
use crate::error::{PortalError, Result};
use crate::github::collections::{Cached, Collection, RestCollections};
use crate::github::models::{
    Member, OrganizationDetails, OrganizationMembership, OrganizationRole, RepositorySummary,
    TeamMembership, TeamRole, TeamSummary,
};
use crate::github::purpose::AppPurpose;
use crate::github::token_manager::OrganizationAuthorization;
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemberRoleFilter {
    #[default]
    All,
    Admin,
    Member,
}

impl MemberRoleFilter {
    fn as_query(self) -> &'static str {
        match self {
            MemberRoleFilter::All => "all",
            MemberRoleFilter::Admin => "admin",
            MemberRoleFilter::Member => "member",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateRepositoryOptions {
    pub name: String,
    pub description: Option<String>,
    pub private: bool,
    /// `owner/repo` of a template repository to generate from.
    pub template: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRepositoryBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    private: bool,
    auto_init: bool,
}

#[derive(Debug, Serialize)]
struct GenerateRepositoryBody<'a> {
    owner: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    private: bool,
    include_all_branches: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinApproval {
    pub organization: String,
    pub team: String,
    pub login: String,
    /// Set when the user was not yet a member and had to be invited.
    pub organization_invitation: Option<OrganizationMembership>,
    pub team_membership: TeamMembership,
}

pub struct Organization {
    name: String,
    ctx: EntityContext,
}

impl Organization {
    pub fn new(
        name: &str,
        authorization: OrganizationAuthorization,
        collections: Arc<RestCollections>,
        base_url: String,
        max_age: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            ctx: EntityContext::new(authorization, collections, base_url, max_age),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads through a different app, e.g. a security scanner identity.
    pub fn with_purpose(mut self, purpose: AppPurpose) -> Self {
        self.ctx.read_purpose = purpose;
        self
    }

    pub fn read_purpose(&self) -> &AppPurpose {
        &self.ctx.read_purpose
    }

    pub fn repository(&self, name: &str) -> Repository {
        Repository::new(&self.name, name, self.ctx.clone())
    }

    pub fn team(&self, slug: &str) -> Team {
        Team::new(slug, self.ctx.clone())
    }

    fn repos_route(&self) -> String {
        org_repos_route(&self.name)
    }

    fn members_route(&self, role: MemberRoleFilter) -> String {
        format!("/orgs/{}/members?per_page=100&role={}", self.name, role.as_query())
    }

    pub async fn get_details(&self) -> Result<Cached<OrganizationDetails>> {
        self.ctx.get_cached(&format!("/orgs/{}", self.name)).await
    }

    pub async fn get_repositories(&self) -> Result<Collection<RepositorySummary>> {
        self.ctx.get_collection(&self.repos_route()).await
    }

    pub async fn get_teams(&self) -> Result<Collection<TeamSummary>> {
        self.ctx
            .get_collection(&format!("/orgs/{}/teams?per_page=100", self.name))
            .await
    }

    pub async fn get_members(&self, role: MemberRoleFilter) -> Result<Collection<Member>> {
        self.ctx.get_collection(&self.members_route(role)).await
    }

    /// Current membership of `login`, read live since approvals act on it.
    pub async fn get_membership(&self, login: &str) -> Result<Option<OrganizationMembership>> {
        let route = format!("/orgs/{}/memberships/{login}", self.name);
        match self.ctx.get_uncached(&route).await {
            Ok(membership) => Ok(Some(membership)),
            Err(PortalError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn add_membership(
        &self,
        login: &str,
        role: OrganizationRole,
    ) -> Result<OrganizationMembership> {
        let octocrab = self.ctx.write_client().await?;
        let membership: OrganizationMembership = octocrab
            .put(
                format!("/orgs/{}/memberships/{login}", self.name),
                Some(&serde_json::json!({ "role": role })),
            )
            .await?;
        info!(organization = %self.name, login, state = %membership.state, "set organization membership");
        let routes = [
            MemberRoleFilter::All,
            MemberRoleFilter::Admin,
            MemberRoleFilter::Member,
        ]
        .map(|role| self.members_route(role));
        self.ctx.invalidate(&routes).await?;
        Ok(membership)
    }

    pub async fn create_repository(
        &self,
        options: &CreateRepositoryOptions,
    ) -> Result<RepositorySummary> {
        if options.name.trim().is_empty() {
            return Err(PortalError::InvalidParameter(
                "repository name cannot be empty".into(),
            ));
        }
        let octocrab = self.ctx.write_client().await?;

        let repository: RepositorySummary = match &options.template {
            Some(template) => {
                let (owner, repo) = template.split_once('/').ok_or_else(|| {
                    PortalError::InvalidParameter(format!(
                        "template must be owner/repo, got {template}"
                    ))
                })?;
                let body = GenerateRepositoryBody {
                    owner: &self.name,
                    name: &options.name,
                    description: options.description.as_deref(),
                    private: options.private,
                    include_all_branches: false,
                };
                octocrab
                    .post(format!("/repos/{owner}/{repo}/generate"), Some(&body))
                    .await?
            }
            None => {
                let body = CreateRepositoryBody {
                    name: &options.name,
                    description: options.description.as_deref(),
                    private: options.private,
                    auto_init: true,
                };
                octocrab
                    .post(format!("/orgs/{}/repos", self.name), Some(&body))
                    .await?
            }
        };

        info!(
            organization = %self.name,
            repository = %repository.name,
            template = options.template.as_deref().unwrap_or("-"),
            "created repository"
        );
        self.ctx.invalidate(&[self.repos_route()]).await?;
        Ok(repository)
    }

    /// Approves a request to join `team_slug`: invites the user to the
    /// organization first when they are not a member, then adds them to the team.
    pub async fn approve_join_request(
        &self,
        team_slug: &str,
        login: &str,
        role: TeamRole,
    ) -> Result<JoinApproval> {
        let organization_invitation = match self.get_membership(login).await? {
            Some(_) => None,
            None => Some(self.add_membership(login, OrganizationRole::Member).await?),
        };
        let team_membership = self.team(team_slug).add_membership(login, role).await?;
        Ok(JoinApproval {
            organization: self.name.clone(),
            team: team_slug.to_string(),
            login: login.to_string(),
            organization_invitation,
            team_membership,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::tests::client;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reads_use_data_purpose() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let client = client(&server).await;
        Mock::given(method("GET"))
            .and(path("/orgs/contoso/repos"))
            .and(query_param("type", "all"))
            .and(header("authorization", "token ghs_data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "portal", "full_name": "contoso/portal", "private": true},
                {"id": 2, "name": "docs", "full_name": "contoso/docs"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let org = client.organization("contoso");
        let repos = org.get_repositories().await?;
        assert_eq!(repos.items.len(), 2);
        assert!(repos.items[0].private);
        assert_eq!(repos.cost.remote_calls, 1);

        let cached = org.get_repositories().await?;
        assert_eq!(cached.cost.local_cache_hits, 1);
        Ok(())
    }

    #[tokio::test]
    async fn with_purpose_switches_identity() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let client = client(&server).await;
        Mock::given(method("GET"))
            .and(path("/orgs/contoso"))
            .and(header("authorization", "token ghs_ops"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "login": "contoso", "id": 9, "name": "Contoso Ltd"
            })))
            .mount(&server)
            .await;

        let org = client.organization("contoso").with_purpose(AppPurpose::Operations);
        assert_eq!(org.read_purpose(), &AppPurpose::Operations);
        let details = org.get_details().await?;
        assert_eq!(details.value.name.as_deref(), Some("Contoso Ltd"));
        Ok(())
    }

    #[tokio::test]
    async fn cached_list_not_shared_with_other_purpose() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let client = client(&server).await;
        Mock::given(method("GET"))
            .and(path("/orgs/contoso/repos"))
            .and(header("authorization", "token ghs_data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "secret"}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/contoso/repos"))
            .and(header("authorization", "token ghs_ops"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let repos = client.organization("contoso").get_repositories().await?;
        assert_eq!(repos.items[0].name, "secret");

        let as_operations = client
            .organization("contoso")
            .with_purpose(AppPurpose::Operations)
            .get_repositories()
            .await;
        assert!(matches!(as_operations, Err(PortalError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn missing_purpose_fails_before_any_request() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let client = client(&server).await;
        let org = client.organization("contoso").with_purpose(AppPurpose::Security);
        let err = org.get_teams().await.unwrap_err();
        assert!(matches!(err, PortalError::NoConfigurationForPurpose { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn approve_invites_non_member_then_adds_to_team() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let client = client(&server).await;
        Mock::given(method("GET"))
            .and(path("/orgs/contoso/memberships/octocat"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/orgs/contoso/memberships/octocat"))
            .and(body_json(serde_json::json!({"role": "member"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": "pending", "role": "member"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/orgs/contoso/teams/platform/memberships/octocat"))
            .and(body_json(serde_json::json!({"role": "maintainer"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": "pending", "role": "maintainer",
                "url": "https://api.github.com/teams/1/memberships/octocat"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let org = client.organization("contoso");
        let approval = org
            .approve_join_request("platform", "octocat", TeamRole::Maintainer)
            .await?;
        assert_eq!(
            approval.organization_invitation.map(|m| m.state).as_deref(),
            Some("pending")
        );
        assert_eq!(approval.team_membership.role, "maintainer");
        Ok(())
    }

    #[tokio::test]
    async fn approve_skips_invite_for_existing_member() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let client = client(&server).await;
        Mock::given(method("GET"))
            .and(path("/orgs/contoso/memberships/octocat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": "active", "role": "member"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/orgs/contoso/memberships/octocat"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/orgs/contoso/teams/platform/memberships/octocat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": "active", "role": "member"
            })))
            .mount(&server)
            .await;

        let approval = client
            .organization("contoso")
            .approve_join_request("platform", "octocat", TeamRole::Member)
            .await?;
        assert!(approval.organization_invitation.is_none());
        assert_eq!(approval.team_membership.state, "active");
        Ok(())
    }

    #[tokio::test]
    async fn create_repository_from_template() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let client = client(&server).await;
        Mock::given(method("POST"))
            .and(path("/repos/contoso/service-template/generate"))
            .and(body_json(serde_json::json!({
                "owner": "contoso",
                "name": "billing",
                "private": true,
                "include_all_branches": false
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 77, "name": "billing", "full_name": "contoso/billing", "private": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let repo = client
            .organization("contoso")
            .create_repository(&CreateRepositoryOptions {
                name: "billing".to_string(),
                description: None,
                private: true,
                template: Some("contoso/service-template".to_string()),
            })
            .await?;
        assert_eq!(repo.full_name, "contoso/billing");
        Ok(())
    }

    #[tokio::test]
    async fn create_repository_rejects_bad_template() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let client = client(&server).await;
        let err = client
            .organization("contoso")
            .create_repository(&CreateRepositoryOptions {
                name: "billing".to_string(),
                template: Some("no-slash".to_string()),
                ..CreateRepositoryOptions::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::InvalidParameter(_)));
        Ok(())
    }
}
