//! Business objects over the GitHub API.
//!
//! Entities never hold a credential. They carry an [`OrganizationAuthorization`]
//! and ask it for a header for whichever purpose the operation needs: reads use
//! the entity's read purpose (`Data` unless changed), writes use `Operations`.

mod organization;
mod repository;
mod team;

pub use organization::{CreateRepositoryOptions, JoinApproval, MemberRoleFilter, Organization};
pub use repository::{CollaboratorAffiliation, Repository, RepositoryPatch};
pub use team::Team;

use crate::error::Result;
use crate::github::client::octocrab_for;
use crate::github::collections::{scope_for_app, Cached, Collection, RestCollections};
use crate::github::purpose::AppPurpose;
use crate::github::token_manager::{OrganizationAuthorization, PurposeCredential};
use chrono::Duration;
use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub const WRITE_PURPOSE: AppPurpose = AppPurpose::Operations;

pub(crate) fn org_repos_route(organization: &str) -> String {
    format!("/orgs/{organization}/repos?per_page=100&type=all")
}

#[derive(Clone)]
pub(crate) struct EntityContext {
    authorization: OrganizationAuthorization,
    collections: Arc<RestCollections>,
    base_url: String,
    max_age: Duration,
    read_purpose: AppPurpose,
}

impl EntityContext {
    pub(crate) fn new(
        authorization: OrganizationAuthorization,
        collections: Arc<RestCollections>,
        base_url: String,
        max_age: Duration,
    ) -> Self {
        Self {
            authorization,
            collections,
            base_url,
            max_age,
            read_purpose: AppPurpose::Data,
        }
    }

    pub(crate) fn organization(&self) -> &str {
        self.authorization.organization()
    }

    fn read_credential(&self) -> Result<PurposeCredential> {
        self.authorization.credential(&self.read_purpose)
    }

    async fn get_cached<T: DeserializeOwned>(&self, route: &str) -> Result<Cached<T>> {
        let credential = self.read_credential()?;
        self.collections
            .get_cached(&credential, route, self.max_age)
            .await
    }

    async fn get_collection<T: DeserializeOwned>(&self, route: &str) -> Result<Collection<T>> {
        let credential = self.read_credential()?;
        self.collections
            .get_collection(&credential, route, self.max_age)
            .await
    }

    async fn get_uncached<T: DeserializeOwned>(&self, route: &str) -> Result<T> {
        let credential = self.read_credential()?;
        self.collections.get_uncached(&credential, route).await
    }

    async fn write_client(&self) -> Result<Octocrab> {
        let header = self.authorization.header(&WRITE_PURPOSE).await?;
        octocrab_for(&self.base_url, &header)
    }

    /// Drops `routes` for every app, since any of them may have read them.
    async fn invalidate(&self, routes: &[String]) -> Result<()> {
        let scopes: Vec<String> = self
            .authorization
            .manager()
            .applications()
            .iter()
            .map(|app| scope_for_app(app.id()))
            .collect();
        for route in routes {
            self.collections.invalidate(&scopes, route).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::github::cache::{CacheProvider, MemoryCache, TieredCache};
    use crate::github::client::GithubClient;
    use crate::github::collections::RestCollections;
    use crate::github::token_manager::tests::{contoso_settings, manager};
    use chrono::Duration;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// A client whose Data purpose mints `token ghs_data` and Operations
    /// mints `token ghs_ops` for contoso.
    pub(crate) async fn client(server: &MockServer) -> GithubClient {
        for (installation_id, token) in [(100, "ghs_data"), (200, "ghs_ops")] {
            Mock::given(method("POST"))
                .and(path(format!(
                    "/app/installations/{installation_id}/access_tokens"
                )))
                .respond_with(
                    ResponseTemplate::new(201).set_body_json(serde_json::json!({"token": token})),
                )
                .mount(server)
                .await;
        }
        build_client(server, TieredCache::local_only())
    }

    fn build_client(server: &MockServer, cache: TieredCache) -> GithubClient {
        let manager = Arc::new(manager(&server.uri(), vec![contoso_settings(&[])]));
        let collections = Arc::new(RestCollections::new(
            reqwest::Client::new(),
            &server.uri(),
            Arc::new(cache),
            4,
        ));
        GithubClient::new(manager, collections, Duration::minutes(5), false)
    }

    #[tokio::test]
    async fn fresh_cached_read_mints_no_token() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/100/access_tokens"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"token": "ghs_data"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/contoso"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "login": "contoso", "id": 9
            })))
            .expect(1)
            .mount(&server)
            .await;

        let shared: Arc<dyn CacheProvider> = Arc::new(MemoryCache::new());
        // each client starts with an empty token cache
        for _ in 0..2 {
            let client = build_client(&server, TieredCache::new(Some(Arc::clone(&shared))));
            let details = client.organization("contoso").get_details().await?;
            assert_eq!(details.value.login, "contoso");
        }
        Ok(())
    }
}
