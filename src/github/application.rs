use crate::error::{PortalError, Result};
use crate::github::app_tokens::GitHubAppTokens;
use crate::github::models::Installation;
use crate::github::purpose::AppPurpose;
use crate::github::{github_headers, next_page_link, truncate_error_body};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// One registered GitHub App and the purposes it serves by default.
#[derive(Debug, Clone)]
pub struct GitHubApplication {
    tokens: Arc<GitHubAppTokens>,
    purposes: Vec<AppPurpose>,
}

impl GitHubApplication {
    pub fn new(tokens: Arc<GitHubAppTokens>, purposes: Vec<AppPurpose>) -> Self {
        Self { tokens, purposes }
    }

    pub fn id(&self) -> u64 {
        self.tokens.app_id()
    }

    pub fn slug(&self) -> &str {
        self.tokens.slug()
    }

    pub fn friendly_name(&self) -> &str {
        self.tokens.friendly_name()
    }

    pub fn purposes(&self) -> &[AppPurpose] {
        &self.purposes
    }

    pub fn tokens(&self) -> &Arc<GitHubAppTokens> {
        &self.tokens
    }

    /// Every installation of the app, across all pages.
    pub async fn get_installations(&self) -> Result<Vec<Installation>> {
        let mut all = Vec::new();
        let mut next = Some(format!(
            "{}/app/installations?per_page=100",
            self.tokens.base_url()
        ));
        while let Some(url) = next {
            let (page, link): (Vec<Installation>, _) = self.get_as_app(&url).await?;
            all.extend(page);
            next = link;
        }
        Ok(all)
    }

    pub async fn get_installation(&self, installation_id: u64) -> Result<Installation> {
        let url = format!(
            "{}/app/installations/{installation_id}",
            self.tokens.base_url()
        );
        let (installation, _) = self.get_as_app(&url).await?;
        Ok(installation)
    }

    /// The app's installation on `organization`, if it has one.
    pub async fn get_installation_for_organization(
        &self,
        organization: &str,
    ) -> Result<Option<Installation>> {
        let url = format!("{}/orgs/{organization}/installation", self.tokens.base_url());
        match self.get_as_app(&url).await {
            Ok((installation, _)) => Ok(Some(installation)),
            Err(PortalError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_as_app<T: DeserializeOwned>(&self, url: &str) -> Result<(T, Option<String>)> {
        let jwt = self.tokens.create_app_jwt()?;
        let response = self
            .tokens
            .http()
            .get(url)
            .headers(github_headers())
            .bearer_auth(jwt)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PortalError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let body = truncate_error_body(response.text().await.unwrap_or_default());
            return Err(PortalError::GitHub(format!(
                "app {} request failed: {status} - {body}",
                self.id()
            )));
        }

        let next = next_page_link(response.headers());
        let value = response.json().await?;
        Ok((value, next))
    }
}
