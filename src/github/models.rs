use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
    pub id: u64,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    pub id: u64,
    pub app_id: u64,
    pub account: Account,
    #[serde(default)]
    pub target_type: String,
    #[serde(default)]
    pub repository_selection: Option<String>,
    #[serde(default)]
    pub permissions: HashMap<String, String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub suspended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Installation {
    /// Reasons the portal cannot use this installation. Empty means usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.target_type != "Organization" {
            problems.push(format!(
                "installed on a {} rather than an organization",
                if self.target_type.is_empty() {
                    "unknown target"
                } else {
                    self.target_type.as_str()
                }
            ));
        }
        if self.suspended_at.is_some() {
            problems.push("installation is suspended".to_string());
        }
        if !self.permissions.contains_key("metadata") {
            problems.push("missing metadata permission".to_string());
        }
        problems
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationDetails {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public_repos: Option<u64>,
    #[serde(default)]
    pub total_private_repos: Option<u64>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSummary {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub privacy: Option<String>,
    #[serde(default)]
    pub permission: Option<String>,
    #[serde(default)]
    pub members_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub site_admin: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaboratorPermissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub maintain: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub triage: bool,
    #[serde(default)]
    pub pull: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaborator {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub role_name: Option<String>,
    #[serde(default)]
    pub permissions: CollaboratorPermissions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub state: String,
    pub role: String,
    #[serde(default)]
    pub user: Option<Member>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMembership {
    pub state: String,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Member,
    Maintainer,
}

#[derive(Debug, Deserialize)]
pub struct RateLimit {
    pub resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
pub struct RateLimitResources {
    pub core: RateLimitResource,
}

#[derive(Debug, Deserialize)]
pub struct RateLimitResource {
    pub limit: u64,
    pub remaining: u64,
    pub reset: i64,
}
