use crate::commands::{load_client, resolve_orgs, resolve_purpose, Global};
use crate::display;
use crate::error::Result;
use crate::github::collections::ApiCost;
use crate::github::models::RepositorySummary;
use crate::github::purpose::AppPurpose;
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RepoSummary {
    pub org: String,
    pub name: String,
    pub visibility: String,
    pub language: String,
    pub stars: u64,
    pub last_push: String,
    pub status: String,
}

impl RepoSummary {
    pub fn from_repo(org: &str, repo: &RepositorySummary) -> Self {
        let last_push = repo
            .pushed_at
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());

        let status = if repo.archived {
            "archived"
        } else if repo.is_template {
            "template"
        } else {
            let days = repo
                .pushed_at
                .map(|dt| (Utc::now() - dt).num_days())
                .unwrap_or(999);
            if days > 365 {
                "stale"
            } else {
                "active"
            }
        };

        Self {
            org: org.to_string(),
            name: repo.name.clone(),
            visibility: if repo.private { "private" } else { "public" }.to_string(),
            language: repo.language.clone().unwrap_or_else(|| "-".to_string()),
            stars: repo.stargazers_count,
            last_push,
            status: status.to_string(),
        }
    }
}

pub async fn run(
    org: &Option<String>,
    purpose: &Option<String>,
    sort: &str,
    global: &Global,
) -> Result<()> {
    let (_, client) = load_client(global)?;
    let purpose = resolve_purpose(&client, purpose, AppPurpose::Data)?;
    let orgs = resolve_orgs(org, &client)?;

    let mut summaries = Vec::new();
    let mut cost = ApiCost::default();
    for org_name in &orgs {
        let organization = client.organization(org_name).with_purpose(purpose.clone());
        match organization.get_repositories().await {
            Ok(repos) => {
                cost += repos.cost;
                for repo in &repos.items {
                    summaries.push(RepoSummary::from_repo(org_name, repo));
                }
            }
            Err(e) => {
                display::warn(&format!("Failed to fetch repos for {org_name}: {e}"));
            }
        }
    }

    sort_repos(&mut summaries, sort);

    display::output(global.json, &summaries, |data| {
        render_repos_table(data);
    });
    display::cost(global.verbose, &cost);

    if let Some(first) = orgs.first() {
        client.check_rate_limit_if_verbose(first, &purpose).await;
    }

    Ok(())
}

fn sort_repos(repos: &mut [RepoSummary], sort: &str) {
    match sort {
        "stars" => repos.sort_by(|a, b| b.stars.cmp(&a.stars)),
        "name" => repos.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
        "staleness" => repos.sort_by(|a, b| a.last_push.cmp(&b.last_push)),
        _ => repos.sort_by(|a, b| b.last_push.cmp(&a.last_push)), // activity (most recent first)
    }
}

fn render_repos_table(repos: &[RepoSummary]) {
    if repos.is_empty() {
        display::warn("No repositories found.");
        return;
    }

    display::section_header("Repositories");

    let mut table = display::new_table(&[
        "Org",
        "Name",
        "Visibility",
        "Language",
        "Stars",
        "Last Push",
        "Status",
    ]);

    for r in repos {
        table.add_row(vec![
            &r.org,
            &r.name,
            &r.visibility,
            &r.language,
            &r.stars.to_string(),
            &r.last_push,
            &r.status,
        ]);
    }

    println!("{table}");
    println!("\n{} repository(ies) found.", repos.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo(name: &str, stars: u64, last_push: &str) -> RepoSummary {
        RepoSummary {
            org: "contoso".to_string(),
            name: name.to_string(),
            visibility: "private".to_string(),
            language: "Rust".to_string(),
            stars,
            last_push: last_push.to_string(),
            status: "active".to_string(),
        }
    }

    fn repository(json: serde_json::Value) -> RepositorySummary {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn sort_by_stars_descending() {
        let mut repos = vec![
            make_repo("low", 5, "2024-01-01"),
            make_repo("high", 100, "2024-01-01"),
            make_repo("mid", 50, "2024-01-01"),
        ];
        sort_repos(&mut repos, "stars");
        assert_eq!(repos[0].name, "high");
        assert_eq!(repos[1].name, "mid");
        assert_eq!(repos[2].name, "low");
    }

    #[test]
    fn sort_by_name_case_insensitive() {
        let mut repos = vec![
            make_repo("Zebra", 0, "2024-01-01"),
            make_repo("alpha", 0, "2024-01-01"),
            make_repo("Beta", 0, "2024-01-01"),
        ];
        sort_repos(&mut repos, "name");
        assert_eq!(repos[0].name, "alpha");
        assert_eq!(repos[1].name, "Beta");
        assert_eq!(repos[2].name, "Zebra");
    }

    #[test]
    fn sort_by_activity_most_recent_first() {
        let mut repos = vec![
            make_repo("old", 0, "2023-01-01"),
            make_repo("new", 0, "2024-06-01"),
            make_repo("mid", 0, "2024-01-01"),
        ];
        sort_repos(&mut repos, "activity");
        assert_eq!(repos[0].name, "new");
        assert_eq!(repos[2].name, "old");
    }

    #[test]
    fn sort_by_staleness_oldest_first() {
        let mut repos = vec![
            make_repo("new", 0, "2024-06-01"),
            make_repo("old", 0, "2023-01-01"),
            make_repo("mid", 0, "2024-01-01"),
        ];
        sort_repos(&mut repos, "staleness");
        assert_eq!(repos[0].name, "old");
        assert_eq!(repos[2].name, "new");
    }

    #[test]
    fn summary_status_reflects_archive_and_template() {
        let archived = repository(serde_json::json!({
            "id": 1, "name": "legacy", "archived": true, "private": true
        }));
        let summary = RepoSummary::from_repo("contoso", &archived);
        assert_eq!(summary.status, "archived");
        assert_eq!(summary.visibility, "private");
        assert_eq!(summary.last_push, "never");

        let template = repository(serde_json::json!({
            "id": 2, "name": "starter", "is_template": true
        }));
        assert_eq!(RepoSummary::from_repo("contoso", &template).status, "template");
    }
}
