use crate::commands::{load_client, Global};
use crate::display;
use crate::entities::CreateRepositoryOptions;
use crate::error::Result;

pub async fn run(
    org: &str,
    name: &str,
    template: &Option<String>,
    description: &Option<String>,
    private: bool,
    global: &Global,
) -> Result<()> {
    let (_, client) = load_client(global)?;

    let options = CreateRepositoryOptions {
        name: name.to_string(),
        description: description.clone(),
        private,
        template: template.clone(),
    };
    let repo = client.organization(org).create_repository(&options).await?;

    display::output(global.json, &repo, |r| {
        let source = match &options.template {
            Some(t) => format!(" from template {t}"),
            None => String::new(),
        };
        display::success(&format!("Created {}{source}", r.full_name));
        if let Some(url) = &r.html_url {
            println!("  {url}");
        }
    });

    Ok(())
}
