use clap::{Parser, Subcommand};
use orgportal::commands::{self, add_app::AddAppArgs, Global};
use orgportal::display;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "orgportal",
    version,
    about = "Work with GitHub organizations through purpose-specific GitHub Apps"
)]
pub struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Show verbose output (API cost, rate limits, debug logs)
    #[arg(long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(long, global = true, env = "ORGPORTAL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a GitHub App in the config file
    AddApp {
        /// Numeric app id
        #[arg(long)]
        app_id: u64,
        /// App slug as shown in its URL
        #[arg(long)]
        slug: String,
        /// PEM private key downloaded from the app settings
        #[arg(long)]
        private_key_file: PathBuf,
        /// Purpose this app backs (repeatable)
        #[arg(long = "purpose")]
        purposes: Vec<String>,
        /// Friendly name
        #[arg(long)]
        name: Option<String>,
        /// API base URL for GitHub Enterprise Server
        #[arg(long)]
        base_url: Option<String>,
        /// Secret used to sign webhook deliveries
        #[arg(long)]
        webhook_secret: Option<String>,
    },
    /// List configured GitHub Apps and the purposes they serve
    Apps,
    /// List the installations of configured apps
    Installations {
        /// Only this app
        #[arg(long)]
        app: Option<u64>,
    },
    /// List configured organizations
    Orgs,
    /// Mint (or reuse) an installation token for an organization
    Token {
        /// Organization login
        #[arg(long)]
        org: String,
        /// Purpose to authenticate as
        #[arg(long)]
        purpose: Option<String>,
        /// Use this installation instead of discovering one
        #[arg(long)]
        installation: Option<u64>,
    },
    /// List repositories across organizations
    Repos {
        /// Filter to a specific organization
        #[arg(long)]
        org: Option<String>,
        /// Purpose to read as
        #[arg(long)]
        purpose: Option<String>,
        /// Sort by: activity, stars, staleness, name
        #[arg(long, default_value = "activity")]
        sort: String,
    },
    /// List teams across organizations
    Teams {
        /// Filter to a specific organization
        #[arg(long)]
        org: Option<String>,
        /// Purpose to read as
        #[arg(long)]
        purpose: Option<String>,
    },
    /// List organization or team members
    Members {
        /// Organization login
        #[arg(long)]
        org: String,
        /// Team slug
        #[arg(long)]
        team: Option<String>,
        /// Role filter: all, admin, member (not with --team)
        #[arg(long, default_value = "all")]
        role: String,
        /// Purpose to read as
        #[arg(long)]
        purpose: Option<String>,
    },
    /// Approve a request to join a team
    Approve {
        /// Organization login
        #[arg(long)]
        org: String,
        /// Team slug
        #[arg(long)]
        team: String,
        /// User login
        #[arg(long)]
        user: String,
        /// Team role: member, maintainer
        #[arg(long, default_value = "member")]
        role: String,
    },
    /// Create a repository, optionally from a template
    CreateRepo {
        /// Organization login
        #[arg(long)]
        org: String,
        /// Repository name
        #[arg(long)]
        name: String,
        /// Template repository as owner/name
        #[arg(long)]
        template: Option<String>,
        /// Repository description
        #[arg(long)]
        description: Option<String>,
        /// Create a private repository
        #[arg(long)]
        private: bool,
    },
    /// Check the configuration and required purposes
    Validate {
        /// Purpose that must have an app (repeatable)
        #[arg(long = "require")]
        require: Vec<String>,
    },
    /// Verify a saved webhook delivery
    Webhook {
        /// App the delivery was sent to
        #[arg(long)]
        app: u64,
        /// X-Hub-Signature-256 header value
        #[arg(long)]
        signature: String,
        /// File holding the raw delivery body
        #[arg(long)]
        payload: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "orgportal=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let global = Global {
        json: cli.json,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Commands::AddApp {
            app_id,
            slug,
            private_key_file,
            purposes,
            name,
            base_url,
            webhook_secret,
        } => commands::add_app::run(
            AddAppArgs {
                app_id,
                slug,
                name,
                private_key_file,
                purposes,
                base_url,
                webhook_secret,
            },
            &global,
        ),
        Commands::Apps => commands::apps::run(&global).await,
        Commands::Installations { app } => commands::installations::run(app, &global).await,
        Commands::Orgs => commands::orgs::run(&global).await,
        Commands::Token {
            org,
            purpose,
            installation,
        } => commands::token::run(&org, &purpose, installation, &global).await,
        Commands::Repos { org, purpose, sort } => {
            commands::repos::run(&org, &purpose, &sort, &global).await
        }
        Commands::Teams { org, purpose } => commands::teams::run(&org, &purpose, &global).await,
        Commands::Members {
            org,
            team,
            role,
            purpose,
        } => commands::members::run(&org, &team, &role, &purpose, &global).await,
        Commands::Approve {
            org,
            team,
            user,
            role,
        } => commands::approve::run(&org, &team, &user, &role, &global).await,
        Commands::CreateRepo {
            org,
            name,
            template,
            description,
            private,
        } => {
            commands::create_repo::run(&org, &name, &template, &description, private, &global)
                .await
        }
        Commands::Validate { require } => commands::validate::run(&require, &global).await,
        Commands::Webhook {
            app,
            signature,
            payload,
        } => commands::webhook::run(app, &signature, &payload, &global).await,
    };

    if let Err(e) = result {
        display::error(&e.to_string());
        std::process::exit(1);
    }
}
