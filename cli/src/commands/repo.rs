use crate::config::{open_server, resolve_store, ProjectConfig};
use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use envi_sync::RepositoryLocator;

#[derive(Args)]
pub struct RepoCommand {
    #[command(subcommand)]
    action: RepoAction,
}

#[derive(Subcommand)]
enum RepoAction {
    #[command(about = "Create a repository owned by the configured user")]
    Create {
        #[arg(help = "Repository name")]
        name: String,

        #[arg(long, help = "Make it the repository of this project")]
        select: bool,
    },

    #[command(about = "List repositories you own or contribute to")]
    List,

    #[command(about = "Give another user push and pull access")]
    Share {
        #[arg(help = "User to add")]
        user: String,

        #[arg(long, help = "Repository (defaults to the project's)")]
        repository: Option<RepositoryLocator>,
    },

    #[command(about = "Remove a user's access")]
    Revoke {
        #[arg(help = "User to remove")]
        user: String,

        #[arg(long, help = "Repository (defaults to the project's)")]
        repository: Option<RepositoryLocator>,
    },
}

impl RepoCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let dir = std::env::current_dir()?;
        let mut config = ProjectConfig::load(&dir)?;
        let store = resolve_store(cli.store.as_deref(), config.store.as_deref())?;
        let server = open_server(&store).await?;

        match &self.action {
            RepoAction::Create { name, select } => {
                let (record, secret) = server.create_repository(&config.user, name).await?;
                println!("Created {}", record.locator);
                println!("Secret: {}", secret.expose());
                println!("Store the secret safely. It cannot be shown again.");

                if *select || config.repository.is_none() {
                    config.repository = Some(record.locator.to_string());
                    config.save(&dir)?;
                    println!("Selected {} for this project", record.locator);
                }
            }
            RepoAction::List => {
                let summaries = server.list_repositories(&config.user).await?;
                if summaries.is_empty() {
                    println!("No repositories found");
                    return Ok(());
                }
                println!(
                    "{:<32} {:<8} {:>10} {:<20} {}",
                    "Repository", "Role", "Size", "Last push", "Contributors"
                );
                println!("{:-<100}", "");
                for summary in summaries {
                    let record = &summary.record;
                    let role = if record.is_owner(&config.user) { "owner" } else { "member" };
                    let (size, pushed) = match &summary.archive {
                        Some(info) => (
                            info.size.to_string(),
                            info.modified.format("%Y-%m-%d %H:%M:%S").to_string(),
                        ),
                        None => ("-".to_string(), "never".to_string()),
                    };
                    let contributors: Vec<&str> =
                        record.contributors.iter().map(String::as_str).collect();
                    println!(
                        "{:<32} {:<8} {:>10} {:<20} {}",
                        record.locator.to_string(),
                        role,
                        size,
                        pushed,
                        contributors.join(", ")
                    );
                }
            }
            RepoAction::Share { user, repository } => {
                let locator = target(repository, &config)?;
                let record = server.share(&config.user, &locator, user).await?;
                println!("{} can now push and pull {}", user, record.locator);
            }
            RepoAction::Revoke { user, repository } => {
                let locator = target(repository, &config)?;
                let record = server.revoke(&config.user, &locator, user).await?;
                println!("Removed {} from {}", user, record.locator);
            }
        }
        Ok(())
    }
}

fn target(explicit: &Option<RepositoryLocator>, config: &ProjectConfig) -> Result<RepositoryLocator> {
    match explicit {
        Some(locator) => Ok(locator.clone()),
        None => config
            .locator()
            .map_err(|_| anyhow!("No repository given and none configured")),
    }
}
