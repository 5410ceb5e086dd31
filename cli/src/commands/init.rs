use crate::config::{ProjectConfig, CONFIG_FILE, SNAPSHOT_DIR};
use anyhow::{anyhow, Result};
use clap::Args;
use envi_sync::RepositoryLocator;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct InitCommand {
    #[arg(long, env = "ENVI_USER", help = "User name used as the caller identity")]
    user: String,

    #[arg(long, help = "Repository to sync with (OWNER/NAME)")]
    repository: Option<RepositoryLocator>,

    #[arg(long, help = "Overwrite an existing envi.toml")]
    force: bool,
}

impl InitCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let dir = std::env::current_dir()?;
        if dir.join(CONFIG_FILE).exists() && !self.force {
            return Err(anyhow!("{} already exists (use --force to overwrite)", CONFIG_FILE));
        }
        envi_sync::locator::validate_segment(&self.user, &self.user)?;

        let config = ProjectConfig {
            user: self.user.clone(),
            repository: self.repository.as_ref().map(ToString::to_string),
            store: cli.store.clone(),
        };
        config.save(&dir)?;

        let snapshot_root: PathBuf = dir.join(SNAPSHOT_DIR);
        tokio::fs::create_dir_all(&snapshot_root).await?;

        info!(user = %self.user, "initialized {}", dir.display());
        println!("Wrote {}", CONFIG_FILE);
        println!("Put environment files under {}/ and run `envi push`", SNAPSHOT_DIR);
        Ok(())
    }
}
