use crate::config::{read_secret, Workspace};
use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

#[derive(Args)]
pub struct PushCommand {}

impl PushCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let workspace = Workspace::open(cli)?;
        let secret = read_secret(cli)?;
        let client = workspace.client(secret).await?;

        info!(repository = %client.config().locator, "pushing {}", workspace.snapshot_root().display());

        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message("Encrypting snapshot...");
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        let result = client.push().await;
        pb.finish_and_clear();
        let snapshot = result?;

        println!("Pushed {} to {}", snapshot.summary(), client.config().locator);
        println!("Root: {}", snapshot.root_id());
        Ok(())
    }
}
