use crate::config::{read_secret, Workspace};
use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

#[derive(Args)]
pub struct PullCommand {
    #[arg(long, help = "Unpack into this directory instead of .envi")]
    into: Option<PathBuf>,
}

impl PullCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let workspace = Workspace::open(cli)?;
        let secret = read_secret(cli)?;
        let client = workspace.client(secret).await?;
        let destination = self
            .into
            .clone()
            .unwrap_or_else(|| workspace.snapshot_root());

        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message("Decrypting snapshot...");
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        let result = client.pull(&destination).await;
        pb.finish_and_clear();
        let snapshot = result?;

        println!("Pulled {} into {}", snapshot.summary(), destination.display());
        for entry in snapshot.tree.entries() {
            println!("  {} {}", entry.mode(), entry.name());
        }
        Ok(())
    }
}
