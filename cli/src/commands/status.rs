use crate::config::{ProjectConfig, SNAPSHOT_DIR};
use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct StatusCommand {
    #[arg(long, help = "Print content identifiers for every file")]
    ids: bool,
}

impl StatusCommand {
    pub async fn run(&self, _cli: &crate::Cli) -> Result<()> {
        let dir = std::env::current_dir()?;
        let config = ProjectConfig::load(&dir)?;
        let root = dir.join(SNAPSHOT_DIR);

        let snapshot = tokio::task::spawn_blocking(move || envi_core::snapshot::capture(&root)).await??;

        println!("User:       {}", config.user);
        println!(
            "Repository: {}",
            config.repository.as_deref().unwrap_or("(none)")
        );
        println!("Snapshot:   {}", snapshot.summary());
        println!("Root:       {}", snapshot.root_id());

        if snapshot.file_count == 0 {
            println!("\nNo files under {}/", SNAPSHOT_DIR);
            return Ok(());
        }

        println!();
        for entry in snapshot.tree.entries() {
            if self.ids {
                println!("{}", entry);
            } else {
                println!("{:>8}  {} {}", entry.size(), entry.mode(), entry.name());
            }
        }
        Ok(())
    }
}
