mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    init::InitCommand, pull::PullCommand, push::PushCommand, repo::RepoCommand,
    status::StatusCommand,
};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "envi",
    about = "Encrypted sync for environment files",
    long_about = "Envi snapshots the .envi directory of a project, encrypts it with a shared repository secret and keeps one current copy per repository in a store"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "ENVI_STORE", help = "Store directory")]
    pub store: Option<PathBuf>,

    #[arg(long, global = true, env = "ENVI_SECRET", help = "Repository secret")]
    pub secret: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Set up envi in the current directory")]
    Init(InitCommand),

    #[command(about = "Manage repositories")]
    Repo(RepoCommand),

    #[command(about = "Encrypt and upload the .envi directory")]
    Push(PushCommand),

    #[command(about = "Download and decrypt the current snapshot")]
    Pull(PullCommand),

    #[command(about = "Show the local snapshot")]
    Status(StatusCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    debug!("starting envi");

    match cli.command {
        Commands::Init(ref cmd) => cmd.run(&cli).await,
        Commands::Repo(ref cmd) => cmd.run(&cli).await,
        Commands::Push(ref cmd) => cmd.run(&cli).await,
        Commands::Pull(ref cmd) => cmd.run(&cli).await,
        Commands::Status(ref cmd) => cmd.run(&cli).await,
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "envi={level},envi_core={level},envi_backends={level},envi_sync={level}"
        )))
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default subscriber failed");
}
