use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quorate")]
#[command(version = "0.1.0")]
#[command(about = "Autonomous governance voting agent", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml plus environment overlay)
    #[arg(short, long, default_value = "config")]
    pub config_dir: String,

    /// Execute runs without submitting votes or attestations
    #[arg(long, env = "QUORATE_DRY_RUN")]
    pub dry_run: bool,

    /// Override the persisted-state directory
    #[arg(long)]
    pub store_dir: Option<String>,

    /// Override the API listen port
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent daemon (API server plus orchestrator)
    Serve,
    /// Execute a single run against one collection and exit
    RunOnce {
        /// Collection (governance space) to run against
        #[arg(short, long)]
        collection: String,
    },
    /// Print the effective configuration and exit
    ShowConfig,
}
