use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "seqbot",
    version,
    about = "Telegram bot that re-sends batches of episode files in order"
)]
pub struct Cli {
    /// Config file (defaults to $SEQBOT_CONFIG, then the platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll Telegram for updates and serve users (default)
    Run,
    Leaderboard {
        #[arg(long)]
        limit: Option<usize>,
    },
    Users,
    Broadcast {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Preview the order a batch of filenames would be sent in
    Order {
        #[arg(long, default_value = "episode")]
        mode: String,
        /// Resolution to put first, or "default"
        #[arg(long)]
        prefer: Option<String>,
        #[arg(required = true)]
        filenames: Vec<String>,
    },
}
