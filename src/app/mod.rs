mod delivery;
mod dispatch;
mod episode;
mod error;
mod session;
mod telegram;
pub(crate) mod transport;


use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::db::{Database, UsageStore};

use self::delivery::broadcast;
use self::dispatch::Dispatcher;
use self::episode::{FilenameFeatures, format_updated_at_display, truncate};
use self::session::{
    PendingFile, PriorityChoice, ResolutionPriority, SequenceMode, SessionManager, sequence_files,
};
use self::telegram::TelegramClient;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

pub fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Command::Run) | None => run_bot(&config)?,
        Some(Command::Leaderboard { limit }) => run_leaderboard(&config, limit)?,
        Some(Command::Users) => run_users(&config)?,
        Some(Command::Broadcast { text }) => run_broadcast(&config, &text.join(" "))?,
        Some(Command::Order {
            mode,
            prefer,
            filenames,
        }) => run_order(&mode, prefer.as_deref(), filenames)?,
    }

    Ok(())
}

fn run_bot(config: &Config) -> Result<()> {
    let token = config.require_token()?;
    let db = open_db(config)?;
    let client = TelegramClient::new(token);
    let sessions = SessionManager::new();
    let dispatcher = Dispatcher::new(&sessions, &client, &db, config);

    info!("polling Telegram for updates");
    let mut offset = None;
    loop {
        let updates = match client.get_updates(offset, config.poll_timeout_secs) {
            Ok(updates) => updates,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "getUpdates failed");
                thread::sleep(POLL_ERROR_BACKOFF);
                continue;
            }
        };

        for update in updates {
            offset = Some(update.id + 1);
            let Some(event) = update.event else {
                continue;
            };
            if let Err(err) = dispatcher.handle(event) {
                warn!(update = update.id, error = %format!("{err:#}"), "update handling failed");
            }
        }
    }
}

fn run_leaderboard(config: &Config, limit: Option<usize>) -> Result<()> {
    let db = open_db(config)?;
    let items = db.top_users_by_count(limit.unwrap_or(config.leaderboard_limit))?;
    if items.is_empty() {
        println!("No sequenced files recorded yet.");
        return Ok(());
    }

    println!(
        "{:<5} {:<14} {:<30} {:<8} {:<28}",
        "RANK", "USER ID", "NAME", "FILES", "LAST ACTIVE"
    );
    for (idx, item) in items.iter().enumerate() {
        println!(
            "{:<5} {:<14} {:<30} {:<8} {:<28}",
            idx + 1,
            item.user_id,
            truncate(&item.display_name, 30),
            item.files_sequenced,
            format_updated_at_display(&item.updated_at)
        );
    }
    Ok(())
}

fn run_users(config: &Config) -> Result<()> {
    let db = open_db(config)?;
    println!("Total users: {}", db.total_user_count()?);
    Ok(())
}

fn run_broadcast(config: &Config, text: &str) -> Result<()> {
    let token = config.require_token()?;
    let db = open_db(config)?;
    let client = TelegramClient::new(token);
    let recipients = db.all_user_ids()?;

    let report = broadcast(&client, &recipients, text);
    println!("Broadcast sent to {} of {} users.", report.sent, recipients.len());
    for (user, err) in &report.failed {
        println!("  {user}: {err}");
    }
    Ok(())
}

fn run_order(mode: &str, prefer: Option<&str>, filenames: Vec<String>) -> Result<()> {
    let mode = mode.parse::<SequenceMode>().map_err(|err| anyhow!(err))?;
    let mut priority = ResolutionPriority::default();
    if let Some(raw) = prefer {
        priority.apply(raw.parse::<PriorityChoice>().map_err(|err| anyhow!(err))?);
    }

    let files = filenames
        .into_iter()
        .zip(1..)
        .map(|(name, arrival)| PendingFile::new(name, 0, arrival))
        .collect();
    let ordered = sequence_files(files, mode, &priority);

    println!("Mode: {}    Resolution order: {priority}", mode.label());
    println!(
        "{:<4} {:<8} {:<10} {:<8} {:<50}",
        "POS", "ARRIVED", "EPISODE", "RES", "FILENAME"
    );
    for (pos, file) in ordered.iter().enumerate() {
        let features = FilenameFeatures::from_filename(&file.filename);
        println!(
            "{:<4} {:<8} {:<10} {:<8} {:<50}",
            pos + 1,
            file.source_message_id,
            features.episode.to_string(),
            features.resolution.as_str(),
            truncate(&file.filename, 50)
        );
    }
    Ok(())
}

fn open_db(config: &Config) -> Result<Database> {
    let db_path = config.database_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    Ok(db)
}
