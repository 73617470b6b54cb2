use anyhow::Result;
use tracing::{debug, info, warn};

use super::delivery::{broadcast, deliver_sequence};
use super::episode::Resolution;
use super::error::SequenceError;
use super::session::{PendingFile, PriorityChoice, SequenceMode, SessionManager};
use super::transport::{Button, ChatId, Keyboard, MessageId, Transport, UserId};
use crate::config::Config;
use crate::db::UsageStore;

const CB_HELP: &str = "help";
const CB_START: &str = "start";
const CB_CLOSE: &str = "close";
const CB_RESOLUTION_PREFIX: &str = "res:";
const CB_MODE_PREFIX: &str = "mode:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sender {
    pub(crate) id: UserId,
    pub(crate) first_name: String,
}

/// A user action, already decoded from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Command {
        chat: ChatId,
        sender: Sender,
        name: String,
        args: String,
    },
    File {
        chat: ChatId,
        message_id: MessageId,
        sender: Sender,
        filename: String,
    },
    Callback {
        callback_id: String,
        chat: ChatId,
        message_id: MessageId,
        reply_to: Option<MessageId>,
        sender: Sender,
        data: String,
    },
}

pub(crate) struct Dispatcher<'a> {
    sessions: &'a SessionManager,
    transport: &'a dyn Transport,
    store: &'a dyn UsageStore,
    config: &'a Config,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(
        sessions: &'a SessionManager,
        transport: &'a dyn Transport,
        store: &'a dyn UsageStore,
        config: &'a Config,
    ) -> Self {
        Self {
            sessions,
            transport,
            store,
            config,
        }
    }

    pub(crate) fn handle(&self, event: Event) -> Result<()> {
        match event {
            Event::Command {
                chat,
                sender,
                name,
                args,
            } => self.handle_command(chat, &sender, &name, &args),
            Event::File {
                chat,
                message_id,
                sender,
                filename,
            } => self.add_file(chat, message_id, &sender, filename),
            Event::Callback {
                callback_id,
                chat,
                message_id,
                reply_to,
                sender,
                data,
            } => {
                if let Err(err) = self.transport.answer_callback(&callback_id) {
                    warn!(error = %format!("{err:#}"), "failed to answer callback query");
                }
                self.handle_callback(chat, message_id, reply_to, &sender, &data)
            }
        }
    }

    fn handle_command(&self, chat: ChatId, sender: &Sender, name: &str, args: &str) -> Result<()> {
        match name {
            "start" => self.start(chat, sender),
            "help" => self.transport.send_text(
                chat,
                &self.personalize(&self.config.help_text, sender),
                Some(&help_keyboard()),
            ),
            "startsequence" => self.start_sequence(chat, sender),
            "endsequence" => self.end_sequence(chat, sender),
            "setresolution" => self.transport.send_text(
                chat,
                "Which resolution should come first?",
                Some(&resolution_keyboard()),
            ),
            "sequencemode" => {
                self.transport
                    .send_text(chat, "How should files be ordered?", Some(&mode_keyboard()))
            }
            "settings" => self.show_settings(chat, sender),
            "leaderboard" => self.leaderboard(chat),
            "users" if self.config.is_owner(sender.id) => self.users(chat),
            "broadcast" if self.config.is_owner(sender.id) => self.broadcast(chat, args),
            other => {
                debug!(user = sender.id, command = other, "ignoring command");
                Ok(())
            }
        }
    }

    fn start(&self, chat: ChatId, sender: &Sender) -> Result<()> {
        let text = self.personalize(&self.config.start_text, sender);
        let keyboard = self.start_keyboard();
        match self.config.start_photo.as_deref() {
            Some(photo) => self
                .transport
                .send_photo(chat, photo, &text, Some(&keyboard)),
            None => self.transport.send_text(chat, &text, Some(&keyboard)),
        }
    }

    fn start_sequence(&self, chat: ChatId, sender: &Sender) -> Result<()> {
        if self.sessions.open_session(sender.id) {
            info!(user = sender.id, "sequence started");
            self.transport
                .send_text(chat, "✅ Sequence mode started! Send your files now.", None)
        } else {
            self.transport.send_text(
                chat,
                "ℹ️ Sequence mode is already active. Keep sending files or use /endsequence.",
                None,
            )
        }
    }

    fn add_file(
        &self,
        chat: ChatId,
        message_id: MessageId,
        sender: &Sender,
        filename: String,
    ) -> Result<()> {
        match self
            .sessions
            .add_file(sender.id, PendingFile::new(filename, chat, message_id))
        {
            Ok(_) => self
                .transport
                .send_text(chat, "📂 Your file has been added to the sequence!", None),
            Err(SequenceError::NoActiveSession) => self.transport.send_text(
                chat,
                "❌ You need to start sequence mode first using /startsequence.",
                None,
            ),
            Err(err) => self.transport.send_text(chat, &format!("❌ {err}"), None),
        }
    }

    fn end_sequence(&self, chat: ChatId, sender: &Sender) -> Result<()> {
        let files = match self.sessions.close_session(sender.id) {
            Ok(files) => files,
            Err(SequenceError::EmptySequence) => {
                return self
                    .transport
                    .send_text(chat, "❌ No files in sequence!", None);
            }
            Err(err) => return self.transport.send_text(chat, &format!("❌ {err}"), None),
        };

        let report = deliver_sequence(self.transport, chat, &files, self.config.delivery_delay());
        for failure in &report.failures {
            warn!(
                user = sender.id,
                filename = %failure.file.filename,
                error = %failure.error,
                "file delivery failed"
            );
        }
        info!(
            user = sender.id,
            delivered = report.delivered,
            failed = report.failures.len(),
            "sequence delivered"
        );

        if report.delivered > 0
            && let Err(err) = self.store.increment_sequenced_count(
                sender.id,
                &sender.first_name,
                report.delivered as u64,
            )
        {
            warn!(user = sender.id, error = %format!("{err:#}"), "failed to record usage");
        }

        let summary = if report.failures.is_empty() {
            "✅ All files have been sequenced!".to_string()
        } else {
            let missing: Vec<&str> = report
                .failures
                .iter()
                .map(|failure| failure.file.filename.as_str())
                .collect();
            format!(
                "⚠️ Sent {} of {} files. Could not deliver: {}",
                report.delivered,
                report.attempted(),
                missing.join(", ")
            )
        };
        self.transport.send_text(chat, &summary, None)
    }

    fn show_settings(&self, chat: ChatId, sender: &Sender) -> Result<()> {
        let settings = self.sessions.settings(sender.id);
        let text = format!(
            "⚙️ Your sequence settings\n\nMode: {}\nResolution order: {}\nFiles waiting: {}",
            settings.mode.label(),
            settings.priority,
            settings.pending_files
        );
        self.transport.send_text(chat, &text, None)
    }

    fn leaderboard(&self, chat: ChatId) -> Result<()> {
        let top = self.store.top_users_by_count(self.config.leaderboard_limit)?;
        if top.is_empty() {
            return self.transport.send_text(chat, "No data available!", None);
        }
        let mut text = "🏆 Leaderboard 🏆\n\n".to_string();
        for (index, entry) in top.iter().enumerate() {
            text.push_str(&format!(
                "{}. {} - {} files\n",
                index + 1,
                entry.display_name,
                entry.files_sequenced
            ));
        }
        self.transport.send_text(chat, text.trim_end(), None)
    }

    fn users(&self, chat: ChatId) -> Result<()> {
        let count = self.store.total_user_count()?;
        self.transport
            .send_text(chat, &format!("📊 Total Users: {count}"), None)
    }

    fn broadcast(&self, chat: ChatId, text: &str) -> Result<()> {
        if text.is_empty() {
            return self
                .transport
                .send_text(chat, "Usage: /broadcast Your message here", None);
        }
        let recipients = self.store.all_user_ids()?;
        let report = broadcast(self.transport, &recipients, text);
        let mut summary = format!("✅ Broadcast sent to {} users.", report.sent);
        if !report.failed.is_empty() {
            summary.push_str(&format!(" {} failed.", report.failed.len()));
        }
        self.transport.send_text(chat, &summary, None)
    }

    fn handle_callback(
        &self,
        chat: ChatId,
        message_id: MessageId,
        reply_to: Option<MessageId>,
        sender: &Sender,
        data: &str,
    ) -> Result<()> {
        if let Some(raw) = data.strip_prefix(CB_RESOLUTION_PREFIX) {
            return self.apply_resolution_choice(chat, message_id, sender, raw);
        }
        if let Some(raw) = data.strip_prefix(CB_MODE_PREFIX) {
            return self.apply_mode_choice(chat, message_id, sender, raw);
        }

        match data {
            CB_HELP => self.edit_welcome(
                chat,
                message_id,
                &self.personalize(&self.config.help_text, sender),
                &help_keyboard(),
            ),
            CB_START => self.edit_welcome(
                chat,
                message_id,
                &self.personalize(&self.config.start_text, sender),
                &self.start_keyboard(),
            ),
            CB_CLOSE => {
                self.transport.delete_message(chat, message_id)?;
                if let Some(original) = reply_to
                    && let Err(err) = self.transport.delete_message(chat, original)
                {
                    debug!(error = %format!("{err:#}"), "could not delete replied-to message");
                }
                Ok(())
            }
            other => {
                debug!(user = sender.id, data = other, "ignoring callback");
                Ok(())
            }
        }
    }

    fn apply_resolution_choice(
        &self,
        chat: ChatId,
        message_id: MessageId,
        sender: &Sender,
        raw: &str,
    ) -> Result<()> {
        let choice = match raw.parse::<PriorityChoice>() {
            Ok(choice) => choice,
            Err(err) => {
                debug!(user = sender.id, error = %err, "rejected resolution choice");
                return self
                    .transport
                    .edit_text(chat, message_id, "❌ Unknown resolution choice.", None);
            }
        };
        self.sessions.set_resolution_priority(sender.id, choice);
        let settings = self.sessions.settings(sender.id);
        let headline = match choice {
            PriorityChoice::Default => "✅ Resolution priority reset to default.".to_string(),
            PriorityChoice::Promote(res) => format!("✅ {res} files will come first."),
        };
        let text = format!("{headline}\nResolution order: {}", settings.priority);
        self.transport.edit_text(chat, message_id, &text, None)
    }

    fn apply_mode_choice(
        &self,
        chat: ChatId,
        message_id: MessageId,
        sender: &Sender,
        raw: &str,
    ) -> Result<()> {
        let mode = match raw.parse::<SequenceMode>() {
            Ok(mode) => mode,
            Err(err) => {
                debug!(user = sender.id, error = %err, "rejected mode choice");
                return self
                    .transport
                    .edit_text(chat, message_id, "❌ Unknown sequence mode.", None);
            }
        };
        self.sessions.set_mode(sender.id, mode);
        let text = format!("✅ Sequence mode set to {}.", mode.label());
        self.transport.edit_text(chat, message_id, &text, None)
    }

    fn edit_welcome(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<()> {
        if self.config.start_photo.is_some() {
            self.transport
                .edit_caption(chat, message_id, text, Some(keyboard))
        } else {
            self.transport
                .edit_text(chat, message_id, text, Some(keyboard))
        }
    }

    fn start_keyboard(&self) -> Keyboard {
        let mut rows = vec![vec![
            Button::callback("Help", CB_HELP),
            Button::callback("Close", CB_CLOSE),
        ]];
        if let Some(url) = self.config.owner_url.as_deref() {
            rows.push(vec![Button::url("OWNER", url)]);
        }
        rows
    }

    fn personalize(&self, template: &str, sender: &Sender) -> String {
        template.replace("{first}", &sender.first_name)
    }
}

fn help_keyboard() -> Keyboard {
    vec![vec![
        Button::callback("Back", CB_START),
        Button::callback("Close", CB_CLOSE),
    ]]
}

pub(crate) fn resolution_keyboard() -> Keyboard {
    let buttons: Vec<Button> = Resolution::KNOWN
        .into_iter()
        .map(|res| Button::callback(res.as_str(), format!("{CB_RESOLUTION_PREFIX}{res}")))
        .collect();
    let mut rows: Keyboard = buttons.chunks(3).map(<[Button]>::to_vec).collect();
    rows.push(vec![Button::callback(
        "Default",
        format!("{CB_RESOLUTION_PREFIX}default"),
    )]);
    rows
}

pub(crate) fn mode_keyboard() -> Keyboard {
    [SequenceMode::EpisodeFirst, SequenceMode::ResolutionFirst]
        .into_iter()
        .map(|mode| {
            vec![Button::callback(
                mode.label(),
                format!("{CB_MODE_PREFIX}{}", mode.as_str()),
            )]
        })
        .collect()
}
