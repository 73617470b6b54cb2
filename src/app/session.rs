use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::episode::{EpisodeNumber, FilenameFeatures, Resolution};
use super::error::SequenceError;
use super::transport::{ChatId, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingFile {
    pub(crate) filename: String,
    pub(crate) source_chat_id: ChatId,
    pub(crate) source_message_id: MessageId,
}

impl PendingFile {
    pub(crate) fn new(
        filename: impl Into<String>,
        source_chat_id: ChatId,
        source_message_id: MessageId,
    ) -> Self {
        Self {
            filename: filename.into(),
            source_chat_id,
            source_message_id,
        }
    }
}

/// Rank per known resolution, indexed like [`Resolution::KNOWN`]. Lower ranks sort
/// first; `Unknown` always ranks last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolutionPriority {
    ranks: [u32; 5],
}

impl Default for ResolutionPriority {
    fn default() -> Self {
        Self {
            ranks: [1, 2, 3, 4, 5],
        }
    }
}

impl ResolutionPriority {
    pub(crate) fn rank(&self, resolution: Resolution) -> u32 {
        resolution
            .known_index()
            .map_or(u32::MAX, |idx| self.ranks[idx])
    }

    /// Moves `resolution` to rank 0 and renumbers the others 1..=4 in their
    /// previous relative order. Returns false for `Unknown`, which cannot be promoted.
    pub(crate) fn promote(&mut self, resolution: Resolution) -> bool {
        let Some(promoted_idx) = resolution.known_index() else {
            return false;
        };

        let mut others: Vec<usize> = (0..self.ranks.len())
            .filter(|idx| *idx != promoted_idx)
            .collect();
        others.sort_by_key(|idx| self.ranks[*idx]);

        self.ranks[promoted_idx] = 0;
        for (rank, idx) in (1..).zip(others) {
            self.ranks[idx] = rank;
        }
        true
    }

    pub(crate) fn apply(&mut self, choice: PriorityChoice) {
        match choice {
            PriorityChoice::Default => *self = Self::default(),
            PriorityChoice::Promote(resolution) => {
                self.promote(resolution);
            }
        }
    }

    /// Known resolutions from first to last.
    pub(crate) fn ordered(&self) -> Vec<(Resolution, u32)> {
        let mut out: Vec<(Resolution, u32)> = Resolution::KNOWN
            .into_iter()
            .map(|res| (res, self.rank(res)))
            .collect();
        out.sort_by_key(|(_, rank)| *rank);
        out
    }
}

impl fmt::Display for ResolutionPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self
            .ordered()
            .into_iter()
            .map(|(res, _)| res.as_str())
            .collect();
        write!(f, "{}", labels.join(" > "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PriorityChoice {
    Promote(Resolution),
    Default,
}

impl FromStr for PriorityChoice {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().eq_ignore_ascii_case("default") {
            return Ok(Self::Default);
        }
        match raw.parse::<Resolution>()? {
            Resolution::Unknown => Err("'unknown' cannot be prioritized".to_string()),
            res => Ok(Self::Promote(res)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum SequenceMode {
    #[default]
    EpisodeFirst,
    ResolutionFirst,
}

impl SequenceMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::EpisodeFirst => "episode",
            Self::ResolutionFirst => "resolution",
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::EpisodeFirst => "Episode first",
            Self::ResolutionFirst => "Resolution first",
        }
    }
}

impl FromStr for SequenceMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "episode" | "episodefirst" => Ok(Self::EpisodeFirst),
            "resolution" | "resolutionfirst" => Ok(Self::ResolutionFirst),
            _ => Err(format!("unrecognized sequence mode '{raw}'")),
        }
    }
}

// Within one batch every key has the same variant, so the derived Ord only ever
// compares fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    EpisodeFirst(EpisodeNumber, u32),
    ResolutionFirst(u32, EpisodeNumber),
}

fn sort_key(filename: &str, mode: SequenceMode, priority: &ResolutionPriority) -> SortKey {
    let features = FilenameFeatures::from_filename(filename);
    let rank = priority.rank(features.resolution);
    match mode {
        SequenceMode::EpisodeFirst => SortKey::EpisodeFirst(features.episode, rank),
        SequenceMode::ResolutionFirst => SortKey::ResolutionFirst(rank, features.episode),
    }
}

/// Stable ordering: files with equal keys keep their arrival order.
pub(crate) fn sequence_files(
    files: Vec<PendingFile>,
    mode: SequenceMode,
    priority: &ResolutionPriority,
) -> Vec<PendingFile> {
    let mut keyed: Vec<(SortKey, PendingFile)> = files
        .into_iter()
        .map(|file| (sort_key(&file.filename, mode, priority), file))
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, file)| file).collect()
}

#[derive(Debug, Clone, Default)]
struct Session {
    files: Vec<PendingFile>,
    priority: ResolutionPriority,
    mode: SequenceMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionSettings {
    pub(crate) mode: SequenceMode,
    pub(crate) priority: ResolutionPriority,
    pub(crate) pending_files: usize,
}

type Slot = Arc<Mutex<Option<Session>>>;

/// Per-user sequencing sessions. The outer map lock is only held to look up or
/// insert a user's slot; each user's session has its own lock so unrelated users
/// never wait on each other.
#[derive(Default)]
pub(crate) struct SessionManager {
    sessions: Mutex<HashMap<UserId, Slot>>,
}

impl SessionManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns true when a new session was created; an existing one is left untouched.
    pub(crate) fn open_session(&self, user: UserId) -> bool {
        let slot = self.slot_or_insert(user);
        let mut guard = lock(&slot);
        if guard.is_some() {
            return false;
        }
        *guard = Some(Session::default());
        debug!(user, "sequence session opened");
        true
    }

    /// Appends a file and returns how many files the session now holds.
    pub(crate) fn add_file(&self, user: UserId, file: PendingFile) -> Result<usize, SequenceError> {
        let slot = self.slot(user).ok_or(SequenceError::NoActiveSession)?;
        let mut guard = lock(&slot);
        let session = guard.as_mut().ok_or(SequenceError::NoActiveSession)?;
        debug!(user, filename = %file.filename, "file added to sequence");
        session.files.push(file);
        Ok(session.files.len())
    }

    pub(crate) fn set_resolution_priority(&self, user: UserId, choice: PriorityChoice) {
        self.with_session_or_default(user, |session| session.priority.apply(choice));
        debug!(user, ?choice, "resolution priority updated");
    }

    pub(crate) fn set_mode(&self, user: UserId, mode: SequenceMode) {
        self.with_session_or_default(user, |session| session.mode = mode);
        debug!(user, mode = mode.as_str(), "sequence mode updated");
    }

    pub(crate) fn settings(&self, user: UserId) -> SessionSettings {
        self.with_session_or_default(user, |session| SessionSettings {
            mode: session.mode,
            priority: session.priority.clone(),
            pending_files: session.files.len(),
        })
    }

    /// Consumes the session and returns its files in final order. An absent or
    /// empty session is left exactly as it was.
    pub(crate) fn close_session(&self, user: UserId) -> Result<Vec<PendingFile>, SequenceError> {
        let session = {
            let mut sessions = lock(&self.sessions);
            let slot = sessions
                .get(&user)
                .cloned()
                .ok_or(SequenceError::EmptySequence)?;
            let mut guard = lock(&slot);
            match guard.as_ref() {
                Some(session) if !session.files.is_empty() => {}
                _ => return Err(SequenceError::EmptySequence),
            }
            let session = guard.take().ok_or(SequenceError::EmptySequence)?;
            drop(guard);
            sessions.remove(&user);
            session
        };

        debug!(
            user,
            files = session.files.len(),
            mode = session.mode.as_str(),
            "sequence session closed"
        );
        Ok(sequence_files(session.files, session.mode, &session.priority))
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self, user: UserId) -> bool {
        let Some(slot) = self.slot(user) else {
            return false;
        };
        let open = lock(&slot).is_some();
        open
    }

    fn slot(&self, user: UserId) -> Option<Slot> {
        lock(&self.sessions).get(&user).cloned()
    }

    fn slot_or_insert(&self, user: UserId) -> Slot {
        let mut sessions = lock(&self.sessions);
        Arc::clone(sessions.entry(user).or_default())
    }

    fn with_session_or_default<R>(&self, user: UserId, f: impl FnOnce(&mut Session) -> R) -> R {
        let slot = self.slot_or_insert(user);
        let mut guard = lock(&slot);
        f(guard.get_or_insert_with(Session::default))
    }
}

// Session state is plain data, so a panic in another holder leaves nothing half-updated
// that matters here.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
