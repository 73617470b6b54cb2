use thiserror::Error;

/// Recoverable conditions reported back to the requesting user. None of them
/// change session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum SequenceError {
    #[error("no active sequence session; start one first")]
    NoActiveSession,

    #[error("no files in sequence")]
    EmptySequence,
}
