use std::thread;
use std::time::Duration;

use tracing::warn;

use super::session::PendingFile;
use super::transport::{ChatId, Transport, UserId};

#[derive(Debug, Clone)]
pub(crate) struct DeliveryFailure {
    pub(crate) file: PendingFile,
    pub(crate) error: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DeliveryReport {
    pub(crate) delivered: usize,
    pub(crate) failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    pub(crate) fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

/// Delivers files one at a time in the given order, pausing `delay` between sends.
/// A failed file is recorded and the rest are still attempted.
pub(crate) fn deliver_sequence(
    transport: &dyn Transport,
    destination: ChatId,
    files: &[PendingFile],
    delay: Duration,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for (idx, file) in files.iter().enumerate() {
        if idx > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }
        match transport.copy_file(destination, file.source_chat_id, file.source_message_id) {
            Ok(()) => report.delivered += 1,
            Err(err) => report.failures.push(DeliveryFailure {
                file: file.clone(),
                error: format!("{err:#}"),
            }),
        }
    }
    report
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BroadcastReport {
    pub(crate) sent: usize,
    pub(crate) failed: Vec<(UserId, String)>,
}

/// Sends `text` to every recipient; one failure never stops the rest.
pub(crate) fn broadcast(
    transport: &dyn Transport,
    recipients: &[UserId],
    text: &str,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for user in recipients.iter().copied() {
        match transport.send_text(user, text, None) {
            Ok(()) => report.sent += 1,
            Err(err) => {
                warn!(user, error = %err, "broadcast delivery failed");
                report.failed.push((user, format!("{err:#}")));
            }
        }
    }
    report
}
