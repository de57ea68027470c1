//! Hand-off of exported reports to an external mail transport.
//!
//! Transport and credentials live outside this crate; a `ReportMailer`
//! only has to say whether delivery succeeded.

use std::path::Path;
use std::sync::OnceLock;
use regex::Regex;
use crate::error::DispatchError;

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$";

/// Something that can deliver a file to a recipient.
pub trait ReportMailer {
    /// Returns `true` when the transport accepted the message.
    fn send(&self, recipient: &str, attachment: &Path) -> bool;
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

/// Checks for a conventional `local@domain.tld` address.
pub fn validate_email(address: &str) -> bool {
    email_regex().is_some_and(|regex| regex.is_match(address.trim()))
}

/// Validates the request and delegates to the mailer.
pub fn send_report<M: ReportMailer + ?Sized>(
    mailer: &M,
    recipient: &str,
    attachment: &Path,
) -> Result<(), DispatchError> {
    let recipient = recipient.trim();
    if !validate_email(recipient) {
        return Err(DispatchError::InvalidRecipient(recipient.to_string()));
    }

    if !attachment.is_file() {
        return Err(DispatchError::MissingAttachment(attachment.to_path_buf()));
    }

    if mailer.send(recipient, attachment) {
        tracing::info!(recipient, attachment = %attachment.display(), "report sent");
        Ok(())
    } else {
        tracing::warn!(recipient, "mail transport rejected report");
        Err(DispatchError::Transport)
    }
}
