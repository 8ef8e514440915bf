use chrono::NaiveDate;
use log::info;
use mail_parser::MimeHeaders;

use crate::imap::error::ImapError;
use crate::imap::session::SessionHandle;
use crate::imap::types::{Attachment, Email};

pub const GMAIL_MAILBOX: &str = "INBOX";

/// Attachment content types eligible for extraction; everything else is
/// skipped and logged.
pub const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg"];

/// Mailbox operations the sync driver is written against.
///
/// `MailClient` is the production implementation; tests drive the sync loop
/// with a scripted in-memory one.
pub trait MailboxOps {
    /// Opens the named mailbox and returns the identifiers of all messages
    /// sent on or after `since` and strictly before `till`, in ascending
    /// order. The mailbox is opened read-only unless `for_delete` is set,
    /// since flag mutation later in the run requires write access.
    fn select(
        &mut self,
        mailbox: &str,
        since: NaiveDate,
        till: NaiveDate,
        for_delete: bool,
    ) -> Result<Vec<u32>, ImapError>;

    /// Retrieves and parses a single message, returning its envelope and the
    /// allow-listed attachments.
    fn fetch(&mut self, message_id: u32) -> Result<(Email, Vec<Attachment>), ImapError>;

    /// Labels a message as trashed and flags it deleted. No expunge.
    fn trash(&mut self, message_id: u32) -> Result<(), ImapError>;

    /// Best-effort teardown of the underlying session.
    fn close(self);
}

/// IMAP mailbox client acting on a live session handle.
pub struct MailClient {
    session: SessionHandle,
}

impl MailClient {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }
}

impl MailboxOps for MailClient {
    fn select(
        &mut self,
        mailbox: &str,
        since: NaiveDate,
        till: NaiveDate,
        for_delete: bool,
    ) -> Result<Vec<u32>, ImapError> {
        let session = self.session.session();
        let opened = if for_delete {
            session.select(mailbox)
        } else {
            session.examine(mailbox)
        };
        opened.map_err(|e| {
            ImapError::Selection(format!("could not open mailbox {}: {}", mailbox, e))
        })?;

        let criteria = search_criteria(since, till);
        let mut ids: Vec<u32> = session
            .search(&criteria)
            .map_err(|e| ImapError::Selection(format!("search {} failed: {}", criteria, e)))?
            .into_iter()
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch(&mut self, message_id: u32) -> Result<(Email, Vec<Attachment>), ImapError> {
        let fetches = self
            .session
            .session()
            .fetch(message_id.to_string(), "RFC822")
            .map_err(|e| {
                ImapError::Fetch(format!("could not read message {}: {}", message_id, e))
            })?;
        let fetched = fetches.iter().next().ok_or_else(|| {
            ImapError::Fetch(format!("no data returned for message {}", message_id))
        })?;
        let raw = fetched.body().ok_or_else(|| {
            ImapError::Fetch(format!("message {} came back without a body", message_id))
        })?;
        let parsed = mail_parser::Message::parse(raw).ok_or_else(|| {
            ImapError::Fetch(format!("message {} is not a well-formed MIME message", message_id))
        })?;

        let email = Email::from_mime(&parsed)?;
        let attachments = image_attachments(&parsed);
        Ok((email, attachments))
    }

    fn trash(&mut self, message_id: u32) -> Result<(), ImapError> {
        let session = self.session.session();
        session
            .store(message_id.to_string(), "+X-GM-LABELS (\\Trash)")
            .map_err(|e| {
                ImapError::Flag(format!("could not label message {} trashed: {}", message_id, e))
            })?;
        session
            .store(message_id.to_string(), "+FLAGS (\\Deleted)")
            .map_err(|e| {
                ImapError::Flag(format!("could not flag message {} deleted: {}", message_id, e))
            })?;
        Ok(())
    }

    fn close(self) {
        self.session.close();
    }
}

/// Server-side filter for "sent on or after `since` AND strictly before
/// `till`", in the date-token format IMAP SEARCH requires.
fn search_criteria(since: NaiveDate, till: NaiveDate) -> String {
    format!(
        "(SINCE \"{}\" BEFORE \"{}\")",
        since.format("%d-%b-%Y"),
        till.format("%d-%b-%Y")
    )
}

/// Extracts the allow-listed attachments of a parsed message. Parts outside
/// the allow-list are skipped and reported, which is not an error.
fn image_attachments(message: &mail_parser::Message) -> Vec<Attachment> {
    let mut attachments = Vec::new();
    for part in message.attachments() {
        let mime = part
            .content_type()
            .map(content_type_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let file_name = part.attachment_name().unwrap_or_default().to_string();
        if ACCEPTED_MIME_TYPES.contains(&mime.as_str()) {
            attachments.push(Attachment {
                mime,
                file_name,
                data: part.contents().to_vec(),
            });
        } else {
            info!("ignoring attachment {:?} of mime type {}", file_name, mime);
        }
    }
    attachments
}

fn content_type_string(ct: &mail_parser::ContentType) -> String {
    match ct.subtype() {
        Some(subtype) => format!("{}/{}", ct.ctype(), subtype).to_lowercase(),
        None => ct.ctype().to_lowercase(),
    }
}
