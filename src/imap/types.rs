use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::imap::error::ImapError;

/// Date format used when the envelope is serialized into a JSON side file.
/// UTC wall-clock time, no offset marker.
pub const SIDECAR_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Envelope data of a single fetched message.
#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub message_id: String,
    #[serde(serialize_with = "serialize_utc_date")]
    pub date_sent: DateTime<Utc>,
    pub sender_name: String,
    pub sender_mail: String,
    pub recipient_mail: String,
    pub subject: String,
}

/// A single decoded attachment of a message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

impl Email {
    /// Builds the envelope from a parsed MIME message.
    ///
    /// A missing or unparsable `Date` header is an error here rather than a
    /// stored-with-null-date state; the sent time drives both the on-disk
    /// naming and the EXIF capture-time patch.
    pub fn from_mime(message: &mail_parser::Message) -> Result<Self, ImapError> {
        let date = message
            .date()
            .ok_or_else(|| ImapError::Fetch("message has no parsable Date header".to_string()))?;
        let date_sent = DateTime::from_timestamp(date.to_timestamp(), 0)
            .ok_or_else(|| ImapError::Fetch("message date is out of range".to_string()))?;

        let sender = first_address(message.from())
            .ok_or_else(|| ImapError::Fetch("message has no From address".to_string()))?;
        let sender_name = display_name(sender.name.as_deref().unwrap_or_default());
        let sender_mail = sender.address.as_deref().unwrap_or_default().to_string();
        let recipient_mail = first_address(message.to())
            .and_then(|addr| addr.address.as_deref())
            .unwrap_or_default()
            .to_string();

        Ok(Email {
            message_id: normalize_message_id(message.message_id().unwrap_or_default()),
            date_sent,
            sender_name,
            sender_mail,
            recipient_mail,
            subject: message.subject().unwrap_or_default().to_string(),
        })
    }
}

/// Strips the angle brackets from a `Message-ID` header value and truncates
/// it at the `@` separator, leaving the left-hand identifier.
pub fn normalize_message_id(raw: &str) -> String {
    let bare = raw.trim().trim_start_matches('<').trim_end_matches('>');
    bare.split('@').next().unwrap_or(bare).to_string()
}

/// Strips surrounding quotes and whitespace from a display name.
pub fn display_name(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}

fn first_address<'a, 'x>(
    value: &'a mail_parser::HeaderValue<'x>,
) -> Option<&'a mail_parser::Addr<'x>> {
    match value {
        mail_parser::HeaderValue::Address(addr) => Some(addr),
        mail_parser::HeaderValue::AddressList(list) => list.first(),
        _ => None,
    }
}

fn serialize_utc_date<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&date.format(SIDECAR_DATE_FORMAT).to_string())
}
