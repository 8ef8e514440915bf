//! Library core for mailgrab.
//!
//! Downloads image attachments from a Gmail mailbox over IMAP: selects a
//! date window of messages, fetches and parses each one, stores the image
//! attachments under deterministic names, optionally patches EXIF capture
//! times and optionally moves processed messages to the trash. Transient
//! session failures are handled by tearing the session down and retrying
//! the whole selection, bounded by a retry limit.

pub mod config;
pub mod imap;
pub mod store;
pub mod sync;

// Re-export key types for convenience
pub use crate::imap::types::{Attachment, Email};
