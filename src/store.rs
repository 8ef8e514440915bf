//! Attachment store: idempotent on-disk persistence plus the EXIF
//! capture-time patch.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use log::debug;
use thiserror::Error;

use crate::imap::types::{Attachment, Email};

/// Format of the capture-time value embedded into image files.
pub const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image metadata error in {path}: {reason}")]
    MetadataFormat { path: PathBuf, reason: String },
}

/// Writes attachments and envelope side files into a single destination
/// directory. The directory is validated at startup by the config layer and
/// is assumed to have no concurrent writers; the existence check before each
/// write is the sole deduplication mechanism.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persists each attachment under its deterministic name, skipping files
    /// that already exist, then runs the capture-time patch. The patch runs
    /// for pre-existing files too, so images downloaded before patching was
    /// enabled are fixed up on a later pass.
    pub fn save_attachments(
        &self,
        email: &Email,
        attachments: &[Attachment],
    ) -> Result<(), StoreError> {
        let prefix = file_prefix(email);
        for (index, attachment) in attachments.iter().enumerate() {
            let name = format!("{}_{}", prefix, attachment_file_name(attachment, index));
            let path = self.dir.join(name);
            if path.exists() {
                debug!("{} already present, skipping write", path.display());
            } else {
                fs::write(&path, &attachment.data)?;
                debug!("wrote {} ({} bytes)", path.display(), attachment.data.len());
            }
            patch_capture_time(&path, &email.date_sent)?;
        }
        Ok(())
    }

    /// Writes the message envelope as a JSON side file next to the
    /// attachments; skipped when the file already exists.
    pub fn save_metadata(&self, email: &Email) -> Result<(), StoreError> {
        let path = self.dir.join(format!("{}.json", file_prefix(email)));
        if path.exists() {
            debug!("{} already present, skipping write", path.display());
            return Ok(());
        }
        let json = serde_json::to_vec(email).map_err(std::io::Error::from)?;
        fs::write(&path, json)?;
        Ok(())
    }
}

/// Deterministic, collision-resistant name prefix for everything stored on
/// behalf of one message: sent date, sent time with filesystem-safe dashes,
/// sender display name and message id.
pub fn file_prefix(email: &Email) -> String {
    format!(
        "{}_{}_{}_{}",
        email.date_sent.format("%Y-%m-%d"),
        email.date_sent.format("%H-%M-%S"),
        sanitize_component(&email.sender_name),
        sanitize_component(&email.message_id)
    )
}

/// Declared attachment names come straight from the message and may be empty
/// or contain path separators; they are never used without this cleanup.
fn attachment_file_name(attachment: &Attachment, index: usize) -> String {
    if attachment.file_name.is_empty() {
        format!("attachment-{}.jpg", index + 1)
    } else {
        sanitize_component(&attachment.file_name)
    }
}

fn sanitize_component(component: &str) -> String {
    component.replace(['/', '\\', ':', '\0'], "-")
}

/// Embeds the message's sent time as the image capture time, unless the file
/// already carries one.
///
/// Existing `DateTimeOriginal`/`CreateDate` tags are authoritative and are
/// never overwritten; in that case this is a logged no-op. Returns whether
/// the file was modified. This is the only place already-stored bytes are
/// mutated.
pub fn patch_capture_time(path: &Path, taken: &DateTime<Utc>) -> Result<bool, StoreError> {
    let mut metadata = Metadata::new_from_path(path).unwrap_or_else(|_| Metadata::new());

    let has_capture_time = metadata
        .get_tag(&ExifTag::DateTimeOriginal(String::new()))
        .next()
        .is_some()
        || metadata
            .get_tag(&ExifTag::CreateDate(String::new()))
            .next()
            .is_some();
    if has_capture_time {
        debug!("{} already carries a capture time, leaving as-is", path.display());
        return Ok(false);
    }

    let stamp = taken.format(EXIF_DATE_FORMAT).to_string();
    metadata.set_tag(ExifTag::DateTimeOriginal(stamp.clone()));
    metadata.set_tag(ExifTag::CreateDate(stamp));
    metadata
        .write_to_file(path)
        .map_err(|e| StoreError::MetadataFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    debug!("patched capture time into {}", path.display());
    Ok(true)
}
