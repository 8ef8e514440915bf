//! The sync driver: one end-to-end run over a date window of messages.
//!
//! Each attempt opens (or reuses) a session, selects the candidate message
//! ids and walks them in order, fetching, storing and optionally trashing.
//! Any failure aborts the remaining iteration, tears the session down and
//! restarts the whole selection after a fixed delay, bounded by the retry
//! limit. A transient session fault is assumed to invalidate the whole
//! in-flight selection, so the driver never skips past a bad item.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use log::{info, warn};
use thiserror::Error;

use crate::imap::client::MailboxOps;
use crate::imap::error::ImapError;
use crate::store::{ImageStore, StoreError};

/// Messages per progress report during iteration.
pub const CHUNK_SIZE: usize = 10;

/// Fixed pause between a failed attempt and the next selection.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_RETRY_LIMIT: u32 = 5;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mailbox: String,
    pub since: NaiveDate,
    pub till: NaiveDate,
    /// Move each downloaded message to the trash.
    pub remove: bool,
    /// Write a JSON envelope side file per message.
    pub save_metadata: bool,
    pub retry_limit: u32,
}

/// Counters of a finished run. `downloaded` accumulates across retries;
/// messages reprocessed after a retry count again, while the idempotent
/// store keeps their files untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOutcome {
    pub downloaded: u64,
    pub retries: u32,
}

/// A failure of a single selection-and-iteration attempt.
#[derive(Debug, Error)]
pub enum SyncAttemptError {
    #[error(transparent)]
    Imap(#[from] ImapError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "retries reached limit ({retries} / {limit}) after {downloaded} downloaded messages and {elapsed_secs:.3}s: {source}"
    )]
    RetriesExhausted {
        retries: u32,
        limit: u32,
        downloaded: u64,
        elapsed_secs: f64,
        source: SyncAttemptError,
    },

    #[error("interrupted after {downloaded} downloaded messages")]
    Interrupted { downloaded: u64 },
}

enum Attempt {
    Completed,
    Interrupted,
}

/// Drives one run. Owns the retry state and the session lifecycle: clients
/// are never repaired in place, a failed attempt drops the client and asks
/// the factory for a fresh one.
pub struct SyncDriver<F> {
    connect: F,
    store: ImageStore,
    options: SyncOptions,
    interrupt: Arc<AtomicBool>,
}

impl<C, F> SyncDriver<F>
where
    C: MailboxOps,
    F: FnMut() -> Result<C, ImapError>,
{
    pub fn new(
        connect: F,
        store: ImageStore,
        options: SyncOptions,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        Self {
            connect,
            store,
            options,
            interrupt,
        }
    }

    pub fn run(&mut self) -> Result<SyncOutcome, SyncError> {
        let started = Instant::now();
        let mut outcome = SyncOutcome::default();
        let mut client: Option<C> = None;

        loop {
            if self.is_interrupted() {
                warn!("stopping before the next attempt due to interrupt");
                return Err(SyncError::Interrupted {
                    downloaded: outcome.downloaded,
                });
            }
            match self.attempt(&mut client, &mut outcome.downloaded) {
                Ok(Attempt::Completed) => {
                    if let Some(c) = client.take() {
                        c.close();
                    }
                    info!(
                        "completed sync of {} messages in {:.3}s ({} retries)",
                        outcome.downloaded,
                        started.elapsed().as_secs_f64(),
                        outcome.retries
                    );
                    return Ok(outcome);
                }
                Ok(Attempt::Interrupted) => {
                    warn!("stopping due to interrupt");
                    if let Some(c) = client.take() {
                        c.close();
                    }
                    return Err(SyncError::Interrupted {
                        downloaded: outcome.downloaded,
                    });
                }
                Err(err) => {
                    if let Some(c) = client.take() {
                        c.close();
                    }
                    outcome.retries += 1;
                    if outcome.retries > self.options.retry_limit {
                        return Err(SyncError::RetriesExhausted {
                            retries: outcome.retries,
                            limit: self.options.retry_limit,
                            downloaded: outcome.downloaded,
                            elapsed_secs: started.elapsed().as_secs_f64(),
                            source: err,
                        });
                    }
                    warn!(
                        "error: {}, retrying for {} / {} time in {:?}...",
                        err, outcome.retries, self.options.retry_limit, RETRY_DELAY
                    );
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    /// One selection-and-iteration pass. Reconnects first when the previous
    /// attempt tore the client down.
    fn attempt(
        &mut self,
        client: &mut Option<C>,
        downloaded: &mut u64,
    ) -> Result<Attempt, SyncAttemptError> {
        if client.is_none() {
            *client = Some((self.connect)()?);
        }
        let mailbox = client.as_mut().expect("session was just established");

        let ids = mailbox.select(
            &self.options.mailbox,
            self.options.since,
            self.options.till,
            self.options.remove,
        )?;
        info!(
            "retrieving {} messages from {} for period {} - {}",
            ids.len(),
            self.options.mailbox,
            self.options.since,
            self.options.till
        );

        let mut chunk_started = Instant::now();
        for (i, id) in ids.iter().enumerate() {
            if self.is_interrupted() {
                return Ok(Attempt::Interrupted);
            }
            let (email, attachments) = mailbox.fetch(*id)?;
            self.store.save_attachments(&email, &attachments)?;
            if self.options.save_metadata {
                self.store.save_metadata(&email)?;
            }
            if self.options.remove {
                mailbox.trash(*id)?;
            }
            *downloaded += 1;

            let done = i + 1;
            if done % CHUNK_SIZE == 0 {
                info!(
                    "fetched messages {} - {} / {} in {:.3}s...",
                    done - CHUNK_SIZE + 1,
                    done,
                    ids.len(),
                    chunk_started.elapsed().as_secs_f64()
                );
                chunk_started = Instant::now();
            }
        }
        Ok(Attempt::Completed)
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}
