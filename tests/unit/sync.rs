use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::NaiveDate;
use mailgrab::imap::client::MailboxOps;
use mailgrab::imap::error::ImapError;
use mailgrab::store::ImageStore;
use mailgrab::sync::{SyncDriver, SyncError, SyncOptions};
use mailgrab::{Attachment, Email};
use tempfile::TempDir;

use crate::common;

/// Shared call record and fault script for the fake mailbox.
#[derive(Default)]
struct Script {
    ids: Vec<u32>,
    fail_all_selects: bool,
    fail_fetch_once: Option<u32>,
    connects: usize,
    selects: usize,
    fetches: Vec<u32>,
    trashed: Vec<u32>,
}

struct FakeMailbox {
    script: Rc<RefCell<Script>>,
}

impl MailboxOps for FakeMailbox {
    fn select(
        &mut self,
        _mailbox: &str,
        _since: NaiveDate,
        _till: NaiveDate,
        _for_delete: bool,
    ) -> Result<Vec<u32>, ImapError> {
        let mut script = self.script.borrow_mut();
        script.selects += 1;
        if script.fail_all_selects {
            return Err(ImapError::Selection("induced failure".to_string()));
        }
        Ok(script.ids.clone())
    }

    fn fetch(&mut self, message_id: u32) -> Result<(Email, Vec<Attachment>), ImapError> {
        let mut script = self.script.borrow_mut();
        if script.fail_fetch_once == Some(message_id) {
            script.fail_fetch_once = None;
            return Err(ImapError::Fetch("induced failure".to_string()));
        }
        script.fetches.push(message_id);
        Ok((
            common::email(&format!("msg{:03}", message_id)),
            vec![common::jpeg_attachment(&format!("img_{:03}.jpg", message_id))],
        ))
    }

    fn trash(&mut self, message_id: u32) -> Result<(), ImapError> {
        self.script.borrow_mut().trashed.push(message_id);
        Ok(())
    }

    fn close(self) {}
}

fn options(remove: bool, retry_limit: u32) -> SyncOptions {
    SyncOptions {
        mailbox: "INBOX".to_string(),
        since: NaiveDate::from_ymd_opt(2019, 2, 21).unwrap(),
        till: NaiveDate::from_ymd_opt(2019, 2, 22).unwrap(),
        remove,
        save_metadata: false,
        retry_limit,
    }
}

fn script_with_ids(ids: Vec<u32>) -> Rc<RefCell<Script>> {
    Rc::new(RefCell::new(Script {
        ids,
        ..Script::default()
    }))
}

fn connect(script: &Rc<RefCell<Script>>) -> impl FnMut() -> Result<FakeMailbox, ImapError> {
    let script = script.clone();
    move || {
        script.borrow_mut().connects += 1;
        Ok(FakeMailbox {
            script: script.clone(),
        })
    }
}

fn attachment_count(dir: &TempDir) -> usize {
    fs::read_dir(dir.path()).unwrap().count()
}

#[test]
fn a_clean_run_processes_every_message_once() {
    let dir = TempDir::new().unwrap();
    let script = script_with_ids((1..=15).collect());
    let mut driver = SyncDriver::new(
        connect(&script),
        ImageStore::new(dir.path()),
        options(false, 3),
        Arc::new(AtomicBool::new(false)),
    );

    let outcome = driver.run().unwrap();

    assert_eq!(outcome.downloaded, 15);
    assert_eq!(outcome.retries, 0);
    assert_eq!(script.borrow().connects, 1);
    assert_eq!(script.borrow().selects, 1);
    assert!(script.borrow().trashed.is_empty());
    assert_eq!(attachment_count(&dir), 15);
}

#[test]
fn retry_limit_bounds_the_selection_attempts() {
    let dir = TempDir::new().unwrap();
    let script = script_with_ids(vec![1, 2, 3]);
    script.borrow_mut().fail_all_selects = true;
    let mut driver = SyncDriver::new(
        connect(&script),
        ImageStore::new(dir.path()),
        options(false, 3),
        Arc::new(AtomicBool::new(false)),
    );

    let err = driver.run().unwrap_err();

    match err {
        SyncError::RetriesExhausted {
            retries,
            limit,
            downloaded,
            ..
        } => {
            assert_eq!(retries, 4);
            assert_eq!(limit, 3);
            assert_eq!(downloaded, 0);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // exactly retry_limit + 1 selection attempts, each on a fresh session
    assert_eq!(script.borrow().selects, 4);
    assert_eq!(script.borrow().connects, 4);
    assert_eq!(attachment_count(&dir), 0);
}

#[test]
fn a_fetch_failure_restarts_the_whole_selection() {
    let dir = TempDir::new().unwrap();
    let script = script_with_ids((1..=10).collect());
    script.borrow_mut().fail_fetch_once = Some(5);
    let mut driver = SyncDriver::new(
        connect(&script),
        ImageStore::new(dir.path()),
        options(false, 5),
        Arc::new(AtomicBool::new(false)),
    );

    let outcome = driver.run().unwrap();

    assert_eq!(outcome.retries, 1);
    // messages 1-4 counted in the aborted pass and again in the clean one
    assert_eq!(outcome.downloaded, 14);
    {
        let script = script.borrow();
        assert_eq!(script.connects, 2);
        assert_eq!(script.selects, 2);
        assert_eq!(script.fetches[..4], [1, 2, 3, 4]);
        assert_eq!(script.fetches[4..], (1..=10).collect::<Vec<u32>>()[..]);
    }
    // the rerun found the first pass's files and wrote nothing twice
    assert_eq!(attachment_count(&dir), 10);
}

#[test]
fn trashing_follows_each_stored_message() {
    let dir = TempDir::new().unwrap();
    let script = script_with_ids(vec![1, 2, 3]);
    let mut driver = SyncDriver::new(
        connect(&script),
        ImageStore::new(dir.path()),
        options(true, 3),
        Arc::new(AtomicBool::new(false)),
    );

    let outcome = driver.run().unwrap();

    assert_eq!(outcome.downloaded, 3);
    assert_eq!(script.borrow().trashed, vec![1, 2, 3]);
}

#[test]
fn an_interrupt_bypasses_the_retry_loop() {
    let dir = TempDir::new().unwrap();
    let script = script_with_ids(vec![1, 2, 3]);
    let interrupt = Arc::new(AtomicBool::new(true));
    let mut driver = SyncDriver::new(
        connect(&script),
        ImageStore::new(dir.path()),
        options(false, 3),
        interrupt,
    );

    let err = driver.run().unwrap_err();

    assert!(matches!(err, SyncError::Interrupted { downloaded: 0 }));
    assert_eq!(script.borrow().connects, 0);
    assert_eq!(script.borrow().selects, 0);
}
