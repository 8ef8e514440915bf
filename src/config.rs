use std::fs;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use thiserror::Error;

use crate::imap::client::GMAIL_MAILBOX;
use crate::imap::session::{GMAIL_HOST, GMAIL_PORT};
use crate::sync::DEFAULT_RETRY_LIMIT;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("env var {0} is not set")]
    MissingCredential(&'static str),

    #[error("box parameter must not be empty")]
    EmptyMailbox,

    #[error("invalid date {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("since date {since} is after till date {till}")]
    InvalidWindow { since: NaiveDate, till: NaiveDate },

    #[error("{} does not exist or is not a directory", .0.display())]
    MissingDirectory(PathBuf),
}

#[derive(Debug, Parser)]
#[command(name = "mailgrab", about = "Download image attachments from a Gmail mailbox", version)]
pub struct Cli {
    /// Directory where attachments will be stored
    pub dir: PathBuf,

    /// Mailbox to download messages from
    #[arg(long = "box", default_value = GMAIL_MAILBOX)]
    pub mailbox: String,

    /// Upper bound for message selection (YYYY-MM-DD, exclusive); default: UTC today
    #[arg(long)]
    pub till: Option<String>,

    /// Lower bound for message selection (YYYY-MM-DD, inclusive); default: --till - 1 day
    #[arg(long)]
    pub since: Option<String>,

    /// How many days before --till of messages to retrieve; overrides --since
    #[arg(long)]
    pub days: Option<i64>,

    /// Also store message metadata as a JSON side file
    #[arg(long)]
    pub meta: bool,

    /// Move downloaded messages to the trash
    #[arg(long)]
    pub rm: bool,

    /// Log events to the given file instead of stderr
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// How many times a failed attempt is retried before giving up
    #[arg(long, default_value_t = DEFAULT_RETRY_LIMIT)]
    pub retries: u32,

    /// Account name, usually the Gmail address
    #[arg(long, env = "GMAIL_USER", hide_env_values = true)]
    pub user: Option<String>,

    /// App password for the account
    #[arg(long, env = "GMAIL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// IMAP endpoint host
    #[arg(long, env = "GMAIL_HOST", default_value = GMAIL_HOST)]
    pub host: String,

    /// IMAP endpoint port
    #[arg(long, env = "GMAIL_PORT", default_value_t = GMAIL_PORT)]
    pub port: u16,
}

/// Fully validated run parameters. All startup validation happens in
/// [`Settings::resolve`], before any network or mailbox work starts.
#[derive(Debug, Clone)]
pub struct Settings {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub mailbox: String,
    pub since: NaiveDate,
    pub till: NaiveDate,
    pub out_dir: PathBuf,
    pub remove: bool,
    pub save_metadata: bool,
    pub retry_limit: u32,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(cli: Cli) -> Result<Self, SettingsError> {
        let username = cli
            .user
            .filter(|u| !u.is_empty())
            .ok_or(SettingsError::MissingCredential("GMAIL_USER"))?;
        let password = cli
            .password
            .filter(|p| !p.is_empty())
            .ok_or(SettingsError::MissingCredential("GMAIL_PASSWORD"))?;
        if cli.mailbox.is_empty() {
            return Err(SettingsError::EmptyMailbox);
        }

        let till = match &cli.till {
            Some(raw) => parse_date(raw)?,
            None => Utc::now().date_naive(),
        };
        let since = match cli.days {
            Some(days) if days > 0 => till - Duration::days(days),
            _ => match &cli.since {
                Some(raw) => parse_date(raw)?,
                None => till - Duration::days(1),
            },
        };
        if since > till {
            return Err(SettingsError::InvalidWindow { since, till });
        }

        let out_dir =
            fs::canonicalize(&cli.dir).map_err(|_| SettingsError::MissingDirectory(cli.dir.clone()))?;
        if !out_dir.is_dir() {
            return Err(SettingsError::MissingDirectory(cli.dir));
        }

        Ok(Settings {
            username,
            password,
            host: cli.host,
            port: cli.port,
            mailbox: cli.mailbox,
            since,
            till,
            out_dir,
            remove: cli.rm,
            save_metadata: cli.meta,
            retry_limit: cli.retries,
            log_file: cli.log,
        })
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, SettingsError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| SettingsError::InvalidDate(raw.to_string()))
}
