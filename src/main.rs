use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use log::{error, info, warn};

use mailgrab::config::{Cli, Settings};
use mailgrab::imap::client::MailClient;
use mailgrab::imap::session::ImapSession;
use mailgrab::store::ImageStore;
use mailgrab::sync::{SyncDriver, SyncError, SyncOptions};

fn main() {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = match Settings::resolve(cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_logger(settings.log_file.as_deref());

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupt.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            warn!("could not install interrupt handler: {}", e);
        }
    }

    let session = ImapSession::new(
        &settings.host,
        settings.port,
        &settings.username,
        &settings.password,
    );
    let store = ImageStore::new(&settings.out_dir);
    let options = SyncOptions {
        mailbox: settings.mailbox.clone(),
        since: settings.since,
        till: settings.till,
        remove: settings.remove,
        save_metadata: settings.save_metadata,
        retry_limit: settings.retry_limit,
    };

    let started = Instant::now();
    let mut driver = SyncDriver::new(
        || session.open().map(MailClient::new),
        store,
        options,
        interrupt.clone(),
    );

    match driver.run() {
        Ok(outcome) => {
            let took = started.elapsed().as_secs_f64();
            let per_message = if outcome.downloaded > 0 {
                took / outcome.downloaded as f64
            } else {
                0.0
            };
            info!(
                "stored {} messages from period {} - {} under {} in {:.3}s ({:.3}s/message)",
                outcome.downloaded,
                settings.since,
                settings.till,
                settings.out_dir.display(),
                took,
                per_message
            );
        }
        Err(SyncError::Interrupted { downloaded }) => {
            warn!("stopping due to interrupt after {} downloaded messages", downloaded);
            std::process::exit(130);
        }
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    }
}

fn init_logger(log_file: Option<&Path>) {
    let env = env_logger::Env::new().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(path) = log_file {
        match File::create(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!(
                    "can not create log file {}: {}; will use stderr",
                    path.display(),
                    e
                );
            }
        }
    }
    builder.init();
}
