use std::net::TcpStream;

use log::{debug, info};
use native_tls::{TlsConnector, TlsStream};

use crate::imap::error::ImapError;

pub const GMAIL_HOST: &str = "imap.gmail.com";
pub const GMAIL_PORT: u16 = 993;

/// The concrete session type produced by `imap::connect` + `login`.
pub type TlsImapSession = imap::Session<TlsStream<TcpStream>>;

/// Connection parameters for a single IMAP account.
///
/// Holds no live network state; `open` produces a fresh, logged-in
/// [`SessionHandle`] each time it is called, so a broken session can be
/// discarded and replaced without mutating anything in place.
#[derive(Clone)]
pub struct ImapSession {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl ImapSession {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Connects over TLS and logs in, returning a live session handle.
    pub fn open(&self) -> Result<SessionHandle, ImapError> {
        debug!("connecting to {}:{}", self.host, self.port);
        let tls = TlsConnector::builder().build()?;
        let client = imap::connect((self.host.as_str(), self.port), self.host.as_str(), &tls)?;
        let session = client
            .login(&self.username, &self.password)
            .map_err(|(e, _)| {
                ImapError::Auth(format!("could not log in as {}: {}", self.username, e))
            })?;
        info!("logged in as {}", self.username);
        Ok(SessionHandle { session })
    }
}

/// A live, authenticated IMAP session.
pub struct SessionHandle {
    session: TlsImapSession,
}

impl SessionHandle {
    pub(crate) fn session(&mut self) -> &mut TlsImapSession {
        &mut self.session
    }

    /// Best-effort logout. Never fails; a session that is already broken
    /// simply has nothing left to clean up.
    pub fn close(mut self) {
        if let Err(e) = self.session.logout() {
            debug!("logout failed during close: {}", e);
        }
    }
}
