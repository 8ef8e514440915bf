use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImapError {
    #[error("authentication error: {0}")]
    Auth(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("selection error: {0}")]
    Selection(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("flag error: {0}")]
    Flag(String),
}

impl From<imap::Error> for ImapError {
    fn from(err: imap::Error) -> Self {
        match err {
            imap::Error::Io(e) => ImapError::Connection(e.to_string()),
            imap::Error::No(msg) => ImapError::Connection(msg),
            imap::Error::Bad(msg) => ImapError::Connection(msg),
            imap::Error::Parse(e) => ImapError::Fetch(e.to_string()),
            other => ImapError::Connection(other.to_string()),
        }
    }
}

impl From<native_tls::Error> for ImapError {
    fn from(err: native_tls::Error) -> Self {
        ImapError::Tls(err.to_string())
    }
}

impl From<std::io::Error> for ImapError {
    fn from(err: std::io::Error) -> Self {
        ImapError::Connection(err.to_string())
    }
}
