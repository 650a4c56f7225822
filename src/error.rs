use std::io;
use std::path::PathBuf;

use thiserror::Error;

// One variant per failure category so callers can branch on the kind
// instead of string-matching messages. Every variant is fatal to the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not locate snippet starting with heading: {0}")]
    HeadingNotFound(String),

    #[error("no sections found in {0}")]
    NoSections(PathBuf),

    #[error("unsupported encryption mode {0:?}: only implicit TLS (\"ssl\") is supported")]
    UnsupportedEncryption(String),

    #[error("unable to connect to SMTP server: {0}")]
    Connect(String),

    #[error("no response from SMTP server")]
    NoReply,

    #[error("SMTP connection lost: {0}")]
    ConnectionLost(String),

    #[error("unexpected SMTP response: {0}")]
    UnexpectedReply(String),
}

pub type Result<T> = std::result::Result<T, Error>;
