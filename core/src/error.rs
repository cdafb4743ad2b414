use std::error::Error;
use std::fmt::{Display, Formatter};

/// Outcome classification of one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[default]
    None,
    BadPassphrase,
    MissingPassphrase,
    NoData,
    KeyNotFound,
    DuplicateKey,
    DeletePrivateKey,
    BadSignature,
    FilePermissions,
    Unknown,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ErrorCode::*;

        match self {
            None => write!(f, "no error"),
            BadPassphrase => write!(f, "bad passphrase"),
            MissingPassphrase => write!(f, "missing passphrase"),
            NoData => write!(f, "no data"),
            KeyNotFound => write!(f, "key not found"),
            DuplicateKey => write!(f, "duplicate key"),
            DeletePrivateKey => write!(f, "private key must be deleted first"),
            BadSignature => write!(f, "bad signature"),
            FilePermissions => write!(f, "file permissions"),
            Unknown => write!(f, "unknown error"),
        }
    }
}

/// Failures of a completed operation, raised after the subprocess finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgpErr {
    KeyNotFound { message: String, key_id: Option<String> },
    BadPassphrase { message: String, bad: Vec<String>, missing: Vec<String> },
    NoData(String),
    DeletePrivateKey { message: String, key_id: String },
    FilePermissions { message: String, filename: Option<String> },
    General { message: String, code: ErrorCode },
}

impl PgpErr {
    pub fn code(&self) -> ErrorCode {
        use PgpErr::*;

        match self {
            KeyNotFound { .. } => ErrorCode::KeyNotFound,
            BadPassphrase { missing, bad, .. } if bad.is_empty() && !missing.is_empty() => {
                ErrorCode::MissingPassphrase
            }
            BadPassphrase { .. } => ErrorCode::BadPassphrase,
            NoData(_) => ErrorCode::NoData,
            DeletePrivateKey { .. } => ErrorCode::DeletePrivateKey,
            FilePermissions { .. } => ErrorCode::FilePermissions,
            General { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        use PgpErr::*;

        match self {
            KeyNotFound { message, .. }
            | BadPassphrase { message, .. }
            | NoData(message)
            | DeletePrivateKey { message, .. }
            | FilePermissions { message, .. }
            | General { message, .. } => message,
        }
    }

    pub(crate) fn general<S: Into<String>>(message: S, code: ErrorCode) -> Self {
        PgpErr::General { message: message.into(), code }
    }
}

impl Display for PgpErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl Error for PgpErr {}
