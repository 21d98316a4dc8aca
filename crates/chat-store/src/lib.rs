// chat-store: File-backed state for a single chat replica.
//
// Each store pairs an in-memory structure with a plain-text log file.  The
// in-memory side is rebuilt by scanning the log at open; every mutation
// writes the log first and updates memory only once the write succeeded, so
// a failed mutation leaves memory untouched and the caller reports an error
// instead of replicating.
//
// Log files are per-replica (the server id is baked into the file name by
// the caller); nothing here is shared across processes.

pub mod accounts;
pub mod logins;
pub mod undelivered;

pub use accounts::AccountList;
pub use logins::LoggedInAccounts;
pub use undelivered::UndeliveredMessages;

use thiserror::Error;

/// Errors from store persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed log line: {0:?}")]
    MalformedLine(String),
}
