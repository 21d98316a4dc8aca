//! Live login sessions.
//!
//! Maps username to client uuid, one direction stored, both directions
//! queried.  The log (`username uuid` per line) only describes sessions of
//! the current process lifetime, so it is truncated at open; after a
//! failover the promoted primary rebuilds associations from its client
//! table, never from this file.

use crate::StoreError;
use crate::accounts::rewrite_without;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct LoggedInAccounts {
    path: PathBuf,
    logged_in: HashMap<String, String>,
}

impl LoggedInAccounts {
    /// Open the store with an empty session table, truncating the log.
    pub fn open(path: impl Into<PathBuf>) -> Result<LoggedInAccounts, StoreError> {
        let path = path.into();
        File::create(&path)?;
        Ok(LoggedInAccounts { path, logged_in: HashMap::new() })
    }

    /// Bind a username to a client uuid.
    pub fn login(&mut self, username: &str, uuid: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{username} {uuid}")?;
        file.flush()?;
        self.logged_in.insert(username.to_owned(), uuid.to_owned());
        Ok(())
    }

    /// Unbind a username.  Returns whether it was bound.
    pub fn logoff(&mut self, username: &str) -> Result<bool, StoreError> {
        if !self.logged_in.contains_key(username) {
            return Ok(false);
        }
        rewrite_without(&self.path, username)?;
        self.logged_in.remove(username);
        Ok(true)
    }

    pub fn is_logged_in_by_uuid(&self, uuid: &str) -> bool {
        self.logged_in.values().any(|bound| bound == uuid)
    }

    pub fn is_logged_in_by_username(&self, username: &str) -> bool {
        self.logged_in.contains_key(username)
    }

    pub fn username_of(&self, uuid: &str) -> Option<&str> {
        self.logged_in
            .iter()
            .find(|(_, bound)| *bound == uuid)
            .map(|(username, _)| username.as_str())
    }

    pub fn uuid_of(&self, username: &str) -> Option<&str> {
        self.logged_in.get(username).map(String::as_str)
    }
}
