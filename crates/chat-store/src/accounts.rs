//! The account set.
//!
//! One username per log line, in creation order.  Creation appends;
//! removal rewrites the file without the matching line.  Iteration order is
//! insertion order, which is what account listing exposes to clients.

use crate::StoreError;
use regex::Regex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub struct AccountList {
    path: PathBuf,
    accounts: Vec<String>,
}

impl AccountList {
    /// Open the store, rebuilding the in-memory set from the log.
    pub fn open(path: impl Into<PathBuf>) -> Result<AccountList, StoreError> {
        let path = path.into();
        let mut accounts = Vec::new();
        if path.exists() {
            let file = File::open(&path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                let username = line.trim();
                if !username.is_empty() {
                    accounts.push(username.to_owned());
                }
            }
        }
        Ok(AccountList { path, accounts })
    }

    /// Append a new account to the log and the set.
    pub fn create(&mut self, username: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{username}")?;
        file.flush()?;
        self.accounts.push(username.to_owned());
        Ok(())
    }

    /// Remove an account, rewriting the log without its line.
    pub fn remove(&mut self, username: &str) -> Result<(), StoreError> {
        rewrite_without(&self.path, username)?;
        self.accounts.retain(|existing| existing != username);
        Ok(())
    }

    pub fn contains(&self, username: &str) -> bool {
        self.accounts.iter().any(|existing| existing == username)
    }

    /// All accounts whose name the pattern matches from the first character,
    /// in insertion order.
    pub fn search(&self, pattern: &Regex) -> Vec<String> {
        self.accounts
            .iter()
            .filter(|account| {
                pattern
                    .find(account)
                    .is_some_and(|found| found.start() == 0)
            })
            .cloned()
            .collect()
    }

    pub fn usernames(&self) -> &[String] {
        &self.accounts
    }

    /// Drop every account and truncate the log.  Test hook.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        File::create(&self.path)?;
        self.accounts.clear();
        Ok(())
    }
}

/// Rewrite a log keeping only lines whose first token differs from `key`.
pub(crate) fn rewrite_without(path: &Path, key: &str) -> Result<(), StoreError> {
    let lines: Vec<String> = if path.exists() {
        let file = File::open(path)?;
        BufReader::new(file).lines().collect::<Result<_, _>>()?
    } else {
        Vec::new()
    };
    let mut file = File::create(path)?;
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.split_whitespace().next() != Some(key) {
            writeln!(file, "{trimmed}")?;
        }
    }
    file.flush()?;
    Ok(())
}
