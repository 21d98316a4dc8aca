//! Per-recipient undelivered message queues.
//!
//! Log lines are `recipient sender message`; the message runs to the end of
//! the line and may contain spaces.  Queues are FIFO and recipients keep
//! their first-insertion order, so the delivery pump drains messages in the
//! order the primary accepted them.

use crate::StoreError;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// A queued `(sender, message)` pair.
pub type QueuedMessage = (String, String);

pub struct UndeliveredMessages {
    path: PathBuf,
    // recipient -> FIFO queue, in first-insertion order of recipients
    queues: Vec<(String, Vec<QueuedMessage>)>,
}

impl UndeliveredMessages {
    /// Open the store, rebuilding queues from the log.
    pub fn open(path: impl Into<PathBuf>) -> Result<UndeliveredMessages, StoreError> {
        let path = path.into();
        let mut store = UndeliveredMessages { path: path.clone(), queues: Vec::new() };
        if path.exists() {
            let file = File::open(&path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let mut parts = trimmed.splitn(3, ' ');
                let (Some(recipient), Some(sender), Some(message)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(StoreError::MalformedLine(trimmed.to_owned()));
                };
                store
                    .queue_mut(recipient)
                    .push((sender.to_owned(), message.to_owned()));
            }
        }
        Ok(store)
    }

    fn queue_mut(&mut self, recipient: &str) -> &mut Vec<QueuedMessage> {
        if let Some(index) = self.queues.iter().position(|(name, _)| name == recipient) {
            &mut self.queues[index].1
        } else {
            self.queues.push((recipient.to_owned(), Vec::new()));
            &mut self.queues.last_mut().unwrap().1
        }
    }

    /// Append one message for a recipient.
    pub fn add(&mut self, recipient: &str, sender: &str, message: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{recipient} {sender} {message}")?;
        file.flush()?;
        self.queue_mut(recipient).push((sender.to_owned(), message.to_owned()));
        Ok(())
    }

    /// Every recipient with its queue, in first-insertion order.  Recipients
    /// whose queue has fully drained still appear (with an empty queue).
    pub fn get_all(&self) -> impl Iterator<Item = (&str, &[QueuedMessage])> {
        self.queues
            .iter()
            .map(|(recipient, queue)| (recipient.as_str(), queue.as_slice()))
    }

    /// Pending messages for one recipient.
    pub fn messages_for(&self, recipient: &str) -> &[QueuedMessage] {
        self.queues
            .iter()
            .find(|(name, _)| name == recipient)
            .map_or(&[], |(_, queue)| queue.as_slice())
    }

    /// Replace a recipient's whole queue, rewriting the log to match.
    pub fn replace(
        &mut self,
        recipient: &str,
        messages: Vec<QueuedMessage>,
    ) -> Result<(), StoreError> {
        let lines: Vec<String> = if self.path.exists() {
            let file = File::open(&self.path)?;
            BufReader::new(file).lines().collect::<Result<_, _>>()?
        } else {
            Vec::new()
        };
        let mut file = File::create(&self.path)?;
        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.split(' ').next() != Some(recipient) {
                writeln!(file, "{trimmed}")?;
            }
        }
        for (sender, message) in &messages {
            writeln!(file, "{recipient} {sender} {message}")?;
        }
        file.flush()?;
        *self.queue_mut(recipient) = messages;
        Ok(())
    }

    /// Drop every queue and truncate the log.  Test hook.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        File::create(&self.path)?;
        self.queues.clear();
        Ok(())
    }
}
