//! The undelivered-message pump.
//!
//! Primary-only background task.  Every ~10 ms it walks the per-recipient
//! queues; messages for logged-in recipients go out as RECV_MESSAGE frames
//! on the recipient's connection.  Whatever failed to send becomes the
//! recipient's new queue, which is replicated to the backups and swapped in
//! locally, so a drained queue disappears from every replica's log.

use crate::replication;
use crate::state::ServerState;
use chat_wire::{Frame, Payload, RECORD_SEPARATOR};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

pub const PUMP_INTERVAL: Duration = Duration::from_millis(10);

pub async fn pump_loop(state: Arc<ServerState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            () = sleep(PUMP_INTERVAL) => {}
        }
        deliver_pending(&state).await;
    }
}

/// One pump cycle over every recipient queue.
pub async fn deliver_pending(state: &Arc<ServerState>) {
    let clients = state.clients.lock().await;
    let logged_in = state.logged_in.lock().await;
    let mut undelivered = state.undelivered.lock().await;

    let recipients: Vec<String> = undelivered
        .get_all()
        .map(|(recipient, _)| recipient.to_owned())
        .collect();

    for recipient in recipients {
        if !logged_in.is_logged_in_by_username(&recipient) {
            continue;
        }
        let Some(uuid) = logged_in.uuid_of(&recipient) else {
            continue;
        };
        let Some(writer) = clients
            .values()
            .find(|session| session.uuid == uuid)
            .map(|session| session.writer.clone())
        else {
            continue;
        };

        let queue = undelivered.messages_for(&recipient).to_vec();
        let mut remaining = Vec::new();
        for (sender, message) in queue {
            // a fresh id is consumed whether or not the send lands
            let frame = Frame::new(
                state.next_msg_id(),
                Payload::RecvMessage { sender: sender.clone(), message: message.clone() },
            );
            if chat_wire::send(&writer, &frame).await.is_err() {
                remaining.push((sender, message));
            } else {
                debug!(%recipient, %sender, "message delivered");
            }
        }

        let separator = RECORD_SEPARATOR.to_string();
        let senders: Vec<&str> = remaining.iter().map(|(sender, _)| sender.as_str()).collect();
        let messages: Vec<&str> = remaining.iter().map(|(_, message)| message.as_str()).collect();
        replication::broadcast_message_update(
            state,
            false,
            &recipient,
            &senders.join(separator.as_str()),
            &messages.join(separator.as_str()),
        )
        .await;
        if let Err(error) = undelivered.replace(&recipient, remaining) {
            warn!(%error, %recipient, "undelivered log rewrite failed");
        }
    }
}
