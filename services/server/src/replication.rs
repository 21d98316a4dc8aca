//! Synchronous primary-driven replication.
//!
//! Every mutation of replicated state broadcasts one update frame to each
//! live backup and reads one ACK back before the mutation is applied
//! locally and the client answered.  The acknowledgement lock serializes
//! whole rounds, so backups receive a totally ordered update stream.
//!
//! A backup that fails to take a frame or answer the ACK read is dropped
//! from the live set; the round continues with the remaining peers.  There
//! are no retries and no rollback: if the primary dies mid-round the
//! cluster may diverge by exactly one operation, which is accepted.

use crate::state::ServerState;
use chat_wire::{Frame, Payload};
use std::sync::Arc;
use tracing::{debug, warn};

pub async fn broadcast_account_update(state: &Arc<ServerState>, add: bool, username: &str) {
    broadcast(
        state,
        Payload::UpdateAccountState { add, username: username.to_owned() },
    )
    .await;
}

pub async fn broadcast_login_update(
    state: &Arc<ServerState>,
    add: bool,
    username: &str,
    uuid: &str,
) {
    broadcast(
        state,
        Payload::UpdateLoginState {
            add,
            username: username.to_owned(),
            uuid: uuid.to_owned(),
        },
    )
    .await;
}

pub async fn broadcast_message_update(
    state: &Arc<ServerState>,
    add_one: bool,
    recipient: &str,
    sender: &str,
    message: &str,
) {
    broadcast(
        state,
        Payload::UpdateMessageState {
            add_one,
            recipient: recipient.to_owned(),
            sender: sender.to_owned(),
            message: message.to_owned(),
        },
    )
    .await;
}

/// One replication round: send to every live peer, await each ACK.
async fn broadcast(state: &Arc<ServerState>, payload: Payload) {
    let _round = state.ack_lock.lock().await;
    let mut peers = state.peers.lock().await;

    let mut dead = Vec::new();
    for (&peer_id, peer) in peers.iter() {
        let frame = Frame::new(state.next_msg_id(), payload.clone());
        if chat_wire::send(&peer.writer, &frame).await.is_err() {
            dead.push(peer_id);
            continue;
        }
        let mut reader = peer.reader.lock().await;
        match chat_wire::read_frame(&mut *reader).await {
            Ok(ack) if matches!(ack.payload, Payload::Ack) => {
                debug!(peer_id, msg_id = frame.msg_id, "replication acked");
            }
            _ => dead.push(peer_id),
        }
    }

    for peer_id in dead {
        peers.remove(&peer_id);
        warn!(peer_id, "replica dropped from live set during replication");
    }
}
