//! Primary election, heartbeating, and promotion.
//!
//! Election is a probe, not a vote: ask every outbound peer for its id, and
//! the minimum over the responders plus self is the primary.  Backups
//! heartbeat the primary every 500 ms; a closed ACK read is the only
//! failure signal (TCP FIN/RST does the detecting).  A backup that wins
//! re-election tells every attached client to switch, then promotes itself
//! by starting the delivery pump.

use crate::pump;
use crate::state::ServerState;
use chat_wire::{Frame, Payload};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// Probe every peer and derive the primary id from the live set.
pub async fn determine_primary(state: &Arc<ServerState>) -> u32 {
    let mut live_ids = vec![state.server_id];
    let mut peers = state.peers.lock().await;

    let mut dead = Vec::new();
    for (&peer_id, peer) in peers.iter() {
        let frame = Frame::new(state.next_msg_id(), Payload::AssignPrimary);
        if chat_wire::send(&peer.writer, &frame).await.is_err() {
            dead.push(peer_id);
            continue;
        }
        let mut reader = peer.reader.lock().await;
        match chat_wire::read_frame(&mut *reader).await {
            Ok(response) => {
                if let Payload::AssignPrimaryResponse { id } = response.payload {
                    live_ids.push(id);
                }
            }
            Err(_) => dead.push(peer_id),
        }
    }
    for peer_id in dead {
        peers.remove(&peer_id);
        warn!(peer_id, "peer unreachable during election");
    }
    drop(peers);

    let primary_id = *live_ids.iter().min().unwrap_or(&state.server_id);
    state.set_primary_id(primary_id);
    info!(primary_id, live = ?live_ids, "election complete");
    primary_id
}

/// Backup-side heartbeat task.  Runs until shutdown or until this replica
/// wins an election and promotes.
pub async fn heartbeat_loop(state: Arc<ServerState>, mut shutdown: watch::Receiver<bool>) {
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
            () = sleep(HEARTBEAT_INTERVAL) => {}
        }

        let primary_id = state.primary_id();
        if primary_id == state.server_id {
            return;
        }

        if primary_alive(&state, primary_id).await {
            continue;
        }

        warn!(primary_id, "primary heartbeat lost, re-electing");
        state.peers.lock().await.remove(&primary_id);
        let new_primary = determine_primary(&state).await;
        if new_primary == state.server_id {
            notify_clients_of_switch(&state).await;
            promote(&state, shutdown.clone());
            return;
        }
    }
}

/// One heartbeat round trip to the primary.
async fn primary_alive(state: &Arc<ServerState>, primary_id: u32) -> bool {
    let handles = {
        let peers = state.peers.lock().await;
        peers
            .get(&primary_id)
            .map(|peer| (peer.writer.clone(), peer.reader.clone()))
    };
    let Some((writer, reader)) = handles else {
        return false;
    };

    let frame = Frame::new(
        state.next_msg_id(),
        Payload::Heartbeat { id: state.server_id },
    );
    if chat_wire::send(&writer, &frame).await.is_err() {
        return false;
    }
    let mut reader = reader.lock().await;
    matches!(
        chat_wire::read_frame(&mut *reader).await,
        Ok(Frame { payload: Payload::Ack, .. })
    )
}

/// Tell every attached client which replica serves them now.
async fn notify_clients_of_switch(state: &Arc<ServerState>) {
    let clients = state.clients.lock().await;
    for (&conn_id, session) in clients.iter() {
        let frame = Frame::new(
            state.next_msg_id(),
            Payload::SwitchPrimary { id: state.server_id },
        );
        if let Err(error) = chat_wire::send(&session.writer, &frame).await {
            warn!(conn_id, %error, "failed to notify client of primary switch");
        }
    }
}

/// Become the primary: start draining undelivered queues to logged-in
/// recipients.
pub fn promote(state: &Arc<ServerState>, shutdown: watch::Receiver<bool>) {
    info!(server_id = state.server_id, "promoted to primary");
    tokio::spawn(pump::pump_loop(state.clone(), shutdown));
}
