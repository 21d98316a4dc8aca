//! Accept loop and per-connection handler tasks.
//!
//! Inbound connections are not told apart at accept time: peers and clients
//! both speak frames into the same handler, and a connection only becomes a
//! client session once REGISTER_CLIENT_UUID arrives.  Each connection's
//! read half is owned by its handler task; the write half goes behind the
//! connection's write mutex so responses, pump deliveries, and primary
//! switch notices can all be sent concurrently.

use crate::processor;
use crate::state::{ConnId, ServerState, TcpWriter};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

pub async fn accept_loop(
    state: Arc<ServerState>,
    listener: TcpListener,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            info!("accept loop stopping");
            return;
        }
        let mut shutdown_poll = shutdown.clone();
        tokio::select! {
            biased;
            _ = shutdown_poll.changed() => {
                if *shutdown_poll.borrow() {
                    info!("accept loop stopping");
                    return;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(%addr, "connection accepted");
                    let conn_id = state.next_conn_id();
                    tokio::spawn(handle_connection(
                        state.clone(),
                        stream,
                        conn_id,
                        shutdown.clone(),
                    ));
                }
                Err(error) => warn!(%error, "accept failed"),
            }
        }
    }
}

async fn handle_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    conn_id: ConnId,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, write_half) = stream.into_split();
    let writer: TcpWriter = Arc::new(Mutex::new(write_half));

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            frame = chat_wire::read_frame(&mut reader) => match frame {
                Ok(frame) => {
                    if !processor::process_frame(&state, conn_id, &writer, frame).await {
                        warn!(conn_id, "closing connection after protocol violation");
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }

    cleanup_connection(&state, conn_id).await;
    debug!(conn_id, "connection closed");
}

/// Drop the client session, logging off any bound username.  The logoff is
/// local only; replicas learn about dead sessions through login operations,
/// not through disconnects.
async fn cleanup_connection(state: &Arc<ServerState>, conn_id: ConnId) {
    let mut clients = state.clients.lock().await;
    let mut logged_in = state.logged_in.lock().await;
    if let Some(session) = clients.remove(&conn_id) {
        if let Some(username) = logged_in.username_of(&session.uuid).map(ToOwned::to_owned) {
            match logged_in.logoff(&username) {
                Ok(_) => info!(%username, "logged off on disconnect"),
                Err(error) => warn!(%error, %username, "logoff on disconnect failed"),
            }
        }
    }
}
