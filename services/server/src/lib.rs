// server: One replica of the primary-backup chat service.
//
// A replica listens for clients and peers on its configured port, opens an
// outbound connection to every other replica, elects the lowest live id as
// primary, and then either serves (primary) or mirrors and heartbeats
// (backup).  All state a client can observe lives in the file-backed
// stores and is replicated synchronously before any response.

pub mod connection;
pub mod election;
pub mod processor;
pub mod pump;
pub mod replication;
pub mod state;

pub use state::{ClientSession, ConnId, PeerConnection, ServerState, TcpWriter};

use chat_store::{AccountList, LoggedInAccounts, UndeliveredMessages};
use chat_wire::ClusterConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio::time::sleep;
use tracing::{info, warn};

/// How long bring-up keeps retrying an unreachable peer before giving up
/// on it (it can still be discovered as dead by the first election).
const PEER_CONNECT_ATTEMPTS: u32 = 40;
const PEER_CONNECT_RETRY: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("config: {0}")]
    Config(#[from] chat_wire::ConfigError),
    #[error("replica id {0} is not in the config")]
    UnknownReplica(u32),
    #[error("store: {0}")]
    Store(#[from] chat_store::StoreError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Triggers an orderly stop of a running replica.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// A bound, not-yet-serving replica.
pub struct Server {
    state: Arc<ServerState>,
    listener: TcpListener,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Bind the replica's listener and open its stores.
    ///
    /// Log files land in `log_dir` with the server id baked into each name.
    pub async fn bind(
        cluster: ClusterConfig,
        server_id: u32,
        log_dir: impl Into<PathBuf>,
    ) -> Result<Server, ServerError> {
        let descriptor = cluster
            .replica(server_id)
            .ok_or(ServerError::UnknownReplica(server_id))?
            .clone();
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)?;

        let accounts =
            AccountList::open(log_dir.join(format!("account_list_{server_id}.log")))?;
        let logged_in = LoggedInAccounts::open(
            log_dir.join(format!("logged_in_accounts_{server_id}.log")),
        )?;
        let undelivered = UndeliveredMessages::open(
            log_dir.join(format!("undelivered_messages_{server_id}.log")),
        )?;

        let listener = TcpListener::bind(descriptor.addr()).await?;
        info!(server_id, addr = %listener.local_addr()?, "replica listening");

        let state = Arc::new(ServerState::new(
            server_id, cluster, accounts, logged_in, undelivered,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Server {
            state,
            listener,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener
            .local_addr()
            .expect("listener has a local address once bound")
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { tx: self.shutdown_tx.clone() }
    }

    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    /// Run the replica until its shutdown handle fires.
    ///
    /// Bring-up order: accept inbound connections immediately, connect out
    /// to every peer, elect, then take the elected role.
    pub async fn serve(self) -> Result<(), ServerError> {
        let Server { state, listener, shutdown_tx, mut shutdown_rx } = self;

        tokio::spawn(connection::accept_loop(
            state.clone(),
            listener,
            shutdown_rx.clone(),
        ));

        connect_to_peers(&state).await;
        let primary_id = election::determine_primary(&state).await;
        if primary_id == state.server_id {
            election::promote(&state, shutdown_rx.clone());
        } else {
            tokio::spawn(election::heartbeat_loop(
                state.clone(),
                shutdown_rx.clone(),
            ));
        }

        // Park until shutdown; the spawned tasks watch the same channel.
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        drop(shutdown_tx);

        // Closing every held socket is what lets peers and clients detect
        // this replica's death.
        state.peers.lock().await.clear();
        state.clients.lock().await.clear();
        info!(server_id = state.server_id, "replica stopped");
        Ok(())
    }
}

/// Open the outbound connection to every configured peer, retrying while
/// the fleet comes up.
async fn connect_to_peers(state: &Arc<ServerState>) {
    let peers: Vec<_> = state
        .cluster
        .peers_of(state.server_id)
        .cloned()
        .collect();
    for descriptor in peers {
        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            match TcpStream::connect(descriptor.addr()).await {
                Ok(stream) => break Some(stream),
                Err(error) if attempt >= PEER_CONNECT_ATTEMPTS => {
                    warn!(peer_id = descriptor.id, %error, "giving up on peer");
                    break None;
                }
                Err(_) => sleep(PEER_CONNECT_RETRY).await,
            }
        };
        let Some(stream) = stream else { continue };

        let (read_half, write_half) = stream.into_split();
        state.peers.lock().await.insert(
            descriptor.id,
            PeerConnection {
                writer: Arc::new(Mutex::new(write_half)),
                reader: Arc::new(Mutex::new(read_half)),
            },
        );
        info!(peer_id = descriptor.id, addr = %descriptor.addr(), "connected to peer");
    }
}
