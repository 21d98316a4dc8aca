//! Shared replica state.
//!
//! Every task touching mutable state goes through the mutexes below.  Where
//! two locks are needed, they are taken in declaration order (clients,
//! logged-in, accounts, undelivered, then the acknowledgement and peer-set
//! locks of the replication round) and released in reverse.  Replication
//! and election never take store locks themselves, which is what keeps the
//! order acyclic while a mutation holds its store lock across a broadcast.

use chat_store::{AccountList, LoggedInAccounts, UndeliveredMessages};
use chat_wire::ClusterConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

/// A connection's write half behind its write mutex.
pub type TcpWriter = chat_wire::SharedWriter<OwnedWriteHalf>;

/// Identity of one accepted connection, unique within the process.
pub type ConnId = u64;

/// An outbound connection to a peer replica.
///
/// The reader is only ever used for single-frame handshakes (election
/// probes, replication acks, heartbeat acks), so it sits behind its own
/// mutex rather than being owned by a reader task.
pub struct PeerConnection {
    pub writer: TcpWriter,
    pub reader: Arc<Mutex<OwnedReadHalf>>,
}

/// A registered client session on an accepted connection.
pub struct ClientSession {
    pub uuid: String,
    pub writer: TcpWriter,
}

/// Sentinel primary id before the first election completes.
pub const NO_PRIMARY: u32 = u32::MAX;

pub struct ServerState {
    pub server_id: u32,
    pub cluster: ClusterConfig,
    primary_id: AtomicU32,
    msg_counter: AtomicU64,
    conn_counter: AtomicU64,

    /// Serializes replication rounds so backups see one totally ordered
    /// update stream.
    pub ack_lock: Mutex<()>,
    /// Outbound peer connections by replica id; the current live set.
    pub peers: Mutex<HashMap<u32, PeerConnection>>,
    /// Registered client sessions by connection id.
    pub clients: Mutex<HashMap<ConnId, ClientSession>>,
    pub logged_in: Mutex<LoggedInAccounts>,
    pub accounts: Mutex<AccountList>,
    pub undelivered: Mutex<UndeliveredMessages>,
}

impl ServerState {
    pub fn new(
        server_id: u32,
        cluster: ClusterConfig,
        accounts: AccountList,
        logged_in: LoggedInAccounts,
        undelivered: UndeliveredMessages,
    ) -> ServerState {
        ServerState {
            server_id,
            cluster,
            primary_id: AtomicU32::new(NO_PRIMARY),
            msg_counter: AtomicU64::new(0),
            conn_counter: AtomicU64::new(0),
            ack_lock: Mutex::new(()),
            peers: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
            logged_in: Mutex::new(logged_in),
            accounts: Mutex::new(accounts),
            undelivered: Mutex::new(undelivered),
        }
    }

    /// Allocate a message id.  The counter is per-replica and never shared.
    pub fn next_msg_id(&self) -> u64 {
        self.msg_counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_conn_id(&self) -> ConnId {
        self.conn_counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn primary_id(&self) -> u32 {
        self.primary_id.load(Ordering::SeqCst)
    }

    pub fn set_primary_id(&self, id: u32) {
        self.primary_id.store(id, Ordering::SeqCst);
    }

    pub fn is_primary(&self) -> bool {
        self.primary_id() == self.server_id
    }
}
