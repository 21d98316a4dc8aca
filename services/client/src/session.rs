//! The client session: connections, primary tracking, request routing.
//!
//! One reader task follows the current primary connection.  Response frames
//! resolve the single outstanding request; RECV_MESSAGE frames flow to the
//! application through a channel; SWITCH_PRIMARY re-points the session.  A
//! closed read triggers the failover probe.
//!
//! Requests are serialized by a gate mutex, so at most one response is ever
//! pending; the protocol has no response reordering to worry about.

use chat_wire::{Frame, Payload, ReplicaDescriptor, WireError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long the failover probe keeps cycling before giving up.  Stale
/// answers (a backup that has not yet noticed the primary's death) resolve
/// within a heartbeat interval, so this is generous.
const FAILOVER_ROUNDS: u32 = 100;
const FAILOVER_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no configured server is reachable")]
    NoServers,
    #[error("no primary connection")]
    NotConnected,
    #[error("connection to primary lost")]
    ConnectionClosed,
    #[error("unexpected response frame")]
    UnexpectedResponse,
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A chat message pushed from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub sender: String,
    pub message: String,
}

/// Status and matches from a LIST_ACCOUNTS call.  `accounts` is the
/// server's `;`-joined listing, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOutcome {
    pub status: String,
    pub accounts: String,
}

type Writer = chat_wire::SharedWriter<OwnedWriteHalf>;
type Reader = Arc<Mutex<OwnedReadHalf>>;

struct ServerConn {
    writer: Writer,
    reader: Reader,
}

struct Shared {
    /// Live connections by replica id.
    conns: Mutex<HashMap<u32, ServerConn>>,
    /// Config order, used for deterministic probing.
    order: Vec<u32>,
    primary: Mutex<u32>,
    pending: Mutex<Option<oneshot::Sender<Payload>>>,
    msg_counter: AtomicU64,
}

impl Shared {
    fn next_msg_id(&self) -> u64 {
        self.msg_counter.fetch_add(1, Ordering::Relaxed)
    }
}

pub struct ChatClient {
    shared: Arc<Shared>,
    uuid: String,
    /// Serializes requests; only one response can be outstanding.
    request_gate: Mutex<()>,
    reader_task: JoinHandle<()>,
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Connect to the fleet and resolve the current primary.
///
/// Returns the client plus the channel on which pushed messages arrive.
pub async fn connect(
    servers: &[ReplicaDescriptor],
) -> Result<(ChatClient, mpsc::Receiver<Incoming>), ClientError> {
    let uuid = Uuid::new_v4().to_string();
    let shared = Arc::new(Shared {
        conns: Mutex::new(HashMap::new()),
        order: servers.iter().map(|server| server.id).collect(),
        primary: Mutex::new(0),
        pending: Mutex::new(None),
        msg_counter: AtomicU64::new(0),
    });

    for descriptor in servers {
        let stream = match TcpStream::connect(descriptor.addr()).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(server_id = descriptor.id, %error, "could not connect");
                continue;
            }
        };
        let (read_half, write_half) = stream.into_split();
        let conn = ServerConn {
            writer: Arc::new(Mutex::new(write_half)),
            reader: Arc::new(Mutex::new(read_half)),
        };
        let frame = Frame::new(
            shared.next_msg_id(),
            Payload::RegisterClientUuid { uuid: uuid.clone() },
        );
        if let Err(error) = chat_wire::send(&conn.writer, &frame).await {
            warn!(server_id = descriptor.id, %error, "registration failed");
            continue;
        }
        shared.conns.lock().await.insert(descriptor.id, conn);
        debug!(server_id = descriptor.id, "connected and registered");
    }

    if shared.conns.lock().await.is_empty() {
        return Err(ClientError::NoServers);
    }
    let (incoming_tx, incoming_rx) = mpsc::channel(64);
    if !probe_for_primary(&shared, &incoming_tx).await {
        return Err(ClientError::NoServers);
    }

    let reader_task = tokio::spawn(read_from_fleet(shared.clone(), incoming_tx));

    Ok((
        ChatClient {
            shared,
            uuid,
            request_gate: Mutex::new(()),
            reader_task,
        },
        incoming_rx,
    ))
}

impl ChatClient {
    /// The uuid this session registered on every replica.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// The replica currently serving this client's requests.
    pub async fn primary_id(&self) -> u32 {
        *self.shared.primary.lock().await
    }

    pub async fn create_account(&self, username: &str) -> Result<String, ClientError> {
        let response = self
            .request(Payload::CreateAccount { username: username.to_owned() })
            .await?;
        match response {
            Payload::CreateAccountResponse { status, .. } => Ok(status),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn list_accounts(&self, query: &str) -> Result<ListOutcome, ClientError> {
        let response = self
            .request(Payload::ListAccounts { query: query.to_owned() })
            .await?;
        match response {
            Payload::ListAccountsResponse { status, accounts } => {
                Ok(ListOutcome { status, accounts })
            }
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn send_msg(&self, recipient: &str, message: &str) -> Result<String, ClientError> {
        let response = self
            .request(Payload::SendMsg {
                recipient: recipient.to_owned(),
                message: message.to_owned(),
            })
            .await?;
        match response {
            Payload::SendMessageResponse { status } => Ok(status),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn delete_account(&self) -> Result<String, ClientError> {
        let response = self.request(Payload::DeleteAccount).await?;
        match response {
            Payload::DeleteAccountResponse { status } => Ok(status),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn login(&self, username: &str) -> Result<String, ClientError> {
        let response = self
            .request(Payload::Login { username: username.to_owned() })
            .await?;
        match response {
            Payload::LogInResponse { status, .. } => Ok(status),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn logoff(&self) -> Result<String, ClientError> {
        let response = self.request(Payload::Logoff).await?;
        match response {
            Payload::LogOffResponse { status } => Ok(status),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Send one request on the primary connection and await its response.
    ///
    /// A request in flight when the primary dies fails with
    /// `ConnectionClosed`; the reader task handles failover in the
    /// background and the caller may simply retry.
    async fn request(&self, payload: Payload) -> Result<Payload, ClientError> {
        let _gate = self.request_gate.lock().await;

        let primary = *self.shared.primary.lock().await;
        let writer = self
            .shared
            .conns
            .lock()
            .await
            .get(&primary)
            .map(|conn| conn.writer.clone())
            .ok_or(ClientError::NotConnected)?;

        let (tx, rx) = oneshot::channel();
        *self.shared.pending.lock().await = Some(tx);

        let frame = Frame::new(self.shared.next_msg_id(), payload);
        if chat_wire::send(&writer, &frame).await.is_err() {
            self.shared.pending.lock().await.take();
            return Err(ClientError::ConnectionClosed);
        }

        rx.await.map_err(|_| ClientError::ConnectionClosed)
    }
}

/// The reader task: follow the primary, dispatch frames, fail over.
async fn read_from_fleet(shared: Arc<Shared>, incoming_tx: mpsc::Sender<Incoming>) {
    loop {
        let primary = *shared.primary.lock().await;
        let reader = shared
            .conns
            .lock()
            .await
            .get(&primary)
            .map(|conn| conn.reader.clone());
        let Some(reader) = reader else {
            if !failover(&shared, &incoming_tx).await {
                return;
            }
            continue;
        };

        let mut guard = reader.lock().await;
        let mut switched = false;
        loop {
            match chat_wire::read_frame(&mut *guard).await {
                Ok(frame) => match frame.payload {
                    Payload::RecvMessage { sender, message } => {
                        if incoming_tx.send(Incoming { sender, message }).await.is_err() {
                            return;
                        }
                    }
                    Payload::SwitchPrimary { id } => {
                        info!(new_primary = id, "server directed primary switch");
                        *shared.primary.lock().await = id;
                        switched = true;
                        break;
                    }
                    response => {
                        if let Some(tx) = shared.pending.lock().await.take() {
                            let _ = tx.send(response);
                        }
                    }
                },
                Err(_) => break,
            }
        }
        drop(guard);
        if switched {
            continue;
        }

        // Primary connection closed: drop it, fail any in-flight request,
        // and probe the survivors.
        warn!(primary, "primary connection lost");
        shared.conns.lock().await.remove(&primary);
        shared.pending.lock().await.take();
        if !failover(&shared, &incoming_tx).await {
            info!("no servers left, reader stopping");
            return;
        }
    }
}

/// Ask each surviving connection who the primary is; adopt the first usable
/// answer.  Keeps cycling (backups need a heartbeat interval to notice the
/// primary died and re-elect) up to a bounded number of rounds.
async fn failover(shared: &Arc<Shared>, incoming_tx: &mpsc::Sender<Incoming>) -> bool {
    for _ in 0..FAILOVER_ROUNDS {
        let candidates: Vec<u32> = {
            let conns = shared.conns.lock().await;
            shared
                .order
                .iter()
                .copied()
                .filter(|id| conns.contains_key(id))
                .collect()
        };
        if candidates.is_empty() {
            return false;
        }

        for id in candidates {
            if let Some(adopted) = probe_one(shared, id, incoming_tx).await {
                let has_conn = shared.conns.lock().await.contains_key(&adopted);
                if has_conn {
                    *shared.primary.lock().await = adopted;
                    info!(primary = adopted, "adopted new primary");
                    return true;
                }
                // stale answer naming a replica we cannot reach; keep probing
                debug!(reported = adopted, "primary answer names an unreachable replica");
            }
        }
        sleep(FAILOVER_RETRY).await;
    }
    false
}

/// Initial primary resolution at connect time.
async fn probe_for_primary(shared: &Arc<Shared>, incoming_tx: &mpsc::Sender<Incoming>) -> bool {
    let candidates: Vec<u32> = {
        let conns = shared.conns.lock().await;
        shared
            .order
            .iter()
            .copied()
            .filter(|id| conns.contains_key(id))
            .collect()
    };
    for id in candidates {
        if let Some(adopted) = probe_one(shared, id, incoming_tx).await {
            if shared.conns.lock().await.contains_key(&adopted) {
                *shared.primary.lock().await = adopted;
                info!(primary = adopted, "primary resolved");
                return true;
            }
        }
    }
    false
}

/// One GET_PRIMARY round trip on one connection.  A SWITCH_PRIMARY notice
/// racing the response is accepted as an answer, and any pushed message
/// sitting in front of the response is delivered rather than dropped.
/// Returns the reported primary id, removing the connection if it is dead.
async fn probe_one(
    shared: &Arc<Shared>,
    id: u32,
    incoming_tx: &mpsc::Sender<Incoming>,
) -> Option<u32> {
    let handles = {
        let conns = shared.conns.lock().await;
        conns
            .get(&id)
            .map(|conn| (conn.writer.clone(), conn.reader.clone()))
    };
    let (writer, reader) = handles?;

    let frame = Frame::new(shared.next_msg_id(), Payload::GetPrimary);
    if chat_wire::send(&writer, &frame).await.is_err() {
        shared.conns.lock().await.remove(&id);
        return None;
    }
    let mut guard = reader.lock().await;
    loop {
        match chat_wire::read_frame(&mut *guard).await {
            Ok(frame) => match frame.payload {
                Payload::AssignPrimaryResponse { id: primary }
                | Payload::SwitchPrimary { id: primary } => return Some(primary),
                Payload::RecvMessage { sender, message } => {
                    let _ = incoming_tx.send(Incoming { sender, message }).await;
                }
                _ => return None,
            },
            Err(_) => {
                drop(guard);
                shared.conns.lock().await.remove(&id);
                return None;
            }
        }
    }
}
