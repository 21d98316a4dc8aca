//! Client and replica request processing.
//!
//! One entry point, `process_frame`, switched on the operation code.  Every
//! client operation validates its preconditions under the store locks,
//! replicates the mutation, applies it locally, and answers with a status
//! string from the closed set below.  Replica operations (state updates,
//! election probes, heartbeats) apply directly and answer with ACK.
//!
//! Precondition failures are never errors in the Rust sense; they travel
//! back to the client as ordinary response frames.

use crate::replication;
use crate::state::{ClientSession, ConnId, ServerState, TcpWriter};
use chat_wire::{Frame, Payload, RECORD_SEPARATOR};
use regex::RegexBuilder;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const STATUS_SUCCESS: &str = "Success";
pub const ERR_CREATE_WHILE_LOGGED_IN: &str =
    "Error: User can't create an account while logged in.";
pub const ERR_ACCOUNT_EXISTS: &str = "Error: Account already exists.";
pub const ERR_NO_RECIPIENT: &str = "Error: The recipient of the message does not exist.";
pub const ERR_SEND_NEEDS_LOGIN: &str = "Error: Need to be logged in to send a message.";
pub const ERR_DELETE_NEEDS_LOGIN: &str = "Error: Need to be logged in to delete your account.";
pub const ERR_ALREADY_LOGGED_IN: &str =
    "Error: Already logged into an account, please log off first.";
pub const ERR_NO_ACCOUNT: &str = "Error: Account does not exist.";
pub const ERR_ACCOUNT_IN_USE: &str = "Error: Someone else is logged into that account.";
pub const ERR_LOGOFF_NEEDS_LOGIN: &str =
    "Error: Need to be logged in to log out of your account.";
pub const ERR_BAD_REGEX: &str = "Error: regex is malformed.";
pub const ERR_STORAGE: &str = "Error: internal storage failure.";

/// Handle one inbound frame.  Returns `false` when the connection should be
/// closed (protocol violation), `true` to keep reading.
pub async fn process_frame(
    state: &Arc<ServerState>,
    conn_id: ConnId,
    writer: &TcpWriter,
    frame: Frame,
) -> bool {
    let msg_id = frame.msg_id;
    let response = match frame.payload {
        Payload::CreateAccount { username } => {
            match create_account(state, conn_id, &username).await {
                Some(status) => Some(Payload::CreateAccountResponse { status, username }),
                None => return false,
            }
        }
        Payload::ListAccounts { query } => {
            let (status, accounts) = list_accounts(state, &query).await;
            Some(Payload::ListAccountsResponse { status, accounts })
        }
        Payload::SendMsg { recipient, message } => {
            match send_msg(state, conn_id, &recipient, &message).await {
                Some(status) => Some(Payload::SendMessageResponse { status }),
                None => return false,
            }
        }
        Payload::DeleteAccount => match delete_account(state, conn_id).await {
            Some(status) => Some(Payload::DeleteAccountResponse { status }),
            None => return false,
        },
        Payload::Login { username } => match login(state, conn_id, &username).await {
            Some((status, username)) => Some(Payload::LogInResponse { status, username }),
            None => return false,
        },
        Payload::Logoff => match logoff(state, conn_id).await {
            Some(status) => Some(Payload::LogOffResponse { status }),
            None => return false,
        },
        Payload::GetPrimary => {
            Some(Payload::AssignPrimaryResponse { id: state.primary_id() })
        }
        Payload::AssignPrimary => {
            Some(Payload::AssignPrimaryResponse { id: state.server_id })
        }
        Payload::RegisterClientUuid { uuid } => {
            register_client(state, conn_id, writer, uuid).await;
            None
        }
        Payload::UpdateAccountState { add, username } => {
            update_accounts(state, add, &username).await;
            Some(Payload::Ack)
        }
        Payload::UpdateLoginState { add, username, uuid } => {
            update_login(state, add, &username, &uuid).await;
            Some(Payload::Ack)
        }
        Payload::UpdateMessageState { add_one, recipient, sender, message } => {
            update_message_state(state, add_one, &recipient, &sender, &message).await;
            Some(Payload::Ack)
        }
        Payload::Heartbeat { id } => {
            debug!(backup_id = id, "heartbeat");
            Some(Payload::Ack)
        }
        other => {
            debug!(op = ?other.op(), "ignoring unexpected frame");
            None
        }
    };

    if let Some(payload) = response {
        if let Err(error) = chat_wire::send(writer, &Frame::new(msg_id, payload)).await {
            warn!(conn_id, %error, "failed to send response");
        }
    }
    true
}

async fn register_client(
    state: &Arc<ServerState>,
    conn_id: ConnId,
    writer: &TcpWriter,
    uuid: String,
) {
    debug!(conn_id, %uuid, "client registered");
    state
        .clients
        .lock()
        .await
        .insert(conn_id, ClientSession { uuid, writer: writer.clone() });
}

/// The requester must not be logged in and the name must be free.  On
/// success the new account is replicated and the requester logged into it
/// while the account lock is still held, so a concurrent duplicate create
/// cannot slip between the check and the write.
async fn create_account(
    state: &Arc<ServerState>,
    conn_id: ConnId,
    username: &str,
) -> Option<String> {
    let clients = state.clients.lock().await;
    let uuid = clients.get(&conn_id)?.uuid.clone();
    let mut logged_in = state.logged_in.lock().await;
    if logged_in.is_logged_in_by_uuid(&uuid) {
        return Some(ERR_CREATE_WHILE_LOGGED_IN.to_owned());
    }

    let mut accounts = state.accounts.lock().await;
    if accounts.contains(username) {
        return Some(ERR_ACCOUNT_EXISTS.to_owned());
    }

    replication::broadcast_account_update(state, true, username).await;
    if let Err(error) = accounts.create(username) {
        warn!(%error, "account log write failed");
        return Some(ERR_STORAGE.to_owned());
    }
    replication::broadcast_login_update(state, true, username, &uuid).await;
    if let Err(error) = logged_in.login(username, &uuid) {
        warn!(%error, "login log write failed");
        return Some(ERR_STORAGE.to_owned());
    }
    info!(username, "account created");
    Some(STATUS_SUCCESS.to_owned())
}

/// No login required.  The query compiles as a case-insensitive pattern and
/// matches from the first character of each account name.
async fn list_accounts(state: &Arc<ServerState>, query: &str) -> (String, String) {
    match RegexBuilder::new(query).case_insensitive(true).build() {
        Ok(pattern) => {
            let accounts = state.accounts.lock().await;
            let matches = accounts.search(&pattern);
            (STATUS_SUCCESS.to_owned(), matches.join(";"))
        }
        Err(_) => (ERR_BAD_REGEX.to_owned(), String::new()),
    }
}

/// The sender must be logged in and the recipient must exist; the message
/// is queued (and replicated) for the pump to deliver.
async fn send_msg(
    state: &Arc<ServerState>,
    conn_id: ConnId,
    recipient: &str,
    message: &str,
) -> Option<String> {
    let sender = {
        let clients = state.clients.lock().await;
        let uuid = clients.get(&conn_id)?.uuid.clone();
        let logged_in = state.logged_in.lock().await;
        match logged_in.username_of(&uuid) {
            Some(username) => username.to_owned(),
            None => return Some(ERR_SEND_NEEDS_LOGIN.to_owned()),
        }
    };

    let accounts = state.accounts.lock().await;
    if !accounts.contains(recipient) {
        return Some(ERR_NO_RECIPIENT.to_owned());
    }
    let mut undelivered = state.undelivered.lock().await;
    replication::broadcast_message_update(state, true, recipient, &sender, message).await;
    if let Err(error) = undelivered.add(recipient, &sender, message) {
        warn!(%error, "undelivered log write failed");
        return Some(ERR_STORAGE.to_owned());
    }
    debug!(%sender, recipient, "message queued");
    Some(STATUS_SUCCESS.to_owned())
}

/// Logs the account off, then removes it, replicating both steps.
async fn delete_account(state: &Arc<ServerState>, conn_id: ConnId) -> Option<String> {
    let username = {
        let clients = state.clients.lock().await;
        let uuid = clients.get(&conn_id)?.uuid.clone();
        let mut logged_in = state.logged_in.lock().await;
        let Some(username) = logged_in.username_of(&uuid).map(ToOwned::to_owned) else {
            return Some(ERR_DELETE_NEEDS_LOGIN.to_owned());
        };
        replication::broadcast_login_update(state, false, &username, &uuid).await;
        if let Err(error) = logged_in.logoff(&username) {
            warn!(%error, "login log write failed");
            return Some(ERR_STORAGE.to_owned());
        }
        username
    };

    let mut accounts = state.accounts.lock().await;
    replication::broadcast_account_update(state, false, &username).await;
    if let Err(error) = accounts.remove(&username) {
        warn!(%error, "account log write failed");
        return Some(ERR_STORAGE.to_owned());
    }
    info!(%username, "account deleted");
    Some(STATUS_SUCCESS.to_owned())
}

/// The requester must not be logged in, the account must exist, and nobody
/// else may hold it.  The clients and logged-in locks are held jointly
/// across check and bind, closing the race window.
async fn login(
    state: &Arc<ServerState>,
    conn_id: ConnId,
    username: &str,
) -> Option<(String, String)> {
    let clients = state.clients.lock().await;
    let uuid = clients.get(&conn_id)?.uuid.clone();
    let mut logged_in = state.logged_in.lock().await;
    if logged_in.is_logged_in_by_uuid(&uuid) {
        return Some((ERR_ALREADY_LOGGED_IN.to_owned(), String::new()));
    }
    let accounts = state.accounts.lock().await;
    if !accounts.contains(username) {
        return Some((ERR_NO_ACCOUNT.to_owned(), username.to_owned()));
    }
    drop(accounts);
    if logged_in.is_logged_in_by_username(username) {
        return Some((ERR_ACCOUNT_IN_USE.to_owned(), username.to_owned()));
    }

    replication::broadcast_login_update(state, true, username, &uuid).await;
    if let Err(error) = logged_in.login(username, &uuid) {
        warn!(%error, "login log write failed");
        return Some((ERR_STORAGE.to_owned(), username.to_owned()));
    }
    info!(username, "logged in");
    Some((STATUS_SUCCESS.to_owned(), username.to_owned()))
}

async fn logoff(state: &Arc<ServerState>, conn_id: ConnId) -> Option<String> {
    let clients = state.clients.lock().await;
    let uuid = clients.get(&conn_id)?.uuid.clone();
    let mut logged_in = state.logged_in.lock().await;
    let Some(username) = logged_in.username_of(&uuid).map(ToOwned::to_owned) else {
        return Some(ERR_LOGOFF_NEEDS_LOGIN.to_owned());
    };

    replication::broadcast_login_update(state, false, &username, &uuid).await;
    if let Err(error) = logged_in.logoff(&username) {
        warn!(%error, "login log write failed");
        return Some(ERR_STORAGE.to_owned());
    }
    info!(%username, "logged off");
    Some(STATUS_SUCCESS.to_owned())
}

// ---------------------------------------------------------------------------
// Replication frame application (backup side)
// ---------------------------------------------------------------------------

async fn update_accounts(state: &Arc<ServerState>, add: bool, username: &str) {
    let mut accounts = state.accounts.lock().await;
    let result = if add {
        accounts.create(username)
    } else {
        accounts.remove(username)
    };
    if let Err(error) = result {
        warn!(%error, add, username, "replicated account update failed");
    }
}

async fn update_login(state: &Arc<ServerState>, add: bool, username: &str, uuid: &str) {
    let mut logged_in = state.logged_in.lock().await;
    let result = if add {
        logged_in.login(username, uuid)
    } else {
        logged_in.logoff(username).map(|_| ())
    };
    if let Err(error) = result {
        warn!(%error, add, username, "replicated login update failed");
    }
}

/// `add_one` appends a single message; otherwise the recipient's whole
/// queue is replaced by the zipped `\r`-separated sender and message lists.
async fn update_message_state(
    state: &Arc<ServerState>,
    add_one: bool,
    recipient: &str,
    sender: &str,
    message: &str,
) {
    let mut undelivered = state.undelivered.lock().await;
    let result = if add_one {
        undelivered.add(recipient, sender, message)
    } else {
        let replacement: Vec<(String, String)> = if sender.is_empty() && message.is_empty() {
            Vec::new()
        } else {
            sender
                .split(RECORD_SEPARATOR)
                .zip(message.split(RECORD_SEPARATOR))
                .map(|(sender, message)| (sender.to_owned(), message.to_owned()))
                .collect()
        };
        undelivered.replace(recipient, replacement)
    };
    if let Err(error) = result {
        warn!(%error, add_one, recipient, "replicated message update failed");
    }
}
