//! Typed per-operation argument records.
//!
//! The body of a frame is an ordered list of UTF-8 string fields.  Rather
//! than passing untyped field maps around, each operation gets one tagged
//! variant here; decoding validates the field count against the operation
//! schema and parses integer and boolean fields up front.
//!
//! Booleans travel as the literal strings `True` / `False`; replica ids as
//! decimal strings.

use crate::{Op, WireError};

/// The decoded body of a frame, one variant per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    CreateAccount { username: String },
    CreateAccountResponse { status: String, username: String },
    ListAccounts { query: String },
    ListAccountsResponse { status: String, accounts: String },
    SendMsg { recipient: String, message: String },
    SendMessageResponse { status: String },
    DeleteAccount,
    DeleteAccountResponse { status: String },
    Login { username: String },
    LogInResponse { status: String, username: String },
    Logoff,
    LogOffResponse { status: String },
    RecvMessage { sender: String, message: String },
    SwitchPrimary { id: u32 },
    GetPrimary,
    AssignPrimary,
    AssignPrimaryResponse { id: u32 },
    UpdateAccountState { add: bool, username: String },
    UpdateLoginState { add: bool, username: String, uuid: String },
    UpdateMessageState { add_one: bool, recipient: String, sender: String, message: String },
    RegisterClientUuid { uuid: String },
    Ack,
    Heartbeat { id: u32 },
}

fn encode_flag(flag: bool) -> String {
    if flag { "True".to_owned() } else { "False".to_owned() }
}

fn decode_flag(value: &str) -> bool {
    value == "True"
}

fn decode_id(field: &'static str, value: &str) -> Result<u32, WireError> {
    value.parse().map_err(|_| WireError::BadInteger {
        field,
        value: value.to_owned(),
    })
}

impl Payload {
    /// The operation this payload belongs to.
    pub fn op(&self) -> Op {
        match self {
            Payload::CreateAccount { .. } => Op::CreateAccount,
            Payload::CreateAccountResponse { .. } => Op::CreateAccountResponse,
            Payload::ListAccounts { .. } => Op::ListAccounts,
            Payload::ListAccountsResponse { .. } => Op::ListAccountsResponse,
            Payload::SendMsg { .. } => Op::SendMsg,
            Payload::SendMessageResponse { .. } => Op::SendMessageResponse,
            Payload::DeleteAccount => Op::DeleteAccount,
            Payload::DeleteAccountResponse { .. } => Op::DeleteAccountResponse,
            Payload::Login { .. } => Op::Login,
            Payload::LogInResponse { .. } => Op::LogInResponse,
            Payload::Logoff => Op::Logoff,
            Payload::LogOffResponse { .. } => Op::LogOffResponse,
            Payload::RecvMessage { .. } => Op::RecvMessage,
            Payload::SwitchPrimary { .. } => Op::SwitchPrimary,
            Payload::GetPrimary => Op::GetPrimary,
            Payload::AssignPrimary => Op::AssignPrimary,
            Payload::AssignPrimaryResponse { .. } => Op::AssignPrimaryResponse,
            Payload::UpdateAccountState { .. } => Op::UpdateAccountState,
            Payload::UpdateLoginState { .. } => Op::UpdateLoginState,
            Payload::UpdateMessageState { .. } => Op::UpdateMessageState,
            Payload::RegisterClientUuid { .. } => Op::RegisterClientUuid,
            Payload::Ack => Op::Ack,
            Payload::Heartbeat { .. } => Op::Heartbeat,
        }
    }

    /// Serialize the fields in schema order.
    pub fn encode_fields(&self) -> Vec<String> {
        match self {
            Payload::CreateAccount { username } => vec![username.clone()],
            Payload::CreateAccountResponse { status, username } => {
                vec![status.clone(), username.clone()]
            }
            Payload::ListAccounts { query } => vec![query.clone()],
            Payload::ListAccountsResponse { status, accounts } => {
                vec![status.clone(), accounts.clone()]
            }
            Payload::SendMsg { recipient, message } => vec![recipient.clone(), message.clone()],
            Payload::SendMessageResponse { status } => vec![status.clone()],
            Payload::DeleteAccount | Payload::Logoff | Payload::GetPrimary => vec![],
            Payload::DeleteAccountResponse { status } => vec![status.clone()],
            Payload::Login { username } => vec![username.clone()],
            Payload::LogInResponse { status, username } => vec![status.clone(), username.clone()],
            Payload::LogOffResponse { status } => vec![status.clone()],
            Payload::RecvMessage { sender, message } => vec![sender.clone(), message.clone()],
            Payload::SwitchPrimary { id } => vec![id.to_string()],
            Payload::AssignPrimary | Payload::Ack => vec![],
            Payload::AssignPrimaryResponse { id } => vec![id.to_string()],
            Payload::UpdateAccountState { add, username } => {
                vec![encode_flag(*add), username.clone()]
            }
            Payload::UpdateLoginState { add, username, uuid } => {
                vec![encode_flag(*add), username.clone(), uuid.clone()]
            }
            Payload::UpdateMessageState { add_one, recipient, sender, message } => vec![
                encode_flag(*add_one),
                recipient.clone(),
                sender.clone(),
                message.clone(),
            ],
            Payload::RegisterClientUuid { uuid } => vec![uuid.clone()],
            Payload::Heartbeat { id } => vec![id.to_string()],
        }
    }

    /// Rebuild a payload from schema-ordered fields.
    pub fn decode_fields(op: Op, fields: &[&str]) -> Result<Payload, WireError> {
        if fields.len() != op.field_count() {
            return Err(WireError::Schema {
                op,
                expected: op.field_count(),
                got: fields.len(),
            });
        }
        Ok(match op {
            Op::CreateAccount => Payload::CreateAccount {
                username: fields[0].to_owned(),
            },
            Op::CreateAccountResponse => Payload::CreateAccountResponse {
                status: fields[0].to_owned(),
                username: fields[1].to_owned(),
            },
            Op::ListAccounts => Payload::ListAccounts {
                query: fields[0].to_owned(),
            },
            Op::ListAccountsResponse => Payload::ListAccountsResponse {
                status: fields[0].to_owned(),
                accounts: fields[1].to_owned(),
            },
            Op::SendMsg => Payload::SendMsg {
                recipient: fields[0].to_owned(),
                message: fields[1].to_owned(),
            },
            Op::SendMessageResponse => Payload::SendMessageResponse {
                status: fields[0].to_owned(),
            },
            Op::DeleteAccount => Payload::DeleteAccount,
            Op::DeleteAccountResponse => Payload::DeleteAccountResponse {
                status: fields[0].to_owned(),
            },
            Op::Login => Payload::Login {
                username: fields[0].to_owned(),
            },
            Op::LogInResponse => Payload::LogInResponse {
                status: fields[0].to_owned(),
                username: fields[1].to_owned(),
            },
            Op::Logoff => Payload::Logoff,
            Op::LogOffResponse => Payload::LogOffResponse {
                status: fields[0].to_owned(),
            },
            Op::RecvMessage => Payload::RecvMessage {
                sender: fields[0].to_owned(),
                message: fields[1].to_owned(),
            },
            Op::SwitchPrimary => Payload::SwitchPrimary {
                id: decode_id("id", fields[0])?,
            },
            Op::GetPrimary => Payload::GetPrimary,
            Op::AssignPrimary => Payload::AssignPrimary,
            Op::AssignPrimaryResponse => Payload::AssignPrimaryResponse {
                id: decode_id("id", fields[0])?,
            },
            Op::UpdateAccountState => Payload::UpdateAccountState {
                add: decode_flag(fields[0]),
                username: fields[1].to_owned(),
            },
            Op::UpdateLoginState => Payload::UpdateLoginState {
                add: decode_flag(fields[0]),
                username: fields[1].to_owned(),
                uuid: fields[2].to_owned(),
            },
            Op::UpdateMessageState => Payload::UpdateMessageState {
                add_one: decode_flag(fields[0]),
                recipient: fields[1].to_owned(),
                sender: fields[2].to_owned(),
                message: fields[3].to_owned(),
            },
            Op::RegisterClientUuid => Payload::RegisterClientUuid {
                uuid: fields[0].to_owned(),
            },
            Op::Ack => Payload::Ack,
            Op::Heartbeat => Payload::Heartbeat {
                id: decode_id("id", fields[0])?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(payload: Payload) {
        let op = payload.op();
        let fields = payload.encode_fields();
        let borrowed: Vec<&str> = fields.iter().map(String::as_str).collect();
        let decoded = Payload::decode_fields(op, &borrowed).expect("decode");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn every_operation_round_trips() {
        round_trip(Payload::CreateAccount { username: "alice".into() });
        round_trip(Payload::CreateAccountResponse {
            status: "Success".into(),
            username: "alice".into(),
        });
        round_trip(Payload::ListAccounts { query: ".*".into() });
        round_trip(Payload::ListAccountsResponse {
            status: "Success".into(),
            accounts: "alice;bob".into(),
        });
        round_trip(Payload::SendMsg {
            recipient: "bob".into(),
            message: "hello there".into(),
        });
        round_trip(Payload::SendMessageResponse { status: "Success".into() });
        round_trip(Payload::DeleteAccount);
        round_trip(Payload::DeleteAccountResponse { status: "Success".into() });
        round_trip(Payload::Login { username: "bob".into() });
        round_trip(Payload::LogInResponse {
            status: "Success".into(),
            username: "bob".into(),
        });
        round_trip(Payload::Logoff);
        round_trip(Payload::LogOffResponse { status: "Success".into() });
        round_trip(Payload::RecvMessage {
            sender: "alice".into(),
            message: "hi".into(),
        });
        round_trip(Payload::SwitchPrimary { id: 2 });
        round_trip(Payload::GetPrimary);
        round_trip(Payload::AssignPrimary);
        round_trip(Payload::AssignPrimaryResponse { id: 1 });
        round_trip(Payload::UpdateAccountState { add: true, username: "alice".into() });
        round_trip(Payload::UpdateLoginState {
            add: false,
            username: "alice".into(),
            uuid: "u1".into(),
        });
        round_trip(Payload::UpdateMessageState {
            add_one: false,
            recipient: "bob".into(),
            sender: "alice\rcarol".into(),
            message: "one\rtwo".into(),
        });
        round_trip(Payload::RegisterClientUuid { uuid: "u1".into() });
        round_trip(Payload::Ack);
        round_trip(Payload::Heartbeat { id: 3 });
    }

    #[test]
    fn flags_travel_as_literal_true_false() {
        let fields = Payload::UpdateAccountState { add: true, username: "a".into() }
            .encode_fields();
        assert_eq!(fields[0], "True");
        let fields = Payload::UpdateAccountState { add: false, username: "a".into() }
            .encode_fields();
        assert_eq!(fields[0], "False");
    }

    #[test]
    fn field_count_mismatch_is_rejected() {
        let err = Payload::decode_fields(Op::Login, &[]).unwrap_err();
        assert!(matches!(
            err,
            crate::WireError::Schema { op: Op::Login, expected: 1, got: 0 }
        ));
    }
}
