//! The closed operation table.
//!
//! Request/response pairs sit on adjacent even/odd codes.  Codes are part of
//! the frozen wire contract and must never be renumbered.

/// Who originates a frame carrying this operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server.
    ClientToServer,
    /// Server to client.
    ServerToClient,
    /// Replica to replica (either way).
    ServerToServer,
}

/// Every operation code on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateAccount,
    CreateAccountResponse,
    ListAccounts,
    ListAccountsResponse,
    SendMsg,
    SendMessageResponse,
    DeleteAccount,
    DeleteAccountResponse,
    Login,
    LogInResponse,
    Logoff,
    LogOffResponse,
    RecvMessage,
    SwitchPrimary,
    GetPrimary,
    AssignPrimary,
    AssignPrimaryResponse,
    UpdateAccountState,
    UpdateLoginState,
    UpdateMessageState,
    RegisterClientUuid,
    Ack,
    Heartbeat,
}

impl Op {
    /// The stable numeric code for this operation.
    pub fn code(self) -> u32 {
        match self {
            Op::CreateAccount => 1,
            Op::CreateAccountResponse => 2,
            Op::ListAccounts => 3,
            Op::ListAccountsResponse => 4,
            Op::SendMsg => 5,
            Op::SendMessageResponse => 6,
            Op::DeleteAccount => 7,
            Op::DeleteAccountResponse => 8,
            Op::Login => 9,
            Op::LogInResponse => 10,
            Op::Logoff => 11,
            Op::LogOffResponse => 12,
            Op::RecvMessage => 13,
            Op::SwitchPrimary => 14,
            Op::GetPrimary => 15,
            Op::AssignPrimary => 16,
            Op::AssignPrimaryResponse => 17,
            Op::UpdateAccountState => 18,
            Op::UpdateLoginState => 19,
            Op::UpdateMessageState => 20,
            Op::RegisterClientUuid => 21,
            Op::Ack => 22,
            Op::Heartbeat => 23,
        }
    }

    /// Look an operation up by code.
    pub fn from_code(code: u32) -> Option<Op> {
        Some(match code {
            1 => Op::CreateAccount,
            2 => Op::CreateAccountResponse,
            3 => Op::ListAccounts,
            4 => Op::ListAccountsResponse,
            5 => Op::SendMsg,
            6 => Op::SendMessageResponse,
            7 => Op::DeleteAccount,
            8 => Op::DeleteAccountResponse,
            9 => Op::Login,
            10 => Op::LogInResponse,
            11 => Op::Logoff,
            12 => Op::LogOffResponse,
            13 => Op::RecvMessage,
            14 => Op::SwitchPrimary,
            15 => Op::GetPrimary,
            16 => Op::AssignPrimary,
            17 => Op::AssignPrimaryResponse,
            18 => Op::UpdateAccountState,
            19 => Op::UpdateLoginState,
            20 => Op::UpdateMessageState,
            21 => Op::RegisterClientUuid,
            22 => Op::Ack,
            23 => Op::Heartbeat,
            _ => return None,
        })
    }

    /// Number of body fields this operation carries.
    pub fn field_count(self) -> usize {
        match self {
            Op::DeleteAccount
            | Op::Logoff
            | Op::GetPrimary
            | Op::AssignPrimary
            | Op::Ack => 0,
            Op::CreateAccount
            | Op::Login
            | Op::SwitchPrimary
            | Op::AssignPrimaryResponse
            | Op::RegisterClientUuid
            | Op::ListAccounts
            | Op::SendMessageResponse
            | Op::DeleteAccountResponse
            | Op::LogOffResponse
            | Op::Heartbeat => 1,
            Op::CreateAccountResponse
            | Op::ListAccountsResponse
            | Op::SendMsg
            | Op::LogInResponse
            | Op::RecvMessage
            | Op::UpdateAccountState => 2,
            Op::UpdateLoginState => 3,
            Op::UpdateMessageState => 4,
        }
    }

    /// Whether the sender reads a response frame after sending this.
    pub fn expects_response(self) -> bool {
        matches!(
            self,
            Op::CreateAccount
                | Op::ListAccounts
                | Op::SendMsg
                | Op::DeleteAccount
                | Op::Login
                | Op::Logoff
                | Op::GetPrimary
                | Op::AssignPrimary
                | Op::UpdateAccountState
                | Op::UpdateLoginState
                | Op::UpdateMessageState
                | Op::Heartbeat
        )
    }

    /// Who sends frames carrying this operation.
    pub fn direction(self) -> Direction {
        match self {
            Op::CreateAccount
            | Op::ListAccounts
            | Op::SendMsg
            | Op::DeleteAccount
            | Op::Login
            | Op::Logoff
            | Op::GetPrimary
            | Op::RegisterClientUuid => Direction::ClientToServer,
            Op::CreateAccountResponse
            | Op::ListAccountsResponse
            | Op::SendMessageResponse
            | Op::DeleteAccountResponse
            | Op::LogInResponse
            | Op::LogOffResponse
            | Op::RecvMessage
            | Op::SwitchPrimary => Direction::ServerToClient,
            Op::AssignPrimary
            | Op::AssignPrimaryResponse
            | Op::UpdateAccountState
            | Op::UpdateLoginState
            | Op::UpdateMessageState
            | Op::Ack
            | Op::Heartbeat => Direction::ServerToServer,
        }
    }
}
