// relay-chat: Replicated primary-backup chat service.
//
// The workspace splits into the wire codec (chat-wire), the file-backed
// stores (chat-store), the replica server, and the failover client.  This
// root crate re-exports the pieces the end-to-end suites and downstream
// tooling reach for.

pub use chat_store::{AccountList, LoggedInAccounts, StoreError, UndeliveredMessages};
pub use chat_wire::{ClusterConfig, Frame, Op, Payload, ReplicaDescriptor, WireError};
pub use client::{ChatClient, ClientError, Incoming};
pub use server::{Server, ServerError, ShutdownHandle};
