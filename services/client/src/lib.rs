// client: Failover-aware library for talking to the replicated chat fleet.
//
// A client opens a connection to every configured replica, registers its
// uuid on each, and asks each in turn who the primary is; the first answer
// wins.  All requests then go to the primary connection.  When that
// connection dies, or a SWITCH_PRIMARY notice arrives, the client re-runs
// the probe over its surviving connections and carries on.

pub mod session;

pub use session::{ChatClient, ClientError, Incoming, ListOutcome, connect};
