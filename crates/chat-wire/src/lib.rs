// chat-wire: Framed wire protocol for the replicated chat service.
//
// Every unit of traffic (client requests, server responses, replica state
// updates, election and heartbeat probes) is one frame: a fixed-size header
// followed by a delimiter-separated body.  The operation table is a closed
// set with stable numeric codes shared by every process in the fleet.

pub mod cluster;
pub mod frame;
pub mod io;
pub mod op;
pub mod payload;

pub use cluster::{ClusterConfig, ConfigError, ReplicaDescriptor, load_config, parse_config};
pub use frame::{Frame, HEADER_LEN};
pub use io::{SharedWriter, read_frame, read_loop, send};
pub use op::{Direction, Op};
pub use payload::Payload;

use thiserror::Error;

/// The byte separating body fields within a frame.
///
/// ASCII unit separator; never valid inside a username, uuid, or message.
pub const FIELD_DELIMITER: u8 = 0x1F;

/// Separator for items inside a bulk list field (full-queue replication).
pub const RECORD_SEPARATOR: char = '\r';

/// Errors raised by encoding, decoding, and framed socket I/O.
#[derive(Debug, Error)]
pub enum WireError {
    /// The peer closed the connection, or a frame was malformed beyond
    /// recovery.  Callers must not attempt to resynchronize.
    #[error("connection closed")]
    ConnectionClosed,
    #[error("unknown operation code {0}")]
    UnknownOp(u32),
    #[error("schema mismatch for {op:?}: expected {expected} fields, got {got}")]
    Schema { op: Op, expected: usize, got: usize },
    #[error("field value contains a reserved byte")]
    ReservedByte,
    #[error("frame body exceeds the u32 length field")]
    BodyTooLarge,
    #[error("non-integer value in {field} field: {value:?}")]
    BadInteger { field: &'static str, value: String },
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
