//! Crate-wide error taxonomy (spec.md §7).

use thiserror::Error;

/// Every fallible operation in this crate returns this type.
pub type Result<T> = std::result::Result<T, Error>;

/// The errors a backend, the wire codec, or the debugger core can produce.
///
/// Transport and framing errors are fatal to the connection; backend errors
/// are returned to the peer as typed replies and never tear down the
/// connection (see spec.md §4.11).
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("connection error: {0}")]
    ConnectionError(#[from] std::io::Error),

    #[error("malformed packet")]
    MalformedPacket,

    #[error("couldn't connect to target")]
    CouldntConnect,

    #[error("couldn't start server")]
    CouldntStartServer,

    #[error("couldn't open target")]
    CouldntOpenTarget,

    #[error("couldn't attach to target")]
    CouldntAttach,

    #[error("couldn't detach from target")]
    CouldntDetach,

    #[error("couldn't terminate target")]
    CouldntTerminate,

    #[error("couldn't read memory")]
    CouldntReadMemory,

    #[error("couldn't write memory")]
    CouldntWriteMemory,

    #[error("couldn't read registers")]
    CouldntReadRegisters,

    #[error("couldn't write registers")]
    CouldntWriteRegisters,

    #[error("couldn't set breakpoint")]
    CouldntSetBreakpoint,

    #[error("couldn't remove breakpoint")]
    CouldntRemoveBreakpoint,

    #[error("no breakpoint at address {0:#x}")]
    NoBreakpointAtAddress(u64),

    #[error("couldn't determine instruction pointer")]
    CouldntDetermineInstructionPointer,

    #[error("operation unsupported by this backend")]
    Unsupported,

    #[error("unexpected reply from target: {0}")]
    UnexpectedReply(String),

    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("invalid CPU tag: {0}")]
    InvalidCpuString(String),

    #[error("checksum mismatch: received {received:02x}, computed {computed:02x}")]
    Checksum { received: u8, computed: u8 },

    #[error("debugger did not acknowledge (NACK)")]
    Nack,

    #[error("{0}")]
    Generic(String),
}
