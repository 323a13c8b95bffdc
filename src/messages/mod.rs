pub mod types;
pub mod wire;

pub use types::{
    Record, Request, Response, Status, ACTION_LOGIN, ACTION_PING, UNKNOWN_FIELD,
};
pub use wire::{
    LineCodec,
    WireConfig,
    WireError,

    // Wire framing constants
    MAX_LINE_BYTES,
    DEFAULT_READ_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT,
};
