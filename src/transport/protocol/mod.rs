//! Wire protocol definitions for the SQL driver
//!
//! Every connection starts with the [`SQL_DRIVER_MAGIC`] header, then carries
//! length-prefixed MessagePack frames: `[length: 4 bytes BE][payload]`.
//! Unary calls exchange one request frame for one reply frame. Execute calls
//! stream `result_part` frames terminated by `done`. An attach call turns its
//! connection into the session's control stream of `session_state` frames.

pub mod codec;
pub mod reply;
pub mod request;
pub mod status;
pub mod types;

pub use codec::{
    decode_message, encode_message, read_frame, write_frame, MAX_MESSAGE_SIZE, SQL_DRIVER_MAGIC,
};
pub use reply::Reply;
pub use request::Request;
pub use status::{Issue, StatusCode};
pub use types::{
    Column, ConsistencyMode, CreateSessionRequest, CreatedSession, EntryType, ExecMode,
    ExecuteRequest, NodeConfig, OperationMode, OperationParams, QueryStats,
    RatelimiterCountersMode, ResultPart, ResultSet, SchemeEntry, SessionState, StatsMode, Syntax,
    TxControl, TxMode, TxSettings,
};
