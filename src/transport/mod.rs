//! Remote side of the driver: the service seams the core is written
//! against, the wire protocol, and the pooled TCP transport.

pub mod protocol;
pub mod service;
pub mod tcp;

pub use service::{
    AttachStream, CoordinationService, QueryService, ResultStream, SessionService,
};
pub use tcp::TcpTransport;
