//! # SoliDB SQL Driver
//!
//! Client driver for the SoliDB SQL service. Sessions are server-attached
//! handles whose liveness is tracked through a long-lived control stream;
//! remote calls are retried according to how their failures classify and
//! whether the caller declared them idempotent.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use solidb_sql_driver::{Config, ExecuteOptions, QueryClient, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let transport = TcpTransport::connect_with_config("127.0.0.1:6747", &config).await?;
//!     let client = QueryClient::new(Arc::new(transport), config);
//!
//!     let sets = client
//!         .query_rows("SELECT 1 AS one", &ExecuteOptions::new().idempotent(true))
//!         .await?;
//!     println!("{:?}", sets);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordination;
pub mod error;
pub mod query;
pub mod retry;
pub mod session;
pub mod transport;

pub use config::{Config, RetrySettings};
pub use coordination::{CoordinationClient, CoordinationSession, CreateSessionOptions};
pub use error::{DriverError, DriverResult, TransportErrorKind};
pub use query::{ExecuteOptions, QueryClient, QueryResult, QuerySession, Transaction};
pub use retry::{retry, Backoff, RetryEvent, RetryOptions};
pub use session::{Session, SessionOptions, Status};
pub use transport::protocol::StatusCode;
pub use transport::TcpTransport;
