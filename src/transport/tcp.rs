//! TCP transport speaking the framed MessagePack protocol.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::protocol::{
    read_frame, write_frame, CreateSessionRequest, CreatedSession, ExecuteRequest, NodeConfig,
    OperationParams, Reply, Request, SchemeEntry, TxSettings, SQL_DRIVER_MAGIC,
};
use super::service::{
    AttachStream, CoordinationService, QueryService, ResultStream, SessionService,
};
use crate::config::Config;
use crate::error::{DriverError, DriverResult};

const DEFAULT_POOL_SIZE: usize = 4;

struct PooledConnection {
    stream: Option<TcpStream>,
    /// False while a request/reply exchange is in flight. A connection left
    /// dirty by a timed-out or abandoned exchange is re-dialed before reuse.
    clean: bool,
}

impl PooledConnection {
    async fn ready(&mut self, addr: &str) -> DriverResult<&mut TcpStream> {
        if !self.clean {
            self.stream = None;
        }
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => dial(addr).await?,
        };
        self.clean = false;
        Ok(self.stream.insert(stream))
    }

    fn finish(&mut self) {
        self.clean = true;
    }

    fn reset(&mut self) {
        self.stream = None;
        self.clean = true;
    }
}

async fn dial(addr: &str) -> DriverResult<TcpStream> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| DriverError::unavailable(format!("Failed to connect to {}: {}", addr, e)))?;

    stream
        .set_nodelay(true)
        .map_err(|e| DriverError::unavailable(format!("Failed to set TCP_NODELAY: {}", e)))?;

    stream
        .write_all(SQL_DRIVER_MAGIC)
        .await
        .map_err(|e| DriverError::unavailable(format!("Failed to send magic header: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| DriverError::unavailable(format!("Failed to flush: {}", e)))?;

    Ok(stream)
}

/// Pooled TCP transport implementing every service the driver needs.
pub struct TcpTransport {
    addr: String,
    pool: Vec<Arc<Mutex<PooledConnection>>>,
    next_index: AtomicUsize,
    operation_timeout: Option<Duration>,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> DriverResult<Self> {
        Self::connect_with_pool(addr, DEFAULT_POOL_SIZE).await
    }

    pub async fn connect_with_config(addr: &str, config: &Config) -> DriverResult<Self> {
        let transport = Self::connect_with_pool(addr, config.pool_size).await?;
        Ok(transport.with_operation_timeout(config.operation_timeout))
    }

    pub async fn connect_with_pool(addr: &str, pool_size: usize) -> DriverResult<Self> {
        let pool_size = pool_size.max(1);
        let mut pool = Vec::with_capacity(pool_size);

        for _ in 0..pool_size {
            let stream = dial(addr).await?;
            pool.push(Arc::new(Mutex::new(PooledConnection {
                stream: Some(stream),
                clean: true,
            })));
        }

        tracing::debug!("TcpTransport: connected to {} with {} connections", addr, pool_size);

        Ok(Self {
            addr: addr.to_string(),
            pool,
            next_index: AtomicUsize::new(0),
            operation_timeout: None,
        })
    }

    /// Bounds every unary exchange. Streams are not bounded.
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// First idle pooled connection, starting from the round-robin cursor.
    /// When every pooled connection is held (typically by open result
    /// streams) a one-off connection is dialed instead of waiting.
    async fn acquire(&self) -> DriverResult<OwnedMutexGuard<PooledConnection>> {
        let start = self.next_index.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.pool.len() {
            let idx = (start + offset) % self.pool.len();
            if let Ok(conn) = self.pool[idx].clone().try_lock_owned() {
                return Ok(conn);
            }
        }

        tracing::debug!(
            "TcpTransport: all {} pooled connections busy, dialing overflow connection",
            self.pool.len()
        );
        let overflow = PooledConnection {
            stream: Some(dial(&self.addr).await?),
            clean: true,
        };
        Ok(Arc::new(Mutex::new(overflow)).lock_owned().await)
    }

    async fn call(&self, request: Request) -> DriverResult<Reply> {
        let name = request.name();

        let exchange = async {
            let mut conn = self.acquire().await?;
            let result = async {
                let stream = conn.ready(&self.addr).await?;
                write_frame(stream, &request).await?;
                read_frame::<_, Reply>(stream)
                    .await?
                    .ok_or_else(|| DriverError::unavailable("Connection closed by server"))
            }
            .await;

            match result {
                Ok(reply) => {
                    conn.finish();
                    Ok(reply)
                }
                Err(e) => {
                    tracing::debug!("TcpTransport: {} failed, dropping connection: {}", name, e);
                    conn.reset();
                    Err(e)
                }
            }
        };

        // Acquisition counts against the limit. A connection abandoned
        // mid-exchange stays dirty and is re-dialed on next use.
        let reply = match self.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
                DriverError::transport_deadline(format!(
                    "{} did not complete within {:?}",
                    name, limit
                ))
            })??,
            None => exchange.await?,
        };
        reply.into_result()
    }

    async fn call_ack(&self, request: Request) -> DriverResult<()> {
        match self.call(request).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(reply: &Reply) -> DriverError {
    DriverError::ProtocolError(format!("Unexpected reply '{}'", reply.kind()))
}

#[async_trait]
impl SessionService for TcpTransport {
    async fn create_session(&self, request: CreateSessionRequest) -> DriverResult<CreatedSession> {
        match self.call(Request::CreateSession { request }).await? {
            Reply::SessionCreated(created) => Ok(created),
            other => Err(unexpected(&other)),
        }
    }

    async fn attach_session(&self, session_id: &str) -> DriverResult<AttachStream> {
        let mut stream = dial(&self.addr).await?;
        write_frame(
            &mut stream,
            &Request::AttachSession {
                session_id: session_id.to_string(),
            },
        )
        .await?;

        let states = async_stream::stream! {
            let mut stream = stream;
            loop {
                match read_frame::<_, Reply>(&mut stream).await {
                    Ok(Some(Reply::SessionState(state))) => yield Ok(state),
                    Ok(Some(Reply::Error { status, issues })) => {
                        yield Err(DriverError::Operation { status, issues });
                        break;
                    }
                    Ok(Some(other)) => {
                        yield Err(unexpected(&other));
                        break;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(states))
    }

    async fn delete_session(&self, session_id: &str) -> DriverResult<()> {
        self.call_ack(Request::DeleteSession {
            session_id: session_id.to_string(),
        })
        .await
    }
}

#[async_trait]
impl QueryService for TcpTransport {
    async fn execute(&self, request: ExecuteRequest) -> DriverResult<ResultStream> {
        let mut conn = self.acquire().await?;

        let sent = async {
            let stream = conn.ready(&self.addr).await?;
            write_frame(stream, &Request::ExecuteQuery(request)).await
        }
        .await;
        if let Err(e) = sent {
            conn.reset();
            return Err(e);
        }

        let parts = async_stream::stream! {
            let mut conn = conn;
            loop {
                let frame = match conn.stream.as_mut() {
                    Some(stream) => read_frame::<_, Reply>(stream).await,
                    None => Err(DriverError::unavailable("Connection lost")),
                };
                match frame {
                    Ok(Some(Reply::ResultPart(part))) => yield Ok(part),
                    Ok(Some(Reply::Done)) => {
                        conn.finish();
                        break;
                    }
                    Ok(Some(Reply::Error { status, issues })) => {
                        conn.finish();
                        yield Err(DriverError::Operation { status, issues });
                        break;
                    }
                    Ok(Some(other)) => {
                        conn.reset();
                        yield Err(unexpected(&other));
                        break;
                    }
                    Ok(None) => {
                        conn.reset();
                        yield Err(DriverError::unavailable("Connection closed mid-stream"));
                        break;
                    }
                    Err(e) => {
                        conn.reset();
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(parts))
    }

    async fn begin_transaction(
        &self,
        session_id: &str,
        settings: TxSettings,
    ) -> DriverResult<String> {
        let reply = self
            .call(Request::BeginTransaction {
                session_id: session_id.to_string(),
                settings,
            })
            .await?;
        match reply {
            Reply::TransactionBegun { tx_id } => Ok(tx_id),
            other => Err(unexpected(&other)),
        }
    }

    async fn commit_transaction(&self, session_id: &str, tx_id: &str) -> DriverResult<()> {
        self.call_ack(Request::CommitTransaction {
            session_id: session_id.to_string(),
            tx_id: tx_id.to_string(),
        })
        .await
    }

    async fn rollback_transaction(&self, session_id: &str, tx_id: &str) -> DriverResult<()> {
        self.call_ack(Request::RollbackTransaction {
            session_id: session_id.to_string(),
            tx_id: tx_id.to_string(),
        })
        .await
    }
}

#[async_trait]
impl CoordinationService for TcpTransport {
    async fn create_node(
        &self,
        path: &str,
        config: NodeConfig,
        params: OperationParams,
    ) -> DriverResult<()> {
        self.call_ack(Request::CreateNode {
            path: path.to_string(),
            config,
            params,
        })
        .await
    }

    async fn alter_node(
        &self,
        path: &str,
        config: NodeConfig,
        params: OperationParams,
    ) -> DriverResult<()> {
        self.call_ack(Request::AlterNode {
            path: path.to_string(),
            config,
            params,
        })
        .await
    }

    async fn drop_node(&self, path: &str, params: OperationParams) -> DriverResult<()> {
        self.call_ack(Request::DropNode {
            path: path.to_string(),
            params,
        })
        .await
    }

    async fn describe_node(
        &self,
        path: &str,
        params: OperationParams,
    ) -> DriverResult<(SchemeEntry, NodeConfig)> {
        let reply = self
            .call(Request::DescribeNode {
                path: path.to_string(),
                params,
            })
            .await?;
        match reply {
            Reply::NodeDescribed { entry, config } => Ok((entry, config)),
            other => Err(unexpected(&other)),
        }
    }
}
