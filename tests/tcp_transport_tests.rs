//! TCP Transport Tests
//!
//! Runs the driver against a minimal framed server on a local listener:
//! - Session create / attach / delete over real sockets
//! - Streamed execute replies
//! - Error replies mapped to operation failures
//! - Server-side close of the control connection

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{eventually, test_config};
use serde_json::json;
use solidb_sql_driver::transport::protocol::{
    read_frame, write_frame, Column, CreatedSession, Reply, Request, ResultPart, ResultSet,
    SessionState, StatusCode, SQL_DRIVER_MAGIC,
};
use solidb_sql_driver::{
    CoordinationClient, DriverError, ExecuteOptions, QueryClient, Status, TcpTransport,
    TransportErrorKind,
};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

#[derive(Default)]
struct ServerState {
    next_session: AtomicU64,
    deleted: Mutex<Vec<String>>,
    kills: Mutex<HashMap<String, Arc<Notify>>>,
}

impl ServerState {
    fn kill(&self, session_id: &str) {
        if let Some(notify) = self.kills.lock().unwrap().get(session_id) {
            notify.notify_one();
        }
    }
}

async fn start_server() -> (String, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let state = Arc::new(ServerState::default());

    let server_state = state.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let state = server_state.clone();
            tokio::spawn(async move {
                let _ = handle_connection(socket, state).await;
            });
        }
    });

    (addr, state)
}

async fn handle_connection(
    mut socket: TcpStream,
    state: Arc<ServerState>,
) -> Result<(), DriverError> {
    let mut magic = vec![0u8; SQL_DRIVER_MAGIC.len()];
    socket.read_exact(&mut magic).await?;
    assert_eq!(magic, SQL_DRIVER_MAGIC);

    while let Some(request) = read_frame::<_, Request>(&mut socket).await? {
        match request {
            Request::CreateSession { .. } => {
                let id = format!("tcp-{}", state.next_session.fetch_add(1, Ordering::SeqCst) + 1);
                let reply = Reply::SessionCreated(CreatedSession {
                    session_id: id,
                    node_id: 7,
                });
                write_frame(&mut socket, &reply).await?;
            }
            Request::AttachSession { session_id } => {
                let kill = Arc::new(Notify::new());
                state
                    .kills
                    .lock()
                    .unwrap()
                    .insert(session_id, kill.clone());
                write_frame(&mut socket, &Reply::SessionState(SessionState::success())).await?;

                // Hold the control connection until either side ends it.
                tokio::select! {
                    _ = kill.notified() => {}
                    _ = read_frame::<_, Request>(&mut socket) => {}
                }
                return Ok(());
            }
            Request::DeleteSession { session_id } => {
                state.deleted.lock().unwrap().push(session_id);
                write_frame(&mut socket, &Reply::Ack).await?;
            }
            Request::ExecuteQuery(request) => {
                let part = ResultPart {
                    result_set_index: 0,
                    result_set: Some(ResultSet {
                        columns: vec![Column {
                            name: "echo".to_string(),
                            type_name: "Utf8".to_string(),
                        }],
                        rows: vec![json!({"echo": request.query})],
                    }),
                    tx_id: None,
                    stats: None,
                };
                write_frame(&mut socket, &Reply::ResultPart(part)).await?;
                write_frame(&mut socket, &Reply::Done).await?;
            }
            Request::DescribeNode { path, .. } => {
                let reply = Reply::error(StatusCode::SchemeError, format!("path not found: {}", path));
                write_frame(&mut socket, &reply).await?;
            }
            Request::BeginTransaction { .. } => {
                let reply = Reply::TransactionBegun {
                    tx_id: "tx-tcp".to_string(),
                };
                write_frame(&mut socket, &reply).await?;
            }
            _ => write_frame(&mut socket, &Reply::Ack).await?,
        }
    }

    Ok(())
}

// ============================================================================
// Round Trips
// ============================================================================

#[tokio::test]
async fn test_query_round_trip_over_tcp() {
    let (addr, state) = start_server().await;
    let transport = TcpTransport::connect_with_pool(&addr, 2).await.unwrap();
    let client = QueryClient::new(Arc::new(transport), test_config());

    let sets = client
        .query_rows("SELECT 'hi'", &ExecuteOptions::new().idempotent(true))
        .await
        .unwrap();

    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].rows, vec![json!({"echo": "SELECT 'hi'"})]);
    assert_eq!(*state.deleted.lock().unwrap(), vec!["tcp-1".to_string()]);
}

#[tokio::test]
async fn test_session_lifecycle_over_tcp() {
    let (addr, state) = start_server().await;
    let transport = TcpTransport::connect_with_config(&addr, &test_config())
        .await
        .unwrap();
    let client = QueryClient::new(Arc::new(transport), test_config());

    let session = client.create_session().await.unwrap();
    assert_eq!(session.node_id(), 7);
    assert_eq!(session.status(), Status::Idle);

    assert_ok!(session.exec("SELECT 1", &ExecuteOptions::new()).await);
    assert_ok!(session.close().await);

    assert_eq!(session.status(), Status::Closed);
    assert_eq!(*state.deleted.lock().unwrap(), vec![session.id().to_string()]);
}

#[tokio::test]
async fn test_open_result_does_not_block_other_calls() {
    let (addr, state) = start_server().await;
    let transport = TcpTransport::connect_with_pool(&addr, 2).await.unwrap();
    let client = QueryClient::new(Arc::new(transport), test_config());
    let session = client.create_session().await.unwrap();

    // Holds its pooled connection until drained.
    let open = session
        .query("SELECT * FROM big", &ExecuteOptions::new())
        .await
        .unwrap();

    for i in 0..3 {
        let follow_up = tokio::time::timeout(
            Duration::from_secs(1),
            session.exec("SELECT 1", &ExecuteOptions::new()),
        )
        .await;
        assert!(
            matches!(follow_up, Ok(Ok(()))),
            "follow-up {} blocked: {:?}",
            i,
            follow_up
        );
    }

    assert_ok!(session.close().await);
    assert_eq!(*state.deleted.lock().unwrap(), vec![session.id().to_string()]);

    assert_ok!(open.drain().await);
}

#[tokio::test]
async fn test_server_closing_control_connection_closes_session() {
    let (addr, state) = start_server().await;
    let transport = TcpTransport::connect(&addr).await.unwrap();
    let client = QueryClient::new(Arc::new(transport), test_config());

    let session = client.create_session().await.unwrap();
    state.kill(session.id());

    assert!(eventually(|| session.status() == Status::Closed).await);
    assert!(eventually(|| state.deleted.lock().unwrap().len() == 1).await);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_error_reply_maps_to_operation_failure() {
    let (addr, _state) = start_server().await;
    let transport = TcpTransport::connect(&addr).await.unwrap();
    let client = CoordinationClient::new(Arc::new(transport), test_config());

    let err = assert_err!(client.describe_node("/local/missing").await);
    assert!(err.is_operation_error(StatusCode::SchemeError));
    assert!(err.to_string().contains("path not found"));

    assert_ok!(client.create_node("/local/coord", Default::default()).await);
}

#[tokio::test]
async fn test_connect_refused_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = match TcpTransport::connect(&addr).await {
        Ok(_) => panic!("connect to a closed port should fail"),
        Err(e) => e,
    };
    assert_eq!(err.transport_kind(), Some(TransportErrorKind::Unavailable));
}
