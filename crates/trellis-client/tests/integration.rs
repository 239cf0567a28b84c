//! End-to-end tests for trellis-client against the in-process server.
//!
//! Run with: cargo test --package trellis-client --test integration

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use trellis_client::{
    sparql, ClientError, ConnectionPool, FaultPoint, MemoryConnector, NativeValue, PoolConfig,
    PooledConnection, RdfValue, ReasoningMode, RemovePattern, Request, TripleInput,
    TripleStoreClient,
};

const PEOPLE: &str = "SELECT ?name ?age WHERE { ?p <http://ex/name> ?name . ?p <http://ex/age> ?age }";

fn config(min_size: usize, max_size: usize) -> PoolConfig {
    PoolConfig {
        min_size,
        max_size,
        acquire_timeout_ms: 100,
        ..Default::default()
    }
}

async fn setup(min_size: usize, max_size: usize) -> (MemoryConnector, TripleStoreClient) {
    let server = MemoryConnector::new();
    let client = TripleStoreClient::connect(config(min_size, max_size), server.clone())
        .await
        .unwrap();
    server.clear_requests();
    (server, client)
}

fn people(server: &MemoryConnector) {
    let age = |n: i64| trellis_core::value::to_rdf(&NativeValue::Integer(n)).unwrap();
    server.respond_to(
        PEOPLE,
        &["name", "age"],
        vec![
            vec![RdfValue::plain("Alice"), age(30)],
            vec![RdfValue::plain("Bob"), age(25)],
        ],
    );
}

fn count_requests(server: &MemoryConnector, wanted: &Request) -> usize {
    server.requests().iter().filter(|r| *r == wanted).count()
}

// ── Pool ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_use_never_exceeds_max_size() {
    let server = MemoryConnector::new();
    let client = TripleStoreClient::connect(
        PoolConfig {
            acquire_timeout_ms: 5_000,
            ..config(1, 3)
        },
        server.clone(),
    )
    .await
    .unwrap();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let client = client.clone();
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            client
                .with_connection(move |_conn| async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(server.peak_connections() <= 3);
    let status = client.pool().status();
    assert_eq!(status.busy, 0);
    assert!(status.idle <= 3);
}

#[tokio::test]
async fn test_acquire_times_out_when_exhausted() {
    let (_server, client) = setup(1, 1).await;
    let held = client.pool().acquire().await.unwrap();

    match client.pool().acquire().await {
        Err(ClientError::PoolExhausted { max_size, .. }) => assert_eq!(max_size, 1),
        other => panic!("expected PoolExhausted, got {other:?}"),
    }

    drop(held);
    assert!(client.pool().acquire().await.is_ok());
}

#[tokio::test]
async fn test_waiter_gets_released_connection() {
    let (server, client) = setup(1, 1).await;
    let held = client.pool().acquire().await.unwrap();
    let first = held.id();

    let pool = client.pool().clone();
    let waiter = tokio::spawn(async move { pool.acquire().await.map(|c| c.id()) });
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(held);

    assert_eq!(waiter.await.unwrap().unwrap(), first);
    assert_eq!(server.connections_opened(), 1);
}

#[tokio::test]
async fn test_release_to_foreign_pool_is_rejected() {
    let server = MemoryConnector::new();
    let a = ConnectionPool::new(config(1, 2), server.clone()).await.unwrap();
    let b = ConnectionPool::new(config(1, 2), server.clone()).await.unwrap();

    let conn = a.acquire().await.unwrap();
    assert_eq!(a.status().idle, 0);

    let err = b.release(conn).unwrap_err();
    assert!(matches!(err, ClientError::InvalidHandle { .. }));
    assert_eq!(b.status().idle, 1);
    assert_eq!(b.status().busy, 0);
    // The rejected guard went back to its own pool.
    assert_eq!(a.status().idle, 1);
    assert_eq!(a.status().busy, 0);
}

#[tokio::test]
async fn test_explicit_release_returns_to_idle() {
    let (_server, client) = setup(0, 2).await;
    let conn = client.pool().acquire().await.unwrap();
    assert_eq!(client.pool().status().busy, 1);
    client.pool().release(conn).unwrap();

    let status = client.pool().status();
    assert_eq!(status.idle, 1);
    assert_eq!(status.busy, 0);
}

#[tokio::test]
async fn test_unhealthy_connection_is_not_reused() {
    let (server, client) = setup(1, 1).await;
    people(&server);
    server.disconnect_next(FaultPoint::Select);

    let err = client.select(PEOPLE).await.unwrap_err();
    assert!(matches!(err, ClientError::OperationFailure { action: "query", .. }));
    assert_eq!(client.pool().status().idle, 0);

    assert_eq!(client.select(PEOPLE).await.unwrap().len(), 2);
    assert_eq!(server.connections_opened(), 2);
}

#[tokio::test]
async fn test_closed_pool_rejects_work() {
    let (server, client) = setup(2, 2).await;
    assert_eq!(client.close().await, 2);
    assert_eq!(count_requests(&server, &Request::Close), 2);

    assert!(matches!(
        client.pool().acquire().await,
        Err(ClientError::PoolClosed)
    ));
    assert!(matches!(
        client.insert(TripleInput::new("http://ex/a", "http://ex/p", "x")).await,
        Err(ClientError::PoolClosed)
    ));
}

#[tokio::test]
async fn test_close_discards_late_returns() {
    let (_server, client) = setup(1, 2).await;
    let held = client.pool().acquire().await.unwrap();

    let pool = client.pool().clone();
    let closing = tokio::spawn(async move { pool.close().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(held);

    closing.await.unwrap();
    let status = client.pool().status();
    assert!(status.closed);
    assert_eq!(status.idle, 0);
    assert_eq!(status.busy, 0);
}

// ── Scoped sessions ──────────────────────────────────────────────

#[tokio::test]
async fn test_failed_operation_returns_connection() {
    let (server, client) = setup(1, 1).await;

    let err = client
        .with_connection(|_conn| async move {
            Err::<(), _>(ClientError::RowHandler("bad row".into()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::RowHandler(_)));

    let status = client.pool().status();
    assert_eq!(status.idle, 1);
    assert_eq!(status.busy, 0);
    assert_eq!(server.connections_opened(), 1);
}

async fn explode(_conn: PooledConnection) -> trellis_client::Result<()> {
    panic!("boom")
}

#[tokio::test]
async fn test_panicking_operation_is_contained() {
    let (server, client) = setup(1, 1).await;

    match client.with_connection(explode).await {
        Err(ClientError::Panicked { message }) => assert_eq!(message, "boom"),
        other => panic!("expected Panicked, got {other:?}"),
    }
    let status = client.pool().status();
    assert_eq!(status.busy, 0);
    assert_eq!(status.idle, 0);

    // Capacity is back: the next operation opens a replacement.
    client
        .with_connection(|_conn| async move { Ok(()) })
        .await
        .unwrap();
    assert_eq!(server.connections_opened(), 2);
    assert_eq!(client.pool().status().idle, 1);
}

#[tokio::test]
async fn test_panic_before_future_is_contained() {
    let (_server, client) = setup(1, 1).await;

    let result = client
        .with_connection(
            |_conn| -> std::future::Ready<trellis_client::Result<()>> { panic!("sync boom") },
        )
        .await;
    assert!(matches!(result, Err(ClientError::Panicked { .. })));
    assert_eq!(client.pool().status().busy, 0);
    assert!(client.pool().acquire().await.is_ok());
}

// ── Queries ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_select_returns_rows_in_order() {
    let (server, client) = setup(1, 2).await;
    people(&server);

    let rows = client.select(PEOPLE).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&RdfValue::plain("Alice")));
    assert_eq!(
        rows[1].native("age").unwrap(),
        Some(NativeValue::Integer(25))
    );
    assert_eq!(count_requests(&server, &Request::CursorClosed), 1);
}

#[tokio::test]
async fn test_zero_row_query_never_calls_handler() {
    let (server, client) = setup(1, 1).await;
    server.respond_to("SELECT ?s WHERE { ?s ?p ?o }", &["s"], vec![]);

    let mut calls = 0;
    let handled = client
        .query("SELECT ?s WHERE { ?s ?p ?o }", |_row| {
            calls += 1;
            Ok::<_, Infallible>(())
        })
        .await
        .unwrap();

    assert_eq!(handled, 0);
    assert_eq!(calls, 0);
    assert_eq!(client.pool().status().idle, 1);
    assert_eq!(count_requests(&server, &Request::CursorClosed), 1);
}

#[tokio::test]
async fn test_handler_error_stops_iteration_and_closes_cursor() {
    let (server, client) = setup(1, 1).await;
    people(&server);

    let mut seen = Vec::new();
    let err = client
        .query(PEOPLE, |row| {
            seen.push(row.get("name").cloned());
            Err("stop here")
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::RowHandler(_)));
    assert_eq!(seen, vec![Some(RdfValue::plain("Alice"))]);
    assert_eq!(count_requests(&server, &Request::CursorClosed), 1);
    assert_eq!(client.pool().status().idle, 1);
}

#[tokio::test]
async fn test_fetch_failure_closes_cursor() {
    let (server, client) = setup(1, 1).await;
    people(&server);
    server.fail_next(FaultPoint::Fetch);

    let err = client.select(PEOPLE).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::OperationFailure { action: "fetch row", .. }
    ));
    assert_eq!(count_requests(&server, &Request::CursorClosed), 1);
    assert_eq!(client.pool().status().idle, 1);
}

#[tokio::test]
async fn test_unknown_query_is_an_operation_failure() {
    let (_server, client) = setup(1, 1).await;
    let err = client.select("ASK { ?s ?p ?o }").await.unwrap_err();
    assert!(matches!(err, ClientError::OperationFailure { action: "query", .. }));
    assert_eq!(client.pool().status().idle, 1);
}

#[tokio::test]
async fn test_parameters_reach_the_server() {
    let server = MemoryConnector::new();
    let client = TripleStoreClient::connect(
        PoolConfig {
            reasoning: ReasoningMode::Ql,
            ..config(1, 1)
        },
        server.clone(),
    )
    .await
    .unwrap();
    server.respond_to(PEOPLE, &["name", "age"], vec![]);

    client
        .select(
            sparql(PEOPLE)
                .param("p", NativeValue::uri("http://ex/alice"))
                .arg(7i64),
        )
        .await
        .unwrap();

    let selected = server
        .requests()
        .into_iter()
        .find_map(|r| match r {
            Request::Select(q) => Some(q),
            _ => None,
        })
        .unwrap();
    assert_eq!(selected.reasoning, ReasoningMode::Ql);
    assert_eq!(
        selected.named.get("p"),
        Some(&RdfValue::resource("http://ex/alice").unwrap())
    );
    assert_eq!(selected.positional.len(), 1);
    assert!(server.requests().iter().any(|r| matches!(
        r,
        Request::Connect {
            reasoning: ReasoningMode::Ql,
            ..
        }
    )));
}

#[tokio::test]
async fn test_unsupported_parameter_never_reaches_server() {
    let (server, client) = setup(1, 1).await;
    people(&server);

    let err = client
        .select(sparql(PEOPLE).param("flag", serde_json::json!(true)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::UnsupportedParameterType { type_name: "boolean", .. }
    ));
    assert!(!server
        .requests()
        .iter()
        .any(|r| matches!(r, Request::Select(_))));
    assert_eq!(client.pool().status().idle, 1);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Person {
    name: String,
    age: i64,
}

#[tokio::test]
async fn test_each_deserializes_rows() {
    let (server, client) = setup(1, 1).await;
    people(&server);

    let mut found = Vec::new();
    let n = client
        .each(PEOPLE, |p: Person| {
            found.push(p);
            Ok::<_, Infallible>(())
        })
        .await
        .unwrap();

    assert_eq!(n, 2);
    assert_eq!(
        found,
        vec![
            Person { name: "Alice".into(), age: 30 },
            Person { name: "Bob".into(), age: 25 },
        ]
    );
}

#[tokio::test]
async fn test_each_reports_shape_mismatch() {
    let (server, client) = setup(1, 1).await;
    server.respond_to("SELECT ?name", &["name"], vec![vec![RdfValue::plain("Alice")]]);

    let err = client
        .each("SELECT ?name", |_p: Person| Ok::<_, Infallible>(()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::ConversionFailure(trellis_core::ValueError::Shape(_))
    ));
}

// ── Updates ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_update_runs_in_a_transaction() {
    let (server, client) = setup(1, 1).await;
    client
        .update("DELETE WHERE { ?s <http://ex/stale> ?o }")
        .await
        .unwrap();

    let requests = server.requests();
    assert!(matches!(requests[0], Request::Begin));
    assert!(matches!(requests[1], Request::Update(_)));
    assert!(matches!(requests[2], Request::Commit));
}

#[tokio::test]
async fn test_failed_update_rolls_back() {
    let (server, client) = setup(1, 1).await;
    server.fail_next(FaultPoint::Update);

    let err = client
        .update("DELETE WHERE { ?s ?p ?o }")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::OperationFailure { action: "update", .. }));
    assert_eq!(count_requests(&server, &Request::Rollback), 1);
    assert_eq!(count_requests(&server, &Request::Commit), 0);
    assert_eq!(client.pool().status().idle, 1);
    assert_eq!(server.connections_opened(), 1);
}

// ── Mutations ────────────────────────────────────────────────────

#[tokio::test]
async fn test_insert_classifies_objects() {
    let (server, client) = setup(1, 1).await;
    let added = client
        .insert(vec![
            TripleInput::new("http://ex/alice", "http://ex/knows", NativeValue::uri("http://ex/bob")),
            TripleInput::new("http://ex/alice", "http://ex/greeting", "hello"),
        ])
        .await
        .unwrap();
    assert_eq!(added, 2);

    let statements = server.statements();
    assert_eq!(
        statements[0].object,
        RdfValue::resource("http://ex/bob").unwrap()
    );
    assert_eq!(statements[1].object, RdfValue::plain("hello"));
}

#[tokio::test]
async fn test_insert_json() {
    let (server, client) = setup(1, 1).await;
    let added = client
        .insert_json(&serde_json::json!([
            ["http://ex/alice", "http://ex/age", 30],
            ["http://ex/bob", "http://ex/name", "Bob"]
        ]))
        .await
        .unwrap();
    assert_eq!(added, 2);
    assert_eq!(server.statements().len(), 2);
}

#[tokio::test]
async fn test_bad_input_never_opens_a_transaction() {
    let (server, client) = setup(1, 1).await;

    let err = client.insert(Vec::<TripleInput>::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));

    let err = client
        .insert(TripleInput::new("not an iri", "http://ex/p", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConversionFailure(_)));

    let err = client
        .insert_json(&serde_json::json!([["http://ex/a", "http://ex/p"]]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));

    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_failed_commit_leaves_store_unchanged() {
    let (server, client) = setup(1, 1).await;
    server.fail_next(FaultPoint::Commit);

    let err = client
        .insert(TripleInput::new("http://ex/a", "http://ex/p", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::OperationFailure { action: "insert", .. }));
    assert!(server.statements().is_empty());
    assert_eq!(count_requests(&server, &Request::Rollback), 1);
    assert_eq!(client.pool().status().idle, 1);
}

#[tokio::test]
async fn test_failed_rollback_discards_connection() {
    let (server, client) = setup(1, 1).await;
    server.fail_next(FaultPoint::Add);
    server.fail_next(FaultPoint::Rollback);

    let err = client
        .insert(TripleInput::new("http://ex/a", "http://ex/p", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::OperationFailure { .. }));
    assert_eq!(client.pool().status().idle, 0);

    client
        .insert(TripleInput::new("http://ex/a", "http://ex/p", "x"))
        .await
        .unwrap();
    assert_eq!(server.connections_opened(), 2);
    assert_eq!(server.statements().len(), 1);
}

#[tokio::test]
async fn test_remove_by_subject_only() {
    let (server, client) = setup(1, 1).await;
    client
        .insert(vec![
            TripleInput::new("http://ex/alice", "http://ex/name", "Alice"),
            TripleInput::new("http://ex/alice", "http://ex/age", 30i64),
            TripleInput::new("http://ex/bob", "http://ex/name", "Bob"),
        ])
        .await
        .unwrap();

    client
        .remove(RemovePattern::any().subject(NativeValue::uri("http://ex/alice")))
        .await
        .unwrap();

    let left = server.statements();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].subject.as_str(), "http://ex/bob");
}

#[tokio::test]
async fn test_remove_everything() {
    let (server, client) = setup(1, 1).await;
    client
        .insert(TripleInput::new("http://ex/a", "http://ex/p", "x"))
        .await
        .unwrap();
    client
        .remove(RemovePattern::from_args(vec![None, None, None, None]).unwrap())
        .await
        .unwrap();
    assert!(server.statements().is_empty());
}

#[tokio::test]
async fn test_remove_literal_object() {
    let (server, client) = setup(1, 1).await;
    client
        .insert(vec![
            TripleInput::new("http://ex/a", "http://ex/p", "keep"),
            TripleInput::new("http://ex/a", "http://ex/p", "drop"),
        ])
        .await
        .unwrap();
    client
        .remove(RemovePattern::any().object("drop"))
        .await
        .unwrap();

    let left = server.statements();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].object, RdfValue::plain("keep"));
}

#[tokio::test]
async fn test_failed_remove_rolls_back() {
    let (server, client) = setup(1, 1).await;
    client
        .insert(TripleInput::new("http://ex/a", "http://ex/p", "x"))
        .await
        .unwrap();
    server.clear_requests();
    server.fail_next(FaultPoint::Remove);

    let err = client
        .remove(RemovePattern::any().subject(NativeValue::uri("http://ex/a")))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::OperationFailure { action: "remove", .. }));
    assert_eq!(count_requests(&server, &Request::Rollback), 1);
    assert_eq!(count_requests(&server, &Request::Commit), 0);
    assert_eq!(server.statements().len(), 1);
    assert_eq!(client.pool().status().idle, 1);
    assert_eq!(server.connections_opened(), 1);
}

#[tokio::test]
async fn test_remove_commit_failure_keeps_statements() {
    let (server, client) = setup(1, 1).await;
    client
        .insert(TripleInput::new("http://ex/a", "http://ex/p", "x"))
        .await
        .unwrap();
    server.fail_next(FaultPoint::Commit);

    assert!(client.remove(RemovePattern::any()).await.is_err());
    assert_eq!(server.statements().len(), 1);
    assert_eq!(client.pool().status().idle, 1);
}

// ── Cancellation and recovery ────────────────────────────────────

#[tokio::test]
async fn test_cancelled_write_never_leaks_its_transaction() {
    let (server, client) = setup(0, 1).await;
    server.delay_next(FaultPoint::Add, Duration::from_secs(5));

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        client.insert(TripleInput::new("http://ex/a", "http://ex/p", "x")),
    )
    .await;
    assert!(cancelled.is_err());

    // The connection that was mid-transaction is gone, not idle.
    let status = client.pool().status();
    assert_eq!(status.idle, 0);
    assert_eq!(status.busy, 0);

    client
        .insert(TripleInput::new("http://ex/b", "http://ex/p", "y"))
        .await
        .unwrap();
    assert_eq!(server.connections_opened(), 2);
    assert_eq!(server.statements().len(), 1);
    assert_eq!(server.statements()[0].subject.as_str(), "http://ex/b");
}

#[tokio::test]
async fn test_cancelled_update_discards_connection() {
    let (server, client) = setup(0, 1).await;
    server.delay_next(FaultPoint::Commit, Duration::from_secs(5));

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        client.update("DELETE WHERE { ?s ?p ?o }"),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(client.pool().status().idle, 0);

    client.update("DELETE WHERE { ?s ?p ?o }").await.unwrap();
    assert_eq!(server.connections_opened(), 2);
}

#[tokio::test]
async fn test_pool_refills_to_min_size_after_discard() {
    let (server, client) = setup(2, 2).await;
    let mut conn = client.pool().acquire().await.unwrap();
    conn.poison();
    drop(conn);

    for _ in 0..5 {
        client
            .with_connection(|_conn| async move { Ok(()) })
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let status = client.pool().status();
    assert_eq!(status.idle, 2);
    assert_eq!(status.busy, 0);
    assert_eq!(server.connections_opened(), 3);
}

#[tokio::test]
async fn test_pool_refills_once_server_comes_back() {
    let server = MemoryConnector::new();
    server.refuse_connections(true);
    let client = TripleStoreClient::connect(config(2, 3), server.clone())
        .await
        .unwrap();
    assert_eq!(client.pool().status().idle, 0);

    server.refuse_connections(false);
    client
        .with_connection(|_conn| async move { Ok(()) })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let status = client.pool().status();
    assert_eq!(status.idle, 2);
    assert!(server.peak_connections() <= 3);
}

#[tokio::test]
async fn test_connect_failure_frees_capacity() {
    let (server, client) = setup(0, 1).await;
    server.refuse_connections(true);

    let err = client
        .with_connection(|_conn| async move { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionFailure { .. }));
    assert_eq!(client.pool().status().busy, 0);

    server.refuse_connections(false);
    server.fail_next(FaultPoint::Connect);
    assert!(matches!(
        client.pool().acquire().await,
        Err(ClientError::ConnectionFailure { .. })
    ));

    // Both failures gave their slot back: max_size 1 still admits a caller.
    let conn = client.pool().acquire().await.unwrap();
    drop(conn);
    assert_eq!(client.pool().status().idle, 1);
    assert_eq!(server.connections_opened(), 1);
}

#[tokio::test]
async fn test_row_wider_than_variables_is_rejected() {
    let (server, client) = setup(1, 1).await;
    server.respond_to(
        "SELECT ?s",
        &["s"],
        vec![vec![RdfValue::plain("a"), RdfValue::plain("extra")]],
    );

    let err = client.select("SELECT ?s").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::ConversionFailure(trellis_core::ValueError::Shape(_))
    ));
    assert_eq!(count_requests(&server, &Request::CursorClosed), 1);
    assert_eq!(client.pool().status().idle, 1);
}
