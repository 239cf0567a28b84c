//! In-process transport backed by a shared statement set.
//!
//! No network and no query engine: reads are answered from result sets
//! registered per query text, and writes are buffered per transaction and
//! applied to an in-memory statement list on commit. Every request is
//! logged and faults can be injected at any step, which makes this the
//! harness for pool and transaction tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use trellis_core::{PoolConfig, RdfValue, ReasoningMode, Statement, StatementPattern};

use crate::transport::{Connection, Connector, Cursor, PreparedQuery, TransportError};

/// A step at which a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Connect,
    Select,
    Fetch,
    Update,
    Begin,
    Add,
    Remove,
    Commit,
    Rollback,
}

/// A request as received by the in-memory server.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Connect {
        database: String,
        username: Option<String>,
        reasoning: ReasoningMode,
    },
    Select(PreparedQuery),
    Update(PreparedQuery),
    Begin,
    Add(Vec<Statement>),
    Remove(StatementPattern),
    Commit,
    Rollback,
    CursorClosed,
    Close,
}

struct ResultSet {
    variables: Vec<String>,
    rows: Vec<Vec<RdfValue>>,
}

enum PendingWrite {
    Add(Vec<Statement>),
    Remove(StatementPattern),
}

#[derive(Default)]
struct MemoryState {
    statements: Vec<Statement>,
    results: HashMap<String, ResultSet>,
    log: Vec<Request>,
    faults: Vec<(FaultPoint, TransportError)>,
    delays: Vec<(FaultPoint, Duration)>,
    refuse: bool,
    open: usize,
    peak_open: usize,
    opened: usize,
}

impl MemoryState {
    fn take_fault(&mut self, point: FaultPoint) -> Option<TransportError> {
        let pos = self.faults.iter().position(|(p, _)| *p == point)?;
        Some(self.faults.remove(pos).1)
    }

    fn take_delay(&mut self, point: FaultPoint) -> Option<Duration> {
        let pos = self.delays.iter().position(|(p, _)| *p == point)?;
        Some(self.delays.remove(pos).1)
    }
}

/// In-process [`Connector`]. Clones share the same server state.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rows returned for the exact query `text`.
    pub fn respond_to(&self, text: &str, variables: &[&str], rows: Vec<Vec<RdfValue>>) {
        self.state.lock().results.insert(
            text.to_string(),
            ResultSet {
                variables: variables.iter().map(|v| v.to_string()).collect(),
                rows,
            },
        );
    }

    /// Make the next request at `point` fail with a server error.
    pub fn fail_next(&self, point: FaultPoint) {
        self.inject(
            point,
            TransportError::Server(format!("injected fault at {point:?}")),
        );
    }

    /// Make the next request at `point` drop the connection.
    pub fn disconnect_next(&self, point: FaultPoint) {
        self.inject(
            point,
            TransportError::Disconnected(format!("injected disconnect at {point:?}")),
        );
    }

    /// Make the next request at `point` take `by` before it is served.
    pub fn delay_next(&self, point: FaultPoint, by: Duration) {
        self.state.lock().delays.push((point, by));
    }

    pub fn inject(&self, point: FaultPoint, error: TransportError) {
        self.state.lock().faults.push((point, error));
    }

    /// Refuse (or accept again) new connections.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Committed statements, in insertion order.
    pub fn statements(&self) -> Vec<Statement> {
        self.state.lock().statements.clone()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().log.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().log.clear();
    }

    /// Connections currently open against this server.
    pub fn open_connections(&self) -> usize {
        self.state.lock().open
    }

    /// Highest number of simultaneously open connections seen.
    pub fn peak_connections(&self) -> usize {
        self.state.lock().peak_open
    }

    /// Total connections ever opened.
    pub fn connections_opened(&self) -> usize {
        self.state.lock().opened
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &PoolConfig) -> Result<Box<dyn Connection>, TransportError> {
        let mut state = self.state.lock();
        if state.refuse {
            return Err(TransportError::Unreachable(format!(
                "{} refused the connection",
                config.endpoint
            )));
        }
        if let Some(e) = state.take_fault(FaultPoint::Connect) {
            return Err(e);
        }

        state.log.push(Request::Connect {
            database: config.database.clone(),
            username: config.credentials.as_ref().map(|c| c.username.clone()),
            reasoning: config.reasoning,
        });
        state.open += 1;
        state.opened += 1;
        state.peak_open = state.peak_open.max(state.open);

        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            txn: None,
            healthy: true,
            closed: false,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    txn: Option<Vec<PendingWrite>>,
    healthy: bool,
    closed: bool,
}

impl MemoryConnection {
    async fn pause(&self, point: FaultPoint) {
        let delay = self.state.lock().take_delay(point);
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }
    }

    /// Log `request` and apply any fault injected at `point`.
    fn step(&mut self, point: FaultPoint, request: Request) -> Result<(), TransportError> {
        if self.closed || !self.healthy {
            return Err(TransportError::Disconnected("connection closed".to_string()));
        }
        let mut state = self.state.lock();
        state.log.push(request);
        match state.take_fault(point) {
            Some(e) => {
                if matches!(e, TransportError::Disconnected(_)) {
                    self.healthy = false;
                }
                Err(e)
            }
            None => Ok(()),
        }
    }

    fn pending(&mut self) -> Result<&mut Vec<PendingWrite>, TransportError> {
        self.txn
            .as_mut()
            .ok_or_else(|| TransportError::Server("no open transaction".to_string()))
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn select<'a>(
        &'a mut self,
        query: &PreparedQuery,
    ) -> Result<Box<dyn Cursor + 'a>, TransportError> {
        self.pause(FaultPoint::Select).await;
        self.step(FaultPoint::Select, Request::Select(query.clone()))?;
        let state = self.state.lock();
        let Some(results) = state.results.get(&query.text) else {
            return Err(TransportError::Server(format!(
                "no result set registered for query: {}",
                query.text
            )));
        };
        Ok(Box::new(MemoryCursor {
            state: Arc::clone(&self.state),
            variables: results.variables.clone(),
            rows: results.rows.iter().cloned().collect(),
            closed: false,
        }))
    }

    async fn update(&mut self, query: &PreparedQuery) -> Result<(), TransportError> {
        self.pause(FaultPoint::Update).await;
        self.step(FaultPoint::Update, Request::Update(query.clone()))
    }

    async fn begin(&mut self) -> Result<(), TransportError> {
        self.pause(FaultPoint::Begin).await;
        self.step(FaultPoint::Begin, Request::Begin)?;
        if self.txn.is_some() {
            return Err(TransportError::Server(
                "transaction already open".to_string(),
            ));
        }
        self.txn = Some(Vec::new());
        Ok(())
    }

    async fn add(&mut self, statements: &[Statement]) -> Result<(), TransportError> {
        self.pause(FaultPoint::Add).await;
        self.step(FaultPoint::Add, Request::Add(statements.to_vec()))?;
        self.pending()?.push(PendingWrite::Add(statements.to_vec()));
        Ok(())
    }

    async fn remove(&mut self, pattern: &StatementPattern) -> Result<(), TransportError> {
        self.pause(FaultPoint::Remove).await;
        self.step(FaultPoint::Remove, Request::Remove(pattern.clone()))?;
        self.pending()?.push(PendingWrite::Remove(pattern.clone()));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), TransportError> {
        self.pause(FaultPoint::Commit).await;
        self.step(FaultPoint::Commit, Request::Commit)?;
        let writes = std::mem::take(self.pending()?);
        self.txn = None;

        let mut state = self.state.lock();
        for write in writes {
            match write {
                PendingWrite::Add(statements) => {
                    for st in statements {
                        if !state.statements.contains(&st) {
                            state.statements.push(st);
                        }
                    }
                }
                PendingWrite::Remove(pattern) => {
                    state.statements.retain(|st| !pattern.matches(st));
                }
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TransportError> {
        self.pause(FaultPoint::Rollback).await;
        self.step(FaultPoint::Rollback, Request::Rollback)?;
        self.txn = None;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.healthy && !self.closed
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            let mut state = self.state.lock();
            state.open -= 1;
            state.log.push(Request::Close);
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.state.lock().open -= 1;
        }
    }
}

struct MemoryCursor {
    state: Arc<Mutex<MemoryState>>,
    variables: Vec<String>,
    rows: VecDeque<Vec<RdfValue>>,
    closed: bool,
}

impl MemoryCursor {
    fn mark_closed(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().log.push(Request::CursorClosed);
        }
    }
}

#[async_trait]
impl Cursor for MemoryCursor {
    fn variables(&self) -> &[String] {
        &self.variables
    }

    async fn next_row(&mut self) -> Result<Option<Vec<RdfValue>>, TransportError> {
        if let Some(e) = self.state.lock().take_fault(FaultPoint::Fetch) {
            return Err(e);
        }
        if self.closed {
            return Ok(None);
        }
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.mark_closed();
        Ok(())
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
