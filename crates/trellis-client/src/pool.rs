//! Bounded connection pool for one server endpoint.
//!
//! Capacity is a semaphore with `max_size` permits: every checked-out
//! connection holds one permit, so outstanding connections never exceed
//! `max_size`. Idle/busy bookkeeping sits behind a synchronous mutex so
//! that release (including release from `Drop`) never waits on I/O.
//!
//! Connections lost to failures are replaced in the background, so that a
//! quiescent pool holds at least `min_size` connections whenever the server
//! is reachable.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use trellis_core::{ConfigError, PoolConfig};

use crate::error::{ClientError, Result};
use crate::transport::{Connection, Connector};

/// Largest accepted `max_size`: the semaphore limit, and `close` drains
/// every permit in one `u32` request.
const MAX_POOL_SIZE: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS
} else {
    u32::MAX as usize
};

/// Pool-local identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Snapshot of pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub busy: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub closed: bool,
}

struct IdleConnection {
    id: ConnectionId,
    conn: Box<dyn Connection>,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<IdleConnection>,
    busy: HashSet<ConnectionId>,
    /// Checked-out handles that must not return to the idle set.
    poisoned: HashSet<ConnectionId>,
    /// Connects in flight, from `acquire` or background replenishment.
    opening: usize,
    closed: bool,
}

impl PoolState {
    fn live(&self) -> usize {
        self.idle.len() + self.busy.len() + self.opening
    }
}

struct PoolInner {
    id: Uuid,
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
}

impl PoolInner {
    async fn open(&self) -> Result<(ConnectionId, Box<dyn Connection>)> {
        let conn = self
            .connector
            .connect(&self.config)
            .await
            .map_err(|source| ClientError::ConnectionFailure {
                endpoint: self.config.endpoint.clone(),
                source,
            })?;
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(connection = %id, endpoint = %self.config.endpoint, "Opened connection");
        Ok((id, conn))
    }

    /// Take a connection back from a guard. Returns whether the handle was
    /// checked out from this pool.
    fn check_in(&self, id: ConnectionId, conn: Box<dyn Connection>, poisoned: bool) -> bool {
        let discarded = {
            let mut state = self.state.lock();
            let known = state.busy.remove(&id);
            let poisoned = state.poisoned.remove(&id) || poisoned;
            if known && !state.closed && !poisoned && conn.is_healthy() {
                state.idle.push_back(IdleConnection { id, conn });
                tracing::debug!(connection = %id, idle = state.idle.len(), "Released connection");
                return true;
            }
            (known, poisoned, conn)
        };

        let (known, poisoned, conn) = discarded;
        tracing::debug!(connection = %id, known, poisoned, "Discarding connection");
        discard(id, conn);
        known
    }

    /// Top the pool back up to `min_size` in the background.
    ///
    /// Needs a runtime; without one the pool refills lazily on acquire.
    fn replenish(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let deficit = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            let deficit = self.config.min_size.saturating_sub(state.live());
            state.opening += deficit;
            deficit
        };
        if deficit > 0 {
            tracing::debug!(deficit, min_size = self.config.min_size, "Replenishing pool");
            handle.spawn(Arc::clone(self).refill(deficit));
        }
    }

    /// Open up to `reserved` idle connections. Each was counted in
    /// `opening` by the caller.
    async fn refill(self: Arc<Self>, mut reserved: usize) {
        while reserved > 0 {
            // Holding a permit while connecting keeps live connections
            // within max_size.
            let Some(permit) = self.claim_refill_slot() else {
                break;
            };
            let opened = self.open().await;
            reserved -= 1;
            let keep_going = self.settle_refill(opened);
            drop(permit);
            if !keep_going {
                break;
            }
        }
        if reserved > 0 {
            self.state.lock().opening -= reserved;
        }
    }

    fn claim_refill_slot(&self) -> Option<OwnedSemaphorePermit> {
        let state = self.state.lock();
        // Our own reservation is part of `opening`.
        if state.closed || state.live() > self.config.min_size {
            return None;
        }
        drop(state);
        Arc::clone(&self.permits).try_acquire_owned().ok()
    }

    fn settle_refill(&self, opened: Result<(ConnectionId, Box<dyn Connection>)>) -> bool {
        let mut state = self.state.lock();
        state.opening -= 1;
        match opened {
            Ok((id, conn)) if !state.closed => {
                state.idle.push_back(IdleConnection { id, conn });
                tracing::debug!(connection = %id, idle = state.idle.len(), "Replenished idle connection");
                true
            }
            Ok((id, conn)) => {
                drop(state);
                discard(id, conn);
                false
            }
            Err(e) => {
                drop(state);
                tracing::warn!(
                    endpoint = %self.config.endpoint,
                    error = %e,
                    "Could not replenish connection pool"
                );
                false
            }
        }
    }
}

/// A connect counted in `PoolState::opening`. Uncounted on drop, which
/// also covers a cancelled acquire.
struct Opening<'a>(&'a PoolInner);

impl Drop for Opening<'_> {
    fn drop(&mut self) {
        self.0.state.lock().opening -= 1;
    }
}

/// Close a connection that will not be reused.
///
/// Closing is async, so it runs on a spawned task when a runtime is
/// available; otherwise the connection is simply dropped.
fn discard(id: ConnectionId, mut conn: Box<dyn Connection>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = conn.close().await {
                    tracing::debug!(connection = %id, error = %e, "Close of discarded connection failed");
                }
            });
        }
        Err(_) => drop(conn),
    }
}

/// Thread-safe connection pool. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool and eagerly open `min_size` connections.
    ///
    /// Startup connections are best-effort: a failure is logged and the
    /// pool starts with whatever it managed to open, since the server may
    /// come up later.
    pub async fn new<C: Connector>(config: PoolConfig, connector: C) -> Result<Self> {
        Self::with_connector(config, Arc::new(connector)).await
    }

    pub async fn with_connector(config: PoolConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        if config.max_size > MAX_POOL_SIZE {
            return Err(ConfigError::PoolTooLarge {
                max_size: config.max_size,
                limit: MAX_POOL_SIZE,
            }
            .into());
        }

        let inner = Arc::new(PoolInner {
            id: Uuid::new_v4(),
            permits: Arc::new(Semaphore::new(config.max_size)),
            config,
            connector,
            state: Mutex::new(PoolState::default()),
            next_id: AtomicU64::new(1),
        });

        let mut opened = VecDeque::with_capacity(inner.config.min_size);
        for _ in 0..inner.config.min_size {
            match inner.open().await {
                Ok((id, conn)) => opened.push_back(IdleConnection { id, conn }),
                Err(e) => {
                    tracing::warn!(
                        endpoint = %inner.config.endpoint,
                        opened = opened.len(),
                        min_size = inner.config.min_size,
                        error = %e,
                        "Could not open minimum connections at startup"
                    );
                    break;
                }
            }
        }
        let idle = opened.len();
        inner.state.lock().idle = opened;

        tracing::info!(
            endpoint = %inner.config.endpoint,
            database = %inner.config.database,
            idle,
            max_size = inner.config.max_size,
            "Connection pool ready"
        );
        Ok(Self { inner })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            busy: state.busy.len(),
            min_size: self.inner.config.min_size,
            max_size: self.inner.config.max_size,
            closed: state.closed,
        }
    }

    /// Check out a connection, waiting up to `acquire_timeout` for capacity.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        if self.inner.state.lock().closed {
            return Err(ClientError::PoolClosed);
        }

        let waited = self.inner.config.acquire_timeout();
        let permit =
            match tokio::time::timeout(waited, self.inner.permits.clone().acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(ClientError::PoolClosed),
                Err(_) => {
                    tracing::warn!(
                        endpoint = %self.inner.config.endpoint,
                        max_size = self.inner.config.max_size,
                        "Timed out waiting for a connection"
                    );
                    return Err(ClientError::PoolExhausted {
                        max_size: self.inner.config.max_size,
                        waited,
                    });
                }
            };

        let reused = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(ClientError::PoolClosed);
            }
            let mut reused = None;
            let mut stale = Vec::new();
            while let Some(idle) = state.idle.pop_front() {
                if idle.conn.is_healthy() {
                    state.busy.insert(idle.id);
                    reused = Some(idle);
                    break;
                }
                stale.push(idle);
            }
            if reused.is_none() {
                state.opening += 1;
            }
            drop(state);
            for idle in stale {
                tracing::debug!(connection = %idle.id, "Dropping unhealthy idle connection");
                discard(idle.id, idle.conn);
            }
            reused
        };

        let (id, conn) = match reused {
            Some(idle) => (idle.id, idle.conn),
            None => {
                // The permit guarantees room for one more live connection.
                let reservation = Opening(&self.inner);
                let opened = self.inner.open().await;
                drop(reservation);
                let (id, conn) = opened?;
                self.inner.state.lock().busy.insert(id);
                (id, conn)
            }
        };
        self.inner.replenish();

        tracing::debug!(connection = %id, "Acquired connection");
        Ok(PooledConnection {
            id,
            pool_id: self.inner.id,
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            permit: Some(permit),
            poisoned: false,
            in_transaction: false,
        })
    }

    /// Mark a checked-out handle so that it is discarded on release.
    pub(crate) fn poison(&self, id: ConnectionId) {
        let mut state = self.inner.state.lock();
        if state.busy.contains(&id) {
            state.poisoned.insert(id);
        }
    }

    /// Return a connection to the pool.
    ///
    /// Fails with `InvalidHandle` if the guard belongs to a different pool
    /// or its handle is not checked out here; this pool's idle set is left
    /// untouched in both cases.
    pub fn release(&self, mut conn: PooledConnection) -> Result<()> {
        let handle = conn.id;
        if conn.pool_id != self.inner.id {
            // Dropping the guard returns it to the pool it came from.
            return Err(ClientError::InvalidHandle {
                handle,
                reason: "handle belongs to another pool",
            });
        }
        if conn.check_in() {
            Ok(())
        } else {
            Err(ClientError::InvalidHandle {
                handle,
                reason: "handle is not checked out",
            })
        }
    }

    /// Shut the pool down.
    ///
    /// New acquires fail with `PoolClosed`. Outstanding connections are
    /// given up to `acquire_timeout` to come back; then every idle
    /// connection is closed. Returns how many connections were closed.
    pub async fn close(&self) -> usize {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
        }
        tracing::info!(endpoint = %self.inner.config.endpoint, "Closing connection pool");

        let all = u32::try_from(self.inner.config.max_size).unwrap_or(u32::MAX);
        let drained = tokio::time::timeout(
            self.inner.config.acquire_timeout(),
            self.inner.permits.clone().acquire_many_owned(all),
        )
        .await;
        if drained.is_err() {
            tracing::warn!(
                busy = self.inner.state.lock().busy.len(),
                "Connections still checked out at pool shutdown"
            );
        }
        self.inner.permits.close();

        let idle: Vec<IdleConnection> = self.inner.state.lock().idle.drain(..).collect();
        let closed = idle.len();
        for mut entry in idle {
            if let Err(e) = entry.conn.close().await {
                tracing::warn!(connection = %entry.id, error = %e, "Failed to close connection");
            }
        }

        tracing::info!(closed, "Connection pool closed");
        closed
    }
}

/// A checked-out connection. Returns itself to the pool when dropped.
///
/// Dereferences to the underlying [`Connection`].
pub struct PooledConnection {
    id: ConnectionId,
    pool_id: Uuid,
    conn: Option<Box<dyn Connection>>,
    pool: Arc<PoolInner>,
    permit: Option<OwnedSemaphorePermit>,
    poisoned: bool,
    /// A server transaction is open; set between begin and commit/rollback.
    in_transaction: bool,
}

impl PooledConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Mark the connection as unusable; it is discarded instead of being
    /// returned to the idle set.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Track whether a server transaction is open. A connection released
    /// mid-transaction is discarded, never reused.
    pub(crate) fn set_in_transaction(&mut self, open: bool) {
        self.in_transaction = open;
    }

    fn check_in(&mut self) -> bool {
        if self.in_transaction {
            tracing::warn!(connection = %self.id, "Connection released with an open transaction");
        }
        let discard = self.poisoned || self.in_transaction;
        let known = match self.conn.take() {
            Some(conn) => self.pool.check_in(self.id, conn, discard),
            None => false,
        };
        // Free capacity only after the bookkeeping is updated.
        self.permit.take();
        self.pool.replenish();
        known
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        // Only taken by check_in, which consumes or drops the guard.
        self.conn.as_deref().expect("connection already checked in")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("connection already checked in")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.poisoned = true;
        }
        self.check_in();
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("pool_id", &self.pool_id)
            .field("poisoned", &self.poisoned)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}
