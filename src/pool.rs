//! Per-endpoint connection pooling.
//!
//! One [`ConnectionManager`] exists per distinct endpoint for the life of
//! the process, created lazily by the [`PoolRegistry`]. Each manager keeps
//! a free list and a live-connection count behind one async mutex, with a
//! notifier standing in for the condition variable: release wakes exactly
//! one waiter, and woken waiters re-check state before proceeding.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::config::{ClientConfig, Endpoint};
use crate::connection::Connection;
use crate::errors::{Error, Result};

/// Snapshot of one endpoint pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Live connections, both checked out and pooled
    pub total: usize,
    /// Connections currently sitting in the free list
    pub free: usize,
}

struct PoolState {
    total: usize,
    free: VecDeque<Connection>,
}

/// Pool of reusable connections to a single endpoint.
pub struct ConnectionManager {
    endpoint: Endpoint,
    config: Arc<ClientConfig>,
    state: Mutex<PoolState>,
    released: Notify,
}

impl ConnectionManager {
    fn new(endpoint: Endpoint, config: Arc<ClientConfig>) -> Self {
        Self {
            endpoint,
            config,
            state: Mutex::new(PoolState {
                total: 0,
                free: VecDeque::new(),
            }),
            released: Notify::new(),
        }
    }

    /// Checks a connection out of the pool.
    ///
    /// Pooled connections that failed their last use or sat idle past the
    /// limit are destroyed and the search continues. Connections flagged
    /// for a liveness re-check are probed first; probe failure destroys
    /// them. With the free list empty, a new transport is opened if the
    /// per-endpoint cap allows, otherwise the acquire waits for a release
    /// up to the max wait time and then fails with `PoolExhausted`.
    pub async fn acquire(&self) -> Result<Connection> {
        let limits = &self.config.pool;
        let deadline = tokio::time::Instant::now() + limits.max_wait_time;
        loop {
            let released = self.released.notified();
            {
                let mut state = self.state.lock().await;
                while let Some(mut conn) = state.free.pop_front() {
                    if conn.is_broken() || conn.idle_for() > limits.max_idle_time {
                        state.total -= 1;
                        continue;
                    }
                    if conn.needs_active_test() {
                        match conn.active_test().await {
                            Ok(()) => {
                                conn.set_needs_active_test(false);
                                return Ok(conn);
                            }
                            Err(err) => {
                                debug!(
                                    endpoint = %self.endpoint,
                                    error = %err,
                                    "liveness probe failed, dropping pooled connection"
                                );
                                state.total -= 1;
                                continue;
                            }
                        }
                    }
                    return Ok(conn);
                }

                if limits.max_per_endpoint == 0 || state.total < limits.max_per_endpoint {
                    // reserve the slot before connecting so the cap holds
                    state.total += 1;
                    drop(state);
                    match Connection::open(&self.endpoint, &self.config).await {
                        Ok(conn) => return Ok(conn),
                        Err(err) => {
                            self.state.lock().await.total -= 1;
                            self.released.notify_one();
                            return Err(err);
                        }
                    }
                }
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                return Err(Error::PoolExhausted {
                    endpoint: self.endpoint.to_string(),
                    waited: limits.max_wait_time,
                });
            }
        }
    }

    /// Returns a connection after a clean exchange and wakes one waiter.
    pub async fn release(&self, mut conn: Connection) {
        conn.touch();
        let mut state = self.state.lock().await;
        state.free.push_back(conn);
        drop(state);
        self.released.notify_one();
    }

    /// Destroys a connection after a transport failure.
    ///
    /// Every connection still sitting in the free list is flagged for a
    /// liveness re-check on its next acquire; one node dropping a
    /// connection usually means it dropped them all.
    pub async fn discard(&self, conn: Connection) {
        let mut state = self.state.lock().await;
        state.total = state.total.saturating_sub(1);
        for pooled in state.free.iter_mut() {
            pooled.set_needs_active_test(true);
        }
        drop(state);
        drop(conn);
        self.released.notify_one();
    }

    /// Current pool counters.
    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        PoolStats {
            total: state.total,
            free: state.free.len(),
        }
    }
}

/// Process-wide map from endpoint to its [`ConnectionManager`].
pub struct PoolRegistry {
    config: Arc<ClientConfig>,
    managers: StdMutex<HashMap<Endpoint, Arc<ConnectionManager>>>,
}

impl PoolRegistry {
    /// Creates an empty registry bound to one configuration.
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            config,
            managers: StdMutex::new(HashMap::new()),
        }
    }

    /// Returns the manager for an endpoint, creating it on first use.
    ///
    /// Concurrent first use of the same endpoint creates exactly one
    /// manager; the map is only locked for the insert-if-absent.
    pub fn manager(&self, endpoint: &Endpoint) -> Arc<ConnectionManager> {
        let mut managers = self
            .managers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        managers
            .entry(endpoint.clone())
            .or_insert_with(|| {
                Arc::new(ConnectionManager::new(endpoint.clone(), self.config.clone()))
            })
            .clone()
    }

    /// Checks a connection out for an endpoint, or opens a fresh transport
    /// when pooling is disabled.
    pub async fn acquire(&self, endpoint: &Endpoint) -> Result<Connection> {
        if !self.config.pool.enabled {
            return Connection::open(endpoint, &self.config).await;
        }
        self.manager(endpoint).acquire().await
    }

    /// Returns a connection to its endpoint pool; with pooling disabled the
    /// connection is simply closed.
    pub async fn release(&self, conn: Connection) {
        if !self.config.pool.enabled {
            return;
        }
        let endpoint = conn.endpoint().clone();
        self.manager(&endpoint).release(conn).await;
    }

    /// Destroys a connection after a transport failure.
    pub async fn discard(&self, conn: Connection) {
        if !self.config.pool.enabled {
            return;
        }
        let endpoint = conn.endpoint().clone();
        warn!(endpoint = %endpoint, "closing connection after transport failure");
        self.manager(&endpoint).discard(conn).await;
    }

    /// Routes a finished exchange's connection back to the pool: protocol
    /// and transport failures destroy it, everything else releases it.
    pub(crate) async fn settle<T>(&self, conn: Connection, result: Result<T>) -> Result<T> {
        match &result {
            Err(err) if err.poisons_connection() => self.discard(conn).await,
            _ => self.release(conn).await,
        }
        result
    }
}
