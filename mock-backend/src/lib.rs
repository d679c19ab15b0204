//! An in-memory transactional backend with scripted behavior, used to
//! exercise the engine without a real database.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use txbench::core::{BackendFault, TransactionDef, TransactionStatus, TransactionType, WorkError};
use txbench::{Connection, Workload};

/// What the backend does when asked to execute one transaction type.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Commit after the given think time.
    Succeed(Duration),
    /// Raise a user abort every time.
    Abort,
    /// Report a Postgres-style serialization conflict (transient under the
    /// builtin fault table) for the first `failures` attempts, then commit.
    Conflict { failures: u64 },
    /// Raise a fault no table recognizes.
    Unknown,
    /// Ask for a different transaction every time.
    Bounce,
}

struct TypeSpec {
    def: TransactionDef,
    behavior: Behavior,
    attempts: AtomicU64,
}

struct Inner {
    types: Vec<TypeSpec>,
    connections: AtomicUsize,
    closed: AtomicUsize,
    rollbacks: AtomicU64,
    executed: AtomicU64,
}

pub struct MockBackendBuilder {
    types: Vec<TypeSpec>,
}

impl MockBackendBuilder {
    pub fn transaction(mut self, name: &str, behavior: Behavior) -> Self {
        self.types.push(TypeSpec {
            def: TransactionDef::new(name),
            behavior,
            attempts: AtomicU64::new(0),
        });
        self
    }

    pub fn supplemental(mut self, name: &str) -> Self {
        self.types.push(TypeSpec {
            def: TransactionDef::supplemental(name),
            behavior: Behavior::Succeed(Duration::ZERO),
            attempts: AtomicU64::new(0),
        });
        self
    }

    pub fn finish(self) -> MockBackend {
        MockBackend {
            inner: Arc::new(Inner {
                types: self.types,
                connections: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                rollbacks: AtomicU64::new(0),
                executed: AtomicU64::new(0),
            }),
        }
    }
}

/// The backend itself. Clones share counters, so tests can keep a handle
/// for assertions while the engine owns another.
#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<Inner>,
}

impl MockBackend {
    pub fn builder() -> MockBackendBuilder {
        MockBackendBuilder { types: Vec::new() }
    }

    /// Sessions opened over the backend's lifetime.
    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::Relaxed)
    }

    /// Sessions released by their workers.
    pub fn closed(&self) -> usize {
        self.inner.closed.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.inner.rollbacks.load(Ordering::Relaxed)
    }

    /// Total execute calls across all types.
    pub fn executed(&self) -> u64 {
        self.inner.executed.load(Ordering::Relaxed)
    }

    /// Execute calls for one type.
    pub fn attempts(&self, name: &str) -> u64 {
        self.inner
            .types
            .iter()
            .find(|spec| spec.def.name == name)
            .map(|spec| spec.attempts.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

pub struct MockSession {
    inner: Arc<Inner>,
}

impl Connection for MockSession {
    async fn rollback(&mut self) -> Result<(), BackendFault> {
        self.inner.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) {
        self.inner.closed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Workload for MockBackend {
    type Conn = MockSession;

    fn transactions(&self) -> Vec<TransactionDef> {
        self.inner.types.iter().map(|spec| spec.def.clone()).collect()
    }

    async fn connect(&self, _worker: usize) -> Result<Self::Conn, WorkError> {
        self.inner.connections.fetch_add(1, Ordering::Relaxed);
        Ok(MockSession {
            inner: Arc::clone(&self.inner),
        })
    }

    async fn setup(&self, _conn: &mut Self::Conn, _worker: usize) -> Result<(), WorkError> {
        Ok(())
    }

    async fn execute(
        &self,
        _conn: &mut Self::Conn,
        tx: &TransactionType,
    ) -> Result<TransactionStatus, WorkError> {
        self.inner.executed.fetch_add(1, Ordering::Relaxed);
        let spec = self
            .inner
            .types
            .iter()
            .find(|spec| spec.def.name == tx.name())
            .ok_or_else(|| {
                WorkError::Backend(BackendFault::new(-1, "42000", "unknown transaction type"))
            })?;
        let attempt = spec.attempts.fetch_add(1, Ordering::Relaxed) + 1;

        match &spec.behavior {
            Behavior::Succeed(delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(TransactionStatus::Success)
            }
            Behavior::Abort => Err(WorkError::UserAbort("declined by business rule".to_string())),
            Behavior::Conflict { failures } => {
                if attempt <= *failures {
                    Err(WorkError::Backend(BackendFault::new(
                        0,
                        "40001",
                        "serialization conflict",
                    )))
                } else {
                    Ok(TransactionStatus::Success)
                }
            }
            Behavior::Unknown => Err(WorkError::Backend(BackendFault::new(
                99_999,
                "XX000",
                "backend exploded",
            ))),
            Behavior::Bounce => Ok(TransactionStatus::RetryDifferent),
        }
    }

    async fn teardown(&self, _conn: &mut Self::Conn, _worker: usize) {}
}
