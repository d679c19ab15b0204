//! The pluggable boundary between the engine and a concrete workload.
//!
//! The engine treats "execute one transaction" as an opaque, possibly
//! failing operation: a workload supplies its transaction catalog, a
//! connection factory, and the execute entry point, and the engine drives
//! them from its worker loops.

use txbench_core::{BackendFault, TransactionDef, TransactionStatus, TransactionType, WorkError};

/// One backend session, owned by exactly one worker for its entire
/// lifetime. Sessions are never shared or pooled across workers.
#[trait_variant::make(Send)]
pub trait Connection: 'static {
    /// Roll back the transaction currently in flight. A rollback that
    /// itself fails leaves the session in an unknown state and is escalated
    /// as fatal.
    async fn rollback(&mut self) -> Result<(), BackendFault>;

    /// Release the session. Runs once, after the worker leaves its loop.
    async fn close(&mut self);
}

/// A transactional workload: the ordered transaction catalog, a connection
/// factory, and the execute entry point.
#[trait_variant::make(Send)]
pub trait Workload: Send + Sync + 'static {
    type Conn: Connection + Send;

    /// Transaction types served by this workload, in the order phase weight
    /// vectors refer to them.
    fn transactions(&self) -> Vec<TransactionDef>;

    /// Open the backend session for one worker.
    async fn connect(&self, worker: usize) -> Result<Self::Conn, WorkError>;

    /// Hook run once per worker, after connecting and before the run
    /// starts.
    async fn setup(&self, conn: &mut Self::Conn, worker: usize) -> Result<(), WorkError>;

    /// Execute one transaction of the given type on the worker's session.
    ///
    /// Raising [`WorkError::UserAbort`] marks an expected business-rule
    /// rejection; raising [`WorkError::Backend`] reports a backend fault
    /// that the engine classifies against its fault table.
    async fn execute(
        &self,
        conn: &mut Self::Conn,
        tx: &TransactionType,
    ) -> Result<TransactionStatus, WorkError>;

    /// Hook run once per worker, after it leaves the run loop.
    async fn teardown(&self, conn: &mut Self::Conn, worker: usize);
}
