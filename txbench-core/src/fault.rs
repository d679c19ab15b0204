use std::collections::HashSet;

/// Backend failure surfaced by a workload, carrying the vendor's error and
/// state codes the classification table is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backend fault [{code}/{state}]: {message}")]
pub struct BackendFault {
    pub code: i32,
    pub state: String,
    pub message: String,
}

impl BackendFault {
    pub fn new(code: i32, state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            state: state.into(),
            message: message.into(),
        }
    }
}

/// Failure raised by a workload entry point.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    /// Business-rule rejection raised by transaction logic. Rolled back and
    /// counted; never escalated.
    #[error("user abort: {0}")]
    UserAbort(String),
    #[error(transparent)]
    Backend(#[from] BackendFault),
}

/// Classification of backend faults into retryable and fatal, keyed by the
/// vendor's (error code, state code) pair.
///
/// This is data, not logic: the retry loop only ever asks `is_transient`,
/// so supporting another dialect means adding entries, not branches.
#[derive(Debug, Clone)]
pub struct FaultTable {
    transient: HashSet<(i32, String)>,
}

impl FaultTable {
    /// A table that recognizes nothing; every backend fault is fatal.
    pub fn empty() -> Self {
        Self {
            transient: HashSet::new(),
        }
    }

    /// Entries for the supported dialects: MySQL deadlock and lock wait
    /// timeout, SQL Server deadlock victim, Postgres serialization failure,
    /// Oracle serialization conflict.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.mark_transient(1213, "40001");
        table.mark_transient(1205, "4100");
        table.mark_transient(1205, "40001");
        table.mark_transient(0, "40001");
        table.mark_transient(8177, "72000");
        table
    }

    pub fn mark_transient(&mut self, code: i32, state: impl Into<String>) {
        self.transient.insert((code, state.into()));
    }

    pub fn is_transient(&self, fault: &BackendFault) -> bool {
        self.transient
            .contains(&(fault.code, fault.state.clone()))
    }
}

impl Default for FaultTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_recognizes_the_supported_dialects() {
        let table = FaultTable::builtin();
        assert!(table.is_transient(&BackendFault::new(1213, "40001", "deadlock")));
        assert!(table.is_transient(&BackendFault::new(1205, "4100", "lock wait timeout")));
        assert!(table.is_transient(&BackendFault::new(1205, "40001", "deadlock victim")));
        assert!(table.is_transient(&BackendFault::new(0, "40001", "serialization failure")));
        assert!(table.is_transient(&BackendFault::new(8177, "72000", "can't serialize access")));
    }

    #[test]
    fn unknown_codes_are_fatal() {
        let table = FaultTable::builtin();
        assert!(!table.is_transient(&BackendFault::new(99999, "XX000", "boom")));
        // Code and state must match as a pair.
        assert!(!table.is_transient(&BackendFault::new(1213, "4100", "mismatched pair")));
    }

    #[test]
    fn tables_are_extensible() {
        let mut table = FaultTable::empty();
        assert!(!table.is_transient(&BackendFault::new(7, "S1000", "custom")));
        table.mark_transient(7, "S1000");
        assert!(table.is_transient(&BackendFault::new(7, "S1000", "custom")));
    }
}
