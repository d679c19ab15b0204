use crate::types::{TransactionRegistry, TypeId};

/// Success, retry, and abort tallies per transaction type, owned by one
/// worker while running and merged by the scheduler after the run.
#[derive(Debug, Clone, Default)]
pub struct TransactionCounts {
    success: Vec<u64>,
    retry: Vec<u64>,
    abort: Vec<u64>,
}

fn bump(tally: &mut Vec<u64>, id: TypeId) {
    if tally.len() <= id {
        tally.resize(id + 1, 0);
    }
    tally[id] += 1;
}

fn get(tally: &[u64], id: TypeId) -> u64 {
    tally.get(id).copied().unwrap_or(0)
}

fn merge_into(dst: &mut Vec<u64>, src: &[u64]) {
    if dst.len() < src.len() {
        dst.resize(src.len(), 0);
    }
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

impl TransactionCounts {
    pub fn for_registry(registry: &TransactionRegistry) -> Self {
        let n = registry.capacity();
        Self {
            success: vec![0; n],
            retry: vec![0; n],
            abort: vec![0; n],
        }
    }

    pub fn record_success(&mut self, id: TypeId) {
        bump(&mut self.success, id);
    }

    pub fn record_retry(&mut self, id: TypeId) {
        bump(&mut self.retry, id);
    }

    pub fn record_abort(&mut self, id: TypeId) {
        bump(&mut self.abort, id);
    }

    pub fn success(&self, id: TypeId) -> u64 {
        get(&self.success, id)
    }

    pub fn retry(&self, id: TypeId) -> u64 {
        get(&self.retry, id)
    }

    pub fn abort(&self, id: TypeId) -> u64 {
        get(&self.abort, id)
    }

    /// Completed attempts of one type, across all outcomes.
    pub fn attempts(&self, id: TypeId) -> u64 {
        self.success(id) + self.retry(id) + self.abort(id)
    }

    pub fn total_success(&self) -> u64 {
        self.success.iter().sum()
    }

    pub fn total_retry(&self) -> u64 {
        self.retry.iter().sum()
    }

    pub fn total_abort(&self) -> u64 {
        self.abort.iter().sum()
    }

    pub fn merge(&mut self, other: &TransactionCounts) {
        merge_into(&mut self.success, &other.success);
        merge_into(&mut self.retry, &other.retry);
        merge_into(&mut self.abort, &other.abort);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tallies_are_kept_per_type() {
        let mut counts = TransactionCounts::default();
        counts.record_success(1);
        counts.record_success(1);
        counts.record_retry(2);
        counts.record_abort(1);

        assert_eq!(counts.success(1), 2);
        assert_eq!(counts.retry(2), 1);
        assert_eq!(counts.abort(1), 1);
        assert_eq!(counts.attempts(1), 3);
        assert_eq!(counts.success(9), 0);
    }

    #[test]
    fn merge_adds_and_grows() {
        let mut a = TransactionCounts::default();
        a.record_success(1);

        let mut b = TransactionCounts::default();
        b.record_success(1);
        b.record_abort(4);

        a.merge(&b);
        assert_eq!(a.success(1), 2);
        assert_eq!(a.abort(4), 1);
        assert_eq!(a.total_success(), 2);
        assert_eq!(a.total_abort(), 1);
    }
}
