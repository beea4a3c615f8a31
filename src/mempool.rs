use std::collections::HashSet;

use crate::types::PriorityTransaction;

/// Unordered pool of pending priority transactions. Admission rate is the
/// caller's problem; the pool itself is unbounded.
#[derive(Default, Debug)]
pub struct PriorityMempool {
    pending: Vec<PriorityTransaction>,
    seen: HashSet<String>,
}

impl PriorityMempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a transaction. Re-broadcast copies of an already-seen id are
    /// ignored; returns whether the pool accepted the transaction.
    pub fn insert(&mut self, tx: PriorityTransaction) -> bool {
        if !self.seen.insert(tx.id.clone()) {
            return false;
        }
        self.pending.push(tx);
        true
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Evicts transactions that were packed into a committed block; every
    /// node prunes its own pool copy this way.
    pub fn remove_ids(&mut self, ids: &[String]) {
        self.pending.retain(|tx| !ids.contains(&tx.id));
    }

    /// Removes and returns up to `k` transactions in non-increasing
    /// urgency. Ties break on earlier arrival, then lexicographic id, so
    /// every proposer packs the same block from the same pool.
    pub fn drain_top_k(&mut self, k: usize) -> Vec<PriorityTransaction> {
        self.pending.sort_by(|a, b| {
            b.urgency
                .total_cmp(&a.urgency)
                .then_with(|| a.arrived_at.total_cmp(&b.arrived_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        let take = k.min(self.pending.len());
        self.pending.drain(..take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UrgencyParams;

    fn tx_with_urgency(urgency: f64, arrived_at: f64) -> PriorityTransaction {
        let mut tx = PriorityTransaction::new(
            "7".into(),
            Vec::new(),
            0.0,
            arrived_at,
            arrived_at + 5.0,
            0,
            &UrgencyParams::default(),
        );
        tx.urgency = urgency;
        tx
    }

    #[test]
    fn drains_top_k_in_non_increasing_urgency() {
        let mut pool = PriorityMempool::new();
        for urgency in [0.1, 5.0, 2.0, 9.0, 9.0, 3.0] {
            assert!(pool.insert(tx_with_urgency(urgency, 1.0)));
        }
        assert_eq!(pool.len(), 6);

        let drained = pool.drain_top_k(3);
        let urgencies: Vec<f64> = drained.iter().map(|tx| tx.urgency).collect();
        assert_eq!(urgencies, vec![9.0, 9.0, 5.0]);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn drain_returns_at_most_pool_size() {
        let mut pool = PriorityMempool::new();
        pool.insert(tx_with_urgency(1.0, 1.0));
        let drained = pool.drain_top_k(5);
        assert_eq!(drained.len(), 1);
        assert!(pool.is_empty());
        assert!(pool.drain_top_k(5).is_empty());
    }

    #[test]
    fn ties_break_on_arrival_then_id() {
        let mut pool = PriorityMempool::new();
        let late = tx_with_urgency(4.0, 9.0);
        let early = tx_with_urgency(4.0, 1.0);
        let mut early_twin = tx_with_urgency(4.0, 1.0);
        early_twin.id = "zzz".into();
        let mut early_first = early.clone();
        early_first.id = "aaa".into();
        pool.insert(late.clone());
        pool.insert(early_twin);
        pool.insert(early_first);

        let drained = pool.drain_top_k(3);
        assert_eq!(drained[0].id, "aaa");
        assert_eq!(drained[1].id, "zzz");
        assert_eq!(drained[2].id, late.id);
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let mut pool = PriorityMempool::new();
        let tx = tx_with_urgency(1.0, 1.0);
        assert!(pool.insert(tx.clone()));
        assert!(!pool.insert(tx));
        assert_eq!(pool.len(), 1);
    }
}
