//! Validator committee and the three-phase ordering protocol types.
//!
//! The committee is the reputation-top-N subset of nodes. It is refreshed
//! once its activity budget is spent, penalised for inactivity between
//! refreshes, and its highest-reputation member proposes priority blocks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{NodeId, PriorityBlock};

/// Byzantine budget for a committee of `n` members.
pub fn fault_budget(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Announce,
    Endorse,
    Commit,
}

/// Vote-protocol message exchanged between nodes. Broadcast semantics are
/// the transport's concern; the block rides along so late joiners can
/// append without a fetch round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusMessage {
    pub phase: Phase,
    pub block_hash: String,
    pub block: PriorityBlock,
    pub sender: NodeId,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Validator {
    pub id: NodeId,
    /// Reputation at selection time; stale until the next refresh.
    pub reputation: f64,
}

#[derive(Clone, Debug)]
pub struct Committee {
    validators: Vec<Validator>,
    group_size: usize,
    active_period: u64,
    current_round: u64,
    created_at: f64,
}

impl Committee {
    pub fn new(group_size: usize, active_period: u64) -> Self {
        Self {
            validators: Vec::new(),
            group_size,
            active_period,
            current_round: 0,
            created_at: 0.0,
        }
    }

    /// Rebuilds the member list from the highest-reputation candidates and
    /// restarts the activity budget.
    pub fn select(
        &mut self,
        candidates: &[NodeId],
        reputations: &BTreeMap<NodeId, f64>,
        now: f64,
    ) {
        let mut ranked = rank_candidates(candidates, reputations);
        ranked.truncate(self.group_size);
        debug!(
            members = ranked.len(),
            group_size = self.group_size,
            "selected validator committee"
        );
        self.validators = ranked;
        self.created_at = now;
        self.current_round = 0;
    }

    pub fn needs_refresh(&self) -> bool {
        self.current_round >= self.active_period || self.validators.is_empty()
    }

    pub fn increment_round(&mut self) {
        self.current_round += 1;
    }

    pub fn round(&self) -> u64 {
        self.current_round
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// Drops the listed members, then refills open seats from the ranked
    /// replenishment candidates.
    pub fn penalise(
        &mut self,
        inactive: &[NodeId],
        replenishment: &[NodeId],
        reputations: &BTreeMap<NodeId, f64>,
        now: f64,
    ) {
        self.validators
            .retain(|validator| !inactive.contains(&validator.id));
        let open_seats = self.group_size.saturating_sub(self.validators.len());
        if open_seats == 0 {
            return;
        }
        let replacements: Vec<Validator> = rank_candidates(replenishment, reputations)
            .into_iter()
            .filter(|candidate| !self.is_member(&candidate.id))
            .take(open_seats)
            .collect();
        if !replacements.is_empty() {
            debug!(replaced = replacements.len(), "replenished committee seats");
        }
        self.validators.extend(replacements);
        self.created_at = now;
    }

    /// The member with the highest stored reputation proposes the next
    /// block; reputation ties resolve to the lowest id.
    pub fn proposer(&self) -> Option<&Validator> {
        self.validators.iter().min_by(|a, b| {
            b.reputation
                .total_cmp(&a.reputation)
                .then_with(|| a.id.cmp(&b.id))
        })
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.validators.iter().any(|validator| validator.id == id)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.validators
            .iter()
            .map(|validator| validator.id.clone())
            .collect()
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn fault_budget(&self) -> usize {
        fault_budget(self.validators.len())
    }

    /// Endorse threshold `f + 1` over the current member count.
    pub fn endorse_quorum(&self) -> usize {
        self.fault_budget() + 1
    }

    /// Commit threshold `2f + 1` over the current member count.
    pub fn commit_quorum(&self) -> usize {
        2 * self.fault_budget() + 1
    }
}

fn rank_candidates(candidates: &[NodeId], reputations: &BTreeMap<NodeId, f64>) -> Vec<Validator> {
    let mut ranked: Vec<Validator> = candidates
        .iter()
        .filter_map(|id| {
            reputations.get(id).map(|score| Validator {
                id: id.clone(),
                reputation: *score,
            })
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.reputation
            .total_cmp(&a.reputation)
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<NodeId> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    fn scores(entries: &[(&str, f64)]) -> BTreeMap<NodeId, f64> {
        entries
            .iter()
            .map(|(id, score)| (id.to_string(), *score))
            .collect()
    }

    #[test]
    fn selects_exactly_the_top_n_by_reputation() {
        let mut committee = Committee::new(3, 5);
        let reputations = scores(&[
            ("1", 0.4),
            ("2", 0.9),
            ("3", 0.1),
            ("4", 0.7),
            ("5", 0.7),
        ]);
        committee.select(&ids(&["1", "2", "3", "4", "5"]), &reputations, 10.0);

        let members = committee.ids();
        assert_eq!(members, ids(&["2", "4", "5"]));
        assert_eq!(committee.round(), 0);
        assert_eq!(committee.created_at(), 10.0);
    }

    #[test]
    fn reputation_ties_resolve_by_ascending_id() {
        let mut committee = Committee::new(2, 5);
        let reputations = scores(&[("9", 0.5), ("2", 0.5), ("5", 0.5)]);
        committee.select(&ids(&["9", "2", "5"]), &reputations, 0.0);
        assert_eq!(committee.ids(), ids(&["2", "5"]));
    }

    #[test]
    fn refresh_cycle_matches_the_activity_budget() {
        let mut committee = Committee::new(2, 2);
        let reputations = scores(&[("1", 0.8), ("2", 0.6), ("3", 0.4)]);
        committee.select(&ids(&["1", "2", "3"]), &reputations, 0.0);
        assert!(!committee.needs_refresh());

        committee.increment_round();
        assert!(!committee.needs_refresh());
        committee.increment_round();
        assert!(committee.needs_refresh());

        committee.select(&ids(&["1", "2", "3"]), &reputations, 5.0);
        assert_eq!(committee.round(), 0);
        assert!(!committee.needs_refresh());
        assert_eq!(committee.len(), 2);
    }

    #[test]
    fn empty_committee_needs_refresh() {
        let committee = Committee::new(4, 10);
        assert!(committee.needs_refresh());
    }

    #[test]
    fn proposer_is_the_highest_reputation_member() {
        let mut committee = Committee::new(3, 5);
        let reputations = scores(&[("1", 0.3), ("2", 0.9), ("3", 0.5)]);
        committee.select(&ids(&["1", "2", "3"]), &reputations, 0.0);
        assert_eq!(committee.proposer().map(|v| v.id.as_str()), Some("2"));
    }

    #[test]
    fn penalise_removes_and_replenishes() {
        let mut committee = Committee::new(3, 5);
        let reputations = scores(&[("1", 0.9), ("2", 0.8), ("3", 0.7), ("4", 0.6), ("5", 0.5)]);
        committee.select(&ids(&["1", "2", "3"]), &reputations, 0.0);

        committee.penalise(&ids(&["2"]), &ids(&["4", "5"]), &reputations, 1.0);
        assert_eq!(committee.ids(), ids(&["1", "3", "4"]));
        assert!(committee.is_member("4"));
        assert!(!committee.is_member("2"));
    }

    #[test]
    fn penalise_without_candidates_shrinks_the_committee() {
        let mut committee = Committee::new(2, 5);
        let reputations = scores(&[("1", 0.9), ("2", 0.8)]);
        committee.select(&ids(&["1", "2"]), &reputations, 0.0);
        committee.penalise(&ids(&["1"]), &[], &reputations, 1.0);
        assert_eq!(committee.len(), 1);
    }

    #[test]
    fn byzantine_thresholds_follow_committee_size() {
        assert_eq!(fault_budget(4), 1);
        assert_eq!(fault_budget(7), 2);
        assert_eq!(fault_budget(0), 0);

        let mut committee = Committee::new(4, 5);
        let reputations = scores(&[("1", 0.9), ("2", 0.8), ("3", 0.7), ("4", 0.6)]);
        committee.select(&ids(&["1", "2", "3", "4"]), &reputations, 0.0);
        assert_eq!(committee.endorse_quorum(), 2);
        assert_eq!(committee.commit_quorum(), 3);
    }
}
