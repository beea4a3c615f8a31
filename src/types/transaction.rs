use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::NodeId;

/// Weight applied to the number of priority transactions a sender already
/// issued inside the current window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct UrgencyParams {
    pub omega: f64,
}

impl Default for UrgencyParams {
    fn default() -> Self {
        Self { omega: 0.5 }
    }
}

/// Urgency of a priority transaction.
///
/// With `Tc = deadline - arrived` and `dTR = arrived - produced`, the base
/// score is `exp(-Tc / dTR)`; a transaction whose timing is inconsistent
/// (`dTR <= 0`) falls back to a low base of `0.1`. The sender's prior count
/// then compounds the score as `exp(omega * prior_count)`. Urgency is a
/// relative priority and may exceed 1.
pub fn urgency_degree(
    produced_at: f64,
    arrived_at: f64,
    deadline_at: f64,
    prior_count: u32,
    params: &UrgencyParams,
) -> f64 {
    let expected_delay = deadline_at - arrived_at;
    let transit = arrived_at - produced_at;
    let base = if transit > 0.0 {
        (-expected_delay / transit).exp()
    } else {
        0.1
    };
    base * (params.omega * f64::from(prior_count)).exp()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriorityTransaction {
    pub id: String,
    pub sender: NodeId,
    pub payload: Vec<u8>,
    /// Time the event was produced on the vehicle (tp, seconds).
    pub produced_at: f64,
    /// Time the transaction reached the ingress point (ta, seconds).
    pub arrived_at: f64,
    /// Deadline the sender expects completion by (td, seconds).
    pub deadline_at: f64,
    /// Priority transactions this sender already issued in the window.
    pub prior_count: u32,
    /// Computed once at ingress; immutable afterwards.
    pub urgency: f64,
}

impl PriorityTransaction {
    pub fn new(
        sender: NodeId,
        payload: Vec<u8>,
        produced_at: f64,
        arrived_at: f64,
        deadline_at: f64,
        prior_count: u32,
        params: &UrgencyParams,
    ) -> Self {
        let urgency = urgency_degree(produced_at, arrived_at, deadline_at, prior_count, params);
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            payload,
            produced_at,
            arrived_at,
            deadline_at,
            prior_count,
            urgency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> UrgencyParams {
        UrgencyParams { omega: 0.5 }
    }

    #[test]
    fn prior_count_strictly_increases_urgency() {
        let low = urgency_degree(0.0, 2.0, 10.0, 0, &params());
        let high = urgency_degree(0.0, 2.0, 10.0, 3, &params());
        assert!(high > low);
    }

    #[test]
    fn looser_deadline_strictly_decreases_urgency() {
        let tight = urgency_degree(0.0, 2.0, 6.0, 1, &params());
        let loose = urgency_degree(0.0, 2.0, 12.0, 1, &params());
        assert!(tight > loose);
    }

    #[test]
    fn inconsistent_timing_falls_back_to_low_base() {
        let urgency = urgency_degree(5.0, 2.0, 10.0, 0, &params());
        assert!((urgency - 0.1).abs() < 1e-12);
    }

    #[test]
    fn urgency_is_finite_and_non_negative() {
        let urgency = urgency_degree(0.0, 1.0, 1.5, 4, &params());
        assert!(urgency.is_finite());
        assert!(urgency >= 0.0);
    }

    #[test]
    fn constructor_stamps_urgency_and_unique_id() {
        let a = PriorityTransaction::new("7".into(), vec![1], 0.0, 2.0, 10.0, 0, &params());
        let b = PriorityTransaction::new("7".into(), vec![1], 0.0, 2.0, 10.0, 0, &params());
        assert_ne!(a.id, b.id);
        assert!((a.urgency - urgency_degree(0.0, 2.0, 10.0, 0, &params())).abs() < 1e-12);
    }
}
