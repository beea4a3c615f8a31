//! Subjective-logic reputation engine.
//!
//! Every node appends the evidence it observes to its own interaction log
//! and scores peers on demand. A score blends direct opinions (weighted by
//! evidence volume, recency, trajectory similarity and transaction class),
//! indirect opinions discounted along bounded referral paths, and a final
//! consensus fusion of the two aggregates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ReputationParams;
use crate::errors::{ChainError, ChainResult};
use crate::types::{NodeId, TrajectoryVector};

pub const INITIAL_REPUTATION: f64 = 0.5;

const NORMAL_TX_WEIGHT: f64 = 1.0;
const PRIORITY_TX_BASE_WEIGHT: f64 = 3.0;
const URGENCY_IMPACT_FACTOR: f64 = 0.8;
const MAX_WEIGHT_MULTIPLIER: f64 = 8.0;

/// Maximum number of referral edges along an indirect-opinion path.
const MAX_OPINION_HOPS: usize = 2;

/// Evidence stamped further than this into the future is rejected at
/// ingress.
const MAX_FUTURE_SKEW_SECS: f64 = 600.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxClass {
    Normal,
    Priority,
}

impl TxClass {
    /// Multiplier applied to the direct-evidence weight. Priority traffic
    /// counts more the more urgent it was, capped so a single urgent
    /// transaction cannot dominate the log.
    pub fn weight_multiplier(self, urgency: f64) -> f64 {
        match self {
            TxClass::Normal => NORMAL_TX_WEIGHT,
            TxClass::Priority => {
                (PRIORITY_TX_BASE_WEIGHT * (1.0 + URGENCY_IMPACT_FACTOR * urgency))
                    .min(MAX_WEIGHT_MULTIPLIER)
            }
        }
    }
}

/// One evaluator-to-subject evidence record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Interaction {
    pub evaluator: NodeId,
    pub subject: NodeId,
    pub positive: u32,
    pub negative: u32,
    pub timestamp: f64,
    pub evaluator_trajectory: Vec<TrajectoryVector>,
    pub subject_trajectory: Vec<TrajectoryVector>,
    pub tx_class: TxClass,
    pub urgency: f64,
}

impl Interaction {
    pub fn normal(
        evaluator: NodeId,
        subject: NodeId,
        positive: u32,
        negative: u32,
        timestamp: f64,
        evaluator_trajectory: Vec<TrajectoryVector>,
        subject_trajectory: Vec<TrajectoryVector>,
    ) -> Self {
        Self {
            evaluator,
            subject,
            positive,
            negative,
            timestamp,
            evaluator_trajectory,
            subject_trajectory,
            tx_class: TxClass::Normal,
            urgency: 0.0,
        }
    }

    pub fn priority(
        evaluator: NodeId,
        subject: NodeId,
        positive: u32,
        negative: u32,
        timestamp: f64,
        urgency: f64,
    ) -> Self {
        Self {
            evaluator,
            subject,
            positive,
            negative,
            timestamp,
            evaluator_trajectory: Vec::new(),
            subject_trajectory: Vec::new(),
            tx_class: TxClass::Priority,
            urgency,
        }
    }

    fn validate(&self, now: f64) -> ChainResult<()> {
        if self.evaluator == self.subject {
            return Err(ChainError::Evidence(format!(
                "{} cannot evaluate itself",
                self.evaluator
            )));
        }
        if !self.timestamp.is_finite() || self.timestamp > now + MAX_FUTURE_SKEW_SECS {
            return Err(ChainError::Evidence(format!(
                "timestamp {} is malformed or too far in the future",
                self.timestamp
            )));
        }
        if !self.urgency.is_finite() || self.urgency < 0.0 {
            return Err(ChainError::Evidence(format!(
                "urgency {} out of range",
                self.urgency
            )));
        }
        if self.tx_class == TxClass::Normal && self.urgency != 0.0 {
            return Err(ChainError::Evidence(
                "normal-class evidence carries no urgency".to_string(),
            ));
        }
        if self
            .evaluator_trajectory
            .iter()
            .chain(self.subject_trajectory.iter())
            .any(|vector| !vector.is_finite())
        {
            return Err(ChainError::Evidence(
                "trajectory contains non-finite samples".to_string(),
            ));
        }
        Ok(())
    }
}

/// Belief / disbelief / uncertainty triple; sums to 1 for any opinion the
/// engine derives from at least one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectiveOpinion {
    pub belief: f64,
    pub disbelief: f64,
    pub uncertainty: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DirectOpinion {
    pub opinion: SubjectiveOpinion,
    pub weight: f64,
}

/// subject -> evaluator -> value.
type PairMap<T> = BTreeMap<NodeId, BTreeMap<NodeId, T>>;

#[derive(Debug)]
pub struct ReputationEngine {
    params: ReputationParams,
    interactions: Vec<Interaction>,
}

impl ReputationEngine {
    pub fn new(params: ReputationParams) -> Self {
        Self {
            params,
            interactions: Vec::new(),
        }
    }

    /// Appends evidence after ingress validation; malformed records never
    /// reach the scoring path.
    pub fn record(&mut self, interaction: Interaction, now: f64) -> ChainResult<()> {
        interaction.validate(now)?;
        self.interactions.push(interaction);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Reputation of `target` in `[0, 1]`. A subject without inbound
    /// evidence scores [`INITIAL_REPUTATION`].
    pub fn reputation(&self, target: &str, now: f64) -> f64 {
        let aggregated = self.aggregate_by_pair();
        if !aggregated.contains_key(target) {
            return INITIAL_REPUTATION;
        }
        let direct = self.direct_opinions(&aggregated, now);
        let indirect = indirect_opinions(&direct);
        let fused = fuse_opinions(direct.get(target), indirect.get(target));
        fused.belief + self.params.gamma * fused.uncertainty
    }

    /// Merges the log per (subject, evaluator) pair: counts accumulate and
    /// the trajectories of the latest-stamped record win.
    fn aggregate_by_pair(&self) -> PairMap<Interaction> {
        let mut aggregated: PairMap<Interaction> = BTreeMap::new();
        for interaction in &self.interactions {
            let row = aggregated.entry(interaction.subject.clone()).or_default();
            match row.get_mut(&interaction.evaluator) {
                None => {
                    row.insert(interaction.evaluator.clone(), interaction.clone());
                }
                Some(merged) => {
                    merged.positive += interaction.positive;
                    merged.negative += interaction.negative;
                    if interaction.timestamp > merged.timestamp {
                        merged.timestamp = interaction.timestamp;
                        merged.evaluator_trajectory = interaction.evaluator_trajectory.clone();
                        merged.subject_trajectory = interaction.subject_trajectory.clone();
                    }
                }
            }
        }
        aggregated
    }

    fn direct_opinions(&self, aggregated: &PairMap<Interaction>, now: f64) -> PairMap<DirectOpinion> {
        let mut direct: PairMap<DirectOpinion> = BTreeMap::new();
        for (subject, evaluators) in aggregated {
            let total_events: f64 = evaluators
                .values()
                .map(|record| f64::from(record.positive + record.negative))
                .sum();
            let avg_count = if evaluators.is_empty() {
                1.0
            } else {
                total_events / evaluators.len() as f64
            };

            let mut weights: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
            let mut error_num = 0.0;
            let mut error_den = 0.0;
            for (evaluator, record) in evaluators {
                let events = f64::from(record.positive + record.negative);
                let frequency = if avg_count > 0.0 { events / avg_count } else { 0.0 };
                let age = now - record.timestamp;
                let recency = if age <= 0.0 {
                    self.params.eta
                } else {
                    self.params.eta * age.powf(-self.params.epsilon)
                };
                let similarity = self
                    .trajectory_similarity(&record.evaluator_trajectory, &record.subject_trajectory);
                let base = self.params.rho1 * frequency
                    + self.params.rho2 * recency
                    + self.params.rho3 * similarity;
                let weight = base * record.tx_class.weight_multiplier(record.urgency);
                let uncertainty = 2.0 / (2.0 + events);
                weights.insert(evaluator.as_str(), (weight, uncertainty));
                error_num += weight * f64::from(record.negative);
                error_den += weight;
            }
            let error_factor = if error_den != 0.0 {
                self.params.mu / (1.0 + (error_num / error_den).exp())
            } else {
                0.0
            };

            let row = direct.entry(subject.clone()).or_default();
            for (evaluator, record) in evaluators {
                let (weight, uncertainty) = weights[evaluator.as_str()];
                let alpha = (1.0 - error_factor) * f64::from(record.positive);
                let beta = error_factor * f64::from(record.negative);
                let mut opinion = SubjectiveOpinion {
                    uncertainty,
                    ..SubjectiveOpinion::default()
                };
                if alpha + beta > 0.0 {
                    opinion.belief = (1.0 - uncertainty) * alpha / (alpha + beta);
                    opinion.disbelief = (1.0 - uncertainty) * beta / (alpha + beta);
                }
                row.insert(evaluator.clone(), DirectOpinion { opinion, weight });
            }
        }
        direct
    }

    /// Weighted cosine over the speed, direction and acceleration channels.
    fn trajectory_similarity(&self, a: &[TrajectoryVector], b: &[TrajectoryVector]) -> f64 {
        use crate::types::trajectory_channel_cosine as cosine;
        let similarity = self.params.tau1 * cosine(a, b, |v| v.speed)
            + self.params.tau2 * cosine(a, b, |v| v.direction)
            + self.params.tau3 * cosine(a, b, |v| v.acceleration);
        if similarity.is_finite() {
            similarity
        } else {
            0.0
        }
    }
}

/// Indirect opinions about each subject, one per source node that reaches
/// the subject through 2..=[`MAX_OPINION_HOPS`] referral edges. Edge `u -> v`
/// exists when `u` holds a direct opinion about `v`; the discount operator
/// folds each edge into the running opinion and the per-source result is the
/// path-weight-normalised sum.
fn indirect_opinions(direct: &PairMap<DirectOpinion>) -> PairMap<SubjectiveOpinion> {
    let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (subject, evaluators) in direct {
        for evaluator in evaluators.keys() {
            edges.entry(evaluator.as_str()).or_default().push(subject.as_str());
        }
    }

    let mut indirect: PairMap<SubjectiveOpinion> = BTreeMap::new();
    for target in direct.keys() {
        for source in edges.keys() {
            if *source == target.as_str() {
                continue;
            }
            let mut paths: Vec<Vec<&str>> = Vec::new();
            let mut visited = vec![*source];
            collect_paths(&edges, *source, target.as_str(), &mut visited, &mut paths);
            if paths.is_empty() {
                continue;
            }

            let mut accumulated = SubjectiveOpinion::default();
            let mut total_weight = 0.0;
            for path in &paths {
                let mut belief = 1.0;
                let mut disbelief = 0.0;
                let mut uncertainty = 0.0;
                let mut weight = 1.0;
                for hop in path.windows(2) {
                    let edge = &direct[hop[1]][hop[0]];
                    let discounted_belief = belief * edge.opinion.belief;
                    let discounted_disbelief = belief * edge.opinion.disbelief;
                    uncertainty = disbelief + uncertainty + belief * edge.opinion.uncertainty;
                    belief = discounted_belief;
                    disbelief = discounted_disbelief;
                    weight *= edge.weight;
                }
                accumulated.belief += belief * weight;
                accumulated.disbelief += disbelief * weight;
                accumulated.uncertainty += uncertainty * weight;
                total_weight += weight;
            }
            if total_weight > 0.0 {
                indirect.entry(target.clone()).or_default().insert(
                    source.to_string(),
                    SubjectiveOpinion {
                        belief: accumulated.belief / total_weight,
                        disbelief: accumulated.disbelief / total_weight,
                        uncertainty: accumulated.uncertainty / total_weight,
                    },
                );
            }
        }
    }
    indirect
}

/// Depth-first enumeration of simple paths ending at `target`, bounded by
/// [`MAX_OPINION_HOPS`] edges. The opinion graph contains cycles, so the
/// running path doubles as the visited set.
fn collect_paths<'a>(
    edges: &BTreeMap<&'a str, Vec<&'a str>>,
    current: &'a str,
    target: &str,
    visited: &mut Vec<&'a str>,
    paths: &mut Vec<Vec<&'a str>>,
) {
    if visited.len() - 1 >= MAX_OPINION_HOPS {
        return;
    }
    let Some(next_hops) = edges.get(current) else {
        return;
    };
    for &next in next_hops {
        if next == target {
            // Single-edge paths are the direct opinions themselves.
            if visited.len() >= 2 {
                let mut path = visited.clone();
                path.push(next);
                paths.push(path);
            }
            continue;
        }
        if visited.iter().any(|&seen| seen == next) {
            continue;
        }
        visited.push(next);
        collect_paths(edges, next, target, visited, paths);
        visited.pop();
    }
}

/// Consensus fusion of the direct aggregate (delta-weighted mean) with the
/// indirect aggregate (plain mean over sources). Falls back to the direct
/// aggregate when there is no indirect evidence or the fusion denominator
/// degenerates to zero.
fn fuse_opinions(
    direct_row: Option<&BTreeMap<NodeId, DirectOpinion>>,
    indirect_row: Option<&BTreeMap<NodeId, SubjectiveOpinion>>,
) -> SubjectiveOpinion {
    let mut direct_aggregate = SubjectiveOpinion::default();
    let mut weight_sum = 0.0;
    if let Some(row) = direct_row {
        for entry in row.values() {
            weight_sum += entry.weight;
            direct_aggregate.belief += entry.opinion.belief * entry.weight;
            direct_aggregate.disbelief += entry.opinion.disbelief * entry.weight;
            direct_aggregate.uncertainty += entry.opinion.uncertainty * entry.weight;
        }
        if weight_sum > 0.0 {
            direct_aggregate.belief /= weight_sum;
            direct_aggregate.disbelief /= weight_sum;
            direct_aggregate.uncertainty /= weight_sum;
        }
    }

    let Some(indirect_row) = indirect_row.filter(|row| !row.is_empty()) else {
        return direct_aggregate;
    };
    let count = indirect_row.len() as f64;
    let mut indirect_aggregate = SubjectiveOpinion::default();
    for opinion in indirect_row.values() {
        indirect_aggregate.belief += opinion.belief;
        indirect_aggregate.disbelief += opinion.disbelief;
        indirect_aggregate.uncertainty += opinion.uncertainty;
    }
    indirect_aggregate.belief /= count;
    indirect_aggregate.disbelief /= count;
    indirect_aggregate.uncertainty /= count;

    let k = direct_aggregate.uncertainty * indirect_aggregate.uncertainty
        + indirect_aggregate.belief * direct_aggregate.uncertainty
        + indirect_aggregate.disbelief * direct_aggregate.uncertainty;
    if k == 0.0 {
        return direct_aggregate;
    }
    let fused = SubjectiveOpinion {
        belief: (direct_aggregate.belief * indirect_aggregate.uncertainty
            + indirect_aggregate.belief * direct_aggregate.uncertainty)
            / k,
        disbelief: (direct_aggregate.disbelief * indirect_aggregate.uncertainty
            + indirect_aggregate.disbelief * direct_aggregate.uncertainty)
            / k,
        uncertainty: (direct_aggregate.uncertainty * indirect_aggregate.uncertainty) / k,
    };
    // The fused triple only sums to 1 when one side is fully certain;
    // normalise so downstream scores stay inside the unit interval.
    let sum = fused.belief + fused.disbelief + fused.uncertainty;
    if sum > 0.0 && sum.is_finite() {
        SubjectiveOpinion {
            belief: fused.belief / sum,
            disbelief: fused.disbelief / sum,
            uncertainty: fused.uncertainty / sum,
        }
    } else {
        direct_aggregate
    }
}
