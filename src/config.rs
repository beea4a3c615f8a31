use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ChainError, ChainResult};

pub const MIN_COMMITTEE_SIZE: usize = 4;
const COMMITTEE_FRACTION: f64 = 0.3;

/// Coefficients of the reputation engine. Conventions: `rho1 + rho2 + rho3
/// = 1` and `tau1 + tau2 + tau3 = 1`; the engine does not enforce either.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ReputationParams {
    /// Evidence-weight coefficients for frequency, recency and similarity.
    pub rho1: f64,
    pub rho2: f64,
    pub rho3: f64,
    /// Time-decay scale and exponent.
    pub eta: f64,
    pub epsilon: f64,
    /// Trajectory-channel weights for speed, direction and acceleration.
    pub tau1: f64,
    pub tau2: f64,
    pub tau3: f64,
    /// Error-factor scale.
    pub mu: f64,
    /// Uncertainty-to-score coefficient.
    pub gamma: f64,
}

impl Default for ReputationParams {
    fn default() -> Self {
        Self {
            rho1: 1.0 / 3.0,
            rho2: 1.0 / 3.0,
            rho3: 1.0 / 3.0,
            eta: 1.0,
            epsilon: 1.0,
            tau1: 1.0 / 3.0,
            tau2: 1.0 / 3.0,
            tau3: 1.0 / 3.0,
            mu: 1.0,
            gamma: 0.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub reputation: ReputationParams,
    /// Validator committee size N. When unset, the driver derives
    /// ceil(30% of nodes) with a floor of [`MIN_COMMITTEE_SIZE`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committee_size: Option<usize>,
    /// Rounds a committee stays active before a refresh (M).
    #[serde(default = "default_active_period")]
    pub active_period: u64,
    /// Maximum priority transactions packed per block (k).
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Weight of the sender's prior priority-transaction count.
    #[serde(default = "default_omega")]
    pub omega: f64,
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_path: Option<PathBuf>,
    /// Scenario nodes whose transactions collect negative evidence.
    #[serde(default = "default_malicious")]
    pub malicious: Vec<String>,
}

fn default_active_period() -> u64 {
    10
}

fn default_block_size() -> usize {
    5
}

fn default_omega() -> f64 {
    0.5
}

fn default_rounds() -> usize {
    20
}

fn default_malicious() -> Vec<String> {
    vec!["3".to_string()]
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            reputation: ReputationParams::default(),
            committee_size: None,
            active_period: default_active_period(),
            block_size: default_block_size(),
            omega: default_omega(),
            rounds: default_rounds(),
            telemetry_path: None,
            malicious: default_malicious(),
        }
    }
}

impl ChainConfig {
    pub fn load(path: &Path) -> ChainResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|err| ChainError::Config(format!("unable to parse config: {err}")))
    }

    pub fn save(&self, path: &Path) -> ChainResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| ChainError::Config(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    /// Effective committee size for a population of `node_count` vehicles.
    pub fn committee_size_for(&self, node_count: usize) -> usize {
        self.committee_size.unwrap_or_else(|| {
            let derived = (node_count as f64 * COMMITTEE_FRACTION).ceil() as usize;
            derived.max(MIN_COMMITTEE_SIZE)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chain.toml");
        let config = ChainConfig::default();
        config.save(&path).expect("save");
        let loaded = ChainConfig::load(&path).expect("load");
        assert_eq!(loaded.block_size, config.block_size);
        assert_eq!(loaded.active_period, config.active_period);
        assert!((loaded.reputation.gamma - config.reputation.gamma).abs() < 1e-12);
    }

    #[test]
    fn committee_size_derives_from_population() {
        let config = ChainConfig::default();
        assert_eq!(config.committee_size_for(10), 4);
        assert_eq!(config.committee_size_for(20), 6);
        let pinned = ChainConfig {
            committee_size: Some(5),
            ..ChainConfig::default()
        };
        assert_eq!(pinned.committee_size_for(100), 5);
    }

    #[test]
    fn partial_config_uses_field_defaults() {
        let parsed: ChainConfig = toml::from_str("rounds = 3\n").expect("parse");
        assert_eq!(parsed.rounds, 3);
        assert_eq!(parsed.block_size, default_block_size());
        assert_eq!(parsed.malicious, vec!["3".to_string()]);
    }
}
