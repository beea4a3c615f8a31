use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::{NodeId, PriorityTransaction};

pub const GENESIS_HASH: &str = "genesis";
pub const GENESIS_PREVIOUS_HASH: &str = "0";

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Digest over the included transaction ids, empty when the block carries
/// no transactions. Every node recomputes this during verification.
pub fn merkle_root(transactions: &[PriorityTransaction]) -> String {
    if transactions.is_empty() {
        return String::new();
    }
    let mut hasher = blake3::Hasher::new();
    for tx in transactions {
        hasher.update(tx.id.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriorityBlockHeader {
    pub index: u64,
    pub timestamp: u64,
    pub previous_hash: String,
    pub merkle_root: String,
}

impl PriorityBlockHeader {
    /// Stable canonical form shared by all nodes; the block hash covers
    /// exactly these bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("serializing block header")
    }

    pub fn hash(&self) -> String {
        blake3::hash(&self.canonical_bytes()).to_hex().to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriorityBlock {
    pub header: PriorityBlockHeader,
    pub hash: String,
    /// Unverified slot; content hashing is the only integrity check here.
    pub signature: String,
    pub validator_ids: Vec<NodeId>,
    /// Up to k transactions in descending urgency.
    pub transactions: Vec<PriorityTransaction>,
    pub total_urgency: f64,
}

impl PriorityBlock {
    pub fn new(
        index: u64,
        previous_hash: String,
        transactions: Vec<PriorityTransaction>,
        validator_ids: Vec<NodeId>,
    ) -> Self {
        let header = PriorityBlockHeader {
            index,
            timestamp: current_timestamp(),
            previous_hash,
            merkle_root: merkle_root(&transactions),
        };
        let hash = header.hash();
        let total_urgency = transactions.iter().map(|tx| tx.urgency).sum();
        Self {
            header,
            hash,
            signature: String::new(),
            validator_ids,
            transactions,
            total_urgency,
        }
    }

    /// Synthetic chain root: index 0, no transactions, fixed hashes.
    pub fn genesis() -> Self {
        Self {
            header: PriorityBlockHeader {
                index: 0,
                timestamp: current_timestamp(),
                previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
                merkle_root: String::new(),
            },
            hash: GENESIS_HASH.to_string(),
            signature: String::new(),
            validator_ids: Vec::new(),
            transactions: Vec::new(),
            total_urgency: 0.0,
        }
    }

    pub fn recompute_total_urgency(&self) -> f64 {
        self.transactions.iter().map(|tx| tx.urgency).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UrgencyParams;

    fn tx(sender: &str) -> PriorityTransaction {
        PriorityTransaction::new(
            sender.into(),
            b"brake".to_vec(),
            0.0,
            1.0,
            5.0,
            0,
            &UrgencyParams::default(),
        )
    }

    #[test]
    fn hash_covers_the_header_only() {
        let mut block = PriorityBlock::new(1, GENESIS_HASH.into(), vec![tx("2")], vec!["2".into()]);
        let original = block.hash.clone();
        block.signature = "sig-2".into();
        assert_eq!(block.header.hash(), original);
    }

    #[test]
    fn merkle_root_is_empty_without_transactions() {
        assert_eq!(merkle_root(&[]), "");
        let block = PriorityBlock::new(1, GENESIS_HASH.into(), Vec::new(), Vec::new());
        assert_eq!(block.header.merkle_root, "");
    }

    #[test]
    fn merkle_root_tracks_transaction_ids() {
        let a = tx("2");
        let b = tx("4");
        let forward = merkle_root(&[a.clone(), b.clone()]);
        let reversed = merkle_root(&[b, a]);
        assert_ne!(forward, reversed);
    }

    #[test]
    fn genesis_block_is_fixed() {
        let genesis = PriorityBlock::genesis();
        assert_eq!(genesis.header.index, 0);
        assert_eq!(genesis.header.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(genesis.hash, GENESIS_HASH);
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.total_urgency, 0.0);
    }
}
