use serde::{Deserialize, Serialize};

use crate::errors::{ChainError, ChainResult};
use crate::types::{current_timestamp, merkle_root, NodeId, PriorityBlock};

/// Hash-linked priority ledger, rooted at a synthetic genesis block.
#[derive(Debug)]
pub struct PriorityChain {
    blocks: Vec<PriorityBlock>,
}

impl Default for PriorityChain {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityChain {
    pub fn new() -> Self {
        Self {
            blocks: vec![PriorityBlock::genesis()],
        }
    }

    pub fn tip(&self) -> &PriorityBlock {
        self.blocks.last().expect("chain always holds genesis")
    }

    /// Index of the tip block; the genesis-only chain has height 0.
    pub fn height(&self) -> u64 {
        self.tip().header.index
    }

    pub fn blocks(&self) -> &[PriorityBlock] {
        &self.blocks
    }

    /// The five acceptance checks run against the current tip. Enforced at
    /// Announce; the later Commit append is unconditional.
    pub fn verify_candidate(&self, block: &PriorityBlock) -> ChainResult<()> {
        let tip = self.tip();
        if block.header.index != tip.header.index + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "index {} does not extend tip {}",
                block.header.index, tip.header.index
            )));
        }
        if block.header.previous_hash != tip.hash {
            return Err(ChainError::InvalidBlock(
                "previous hash does not match tip".to_string(),
            ));
        }
        if block.header.merkle_root != merkle_root(&block.transactions) {
            return Err(ChainError::InvalidBlock(
                "merkle root does not match transactions".to_string(),
            ));
        }
        if block.hash != block.header.hash() {
            return Err(ChainError::InvalidBlock(
                "hash does not match header".to_string(),
            ));
        }
        if block.total_urgency != block.recompute_total_urgency() {
            return Err(ChainError::InvalidBlock(
                "total urgency does not match transactions".to_string(),
            ));
        }
        Ok(())
    }

    pub fn append(&mut self, block: PriorityBlock) {
        self.blocks.push(block);
    }
}

/// Placeholder routine-traffic ledger. The normal chain orders blocks with
/// a one-shot broadcast: the proposer announces and immediately commits,
/// skipping any endorse round. Kept deliberately trivial.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalBlock {
    pub index: u64,
    pub timestamp: u64,
    pub data: Vec<u8>,
    pub previous_hash: String,
    pub hash: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalPhase {
    Announce,
    Commit,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalMessage {
    pub phase: NormalPhase,
    pub block: NormalBlock,
    pub sender: NodeId,
}

#[derive(Default, Debug)]
pub struct NormalLedger {
    blocks: Vec<NormalBlock>,
}

impl NormalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_hash(&self) -> String {
        self.blocks
            .last()
            .map(|block| block.hash.clone())
            .unwrap_or_default()
    }

    pub fn build_block(&self, data: Vec<u8>) -> NormalBlock {
        let previous_hash = self.last_hash();
        let mut hasher = blake3::Hasher::new();
        hasher.update(previous_hash.as_bytes());
        hasher.update(&data);
        let hash = hasher.finalize().to_hex().to_string();
        NormalBlock {
            index: self.blocks.len() as u64 + 1,
            timestamp: current_timestamp(),
            data,
            previous_hash,
            hash,
        }
    }

    pub fn accept(&mut self, block: NormalBlock) {
        self.blocks.push(block);
    }
}
