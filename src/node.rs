//! Per-vehicle node runtime.
//!
//! A node owns its interaction log, both ledgers, a mempool copy and the
//! vote tables of the three-phase protocol. Handlers never send while
//! holding state: they return the outbound traffic and let the transport
//! deliver it, so one lock per node is enough.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ReputationParams;
use crate::consensus::{Committee, ConsensusMessage, Phase};
use crate::errors::ChainResult;
use crate::ledger::{NormalLedger, NormalMessage, NormalPhase, PriorityChain};
use crate::mempool::PriorityMempool;
use crate::reputation::{Interaction, ReputationEngine};
use crate::types::{current_timestamp, NodeId, PriorityBlock, PriorityTransaction};

/// Local verdict on a committed transaction, feeding the reputation loop.
pub trait VerdictPolicy: Send {
    /// `true` marks the sender with positive evidence, `false` with
    /// negative.
    fn assess(&self, tx: &PriorityTransaction) -> bool;
}

/// Default policy: positive unless the sender is a known-bad actor of the
/// scenario.
#[derive(Debug)]
pub struct MaliciousSetPolicy {
    malicious: BTreeSet<NodeId>,
}

impl MaliciousSetPolicy {
    pub fn new(malicious: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            malicious: malicious.into_iter().collect(),
        }
    }
}

impl VerdictPolicy for MaliciousSetPolicy {
    fn assess(&self, tx: &PriorityTransaction) -> bool {
        !self.malicious.contains(&tx.sender)
    }
}

#[derive(Clone, Debug)]
pub enum Message {
    Priority(ConsensusMessage),
    Normal(NormalMessage),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    All,
    Committee,
}

/// Traffic a handler wants delivered once its critical section ends.
#[derive(Clone, Debug)]
pub enum Outbound {
    Broadcast { scope: Scope, message: Message },
    /// Evidence records fan out to every node's log.
    Evidence(Interaction),
}

fn broadcast(scope: Scope, message: Message) -> Outbound {
    Outbound::Broadcast { scope, message }
}

#[derive(Default, Debug)]
struct BlockVotes {
    endorsers: HashSet<NodeId>,
    committers: HashSet<NodeId>,
    endorse_sent: bool,
    commit_sent: bool,
}

pub struct Node {
    id: NodeId,
    engine: ReputationEngine,
    chain: PriorityChain,
    normal: NormalLedger,
    mempool: PriorityMempool,
    committee: Arc<Committee>,
    is_validator: bool,
    votes: HashMap<String, BlockVotes>,
    committed: HashSet<String>,
    verdicts: Box<dyn VerdictPolicy>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("chain", &self.chain)
            .field("normal", &self.normal)
            .field("mempool", &self.mempool)
            .field("committee", &self.committee)
            .field("is_validator", &self.is_validator)
            .field("votes", &self.votes)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn new(id: NodeId, params: ReputationParams, verdicts: Box<dyn VerdictPolicy>) -> Self {
        Self {
            id,
            engine: ReputationEngine::new(params),
            chain: PriorityChain::new(),
            normal: NormalLedger::new(),
            mempool: PriorityMempool::new(),
            committee: Arc::new(Committee::new(0, 0)),
            is_validator: false,
            votes: HashMap::new(),
            committed: HashSet::new(),
            verdicts,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_validator(&self) -> bool {
        self.is_validator
    }

    pub fn chain(&self) -> &PriorityChain {
        &self.chain
    }

    pub fn normal_ledger(&self) -> &NormalLedger {
        &self.normal
    }

    pub fn engine(&self) -> &ReputationEngine {
        &self.engine
    }

    pub fn pending_transactions(&self) -> usize {
        self.mempool.len()
    }

    /// Installs the committee snapshot distributed at a refresh point.
    pub fn set_committee(&mut self, committee: Arc<Committee>) {
        self.is_validator = committee.is_member(&self.id);
        self.committee = committee;
    }

    pub fn record_interaction(&mut self, interaction: Interaction, now: f64) -> ChainResult<()> {
        self.engine.record(interaction, now)
    }

    pub fn reputation_of(&self, subject: &str, now: f64) -> f64 {
        self.engine.reputation(subject, now)
    }

    pub fn add_transaction(&mut self, tx: PriorityTransaction) -> bool {
        self.mempool.insert(tx)
    }

    /// Packs the top-k pending transactions into a candidate block and
    /// announces it to the committee. Skips the round when the pool is
    /// empty or this node is outside the committee.
    pub fn propose_block(&mut self, block_size: usize) -> Vec<Outbound> {
        if !self.is_validator {
            return Vec::new();
        }
        if self.mempool.is_empty() {
            debug!(node = %self.id, "no pending priority transactions, skipping round");
            return Vec::new();
        }
        let transactions = self.mempool.drain_top_k(block_size);
        let tip = self.chain.tip();
        let mut block = PriorityBlock::new(
            tip.header.index + 1,
            tip.hash.clone(),
            transactions,
            self.committee.ids(),
        );
        block.signature = format!("sig-{}", self.id);
        info!(
            node = %self.id,
            index = block.header.index,
            transactions = block.transactions.len(),
            total_urgency = block.total_urgency,
            "proposing priority block"
        );
        vec![broadcast(
            Scope::Committee,
            Message::Priority(ConsensusMessage {
                phase: Phase::Announce,
                block_hash: block.hash.clone(),
                block,
                sender: self.id.clone(),
                timestamp: current_timestamp(),
            }),
        )]
    }

    /// One-shot broadcast of a routine block: announce, then commit right
    /// away. The placeholder ledger counts no votes.
    pub fn propose_normal(&mut self, data: Vec<u8>) -> Vec<Outbound> {
        let block = self.normal.build_block(data);
        let announce = NormalMessage {
            phase: NormalPhase::Announce,
            block: block.clone(),
            sender: self.id.clone(),
        };
        let commit = NormalMessage {
            phase: NormalPhase::Commit,
            block,
            sender: self.id.clone(),
        };
        vec![
            broadcast(Scope::All, Message::Normal(announce)),
            broadcast(Scope::All, Message::Normal(commit)),
        ]
    }

    pub fn handle_message(&mut self, message: &Message, now: f64) -> Vec<Outbound> {
        match message {
            Message::Priority(msg) => match msg.phase {
                Phase::Announce => self.handle_announce(msg),
                Phase::Endorse => self.handle_endorse(msg),
                Phase::Commit => self.handle_commit(msg, now),
            },
            Message::Normal(msg) => {
                if msg.phase == NormalPhase::Commit {
                    self.normal.accept(msg.block.clone());
                }
                Vec::new()
            }
        }
    }

    fn handle_announce(&mut self, msg: &ConsensusMessage) -> Vec<Outbound> {
        if !self.is_validator || self.committed.contains(&msg.block_hash) {
            return Vec::new();
        }
        match self.committee.proposer() {
            Some(proposer) if proposer.id == msg.sender => {}
            _ => {
                debug!(node = %self.id, sender = %msg.sender, "announce from non-proposer");
                return Vec::new();
            }
        }
        if let Err(err) = self.chain.verify_candidate(&msg.block) {
            debug!(node = %self.id, %err, "dropping announced block");
            return Vec::new();
        }
        let votes = self.votes.entry(msg.block_hash.clone()).or_default();
        if votes.endorse_sent {
            return Vec::new();
        }
        votes.endorse_sent = true;
        vec![broadcast(
            Scope::Committee,
            Message::Priority(ConsensusMessage {
                phase: Phase::Endorse,
                block_hash: msg.block_hash.clone(),
                block: msg.block.clone(),
                sender: self.id.clone(),
                timestamp: current_timestamp(),
            }),
        )]
    }

    fn handle_endorse(&mut self, msg: &ConsensusMessage) -> Vec<Outbound> {
        if !self.is_validator || self.committed.contains(&msg.block_hash) {
            return Vec::new();
        }
        let quorum = self.committee.endorse_quorum();
        let votes = self.votes.entry(msg.block_hash.clone()).or_default();
        votes.endorsers.insert(msg.sender.clone());
        if votes.commit_sent || votes.endorsers.len() < quorum {
            return Vec::new();
        }
        votes.commit_sent = true;
        vec![broadcast(
            Scope::All,
            Message::Priority(ConsensusMessage {
                phase: Phase::Commit,
                block_hash: msg.block_hash.clone(),
                block: msg.block.clone(),
                sender: self.id.clone(),
                timestamp: current_timestamp(),
            }),
        )]
    }

    fn handle_commit(&mut self, msg: &ConsensusMessage, now: f64) -> Vec<Outbound> {
        if self.committed.contains(&msg.block_hash) || self.committee.is_empty() {
            return Vec::new();
        }
        let quorum = self.committee.commit_quorum();
        let votes = self.votes.entry(msg.block_hash.clone()).or_default();
        votes.committers.insert(msg.sender.clone());
        if votes.committers.len() < quorum {
            return Vec::new();
        }

        self.committed.insert(msg.block_hash.clone());
        self.votes.remove(&msg.block_hash);
        self.chain.append(msg.block.clone());
        let packed: Vec<String> = msg
            .block
            .transactions
            .iter()
            .map(|tx| tx.id.clone())
            .collect();
        self.mempool.remove_ids(&packed);
        info!(
            node = %self.id,
            index = msg.block.header.index,
            transactions = msg.block.transactions.len(),
            "committed priority block"
        );
        self.emit_feedback(&msg.block, now)
    }

    /// Closes the reputation loop: each committee member evaluates every
    /// sender packed into the committed block.
    fn emit_feedback(&self, block: &PriorityBlock, now: f64) -> Vec<Outbound> {
        if !self.is_validator {
            return Vec::new();
        }
        block
            .transactions
            .iter()
            .filter(|tx| tx.sender != self.id)
            .map(|tx| {
                let honest = self.verdicts.assess(tx);
                let interaction = Interaction::priority(
                    self.id.clone(),
                    tx.sender.clone(),
                    u32::from(honest),
                    u32::from(!honest),
                    now,
                    tx.urgency,
                );
                Outbound::Evidence(interaction)
            })
            .collect()
    }
}
