//! In-memory transport between logical nodes.
//!
//! Sends enqueue envelopes into a shared FIFO; the pump delivers them one
//! node at a time, so per-node message handling stays serialised and
//! messages from one sender arrive in send order. Broadcast scopes are
//! resolved against the committee view installed at the last refresh.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::consensus::Committee;
use crate::node::{Message, Node, Outbound, Scope};
use crate::reputation::Interaction;
use crate::types::{NodeId, PriorityTransaction};

#[derive(Debug)]
enum Delivery {
    Message(Message),
    Evidence(Interaction),
}

#[derive(Debug)]
struct Envelope {
    to: NodeId,
    delivery: Delivery,
}

#[derive(Debug)]
pub struct Network {
    nodes: BTreeMap<NodeId, Arc<Mutex<Node>>>,
    queue: Mutex<VecDeque<Envelope>>,
    committee: Mutex<Arc<Committee>>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            queue: Mutex::new(VecDeque::new()),
            committee: Mutex::new(Arc::new(Committee::new(0, 0))),
        }
    }

    pub fn register(&mut self, node: Node) {
        self.nodes
            .insert(node.id().to_string(), Arc::new(Mutex::new(node)));
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn node(&self, id: &str) -> Option<Arc<Mutex<Node>>> {
        self.nodes.get(id).cloned()
    }

    /// Runs `action` against the node's serialised state.
    pub fn with_node<R>(&self, id: &str, action: impl FnOnce(&mut Node) -> R) -> Option<R> {
        let node = self.nodes.get(id)?;
        let mut guard = node.lock();
        Some(action(&mut guard))
    }

    /// Swaps in the committee snapshot on every node and on the broadcast
    /// router. The refresh point is the only synchronisation boundary for
    /// the committee view.
    pub fn install_committee(&self, committee: Arc<Committee>) {
        *self.committee.lock() = committee.clone();
        for node in self.nodes.values() {
            node.lock().set_committee(committee.clone());
        }
    }

    /// Steady-state transaction propagation: every node keeps its own
    /// mempool copy.
    pub fn broadcast_transaction(&self, tx: &PriorityTransaction) {
        for node in self.nodes.values() {
            node.lock().add_transaction(tx.clone());
        }
    }

    /// Fans an evidence record out to every node's log.
    pub fn broadcast_evidence(&self, interaction: Interaction) {
        let mut queue = self.queue.lock();
        for id in self.nodes.keys() {
            queue.push_back(Envelope {
                to: id.clone(),
                delivery: Delivery::Evidence(interaction.clone()),
            });
        }
    }

    /// Enqueues a handler's outbound traffic. Broadcasts deliver to every
    /// peer in scope, the sender included.
    pub fn dispatch(&self, outbound: Vec<Outbound>) {
        for item in outbound {
            match item {
                Outbound::Broadcast { scope, message } => {
                    let recipients: Vec<NodeId> = match scope {
                        Scope::All => self.nodes.keys().cloned().collect(),
                        Scope::Committee => {
                            let committee = self.committee.lock().clone();
                            committee
                                .ids()
                                .into_iter()
                                .filter(|id| self.nodes.contains_key(id))
                                .collect()
                        }
                    };
                    let mut queue = self.queue.lock();
                    for to in recipients {
                        queue.push_back(Envelope {
                            to,
                            delivery: Delivery::Message(message.clone()),
                        });
                    }
                }
                Outbound::Evidence(interaction) => self.broadcast_evidence(interaction),
            }
        }
    }

    /// Delivers queued traffic until the network is quiescent. Handlers may
    /// enqueue further traffic; the pump keeps going until nothing is left.
    /// Returns the number of deliveries made.
    pub fn pump(&self, now: f64) -> usize {
        let mut delivered = 0;
        loop {
            let envelope = self.queue.lock().pop_front();
            let Some(envelope) = envelope else {
                break;
            };
            let Some(node) = self.nodes.get(&envelope.to) else {
                debug!(to = %envelope.to, "dropping envelope for unknown node");
                continue;
            };
            delivered += 1;
            match envelope.delivery {
                Delivery::Message(message) => {
                    let outbound = node.lock().handle_message(&message, now);
                    self.dispatch(outbound);
                }
                Delivery::Evidence(interaction) => {
                    if let Err(err) = node.lock().record_interaction(interaction, now) {
                        warn!(to = %envelope.to, %err, "rejected evidence record");
                    }
                }
            }
        }
        delivered
    }
}
