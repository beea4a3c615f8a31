mod block;
mod trajectory;
mod transaction;

pub use block::{
    current_timestamp, merkle_root, PriorityBlock, PriorityBlockHeader, GENESIS_HASH,
    GENESIS_PREVIOUS_HASH,
};
pub(crate) use trajectory::channel_cosine as trajectory_channel_cosine;
pub use trajectory::TrajectoryVector;
pub use transaction::{urgency_degree, PriorityTransaction, UrgencyParams};

pub type NodeId = String;
