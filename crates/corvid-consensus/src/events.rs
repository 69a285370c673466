use corvid_core::{Address, Hash, Message, View};
use serde::{Deserialize, Serialize};

/// Everything the engine reacts to, funneled through one channel
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// Encoded message from the network
    Inbound(Vec<u8>),
    /// Backlogged message whose view has been reached
    Replay(Message),
    /// Round timer expiry for the view it was armed in
    TimerFired(View),
    /// A new proposal request is available
    Request(Hash),
}

/// Round state published to block producers and status readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RoundInfo {
    pub view: View,
    pub proposer: Address,
    /// Block a proposal in this round must extend
    pub parent: Hash,
    pub parent_height: u64,
    pub is_proposer: bool,
    /// Proposer still has nothing to propose this round
    pub awaiting_request: bool,
}
