use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use corvid_core::{Address, Message};
use tracing::debug;

use crate::error::ConsensusError;
use crate::validator::ValidatorSet;

/// Messages that arrived ahead of the local view
struct Entry {
    /// (height, round, message type rank)
    key: (u64, u64, u8),
    seq: u64,
    msg: Message,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.key, self.seq).cmp(&(other.key, other.seq))
    }
}

/// Per-validator queues of future messages, drained lowest view first
pub struct Backlog {
    self_address: Address,
    queues: HashMap<Address, BinaryHeap<Reverse<Entry>>>,
    seq: u64,
}

impl Backlog {
    pub fn new(self_address: Address, valset: &ValidatorSet) -> Self {
        let queues = valset
            .address_list()
            .into_iter()
            .filter(|a| *a != self_address)
            .map(|a| (a, BinaryHeap::new()))
            .collect();
        Backlog {
            self_address,
            queues,
            seq: 0,
        }
    }

    /// Queue a future message. Messages from this node, from outsiders, or
    /// without a readable view are dropped.
    pub fn push(&mut self, msg: Message) -> bool {
        if msg.address == self.self_address {
            return false;
        }
        let Some(queue) = self.queues.get_mut(&msg.address) else {
            return false;
        };
        let (view, rank) = match (msg.view(), msg.msg_type()) {
            (Ok(view), Ok(ty)) => (view, ty.rank()),
            _ => return false,
        };

        self.seq += 1;
        debug!(
            "Backlogged message from {} at {}",
            msg.address.short(),
            view
        );
        queue.push(Reverse(Entry {
            key: (view.height, view.round, rank),
            seq: self.seq,
            msg,
        }));
        true
    }

    /// Drain every queue as far as `check` allows.
    ///
    /// Messages `check` still reports as future go back and stop their queue.
    /// Current or past ones are handed to `replay`; anything else is dropped.
    pub fn process<C, R>(&mut self, mut check: C, mut replay: R)
    where
        C: FnMut(&Message) -> Result<(), ConsensusError>,
        R: FnMut(Message),
    {
        for queue in self.queues.values_mut() {
            while let Some(Reverse(entry)) = queue.pop() {
                match check(&entry.msg) {
                    Err(ConsensusError::FutureMessage) => {
                        queue.push(Reverse(entry));
                        break;
                    }
                    Ok(()) | Err(ConsensusError::OldMessage) => replay(entry.msg),
                    Err(e) => debug!("Dropped backlogged message: {}", e),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(BinaryHeap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
