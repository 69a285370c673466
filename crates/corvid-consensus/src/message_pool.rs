use std::collections::{BTreeMap, HashMap, HashSet};

use corvid_core::{Address, Hash, Message};
use tracing::debug;

use crate::error::ConsensusError;
use crate::validator::ValidatorSet;

/// Votes for one block hash, tagged with the round they were cast in
struct VoteSet {
    round: u64,
    seals: BTreeMap<Address, Message>,
}

/// Votes per block hash and timeouts per round, one entry per validator
pub struct MessagePool {
    validators: HashSet<Address>,
    votes: HashMap<Hash, VoteSet>,
    timeouts: BTreeMap<u64, BTreeMap<Address, Message>>,
}

impl MessagePool {
    pub fn new(valset: &ValidatorSet) -> Self {
        MessagePool {
            validators: valset.address_list().into_iter().collect(),
            votes: HashMap::new(),
            timeouts: BTreeMap::new(),
        }
    }

    fn check_member(&self, msg: &Message) -> Result<(), ConsensusError> {
        if !self.validators.contains(&msg.address) {
            return Err(ConsensusError::UnauthorizedAddress);
        }
        Ok(())
    }

    fn insert(set: &mut BTreeMap<Address, Message>, msg: Message) -> Result<usize, ConsensusError> {
        if set.contains_key(&msg.address) {
            return Err(ConsensusError::DuplicateMessage);
        }
        set.insert(msg.address, msg);
        Ok(set.len())
    }

    /// Record a vote for `hash`, returning the new vote count
    pub fn add_vote(&mut self, hash: Hash, msg: Message) -> Result<usize, ConsensusError> {
        self.check_member(&msg)?;
        let round = msg
            .view()
            .map_err(|e| ConsensusError::InvalidMessage(e.to_string()))?
            .round;
        let set = self.votes.entry(hash).or_insert_with(|| VoteSet {
            round,
            seals: BTreeMap::new(),
        });
        let size = Self::insert(&mut set.seals, msg)?;
        debug!("Vote for {} now at {}", hash.short(), size);
        Ok(size)
    }

    pub fn vote_size(&self, hash: &Hash) -> usize {
        self.votes.get(hash).map_or(0, |set| set.seals.len())
    }

    pub fn votes(&self, hash: &Hash) -> Vec<Message> {
        self.votes
            .get(hash)
            .map(|set| set.seals.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_votes(&mut self, hash: &Hash) {
        self.votes.remove(hash);
    }

    /// Record a timeout for `round`, returning the new timeout count
    pub fn add_timeout(&mut self, round: u64, msg: Message) -> Result<usize, ConsensusError> {
        self.check_member(&msg)?;
        let set = self.timeouts.entry(round).or_default();
        let size = Self::insert(set, msg)?;
        debug!("Timeouts for round {} now at {}", round, size);
        Ok(size)
    }

    pub fn timeout_size(&self, round: u64) -> usize {
        self.timeouts.get(&round).map_or(0, BTreeMap::len)
    }

    pub fn timeouts(&self, round: u64) -> Vec<Message> {
        self.timeouts
            .get(&round)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop vote and timeout sets for rounds below `round`
    pub fn prune(&mut self, round: u64) {
        self.timeouts = self.timeouts.split_off(&round);
        self.votes.retain(|_, set| set.round >= round);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_core::{hash_blake3, serialize, KeyPair, MsgType, Signature, View, Vote};

    fn msg(from: &KeyPair) -> Message {
        Message {
            code: MsgType::Timeout as u8,
            payload: vec![],
            address: from.address,
            signature: Signature::default(),
        }
    }

    fn vote_msg(from: &KeyPair, hash: Hash, round: u64) -> Message {
        let vote = Vote {
            epoch: 0,
            view: View::new(1, round),
            hash,
            state_root: Hash::ZERO,
            parent_hash: Hash::ZERO,
            parent_view: View::new(0, 0),
            committed_seal: Signature::default(),
        };
        Message {
            code: MsgType::Vote as u8,
            payload: serialize::to_bytes(&vote).unwrap(),
            address: from.address,
            signature: Signature::default(),
        }
    }

    fn setup() -> (Vec<KeyPair>, MessagePool) {
        let keys: Vec<_> = (0..4).map(KeyPair::from_seed).collect();
        let set = ValidatorSet::new(keys.iter().map(|k| k.address).collect()).unwrap();
        (keys, MessagePool::new(&set))
    }

    #[test]
    fn test_duplicate_vote_rejected() {
        let (keys, mut pool) = setup();
        let hash = hash_blake3(b"block");
        assert_eq!(pool.add_vote(hash, vote_msg(&keys[0], hash, 1)).unwrap(), 1);
        assert!(matches!(
            pool.add_vote(hash, vote_msg(&keys[0], hash, 1)),
            Err(ConsensusError::DuplicateMessage)
        ));
        assert_eq!(pool.add_vote(hash, vote_msg(&keys[1], hash, 1)).unwrap(), 2);
        assert_eq!(pool.vote_size(&hash), 2);

        // Distinct hashes are counted separately.
        let other = hash_blake3(b"other");
        assert_eq!(pool.add_vote(other, vote_msg(&keys[0], other, 1)).unwrap(), 1);
        assert_eq!(pool.votes(&hash).len(), 2);

        pool.clear_votes(&hash);
        assert_eq!(pool.vote_size(&hash), 0);
    }

    #[test]
    fn test_duplicate_timeout_rejected() {
        let (keys, mut pool) = setup();
        pool.add_timeout(3, msg(&keys[2])).unwrap();
        assert!(matches!(
            pool.add_timeout(3, msg(&keys[2])),
            Err(ConsensusError::DuplicateMessage)
        ));
        pool.add_timeout(4, msg(&keys[2])).unwrap();
        assert_eq!(pool.timeout_size(3), 1);
        assert_eq!(pool.timeouts(4).len(), 1);
    }

    #[test]
    fn test_unknown_validator_rejected() {
        let (_, mut pool) = setup();
        let outsider = KeyPair::from_seed(77);
        let hash = hash_blake3(b"x");
        assert!(matches!(
            pool.add_vote(hash, vote_msg(&outsider, hash, 1)),
            Err(ConsensusError::UnauthorizedAddress)
        ));
        assert!(matches!(
            pool.add_timeout(1, msg(&outsider)),
            Err(ConsensusError::UnauthorizedAddress)
        ));

        // Rejected senders leave no empty sets behind.
        assert!(pool.votes.is_empty());
        assert!(pool.timeouts.is_empty());
    }

    #[test]
    fn test_prune_old_rounds() {
        let (keys, mut pool) = setup();
        for round in 1..=4 {
            pool.add_timeout(round, msg(&keys[0])).unwrap();
        }
        pool.prune(3);
        assert_eq!(pool.timeout_size(1), 0);
        assert_eq!(pool.timeout_size(2), 0);
        assert_eq!(pool.timeout_size(3), 1);
        assert_eq!(pool.timeout_size(4), 1);
    }

    #[test]
    fn test_prune_drops_unfinished_vote_sets() {
        let (keys, mut pool) = setup();
        let stale = hash_blake3(b"stale");
        let current = hash_blake3(b"current");
        pool.add_vote(stale, vote_msg(&keys[1], stale, 2)).unwrap();
        pool.add_vote(current, vote_msg(&keys[1], current, 5)).unwrap();

        pool.prune(5);
        assert_eq!(pool.vote_size(&stale), 0);
        assert_eq!(pool.vote_size(&current), 1);
        assert_eq!(pool.votes.len(), 1);
    }
}
