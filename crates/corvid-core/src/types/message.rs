use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, Address, Hash, Signature};
use crate::error::CoreError;
use crate::serialize;
use crate::types::block::Block;
use crate::types::cert::{QuorumCert, TimeoutCert};
use crate::types::view::View;

/// Consensus message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MsgType {
    Proposal = 0,
    Vote = 1,
    Timeout = 2,
    TimeoutCert = 3,
}

impl MsgType {
    /// Tie-breaker between messages of the same view when replaying
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for MsgType {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MsgType::Proposal),
            1 => Ok(MsgType::Vote),
            2 => Ok(MsgType::Timeout),
            3 => Ok(MsgType::TimeoutCert),
            other => Err(CoreError::UnknownMessageCode(other)),
        }
    }
}

/// Signed envelope exchanged between validators.
///
/// `signature` covers [`Message::signing_hash`], which depends only on the
/// code and payload. Identical timeout payloads therefore yield identical
/// digests and their signatures aggregate into a [`TimeoutCert`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub code: u8,
    pub payload: Vec<u8>,
    pub address: Address,
    pub signature: Signature,
}

impl Message {
    pub fn signing_hash(code: MsgType, payload: &[u8]) -> Hash {
        let mut data = Vec::with_capacity(payload.len() + 1);
        data.push(code as u8);
        data.extend_from_slice(payload);
        hash_blake3(&data)
    }

    pub fn msg_type(&self) -> Result<MsgType, CoreError> {
        MsgType::try_from(self.code)
    }

    pub fn hash(&self) -> Result<Hash, CoreError> {
        Ok(Self::signing_hash(self.msg_type()?, &self.payload))
    }

    pub fn decode_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, CoreError> {
        serialize::from_bytes(&self.payload)
    }

    /// View the payload refers to, decoded according to the message code
    pub fn view(&self) -> Result<View, CoreError> {
        let view = match self.msg_type()? {
            MsgType::Proposal => self.decode_payload::<Proposal>()?.view,
            MsgType::Vote => self.decode_payload::<Vote>()?.view,
            MsgType::Timeout => self.decode_payload::<TimeoutEvent>()?.view,
            MsgType::TimeoutCert => self.decode_payload::<TimeoutCert>()?.view,
        };
        Ok(view)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        serialize::to_bytes(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        serialize::from_bytes(bytes)
    }
}

/// A leader's block for `view`, justified by the highest QC it knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub epoch: u64,
    pub view: View,
    pub block: Block,
    pub justify: QuorumCert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub epoch: u64,
    pub view: View,
    pub hash: Hash,
    pub state_root: Hash,
    pub parent_hash: Hash,
    pub parent_view: View,
    /// Signature over `seal_digest(hash)`, aggregated into the QC
    pub committed_seal: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutEvent {
    pub epoch: u64,
    pub view: View,
    pub digest: Hash,
}

impl TimeoutEvent {
    pub fn new(epoch: u64, view: View) -> Self {
        TimeoutEvent {
            epoch,
            view,
            digest: Self::digest_for(epoch, view),
        }
    }

    pub fn digest_for(epoch: u64, view: View) -> Hash {
        let mut data = b"corvid/timeout".to_vec();
        data.extend_from_slice(&epoch.to_be_bytes());
        data.extend_from_slice(&view.height.to_be_bytes());
        data.extend_from_slice(&view.round.to_be_bytes());
        hash_blake3(&data)
    }
}
