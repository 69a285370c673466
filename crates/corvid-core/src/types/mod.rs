pub mod block;
pub mod cert;
pub mod extra;
pub mod message;
pub mod view;

pub use block::{Block, BlockHeader};
pub use cert::{QuorumCert, TimeoutCert};
pub use extra::{filter_seals, HeaderExtra, Salt, ValidatorSeal, EXTRA_VANITY};
pub use message::{Message, MsgType, Proposal, TimeoutEvent, Vote};
pub use view::View;
