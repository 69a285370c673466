use serde::{Deserialize, Serialize};
use std::fmt;

/// A point of protocol progress.
///
/// Ordered by height first, then round. Height tracks chain position, round
/// counts leader attempts and may advance without the height moving.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct View {
    pub height: u64,
    pub round: u64,
}

impl View {
    pub fn new(height: u64, round: u64) -> Self {
        View { height, round }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(h={}, r={})", self.height, self.round)
    }
}
