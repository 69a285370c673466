use corvid_core::Address;

use crate::error::ConsensusError;

/// Ordered validator list with round-robin proposer selection.
///
/// Treated as an immutable value: each round takes its own snapshot through
/// [`ValidatorSet::with_proposer`] instead of rotating a shared instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<Address>,
    proposer_index: usize,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Address>) -> Result<Self, ConsensusError> {
        if validators.is_empty() {
            return Err(ConsensusError::EmptyValidatorSet);
        }
        Ok(ValidatorSet {
            validators,
            proposer_index: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Tolerated Byzantine validators: f = (n - 1) / 3
    pub fn f(&self) -> usize {
        (self.len() - 1) / 3
    }

    /// Quorum size ceil((2n + 1) / 3), which is 2f + 1 when n = 3f + 1
    pub fn q(&self) -> usize {
        (2 * self.len() + 3) / 3
    }

    pub fn address_list(&self) -> Vec<Address> {
        self.validators.clone()
    }

    /// Index and address of a member
    pub fn get_by_address(&self, address: &Address) -> Option<(usize, Address)> {
        self.validators
            .iter()
            .position(|v| v == address)
            .map(|i| (i, self.validators[i]))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.validators.contains(address)
    }

    /// Round-robin proposer for `round`
    pub fn calc_proposer_by_index(&self, round: u64) -> Address {
        self.validators[(round % self.len() as u64) as usize]
    }

    /// Copy of this set with the proposer fixed for `round`
    pub fn with_proposer(&self, round: u64) -> Self {
        ValidatorSet {
            validators: self.validators.clone(),
            proposer_index: (round % self.len() as u64) as usize,
        }
    }

    pub fn get_proposer(&self) -> Address {
        self.validators[self.proposer_index]
    }

    pub fn is_proposer(&self, address: &Address) -> bool {
        self.get_proposer() == *address
    }
}
