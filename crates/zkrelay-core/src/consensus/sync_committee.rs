//! Sync-committee commitments and the public inputs a proof is checked against.
//!
//! The light client never sees committee keys. Each period's committee is a
//! single Poseidon commitment, and every step or rotate proof must carry it
//! (together with the header fields it attests to) as public input. A proof
//! produced against any other committee, chain or header fails the
//! public-input check in the verifier.

use std::collections::BTreeMap;

use crate::plonk::{split_word, Fp};
use crate::types::LightClientHeader;

/// Number of field elements in a step public input.
pub const STEP_PUBLIC_INPUT_LEN: usize = 11;

/// Number of field elements in a rotate public input.
pub const ROTATE_PUBLIC_INPUT_LEN: usize = 7;

/// Committee commitments by period.
///
/// Exactly one commitment per period. Older periods are kept only until
/// `prune_below` drops them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncCommitteeSet {
    by_period: BTreeMap<u64, [u8; 32]>,
}

impl SyncCommitteeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `commitment` for `period`. Returns the commitment previously
    /// installed for that period, if any, without replacing it.
    pub fn insert(&mut self, period: u64, commitment: [u8; 32]) -> Option<[u8; 32]> {
        match self.by_period.get(&period) {
            Some(existing) => Some(*existing),
            None => {
                self.by_period.insert(period, commitment);
                None
            }
        }
    }

    pub fn get(&self, period: u64) -> Option<[u8; 32]> {
        self.by_period.get(&period).copied()
    }

    /// Highest period with an installed committee.
    pub fn latest_period(&self) -> Option<u64> {
        self.by_period.keys().next_back().copied()
    }

    /// Forget committees of periods before `period`.
    pub fn prune_below(&mut self, period: u64) {
        self.by_period = self.by_period.split_off(&period);
    }

    pub fn len(&self) -> usize {
        self.by_period.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_period.is_empty()
    }
}

/// Public input of a step proof:
/// `[committee(2), genesisValidatorsRoot(2), attestedSlot, finalizedSlot,
///   participation, finalizedHeaderRoot(2), executionStateRoot(2)]`.
///
/// 32-byte words are split into two 128-bit limbs so no value is reduced.
pub fn step_public_input(
    committee: &[u8; 32],
    genesis_validators_root: &[u8; 32],
    header: &LightClientHeader,
) -> Vec<Fp> {
    let mut input = Vec::with_capacity(STEP_PUBLIC_INPUT_LEN);
    input.extend(split_word(committee));
    input.extend(split_word(genesis_validators_root));
    input.push(Fp::from(header.attested_slot));
    input.push(Fp::from(header.finalized_slot));
    input.push(Fp::from(header.participation));
    input.extend(split_word(&header.finalized_header_root));
    input.extend(split_word(&header.execution_state_root));
    input
}

/// Public input of a rotate proof:
/// `[current(2), next(2), nextPeriod, genesisValidatorsRoot(2)]`.
pub fn rotate_public_input(
    current: &[u8; 32],
    next: &[u8; 32],
    next_period: u64,
    genesis_validators_root: &[u8; 32],
) -> Vec<Fp> {
    let mut input = Vec::with_capacity(ROTATE_PUBLIC_INPUT_LEN);
    input.extend(split_word(current));
    input.extend(split_word(next));
    input.push(Fp::from(next_period));
    input.extend(split_word(genesis_validators_root));
    input
}
