//! Proof-carrying updates for tests and local simulations.
//!
//! Proofs come from the addition fixture circuit, so they are accepted by a
//! light client wired with [`addition_gates`](crate::plonk::prover::addition_gates)
//! for both step and rotate.

use super::sync_committee::{rotate_public_input, step_public_input};
use crate::plonk::prover::{addition_proof, ProverError};
use crate::types::{LightClientConfig, LightClientHeader, RotateUpdate, StepUpdate};

/// A step update for `header`, proven against `committee`.
pub fn prove_step(
    config: &LightClientConfig,
    committee: &[u8; 32],
    header: &LightClientHeader,
) -> Result<StepUpdate, ProverError> {
    let public_input = step_public_input(committee, &config.genesis_validators_root, header);
    Ok(StepUpdate {
        attested_slot: header.attested_slot,
        finalized_slot: header.finalized_slot,
        participation: header.participation,
        finalized_header_root: header.finalized_header_root,
        execution_state_root: header.execution_state_root,
        proof: addition_proof(&public_input)?,
    })
}

/// A rotate update installing `next` for `period`, proven against `current`.
pub fn prove_rotate(
    config: &LightClientConfig,
    current: &[u8; 32],
    next: &[u8; 32],
    period: u64,
) -> Result<RotateUpdate, ProverError> {
    let public_input =
        rotate_public_input(current, next, period, &config.genesis_validators_root);
    Ok(RotateUpdate {
        period,
        sync_committee_poseidon: *next,
        proof: addition_proof(&public_input)?,
    })
}

/// A header at `attested_slot`, finalized one slot earlier, with roots
/// derived from the slot.
pub fn header_at(attested_slot: u64, participation: u64) -> LightClientHeader {
    let finalized_slot = attested_slot.saturating_sub(1);
    let mut finalized_header_root = [0x11; 32];
    finalized_header_root[24..].copy_from_slice(&finalized_slot.to_be_bytes());
    let mut execution_state_root = [0x22; 32];
    execution_state_root[24..].copy_from_slice(&finalized_slot.to_be_bytes());
    LightClientHeader {
        attested_slot,
        finalized_slot,
        finalized_header_root,
        execution_state_root,
        participation,
    }
}
