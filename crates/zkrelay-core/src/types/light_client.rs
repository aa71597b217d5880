use serde::{Deserialize, Serialize};

use super::primitives::{hex_bytes32, ChainId};
use crate::config::ConfigError;
use crate::plonk::ProofBundle;

/// Deploy-time parameters of one light client instance.
/// Field names follow the deployment JSON (`zkLightClients[i].deploy`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightClientConfig {
    /// Root of the genesis validator set; binds proofs to one source chain.
    #[serde(with = "hex_bytes32")]
    pub genesis_validators_root: [u8; 32],
    /// Unix time of slot 0.
    pub genesis_time: u64,
    pub seconds_per_slot: u64,
    pub slots_per_period: u64,
    /// Period of the initial sync committee.
    pub sync_committee_period: u64,
    /// Poseidon commitment to the initial sync committee.
    #[serde(with = "hex_bytes32")]
    pub sync_committee_poseidon: [u8; 32],
    pub source_chain_id: ChainId,
    /// Minimum participation a step update must carry.
    pub finality_threshold: u64,
}

impl LightClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("secondsPerSlot", self.seconds_per_slot),
            ("slotsPerPeriod", self.slots_per_period),
            ("finalityThreshold", self.finality_threshold),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidField {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    pub fn period_at_slot(&self, slot: u64) -> u64 {
        slot / self.slots_per_period.max(1)
    }

    /// Slot in progress at unix time `now`; slot 0 before genesis.
    pub fn slot_at(&self, now: u64) -> u64 {
        now.saturating_sub(self.genesis_time) / self.seconds_per_slot.max(1)
    }
}

/// An accepted header. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightClientHeader {
    pub attested_slot: u64,
    pub finalized_slot: u64,
    #[serde(with = "hex_bytes32")]
    pub finalized_header_root: [u8; 32],
    #[serde(with = "hex_bytes32")]
    pub execution_state_root: [u8; 32],
    pub participation: u64,
}

/// The record consumed by `step`.
///
/// The proof bundle is flattened so the JSON carries `proof`, `init_params`
/// and `columns_rotations` next to the header fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    pub attested_slot: u64,
    pub finalized_slot: u64,
    pub participation: u64,
    #[serde(with = "hex_bytes32")]
    pub finalized_header_root: [u8; 32],
    #[serde(with = "hex_bytes32")]
    pub execution_state_root: [u8; 32],
    #[serde(flatten)]
    pub proof: ProofBundle,
}

impl StepUpdate {
    pub fn header(&self) -> LightClientHeader {
        LightClientHeader {
            attested_slot: self.attested_slot,
            finalized_slot: self.finalized_slot,
            finalized_header_root: self.finalized_header_root,
            execution_state_root: self.execution_state_root,
            participation: self.participation,
        }
    }
}

/// The record consumed by `rotate`: the committee for `period`, proven
/// against the committee of `period - 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateUpdate {
    pub period: u64,
    #[serde(with = "hex_bytes32")]
    pub sync_committee_poseidon: [u8; 32],
    #[serde(flatten)]
    pub proof: ProofBundle,
}
