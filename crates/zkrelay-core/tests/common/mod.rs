#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use alloy_primitives::B256;
use zkrelay_core::bridge::{HandlerError, RequestHandler, ResponseHandler};
use zkrelay_core::consensus::fixtures::prove_step;
use zkrelay_core::consensus::{LightClient, ProtocolState, SharedProtocolState};
use zkrelay_core::plonk::prover::addition_gates;
use zkrelay_core::sync::{self, lock, Shared};
use zkrelay_core::types::{ChainId, LightClientConfig, LightClientHeader, StepUpdate};
use zkrelay_core::PlaceholderVerifier;

pub const COMMITTEE: [u8; 32] = [0xC0; 32];
pub const FINALITY_THRESHOLD: u64 = 342;

pub fn config(source_chain_id: ChainId) -> LightClientConfig {
    LightClientConfig {
        genesis_validators_root: [0x4b; 32],
        genesis_time: 1_606_824_023,
        seconds_per_slot: 12,
        slots_per_period: 8192,
        sync_committee_period: 0,
        sync_committee_poseidon: COMMITTEE,
        source_chain_id,
        finality_threshold: FINALITY_THRESHOLD,
    }
}

pub fn light_client(source_chain_id: ChainId) -> (Shared<LightClient>, SharedProtocolState) {
    let protocol_state = sync::shared(ProtocolState::new(source_chain_id));
    let light_client = LightClient::new(
        config(source_chain_id),
        Arc::new(PlaceholderVerifier::default()),
        addition_gates(),
        addition_gates(),
        protocol_state.clone(),
    )
    .expect("valid light client config");
    (sync::shared(light_client), protocol_state)
}

/// A proven step finalizing `finalized_slot` with `execution_state_root`.
pub fn step(
    source_chain_id: ChainId,
    finalized_slot: u64,
    execution_state_root: [u8; 32],
) -> StepUpdate {
    let header = LightClientHeader {
        attested_slot: finalized_slot + 1,
        finalized_slot,
        finalized_header_root: [finalized_slot as u8; 32],
        execution_state_root,
        participation: 400,
    };
    prove_step(&config(source_chain_id), &COMMITTEE, &header).expect("fixture proof")
}

/// Returns a fixed magic number once the light client has a state root for
/// the slot named in the request data.
#[derive(Debug)]
pub struct MagicRequestHandler {
    pub light_client: Shared<LightClient>,
    pub magic: u32,
}

impl RequestHandler for MagicRequestHandler {
    fn handle_request(
        &self,
        _source_chain_id: ChainId,
        _nonce: u64,
        data: &[u8],
    ) -> Result<Vec<u8>, HandlerError> {
        let slot: [u8; 8] = data
            .try_into()
            .map_err(|_| HandlerError::Rejected("expected an 8-byte slot".into()))?;
        let slot = u64::from_be_bytes(slot);
        match sync::read(&self.light_client).execution_state_root(slot) {
            Some(_) => Ok(self.magic.to_be_bytes().to_vec()),
            None => Err(HandlerError::Rejected(format!("no state root at slot {slot}"))),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingResponseHandler {
    pub responses: Mutex<Vec<(ChainId, u64, Vec<u8>)>>,
}

impl RecordingResponseHandler {
    pub fn calls(&self) -> Vec<(ChainId, u64, Vec<u8>)> {
        lock(&self.responses).clone()
    }
}

impl ResponseHandler for RecordingResponseHandler {
    fn handle_response(
        &self,
        source_chain_id: ChainId,
        nonce: u64,
        response: &[u8],
    ) -> Result<(), HandlerError> {
        lock(&self.responses).push((source_chain_id, nonce, response.to_vec()));
        Ok(())
    }
}

pub fn address(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}
