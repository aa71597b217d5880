//! Capabilities the routing layer dispatches to.

use std::fmt::Debug;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consensus::{LightClient, LightClientError, StepOutcome};
use crate::error::ErrorKind;
use crate::sync::{self, Shared};
use crate::types::primitives::hex_bytes32;
use crate::types::{ChainId, StepUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("Malformed update: {0}")]
    MalformedUpdate(String),

    #[error("Handler serves chain {served}, update is for chain {requested}")]
    ChainMismatch { served: ChainId, requested: ChainId },

    #[error(transparent)]
    LightClient(#[from] LightClientError),

    #[error("Handler rejected the call: {0}")]
    Rejected(String),
}

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::MalformedUpdate(_) => ErrorKind::Malformed,
            HandlerError::ChainMismatch { .. } => ErrorKind::Configuration,
            HandlerError::LightClient(e) => e.kind(),
            HandlerError::Rejected(_) => ErrorKind::ExecutionFailed,
        }
    }
}

/// What a verifier handler vouches for: the source chain had `state_root`
/// at `slot`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub source_chain_id: ChainId,
    pub slot: u64,
    #[serde(with = "hex_bytes32")]
    pub state_root: [u8; 32],
}

/// One proof system's way of turning a raw update blob into a verified
/// state transition.
pub trait VerifierHandler: Debug + Send + Sync {
    fn verify_update(
        &self,
        source_chain_id: ChainId,
        raw_update: &[u8],
    ) -> Result<StateTransition, HandlerError>;
}

/// Invoked on the destination chain when a request arrives; the returned
/// bytes are the response.
pub trait RequestHandler: Debug + Send + Sync {
    fn handle_request(
        &self,
        source_chain_id: ChainId,
        nonce: u64,
        data: &[u8],
    ) -> Result<Vec<u8>, HandlerError>;
}

/// Receives the response produced by the paired [`RequestHandler`].
pub trait ResponseHandler: Debug + Send + Sync {
    fn handle_response(
        &self,
        source_chain_id: ChainId,
        nonce: u64,
        response: &[u8],
    ) -> Result<(), HandlerError>;
}

/// Destination of an AMB message.
pub trait MessageReceiver: Debug + Send + Sync {
    fn handle(&self, source_chain_id: ChainId, sender: B256, data: &[u8])
        -> Result<(), HandlerError>;
}

/// Verifier handler backed by a light client: the update blob is a JSON
/// [`StepUpdate`] and acceptance means an accepted (or already accepted) step.
#[derive(Debug, Clone)]
pub struct LightClientHandler {
    light_client: Shared<LightClient>,
}

impl LightClientHandler {
    pub fn new(light_client: Shared<LightClient>) -> Self {
        Self { light_client }
    }

    pub fn light_client(&self) -> &Shared<LightClient> {
        &self.light_client
    }
}

impl VerifierHandler for LightClientHandler {
    fn verify_update(
        &self,
        source_chain_id: ChainId,
        raw_update: &[u8],
    ) -> Result<StateTransition, HandlerError> {
        let update: StepUpdate = serde_json::from_slice(raw_update)
            .map_err(|e| HandlerError::MalformedUpdate(e.to_string()))?;

        let mut light_client = sync::write(&self.light_client);
        let served = light_client.config().source_chain_id;
        if served != source_chain_id {
            return Err(HandlerError::ChainMismatch {
                served,
                requested: source_chain_id,
            });
        }

        if light_client.step(&update)? == StepOutcome::Duplicate {
            debug!(slot = update.finalized_slot, "Update already applied");
        }
        Ok(StateTransition {
            source_chain_id,
            slot: update.finalized_slot,
            state_root: update.execution_state_root,
        })
    }
}
