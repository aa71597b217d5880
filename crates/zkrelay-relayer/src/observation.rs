//! What the relayer sees on a source chain and carries to a destination.

use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use zkrelay_core::bridge::{message_storage_slot, Event};
use zkrelay_core::execution::WorldState;
use zkrelay_core::types::primitives::hex_bytes;
use zkrelay_core::types::{MessageInclusion, RotateUpdate, StepUpdate};

/// One unit of relayed work.
///
/// Delivery is at-least-once and unordered: the same observation may arrive
/// several times, and a message may arrive before the step that finalizes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Observation {
    /// A proven light-client step.
    Step(StepUpdate),
    /// A proven sync-committee rotation.
    Rotate(RotateUpdate),
    /// An AMB message with its storage inclusion proof.
    Inclusion(MessageInclusion),
    /// An encoded router envelope carrying an oracle request.
    Routed {
        #[serde(with = "hex_bytes")]
        message: Vec<u8>,
    },
}

impl Observation {
    /// Parse one observation from its JSON form.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("malformed observation")
    }

    pub fn label(&self) -> &'static str {
        match self {
            Observation::Step(_) => "step",
            Observation::Rotate(_) => "rotate",
            Observation::Inclusion(_) => "inclusion",
            Observation::Routed { .. } => "routed",
        }
    }
}

/// Build inclusion observations for every `SentMessage` in `events`.
///
/// `world` is the source chain's state at `slot`, and `source_amb` the
/// contract that emitted the events.
pub fn observe_sent_messages<'a>(
    events: impl IntoIterator<Item = &'a Event>,
    source_amb: Address,
    world: &WorldState,
    slot: u64,
) -> Vec<Observation> {
    let account_proof = world.account_proof(source_amb);
    let state_root = B256::from(world.state_root());
    events
        .into_iter()
        .filter_map(|event| match event {
            Event::SentMessage { message, .. } => Some(message),
            _ => None,
        })
        .map(|message| {
            let storage_key = message_storage_slot(message.destination_chain_id, message.nonce);
            Observation::Inclusion(MessageInclusion {
                block_number: slot,
                message: message.encode(),
                account_proof: account_proof.clone(),
                storage_proof: world.storage_proof(source_amb, storage_key),
                state_root,
                source_amb_address: source_amb,
            })
        })
        .collect()
}
