//! Per-chain message bus.
//!
//! Outbound, `send` queues a message under the next nonce for its
//! destination. Inbound, `execute_message` runs a relayed oracle request
//! through the transition manager and the bound oracle, at most once per
//! message hash.

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{Bytes, B256};
use thiserror::Error;
use tracing::{info, warn};

use super::events::{Event, EventLog};
use super::oracle::OracleError;
use super::transition_manager::{TransitionError, TransitionManager};
use crate::error::ErrorKind;
use crate::sync;
use crate::types::{
    normalize_address, AddressInput, ChainId, Message, MessageError, OracleRequest,
    MESSAGE_VERSION,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("Sending is disabled on this router")]
    SendingDisabled,

    #[error(transparent)]
    Malformed(#[from] MessageError),

    #[error("Message for chain {destination_chain_id} delivered to chain {chain_id}")]
    WrongDestination {
        chain_id: ChainId,
        destination_chain_id: ChainId,
    },

    #[error("Messages from chain {source_chain_id} are not accepted")]
    SourceNotAllowed { source_chain_id: ChainId },

    #[error("Transition manager serves router {expected}, not {actual}")]
    RouterMismatch { expected: B256, actual: B256 },

    #[error("Message envelope and request disagree on {field}")]
    EnvelopeMismatch { field: &'static str },

    #[error("Message {hash} already executed")]
    AlreadyExecuted { hash: B256 },

    #[error("Transition manager has no oracle bound")]
    NoOracle,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl RouterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::Malformed(e) => e.kind(),
            RouterError::EnvelopeMismatch { .. } => ErrorKind::Malformed,
            RouterError::AlreadyExecuted { .. } => ErrorKind::ReplayedMessage,
            RouterError::NoOracle => ErrorKind::UnregisteredHandler,
            RouterError::Transition(e) => e.kind(),
            RouterError::Oracle(e) => e.kind(),
            RouterError::SendingDisabled
            | RouterError::WrongDestination { .. }
            | RouterError::SourceNotAllowed { .. }
            | RouterError::RouterMismatch { .. } => ErrorKind::Configuration,
        }
    }
}

#[derive(Debug)]
pub struct Router {
    chain_id: ChainId,
    address: B256,
    allowed_sources: BTreeSet<ChainId>,
    sending_enabled: bool,
    next_nonce: BTreeMap<ChainId, u64>,
    executed: BTreeSet<B256>,
    events: EventLog,
}

impl Router {
    pub fn new(
        chain_id: ChainId,
        address: impl Into<AddressInput>,
        allowed_sources: impl IntoIterator<Item = ChainId>,
        sending_enabled: bool,
    ) -> Self {
        Self {
            chain_id,
            address: normalize_address(address),
            allowed_sources: allowed_sources.into_iter().collect(),
            sending_enabled,
            next_nonce: BTreeMap::new(),
            executed: BTreeSet::new(),
            events: EventLog::new(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn address(&self) -> B256 {
        self.address
    }

    pub fn set_sending_enabled(&mut self, enabled: bool) {
        self.sending_enabled = enabled;
    }

    /// Queue `data` for `destination` on `destination_chain_id` and return
    /// its nonce. Nonces start at 1 per destination chain.
    pub fn send(
        &mut self,
        destination_chain_id: ChainId,
        destination: impl Into<AddressInput>,
        data: impl Into<Bytes>,
    ) -> Result<u64, RouterError> {
        if !self.sending_enabled {
            return Err(RouterError::SendingDisabled);
        }
        let counter = self.next_nonce.entry(destination_chain_id).or_insert(1);
        let nonce = *counter;
        *counter += 1;

        let message = Message {
            version: MESSAGE_VERSION,
            nonce,
            source_chain_id: self.chain_id,
            sender: self.address,
            destination_chain_id,
            target: normalize_address(destination),
            payload: data.into(),
        };
        let message_hash = message.hash();
        self.events.emit(Event::SentMessage {
            message,
            message_hash,
        });
        info!(destination_chain_id, nonce, "Message sent");
        Ok(nonce)
    }

    /// Execute a relayed message carrying an oracle request.
    ///
    /// 1. Decode and check the envelope is for this chain from an allowed source
    /// 2. Reject a message hash already executed
    /// 3. Verify the request's update through the transition manager
    /// 4. Deliver the request through the manager's oracle
    /// 5. Record the transition and mark the message executed
    ///
    /// Any failure before step 5 leaves the router untouched.
    ///
    /// Trust: `message.sender` is not checked against a known source AMB or
    /// oracle, and the request's target data is not bound to the verified
    /// transition. Delivery is only as sound as the request handler's own
    /// lookup of the state it needs from the light client.
    pub fn execute_message(
        &mut self,
        encoded: &[u8],
        transitions: &mut TransitionManager,
    ) -> Result<Vec<u8>, RouterError> {
        // 1. Envelope
        let message = Message::decode(encoded)?;
        if message.destination_chain_id != self.chain_id {
            return Err(RouterError::WrongDestination {
                chain_id: self.chain_id,
                destination_chain_id: message.destination_chain_id,
            });
        }
        if !self.allowed_sources.contains(&message.source_chain_id) {
            return Err(RouterError::SourceNotAllowed {
                source_chain_id: message.source_chain_id,
            });
        }
        if transitions.router() != self.address {
            return Err(RouterError::RouterMismatch {
                expected: self.address,
                actual: transitions.router(),
            });
        }

        // 2. Replay guard
        let hash = message.hash();
        if self.executed.contains(&hash) {
            warn!(%hash, nonce = message.nonce, "Replayed message rejected");
            return Err(RouterError::AlreadyExecuted { hash });
        }

        let request = OracleRequest::decode(&message.payload)?;
        check_envelope(&message, &request)?;

        // 3. Proof of the originating transition
        let transition = transitions.verify_update(
            request.source_chain_id,
            request.proof_system(),
            &request.proof,
        )?;

        // 4. Delivery
        let oracle = transitions.oracle().ok_or(RouterError::NoOracle)?;
        let response = sync::read(oracle).deliver(&request)?;

        // 5. Commit
        transitions.record(transition);
        self.executed.insert(hash);
        self.events.emit(Event::ExecutedMessage {
            source_chain_id: message.source_chain_id,
            nonce: message.nonce,
            message_hash: hash,
        });
        info!(
            source_chain_id = message.source_chain_id,
            nonce = message.nonce,
            slot = transition.slot,
            "Message executed"
        );
        Ok(response)
    }

    pub fn is_executed(&self, hash: &B256) -> bool {
        self.executed.contains(hash)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}

fn check_envelope(message: &Message, request: &OracleRequest) -> Result<(), RouterError> {
    let mismatch = if request.nonce != message.nonce {
        Some("nonce")
    } else if request.source_chain_id != message.source_chain_id {
        Some("source chain")
    } else if request.destination_chain_id != message.destination_chain_id {
        Some("destination chain")
    } else if request.target_contract != message.target {
        Some("target")
    } else {
        None
    };
    match mismatch {
        Some(field) => Err(RouterError::EnvelopeMismatch { field }),
        None => Ok(()),
    }
}
