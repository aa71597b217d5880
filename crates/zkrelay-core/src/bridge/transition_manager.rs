//! Registry of verifier handlers keyed by `(source chain, proof system)`.
//!
//! Several proof systems can serve the same source chain; the id carried by
//! an update picks the handler. Registration is last-writer-wins.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::B256;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::events::{Event, EventLog};
use super::handler::{HandlerError, StateTransition, VerifierHandler};
use super::oracle::Oracle;
use crate::error::ErrorKind;
use crate::sync::{self, Shared};
use crate::types::{normalize_address, AddressInput, ChainId, ProofSystemId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("No verifier handler registered for chain {chain_id}, proof system {proof_system_id}")]
    NoHandlerRegistered {
        chain_id: ChainId,
        proof_system_id: ProofSystemId,
    },

    #[error("Handler returned a transition for chain {returned}, expected {expected}")]
    WrongChain { expected: ChainId, returned: ChainId },

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::NoHandlerRegistered { .. } => ErrorKind::UnregisteredHandler,
            TransitionError::WrongChain { .. } => ErrorKind::Configuration,
            TransitionError::Handler(e) => e.kind(),
        }
    }
}

pub struct TransitionManager {
    router: B256,
    handlers: BTreeMap<(ChainId, ProofSystemId), Arc<dyn VerifierHandler>>,
    oracle: Option<Shared<Oracle>>,
    /// Accepted transitions: `(chain, slot) → state root`.
    transitions: BTreeMap<(ChainId, u64), [u8; 32]>,
    events: EventLog,
}

impl fmt::Debug for TransitionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionManager")
            .field("router", &self.router)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("transitions", &self.transitions.len())
            .finish_non_exhaustive()
    }
}

impl TransitionManager {
    /// A manager serving the router at `router`.
    pub fn new(router: impl Into<AddressInput>) -> Self {
        Self {
            router: normalize_address(router),
            handlers: BTreeMap::new(),
            oracle: None,
            transitions: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    pub fn router(&self) -> B256 {
        self.router
    }

    /// Register `handler` for `(chain_id, proof_system_id)`, returning the
    /// handler it replaces.
    pub fn set_verifier_handler(
        &mut self,
        chain_id: ChainId,
        proof_system_id: ProofSystemId,
        handler: Arc<dyn VerifierHandler>,
    ) -> Option<Arc<dyn VerifierHandler>> {
        let previous = self.handlers.insert((chain_id, proof_system_id), handler);
        if previous.is_some() {
            warn!(chain_id, %proof_system_id, "Verifier handler overwritten");
        } else {
            info!(chain_id, %proof_system_id, "Verifier handler registered");
        }
        previous
    }

    pub fn verifier_handler(
        &self,
        chain_id: ChainId,
        proof_system_id: ProofSystemId,
    ) -> Option<&Arc<dyn VerifierHandler>> {
        self.handlers.get(&(chain_id, proof_system_id))
    }

    /// Bind the oracle this manager delivers to. Re-binding is allowed: it is
    /// logged and announced with `OracleRebound`, and every delivery from
    /// then on goes to the new oracle.
    pub fn set_oracle(&mut self, oracle: Shared<Oracle>) {
        let current = sync::read(&oracle).address();
        let previous = self.oracle.replace(oracle).map(|old| {
            let address = sync::read(&old).address();
            address
        });
        match previous {
            Some(previous) if previous != current => {
                warn!(%previous, %current, "Oracle re-bound")
            }
            Some(_) => debug!(%current, "Oracle re-bound to the same address"),
            None => info!(%current, "Oracle bound"),
        }
        if previous.is_some() {
            self.events.emit(Event::OracleRebound { previous, current });
        }
    }

    pub fn oracle(&self) -> Option<&Shared<Oracle>> {
        self.oracle.as_ref()
    }

    /// Dispatch `raw_update` to the handler registered for the key and
    /// return the transition it vouches for. Records nothing.
    pub fn verify_update(
        &self,
        chain_id: ChainId,
        proof_system_id: ProofSystemId,
        raw_update: &[u8],
    ) -> Result<StateTransition, TransitionError> {
        let handler = self
            .handlers
            .get(&(chain_id, proof_system_id))
            .ok_or(TransitionError::NoHandlerRegistered {
                chain_id,
                proof_system_id,
            })?;
        let transition = handler.verify_update(chain_id, raw_update)?;
        if transition.source_chain_id != chain_id {
            return Err(TransitionError::WrongChain {
                expected: chain_id,
                returned: transition.source_chain_id,
            });
        }
        Ok(transition)
    }

    /// Remember an accepted transition. Recording it again is a no-op.
    pub fn record(&mut self, transition: StateTransition) {
        let key = (transition.source_chain_id, transition.slot);
        if self.transitions.contains_key(&key) {
            return;
        }
        self.transitions.insert(key, transition.state_root);
        self.events.emit(Event::TransitionAccepted { transition });
        debug!(
            chain = transition.source_chain_id,
            slot = transition.slot,
            "Transition accepted"
        );
    }

    /// `verify_update` followed by `record`.
    pub fn submit_update(
        &mut self,
        chain_id: ChainId,
        proof_system_id: ProofSystemId,
        raw_update: &[u8],
    ) -> Result<StateTransition, TransitionError> {
        let transition = self.verify_update(chain_id, proof_system_id, raw_update)?;
        self.record(transition);
        Ok(transition)
    }

    pub fn transition(&self, chain_id: ChainId, slot: u64) -> Option<[u8; 32]> {
        self.transitions.get(&(chain_id, slot)).copied()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}
