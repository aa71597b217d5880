//! Cross-chain request broker.
//!
//! On the source side the oracle packages requests into messages with a
//! per-destination nonce. On the destination side it hands a proven request
//! to the request/response handler pair registered for the source chain.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Bytes, B256};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::events::{Event, EventLog};
use super::handler::{HandlerError, RequestHandler, ResponseHandler};
use crate::error::ErrorKind;
use crate::types::{
    normalize_address, AddressInput, ChainId, Message, OracleRequest, ProofSystemId,
    MESSAGE_VERSION,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("Nonce {nonce} to chain {destination_chain_id} is already used by a different request")]
    NonceConflict {
        destination_chain_id: ChainId,
        nonce: u64,
    },

    #[error("No response handler registered for chain {chain_id}")]
    NoResponseHandler { chain_id: ChainId },

    #[error("Request targets {target}, handler for chain {chain_id} is {registered}")]
    TargetMismatch {
        chain_id: ChainId,
        target: B256,
        registered: B256,
    },

    #[error("Request for chain {destination_chain_id} delivered to chain {chain_id}")]
    WrongDestination {
        chain_id: ChainId,
        destination_chain_id: ChainId,
    },

    #[error("Request handler failed: {0}")]
    Request(HandlerError),

    #[error("Response handler failed: {0}")]
    Response(HandlerError),
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OracleError::NonceConflict { .. } => ErrorKind::ReplayedMessage,
            OracleError::NoResponseHandler { .. } => ErrorKind::UnregisteredHandler,
            OracleError::TargetMismatch { .. } | OracleError::WrongDestination { .. } => {
                ErrorKind::Configuration
            }
            OracleError::Request(_) | OracleError::Response(_) => ErrorKind::ExecutionFailed,
        }
    }
}

/// The handler pair serving requests from one source chain.
#[derive(Clone)]
pub struct ResponseHandlerPair {
    /// Address requests must target to reach `request`.
    pub request_handler_address: B256,
    pub request: Arc<dyn RequestHandler>,
    pub response: Arc<dyn ResponseHandler>,
}

impl fmt::Debug for ResponseHandlerPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandlerPair")
            .field("request_handler_address", &self.request_handler_address)
            .finish_non_exhaustive()
    }
}

/// Arguments of [`Oracle::commit_request`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRequest {
    pub destination_chain_id: ChainId,
    pub target_contract: AddressInput,
    pub target_data: Bytes,
    /// Zero assigns the next free nonce for the destination.
    pub nonce: u64,
    pub proof: Bytes,
    pub proof_system_id: ProofSystemId,
}

#[derive(Debug)]
pub struct Oracle {
    chain_id: ChainId,
    address: B256,
    next_nonce: BTreeMap<ChainId, u64>,
    committed: BTreeMap<(ChainId, u64), OracleRequest>,
    handlers: BTreeMap<ChainId, ResponseHandlerPair>,
    events: EventLog,
}

impl Oracle {
    pub fn new(chain_id: ChainId, address: impl Into<AddressInput>) -> Self {
        Self {
            chain_id,
            address: normalize_address(address),
            next_nonce: BTreeMap::new(),
            committed: BTreeMap::new(),
            handlers: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn address(&self) -> B256 {
        self.address
    }

    /// Package a request for relay and return the message carrying it.
    ///
    /// A caller-supplied nonce is used as is. Committing the same request
    /// under the same nonce again returns the original message without a new
    /// event; a different request under a used nonce is a `NonceConflict`.
    /// Auto-assigned nonces skip every nonce already taken.
    pub fn commit_request(&mut self, args: CommitRequest) -> Result<Message, OracleError> {
        let destination = args.destination_chain_id;
        let mut request = OracleRequest {
            nonce: args.nonce,
            source_chain_id: self.chain_id,
            destination_chain_id: destination,
            target_contract: normalize_address(args.target_contract),
            target_data: args.target_data,
            proof: args.proof,
            proof_system_id: args.proof_system_id.0,
        };

        if request.nonce == 0 {
            request.nonce = self.assign_nonce(destination);
        } else if let Some(existing) = self.committed.get(&(destination, request.nonce)) {
            if *existing != request {
                warn!(
                    destination,
                    nonce = request.nonce,
                    "Nonce reused for a different request"
                );
                return Err(OracleError::NonceConflict {
                    destination_chain_id: destination,
                    nonce: request.nonce,
                });
            }
            debug!(destination, nonce = request.nonce, "Request already committed");
            return Ok(self.envelope(&request));
        }

        let message = self.envelope(&request);
        self.committed
            .insert((destination, request.nonce), request.clone());
        self.events.emit(Event::RequestCommitted {
            request: request.clone(),
            message_hash: message.hash(),
        });
        info!(
            destination,
            nonce = request.nonce,
            proof_system = %args.proof_system_id,
            "Request committed"
        );
        Ok(message)
    }

    fn assign_nonce(&mut self, destination: ChainId) -> u64 {
        let counter = self.next_nonce.entry(destination).or_insert(1);
        while self.committed.contains_key(&(destination, *counter)) {
            *counter += 1;
        }
        let nonce = *counter;
        *counter += 1;
        nonce
    }

    fn envelope(&self, request: &OracleRequest) -> Message {
        Message {
            version: MESSAGE_VERSION,
            nonce: request.nonce,
            source_chain_id: self.chain_id,
            sender: self.address,
            destination_chain_id: request.destination_chain_id,
            target: request.target_contract,
            payload: Bytes::from(request.encode()),
        }
    }

    pub fn committed_request(&self, destination: ChainId, nonce: u64) -> Option<&OracleRequest> {
        self.committed.get(&(destination, nonce))
    }

    /// Bind the handler pair for requests from `chain_id`, replacing any
    /// previous pair.
    pub fn set_custom_response_handler(
        &mut self,
        chain_id: ChainId,
        request_handler_address: impl Into<AddressInput>,
        request: Arc<dyn RequestHandler>,
        response: Arc<dyn ResponseHandler>,
    ) {
        let pair = ResponseHandlerPair {
            request_handler_address: normalize_address(request_handler_address),
            request,
            response,
        };
        if self.handlers.insert(chain_id, pair).is_some() {
            warn!(chain_id, "Response handler pair replaced");
        } else {
            info!(chain_id, "Response handler pair registered");
        }
    }

    pub fn response_handler(&self, chain_id: ChainId) -> Option<&ResponseHandlerPair> {
        self.handlers.get(&chain_id)
    }

    /// Run a proven request through the handler pair of its source chain:
    /// the request handler's output is passed to the response handler.
    pub fn deliver(&self, request: &OracleRequest) -> Result<Vec<u8>, OracleError> {
        if request.destination_chain_id != self.chain_id {
            return Err(OracleError::WrongDestination {
                chain_id: self.chain_id,
                destination_chain_id: request.destination_chain_id,
            });
        }
        let source = request.source_chain_id;
        let pair = self
            .handlers
            .get(&source)
            .ok_or(OracleError::NoResponseHandler { chain_id: source })?;
        if pair.request_handler_address != request.target_contract {
            return Err(OracleError::TargetMismatch {
                chain_id: source,
                target: request.target_contract,
                registered: pair.request_handler_address,
            });
        }

        let response = pair
            .request
            .handle_request(source, request.nonce, &request.target_data)
            .map_err(OracleError::Request)?;
        pair.response
            .handle_response(source, request.nonce, &response)
            .map_err(OracleError::Response)?;
        debug!(source, nonce = request.nonce, "Request delivered");
        Ok(response)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}
