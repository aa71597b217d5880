//! Arbitrary message bridge: a point-to-point source/target pair.
//!
//! The source AMB stores the hash of every sent message in a storage
//! mapping `messages[destinationChainId][nonce]`. The target AMB accepts a
//! message only with an account proof of the source AMB and a storage proof
//! of that mapping entry, both against a state root the light client
//! recorded in [`ProtocolState`](crate::consensus::ProtocolState).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::events::{Event, EventLog};
use super::handler::{HandlerError, MessageReceiver};
use crate::config::ConfigError;
use crate::consensus::SharedProtocolState;
use crate::error::ErrorKind;
use crate::execution::{keccak256, verify_contract_storage, ProofError};
use crate::sync;
use crate::types::{
    normalize_address, AddressInput, ChainId, Message, MessageError, MessageInclusion,
    MESSAGE_VERSION,
};

/// Storage slot of the `messages` mapping in the source AMB.
pub const MESSAGES_SLOT: u64 = 0;

/// Storage key of `messages[destination_chain_id][nonce]`, laid out the way
/// Solidity lays out nested mappings.
pub fn message_storage_slot(destination_chain_id: ChainId, nonce: u64) -> [u8; 32] {
    let mut outer = [0u8; 64];
    outer[28..32].copy_from_slice(&destination_chain_id.to_be_bytes());
    outer[56..64].copy_from_slice(&MESSAGES_SLOT.to_be_bytes());
    let inner_slot = keccak256(&outer);

    let mut inner = [0u8; 64];
    inner[24..32].copy_from_slice(&nonce.to_be_bytes());
    inner[32..].copy_from_slice(&inner_slot);
    keccak256(&inner)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmbError {
    #[error("Sending is disabled on this AMB")]
    SendingDisabled,

    #[error(transparent)]
    Malformed(#[from] MessageError),

    #[error("Message for chain {destination_chain_id} delivered to chain {chain_id}")]
    WrongDestination {
        chain_id: ChainId,
        destination_chain_id: ChainId,
    },

    #[error("No source AMB registered for chain {source_chain_id}")]
    UnknownSource { source_chain_id: ChainId },

    #[error("Proof is for source AMB {given}, chain is bound to {registered}")]
    SourceAmbMismatch { given: Address, registered: Address },

    #[error("Slot {slot} is beyond the light client head {head:?}")]
    FutureSlot { slot: u64, head: Option<u64> },

    #[error("No state root recorded for slot {slot}")]
    NoStateRoot { slot: u64 },

    #[error("Invalid inclusion proof: {0}")]
    InvalidInclusionProof(#[from] ProofError),

    #[error("Stored commitment {stored} does not match message hash {expected}")]
    CommitmentMismatch { stored: B256, expected: B256 },

    #[error("Message {hash} already executed")]
    AlreadyExecuted { hash: B256 },

    #[error("No receiver registered at {target}")]
    UnknownTarget { target: B256 },

    #[error("Receiver failed: {0}")]
    TargetFailed(HandlerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AmbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AmbError::Malformed(e) => e.kind(),
            AmbError::FutureSlot { .. } => ErrorKind::FutureSlotReference,
            AmbError::NoStateRoot { .. }
            | AmbError::InvalidInclusionProof(_)
            | AmbError::CommitmentMismatch { .. } => ErrorKind::InvalidInclusionProof,
            AmbError::AlreadyExecuted { .. } => ErrorKind::ReplayedMessage,
            AmbError::UnknownTarget { .. } => ErrorKind::UnregisteredHandler,
            AmbError::TargetFailed(_) => ErrorKind::ExecutionFailed,
            AmbError::Config(e) => e.kind(),
            AmbError::SendingDisabled
            | AmbError::WrongDestination { .. }
            | AmbError::UnknownSource { .. }
            | AmbError::SourceAmbMismatch { .. } => ErrorKind::Configuration,
        }
    }
}

/// The sending half. Its storage is what the target proves against.
#[derive(Debug)]
pub struct SourceAmb {
    chain_id: ChainId,
    address: Address,
    sending_enabled: bool,
    next_nonce: BTreeMap<ChainId, u64>,
    storage: BTreeMap<[u8; 32], [u8; 32]>,
    events: EventLog,
}

impl SourceAmb {
    pub fn new(chain_id: ChainId, address: Address, sending_enabled: bool) -> Self {
        Self {
            chain_id,
            address,
            sending_enabled,
            next_nonce: BTreeMap::new(),
            storage: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn set_sending_enabled(&mut self, enabled: bool) {
        self.sending_enabled = enabled;
    }

    /// Send `data` from `sender` to `destination` on another chain. Either
    /// address form gives the same message bytes.
    pub fn send(
        &mut self,
        sender: impl Into<AddressInput>,
        destination_chain_id: ChainId,
        destination: impl Into<AddressInput>,
        data: impl Into<Bytes>,
    ) -> Result<Message, AmbError> {
        if !self.sending_enabled {
            return Err(AmbError::SendingDisabled);
        }
        let counter = self.next_nonce.entry(destination_chain_id).or_insert(1);
        let nonce = *counter;
        *counter += 1;

        let message = Message {
            version: MESSAGE_VERSION,
            nonce,
            source_chain_id: self.chain_id,
            sender: normalize_address(sender),
            destination_chain_id,
            target: normalize_address(destination),
            payload: data.into(),
        };
        let message_hash = message.hash();
        self.storage.insert(
            message_storage_slot(destination_chain_id, nonce),
            message_hash.0,
        );
        self.events.emit(Event::SentMessage {
            message: message.clone(),
            message_hash,
        });
        debug!(destination_chain_id, nonce, "AMB message sent");
        Ok(message)
    }

    /// Contract storage: `slot → word`.
    pub fn storage(&self) -> impl Iterator<Item = ([u8; 32], [u8; 32])> + '_ {
        self.storage.iter().map(|(k, v)| (*k, *v))
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}

#[derive(Clone, Debug)]
struct SourceBinding {
    protocol_state: SharedProtocolState,
    source_amb: Address,
}

/// The receiving half.
pub struct TargetAmb {
    chain_id: ChainId,
    sources: BTreeMap<ChainId, SourceBinding>,
    receivers: BTreeMap<B256, Arc<dyn MessageReceiver>>,
    executed: BTreeSet<B256>,
    events: EventLog,
}

impl fmt::Debug for TargetAmb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetAmb")
            .field("chain_id", &self.chain_id)
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("executed", &self.executed.len())
            .finish_non_exhaustive()
    }
}

impl TargetAmb {
    /// Bind source chains to the protocol state tracking them and to the
    /// source AMB deployed there. The three lists are parallel.
    pub fn new(
        chain_id: ChainId,
        source_chain_ids: Vec<ChainId>,
        protocol_states: Vec<SharedProtocolState>,
        source_ambs: Vec<Address>,
    ) -> Result<Self, AmbError> {
        for (what, found) in [
            ("protocol states", protocol_states.len()),
            ("source AMBs", source_ambs.len()),
        ] {
            if found != source_chain_ids.len() {
                return Err(ConfigError::LengthMismatch {
                    what,
                    expected: source_chain_ids.len(),
                    found,
                }
                .into());
            }
        }

        let mut sources = BTreeMap::new();
        for ((chain, protocol_state), source_amb) in
            source_chain_ids.into_iter().zip(protocol_states).zip(source_ambs)
        {
            let tracked = sync::read(&protocol_state).source_chain_id();
            if tracked != chain {
                return Err(ConfigError::ChainMismatch {
                    expected: chain,
                    found: tracked,
                }
                .into());
            }
            if sources.contains_key(&chain) {
                return Err(ConfigError::DuplicateChain { chain_id: chain }.into());
            }
            sources.insert(
                chain,
                SourceBinding {
                    protocol_state,
                    source_amb,
                },
            );
        }

        Ok(Self {
            chain_id,
            sources,
            receivers: BTreeMap::new(),
            executed: BTreeSet::new(),
            events: EventLog::new(),
        })
    }

    /// Deliver messages addressed to `address` to `receiver`.
    pub fn register_receiver(
        &mut self,
        address: impl Into<AddressInput>,
        receiver: Arc<dyn MessageReceiver>,
    ) {
        let address = normalize_address(address);
        if self.receivers.insert(address, receiver).is_some() {
            warn!(%address, "Receiver replaced");
        }
    }

    /// Execute a message proven to be stored by the source AMB at `slot`.
    pub fn execute_message(
        &mut self,
        slot: u64,
        message_bytes: &[u8],
        account_proof: &[Vec<u8>],
        storage_proof: &[Vec<u8>],
    ) -> Result<(), AmbError> {
        let message = Message::decode(message_bytes)?;
        if message.destination_chain_id != self.chain_id {
            return Err(AmbError::WrongDestination {
                chain_id: self.chain_id,
                destination_chain_id: message.destination_chain_id,
            });
        }
        let binding = self.sources.get(&message.source_chain_id).ok_or(
            AmbError::UnknownSource {
                source_chain_id: message.source_chain_id,
            },
        )?;

        let hash = message.hash();
        if self.executed.contains(&hash) {
            warn!(%hash, nonce = message.nonce, "Replayed AMB message rejected");
            return Err(AmbError::AlreadyExecuted { hash });
        }

        // The trusted root: recorded, and not beyond the head.
        let state_root = {
            let state = sync::read(&binding.protocol_state);
            match state.head() {
                Some(head) if slot <= head => {}
                head => return Err(AmbError::FutureSlot { slot, head }),
            }
            state.state_root(slot).ok_or(AmbError::NoStateRoot { slot })?
        };

        let verified = verify_contract_storage(
            state_root,
            binding.source_amb.into_array(),
            account_proof,
            message_storage_slot(message.destination_chain_id, message.nonce),
            storage_proof,
        )?;
        if verified.value != hash.0 {
            return Err(AmbError::CommitmentMismatch {
                stored: B256::from(verified.value),
                expected: hash,
            });
        }

        let receiver = self
            .receivers
            .get(&message.target)
            .ok_or(AmbError::UnknownTarget {
                target: message.target,
            })?;
        receiver
            .handle(message.source_chain_id, message.sender, &message.payload)
            .map_err(AmbError::TargetFailed)?;

        self.executed.insert(hash);
        self.events.emit(Event::ExecutedMessage {
            source_chain_id: message.source_chain_id,
            nonce: message.nonce,
            message_hash: hash,
        });
        info!(
            source_chain_id = message.source_chain_id,
            nonce = message.nonce,
            slot,
            "AMB message executed"
        );
        Ok(())
    }

    /// `execute_message` from a relayer's inclusion record.
    pub fn execute_inclusion(&mut self, inclusion: &MessageInclusion) -> Result<(), AmbError> {
        let message = Message::decode(&inclusion.message)?;
        if let Some(binding) = self.sources.get(&message.source_chain_id) {
            if binding.source_amb != inclusion.source_amb_address {
                return Err(AmbError::SourceAmbMismatch {
                    given: inclusion.source_amb_address,
                    registered: binding.source_amb,
                });
            }
        }
        self.execute_message(
            inclusion.block_number,
            &inclusion.message,
            &inclusion.account_proof,
            &inclusion.storage_proof,
        )
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::consensus::ProtocolState;
    use crate::execution::WorldState;
    use crate::sync::lock;

    const SOURCE: ChainId = 5;
    const TARGET: ChainId = 100;

    #[derive(Debug, Default)]
    struct Inbox(Mutex<Vec<(ChainId, B256, Vec<u8>)>>);

    impl MessageReceiver for Inbox {
        fn handle(&self, source: ChainId, sender: B256, data: &[u8]) -> Result<(), HandlerError> {
            lock(&self.0).push((source, sender, data.to_vec()));
            Ok(())
        }
    }

    struct Bridge {
        source: SourceAmb,
        world: WorldState,
        protocol_state: SharedProtocolState,
        target: TargetAmb,
        inbox: Arc<Inbox>,
    }

    fn bridge() -> Bridge {
        let amb_address = Address::repeat_byte(0xAB);
        let protocol_state = sync::shared(ProtocolState::new(SOURCE));
        let mut target = TargetAmb::new(
            TARGET,
            vec![SOURCE],
            vec![protocol_state.clone()],
            vec![amb_address],
        )
        .unwrap();
        let inbox = Arc::new(Inbox::default());
        target.register_receiver(Address::repeat_byte(0xEE), inbox.clone());
        Bridge {
            source: SourceAmb::new(SOURCE, amb_address, true),
            world: WorldState::new(),
            protocol_state,
            target,
            inbox,
        }
    }

    impl Bridge {
        /// Send, then publish the source state at `slot`.
        fn send_and_finalize(&mut self, slot: u64, data: &'static [u8]) -> Message {
            let message = self
                .source
                .send(Address::repeat_byte(0x01), TARGET, Address::repeat_byte(0xEE), data)
                .unwrap();
            self.world
                .set_contract_storage(self.source.address(), self.source.storage());
            sync::write(&self.protocol_state)
                .record(slot, self.world.state_root())
                .unwrap();
            message
        }

        fn proofs(&self, message: &Message) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
            let amb = self.source.address();
            (
                self.world.account_proof(amb),
                self.world.storage_proof(
                    amb,
                    message_storage_slot(message.destination_chain_id, message.nonce),
                ),
            )
        }
    }

    #[test]
    fn test_message_slot_layout() {
        assert_ne!(message_storage_slot(1, 1), message_storage_slot(1, 2));
        assert_ne!(message_storage_slot(1, 1), message_storage_slot(2, 1));
    }

    #[test]
    fn test_send_overloads_normalize() {
        let mut a = SourceAmb::new(SOURCE, Address::repeat_byte(0xAB), true);
        let mut b = SourceAmb::new(SOURCE, Address::repeat_byte(0xAB), true);
        let destination = Address::repeat_byte(0x42);
        let first = a.send(Address::ZERO, 20, destination, vec![0u8]).unwrap();
        let second = b
            .send(Address::ZERO, 20, destination.into_word(), vec![0u8])
            .unwrap();
        assert_eq!(first.encode(), second.encode());
        assert_eq!(a.send(Address::ZERO, 20, destination, vec![0u8]).unwrap().nonce, 2);
    }

    #[test]
    fn test_sending_disabled() {
        let mut amb = SourceAmb::new(SOURCE, Address::ZERO, false);
        assert_eq!(
            amb.send(Address::ZERO, 20, Address::ZERO, Bytes::new()),
            Err(AmbError::SendingDisabled)
        );
    }

    #[test]
    fn test_execute_once() {
        let mut bridge = bridge();
        let message = bridge.send_and_finalize(64, b"hello");
        let (account_proof, storage_proof) = bridge.proofs(&message);

        bridge
            .target
            .execute_message(64, &message.encode(), &account_proof, &storage_proof)
            .unwrap();
        assert_eq!(
            *lock(&bridge.inbox.0),
            vec![(SOURCE, Address::repeat_byte(0x01).into_word(), b"hello".to_vec())]
        );
        assert!(bridge.target.is_executed(&message.hash()));

        let err = bridge
            .target
            .execute_message(64, &message.encode(), &account_proof, &storage_proof)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReplayedMessage);
        assert_eq!(lock(&bridge.inbox.0).len(), 1);
        assert_eq!(bridge.target.events().count("ExecutedMessage"), 1);
    }

    #[test]
    fn test_future_slot_rejected() {
        let mut bridge = bridge();
        let message = bridge.send_and_finalize(64, b"hello");
        let (account_proof, storage_proof) = bridge.proofs(&message);
        let err = bridge
            .target
            .execute_message(65, &message.encode(), &account_proof, &storage_proof)
            .unwrap_err();
        assert_eq!(err, AmbError::FutureSlot { slot: 65, head: Some(64) });
        assert!(err.kind().is_retryable());
    }

    #[test]
    fn test_tampered_message_rejected() {
        let mut bridge = bridge();
        let message = bridge.send_and_finalize(64, b"hello");
        let (account_proof, storage_proof) = bridge.proofs(&message);
        let mut forged = message.clone();
        forged.payload = Bytes::from_static(b"hellO");
        let err = bridge
            .target
            .execute_message(64, &forged.encode(), &account_proof, &storage_proof)
            .unwrap_err();
        assert!(matches!(err, AmbError::CommitmentMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidInclusionProof);
        assert!(lock(&bridge.inbox.0).is_empty());
        assert!(!bridge.target.is_executed(&forged.hash()));
    }

    #[test]
    fn test_proof_against_older_root_rejected() {
        let mut bridge = bridge();
        bridge.send_and_finalize(64, b"first");
        let message = bridge.send_and_finalize(128, b"second");
        let (account_proof, storage_proof) = bridge.proofs(&message);
        // The second message did not exist at slot 64.
        let err = bridge
            .target
            .execute_message(64, &message.encode(), &account_proof, &storage_proof)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInclusionProof);
    }

    #[test]
    fn test_unknown_target_leaves_message_executable() {
        let mut bridge = bridge();
        let message = bridge
            .source
            .send(Address::ZERO, TARGET, Address::repeat_byte(0x99), vec![1u8])
            .unwrap();
        bridge
            .world
            .set_contract_storage(bridge.source.address(), bridge.source.storage());
        sync::write(&bridge.protocol_state)
            .record(10, bridge.world.state_root())
            .unwrap();
        let (account_proof, storage_proof) = bridge.proofs(&message);

        let err = bridge
            .target
            .execute_message(10, &message.encode(), &account_proof, &storage_proof)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnregisteredHandler);

        let inbox = Arc::new(Inbox::default());
        bridge
            .target
            .register_receiver(Address::repeat_byte(0x99), inbox.clone());
        bridge
            .target
            .execute_message(10, &message.encode(), &account_proof, &storage_proof)
            .unwrap();
        assert_eq!(lock(&inbox.0).len(), 1);
    }

    #[test]
    fn test_parallel_lists_must_match() {
        let err = TargetAmb::new(
            TARGET,
            vec![1, 2],
            vec![sync::shared(ProtocolState::new(1))],
            vec![Address::ZERO, Address::ZERO],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
