mod common;

use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256};
use common::*;
use zkrelay_core::bridge::{
    message_storage_slot, AmbError, HandlerError, LightClientHandler, MessageReceiver, SourceAmb,
    TargetAmb, VerifierHandler,
};
use zkrelay_core::execution::WorldState;
use zkrelay_core::sync::{self, lock};
use zkrelay_core::types::{ChainId, MessageInclusion};
use zkrelay_core::ErrorKind;

const SOURCE: ChainId = 5;
const TARGET: ChainId = 100;

#[derive(Debug, Default)]
struct Counter {
    received: Mutex<Vec<Vec<u8>>>,
}

impl MessageReceiver for Counter {
    fn handle(&self, source: ChainId, _sender: B256, data: &[u8]) -> Result<(), HandlerError> {
        assert_eq!(source, SOURCE);
        lock(&self.received).push(data.to_vec());
        Ok(())
    }
}

fn inclusion(
    world: &WorldState,
    amb: Address,
    slot: u64,
    message: &zkrelay_core::Message,
) -> MessageInclusion {
    MessageInclusion {
        block_number: slot,
        message: message.encode(),
        account_proof: world.account_proof(amb),
        storage_proof: world.storage_proof(
            amb,
            message_storage_slot(message.destination_chain_id, message.nonce),
        ),
        state_root: B256::from(world.state_root()),
        source_amb_address: amb,
    }
}

#[test]
fn test_message_waits_for_light_client_then_executes_once() {
    let amb_address = Address::repeat_byte(0xAB);
    let receiver_address = Address::repeat_byte(0xEE);

    let (light_client, protocol_state) = light_client(SOURCE);
    let handler = LightClientHandler::new(light_client.clone());

    let mut source = SourceAmb::new(SOURCE, amb_address, true);
    let mut target = TargetAmb::new(
        TARGET,
        vec![SOURCE],
        vec![protocol_state.clone()],
        vec![amb_address],
    )
    .unwrap();
    let counter = Arc::new(Counter::default());
    target.register_receiver(receiver_address, counter.clone());

    // Source chain: send, and the contract storage now holds the commitment.
    let message = source
        .send(Address::repeat_byte(0x01), TARGET, receiver_address, b"lorem ipsum".to_vec())
        .unwrap();
    let mut world = WorldState::new();
    world.set_contract_storage(amb_address, source.storage());
    let slot = 200;

    // Relayer fetched the proof, but the light client has not caught up.
    let record = inclusion(&world, amb_address, slot, &message);
    let json = serde_json::to_string(&record).unwrap();
    let record: MessageInclusion = serde_json::from_str(&json).unwrap();
    let err = target.execute_inclusion(&record).unwrap_err();
    assert_eq!(err, AmbError::FutureSlot { slot, head: None });
    assert!(err.kind().is_retryable());

    // The light client finalizes the slot with the world's state root.
    let update = step(SOURCE, slot, world.state_root());
    handler
        .verify_update(SOURCE, &serde_json::to_vec(&update).unwrap())
        .unwrap();
    assert_eq!(sync::read(&protocol_state).head(), Some(slot));

    target.execute_inclusion(&record).unwrap();
    assert_eq!(*lock(&counter.received), vec![b"lorem ipsum".to_vec()]);

    let err = target.execute_inclusion(&record).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReplayedMessage);
    assert_eq!(lock(&counter.received).len(), 1);
}

#[test]
fn test_root_not_from_light_client_is_not_trusted() {
    let amb_address = Address::repeat_byte(0xAB);
    let (light_client, protocol_state) = light_client(SOURCE);
    let handler = LightClientHandler::new(light_client);

    let mut source = SourceAmb::new(SOURCE, amb_address, true);
    let mut target = TargetAmb::new(
        TARGET,
        vec![SOURCE],
        vec![protocol_state],
        vec![amb_address],
    )
    .unwrap();
    target.register_receiver(Address::repeat_byte(0xEE), Arc::new(Counter::default()));

    let message = source
        .send(Address::ZERO, TARGET, Address::repeat_byte(0xEE), b"x".to_vec())
        .unwrap();
    let mut world = WorldState::new();
    world.set_contract_storage(amb_address, source.storage());

    // The light client finalized a different root at this slot.
    handler
        .verify_update(SOURCE, &serde_json::to_vec(&step(SOURCE, 50, [0x77; 32])).unwrap())
        .unwrap();

    let record = inclusion(&world, amb_address, 50, &message);
    let err = target.execute_inclusion(&record).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInclusionProof);
    assert!(!target.is_executed(&message.hash()));
}

#[test]
fn test_inclusion_for_other_amb_rejected() {
    let amb_address = Address::repeat_byte(0xAB);
    let (_, protocol_state) = light_client(SOURCE);
    let mut target = TargetAmb::new(
        TARGET,
        vec![SOURCE],
        vec![protocol_state],
        vec![amb_address],
    )
    .unwrap();

    let mut impostor = SourceAmb::new(SOURCE, Address::repeat_byte(0xBA), true);
    let message = impostor
        .send(Address::ZERO, TARGET, Address::repeat_byte(0xEE), b"x".to_vec())
        .unwrap();
    let mut world = WorldState::new();
    world.set_contract_storage(impostor.address(), impostor.storage());
    let record = inclusion(&world, impostor.address(), 1, &message);

    assert!(matches!(
        target.execute_inclusion(&record),
        Err(AmbError::SourceAmbMismatch { .. })
    ));
}
