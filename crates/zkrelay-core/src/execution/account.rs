use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};

use crate::execution::proof::{keccak256, verify_account_proof, verify_storage_proof, ProofError};
use crate::execution::trie::MemoryTrie;
use crate::types::execution::AccountState;

/// Verify one storage slot of a contract against a state root: the account
/// proof yields the storage root, the storage proof yields the value.
///
/// The state root must come from `ProtocolState`. The proofs can come from
/// anywhere (including untrusted RPCs); they are checked regardless of source.
pub fn verify_contract_storage(
    state_root: [u8; 32],
    address: [u8; 20],
    account_proof: &[Vec<u8>],
    slot: [u8; 32],
    storage_proof: &[Vec<u8>],
) -> Result<VerifiedStorageSlot, ProofError> {
    let account = verify_account_proof(state_root, address, account_proof)?;
    let value = verify_storage_proof(account.storage_root.0, slot, storage_proof)?;
    Ok(VerifiedStorageSlot {
        address,
        account,
        key: slot,
        value,
    })
}

/// A storage slot whose value has been proven against a state root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedStorageSlot {
    pub address: [u8; 20],
    pub account: AccountState,
    pub key: [u8; 32],
    pub value: [u8; 32],
}

/// A source-chain world state of contracts and their storage, kept in
/// memory. Produces state roots for `ProtocolState` and the
/// `(accountProof, storageProof)` pairs a relayer would fetch.
#[derive(Clone, Debug, Default)]
pub struct WorldState {
    contracts: BTreeMap<Address, BTreeMap<[u8; 32], [u8; 32]>>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a storage word. Writing zero clears the slot.
    pub fn set_storage(&mut self, address: Address, slot: [u8; 32], value: [u8; 32]) {
        let storage = self.contracts.entry(address).or_default();
        if value == [0u8; 32] {
            storage.remove(&slot);
        } else {
            storage.insert(slot, value);
        }
    }

    /// Replace a contract's whole storage.
    pub fn set_contract_storage(
        &mut self,
        address: Address,
        storage: impl IntoIterator<Item = ([u8; 32], [u8; 32])>,
    ) {
        let slots = self.contracts.entry(address).or_default();
        slots.clear();
        for (slot, value) in storage {
            if value != [0u8; 32] {
                slots.insert(slot, value);
            }
        }
    }

    pub fn account(&self, address: Address) -> Option<AccountState> {
        self.contracts
            .get(&address)
            .map(|storage| AccountState::contract(storage_trie(storage).root(), code_hash(address)))
    }

    pub fn state_root(&self) -> [u8; 32] {
        self.state_trie().root()
    }

    pub fn account_proof(&self, address: Address) -> Vec<Vec<u8>> {
        self.state_trie().proof(&keccak256(address.as_slice()))
    }

    pub fn storage_proof(&self, address: Address, slot: [u8; 32]) -> Vec<Vec<u8>> {
        match self.contracts.get(&address) {
            Some(storage) => storage_trie(storage).proof(&keccak256(&slot)),
            None => Vec::new(),
        }
    }

    fn state_trie(&self) -> MemoryTrie {
        let mut trie = MemoryTrie::new();
        for (address, storage) in &self.contracts {
            let account = AccountState::contract(storage_trie(storage).root(), code_hash(*address));
            trie.insert(&keccak256(address.as_slice()), alloy_rlp::encode(&account));
        }
        trie
    }
}

fn storage_trie(storage: &BTreeMap<[u8; 32], [u8; 32]>) -> MemoryTrie {
    let mut trie = MemoryTrie::new();
    for (slot, value) in storage {
        trie.insert(&keccak256(slot), alloy_rlp::encode(U256::from_be_bytes(*value)));
    }
    trie
}

/// Stand-in code hash; only its non-emptiness matters to verification.
fn code_hash(address: Address) -> [u8; 32] {
    keccak256(address.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(n: u8) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[31] = n;
        w
    }

    #[test]
    fn test_contract_storage_roundtrip() {
        let contract = Address::repeat_byte(0xAA);
        let mut world = WorldState::new();
        world.set_storage(contract, word(1), [0x11; 32]);
        world.set_storage(contract, word(2), word(7));
        world.set_storage(Address::repeat_byte(0xBB), word(1), word(9));

        let verified = verify_contract_storage(
            world.state_root(),
            contract.into_array(),
            &world.account_proof(contract),
            word(2),
            &world.storage_proof(contract, word(2)),
        )
        .unwrap();
        assert_eq!(verified.value, word(7));
        assert!(verified.account.is_contract());
        assert_eq!(Some(verified.account), world.account(contract));
    }

    #[test]
    fn test_unset_slot_proves_zero() {
        let contract = Address::repeat_byte(0xAA);
        let mut world = WorldState::new();
        world.set_storage(contract, word(1), word(1));
        let verified = verify_contract_storage(
            world.state_root(),
            contract.into_array(),
            &world.account_proof(contract),
            word(5),
            &world.storage_proof(contract, word(5)),
        )
        .unwrap();
        assert_eq!(verified.value, [0u8; 32]);
    }

    #[test]
    fn test_storage_proof_from_other_contract_rejected() {
        let a = Address::repeat_byte(0xAA);
        let b = Address::repeat_byte(0xBB);
        let mut world = WorldState::new();
        world.set_storage(a, word(1), word(1));
        world.set_storage(b, word(1), word(2));
        let err = verify_contract_storage(
            world.state_root(),
            a.into_array(),
            &world.account_proof(a),
            word(1),
            &world.storage_proof(b, word(1)),
        )
        .unwrap_err();
        assert!(matches!(err, ProofError::HashMismatch { index: 0, .. }));
    }

    #[test]
    fn test_stale_root_rejected() {
        let contract = Address::repeat_byte(0xAA);
        let mut world = WorldState::new();
        world.set_storage(contract, word(1), word(1));
        let old_root = world.state_root();
        world.set_storage(contract, word(2), word(2));
        assert!(verify_contract_storage(
            old_root,
            contract.into_array(),
            &world.account_proof(contract),
            word(2),
            &world.storage_proof(contract, word(2)),
        )
        .is_err());
    }
}
