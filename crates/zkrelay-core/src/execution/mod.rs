pub mod account;
pub mod proof;
pub mod trie;

pub use account::{verify_contract_storage, VerifiedStorageSlot, WorldState};
pub use proof::{keccak256, verify_account_proof, verify_storage_proof, ProofError};
pub use trie::MemoryTrie;
