use alloy_primitives::{Address, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use super::primitives::{hex_bytes, hex_bytes_list};

/// An account as stored in the state trie: `RLP([nonce, balance, storageRoot, codeHash])`.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    pub nonce: u64,
    pub balance: U256,
    /// Root of the account's storage trie.
    pub storage_root: B256,
    pub code_hash: B256,
}

impl AccountState {
    /// keccak256 of empty bytes.
    pub const EMPTY_CODE_HASH: [u8; 32] = [
        0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7,
        0x03, 0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04,
        0x5d, 0x85, 0xa4, 0x70,
    ];

    /// Root of an empty Merkle-Patricia trie (keccak256 of `0x80`).
    pub const EMPTY_STORAGE_ROOT: [u8; 32] = [
        0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0,
        0xf8, 0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5,
        0xe3, 0x63, 0xb4, 0x21,
    ];

    /// A contract account with the given storage root and no balance.
    pub fn contract(storage_root: [u8; 32], code_hash: [u8; 32]) -> Self {
        Self {
            nonce: 1,
            balance: U256::ZERO,
            storage_root: B256::from(storage_root),
            code_hash: B256::from(code_hash),
        }
    }

    pub fn is_contract(&self) -> bool {
        self.code_hash != B256::from(Self::EMPTY_CODE_HASH)
    }

    pub fn has_storage(&self) -> bool {
        self.storage_root != B256::from(Self::EMPTY_STORAGE_ROOT)
    }
}

/// A relayed AMB message with the inclusion proof for it, as a relayer
/// collects it from the source chain (`eth_getProof` at `blockNumber`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInclusion {
    /// Slot whose state root the proof is against.
    pub block_number: u64,
    #[serde(with = "hex_bytes")]
    pub message: Vec<u8>,
    #[serde(with = "hex_bytes_list")]
    pub account_proof: Vec<Vec<u8>>,
    #[serde(with = "hex_bytes_list")]
    pub storage_proof: Vec<Vec<u8>>,
    pub state_root: B256,
    #[serde(rename = "sourceAMBAddress")]
    pub source_amb_address: Address,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_constants() {
        assert_eq!(
            alloy_primitives::keccak256(b"").0,
            AccountState::EMPTY_CODE_HASH
        );
        assert_eq!(
            alloy_primitives::keccak256([0x80u8]).0,
            AccountState::EMPTY_STORAGE_ROOT
        );
    }

    #[test]
    fn test_account_rlp_decodes_back() {
        use alloy_rlp::Decodable;

        let account = AccountState::contract([0x11; 32], [0x22; 32]);
        let encoded = alloy_rlp::encode(&account);
        let decoded = AccountState::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, account);
        assert!(decoded.is_contract());
        assert!(decoded.has_storage());
    }

    #[test]
    fn test_message_inclusion_field_names() {
        let json = serde_json::json!({
            "blockNumber": 9,
            "message": "0x01",
            "accountProof": ["0xc0"],
            "storageProof": [],
            "stateRoot": format!("0x{}", "00".repeat(32)),
            "sourceAMBAddress": format!("0x{}", "11".repeat(20)),
        });
        let parsed: MessageInclusion = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.block_number, 9);
        assert_eq!(parsed.account_proof, vec![vec![0xc0]]);
        assert_eq!(parsed.source_amb_address, Address::repeat_byte(0x11));
    }
}
