use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Numeric identifier of a chain (EIP-155 style).
pub type ChainId = u32;

/// Identifier of a proof system a verifier handler is registered under
/// (e.g. `0xAABBCCDD` for the Ethereum light-client proof system).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProofSystemId(pub u32);

impl std::fmt::Display for ProofSystemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// An address as supplied by a caller: either a native 20-byte address or a
/// 32-byte word (the ABI encoding of an address, or a non-EVM identifier).
///
/// Only [`normalize_address`] looks inside this enum. Everything past the
/// ingress point works on the canonical `B256`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressInput {
    Native(Address),
    Word(B256),
}

impl From<Address> for AddressInput {
    fn from(address: Address) -> Self {
        AddressInput::Native(address)
    }
}

impl From<B256> for AddressInput {
    fn from(word: B256) -> Self {
        AddressInput::Word(word)
    }
}

impl From<[u8; 20]> for AddressInput {
    fn from(bytes: [u8; 20]) -> Self {
        AddressInput::Native(Address::from(bytes))
    }
}

impl From<[u8; 32]> for AddressInput {
    fn from(bytes: [u8; 32]) -> Self {
        AddressInput::Word(B256::from(bytes))
    }
}

/// Normalize an address to its canonical 32-byte form.
/// A native address is left-padded with zeros, exactly as `abi.encode(address)` does,
/// so both overloads of `send` produce identical message bytes.
pub fn normalize_address(input: impl Into<AddressInput>) -> B256 {
    match input.into() {
        AddressInput::Native(address) => address.into_word(),
        AddressInput::Word(word) => word,
    }
}

/// Decode lowercase hex with an optional `0x` prefix.
///
/// Uppercase digits are rejected so every byte string has exactly one
/// accepted encoding.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(format!("hex must be lowercase: {s:?}"));
    }
    hex::decode(digits).map_err(|e| e.to_string())
}

/// Serde helper for `[u8; 32]` as a `0x`-prefixed hex string.
pub mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::decode_hex;

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = decode_hex(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != 32 {
            return Err(serde::de::Error::custom(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }
}

/// Serde helper for variable-length bytes as a `0x`-prefixed hex string.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::decode_hex;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde helper for a list of hex-encoded byte strings (trie proof nodes).
pub mod hex_bytes_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::decode_hex;

    pub fn serialize<S: Serializer>(nodes: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        nodes
            .iter()
            .map(|n| format!("0x{}", hex::encode(n)))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let items = Vec::<String>::deserialize(deserializer)?;
        items
            .iter()
            .map(|s| decode_hex(s).map_err(serde::de::Error::custom))
            .collect()
    }
}
