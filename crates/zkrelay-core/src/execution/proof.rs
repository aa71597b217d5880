use alloy_primitives::U256;
use alloy_rlp::{Decodable, Header};
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

use crate::error::ErrorKind;
use crate::types::execution::AccountState;

/// Errors during Merkle-Patricia trie proof verification.
/// Each variant is specific enough to diagnose exactly what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("Empty proof: no trie nodes provided")]
    EmptyProof,

    #[error("Invalid RLP encoding in proof node {index}: {reason}")]
    InvalidRlp { index: usize, reason: String },

    #[error("Proof node {index} hashes to {computed}, parent expects {expected}")]
    HashMismatch {
        index: usize,
        computed: String,
        expected: String,
    },

    #[error("Invalid trie node at proof node {index}: {node_type}")]
    InvalidNodeType { index: usize, node_type: String },

    #[error("Proof path incomplete: traversal needs node {index}, which the proof does not include")]
    IncompleteProof { index: usize },

    #[error("Proof has {unused} nodes past the end of the traversal")]
    UnusedProofNodes { unused: usize },

    #[error("Account not found at address {address}")]
    AccountNotFound { address: String },

    #[error("Invalid account RLP encoding: {reason}")]
    InvalidAccountEncoding { reason: String },

    #[error("Invalid value encoding: {reason}")]
    InvalidValueEncoding { reason: String },
}

impl ProofError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInclusionProof
    }
}

/// Compute keccak256 hash of data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// Verify an account proof against a state root recorded by the light client.
///
/// The state root must come from `ProtocolState`; never accept one from the
/// party that supplied the proof.
pub fn verify_account_proof(
    state_root: [u8; 32],
    address: [u8; 20],
    proof: &[Vec<u8>],
) -> Result<AccountState, ProofError> {
    if proof.is_empty() {
        return Err(ProofError::EmptyProof);
    }

    let key = keccak256(&address);
    match verify_merkle_patricia_proof(&state_root, &key, proof)? {
        Some(rlp_bytes) => decode_account(&rlp_bytes),
        None => Err(ProofError::AccountNotFound {
            address: hex::encode(address),
        }),
    }
}

/// Verify a storage proof for one slot of a contract whose storage root
/// came out of [`verify_account_proof`]. An absent slot reads as zero.
pub fn verify_storage_proof(
    storage_root: [u8; 32],
    slot: [u8; 32],
    proof: &[Vec<u8>],
) -> Result<[u8; 32], ProofError> {
    if proof.is_empty() {
        if storage_root == AccountState::EMPTY_STORAGE_ROOT {
            return Ok([0u8; 32]);
        }
        return Err(ProofError::EmptyProof);
    }

    let key = keccak256(&slot);
    match verify_merkle_patricia_proof(&storage_root, &key, proof)? {
        Some(rlp_bytes) => decode_storage_value(&rlp_bytes),
        None => Ok([0u8; 32]),
    }
}

/// A child reference inside a branch or extension node.
enum NodeRef<'a> {
    Empty,
    Hash([u8; 32]),
    /// A node shorter than 32 bytes, embedded in its parent.
    Inline(&'a [u8]),
}

/// One item of a decoded trie node.
#[derive(Debug, PartialEq, Eq)]
enum RlpItem<'a> {
    Bytes(&'a [u8]),
    /// The full encoding of a nested list.
    List(&'a [u8]),
}

/// Walk the trie from the root, hash-checking every node that is referenced
/// by hash (the root always is). Returns `Some(value)` if the key exists,
/// `None` for a valid proof of absence.
fn verify_merkle_patricia_proof(
    expected_root: &[u8; 32],
    key: &[u8; 32],
    proof_nodes: &[Vec<u8>],
) -> Result<Option<Vec<u8>>, ProofError> {
    if proof_nodes.is_empty() {
        return Err(ProofError::EmptyProof);
    }

    let nibbles = bytes_to_nibbles(key);
    let mut nibble_index = 0usize;
    let mut used = 0usize;
    let mut next = NodeRef::Hash(*expected_root);

    let result = loop {
        let (index, node): (usize, &[u8]) = match next {
            NodeRef::Empty => break None,
            NodeRef::Hash(expected) => {
                let node = proof_nodes
                    .get(used)
                    .ok_or(ProofError::IncompleteProof { index: used })?;
                let computed = keccak256(node);
                if computed != expected {
                    return Err(ProofError::HashMismatch {
                        index: used,
                        computed: hex::encode(computed),
                        expected: hex::encode(expected),
                    });
                }
                used += 1;
                (used - 1, node.as_slice())
            }
            NodeRef::Inline(node) => (used.saturating_sub(1), node),
        };

        let items = decode_node(node).map_err(|reason| ProofError::InvalidRlp { index, reason })?;

        // The encoding of an empty trie is the empty string.
        let Some(items) = items else {
            if index == 0 && used == 1 {
                break None;
            }
            return Err(ProofError::InvalidNodeType {
                index,
                node_type: "empty string below the root".into(),
            });
        };

        match items.len() {
            17 => {
                if nibble_index == nibbles.len() {
                    let value = expect_bytes(&items[16], index)?;
                    break (!value.is_empty()).then(|| value.to_vec());
                }
                let child = nibbles[nibble_index] as usize;
                nibble_index += 1;
                next = child_ref(&items[child], index)?;
            }
            2 => {
                let path = expect_bytes(&items[0], index)?;
                let (prefix, is_leaf) = decode_compact_path(path).map_err(|reason| {
                    ProofError::InvalidRlp { index, reason }
                })?;
                let remaining = &nibbles[nibble_index..];

                if is_leaf {
                    if remaining != prefix.as_slice() {
                        break None;
                    }
                    let value = expect_bytes(&items[1], index)?;
                    break (!value.is_empty()).then(|| value.to_vec());
                }

                if prefix.is_empty() {
                    return Err(ProofError::InvalidNodeType {
                        index,
                        node_type: "extension with empty path".into(),
                    });
                }
                if !remaining.starts_with(&prefix) {
                    break None;
                }
                nibble_index += prefix.len();
                next = child_ref(&items[1], index)?;
                if matches!(next, NodeRef::Empty) {
                    return Err(ProofError::InvalidNodeType {
                        index,
                        node_type: "extension without child".into(),
                    });
                }
            }
            n => {
                return Err(ProofError::InvalidNodeType {
                    index,
                    node_type: format!("{n}-element list"),
                });
            }
        }
    };

    if used != proof_nodes.len() {
        return Err(ProofError::UnusedProofNodes {
            unused: proof_nodes.len() - used,
        });
    }
    Ok(result)
}

fn expect_bytes<'a>(item: &RlpItem<'a>, index: usize) -> Result<&'a [u8], ProofError> {
    match item {
        RlpItem::Bytes(bytes) => Ok(bytes),
        RlpItem::List(_) => Err(ProofError::InvalidNodeType {
            index,
            node_type: "list where a string was expected".into(),
        }),
    }
}

fn child_ref<'a>(item: &RlpItem<'a>, index: usize) -> Result<NodeRef<'a>, ProofError> {
    match item {
        RlpItem::Bytes(bytes) if bytes.is_empty() => Ok(NodeRef::Empty),
        RlpItem::Bytes(bytes) if bytes.len() == 32 => {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(bytes);
            Ok(NodeRef::Hash(hash))
        }
        RlpItem::List(raw) if raw.len() < 32 => Ok(NodeRef::Inline(raw)),
        other => Err(ProofError::InvalidNodeType {
            index,
            node_type: format!("invalid child reference {other:?}"),
        }),
    }
}

/// Decode a trie node into its items. `Ok(None)` is the empty string, which
/// only the root of an empty trie may be.
fn decode_node(data: &[u8]) -> Result<Option<Vec<RlpItem<'_>>>, String> {
    let mut buf = data;
    let header = Header::decode(&mut buf).map_err(|e| e.to_string())?;
    if header.payload_length > buf.len() {
        return Err("node shorter than its header".into());
    }
    if buf.len() != header.payload_length {
        return Err(format!("{} trailing bytes", buf.len() - header.payload_length));
    }
    if !header.list {
        if header.payload_length == 0 {
            return Ok(None);
        }
        return Err("expected list, got string".into());
    }

    let mut payload = buf;
    let mut items = Vec::new();
    while !payload.is_empty() {
        let start = payload;
        let item = Header::decode(&mut payload).map_err(|e| e.to_string())?;
        if item.payload_length > payload.len() {
            return Err("item longer than its node".into());
        }
        let header_len = start.len() - payload.len();
        if item.list {
            items.push(RlpItem::List(&start[..header_len + item.payload_length]));
        } else {
            items.push(RlpItem::Bytes(&payload[..item.payload_length]));
        }
        payload = &payload[item.payload_length..];
    }
    Ok(Some(items))
}

/// Decode an account leaf value.
fn decode_account(rlp_bytes: &[u8]) -> Result<AccountState, ProofError> {
    let mut buf = rlp_bytes;
    let account = AccountState::decode(&mut buf).map_err(|e| ProofError::InvalidAccountEncoding {
        reason: e.to_string(),
    })?;
    if !buf.is_empty() {
        return Err(ProofError::InvalidAccountEncoding {
            reason: format!("{} trailing bytes", buf.len()),
        });
    }
    Ok(account)
}

/// Decode a storage leaf value: an RLP integer, returned as a 32-byte word.
fn decode_storage_value(rlp_bytes: &[u8]) -> Result<[u8; 32], ProofError> {
    let mut buf = rlp_bytes;
    let value = U256::decode(&mut buf).map_err(|e| ProofError::InvalidValueEncoding {
        reason: e.to_string(),
    })?;
    if !buf.is_empty() {
        return Err(ProofError::InvalidValueEncoding {
            reason: format!("{} trailing bytes", buf.len()),
        });
    }
    Ok(value.to_be_bytes::<32>())
}

/// Convert a 32-byte key to nibbles (4 bits each).
pub(crate) fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    nibbles
}

/// Decode compact (hex-prefix) encoding used in trie nodes.
/// Returns (nibbles, is_leaf).
fn decode_compact_path(encoded: &[u8]) -> Result<(Vec<u8>, bool), String> {
    let Some(&first) = encoded.first() else {
        return Err("empty compact path".into());
    };

    let flag = first >> 4;
    if flag > 3 {
        return Err(format!("invalid compact path flag {flag}"));
    }
    let is_leaf = flag >= 2;
    let is_odd = flag % 2 == 1;
    if !is_odd && first & 0x0F != 0 {
        return Err("non-zero padding nibble in even compact path".into());
    }

    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if is_odd {
        nibbles.push(first & 0x0F);
    }
    for &byte in &encoded[1..] {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }

    Ok((nibbles, is_leaf))
}
