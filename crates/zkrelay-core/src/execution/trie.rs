//! In-memory Merkle-Patricia trie.
//!
//! Builds the same node encoding the verifier walks, so tests and local
//! simulations can produce state roots and `eth_getProof`-shaped proofs
//! without a node. Keys are used as given; callers hash them for a secure
//! trie (`keccak256(address)`, `keccak256(slot)`).

use std::collections::BTreeMap;

use alloy_rlp::{Encodable, Header};

use super::proof::{bytes_to_nibbles, keccak256};

#[derive(Clone, Debug, Default)]
pub struct MemoryTrie {
    /// Nibble path → raw value.
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. An empty value removes the key.
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) {
        let path = bytes_to_nibbles(key);
        if value.is_empty() {
            self.entries.remove(&path);
        } else {
            self.entries.insert(path, value);
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(&bytes_to_nibbles(key)).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn root(&self) -> [u8; 32] {
        keccak256(&self.root_node())
    }

    /// The nodes on the path to `key`, root first. Nodes under 32 bytes are
    /// embedded in their parent and do not appear separately.
    pub fn proof(&self, key: &[u8]) -> Vec<Vec<u8>> {
        let entries = self.sorted();
        if entries.is_empty() {
            return vec![self.root_node()];
        }
        let path = bytes_to_nibbles(key);
        let mut out = Vec::new();
        collect_proof(&entries, 0, &path, true, &mut out);
        out
    }

    fn root_node(&self) -> Vec<u8> {
        let entries = self.sorted();
        if entries.is_empty() {
            // Empty string: the empty trie.
            return vec![0x80];
        }
        encode_node(&entries, 0)
    }

    fn sorted(&self) -> Vec<(&[u8], &[u8])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect()
    }
}

type Entries<'a> = [(&'a [u8], &'a [u8])];

/// Nibbles shared by every key from `depth` on. Keys are sorted, so the
/// first and last bound the prefix of all of them.
fn common_prefix(entries: &Entries<'_>, depth: usize) -> usize {
    let first = &entries[0].0[depth..];
    let last = &entries[entries.len() - 1].0[depth..];
    first.iter().zip(last).take_while(|(a, b)| a == b).count()
}

fn encode_node(entries: &Entries<'_>, depth: usize) -> Vec<u8> {
    if let [(key, value)] = entries {
        return encode_list(&[
            encode_bytes(&compact_path(&key[depth..], true)),
            encode_bytes(value),
        ]);
    }

    let shared = common_prefix(entries, depth);
    if shared > 0 {
        let child = encode_node(entries, depth + shared);
        return encode_list(&[
            encode_bytes(&compact_path(&entries[0].0[depth..depth + shared], false)),
            child_reference(&child),
        ]);
    }

    let mut items = Vec::with_capacity(17);
    let mut branch_value: &[u8] = &[];
    let mut rest = entries;
    if let Some(((key, value), tail)) = rest.split_first() {
        if key.len() == depth {
            branch_value = *value;
            rest = tail;
        }
    }
    for nibble in 0..16u8 {
        let children = children_at(rest, depth, nibble);
        if children.is_empty() {
            items.push(encode_bytes(&[]));
        } else {
            items.push(child_reference(&encode_node(children, depth + 1)));
        }
    }
    items.push(encode_bytes(branch_value));
    encode_list(&items)
}

fn collect_proof(
    entries: &Entries<'_>,
    depth: usize,
    path: &[u8],
    is_root: bool,
    out: &mut Vec<Vec<u8>>,
) {
    let node = encode_node(entries, depth);
    if is_root || node.len() >= 32 {
        out.push(node);
    }

    if entries.len() == 1 {
        return;
    }
    let shared = common_prefix(entries, depth);
    if shared > 0 {
        let prefix = &entries[0].0[depth..depth + shared];
        if path.len() >= depth + shared && &path[depth..depth + shared] == prefix {
            collect_proof(entries, depth + shared, path, false, out);
        }
        return;
    }
    if let Some(&nibble) = path.get(depth) {
        let rest = match entries.split_first() {
            Some(((key, _), tail)) if key.len() == depth => tail,
            _ => entries,
        };
        let children = children_at(rest, depth, nibble);
        if !children.is_empty() {
            collect_proof(children, depth + 1, path, false, out);
        }
    }
}

/// The contiguous run of entries whose nibble at `depth` is `nibble`.
fn children_at<'e, 'a>(entries: &'e Entries<'a>, depth: usize, nibble: u8) -> &'e Entries<'a> {
    let start = entries.partition_point(|(key, _)| key[depth] < nibble);
    let end = entries.partition_point(|(key, _)| key[depth] <= nibble);
    &entries[start..end]
}

/// A child is embedded when its encoding is shorter than 32 bytes, and
/// referenced by hash otherwise.
fn child_reference(node: &[u8]) -> Vec<u8> {
    if node.len() < 32 {
        node.to_vec()
    } else {
        encode_bytes(&keccak256(node))
    }
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 9);
    bytes.encode(&mut out);
    out
}

/// Wrap already-encoded items in a list header.
fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_length = items.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

/// Hex-prefix encoding of a nibble path.
fn compact_path(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
    let flag = if is_leaf { 2u8 } else { 0u8 };
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
    let rest = if nibbles.len() % 2 == 1 {
        out.push(((flag + 1) << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        out.push(flag << 4);
        nibbles
    };
    for pair in rest.chunks(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
    out
}
