//! Column commitments: a binary SHA256 Merkle tree over the column's
//! field elements, one leaf per row.

use sha2::{Digest, Sha256};

use super::field::{fp_to_bytes, Fp};

/// SHA256 of a single field element's canonical encoding.
pub fn leaf_hash(value: &Fp) -> [u8; 32] {
    sha256_hash(&fp_to_bytes(value))
}

/// SHA256(left || right), the inner node of every tree here.
pub fn sha256_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn sha256_hash(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Verify that `leaf` sits at `index` under `root`.
/// At level `i`, bit `i` of `index` says whether the current node is a right child.
pub fn verify_merkle_branch(
    leaf: &[u8; 32],
    branch: &[[u8; 32]],
    depth: usize,
    index: u64,
    root: &[u8; 32],
) -> bool {
    if branch.len() != depth || (depth < 64 && index >> depth != 0) {
        return false;
    }

    let mut current = *leaf;
    for (i, node) in branch.iter().enumerate() {
        current = if (index >> i) & 1 == 1 {
            sha256_pair(node, &current)
        } else {
            sha256_pair(&current, node)
        };
    }

    current == *root
}

/// A fully materialized tree. Only the fixture prover builds these;
/// the verifier only ever sees roots and branches.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `layers[0]` are the leaf hashes, the last layer is the root.
    layers: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build a tree over `values`. The length must be a power of two.
    pub fn new(values: &[Fp]) -> Option<Self> {
        if values.is_empty() || !values.len().is_power_of_two() {
            return None;
        }

        let mut layers = vec![values.iter().map(leaf_hash).collect::<Vec<_>>()];
        while let Some(last) = layers.last() {
            if last.len() == 1 {
                break;
            }
            let next = last
                .chunks(2)
                .map(|pair| sha256_pair(&pair[0], &pair[1]))
                .collect();
            layers.push(next);
        }
        Some(Self { layers })
    }

    pub fn root(&self) -> [u8; 32] {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// Sibling hashes from the leaf up to (excluding) the root.
    pub fn path(&self, index: usize) -> Vec<[u8; 32]> {
        let mut path = Vec::with_capacity(self.depth());
        let mut position = index;
        for layer in &self.layers[..self.depth()] {
            path.push(layer[position ^ 1]);
            position >>= 1;
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(n: u64) -> Vec<Fp> {
        (0..n).map(Fp::from).collect()
    }

    #[test]
    fn test_every_path_verifies() {
        let values = values(8);
        let tree = MerkleTree::new(&values).unwrap();
        assert_eq!(tree.depth(), 3);
        for (i, value) in values.iter().enumerate() {
            let path = tree.path(i);
            assert!(verify_merkle_branch(
                &leaf_hash(value),
                &path,
                3,
                i as u64,
                &tree.root()
            ));
        }
    }

    #[test]
    fn test_wrong_index_fails() {
        let values = values(4);
        let tree = MerkleTree::new(&values).unwrap();
        let path = tree.path(1);
        assert!(!verify_merkle_branch(&leaf_hash(&values[1]), &path, 2, 2, &tree.root()));
    }

    #[test]
    fn test_index_beyond_depth_fails() {
        let values = values(4);
        let tree = MerkleTree::new(&values).unwrap();
        let path = tree.path(1);
        // Same low bits, extra high bit set.
        assert!(!verify_merkle_branch(&leaf_hash(&values[1]), &path, 2, 5, &tree.root()));
    }

    #[test]
    fn test_wrong_branch_length_fails() {
        let values = values(4);
        let tree = MerkleTree::new(&values).unwrap();
        let mut path = tree.path(0);
        path.pop();
        assert!(!verify_merkle_branch(&leaf_hash(&values[0]), &path, 2, 0, &tree.root()));
    }

    #[test]
    fn test_non_power_of_two_rejected() {
        assert!(MerkleTree::new(&values(3)).is_none());
        assert!(MerkleTree::new(&[]).is_none());
    }

    #[test]
    fn test_single_leaf_tree() {
        let values = values(1);
        let tree = MerkleTree::new(&values).unwrap();
        assert_eq!(tree.root(), leaf_hash(&values[0]));
        assert!(tree.path(0).is_empty());
    }
}
