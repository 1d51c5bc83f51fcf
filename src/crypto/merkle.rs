//! Merkle commitment over an ordered leaf list.
//!
//! Leaves are hashed individually, then paired bottom-up; on an odd level
//! count the trailing node is **promoted unpaired** to the next level rather
//! than duplicated. This (deliberately) differs from the Bitcoin-style
//! duplicate-last-node convention: it follows the original StrongChain
//! construction this crate implements (see DESIGN.md).

use std::fmt;

use crate::crypto::hash::{sha256_hex, ZERO_HASH_64};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerkleError {
    IndexOutOfRange,
}

impl fmt::Display for MerkleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MerkleError::IndexOutOfRange => write!(f, "leaf index out of range"),
        }
    }
}

impl std::error::Error for MerkleError {}

/// Which side a proof sibling sits on relative to the node being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf_hash: String,
    /// Sibling hash and its side, one entry per non-promotion level walked.
    pub path: Vec<(String, Side)>,
}

/// A Merkle tree built from the canonical string forms of its leaves.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` are the leaf hashes; `levels.last()` is `[root]` (or empty).
    levels: Vec<Vec<String>>,
    root: String,
}

impl MerkleTree {
    /// Builds a tree over the canonical string form of each leaf.
    /// An empty leaf list produces the all-zero root, matching `get_root()`
    /// on an empty set.
    pub fn new<S: AsRef<str>>(leaves: &[S]) -> Self {
        if leaves.is_empty() {
            return MerkleTree {
                levels: Vec::new(),
                root: ZERO_HASH_64.to_string(),
            };
        }

        let leaf_hashes: Vec<String> = leaves.iter().map(|l| sha256_hex(l.as_ref().as_bytes())).collect();
        let mut levels = vec![leaf_hashes];

        while levels.last().unwrap().len() > 1 {
            let current = levels.last().unwrap();
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            let mut i = 0;
            while i + 1 < current.len() {
                next.push(Self::pair_hash(&current[i], &current[i + 1]));
                i += 2;
            }
            if i < current.len() {
                // odd node: promoted unpaired, not duplicated
                next.push(current[i].clone());
            }
            levels.push(next);
        }

        let root = levels.last().unwrap()[0].clone();
        MerkleTree { levels, root }
    }

    pub fn compute_root<S: AsRef<str>>(leaves: &[S]) -> String {
        Self::new(leaves).root
    }

    fn pair_hash(a: &str, b: &str) -> String {
        sha256_hex(format!("{a}{b}").as_bytes())
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(|l| l.len()).unwrap_or(0)
    }

    /// Builds the sibling path for leaf `index`. At an odd-promotion level
    /// (the leaf itself was the promoted, unpaired node) no sibling is
    /// recorded for that level, matching §4.1.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        if self.levels.is_empty() || index >= self.levels[0].len() {
            return Err(MerkleError::IndexOutOfRange);
        }

        let leaf_hash = self.levels[0][index].clone();
        let mut path = Vec::new();
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let is_last_odd = idx == level.len() - 1 && level.len() % 2 == 1;
            if is_last_odd {
                // promoted unpaired; no sibling recorded, index carries over unchanged
            } else if idx % 2 == 0 {
                path.push((level[idx + 1].clone(), Side::Right));
            } else {
                path.push((level[idx - 1].clone(), Side::Left));
            }
            idx /= 2;
        }

        Ok(MerkleProof { leaf_hash, path })
    }

    pub fn verify_proof(proof: &MerkleProof, root: &str) -> bool {
        let mut current = proof.leaf_hash.clone();
        for (sibling, side) in &proof.path {
            current = match side {
                Side::Left => Self::pair_hash(sibling, &current),
                Side::Right => Self::pair_hash(&current, sibling),
            };
        }
        current == root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_root_is_zero() {
        let empty: &[String] = &[];
        assert_eq!(MerkleTree::compute_root(empty), ZERO_HASH_64);
    }

    #[test]
    fn single_leaf_root_is_its_hash() {
        let leaves = vec!["leaf-a".to_string()];
        assert_eq!(MerkleTree::compute_root(&leaves), sha256_hex(b"leaf-a"));
    }

    #[test]
    fn odd_node_is_promoted_not_duplicated() {
        let leaves = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let tree = MerkleTree::new(&leaves);
        let h_a = sha256_hex(b"a");
        let h_b = sha256_hex(b"b");
        let h_c = sha256_hex(b"c");
        let ab = sha256_hex(format!("{h_a}{h_b}").as_bytes());
        // c is promoted unpaired, not hashed against itself
        let expected_root = sha256_hex(format!("{ab}{h_c}").as_bytes());
        assert_eq!(tree.root(), expected_root);
    }

    #[test]
    fn proof_round_trips_for_every_leaf() {
        let leaves: Vec<String> = (0..5).map(|i| format!("leaf-{i}")).collect();
        let tree = MerkleTree::new(&leaves);
        for i in 0..leaves.len() {
            let proof = tree.proof(i).unwrap();
            assert!(MerkleTree::verify_proof(&proof, tree.root()));
        }
    }

    #[test]
    fn proof_rejects_tampered_root() {
        let leaves: Vec<String> = (0..4).map(|i| format!("leaf-{i}")).collect();
        let tree = MerkleTree::new(&leaves);
        let proof = tree.proof(2).unwrap();
        assert!(!MerkleTree::verify_proof(&proof, &ZERO_HASH_64.to_string()));
    }

    #[test]
    fn out_of_range_index_errors() {
        let leaves = vec!["only".to_string()];
        let tree = MerkleTree::new(&leaves);
        assert!(matches!(tree.proof(5), Err(MerkleError::IndexOutOfRange)));
    }
}
