//! Pairwise double-hash Merkle root
//!
//! The reduction is order-sensitive: callers fix the transaction order
//! (block order, coinbase first) before computing the root, and the same
//! order is used when the root is re-verified.

use crate::core::transaction::HASH_LEN;
use crate::error::{ChainError, Result};
use crate::utils::double_sha256_digest;

/// Reduce a list of 32-byte hashes to a single root. An odd level
/// duplicates its last element; each pair is concatenated in order and
/// double-hashed to form the next level.
pub fn merkle_root(hashes: &[Vec<u8>]) -> Result<Vec<u8>> {
    if hashes.is_empty() {
        return Err(ChainError::EmptyInput(
            "Merkle root needs at least one hash".to_string(),
        ));
    }

    let mut level = hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level[level.len() - 1].clone());
        }

        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut concat = Vec::with_capacity(HASH_LEN * 2);
            concat.extend_from_slice(&pair[0]);
            concat.extend_from_slice(&pair[1]);
            next.push(double_sha256_digest(&concat));
        }
        level = next;
    }

    Ok(level.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::sha256_digest;

    fn h(tag: &[u8]) -> Vec<u8> {
        sha256_digest(tag)
    }

    #[test]
    fn test_empty_list_is_rejected() {
        assert!(matches!(merkle_root(&[]), Err(ChainError::EmptyInput(_))));
    }

    #[test]
    fn test_single_hash_is_its_own_root() {
        let leaf = h(b"only");
        assert_eq!(merkle_root(&[leaf.clone()]).unwrap(), leaf);
    }

    #[test]
    fn test_pair_is_double_hash_of_concatenation() {
        let (a, b) = (h(b"a"), h(b"b"));
        let mut concat = a.clone();
        concat.extend_from_slice(&b);
        assert_eq!(
            merkle_root(&[a, b]).unwrap(),
            double_sha256_digest(&concat)
        );
    }

    #[test]
    fn test_odd_list_duplicates_last_element() {
        let (a, b, c) = (h(b"a"), h(b"b"), h(b"c"));
        let padded = merkle_root(&[a.clone(), b.clone(), c.clone(), c.clone()]).unwrap();
        assert_eq!(merkle_root(&[a, b, c]).unwrap(), padded);
    }

    #[test]
    fn test_root_is_order_sensitive() {
        let (a, b, c) = (h(b"a"), h(b"b"), h(b"c"));
        let original = merkle_root(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let permuted = merkle_root(&[b, a, c]).unwrap();
        assert_ne!(original, permuted);
    }

    #[test]
    fn test_larger_lists_reduce_to_one_root() {
        let leaves: Vec<Vec<u8>> = (0u8..7).map(|i| h(&[i])).collect();
        let root = merkle_root(&leaves).unwrap();
        assert_eq!(root.len(), HASH_LEN);
    }
}
