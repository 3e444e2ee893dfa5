//! Merkle path accumulation and the fold that verifies it
//!
//! The path is collected root-to-leaf while traversing the server's tree
//! and consumed leaf-to-root by the fold. The fold is the sole authority
//! for accepting or rejecting anything the server returns: no value leaves
//! the protocol without it having run.

use crate::model::Hash;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of child slots per internal node
pub const NODE_ARITY: usize = 16;

/// Maximum path length, one level per nibble of the search hash
pub const MAX_DEPTH: usize = Hash::NIBBLES;

const NODE_DOMAIN: &[u8] = b"veritree.node.v1";
const LEAF_DOMAIN: &[u8] = b"veritree.leaf.v1";

/// Hash of an internal node from its child slots
///
/// Each slot's position is part of the preimage, so permuting siblings
/// or moving the selected child to another slot changes the digest.
/// Empty slots hold [`Hash::ZERO`].
pub fn node_hash(children: &[Hash]) -> Hash {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(children.len() + 1);
    parts.push(NODE_DOMAIN);
    for child in children {
        parts.push(child.as_bytes());
    }
    Hash::digest_many(&parts)
}

/// Hash of a leaf from the search hash of its key and its cipher value
///
/// Binding the search hash into the leaf means a leaf can only ever
/// verify on its own key's path.
pub fn leaf_hash(search: &Hash, cipher: &[u8]) -> Hash {
    Hash::digest_many(&[LEAF_DOMAIN, search.as_bytes(), cipher])
}

/// One proof step: a node's child slots and the slot the path continues
/// through
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// All child hashes of the node, in slot order
    pub children: Vec<Hash>,
    /// Index of the child that continues the path
    pub child_index: u8,
}

impl PathEntry {
    /// The hash in the selected slot
    pub fn selected(&self) -> Hash {
        self.children[self.child_index as usize]
    }

    /// The hash of the node this entry describes
    pub fn node_hash(&self) -> Hash {
        node_hash(&self.children)
    }
}

/// Ordered, append-only accumulator of proof steps for one request
///
/// Entries are pushed in root-to-leaf order as responses arrive and are
/// never reordered or removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MerklePath {
    entries: Vec<PathEntry>,
}

impl MerklePath {
    /// An empty path
    pub fn new() -> Self {
        MerklePath {
            entries: Vec::new(),
        }
    }

    /// Number of levels collected so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no levels have been collected
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The selected child hash of the deepest entry
    pub fn selected(&self) -> Option<Hash> {
        self.entries.last().map(PathEntry::selected)
    }

    /// Append one proof step
    ///
    /// Rejects malformed entries (wrong arity, out-of-range slot index)
    /// and paths deeper than the search hash can address.
    pub fn push(&mut self, entry: PathEntry) -> Result<()> {
        if entry.children.len() != NODE_ARITY {
            return Err(Error::Integrity(format!(
                "node has {} child slots, expected {}",
                entry.children.len(),
                NODE_ARITY
            )));
        }
        if entry.child_index as usize >= NODE_ARITY {
            return Err(Error::Integrity(format!(
                "child index {} out of range",
                entry.child_index
            )));
        }
        if self.entries.len() >= MAX_DEPTH {
            return Err(Error::Integrity(format!(
                "path exceeds maximum depth {}",
                MAX_DEPTH
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Fold a leaf hash up through the collected path to a candidate root
    ///
    /// At each level the running hash replaces the selected slot and the
    /// node hash is recomputed. An empty path returns the leaf hash
    /// itself (the leaf is the root).
    pub fn fold(&self, leaf: Hash) -> Hash {
        let mut current = leaf;
        for entry in self.entries.iter().rev() {
            let mut children = entry.children.clone();
            children[entry.child_index as usize] = current;
            current = node_hash(&children);
        }
        current
    }

    /// Verify that the path and leaf hash fold to the expected root
    ///
    /// This check gates every terminal outcome; equality means the leaf
    /// (or its absence, when folding [`Hash::ZERO`]) is authentic under
    /// `expected_root`.
    pub fn verify(&self, leaf: Hash, expected_root: &Hash) -> Result<()> {
        let candidate = self.fold(leaf);
        if candidate == *expected_root {
            Ok(())
        } else {
            Err(Error::Integrity(format!(
                "root mismatch: folded to {}, expected {}",
                candidate.short(),
                expected_root.short()
            )))
        }
    }
}

/// Root hash of the minimal subtree holding two leaves whose paths agree
/// down to `depth` and diverge somewhere below it
///
/// Used by `Put` when the key's slot is occupied by a different key's
/// leaf: both leaves are pushed down until their nibble paths split.
pub fn split_subtree_root(
    depth: usize,
    a: (Hash, Hash), // (search hash, leaf hash)
    b: (Hash, Hash),
) -> Result<Hash> {
    if depth >= MAX_DEPTH {
        return Err(Error::Integrity(
            "search hashes are identical, cannot split".into(),
        ));
    }
    let slot_a = a.0.nibble(depth) as usize;
    let slot_b = b.0.nibble(depth) as usize;
    let mut children = vec![Hash::ZERO; NODE_ARITY];
    if slot_a == slot_b {
        children[slot_a] = split_subtree_root(depth + 1, a, b)?;
    } else {
        children[slot_a] = a.1;
        children[slot_b] = b.1;
    }
    Ok(node_hash(&children))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a path for `search` through a hand-made tree of the given
    /// depth, returning (entries, root) with `leaf` at the bottom.
    fn build_path(search: &Hash, leaf: Hash, depth: usize) -> (Vec<PathEntry>, Hash) {
        let mut entries = Vec::new();
        let mut current = leaf;
        for level in (0..depth).rev() {
            let slot = search.nibble(level);
            let mut children = vec![Hash::ZERO; NODE_ARITY];
            // a couple of non-empty siblings so tampering has a target
            children[(slot as usize + 1) % NODE_ARITY] = Hash::digest(&[level as u8, 1]);
            children[(slot as usize + 2) % NODE_ARITY] = Hash::digest(&[level as u8, 2]);
            children[slot as usize] = current;
            current = node_hash(&children);
            entries.push(PathEntry {
                children,
                child_index: slot,
            });
        }
        entries.reverse();
        (entries, current)
    }

    fn collect(entries: Vec<PathEntry>) -> MerklePath {
        let mut path = MerklePath::new();
        for entry in entries {
            path.push(entry).unwrap();
        }
        path
    }

    #[test]
    fn test_fold_reaches_true_root() {
        let search = Hash::digest(b"key");
        let leaf = leaf_hash(&search, b"cipher");
        for depth in [1, 3, 7] {
            let (entries, root) = build_path(&search, leaf, depth);
            let path = collect(entries);
            assert_eq!(path.fold(leaf), root);
            path.verify(leaf, &root).unwrap();
        }
    }

    #[test]
    fn test_empty_path_folds_to_leaf() {
        let leaf = leaf_hash(&Hash::digest(b"k"), b"v");
        let path = MerklePath::new();
        assert_eq!(path.fold(leaf), leaf);
    }

    #[test]
    fn test_tampered_sibling_detected() {
        let search = Hash::digest(b"key");
        let leaf = leaf_hash(&search, b"cipher");
        let (entries, root) = build_path(&search, leaf, 4);

        for level in 0..entries.len() {
            let mut tampered = entries.clone();
            let slot = (tampered[level].child_index as usize + 1) % NODE_ARITY;
            let mut bytes = *tampered[level].children[slot].as_bytes();
            bytes[0] ^= 0x01;
            tampered[level].children[slot] = Hash::from_bytes(bytes);

            let path = collect(tampered);
            assert!(path.verify(leaf, &root).is_err(), "level {} not detected", level);
        }
    }

    #[test]
    fn test_tampered_leaf_detected() {
        let search = Hash::digest(b"key");
        let leaf = leaf_hash(&search, b"cipher");
        let (entries, root) = build_path(&search, leaf, 4);
        let path = collect(entries);

        let forged = leaf_hash(&search, b"ciphes");
        assert!(path.verify(forged, &root).is_err());
    }

    #[test]
    fn test_reordered_entries_detected() {
        let search = Hash::digest(b"key");
        let leaf = leaf_hash(&search, b"cipher");
        let (entries, root) = build_path(&search, leaf, 4);

        let mut reordered = entries.clone();
        reordered.swap(1, 2);
        if reordered == entries {
            return; // degenerate: identical levels
        }
        let path = collect(reordered);
        assert!(path.verify(leaf, &root).is_err());
    }

    #[test]
    fn test_sibling_permutation_detected() {
        // moving the running hash to another slot must change the root
        let search = Hash::digest(b"key");
        let leaf = leaf_hash(&search, b"cipher");
        let (mut entries, root) = build_path(&search, leaf, 2);

        let old = entries[1].child_index;
        entries[1].child_index = (old + 1) % NODE_ARITY as u8;
        let path = collect(entries);
        assert!(path.verify(leaf, &root).is_err());
    }

    #[test]
    fn test_push_rejects_malformed_entries() {
        let mut path = MerklePath::new();

        let wrong_arity = PathEntry {
            children: vec![Hash::ZERO; NODE_ARITY - 1],
            child_index: 0,
        };
        assert!(path.push(wrong_arity).is_err());

        let bad_index = PathEntry {
            children: vec![Hash::ZERO; NODE_ARITY],
            child_index: NODE_ARITY as u8,
        };
        assert!(path.push(bad_index).is_err());
    }

    #[test]
    fn test_push_rejects_overlong_path() {
        let mut path = MerklePath::new();
        let entry = PathEntry {
            children: vec![Hash::ZERO; NODE_ARITY],
            child_index: 0,
        };
        for _ in 0..MAX_DEPTH {
            path.push(entry.clone()).unwrap();
        }
        assert!(path.push(entry).is_err());
    }

    #[test]
    fn test_split_subtree_places_both_leaves() {
        let sa = Hash::digest(b"a");
        let sb = Hash::digest(b"b");
        let la = leaf_hash(&sa, b"1");
        let lb = leaf_hash(&sb, b"2");

        let root = split_subtree_root(0, (sa, la), (sb, lb)).unwrap();

        // descending by either key's nibbles must reach its leaf
        assert_ne!(root, split_subtree_root(0, (sa, lb), (sb, la)).unwrap());
        assert_eq!(
            root,
            split_subtree_root(0, (sb, lb), (sa, la)).unwrap(),
            "argument order must not matter"
        );
    }

    #[test]
    fn test_split_subtree_identical_keys_rejected() {
        let s = Hash::digest(b"same");
        let l = leaf_hash(&s, b"v");
        assert!(split_subtree_root(0, (s, l), (s, l)).is_err());
    }
}
