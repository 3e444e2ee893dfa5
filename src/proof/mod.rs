//! Merkle proof accumulation and verification
//!
//! Everything the server returns is folded through a [`MerklePath`]
//! before it is believed; the fold is the single place where trust is
//! decided.

mod path;

pub use path::{
    leaf_hash, node_hash, split_subtree_root, MerklePath, PathEntry, MAX_DEPTH, NODE_ARITY,
};
