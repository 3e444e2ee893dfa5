//! The client's trusted view of the tree

use super::Hash;
use serde::{Deserialize, Serialize};

/// The client's currently trusted Merkle root
///
/// An immutable snapshot: a new instance replaces the old one atomically
/// after a verified `Put`, and every in-flight operation holds its own
/// copy taken at start. `Copy` semantics guarantee a later root update
/// can never reach back into a running request's verification target.
///
/// Persisting the state between sessions is the caller's job; the core
/// only reads and replaces it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    merkle_root: Hash,
}

impl ClientState {
    /// Trust the given root
    pub fn new(merkle_root: Hash) -> Self {
        ClientState { merkle_root }
    }

    /// The state of an empty tree (zero root)
    pub fn empty() -> Self {
        ClientState {
            merkle_root: Hash::ZERO,
        }
    }

    /// The trusted root
    pub fn merkle_root(&self) -> Hash {
        self.merkle_root
    }

    /// Whether the tree is empty
    pub fn is_empty(&self) -> bool {
        self.merkle_root.is_zero()
    }
}

impl Default for ClientState {
    fn default() -> Self {
        ClientState::empty()
    }
}
