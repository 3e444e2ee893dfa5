//! The request/response conversation and the per-operation state machines
//!
//! One logical operation is one state machine ([`GetState`] or
//! [`PutState`]) advanced strictly once per server round trip. Requests
//! are immutable once constructed; a transition produces a successor
//! state with a fresh request.

mod get;
mod put;

pub use get::{GetOutcome, GetState, GetStep};
pub use put::{PendingRoot, PutOutcome, PutState, PutStep};

use crate::model::Hash;
use crate::signer::SignedRoot;
use crate::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// What to ask the server next
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BTreeClientRequest {
    /// Initial request: start traversing from an explicit epoch root
    Init { root: Hash, search: Hash },
    /// Fetch the next node on the path
    ///
    /// Self-contained (search hash and depth included) so the server
    /// does not have to track per-request state.
    Descend { child: Hash, search: Hash, depth: u8 },
    /// Final confirmation of a `Put`: the signed candidate root plus the
    /// material the server needs to materialize the new epoch
    Confirm {
        update: SignedRoot,
        search: Hash,
        cipher: Bytes,
    },
}

/// One response fragment from the server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerResponse {
    /// An internal node: all child slot hashes plus the slot the server
    /// claims continues the path (the client re-derives and checks it)
    Node { children: Vec<Hash>, child_index: u8 },
    /// A leaf: the search hash of the stored key and its cipher value
    Leaf { key_hash: Hash, cipher: Bytes },
    /// Acknowledgement of a `Confirm`
    Confirmed,
}

/// Derive the search hash that addresses a key's path through the tree
pub fn search_key<K: Serialize>(key: &K) -> Result<Hash> {
    let bytes = bincode::serialize(key)?;
    Ok(Hash::digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_key_deterministic() {
        let a = search_key(&"apple").unwrap();
        let b = search_key(&"apple").unwrap();
        let c = search_key(&"banana").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_search_key_distinguishes_types() {
        // same byte content, different encodings
        let s = search_key(&"1").unwrap();
        let n = search_key(&1u64).unwrap();
        assert_ne!(s, n);
    }
}
