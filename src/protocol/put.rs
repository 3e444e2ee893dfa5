//! The `Put` state machine
//!
//! A `Put` always verifies the pre-image tree before computing anything
//! new: the path is folded against the snapshot root with the old leaf
//! hash (or the zero hash for an empty slot) and only then re-folded
//! with the new leaf to produce the candidate root. A server can
//! therefore never get an update forged onto a subtree it never proved.

use super::{BTreeClientRequest, ServerResponse};
use crate::model::{ClientState, Hash};
use crate::proof::{leaf_hash, split_subtree_root, MerklePath, PathEntry, MAX_DEPTH};
use crate::signer::RootSigner;
use crate::{Error, Result};
use bytes::Bytes;
use serde::Serialize;

/// Terminal outcome of a successful `Put`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    /// The signed, server-acknowledged new root
    pub new_root: Hash,
    /// The previous cipher value when the key already existed
    ///
    /// `Some` means the put was an overwrite, `None` an insert.
    pub previous: Option<Bytes>,
}

/// Result of advancing a [`PutState`] by one response
#[derive(Debug)]
pub enum PutStep<K, V> {
    /// More round trips needed; issue `next_request`
    Continue(PutState<K, V>),
    /// Pre-image verified and candidate root computed; sign it to proceed
    RootReady(PendingRoot<K, V>),
    /// The new root is signed and acknowledged
    Done(PutOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PutPhase {
    Traversing,
    AwaitingConfirm { new_root: Hash },
}

/// Per-operation state for one `Put`
///
/// Created only through [`PutState::start`]; same snapshot and
/// succession discipline as the `Get` machine.
#[derive(Debug)]
pub struct PutState<K, V> {
    key: K,
    value: V,
    search: Hash,
    cipher: Bytes,
    root_snapshot: Hash,
    path: MerklePath,
    expected: Hash,
    old_cipher: Option<Bytes>,
    next_request: BTreeClientRequest,
    phase: PutPhase,
}

impl<K: Serialize, V: Serialize> PutState<K, V> {
    /// Start a `Put` of `key = value` against the current trusted root
    ///
    /// On an empty tree there is no pre-image to verify; the new leaf is
    /// the whole tree and the operation goes straight to signing.
    pub fn start(key: K, value: V, client: &ClientState) -> Result<PutStep<K, V>> {
        let search = super::search_key(&key)?;
        let cipher = Bytes::from(bincode::serialize(&value)?);
        let root = client.merkle_root();

        let state = PutState {
            key,
            value,
            search,
            cipher: cipher.clone(),
            root_snapshot: root,
            path: MerklePath::new(),
            expected: root,
            old_cipher: None,
            next_request: BTreeClientRequest::Init { root, search },
            phase: PutPhase::Traversing,
        };

        if root.is_zero() {
            let new_root = leaf_hash(&search, &cipher);
            return Ok(PutStep::RootReady(PendingRoot {
                inner: state,
                new_root,
            }));
        }
        Ok(PutStep::Continue(state))
    }

    /// The request to send for the next round trip
    pub fn next_request(&self) -> &BTreeClientRequest {
        &self.next_request
    }

    /// The key being written
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The value being written
    pub fn value(&self) -> &V {
        &self.value
    }

    /// The root captured when the operation started
    pub fn root_snapshot(&self) -> Hash {
        self.root_snapshot
    }

    /// Consume one server response and advance
    pub fn advance(mut self, response: ServerResponse) -> Result<PutStep<K, V>> {
        if let PutPhase::AwaitingConfirm { new_root } = self.phase {
            return match response {
                ServerResponse::Confirmed => Ok(PutStep::Done(PutOutcome {
                    new_root,
                    previous: self.old_cipher,
                })),
                _ => Err(Error::Integrity(
                    "expected confirmation of the signed root".into(),
                )),
            };
        }

        match response {
            ServerResponse::Node {
                children,
                child_index,
            } => {
                let entry = PathEntry {
                    children,
                    child_index,
                };
                if entry.node_hash() != self.expected {
                    return Err(Error::Integrity(format!(
                        "node does not match the hash proven by its parent (expected {})",
                        self.expected.short()
                    )));
                }
                let depth = self.path.len();
                if depth >= MAX_DEPTH {
                    return Err(Error::Integrity(format!(
                        "path exceeds maximum depth {}",
                        MAX_DEPTH
                    )));
                }
                if entry.child_index != self.search.nibble(depth) {
                    return Err(Error::Integrity(format!(
                        "child index {} does not follow the key path at depth {}",
                        entry.child_index, depth
                    )));
                }
                let selected = match entry.children.get(entry.child_index as usize) {
                    Some(hash) => *hash,
                    None => {
                        return Err(Error::Integrity(format!(
                            "child index {} out of range",
                            entry.child_index
                        )))
                    }
                };
                self.path.push(entry)?;

                if selected.is_zero() {
                    // empty slot: verify the absence, then insert there
                    self.path.verify(Hash::ZERO, &self.root_snapshot)?;
                    let new_root = self.path.fold(leaf_hash(&self.search, &self.cipher));
                    return Ok(PutStep::RootReady(PendingRoot {
                        inner: self,
                        new_root,
                    }));
                }
                self.expected = selected;
                self.next_request = BTreeClientRequest::Descend {
                    child: selected,
                    search: self.search,
                    depth: self.path.len() as u8,
                };
                Ok(PutStep::Continue(self))
            }
            ServerResponse::Leaf { key_hash, cipher } => {
                let old_leaf = leaf_hash(&key_hash, &cipher);
                if old_leaf != self.expected {
                    return Err(Error::Integrity(format!(
                        "leaf does not match the hash proven by its parent (expected {})",
                        self.expected.short()
                    )));
                }
                // verify the tree being mutated before touching it
                self.path.verify(old_leaf, &self.root_snapshot)?;

                let new_leaf = leaf_hash(&self.search, &self.cipher);
                let new_root = if key_hash == self.search {
                    // overwrite: remember the old value for the caller
                    self.old_cipher = Some(cipher);
                    self.path.fold(new_leaf)
                } else {
                    // slot occupied by another key: it must lie on the
                    // search path, then both leaves are pushed down
                    for level in 0..self.path.len() {
                        if key_hash.nibble(level) != self.search.nibble(level) {
                            return Err(Error::Integrity(
                                "leaf key does not lie on the search path".into(),
                            ));
                        }
                    }
                    let subtree = split_subtree_root(
                        self.path.len(),
                        (self.search, new_leaf),
                        (key_hash, old_leaf),
                    )?;
                    self.path.fold(subtree)
                };
                Ok(PutStep::RootReady(PendingRoot {
                    inner: self,
                    new_root,
                }))
            }
            ServerResponse::Confirmed => Err(Error::Integrity(
                "unexpected confirmation response during traversal".into(),
            )),
        }
    }
}

/// A `Put` whose pre-image is verified and whose candidate root is
/// computed, waiting for the root signature
#[derive(Debug)]
pub struct PendingRoot<K, V> {
    inner: PutState<K, V>,
    new_root: Hash,
}

impl<K: Serialize, V: Serialize> PendingRoot<K, V> {
    /// The candidate new root
    pub fn new_root(&self) -> Hash {
        self.new_root
    }

    /// Sign the candidate root and move to the confirmation round trip
    ///
    /// A signing failure aborts the whole `Put`; the prior trusted root
    /// stays authoritative.
    pub fn sign(self, signer: &RootSigner) -> Result<PutState<K, V>> {
        let update = signer.sign_root(&self.new_root)?;
        let mut state = self.inner;
        state.next_request = BTreeClientRequest::Confirm {
            update,
            search: state.search,
            cipher: state.cipher.clone(),
        };
        state.phase = PutPhase::AwaitingConfirm {
            new_root: self.new_root,
        };
        Ok(state)
    }
}
