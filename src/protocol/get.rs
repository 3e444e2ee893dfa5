//! The `Get` state machine

use super::{BTreeClientRequest, ServerResponse};
use crate::model::{ClientState, Hash};
use crate::proof::{leaf_hash, MerklePath, PathEntry, MAX_DEPTH};
use crate::{Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Terminal outcome of a `Get`
///
/// An absent key is a valid outcome, not an error; both variants are
/// only produced after the accumulated path folded to the snapshot root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GetOutcome {
    /// The key exists; its verified cipher value
    Found(Bytes),
    /// The key is provably absent under the snapshot root
    NotFound,
}

impl GetOutcome {
    /// Whether the key was found
    pub fn is_found(&self) -> bool {
        matches!(self, GetOutcome::Found(_))
    }

    /// Decode the cipher value into its plaintext type
    pub fn decode<V: DeserializeOwned>(&self) -> Result<Option<V>> {
        match self {
            GetOutcome::Found(cipher) => Ok(Some(bincode::deserialize(cipher)?)),
            GetOutcome::NotFound => Ok(None),
        }
    }
}

/// Result of advancing a [`GetState`] by one response
#[derive(Debug)]
pub enum GetStep<K> {
    /// More round trips needed; issue `next_request`
    Continue(GetState<K>),
    /// Terminal outcome, verification included
    Done(GetOutcome),
}

/// Per-operation state for one `Get`
///
/// Created only through [`GetState::start`], which captures the root
/// snapshot the whole operation verifies against. Each `advance`
/// consumes the state and returns a successor; responses can therefore
/// never be applied out of order or twice.
#[derive(Debug)]
pub struct GetState<K> {
    key: K,
    search: Hash,
    root_snapshot: Hash,
    path: MerklePath,
    /// Hash the next response must prove itself against
    expected: Hash,
    next_request: BTreeClientRequest,
}

impl<K: Serialize> GetState<K> {
    /// Start a `Get` for `key` against the current trusted root
    ///
    /// An empty tree terminates immediately: there is nothing to ask the
    /// server and nothing it could prove.
    pub fn start(key: K, client: &ClientState) -> Result<GetStep<K>> {
        let search = super::search_key(&key)?;
        let root = client.merkle_root();
        if root.is_zero() {
            return Ok(GetStep::Done(GetOutcome::NotFound));
        }
        Ok(GetStep::Continue(GetState {
            key,
            search,
            root_snapshot: root,
            path: MerklePath::new(),
            expected: root,
            next_request: BTreeClientRequest::Init { root, search },
        }))
    }

    /// The request to send for the next round trip
    pub fn next_request(&self) -> &BTreeClientRequest {
        &self.next_request
    }

    /// The key being looked up
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The root captured when the operation started
    pub fn root_snapshot(&self) -> Hash {
        self.root_snapshot
    }

    /// Consume one server response and advance
    pub fn advance(mut self, response: ServerResponse) -> Result<GetStep<K>> {
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
                    // the key's slot is empty: prove the absence
                    self.path.verify(Hash::ZERO, &self.root_snapshot)?;
                    return Ok(GetStep::Done(GetOutcome::NotFound));
                }
                self.expected = selected;
                self.next_request = BTreeClientRequest::Descend {
                    child: selected,
                    search: self.search,
                    depth: self.path.len() as u8,
                };
                Ok(GetStep::Continue(self))
            }
            ServerResponse::Leaf { key_hash, cipher } => {
                let leaf = leaf_hash(&key_hash, &cipher);
                if leaf != self.expected {
                    return Err(Error::Integrity(format!(
                        "leaf does not match the hash proven by its parent (expected {})",
                        self.expected.short()
                    )));
                }
                // sole acceptance authority: no value without this fold
                self.path.verify(leaf, &self.root_snapshot)?;
                if key_hash == self.search {
                    Ok(GetStep::Done(GetOutcome::Found(cipher)))
                } else {
                    // another key's leaf occupies this prefix; it must
                    // actually lie on the search path to prove absence
                    for level in 0..self.path.len() {
                        if key_hash.nibble(level) != self.search.nibble(level) {
                            return Err(Error::Integrity(
                                "leaf key does not lie on the search path".into(),
                            ));
                        }
                    }
                    Ok(GetStep::Done(GetOutcome::NotFound))
                }
            }
            ServerResponse::Confirmed => Err(Error::Integrity(
                "unexpected confirmation response during get".into(),
            )),
        }
    }
}
