//! In-memory reference server
//!
//! An honest server the test suite (and demos) run the protocol
//! against. Nodes are stored content-addressed and never deleted, so
//! roots from earlier epochs stay resolvable and a reader pinned to an
//! old snapshot keeps getting provable answers.
//!
//! Nothing here is trusted by the client side; the state machines treat
//! this exactly like any remote peer.

use crate::model::Hash;
use crate::proof::{leaf_hash, node_hash, MAX_DEPTH, NODE_ARITY};
use crate::protocol::{BTreeClientRequest, ServerResponse};
use crate::signer::RootVerifier;
use crate::{client::Transport, Error, Result};
use bytes::Bytes;
use std::collections::HashMap;

#[derive(Clone, Debug)]
enum StoredNode {
    Node(Vec<Hash>),
    Leaf { key_hash: Hash, cipher: Bytes },
}

/// An honest in-memory server over a content-addressed node store
pub struct MemoryServer {
    nodes: HashMap<Hash, StoredNode>,
    root: Hash,
    verifier: Option<RootVerifier>,
}

impl MemoryServer {
    /// A server over an empty tree, accepting any confirmed root
    pub fn new() -> Self {
        MemoryServer {
            nodes: HashMap::new(),
            root: Hash::ZERO,
            verifier: None,
        }
    }

    /// A server that checks root signatures before committing an epoch
    pub fn with_verifier(verifier: RootVerifier) -> Self {
        MemoryServer {
            nodes: HashMap::new(),
            root: Hash::ZERO,
            verifier: Some(verifier),
        }
    }

    /// The server's current root
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Number of stored nodes across all epochs
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Insert directly, bypassing the client protocol
    ///
    /// Returns the new root. For test setup and bootstrapping.
    pub fn seed(&mut self, key_hash: Hash, cipher: Bytes) -> Result<Hash> {
        let new_root = self.insert_at(self.root, 0, key_hash, &cipher)?;
        self.root = new_root;
        Ok(new_root)
    }

    fn store_leaf(&mut self, key_hash: Hash, cipher: Bytes) -> Hash {
        let hash = leaf_hash(&key_hash, &cipher);
        self.nodes.insert(hash, StoredNode::Leaf { key_hash, cipher });
        hash
    }

    fn store_node(&mut self, children: Vec<Hash>) -> Hash {
        let hash = node_hash(&children);
        self.nodes.insert(hash, StoredNode::Node(children));
        hash
    }

    fn insert_at(
        &mut self,
        node: Hash,
        depth: usize,
        key_hash: Hash,
        cipher: &Bytes,
    ) -> Result<Hash> {
        if depth >= MAX_DEPTH {
            return Err(Error::Integrity("insert exceeds maximum depth".into()));
        }
        if node.is_zero() {
            return Ok(self.store_leaf(key_hash, cipher.clone()));
        }
        let stored = self
            .nodes
            .get(&node)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("unknown node {}", node.short())))?;

        match stored {
            StoredNode::Leaf {
                key_hash: existing_key,
                ..
            } => {
                if existing_key == key_hash {
                    return Ok(self.store_leaf(key_hash, cipher.clone()));
                }
                // push both leaves down to the first divergent nibble
                let new_leaf = self.store_leaf(key_hash, cipher.clone());
                let existing_leaf = node;
                let mut level = depth;
                while key_hash.nibble(level) == existing_key.nibble(level) {
                    level += 1;
                    if level >= MAX_DEPTH {
                        return Err(Error::Integrity("search hash collision".into()));
                    }
                }
                let mut children = vec![Hash::ZERO; NODE_ARITY];
                children[key_hash.nibble(level) as usize] = new_leaf;
                children[existing_key.nibble(level) as usize] = existing_leaf;
                let mut hash = self.store_node(children);
                while level > depth {
                    level -= 1;
                    let mut wrapper = vec![Hash::ZERO; NODE_ARITY];
                    wrapper[key_hash.nibble(level) as usize] = hash;
                    hash = self.store_node(wrapper);
                }
                Ok(hash)
            }
            StoredNode::Node(mut children) => {
                let slot = key_hash.nibble(depth) as usize;
                let new_child = self.insert_at(children[slot], depth + 1, key_hash, cipher)?;
                children[slot] = new_child;
                Ok(self.store_node(children))
            }
        }
    }

    fn serve(&self, node: Hash, search: Hash, depth: usize) -> Result<ServerResponse> {
        if depth >= MAX_DEPTH {
            return Err(Error::Transport("descent beyond maximum depth".into()));
        }
        match self.nodes.get(&node) {
            None => Err(Error::Transport(format!("unknown node {}", node.short()))),
            Some(StoredNode::Node(children)) => Ok(ServerResponse::Node {
                children: children.clone(),
                child_index: search.nibble(depth),
            }),
            Some(StoredNode::Leaf { key_hash, cipher }) => Ok(ServerResponse::Leaf {
                key_hash: *key_hash,
                cipher: cipher.clone(),
            }),
        }
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        MemoryServer::new()
    }
}

impl Transport for MemoryServer {
    fn send(&mut self, request: &BTreeClientRequest) -> Result<ServerResponse> {
        match request {
            BTreeClientRequest::Init { root, search } => self.serve(*root, *search, 0),
            BTreeClientRequest::Descend {
                child,
                search,
                depth,
            } => self.serve(*child, *search, *depth as usize),
            BTreeClientRequest::Confirm {
                update,
                search,
                cipher,
            } => {
                if let Some(verifier) = &self.verifier {
                    verifier.verify(update)?;
                }
                // materialize the new epoch ourselves; the signed root
                // must match what our own insert computes
                let new_root = self.insert_at(self.root, 0, *search, cipher)?;
                if new_root != update.root() {
                    return Err(Error::Transport(
                        "confirmed root does not match server state".into(),
                    ));
                }
                self.root = new_root;
                Ok(ServerResponse::Confirmed)
            }
        }
    }
}
