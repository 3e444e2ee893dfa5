//! # veritree
//!
//! A client-side protocol for operating on a B-tree that lives on an
//! untrusted remote server.
//!
//! The client never takes the server's word for anything: every
//! traversal step is checked against a cryptographically accumulated
//! Merkle path, so a malicious or buggy server cannot substitute,
//! delete, or reorder data without detection. Writes verify the tree
//! they mutate, compute the new root locally, and authenticate it with
//! an Ed25519 signature before it becomes the trusted root.
//!
//! ## Core Concepts
//!
//! - **ClientState**: the trusted Merkle root; replaced atomically,
//!   snapshotted per operation
//! - **MerklePath**: append-only proof accumulator; its fold is the
//!   sole authority for accepting server data
//! - **GetState / PutState**: per-operation state machines, advanced
//!   one server round trip at a time
//! - **RootSigner**: signs each new root exactly once per verified put
//!
//! ## Example
//!
//! ```ignore
//! use veritree::{BTreeClient, MemoryServer, RootSigner};
//!
//! let signer = RootSigner::generate();
//! let server = MemoryServer::with_verifier(signer.verifier());
//! let mut client = BTreeClient::empty(server, signer);
//!
//! client.put("answer", 42u32)?;
//! let answer: Option<u32> = client.get("answer")?.decode()?;
//! ```

pub mod model;
pub mod proof;
pub mod protocol;

mod client;
mod error;
mod server;
mod signer;

pub use client::{BTreeClient, Transport};
pub use error::{Error, Result};
pub use model::{ClientState, Hash};
pub use proof::{MerklePath, PathEntry};
pub use protocol::{
    BTreeClientRequest, GetOutcome, GetState, GetStep, PendingRoot, PutOutcome, PutState, PutStep,
    ServerResponse,
};
pub use server::MemoryServer;
pub use signer::{RootSigner, RootVerifier, SignedRoot};

/// Protocol version for message compatibility
pub const PROTOCOL_VERSION: u32 = 1;
