//! Root signatures over Ed25519
//!
//! A thin wrapper around `ed25519-dalek`; the protocol treats it as an
//! opaque sign/verify oracle and never inspects curve internals. A new
//! root is signed exactly once per successful `Put`, and any component
//! receiving a root from outside can check it with [`RootVerifier`].

use crate::model::Hash;
use crate::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

const ROOT_DOMAIN: &[u8] = b"veritree.root.v1";

/// The domain-separated message a root signature covers
fn root_message(root: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(ROOT_DOMAIN.len() + 32);
    message.extend_from_slice(ROOT_DOMAIN);
    message.extend_from_slice(root.as_bytes());
    message
}

/// A Merkle root together with the signature that authenticates it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRoot {
    root: Hash,
    signature: Signature,
}

impl SignedRoot {
    /// The root being authenticated
    pub fn root(&self) -> Hash {
        self.root
    }

    /// The signature over the root
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// Signing half of the root-update key pair, held by the single writer
#[derive(Clone)]
pub struct RootSigner {
    key: SigningKey,
}

impl RootSigner {
    /// Generate a fresh key pair from the OS rng
    pub fn generate() -> Self {
        RootSigner {
            key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Restore a signer from its 32 secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        RootSigner {
            key: SigningKey::from_bytes(bytes),
        }
    }

    /// The secret bytes, for caller-managed persistence
    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// The matching verifier
    pub fn verifier(&self) -> RootVerifier {
        RootVerifier {
            key: self.key.verifying_key(),
        }
    }

    /// Sign a candidate new root
    pub fn sign_root(&self, root: &Hash) -> Result<SignedRoot> {
        let signature = self
            .key
            .try_sign(&root_message(root))
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(SignedRoot {
            root: *root,
            signature,
        })
    }
}

/// Verifying half of the root-update key pair
#[derive(Clone, Copy, Debug)]
pub struct RootVerifier {
    key: VerifyingKey,
}

impl RootVerifier {
    /// Restore a verifier from its 32 public bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let key = VerifyingKey::from_bytes(bytes).map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(RootVerifier { key })
    }

    /// The public bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Check that a signed root was produced by the matching signer
    pub fn verify(&self, signed: &SignedRoot) -> Result<()> {
        self.key
            .verify(&root_message(&signed.root), &signed.signature)
            .map_err(|e| Error::Crypto(format!("root signature rejected: {}", e)))
    }
}
