//! Client session driving verified operations against a server

use crate::model::{ClientState, Hash};
use crate::proof::MAX_DEPTH;
use crate::protocol::{
    BTreeClientRequest, GetOutcome, GetState, GetStep, PutOutcome, PutState, PutStep,
    ServerResponse,
};
use crate::signer::RootSigner;
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;

/// The wire seam to the untrusted server
///
/// One request, one response, per round trip. Implementations surface
/// connection and timeout failures as [`Error::Transport`]; the core
/// never retries on its own, since a retry has to restart from a fresh
/// root snapshot.
pub trait Transport {
    fn send(&mut self, request: &BTreeClientRequest) -> Result<ServerResponse>;
}

/// One client session over a tree
///
/// Owns the authoritative [`ClientState`] (the single point of shared
/// mutable state), the root-signing key, and a transport. Operations
/// capture an owned snapshot of the state at start and verify against
/// it alone; `put` replaces the root in one atomic write after the
/// server acknowledges the signed update.
///
/// The protocol assumes one logical writer per tree epoch; serializing
/// concurrent writers is the caller's responsibility.
pub struct BTreeClient<T> {
    transport: T,
    signer: RootSigner,
    state: RwLock<ClientState>,
}

impl<T: Transport> BTreeClient<T> {
    /// Open a session resuming from a persisted trusted state
    pub fn new(transport: T, signer: RootSigner, state: ClientState) -> Self {
        BTreeClient {
            transport,
            signer,
            state: RwLock::new(state),
        }
    }

    /// Open a session over an empty tree
    pub fn empty(transport: T, signer: RootSigner) -> Self {
        Self::new(transport, signer, ClientState::empty())
    }

    /// The currently trusted root
    pub fn current_root(&self) -> Hash {
        self.state.read().merkle_root()
    }

    /// The trusted state, for caller-managed persistence
    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Look up a key, verifying every step against the snapshot root
    pub fn get<K: Serialize>(&mut self, key: K) -> Result<GetOutcome> {
        let snapshot = *self.state.read();
        let mut step = GetState::start(key, &snapshot)?;
        // one node per level, the leaf, and the terminal step
        for _ in 0..MAX_DEPTH + 3 {
            match step {
                GetStep::Done(outcome) => return Ok(outcome),
                GetStep::Continue(state) => {
                    let response = self.transport.send(state.next_request())?;
                    step = state.advance(response)?;
                }
            }
        }
        Err(Error::Integrity("get exceeded the round-trip bound".into()))
    }

    /// Write a key, verifying the pre-image tree, signing the new root,
    /// and atomically replacing the trusted state on acknowledgement
    pub fn put<K: Serialize, V: Serialize>(&mut self, key: K, value: V) -> Result<PutOutcome> {
        let snapshot = *self.state.read();
        let mut step = PutState::start(key, value, &snapshot)?;
        // one node per level, the leaf, signing, confirmation, terminal
        for _ in 0..MAX_DEPTH + 5 {
            match step {
                PutStep::Done(outcome) => {
                    *self.state.write() = ClientState::new(outcome.new_root);
                    return Ok(outcome);
                }
                PutStep::RootReady(pending) => {
                    step = PutStep::Continue(pending.sign(&self.signer)?);
                }
                PutStep::Continue(state) => {
                    let response = self.transport.send(state.next_request())?;
                    step = state.advance(response)?;
                }
            }
        }
        Err(Error::Integrity("put exceeded the round-trip bound".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::MemoryServer;
    use bytes::Bytes;

    /// Transport wrapper that corrupts one byte of every leaf cipher
    struct TamperingTransport(MemoryServer);

    impl Transport for TamperingTransport {
        fn send(&mut self, request: &BTreeClientRequest) -> Result<ServerResponse> {
            let response = self.0.send(request)?;
            Ok(match response {
                ServerResponse::Leaf { key_hash, cipher } => {
                    let mut bytes = cipher.to_vec();
                    if let Some(first) = bytes.first_mut() {
                        *first ^= 0x01;
                    }
                    ServerResponse::Leaf {
                        key_hash,
                        cipher: Bytes::from(bytes),
                    }
                }
                other => other,
            })
        }
    }

    fn client_with_server() -> BTreeClient<MemoryServer> {
        let signer = RootSigner::generate();
        let server = MemoryServer::with_verifier(signer.verifier());
        BTreeClient::empty(server, signer)
    }

    #[test]
    fn test_put_get_roundtrip() {
        let mut client = client_with_server();

        let outcome = client.put("a", "1").unwrap();
        assert_eq!(outcome.previous, None);
        assert_eq!(client.current_root(), outcome.new_root);

        let got = client.get("a").unwrap();
        assert_eq!(got.decode::<String>().unwrap(), Some("1".into()));
        assert_eq!(client.get("b").unwrap(), GetOutcome::NotFound);
    }

    #[test]
    fn test_overwrite_returns_previous() {
        let mut client = client_with_server();
        client.put("a", "1").unwrap();
        let outcome = client.put("a", "2").unwrap();

        let previous = outcome.previous.expect("overwrite must report the old value");
        let old: String = bincode::deserialize(&previous).unwrap();
        assert_eq!(old, "1");

        let got = client.get("a").unwrap();
        assert_eq!(got.decode::<String>().unwrap(), Some("2".into()));
    }

    #[test]
    fn test_many_keys_survive() {
        let mut client = client_with_server();
        for i in 0..50u32 {
            client.put(i, i * 10).unwrap();
        }
        for i in 0..50u32 {
            let got = client.get(i).unwrap();
            assert_eq!(got.decode::<u32>().unwrap(), Some(i * 10), "key {}", i);
        }
        assert_eq!(client.get(1000u32).unwrap(), GetOutcome::NotFound);
    }

    #[test]
    fn test_tampered_cipher_fails_closed() {
        let signer = RootSigner::generate();
        let server = MemoryServer::with_verifier(signer.verifier());

        // populate honestly, then read through a tampering wrapper
        let mut honest = BTreeClient::new(server, signer.clone(), ClientState::empty());
        honest.put("a", "1").unwrap();
        let state = honest.state();
        let BTreeClient { transport, .. } = honest;

        let mut client = BTreeClient::new(TamperingTransport(transport), signer, state);
        let err = client.get("a").unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn test_stale_snapshot_sees_old_epoch() {
        // concrete scenario: R0 = {a:1}; put(b,2) -> R1
        let mut client = client_with_server();
        client.put("a", "1").unwrap();
        let r0 = client.state();

        let r1 = client.put("b", "2").unwrap().new_root;
        assert_eq!(client.current_root(), r1);

        // under R1 both keys verify
        assert_eq!(
            client.get("a").unwrap().decode::<String>().unwrap(),
            Some("1".into())
        );
        assert_eq!(
            client.get("b").unwrap().decode::<String>().unwrap(),
            Some("2".into())
        );

        // a reader pinned to R0 still proves "b" absent there
        let BTreeClient { transport, signer, .. } = client;
        let mut stale = BTreeClient::new(transport, signer, r0);
        assert_eq!(stale.get("b").unwrap(), GetOutcome::NotFound);
        assert_eq!(
            stale.get("a").unwrap().decode::<String>().unwrap(),
            Some("1".into())
        );
    }

    #[test]
    fn test_transport_error_is_retryable() {
        struct DeadTransport;
        impl Transport for DeadTransport {
            fn send(&mut self, _request: &BTreeClientRequest) -> Result<ServerResponse> {
                Err(Error::Transport("connection refused".into()))
            }
        }

        let mut client = BTreeClient::new(
            DeadTransport,
            RootSigner::generate(),
            ClientState::new(Hash::digest(b"nonempty")),
        );
        let err = client.get("a").unwrap_err();
        assert!(err.is_retryable());
    }
}
