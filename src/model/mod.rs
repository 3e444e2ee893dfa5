//! Core data model types for veritree

mod hash;
mod state;

pub use hash::Hash;
pub use state::ClientState;
