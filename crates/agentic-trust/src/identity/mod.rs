//! Agent identities and the directory of known peers.
//!
//! `AgentIdentity` owns (or, for peers, omits) the Ed25519 key pair that
//! every card, delegation and signature in this crate traces back to.

pub mod agent;
pub mod directory;

pub use agent::{AgentIdentity, IdentityId, Signature, ID_PREFIX};
pub use directory::AgentDirectory;
