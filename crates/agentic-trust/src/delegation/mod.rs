//! Capability delegation between identities.

pub mod chain;
pub mod record;

pub use chain::DelegationChain;
pub use record::Delegation;
