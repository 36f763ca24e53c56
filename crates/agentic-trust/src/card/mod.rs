//! Capability cards and the on-behalf-of context they may carry.

pub mod capability_card;
pub mod user_context;

pub use capability_card::{CapabilityCard, EffectiveCapabilities};
pub use user_context::UserContext;
