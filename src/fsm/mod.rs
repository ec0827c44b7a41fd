//! Finite-state machines over the runtime.
//!
//! A state is a bundle of providers. An `EntityStateMachine` swaps component
//! bundles on one entity; an `EngineStateMachine` swaps system bundles on the
//! engine. Transitions diff the outgoing and incoming bundles by provider
//! identity, so anything both states provide identically is left running
//! untouched.

use std::any::TypeId;

pub mod entity_state;
pub mod engine_state;

pub use self::engine_state::{EngineState, EngineStateMachine, SystemProvider};
pub use self::entity_state::{ComponentProvider, EntityState, EntityStateMachine};

/// Identity of a provider, used to decide whether two states provide the
/// same thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderId {
    /// Pinned to one shared allocation; equal only to itself.
    Ptr(usize),
    /// Pinned to a type; any two providers of the type are interchangeable.
    Type(TypeId),
}
