//! Compiled targets and their lifecycle scripts.
//!
//! A [`CompiledTarget`] is what the compiler hands to the host engine. It is
//! never mutated after compilation: each [`LifecycleScript`] owns an immutable
//! snapshot ([`ScriptAction`]) of every declaration field its steps read, and
//! runtime state lives in the host-owned [`crate::execute::ScriptEnv`].
//!
//! # Submodules
//!
//! - [`metadata`] - typed derived facts and their label rendering

pub mod metadata;
mod types;

pub use metadata::Metadata;
pub use types::*;
