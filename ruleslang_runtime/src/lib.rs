//! ruleslang_runtime
//!
//! Value machinery for the RulesLang tree-walking evaluator: a typed
//! value stack, an arena heap of identity-headed objects, the
//! process-wide type-identity interner, and raw value snapshots.

pub mod error;
pub mod heap;
pub mod identity;
pub mod stack;
pub mod variant;

pub use error::{RuntimeError, RuntimeResult};
pub use heap::{Address, Heap};
pub use identity::{
    intern, lookup, IdentityId, IdentityKind, TypeIdentity, HEADER_SIZE, REFERENCE_SIZE,
};
pub use stack::{StackPrimitive, ValueStack};
pub use variant::Variant;
