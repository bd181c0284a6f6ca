//! Arena, string interner and object pools backing the engine's allocation.
//!
//! All long-lived bytes (interned names, token values) are bump-allocated into an
//! [Arena] and addressed through stable [ArenaRef] handles which remain valid until
//! the arena is reset. The [StringInterner] deduplicates identifiers into dense
//! [StrId](crate::StrId)s, and [ObjectPool] recycles path objects between steps so
//! that forking does not allocate on the hot path.

mod arena;
mod interner;
mod pool;

pub use arena::{Arena, ArenaError, ArenaRef};
pub use interner::StringInterner;
pub use pool::{ExhaustionPolicy, ObjectPool, PoolError, PoolStats, Poolable};

#[cfg(test)]
mod __tests__;
