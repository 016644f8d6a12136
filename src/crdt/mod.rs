//! The merge capability consumed by the relay.
//!
//! The relay never looks inside update frames. It only asks the engine to
//! create a state handle, fold frames into it, and encode it back to a
//! snapshot. Any CRDT whose merge is commutative and idempotent can be
//! plugged in here without touching the gateway, registry or relay.

pub mod loro_engine;

#[cfg(test)]
pub(crate) mod testing;

pub use loro_engine::LoroEngine;

use crate::ws::error::CrdtError;

/// A live, mutable CRDT replica owned by exactly one room.
pub trait DocState: Send {
    fn apply(&mut self, update: &[u8]) -> Result<(), CrdtError>;

    /// Full snapshot, sufficient to rebuild the state from scratch.
    fn full_state(&self) -> Result<Vec<u8>, CrdtError>;
}

pub trait DocEngine: Send + Sync {
    /// Builds a replica, seeded from a persisted snapshot when there is one.
    fn create(&self, snapshot: Option<&[u8]>) -> Result<Box<dyn DocState>, CrdtError>;
}
