//! Immutable collections with structural sharing.
//!
//! Every "modifying" operation returns a new collection that shares all
//! untouched nodes with the original. The original keeps reading back
//! exactly as before.

mod map;
mod vector;

pub use map::{MapIter, PersistentMap};
pub use vector::{PersistentVector, VectorIter};
