//! An assortment of non-growing containers.
//!
//! All of these containers are sized once, when the stack is set up, and afterwards only recycle
//! their entries. Links between entries are indices into an arena instead of pointers, so that
//! the arena itself can remain a plain slice owned by a single structure.
mod index_list;
pub mod pool;

pub use self::index_list::{IndexList, Link, Iter as IndexIter};
pub use self::pool::{BlockPool, Handle, MemoryPool};
