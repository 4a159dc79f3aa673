#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative spatial and entity state for the rat game simulation.
//!
//! [`ContextualMap`] answers "who stands where" and keeps the entity-to-tile
//! and tile-to-entity views consistent. [`EntityRegistry`] owns the list of
//! live entities and leases one traversal cursor per tick. Both are shared
//! between threads behind an `Arc` and mutate only through their own methods.

mod entity;
mod map;
mod node;
mod registry;
mod snapshot;

pub use entity::{Entity, EntityHandle};
pub use map::ContextualMap;
pub use node::OccupancyNode;
pub use registry::{Cursor, EntityRegistry, Lease};
pub use snapshot::{EntityRecord, OccupancySnapshot};
