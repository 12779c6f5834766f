//! Wire bundle and thread resolution.
//!
//! This module groups individually drawn wire segments into electrically
//! equivalent bundles, and the lanes of those bundles into threads that may
//! span several bundles through splitters.
//!
//! ## Terms
//!
//! - A **bundle** is a maximal set of points connected by wire segments with
//!   no component in between. Every point belongs to exactly one bundle.
//! - A **thread** is one lane's equivalence class across bundles joined by
//!   splitters. Logic components never join threads.
//!
//! The resolver is lazy: edits only mark state dirty, and the layout is
//! recomputed the next time it is queried.

mod disjoint;
mod resolver;

pub use disjoint::DisjointSet;
pub use resolver::{
    Bundle, BundleId, BundleWidth, SplitEnd, SplitterSpec, ThreadId, WireBundleResolver,
    WireLayout,
};
