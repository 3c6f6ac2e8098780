//! Drawable execution graphs.
//!
//! A `Graph` is a table of `Node`s keyed by id plus an ordered list of
//! `Edge`s. Graphs built independently (one per runnable) are folded into
//! a parent with [`Graph::extend`], which renames human-readable ids under a
//! prefix so that merging the same template twice never collides.

pub mod graph;
pub mod merge;
pub mod render;

pub use graph::{is_uuid, Edge, Graph, Node};
pub use merge::MergeStrategy;
