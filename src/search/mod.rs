//! Local storage and nearest-neighbour search.

pub mod engine;
pub mod vector;

pub use engine::SearchEngine;
pub use vector::VectorIndex;
