//! Incremental hexagonal grid generation with batched neighbor linking.

pub mod gridgen;
pub use gridgen::{GeneratorConfig, GridError, GridPosition, HexGridGenerator, TileStore};
