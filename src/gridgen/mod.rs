//! Incremental hex grid generation and linking.

mod apply;
mod arena;
mod batch;
mod commands;
mod engine;
mod error;
mod expansion;
mod inner_linking;
mod offsets;
mod outer_linking;
mod position;
mod tile;
mod tilemap;

pub use apply::{LinkApplier, apply_links};
pub use arena::TileStore;
pub use commands::{Command, CommandBuffer};
pub use engine::{
    DEFAULT_MAX_LINK_ITERATIONS, DEFAULT_PARALLEL_THRESHOLD, GeneratorConfig, HexGridGenerator,
    THREADS_ENV, TickReport,
};
pub use error::GridError;
pub use expansion::{ExpansionPhase, ExpansionReport};
pub use inner_linking::{InnerLinkingPhase, InnerLinkingReport};
pub use offsets::{DEFAULT_STEP_DISTANCE, NeighborOffsets};
pub use outer_linking::{OuterLinkingPhase, OuterLinkingReport};
pub use position::{GridPosition, PRECISION_DIGITS};
pub use tile::{
    EMPTY_NEIGHBORS, GenerationPhase, HexDirection, Neighbors, TileHandle, TileLink, TileRecord,
    TileState,
};
