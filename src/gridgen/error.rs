use thiserror::Error;

use super::position::GridPosition;
use super::tile::{HexDirection, TileHandle, TileLink};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("tile {0} is not present in the store")]
    StaleHandle(TileHandle),
    #[error("position {position} is already held by tile {existing}")]
    DuplicatePosition {
        position: GridPosition,
        existing: TileHandle,
    },
    #[error(
        "link conflict on tile {tile} slot {direction:?}: holds {existing}, proposed {proposed}"
    )]
    LinkConflict {
        tile: TileHandle,
        direction: HexDirection,
        existing: TileHandle,
        proposed: TileHandle,
    },
    #[error("link {link:?} was routed to the pending buffer of tile {tile}")]
    MisroutedLink { tile: TileHandle, link: TileLink },
    #[error("tile {tile} slot {direction:?} points at {neighbor} which does not point back")]
    AsymmetricLink {
        tile: TileHandle,
        direction: HexDirection,
        neighbor: TileHandle,
    },
    #[error(
        "inner linking did not converge after {iterations} iterations ({pending_tiles} tiles still pending)"
    )]
    NonConvergence {
        iterations: u32,
        pending_tiles: usize,
    },
    #[error("failed to build generator thread pool: {0}")]
    ThreadPool(String),
}
