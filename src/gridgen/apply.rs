//! Commit pending links into persisted neighbor slots.

use tracing::trace;

use super::arena::TileStore;
use super::error::GridError;
use super::tile::{GenerationPhase, Neighbors, TileHandle, TileLink};

/// Write each link into its slot. Later links for the same slot win, and
/// applying the same links twice is a no-op.
#[inline]
pub fn apply_links(neighbors: &mut Neighbors, links: &[TileLink]) {
    for link in links {
        neighbors[link.direction.index()] = Some(link.neighbor);
    }
}

pub struct LinkApplier;

impl LinkApplier {
    /// Move `tile`'s pending buffer into its neighbor slots. Returns the
    /// number of links committed, zero when the tile had no buffer.
    pub fn commit(store: &mut TileStore, tile: TileHandle) -> Result<usize, GridError> {
        let Some(links) = store.take_pending(tile)? else {
            return Ok(0);
        };
        let record = store.record_mut(tile)?;
        apply_links(&mut record.neighbors, &links);
        trace!(
            event = "links_committed",
            tile = %tile,
            count = links.len()
        );
        Ok(links.len())
    }

    /// Commit leftover buffers held by `Ready` tiles. Returns how many tiles
    /// were swept.
    pub fn sweep(store: &mut TileStore) -> Result<usize, GridError> {
        let mut swept = 0;
        for tile in store.pending_tiles() {
            if store.phase(tile)? != GenerationPhase::Ready {
                continue;
            }
            Self::commit(store, tile)?;
            swept += 1;
        }
        Ok(swept)
    }
}
