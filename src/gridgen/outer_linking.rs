//! Outer linking: make every known link of an `OuterLinking` tile mutual.
//!
//! For each occupied slot `j` of an input tile `t`, the neighbor in that slot
//! receives `(neighbor, j + 3, t)` on its pending buffer unless it already
//! persists `t` there. Input tiles move on to `InnerLinking`; any buffer they
//! already hold is carried along untouched.

use tracing::debug;

use super::arena::TileStore;
use super::batch::group_by_key;
use super::commands::CommandBuffer;
use super::error::GridError;
use super::tile::{GenerationPhase, TileHandle, TileLink};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OuterLinkingReport {
    pub tiles: usize,
    pub links: usize,
    /// Distinct tiles that received links.
    pub targets: usize,
}

pub struct OuterLinkingPhase {
    pub parallel_threshold: usize,
}

impl OuterLinkingPhase {
    pub fn plan(
        &self,
        store: &TileStore,
        tiles: &[TileHandle],
    ) -> Result<(CommandBuffer, OuterLinkingReport), GridError> {
        let groups = group_by_key(
            tiles,
            self.parallel_threshold,
            |tile, out: &mut Vec<(TileHandle, TileLink)>| {
                for (dir, neighbor) in store.get(tile)?.linked() {
                    let reverse = dir.opposite();
                    if store.get(neighbor)?.neighbor(reverse) != Some(tile) {
                        out.push((neighbor, TileLink::new(neighbor, reverse, tile)));
                    }
                }
                Ok(())
            },
        )?;

        let mut commands = CommandBuffer::new();
        let mut report = OuterLinkingReport {
            tiles: tiles.len(),
            targets: groups.len(),
            ..OuterLinkingReport::default()
        };
        for &tile in tiles {
            commands.set_phase(tile, GenerationPhase::InnerLinking);
        }
        for (target, links) in groups {
            report.links += links.len();
            commands.append_links(target, links);
        }
        Ok((commands, report))
    }

    pub fn run(&self, store: &mut TileStore) -> Result<OuterLinkingReport, GridError> {
        let tiles = store.query(GenerationPhase::OuterLinking);
        if tiles.is_empty() {
            return Ok(OuterLinkingReport::default());
        }
        let (commands, report) = self.plan(store, &tiles)?;
        commands.apply(store)?;
        debug!(
            event = "outer_linking_applied",
            tiles = report.tiles,
            links = report.links,
            targets = report.targets
        );
        Ok(report)
    }
}
