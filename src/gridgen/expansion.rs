//! Expansion: grow new tiles into the empty slots of `Expansion` tiles.
//!
//! Every empty slot of an input tile is a request keyed by the candidate
//! position it points at. Requests that land on the same canonical position
//! are one group and produce exactly one tile, cloned from the lowest-handle
//! requester, with a back-link to every requester. A candidate that is
//! already occupied is merged instead: the existing tile and its requesters
//! exchange pending links.

use tracing::debug;

use super::arena::TileStore;
use super::batch::group_by_key;
use super::commands::CommandBuffer;
use super::error::GridError;
use super::offsets::NeighborOffsets;
use super::position::GridPosition;
use super::tile::{GenerationPhase, HexDirection, TileHandle, TileLink};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpansionReport {
    /// Input tiles consumed by the phase.
    pub expanded: usize,
    pub spawned: usize,
    /// Candidate positions resolved onto an existing tile.
    pub merged: usize,
}

pub struct ExpansionPhase<'a> {
    pub layout: &'a NeighborOffsets,
    pub parallel_threshold: usize,
}

impl ExpansionPhase<'_> {
    /// Build the command buffer for `tiles` against the current store.
    pub fn plan(
        &self,
        store: &TileStore,
        tiles: &[TileHandle],
        allow_spawn: bool,
    ) -> Result<(CommandBuffer, ExpansionReport), GridError> {
        let mut commands = CommandBuffer::new();
        let mut report = ExpansionReport {
            expanded: tiles.len(),
            ..ExpansionReport::default()
        };

        if !allow_spawn {
            for &tile in tiles {
                commands.set_phase(tile, GenerationPhase::Ready);
            }
            return Ok((commands, report));
        }

        let layout = self.layout;
        let requests = group_by_key(
            tiles,
            self.parallel_threshold,
            |tile, out: &mut Vec<(GridPosition, (TileHandle, HexDirection))>| {
                let record = store.get(tile)?;
                for dir in record.open_directions() {
                    out.push((layout.neighbor_position(record.position, dir), (tile, dir)));
                }
                Ok(())
            },
        )?;

        for &tile in tiles {
            commands.set_phase(tile, GenerationPhase::OuterLinking);
        }

        let mut merge_links: Vec<TileLink> = Vec::new();
        for (candidate, group) in requests {
            if let Some(existing) = store.handle_at(candidate) {
                let occupant = store.get(existing)?;
                for &(requester, dir) in &group {
                    let back = dir.opposite();
                    match occupant.neighbor(back) {
                        Some(held) if held == requester => {}
                        Some(held) => {
                            return Err(GridError::LinkConflict {
                                tile: existing,
                                direction: back,
                                existing: held,
                                proposed: requester,
                            });
                        }
                        None => merge_links.push(TileLink::new(existing, back, requester)),
                    }
                    merge_links.push(TileLink::new(requester, dir, existing));
                }
                report.merged += 1;
                continue;
            }

            let Some(&(template, _)) = group.first() else {
                continue;
            };
            let back_links = group
                .iter()
                .map(|&(requester, dir)| (dir.opposite(), requester))
                .collect();
            commands.spawn(template, candidate, back_links, GenerationPhase::OuterLinking);
            report.spawned += 1;
        }

        merge_links.sort_unstable();
        merge_links.dedup();
        for links in merge_links.chunk_by(|a, b| a.tile == b.tile) {
            commands.append_links(links[0].tile, links.to_vec());
        }

        Ok((commands, report))
    }

    /// Run the phase over every `Expansion` tile and apply the result.
    pub fn run(&self, store: &mut TileStore, allow_spawn: bool) -> Result<ExpansionReport, GridError> {
        let tiles = store.query(GenerationPhase::Expansion);
        if tiles.is_empty() {
            return Ok(ExpansionReport::default());
        }
        let (commands, report) = self.plan(store, &tiles, allow_spawn)?;
        store.reserve(report.spawned);
        commands.apply(store)?;
        debug!(
            event = "expansion_applied",
            expanded = report.expanded,
            spawned = report.spawned,
            merged = report.merged,
            allow_spawn
        );
        Ok(report)
    }
}
