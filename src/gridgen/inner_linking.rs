//! Inner linking: triangular completion iterated to a fixpoint.
//!
//! If a tile knows neighbors `left` at slot `d` and `right` at slot `d + 1`,
//! those two are adjacent to each other: `left[d + 2] = right` and
//! `right[d + 5] = left`. Each iteration takes the frontier (`InnerLinking`
//! tiles holding a pending buffer), derives the links its buffered updates
//! imply, commits the frontier's buffers and hands the derived links to their
//! targets, which form the next frontier.

use tracing::debug;

use super::apply::apply_links;
use super::arena::TileStore;
use super::batch::group_by_key;
use super::commands::CommandBuffer;
use super::error::GridError;
use super::tile::{GenerationPhase, HexDirection, TileHandle, TileLink};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InnerLinkingReport {
    /// Iterations that processed a non-empty frontier.
    pub iterations: u32,
    /// Derived links appended to pending buffers.
    pub derived: usize,
    pub committed_tiles: usize,
    pub committed_links: usize,
}

pub struct InnerLinkingPhase {
    pub max_iterations: u32,
    pub parallel_threshold: usize,
}

/// Whether `link` is already persisted or buffered on its target.
fn already_known(store: &TileStore, link: TileLink) -> Result<bool, GridError> {
    match store.get(link.tile)?.neighbor(link.direction) {
        Some(existing) if existing == link.neighbor => Ok(true),
        Some(existing) => Err(GridError::LinkConflict {
            tile: link.tile,
            direction: link.direction,
            existing,
            proposed: link.neighbor,
        }),
        None => Ok(store
            .pending(link.tile)?
            .is_some_and(|buffer| buffer.contains(&link))),
    }
}

/// Derive the triangle links implied by `tile`'s pending buffer.
fn derive_links(
    store: &TileStore,
    tile: TileHandle,
    out: &mut Vec<(TileHandle, TileLink)>,
) -> Result<(), GridError> {
    let buffer = store.pending(tile)?.unwrap_or_default();
    let mut slots = store.get(tile)?.neighbors;
    apply_links(&mut slots, buffer);

    // An update at slot `d` touches the pairs starting at `d - 1` and `d`.
    let mut touched = [false; HexDirection::COUNT];
    for link in buffer {
        let d = link.direction;
        touched[d.counter_clockwise().index()] = true;
        touched[d.index()] = true;
    }

    for dir in HexDirection::ALL {
        if !touched[dir.index()] {
            continue;
        }
        let (Some(left), Some(right)) = (slots[dir.index()], slots[dir.clockwise().index()]) else {
            continue;
        };
        if left == right {
            continue;
        }
        if store.phase(left)? != GenerationPhase::InnerLinking
            && store.phase(right)? != GenerationPhase::InnerLinking
        {
            continue;
        }
        for link in [
            TileLink::new(left, dir.rotate(2), right),
            TileLink::new(right, dir.rotate(5), left),
        ] {
            if !already_known(store, link)? {
                out.push((link.tile, link));
            }
        }
    }
    Ok(())
}

struct Iteration {
    commands: CommandBuffer,
    derived: usize,
    committed_links: usize,
}

impl InnerLinkingPhase {
    /// Split `InnerLinking` tiles into the frontier (holding a buffer) and
    /// idle tiles.
    fn partition(store: &TileStore) -> Result<(Vec<TileHandle>, Vec<TileHandle>), GridError> {
        let mut frontier = Vec::new();
        let mut idle = Vec::new();
        for tile in store.query(GenerationPhase::InnerLinking) {
            if store.has_pending(tile)? {
                frontier.push(tile);
            } else {
                idle.push(tile);
            }
        }
        Ok((frontier, idle))
    }

    fn plan(
        &self,
        store: &TileStore,
        frontier: &[TileHandle],
        idle: &[TileHandle],
    ) -> Result<Iteration, GridError> {
        let groups = group_by_key(
            frontier,
            self.parallel_threshold,
            |tile, out: &mut Vec<(TileHandle, TileLink)>| derive_links(store, tile, out),
        )?;

        let mut commands = CommandBuffer::new();
        let mut committed_links = 0;
        for &tile in frontier {
            committed_links += store.pending(tile)?.map_or(0, <[_]>::len);
            commands.commit_links(tile);
        }
        for &tile in frontier.iter().chain(idle) {
            commands.set_phase(tile, GenerationPhase::Ready);
        }
        let mut derived = 0;
        for (target, links) in groups {
            derived += links.len();
            commands.append_links(target, links);
        }
        Ok(Iteration {
            commands,
            derived,
            committed_links,
        })
    }

    /// Iterate until no tile is left in the frontier.
    ///
    /// After `max_iterations` processed iterations with work still pending,
    /// returns `GridError::NonConvergence` and leaves the remaining buffers
    /// uncommitted.
    pub fn run(&self, store: &mut TileStore) -> Result<InnerLinkingReport, GridError> {
        let mut report = InnerLinkingReport::default();
        loop {
            let (frontier, idle) = Self::partition(store)?;
            if frontier.is_empty() {
                let mut commands = CommandBuffer::new();
                for &tile in &idle {
                    commands.set_phase(tile, GenerationPhase::Ready);
                }
                commands.apply(store)?;
                break;
            }
            if report.iterations >= self.max_iterations {
                return Err(GridError::NonConvergence {
                    iterations: report.iterations,
                    pending_tiles: frontier.len(),
                });
            }

            let iteration = self.plan(store, &frontier, &idle)?;
            iteration.commands.apply(store)?;
            report.iterations += 1;
            report.derived += iteration.derived;
            report.committed_tiles += frontier.len();
            report.committed_links += iteration.committed_links;
            debug!(
                event = "inner_linking_iteration",
                iteration = report.iterations,
                frontier = frontier.len(),
                idle = idle.len(),
                derived = iteration.derived
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::InnerLinkingPhase;
    use crate::gridgen::arena::TileStore;
    use crate::gridgen::error::GridError;
    use crate::gridgen::expansion::ExpansionPhase;
    use crate::gridgen::offsets::NeighborOffsets;
    use crate::gridgen::outer_linking::OuterLinkingPhase;
    use crate::gridgen::position::GridPosition;
    use crate::gridgen::tile::{
        GenerationPhase, HexDirection, TileHandle, TileLink, TileRecord, TileState,
    };

    fn ring(layout: &NeighborOffsets) -> (TileStore, TileHandle) {
        let mut store = TileStore::new();
        let seed = store
            .insert(
                TileRecord::new(GridPosition::ORIGIN, TileState::empty()),
                GenerationPhase::Expansion,
            )
            .unwrap();
        ExpansionPhase {
            layout,
            parallel_threshold: 256,
        }
        .run(&mut store, true)
        .unwrap();
        OuterLinkingPhase {
            parallel_threshold: 256,
        }
        .run(&mut store)
        .unwrap();
        (store, seed)
    }

    #[test]
    fn ring_closes_in_two_iterations() {
        let layout = NeighborOffsets::default();
        let (mut store, seed) = ring(&layout);
        let report = InnerLinkingPhase {
            max_iterations: 64,
            parallel_threshold: 256,
        }
        .run(&mut store)
        .unwrap();

        assert_eq!(report.iterations, 2);
        assert_eq!(report.derived, 12);
        assert_eq!(store.count(GenerationPhase::Ready), 7);
        assert!(store.pending_tiles().is_empty());
        assert!(store.get(seed).unwrap().is_fully_linked());
        store.check_symmetry().unwrap();

        let at = |dir: HexDirection| {
            store
                .handle_at(layout.neighbor_position(GridPosition::ORIGIN, dir))
                .unwrap()
        };
        for dir in HexDirection::ALL {
            let record = store.get(at(dir)).unwrap();
            assert_eq!(record.link_count(), 3);
            assert_eq!(record.neighbor(dir.rotate(2)), Some(at(dir.clockwise())));
            assert_eq!(record.neighbor(dir.rotate(4)), Some(at(dir.counter_clockwise())));
        }
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let layout = NeighborOffsets::default();
        let (mut store, _) = ring(&layout);
        let err = InnerLinkingPhase {
            max_iterations: 1,
            parallel_threshold: 256,
        }
        .run(&mut store)
        .unwrap_err();
        assert_eq!(
            err,
            GridError::NonConvergence {
                iterations: 1,
                pending_tiles: 6,
            }
        );
        assert_eq!(store.pending_tiles().len(), 6);
    }

    #[test]
    fn idle_tiles_settle_without_iterating() {
        let mut store = TileStore::new();
        let a = store
            .insert(
                TileRecord::new(GridPosition::ORIGIN, TileState::empty()),
                GenerationPhase::InnerLinking,
            )
            .unwrap();
        let report = InnerLinkingPhase {
            max_iterations: 0,
            parallel_threshold: 256,
        }
        .run(&mut store)
        .unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(store.phase(a).unwrap(), GenerationPhase::Ready);
    }

    #[test]
    fn contradicting_slot_is_a_conflict() {
        let layout = NeighborOffsets::default();
        let mut store = TileStore::new();
        let place = |store: &mut TileStore, dir: Option<HexDirection>, phase| {
            let pos = dir.map_or(GridPosition::ORIGIN, |d| {
                layout.neighbor_position(GridPosition::ORIGIN, d)
            });
            store
                .insert(TileRecord::new(pos, TileState::empty()), phase)
                .unwrap()
        };
        let hub = place(&mut store, None, GenerationPhase::InnerLinking);
        let top = place(&mut store, Some(HexDirection::Top), GenerationPhase::InnerLinking);
        let top_right = place(&mut store, Some(HexDirection::TopRight), GenerationPhase::Ready);
        let stray = place(&mut store, Some(HexDirection::Bottom), GenerationPhase::Ready);

        // `top`'s BottomRight slot should hold `top_right`, not `stray`.
        store.record_mut(top).unwrap().neighbors[HexDirection::BottomRight.index()] = Some(stray);
        store.record_mut(hub).unwrap().neighbors[HexDirection::Top.index()] = Some(top);
        store
            .append_pending(hub, [TileLink::new(hub, HexDirection::TopRight, top_right)])
            .unwrap();

        let err = InnerLinkingPhase {
            max_iterations: 8,
            parallel_threshold: 256,
        }
        .run(&mut store)
        .unwrap_err();
        assert_eq!(
            err,
            GridError::LinkConflict {
                tile: top,
                direction: HexDirection::BottomRight,
                existing: stray,
                proposed: top_right,
            }
        );
    }
}
