//! Deferred write-back for the generation phases.
//!
//! Phases read the store and record their intended mutations here. At the
//! barrier the buffer is validated as a whole (every handle live, every
//! appended link owned by the tile it is appended to, no spawn landing on an
//! occupied position) and only then applied in order, so a rejected buffer
//! leaves the store untouched.

use rustc_hash::FxHashSet;

use super::apply::LinkApplier;
use super::arena::TileStore;
use super::error::GridError;
use super::position::GridPosition;
use super::tile::{GenerationPhase, HexDirection, TileHandle, TileLink};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create a tile at `position` with `template`'s state and the given
    /// initial neighbor slots.
    Spawn {
        template: TileHandle,
        position: GridPosition,
        neighbors: Vec<(HexDirection, TileHandle)>,
        phase: GenerationPhase,
    },
    SetPhase {
        tile: TileHandle,
        phase: GenerationPhase,
    },
    /// Append to `tile`'s pending buffer. A `Ready` tile is rescheduled into
    /// `InnerLinking`.
    AppendLinks {
        tile: TileHandle,
        links: Vec<TileLink>,
    },
    /// Commit `tile`'s pending buffer into its neighbor slots.
    CommitLinks { tile: TileHandle },
}

#[derive(Clone, Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn spawn(
        &mut self,
        template: TileHandle,
        position: GridPosition,
        neighbors: Vec<(HexDirection, TileHandle)>,
        phase: GenerationPhase,
    ) {
        self.commands.push(Command::Spawn {
            template,
            position,
            neighbors,
            phase,
        });
    }

    pub fn set_phase(&mut self, tile: TileHandle, phase: GenerationPhase) {
        self.commands.push(Command::SetPhase { tile, phase });
    }

    pub fn append_links(&mut self, tile: TileHandle, links: Vec<TileLink>) {
        if links.is_empty() {
            return;
        }
        self.commands.push(Command::AppendLinks { tile, links });
    }

    pub fn commit_links(&mut self, tile: TileHandle) {
        self.commands.push(Command::CommitLinks { tile });
    }

    fn validate(&self, store: &TileStore) -> Result<(), GridError> {
        let live = |handle: TileHandle| {
            if store.contains(handle) {
                Ok(())
            } else {
                Err(GridError::StaleHandle(handle))
            }
        };

        let mut spawned: FxHashSet<GridPosition> = FxHashSet::default();
        for command in &self.commands {
            match command {
                Command::Spawn {
                    template,
                    position,
                    neighbors,
                    ..
                } => {
                    live(*template)?;
                    for &(_, neighbor) in neighbors {
                        live(neighbor)?;
                    }
                    if let Some(existing) = store.handle_at(*position) {
                        return Err(GridError::DuplicatePosition {
                            position: *position,
                            existing,
                        });
                    }
                    if !spawned.insert(*position) {
                        return Err(GridError::DuplicatePosition {
                            position: *position,
                            existing: *template,
                        });
                    }
                }
                Command::SetPhase { tile, .. } | Command::CommitLinks { tile } => live(*tile)?,
                Command::AppendLinks { tile, links } => {
                    live(*tile)?;
                    for &link in links {
                        if link.tile != *tile {
                            return Err(GridError::MisroutedLink { tile: *tile, link });
                        }
                        live(link.neighbor)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate, then apply every command in order. Returns the handles of
    /// spawned tiles in command order.
    pub fn apply(self, store: &mut TileStore) -> Result<Vec<TileHandle>, GridError> {
        self.validate(store)?;

        let mut spawned = Vec::new();
        for command in self.commands {
            match command {
                Command::Spawn {
                    template,
                    position,
                    neighbors,
                    phase,
                } => {
                    let handle = store.create(template, position, phase)?;
                    let record = store.record_mut(handle)?;
                    for (dir, neighbor) in neighbors {
                        record.neighbors[dir.index()] = Some(neighbor);
                    }
                    spawned.push(handle);
                }
                Command::SetPhase { tile, phase } => store.tag(tile, phase)?,
                Command::AppendLinks { tile, links } => {
                    store.append_pending(tile, links)?;
                    if store.phase(tile)? == GenerationPhase::Ready {
                        store.tag(tile, GenerationPhase::InnerLinking)?;
                    }
                }
                Command::CommitLinks { tile } => {
                    LinkApplier::commit(store, tile)?;
                }
            }
        }
        Ok(spawned)
    }
}
