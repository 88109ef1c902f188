//! Tile data structures and helpers for hex grid generation.
//!
//! A tile owns a canonical position, a small set of gameplay flags and a
//! 6-slot neighbor buffer indexed by `HexDirection`. Generation state (phase
//! tag and pending link buffer) lives on the arena next to the record.

use std::fmt;

use super::position::GridPosition;

/// Generational handle into a `TileStore`.
///
/// A handle stays valid until its tile is released; reusing the slot bumps the
/// generation so stale handles are rejected instead of aliasing a new tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileHandle {
    index: u32,
    generation: u32,
}

impl TileHandle {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// The six hex directions, clockwise from `Top`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum HexDirection {
    Top = 0,
    TopRight = 1,
    BottomRight = 2,
    Bottom = 3,
    BottomLeft = 4,
    TopLeft = 5,
}

impl HexDirection {
    pub const COUNT: usize = 6;

    pub const ALL: [HexDirection; 6] = [
        HexDirection::Top,
        HexDirection::TopRight,
        HexDirection::BottomRight,
        HexDirection::Bottom,
        HexDirection::BottomLeft,
        HexDirection::TopLeft,
    ];

    /// Direction for a slot index, wrapping modulo 6.
    #[inline]
    pub const fn from_index(i: usize) -> HexDirection {
        Self::ALL[i % Self::COUNT]
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Rotate clockwise by `steps` slots.
    #[inline]
    pub const fn rotate(self, steps: usize) -> HexDirection {
        Self::from_index(self.index() + steps)
    }

    /// The reverse direction (for bidirectional linking).
    #[inline]
    pub const fn opposite(self) -> HexDirection {
        self.rotate(3)
    }

    #[inline]
    pub const fn clockwise(self) -> HexDirection {
        self.rotate(1)
    }

    #[inline]
    pub const fn counter_clockwise(self) -> HexDirection {
        self.rotate(5)
    }
}

/// Neighbor slots of a tile. Indexed by `HexDirection`.
pub type Neighbors = [Option<TileHandle>; HexDirection::COUNT];

/// An empty neighbor array.
pub const EMPTY_NEIGHBORS: Neighbors = [None; HexDirection::COUNT];

/// Gameplay flags carried by a tile. Generation clones them from the template
/// tile and otherwise ignores them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TileState(u8);

impl TileState {
    pub const WALKABLE: TileState = TileState(1 << 0);
    pub const BURNING: TileState = TileState(1 << 1);

    #[inline]
    pub const fn empty() -> Self {
        TileState(0)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: TileState) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: TileState) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: TileState) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn set(&mut self, other: TileState, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl std::ops::BitOr for TileState {
    type Output = TileState;

    fn bitor(self, rhs: TileState) -> TileState {
        TileState(self.0 | rhs.0)
    }
}

/// Per-tile persisted data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileRecord {
    pub position: GridPosition,
    pub state: TileState,
    pub neighbors: Neighbors,
}

impl TileRecord {
    pub fn new(position: GridPosition, state: TileState) -> Self {
        Self {
            position,
            state,
            neighbors: EMPTY_NEIGHBORS,
        }
    }

    #[inline]
    pub fn neighbor(&self, dir: HexDirection) -> Option<TileHandle> {
        self.neighbors[dir.index()]
    }

    /// Directions whose slot is still empty.
    pub fn open_directions(&self) -> impl Iterator<Item = HexDirection> + '_ {
        HexDirection::ALL
            .into_iter()
            .filter(|dir| self.neighbors[dir.index()].is_none())
    }

    /// Occupied slots as `(direction, neighbor)` pairs.
    pub fn linked(&self) -> impl Iterator<Item = (HexDirection, TileHandle)> + '_ {
        HexDirection::ALL
            .into_iter()
            .filter_map(|dir| self.neighbors[dir.index()].map(|n| (dir, n)))
    }

    #[inline]
    pub fn is_fully_linked(&self) -> bool {
        self.neighbors.iter().all(Option::is_some)
    }

    #[inline]
    pub fn link_count(&self) -> usize {
        self.neighbors.iter().filter(|n| n.is_some()).count()
    }
}

/// Per-tile generation tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GenerationPhase {
    Expansion,
    OuterLinking,
    InnerLinking,
    Ready,
}

impl GenerationPhase {
    pub const ALL: [GenerationPhase; 4] = [
        GenerationPhase::Expansion,
        GenerationPhase::OuterLinking,
        GenerationPhase::InnerLinking,
        GenerationPhase::Ready,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// "`tile`'s slot `direction` should point at `neighbor`."
///
/// Produced in bulk by the phases, buffered on `tile`, and committed by the
/// link applier. Never stored in `TileRecord::neighbors` directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileLink {
    pub tile: TileHandle,
    pub direction: HexDirection,
    pub neighbor: TileHandle,
}

impl TileLink {
    #[inline]
    pub const fn new(tile: TileHandle, direction: HexDirection, neighbor: TileHandle) -> Self {
        Self {
            tile,
            direction,
            neighbor,
        }
    }

    /// The link seen from the other side.
    #[inline]
    pub const fn reversed(self) -> TileLink {
        TileLink {
            tile: self.neighbor,
            direction: self.direction.opposite(),
            neighbor: self.tile,
        }
    }
}
