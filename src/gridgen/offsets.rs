//! Offset table for the six hex directions.
//!
//! Tiles lie on the XZ plane. `Top` points towards -Z and directions proceed
//! clockwise when viewed from +Y. The table is built from fixed-point units so
//! that opposite offsets cancel exactly and two adjacent offsets always sum to
//! the one between them (`Top + BottomRight == TopRight`).

use super::position::GridPosition;
use super::tile::HexDirection;

/// Half the center-to-center spacing of the stock hex tile.
pub const DEFAULT_STEP_DISTANCE: f64 = 1.05;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborOffsets {
    offsets: [GridPosition; HexDirection::COUNT],
    step: GridPosition,
}

impl Default for NeighborOffsets {
    fn default() -> Self {
        Self::from_step_distance(DEFAULT_STEP_DISTANCE)
    }
}

impl NeighborOffsets {
    /// Build the table for tiles whose centers are `2 * step` apart.
    pub fn from_step_distance(step: f64) -> Self {
        let step_units = GridPosition::new(step, 0.0, 0.0).units().0;
        let width_units = GridPosition::new(step * 3f64.sqrt(), 0.0, 0.0).units().0;

        let offsets = [
            GridPosition::from_units(0, 0, -2 * step_units),
            GridPosition::from_units(-width_units, 0, -step_units),
            GridPosition::from_units(-width_units, 0, step_units),
            GridPosition::from_units(0, 0, 2 * step_units),
            GridPosition::from_units(width_units, 0, step_units),
            GridPosition::from_units(width_units, 0, -step_units),
        ];

        Self {
            offsets,
            step: GridPosition::from_units(step_units, 0, 0),
        }
    }

    #[inline]
    pub fn offset(&self, dir: HexDirection) -> GridPosition {
        self.offsets[dir.index()]
    }

    /// Position of the neighbor of `position` in direction `dir`.
    #[inline]
    pub fn neighbor_position(&self, position: GridPosition, dir: HexDirection) -> GridPosition {
        position + self.offsets[dir.index()]
    }

    pub fn step_distance(&self) -> f64 {
        self.step.x()
    }

    /// Direction whose offset takes `from` to `to`, if they are adjacent.
    pub fn direction_between(&self, from: GridPosition, to: GridPosition) -> Option<HexDirection> {
        let delta = to - from;
        HexDirection::ALL
            .into_iter()
            .find(|dir| self.offsets[dir.index()] == delta)
    }
}
