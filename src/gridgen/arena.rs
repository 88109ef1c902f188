//! Tile arena for hex grid generation.
//!
//! Tiles live in a slot vector addressed by generational `TileHandle`s.
//! Released slots go on a free list and come back with a bumped generation,
//! so a handle held across a release is reported as stale instead of
//! silently aliasing the new occupant. Positions are unique: the
//! `PositionIndex` rejects a second tile at a canonical position.
//!
//! Each live tile also carries its generation phase tag and, while linking is
//! in flight, a pending link buffer.

use super::error::GridError;
use super::position::GridPosition;
use super::tile::{EMPTY_NEIGHBORS, GenerationPhase, TileHandle, TileLink, TileRecord};
use super::tilemap::PositionIndex;

const INITIAL_TILE_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
struct TileEntry {
    record: TileRecord,
    phase: GenerationPhase,
    pending: Option<Vec<TileLink>>,
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    entry: Option<TileEntry>,
}

pub struct TileStore {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    by_position: PositionIndex,
    len: usize,
    phase_counts: [usize; 4],
}

impl Default for TileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TileStore {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_TILE_CAPACITY)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            slots: Vec::with_capacity(cap),
            free_list: Vec::new(),
            by_position: PositionIndex::with_capacity(cap),
            len: 0,
            phase_counts: [0; 4],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional.saturating_sub(self.free_list.len()));
        self.by_position.reserve(additional);
    }

    #[inline]
    fn entry(&self, handle: TileHandle) -> Result<&TileEntry, GridError> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(GridError::StaleHandle(handle))
    }

    #[inline]
    fn entry_mut(&mut self, handle: TileHandle) -> Result<&mut TileEntry, GridError> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(GridError::StaleHandle(handle))
    }

    #[inline]
    pub fn contains(&self, handle: TileHandle) -> bool {
        self.entry(handle).is_ok()
    }

    #[inline]
    pub fn get(&self, handle: TileHandle) -> Result<&TileRecord, GridError> {
        self.entry(handle).map(|entry| &entry.record)
    }

    #[inline]
    pub(crate) fn record_mut(&mut self, handle: TileHandle) -> Result<&mut TileRecord, GridError> {
        self.entry_mut(handle).map(|entry| &mut entry.record)
    }

    #[inline]
    pub fn phase(&self, handle: TileHandle) -> Result<GenerationPhase, GridError> {
        self.entry(handle).map(|entry| entry.phase)
    }

    #[inline]
    pub fn handle_at(&self, position: GridPosition) -> Option<TileHandle> {
        self.by_position.get(position)
    }

    #[inline]
    pub fn is_occupied(&self, position: GridPosition) -> bool {
        self.by_position.contains(position)
    }

    fn allocate_slot(&mut self, entry: TileEntry) -> TileHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.entry.is_none());
            slot.entry = Some(entry);
            TileHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            TileHandle::new(index, 0)
        }
    }

    /// Insert a tile at a position no other tile holds.
    pub fn insert(
        &mut self,
        record: TileRecord,
        phase: GenerationPhase,
    ) -> Result<TileHandle, GridError> {
        if let Some(existing) = self.by_position.get(record.position) {
            return Err(GridError::DuplicatePosition {
                position: record.position,
                existing,
            });
        }
        let position = record.position;
        let handle = self.allocate_slot(TileEntry {
            record,
            phase,
            pending: None,
        });
        self.by_position.insert(position, handle);
        self.phase_counts[phase.index()] += 1;
        self.len += 1;
        Ok(handle)
    }

    /// Clone `template`'s state into a fresh, unlinked tile at `position`.
    pub fn create(
        &mut self,
        template: TileHandle,
        position: GridPosition,
        phase: GenerationPhase,
    ) -> Result<TileHandle, GridError> {
        let state = self.get(template)?.state;
        self.insert(TileRecord::new(position, state), phase)
    }

    /// Overwrite a tile's record. Moving a tile keeps the position index in
    /// sync and fails if the target position is taken.
    pub fn set(&mut self, handle: TileHandle, record: TileRecord) -> Result<(), GridError> {
        let old_position = self.get(handle)?.position;
        if old_position != record.position {
            if let Some(existing) = self.by_position.get(record.position) {
                return Err(GridError::DuplicatePosition {
                    position: record.position,
                    existing,
                });
            }
            self.by_position.remove(old_position);
            self.by_position.insert(record.position, handle);
        }
        self.entry_mut(handle)?.record = record;
        Ok(())
    }

    pub fn tag(&mut self, handle: TileHandle, phase: GenerationPhase) -> Result<(), GridError> {
        let entry = self.entry_mut(handle)?;
        let old = std::mem::replace(&mut entry.phase, phase);
        self.phase_counts[old.index()] -= 1;
        self.phase_counts[phase.index()] += 1;
        Ok(())
    }

    #[inline]
    pub fn count(&self, phase: GenerationPhase) -> usize {
        self.phase_counts[phase.index()]
    }

    /// All tiles tagged `phase`, in slot order.
    pub fn query(&self, phase: GenerationPhase) -> Vec<TileHandle> {
        if self.phase_counts[phase.index()] == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(self.phase_counts[phase.index()]);
        out.extend(
            self.iter_entries()
                .filter(|(_, entry)| entry.phase == phase)
                .map(|(handle, _)| handle),
        );
        out
    }

    // ── Pending link buffers ────────────────────────────────────────────

    pub fn pending(&self, handle: TileHandle) -> Result<Option<&[TileLink]>, GridError> {
        self.entry(handle).map(|entry| entry.pending.as_deref())
    }

    #[inline]
    pub fn has_pending(&self, handle: TileHandle) -> Result<bool, GridError> {
        self.entry(handle).map(|entry| entry.pending.is_some())
    }

    /// Append to a tile's pending buffer, creating the buffer if needed.
    /// Every link must be owned by `handle`; otherwise nothing is appended.
    pub fn append_pending<I>(&mut self, handle: TileHandle, links: I) -> Result<(), GridError>
    where
        I: IntoIterator<Item = TileLink>,
    {
        self.entry(handle)?;
        let links: Vec<TileLink> = links.into_iter().collect();
        if let Some(&link) = links.iter().find(|link| link.tile != handle) {
            return Err(GridError::MisroutedLink { tile: handle, link });
        }
        self.entry_mut(handle)?
            .pending
            .get_or_insert_with(Vec::new)
            .extend(links);
        Ok(())
    }

    pub fn take_pending(&mut self, handle: TileHandle) -> Result<Option<Vec<TileLink>>, GridError> {
        self.entry_mut(handle).map(|entry| entry.pending.take())
    }

    /// Tiles currently holding a pending buffer, in slot order.
    pub fn pending_tiles(&self) -> Vec<TileHandle> {
        self.iter_entries()
            .filter(|(_, entry)| entry.pending.is_some())
            .map(|(handle, _)| handle)
            .collect()
    }

    // ── Release ─────────────────────────────────────────────────────────

    /// Remove a tile, clearing the reverse slot on each of its neighbors and
    /// dropping buffered links that point at it.
    pub fn release(&mut self, handle: TileHandle) -> Result<TileRecord, GridError> {
        self.entry(handle)?;
        let slot = &mut self.slots[handle.index()];
        let entry = slot.entry.take().ok_or(GridError::StaleHandle(handle))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index() as u32);
        self.phase_counts[entry.phase.index()] -= 1;
        self.len -= 1;
        self.by_position.remove(entry.record.position);

        for (dir, neighbor) in entry.record.linked() {
            if let Ok(record) = self.record_mut(neighbor) {
                let reverse = &mut record.neighbors[dir.opposite().index()];
                if *reverse == Some(handle) {
                    *reverse = None;
                }
            }
        }
        for entry in self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            if let Some(buffer) = entry.pending.as_mut() {
                buffer.retain(|link| link.neighbor != handle);
                if buffer.is_empty() {
                    entry.pending = None;
                }
            }
        }

        let mut record = entry.record;
        record.neighbors = EMPTY_NEIGHBORS;
        Ok(record)
    }

    // ── Iteration ───────────────────────────────────────────────────────

    fn iter_entries(&self) -> impl Iterator<Item = (TileHandle, &TileEntry)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.entry
                .as_ref()
                .map(|entry| (TileHandle::new(i as u32, slot.generation), entry))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileHandle, &TileRecord)> + '_ {
        self.iter_entries().map(|(handle, entry)| (handle, &entry.record))
    }

    pub fn handles(&self) -> Vec<TileHandle> {
        self.iter_entries().map(|(handle, _)| handle).collect()
    }

    // ── Invariants ──────────────────────────────────────────────────────

    /// Every live tile owns its position in the index and no two tiles share
    /// one.
    pub fn check_unique_positions(&self) -> Result<(), GridError> {
        for (handle, record) in self.iter() {
            match self.by_position.get(record.position) {
                Some(owner) if owner == handle => {}
                Some(owner) => {
                    return Err(GridError::DuplicatePosition {
                        position: record.position,
                        existing: owner,
                    });
                }
                None => return Err(GridError::StaleHandle(handle)),
            }
        }
        if self.by_position.is_empty() != self.is_empty() || self.by_position.len() != self.len {
            let (position, existing) = self
                .by_position
                .iter()
                .find(|&(_, owner)| !self.contains(owner))
                .unwrap_or((GridPosition::ORIGIN, TileHandle::new(u32::MAX, 0)));
            return Err(GridError::DuplicatePosition { position, existing });
        }
        Ok(())
    }

    /// `t.neighbors[d] == Some(n)` implies `n.neighbors[d.opposite()] == Some(t)`.
    pub fn check_symmetry(&self) -> Result<(), GridError> {
        for (handle, record) in self.iter() {
            for (dir, neighbor) in record.linked() {
                let back = self.get(neighbor)?.neighbor(dir.opposite());
                if back != Some(handle) {
                    return Err(GridError::AsymmetricLink {
                        tile: handle,
                        direction: dir,
                        neighbor,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::TileStore;
    use crate::gridgen::error::GridError;
    use crate::gridgen::position::GridPosition;
    use crate::gridgen::tile::{
        GenerationPhase, HexDirection, TileLink, TileRecord, TileState,
    };

    fn at(x: f64, z: f64) -> TileRecord {
        TileRecord::new(GridPosition::new(x, 0.0, z), TileState::WALKABLE)
    }

    #[test]
    fn insert_rejects_duplicate_position() {
        let mut store = TileStore::new();
        let first = store.insert(at(1.0, 2.0), GenerationPhase::Ready).unwrap();
        let err = store
            .insert(at(1.000_000_1, 2.0), GenerationPhase::Ready)
            .unwrap_err();
        assert_eq!(
            err,
            GridError::DuplicatePosition {
                position: GridPosition::new(1.0, 0.0, 2.0),
                existing: first,
            }
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn release_bumps_generation_and_rejects_stale_handle() {
        let mut store = TileStore::new();
        let a = store.insert(at(0.0, 0.0), GenerationPhase::Ready).unwrap();
        store.release(a).unwrap();
        assert_eq!(store.get(a).unwrap_err(), GridError::StaleHandle(a));

        let b = store.insert(at(5.0, 0.0), GenerationPhase::Ready).unwrap();
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert!(store.get(a).is_err());
        assert!(store.handle_at(GridPosition::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn release_clears_reverse_slots_and_pending_links() {
        let mut store = TileStore::new();
        let a = store.insert(at(0.0, 0.0), GenerationPhase::Ready).unwrap();
        let b = store.insert(at(0.0, -2.1), GenerationPhase::Ready).unwrap();
        let c = store.insert(at(0.0, 2.1), GenerationPhase::Ready).unwrap();
        store.record_mut(a).unwrap().neighbors[HexDirection::Top.index()] = Some(b);
        store.record_mut(b).unwrap().neighbors[HexDirection::Bottom.index()] = Some(a);
        store
            .append_pending(c, [TileLink::new(c, HexDirection::Top, a)])
            .unwrap();

        store.release(a).unwrap();
        assert_eq!(store.get(b).unwrap().neighbor(HexDirection::Bottom), None);
        assert_eq!(store.pending(c).unwrap(), None);
        assert!(store.pending_tiles().is_empty());
    }

    #[test]
    fn release_keeps_unrelated_pending_links() {
        let mut store = TileStore::new();
        let a = store.insert(at(0.0, 0.0), GenerationPhase::Ready).unwrap();
        let b = store.insert(at(0.0, -2.1), GenerationPhase::Ready).unwrap();
        let c = store.insert(at(0.0, 2.1), GenerationPhase::InnerLinking).unwrap();
        store
            .append_pending(
                c,
                [
                    TileLink::new(c, HexDirection::Top, a),
                    TileLink::new(c, HexDirection::TopLeft, b),
                ],
            )
            .unwrap();

        store.release(a).unwrap();
        assert_eq!(
            store.pending(c).unwrap(),
            Some(&[TileLink::new(c, HexDirection::TopLeft, b)][..])
        );
    }

    #[test]
    fn append_pending_rejects_link_owned_by_another_tile() {
        let mut store = TileStore::new();
        let a = store.insert(at(0.0, 0.0), GenerationPhase::Ready).unwrap();
        let b = store.insert(at(0.0, -2.1), GenerationPhase::Ready).unwrap();
        let c = store.insert(at(0.0, 2.1), GenerationPhase::Ready).unwrap();
        let misrouted = TileLink::new(b, HexDirection::Bottom, c);

        assert_eq!(
            store
                .append_pending(a, [TileLink::new(a, HexDirection::Top, b), misrouted])
                .unwrap_err(),
            GridError::MisroutedLink {
                tile: a,
                link: misrouted,
            }
        );
        assert!(!store.has_pending(a).unwrap());
    }

    #[test]
    fn tag_and_query_track_phase_counts() {
        let mut store = TileStore::new();
        let a = store.insert(at(0.0, 0.0), GenerationPhase::Expansion).unwrap();
        let b = store.insert(at(3.0, 0.0), GenerationPhase::Expansion).unwrap();
        assert_eq!(store.query(GenerationPhase::Expansion), vec![a, b]);

        store.tag(a, GenerationPhase::Ready).unwrap();
        assert_eq!(store.count(GenerationPhase::Expansion), 1);
        assert_eq!(store.count(GenerationPhase::Ready), 1);
        assert_eq!(store.query(GenerationPhase::Ready), vec![a]);
        assert!(store.query(GenerationPhase::InnerLinking).is_empty());
    }

    #[test]
    fn set_moves_position_index() {
        let mut store = TileStore::new();
        let a = store.insert(at(0.0, 0.0), GenerationPhase::Ready).unwrap();
        let b = store.insert(at(1.0, 0.0), GenerationPhase::Ready).unwrap();

        let mut moved = store.get(a).unwrap().clone();
        moved.position = GridPosition::new(2.0, 0.0, 0.0);
        store.set(a, moved.clone()).unwrap();
        assert_eq!(store.handle_at(moved.position), Some(a));
        assert!(store.handle_at(GridPosition::ORIGIN).is_none());

        moved.position = GridPosition::new(1.0, 0.0, 0.0);
        assert!(matches!(
            store.set(a, moved),
            Err(GridError::DuplicatePosition { existing, .. }) if existing == b
        ));
        store.check_unique_positions().unwrap();
    }

    #[test]
    fn create_clones_template_state() {
        let mut store = TileStore::new();
        let mut record = at(0.0, 0.0);
        record.state.insert(TileState::BURNING);
        let template = store.insert(record, GenerationPhase::Ready).unwrap();
        let clone = store
            .create(template, GridPosition::new(9.0, 0.0, 9.0), GenerationPhase::OuterLinking)
            .unwrap();
        let cloned = store.get(clone).unwrap();
        assert_eq!(cloned.state, TileState::WALKABLE | TileState::BURNING);
        assert!(cloned.linked().next().is_none());
        assert_eq!(store.phase(clone).unwrap(), GenerationPhase::OuterLinking);
    }

    #[test]
    fn symmetry_check_reports_one_sided_link() {
        let mut store = TileStore::new();
        let a = store.insert(at(0.0, 0.0), GenerationPhase::Ready).unwrap();
        let b = store.insert(at(0.0, -2.1), GenerationPhase::Ready).unwrap();
        store.record_mut(a).unwrap().neighbors[HexDirection::Top.index()] = Some(b);
        assert_eq!(
            store.check_symmetry().unwrap_err(),
            GridError::AsymmetricLink {
                tile: a,
                direction: HexDirection::Top,
                neighbor: b,
            }
        );
        store.record_mut(b).unwrap().neighbors[HexDirection::Bottom.index()] = Some(a);
        store.check_symmetry().unwrap();
    }
}
