//! `PositionIndex`: open-addressing map from canonical `GridPosition` to the
//! `TileHandle` living there. The tile store uses it to keep at most one live
//! tile per position.
//!
//! Slots are laid out flat. Lookups use Robin Hood probing, and a 12-bit
//! fingerprint plus the probe distance sit in a single control word, so most
//! misses never compare a full key. Removal shifts the following run back
//! instead of leaving tombstones.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use super::position::GridPosition;
use super::tile::TileHandle;

// ── Hash function ───────────────────────────────────────────────────────

#[inline(always)]
pub(crate) fn position_hash(position: GridPosition) -> u64 {
    let mut hasher = FxHasher::default();
    position.hash(&mut hasher);
    let h = hasher.finish();
    // Hex lattice units are multiples of large strides, so fold the high
    // bits down before bucket selection.
    h ^ (h >> 29)
}

// ── Slot layout ─────────────────────────────────────────────────────────

const EMPTY: u32 = 0;
const OCCUPIED_BIT: u32 = 0x8000_0000;
const DIST_SHIFT: u32 = 12;
const DIST_MASK: u32 = 0x7fff_f000;
const FP_MASK: u32 = 0x0000_0fff;
const MATCH_MASK: u32 = OCCUPIED_BIT | FP_MASK;
const MAX_DIST: usize = (DIST_MASK >> DIST_SHIFT) as usize;

/// Control word layout:
/// - bit 31: occupied flag
/// - bits 12..30: probe distance (Robin Hood DIB)
/// - bits 0..11: key fingerprint
#[derive(Clone, Copy)]
struct Slot {
    key: GridPosition,
    value: TileHandle,
    ctrl: u32,
}

impl Slot {
    const EMPTY: Self = Self {
        key: GridPosition::ORIGIN,
        value: TileHandle::new(0, 0),
        ctrl: EMPTY,
    };

    #[inline(always)]
    fn is_occupied(self) -> bool {
        self.ctrl & OCCUPIED_BIT != 0
    }

    #[inline(always)]
    fn is_empty(self) -> bool {
        self.ctrl == EMPTY
    }

    #[inline(always)]
    fn distance(self) -> usize {
        ((self.ctrl & DIST_MASK) >> DIST_SHIFT) as usize
    }

    #[inline(always)]
    fn set_distance(&mut self, distance: usize) {
        assert!(
            distance <= MAX_DIST,
            "PositionIndex probe distance overflow (distance={distance}, max={MAX_DIST})"
        );
        self.ctrl = (self.ctrl & !DIST_MASK) | ((distance as u32) << DIST_SHIFT);
    }

    #[inline(always)]
    fn match_ctrl(self) -> u32 {
        self.ctrl & MATCH_MASK
    }
}

// ── PositionIndex ───────────────────────────────────────────────────────

/// Maximum load factor numerator / denominator: 1/2 = 50%.
const LOAD_NUM: usize = 1;
const LOAD_DEN: usize = 2;

pub struct PositionIndex {
    slots: Vec<Slot>,
    len: usize,
    /// `capacity - 1`.  Capacity is always a power of two.
    mask: usize,
}

impl PositionIndex {
    /// Create an empty map with room for at least `cap` entries before growing.
    pub fn with_capacity(cap: usize) -> Self {
        let min_slots = cap
            .saturating_mul(LOAD_DEN)
            .div_ceil(LOAD_NUM)
            .next_power_of_two()
            .max(16);
        Self {
            slots: vec![Slot::EMPTY; min_slots],
            len: 0,
            mask: min_slots - 1,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reserve room for `additional` more entries without rehashing.
    pub fn reserve(&mut self, additional: usize) {
        let required = self.len.saturating_add(additional);
        let min_slots = required
            .saturating_mul(LOAD_DEN)
            .div_ceil(LOAD_NUM)
            .next_power_of_two();
        if min_slots > self.slots.len() {
            self.resize(min_slots);
        }
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// Robin Hood early exit on miss: once the probed slot sits closer to its
    /// home than we are to ours, the key cannot be further along the chain.
    #[inline]
    pub fn get(&self, key: GridPosition) -> Option<TileHandle> {
        let hash = position_hash(key);
        let target_ctrl = match_ctrl_of(hash);
        let mut pos = hash as usize & self.mask;
        let mut our_dist = 0usize;

        loop {
            let slot = self.slots[pos];
            if slot.is_empty() {
                return None;
            }
            if our_dist > slot.distance() {
                return None;
            }
            if slot.match_ctrl() == target_ctrl && slot.key == key {
                return Some(slot.value);
            }
            pos = (pos + 1) & self.mask;
            our_dist += 1;
        }
    }

    #[inline]
    pub fn contains(&self, key: GridPosition) -> bool {
        self.get(key).is_some()
    }

    // ── Insert ──────────────────────────────────────────────────────────

    /// Insert a mapping.  Returns the previous value if the key was present.
    pub fn insert(&mut self, key: GridPosition, value: TileHandle) -> Option<TileHandle> {
        if self.needs_grow() {
            self.grow();
        }
        let hash = position_hash(key);
        let target_ctrl = match_ctrl_of(hash);
        let mask = self.mask;
        let mut pos = hash as usize & mask;

        let mut ins = Slot {
            key,
            value,
            ctrl: occupied_ctrl(fingerprint_of(hash), 0),
        };

        loop {
            let slot = &mut self.slots[pos];

            if slot.is_empty() {
                *slot = ins;
                self.len += 1;
                return None;
            }

            // Exact match: update in place. Only possible before the first
            // Robin Hood swap, since a displaced entry is never a duplicate.
            if slot.match_ctrl() == target_ctrl && slot.key == key && ins.key == key {
                let old = slot.value;
                slot.value = value;
                return Some(old);
            }

            if ins.distance() > slot.distance() {
                std::mem::swap(slot, &mut ins);
            }

            ins.set_distance(ins.distance() + 1);
            pos = (pos + 1) & mask;
        }
    }

    /// Insert during resize. Recomputes the home slot and skips the duplicate check.
    fn insert_rehash(&mut self, mut ins: Slot) {
        let mask = self.mask;
        let mut pos = position_hash(ins.key) as usize & mask;
        ins.set_distance(0);

        loop {
            let slot = &mut self.slots[pos];
            if slot.is_empty() {
                *slot = ins;
                self.len += 1;
                return;
            }
            if ins.distance() > slot.distance() {
                std::mem::swap(slot, &mut ins);
            }
            ins.set_distance(ins.distance() + 1);
            pos = (pos + 1) & mask;
        }
    }

    // ── Remove ──────────────────────────────────────────────────────────

    /// Remove a mapping.  Returns the value if the key was present.
    pub fn remove(&mut self, key: GridPosition) -> Option<TileHandle> {
        let hash = position_hash(key);
        let target_ctrl = match_ctrl_of(hash);
        let mask = self.mask;
        let mut pos = hash as usize & mask;
        let mut our_dist = 0usize;

        loop {
            let slot = self.slots[pos];
            if slot.is_empty() || our_dist > slot.distance() {
                return None;
            }
            if slot.match_ctrl() == target_ctrl && slot.key == key {
                self.backward_shift_delete(pos);
                self.len -= 1;
                return Some(slot.value);
            }
            pos = (pos + 1) & mask;
            our_dist += 1;
        }
    }

    /// Backward-shift deletion using stored probe distances.
    fn backward_shift_delete(&mut self, removed: usize) {
        let mask = self.mask;
        let mut gap = removed;
        loop {
            let next = (gap + 1) & mask;
            let mut candidate = self.slots[next];

            // Empty or at home: the chain ends here.
            if candidate.is_empty() || candidate.distance() == 0 {
                self.slots[gap] = Slot::EMPTY;
                return;
            }

            candidate.set_distance(candidate.distance() - 1);
            self.slots[gap] = candidate;
            gap = next;
        }
    }

    // ── Resize / grow ───────────────────────────────────────────────────

    #[inline(always)]
    fn needs_grow(&self) -> bool {
        self.len * LOAD_DEN >= self.slots.len() * LOAD_NUM
    }

    fn grow(&mut self) {
        let new_cap = (self.slots.len() * 2).max(16);
        self.resize(new_cap);
    }

    fn resize(&mut self, new_cap: usize) {
        debug_assert!(new_cap.is_power_of_two());
        let old_slots = std::mem::replace(&mut self.slots, vec![Slot::EMPTY; new_cap]);
        self.mask = new_cap - 1;
        self.len = 0;
        for slot in old_slots {
            if slot.is_occupied() {
                self.insert_rehash(slot);
            }
        }
    }

    // ── Iteration ───────────────────────────────────────────────────────

    pub fn iter(&self) -> impl Iterator<Item = (GridPosition, TileHandle)> + '_ {
        self.slots
            .iter()
            .filter(|slot| slot.is_occupied())
            .map(|slot| (slot.key, slot.value))
    }
}

// ── Free helpers ────────────────────────────────────────────────────────

/// Keep at least one bit set so EMPTY remains ctrl == 0.
#[inline(always)]
fn fingerprint_of(hash: u64) -> u32 {
    ((hash >> 52) as u32 & FP_MASK) | 1
}

#[inline(always)]
fn occupied_ctrl(fp: u32, distance: usize) -> u32 {
    OCCUPIED_BIT | ((distance as u32) << DIST_SHIFT) | fp
}

#[inline(always)]
fn match_ctrl_of(hash: u64) -> u32 {
    OCCUPIED_BIT | fingerprint_of(hash)
}
