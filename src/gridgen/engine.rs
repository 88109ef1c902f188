//! Phase scheduler for incremental hex grid generation.
//!
//! One `tick` runs every phase once, in order, with a barrier after each:
//! expansion, outer linking, inner linking to a fixpoint, then a sweep of
//! leftover pending buffers. Per-tile scans inside a phase run on the
//! generator's own rayon pool.

use std::sync::OnceLock;

use tracing::{debug, warn};

use super::apply::LinkApplier;
use super::arena::TileStore;
use super::error::GridError;
use super::expansion::ExpansionPhase;
use super::inner_linking::InnerLinkingPhase;
use super::offsets::NeighborOffsets;
use super::outer_linking::OuterLinkingPhase;
use super::position::GridPosition;
use super::tile::{GenerationPhase, TileHandle, TileRecord, TileState};

pub const DEFAULT_MAX_LINK_ITERATIONS: u32 = 64;
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 256;

/// Overrides the auto-detected pool size when `thread_count` is unset.
pub const THREADS_ENV: &str = "HEXGEN_THREADS";

const MAX_AUTO_THREADS: usize = 16;

static PHYSICAL_CORES: OnceLock<usize> = OnceLock::new();

#[inline]
fn physical_core_count() -> usize {
    *PHYSICAL_CORES.get_or_init(|| num_cpus::get_physical().max(1))
}

#[inline]
fn auto_pool_thread_count() -> usize {
    physical_core_count().min(MAX_AUTO_THREADS)
}

fn parse_thread_count(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|&n| n > 0)
}

fn env_thread_count() -> Option<usize> {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|v| parse_thread_count(&v))
}

/// Resolve the effective pool size from a config.
fn resolve_thread_count(config: &GeneratorConfig) -> usize {
    let mut threads = config
        .thread_count
        .or_else(env_thread_count)
        .unwrap_or_else(auto_pool_thread_count);
    if let Some(cap) = config.max_threads {
        threads = threads.min(cap);
    }
    threads.max(1)
}

/// Configuration for a `HexGridGenerator`.
///
/// `GeneratorConfig::default()` auto-sizes the pool and leaves growth
/// unbounded; adjust individual knobs with the builder methods.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Threads in the scan pool. `None` means `HEXGEN_THREADS`, else the
    /// physical core count.
    pub thread_count: Option<usize>,
    /// Hard upper bound on threads regardless of detection.
    pub max_threads: Option<usize>,
    /// Expansion rounds allowed over the generator's lifetime. `None` means
    /// unbounded.
    pub max_expansion_rounds: Option<u32>,
    /// Inner linking iterations per tick before giving up.
    pub max_link_iterations: u32,
    /// Re-enter expansion automatically whenever the grid settles.
    pub auto_grow: bool,
    /// Phase inputs smaller than this are scanned on the calling thread.
    pub parallel_threshold: usize,
    pub layout: NeighborOffsets,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            thread_count: None,
            max_threads: None,
            max_expansion_rounds: None,
            max_link_iterations: DEFAULT_MAX_LINK_ITERATIONS,
            auto_grow: false,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            layout: NeighborOffsets::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn thread_count(mut self, n: usize) -> Self {
        self.thread_count = Some(n.max(1));
        self
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = Some(n.max(1));
        self
    }

    pub fn max_expansion_rounds(mut self, rounds: u32) -> Self {
        self.max_expansion_rounds = Some(rounds);
        self
    }

    pub fn max_link_iterations(mut self, iterations: u32) -> Self {
        self.max_link_iterations = iterations;
        self
    }

    pub fn auto_grow(mut self, enabled: bool) -> Self {
        self.auto_grow = enabled;
        self
    }

    pub fn parallel_threshold(mut self, tiles: usize) -> Self {
        self.parallel_threshold = tiles;
        self
    }

    /// Use a layout whose tile centers are `2 * step` apart.
    pub fn step_distance(mut self, step: f64) -> Self {
        self.layout = NeighborOffsets::from_step_distance(step);
        self
    }
}

/// Counters for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Tiles re-entered into expansion by auto-grow.
    pub grown: usize,
    pub expanded: usize,
    pub spawned: usize,
    pub merged: usize,
    pub outer_links: usize,
    pub inner_iterations: u32,
    pub inner_links: usize,
    pub committed_tiles: usize,
    /// Leftover buffers committed by the end-of-tick sweep.
    pub swept: usize,
}

struct GeneratorState {
    store: TileStore,
    config: GeneratorConfig,
    expansion_rounds: u32,
    tick_count: u64,
}

impl GeneratorState {
    #[inline]
    fn expansion_allowed(&self) -> bool {
        self.config
            .max_expansion_rounds
            .is_none_or(|cap| self.expansion_rounds < cap)
    }

    fn is_settled(&self) -> bool {
        GenerationPhase::ALL
            .into_iter()
            .filter(|&phase| phase != GenerationPhase::Ready)
            .all(|phase| self.store.count(phase) == 0)
            && self.store.pending_tiles().is_empty()
    }

    fn growable(&self) -> Vec<TileHandle> {
        self.store
            .iter()
            .filter(|(_, record)| !record.is_fully_linked())
            .map(|(handle, _)| handle)
            .filter(|&handle| self.store.phase(handle) == Ok(GenerationPhase::Ready))
            .collect()
    }

    fn grow(&mut self) -> Result<usize, GridError> {
        if !self.expansion_allowed() {
            return Ok(0);
        }
        let tiles = self.growable();
        for &tile in &tiles {
            self.store.tag(tile, GenerationPhase::Expansion)?;
        }
        Ok(tiles.len())
    }

    fn tick(&mut self) -> Result<TickReport, GridError> {
        self.tick_count += 1;
        let mut report = TickReport {
            tick: self.tick_count,
            ..TickReport::default()
        };
        let threshold = self.config.parallel_threshold;

        if self.config.auto_grow && self.is_settled() {
            report.grown = self.grow()?;
        }

        let allow_spawn = self.expansion_allowed();
        let expansion = ExpansionPhase {
            layout: &self.config.layout,
            parallel_threshold: threshold,
        }
        .run(&mut self.store, allow_spawn)?;
        if allow_spawn && expansion.expanded > 0 {
            self.expansion_rounds += 1;
        }
        report.expanded = expansion.expanded;
        report.spawned = expansion.spawned;
        report.merged = expansion.merged;

        let outer = OuterLinkingPhase {
            parallel_threshold: threshold,
        }
        .run(&mut self.store)?;
        report.outer_links = outer.links;

        let inner = InnerLinkingPhase {
            max_iterations: self.config.max_link_iterations,
            parallel_threshold: threshold,
        }
        .run(&mut self.store);
        let inner = match inner {
            Ok(inner) => inner,
            Err(err @ GridError::NonConvergence { .. }) => {
                warn!(
                    event = "inner_linking_not_converged",
                    tick = self.tick_count,
                    max_iterations = self.config.max_link_iterations,
                    error = %err
                );
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        report.inner_iterations = inner.iterations;
        report.inner_links = inner.derived;
        report.committed_tiles = inner.committed_tiles;

        report.swept = LinkApplier::sweep(&mut self.store)?;

        debug!(
            event = "tick_completed",
            tick = report.tick,
            tiles = self.store.len(),
            spawned = report.spawned,
            merged = report.merged,
            inner_iterations = report.inner_iterations,
            expansion_rounds = self.expansion_rounds
        );
        Ok(report)
    }

    fn can_grow(&self) -> bool {
        self.config.auto_grow && self.expansion_allowed() && !self.growable().is_empty()
    }

    fn run_until_settled(&mut self, max_ticks: u64) -> Result<u64, GridError> {
        let mut ticks = 0;
        while ticks < max_ticks {
            if self.is_settled() && !self.can_grow() {
                break;
            }
            self.tick()?;
            ticks += 1;
        }
        Ok(ticks)
    }
}

pub struct HexGridGenerator {
    state: GeneratorState,
    pool: rayon::ThreadPool,
    threads: usize,
}

impl HexGridGenerator {
    pub fn new() -> Result<Self, GridError> {
        Self::with_config(GeneratorConfig::default())
    }

    pub fn with_config(config: GeneratorConfig) -> Result<Self, GridError> {
        let threads = resolve_thread_count(&config);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("hexgen-{i}"))
            .build()
            .map_err(|err| GridError::ThreadPool(err.to_string()))?;
        debug!(
            event = "generator_created",
            threads,
            max_expansion_rounds = ?config.max_expansion_rounds,
            max_link_iterations = config.max_link_iterations,
            step = config.layout.step_distance()
        );
        Ok(Self {
            state: GeneratorState {
                store: TileStore::new(),
                config,
                expansion_rounds: 0,
                tick_count: 0,
            },
            pool,
            threads,
        })
    }

    /// Place a walkable tile at `position` and schedule it for expansion.
    pub fn seed(&mut self, position: impl Into<GridPosition>) -> Result<TileHandle, GridError> {
        self.seed_with_state(position, TileState::WALKABLE)
    }

    pub fn seed_with_state(
        &mut self,
        position: impl Into<GridPosition>,
        state: TileState,
    ) -> Result<TileHandle, GridError> {
        self.state.store.insert(
            TileRecord::new(position.into(), state),
            GenerationPhase::Expansion,
        )
    }

    /// Move every `Ready` tile with an empty slot back into expansion.
    /// Returns the number of tiles scheduled, zero once the round cap is hit.
    pub fn grow(&mut self) -> Result<usize, GridError> {
        self.state.grow()
    }

    pub fn tick(&mut self) -> Result<TickReport, GridError> {
        let Self { state, pool, .. } = self;
        pool.install(|| state.tick())
    }

    /// Tick until nothing is left to do, or `max_ticks` ticks have run.
    /// Returns the number of ticks run.
    pub fn run_until_settled(&mut self, max_ticks: u64) -> Result<u64, GridError> {
        let Self { state, pool, .. } = self;
        pool.install(|| state.run_until_settled(max_ticks))
    }

    #[inline]
    pub fn store(&self) -> &TileStore {
        &self.state.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut TileStore {
        &mut self.state.store
    }

    /// No tile is mid-generation and no pending buffer is left.
    pub fn is_settled(&self) -> bool {
        self.state.is_settled()
    }

    #[inline]
    pub fn expansion_rounds(&self) -> u32 {
        self.state.expansion_rounds
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.state.tick_count
    }

    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.state.config
    }

    pub fn layout(&self) -> &NeighborOffsets {
        &self.state.config.layout
    }
}

#[cfg(test)]
mod tests {
    use super::{GeneratorConfig, HexGridGenerator, parse_thread_count, resolve_thread_count};
    use crate::gridgen::error::GridError;
    use crate::gridgen::position::GridPosition;
    use crate::gridgen::tile::{GenerationPhase, HexDirection};

    fn generator(config: GeneratorConfig) -> HexGridGenerator {
        HexGridGenerator::with_config(config.thread_count(2)).unwrap()
    }

    #[test]
    fn explicit_thread_count_respects_cap() {
        let config = GeneratorConfig::default().thread_count(12).max_threads(3);
        assert_eq!(resolve_thread_count(&config), 3);
        let config = GeneratorConfig::default().thread_count(0);
        assert_eq!(resolve_thread_count(&config), 1);
    }

    #[test]
    fn thread_env_values_parse_strictly() {
        assert_eq!(parse_thread_count(" 6 "), Some(6));
        assert_eq!(parse_thread_count("0"), None);
        assert_eq!(parse_thread_count("many"), None);
        assert_eq!(parse_thread_count(""), None);
    }

    #[test]
    fn single_tick_links_first_ring() {
        let mut grid = generator(GeneratorConfig::default());
        let seed = grid.seed(GridPosition::ORIGIN).unwrap();
        let report = grid.tick().unwrap();

        assert_eq!(report.tick, 1);
        assert_eq!(report.spawned, 6);
        assert_eq!(report.outer_links, 6);
        assert_eq!(report.inner_iterations, 2);
        assert_eq!(report.inner_links, 12);
        assert!(grid.is_settled());
        assert!(grid.store().get(seed).unwrap().is_fully_linked());
        grid.store().check_symmetry().unwrap();
    }

    #[test]
    fn manual_grow_extends_by_one_ring() {
        let mut grid = generator(GeneratorConfig::default());
        grid.seed(GridPosition::ORIGIN).unwrap();
        grid.tick().unwrap();
        assert_eq!(grid.grow().unwrap(), 6);
        grid.tick().unwrap();

        assert_eq!(grid.store().len(), 19);
        assert_eq!(grid.expansion_rounds(), 2);
        let fully_linked = grid
            .store()
            .iter()
            .filter(|(_, record)| record.is_fully_linked())
            .count();
        assert_eq!(fully_linked, 7);
        grid.store().check_symmetry().unwrap();
    }

    #[test]
    fn auto_grow_stops_at_round_cap() {
        let mut grid = generator(
            GeneratorConfig::default()
                .auto_grow(true)
                .max_expansion_rounds(3),
        );
        grid.seed(GridPosition::ORIGIN).unwrap();
        let ticks = grid.run_until_settled(100).unwrap();

        assert_eq!(ticks, 3);
        assert_eq!(grid.expansion_rounds(), 3);
        // Hexagon of radius 3.
        assert_eq!(grid.store().len(), 37);
        assert!(grid.is_settled());
        assert_eq!(grid.grow().unwrap(), 0);
        assert_eq!(grid.store().count(GenerationPhase::Ready), 37);
    }

    #[test]
    fn round_cap_zero_settles_seed_without_spawning() {
        let mut grid = generator(GeneratorConfig::default().max_expansion_rounds(0));
        let seed = grid.seed(GridPosition::ORIGIN).unwrap();
        let report = grid.tick().unwrap();
        assert_eq!(report.spawned, 0);
        assert_eq!(grid.store().len(), 1);
        assert_eq!(grid.store().phase(seed).unwrap(), GenerationPhase::Ready);
        assert_eq!(grid.expansion_rounds(), 0);
    }

    #[test]
    fn non_convergence_resumes_next_tick() {
        let mut grid = generator(GeneratorConfig::default().max_link_iterations(1));
        let seed = grid.seed(GridPosition::ORIGIN).unwrap();
        assert!(matches!(
            grid.tick(),
            Err(GridError::NonConvergence { iterations: 1, pending_tiles: 6 })
        ));
        assert!(!grid.is_settled());

        // One more iteration drains the remaining buffers.
        grid.tick().unwrap();
        assert!(grid.is_settled());
        let top = grid
            .store()
            .get(seed)
            .unwrap()
            .neighbor(HexDirection::Top)
            .unwrap();
        assert_eq!(grid.store().get(top).unwrap().link_count(), 3);
        grid.store().check_symmetry().unwrap();
    }
}
