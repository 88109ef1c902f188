#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::process::ExitCode;
use std::time::Instant;

use hexgen::gridgen::{
    GeneratorConfig, GridError, GridPosition, HexDirection, HexGridGenerator, TileState,
};
use rand::{Rng, SeedableRng};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_ROUNDS: u32 = 8;
const SEED_SPREAD: i64 = 24;
const RNG_SEED: u64 = 0x5EED_1234_ABCD_EF01;

struct MainArgs {
    config: GeneratorConfig,
    extra_seeds: usize,
}

fn parse_args() -> MainArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config = GeneratorConfig::default().max_expansion_rounds(DEFAULT_ROUNDS);
    let mut extra_seeds = 0;
    let next_arg = |i: usize, flag: &str| -> &str {
        args.get(i)
            .map(String::as_str)
            .unwrap_or_else(|| panic!("{flag} requires a value"))
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--threads" => {
                i += 1;
                let n: usize = next_arg(i, "--threads")
                    .parse()
                    .expect("--threads requires a positive integer");
                config = config.thread_count(n);
            }
            "--max-threads" => {
                i += 1;
                let n: usize = next_arg(i, "--max-threads")
                    .parse()
                    .expect("--max-threads requires a positive integer");
                config = config.max_threads(n);
            }
            "--rounds" => {
                i += 1;
                let n: u32 = next_arg(i, "--rounds")
                    .parse()
                    .expect("--rounds requires a non-negative integer");
                config = config.max_expansion_rounds(n);
            }
            "--link-iterations" => {
                i += 1;
                let n: u32 = next_arg(i, "--link-iterations")
                    .parse()
                    .expect("--link-iterations requires a non-negative integer");
                config = config.max_link_iterations(n);
            }
            "--step" => {
                i += 1;
                let step: f64 = next_arg(i, "--step")
                    .parse()
                    .expect("--step requires a number");
                assert!(step > 0.0, "--step must be positive");
                config = config.step_distance(step);
            }
            "--seeds" => {
                i += 1;
                extra_seeds = next_arg(i, "--seeds")
                    .parse()
                    .expect("--seeds requires a non-negative integer");
            }
            other => panic!(
                "unknown argument: {other}\nusage: hexgen [--threads N] [--max-threads N] [--rounds N] [--link-iterations N] [--step F] [--seeds N]"
            ),
        }
        i += 1;
    }
    MainArgs {
        config,
        extra_seeds,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// Lattice position `q` steps TopLeft and `r` steps Bottom from the origin.
fn lattice_position(grid: &HexGridGenerator, q: i64, r: i64) -> GridPosition {
    let (ax, ay, az) = grid.layout().offset(HexDirection::TopLeft).units();
    let (bx, by, bz) = grid.layout().offset(HexDirection::Bottom).units();
    GridPosition::from_units(q * ax + r * bx, q * ay + r * by, q * az + r * bz)
}

fn seed_world(grid: &mut HexGridGenerator, extra_seeds: usize) -> Result<usize, GridError> {
    grid.seed(GridPosition::ORIGIN)?;
    let mut rng = rand::rngs::StdRng::seed_from_u64(RNG_SEED);
    let mut seeded = 1;
    for _ in 0..extra_seeds {
        let q = rng.random_range(-SEED_SPREAD..=SEED_SPREAD);
        let r = rng.random_range(-SEED_SPREAD..=SEED_SPREAD);
        let position = lattice_position(grid, q, r);
        if grid.store().is_occupied(position) {
            continue;
        }
        let state = if rng.random_bool(0.1) {
            TileState::WALKABLE | TileState::BURNING
        } else {
            TileState::WALKABLE
        };
        grid.seed_with_state(position, state)?;
        seeded += 1;
    }
    Ok(seeded)
}

fn run(args: MainArgs) -> Result<(), GridError> {
    let mut grid = HexGridGenerator::with_config(args.config)?;
    let seeded = seed_world(&mut grid, args.extra_seeds)?;
    info!(
        event = "generator_ready",
        threads = grid.threads(),
        seeds = seeded,
        max_rounds = ?grid.config().max_expansion_rounds
    );

    let start = Instant::now();
    loop {
        if grid.is_settled() && grid.grow()? == 0 {
            break;
        }
        let tick_start = Instant::now();
        let report = grid.tick()?;
        info!(
            event = "tick",
            tick = report.tick,
            tiles = grid.store().len(),
            spawned = report.spawned,
            merged = report.merged,
            outer_links = report.outer_links,
            inner_iterations = report.inner_iterations,
            inner_links = report.inner_links,
            ms = tick_start.elapsed().as_secs_f64() * 1000.0
        );
    }
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    grid.store().check_unique_positions()?;
    grid.store().check_symmetry()?;
    let fully_linked = grid
        .store()
        .iter()
        .filter(|(_, record)| record.is_fully_linked())
        .count();
    info!(
        event = "grid_settled",
        ticks = grid.tick_count(),
        rounds = grid.expansion_rounds(),
        tiles = grid.store().len(),
        fully_linked,
        elapsed_ms
    );
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    match run(parse_args()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(event = "generation_failed", error = %err);
            ExitCode::FAILURE
        }
    }
}
