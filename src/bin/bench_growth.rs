use std::time::Instant;

use hexgen::gridgen::{GeneratorConfig, GridPosition, HexGridGenerator};

fn bench_growth(radius: u32, threads: Option<usize>) -> (f64, usize, u64) {
    let mut config = GeneratorConfig::default()
        .auto_grow(true)
        .max_expansion_rounds(radius);
    if let Some(n) = threads {
        config = config.thread_count(n);
    }
    let mut grid = HexGridGenerator::with_config(config).expect("failed to build generator");
    grid.seed(GridPosition::ORIGIN).expect("origin is free");

    let start = Instant::now();
    let ticks = grid
        .run_until_settled(u64::from(radius) + 1)
        .expect("growth did not settle");
    let duration = start.elapsed();

    (duration.as_secs_f64() * 1000.0, grid.store().len(), ticks)
}

fn main() {
    let threads = std::env::args()
        .nth(1)
        .map(|raw| raw.parse::<usize>().expect("thread count must be an integer"));
    let radii: &[u32] = &[
        8,   // 217 tiles, serial scans
        32,  // ~3k tiles
        64,  // ~12k tiles
        128, // ~50k tiles
        256, // ~200k tiles
    ];

    println!(
        "{:<8} {:>8} {:>8} {:>12} {:>12}",
        "Radius", "Tiles", "Ticks", "Total(ms)", "Avg(ms)"
    );
    println!("{}", "-".repeat(52));

    for &radius in radii {
        let (total_ms, tiles, ticks) = bench_growth(radius, threads);
        let expected = 1 + 3 * radius as usize * (radius as usize + 1);
        assert_eq!(tiles, expected, "hexagon of radius {radius}");
        let avg_ms = total_ms / ticks.max(1) as f64;
        println!(
            "{:<8} {:>8} {:>8} {:>12.1} {:>12.4}",
            radius, tiles, ticks, total_ms, avg_ms
        );
    }
}
