//! Grouped per-tile scans.
//!
//! Each phase visits its input tiles, emits `(key, value)` pairs and needs
//! them grouped by key. Below the parallel threshold this runs inline;
//! above it the tiles are split into chunks on the current rayon pool, each
//! chunk folds into its own map and the maps are merged. The output is
//! sorted by key and every group is sorted and deduplicated, so it does not
//! depend on chunking or thread count.

use std::hash::Hash;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::error::GridError;
use super::tile::TileHandle;

const SCAN_CHUNK: usize = 256;

type Groups<K, V> = FxHashMap<K, Vec<V>>;

fn fold_tile<K, V, F>(
    mut groups: Groups<K, V>,
    scratch: &mut Vec<(K, V)>,
    tile: TileHandle,
    visit: &F,
) -> Result<Groups<K, V>, GridError>
where
    K: Eq + Hash,
    F: Fn(TileHandle, &mut Vec<(K, V)>) -> Result<(), GridError>,
{
    scratch.clear();
    visit(tile, scratch)?;
    for (key, value) in scratch.drain(..) {
        groups.entry(key).or_default().push(value);
    }
    Ok(groups)
}

fn merge<K, V>(mut into: Groups<K, V>, from: Groups<K, V>) -> Groups<K, V>
where
    K: Eq + Hash,
{
    if into.len() < from.len() {
        return merge(from, into);
    }
    for (key, mut values) in from {
        into.entry(key).or_default().append(&mut values);
    }
    into
}

/// Visit `tiles`, group emitted pairs by key. Returns groups sorted by key
/// with sorted, deduplicated values.
pub(crate) fn group_by_key<K, V, F>(
    tiles: &[TileHandle],
    parallel_threshold: usize,
    visit: F,
) -> Result<Vec<(K, Vec<V>)>, GridError>
where
    K: Eq + Hash + Ord + Send,
    V: Ord + Send,
    F: Fn(TileHandle, &mut Vec<(K, V)>) -> Result<(), GridError> + Sync,
{
    let groups = if tiles.len() < parallel_threshold {
        let mut scratch = Vec::new();
        tiles
            .iter()
            .try_fold(FxHashMap::default(), |groups, &tile| {
                fold_tile(groups, &mut scratch, tile, &visit)
            })?
    } else {
        tiles
            .par_chunks(SCAN_CHUNK)
            .try_fold(FxHashMap::default, |groups, chunk| {
                let mut scratch = Vec::new();
                chunk.iter().try_fold(groups, |groups, &tile| {
                    fold_tile(groups, &mut scratch, tile, &visit)
                })
            })
            .try_reduce(FxHashMap::default, |a, b| Ok(merge(a, b)))?
    };

    let mut out: Vec<(K, Vec<V>)> = groups.into_iter().collect();
    out.par_sort_unstable_by(|a, b| a.0.cmp(&b.0));
    for (_, values) in &mut out {
        values.sort_unstable();
        values.dedup();
    }
    Ok(out)
}
