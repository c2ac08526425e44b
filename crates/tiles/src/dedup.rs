//! Pairwise classification of atlas tiles into unique tiles and flipped duplicates.
//!
//! Candidates are visited in raster order. Each still-unique candidate claims every later,
//! still-unclaimed tile that matches it under one of the four transforms; the lowest raster
//! candidate therefore always wins a contested duplicate. The pass is O(T^2) in the atlas tile
//! count, which the capacity tiers keep small.

use model::{PixelBuffer, TileBlock, TileGrid, TileGridError, TilePos};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::CompressError;
use crate::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupStrategy {
    #[default]
    Sequential,
    /// Each candidate's scan runs on the rayon pool; candidates stay in raster order.
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupRecord {
    pub is_unique: bool,
    /// Own position for unique tiles, the claiming tile otherwise.
    pub canonical: TilePos,
    pub h_flip: bool,
    pub v_flip: bool,
    /// Non-unique tiles at or before this one in raster order.
    pub duplicates_seen_before: u32,
}

impl DedupRecord {
    const fn unique(pos: TilePos) -> Self {
        Self {
            is_unique: true,
            canonical: pos,
            h_flip: false,
            v_flip: false,
            duplicates_seen_before: 0,
        }
    }

    fn claim(&mut self, canonical: TilePos, transform: Transform) {
        let (h_flip, v_flip) = transform.flip_flags();
        self.is_unique = false;
        self.canonical = canonical;
        self.h_flip = h_flip;
        self.v_flip = v_flip;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupTable {
    grid: TileGrid,
    records: Vec<DedupRecord>,
    unique_count: usize,
}

impl DedupTable {
    /// Rebuilds a table from stored records, checking the invariants the remapper relies on.
    pub fn from_records(grid: TileGrid, records: Vec<DedupRecord>) -> Result<Self, CompressError> {
        if records.len() != grid.tile_count() {
            return Err(CompressError::SnapshotMismatch {
                expected: grid.tile_count(),
                found: records.len(),
            });
        }
        let mut duplicates = 0u32;
        for (index, record) in records.iter().enumerate() {
            if !record.is_unique {
                duplicates += 1;
                let canonical = grid.tile_index(record.canonical)?;
                if canonical >= index || !records[canonical].is_unique {
                    return Err(CompressError::InvalidCanonical {
                        index,
                        canonical: record.canonical,
                    });
                }
            }
            if record.duplicates_seen_before != duplicates {
                return Err(CompressError::InvalidDuplicateCount {
                    index,
                    expected: duplicates,
                    found: record.duplicates_seen_before,
                });
            }
        }
        let unique_count = records.len() - duplicates as usize;
        Ok(Self {
            grid,
            records,
            unique_count,
        })
    }

    pub const fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn records(&self) -> &[DedupRecord] {
        &self.records
    }

    pub const fn unique_count(&self) -> usize {
        self.unique_count
    }

    pub fn tile_count(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, index: usize) -> Option<&DedupRecord> {
        self.records.get(index)
    }

    /// Index of the tile that has to be drawn for raster cell `index`, counted in the compacted
    /// atlas, together with the record holding the flip bits.
    pub fn resolve(&self, index: usize) -> Result<(u32, &DedupRecord), TileGridError> {
        let Some(record) = self.records.get(index) else {
            return Err(TileGridError::IndexOutOfBounds {
                index,
                tile_count: self.records.len(),
            });
        };
        let canonical_index = if record.is_unique {
            index
        } else {
            self.grid.tile_index(record.canonical)?
        };
        let canonical = &self.records[canonical_index];
        let compacted = canonical_index as u32 - canonical.duplicates_seen_before;
        Ok((compacted, record))
    }
}

/// Classifies every tile of `atlas`.
pub fn deduplicate(
    atlas: &PixelBuffer,
    strategy: DedupStrategy,
) -> Result<DedupTable, CompressError> {
    let grid = atlas.tile_grid()?;
    let blocks = atlas.tiles()?;
    let mut records: Vec<DedupRecord> = grid.positions().map(DedupRecord::unique).collect();

    for candidate in 0..records.len() {
        if !records[candidate].is_unique {
            continue;
        }
        let canonical = records[candidate].canonical;
        let block = &blocks[candidate];
        let (_, later) = records.split_at_mut(candidate + 1);
        let later_blocks = &blocks[candidate + 1..];
        match strategy {
            DedupStrategy::Sequential => {
                for (record, other) in later.iter_mut().zip(later_blocks) {
                    claim_if_match(record, other, block, canonical);
                }
            }
            DedupStrategy::Parallel => {
                later
                    .par_iter_mut()
                    .zip(later_blocks.par_iter())
                    .for_each(|(record, other)| claim_if_match(record, other, block, canonical));
            }
        }
    }

    let mut duplicates = 0u32;
    for record in &mut records {
        duplicates += u32::from(!record.is_unique);
        record.duplicates_seen_before = duplicates;
    }
    let unique_count = records.len() - duplicates as usize;
    debug!(
        tiles = records.len(),
        unique = unique_count,
        ?strategy,
        "tile deduplication finished"
    );

    Ok(DedupTable {
        grid,
        records,
        unique_count,
    })
}

#[inline]
fn claim_if_match(
    record: &mut DedupRecord,
    other: &TileBlock,
    block: &TileBlock,
    canonical: TilePos,
) {
    if !record.is_unique {
        return;
    }
    if let Some(transform) = Transform::first_match(block, other) {
        record.claim(canonical, transform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{Rgb8, TILE_EDGE};

    fn pattern(seed: u8) -> TileBlock {
        TileBlock::from_fn(|x, y| Rgb8::new(seed, x as u8 * 31, y as u8 * 17 + seed))
    }

    fn atlas_of(columns: u32, rows: u32, blocks: &[TileBlock]) -> PixelBuffer {
        let mut atlas = PixelBuffer::filled(columns * TILE_EDGE, rows * TILE_EDGE, Rgb8::PINK);
        let grid = TileGrid::new(columns, rows);
        for (index, block) in blocks.iter().enumerate() {
            atlas.put_tile(grid.tile_pos(index).unwrap(), block);
        }
        atlas
    }

    #[test]
    fn distinct_tiles_stay_unique() {
        let blocks: Vec<_> = (0..6).map(pattern).collect();
        let table = deduplicate(&atlas_of(3, 2, &blocks), DedupStrategy::Sequential).unwrap();
        assert_eq!(table.unique_count(), 6);
        assert!(table.records().iter().all(|record| record.is_unique));
        assert!(table.records().iter().all(|record| record.duplicates_seen_before == 0));
    }

    #[test]
    fn duplicates_point_to_earlier_canonical() {
        let a = pattern(1);
        let b = pattern(2);
        let blocks = [a, b, a.mirrored_vertically(), b.mirrored_horizontally()];
        let table = deduplicate(&atlas_of(2, 2, &blocks), DedupStrategy::Sequential).unwrap();

        assert_eq!(table.unique_count(), 2);
        let third = table.records()[2];
        assert!(!third.is_unique);
        assert_eq!(third.canonical, TilePos::new(0, 0));
        assert!(third.v_flip && !third.h_flip);
        assert_eq!(third.duplicates_seen_before, 1);

        let fourth = table.records()[3];
        assert_eq!(fourth.canonical, TilePos::new(1, 0));
        assert!(fourth.h_flip && !fourth.v_flip);
        assert_eq!(fourth.duplicates_seen_before, 2);
    }

    #[test]
    fn claimed_tile_is_not_reassigned_by_later_candidate() {
        let a = TileBlock::filled(Rgb8::new(10, 10, 10));
        let blocks = [a, a, a, a];
        let table = deduplicate(&atlas_of(4, 1, &blocks), DedupStrategy::Sequential).unwrap();
        assert_eq!(table.unique_count(), 1);
        for record in &table.records()[1..] {
            assert_eq!(record.canonical, TilePos::new(0, 0));
            assert!(!record.h_flip && !record.v_flip);
        }
    }

    #[test]
    fn parallel_strategy_matches_sequential() {
        let mut blocks = Vec::new();
        for seed in 0..24u8 {
            let base = pattern(seed % 5);
            blocks.push(match seed % 4 {
                0 => base,
                1 => base.mirrored_vertically(),
                2 => base.mirrored_horizontally(),
                _ => base.mirrored_vertically().mirrored_horizontally(),
            });
        }
        let atlas = atlas_of(6, 4, &blocks);
        let sequential = deduplicate(&atlas, DedupStrategy::Sequential).unwrap();
        let parallel = deduplicate(&atlas, DedupStrategy::Parallel).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn resolve_uses_the_canonical_compacted_index() {
        let a = pattern(1);
        let b = pattern(2);
        let c = pattern(3);
        // raster: a b a' c
        let blocks = [a, b, a.mirrored_vertically().mirrored_horizontally(), c];
        let table = deduplicate(&atlas_of(4, 1, &blocks), DedupStrategy::Sequential).unwrap();
        assert_eq!(table.resolve(0).unwrap().0, 0);
        assert_eq!(table.resolve(1).unwrap().0, 1);
        let (index, record) = table.resolve(2).unwrap();
        assert_eq!(index, 0);
        assert!(record.h_flip && record.v_flip);
        // c sits after one duplicate, so it lands in compacted slot 2.
        assert_eq!(table.resolve(3).unwrap().0, 2);
        assert!(table.resolve(4).is_err());
    }

    #[test]
    fn from_records_rejects_forward_canonical() {
        let grid = TileGrid::new(2, 1);
        let mut records = vec![
            DedupRecord::unique(TilePos::new(0, 0)),
            DedupRecord::unique(TilePos::new(1, 0)),
        ];
        records[0].claim(TilePos::new(1, 0), Transform::Identity);
        records[0].duplicates_seen_before = 1;
        records[1].duplicates_seen_before = 1;
        assert!(matches!(
            DedupTable::from_records(grid, records),
            Err(CompressError::InvalidCanonical { index: 0, .. })
        ));
    }

    #[test]
    fn from_records_accepts_engine_output() {
        let a = pattern(4);
        let blocks = [a, a.mirrored_horizontally(), pattern(5), a];
        let table = deduplicate(&atlas_of(2, 2, &blocks), DedupStrategy::Sequential).unwrap();
        let rebuilt = DedupTable::from_records(table.grid(), table.records().to_vec()).unwrap();
        assert_eq!(rebuilt, table);
    }
}
