use model::{PixelBuffer, Rgb8, TILE_EDGE, TileBlock, TileGrid, TilePos};
use tracing::debug;

use crate::CompressError;
use crate::dedup::DedupTable;

mod tier;

pub use tier::{CanvasSize, CanvasTier, MAX_UNIQUE_TILES, canvas_for};

/// Color of canvas area not covered by a packed tile.
pub const CANVAS_FILL: Rgb8 = Rgb8::PINK;

/// Unique tiles packed in raster order into a capacity-tiered canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactedAtlas {
    // tile_count <= size.capacity_tiles()
    pixels: PixelBuffer,
    tier: CanvasTier,
    size: CanvasSize,
    tile_count: usize,
}

impl CompactedAtlas {
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub const fn tier(&self) -> CanvasTier {
        self.tier
    }

    pub const fn size(&self) -> CanvasSize {
        self.size
    }

    pub const fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub const fn grid(&self) -> TileGrid {
        TileGrid::new(self.size.columns(), self.size.rows())
    }

    /// Packed tile at compacted index `index`.
    pub fn tile(&self, index: usize) -> Option<TileBlock> {
        if index >= self.tile_count {
            return None;
        }
        let pos = self.grid().tile_pos(index).ok()?;
        Some(self.pixels.tile(pos))
    }

    /// Whether pixel `(x, y)` belongs to a packed tile rather than to the canvas fill.
    pub fn is_packed_pixel(&self, x: u32, y: u32) -> bool {
        let pos = TilePos::new(x / TILE_EDGE, y / TILE_EDGE);
        match self.grid().tile_index(pos) {
            Ok(index) => index < self.tile_count,
            Err(_) => false,
        }
    }
}

/// Copies every unique tile of `source` into a fresh canvas sized by the tier table.
pub fn compact(source: &PixelBuffer, table: &DedupTable) -> Result<CompactedAtlas, CompressError> {
    let source_grid = source.tile_grid()?;
    if source_grid != table.grid() {
        return Err(CompressError::SnapshotMismatch {
            expected: source_grid.tile_count(),
            found: table.tile_count(),
        });
    }
    let unique = table.unique_count();
    let Some((tier, size)) = canvas_for(unique) else {
        return Err(CompressError::TileCapacityExceeded {
            unique,
            limit: MAX_UNIQUE_TILES,
        });
    };
    debug!(?tier, width = size.width, height = size.height, unique, "compacted canvas selected");

    let mut pixels = PixelBuffer::filled(size.width, size.height, CANVAS_FILL);
    let target_grid = TileGrid::new(size.columns(), size.rows());
    let mut slot = 0usize;
    for (pos, record) in source_grid.positions().zip(table.records()) {
        if !record.is_unique {
            continue;
        }
        let target = target_grid.tile_pos(slot)?;
        pixels.put_tile(target, &source.tile(pos));
        slot += 1;
    }

    Ok(CompactedAtlas {
        pixels,
        tier,
        size,
        tile_count: slot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{DedupStrategy, deduplicate};

    fn striped(seed: u8) -> TileBlock {
        TileBlock::from_fn(|x, y| Rgb8::new(seed, (x * 8 + y) as u8, 0))
    }

    #[test]
    fn unique_tiles_are_packed_in_raster_order() {
        let mut source = PixelBuffer::filled(24, 8, Rgb8::PINK);
        source.put_tile(TilePos::new(0, 0), &striped(1));
        source.put_tile(TilePos::new(1, 0), &striped(1));
        source.put_tile(TilePos::new(2, 0), &striped(2));
        let table = deduplicate(&source, DedupStrategy::Sequential).unwrap();
        let compacted = compact(&source, &table).unwrap();

        assert_eq!(compacted.tile_count(), 2);
        assert_eq!(compacted.size(), CanvasSize { width: 128, height: 128 });
        assert_eq!(compacted.tile(0), Some(striped(1)));
        assert_eq!(compacted.tile(1), Some(striped(2)));
        assert_eq!(compacted.tile(2), None);
        assert_eq!(compacted.pixels().get(127, 127), CANVAS_FILL);
        assert!(compacted.is_packed_pixel(15, 7));
        assert!(!compacted.is_packed_pixel(16, 0));
        assert!(!compacted.is_packed_pixel(0, 8));
    }

    #[test]
    fn mismatched_table_is_rejected() {
        let source = PixelBuffer::filled(16, 8, Rgb8::PINK);
        let other = PixelBuffer::filled(8, 8, Rgb8::PINK);
        let table = deduplicate(&other, DedupStrategy::Sequential).unwrap();
        assert!(matches!(
            compact(&source, &table),
            Err(CompressError::SnapshotMismatch { .. })
        ));
    }
}
