//! Deduplication, compaction and palette extraction for 8x8 tile atlases.
//!
//! [`compress`] runs the whole pipeline over an in-memory atlas: pairwise classification of
//! every tile ([`deduplicate`]), packing of the unique tiles into a capacity-tiered canvas
//! ([`compact`]) and palette derivation ([`extract_palette`]). Nothing here touches the
//! filesystem; the caller decides where snapshots and images are stored.

use model::{PixelBuffer, PixelFormatError, Rgb8, TileGridError, TilePos};
use thiserror::Error;
use tracing::{info, warn};

mod atlas;
mod dedup;
mod palette;
mod snapshot;
mod transform;

pub use atlas::{
    CANVAS_FILL, CanvasSize, CanvasTier, CompactedAtlas, MAX_UNIQUE_TILES, canvas_for, compact,
};
pub use dedup::{DedupRecord, DedupStrategy, DedupTable, deduplicate};
pub use palette::{
    BPP4_MAX_COLORS, BitDepth, IndexedImage, MAX_PALETTE_COLORS, PINK_SUBSTITUTES, PaletteTable,
    extract_palette,
};
pub use snapshot::DedupSnapshot;
pub use transform::{TRANSFORM_PRIORITY, Transform, tiles_match};

#[derive(Debug, Error)]
pub enum CompressError {
    #[error(transparent)]
    PixelFormat(#[from] PixelFormatError),
    #[error(transparent)]
    Grid(#[from] TileGridError),
    #[error("atlas has {unique} unique tiles, the compacted canvas holds at most {limit}")]
    TileCapacityExceeded { unique: usize, limit: usize },
    #[error("compacted atlas uses {found} colors, the palette holds at most {limit}")]
    PaletteCapacityExceeded { found: usize, limit: usize },
    #[error(
        "opaque pink at ({x}, {y}) cannot be told apart from transparent color {transparent:?}: every substitute color is already in use"
    )]
    TransparencyAmbiguity { x: u32, y: u32, transparent: Rgb8 },
    #[error("pixel ({x}, {y}) has color {color:?} which is not in the palette")]
    ColorNotInPalette { x: u32, y: u32, color: Rgb8 },
    #[error("dedup table covers {found} entries, atlas expects {expected}")]
    SnapshotMismatch { expected: usize, found: usize },
    #[error("tile {index} names canonical {canonical:?} which is not an earlier unique tile")]
    InvalidCanonical { index: usize, canonical: TilePos },
    #[error("tile {index} records {found} earlier duplicates, expected {expected}")]
    InvalidDuplicateCount {
        index: usize,
        expected: u32,
        found: u32,
    },
    #[error("dedup snapshot was taken with minimized={stored}, current build uses minimized={requested}")]
    SnapshotStale { stored: bool, requested: bool },
    #[error("dedup snapshot codec failed")]
    Snapshot(#[from] serde_json::Error),
}

/// Engine settings, fixed for one compression run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressConfig {
    pub dedup: DedupStrategy,
    /// Whether the source atlas was assembled from used tiles only; stored in snapshots.
    pub minimized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedAtlas {
    pub table: DedupTable,
    pub atlas: CompactedAtlas,
    pub palette: PaletteTable,
}

impl CompressedAtlas {
    pub fn snapshot(&self, config: &CompressConfig) -> DedupSnapshot {
        DedupSnapshot::new(&self.table, self.atlas.size().width, config.minimized)
    }

    pub fn unique_count(&self) -> usize {
        self.table.unique_count()
    }
}

/// Result of compressing an atlas shared by several maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressOutcome {
    Compressed(CompressedAtlas),
    /// Too many unique tiles for one shared atlas; each map needs its own.
    CapacityFallback { unique: usize },
}

pub fn compress(
    source: &PixelBuffer,
    config: &CompressConfig,
) -> Result<CompressedAtlas, CompressError> {
    let table = deduplicate(source, config.dedup)?;
    info!(
        tiles = table.tile_count(),
        unique = table.unique_count(),
        "found {} unique tiles",
        table.unique_count()
    );
    finish(source, table)
}

/// Like [`compress`], but reports an over-capacity atlas as [`CompressOutcome::CapacityFallback`].
pub fn compress_consolidated(
    source: &PixelBuffer,
    config: &CompressConfig,
) -> Result<CompressOutcome, CompressError> {
    match compress(source, config) {
        Ok(compressed) => Ok(CompressOutcome::Compressed(compressed)),
        Err(CompressError::TileCapacityExceeded { unique, limit }) => {
            warn!(unique, limit, "consolidated atlas over capacity, falling back to per-map atlases");
            Ok(CompressOutcome::CapacityFallback { unique })
        }
        Err(err) => Err(err),
    }
}

/// Compresses `source` with a dedup table restored from an earlier run instead of rescanning.
pub fn compress_from_snapshot(
    source: &PixelBuffer,
    snapshot: DedupSnapshot,
    config: &CompressConfig,
) -> Result<CompressedAtlas, CompressError> {
    if !snapshot.is_compatible(config.minimized) {
        return Err(CompressError::SnapshotStale {
            stored: snapshot.minimized,
            requested: config.minimized,
        });
    }
    let compacted_width = snapshot.compacted_width;
    let table = snapshot.into_table(source.tile_grid()?)?;
    let compressed = finish(source, table)?;
    let width = compressed.atlas.size().width;
    if width != compacted_width {
        return Err(CompressError::SnapshotMismatch {
            expected: width as usize,
            found: compacted_width as usize,
        });
    }
    info!(unique = compressed.unique_count(), "reused dedup snapshot");
    Ok(compressed)
}

fn finish(source: &PixelBuffer, table: DedupTable) -> Result<CompressedAtlas, CompressError> {
    let atlas = compact(source, &table)?;
    let palette = extract_palette(&atlas)?;
    info!(
        colors = palette.len(),
        bit_depth = palette.bit_depth().bits(),
        width = atlas.size().width,
        height = atlas.size().height,
        "atlas compressed"
    );
    Ok(CompressedAtlas {
        table,
        atlas,
        palette,
    })
}
