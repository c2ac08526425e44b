//! Packed atlases behind one empty slot: minimized (only the tiles a map places) or combined
//! (every tile of every tileset).

use bitvec::prelude::{BitVec, Lsb0};
use model::{PixelBuffer, Rgb8, TILE_EDGE};
use tracing::debug;

use crate::{GridLayer, RemapError, check_tile_factor};

/// Raw id range `[first_gid, last_gid)` owned by one tileset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilesetRange {
    pub first_gid: u32,
    pub last_gid: u32,
}

impl TilesetRange {
    pub const fn new(first_gid: u32, last_gid: u32) -> Self {
        Self {
            first_gid,
            last_gid,
        }
    }

    pub const fn contains(self, raw: u32) -> bool {
        raw >= self.first_gid && raw < self.last_gid
    }

    pub const fn len(self) -> u32 {
        self.last_gid.saturating_sub(self.first_gid)
    }

    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Sorted set of tileset-local ids placed by a map. Local id 0 is always part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedTiles {
    bits: BitVec<usize, Lsb0>,
}

impl UsedTiles {
    pub fn collect<'a>(layers: impl IntoIterator<Item = &'a GridLayer>, range: TilesetRange) -> Self {
        let mut bits = BitVec::repeat(false, range.len().max(1) as usize);
        bits.set(0, true);
        for layer in layers {
            for &raw in layer.data() {
                if raw != 0 && range.contains(raw) {
                    bits.set((raw - range.first_gid) as usize, true);
                }
            }
        }
        Self { bits }
    }

    /// Every tile of the range, for combined atlases.
    pub fn all(range: TilesetRange) -> Self {
        Self {
            bits: BitVec::repeat(true, range.len().max(1) as usize),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    pub fn contains(&self, local: u32) -> bool {
        self.bits.get(local as usize).is_some_and(|bit| *bit)
    }

    /// Rank of `local` among the used ids.
    pub fn position(&self, local: u32) -> Option<usize> {
        if !self.contains(local) {
            return None;
        }
        Some(self.bits[..local as usize].count_ones())
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter_ones().map(|index| index as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimizedTileset {
    pub range: TilesetRange,
    pub used: UsedTiles,
    /// Used tiles of all earlier tilesets.
    pub start_tile: u32,
}

/// Per-map translation from raw ids to minimized atlas slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimizationTable {
    tilesets: Vec<MinimizedTileset>,
}

impl MinimizationTable {
    pub fn build(layers: &[GridLayer], ranges: &[TilesetRange]) -> Self {
        Self::from_used(ranges, |range| UsedTiles::collect(layers, range))
    }

    /// Table that keeps every tile; each tileset starts after all tiles of the earlier ones.
    pub fn combined(ranges: &[TilesetRange]) -> Self {
        Self::from_used(ranges, UsedTiles::all)
    }

    fn from_used(ranges: &[TilesetRange], mut used_in: impl FnMut(TilesetRange) -> UsedTiles) -> Self {
        let mut start_tile = 0u32;
        let tilesets = ranges
            .iter()
            .map(|&range| {
                let used = used_in(range);
                let tileset = MinimizedTileset {
                    range,
                    start_tile,
                    used,
                };
                start_tile += tileset.used.len() as u32;
                tileset
            })
            .collect();
        Self { tilesets }
    }

    pub fn tilesets(&self) -> &[MinimizedTileset] {
        &self.tilesets
    }

    pub fn total_used(&self) -> usize {
        self.tilesets.iter().map(|tileset| tileset.used.len()).sum()
    }

    /// Slot of raw id `raw` in the minimized atlas; slot 0 is the empty tile.
    pub fn translate(&self, raw: u32) -> Result<u32, RemapError> {
        if raw == 0 {
            return Ok(0);
        }
        let Some(tileset) = self.tilesets.iter().find(|tileset| tileset.range.contains(raw)) else {
            return Err(RemapError::UnknownTileId { raw });
        };
        let local = raw - tileset.range.first_gid;
        let Some(position) = tileset.used.position(local) else {
            return Err(RemapError::UnusedTileId { raw, local });
        };
        Ok(tileset.start_tile + position as u32 + 1)
    }
}

/// Canvas sizes by 8px tile count; the last entry whose threshold is reached wins.
const MINIMIZED_CANVAS_STEPS: [(usize, u32, u32); 7] = [
    (0, 128, 128),
    (256, 128, 256),
    (512, 256, 256),
    (1024, 256, 512),
    (2048, 512, 512),
    (4096, 512, 1024),
    (8192, 1024, 1024),
];
pub const MINIMIZED_TILE_LIMIT: usize = 16384;

pub fn minimized_canvas_size(hardware_tiles: usize) -> Option<(u32, u32)> {
    if hardware_tiles >= MINIMIZED_TILE_LIMIT {
        return None;
    }
    MINIMIZED_CANVAS_STEPS
        .iter()
        .rev()
        .find(|(threshold, _, _)| hardware_tiles >= *threshold)
        .map(|&(_, width, height)| (width, height))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimizedAtlas {
    pub pixels: PixelBuffer,
    /// Atlas width in meta-tiles.
    pub meta_columns: u32,
}

/// Copies every used meta-tile of every tileset into a fresh canvas, starting at slot 1.
///
/// `sources` holds one image per tileset of `table`, in the same order.
pub fn build_minimized_atlas(
    table: &MinimizationTable,
    sources: &[PixelBuffer],
    tile_factor: u32,
) -> Result<MinimizedAtlas, RemapError> {
    check_tile_factor(tile_factor)?;
    if sources.len() != table.tilesets().len() {
        return Err(RemapError::TilesetCountMismatch {
            expected: table.tilesets().len(),
            found: sources.len(),
        });
    }
    let meta_edge = tile_factor * TILE_EDGE;
    let slots = table.total_used() + 1;
    let hardware_tiles = slots * (tile_factor * tile_factor) as usize;
    let Some((width, height)) = minimized_canvas_size(hardware_tiles) else {
        return Err(RemapError::MinimizedAtlasOverflow {
            tiles: hardware_tiles,
            limit: MINIMIZED_TILE_LIMIT,
        });
    };
    let meta_columns = width / meta_edge;
    let meta_rows = height / meta_edge;
    if slots > meta_columns as usize * meta_rows as usize {
        return Err(RemapError::MinimizedAtlasOverflow {
            tiles: hardware_tiles,
            limit: (meta_columns * meta_rows * tile_factor * tile_factor) as usize,
        });
    }
    debug!(width, height, slots, "minimized canvas selected");

    let mut pixels = PixelBuffer::filled(width, height, Rgb8::PINK);
    let mut slot = 1u32;
    for (tileset_index, (tileset, source)) in table.tilesets().iter().zip(sources).enumerate() {
        let source_columns = source.width() / meta_edge;
        let source_rows = source.height() / meta_edge;
        for local in tileset.used.ids() {
            let Some(row) = local
                .checked_div(source_columns)
                .filter(|row| *row < source_rows)
            else {
                return Err(RemapError::TileOutsideTileset {
                    tileset: tileset_index,
                    local,
                });
            };
            let col = local % source_columns;
            let dst = (
                (slot % meta_columns) * meta_edge,
                (slot / meta_columns) * meta_edge,
            );
            pixels.copy_region(dst, source, (col * meta_edge, row * meta_edge), meta_edge);
            slot += 1;
        }
    }

    Ok(MinimizedAtlas {
        pixels,
        meta_columns,
    })
}

/// Packs every tile of every tileset behind the empty slot.
///
/// Each tileset's id range ends at its image's tile count, or at the next `first_gid` if
/// that comes first.
pub fn build_combined_atlas(
    first_gids: &[u32],
    sources: &[PixelBuffer],
    tile_factor: u32,
) -> Result<(MinimizationTable, MinimizedAtlas), RemapError> {
    check_tile_factor(tile_factor)?;
    if sources.len() != first_gids.len() {
        return Err(RemapError::TilesetCountMismatch {
            expected: first_gids.len(),
            found: sources.len(),
        });
    }
    let meta_edge = tile_factor * TILE_EDGE;
    let ranges: Vec<TilesetRange> = first_gids
        .iter()
        .zip(sources)
        .enumerate()
        .map(|(index, (&first_gid, source))| {
            let tiles = (source.width() / meta_edge) * (source.height() / meta_edge);
            let mut last_gid = first_gid + tiles;
            if let Some(&next) = first_gids.get(index + 1) {
                last_gid = last_gid.min(next);
            }
            TilesetRange::new(first_gid, last_gid)
        })
        .collect();
    let table = MinimizationTable::combined(&ranges);
    let atlas = build_minimized_atlas(&table, sources, tile_factor)?;
    Ok((table, atlas))
}
