//! Hardware tilemap layout.
//!
//! Every 8x8 cell of a map layer is resolved to a [`HardwareCode`]: the raw id of the meta-tile
//! covering the cell is translated to an atlas tile, the cell's sub-tile inside that meta-tile is
//! located in the source atlas, and the dedup table turns that position into a compacted index
//! plus flip bits. Codes are emitted in the order the hardware stores them (see [`cursor`]).

use serde::Serialize;
use static_assertions::const_assert;
use thiserror::Error;
use tiles::{DedupTable, MAX_UNIQUE_TILES};
use tracing::{debug, info};

pub mod cursor;
mod minimize;
mod transparency;

pub use cursor::{LayerCursor, SCREENBLOCK_EDGE, ScreenblockCursor, TraversalOrder};
pub use minimize::{
    MINIMIZED_TILE_LIMIT, MinimizationTable, MinimizedAtlas, MinimizedTileset, TilesetRange,
    UsedTiles, build_combined_atlas, build_minimized_atlas, minimized_canvas_size,
};
pub use transparency::{
    PINK_STAND_IN, find_uniform_tile, transparency_color, unify_transparency,
};

pub const H_FLIP: u16 = 1024;
pub const V_FLIP: u16 = 2048;
const INDEX_MASK: u16 = H_FLIP - 1;
pub const SUPPORTED_TILE_FACTORS: [u32; 4] = [1, 2, 4, 8];

const_assert!(MAX_UNIQUE_TILES <= INDEX_MASK as usize + 1);
const_assert!(H_FLIP & V_FLIP == 0);

#[derive(Debug, Error)]
pub enum RemapError {
    #[error("layer {layer:?} holds {found} cells, its size needs {expected}")]
    LayerShape {
        layer: String,
        expected: usize,
        found: usize,
    },
    #[error("tile factor {factor} is not one of 1, 2, 4, 8")]
    UnsupportedTileFactor { factor: u32 },
    #[error("raw tile id {raw} belongs to no tileset")]
    UnknownTileId { raw: u32 },
    #[error("raw tile id {raw} (local {local}) is missing from the used-tiles list")]
    UnusedTileId { raw: u32, local: u32 },
    #[error("cell ({x}, {y}) resolves to atlas tile {real_id}, the atlas has {tile_count}")]
    CellOutOfAtlas {
        x: u32,
        y: u32,
        real_id: usize,
        tile_count: usize,
    },
    #[error(
        "atlas is {atlas_columns} tiles wide, expected {meta_columns} meta-tiles of factor {tile_factor}"
    )]
    AtlasWidthMismatch {
        meta_columns: u32,
        tile_factor: u32,
        atlas_columns: u32,
    },
    #[error("compacted index {index} does not fit below the flip bits")]
    CodeOverflow { index: u32 },
    #[error("minimized atlas needs {tiles} tiles, at most {limit} fit")]
    MinimizedAtlasOverflow { tiles: usize, limit: usize },
    #[error("{found} tileset images for {expected} tilesets")]
    TilesetCountMismatch { expected: usize, found: usize },
    #[error("used tile {local} lies outside the image of tileset {tileset}")]
    TileOutsideTileset { tileset: usize, local: u32 },
}

/// Tile index with the hardware's flip bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HardwareCode(u16);

impl HardwareCode {
    pub fn new(index: u32, h_flip: bool, v_flip: bool) -> Result<Self, RemapError> {
        let Some(index16) = u16::try_from(index).ok().filter(|value| *value <= INDEX_MASK) else {
            return Err(RemapError::CodeOverflow { index });
        };
        let mut code = index16;
        if h_flip {
            code |= H_FLIP;
        }
        if v_flip {
            code |= V_FLIP;
        }
        Ok(Self(code))
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn index(self) -> u16 {
        self.0 & INDEX_MASK
    }

    pub const fn h_flip(self) -> bool {
        self.0 & H_FLIP != 0
    }

    pub const fn v_flip(self) -> bool {
        self.0 & V_FLIP != 0
    }
}

/// One map layer: a raw tile id per map cell, row-major. Map cells are `tile_factor` hardware
/// tiles wide and high.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLayer {
    name: String,
    columns: u32,
    rows: u32,
    data: Vec<u32>,
}

impl GridLayer {
    pub fn new(name: impl Into<String>, columns: u32, rows: u32, data: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn columns(&self) -> u32 {
        self.columns
    }

    pub const fn rows(&self) -> u32 {
        self.rows
    }

    pub fn data(&self) -> &[u32] {
        &self.data
    }

    /// Size in hardware tiles.
    pub const fn hardware_size(&self, tile_factor: u32) -> (u32, u32) {
        (self.columns * tile_factor, self.rows * tile_factor)
    }
}

/// Hardware codes of one layer in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerCodes {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub codes: Vec<HardwareCode>,
}

/// How raw map ids become meta-tile indices in the atlas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdTranslation {
    /// The atlas is the tileset image itself.
    Direct { first_gid: u32 },
    /// The atlas was assembled from used tiles only.
    Minimized(MinimizationTable),
    /// The atlas holds every tile of several tilesets, see [`build_combined_atlas`].
    Combined(MinimizationTable),
}

impl IdTranslation {
    pub fn translate(&self, raw: u32) -> Result<u32, RemapError> {
        match self {
            IdTranslation::Direct { .. } if raw == 0 => Ok(0),
            IdTranslation::Direct { first_gid } => raw
                .checked_sub(*first_gid)
                .ok_or(RemapError::UnknownTileId { raw }),
            IdTranslation::Minimized(table) | IdTranslation::Combined(table) => {
                table.translate(raw)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapConfig {
    pub tile_factor: u32,
    /// Atlas width in meta-tiles.
    pub atlas_meta_columns: u32,
    pub translation: IdTranslation,
}

pub fn check_tile_factor(tile_factor: u32) -> Result<(), RemapError> {
    if SUPPORTED_TILE_FACTORS.contains(&tile_factor) {
        Ok(())
    } else {
        Err(RemapError::UnsupportedTileFactor {
            factor: tile_factor,
        })
    }
}

pub fn remap_layer(
    layer: &GridLayer,
    table: &DedupTable,
    config: &RemapConfig,
) -> Result<LayerCodes, RemapError> {
    let factor = config.tile_factor;
    check_tile_factor(factor)?;
    let expected = layer.columns as usize * layer.rows as usize;
    if layer.data.len() != expected {
        return Err(RemapError::LayerShape {
            layer: layer.name.clone(),
            expected,
            found: layer.data.len(),
        });
    }
    let atlas_columns = table.grid().columns();
    if config.atlas_meta_columns == 0 || config.atlas_meta_columns * factor != atlas_columns {
        return Err(RemapError::AtlasWidthMismatch {
            meta_columns: config.atlas_meta_columns,
            tile_factor: factor,
            atlas_columns,
        });
    }

    let (width, height) = layer.hardware_size(factor);
    let order = TraversalOrder::for_layer(width, height);
    debug!(layer = layer.name(), width, height, ?order, "remapping layer");

    let cursor = order.cursor(width, height);
    let mut codes = Vec::with_capacity(cursor.len());
    for position in cursor {
        codes.push(resolve_cell(layer, table, config, position)?);
    }
    Ok(LayerCodes {
        name: layer.name.clone(),
        width,
        height,
        codes,
    })
}

pub fn remap_layers(
    layers: &[GridLayer],
    table: &DedupTable,
    config: &RemapConfig,
) -> Result<Vec<LayerCodes>, RemapError> {
    let remapped = layers
        .iter()
        .map(|layer| remap_layer(layer, table, config))
        .collect::<Result<Vec<_>, _>>()?;
    info!(layers = remapped.len(), "tilemap layers remapped");
    Ok(remapped)
}

fn resolve_cell(
    layer: &GridLayer,
    table: &DedupTable,
    config: &RemapConfig,
    position: usize,
) -> Result<HardwareCode, RemapError> {
    let factor = config.tile_factor as usize;
    let width = layer.columns as usize * factor;
    let x = position % width;
    let y = position / width;
    let base_id = x / factor + (y / factor) * layer.columns as usize;
    let tile_id = config.translation.translate(layer.data[base_id])? as usize;

    let meta_columns = config.atlas_meta_columns as usize;
    let real_id = (tile_id % meta_columns) * factor
        + (tile_id / meta_columns) * meta_columns * factor * factor
        + (y % factor) * meta_columns * factor
        + x % factor;
    let Ok((compacted, record)) = table.resolve(real_id) else {
        return Err(RemapError::CellOutOfAtlas {
            x: x as u32,
            y: y as u32,
            real_id,
            tile_count: table.tile_count(),
        });
    };
    HardwareCode::new(compacted, record.h_flip, record.v_flip)
}
