use anyhow::{Context, Result};
use model::{PixelBuffer, RgbaBuffer, TILE_EDGE};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tilemap::{GridLayer, TilesetRange, unify_transparency};

/// Pre-parsed map as exported from the level editor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapExport {
    /// Size in map cells.
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub tilesets: Vec<TilesetExport>,
    pub layers: Vec<LayerExport>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TilesetExport {
    pub first_gid: u32,
    /// Tileset image relative to the export file.
    pub image: PathBuf,
    #[serde(default)]
    pub tile_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayerExport {
    pub name: String,
    pub data: Vec<u32>,
}

/// Tileset image decoded to RGB, its background already folded into pink.
#[derive(Debug, Clone)]
pub struct LoadedTileset {
    pub first_gid: u32,
    pub path: PathBuf,
    pub pixels: PixelBuffer,
}

impl MapExport {
    pub fn parse(text: &str) -> Result<Self> {
        let export: MapExport = serde_json::from_str(text).context("parse map export json")?;
        export.validate()?;
        Ok(export)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read map export {}", path.display()))?;
        let mut export =
            Self::parse(&text).with_context(|| format!("load map export {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));
        for tileset in &mut export.tilesets {
            tileset.image = base.join(&tileset.image);
        }
        Ok(export)
    }

    fn validate(&self) -> Result<()> {
        if self.tile_size == 0 || self.tile_size % TILE_EDGE != 0 {
            return Err(anyhow::anyhow!(
                "tile size {} is not a multiple of {TILE_EDGE}",
                self.tile_size
            ));
        }
        if self.tilesets.is_empty() {
            return Err(anyhow::anyhow!("map references no tileset"));
        }
        for tileset in &self.tilesets {
            if let Some(size) = tileset.tile_size
                && size != self.tile_size
            {
                return Err(anyhow::anyhow!(
                    "tileset {} uses {size}px tiles, the map uses {}px",
                    tileset.image.display(),
                    self.tile_size
                ));
            }
        }
        if self
            .tilesets
            .windows(2)
            .any(|pair| pair[0].first_gid >= pair[1].first_gid)
        {
            return Err(anyhow::anyhow!("tileset first_gid values must increase"));
        }
        Ok(())
    }

    pub const fn tile_factor(&self) -> u32 {
        self.tile_size / TILE_EDGE
    }

    pub fn grid_layers(&self) -> Vec<GridLayer> {
        self.layers
            .iter()
            .map(|layer| GridLayer::new(layer.name.clone(), self.width, self.height, layer.data.clone()))
            .collect()
    }

    pub fn load_tilesets(&self) -> Result<Vec<LoadedTileset>> {
        self.tilesets
            .iter()
            .map(|tileset| {
                let source = load_rgba(&tileset.image)?;
                Ok(LoadedTileset {
                    first_gid: tileset.first_gid,
                    path: tileset.image.clone(),
                    pixels: unify_transparency(&source, self.tile_size),
                })
            })
            .collect()
    }

    /// Raw id ranges; the last tileset ends after its image's tile count.
    pub fn tileset_ranges(&self, loaded: &[LoadedTileset]) -> Vec<TilesetRange> {
        loaded
            .iter()
            .enumerate()
            .map(|(index, tileset)| {
                let last_gid = match loaded.get(index + 1) {
                    Some(next) => next.first_gid,
                    None => {
                        let columns = tileset.pixels.width() / self.tile_size;
                        let rows = tileset.pixels.height() / self.tile_size;
                        tileset.first_gid + columns * rows
                    }
                };
                TilesetRange::new(tileset.first_gid, last_gid)
            })
            .collect()
    }
}

pub fn load_rgba(path: &Path) -> Result<RgbaBuffer> {
    let decoded = image::ImageReader::open(path)
        .with_context(|| format!("open image {}", path.display()))?
        .decode()
        .with_context(|| format!("decode image {}", path.display()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    RgbaBuffer::from_rgba_bytes(width, height, decoded.as_raw())
        .with_context(|| format!("decoded image {} has a truncated pixel buffer", path.display()))
}
