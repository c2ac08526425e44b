use anyhow::{Context, Result};
use image::ExtendedColorType;
use image::codecs::bmp::BmpEncoder;
use serde::Serialize;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tilemap::LayerCodes;
use tiles::{DedupSnapshot, IndexedImage, PaletteTable};

/// Output files of one map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub atlas: PathBuf,
    pub palette: PathBuf,
    pub swatch: PathBuf,
    pub tilemap: PathBuf,
    pub snapshot: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path, map_name: &str) -> Self {
        Self {
            atlas: output_dir.join(format!("{map_name}.bmp")),
            palette: output_dir.join(format!("{map_name}_palette.json")),
            swatch: output_dir.join(format!("{map_name}_palette.bmp")),
            tilemap: output_dir.join(format!("{map_name}.tilemap.json")),
            snapshot: output_dir.join(format!("{map_name}.dedup.json")),
        }
    }

    pub fn all(&self) -> [&Path; 5] {
        [
            self.atlas.as_path(),
            self.palette.as_path(),
            self.swatch.as_path(),
            self.tilemap.as_path(),
            self.snapshot.as_path(),
        ]
    }
}

#[derive(Debug, Serialize)]
struct PaletteDocument {
    bpp_mode: &'static str,
    colors: Vec<[u8; 3]>,
    swatch: [u32; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pink_substitute: Option<[u8; 3]>,
}

#[derive(Debug, Serialize)]
struct TilemapDocument<'a> {
    layers: &'a [LayerCodes],
    width: u32,
    height: u32,
}

/// Generated atlas is newer than every input and all outputs exist.
pub fn is_up_to_date(inputs: &[PathBuf], paths: &ArtifactPaths) -> Result<bool> {
    if paths.all().iter().any(|path| !path.exists()) {
        return Ok(false);
    }
    let built = modified(&paths.atlas)?;
    for input in inputs {
        if modified(input)? > built {
            return Ok(false);
        }
    }
    Ok(true)
}

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .with_context(|| format!("read modification time of {}", path.display()))
}

pub fn write_indexed_bmp(path: &Path, image: &IndexedImage, palette: &PaletteTable) -> Result<()> {
    let colors: Vec<[u8; 3]> = palette.colors().iter().map(|color| color.0).collect();
    write_bmp(path, &image.indices, image.width, image.height, &colors)
}

/// One pixel per palette entry, row-major, padded with slot 0.
pub fn write_swatch_bmp(path: &Path, palette: &PaletteTable) -> Result<()> {
    let (width, height) = palette.swatch_size();
    let indices: Vec<u8> = (0..width * height)
        .map(|index| {
            if (index as usize) < palette.len() {
                index as u8
            } else {
                0
            }
        })
        .collect();
    let colors: Vec<[u8; 3]> = palette.colors().iter().map(|color| color.0).collect();
    write_bmp(path, &indices, width, height, &colors)
}

fn write_bmp(path: &Path, indices: &[u8], width: u32, height: u32, colors: &[[u8; 3]]) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("create bitmap {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    BmpEncoder::new(&mut writer)
        .encode_with_palette(indices, width, height, ExtendedColorType::L8, Some(colors))
        .with_context(|| format!("encode bitmap {}", path.display()))?;
    Ok(())
}

pub fn write_palette_json(path: &Path, palette: &PaletteTable) -> Result<()> {
    let (width, height) = palette.swatch_size();
    let document = PaletteDocument {
        bpp_mode: palette.bit_depth().as_str(),
        colors: palette.colors().iter().map(|color| color.0).collect(),
        swatch: [width, height],
        pink_substitute: palette.pink_substitute().map(|color| color.0),
    };
    write_json(path, &document)
}

pub fn write_tilemap_json(path: &Path, layers: &[LayerCodes], width: u32, height: u32) -> Result<()> {
    write_json(
        path,
        &TilemapDocument {
            layers,
            width,
            height,
        },
    )
}

pub fn write_snapshot(path: &Path, snapshot: &DedupSnapshot) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("create snapshot {}", path.display()))?;
    snapshot
        .write_json(BufWriter::new(file))
        .with_context(|| format!("write snapshot {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("serialize {}", path.display()))?;
    Ok(())
}
