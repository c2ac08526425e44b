use anyhow::{Context, Result};
use model::{PixelBuffer, TILE_EDGE};
use std::fs;
use std::path::{Path, PathBuf};
use tilemap::{
    GridLayer, IdTranslation, MinimizationTable, RemapConfig, build_combined_atlas,
    build_minimized_atlas, check_tile_factor, remap_layers,
};
use tiles::{CompressConfig, CompressedAtlas, DedupSnapshot, DedupStrategy};
use tracing::{info, warn};

use crate::artifacts::{self, ArtifactPaths};
use crate::config::{BuildOptions, MapEntry};
use crate::map_export::{LoadedTileset, MapExport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapStatus {
    UpToDate,
    Compiled { unique_tiles: usize, colors: usize },
}

pub fn compile_map(entry: &MapEntry, options: &BuildOptions, output_dir: &Path) -> Result<MapStatus> {
    let export = MapExport::load(&entry.export)?;
    let paths = ArtifactPaths::new(output_dir, &entry.name);
    let tileset_images: Vec<PathBuf> = export.tilesets.iter().map(|t| t.image.clone()).collect();
    let mut inputs = tileset_images.clone();
    inputs.push(entry.export.clone());

    let snapshot = read_snapshot(&paths.snapshot, options.minimize)?;
    if !options.force && snapshot.is_some() && artifacts::is_up_to_date(&inputs, &paths)? {
        info!(map = %entry.name, "artifacts up to date");
        return Ok(MapStatus::UpToDate);
    }

    let tile_factor = export.tile_factor();
    check_tile_factor(tile_factor)?;
    let layers = export.grid_layers();
    let tilesets = export.load_tilesets()?;
    let (atlas, remap_config) = prepare_atlas(&export, &layers, &tilesets, options.minimize)
        .with_context(|| format!("assemble atlas for map {}", entry.name))?;

    let compress_config = CompressConfig {
        dedup: if options.parallel_dedup {
            DedupStrategy::Parallel
        } else {
            DedupStrategy::Sequential
        },
        minimized: options.minimize,
    };
    // Direct and combined atlases depend on the tileset images only, so their table survives
    // map edits.
    let reusable = match snapshot {
        Some(snapshot) if !options.force && !options.minimize => {
            artifacts::is_up_to_date(&tileset_images, &paths)?.then_some(snapshot)
        }
        _ => None,
    };
    let compressed = compress_atlas(&atlas, reusable, &compress_config)
        .with_context(|| format!("compress atlas of map {}", entry.name))?;

    let remapped = remap_layers(&layers, &compressed.table, &remap_config)
        .with_context(|| format!("remap layers of map {}", entry.name))?;
    let indexed = compressed.palette.quantize(&compressed.atlas)?;

    fs::create_dir_all(output_dir)
        .with_context(|| format!("create output directory {}", output_dir.display()))?;
    artifacts::write_snapshot(&paths.snapshot, &compressed.snapshot(&compress_config))?;
    artifacts::write_palette_json(&paths.palette, &compressed.palette)?;
    artifacts::write_swatch_bmp(&paths.swatch, &compressed.palette)?;
    let (width, height) = (export.width * tile_factor, export.height * tile_factor);
    artifacts::write_tilemap_json(&paths.tilemap, &remapped, width, height)?;
    // Written last: its timestamp marks a complete build.
    artifacts::write_indexed_bmp(&paths.atlas, &indexed, &compressed.palette)?;

    let status = MapStatus::Compiled {
        unique_tiles: compressed.unique_count(),
        colors: compressed.palette.len(),
    };
    info!(map = %entry.name, ?status, "map compiled");
    Ok(status)
}

fn read_snapshot(path: &Path, minimize: bool) -> Result<Option<DedupSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = fs::File::open(path).with_context(|| format!("open snapshot {}", path.display()))?;
    let snapshot = match DedupSnapshot::read_json(std::io::BufReader::new(file)) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring unreadable dedup snapshot");
            return Ok(None);
        }
    };
    Ok(snapshot.is_compatible(minimize).then_some(snapshot))
}

fn compress_atlas(
    atlas: &PixelBuffer,
    snapshot: Option<DedupSnapshot>,
    config: &CompressConfig,
) -> Result<CompressedAtlas> {
    if let Some(snapshot) = snapshot {
        match tiles::compress_from_snapshot(atlas, snapshot, config) {
            Ok(compressed) => return Ok(compressed),
            Err(error) => warn!(%error, "dedup snapshot rejected, rescanning atlas"),
        }
    }
    Ok(tiles::compress(atlas, config)?)
}

/// Source atlas for the dedup pass and the matching id translation.
fn prepare_atlas(
    export: &MapExport,
    layers: &[GridLayer],
    tilesets: &[LoadedTileset],
    minimize: bool,
) -> Result<(PixelBuffer, RemapConfig)> {
    let tile_factor = export.tile_factor();
    if minimize {
        let ranges = export.tileset_ranges(tilesets);
        let table = MinimizationTable::build(layers, &ranges);
        let sources: Vec<PixelBuffer> = tilesets.iter().map(|t| t.pixels.clone()).collect();
        let minimized = build_minimized_atlas(&table, &sources, tile_factor)?;
        info!(
            used = table.total_used(),
            width = minimized.pixels.width(),
            height = minimized.pixels.height(),
            "minimized atlas assembled"
        );
        let config = RemapConfig {
            tile_factor,
            atlas_meta_columns: minimized.meta_columns,
            translation: IdTranslation::Minimized(table),
        };
        return Ok((minimized.pixels, config));
    }

    let [tileset] = tilesets else {
        let first_gids: Vec<u32> = tilesets.iter().map(|t| t.first_gid).collect();
        let sources: Vec<PixelBuffer> = tilesets.iter().map(|t| t.pixels.clone()).collect();
        let (table, combined) = build_combined_atlas(&first_gids, &sources, tile_factor)?;
        info!(
            tiles = table.total_used(),
            width = combined.pixels.width(),
            height = combined.pixels.height(),
            "combined atlas assembled"
        );
        let config = RemapConfig {
            tile_factor,
            atlas_meta_columns: combined.meta_columns,
            translation: IdTranslation::Combined(table),
        };
        return Ok((combined.pixels, config));
    };
    let meta_edge = tile_factor * TILE_EDGE;
    if tileset.pixels.width() % meta_edge != 0 || tileset.pixels.height() % meta_edge != 0 {
        return Err(anyhow::anyhow!(
            "tileset {} is not a whole number of {meta_edge}px tiles",
            tileset.path.display()
        ));
    }
    let config = RemapConfig {
        tile_factor,
        atlas_meta_columns: tileset.pixels.width() / meta_edge,
        translation: IdTranslation::Direct {
            first_gid: tileset.first_gid,
        },
    };
    Ok((tileset.pixels.clone(), config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use serde_json::Value;

    const PINK: Rgb<u8> = Rgb([255, 0, 255]);

    /// 4x2 sheet of 8px tiles: pink, pattern, mirrored pattern, solid green, then pink.
    fn write_fixture(dir: &Path) -> MapEntry {
        let mut sheet = RgbImage::from_pixel(32, 16, PINK);
        for y in 0..8 {
            for x in 0..8 {
                let pattern = Rgb([x as u8 * 30, y as u8 * 30, 7]);
                sheet.put_pixel(8 + x, y, pattern);
                sheet.put_pixel(16 + (7 - x), y, pattern);
                sheet.put_pixel(24 + x, y, Rgb([10, 200, 10]));
            }
        }
        sheet.save(dir.join("sheet.png")).unwrap();
        fs::write(
            dir.join("town.json"),
            r#"{
                "width": 2, "height": 2, "tile_size": 8,
                "tilesets": [{"first_gid": 1, "image": "sheet.png"}],
                "layers": [{"name": "ground", "data": [1, 2, 3, 4]}]
            }"#,
        )
        .unwrap();
        MapEntry {
            name: "town".to_string(),
            export: dir.join("town.json"),
        }
    }

    fn layer_codes(output: &Path) -> Vec<u64> {
        let text = fs::read_to_string(output.join("town.tilemap.json")).unwrap();
        let document: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(document["width"], 2);
        assert_eq!(document["height"], 2);
        document["layers"][0]["codes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|code| code.as_u64().unwrap())
            .collect()
    }

    #[test]
    fn direct_build_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_fixture(dir.path());
        let output = dir.path().join("out");
        let options = BuildOptions {
            minimize: false,
            ..BuildOptions::default()
        };

        let status = compile_map(&entry, &options, &output).unwrap();
        assert_eq!(
            status,
            MapStatus::Compiled {
                unique_tiles: 3,
                colors: 66
            }
        );
        for path in ArtifactPaths::new(&output, "town").all() {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert_eq!(layer_codes(&output), vec![0, 1, 1 | 1024, 2]);

        let palette: Value =
            serde_json::from_str(&fs::read_to_string(output.join("town_palette.json")).unwrap())
                .unwrap();
        assert_eq!(palette["bpp_mode"], "bpp_8");
        assert_eq!(palette["colors"][0], serde_json::json!([255, 0, 255]));
    }

    #[test]
    fn minimized_build_yields_the_same_codes() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_fixture(dir.path());
        let output = dir.path().join("out");
        compile_map(&entry, &BuildOptions::default(), &output).unwrap();
        assert_eq!(layer_codes(&output), vec![0, 1, 1 | 1024, 2]);

        let snapshot = DedupSnapshot::read_json(
            fs::File::open(output.join("town.dedup.json")).unwrap(),
        )
        .unwrap();
        assert!(snapshot.minimized);
        assert_eq!(snapshot.compacted_width, 128);
    }

    #[test]
    fn second_run_is_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_fixture(dir.path());
        let output = dir.path().join("out");
        let options = BuildOptions::default();
        compile_map(&entry, &options, &output).unwrap();
        assert_eq!(
            compile_map(&entry, &options, &output).unwrap(),
            MapStatus::UpToDate
        );

        let forced = BuildOptions {
            force: true,
            ..options
        };
        assert!(matches!(
            compile_map(&entry, &forced, &output).unwrap(),
            MapStatus::Compiled { .. }
        ));
    }

    #[test]
    fn switching_minimization_invalidates_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_fixture(dir.path());
        let output = dir.path().join("out");
        compile_map(&entry, &BuildOptions::default(), &output).unwrap();
        let direct = BuildOptions {
            minimize: false,
            ..BuildOptions::default()
        };
        assert!(matches!(
            compile_map(&entry, &direct, &output).unwrap(),
            MapStatus::Compiled { .. }
        ));
    }

    #[test]
    fn several_tilesets_compile_into_a_combined_atlas() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_fixture(dir.path());
        fs::write(
            &entry.export,
            r#"{
                "width": 2, "height": 2, "tile_size": 8,
                "tilesets": [
                    {"first_gid": 1, "image": "sheet.png"},
                    {"first_gid": 9, "image": "sheet.png"}
                ],
                "layers": [{"name": "ground", "data": [2, 10, 11, 12]}]
            }"#,
        )
        .unwrap();
        let output = dir.path().join("out");
        let direct = BuildOptions {
            minimize: false,
            ..BuildOptions::default()
        };
        let status = compile_map(&entry, &direct, &output).unwrap();
        assert!(matches!(status, MapStatus::Compiled { unique_tiles: 3, .. }));
        // The second tileset repeats the first, so its tiles fold onto the same indices.
        assert_eq!(layer_codes(&output), vec![1, 1, 1 | 1024, 2]);
    }
}
