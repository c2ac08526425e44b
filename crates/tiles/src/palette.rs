//! Indexed palette derived from a compacted atlas.
//!
//! Slot 0 is the hardware's transparent index and always holds pink `(255, 0, 255)`. The color
//! sampled at the canvas origin is treated as the atlas's transparent color and maps to slot 0.
//! When that color is not pink but pink is also drawn inside a tile, the drawn pink is moved to
//! the first free substitute of [`PINK_SUBSTITUTES`]; if all of them are taken the atlas is
//! rejected with [`CompressError::TransparencyAmbiguity`].

use std::collections::HashSet;

use model::Rgb8;
use tracing::warn;

use crate::CompressError;
use crate::atlas::CompactedAtlas;

pub const MAX_PALETTE_COLORS: usize = 256;
pub const BPP4_MAX_COLORS: usize = 16;
pub const PINK_SUBSTITUTES: [Rgb8; 3] = [
    Rgb8::new(255, 0, 254),
    Rgb8::new(254, 0, 255),
    Rgb8::new(255, 1, 255),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Bpp4,
    Bpp8,
}

impl BitDepth {
    pub const fn for_color_count(count: usize) -> Self {
        if count <= BPP4_MAX_COLORS {
            BitDepth::Bpp4
        } else {
            BitDepth::Bpp8
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            BitDepth::Bpp4 => 4,
            BitDepth::Bpp8 => 8,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            BitDepth::Bpp4 => "bpp_4",
            BitDepth::Bpp8 => "bpp_8",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteTable {
    // colors[0] == Rgb8::PINK, colors.len() <= MAX_PALETTE_COLORS
    colors: Vec<Rgb8>,
    bit_depth: BitDepth,
    transparent_source: Rgb8,
    pink_substitute: Option<Rgb8>,
}

/// 8-bit palette indices for every canvas pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    pub width: u32,
    pub height: u32,
    pub indices: Vec<u8>,
}

impl PaletteTable {
    pub fn colors(&self) -> &[Rgb8] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub const fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    /// Atlas color that was folded into slot 0.
    pub const fn transparent_source(&self) -> Rgb8 {
        self.transparent_source
    }

    pub const fn pink_substitute(&self) -> Option<Rgb8> {
        self.pink_substitute
    }

    /// Swatch image size used when the palette is exported as a bitmap.
    pub fn swatch_size(&self) -> (u32, u32) {
        match self.colors.len() {
            0..=64 => (8, 8),
            65..=128 => (16, 8),
            _ => (16, 16),
        }
    }

    /// Palette index of an atlas pixel color.
    pub fn index_of(&self, color: Rgb8) -> Option<u8> {
        if color == self.transparent_source {
            return Some(0);
        }
        let lookup = match self.pink_substitute {
            Some(substitute) if color == Rgb8::PINK => substitute,
            _ => color,
        };
        self.colors
            .iter()
            .skip(1)
            .position(|entry| *entry == lookup)
            .map(|position| (position + 1) as u8)
    }

    /// Maps every canvas pixel to its palette index; canvas fill maps to slot 0.
    pub fn quantize(&self, atlas: &CompactedAtlas) -> Result<IndexedImage, CompressError> {
        let pixels = atlas.pixels();
        let mut indices = Vec::with_capacity(pixels.pixels().len());
        for y in 0..pixels.height() {
            for x in 0..pixels.width() {
                if !atlas.is_packed_pixel(x, y) {
                    indices.push(0);
                    continue;
                }
                let color = pixels.get(x, y);
                let Some(index) = self.index_of(color) else {
                    return Err(CompressError::ColorNotInPalette { x, y, color });
                };
                indices.push(index);
            }
        }
        Ok(IndexedImage {
            width: pixels.width(),
            height: pixels.height(),
            indices,
        })
    }
}

/// Builds the palette of `atlas` in first-seen raster order.
pub fn extract_palette(atlas: &CompactedAtlas) -> Result<PaletteTable, CompressError> {
    let pixels = atlas.pixels();
    let transparent_source = pixels.get(0, 0);

    let mut seen = vec![transparent_source];
    let mut members: HashSet<Rgb8> = HashSet::from([transparent_source]);
    let mut first_pink = None;
    for y in 0..pixels.height() {
        for x in 0..pixels.width() {
            if !atlas.is_packed_pixel(x, y) {
                continue;
            }
            let color = pixels.get(x, y);
            if color == Rgb8::PINK && color != transparent_source && first_pink.is_none() {
                first_pink = Some((x, y));
            }
            if members.insert(color) {
                seen.push(color);
            }
        }
    }

    let pink_substitute = match first_pink {
        None => None,
        Some((x, y)) => {
            let Some(substitute) = PINK_SUBSTITUTES
                .into_iter()
                .find(|candidate| !members.contains(candidate))
            else {
                return Err(CompressError::TransparencyAmbiguity {
                    x,
                    y,
                    transparent: transparent_source,
                });
            };
            warn!(
                x,
                y,
                substitute = ?substitute,
                "opaque pink collides with the transparent slot, substituting"
            );
            Some(substitute)
        }
    };

    if seen.len() > MAX_PALETTE_COLORS {
        return Err(CompressError::PaletteCapacityExceeded {
            found: seen.len(),
            limit: MAX_PALETTE_COLORS,
        });
    }

    let colors: Vec<Rgb8> = seen
        .into_iter()
        .enumerate()
        .map(|(index, color)| match (index, pink_substitute) {
            (0, _) => Rgb8::PINK,
            (_, Some(substitute)) if color == Rgb8::PINK => substitute,
            _ => color,
        })
        .collect();
    let bit_depth = BitDepth::for_color_count(colors.len());

    Ok(PaletteTable {
        colors,
        bit_depth,
        transparent_source,
        pink_substitute,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::compact;
    use crate::dedup::{DedupStrategy, deduplicate};
    use model::{PixelBuffer, TileBlock, TilePos};

    const BLACK: Rgb8 = Rgb8::new(0, 0, 0);

    /// Atlas of `colors.len()` tiles, each tile a solid color except pixel (0,0) which is `BLACK`.
    fn compacted_with(colors: &[Rgb8]) -> CompactedAtlas {
        let columns = colors.len() as u32;
        let mut source = PixelBuffer::filled(columns * 8, 8, BLACK);
        for (col, color) in colors.iter().enumerate() {
            let mut block = TileBlock::filled(*color);
            block.set(0, 0, BLACK);
            source.put_tile(TilePos::new(col as u32, 0), &block);
        }
        let table = deduplicate(&source, DedupStrategy::Sequential).unwrap();
        compact(&source, &table).unwrap()
    }

    fn distinct(count: usize) -> Vec<Rgb8> {
        (1..=count).map(|i| Rgb8::new(i as u8, 7, 9)).collect()
    }

    #[test]
    fn slot_zero_is_pink_and_order_is_first_seen() {
        let colors = [Rgb8::new(10, 0, 0), Rgb8::new(0, 10, 0)];
        let palette = extract_palette(&compacted_with(&colors)).unwrap();
        assert_eq!(
            palette.colors(),
            &[Rgb8::PINK, Rgb8::new(10, 0, 0), Rgb8::new(0, 10, 0)]
        );
        assert_eq!(palette.transparent_source(), BLACK);
        assert_eq!(palette.index_of(BLACK), Some(0));
        assert_eq!(palette.index_of(Rgb8::new(0, 10, 0)), Some(2));
    }

    #[test]
    fn sixteen_colors_stay_four_bit() {
        // 15 tile colors + the black origin color.
        let palette = extract_palette(&compacted_with(&distinct(15))).unwrap();
        assert_eq!(palette.len(), 16);
        assert_eq!(palette.bit_depth(), BitDepth::Bpp4);
    }

    #[test]
    fn seventeen_colors_need_eight_bits() {
        let palette = extract_palette(&compacted_with(&distinct(16))).unwrap();
        assert_eq!(palette.len(), 17);
        assert_eq!(palette.bit_depth(), BitDepth::Bpp8);
        assert_eq!(palette.colors()[0], Rgb8::PINK);
    }

    #[test]
    fn too_many_colors_report_the_count() {
        let mut source = PixelBuffer::filled(128, 8, BLACK);
        let mut next = 0u32;
        for y in 0..8 {
            for x in 1..128 {
                next += 1;
                source.set(x, y, Rgb8::new((next % 256) as u8, (next / 256) as u8, 1));
            }
        }
        let table = deduplicate(&source, DedupStrategy::Sequential).unwrap();
        let compacted = compact(&source, &table).unwrap();
        let err = extract_palette(&compacted).unwrap_err();
        assert!(matches!(
            err,
            CompressError::PaletteCapacityExceeded { found: 1017, limit: 256 }
        ));
    }

    #[test]
    fn opaque_pink_is_substituted() {
        let colors = [Rgb8::PINK, Rgb8::new(3, 3, 3)];
        let atlas = compacted_with(&colors);
        let palette = extract_palette(&atlas).unwrap();
        assert_eq!(palette.pink_substitute(), Some(Rgb8::new(255, 0, 254)));
        assert_eq!(
            palette.colors(),
            &[Rgb8::PINK, Rgb8::new(255, 0, 254), Rgb8::new(3, 3, 3)]
        );
        assert_eq!(palette.index_of(Rgb8::PINK), Some(1));

        let indexed = palette.quantize(&atlas).unwrap();
        assert_eq!(indexed.indices[0], 0);
        assert_eq!(indexed.indices[1], 1);
        assert_eq!(indexed.indices[8 + 1], 2);
        // Canvas fill past the packed tiles.
        assert_eq!(indexed.indices[127], 0);
    }

    #[test]
    fn substitute_skips_colors_already_in_use() {
        let colors = [Rgb8::PINK, Rgb8::new(255, 0, 254)];
        let palette = extract_palette(&compacted_with(&colors)).unwrap();
        assert_eq!(palette.pink_substitute(), Some(Rgb8::new(254, 0, 255)));
    }

    #[test]
    fn exhausted_substitutes_are_ambiguous() {
        let mut colors = vec![Rgb8::PINK];
        colors.extend(PINK_SUBSTITUTES);
        let err = extract_palette(&compacted_with(&colors)).unwrap_err();
        assert!(matches!(
            err,
            CompressError::TransparencyAmbiguity { x: 1, y: 0, transparent: BLACK }
        ));
    }

    #[test]
    fn pink_transparent_source_needs_no_substitute() {
        let mut source = PixelBuffer::filled(16, 8, Rgb8::PINK);
        source.set(9, 3, Rgb8::new(1, 1, 1));
        let table = deduplicate(&source, DedupStrategy::Sequential).unwrap();
        let palette = extract_palette(&compact(&source, &table).unwrap()).unwrap();
        assert_eq!(palette.pink_substitute(), None);
        assert_eq!(palette.colors(), &[Rgb8::PINK, Rgb8::new(1, 1, 1)]);
    }

    #[test]
    fn swatch_grows_with_palette() {
        let palette = extract_palette(&compacted_with(&distinct(70))).unwrap();
        assert_eq!(palette.swatch_size(), (16, 8));
    }
}
