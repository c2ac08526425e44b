//! Tilesets paint their background in one color of their own choosing. Before packing, that
//! color is folded into the hardware's pink so it lands on palette index 0.

use model::{PixelBuffer, Rgb8, RgbaBuffer, Rgba8};
use tracing::{debug, warn};

/// Replaces pink the artist actually drew, so it stays opaque.
pub const PINK_STAND_IN: Rgb8 = Rgb8::new(255, 0, 254);
const OPAQUE_PINK: Rgba8 = Rgba8::new(255, 0, 255, 255);

/// First `tile_size` tile, in raster order, painted in a single color.
pub fn find_uniform_tile(source: &RgbaBuffer, tile_size: u32) -> Option<(usize, Rgba8)> {
    if tile_size == 0 {
        return None;
    }
    let columns = source.width() / tile_size;
    let rows = source.height() / tile_size;
    (0..rows)
        .flat_map(|row| (0..columns).map(move |col| (col, row)))
        .enumerate()
        .find_map(|(index, (col, row))| {
            let (left, top) = (col * tile_size, row * tile_size);
            let color = source.get(left, top);
            let uniform = (top..top + tile_size)
                .all(|y| (left..left + tile_size).all(|x| source.get(x, y) == color));
            uniform.then_some((index, color))
        })
}

/// Background color of a tileset: the color of its first uniform tile, else fully transparent
/// black if the image has any.
pub fn transparency_color(source: &RgbaBuffer, tile_size: u32) -> Option<Rgba8> {
    if let Some((index, color)) = find_uniform_tile(source, tile_size) {
        debug!(tile = index, color = ?color.0, "transparency tile found");
        return Some(color);
    }
    source
        .pixels()
        .contains(&Rgba8::TRANSPARENT_BLACK)
        .then_some(Rgba8::TRANSPARENT_BLACK)
}

/// Drops alpha, mapping the background color to pink and drawn pink to [`PINK_STAND_IN`].
/// Without a background color the pixels are kept as drawn.
pub fn unify_transparency(source: &RgbaBuffer, tile_size: u32) -> PixelBuffer {
    let background = transparency_color(source, tile_size);
    if background.is_none() {
        warn!(
            width = source.width(),
            height = source.height(),
            "no transparency color found in tileset"
        );
    }
    PixelBuffer::from_fn(source.width(), source.height(), |x, y| {
        let pixel = source.get(x, y);
        match background {
            Some(color) if pixel == color => Rgb8::PINK,
            Some(_) if pixel == OPAQUE_PINK => PINK_STAND_IN,
            _ => pixel.rgb(),
        }
    })
}
