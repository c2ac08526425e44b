use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Edge length in pixels of one hardware tile.
pub const TILE_EDGE: u32 = 8;
pub const TILE_PIXELS: usize = (TILE_EDGE * TILE_EDGE) as usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb8(pub [u8; 3]);

impl Rgb8 {
    /// Conventional transparent color of the target hardware.
    pub const PINK: Rgb8 = Rgb8([255, 0, 255]);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb8([r, g, b])
    }

    pub const fn r(self) -> u8 {
        self.0[0]
    }

    pub const fn g(self) -> u8 {
        self.0[1]
    }

    pub const fn b(self) -> u8 {
        self.0[2]
    }
}

/// Straight-alpha color as decoded from a source image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Rgba8(pub [u8; 4]);

impl Rgba8 {
    pub const TRANSPARENT_BLACK: Rgba8 = Rgba8([0, 0, 0, 0]);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Rgba8([r, g, b, a])
    }

    pub const fn alpha(self) -> u8 {
        self.0[3]
    }

    pub const fn rgb(self) -> Rgb8 {
        Rgb8([self.0[0], self.0[1], self.0[2]])
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub col: u32,
    pub row: u32,
}

impl TilePos {
    pub const fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PixelFormatError {
    #[error("atlas size {width}x{height} is not a multiple of 8 pixels")]
    NotTileAligned { width: u32, height: u32 },
    #[error("pixel buffer holds {found} pixels, {width}x{height} requires {expected}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        found: usize,
    },
    #[error("pixel data holds {found} bytes, {width}x{height} at {channels} channels requires {expected}")]
    ByteLengthMismatch {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        found: usize,
    },
}

fn check_byte_length(
    width: u32,
    height: u32,
    channels: u8,
    bytes: &[u8],
) -> Result<(), PixelFormatError> {
    let expected = width as usize * height as usize * channels as usize;
    if bytes.len() != expected {
        return Err(PixelFormatError::ByteLengthMismatch {
            width,
            height,
            channels,
            expected,
            found: bytes.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TileGridError {
    #[error("tile ({col}, {row}) lies outside a {columns}x{rows} tile grid")]
    PosOutOfBounds {
        col: u32,
        row: u32,
        columns: u32,
        rows: u32,
    },
    #[error("tile index {index} lies outside a grid of {tile_count} tiles")]
    IndexOutOfBounds { index: usize, tile_count: usize },
}

/// Geometry of an atlas measured in 8x8 tiles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileGrid {
    columns: u32,
    rows: u32,
}

impl TileGrid {
    pub const fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    pub fn from_pixel_size(width: u32, height: u32) -> Result<Self, PixelFormatError> {
        if width % TILE_EDGE != 0 || height % TILE_EDGE != 0 {
            return Err(PixelFormatError::NotTileAligned { width, height });
        }
        Ok(Self::new(width / TILE_EDGE, height / TILE_EDGE))
    }

    pub const fn columns(self) -> u32 {
        self.columns
    }

    pub const fn rows(self) -> u32 {
        self.rows
    }

    pub const fn tile_count(self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn tile_index(self, pos: TilePos) -> Result<usize, TileGridError> {
        if pos.col >= self.columns || pos.row >= self.rows {
            return Err(TileGridError::PosOutOfBounds {
                col: pos.col,
                row: pos.row,
                columns: self.columns,
                rows: self.rows,
            });
        }
        Ok(pos.row as usize * self.columns as usize + pos.col as usize)
    }

    pub fn tile_pos(self, index: usize) -> Result<TilePos, TileGridError> {
        if index >= self.tile_count() {
            return Err(TileGridError::IndexOutOfBounds {
                index,
                tile_count: self.tile_count(),
            });
        }
        let col = index % self.columns as usize;
        let row = index / self.columns as usize;
        Ok(TilePos::new(col as u32, row as u32))
    }

    /// Raster-order positions, row-major.
    pub fn positions(self) -> impl Iterator<Item = TilePos> {
        (0..self.rows).flat_map(move |row| (0..self.columns).map(move |col| TilePos::new(col, row)))
    }
}

/// One 8x8 block of pixels, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileBlock([Rgb8; TILE_PIXELS]);

impl TileBlock {
    pub const fn filled(color: Rgb8) -> Self {
        TileBlock([color; TILE_PIXELS])
    }

    pub fn from_fn(mut pixel: impl FnMut(u32, u32) -> Rgb8) -> Self {
        let mut block = [Rgb8::PINK; TILE_PIXELS];
        for y in 0..TILE_EDGE {
            for x in 0..TILE_EDGE {
                block[(y * TILE_EDGE + x) as usize] = pixel(x, y);
            }
        }
        TileBlock(block)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Rgb8 {
        self.0[(y * TILE_EDGE + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Rgb8) {
        self.0[(y * TILE_EDGE + x) as usize] = color;
    }

    pub fn pixels(&self) -> &[Rgb8; TILE_PIXELS] {
        &self.0
    }

    pub fn mirrored_horizontally(&self) -> Self {
        TileBlock::from_fn(|x, y| self.get(TILE_EDGE - 1 - x, y))
    }

    pub fn mirrored_vertically(&self) -> Self {
        TileBlock::from_fn(|x, y| self.get(x, TILE_EDGE - 1 - y))
    }
}

/// Row-major RGB8 pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Box<[Rgb8]>,
}

impl PixelBuffer {
    pub fn filled(width: u32, height: u32, color: Rgb8) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![color; len].into_boxed_slice(),
        }
    }

    pub fn from_pixels(
        width: u32,
        height: u32,
        pixels: Vec<Rgb8>,
    ) -> Result<Self, PixelFormatError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(PixelFormatError::LengthMismatch {
                width,
                height,
                expected,
                found: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into_boxed_slice(),
        })
    }

    pub fn from_fn(width: u32, height: u32, mut color_at: impl FnMut(u32, u32) -> Rgb8) -> Self {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| color_at(x, y))
            .collect::<Vec<_>>();
        Self {
            width,
            height,
            pixels: pixels.into_boxed_slice(),
        }
    }

    /// Builds a buffer from packed `RGBRGB...` bytes.
    pub fn from_rgb_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self, PixelFormatError> {
        check_byte_length(width, height, 3, bytes)?;
        let pixels = bytes
            .chunks_exact(3)
            .map(|chunk| Rgb8::new(chunk[0], chunk[1], chunk[2]))
            .collect::<Vec<_>>();
        Self::from_pixels(width, height, pixels)
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Rgb8] {
        &self.pixels
    }

    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|pixel| pixel.0).collect()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Rgb8 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Rgb8) {
        self.pixels[y as usize * self.width as usize + x as usize] = color;
    }

    /// Tile grid covering the buffer; fails unless both edges are multiples of 8.
    pub fn tile_grid(&self) -> Result<TileGrid, PixelFormatError> {
        TileGrid::from_pixel_size(self.width, self.height)
    }

    /// Copies the 8x8 block at `pos`. The caller guarantees `pos` lies inside the tile grid.
    pub fn tile(&self, pos: TilePos) -> TileBlock {
        let origin_x = pos.col * TILE_EDGE;
        let origin_y = pos.row * TILE_EDGE;
        TileBlock::from_fn(|x, y| self.get(origin_x + x, origin_y + y))
    }

    pub fn put_tile(&mut self, pos: TilePos, block: &TileBlock) {
        let origin_x = pos.col * TILE_EDGE;
        let origin_y = pos.row * TILE_EDGE;
        for y in 0..TILE_EDGE {
            for x in 0..TILE_EDGE {
                self.set(origin_x + x, origin_y + y, block.get(x, y));
            }
        }
    }

    /// Copies a `size`x`size` pixel region between buffers.
    pub fn copy_region(
        &mut self,
        dst: (u32, u32),
        src_buffer: &PixelBuffer,
        src: (u32, u32),
        size: u32,
    ) {
        for y in 0..size {
            for x in 0..size {
                let color = src_buffer.get(src.0 + x, src.1 + y);
                self.set(dst.0 + x, dst.1 + y, color);
            }
        }
    }

    /// Every tile of the buffer in raster order.
    pub fn tiles(&self) -> Result<Vec<TileBlock>, PixelFormatError> {
        let grid = self.tile_grid()?;
        Ok(grid.positions().map(|pos| self.tile(pos)).collect())
    }
}

/// Decoded source image that still carries alpha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaBuffer {
    width: u32,
    height: u32,
    pixels: Box<[Rgba8]>,
}

impl RgbaBuffer {
    pub fn filled(width: u32, height: u32, color: Rgba8) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize].into_boxed_slice(),
        }
    }

    /// Builds a buffer from packed `RGBARGBA...` bytes.
    pub fn from_rgba_bytes(
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> Result<Self, PixelFormatError> {
        check_byte_length(width, height, 4, bytes)?;
        let pixels = bytes
            .chunks_exact(4)
            .map(|chunk| Rgba8::new(chunk[0], chunk[1], chunk[2], chunk[3]))
            .collect::<Vec<_>>();
        Ok(Self {
            width,
            height,
            pixels: pixels.into_boxed_slice(),
        })
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Rgba8 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Rgba8) {
        self.pixels[y as usize * self.width as usize + x as usize] = color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_rejects_unaligned_sizes() {
        assert_eq!(
            TileGrid::from_pixel_size(20, 16),
            Err(PixelFormatError::NotTileAligned {
                width: 20,
                height: 16
            })
        );
        assert_eq!(TileGrid::from_pixel_size(24, 16), Ok(TileGrid::new(3, 2)));
    }

    #[test]
    fn tile_index_and_pos_are_inverse() {
        let grid = TileGrid::new(5, 3);
        for index in 0..grid.tile_count() {
            let pos = grid.tile_pos(index).unwrap();
            assert_eq!(grid.tile_index(pos).unwrap(), index);
        }
        assert!(grid.tile_pos(15).is_err());
        assert!(grid.tile_index(TilePos::new(5, 0)).is_err());
    }

    #[test]
    fn positions_are_row_major() {
        let grid = TileGrid::new(2, 2);
        let positions: Vec<_> = grid.positions().collect();
        assert_eq!(
            positions,
            vec![
                TilePos::new(0, 0),
                TilePos::new(1, 0),
                TilePos::new(0, 1),
                TilePos::new(1, 1)
            ]
        );
    }

    #[test]
    fn tile_copy_reads_the_right_block() {
        let mut buffer = PixelBuffer::filled(16, 8, Rgb8::new(0, 0, 0));
        buffer.set(9, 2, Rgb8::new(1, 2, 3));
        let block = buffer.tile(TilePos::new(1, 0));
        assert_eq!(block.get(1, 2), Rgb8::new(1, 2, 3));
        assert_eq!(block.get(0, 0), Rgb8::new(0, 0, 0));
    }

    #[test]
    fn put_tile_round_trips() {
        let block = TileBlock::from_fn(|x, y| Rgb8::new(x as u8, y as u8, 7));
        let mut buffer = PixelBuffer::filled(16, 16, Rgb8::PINK);
        buffer.put_tile(TilePos::new(1, 1), &block);
        assert_eq!(buffer.tile(TilePos::new(1, 1)), block);
        assert_eq!(buffer.tile(TilePos::new(0, 0)), TileBlock::filled(Rgb8::PINK));
    }

    #[test]
    fn buffer_length_is_validated() {
        let err = PixelBuffer::from_pixels(2, 2, vec![Rgb8::PINK; 3]).unwrap_err();
        assert_eq!(
            err,
            PixelFormatError::LengthMismatch {
                width: 2,
                height: 2,
                expected: 4,
                found: 3
            }
        );
    }

    #[test]
    fn byte_length_is_reported_in_bytes() {
        let err = PixelBuffer::from_rgb_bytes(2, 1, &[1, 2, 3, 4, 5]).unwrap_err();
        assert_eq!(
            err,
            PixelFormatError::ByteLengthMismatch {
                width: 2,
                height: 1,
                channels: 3,
                expected: 6,
                found: 5
            }
        );
        assert!(matches!(
            RgbaBuffer::from_rgba_bytes(1, 1, &[0, 0, 0]),
            Err(PixelFormatError::ByteLengthMismatch { expected: 4, found: 3, .. })
        ));
    }

    #[test]
    fn rgba_bytes_keep_alpha() {
        let buffer = RgbaBuffer::from_rgba_bytes(2, 1, &[1, 2, 3, 0, 4, 5, 6, 255]).unwrap();
        assert_eq!(buffer.get(0, 0), Rgba8::new(1, 2, 3, 0));
        assert_eq!(buffer.get(1, 0).rgb(), Rgb8::new(4, 5, 6));
        assert_eq!(buffer.get(1, 0).alpha(), 255);
    }

    #[test]
    fn mirrors_move_corner_pixels() {
        let mut block = TileBlock::filled(Rgb8::new(0, 0, 0));
        block.set(0, 0, Rgb8::new(9, 9, 9));
        assert_eq!(block.mirrored_horizontally().get(7, 0), Rgb8::new(9, 9, 9));
        assert_eq!(block.mirrored_vertically().get(0, 7), Rgb8::new(9, 9, 9));
    }
}
