//! Emission order of hardware tile codes.
//!
//! A 64-tile wide background spans two 32x32 screenblocks side by side, and each screenblock is
//! stored contiguously. Such layers are therefore emitted band by band: the left half of a
//! 32-row band, then its right half, then the next band. Every other layer shape is emitted in
//! plain raster order.

use std::ops::Range;

use static_assertions::const_assert_eq;

/// Edge of one screenblock in hardware tiles.
pub const SCREENBLOCK_EDGE: u32 = 32;
const SCREENBLOCK_LAYER_WIDTH: u32 = 2 * SCREENBLOCK_EDGE;

const_assert_eq!(SCREENBLOCK_LAYER_WIDTH, 64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    Raster,
    Screenblock,
}

impl TraversalOrder {
    pub const fn for_layer(width: u32, height: u32) -> Self {
        if width == SCREENBLOCK_LAYER_WIDTH
            && (height == SCREENBLOCK_EDGE || height == 2 * SCREENBLOCK_EDGE)
        {
            TraversalOrder::Screenblock
        } else {
            TraversalOrder::Raster
        }
    }

    pub fn cursor(self, width: u32, height: u32) -> LayerCursor {
        match self {
            TraversalOrder::Raster => LayerCursor::Raster(0..width as usize * height as usize),
            TraversalOrder::Screenblock => {
                LayerCursor::Screenblock(ScreenblockCursor::new(width, height))
            }
        }
    }
}

/// Linear cell positions of one layer in emission order.
#[derive(Debug, Clone)]
pub enum LayerCursor {
    Raster(Range<usize>),
    Screenblock(ScreenblockCursor),
}

impl Iterator for LayerCursor {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            LayerCursor::Raster(range) => range.next(),
            LayerCursor::Screenblock(cursor) => cursor.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            LayerCursor::Raster(range) => range.size_hint(),
            LayerCursor::Screenblock(cursor) => cursor.size_hint(),
        }
    }
}

impl ExactSizeIterator for LayerCursor {}

/// Cursor over a layer split into left and right screenblock halves.
#[derive(Debug, Clone)]
pub struct ScreenblockCursor {
    width: u32,
    height: u32,
    band_start: u32,
    second_half: bool,
    row: u32,
    column: u32,
    remaining: usize,
}

impl ScreenblockCursor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            band_start: 0,
            second_half: false,
            row: 0,
            column: 0,
            remaining: width as usize * height as usize,
        }
    }

    pub const fn in_second_half(&self) -> bool {
        self.second_half
    }

    fn half_width(&self) -> u32 {
        self.width / 2
    }

    fn band_rows(&self) -> u32 {
        (self.height - self.band_start).min(SCREENBLOCK_EDGE)
    }

    fn advance(&mut self) {
        self.column += 1;
        if self.column < self.half_width() {
            return;
        }
        self.column = 0;
        self.row += 1;
        if self.row < self.band_rows() {
            return;
        }
        self.row = 0;
        if self.second_half {
            self.second_half = false;
            self.band_start += SCREENBLOCK_EDGE;
        } else {
            self.second_half = true;
        }
    }
}

impl Iterator for ScreenblockCursor {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 || self.band_start >= self.height {
            return None;
        }
        let x = if self.second_half {
            self.half_width() + self.column
        } else {
            self.column
        };
        let y = self.band_start + self.row;
        let position = y as usize * self.width as usize + x as usize;
        self.remaining -= 1;
        self.advance();
        Some(position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ScreenblockCursor {}
