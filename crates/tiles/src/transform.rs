//! Exact 8x8 tile equality under the four hardware flip transforms.
//!
//! The order of [`TRANSFORM_PRIORITY`] is part of the output format: when several
//! transforms match, the first one decides which flip bits a duplicate receives.

use model::{TILE_EDGE, TileBlock};

const LAST: u32 = TILE_EDGE - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    Identity,
    /// Top and bottom swapped.
    VerticalMirror,
    Rotate180,
    /// Left and right swapped.
    HorizontalMirror,
}

pub const TRANSFORM_PRIORITY: [Transform; 4] = [
    Transform::Identity,
    Transform::VerticalMirror,
    Transform::Rotate180,
    Transform::HorizontalMirror,
];

impl Transform {
    /// Pixel of the untransformed block that lands on `(x, y)`.
    #[inline]
    const fn source(self, x: u32, y: u32) -> (u32, u32) {
        match self {
            Transform::Identity => (x, y),
            Transform::VerticalMirror => (x, LAST - y),
            Transform::Rotate180 => (LAST - x, LAST - y),
            Transform::HorizontalMirror => (LAST - x, y),
        }
    }

    /// Flip bits `(h_flip, v_flip)` the hardware needs to draw the canonical tile as the duplicate.
    pub const fn flip_flags(self) -> (bool, bool) {
        match self {
            Transform::Identity => (false, false),
            Transform::VerticalMirror => (false, true),
            Transform::Rotate180 => (true, true),
            Transform::HorizontalMirror => (true, false),
        }
    }

    pub fn apply(self, block: &TileBlock) -> TileBlock {
        TileBlock::from_fn(|x, y| {
            let (sx, sy) = self.source(x, y);
            block.get(sx, sy)
        })
    }

    /// First transform in priority order under which `right` equals `left`.
    pub fn first_match(left: &TileBlock, right: &TileBlock) -> Option<Transform> {
        TRANSFORM_PRIORITY
            .into_iter()
            .find(|transform| tiles_match(left, right, *transform))
    }
}

/// True iff all 64 pixels of `left` equal `right` after `transform` is applied to `right`.
pub fn tiles_match(left: &TileBlock, right: &TileBlock, transform: Transform) -> bool {
    for y in 0..TILE_EDGE {
        for x in 0..TILE_EDGE {
            let (sx, sy) = transform.source(x, y);
            if left.get(x, y) != right.get(sx, sy) {
                return false;
            }
        }
    }
    true
}
