//! Capacity tiers for the compacted atlas canvas.
//!
//! The canvas grows in 8px steps so the packed tile sheet stays as small as the unique tile
//! count allows:
//! - Square:    up to 256 tiles, 128x128 px (16x16 tiles)
//! - Widened:   up to 512 tiles, 128 px high, width grows by one 16-tile column per 16 tiles
//! - Heightened: up to 960 tiles, 256 px wide, height grows by one row per 32 tiles
//!
//! More than 960 unique tiles do not fit the target's tile memory and are rejected.

use static_assertions::const_assert;

use model::TILE_EDGE;

pub const MAX_UNIQUE_TILES: usize = 960;
const SQUARE_LIMIT: usize = 256;
const WIDENED_LIMIT: usize = 512;
const BASE_EDGE_PX: u32 = 128;
const MAX_EDGE_PX: u32 = 256;

const_assert!(SQUARE_LIMIT < WIDENED_LIMIT);
const_assert!(WIDENED_LIMIT < MAX_UNIQUE_TILES);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanvasTier {
    Square,
    Widened,
    Heightened,
}

/// Pixel size of a compacted atlas canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn columns(self) -> u32 {
        self.width / TILE_EDGE
    }

    pub const fn rows(self) -> u32 {
        self.height / TILE_EDGE
    }

    pub const fn capacity_tiles(self) -> usize {
        self.columns() as usize * self.rows() as usize
    }
}

impl CanvasTier {
    /// Smallest tier holding `unique` tiles, `None` past [`MAX_UNIQUE_TILES`].
    pub const fn for_unique_count(unique: usize) -> Option<Self> {
        if unique <= SQUARE_LIMIT {
            Some(CanvasTier::Square)
        } else if unique <= WIDENED_LIMIT {
            Some(CanvasTier::Widened)
        } else if unique <= MAX_UNIQUE_TILES {
            Some(CanvasTier::Heightened)
        } else {
            None
        }
    }

    /// Canvas size for `unique` tiles; `unique` must lie inside this tier.
    pub const fn canvas_size(self, unique: usize) -> CanvasSize {
        match self {
            CanvasTier::Square => CanvasSize {
                width: BASE_EDGE_PX,
                height: BASE_EDGE_PX,
            },
            CanvasTier::Widened => {
                let steps = (unique - SQUARE_LIMIT).div_ceil(16) as u32;
                CanvasSize {
                    width: BASE_EDGE_PX + steps * TILE_EDGE,
                    height: BASE_EDGE_PX,
                }
            }
            CanvasTier::Heightened => {
                let steps = (unique - WIDENED_LIMIT).div_ceil(32) as u32;
                CanvasSize {
                    width: MAX_EDGE_PX,
                    height: BASE_EDGE_PX + steps * TILE_EDGE,
                }
            }
        }
    }
}

/// Tier and canvas for `unique` tiles.
pub const fn canvas_for(unique: usize) -> Option<(CanvasTier, CanvasSize)> {
    match CanvasTier::for_unique_count(unique) {
        Some(tier) => Some((tier, tier.canvas_size(unique))),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_tier_is_fixed() {
        for unique in [0, 1, 64, 256] {
            let (tier, size) = canvas_for(unique).unwrap();
            assert_eq!(tier, CanvasTier::Square);
            assert_eq!(size, CanvasSize { width: 128, height: 128 });
        }
    }

    #[test]
    fn widened_tier_grows_in_columns() {
        assert_eq!(canvas_for(257).unwrap().1, CanvasSize { width: 136, height: 128 });
        assert_eq!(canvas_for(272).unwrap().1, CanvasSize { width: 136, height: 128 });
        assert_eq!(canvas_for(273).unwrap().1, CanvasSize { width: 144, height: 128 });
        assert_eq!(canvas_for(512).unwrap().1, CanvasSize { width: 256, height: 128 });
    }

    #[test]
    fn heightened_tier_grows_in_rows() {
        assert_eq!(canvas_for(513).unwrap().1, CanvasSize { width: 256, height: 136 });
        assert_eq!(canvas_for(544).unwrap().1, CanvasSize { width: 256, height: 136 });
        let (tier, size) = canvas_for(960).unwrap();
        assert_eq!(tier, CanvasTier::Heightened);
        assert_eq!(size, CanvasSize { width: 256, height: 128 + 14 * 8 });
    }

    #[test]
    fn capacity_always_covers_unique_count() {
        for unique in 0..=MAX_UNIQUE_TILES {
            let (_, size) = canvas_for(unique).unwrap();
            assert!(size.capacity_tiles() >= unique, "unique={unique}");
        }
    }

    #[test]
    fn past_capacity_has_no_tier() {
        assert_eq!(canvas_for(961), None);
        assert_eq!(CanvasTier::for_unique_count(usize::MAX), None);
    }
}
