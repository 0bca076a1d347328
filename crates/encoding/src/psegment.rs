// Copyright 2022 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

use crate::{TILE_HEIGHT_SHIFT, TILE_WIDTH_SHIFT};

const LAYER_BITS: u32 = 16;
const AREA_BITS: u32 = 10;
const COVER_BITS: u32 = 6;
const TILE_X_BITS: u32 = 16 - TILE_WIDTH_SHIFT;
const TILE_Y_BITS: u32 = 15 - TILE_HEIGHT_SHIFT;

const COVER_SHIFT: u32 = 0;
const AREA_SHIFT: u32 = COVER_SHIFT + COVER_BITS;
const LOCAL_X_SHIFT: u32 = AREA_SHIFT + AREA_BITS;
const LOCAL_Y_SHIFT: u32 = LOCAL_X_SHIFT + TILE_WIDTH_SHIFT;
const LAYER_SHIFT: u32 = LOCAL_Y_SHIFT + TILE_HEIGHT_SHIFT;
const TILE_X_SHIFT: u32 = LAYER_SHIFT + LAYER_BITS;
const TILE_Y_SHIFT: u32 = TILE_X_SHIFT + TILE_X_BITS;
const NONE_SHIFT: u32 = TILE_Y_SHIFT + TILE_Y_BITS;

// The layer field straddles the two 32-bit halves the kernels operate on;
// the decode there only works while the straddle amount is non-negative.
const _: () = assert!(16 >= TILE_WIDTH_SHIFT + TILE_HEIGHT_SHIFT);
const _: () = assert!(NONE_SHIFT == 63);

/// A pixel segment: one signed edge contribution inside one pixel of one
/// tile of one layer, bit-packed into 64 bits.
///
/// Sorting segments by their raw unsigned value orders them by
/// `(is_none, tile_y, tile_x, layer, local_y, local_x)`, which is exactly
/// the order the compositor consumes them in. Sentinels sort to the tail.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct PixelSegment(u64);

#[inline]
fn signed(value: u64, shift: u32, bits: u32) -> i32 {
    (((value << (64 - shift - bits)) as i64) >> (64 - bits)) as i32
}

#[inline]
fn unsigned(value: u64, shift: u32, bits: u32) -> u32 {
    ((value >> shift) & ((1 << bits) - 1)) as u32
}

impl PixelSegment {
    /// The sentinel segment; a no-op everywhere.
    pub const NONE: Self = Self(1 << NONE_SHIFT);

    pub fn new(
        tile_x: i32,
        tile_y: i32,
        layer: u32,
        local_x: u32,
        local_y: u32,
        area: i32,
        cover: i32,
    ) -> Self {
        let mut value = 0;
        value |= ((tile_y as u64) & ((1 << TILE_Y_BITS) - 1)) << TILE_Y_SHIFT;
        value |= ((tile_x as u64) & ((1 << TILE_X_BITS) - 1)) << TILE_X_SHIFT;
        value |= ((layer as u64) & ((1 << LAYER_BITS) - 1)) << LAYER_SHIFT;
        value |= ((local_y as u64) & ((1 << TILE_HEIGHT_SHIFT) - 1)) << LOCAL_Y_SHIFT;
        value |= ((local_x as u64) & ((1 << TILE_WIDTH_SHIFT) - 1)) << LOCAL_X_SHIFT;
        value |= ((area as u64) & ((1 << AREA_BITS) - 1)) << AREA_SHIFT;
        value |= ((cover as u64) & ((1 << COVER_BITS) - 1)) << COVER_SHIFT;
        Self(value)
    }

    /// Builds a segment from absolute pixel coordinates.
    ///
    /// Pixels left of the image collapse onto tile column −1, which the
    /// compositor folds into the first on-screen tile of the row as cover.
    pub fn new_xy(x: i32, y: i32, layer: u32, area: i32, cover: i32) -> Self {
        Self::new(
            (x >> TILE_WIDTH_SHIFT).max(-1),
            y >> TILE_HEIGHT_SHIFT,
            layer,
            (x & ((1 << TILE_WIDTH_SHIFT) - 1)) as u32,
            (y & ((1 << TILE_HEIGHT_SHIFT) - 1)) as u32,
            area,
            cover,
        )
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 >> NONE_SHIFT != 0
    }

    #[inline]
    pub fn tile_x(self) -> i32 {
        signed(self.0, TILE_X_SHIFT, TILE_X_BITS)
    }

    #[inline]
    pub fn tile_y(self) -> i32 {
        signed(self.0, TILE_Y_SHIFT, TILE_Y_BITS)
    }

    #[inline]
    pub fn layer(self) -> u32 {
        unsigned(self.0, LAYER_SHIFT, LAYER_BITS)
    }

    #[inline]
    pub fn local_x(self) -> u32 {
        unsigned(self.0, LOCAL_X_SHIFT, TILE_WIDTH_SHIFT)
    }

    #[inline]
    pub fn local_y(self) -> u32 {
        unsigned(self.0, LOCAL_Y_SHIFT, TILE_HEIGHT_SHIFT)
    }

    #[inline]
    pub fn area(self) -> i32 {
        signed(self.0, AREA_SHIFT, AREA_BITS)
    }

    #[inline]
    pub fn cover(self) -> i32 {
        signed(self.0, COVER_SHIFT, COVER_BITS)
    }
}

impl std::fmt::Debug for PixelSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            return f.debug_struct("PixelSegment").field("is_none", &true).finish();
        }
        f.debug_struct("PixelSegment")
            .field("tile_x", &self.tile_x())
            .field("tile_y", &self.tile_y())
            .field("layer", &self.layer())
            .field("local_x", &self.local_x())
            .field("local_y", &self.local_y())
            .field("area", &self.area())
            .field("cover", &self.cover())
            .finish()
    }
}
