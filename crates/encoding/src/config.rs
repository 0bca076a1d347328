// Copyright 2023 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

pub const TILE_WIDTH: u32 = 8;
pub const TILE_WIDTH_SHIFT: u32 = TILE_WIDTH.trailing_zeros();
pub const TILE_HEIGHT: u32 = 8;
pub const TILE_HEIGHT_SHIFT: u32 = TILE_HEIGHT.trailing_zeros();

/// Scale of a `cover` unit: a full pixel column of winding is 16.
pub const PIXEL_SIZE: i32 = 16;
/// Scale of an `area` unit: a fully covered pixel is 256.
pub const PIXEL_AREA: i32 = 256;

/// Workgroup size of the tile-range builder.
pub const TILE_RANGE_WG: u32 = 256;
/// Workers per tile-row workgroup; one per pixel row of a tile.
pub const COMPOSITE_WG: u32 = TILE_HEIGHT;

/// In-workgroup carry slots per queue; further carries spill to storage.
pub const WORKGROUP_CARRIES: u32 = 8;
/// Default bound on spilled carries per tile row. Carries beyond
/// `WORKGROUP_CARRIES + carry_spills_per_row` distinct layers crossing a
/// single tile boundary are dropped.
pub const DEFAULT_CARRY_SPILLS_PER_ROW: u32 = 256;

/// Sentinel layer id used by the compositor's merge; real ids are 16-bit.
pub const INVALID_LAYER: u32 = !0;

/// Uniform configuration block shared by both kernels.
///
/// Must be kept in sync with `Config` in `shader/shared/config.wgsl`.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct ConfigUniform {
    /// Width of the target in pixels.
    pub width: u32,
    /// Height of the target in pixels.
    pub height: u32,
    pub width_in_tiles: u32,
    pub height_in_tiles: u32,
    pub segment_count: u32,
    /// Number of entries in the tile-range table,
    /// `(width_in_tiles + 1) * height_in_tiles`.
    pub tile_range_count: u32,
    pub carry_spills_per_row: u32,
    pub padding: u32,
}

/// Half-open range of segment indices belonging to one tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TileRange {
    pub start: u32,
    pub end: u32,
}

/// Storage-buffer image of a layer carry, used when a carry queue overflows
/// workgroup memory. Must match `CarrySpill` in `shader/composite.wgsl`.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct CarrySpill {
    pub layer: u32,
    pub rows: [i32; TILE_HEIGHT as usize],
}

/// Index into the tile-range table for a tile coordinate.
///
/// Column −1 is addressable; it holds the off-screen-left segments whose
/// cover spills into the first on-screen tile of the row.
#[inline]
pub fn tile_range_index(tile_x: i32, tile_y: i32, width_in_tiles: u32) -> usize {
    (tile_x + 1) as usize + (width_in_tiles as usize + 1) * tile_y as usize
}

/// Type alias for a workgroup size.
pub type WorkgroupSize = (u32, u32, u32);

/// Dispatch sizes for the two kernels.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkgroupCounts {
    pub tile_range: WorkgroupSize,
    pub composite: WorkgroupSize,
}

/// Typed buffer size primitive.
#[derive(Copy, Clone, Eq, Default, Debug)]
pub struct BufferSize<T: Sized> {
    len: u32,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Sized> BufferSize<T> {
    /// Creates a new buffer size from number of elements.
    pub const fn new(len: u32) -> Self {
        Self {
            // Each buffer binding must be large enough to hold at least one
            // element to avoid triggering validation errors.
            len: if len > 0 { len } else { 1 },
            _phantom: std::marker::PhantomData,
        }
    }

    /// Returns the number of elements.
    pub const fn len(self) -> u32 {
        self.len
    }

    pub const fn is_empty(self) -> bool {
        false
    }

    /// Returns the size in bytes.
    pub const fn size_in_bytes(self) -> u32 {
        std::mem::size_of::<T>() as u32 * self.len
    }
}

impl<T: Sized> PartialEq for BufferSize<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
    }
}

/// Computed sizes for the kernel-owned buffers.
#[derive(Clone, Copy, Debug, Default)]
pub struct BufferSizes {
    pub tile_ranges: BufferSize<TileRange>,
    pub carry_spills: BufferSize<CarrySpill>,
}

/// CPU-side setup and configuration for one render.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderConfig {
    /// GPU-side configuration.
    pub gpu: ConfigUniform,
    /// Dispatch sizes for both kernels.
    pub workgroup_counts: WorkgroupCounts,
    /// Sizes of the kernel-owned buffer resources.
    pub buffer_sizes: BufferSizes,
}

impl RenderConfig {
    pub fn new(width: u32, height: u32, segment_count: u32, carry_spills_per_row: u32) -> Self {
        let width_in_tiles = width.div_ceil(TILE_WIDTH);
        let height_in_tiles = height.div_ceil(TILE_HEIGHT);
        let tile_range_count = (width_in_tiles + 1) * height_in_tiles;
        Self {
            gpu: ConfigUniform {
                width,
                height,
                width_in_tiles,
                height_in_tiles,
                segment_count,
                tile_range_count,
                carry_spills_per_row,
                padding: 0,
            },
            workgroup_counts: WorkgroupCounts {
                tile_range: (segment_count.div_ceil(TILE_RANGE_WG), 1, 1),
                composite: (height_in_tiles, 1, 1),
            },
            buffer_sizes: BufferSizes {
                tile_ranges: BufferSize::new(tile_range_count),
                // One spill region per queue, hence the factor of two.
                carry_spills: BufferSize::new(2 * carry_spills_per_row * height_in_tiles),
            },
        }
    }
}
