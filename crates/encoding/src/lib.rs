// Copyright 2022 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data encodings shared between the sorrel host and its compute kernels.
//!
//! Everything in this crate has a bit-exact WGSL counterpart under
//! `shader/shared/`; the two must be kept in sync.

mod config;
pub mod math;
mod psegment;
mod styling;

pub use config::{
    tile_range_index, BufferSize, BufferSizes, CarrySpill, ConfigUniform, RenderConfig, TileRange,
    WorkgroupCounts, WorkgroupSize, COMPOSITE_WG, DEFAULT_CARRY_SPILLS_PER_ROW, INVALID_LAYER,
    PIXEL_AREA, PIXEL_SIZE, TILE_HEIGHT, TILE_HEIGHT_SHIFT, TILE_RANGE_WG, TILE_WIDTH,
    TILE_WIDTH_SHIFT, WORKGROUP_CARRIES,
};
pub use psegment::PixelSegment;
pub use styling::{BlendMode, FillRule, Styling};
