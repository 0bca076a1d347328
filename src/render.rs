// Copyright 2022 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Take a sorted segment stream and record the pipeline that rasterizes it.

use sorrel_encoding::{PixelSegment, RenderConfig, Styling};

use crate::{
    engine::{BufferProxy, ImageFormat, ImageProxy, Recording, ResourceProxy},
    shaders::FullShaders,
    RenderParams,
};

/// Records the full two-stage pipeline: tile-range build, then the
/// per-tile-row composite. Returns the recording and the proxy of the
/// output image, which the caller binds to its target texture.
///
/// The segment slice must already be sorted by the canonical unsigned
/// 64-bit key.
pub fn render_full(
    segments: &[PixelSegment],
    stylings: &[Styling],
    shaders: &FullShaders,
    params: &RenderParams,
) -> (Recording, ResourceProxy) {
    let mut recording = Recording::default();
    let config = RenderConfig::new(
        params.width,
        params.height,
        segments.len() as u32,
        params.carry_spills_per_row,
    );
    let buffer_sizes = &config.buffer_sizes;
    let wg_counts = &config.workgroup_counts;

    let config_buf = ResourceProxy::Buffer(
        recording.upload_uniform("config", bytemuck::bytes_of(&config.gpu)),
    );
    let segments_buf =
        ResourceProxy::Buffer(recording.upload("segments", bytemuck::cast_slice(segments)));
    // The compositor clamps layer lookups to the styling count, which
    // needs at least one record to exist.
    let stylings_buf = if stylings.is_empty() {
        let default = [Styling::default()];
        ResourceProxy::Buffer(recording.upload("stylings", bytemuck::bytes_of(&default)))
    } else {
        ResourceProxy::Buffer(recording.upload("stylings", bytemuck::cast_slice(stylings)))
    };

    let tile_range_buf = BufferProxy::new(
        buffer_sizes.tile_ranges.size_in_bytes() as u64,
        "tile_ranges",
    );
    // Empty tiles must read as (0, 0), and pooled buffers are reused.
    recording.clear_all(tile_range_buf);
    let tile_range_buf = ResourceProxy::Buffer(tile_range_buf);
    if wg_counts.tile_range.0 > 0 {
        recording.dispatch(
            shaders.tile_range,
            wg_counts.tile_range,
            [config_buf, segments_buf, tile_range_buf],
        );
    }

    let carry_spill_buf = BufferProxy::new(
        buffer_sizes.carry_spills.size_in_bytes() as u64,
        "carry_spills",
    );
    let carry_spill_buf = ResourceProxy::Buffer(carry_spill_buf);
    let out_image = ImageProxy::new(params.width, params.height, ImageFormat::Rgba16Float);
    recording.dispatch(
        shaders.composite,
        wg_counts.composite,
        [
            config_buf,
            segments_buf,
            tile_range_buf,
            stylings_buf,
            carry_spill_buf,
            ResourceProxy::Image(out_image),
        ],
    );

    recording.free_resource(config_buf);
    recording.free_resource(segments_buf);
    recording.free_resource(stylings_buf);
    recording.free_resource(tile_range_buf);
    recording.free_resource(carry_spill_buf);
    (recording, ResourceProxy::Image(out_image))
}
