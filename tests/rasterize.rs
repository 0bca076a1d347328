// Copyright 2023 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end rasterization scenarios, driven through the CPU shader
//! mirrors with the same byte-buffer bindings the engine hands them.

use std::cell::RefCell;

use sorrel::cpu_dispatch::{CpuBinding, CpuTexture};
use sorrel::cpu_shader;
use sorrel::encoding::{RenderConfig, DEFAULT_CARRY_SPILLS_PER_ROW};
use sorrel::{BlendMode, FillRule, PixelSegment, Styling};

fn rasterize(
    width: u32,
    height: u32,
    carry_spills_per_row: u32,
    segments: &[PixelSegment],
    stylings: &[Styling],
) -> CpuTexture {
    let mut sorted = segments.to_vec();
    sorted.sort_unstable();
    let config = RenderConfig::new(width, height, sorted.len() as u32, carry_spills_per_row);
    let config_buf = RefCell::new(bytemuck::bytes_of(&config.gpu).to_vec());
    let segments_buf = RefCell::new(bytemuck::cast_slice::<_, u8>(&sorted).to_vec());
    let tile_ranges_buf = RefCell::new(vec![
        0u8;
        config.buffer_sizes.tile_ranges.size_in_bytes() as usize
    ]);
    let stylings_buf = RefCell::new(bytemuck::cast_slice::<_, u8>(stylings).to_vec());
    let carry_spills_buf = RefCell::new(vec![
        0u8;
        config.buffer_sizes.carry_spills.size_in_bytes() as usize
    ]);
    let texture = RefCell::new(CpuTexture::new(width as usize, height as usize));

    cpu_shader::tile_range(
        config.workgroup_counts.tile_range.0,
        &[
            CpuBinding::BufferRW(&config_buf),
            CpuBinding::BufferRW(&segments_buf),
            CpuBinding::BufferRW(&tile_ranges_buf),
        ],
    );
    cpu_shader::composite(
        config.workgroup_counts.composite.0,
        &[
            CpuBinding::BufferRW(&config_buf),
            CpuBinding::BufferRW(&segments_buf),
            CpuBinding::BufferRW(&tile_ranges_buf),
            CpuBinding::BufferRW(&stylings_buf),
            CpuBinding::BufferRW(&carry_spills_buf),
            CpuBinding::Texture(&texture),
        ],
    );
    texture.into_inner()
}

fn assert_pixel(texture: &CpuTexture, x: usize, y: usize, expected: [f32; 4]) {
    let actual = texture.load(x, y);
    for channel in 0..4 {
        assert!(
            (actual[channel] - expected[channel]).abs() < 1e-6,
            "pixel ({x}, {y}): expected {expected:?}, got {actual:?}"
        );
    }
}

fn red() -> Styling {
    Styling::new([1.0, 0.0, 0.0, 1.0], FillRule::NonZero, BlendMode::Over)
}

#[test]
fn empty_scene_renders_all_zero() {
    let texture = rasterize(32, 24, DEFAULT_CARRY_SPILLS_PER_ROW, &[], &[red()]);
    assert!(texture.pixels.iter().all(|pixel| *pixel == [0.0; 4]));
}

#[test]
fn single_pixel_single_layer() {
    let segments = [PixelSegment::new(0, 0, 0, 3, 4, 256, 0)];
    let texture = rasterize(32, 16, DEFAULT_CARRY_SPILLS_PER_ROW, &segments, &[red()]);
    for y in 0..16 {
        for x in 0..32 {
            if (x, y) == (3, 4) {
                assert_pixel(&texture, x, y, [1.0, 0.0, 0.0, 1.0]);
            } else {
                assert_pixel(&texture, x, y, [0.0; 4]);
            }
        }
    }
}

#[test]
fn cover_carries_across_tile_boundaries() {
    // A full-column winding delta on row 2 of tile (0, 0); tile (1, 0)
    // holds an empty segment so the carry is merged with a real slice.
    let segments = [
        PixelSegment::new(0, 0, 0, 7, 2, 0, 16),
        PixelSegment::new(1, 0, 0, 0, 2, 0, 0),
    ];
    let texture = rasterize(32, 8, DEFAULT_CARRY_SPILLS_PER_ROW, &segments, &[red()]);
    for x in 0..8 {
        // The delta lands in the spill column, so the emitting tile's own
        // pixels are untouched.
        assert_pixel(&texture, x, 2, [0.0; 4]);
    }
    for x in 8..32 {
        assert_pixel(&texture, x, 2, [1.0, 0.0, 0.0, 1.0]);
    }
    for x in 0..32 {
        assert_pixel(&texture, x, 1, [0.0; 4]);
        assert_pixel(&texture, x, 3, [0.0; 4]);
    }
}

#[test]
fn off_screen_left_cover_spills_into_the_row() {
    // Only tile −1 segments: no pixels are written by them directly, but
    // their cover fills the whole on-screen row as winding.
    let segments = [PixelSegment::new(-1, 0, 0, 0, 5, 0, 16)];
    let texture = rasterize(24, 8, DEFAULT_CARRY_SPILLS_PER_ROW, &segments, &[red()]);
    for x in 0..24 {
        assert_pixel(&texture, x, 5, [1.0, 0.0, 0.0, 1.0]);
        assert_pixel(&texture, x, 4, [0.0; 4]);
        assert_pixel(&texture, x, 6, [0.0; 4]);
    }
}

#[test]
fn cover_is_conserved_along_the_row() {
    // +16 entering at pixel 1, −16 at pixel 17: exactly the span between
    // the two edges is filled, across two tile boundaries.
    let segments = [
        PixelSegment::new(0, 0, 0, 0, 0, 0, 16),
        PixelSegment::new(2, 0, 0, 0, 0, 0, -16),
    ];
    let texture = rasterize(32, 8, DEFAULT_CARRY_SPILLS_PER_ROW, &segments, &[red()]);
    assert_pixel(&texture, 0, 0, [0.0; 4]);
    for x in 1..=16 {
        assert_pixel(&texture, x, 0, [1.0, 0.0, 0.0, 1.0]);
    }
    for x in 17..32 {
        assert_pixel(&texture, x, 0, [0.0; 4]);
    }
}

#[test]
fn even_odd_cancels_double_winding() {
    let segments = [
        PixelSegment::new(0, 0, 0, 0, 0, 0, 16),
        PixelSegment::new(0, 0, 0, 1, 0, 0, 16),
    ];
    let styling = [Styling::new(
        [1.0, 0.0, 0.0, 1.0],
        FillRule::EvenOdd,
        BlendMode::Over,
    )];
    let texture = rasterize(8, 8, DEFAULT_CARRY_SPILLS_PER_ROW, &segments, &styling);
    assert_pixel(&texture, 0, 0, [0.0; 4]);
    assert_pixel(&texture, 1, 0, [1.0, 0.0, 0.0, 1.0]);
    for x in 2..8 {
        // Winding 2 is parity-even again.
        assert_pixel(&texture, x, 0, [0.0; 4]);
    }
}

fn graded_layers(count: u32) -> (Vec<PixelSegment>, Vec<Styling>) {
    let segments = (0..count)
        .map(|layer| PixelSegment::new(0, 0, layer, 7, 0, 0, 16))
        .collect();
    let stylings = (0..count)
        .map(|layer| {
            Styling::new(
                [layer as f32 / count as f32, 0.0, 0.0, 1.0],
                FillRule::NonZero,
                BlendMode::Over,
            )
        })
        .collect();
    (segments, stylings)
}

#[test]
fn layers_composite_in_ascending_order() {
    // Ten opaque layers carried over one tile boundary; Over leaves the
    // highest layer, which also exercises carries past the in-workgroup
    // queue capacity of eight.
    let (segments, stylings) = graded_layers(10);
    let texture = rasterize(16, 8, DEFAULT_CARRY_SPILLS_PER_ROW, &segments, &stylings);
    assert_pixel(&texture, 8, 0, [0.9, 0.0, 0.0, 1.0]);
    // The emitting tile's own pixels stay untouched.
    assert_pixel(&texture, 7, 0, [0.0; 4]);
}

#[test]
fn saturated_carry_queues_drop_the_excess() {
    // With no spill slots, only the first eight carries cross the
    // boundary; the later layers are dropped, leaving layer 7 on top.
    let (segments, stylings) = graded_layers(10);
    let texture = rasterize(16, 8, 0, &segments, &stylings);
    assert_pixel(&texture, 8, 0, [0.7, 0.0, 0.0, 1.0]);
}
