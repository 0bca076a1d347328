// Copyright 2023 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use sorrel_encoding::{tile_range_index, ConfigUniform, PixelSegment, TileRange};

use crate::cpu_dispatch::CpuBinding;

fn tile_in_bounds(config: &ConfigUniform, tile_x: i32, tile_y: i32) -> bool {
    // Tile −1 is addressable; it collects off-screen-left cover spill.
    tile_x >= -1
        && tile_x < config.width_in_tiles as i32
        && tile_y >= 0
        && tile_y < config.height_in_tiles as i32
}

pub(crate) fn tile_range_main(
    config: &ConfigUniform,
    segments: &[PixelSegment],
    tile_ranges: &mut [TileRange],
) {
    let n = config.segment_count as usize;
    for ix in 0..n {
        let segment = segments[ix];
        if segment.is_none() {
            continue;
        }
        let tile_x = segment.tile_x();
        let tile_y = segment.tile_y();
        let end_of_tile = if ix + 1 == n {
            true
        } else {
            let next = segments[ix + 1];
            next.is_none() || next.tile_x() != tile_x || next.tile_y() != tile_y
        };
        if !end_of_tile {
            continue;
        }
        // This segment closes its tile; its successor opens the next one.
        if tile_in_bounds(config, tile_x, tile_y) {
            tile_ranges[tile_range_index(tile_x, tile_y, config.width_in_tiles)].end = ix as u32 + 1;
        }
        if ix + 1 < n && !segments[ix + 1].is_none() {
            let next = segments[ix + 1];
            if tile_in_bounds(config, next.tile_x(), next.tile_y()) {
                tile_ranges[tile_range_index(next.tile_x(), next.tile_y(), config.width_in_tiles)]
                    .start = ix as u32 + 1;
            }
        }
    }
}

pub fn tile_range(_n_wg: u32, resources: &[CpuBinding]) {
    let r0 = resources[0].as_buf();
    let r1 = resources[1].as_buf();
    let mut r2 = resources[2].as_buf();
    let config = bytemuck::from_bytes(&r0);
    let segments = bytemuck::cast_slice(&r1);
    let tile_ranges = bytemuck::cast_slice_mut(r2.as_mut());
    tile_range_main(config, segments, tile_ranges);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorrel_encoding::RenderConfig;

    fn build(width: u32, height: u32, segments: &[PixelSegment]) -> Vec<TileRange> {
        let config = RenderConfig::new(width, height, segments.len() as u32, 4).gpu;
        let mut ranges = vec![TileRange::default(); config.tile_range_count as usize];
        tile_range_main(&config, segments, &mut ranges);
        ranges
    }

    #[test]
    fn ranges_cover_exactly_their_tiles() {
        let mut segments = vec![
            PixelSegment::new(-1, 0, 0, 0, 2, 0, 16),
            PixelSegment::new(0, 0, 0, 3, 4, 256, 0),
            PixelSegment::new(0, 0, 1, 3, 4, 256, 0),
            PixelSegment::new(2, 0, 0, 0, 0, 10, 1),
            PixelSegment::new(0, 1, 5, 7, 7, -256, -16),
        ];
        segments.sort_unstable();
        let ranges = build(32, 16, &segments);
        let width_in_tiles = 4;

        // After the unsigned sort, row 0 holds tiles 0 and 2 and then the
        // −1 column; row 1 follows.
        assert_eq!(ranges[tile_range_index(0, 0, width_in_tiles)], TileRange { start: 0, end: 2 });
        assert_eq!(ranges[tile_range_index(2, 0, width_in_tiles)], TileRange { start: 2, end: 3 });
        assert_eq!(ranges[tile_range_index(-1, 0, width_in_tiles)], TileRange { start: 3, end: 4 });
        assert_eq!(ranges[tile_range_index(0, 1, width_in_tiles)], TileRange { start: 4, end: 5 });
        // Untouched tiles stay empty.
        assert_eq!(ranges[tile_range_index(1, 0, width_in_tiles)], TileRange::default());

        // Every in-bounds range slices segments of exactly its tile.
        for tile_y in 0..2 {
            for tile_x in -1..width_in_tiles as i32 {
                let range = ranges[tile_range_index(tile_x, tile_y, width_in_tiles)];
                for segment in &segments[range.start as usize..range.end as usize] {
                    assert_eq!((segment.tile_x(), segment.tile_y()), (tile_x, tile_y));
                }
            }
        }
    }

    #[test]
    fn sentinels_and_out_of_bounds_tiles_are_dropped() {
        let mut segments = vec![
            PixelSegment::new(0, 0, 0, 0, 0, 256, 0),
            PixelSegment::new(1000, 0, 0, 0, 0, 256, 0),
            PixelSegment::new(0, -1, 0, 0, 0, 256, 0),
            PixelSegment::new(0, 500, 0, 0, 0, 256, 0),
            PixelSegment::NONE,
            PixelSegment::NONE,
        ];
        segments.sort_unstable();
        let ranges = build(16, 16, &segments);
        // Only tile (0, 0) lands in the table.
        let expected = TileRange { start: 0, end: 1 };
        assert_eq!(ranges[tile_range_index(0, 0, 2)], expected);
        for (ix, range) in ranges.iter().enumerate() {
            if ix != tile_range_index(0, 0, 2) {
                assert_eq!(*range, TileRange::default());
            }
        }
    }

    #[test]
    fn empty_input_leaves_the_table_untouched() {
        let ranges = build(16, 16, &[]);
        assert!(ranges.iter().all(|range| *range == TileRange::default()));
    }
}
