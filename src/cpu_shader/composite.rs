// Copyright 2023 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use sorrel_encoding::{
    tile_range_index, ConfigUniform, FillRule, PixelSegment, Styling, TileRange, INVALID_LAYER,
    PIXEL_SIZE, TILE_HEIGHT, TILE_WIDTH, WORKGROUP_CARRIES,
};

use crate::cpu_dispatch::{CpuBinding, CpuTexture};

use super::{composite_layer, coverage_to_alpha};

const TILE_W: usize = TILE_WIDTH as usize;
const TILE_H: usize = TILE_HEIGHT as usize;

/// Per-row winding deltas leaving one tile for the next, tagged by layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LayerCarry {
    layer: u32,
    rows: [i32; TILE_H],
}

/// Carry queue emitted by one tile and consumed by its right neighbor.
///
/// The capacity models the GPU queue: `WORKGROUP_CARRIES` workgroup slots
/// plus `carry_spills_per_row` spill slots; carries past that are dropped.
struct CarryQueue {
    entries: Vec<LayerCarry>,
    head: usize,
    capacity: usize,
}

impl CarryQueue {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            head: 0,
            capacity,
        }
    }

    fn peek_layer(&self) -> u32 {
        self.entries.get(self.head).map_or(INVALID_LAYER, |carry| carry.layer)
    }

    fn pop(&mut self) -> LayerCarry {
        let carry = self.entries[self.head];
        self.head += 1;
        carry
    }

    fn push(&mut self, layer: u32, rows: [i32; TILE_H]) {
        if rows.iter().all(|row| *row == 0) {
            return;
        }
        if self.entries.len() >= self.capacity {
            // Overflow past the spill region; excess carries are dropped.
            return;
        }
        self.entries.push(LayerCarry { layer, rows });
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.head = 0;
    }
}

/// Per-tile accumulation scratch, the CPU image of the compositor's
/// workgroup memory.
struct TileScratch {
    /// Area contributions, indexed `[x][y]`.
    areas: [[i32; TILE_H]; TILE_W],
    /// Cover contributions, indexed `[x][y]`. Column 0 holds the incoming
    /// carry; segments at local_x add one column to their right; column
    /// `TILE_WIDTH` collects the spill leaving the tile.
    covers: [[i32; TILE_H]; TILE_W + 1],
    /// Per-pixel composition state, indexed `[x][y]`.
    accumulators: [[[f32; 4]; TILE_H]; TILE_W],
}

impl TileScratch {
    fn new() -> Self {
        Self {
            areas: [[0; TILE_H]; TILE_W],
            covers: [[0; TILE_H]; TILE_W + 1],
            accumulators: [[[0.0; 4]; TILE_H]; TILE_W],
        }
    }

    /// Closes the active layer: prefix-sums cover across each row, converts
    /// coverage to alpha, blends into the accumulators, hands the outgoing
    /// carry to the queue, and zeroes the scratch.
    fn flush_layer(&mut self, layer: u32, stylings: &[Styling], outgoing: &mut CarryQueue) {
        let styling = &stylings[(layer as usize).min(stylings.len() - 1)];
        let fill_rule = FillRule::from_u32(styling.fill_rule);
        let mut outgoing_rows = [0; TILE_H];
        for y in 0..TILE_H {
            let mut cover = 0;
            for x in 0..TILE_W {
                let area = std::mem::take(&mut self.areas[x][y]);
                cover += std::mem::take(&mut self.covers[x][y]);
                let coverage = area + PIXEL_SIZE * cover;
                let alpha = coverage_to_alpha(coverage, fill_rule);
                self.accumulators[x][y] = composite_layer(self.accumulators[x][y], styling, alpha);
            }
            // The spill column completes the cover leaving the tile.
            outgoing_rows[y] = cover + std::mem::take(&mut self.covers[TILE_W][y]);
        }
        outgoing.push(layer, outgoing_rows);
    }
}

/// Folds the off-screen-left segments (tile −1) of a row into the initial
/// incoming queue, one carry per contiguous run of equal layers.
fn row_setup(segments: &[PixelSegment], range: TileRange, incoming: &mut CarryQueue) {
    let mut layer = INVALID_LAYER;
    let mut rows = [0; TILE_H];
    for segment in &segments[range.start as usize..range.end as usize] {
        let segment_layer = segment.layer();
        if segment_layer != layer {
            if layer != INVALID_LAYER {
                incoming.push(layer, rows);
            }
            layer = segment_layer;
            rows = [0; TILE_H];
        }
        rows[segment.local_y() as usize] += segment.cover();
    }
    if layer != INVALID_LAYER {
        incoming.push(layer, rows);
    }
}

fn composite_main(
    config: &ConfigUniform,
    segments: &[PixelSegment],
    tile_ranges: &[TileRange],
    stylings: &[Styling],
    texture: &mut CpuTexture,
) {
    let capacity = (WORKGROUP_CARRIES + config.carry_spills_per_row) as usize;
    let mut scratch = TileScratch::new();
    for tile_y in 0..config.height_in_tiles {
        let mut incoming = CarryQueue::new(capacity);
        let mut outgoing = CarryQueue::new(capacity);
        let setup_range = tile_ranges[tile_range_index(-1, tile_y as i32, config.width_in_tiles)];
        row_setup(segments, setup_range, &mut incoming);

        for tile_x in 0..config.width_in_tiles {
            let range = tile_ranges[tile_range_index(tile_x as i32, tile_y as i32, config.width_in_tiles)];
            let mut seg_ix = range.start as usize;
            let seg_end = range.end as usize;
            let mut active_layer = INVALID_LAYER;

            // Merge the two layer-sorted streams in ascending layer order;
            // carries win ties so a layer's carry is in place before its
            // segments land.
            loop {
                let carry_layer = incoming.peek_layer();
                let segment_layer = if seg_ix < seg_end {
                    segments[seg_ix].layer()
                } else {
                    INVALID_LAYER
                };
                let min_layer = carry_layer.min(segment_layer);
                if min_layer == INVALID_LAYER {
                    break;
                }
                if min_layer != active_layer {
                    if active_layer != INVALID_LAYER {
                        scratch.flush_layer(active_layer, stylings, &mut outgoing);
                    }
                    active_layer = min_layer;
                }
                if carry_layer == min_layer {
                    // The carry's rows are this tile's left-edge cover.
                    let carry = incoming.pop();
                    for y in 0..TILE_H {
                        scratch.covers[0][y] += carry.rows[y];
                    }
                } else {
                    // Consume the run of segments with this layer.
                    while seg_ix < seg_end && segments[seg_ix].layer() == min_layer {
                        let segment = segments[seg_ix];
                        let x = segment.local_x() as usize;
                        let y = segment.local_y() as usize;
                        scratch.areas[x][y] += segment.area();
                        scratch.covers[x + 1][y] += segment.cover();
                        seg_ix += 1;
                    }
                }
            }
            if active_layer != INVALID_LAYER {
                scratch.flush_layer(active_layer, stylings, &mut outgoing);
            }

            for y in 0..TILE_H {
                let py = (tile_y * TILE_HEIGHT) as usize + y;
                for x in 0..TILE_W {
                    let px = (tile_x * TILE_WIDTH) as usize + x;
                    if px < config.width as usize && py < config.height as usize {
                        texture.store(px, py, scratch.accumulators[x][y]);
                    }
                    scratch.accumulators[x][y] = [0.0; 4];
                }
            }

            // The drained incoming queue becomes the next tile's outgoing.
            incoming.reset();
            std::mem::swap(&mut incoming, &mut outgoing);
        }
    }
}

pub fn composite(_n_wg: u32, resources: &[CpuBinding]) {
    let r0 = resources[0].as_buf();
    let r1 = resources[1].as_buf();
    let r2 = resources[2].as_buf();
    let r3 = resources[3].as_buf();
    // resources[4] is the carry-spill buffer; the CPU queue carries its
    // capacity instead of spilling to it.
    let mut texture = resources[5].as_tex();
    let config = bytemuck::from_bytes(&r0);
    let segments = bytemuck::cast_slice(&r1);
    let tile_ranges = bytemuck::cast_slice(&r2);
    let stylings = bytemuck::cast_slice(&r3);
    composite_main(config, segments, tile_ranges, stylings, &mut texture);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorrel_encoding::{BlendMode, RenderConfig};

    #[test]
    fn carry_queue_drops_zero_and_saturated_carries() {
        let mut queue = CarryQueue::new(2);
        queue.push(3, [0; TILE_H]);
        assert_eq!(queue.peek_layer(), INVALID_LAYER);
        queue.push(3, [1, 0, 0, 0, 0, 0, 0, 0]);
        queue.push(5, [0, 2, 0, 0, 0, 0, 0, 0]);
        queue.push(9, [0, 0, 3, 0, 0, 0, 0, 0]);
        assert_eq!(queue.entries.len(), 2);
        assert_eq!(queue.pop().layer, 3);
        assert_eq!(queue.pop().layer, 5);
        assert_eq!(queue.peek_layer(), INVALID_LAYER);
    }

    #[test]
    fn row_setup_groups_contiguous_layers() {
        let segments = [
            PixelSegment::new(-1, 0, 2, 0, 1, 0, 16),
            PixelSegment::new(-1, 0, 2, 0, 6, 0, -4),
            PixelSegment::new(-1, 0, 7, 0, 1, 0, 5),
        ];
        let mut incoming = CarryQueue::new(8);
        let range = TileRange { start: 0, end: 3 };
        row_setup(&segments, range, &mut incoming);
        let first = incoming.pop();
        assert_eq!(first.layer, 2);
        assert_eq!(first.rows, [0, 16, 0, 0, 0, 0, -4, 0]);
        let second = incoming.pop();
        assert_eq!(second.layer, 7);
        assert_eq!(second.rows, [0, 5, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn carry_and_segment_layers_merge_in_order() {
        // Layer 0 arrives as a carry from off screen, layer 1 as a local
        // segment; with half-opaque fills the result distinguishes the
        // composition order.
        let config = RenderConfig::new(8, 8, 2, 8).gpu;
        let mut segments = vec![
            PixelSegment::new(-1, 0, 0, 0, 0, 0, 16),
            PixelSegment::new(0, 0, 1, 0, 0, 256, 0),
        ];
        segments.sort_unstable();
        let mut tile_ranges = vec![TileRange::default(); config.tile_range_count as usize];
        super::super::tile_range::tile_range_main(&config, &segments, &mut tile_ranges);
        let stylings = [
            Styling::new([1.0, 0.0, 0.0, 0.5], FillRule::NonZero, BlendMode::Over),
            Styling::new([0.0, 0.0, 1.0, 0.5], FillRule::NonZero, BlendMode::Over),
        ];
        let mut texture = CpuTexture::new(8, 8);
        composite_main(&config, &segments, &tile_ranges, &stylings, &mut texture);
        let pixel = texture.load(0, 0);
        let expected = [0.25, 0.0, 0.5, 0.75];
        for channel in 0..4 {
            assert!(
                (pixel[channel] - expected[channel]).abs() < 1e-6,
                "expected {expected:?}, got {pixel:?}"
            );
        }
    }
}
