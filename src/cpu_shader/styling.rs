// Copyright 2023 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Coverage-to-alpha and blend-mode primitives, mirroring
//! `shader/shared/styling.wgsl`.

use sorrel_encoding::{BlendMode, FillRule, Styling, PIXEL_AREA};

pub(crate) fn coverage_to_alpha(coverage: i32, fill_rule: FillRule) -> f32 {
    match fill_rule {
        FillRule::NonZero => (coverage.abs() as f32 / PIXEL_AREA as f32).clamp(0.0, 1.0),
        FillRule::EvenOdd => {
            // A triangular wave over the winding number.
            let winding = coverage >> 8;
            let fraction = (coverage & 0xff) as f32 / PIXEL_AREA as f32;
            if winding & 1 == 0 {
                fraction
            } else {
                1.0 - fraction
            }
        }
    }
}

fn soft_light(dst: f32, src: f32) -> f32 {
    if src <= 0.5 {
        dst - (1.0 - 2.0 * src) * dst * (1.0 - dst)
    } else {
        let d = if dst <= 0.25 {
            ((16.0 * dst - 12.0) * dst + 4.0) * dst
        } else {
            dst.sqrt()
        };
        dst + (2.0 * src - 1.0) * (d - dst)
    }
}

fn blend_mix(dst: f32, src: f32, mode: BlendMode) -> f32 {
    match mode {
        BlendMode::Over => src,
        BlendMode::Multiply => dst * src,
        BlendMode::Screen => src - dst * src,
        BlendMode::Overlay => {
            if src <= 0.5 {
                2.0 * dst * src
            } else {
                2.0 * (dst + src - dst * src - 0.5)
            }
        }
        BlendMode::Darken => dst.min(src),
        BlendMode::Lighten => dst.max(src),
        BlendMode::ColorDodge => {
            if src == 0.0 {
                0.0
            } else {
                (src / (1.0 - dst)).min(1.0)
            }
        }
        BlendMode::ColorBurn => {
            if src == 1.0 {
                1.0
            } else {
                1.0 - ((1.0 - src) / dst).min(1.0)
            }
        }
        BlendMode::HardLight => {
            if dst <= 0.5 {
                2.0 * dst * src
            } else {
                2.0 * (dst + src - dst * src - 0.5)
            }
        }
        BlendMode::SoftLight => soft_light(dst, src),
        BlendMode::Difference => (dst - src).abs(),
        BlendMode::Exclusion => dst + src - 2.0 * dst * src,
    }
}

/// Composites one layer's contribution over the accumulator: the blended
/// color under the layer's mode, then Over on top.
pub(crate) fn composite_layer(dst: [f32; 4], styling: &Styling, coverage_alpha: f32) -> [f32; 4] {
    let mode = BlendMode::from_u32(styling.blend_mode);
    let alpha = coverage_alpha * styling.fill[3];
    let mut result = [0.0; 4];
    for channel in 0..3 {
        let src = styling.fill[channel] * alpha;
        let color = blend_mix(dst[channel], src, mode);
        result[channel] = dst[channel] * (1.0 - alpha) + color;
    }
    result[3] = dst[3] * (1.0 - alpha) + alpha;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorrel_encoding::PIXEL_SIZE;

    #[test]
    fn fill_rules_disagree_on_double_winding() {
        // coverage 384 is winding 1 plus half a pixel.
        let coverage = 384;
        assert_eq!(coverage_to_alpha(coverage, FillRule::NonZero), 1.0);
        assert_eq!(coverage_to_alpha(coverage, FillRule::EvenOdd), 0.5);
    }

    #[test]
    fn non_zero_is_symmetric_in_winding_direction() {
        let coverage = -PIXEL_SIZE * 16;
        assert_eq!(coverage_to_alpha(coverage, FillRule::NonZero), 1.0);
        assert_eq!(coverage_to_alpha(-128, FillRule::NonZero), 0.5);
    }

    #[test]
    fn even_odd_wave_wraps() {
        assert_eq!(coverage_to_alpha(0, FillRule::EvenOdd), 0.0);
        assert_eq!(coverage_to_alpha(256, FillRule::EvenOdd), 1.0);
        assert_eq!(coverage_to_alpha(512, FillRule::EvenOdd), 0.0);
        assert_eq!(coverage_to_alpha(640, FillRule::EvenOdd), 0.5);
    }

    #[test]
    fn multiply_spot_value() {
        let styling = Styling::new([0.8, 0.8, 0.8, 1.0], FillRule::NonZero, BlendMode::Multiply);
        let result = composite_layer([0.5, 0.5, 0.5, 1.0], &styling, 1.0);
        for channel in 0..3 {
            assert!((result[channel] - 0.4).abs() < 1e-6);
        }
        assert!((result[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn over_on_transparent_background_is_premultiplied_source() {
        let styling = Styling::new([1.0, 0.0, 0.0, 0.5], FillRule::NonZero, BlendMode::Over);
        let result = composite_layer([0.0; 4], &styling, 1.0);
        assert_eq!(result, [0.5, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn difference_and_exclusion() {
        let styling = Styling::new([0.25, 0.25, 0.25, 1.0], FillRule::NonZero, BlendMode::Difference);
        let result = composite_layer([0.75, 0.75, 0.75, 1.0], &styling, 1.0);
        for channel in 0..3 {
            assert!((result[channel] - 0.5).abs() < 1e-6);
        }

        let styling = Styling::new([0.5, 0.5, 0.5, 1.0], FillRule::NonZero, BlendMode::Exclusion);
        let result = composite_layer([0.5, 0.5, 0.5, 1.0], &styling, 1.0);
        for channel in 0..3 {
            assert!((result[channel] - 0.5).abs() < 1e-6);
        }
    }
}
