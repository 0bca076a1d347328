// Copyright 2022 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

/// Determines how accumulated winding converts to coverage alpha.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum FillRule {
    #[default]
    NonZero = 0,
    EvenOdd = 1,
}

impl FillRule {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::EvenOdd,
            _ => Self::NonZero,
        }
    }
}

/// Color mixing applied when a layer is composited over the accumulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum BlendMode {
    #[default]
    Over = 0,
    Multiply = 1,
    Screen = 2,
    Overlay = 3,
    Darken = 4,
    Lighten = 5,
    ColorDodge = 6,
    ColorBurn = 7,
    HardLight = 8,
    SoftLight = 9,
    Difference = 10,
    Exclusion = 11,
}

impl BlendMode {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Multiply,
            2 => Self::Screen,
            3 => Self::Overlay,
            4 => Self::Darken,
            5 => Self::Lighten,
            6 => Self::ColorDodge,
            7 => Self::ColorBurn,
            8 => Self::HardLight,
            9 => Self::SoftLight,
            10 => Self::Difference,
            11 => Self::Exclusion,
            _ => Self::Over,
        }
    }
}

/// Per-layer styling record.
///
/// The layout is the wire format of styling files: 32 bytes per record,
/// matching `Styling` in `shader/shared/styling.wgsl`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Styling {
    /// RGBA fill color; alpha is folded into the coverage at composite time.
    pub fill: [f32; 4],
    pub fill_rule: u32,
    pub blend_mode: u32,
    pub padding: [u32; 2],
}

impl Styling {
    pub fn new(fill: [f32; 4], fill_rule: FillRule, blend_mode: BlendMode) -> Self {
        Self {
            fill,
            fill_rule: fill_rule as u32,
            blend_mode: blend_mode as u32,
            padding: [0; 2],
        }
    }
}
