// Copyright 2022 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Load the rasterization shaders.

mod preprocess;

use std::collections::HashMap;

use wgpu::Device;

use crate::{
    cpu_shader,
    engine::{BindType, ImageFormat, ShaderId},
    wgpu_engine::{CpuShaderType, WgpuEngine},
    Result,
};

macro_rules! shader {
    ($name:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shader/", $name, ".wgsl"))
    };
}

macro_rules! shared_shader {
    ($name:expr) => {
        (
            $name,
            include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shader/shared/", $name, ".wgsl")),
        )
    };
}

const SHARED_SHADERS: &[(&str, &str)] = &[
    shared_shader!("config"),
    shared_shader!("psegment"),
    shared_shader!("styling"),
];

/// The two pipeline stages.
pub struct FullShaders {
    pub tile_range: ShaderId,
    pub composite: ShaderId,
}

pub fn full_shaders(device: &Device, engine: &mut WgpuEngine) -> Result<FullShaders> {
    let imports = SHARED_SHADERS.iter().copied().collect::<HashMap<_, _>>();
    let tile_range = engine.add_shader(
        device,
        "tile_range",
        preprocess::preprocess(shader!("tile_range"), &imports).into(),
        &[BindType::Uniform, BindType::BufReadOnly, BindType::Buffer],
        CpuShaderType::Present(cpu_shader::tile_range),
    )?;
    let composite = engine.add_shader(
        device,
        "composite",
        preprocess::preprocess(shader!("composite"), &imports).into(),
        &[
            BindType::Uniform,
            BindType::BufReadOnly,
            BindType::BufReadOnly,
            BindType::BufReadOnly,
            BindType::Buffer,
            BindType::Image(ImageFormat::Rgba16Float),
        ],
        CpuShaderType::Present(cpu_shader::composite),
    )?;
    Ok(FullShaders {
        tile_range,
        composite,
    })
}
