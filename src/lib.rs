// Copyright 2022 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sorrel is a GPU tile compositor for 2D vector graphics. It consumes a
//! stream of bit-packed pixel segments — pre-tessellated, pixel-granular
//! edge contributions — and composites them into an rgba16float texture
//! with two compute dispatches: a tile-range index build over the sorted
//! stream, then a workgroup-per-tile-row sweep that integrates winding
//! across tile boundaries while blending layers in order.
//!
//! The heavy lifting happens in `shader/composite.wgsl`; every stage also
//! has a CPU mirror (see [`cpu_shader`]) selected by
//! [`RendererOptions::use_cpu`], which is what the test suite runs against.

mod engine;
mod render;
mod shaders;
mod wgpu_engine;

pub mod cpu_dispatch;
pub mod cpu_shader;
pub mod util;

/// Pixel-segment and styling encodings.
pub use sorrel_encoding as encoding;
pub use sorrel_encoding::{BlendMode, FillRule, PixelSegment, Styling};

pub use engine::{
    BindType, BufferProxy, Command, ImageFormat, ImageProxy, Recording, ResourceId, ResourceProxy,
    ShaderId,
};
pub use render::render_full;
pub use shaders::FullShaders;
pub use wgpu;

use thiserror::Error;
use wgpu::{Device, Queue, Texture};
use wgpu_engine::{ExternalResource, WgpuEngine};

/// Errors that can occur in sorrel.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// There is no available device with the features required by sorrel.
    #[error("couldn't find suitable device")]
    NoCompatibleDevice,
    /// Used a buffer inside a recording while it was not available.
    #[error("buffer '{0}' is not available but used for {1}")]
    UnavailableBufferUsed(&'static str, &'static str),
    /// A dispatch bound an image that was not among the external resources.
    #[error("image is not available for dispatch")]
    UnavailableImageUsed,
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Parameters used in a single render that are configurable by the client.
pub struct RenderParams {
    /// Dimensions of the rasterization target.
    pub width: u32,
    pub height: u32,
    /// Bound on spilled layer carries per tile row. A tile boundary
    /// crossed by more than `WORKGROUP_CARRIES + carry_spills_per_row`
    /// distinct-layer carries silently drops the excess.
    pub carry_spills_per_row: u32,
}

impl RenderParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            carry_spills_per_row: sorrel_encoding::DEFAULT_CARRY_SPILLS_PER_ROW,
        }
    }
}

pub struct RendererOptions {
    /// If true, run both stages on the CPU.
    pub use_cpu: bool,
}

/// Renders sorted pixel-segment streams into a texture.
pub struct Renderer {
    engine: WgpuEngine,
    shaders: FullShaders,
}

impl Renderer {
    /// Creates a new renderer for the specified device.
    pub fn new(device: &Device, options: &RendererOptions) -> Result<Self> {
        let mut engine = WgpuEngine::new(options.use_cpu);
        let shaders = shaders::full_shaders(device, &mut engine)?;
        Ok(Self { engine, shaders })
    }

    /// Renders a segment stream to the target texture.
    ///
    /// Segments are sorted here on the CPU by their canonical unsigned
    /// 64-bit key; the kernels assume that order. The texture must have
    /// been created with the [`wgpu::TextureFormat::Rgba16Float`] format
    /// and the [`wgpu::TextureUsages::STORAGE_BINDING`] flag set, and
    /// match the dimensions in `params`.
    pub fn render_to_texture(
        &mut self,
        device: &Device,
        queue: &Queue,
        segments: &[PixelSegment],
        stylings: &[Styling],
        texture: &Texture,
        params: &RenderParams,
    ) -> Result<()> {
        if params.width == 0 || params.height == 0 {
            return Ok(());
        }
        let mut sorted = segments.to_vec();
        sorted.sort_unstable();
        let (recording, target) = render::render_full(&sorted, stylings, &self.shaders, params);
        let external_resources = [ExternalResource::Image(
            *target.as_image().unwrap(),
            texture,
        )];
        self.engine.run_recording(
            device,
            queue,
            &recording,
            &external_resources,
            "render_to_texture",
        )
    }
}
