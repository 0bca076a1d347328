// Copyright 2023 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless test harness: rasterizes a pixel-segment file with a styling
//! file into a fixed 1000×1000 frame and writes the result as a PNG.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use sorrel::util::RenderContext;
use sorrel::wgpu::{
    self, BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Extent3d, ImageCopyBuffer,
    TextureDescriptor, TextureFormat, TextureUsages,
};
use sorrel::{PixelSegment, RenderParams, Renderer, RendererOptions, Styling};
use sorrel_encoding::math::f16_to_f32;

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 1000;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Raw little-endian array of 64-bit pixel segments.
    psegment_file: PathBuf,
    /// Raw array of 32-byte styling records.
    styling_file: PathBuf,
    /// Where to write the PNG; defaults to the segment file with a .png
    /// extension.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Whether to use CPU shaders.
    #[arg(long)]
    use_cpu: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let segments = match read_psegments(&args.psegment_file) {
        Ok(segments) => segments,
        Err(err) => {
            eprintln!("couldn't open {}: {err:#}", args.psegment_file.display());
            return ExitCode::FAILURE;
        }
    };
    let stylings = match read_stylings(&args.styling_file) {
        Ok(stylings) => stylings,
        Err(err) => {
            eprintln!("couldn't open {}: {err:#}", args.styling_file.display());
            return ExitCode::FAILURE;
        }
    };
    match pollster::block_on(render(&segments, &stylings, &args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("render failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn read_psegments(path: &Path) -> Result<Vec<PixelSegment>> {
    let bytes = std::fs::read(path)?;
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| PixelSegment::from_bits(u64::from_le_bytes(chunk.try_into().unwrap())))
        .collect())
}

fn read_stylings(path: &Path) -> Result<Vec<Styling>> {
    let bytes = std::fs::read(path)?;
    if bytes.len() % std::mem::size_of::<Styling>() != 0 {
        bail!("styling file is not a whole number of 32-byte records");
    }
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}

async fn render(segments: &[PixelSegment], stylings: &[Styling], args: &Args) -> Result<()> {
    let mut context = RenderContext::new();
    let device_id = context
        .device()
        .await
        .ok_or_else(|| anyhow!("no compatible device found"))?;
    let device_handle = &mut context.devices[device_id];
    let device = &device_handle.device;
    let queue = &device_handle.queue;
    let mut renderer = Renderer::new(
        device,
        &RendererOptions {
            use_cpu: args.use_cpu,
        },
    )
    .context("creating renderer")?;

    let params = RenderParams::new(WIDTH, HEIGHT);
    let size = Extent3d {
        width: WIDTH,
        height: HEIGHT,
        depth_or_array_layers: 1,
    };
    let target = device.create_texture(&TextureDescriptor {
        label: Some("target texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TextureFormat::Rgba16Float,
        usage: TextureUsages::STORAGE_BINDING | TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    renderer
        .render_to_texture(device, queue, segments, stylings, &target, &params)
        .context("rendering")?;

    // rgba16float rows are 8 bytes per pixel; copies pad rows to 256.
    let padded_byte_width = (WIDTH * 8).next_multiple_of(256);
    let buffer_size = padded_byte_width as u64 * HEIGHT as u64;
    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("readback"),
        size: buffer_size,
        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
        label: Some("copy out buffer"),
    });
    encoder.copy_texture_to_buffer(
        target.as_image_copy(),
        ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_byte_width),
                rows_per_image: None,
            },
        },
        size,
    );
    queue.submit([encoder.finish()]);

    let buf_slice = buffer.slice(..);
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    buf_slice.map_async(wgpu::MapMode::Read, move |v| sender.send(v).unwrap());
    let _ = device.poll(wgpu::Maintain::Wait);
    match receiver.receive().await {
        Some(result) => result?,
        None => bail!("channel was closed"),
    }

    let data = buf_slice.get_mapped_range();
    let mut rgba = Vec::with_capacity((WIDTH * HEIGHT * 4) as usize);
    for row in 0..HEIGHT {
        let start = (row * padded_byte_width) as usize;
        for texel in data[start..start + (WIDTH * 8) as usize].chunks_exact(2) {
            let value = f16_to_f32(u16::from_le_bytes([texel[0], texel[1]]));
            rgba.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }
    drop(data);

    let out_path = args
        .out
        .clone()
        .unwrap_or_else(|| args.psegment_file.with_extension("png"));
    let mut file = File::create(&out_path)?;
    let mut png_encoder = png::Encoder::new(&mut file, WIDTH, HEIGHT);
    png_encoder.set_color(png::ColorType::Rgba);
    png_encoder.set_depth(png::BitDepth::Eight);
    let mut writer = png_encoder.write_header()?;
    writer.write_image_data(&rgba)?;
    writer.finish()?;
    println!("wrote result ({WIDTH}x{HEIGHT}) to {out_path:?}");
    Ok(())
}
