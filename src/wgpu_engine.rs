// Copyright 2023 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::{
    borrow::Cow,
    cell::RefCell,
    collections::{hash_map::Entry, HashMap, HashSet},
};

use wgpu::{
    BindGroup, BindGroupLayout, Buffer, BufferUsages, CommandEncoder, CommandEncoderDescriptor,
    ComputePipeline, Device, Queue, Texture,
};

use crate::{
    cpu_dispatch::{CpuBinding, CpuTexture},
    engine::{
        BindType, BufferProxy, Command, ImageProxy, Recording, ResourceId, ResourceProxy, ShaderId,
    },
    Error, Result,
};

#[derive(Default)]
pub struct WgpuEngine {
    shaders: Vec<Shader>,
    pool: ResourcePool,
    bind_map: BindMap,
    pub(crate) use_cpu: bool,
}

struct WgpuShader {
    pipeline: ComputePipeline,
    bind_group_layout: BindGroupLayout,
}

/// The CPU implementation a shader may carry alongside its WGSL.
pub enum CpuShaderType {
    Present(fn(u32, &[CpuBinding])),
    Missing,
}

struct CpuShader {
    shader: fn(u32, &[CpuBinding]),
}

enum ShaderKind<'a> {
    Wgpu(&'a WgpuShader),
    Cpu(&'a CpuShader),
}

struct Shader {
    label: &'static str,
    wgpu: Option<WgpuShader>,
    cpu: Option<CpuShader>,
}

impl Shader {
    fn select(&self) -> ShaderKind {
        if let Some(cpu) = self.cpu.as_ref() {
            ShaderKind::Cpu(cpu)
        } else if let Some(wgpu) = self.wgpu.as_ref() {
            ShaderKind::Wgpu(wgpu)
        } else {
            panic!("no available shader for {}", self.label)
        }
    }
}

pub enum ExternalResource<'a> {
    #[allow(unused)]
    Buffer(BufferProxy, &'a Buffer),
    Image(ImageProxy, &'a Texture),
}

/// A buffer can exist either on the GPU or on CPU.
enum MaterializedBuffer {
    Gpu(Buffer),
    Cpu(RefCell<Vec<u8>>),
}

struct BindMapBuffer {
    buffer: MaterializedBuffer,
}

#[derive(Default)]
struct BindMap {
    buf_map: HashMap<ResourceId, BindMapBuffer>,
    cpu_images: HashMap<ResourceId, RefCell<CpuTexture>>,
    pending_clears: HashSet<ResourceId>,
}

#[derive(Hash, PartialEq, Eq)]
struct BufferProperties {
    size: u64,
    usages: BufferUsages,
}

#[derive(Default)]
struct ResourcePool {
    bufs: HashMap<BufferProperties, Vec<Buffer>>,
}

impl WgpuEngine {
    pub fn new(use_cpu: bool) -> Self {
        Self {
            use_cpu,
            ..Default::default()
        }
    }

    /// Add a shader.
    ///
    /// This function is somewhat limited: it doesn't support push constants
    /// and the entry point is hardcoded as "main". When the engine runs in
    /// CPU mode and a CPU implementation is present, pipeline compilation
    /// is skipped entirely.
    pub fn add_shader(
        &mut self,
        device: &Device,
        label: &'static str,
        wgsl: Cow<'static, str>,
        layout: &[BindType],
        cpu_shader: CpuShaderType,
    ) -> Result<ShaderId> {
        let mut add = |shader| {
            let id = self.shaders.len();
            self.shaders.push(shader);
            Ok(ShaderId(id))
        };

        if self.use_cpu {
            if let CpuShaderType::Present(shader) = cpu_shader {
                return add(Shader {
                    label,
                    wgpu: None,
                    cpu: Some(CpuShader { shader }),
                });
            }
        }

        let wgpu = Self::create_compute_pipeline(device, label, wgsl, layout);
        add(Shader {
            label,
            wgpu: Some(wgpu),
            cpu: None,
        })
    }

    pub fn run_recording(
        &mut self,
        device: &Device,
        queue: &Queue,
        recording: &Recording,
        external_resources: &[ExternalResource],
        label: &'static str,
    ) -> Result<()> {
        let mut encoder =
            device.create_command_encoder(&CommandEncoderDescriptor { label: Some(label) });
        for command in recording.commands() {
            match command {
                Command::Upload(buf_proxy, bytes) => {
                    if self.use_cpu {
                        self.bind_map
                            .insert_cpu_buf(buf_proxy, bytes.clone());
                    } else {
                        let usage =
                            BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC;
                        let buf = self.pool.get_buf(buf_proxy.size, usage, device);
                        queue.write_buffer(&buf, 0, bytes);
                        self.bind_map.insert_gpu_buf(buf_proxy, buf);
                    }
                }
                Command::UploadUniform(buf_proxy, bytes) => {
                    if self.use_cpu {
                        self.bind_map
                            .insert_cpu_buf(buf_proxy, bytes.clone());
                    } else {
                        let usage = BufferUsages::UNIFORM | BufferUsages::COPY_DST;
                        let buf = self.pool.get_buf(buf_proxy.size, usage, device);
                        queue.write_buffer(&buf, 0, bytes);
                        self.bind_map.insert_gpu_buf(buf_proxy, buf);
                    }
                }
                Command::Dispatch(shader_id, wg_size, bindings) => {
                    let shader = &self.shaders[shader_id.0];
                    match shader.select() {
                        ShaderKind::Cpu(cpu_shader) => {
                            let shader_fn = cpu_shader.shader;
                            for binding in bindings {
                                self.bind_map.materialize_cpu_resource(binding);
                            }
                            let resources = bindings
                                .iter()
                                .map(|binding| self.bind_map.cpu_binding(binding))
                                .collect::<Result<Vec<_>>>()?;
                            shader_fn(wg_size.0, &resources);
                        }
                        ShaderKind::Wgpu(wgpu_shader) => {
                            let bind_group = Self::create_bind_group(
                                &mut self.bind_map,
                                &mut self.pool,
                                device,
                                &mut encoder,
                                &wgpu_shader.bind_group_layout,
                                bindings,
                                external_resources,
                            )?;
                            let mut cpass =
                                encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                                    label: Some(shader.label),
                                    timestamp_writes: None,
                                });
                            cpass.set_pipeline(&wgpu_shader.pipeline);
                            cpass.set_bind_group(0, &bind_group, &[]);
                            cpass.dispatch_workgroups(wg_size.0, wg_size.1, wg_size.2);
                        }
                    }
                }
                Command::Clear(proxy) => {
                    if let Some(buf) = self.bind_map.buf_map.get(&proxy.id) {
                        match &buf.buffer {
                            MaterializedBuffer::Gpu(b) => encoder.clear_buffer(b, 0, None),
                            MaterializedBuffer::Cpu(b) => b.borrow_mut().fill(0),
                        }
                    } else {
                        // Materialized lazily; fresh buffers start zeroed but
                        // pooled ones must be cleared on reuse.
                        self.bind_map.pending_clears.insert(proxy.id);
                    }
                }
                Command::FreeBuffer(proxy) => {
                    if let Some(buf) = self.bind_map.buf_map.remove(&proxy.id) {
                        if let MaterializedBuffer::Gpu(gpu_buf) = buf.buffer {
                            let props = BufferProperties {
                                size: gpu_buf.size(),
                                usages: gpu_buf.usage(),
                            };
                            self.pool.bufs.entry(props).or_default().push(gpu_buf);
                        }
                    }
                }
            }
        }
        if self.use_cpu {
            self.upload_cpu_images(queue, external_resources);
        }
        queue.submit(Some(encoder.finish()));
        Ok(())
    }

    /// Copies the CPU-shader output images into their external textures,
    /// converting to the rgba16float wire format.
    fn upload_cpu_images(&mut self, queue: &Queue, external_resources: &[ExternalResource]) {
        use sorrel_encoding::math::f32_to_f16;
        for resource in external_resources {
            let ExternalResource::Image(proxy, texture) = resource else {
                continue;
            };
            let Some(cpu_texture) = self.bind_map.cpu_images.remove(&proxy.id) else {
                continue;
            };
            let cpu_texture = cpu_texture.into_inner();
            let mut bytes = Vec::with_capacity(cpu_texture.pixels.len() * 8);
            for pixel in &cpu_texture.pixels {
                for channel in pixel {
                    bytes.extend_from_slice(&f32_to_f16(*channel).to_le_bytes());
                }
            }
            queue.write_texture(
                texture.as_image_copy(),
                &bytes,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(proxy.width * 8),
                    rows_per_image: None,
                },
                wgpu::Extent3d {
                    width: proxy.width,
                    height: proxy.height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_bind_group(
        bind_map: &mut BindMap,
        pool: &mut ResourcePool,
        device: &Device,
        encoder: &mut CommandEncoder,
        layout: &BindGroupLayout,
        bindings: &[ResourceProxy],
        external_resources: &[ExternalResource],
    ) -> Result<BindGroup> {
        for proxy in bindings {
            if let ResourceProxy::Buffer(proxy) = proxy {
                if let Entry::Vacant(v) = bind_map.buf_map.entry(proxy.id) {
                    let usage =
                        BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC;
                    let buf = pool.get_buf(proxy.size, usage, device);
                    if bind_map.pending_clears.remove(&proxy.id) {
                        encoder.clear_buffer(&buf, 0, None);
                    }
                    v.insert(BindMapBuffer {
                        buffer: MaterializedBuffer::Gpu(buf),
                    });
                }
            }
        }
        let views = bindings
            .iter()
            .map(|proxy| match proxy {
                ResourceProxy::Image(proxy) => find_image(external_resources, proxy)
                    .map(|texture| Some(texture.create_view(&Default::default())))
                    .ok_or(Error::UnavailableImageUsed),
                ResourceProxy::Buffer(_) => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        let entries = bindings
            .iter()
            .zip(&views)
            .enumerate()
            .map(|(i, (proxy, view))| match proxy {
                ResourceProxy::Buffer(proxy) => {
                    let buf = bind_map
                        .get_gpu_buf(proxy.id)
                        .ok_or(Error::UnavailableBufferUsed(proxy.name, "dispatch"))?;
                    Ok(wgpu::BindGroupEntry {
                        binding: i as u32,
                        resource: buf.as_entire_binding(),
                    })
                }
                ResourceProxy::Image(_) => Ok(wgpu::BindGroupEntry {
                    binding: i as u32,
                    resource: wgpu::BindingResource::TextureView(view.as_ref().unwrap()),
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &entries,
        }))
    }

    fn create_compute_pipeline(
        device: &Device,
        label: &str,
        wgsl: Cow<'_, str>,
        layout: &[BindType],
    ) -> WgpuShader {
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(wgsl),
        });
        let entries = layout
            .iter()
            .enumerate()
            .map(|(i, bind_type)| match bind_type {
                BindType::Buffer | BindType::BufReadOnly => wgpu::BindGroupLayoutEntry {
                    binding: i as u32,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage {
                            read_only: *bind_type == BindType::BufReadOnly,
                        },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindType::Uniform => wgpu::BindGroupLayoutEntry {
                    binding: i as u32,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindType::Image(format) => wgpu::BindGroupLayoutEntry {
                    binding: i as u32,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: format.to_wgpu(),
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            })
            .collect::<Vec<_>>();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: None,
            entries: &entries,
        });
        let compute_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&compute_pipeline_layout),
            module: &shader_module,
            entry_point: "main",
        });
        WgpuShader {
            pipeline,
            bind_group_layout,
        }
    }
}

fn find_image<'a>(resources: &[ExternalResource<'a>], proxy: &ImageProxy) -> Option<&'a Texture> {
    resources.iter().find_map(|resource| match resource {
        ExternalResource::Image(p, texture) if p.id == proxy.id => Some(*texture),
        _ => None,
    })
}

impl BindMap {
    fn insert_gpu_buf(&mut self, proxy: &BufferProxy, buffer: Buffer) {
        self.buf_map.insert(
            proxy.id,
            BindMapBuffer {
                buffer: MaterializedBuffer::Gpu(buffer),
            },
        );
    }

    fn insert_cpu_buf(&mut self, proxy: &BufferProxy, mut bytes: Vec<u8>) {
        // Bindings are sized by the proxy, not the upload.
        bytes.resize(proxy.size as usize, 0);
        self.buf_map.insert(
            proxy.id,
            BindMapBuffer {
                buffer: MaterializedBuffer::Cpu(RefCell::new(bytes)),
            },
        );
    }

    /// Get a buffer, only if it's on GPU.
    fn get_gpu_buf(&self, id: ResourceId) -> Option<&Buffer> {
        self.buf_map.get(&id).and_then(|b| match &b.buffer {
            MaterializedBuffer::Gpu(b) => Some(b),
            _ => None,
        })
    }

    /// First of the two CPU-dispatch phases: create any resource the
    /// dispatch touches that doesn't exist yet, so the second phase can
    /// hand out plain borrows.
    fn materialize_cpu_resource(&mut self, proxy: &ResourceProxy) {
        match proxy {
            ResourceProxy::Buffer(proxy) => {
                self.pending_clears.remove(&proxy.id);
                self.buf_map.entry(proxy.id).or_insert_with(|| BindMapBuffer {
                    buffer: MaterializedBuffer::Cpu(RefCell::new(vec![0; proxy.size as usize])),
                });
            }
            ResourceProxy::Image(proxy) => {
                // External textures only matter at upload time; CPU shaders
                // always write the staging image.
                self.cpu_images.entry(proxy.id).or_insert_with(|| {
                    RefCell::new(CpuTexture::new(proxy.width as usize, proxy.height as usize))
                });
            }
        }
    }

    fn cpu_binding(&self, proxy: &ResourceProxy) -> Result<CpuBinding> {
        match proxy {
            ResourceProxy::Buffer(proxy) => match &self
                .buf_map
                .get(&proxy.id)
                .ok_or(Error::UnavailableBufferUsed(proxy.name, "cpu dispatch"))?
                .buffer
            {
                MaterializedBuffer::Cpu(b) => Ok(CpuBinding::BufferRW(b)),
                MaterializedBuffer::Gpu(_) => {
                    Err(Error::UnavailableBufferUsed(proxy.name, "cpu dispatch"))
                }
            },
            ResourceProxy::Image(proxy) => self
                .cpu_images
                .get(&proxy.id)
                .map(CpuBinding::Texture)
                .ok_or(Error::UnavailableImageUsed),
        }
    }
}

const SIZE_CLASS_BITS: u32 = 1;

impl ResourcePool {
    /// Get a buffer from the pool or create one.
    fn get_buf(&mut self, size: u64, usage: BufferUsages, device: &Device) -> Buffer {
        let rounded_size = Self::size_class(size, SIZE_CLASS_BITS);
        let props = BufferProperties {
            size: rounded_size,
            usages: usage,
        };
        if let Some(buf_vec) = self.bufs.get_mut(&props) {
            if let Some(buf) = buf_vec.pop() {
                return buf;
            }
        }
        device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: rounded_size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Quantize a size up to the nearest size class.
    fn size_class(x: u64, bits: u32) -> u64 {
        if x > 1 << bits {
            let a = (x - 1).leading_zeros();
            let b = (x - 1) | (((u64::MAX / 2) >> bits) >> a);
            b + 1
        } else {
            1 << bits
        }
    }
}
