// Copyright 2022 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to a compute shader registered with the engine.
#[derive(Clone, Copy)]
pub struct ShaderId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

impl ResourceId {
    pub fn next() -> Self {
        Self(ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A recorded sequence of commands, replayed by the engine against a
/// device. Resources are lightweight proxies; the engine materializes them
/// on first use.
#[derive(Default)]
pub struct Recording {
    commands: Vec<Command>,
}

#[derive(Clone, Copy)]
pub struct BufferProxy {
    pub size: u64,
    pub id: ResourceId,
    pub name: &'static str,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Rgba16Float,
}

#[derive(Clone, Copy)]
pub struct ImageProxy {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub id: ResourceId,
}

#[derive(Clone, Copy)]
pub enum ResourceProxy {
    Buffer(BufferProxy),
    Image(ImageProxy),
}

pub enum Command {
    Upload(BufferProxy, Vec<u8>),
    UploadUniform(BufferProxy, Vec<u8>),
    Dispatch(ShaderId, (u32, u32, u32), Vec<ResourceProxy>),
    Clear(BufferProxy),
    FreeBuffer(BufferProxy),
}

/// The type of resource that will be bound to a slot in a shader.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    /// A storage buffer with read/write access.
    Buffer,
    /// A storage buffer with read only access.
    BufReadOnly,
    /// A small storage buffer to be used as uniforms.
    Uniform,
    /// A write-only storage image.
    Image(ImageFormat),
}

impl Recording {
    pub fn push(&mut self, cmd: Command) {
        self.commands.push(cmd);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn upload(&mut self, name: &'static str, data: impl Into<Vec<u8>>) -> BufferProxy {
        let data = data.into();
        let buf_proxy = BufferProxy::new(data.len() as u64, name);
        self.push(Command::Upload(buf_proxy, data));
        buf_proxy
    }

    pub fn upload_uniform(&mut self, name: &'static str, data: impl Into<Vec<u8>>) -> BufferProxy {
        let data = data.into();
        let buf_proxy = BufferProxy::new(data.len() as u64, name);
        self.push(Command::UploadUniform(buf_proxy, data));
        buf_proxy
    }

    pub fn dispatch<R>(&mut self, shader: ShaderId, wg_size: (u32, u32, u32), resources: R)
    where
        R: IntoIterator,
        R::Item: Into<ResourceProxy>,
    {
        self.push(Command::Dispatch(
            shader,
            wg_size,
            resources.into_iter().map(|r| r.into()).collect(),
        ));
    }

    pub fn clear_all(&mut self, buf: BufferProxy) {
        self.push(Command::Clear(buf));
    }

    pub fn free_buffer(&mut self, buf: BufferProxy) {
        self.push(Command::FreeBuffer(buf));
    }

    pub fn free_resource(&mut self, resource: ResourceProxy) {
        if let ResourceProxy::Buffer(buf) = resource {
            self.free_buffer(buf);
        }
    }
}

impl BufferProxy {
    pub fn new(size: u64, name: &'static str) -> Self {
        Self {
            // Zero-sized bindings trip validation; keep a minimum.
            size: size.max(16),
            id: ResourceId::next(),
            name,
        }
    }
}

impl ImageFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

impl ImageProxy {
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            format,
            id: ResourceId::next(),
        }
    }
}

impl ResourceProxy {
    pub fn as_buf(&self) -> Option<&BufferProxy> {
        match self {
            Self::Buffer(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageProxy> {
        match self {
            Self::Image(proxy) => Some(proxy),
            _ => None,
        }
    }
}

impl From<BufferProxy> for ResourceProxy {
    fn from(value: BufferProxy) -> Self {
        Self::Buffer(value)
    }
}

impl From<ImageProxy> for ResourceProxy {
    fn from(value: ImageProxy) -> Self {
        Self::Image(value)
    }
}
