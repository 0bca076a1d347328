// Copyright 2023 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Support for CPU implementations of compute shaders.

use std::{
    cell::{RefCell, RefMut},
    ops::Deref,
};

#[derive(Clone, Copy)]
pub enum CpuBinding<'a> {
    Buffer(&'a [u8]),
    BufferRW(&'a RefCell<Vec<u8>>),
    Texture(&'a RefCell<CpuTexture>),
}

pub enum CpuBufGuard<'a> {
    Slice(&'a [u8]),
    Interior(RefMut<'a, Vec<u8>>),
}

impl<'a> Deref for CpuBufGuard<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            CpuBufGuard::Slice(s) => s,
            CpuBufGuard::Interior(r) => r,
        }
    }
}

impl<'a> CpuBufGuard<'a> {
    /// Get a mutable reference to the buffer.
    ///
    /// Panics if the underlying resource is read-only.
    pub fn as_mut(&mut self) -> &mut [u8] {
        match self {
            CpuBufGuard::Interior(r) => &mut *r,
            _ => panic!("tried to borrow immutable buffer as mutable"),
        }
    }
}

impl<'a> CpuBinding<'a> {
    pub fn as_buf(&self) -> CpuBufGuard {
        match self {
            CpuBinding::Buffer(b) => CpuBufGuard::Slice(b),
            CpuBinding::BufferRW(b) => CpuBufGuard::Interior(b.borrow_mut()),
            _ => panic!("resource type mismatch"),
        }
    }

    pub fn as_tex(&self) -> RefMut<CpuTexture> {
        match self {
            CpuBinding::Texture(t) => t.borrow_mut(),
            _ => panic!("resource type mismatch"),
        }
    }
}

/// Storage-image stand-in for CPU shaders.
///
/// Pixels stay in full f32 precision; conversion to the rgba16float wire
/// format happens only when the texture is uploaded to the GPU.
pub struct CpuTexture {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[f32; 4]>,
}

impl CpuTexture {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width * height],
        }
    }

    pub fn store(&mut self, x: usize, y: usize, value: [f32; 4]) {
        self.pixels[y * self.width + x] = value;
    }

    pub fn load(&self, x: usize, y: usize) -> [f32; 4] {
        self.pixels[y * self.width + x]
    }
}
