// Copyright 2022 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simple helpers for managing wgpu state.
//!
//! The rasterizer itself is headless; presenting the output texture is the
//! embedder's concern.

use wgpu::{Adapter, Device, Features, Instance, Limits, Queue, RequestAdapterOptions};

/// Simple render context that maintains wgpu state for rendering the
/// pipeline.
pub struct RenderContext {
    pub instance: Instance,
    pub devices: Vec<DeviceHandle>,
}

pub struct DeviceHandle {
    #[allow(unused)]
    adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl RenderContext {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let instance = Instance::new(wgpu::InstanceDescriptor::default());
        Self {
            instance,
            devices: Vec::new(),
        }
    }

    /// Finds or creates a compatible device handle id.
    pub async fn device(&mut self) -> Option<usize> {
        if self.devices.is_empty() {
            return self.new_device().await;
        }
        Some(0)
    }

    /// Creates a compatible device handle id.
    async fn new_device(&mut self) -> Option<usize> {
        let adapter = self
            .instance
            .request_adapter(&RequestAdapterOptions::default())
            .await?;
        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: Features::empty(),
                    required_limits: Limits::default(),
                },
                None,
            )
            .await
            .inspect_err(|err| log::error!("device request failed: {err}"))
            .ok()?;
        // Validation and kernel errors surface here; they never cross the
        // kernel boundary itself.
        device.on_uncaptured_error(Box::new(|err| {
            log::error!("wgpu error: {err}");
        }));
        let device_handle = DeviceHandle {
            adapter,
            device,
            queue,
        };
        self.devices.push(device_handle);
        Some(self.devices.len() - 1)
    }
}
