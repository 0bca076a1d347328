// Copyright 2023 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU implementations of the rasterization stages.
//!
//! These mirror the WGSL kernels bit for bit on the data model but run
//! sequentially: one loop iteration per workgroup, with the cooperative
//! phases of the compositor flattened into their natural serial order.
//! They back `RendererOptions::use_cpu` and give the integration tests a
//! pipeline that runs without a GPU adapter.

mod composite;
mod styling;
mod tile_range;

pub use composite::composite;
pub use tile_range::tile_range;

pub(crate) use styling::{composite_layer, coverage_to_alpha};
