// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Direct3D 12 vertex and index buffers.
//!
//! Dynamic buffers live in an `UPLOAD` heap, stay persistently mapped and
//! are written in place at the region of the current ring slot. Static
//! buffers live in a `DEFAULT` heap; an update fills a staging buffer and
//! records a copy between two transition barriers.

use super::command_buffer::D3D12CommandBuffer;
use super::device::D3D12Device;
use super::native::{
    D3D12Command, D3D12Resource, D3D12ResourceStates, IndexBufferView, TransitionBarrier,
    VertexBufferView, ALL_SUBRESOURCES,
};
use crate::graphics::buffers::{replace_slot, vertex_slot, GeometryBuffer};
use crate::graphics::d3d_common::index_format;
use crate::graphics::downcast_mut;
use std::any::Any;
use std::collections::HashSet;
use verus_core::cgi::api::{BufferId, DeviceResource, GeometryDesc, GeometryLayout};
use verus_core::cgi::context::OneTimeSubmit;
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::{CommandBuffer, Geometry};
use verus_core::RenderContext;

/// Vertex and index buffers of one Direct3D 12 geometry.
pub struct D3D12Geometry {
    device: D3D12Device,
    name: String,
    layout: GeometryLayout,
    vertex_buffers: Vec<Option<GeometryBuffer>>,
    index_buffer: Option<GeometryBuffer>,
    /// Static buffers that received at least one upload.
    uploaded: HashSet<BufferId>,
}

impl D3D12Geometry {
    pub(crate) fn new(device: D3D12Device) -> Self {
        Self {
            device,
            name: String::new(),
            layout: GeometryLayout::default(),
            vertex_buffers: Vec::new(),
            index_buffer: None,
            uploaded: HashSet::new(),
        }
    }

    pub(crate) fn vertex_buffer_view(&self, binding: usize, ring_index: usize) -> Result<VertexBufferView> {
        let buffer = vertex_slot(&self.vertex_buffers, binding)?;
        Ok(VertexBufferView {
            buffer: buffer.id,
            offset: buffer.region_offset(ring_index) as u64,
            size_in_bytes: buffer.region_size() as u32,
            stride_in_bytes: buffer.stride,
        })
    }

    pub(crate) fn index_buffer_view(&self, ring_index: usize) -> Result<IndexBufferView> {
        let buffer = self.require_index_buffer()?;
        Ok(IndexBufferView {
            buffer: buffer.id,
            offset: buffer.region_offset(ring_index) as u64,
            size_in_bytes: buffer.region_size() as u32,
            format: index_format(self.layout.thirty_two_bit_indices()),
        })
    }

    fn require_index_buffer(&self) -> Result<GeometryBuffer> {
        self.index_buffer.ok_or_else(|| {
            ConfigurationError::Invalid(format!("geometry '{}' has no index buffer", self.name)).into()
        })
    }

    fn allocate(&self, ctx: &RenderContext, name: String, count: u32, stride: u32, dynamic: bool) -> GeometryBuffer {
        let state = if dynamic {
            D3D12ResourceStates::GENERIC_READ
        } else {
            D3D12ResourceStates::COMMON
        };
        GeometryBuffer::allocate(
            self.device.resources(),
            name,
            count,
            stride,
            dynamic,
            ctx.ring_buffer_depth(),
            state.bits(),
        )
    }

    fn write(
        &mut self,
        ctx: &RenderContext,
        buffer: GeometryBuffer,
        target: D3D12ResourceStates,
        data: &[u8],
        cb: Option<&mut dyn CommandBuffer>,
        size: u32,
        offset: u32,
    ) -> Result<()> {
        let update = buffer.resolve_update(data, size, offset)?;
        if buffer.dynamic {
            let at = buffer.region_offset(ctx.ring_buffer_index()) + update.offset;
            return self.device.resources().write_buffer(buffer.id, at, update.bytes);
        }

        let staging = self.device.resources().create_buffer(
            format!("{} staging", self.name),
            update.bytes.len(),
            D3D12ResourceStates::GENERIC_READ.bits(),
        );
        self.device.resources().write_buffer(staging, 0, update.bytes)?;
        let before = if self.uploaded.contains(&buffer.id) {
            target
        } else {
            D3D12ResourceStates::COMMON
        };
        let barrier = |before, after| {
            D3D12Command::ResourceBarrier(vec![TransitionBarrier {
                resource: D3D12Resource::Buffer(buffer.id),
                subresource: ALL_SUBRESOURCES,
                before,
                after,
            }])
        };
        let commands = vec![
            barrier(before, D3D12ResourceStates::COPY_DEST),
            D3D12Command::CopyBufferRegion {
                dst: buffer.id,
                dst_offset: update.offset as u64,
                src: staging,
                src_offset: 0,
                num_bytes: update.bytes.len() as u64,
            },
            barrier(D3D12ResourceStates::COPY_DEST, target),
        ];

        let recorded = match cb {
            Some(cb) => downcast_mut::<D3D12CommandBuffer>(cb.as_any_mut(), "D3D12CommandBuffer")
                .and_then(|cb| cb.record_all(commands)),
            None => OneTimeSubmit::begin(ctx).and_then(|mut submit| {
                downcast_mut::<D3D12CommandBuffer>(submit.command_buffer()?.as_any_mut(), "D3D12CommandBuffer")?
                    .record_all(commands)?;
                submit.finish()
            }),
        };
        ctx.retire(DeviceResource::Buffer(staging), 0);
        recorded?;
        self.uploaded.insert(buffer.id);
        Ok(())
    }

    fn retire(&mut self, ctx: &RenderContext, buffer: Option<GeometryBuffer>) {
        if let Some(buffer) = buffer {
            self.uploaded.remove(&buffer.id);
            ctx.retire(DeviceResource::Buffer(buffer.id), 0);
        }
    }
}

impl Geometry for D3D12Geometry {
    fn init(&mut self, _ctx: &RenderContext, desc: &GeometryDesc) -> Result<()> {
        self.layout = GeometryLayout::parse(desc)?;
        self.name = desc.name.clone();
        log::debug!(
            "D3D12 geometry '{}': {} bindings, {}-bit indices",
            self.name,
            self.layout.binding_count(),
            if self.layout.thirty_two_bit_indices() { 32 } else { 16 }
        );
        Ok(())
    }

    fn done(&mut self, ctx: &RenderContext) {
        let buffers: Vec<_> = self.vertex_buffers.drain(..).collect();
        for buffer in buffers {
            self.retire(ctx, buffer);
        }
        let index_buffer = self.index_buffer.take();
        self.retire(ctx, index_buffer);
    }

    fn create_vertex_buffer(&mut self, ctx: &RenderContext, count: u32, binding: usize) -> Result<()> {
        let stride = self.layout.stride(binding)?;
        let dynamic = self.layout.is_dynamic(binding);
        let buffer = self.allocate(ctx, format!("{} VB{binding}", self.name), count, stride, dynamic);
        let old = replace_slot(&mut self.vertex_buffers, binding, buffer);
        self.retire(ctx, old);
        Ok(())
    }

    fn create_index_buffer(&mut self, ctx: &RenderContext, count: u32) -> Result<()> {
        let stride = self.layout.index_stride();
        let dynamic = self.layout.is_index_dynamic();
        let buffer = self.allocate(ctx, format!("{} IB", self.name), count, stride, dynamic);
        let old = self.index_buffer.replace(buffer);
        self.retire(ctx, old);
        Ok(())
    }

    fn update_vertex_buffer(
        &mut self,
        ctx: &RenderContext,
        data: &[u8],
        binding: usize,
        cb: Option<&mut dyn CommandBuffer>,
        size: u32,
        offset: u32,
    ) -> Result<()> {
        let buffer = *vertex_slot(&self.vertex_buffers, binding)?;
        self.write(ctx, buffer, D3D12ResourceStates::VERTEX_AND_CONSTANT_BUFFER, data, cb, size, offset)
    }

    fn update_index_buffer(
        &mut self,
        ctx: &RenderContext,
        data: &[u8],
        cb: Option<&mut dyn CommandBuffer>,
        size: u32,
        offset: u32,
    ) -> Result<()> {
        let buffer = self.require_index_buffer()?;
        self.write(ctx, buffer, D3D12ResourceStates::INDEX_BUFFER, data, cb, size, offset)
    }

    fn layout(&self) -> &GeometryLayout {
        &self.layout
    }

    fn vertex_buffer(&self, binding: usize) -> Option<BufferId> {
        self.vertex_buffers.get(binding).copied().flatten().map(|b| b.id)
    }

    fn index_buffer(&self) -> Option<BufferId> {
        self.index_buffer.map(|b| b.id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::create_context;
    use verus_core::cgi::api::{BackendKind, CgiSettings, VertexInputAttrDesc, ViaType, ViaUsage};

    fn desc(dynamic_mask: u32) -> GeometryDesc {
        GeometryDesc {
            name: "Tri".into(),
            vertex_input_attrs: vec![VertexInputAttrDesc::new(
                0,
                0,
                ViaType::Floats,
                3,
                ViaUsage::Position,
                0,
            )],
            strides: vec![12],
            dynamic_bindings_mask: dynamic_mask,
            thirty_two_bit_indices: true,
        }
    }

    fn device(ctx: &RenderContext) -> &D3D12Device {
        crate::graphics::downcast::<D3D12Device>(ctx.device().as_any(), "D3D12Device").unwrap()
    }

    #[test]
    fn test_static_upload_goes_through_staging() {
        let mut ctx = create_context(CgiSettings::for_backend(BackendKind::D3D12)).unwrap();
        let mut geo = ctx.create_geometry(&desc(0)).unwrap();
        geo.create_vertex_buffer(&ctx, 3, 0).unwrap();
        device(&ctx).enable_command_log(true);

        geo.update_vertex_buffer(&ctx, &[9; 36], 0, None, 0, 0).unwrap();
        geo.update_vertex_buffer(&ctx, &[4; 12], 0, None, 1, 2).unwrap();

        let log = device(&ctx).take_command_log();
        assert_eq!(log.len(), 6);
        let D3D12Command::ResourceBarrier(first) = &log[0] else {
            panic!("expected a barrier, got {:?}", log[0]);
        };
        assert_eq!(first[0].before, D3D12ResourceStates::COMMON);
        let D3D12Command::ResourceBarrier(second) = &log[3] else {
            panic!("expected a barrier, got {:?}", log[3]);
        };
        assert_eq!(second[0].before, D3D12ResourceStates::VERTEX_AND_CONSTANT_BUFFER);
        assert!(matches!(log[4], D3D12Command::CopyBufferRegion { dst_offset: 24, num_bytes: 12, .. }));

        let id = geo.vertex_buffer(0).unwrap();
        let data = ctx.device().read_buffer(id).unwrap();
        assert_eq!(&data[..24], &[9; 24]);
        assert_eq!(&data[24..], &[4; 12]);
        assert_eq!(ctx.pending_retirements(), 2);
        geo.done(&ctx);
        ctx.shutdown().unwrap();
        assert_eq!(device(&ctx).stats().live_buffers, 0);
    }

    #[test]
    fn test_dynamic_update_writes_ring_region() {
        let mut ctx = create_context(CgiSettings::for_backend(BackendKind::D3D12)).unwrap();
        let mut geo = ctx.create_geometry(&desc(0x1)).unwrap();
        geo.create_vertex_buffer(&ctx, 2, 0).unwrap();
        device(&ctx).enable_command_log(true);

        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        ctx.begin_frame().unwrap();
        geo.update_vertex_buffer(&ctx, &[7; 24], 0, None, 0, 0).unwrap();
        assert!(device(&ctx).take_command_log().is_empty());

        let d3d12 = geo.as_any().downcast_ref::<D3D12Geometry>().unwrap();
        let view = d3d12.vertex_buffer_view(0, ctx.ring_buffer_index()).unwrap();
        assert_eq!((view.offset, view.size_in_bytes, view.stride_in_bytes), (24, 24, 12));
        let data = ctx.device().read_buffer(view.buffer).unwrap();
        assert_eq!(&data[24..48], &[7; 24]);
        assert!(data[..24].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_index_view_needs_index_buffer() {
        let ctx = create_context(CgiSettings::for_backend(BackendKind::D3D12)).unwrap();
        let mut geo = ctx.create_geometry(&desc(0)).unwrap();
        let d3d12 = geo.as_any().downcast_ref::<D3D12Geometry>().unwrap();
        assert!(d3d12.index_buffer_view(0).is_err());
        geo.create_index_buffer(&ctx, 6).unwrap();
        let d3d12 = geo.as_any().downcast_ref::<D3D12Geometry>().unwrap();
        let view = d3d12.index_buffer_view(0).unwrap();
        assert_eq!(view.size_in_bytes, 24);
        assert_eq!(view.format, index_format(true));
    }
}
