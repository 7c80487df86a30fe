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

//! Direct3D 11 vertex and index buffers.
//!
//! Dynamic buffers are `D3D11_USAGE_DYNAMIC` and written with `Map`; a write
//! covering the whole region discards, a partial one does not overwrite.
//! Static buffers are `D3D11_USAGE_DEFAULT` and written with
//! `UpdateSubresource` on the immediate context.

use super::device::D3D11Device;
use super::native::{D3D11Call, D3D11Map};
use crate::graphics::buffers::{replace_slot, vertex_slot, GeometryBuffer};
use std::any::Any;
use verus_core::cgi::api::{BufferId, DeviceResource, GeometryDesc, GeometryLayout};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::{CommandBuffer, Geometry};
use verus_core::RenderContext;

/// Vertex and index buffers of one Direct3D 11 geometry.
pub struct D3D11Geometry {
    device: D3D11Device,
    name: String,
    layout: GeometryLayout,
    vertex_buffers: Vec<Option<GeometryBuffer>>,
    index_buffer: Option<GeometryBuffer>,
}

impl D3D11Geometry {
    pub(crate) fn new(device: D3D11Device) -> Self {
        Self {
            device,
            name: String::new(),
            layout: GeometryLayout::default(),
            vertex_buffers: Vec::new(),
            index_buffer: None,
        }
    }

    /// Buffer, stride and byte offset of `binding` for the current ring slot.
    pub(crate) fn vertex_binding(&self, binding: usize, ring_index: usize) -> Result<(BufferId, u32, u32)> {
        let buffer = vertex_slot(&self.vertex_buffers, binding)?;
        Ok((buffer.id, buffer.stride, buffer.region_offset(ring_index) as u32))
    }

    /// Index buffer and byte offset for the current ring slot.
    pub(crate) fn index_binding(&self, ring_index: usize) -> Result<(BufferId, u32)> {
        let buffer = self.index_buffer.as_ref().ok_or_else(|| {
            ConfigurationError::Invalid(format!("geometry '{}' has no index buffer", self.name))
        })?;
        Ok((buffer.id, buffer.region_offset(ring_index) as u32))
    }

    fn write(&self, ctx: &RenderContext, buffer: &GeometryBuffer, data: &[u8], size: u32, offset: u32) -> Result<()> {
        let update = buffer.resolve_update(data, size, offset)?;
        let call = if buffer.dynamic {
            D3D11Call::Map {
                buffer: buffer.id,
                map_type: if update.whole {
                    D3D11Map::WRITE_DISCARD
                } else {
                    D3D11Map::WRITE_NO_OVERWRITE
                },
                offset: buffer.region_offset(ctx.ring_buffer_index()) + update.offset,
                data: update.bytes.to_vec(),
            }
        } else {
            D3D11Call::UpdateSubresource {
                buffer: buffer.id,
                dst_offset: update.offset,
                data: update.bytes.to_vec(),
            }
        };
        self.device.call(call)
    }

    fn retire(ctx: &RenderContext, buffer: Option<GeometryBuffer>) {
        if let Some(buffer) = buffer {
            ctx.retire(DeviceResource::Buffer(buffer.id), 0);
        }
    }
}

impl Geometry for D3D11Geometry {
    fn init(&mut self, _ctx: &RenderContext, desc: &GeometryDesc) -> Result<()> {
        self.layout = GeometryLayout::parse(desc)?;
        self.name = desc.name.clone();
        log::debug!(
            "D3D11 geometry '{}': {} attributes, {} bindings",
            self.name,
            self.layout.attributes().len(),
            self.layout.binding_count()
        );
        Ok(())
    }

    fn done(&mut self, ctx: &RenderContext) {
        for buffer in self.vertex_buffers.drain(..) {
            Self::retire(ctx, buffer);
        }
        Self::retire(ctx, self.index_buffer.take());
    }

    fn create_vertex_buffer(&mut self, ctx: &RenderContext, count: u32, binding: usize) -> Result<()> {
        let stride = self.layout.stride(binding)?;
        let buffer = GeometryBuffer::allocate(
            self.device.resources(),
            format!("{} VB{binding}", self.name),
            count,
            stride,
            self.layout.is_dynamic(binding),
            ctx.ring_buffer_depth(),
            0,
        );
        let old = replace_slot(&mut self.vertex_buffers, binding, buffer);
        Self::retire(ctx, old);
        Ok(())
    }

    fn create_index_buffer(&mut self, ctx: &RenderContext, count: u32) -> Result<()> {
        let buffer = GeometryBuffer::allocate(
            self.device.resources(),
            format!("{} IB", self.name),
            count,
            self.layout.index_stride(),
            self.layout.is_index_dynamic(),
            ctx.ring_buffer_depth(),
            0,
        );
        let old = self.index_buffer.replace(buffer);
        Self::retire(ctx, old);
        Ok(())
    }

    fn update_vertex_buffer(
        &mut self,
        ctx: &RenderContext,
        data: &[u8],
        binding: usize,
        _cb: Option<&mut dyn CommandBuffer>,
        size: u32,
        offset: u32,
    ) -> Result<()> {
        let buffer = *vertex_slot(&self.vertex_buffers, binding)?;
        self.write(ctx, &buffer, data, size, offset)
    }

    fn update_index_buffer(
        &mut self,
        ctx: &RenderContext,
        data: &[u8],
        _cb: Option<&mut dyn CommandBuffer>,
        size: u32,
        offset: u32,
    ) -> Result<()> {
        let buffer = self.index_buffer.ok_or_else(|| {
            ConfigurationError::Invalid(format!("geometry '{}' has no index buffer", self.name))
        })?;
        self.write(ctx, &buffer, data, size, offset)
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
            name: "Quad".into(),
            vertex_input_attrs: vec![VertexInputAttrDesc::new(
                0,
                0,
                ViaType::Floats,
                2,
                ViaUsage::Position,
                0,
            )],
            strides: vec![8],
            dynamic_bindings_mask: dynamic_mask,
            thirty_two_bit_indices: false,
        }
    }

    fn device(ctx: &RenderContext) -> &D3D11Device {
        crate::graphics::downcast::<D3D11Device>(ctx.device().as_any(), "D3D11Device").unwrap()
    }

    #[test]
    fn test_dynamic_update_picks_map_type() {
        let mut ctx = create_context(CgiSettings::for_backend(BackendKind::D3D11)).unwrap();
        let mut geo = ctx.create_geometry(&desc(0x1)).unwrap();
        geo.create_vertex_buffer(&ctx, 4, 0).unwrap();
        device(&ctx).enable_call_log(true);

        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        ctx.begin_frame().unwrap();
        geo.update_vertex_buffer(&ctx, &[1; 32], 0, None, 0, 0).unwrap();
        geo.update_vertex_buffer(&ctx, &[2; 8], 0, None, 1, 3).unwrap();

        let log = device(&ctx).take_call_log();
        match (&log[0], &log[1]) {
            (
                D3D11Call::Map { map_type: first, offset: first_offset, .. },
                D3D11Call::Map { map_type: second, offset: second_offset, .. },
            ) => {
                assert_eq!(*first, D3D11Map::WRITE_DISCARD);
                assert_eq!(*first_offset, 32);
                assert_eq!(*second, D3D11Map::WRITE_NO_OVERWRITE);
                assert_eq!(*second_offset, 32 + 24);
            }
            other => panic!("unexpected calls {other:?}"),
        }
        let id = geo.vertex_buffer(0).unwrap();
        let data = ctx.device().read_buffer(id).unwrap();
        assert_eq!(data.len(), 32 * 3);
        assert!(data[..32].iter().all(|&b| b == 0));
        assert_eq!(&data[56..64], &[2; 8]);
    }

    #[test]
    fn test_static_update_uses_update_subresource() {
        let ctx = create_context(CgiSettings::for_backend(BackendKind::D3D11)).unwrap();
        let mut geo = ctx.create_geometry(&desc(0)).unwrap();
        geo.create_vertex_buffer(&ctx, 2, 0).unwrap();
        device(&ctx).enable_call_log(true);
        geo.update_vertex_buffer(&ctx, &[5; 16], 0, None, 0, 0).unwrap();
        assert!(matches!(
            device(&ctx).take_call_log().as_slice(),
            [D3D11Call::UpdateSubresource { dst_offset: 0, .. }]
        ));
        assert!(geo.update_vertex_buffer(&ctx, &[5; 16], 1, None, 0, 0).is_err());
        assert!(geo.update_index_buffer(&ctx, &[0; 4], None, 0, 0).is_err());
    }

    #[test]
    fn test_done_retires_buffers() {
        let mut ctx = create_context(CgiSettings::for_backend(BackendKind::D3D11)).unwrap();
        let mut geo = ctx.create_geometry(&desc(0)).unwrap();
        geo.create_vertex_buffer(&ctx, 2, 0).unwrap();
        geo.create_index_buffer(&ctx, 6).unwrap();
        geo.done(&ctx);
        assert_eq!(ctx.pending_retirements(), 2);
        ctx.shutdown().unwrap();
        assert_eq!(device(&ctx).stats().live_buffers, 0);
    }
}
