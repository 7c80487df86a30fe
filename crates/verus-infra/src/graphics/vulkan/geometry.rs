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

//! Vulkan vertex and index buffers.
//!
//! Dynamic buffers are host visible and written at the region of the
//! current ring slot. Static buffers are device local: an update fills a
//! staging buffer and records a copy fenced by two buffer memory barriers.

use super::command_buffer::VulkanCommandBuffer;
use super::device::VulkanDevice;
use super::native::{index_type, BufferMemoryBarrier, VulkanCommand};
use crate::graphics::buffers::{replace_slot, vertex_slot, GeometryBuffer};
use crate::graphics::downcast_mut;
use ash::vk;
use std::any::Any;
use std::collections::HashSet;
use verus_core::cgi::api::{BufferId, DeviceResource, GeometryDesc, GeometryLayout};
use verus_core::cgi::context::OneTimeSubmit;
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::{CommandBuffer, Geometry};
use verus_core::RenderContext;

/// Vertex and index buffers of one Vulkan geometry.
pub struct VulkanGeometry {
    device: VulkanDevice,
    name: String,
    layout: GeometryLayout,
    vertex_buffers: Vec<Option<GeometryBuffer>>,
    index_buffer: Option<GeometryBuffer>,
    uploaded: HashSet<BufferId>,
}

fn buffer_barrier(
    buffer: BufferId,
    src_stage: vk::PipelineStageFlags,
    src_access: vk::AccessFlags,
    dst_stage: vk::PipelineStageFlags,
    dst_access: vk::AccessFlags,
) -> VulkanCommand {
    VulkanCommand::PipelineBarrier {
        src_stage,
        dst_stage,
        image_barriers: Vec::new(),
        buffer_barriers: vec![BufferMemoryBarrier {
            buffer,
            src_access,
            dst_access,
            offset: 0,
            size: u64::MAX,
        }],
    }
}

impl VulkanGeometry {
    pub(crate) fn new(device: VulkanDevice) -> Self {
        Self {
            device,
            name: String::new(),
            layout: GeometryLayout::default(),
            vertex_buffers: Vec::new(),
            index_buffer: None,
            uploaded: HashSet::new(),
        }
    }

    /// Buffer and byte offset bound for `binding` in ring slot `ring_index`.
    pub(crate) fn vertex_binding(&self, binding: usize, ring_index: usize) -> Result<(BufferId, u64)> {
        let buffer = vertex_slot(&self.vertex_buffers, binding)?;
        Ok((buffer.id, buffer.region_offset(ring_index) as u64))
    }

    pub(crate) fn index_binding(&self, ring_index: usize) -> Result<(BufferId, u64, vk::IndexType)> {
        let buffer = self.index_buffer.ok_or_else(|| {
            ConfigurationError::Invalid(format!("geometry '{}' has no index buffer", self.name))
        })?;
        Ok((
            buffer.id,
            buffer.region_offset(ring_index) as u64,
            index_type(self.layout.thirty_two_bit_indices()),
        ))
    }

    fn write(
        &mut self,
        ctx: &RenderContext,
        buffer: GeometryBuffer,
        target: vk::AccessFlags,
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

        let staging = self
            .device
            .resources()
            .create_buffer(format!("{} staging", self.name), update.bytes.len(), 0);
        self.device.resources().write_buffer(staging, 0, update.bytes)?;
        let (src_stage, src_access) = if self.uploaded.contains(&buffer.id) {
            (vk::PipelineStageFlags::VERTEX_INPUT, target)
        } else {
            (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty())
        };
        let commands = vec![
            buffer_barrier(
                buffer.id,
                src_stage,
                src_access,
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_WRITE,
            ),
            VulkanCommand::CopyBuffer {
                src: staging,
                src_offset: 0,
                dst: buffer.id,
                dst_offset: update.offset as u64,
                size: update.bytes.len() as u64,
            },
            buffer_barrier(
                buffer.id,
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::VERTEX_INPUT,
                target,
            ),
        ];

        let recorded = match cb {
            Some(cb) => downcast_mut::<VulkanCommandBuffer>(cb.as_any_mut(), "VulkanCommandBuffer")
                .and_then(|cb| cb.record_all(commands)),
            None => OneTimeSubmit::begin(ctx).and_then(|mut submit| {
                downcast_mut::<VulkanCommandBuffer>(submit.command_buffer()?.as_any_mut(), "VulkanCommandBuffer")?
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

impl Geometry for VulkanGeometry {
    fn init(&mut self, _ctx: &RenderContext, desc: &GeometryDesc) -> Result<()> {
        self.layout = GeometryLayout::parse(desc)?;
        self.name = desc.name.clone();
        log::debug!(
            "Vulkan geometry '{}': {} bindings, dynamic mask {:#x}",
            self.name,
            self.layout.binding_count(),
            self.layout.dynamic_bindings_mask()
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
        let buffer = GeometryBuffer::allocate(
            self.device.resources(),
            format!("{} VB{binding}", self.name),
            count,
            self.layout.stride(binding)?,
            self.layout.is_dynamic(binding),
            ctx.ring_buffer_depth(),
            0,
        );
        let old = replace_slot(&mut self.vertex_buffers, binding, buffer);
        self.retire(ctx, old);
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
        self.write(ctx, buffer, vk::AccessFlags::VERTEX_ATTRIBUTE_READ, data, cb, size, offset)
    }

    fn update_index_buffer(
        &mut self,
        ctx: &RenderContext,
        data: &[u8],
        cb: Option<&mut dyn CommandBuffer>,
        size: u32,
        offset: u32,
    ) -> Result<()> {
        let buffer = self.index_buffer.ok_or_else(|| {
            ConfigurationError::Invalid(format!("geometry '{}' has no index buffer", self.name))
        })?;
        self.write(ctx, buffer, vk::AccessFlags::INDEX_READ, data, cb, size, offset)
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
            vertex_input_attrs: vec![
                VertexInputAttrDesc::new(0, 0, ViaType::Floats, 2, ViaUsage::Position, 0),
                VertexInputAttrDesc::new(0, 8, ViaType::Halfs, 2, ViaUsage::TexCoord, 0),
            ],
            strides: vec![12],
            dynamic_bindings_mask: dynamic_mask,
            thirty_two_bit_indices: false,
        }
    }

    fn device(ctx: &RenderContext) -> &VulkanDevice {
        crate::graphics::downcast::<VulkanDevice>(ctx.device().as_any(), "VulkanDevice").unwrap()
    }

    #[test]
    fn test_static_index_upload_ends_in_index_read() {
        let mut ctx = create_context(CgiSettings::for_backend(BackendKind::Vulkan)).unwrap();
        let mut geo = ctx.create_geometry(&desc(0)).unwrap();
        geo.create_index_buffer(&ctx, 6).unwrap();
        device(&ctx).enable_command_log(true);

        let indices: [u16; 6] = [0, 1, 2, 2, 1, 3];
        geo.update_index_buffer(&ctx, bytemuck::cast_slice(&indices), None, 0, 0)
            .unwrap();
        geo.update_index_buffer(&ctx, bytemuck::cast_slice(&indices[..2]), None, 2, 4)
            .unwrap();

        let log = device(&ctx).take_command_log();
        assert_eq!(log.len(), 6);
        let VulkanCommand::PipelineBarrier { buffer_barriers, .. } = &log[2] else {
            panic!("expected a barrier, got {:?}", log[2]);
        };
        assert_eq!(buffer_barriers[0].dst_access, vk::AccessFlags::INDEX_READ);
        let VulkanCommand::PipelineBarrier { buffer_barriers, .. } = &log[3] else {
            panic!("expected a barrier, got {:?}", log[3]);
        };
        assert_eq!(buffer_barriers[0].src_access, vk::AccessFlags::INDEX_READ);
        assert!(matches!(log[4], VulkanCommand::CopyBuffer { dst_offset: 8, size: 4, .. }));

        let id = geo.index_buffer().unwrap();
        let data = ctx.device().read_buffer(id).unwrap();
        assert_eq!(&data[8..12], bytemuck::cast_slice::<u16, u8>(&[0, 1]));
        assert_eq!(device(&ctx).resources().buffer_state(id).unwrap(), vk::AccessFlags::INDEX_READ.as_raw());
        geo.done(&ctx);
        ctx.shutdown().unwrap();
        assert_eq!(device(&ctx).stats().live_buffers, 0);
    }

    #[test]
    fn test_dynamic_vertex_buffer_binds_ring_region() {
        let mut ctx = create_context(CgiSettings::for_backend(BackendKind::Vulkan)).unwrap();
        let mut geo = ctx.create_geometry(&desc(0x1)).unwrap();
        geo.create_vertex_buffer(&ctx, 4, 0).unwrap();

        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        ctx.begin_frame().unwrap();
        geo.update_vertex_buffer(&ctx, &[1; 48], 0, None, 0, 0).unwrap();

        let vulkan = geo.as_any().downcast_ref::<VulkanGeometry>().unwrap();
        let (buffer, offset) = vulkan.vertex_binding(0, ctx.ring_buffer_index()).unwrap();
        assert_eq!(offset, 48);
        let data = ctx.device().read_buffer(buffer).unwrap();
        assert_eq!(&data[48..96], &[1; 48]);
        assert!(vulkan.index_binding(0).is_err());
        geo.create_index_buffer(&ctx, 6).unwrap();
        let vulkan = geo.as_any().downcast_ref::<VulkanGeometry>().unwrap();
        assert_eq!(vulkan.index_binding(1).unwrap().2, vk::IndexType::UINT16);
    }
}
