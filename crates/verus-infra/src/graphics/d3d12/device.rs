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

//! The Direct3D 12 device, its descriptor heaps and its direct queue.

use super::command_buffer::D3D12CommandBuffer;
use super::descriptor_heap::{D3D12DescriptorHeapType, Descriptor, DynamicDescriptorHeap, HandlePair};
use super::geometry::D3D12Geometry;
use super::native::{D3D12Command, D3D12Resource, TransitionBarrier, ALL_SUBRESOURCES};
use super::pipeline::D3D12Pipeline;
use super::shader::D3D12Shader;
use crate::graphics::d3d_common::{resource_format, DxgiFormat, ToD3D};
use crate::graphics::resources::{lock, DeviceStats, ResourceTables, ViewKind};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use verus_core::cgi::api::{
    BackendKind, BufferId, CgiSettings, DeviceResource, FBHandle, FramebufferDesc, ImageLayout,
    RPHandle, RenderPassDesc, RenderPassLayout, SamplerState, TextureDesc, TextureId, ViewId,
};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::registry::PassRegistry;
use verus_core::cgi::traits::{CommandBuffer, Geometry, Pipeline, RenderDevice, Shader};

/// Render target and depth stencil views of one framebuffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct D3D12Framebuffer {
    pub views: Vec<ViewId>,
}

/// Use of one shader-visible heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapUsage {
    /// Descriptors per ring slot.
    pub capacity: usize,
    /// Descriptors used in the current frame.
    pub offset: usize,
    /// Highest number of descriptors used in one frame.
    pub peak_load: usize,
}

#[derive(Debug)]
struct D3D12Heaps {
    views: DynamicDescriptorHeap,
    samplers: DynamicDescriptorHeap,
}

impl D3D12Heaps {
    fn get_mut(&mut self, ty: D3D12DescriptorHeapType) -> Result<&mut DynamicDescriptorHeap> {
        match ty {
            D3D12DescriptorHeapType::CBV_SRV_UAV => Ok(&mut self.views),
            D3D12DescriptorHeapType::SAMPLER => Ok(&mut self.samplers),
            other => Err(ConfigurationError::unmapped("shader_visible_heap", other).into()),
        }
    }
}

#[derive(Debug)]
struct D3D12DeviceInternal {
    settings: CgiSettings,
    resources: ResourceTables,
    /// Render passes keep the DXGI format of each attachment.
    passes: Mutex<PassRegistry<Vec<DxgiFormat>, D3D12Framebuffer>>,
    heaps: Mutex<D3D12Heaps>,
    fence_value: AtomicU64,
    command_log: Mutex<Vec<D3D12Command>>,
    command_log_enabled: AtomicBool,
}

/// A clonable handle to the Direct3D 12 device.
#[derive(Clone, Debug)]
pub struct D3D12Device {
    internal: Arc<D3D12DeviceInternal>,
}

impl D3D12Device {
    /// Creates the device and its shader-visible descriptor heaps.
    pub fn new(settings: &CgiSettings) -> Self {
        let depth = settings.ring_buffer_depth;
        let heaps = D3D12Heaps {
            views: DynamicDescriptorHeap::new(
                D3D12DescriptorHeapType::CBV_SRV_UAV,
                settings.descriptor_heap_capacity,
                depth,
                0,
                true,
            ),
            samplers: DynamicDescriptorHeap::new(
                D3D12DescriptorHeapType::SAMPLER,
                settings.sampler_heap_capacity,
                depth,
                0,
                true,
            ),
        };
        log::info!(
            "D3D12 device created: {} frames in flight, {} view and {} sampler descriptors per frame",
            depth,
            settings.descriptor_heap_capacity,
            settings.sampler_heap_capacity
        );
        Self {
            internal: Arc::new(D3D12DeviceInternal {
                settings: settings.clone(),
                resources: ResourceTables::default(),
                passes: Mutex::new(PassRegistry::default()),
                heaps: Mutex::new(heaps),
                fence_value: AtomicU64::new(0),
                command_log: Mutex::new(Vec::new()),
                command_log_enabled: AtomicBool::new(false),
            }),
        }
    }

    /// Starts or stops keeping a copy of every executed command.
    pub fn enable_command_log(&self, enabled: bool) {
        self.internal.command_log_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Returns and clears the logged commands.
    pub fn take_command_log(&self) -> Vec<D3D12Command> {
        std::mem::take(&mut *lock(&self.internal.command_log))
    }

    /// Counters and live object counts.
    pub fn stats(&self) -> DeviceStats {
        self.internal.resources.stats()
    }

    /// Use of the shader-visible heap of type `ty`.
    pub fn heap_usage(&self, ty: D3D12DescriptorHeapType) -> Result<HeapUsage> {
        let mut heaps = lock(&self.internal.heaps);
        let heap = heaps.get_mut(ty)?;
        Ok(HeapUsage {
            capacity: heap.capacity(),
            offset: heap.offset(),
            peak_load: heap.peak_load(),
        })
    }

    /// Reads `count` descriptors of a table bound at GPU handle `gpu`.
    pub fn table_descriptors(&self, ty: D3D12DescriptorHeapType, gpu: u64, count: usize) -> Result<Vec<Descriptor>> {
        let mut heaps = lock(&self.internal.heaps);
        let heap = heaps.get_mut(ty)?.heap();
        let index = heap.index_of_gpu(gpu).ok_or(ConfigurationError::InvalidHandle {
            kind: "GPU descriptor handle",
            index: gpu as i64,
        })?;
        Ok(heap.read(index, count)?.to_vec())
    }

    /// Tracked layout of one texture subresource.
    pub fn texture_layout(&self, texture: TextureId, mip: u32, layer: u32) -> Result<ImageLayout> {
        self.internal.resources.texture_layout(texture, mip, layer)
    }

    /// Replaces the sampler state `Custom` slots use for `texture`.
    pub fn set_texture_sampler(&self, texture: TextureId, state: SamplerState) -> Result<()> {
        self.internal.resources.set_texture_sampler(texture, state)
    }

    pub(crate) fn resources(&self) -> &ResourceTables {
        &self.internal.resources
    }

    pub(crate) fn framebuffer(&self, handle: FBHandle) -> Result<D3D12Framebuffer> {
        Ok(lock(&self.internal.passes).framebuffer(handle)?.native.clone())
    }

    /// DXGI format of every attachment of `render_pass`.
    pub(crate) fn render_pass_formats(&self, render_pass: RPHandle) -> Result<Vec<DxgiFormat>> {
        Ok(lock(&self.internal.passes).render_pass(render_pass)?.native.clone())
    }

    pub(crate) fn ring_buffer_depth(&self) -> usize {
        self.internal.settings.ring_buffer_depth
    }

    /// Reserves a table in a shader-visible heap and copies `descriptors` into it.
    pub(crate) fn write_table(
        &self,
        ty: D3D12DescriptorHeapType,
        frame_count: u64,
        ring_index: usize,
        descriptors: &[Descriptor],
    ) -> Result<HandlePair> {
        let mut heaps = lock(&self.internal.heaps);
        let heap = heaps.get_mut(ty)?;
        let handle = heap.next_handle(frame_count, ring_index, descriptors.len())?;
        heap.heap_mut().write(handle.index, descriptors)?;
        Ok(handle)
    }

    /// `ExecuteCommandLists` followed by a fence signal.
    pub(crate) fn execute(&self, commands: Vec<D3D12Command>) -> Result<()> {
        let resources = &self.internal.resources;
        let logging = self.internal.command_log_enabled.load(Ordering::Relaxed);
        for command in &commands {
            match command {
                D3D12Command::ResourceBarrier(barriers) => {
                    for barrier in barriers {
                        self.apply_barrier(barrier)?;
                    }
                    resources.count_barriers(barriers.len());
                }
                D3D12Command::CopyBufferRegion {
                    dst,
                    dst_offset,
                    src,
                    src_offset,
                    num_bytes,
                } => resources.copy_buffer(
                    *src,
                    *src_offset as usize,
                    *dst,
                    *dst_offset as usize,
                    *num_bytes as usize,
                )?,
                D3D12Command::DrawInstanced { .. } | D3D12Command::DrawIndexedInstanced { .. } => {
                    resources.count_draw()
                }
                D3D12Command::Dispatch { .. }
                | D3D12Command::DispatchMesh { .. }
                | D3D12Command::DispatchRays { .. } => resources.count_dispatch(),
                _ => {}
            }
            log::trace!("ID3D12GraphicsCommandList::{}", command.name());
        }
        resources.count_submission();
        let fence = self.internal.fence_value.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("D3D12 executed {} commands, fence {fence}", commands.len());
        if logging {
            lock(&self.internal.command_log).extend(commands);
        }
        Ok(())
    }

    fn apply_barrier(&self, barrier: &TransitionBarrier) -> Result<()> {
        let resources = &self.internal.resources;
        match barrier.resource {
            D3D12Resource::Buffer(buffer) => {
                let current = resources.buffer_state(buffer)?;
                if current != barrier.before.bits() {
                    log::warn!(
                        "Buffer {buffer:?} is in state {current:#x}, barrier expects {:?}",
                        barrier.before
                    );
                }
                resources.set_buffer_state(buffer, barrier.after.bits())
            }
            D3D12Resource::Texture(texture) => {
                let desc = resources.texture_desc(texture)?;
                let layout = barrier.after.tracked_layout();
                if barrier.subresource == ALL_SUBRESOURCES {
                    return resources.set_texture_layout(texture, 0..desc.mip_levels, 0..desc.array_layers, layout);
                }
                let mip = barrier.subresource % desc.mip_levels;
                let layer = barrier.subresource / desc.mip_levels;
                resources.set_texture_layout(texture, mip..mip + 1, layer..layer + 1, layout)
            }
        }
    }

    fn attachment_view(&self, texture: TextureId, format: DxgiFormat, mip: u32) -> Result<ViewId> {
        let desc = self.internal.resources.texture_desc(texture)?;
        let kind = if desc.format.is_depth() {
            ViewKind::DepthStencil
        } else {
            ViewKind::RenderTarget
        };
        self.internal
            .resources
            .create_view(texture, kind, Some(mip), None, format.raw())
    }

    fn release_views(&self, views: &[ViewId]) {
        for &view in views {
            if let Err(err) = self.internal.resources.release_view(view) {
                log::warn!("Failed to release framebuffer view {view:?}: {err}");
            }
        }
    }
}

impl RenderDevice for D3D12Device {
    fn backend(&self) -> BackendKind {
        BackendKind::D3D12
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId> {
        resource_format(desc.format)?;
        self.internal.resources.create_texture(desc, ImageLayout::Undefined)
    }

    fn texture_desc(&self, texture: TextureId) -> Result<TextureDesc> {
        self.internal.resources.texture_desc(texture)
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RPHandle> {
        let layout = RenderPassLayout::resolve(desc)?;
        let formats = layout
            .attachments
            .iter()
            .map(|a| a.desc.format.to_d3d())
            .collect::<Result<Vec<_>>>()?;
        let handle = lock(&self.internal.passes).insert_render_pass(layout, formats);
        log::debug!(
            "D3D12 render pass {handle:?}: {} attachments, {} subpasses",
            desc.attachments.len(),
            desc.subpasses.len()
        );
        Ok(handle)
    }

    fn delete_render_pass(&self, render_pass: RPHandle) -> Result<()> {
        lock(&self.internal.passes).remove_render_pass(render_pass)?;
        Ok(())
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FBHandle> {
        let formats = lock(&self.internal.passes)
            .render_pass(desc.render_pass)?
            .native
            .clone();
        let mut views = Vec::with_capacity(desc.attachments.len());
        for (&texture, &format) in desc.attachments.iter().zip(&formats) {
            match self.attachment_view(texture, format, desc.mip_level) {
                Ok(view) => views.push(view),
                Err(err) => {
                    self.release_views(&views);
                    return Err(err);
                }
            }
        }
        let result = lock(&self.internal.passes)
            .insert_framebuffer(desc.clone(), D3D12Framebuffer { views: views.clone() });
        if result.is_err() {
            self.release_views(&views);
        }
        result
    }

    fn delete_framebuffer(&self, framebuffer: FBHandle) -> Result<()> {
        let native = lock(&self.internal.passes).remove_framebuffer(framebuffer)?;
        self.release_views(&native.views);
        Ok(())
    }

    fn render_pass_layout(&self, render_pass: RPHandle) -> Result<Arc<RenderPassLayout>> {
        Ok(Arc::clone(
            &lock(&self.internal.passes).render_pass(render_pass)?.layout,
        ))
    }

    fn framebuffer_desc(&self, framebuffer: FBHandle) -> Result<FramebufferDesc> {
        Ok(lock(&self.internal.passes).framebuffer(framebuffer)?.desc.clone())
    }

    fn new_geometry(&self) -> Box<dyn Geometry> {
        Box::new(D3D12Geometry::new(self.clone()))
    }

    fn new_shader(&self) -> Box<dyn Shader> {
        Box::new(D3D12Shader::new(self.clone()))
    }

    fn new_pipeline(&self) -> Box<dyn Pipeline> {
        Box::new(D3D12Pipeline::new(self.clone()))
    }

    fn new_command_buffer(&self) -> Box<dyn CommandBuffer> {
        Box::new(D3D12CommandBuffer::new(self.clone()))
    }

    fn release(&self, resource: DeviceResource) -> Result<()> {
        self.internal.resources.release(resource)
    }

    fn wait_idle(&self) -> Result<()> {
        let fence = self.internal.fence_value.load(Ordering::Relaxed);
        log::trace!("D3D12 wait_idle: fence {fence} reached");
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferId) -> Result<Vec<u8>> {
        self.internal.resources.read_buffer(buffer)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::d3d12::native::D3D12ResourceStates;
    use verus_core::cgi::api::Format;

    fn device() -> D3D12Device {
        D3D12Device::new(&CgiSettings::for_backend(BackendKind::D3D12))
    }

    #[test]
    fn test_execute_applies_barriers_and_copies() {
        let device = device();
        device.enable_command_log(true);
        let src = device.resources().create_buffer("src", 4, D3D12ResourceStates::GENERIC_READ.bits());
        let dst = device.resources().create_buffer("dst", 8, 0);
        device.resources().write_buffer(src, 0, &[1, 2, 3, 4]).unwrap();
        let texture = device
            .create_texture(&TextureDesc::sampled("t", Format::UnormR8G8B8A8, 4, 4).with_mip_levels(2))
            .unwrap();

        device
            .execute(vec![
                D3D12Command::ResourceBarrier(vec![TransitionBarrier {
                    resource: D3D12Resource::Buffer(dst),
                    subresource: ALL_SUBRESOURCES,
                    before: D3D12ResourceStates::COMMON,
                    after: D3D12ResourceStates::COPY_DEST,
                }]),
                D3D12Command::CopyBufferRegion {
                    dst,
                    dst_offset: 4,
                    src,
                    src_offset: 0,
                    num_bytes: 4,
                },
                D3D12Command::ResourceBarrier(vec![TransitionBarrier {
                    resource: D3D12Resource::Texture(texture),
                    subresource: 1,
                    before: D3D12ResourceStates::COMMON,
                    after: D3D12ResourceStates::ALL_SHADER_RESOURCE,
                }]),
            ])
            .unwrap();

        assert_eq!(device.read_buffer(dst).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(device.resources().buffer_state(dst).unwrap(), 0x400);
        assert_eq!(device.texture_layout(texture, 0, 0).unwrap(), ImageLayout::Undefined);
        assert_eq!(device.texture_layout(texture, 1, 0).unwrap(), ImageLayout::ShaderReadOnly);
        let stats = device.stats();
        assert_eq!((stats.barriers, stats.copies, stats.submissions), (2, 1, 1));
        assert_eq!(device.take_command_log().len(), 3);
    }

    #[test]
    fn test_write_table_reserves_from_the_frame_block() {
        let mut settings = CgiSettings::for_backend(BackendKind::D3D12);
        settings.sampler_heap_capacity = 2;
        let device = D3D12Device::new(&settings);
        let descriptors = [Descriptor::Null, Descriptor::Null];
        let handle = device
            .write_table(D3D12DescriptorHeapType::SAMPLER, 0, 1, &descriptors)
            .unwrap();
        assert_eq!(handle.index, 2);
        let table = device
            .table_descriptors(D3D12DescriptorHeapType::SAMPLER, handle.gpu, 2)
            .unwrap();
        assert_eq!(table, descriptors);
        assert!(device
            .write_table(D3D12DescriptorHeapType::SAMPLER, 0, 1, &descriptors[..1])
            .is_err());
        let usage = device.heap_usage(D3D12DescriptorHeapType::SAMPLER).unwrap();
        assert_eq!(usage, HeapUsage { capacity: 2, offset: 2, peak_load: 2 });
        assert!(device.write_table(D3D12DescriptorHeapType::RTV, 0, 0, &[]).is_err());
    }
}
