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

//! The Vulkan device, its descriptor pools and its graphics queue.

use super::command_buffer::VulkanCommandBuffer;
use super::descriptors::{DescriptorPoolDesc, DescriptorPoolId, DescriptorRegistry, DescriptorWrite};
use super::geometry::VulkanGeometry;
use super::native::{
    engine_layout, sample_count, AttachmentLayoutChange, BufferMemoryBarrier, ImageMemoryBarrier,
    ToVk, VulkanCommand,
};
use super::pipeline::VulkanPipeline;
use super::shader::VulkanShader;
use crate::graphics::resources::{lock, DeviceStats, ResourceTables, ViewKind};
use ash::vk;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use verus_core::cgi::api::{
    BackendKind, BufferId, CgiSettings, DescriptorSetId, DeviceResource, FBHandle,
    FramebufferDesc, ImageLayout, RPHandle, RenderPassDesc, RenderPassLayout, ResolvedRef,
    SamplerState, TextureDesc, TextureId, ViewId,
};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::registry::PassRegistry;
use verus_core::cgi::traits::{CommandBuffer, Geometry, Pipeline, RenderDevice, Shader};

/// `VkAttachmentDescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDescription {
    /// Texel format.
    pub format: vk::Format,
    /// Samples per pixel.
    pub samples: vk::SampleCountFlags,
    /// Color or depth contents at the start of the pass.
    pub load_op: vk::AttachmentLoadOp,
    /// Color or depth contents at the end of the pass.
    pub store_op: vk::AttachmentStoreOp,
    /// Stencil contents at the start of the pass.
    pub stencil_load_op: vk::AttachmentLoadOp,
    /// Stencil contents at the end of the pass.
    pub stencil_store_op: vk::AttachmentStoreOp,
    /// Layout the attachment is in when the pass begins.
    pub initial_layout: vk::ImageLayout,
    /// Layout the pass leaves the attachment in.
    pub final_layout: vk::ImageLayout,
}

/// `VkAttachmentReference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentReference {
    /// Index into the attachments of the pass.
    pub attachment: u32,
    /// Layout during the subpass.
    pub layout: vk::ImageLayout,
}

/// `VkSubpassDescription`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubpassDescription {
    /// Attachments read as subpass inputs.
    pub input_attachments: Vec<AttachmentReference>,
    /// Render targets.
    pub color_attachments: Vec<AttachmentReference>,
    /// Multisample resolve targets, one per color attachment.
    pub resolve_attachments: Vec<AttachmentReference>,
    /// Depth-stencil target.
    pub depth_stencil_attachment: Option<AttachmentReference>,
    /// Attachment indices whose contents survive the subpass.
    pub preserve_attachments: Vec<u32>,
}

/// `VkSubpassDependency`. `VK_SUBPASS_EXTERNAL` stands for outside the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpassDependency {
    /// Subpass that produces.
    pub src_subpass: u32,
    /// Subpass that consumes.
    pub dst_subpass: u32,
}

/// `VkRenderPassCreateInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderPassInfo {
    /// In declaration order.
    pub attachments: Vec<AttachmentDescription>,
    /// In declaration order.
    pub subpasses: Vec<SubpassDescription>,
    /// Execution dependencies between subpasses.
    pub dependencies: Vec<SubpassDependency>,
}

fn attachment_refs(refs: &[ResolvedRef]) -> Result<Vec<AttachmentReference>> {
    refs.iter().map(attachment_ref).collect()
}

fn attachment_ref(r: &ResolvedRef) -> Result<AttachmentReference> {
    Ok(AttachmentReference {
        attachment: r.index as u32,
        layout: r.layout.to_vk()?,
    })
}

impl RenderPassInfo {
    /// Native description of a resolved render pass.
    pub fn from_layout(layout: &RenderPassLayout) -> Result<Self> {
        let attachments = layout
            .attachments
            .iter()
            .map(|a| {
                let desc = &a.desc;
                Ok(AttachmentDescription {
                    format: desc.format.to_vk()?,
                    samples: sample_count(desc.sample_count)?,
                    load_op: desc.load_op.to_vk()?,
                    store_op: desc.store_op.to_vk()?,
                    stencil_load_op: desc.stencil_load_op.to_vk()?,
                    stencil_store_op: desc.stencil_store_op.to_vk()?,
                    initial_layout: desc.initial_layout.to_vk()?,
                    final_layout: desc.final_layout.to_vk()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let subpasses = layout
            .subpasses
            .iter()
            .map(|s| {
                Ok(SubpassDescription {
                    input_attachments: attachment_refs(&s.input)?,
                    color_attachments: attachment_refs(&s.color)?,
                    resolve_attachments: attachment_refs(&s.resolve)?,
                    depth_stencil_attachment: s.depth_stencil.as_ref().map(attachment_ref).transpose()?,
                    preserve_attachments: s.preserve.iter().map(|&i| i as u32).collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let subpass = |index: Option<usize>| index.map_or(vk::SUBPASS_EXTERNAL, |i| i as u32);
        let dependencies = layout
            .dependencies
            .iter()
            .map(|d| SubpassDependency {
                src_subpass: subpass(d.src),
                dst_subpass: subpass(d.dst),
            })
            .collect();
        Ok(Self {
            attachments,
            subpasses,
            dependencies,
        })
    }
}

/// Image views of one framebuffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VulkanFramebuffer {
    pub views: Vec<ViewId>,
}

#[derive(Debug)]
struct VulkanDeviceInternal {
    settings: CgiSettings,
    resources: ResourceTables,
    passes: Mutex<PassRegistry<RenderPassInfo, VulkanFramebuffer>>,
    descriptors: Mutex<DescriptorRegistry>,
    /// Value of the queue timeline semaphore.
    timeline: AtomicU64,
    command_log: Mutex<Vec<VulkanCommand>>,
    command_log_enabled: AtomicBool,
}

/// A clonable handle to the Vulkan device.
#[derive(Clone, Debug)]
pub struct VulkanDevice {
    internal: Arc<VulkanDeviceInternal>,
}

impl VulkanDevice {
    /// Creates the device with the ring depth and pool sizes of `settings`.
    pub fn new(settings: &CgiSettings) -> Self {
        log::info!(
            "Vulkan device created: {} frames in flight, {} complex sets per shader",
            settings.ring_buffer_depth,
            settings.complex_set_capacity
        );
        Self {
            internal: Arc::new(VulkanDeviceInternal {
                settings: settings.clone(),
                resources: ResourceTables::default(),
                passes: Mutex::new(PassRegistry::default()),
                descriptors: Mutex::new(DescriptorRegistry::default()),
                timeline: AtomicU64::new(0),
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
    pub fn take_command_log(&self) -> Vec<VulkanCommand> {
        std::mem::take(&mut *lock(&self.internal.command_log))
    }

    /// Live objects and per-frame counters.
    pub fn stats(&self) -> DeviceStats {
        self.internal.resources.stats()
    }

    /// Tracked layout of one texture subresource.
    pub fn texture_layout(&self, texture: TextureId, mip: u32, layer: u32) -> Result<ImageLayout> {
        self.internal.resources.texture_layout(texture, mip, layer)
    }

    /// Replaces the sampler state `Custom` slots use for `texture`.
    pub fn set_texture_sampler(&self, texture: TextureId, state: SamplerState) -> Result<()> {
        self.internal.resources.set_texture_sampler(texture, state)
    }

    /// The native description `render_pass` was created with.
    pub fn render_pass_info(&self, render_pass: RPHandle) -> Result<RenderPassInfo> {
        Ok(lock(&self.internal.passes).render_pass(render_pass)?.native.clone())
    }

    /// Descriptors written into a descriptor set.
    pub fn descriptor_writes(&self, set: DescriptorSetId) -> Result<Vec<DescriptorWrite>> {
        Ok(lock(&self.internal.descriptors).writes(set)?.to_vec())
    }

    /// Sets allocated from `pool` and the most it can hold.
    pub fn descriptor_pool_usage(&self, pool: DescriptorPoolId) -> Option<(usize, u32)> {
        lock(&self.internal.descriptors).pool_usage(pool)
    }

    /// Descriptor sets not yet freed.
    pub fn live_descriptor_sets(&self) -> usize {
        lock(&self.internal.descriptors).live_sets()
    }

    pub(crate) fn resources(&self) -> &ResourceTables {
        &self.internal.resources
    }

    pub(crate) fn framebuffer(&self, handle: FBHandle) -> Result<VulkanFramebuffer> {
        Ok(lock(&self.internal.passes).framebuffer(handle)?.native.clone())
    }

    pub(crate) fn create_descriptor_pool(&self, desc: DescriptorPoolDesc) -> DescriptorPoolId {
        log::trace!("Vulkan descriptor pool: {} sets, {} pool sizes", desc.max_sets, desc.pool_sizes.len());
        lock(&self.internal.descriptors).create_pool(desc)
    }

    pub(crate) fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolId,
        writes: Vec<DescriptorWrite>,
    ) -> Result<DescriptorSetId> {
        lock(&self.internal.descriptors).allocate(pool, writes)
    }

    pub(crate) fn destroy_descriptor_pool(&self, pool: DescriptorPoolId) -> Result<()> {
        lock(&self.internal.descriptors).destroy_pool(pool)
    }

    /// `vkQueueSubmit` followed by a timeline signal.
    pub(crate) fn execute(&self, commands: Vec<VulkanCommand>) -> Result<()> {
        let resources = &self.internal.resources;
        let logging = self.internal.command_log_enabled.load(Ordering::Relaxed);
        for command in &commands {
            match command {
                VulkanCommand::PipelineBarrier {
                    image_barriers,
                    buffer_barriers,
                    ..
                } => {
                    for barrier in image_barriers {
                        self.apply_image_barrier(barrier)?;
                    }
                    for barrier in buffer_barriers {
                        self.apply_buffer_barrier(barrier)?;
                    }
                    resources.count_barriers(image_barriers.len() + buffer_barriers.len());
                }
                VulkanCommand::CopyBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => resources.copy_buffer(*src, *src_offset as usize, *dst, *dst_offset as usize, *size as usize)?,
                VulkanCommand::BeginRenderPass { layout_changes, .. }
                | VulkanCommand::NextSubpass { layout_changes }
                | VulkanCommand::EndRenderPass { layout_changes } => self.apply_layout_changes(layout_changes)?,
                VulkanCommand::Draw { .. } | VulkanCommand::DrawIndexed { .. } => resources.count_draw(),
                VulkanCommand::Dispatch { .. }
                | VulkanCommand::DrawMeshTasks { .. }
                | VulkanCommand::TraceRays { .. } => resources.count_dispatch(),
                _ => {}
            }
            log::trace!("{}", command.name());
        }
        resources.count_submission();
        let value = self.internal.timeline.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("Vulkan submitted {} commands, timeline {value}", commands.len());
        if logging {
            lock(&self.internal.command_log).extend(commands);
        }
        Ok(())
    }

    fn tracked_layout(layout: vk::ImageLayout) -> Result<ImageLayout> {
        engine_layout(layout).ok_or_else(|| ConfigurationError::unmapped("tracked_layout", layout).into())
    }

    fn apply_image_barrier(&self, barrier: &ImageMemoryBarrier) -> Result<()> {
        let layout = Self::tracked_layout(barrier.new_layout)?;
        self.internal.resources.set_texture_layout(
            barrier.texture,
            barrier.base_mip_level..barrier.base_mip_level + barrier.level_count,
            barrier.base_array_layer..barrier.base_array_layer + barrier.layer_count,
            layout,
        )
    }

    fn apply_buffer_barrier(&self, barrier: &BufferMemoryBarrier) -> Result<()> {
        let resources = &self.internal.resources;
        let current = resources.buffer_state(barrier.buffer)?;
        if current != barrier.src_access.as_raw() {
            log::warn!(
                "Buffer {:?} was last accessed as {current:#x}, barrier expects {:?}",
                barrier.buffer,
                barrier.src_access
            );
        }
        resources.set_buffer_state(barrier.buffer, barrier.dst_access.as_raw())
    }

    fn apply_layout_changes(&self, changes: &[AttachmentLayoutChange]) -> Result<()> {
        for change in changes {
            let layers = self.internal.resources.texture_desc(change.texture)?.array_layers;
            self.internal.resources.set_texture_layout(
                change.texture,
                change.mip_level..change.mip_level + 1,
                0..layers,
                Self::tracked_layout(change.layout)?,
            )?;
        }
        Ok(())
    }

    fn attachment_view(&self, texture: TextureId, mip: u32) -> Result<ViewId> {
        let desc = self.internal.resources.texture_desc(texture)?;
        self.internal
            .resources
            .create_view(texture, ViewKind::Image, Some(mip), None, desc.format.to_vk()?.as_raw() as u32)
    }

    fn release_views(&self, views: &[ViewId]) {
        for &view in views {
            if let Err(err) = self.internal.resources.release_view(view) {
                log::warn!("Failed to release framebuffer view {view:?}: {err}");
            }
        }
    }
}

impl RenderDevice for VulkanDevice {
    fn backend(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId> {
        let _: vk::Format = desc.format.to_vk()?;
        sample_count(desc.sample_count)?;
        self.internal.resources.create_texture(desc, ImageLayout::Undefined)
    }

    fn texture_desc(&self, texture: TextureId) -> Result<TextureDesc> {
        self.internal.resources.texture_desc(texture)
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RPHandle> {
        let layout = RenderPassLayout::resolve(desc)?;
        let info = RenderPassInfo::from_layout(&layout)?;
        let handle = lock(&self.internal.passes).insert_render_pass(layout, info);
        log::debug!(
            "Vulkan render pass {handle:?}: {} attachments, {} subpasses, {} dependencies",
            desc.attachments.len(),
            desc.subpasses.len(),
            desc.dependencies.len()
        );
        Ok(handle)
    }

    fn delete_render_pass(&self, render_pass: RPHandle) -> Result<()> {
        lock(&self.internal.passes).remove_render_pass(render_pass)?;
        Ok(())
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FBHandle> {
        lock(&self.internal.passes).render_pass(desc.render_pass)?;
        let mut views = Vec::with_capacity(desc.attachments.len());
        for &texture in &desc.attachments {
            match self.attachment_view(texture, desc.mip_level) {
                Ok(view) => views.push(view),
                Err(err) => {
                    self.release_views(&views);
                    return Err(err);
                }
            }
        }
        let result = lock(&self.internal.passes)
            .insert_framebuffer(desc.clone(), VulkanFramebuffer { views: views.clone() });
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
        Box::new(VulkanGeometry::new(self.clone()))
    }

    fn new_shader(&self) -> Box<dyn Shader> {
        Box::new(VulkanShader::new(self.clone()))
    }

    fn new_pipeline(&self) -> Box<dyn Pipeline> {
        Box::new(VulkanPipeline::new(self.clone()))
    }

    fn new_command_buffer(&self) -> Box<dyn CommandBuffer> {
        Box::new(VulkanCommandBuffer::new(self.clone()))
    }

    fn release(&self, resource: DeviceResource) -> Result<()> {
        match resource {
            DeviceResource::DescriptorSet(set) => lock(&self.internal.descriptors).free(set),
            other => self.internal.resources.release(other),
        }
    }

    fn wait_idle(&self) -> Result<()> {
        let value = self.internal.timeline.load(Ordering::Relaxed);
        log::trace!("Vulkan wait_idle: timeline {value} reached");
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
    use crate::graphics::vulkan::descriptors::{DescriptorPoolSize, DescriptorWrite};
    use verus_core::cgi::api::{Attachment, AttachmentRef, Dependency, Format, Subpass};

    fn device() -> VulkanDevice {
        VulkanDevice::new(&CgiSettings::for_backend(BackendKind::Vulkan))
    }

    fn deferred_pass() -> RenderPassDesc {
        RenderPassDesc {
            attachments: vec![
                Attachment::new("GBuffer", Format::UnormR8G8B8A8)
                    .load_op_clear()
                    .layout(ImageLayout::Undefined, ImageLayout::ShaderReadOnly),
                Attachment::new("Depth", Format::UnormD24UintS8)
                    .load_op_clear()
                    .stencil_load_op_clear()
                    .layout(
                        ImageLayout::DepthStencilAttachment,
                        ImageLayout::DepthStencilReadOnly,
                    ),
            ],
            subpasses: vec![
                Subpass::new("Geometry")
                    .color([AttachmentRef::new("GBuffer", ImageLayout::ColorAttachment)])
                    .depth_stencil(AttachmentRef::new("Depth", ImageLayout::DepthStencilAttachment)),
                Subpass::new("Lighting")
                    .input([AttachmentRef::new("GBuffer", ImageLayout::ShaderReadOnly)])
                    .depth_stencil(AttachmentRef::new("Depth", ImageLayout::DepthStencilReadOnly)),
            ],
            dependencies: vec![
                Dependency::new().src("Geometry").dst("Lighting"),
                Dependency::new().dst("Geometry"),
            ],
        }
    }

    #[test]
    fn test_render_pass_info_maps_ops_and_external_subpasses() {
        let device = device();
        let rp = device.create_render_pass(&deferred_pass()).unwrap();
        let info = device.render_pass_info(rp).unwrap();

        assert_eq!(info.attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.attachments[0].final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(info.attachments[1].format, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(info.attachments[1].stencil_load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.attachments[1].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(info.subpasses[1].input_attachments[0].attachment, 0);
        assert_eq!(
            info.subpasses[1].depth_stencil_attachment.unwrap().layout,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            info.dependencies,
            vec![
                SubpassDependency {
                    src_subpass: 0,
                    dst_subpass: 1
                },
                SubpassDependency {
                    src_subpass: vk::SUBPASS_EXTERNAL,
                    dst_subpass: 0
                },
            ]
        );
    }

    #[test]
    fn test_framebuffer_views_are_image_views() {
        let device = device();
        let rp = device.create_render_pass(&deferred_pass()).unwrap();
        let color = device
            .create_texture(&TextureDesc::attachment("g", Format::UnormR8G8B8A8, 32, 32))
            .unwrap();
        let depth = device
            .create_texture(&TextureDesc::attachment("d", Format::UnormD24UintS8, 32, 32))
            .unwrap();
        let fb = device
            .create_framebuffer(&FramebufferDesc {
                render_pass: rp,
                attachments: vec![color, depth],
                width: 32,
                height: 32,
                mip_level: 0,
            })
            .unwrap();
        let views = device.framebuffer(fb).unwrap().views;
        let view = device.resources().view(views[1]).unwrap();
        assert_eq!(view.kind, ViewKind::Image);
        assert_eq!(view.format, vk::Format::D24_UNORM_S8_UINT.as_raw() as u32);
        device.delete_framebuffer(fb).unwrap();
        assert_eq!(device.stats().live_views, 0);
    }

    #[test]
    fn test_execute_tracks_layouts_and_buffer_access() {
        let device = device();
        device.enable_command_log(true);
        let texture = device
            .create_texture(&TextureDesc::sampled("t", Format::UnormR8G8B8A8, 4, 4).with_mip_levels(2))
            .unwrap();
        let src = device.resources().create_buffer("src", 4, 0);
        let dst = device.resources().create_buffer("dst", 4, 0);
        device.resources().write_buffer(src, 0, &[5, 6, 7, 8]).unwrap();

        device
            .execute(vec![
                VulkanCommand::PipelineBarrier {
                    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                    dst_stage: vk::PipelineStageFlags::TRANSFER,
                    image_barriers: vec![ImageMemoryBarrier {
                        texture,
                        src_access: vk::AccessFlags::empty(),
                        dst_access: vk::AccessFlags::TRANSFER_WRITE,
                        old_layout: vk::ImageLayout::UNDEFINED,
                        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        aspect: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 1,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    }],
                    buffer_barriers: vec![BufferMemoryBarrier {
                        buffer: dst,
                        src_access: vk::AccessFlags::empty(),
                        dst_access: vk::AccessFlags::TRANSFER_WRITE,
                        offset: 0,
                        size: 4,
                    }],
                },
                VulkanCommand::CopyBuffer {
                    src,
                    src_offset: 0,
                    dst,
                    dst_offset: 0,
                    size: 4,
                },
                VulkanCommand::EndRenderPass {
                    layout_changes: vec![AttachmentLayoutChange {
                        texture,
                        mip_level: 0,
                        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    }],
                },
            ])
            .unwrap();

        assert_eq!(device.texture_layout(texture, 0, 0).unwrap(), ImageLayout::ShaderReadOnly);
        assert_eq!(device.texture_layout(texture, 1, 0).unwrap(), ImageLayout::TransferDst);
        assert_eq!(device.read_buffer(dst).unwrap(), vec![5, 6, 7, 8]);
        assert_eq!(device.resources().buffer_state(dst).unwrap(), 0x1000);
        let stats = device.stats();
        assert_eq!((stats.barriers, stats.copies, stats.submissions), (2, 1, 1));
        assert_eq!(device.take_command_log().len(), 3);
    }

    #[test]
    fn test_released_descriptor_sets_return_to_their_pool() {
        let device = device();
        let pool = device.create_descriptor_pool(DescriptorPoolDesc {
            pool_sizes: vec![DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 1,
            }],
            max_sets: 1,
            free_descriptor_set: true,
        });
        let buffer = device.resources().create_buffer("ub", 256, 0);
        let write = DescriptorWrite::UniformBufferDynamic {
            binding: 0,
            buffer,
            range: 64,
        };
        let set = device.allocate_descriptor_set(pool, vec![write]).unwrap();
        assert_eq!(device.descriptor_writes(set).unwrap(), vec![write]);
        assert!(device.allocate_descriptor_set(pool, Vec::new()).is_err());

        device.release(DeviceResource::DescriptorSet(set)).unwrap();
        assert_eq!(device.descriptor_pool_usage(pool), Some((0, 1)));
        assert_eq!(device.live_descriptor_sets(), 0);
        device.destroy_descriptor_pool(pool).unwrap();
        assert_eq!(device.descriptor_pool_usage(pool), None);
    }
}
