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

//! Vulkan command buffers.
//!
//! Render passes transition their attachments themselves. The layout changes
//! they perform travel with the render pass commands so the device can track
//! them on submit.

use super::device::VulkanDevice;
use super::geometry::VulkanGeometry;
use super::native::{
    aspect_mask, image_barrier_masks, scissors, viewports, AttachmentLayoutChange, ClearValue,
    ImageMemoryBarrier, Rect2D, ToVk, VulkanCommand,
};
use super::pipeline::VulkanPipeline;
use super::shader::{VulkanSetBinding, VulkanShader};
use crate::graphics::{downcast, downcast_mut};
use std::any::Any;
use std::ops::Range;
use verus_core::cgi::api::{
    CSHandle, FBHandle, FramebufferDesc, ImageLayout, LayoutTransition, PipelineId, RPHandle,
    ShaderStageFlags, TextureId,
};
use verus_core::cgi::error::{CgiError, ConfigurationError, Result};
use verus_core::cgi::recording::RecordingState;
use verus_core::cgi::traits::{
    CommandBuffer, CommandBufferState, Geometry, Pipeline, Rect, RenderDevice, Shader,
};
use verus_core::RenderContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundPipeline {
    layout: PipelineId,
    compute: bool,
}

/// A Vulkan command buffer.
pub struct VulkanCommandBuffer {
    device: VulkanDevice,
    recording: RecordingState,
    buffers: Vec<Vec<VulkanCommand>>,
    current: usize,
    one_time: bool,
    bound: Option<BoundPipeline>,
}

fn layout_changes(fb: &FramebufferDesc, transitions: &[LayoutTransition]) -> Result<Vec<AttachmentLayoutChange>> {
    transitions
        .iter()
        .map(|t| {
            Ok(AttachmentLayoutChange {
                texture: fb.attachments[t.attachment],
                mip_level: fb.mip_level,
                layout: t.to.to_vk()?,
            })
        })
        .collect()
}

impl VulkanCommandBuffer {
    pub(crate) fn new(device: VulkanDevice) -> Self {
        Self {
            device,
            recording: RecordingState::default(),
            buffers: Vec::new(),
            current: 0,
            one_time: false,
            bound: None,
        }
    }

    /// Appends commands to the buffer being recorded.
    pub(crate) fn record_all(&mut self, commands: impl IntoIterator<Item = VulkanCommand>) -> Result<()> {
        self.recording.require_recording("record")?;
        let buffer = self.buffers.get_mut(self.current).ok_or_else(|| {
            ConfigurationError::invalid_state("record", "command buffer has no VkCommandBuffer")
        })?;
        buffer.extend(commands);
        Ok(())
    }

    fn record(&mut self, command: VulkanCommand) -> Result<()> {
        self.record_all([command])
    }

    /// Commands recorded into the current buffer so far.
    pub fn recorded(&self) -> &[VulkanCommand] {
        self.buffers.get(self.current).map_or(&[], Vec::as_slice)
    }

    fn bound_pipeline(&self, operation: &'static str) -> Result<BoundPipeline> {
        self.bound
            .ok_or_else(|| ConfigurationError::invalid_state(operation, "no pipeline bound").into())
    }

    fn record_set_binding(&mut self, bound: BoundPipeline, binding: VulkanSetBinding) -> Result<()> {
        let command = match binding {
            VulkanSetBinding::PushConstants { stage_flags, data } => VulkanCommand::PushConstants {
                layout: bound.layout,
                stage_flags,
                offset: 0,
                data,
            },
            VulkanSetBinding::DescriptorSet {
                set,
                descriptor_set,
                dynamic_offsets,
            } => VulkanCommand::BindDescriptorSets {
                compute: bound.compute,
                layout: bound.layout,
                first_set: set,
                descriptor_sets: vec![descriptor_set],
                dynamic_offsets,
            },
        };
        self.record(command)
    }
}

impl CommandBuffer for VulkanCommandBuffer {
    fn init(&mut self, ctx: &RenderContext) -> Result<()> {
        self.buffers = vec![Vec::new(); ctx.ring_buffer_depth()];
        self.one_time = false;
        log::trace!("Vulkan command buffer with {} VkCommandBuffers", self.buffers.len());
        Ok(())
    }

    fn done(&mut self, _ctx: &RenderContext) {
        self.buffers.clear();
        self.recording.reset();
        self.bound = None;
    }

    fn init_one_time_submit(&mut self, ctx: &RenderContext) -> Result<()> {
        self.buffers = vec![Vec::new()];
        self.one_time = true;
        self.begin(ctx)
    }

    fn done_one_time_submit(&mut self, ctx: &RenderContext) -> Result<()> {
        self.end(ctx)?;
        self.submit(ctx)?;
        ctx.device().wait_idle()?;
        self.buffers.clear();
        Ok(())
    }

    fn state(&self) -> CommandBufferState {
        self.recording.state()
    }

    fn begin(&mut self, ctx: &RenderContext) -> Result<()> {
        if self.buffers.is_empty() {
            return Err(ConfigurationError::invalid_state("begin", "command buffer not initialized").into());
        }
        self.recording.begin()?;
        self.current = if self.one_time {
            0
        } else {
            ctx.ring_buffer_index() % self.buffers.len()
        };
        self.buffers[self.current].clear();
        self.bound = None;
        Ok(())
    }

    fn end(&mut self, _ctx: &RenderContext) -> Result<()> {
        self.recording.end()
    }

    fn submit(&mut self, _ctx: &RenderContext) -> Result<()> {
        self.recording.require_ended("submit")?;
        let commands = self
            .buffers
            .get_mut(self.current)
            .map(std::mem::take)
            .unwrap_or_default();
        self.recording.reset();
        self.device.execute(commands)
    }

    fn pipeline_image_memory_barrier(
        &mut self,
        _ctx: &RenderContext,
        texture: TextureId,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        mip_levels: Range<u32>,
        array_layers: Range<u32>,
    ) -> Result<()> {
        self.recording.require_outside_pass("pipeline_image_memory_barrier")?;
        let masks = image_barrier_masks(old_layout, new_layout)?;
        let desc = self.device.texture_desc(texture)?;
        if mip_levels.is_empty()
            || array_layers.is_empty()
            || mip_levels.end > desc.mip_levels
            || array_layers.end > desc.array_layers
        {
            return Err(ConfigurationError::Invalid(format!(
                "barrier range mips {mip_levels:?} layers {array_layers:?} exceeds texture '{}'",
                desc.name
            ))
            .into());
        }
        let barrier = ImageMemoryBarrier {
            texture,
            src_access: masks.src_access,
            dst_access: masks.dst_access,
            old_layout: old_layout.to_vk()?,
            new_layout: new_layout.to_vk()?,
            aspect: aspect_mask(desc.format, new_layout),
            base_mip_level: mip_levels.start,
            level_count: mip_levels.len() as u32,
            base_array_layer: array_layers.start,
            layer_count: array_layers.len() as u32,
        };
        self.record(VulkanCommand::PipelineBarrier {
            src_stage: masks.src_stage,
            dst_stage: masks.dst_stage,
            image_barriers: vec![barrier],
            buffer_barriers: Vec::new(),
        })
    }

    fn begin_render_pass(
        &mut self,
        ctx: &RenderContext,
        render_pass: RPHandle,
        framebuffer: FBHandle,
        clear_values: &[[f32; 4]],
    ) -> Result<()> {
        let layout = ctx.device().render_pass_layout(render_pass)?;
        let fb_desc = ctx.device().framebuffer_desc(framebuffer)?;
        let clears = layout
            .attachments
            .iter()
            .enumerate()
            .map(|(i, attachment)| {
                let value = clear_values.get(i).copied().unwrap_or_default();
                if attachment.desc.format.is_depth() {
                    ClearValue::DepthStencil {
                        depth: value[0],
                        stencil: value[1] as u32,
                    }
                } else {
                    ClearValue::Color(value)
                }
            })
            .collect();
        let transitions = self.recording.begin_render_pass(
            render_pass,
            layout,
            framebuffer,
            fb_desc.clone(),
            clear_values,
        )?;
        self.record(VulkanCommand::BeginRenderPass {
            render_pass,
            framebuffer,
            render_area: Rect2D {
                x: 0,
                y: 0,
                width: fb_desc.width,
                height: fb_desc.height,
            },
            clear_values: clears,
            layout_changes: layout_changes(&fb_desc, &transitions)?,
        })?;
        let size = Rect::from_size(fb_desc.width as f32, fb_desc.height as f32);
        self.set_viewport(&[size], 0.0, 1.0)?;
        self.set_scissor(&[size])
    }

    fn next_subpass(&mut self, _ctx: &RenderContext) -> Result<()> {
        let transitions = self.recording.next_subpass()?;
        let fb_desc = &self.recording.require_pass("next_subpass")?.framebuffer_desc;
        let layout_changes = layout_changes(fb_desc, &transitions)?;
        self.record(VulkanCommand::NextSubpass { layout_changes })
    }

    fn end_render_pass(&mut self, _ctx: &RenderContext) -> Result<()> {
        let (pass, transitions) = self.recording.end_render_pass()?;
        let layout_changes = layout_changes(&pass.framebuffer_desc, &transitions)?;
        self.record(VulkanCommand::EndRenderPass { layout_changes })
    }

    fn bind_pipeline(&mut self, pipeline: &dyn Pipeline) -> Result<()> {
        let pipeline = downcast::<VulkanPipeline>(pipeline.as_any(), "VulkanPipeline")?;
        let (id, layout) = pipeline.ids()?;
        let compute = pipeline.is_compute();
        self.recording.bind_pipeline(pipeline.bind_point())?;
        self.bound = Some(BoundPipeline { layout, compute });
        self.record(VulkanCommand::BindPipeline { compute, pipeline: id })
    }

    fn set_viewport(&mut self, rects: &[Rect], min_depth: f32, max_depth: f32) -> Result<()> {
        self.record(VulkanCommand::SetViewport(viewports(rects, min_depth, max_depth)))
    }

    fn set_scissor(&mut self, rects: &[Rect]) -> Result<()> {
        self.record(VulkanCommand::SetScissor(scissors(rects)))
    }

    fn set_blend_constants(&mut self, constants: [f32; 4]) -> Result<()> {
        self.record(VulkanCommand::SetBlendConstants(constants))
    }

    fn bind_vertex_buffers(
        &mut self,
        ctx: &RenderContext,
        geometry: &dyn Geometry,
        bindings_filter: u32,
    ) -> Result<()> {
        let geometry = downcast::<VulkanGeometry>(geometry.as_any(), "VulkanGeometry")?;
        let (buffers, offsets) = geometry
            .layout()
            .filtered_bindings(bindings_filter)
            .into_iter()
            .map(|binding| geometry.vertex_binding(binding, ctx.ring_buffer_index()))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();
        self.record(VulkanCommand::BindVertexBuffers {
            first_binding: 0,
            buffers,
            offsets,
        })
    }

    fn bind_index_buffer(&mut self, ctx: &RenderContext, geometry: &dyn Geometry) -> Result<()> {
        let geometry = downcast::<VulkanGeometry>(geometry.as_any(), "VulkanGeometry")?;
        let (buffer, offset, index_type) = geometry.index_binding(ctx.ring_buffer_index())?;
        self.record(VulkanCommand::BindIndexBuffer {
            buffer,
            offset,
            index_type,
        })
    }

    fn bind_descriptors(
        &mut self,
        ctx: &RenderContext,
        shader: &mut dyn Shader,
        set: i32,
        csh: CSHandle,
    ) -> Result<bool> {
        self.recording.require_recording("bind_descriptors")?;
        let Ok(set) = usize::try_from(set) else {
            return Ok(true);
        };
        let bound = self.bound_pipeline("bind_descriptors")?;
        let shader = downcast_mut::<VulkanShader>(shader.as_any_mut(), "VulkanShader")?;
        if shader.pipeline_layout()? != bound.layout {
            return Err(ConfigurationError::Invalid(format!(
                "shader '{}' does not match the pipeline layout of the bound pipeline",
                shader.source_name()
            ))
            .into());
        }
        match shader.prepare_bind(ctx, set, csh)? {
            Some(binding) => {
                self.record_set_binding(bound, binding)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn push_constants(
        &mut self,
        _ctx: &RenderContext,
        shader: &dyn Shader,
        offset: u32,
        values: &[u32],
        stage_flags: ShaderStageFlags,
    ) -> Result<()> {
        self.recording.require_recording("push_constants")?;
        let bound = self.bound_pipeline("push_constants")?;
        let vulkan = downcast::<VulkanShader>(shader.as_any(), "VulkanShader")?;
        let range = vulkan.push_constant_range().ok_or_else(|| {
            ConfigurationError::Invalid(format!("shader '{}' has no push constant range", shader.source_name()))
        })?;
        let start = offset << 2;
        let end = start as usize + std::mem::size_of_val(values);
        if end > (range.offset + range.size) as usize {
            return Err(ConfigurationError::Invalid(format!(
                "push constants {start}..{end} exceed the {} byte range",
                range.size
            ))
            .into());
        }
        self.record(VulkanCommand::PushConstants {
            layout: bound.layout,
            stage_flags: stage_flags.to_vk()?,
            offset: start,
            data: bytemuck::cast_slice(values).to_vec(),
        })
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.recording.require_draw("draw")?;
        self.record(VulkanCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        })
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.recording.require_draw("draw_indexed")?;
        self.record(VulkanCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        })
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()> {
        self.recording.require_dispatch("dispatch")?;
        self.record(VulkanCommand::Dispatch {
            x: group_count_x,
            y: group_count_y,
            z: group_count_z,
        })
    }

    fn dispatch_mesh(&mut self, ctx: &RenderContext, x: u32, y: u32, z: u32) -> Result<()> {
        if !ctx.settings().mesh_shaders {
            return Err(CgiError::FeatureUnsupported("mesh shaders"));
        }
        self.recording.require_draw("dispatch_mesh")?;
        self.record(VulkanCommand::DrawMeshTasks { x, y, z })
    }

    fn trace_rays(&mut self, ctx: &RenderContext, width: u32, height: u32, depth: u32) -> Result<()> {
        if !ctx.settings().ray_tracing {
            return Err(CgiError::FeatureUnsupported("ray tracing"));
        }
        self.recording.require_outside_pass("trace_rays")?;
        self.record(VulkanCommand::TraceRays { width, height, depth })
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
