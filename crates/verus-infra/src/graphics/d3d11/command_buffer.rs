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

//! Direct3D 11 command buffer.
//!
//! There is no deferred recording: every command is an immediate-context
//! call issued as soon as it is recorded. The command buffer still tracks
//! the recording state so misuse is rejected the same way on every backend.

use super::device::D3D11Device;
use super::geometry::D3D11Geometry;
use super::native::{D3D11Call, D3D11ClearFlags};
use super::pipeline::D3D11Pipeline;
use super::shader::{D3D11SetBinding, D3D11Shader};
use crate::graphics::d3d_common::{index_format, scissor_rects, viewports, RenderTargetBlendDesc};
use crate::graphics::{downcast, downcast_mut};
use std::any::Any;
use std::ops::Range;
use verus_core::cgi::api::{
    CSHandle, FBHandle, ImageLayout, RPHandle, ShaderStageFlags, Stage, TextureId,
};
use verus_core::cgi::error::Result;
use verus_core::cgi::recording::RecordingState;
use verus_core::cgi::traits::{
    CommandBuffer, CommandBufferState, Geometry, Pipeline, Rect, Shader,
};
use verus_core::RenderContext;

const GRAPHICS_STAGES: [Stage; 5] = [Stage::Vs, Stage::Hs, Stage::Ds, Stage::Gs, Stage::Fs];

/// A Direct3D 11 command buffer.
pub struct D3D11CommandBuffer {
    device: D3D11Device,
    recording: RecordingState,
    blend_factor: [f32; 4],
    /// Blend state of the bound graphics pipeline, re-applied when the blend factor changes.
    blend: Option<(Vec<RenderTargetBlendDesc>, u32)>,
}

impl D3D11CommandBuffer {
    pub(crate) fn new(device: D3D11Device) -> Self {
        Self {
            device,
            recording: RecordingState::default(),
            blend_factor: [1.0; 4],
            blend: None,
        }
    }

    /// Clears what the current subpass clears and binds its render targets.
    fn prepare_subpass(&mut self) -> Result<()> {
        let pass = self.recording.require_pass("prepare_subpass")?;
        let views = self.device.framebuffer(pass.framebuffer)?.views;
        let mut calls = Vec::new();
        for (clear, value) in pass.pending_clears() {
            let view = views[clear.attachment];
            if clear.is_depth {
                let mut flags = D3D11ClearFlags::empty();
                if clear.clear_main {
                    flags |= D3D11ClearFlags::DEPTH;
                }
                if clear.clear_stencil {
                    flags |= D3D11ClearFlags::STENCIL;
                }
                calls.push(D3D11Call::ClearDepthStencilView {
                    view,
                    flags,
                    depth: value[0],
                    stencil: value[1] as u8,
                });
            } else {
                calls.push(D3D11Call::ClearRenderTargetView { view, color: value });
            }
        }
        let subpass = pass.layout.subpass(pass.subpass)?;
        calls.push(D3D11Call::OmSetRenderTargets {
            render_targets: subpass.color.iter().map(|r| views[r.index]).collect(),
            depth_stencil: subpass.depth_stencil.map(|r| views[r.index]),
        });
        calls.into_iter().try_for_each(|call| self.device.call(call))
    }

    fn apply_set_binding(&self, binding: D3D11SetBinding) -> Result<()> {
        for stage in Stage::ALL {
            if !binding.stage_flags.has_stage(stage) {
                continue;
            }
            if let Some((buffer, first_constant, num_constants)) = binding.constant_buffer {
                self.device.call(D3D11Call::SetConstantBuffers {
                    stage,
                    slot: binding.slot,
                    buffer,
                    first_constant,
                    num_constants,
                })?;
            }
            if !binding.srvs.is_empty() {
                self.device.call(D3D11Call::SetShaderResources {
                    stage,
                    start_slot: binding.srv_start,
                    views: binding.srvs.clone(),
                })?;
                self.device.call(D3D11Call::SetSamplers {
                    stage,
                    start_slot: binding.srv_start,
                    samplers: binding.samplers.clone(),
                })?;
            }
            if stage == Stage::Cs && !binding.uavs.is_empty() {
                self.device.call(D3D11Call::CsSetUnorderedAccessViews {
                    start_slot: binding.uav_start,
                    views: binding.uavs.clone(),
                })?;
            }
        }
        Ok(())
    }
}

impl CommandBuffer for D3D11CommandBuffer {
    fn init(&mut self, _ctx: &RenderContext) -> Result<()> {
        log::trace!("D3D11 command buffer records on the immediate context");
        Ok(())
    }

    fn done(&mut self, _ctx: &RenderContext) {
        self.recording.reset();
        self.blend = None;
    }

    fn init_one_time_submit(&mut self, ctx: &RenderContext) -> Result<()> {
        self.begin(ctx)
    }

    fn done_one_time_submit(&mut self, ctx: &RenderContext) -> Result<()> {
        self.end(ctx)?;
        self.submit(ctx)?;
        ctx.device().wait_idle()
    }

    fn state(&self) -> CommandBufferState {
        self.recording.state()
    }

    fn begin(&mut self, _ctx: &RenderContext) -> Result<()> {
        self.blend = None;
        self.recording.begin()
    }

    fn end(&mut self, _ctx: &RenderContext) -> Result<()> {
        self.recording.end()
    }

    fn submit(&mut self, _ctx: &RenderContext) -> Result<()> {
        self.recording.require_ended("submit")?;
        self.device.resources().count_submission();
        self.recording.reset();
        Ok(())
    }

    fn pipeline_image_memory_barrier(
        &mut self,
        _ctx: &RenderContext,
        texture: TextureId,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        _mip_levels: Range<u32>,
        _array_layers: Range<u32>,
    ) -> Result<()> {
        self.recording.require_recording("pipeline_image_memory_barrier")?;
        log::trace!("D3D11 barrier {texture:?} {old_layout:?} -> {new_layout:?}: nothing to do");
        Ok(())
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
        let size = Rect::from_size(fb_desc.width as f32, fb_desc.height as f32);
        self.recording
            .begin_render_pass(render_pass, layout, framebuffer, fb_desc, clear_values)?;
        self.prepare_subpass()?;
        self.set_viewport(&[size], 0.0, 1.0)?;
        self.set_scissor(&[size])
    }

    fn next_subpass(&mut self, _ctx: &RenderContext) -> Result<()> {
        self.recording.next_subpass()?;
        self.prepare_subpass()
    }

    fn end_render_pass(&mut self, _ctx: &RenderContext) -> Result<()> {
        self.recording.end_render_pass()?;
        self.device.call(D3D11Call::OmSetRenderTargets {
            render_targets: Vec::new(),
            depth_stencil: None,
        })
    }

    fn bind_pipeline(&mut self, pipeline: &dyn Pipeline) -> Result<()> {
        let pipeline = downcast::<D3D11Pipeline>(pipeline.as_any(), "D3D11Pipeline")?;
        let id = pipeline.id()?;
        self.recording.bind_pipeline(pipeline.bind_point())?;
        let Some(state) = pipeline.graphics() else {
            self.blend = None;
            return self.device.call(D3D11Call::SetShader {
                stage: Stage::Cs,
                pipeline: Some(id),
            });
        };

        for stage in GRAPHICS_STAGES {
            self.device.call(D3D11Call::SetShader {
                stage,
                pipeline: pipeline.has_stage(stage).then_some(id),
            })?;
        }
        self.device.call(D3D11Call::OmSetBlendState {
            blend: state.blend.clone(),
            blend_factor: self.blend_factor,
            sample_mask: state.sample_mask,
        })?;
        self.device.call(D3D11Call::RsSetState(state.rasterizer))?;
        self.device.call(D3D11Call::OmSetDepthStencilState {
            desc: state.depth_stencil,
            stencil_ref: state.stencil_ref,
        })?;
        self.device.call(D3D11Call::IaSetInputLayout(id))?;
        self.device.call(D3D11Call::IaSetPrimitiveTopology(state.topology))?;
        self.blend = Some((state.blend.clone(), state.sample_mask));
        Ok(())
    }

    fn set_viewport(&mut self, rects: &[Rect], min_depth: f32, max_depth: f32) -> Result<()> {
        self.recording.require_recording("set_viewport")?;
        self.device
            .call(D3D11Call::RsSetViewports(viewports(rects, min_depth, max_depth)))
    }

    fn set_scissor(&mut self, rects: &[Rect]) -> Result<()> {
        self.recording.require_recording("set_scissor")?;
        self.device.call(D3D11Call::RsSetScissorRects(scissor_rects(rects)))
    }

    fn set_blend_constants(&mut self, constants: [f32; 4]) -> Result<()> {
        self.recording.require_recording("set_blend_constants")?;
        self.blend_factor = constants;
        match &self.blend {
            Some((blend, sample_mask)) => self.device.call(D3D11Call::OmSetBlendState {
                blend: blend.clone(),
                blend_factor: constants,
                sample_mask: *sample_mask,
            }),
            None => Ok(()),
        }
    }

    fn bind_vertex_buffers(
        &mut self,
        ctx: &RenderContext,
        geometry: &dyn Geometry,
        bindings_filter: u32,
    ) -> Result<()> {
        self.recording.require_recording("bind_vertex_buffers")?;
        let geometry = downcast::<D3D11Geometry>(geometry.as_any(), "D3D11Geometry")?;
        let mut buffers = Vec::new();
        let mut strides = Vec::new();
        let mut offsets = Vec::new();
        for binding in geometry.layout().filtered_bindings(bindings_filter) {
            let (buffer, stride, offset) = geometry.vertex_binding(binding, ctx.ring_buffer_index())?;
            buffers.push(buffer);
            strides.push(stride);
            offsets.push(offset);
        }
        self.device.call(D3D11Call::IaSetVertexBuffers {
            start_slot: 0,
            buffers,
            strides,
            offsets,
        })
    }

    fn bind_index_buffer(&mut self, ctx: &RenderContext, geometry: &dyn Geometry) -> Result<()> {
        self.recording.require_recording("bind_index_buffer")?;
        let geometry = downcast::<D3D11Geometry>(geometry.as_any(), "D3D11Geometry")?;
        let (buffer, offset) = geometry.index_binding(ctx.ring_buffer_index())?;
        self.device.call(D3D11Call::IaSetIndexBuffer {
            buffer,
            format: index_format(geometry.layout().thirty_two_bit_indices()),
            offset,
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
        let shader = downcast_mut::<D3D11Shader>(shader.as_any_mut(), "D3D11Shader")?;
        match shader.prepare_bind(ctx, set, csh)? {
            Some(binding) => {
                self.apply_set_binding(binding)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn push_constants(
        &mut self,
        _ctx: &RenderContext,
        _shader: &dyn Shader,
        offset: u32,
        values: &[u32],
        _stage_flags: ShaderStageFlags,
    ) -> Result<()> {
        self.recording.require_recording("push_constants")?;
        log::trace!("D3D11 push_constants ({} words at {offset}) ignored", values.len());
        Ok(())
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.recording.require_draw("draw")?;
        self.device.call(D3D11Call::DrawInstanced {
            vertex_count,
            instance_count,
            start_vertex: first_vertex,
            start_instance: first_instance,
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
        self.device.call(D3D11Call::DrawIndexedInstanced {
            index_count,
            instance_count,
            start_index: first_index,
            base_vertex: vertex_offset,
            start_instance: first_instance,
        })
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()> {
        self.recording.require_dispatch("dispatch")?;
        self.device.call(D3D11Call::Dispatch {
            x: group_count_x,
            y: group_count_y,
            z: group_count_z,
        })
    }

    fn dispatch_mesh(&mut self, _ctx: &RenderContext, x: u32, y: u32, z: u32) -> Result<()> {
        log::trace!("D3D11 has no mesh shaders, dispatch_mesh({x}, {y}, {z}) ignored");
        Ok(())
    }

    fn trace_rays(&mut self, _ctx: &RenderContext, width: u32, height: u32, depth: u32) -> Result<()> {
        log::trace!("D3D11 has no ray tracing, trace_rays({width}, {height}, {depth}) ignored");
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
