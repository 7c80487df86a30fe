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

//! Direct3D 12 command lists.
//!
//! A command buffer owns one list per ring slot and records into the slot
//! current at `begin`. Nothing reaches the device until `submit`.

use super::descriptor_heap::{D3D12DescriptorHeapType, Descriptor};
use super::device::D3D12Device;
use super::geometry::D3D12Geometry;
use super::native::{
    calc_subresource, D3D12ClearFlags, D3D12Command, D3D12Resource, D3D12ResourceStates,
    TransitionBarrier, ALL_SUBRESOURCES,
};
use super::pipeline::D3D12Pipeline;
use super::shader::{D3D12SetBinding, D3D12Shader};
use crate::graphics::d3d_common::{scissor_rects, viewports, ToD3D};
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
    root_signature: PipelineId,
    compute: bool,
}

/// A Direct3D 12 command buffer.
pub struct D3D12CommandBuffer {
    device: D3D12Device,
    recording: RecordingState,
    lists: Vec<Vec<D3D12Command>>,
    current: usize,
    one_time: bool,
    bound: Option<BoundPipeline>,
    heaps_set: bool,
}

/// Barriers moving `texture` from `from` to `to` over a subresource range.
fn transition_barriers(
    device: &D3D12Device,
    texture: TextureId,
    from: ImageLayout,
    to: ImageLayout,
    mips: Range<u32>,
    layers: Range<u32>,
) -> Result<Vec<TransitionBarrier>> {
    if to == ImageLayout::Undefined {
        return Err(ConfigurationError::UnsupportedTransition {
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
        .into());
    }
    let before: D3D12ResourceStates = from.to_d3d()?;
    let after: D3D12ResourceStates = to.to_d3d()?;
    if before == after {
        return Ok(Vec::new());
    }
    let desc = device.texture_desc(texture)?;
    if mips.end > desc.mip_levels || layers.end > desc.array_layers {
        return Err(ConfigurationError::Invalid(format!(
            "barrier range mips {mips:?} layers {layers:?} exceeds texture '{}'",
            desc.name
        ))
        .into());
    }
    let barrier = |subresource| TransitionBarrier {
        resource: D3D12Resource::Texture(texture),
        subresource,
        before,
        after,
    };
    if mips == (0..desc.mip_levels) && layers == (0..desc.array_layers) {
        return Ok(vec![barrier(ALL_SUBRESOURCES)]);
    }
    Ok(mips
        .flat_map(|mip| layers.clone().map(move |layer| (mip, layer)))
        .map(|(mip, layer)| barrier(calc_subresource(mip, layer, desc.mip_levels)))
        .collect())
}

impl D3D12CommandBuffer {
    pub(crate) fn new(device: D3D12Device) -> Self {
        Self {
            device,
            recording: RecordingState::default(),
            lists: Vec::new(),
            current: 0,
            one_time: false,
            bound: None,
            heaps_set: false,
        }
    }

    /// Appends commands to the list being recorded.
    pub(crate) fn record_all(&mut self, commands: impl IntoIterator<Item = D3D12Command>) -> Result<()> {
        self.recording.require_recording("record")?;
        let list = self.lists.get_mut(self.current).ok_or_else(|| {
            ConfigurationError::invalid_state("record", "command buffer has no command list")
        })?;
        list.extend(commands);
        Ok(())
    }

    fn record(&mut self, command: D3D12Command) -> Result<()> {
        self.record_all([command])
    }

    /// Commands recorded into the current list so far.
    pub fn recorded(&self) -> &[D3D12Command] {
        self.lists.get(self.current).map_or(&[], Vec::as_slice)
    }

    fn record_transitions(&mut self, fb: &FramebufferDesc, transitions: &[LayoutTransition]) -> Result<()> {
        let mut barriers = Vec::new();
        for t in transitions {
            let texture = fb.attachments[t.attachment];
            let layers = self.device.texture_desc(texture)?.array_layers;
            barriers.extend(transition_barriers(
                &self.device,
                texture,
                t.from,
                t.to,
                fb.mip_level..fb.mip_level + 1,
                0..layers,
            )?);
        }
        if barriers.is_empty() {
            return Ok(());
        }
        self.record(D3D12Command::ResourceBarrier(barriers))
    }

    /// Clears what the current subpass clears and binds its render targets.
    fn prepare_subpass(&mut self) -> Result<()> {
        let pass = self.recording.require_pass("prepare_subpass")?;
        let views = self.device.framebuffer(pass.framebuffer)?.views;
        let mut commands = Vec::new();
        let subpass = pass.layout.subpass(pass.subpass)?;
        commands.push(D3D12Command::OmSetRenderTargets {
            render_targets: subpass.color.iter().map(|r| views[r.index]).collect(),
            depth_stencil: subpass.depth_stencil.map(|r| views[r.index]),
        });
        for (clear, value) in pass.pending_clears() {
            let view = views[clear.attachment];
            if clear.is_depth {
                let mut flags = D3D12ClearFlags::empty();
                if clear.clear_main {
                    flags |= D3D12ClearFlags::DEPTH;
                }
                if clear.clear_stencil {
                    flags |= D3D12ClearFlags::STENCIL;
                }
                commands.push(D3D12Command::ClearDepthStencilView {
                    view,
                    flags,
                    depth: value[0],
                    stencil: value[1] as u8,
                });
            } else {
                commands.push(D3D12Command::ClearRenderTargetView { view, color: value });
            }
        }
        self.record_all(commands)
    }

    fn bound_pipeline(&self, operation: &'static str) -> Result<BoundPipeline> {
        self.bound
            .ok_or_else(|| ConfigurationError::invalid_state(operation, "no pipeline bound").into())
    }

    fn record_set_binding(&mut self, ctx: &RenderContext, compute: bool, binding: D3D12SetBinding) -> Result<()> {
        if !self.heaps_set {
            self.record(D3D12Command::SetDescriptorHeaps(vec![
                D3D12DescriptorHeapType::CBV_SRV_UAV,
                D3D12DescriptorHeapType::SAMPLER,
            ]))?;
            self.heaps_set = true;
        }
        if let Some((root_parameter, values)) = binding.root_constants {
            self.record(D3D12Command::SetRoot32BitConstants {
                compute,
                root_parameter,
                values,
                dest_offset: 0,
            })?;
        }
        if let Some((root_parameter, buffer, offset)) = binding.constant_buffer {
            self.record(D3D12Command::SetRootConstantBufferView {
                compute,
                root_parameter,
                buffer,
                offset,
            })?;
        }
        let tables = [
            (D3D12DescriptorHeapType::CBV_SRV_UAV, binding.view_table),
            (D3D12DescriptorHeapType::SAMPLER, binding.sampler_table),
        ];
        for (heap_type, table) in tables {
            let Some((root_parameter, descriptors)) = table else {
                continue;
            };
            self.record_table(ctx, compute, heap_type, root_parameter, &descriptors)?;
        }
        Ok(())
    }

    fn record_table(
        &mut self,
        ctx: &RenderContext,
        compute: bool,
        heap_type: D3D12DescriptorHeapType,
        root_parameter: u32,
        descriptors: &[Descriptor],
    ) -> Result<()> {
        if descriptors.is_empty() {
            return Ok(());
        }
        let handle = self
            .device
            .write_table(heap_type, ctx.frame_count(), ctx.ring_buffer_index(), descriptors)?;
        self.record(D3D12Command::SetRootDescriptorTable {
            compute,
            root_parameter,
            base_descriptor: handle.gpu,
        })
    }
}

impl CommandBuffer for D3D12CommandBuffer {
    fn init(&mut self, ctx: &RenderContext) -> Result<()> {
        self.lists = vec![Vec::new(); ctx.ring_buffer_depth()];
        self.one_time = false;
        log::trace!("D3D12 command buffer with {} command lists", self.lists.len());
        Ok(())
    }

    fn done(&mut self, _ctx: &RenderContext) {
        self.lists.clear();
        self.recording.reset();
        self.bound = None;
    }

    fn init_one_time_submit(&mut self, ctx: &RenderContext) -> Result<()> {
        self.lists = vec![Vec::new()];
        self.one_time = true;
        self.begin(ctx)
    }

    fn done_one_time_submit(&mut self, ctx: &RenderContext) -> Result<()> {
        self.end(ctx)?;
        self.submit(ctx)?;
        ctx.device().wait_idle()?;
        self.lists.clear();
        Ok(())
    }

    fn state(&self) -> CommandBufferState {
        self.recording.state()
    }

    fn begin(&mut self, ctx: &RenderContext) -> Result<()> {
        if self.lists.is_empty() {
            return Err(ConfigurationError::invalid_state("begin", "command buffer not initialized").into());
        }
        self.recording.begin()?;
        self.current = if self.one_time {
            0
        } else {
            ctx.ring_buffer_index() % self.lists.len()
        };
        self.lists[self.current].clear();
        self.bound = None;
        self.heaps_set = false;
        Ok(())
    }

    fn end(&mut self, _ctx: &RenderContext) -> Result<()> {
        self.recording.end()
    }

    fn submit(&mut self, _ctx: &RenderContext) -> Result<()> {
        self.recording.require_ended("submit")?;
        let commands = self
            .lists
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
        let barriers = transition_barriers(&self.device, texture, old_layout, new_layout, mip_levels, array_layers)?;
        if barriers.is_empty() {
            return Ok(());
        }
        self.record(D3D12Command::ResourceBarrier(barriers))
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
        let transitions = self.recording.begin_render_pass(
            render_pass,
            layout,
            framebuffer,
            fb_desc.clone(),
            clear_values,
        )?;
        self.record_transitions(&fb_desc, &transitions)?;
        self.prepare_subpass()?;
        self.set_viewport(&[size], 0.0, 1.0)?;
        self.set_scissor(&[size])
    }

    fn next_subpass(&mut self, _ctx: &RenderContext) -> Result<()> {
        let transitions = self.recording.next_subpass()?;
        let fb_desc = self.recording.require_pass("next_subpass")?.framebuffer_desc.clone();
        self.record_transitions(&fb_desc, &transitions)?;
        self.prepare_subpass()
    }

    fn end_render_pass(&mut self, _ctx: &RenderContext) -> Result<()> {
        let (pass, transitions) = self.recording.end_render_pass()?;
        self.record_transitions(&pass.framebuffer_desc, &transitions)
    }

    fn bind_pipeline(&mut self, pipeline: &dyn Pipeline) -> Result<()> {
        let pipeline = downcast::<D3D12Pipeline>(pipeline.as_any(), "D3D12Pipeline")?;
        let (id, root_signature) = pipeline.ids()?;
        let compute = pipeline.is_compute();
        self.recording.bind_pipeline(pipeline.bind_point())?;
        let bound = BoundPipeline {
            root_signature,
            compute,
        };
        let mut commands = vec![D3D12Command::SetPipelineState(id)];
        if self.bound != Some(bound) {
            commands.push(D3D12Command::SetRootSignature {
                compute,
                root_signature,
            });
        }
        if let Some(state) = pipeline.graphics() {
            commands.push(D3D12Command::IaSetPrimitiveTopology(state.topology));
            commands.push(D3D12Command::OmSetStencilRef(state.stencil_ref));
        }
        self.bound = Some(bound);
        self.record_all(commands)
    }

    fn set_viewport(&mut self, rects: &[Rect], min_depth: f32, max_depth: f32) -> Result<()> {
        self.record(D3D12Command::RsSetViewports(viewports(rects, min_depth, max_depth)))
    }

    fn set_scissor(&mut self, rects: &[Rect]) -> Result<()> {
        self.record(D3D12Command::RsSetScissorRects(scissor_rects(rects)))
    }

    fn set_blend_constants(&mut self, constants: [f32; 4]) -> Result<()> {
        self.record(D3D12Command::OmSetBlendFactor(constants))
    }

    fn bind_vertex_buffers(
        &mut self,
        ctx: &RenderContext,
        geometry: &dyn Geometry,
        bindings_filter: u32,
    ) -> Result<()> {
        let geometry = downcast::<D3D12Geometry>(geometry.as_any(), "D3D12Geometry")?;
        let views = geometry
            .layout()
            .filtered_bindings(bindings_filter)
            .into_iter()
            .map(|binding| geometry.vertex_buffer_view(binding, ctx.ring_buffer_index()))
            .collect::<Result<Vec<_>>>()?;
        self.record(D3D12Command::IaSetVertexBuffers { start_slot: 0, views })
    }

    fn bind_index_buffer(&mut self, ctx: &RenderContext, geometry: &dyn Geometry) -> Result<()> {
        let geometry = downcast::<D3D12Geometry>(geometry.as_any(), "D3D12Geometry")?;
        let view = geometry.index_buffer_view(ctx.ring_buffer_index())?;
        self.record(D3D12Command::IaSetIndexBuffer(view))
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
        let shader = downcast_mut::<D3D12Shader>(shader.as_any_mut(), "D3D12Shader")?;
        if shader.root_signature()? != bound.root_signature {
            return Err(ConfigurationError::Invalid(format!(
                "shader '{}' does not match the root signature of the bound pipeline",
                shader.source_name()
            ))
            .into());
        }
        match shader.prepare_bind(ctx, set, csh)? {
            Some(binding) => {
                self.record_set_binding(ctx, bound.compute, binding)?;
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
        _stage_flags: ShaderStageFlags,
    ) -> Result<()> {
        self.recording.require_recording("push_constants")?;
        let bound = self.bound_pipeline("push_constants")?;
        let d3d12 = downcast::<D3D12Shader>(shader.as_any(), "D3D12Shader")?;
        let (root_parameter, count) = d3d12.root_constants().ok_or_else(|| {
            ConfigurationError::Invalid(format!("shader '{}' has no root constants", shader.source_name()))
        })?;
        let end = offset as usize + values.len();
        if end > count as usize {
            return Err(ConfigurationError::Invalid(format!(
                "push constants {offset}..{end} exceed {count} root constants"
            ))
            .into());
        }
        self.record(D3D12Command::SetRoot32BitConstants {
            compute: bound.compute,
            root_parameter,
            values: values.to_vec(),
            dest_offset: offset,
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
        self.record(D3D12Command::DrawInstanced {
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
        self.record(D3D12Command::DrawIndexedInstanced {
            index_count,
            instance_count,
            start_index: first_index,
            base_vertex: vertex_offset,
            start_instance: first_instance,
        })
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()> {
        self.recording.require_dispatch("dispatch")?;
        self.record(D3D12Command::Dispatch {
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
        self.record(D3D12Command::DispatchMesh { x, y, z })
    }

    fn trace_rays(&mut self, ctx: &RenderContext, width: u32, height: u32, depth: u32) -> Result<()> {
        if !ctx.settings().ray_tracing {
            return Err(CgiError::FeatureUnsupported("ray tracing"));
        }
        self.recording.require_outside_pass("trace_rays")?;
        self.record(D3D12Command::DispatchRays { width, height, depth })
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::create_context;
    use verus_core::cgi::api::{BackendKind, CgiSettings, Format, TextureDesc};

    fn setup() -> (RenderContext, Box<dyn CommandBuffer>, TextureId) {
        let ctx = create_context(CgiSettings::for_backend(BackendKind::D3D12)).unwrap();
        let cb = ctx.create_command_buffer().unwrap();
        let texture = ctx
            .create_texture(
                &TextureDesc::sampled("t", Format::UnormR8G8B8A8, 16, 16)
                    .with_mip_levels(3)
                    .with_array_layers(2),
            )
            .unwrap();
        (ctx, cb, texture)
    }

    fn d3d12(cb: &mut dyn CommandBuffer) -> &mut D3D12CommandBuffer {
        cb.as_any_mut().downcast_mut::<D3D12CommandBuffer>().unwrap()
    }

    #[test]
    fn test_barriers_cover_requested_subresources() {
        let (ctx, mut cb, texture) = setup();
        cb.begin(&ctx).unwrap();
        cb.pipeline_image_memory_barrier(&ctx, texture, ImageLayout::Undefined, ImageLayout::TransferDst, 0..3, 0..2)
            .unwrap();
        cb.pipeline_image_memory_barrier(&ctx, texture, ImageLayout::TransferDst, ImageLayout::ShaderReadOnly, 1..3, 1..2)
            .unwrap();
        cb.pipeline_image_memory_barrier(&ctx, texture, ImageLayout::General, ImageLayout::Undefined, 0..1, 0..1)
            .unwrap_err();
        cb.pipeline_image_memory_barrier(&ctx, texture, ImageLayout::Undefined, ImageLayout::General, 0..1, 0..1)
            .unwrap();

        let recorded = d3d12(cb.as_mut()).recorded().to_vec();
        assert_eq!(recorded.len(), 2);
        let D3D12Command::ResourceBarrier(whole) = &recorded[0] else {
            panic!("expected a barrier, got {:?}", recorded[0]);
        };
        assert_eq!(whole[0].subresource, ALL_SUBRESOURCES);
        let D3D12Command::ResourceBarrier(partial) = &recorded[1] else {
            panic!("expected a barrier, got {:?}", recorded[1]);
        };
        let subresources: Vec<_> = partial.iter().map(|b| b.subresource).collect();
        assert_eq!(subresources, vec![4, 5]);

        cb.end(&ctx).unwrap();
        cb.submit(&ctx).unwrap();
        let device = crate::graphics::downcast::<D3D12Device>(ctx.device().as_any(), "D3D12Device").unwrap();
        assert_eq!(device.texture_layout(texture, 0, 1).unwrap(), ImageLayout::TransferDst);
        assert_eq!(device.texture_layout(texture, 2, 1).unwrap(), ImageLayout::ShaderReadOnly);
        assert!(d3d12(cb.as_mut()).recorded().is_empty());
    }

    #[test]
    fn test_optional_features_are_reported() {
        let (ctx, mut cb, _) = setup();
        cb.begin(&ctx).unwrap();
        assert!(matches!(
            cb.dispatch_mesh(&ctx, 1, 1, 1),
            Err(CgiError::FeatureUnsupported("mesh shaders"))
        ));
        assert!(matches!(
            cb.trace_rays(&ctx, 8, 8, 1),
            Err(CgiError::FeatureUnsupported("ray tracing"))
        ));
    }

    #[test]
    fn test_begin_requires_init_and_submit_requires_end() {
        let ctx = create_context(CgiSettings::for_backend(BackendKind::D3D12)).unwrap();
        let mut cb = ctx.device().new_command_buffer();
        assert!(cb.begin(&ctx).is_err());
        cb.init(&ctx).unwrap();
        cb.begin(&ctx).unwrap();
        assert!(cb.submit(&ctx).unwrap_err().is_configuration());
        cb.set_blend_constants([0.5; 4]).unwrap();
        cb.end(&ctx).unwrap();
        cb.submit(&ctx).unwrap();
        assert_eq!(cb.state(), CommandBufferState::Initial);
    }
}
