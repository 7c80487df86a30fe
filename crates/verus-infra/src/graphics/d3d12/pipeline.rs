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

//! Direct3D 12 pipeline state objects.

use super::device::D3D12Device;
use super::native::D3D12PrimitiveTopologyType;
use super::shader::D3D12Shader;
use crate::graphics::d3d_common::{
    blend_desc, depth_stencil_desc, input_layout, rasterizer_desc, sample_count,
    D3DPrimitiveTopology, DepthStencilDesc, DxgiFormat, InputElementDesc, RasterizerDesc,
    RenderTargetBlendDesc, ToD3D,
};
use crate::graphics::downcast;
use std::any::Any;
use verus_core::cgi::api::{
    DeviceResource, PipelineBindPoint, PipelineDesc, PipelineId, Stage, VERUS_BLEND_ALPHA,
};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::Pipeline;
use verus_core::RenderContext;

/// `D3D12_GRAPHICS_PIPELINE_STATE_DESC` minus the shaders.
#[derive(Debug, Clone, PartialEq)]
pub struct D3D12GraphicsState {
    /// One element per vertex attribute.
    pub input_layout: Vec<InputElementDesc>,
    /// Topology class baked into the state object.
    pub topology_type: D3D12PrimitiveTopologyType,
    /// Set on the command list when the pipeline is bound.
    pub topology: D3DPrimitiveTopology,
    /// One entry per render target.
    pub blend: Vec<RenderTargetBlendDesc>,
    /// Coverage mask.
    pub sample_mask: u32,
    /// Depth and stencil tests.
    pub depth_stencil: DepthStencilDesc,
    /// Fill, culling and depth bias.
    pub rasterizer: RasterizerDesc,
    /// Formats of the subpass color attachments.
    pub rtv_formats: Vec<DxgiFormat>,
    /// Format of the subpass depth attachment, if any.
    pub dsv_format: Option<DxgiFormat>,
    /// Samples per pixel of the render targets.
    pub sample_count: u32,
    /// Set on the command list when the pipeline is bound.
    pub stencil_ref: u32,
    /// `D3D12_INDEX_BUFFER_STRIP_CUT_VALUE` is enabled.
    pub strip_cut: bool,
}

/// A Direct3D 12 pipeline state object.
pub struct D3D12Pipeline {
    device: D3D12Device,
    id: Option<PipelineId>,
    root_signature: Option<PipelineId>,
    bind_point: PipelineBindPoint,
    /// Bytecode size per stage, zero for absent stages.
    bytecode_sizes: [usize; 6],
    graphics: Option<D3D12GraphicsState>,
}

impl D3D12Pipeline {
    pub(crate) fn new(device: D3D12Device) -> Self {
        Self {
            device,
            id: None,
            root_signature: None,
            bind_point: PipelineBindPoint::Compute,
            bytecode_sizes: [0; 6],
            graphics: None,
        }
    }

    /// The pipeline state object and the root signature it was built against.
    pub(crate) fn ids(&self) -> Result<(PipelineId, PipelineId)> {
        match (self.id, self.root_signature) {
            (Some(id), Some(root_signature)) => Ok((id, root_signature)),
            _ => Err(ConfigurationError::invalid_state("bind_pipeline", "pipeline not initialized").into()),
        }
    }

    /// Fixed-function state, `None` for compute pipelines.
    pub fn graphics(&self) -> Option<&D3D12GraphicsState> {
        self.graphics.as_ref()
    }

    /// Size of the bytecode bound to `stage`.
    pub fn bytecode_size(&self, stage: Stage) -> usize {
        self.bytecode_sizes[stage.index()]
    }

    fn graphics_state(&self, ctx: &RenderContext, desc: &PipelineDesc<'_>) -> Result<D3D12GraphicsState> {
        let render_pass = ctx.device().render_pass_layout(desc.render_pass)?;
        let resolved = desc.resolve_graphics(&render_pass)?;
        let geometry = desc.geometry.ok_or_else(|| {
            ConfigurationError::Invalid("graphics pipeline requires a geometry".to_string())
        })?;
        let formats = self.device.render_pass_formats(desc.render_pass)?;
        let subpass = render_pass.subpass(desc.subpass)?;
        let samples = sample_count(desc.sample_count)?;
        let antialiased_line = desc.color_attach_blend_eqs[0] == VERUS_BLEND_ALPHA;
        Ok(D3D12GraphicsState {
            input_layout: input_layout(geometry.layout(), desc.vertex_input_bindings_filter)?,
            topology_type: desc.topology.to_d3d()?,
            topology: desc.topology.to_d3d()?,
            blend: blend_desc(&resolved.attachments)?,
            sample_mask: u32::MAX,
            depth_stencil: depth_stencil_desc(resolved.depth_stencil.as_ref())?,
            rasterizer: rasterizer_desc(&desc.rasterization_state, samples, antialiased_line)?,
            rtv_formats: subpass.color.iter().map(|r| formats[r.index]).collect(),
            dsv_format: subpass.depth_stencil.map(|r| formats[r.index]),
            sample_count: samples,
            stencil_ref: desc.stencil_ref,
            strip_cut: desc.primitive_restart_enable,
        })
    }
}

impl Pipeline for D3D12Pipeline {
    fn init(&mut self, ctx: &RenderContext, desc: &PipelineDesc<'_>) -> Result<()> {
        let shader = downcast::<D3D12Shader>(desc.shader.as_any(), "D3D12Shader")?;
        let root_signature = shader.root_signature()?;
        let branch = shader.branch(&desc.shader_branch).ok_or_else(|| {
            ConfigurationError::Invalid(format!(
                "shader '{}' has no branch '{}'",
                desc.shader.source_name(),
                desc.shader_branch
            ))
        })?;
        if desc.compute {
            desc.require_stage(Stage::Cs)?;
        } else {
            self.graphics = Some(self.graphics_state(ctx, desc)?);
        }
        for stage in Stage::ALL {
            self.bytecode_sizes[stage.index()] = branch.bytecode(stage).map_or(0, <[u8]>::len);
        }
        self.bind_point = desc.bind_point();
        self.root_signature = Some(root_signature);
        let kind = if desc.compute { "Compute" } else { "Graphics" };
        self.id = Some(
            self.device
                .resources()
                .create_pipeline(format!("{kind}Pipeline{}", desc.debug_name())),
        );
        log::debug!("D3D12 {kind} pipeline '{}' created", desc.debug_name());
        Ok(())
    }

    fn done(&mut self, ctx: &RenderContext) {
        if let Some(id) = self.id.take() {
            ctx.retire(DeviceResource::Pipeline(id), 0);
        }
        self.root_signature = None;
        self.graphics = None;
    }

    fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
