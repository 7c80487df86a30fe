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

//! Direct3D 11 pipelines: shader stages plus separate state objects.

use super::device::D3D11Device;
use super::shader::D3D11Shader;
use crate::graphics::d3d_common::{
    blend_desc, depth_stencil_desc, input_layout, rasterizer_desc, sample_count,
    D3DPrimitiveTopology, DepthStencilDesc, InputElementDesc, RasterizerDesc,
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

/// Fixed-function state of a graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct D3D11GraphicsState {
    pub input_layout: Vec<InputElementDesc>,
    pub topology: D3DPrimitiveTopology,
    pub blend: Vec<RenderTargetBlendDesc>,
    pub sample_mask: u32,
    pub depth_stencil: DepthStencilDesc,
    pub stencil_ref: u32,
    pub rasterizer: RasterizerDesc,
}

/// A Direct3D 11 pipeline.
pub struct D3D11Pipeline {
    device: D3D11Device,
    id: Option<PipelineId>,
    bind_point: PipelineBindPoint,
    stages: [bool; 6],
    graphics: Option<D3D11GraphicsState>,
}

impl D3D11Pipeline {
    pub(crate) fn new(device: D3D11Device) -> Self {
        Self {
            device,
            id: None,
            bind_point: PipelineBindPoint::Compute,
            stages: [false; 6],
            graphics: None,
        }
    }

    pub(crate) fn id(&self) -> Result<PipelineId> {
        self.id
            .ok_or_else(|| ConfigurationError::invalid_state("bind_pipeline", "pipeline not initialized").into())
    }

    /// Returns `true` if the pipeline has a shader for `stage`.
    pub(crate) fn has_stage(&self, stage: Stage) -> bool {
        self.stages[stage.index()]
    }

    pub(crate) fn graphics(&self) -> Option<&D3D11GraphicsState> {
        self.graphics.as_ref()
    }

    fn graphics_state(ctx: &RenderContext, desc: &PipelineDesc<'_>) -> Result<D3D11GraphicsState> {
        let render_pass = ctx.device().render_pass_layout(desc.render_pass)?;
        let resolved = desc.resolve_graphics(&render_pass)?;
        let geometry = desc.geometry.ok_or_else(|| {
            ConfigurationError::Invalid("graphics pipeline requires a geometry".to_string())
        })?;
        let samples = sample_count(desc.sample_count)?;
        let antialiased_line = desc.color_attach_blend_eqs[0] == VERUS_BLEND_ALPHA;
        Ok(D3D11GraphicsState {
            input_layout: input_layout(geometry.layout(), desc.vertex_input_bindings_filter)?,
            topology: desc.topology.to_d3d()?,
            blend: blend_desc(&resolved.attachments)?,
            sample_mask: u32::MAX,
            depth_stencil: depth_stencil_desc(resolved.depth_stencil.as_ref())?,
            stencil_ref: desc.stencil_ref,
            rasterizer: rasterizer_desc(&desc.rasterization_state, samples, antialiased_line)?,
        })
    }
}

impl Pipeline for D3D11Pipeline {
    fn init(&mut self, ctx: &RenderContext, desc: &PipelineDesc<'_>) -> Result<()> {
        let shader = downcast::<D3D11Shader>(desc.shader.as_any(), "D3D11Shader")?;
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
            self.graphics = Some(Self::graphics_state(ctx, desc)?);
        }
        self.bind_point = desc.bind_point();
        for stage in Stage::ALL {
            self.stages[stage.index()] = branch.bytecode(stage).is_some();
        }
        let kind = if desc.compute { "Compute" } else { "Graphics" };
        self.id = Some(
            self.device
                .resources()
                .create_pipeline(format!("{kind}Pipeline{}", desc.debug_name())),
        );
        Ok(())
    }

    fn done(&mut self, ctx: &RenderContext) {
        if let Some(id) = self.id.take() {
            ctx.retire(DeviceResource::Pipeline(id), 0);
        }
        self.graphics = None;
    }

    fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
