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

//! Pipeline descriptions and the state every backend derives from them.
//!
//! A [`PipelineDesc`] is filled by the content layer with sane defaults and a
//! few builder helpers. Backends call [`PipelineDesc::resolve_graphics`] to run
//! the shared validation (attachment counts, bindings, branch lookup) and get
//! parsed blend and depth/stencil state to translate into native objects.

use super::enums::{CompareOp, CullMode, PolygonMode, PrimitiveTopology, Stage, StencilOp};
use super::flags::ColorWriteMask;
use super::geometry::ALL_BINDINGS;
use super::handles::RPHandle;
use super::parser::{
    parse_blend_equation, parse_color_write_mask, parse_compare_op, parse_stencil_op,
    AttachmentBlend, VERUS_BLEND_OFF,
};
use super::render_pass::RenderPassLayout;
use crate::cgi::error::{ConfigurationError, Result, ShaderError};
use crate::cgi::traits::{Geometry, Shader};

/// Most color attachments a subpass may write.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineRasterizationState {
    /// Fill or wireframe.
    pub polygon_mode: PolygonMode,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Constant depth bias.
    pub depth_bias_constant_factor: f32,
    /// Largest bias applied.
    pub depth_bias_clamp: f32,
    /// Slope-scaled depth bias.
    pub depth_bias_slope_factor: f32,
    /// Line width for line topologies.
    pub line_width: f32,
    /// Clamp depth instead of clipping.
    pub depth_clamp_enable: bool,
    /// Apply depth bias.
    pub depth_bias_enable: bool,
    /// Discard primitives before rasterization.
    pub rasterizer_discard_enable: bool,
}

impl Default for PipelineRasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
            line_width: 1.0,
            depth_clamp_enable: true,
            depth_bias_enable: false,
            rasterizer_discard_enable: false,
        }
    }
}

/// Stencil operations for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilOps {
    /// Stencil test failed.
    pub fail_op: StencilOp,
    /// Both tests passed.
    pub pass_op: StencilOp,
    /// Stencil passed, depth failed.
    pub depth_fail_op: StencilOp,
    /// Stencil comparison.
    pub compare_op: CompareOp,
}

impl StencilOps {
    /// Parses `fail`, `pass`, `depth_fail` stencil tokens and a compare token.
    pub fn parse(fail: &str, pass: &str, depth_fail: &str, compare: &str) -> Result<Self> {
        Ok(Self {
            fail_op: parse_stencil_op(fail)?,
            pass_op: parse_stencil_op(pass)?,
            depth_fail_op: parse_stencil_op(depth_fail)?,
            compare_op: parse_compare_op(compare)?,
        })
    }
}

/// State that can change without rebuilding the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicState {
    /// Viewports.
    Viewport,
    /// Scissor rectangles.
    Scissor,
    /// Blend constants.
    BlendConstants,
    /// Stencil reference value.
    StencilReference,
    /// Depth bias factors.
    DepthBias,
}

/// Everything needed to build a pipeline state object.
#[derive(Clone)]
pub struct PipelineDesc<'a> {
    /// Vertex input source, `None` for compute pipelines.
    pub geometry: Option<&'a dyn Geometry>,
    /// Shader the stages come from.
    pub shader: &'a dyn Shader,
    /// Branch name inside `shader`.
    pub shader_branch: String,
    /// Render pass the pipeline is compatible with.
    pub render_pass: RPHandle,
    /// Subpass index inside `render_pass`.
    pub subpass: usize,
    /// Blend equation per color attachment. The first empty entry ends the list.
    pub color_attach_blend_eqs: [String; MAX_COLOR_ATTACHMENTS],
    /// Write mask per color attachment.
    pub color_attach_write_masks: [String; MAX_COLOR_ATTACHMENTS],
    /// Rasterizer state.
    pub rasterization_state: PipelineRasterizationState,
    /// Primitive topology.
    pub topology: PrimitiveTopology,
    /// MSAA sample count.
    pub sample_count: u32,
    /// Enable depth testing.
    pub depth_test_enable: bool,
    /// Enable depth writes.
    pub depth_write_enable: bool,
    /// Depth comparison.
    pub depth_compare_op: CompareOp,
    /// Enable stencil testing.
    pub stencil_test_enable: bool,
    /// Front face stencil operations.
    pub stencil_front: StencilOps,
    /// Back face stencil operations.
    pub stencil_back: StencilOps,
    /// Stencil reference value.
    pub stencil_ref: u32,
    /// Stencil read mask.
    pub stencil_read_mask: u8,
    /// Stencil write mask.
    pub stencil_write_mask: u8,
    /// Vertex bindings fed to the pipeline.
    pub vertex_input_bindings_filter: u32,
    /// State set on the command buffer instead of baked in.
    pub dynamic_states: Vec<DynamicState>,
    /// Build a compute pipeline.
    pub compute: bool,
    /// Enable primitive restart for strip topologies.
    pub primitive_restart_enable: bool,
    /// Number of viewports.
    pub multi_viewport: u32,
}

impl std::fmt::Debug for PipelineDesc<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDesc")
            .field("shader", &self.shader.source_name())
            .field("shader_branch", &self.shader_branch)
            .field("render_pass", &self.render_pass)
            .field("subpass", &self.subpass)
            .field("compute", &self.compute)
            .finish_non_exhaustive()
    }
}

impl<'a> PipelineDesc<'a> {
    fn base(shader: &'a dyn Shader, branch: &str) -> Self {
        Self {
            geometry: None,
            shader,
            shader_branch: branch.to_string(),
            render_pass: RPHandle::UNSET,
            subpass: 0,
            color_attach_blend_eqs: std::array::from_fn(|i| {
                if i == 0 {
                    VERUS_BLEND_OFF.to_string()
                } else {
                    String::new()
                }
            }),
            color_attach_write_masks: std::array::from_fn(|_| "rgba".to_string()),
            rasterization_state: PipelineRasterizationState::default(),
            topology: PrimitiveTopology::TriangleList,
            sample_count: 1,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
            stencil_test_enable: false,
            stencil_front: StencilOps::default(),
            stencil_back: StencilOps::default(),
            stencil_ref: 0,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            vertex_input_bindings_filter: ALL_BINDINGS,
            dynamic_states: vec![
                DynamicState::Viewport,
                DynamicState::Scissor,
                DynamicState::BlendConstants,
            ],
            compute: false,
            primitive_restart_enable: false,
            multi_viewport: 1,
        }
    }

    /// A graphics pipeline drawing `geometry` with `shader`'s `branch`.
    pub fn new(
        geometry: &'a dyn Geometry,
        shader: &'a dyn Shader,
        branch: &str,
        render_pass: RPHandle,
    ) -> Self {
        Self {
            geometry: Some(geometry),
            render_pass,
            ..Self::base(shader, branch)
        }
    }

    /// A compute pipeline.
    pub fn compute(shader: &'a dyn Shader, branch: &str) -> Self {
        Self {
            compute: true,
            ..Self::base(shader, branch)
        }
    }

    /// Disables depth testing and writing.
    pub fn disable_depth_test(mut self) -> Self {
        self.depth_test_enable = false;
        self.depth_write_enable = false;
        self
    }

    /// Enables depth bias with the given factors.
    pub fn enable_depth_bias(mut self, constant_factor: f32, slope_factor: f32) -> Self {
        self.rasterization_state.depth_bias_enable = true;
        self.rasterization_state.depth_bias_constant_factor = constant_factor;
        self.rasterization_state.depth_bias_slope_factor = slope_factor;
        self
    }

    /// Enables stencil testing with the same operations on both faces.
    pub fn set_stencil_ops(mut self, ops: StencilOps, reference: u32) -> Self {
        self.stencil_test_enable = true;
        self.stencil_front = ops;
        self.stencil_back = ops;
        self.stencil_ref = reference;
        self
    }

    /// Sets the blend equations; attachments past the list are unused.
    pub fn set_blend_equations(mut self, equations: &[&str]) -> Self {
        for (i, slot) in self.color_attach_blend_eqs.iter_mut().enumerate() {
            *slot = equations.get(i).map(|s| s.to_string()).unwrap_or_default();
        }
        self
    }

    /// Sets the write masks of the first attachments.
    pub fn set_write_masks(mut self, masks: &[&str]) -> Self {
        for (slot, mask) in self.color_attach_write_masks.iter_mut().zip(masks) {
            *slot = mask.to_string();
        }
        self
    }

    /// Selects a subpass.
    pub fn with_subpass(mut self, subpass: usize) -> Self {
        self.subpass = subpass;
        self
    }

    /// Sets the topology.
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Restricts the vertex bindings.
    pub fn with_bindings_filter(mut self, filter: u32) -> Self {
        self.vertex_input_bindings_filter = filter;
        self
    }

    /// Number of color attachments, counted up to the first empty equation.
    pub fn color_attachment_count(&self) -> usize {
        self.color_attach_blend_eqs
            .iter()
            .take_while(|eq| !eq.is_empty())
            .count()
    }

    /// Validates the description against `render_pass` and parses the blend state.
    pub fn resolve_graphics(&self, render_pass: &RenderPassLayout) -> Result<GraphicsPipelineState> {
        let geometry = self.geometry.ok_or_else(|| {
            ConfigurationError::Invalid("graphics pipeline requires a geometry".to_string())
        })?;
        self.require_stage(Stage::Vs)?;

        let subpass = render_pass.subpass(self.subpass)?;
        let attachment_count = self.color_attachment_count();
        if attachment_count != subpass.color.len() {
            return Err(ConfigurationError::CountMismatch {
                what: "pipeline color attachments",
                expected: subpass.color.len(),
                actual: attachment_count,
            }
            .into());
        }

        let attachments = (0..attachment_count)
            .map(|i| {
                Ok(ColorAttachmentState {
                    blend: parse_blend_equation(&self.color_attach_blend_eqs[i])?,
                    write_mask: parse_color_write_mask(&self.color_attach_write_masks[i])?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        geometry
            .layout()
            .validate_bindings(self.vertex_input_bindings_filter, |b| {
                geometry.vertex_buffer(b).is_some()
            })?;

        let depth_stencil = subpass.depth_stencil.map(|_| DepthStencilState {
            depth_test_enable: self.depth_test_enable,
            depth_write_enable: self.depth_write_enable && !subpass.depth_stencil_read_only,
            depth_compare_op: self.depth_compare_op,
            stencil_test_enable: self.stencil_test_enable,
            front: self.stencil_front,
            back: self.stencil_back,
            read_mask: self.stencil_read_mask,
            write_mask: self.stencil_write_mask,
        });

        Ok(GraphicsPipelineState {
            attachments,
            depth_stencil,
        })
    }

    /// Checks that the branch exists and compiled `stage`.
    pub fn require_stage(&self, stage: Stage) -> Result<()> {
        if !self.shader.has_branch(&self.shader_branch) {
            return Err(ShaderError::BranchNotFound {
                source_name: self.shader.source_name().to_string(),
                branch: self.shader_branch.clone(),
            }
            .into());
        }
        if !self.shader.has_stage(&self.shader_branch, stage) {
            return Err(ConfigurationError::Invalid(format!(
                "shader '{}' branch '{}' has no {stage} stage",
                self.shader.source_name(),
                self.shader_branch
            ))
            .into());
        }
        Ok(())
    }

    /// Debug name suffix `" (source, branch)"`.
    pub fn debug_name(&self) -> String {
        format!(" ({}, {})", self.shader.source_name(), self.shader_branch)
    }

    /// Where a pipeline built from this description may be bound.
    pub fn bind_point(&self) -> PipelineBindPoint {
        if self.compute {
            PipelineBindPoint::Compute
        } else {
            PipelineBindPoint::Graphics {
                render_pass: self.render_pass,
                subpass: self.subpass,
            }
        }
    }
}

/// Where a pipeline may be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineBindPoint {
    /// Inside one subpass of one render pass.
    Graphics {
        /// Render pass the pipeline was built against.
        render_pass: RPHandle,
        /// Subpass index inside `render_pass`.
        subpass: usize,
    },
    /// Outside render passes.
    Compute,
}

impl PipelineBindPoint {
    /// Returns `true` for compute pipelines.
    pub fn is_compute(self) -> bool {
        self == Self::Compute
    }
}

/// Parsed blend state of one color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAttachmentState {
    /// Blend equation.
    pub blend: AttachmentBlend,
    /// Channel write mask.
    pub write_mask: ColorWriteMask,
}

/// Depth/stencil state, present only when the subpass has a depth attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilState {
    /// Depth test.
    pub depth_test_enable: bool,
    /// Depth writes; off for read-only depth attachments.
    pub depth_write_enable: bool,
    /// Depth comparison.
    pub depth_compare_op: CompareOp,
    /// Stencil test.
    pub stencil_test_enable: bool,
    /// Front face operations.
    pub front: StencilOps,
    /// Back face operations.
    pub back: StencilOps,
    /// Stencil read mask.
    pub read_mask: u8,
    /// Stencil write mask.
    pub write_mask: u8,
}

/// Output of [`PipelineDesc::resolve_graphics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsPipelineState {
    /// One entry per color attachment of the subpass.
    pub attachments: Vec<ColorAttachmentState>,
    /// Depth/stencil state if the subpass has a depth attachment.
    pub depth_stencil: Option<DepthStencilState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rasterization_defaults() {
        let state = PipelineRasterizationState::default();
        assert_eq!(state.polygon_mode, PolygonMode::Fill);
        assert_eq!(state.cull_mode, CullMode::Back);
        assert!(state.depth_clamp_enable);
        assert!(!state.depth_bias_enable);
        assert!(!state.rasterizer_discard_enable);
        approx::assert_relative_eq!(state.line_width, 1.0);
    }

    #[test]
    fn test_stencil_ops_parse() {
        let ops = StencilOps::parse("b", "r", "b++", "r==b").unwrap();
        assert_eq!(ops.fail_op, StencilOp::Keep);
        assert_eq!(ops.pass_op, StencilOp::Replace);
        assert_eq!(ops.depth_fail_op, StencilOp::IncrementClamp);
        assert_eq!(ops.compare_op, CompareOp::Equal);
    }

    #[test]
    fn test_stencil_ops_parse_rejects_unknown_token() {
        let err = StencilOps::parse("b", "r", "x", "r==b").unwrap_err();
        assert!(err.is_configuration());
    }
}
