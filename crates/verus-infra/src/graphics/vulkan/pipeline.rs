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

//! Vulkan graphics and compute pipelines.
//!
//! Viewport and scissor are always dynamic. The front face is clockwise
//! because viewports are flipped at record time.

use super::device::VulkanDevice;
use super::native::{
    color_blend_attachments, depth_stencil_state, patch_control_points, sample_count, vertex_input,
    ColorBlendAttachmentState, DepthStencilStateInfo, ToVk, VertexInputAttributeDescription,
    VertexInputBindingDescription,
};
use super::shader::VulkanShader;
use crate::graphics::downcast;
use ash::vk;
use std::any::Any;
use verus_core::cgi::api::{
    DeviceResource, PipelineBindPoint, PipelineDesc, PipelineId, RPHandle, Stage,
};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::Pipeline;
use verus_core::RenderContext;

/// `VkGraphicsPipelineCreateInfo` minus the shaders.
#[derive(Debug, Clone, PartialEq)]
pub struct VulkanGraphicsState {
    /// Bindings kept by the bindings filter.
    pub vertex_bindings: Vec<VertexInputBindingDescription>,
    /// Attributes of the kept bindings.
    pub vertex_attributes: Vec<VertexInputAttributeDescription>,
    /// Input assembly topology.
    pub topology: vk::PrimitiveTopology,
    /// Strip cut index enabled.
    pub primitive_restart_enable: bool,
    /// Zero unless the topology is a patch list.
    pub patch_control_points: u32,
    /// Fill or wireframe.
    pub polygon_mode: vk::PolygonMode,
    /// Faces culled.
    pub cull_mode: vk::CullModeFlags,
    /// Always clockwise, see the module docs.
    pub front_face: vk::FrontFace,
    /// Depth clamping instead of clipping.
    pub depth_clamp_enable: bool,
    /// Primitives are discarded before rasterization.
    pub rasterizer_discard_enable: bool,
    /// Depth bias enabled.
    pub depth_bias_enable: bool,
    /// Constant depth bias.
    pub depth_bias_constant_factor: f32,
    /// Largest depth bias applied.
    pub depth_bias_clamp: f32,
    /// Slope-scaled depth bias.
    pub depth_bias_slope_factor: f32,
    /// Rasterized line width.
    pub line_width: f32,
    /// Samples per pixel.
    pub rasterization_samples: vk::SampleCountFlags,
    /// One per color attachment of the subpass.
    pub color_blend_attachments: Vec<ColorBlendAttachmentState>,
    /// `None` when the subpass has no depth attachment.
    pub depth_stencil: Option<DepthStencilStateInfo>,
    /// Viewport and scissor first, then the requested states without duplicates.
    pub dynamic_states: Vec<vk::DynamicState>,
    /// Viewports and scissors set per draw.
    pub viewport_count: u32,
    /// Render pass the pipeline is compatible with.
    pub render_pass: RPHandle,
    /// Subpass index inside `render_pass`.
    pub subpass: u32,
}

/// A Vulkan pipeline.
pub struct VulkanPipeline {
    device: VulkanDevice,
    id: Option<PipelineId>,
    layout: Option<PipelineId>,
    bind_point: PipelineBindPoint,
    bytecode_sizes: [usize; 6],
    graphics: Option<VulkanGraphicsState>,
}

impl VulkanPipeline {
    pub(crate) fn new(device: VulkanDevice) -> Self {
        Self {
            device,
            id: None,
            layout: None,
            bind_point: PipelineBindPoint::Compute,
            bytecode_sizes: [0; 6],
            graphics: None,
        }
    }

    /// The pipeline and the pipeline layout it was built against.
    pub(crate) fn ids(&self) -> Result<(PipelineId, PipelineId)> {
        match (self.id, self.layout) {
            (Some(id), Some(layout)) => Ok((id, layout)),
            _ => Err(ConfigurationError::invalid_state("bind_pipeline", "pipeline not initialized").into()),
        }
    }

    /// Fixed-function state, `None` for compute pipelines.
    pub fn graphics(&self) -> Option<&VulkanGraphicsState> {
        self.graphics.as_ref()
    }

    /// Size of the SPIR-V bound to `stage`.
    pub fn bytecode_size(&self, stage: Stage) -> usize {
        self.bytecode_sizes[stage.index()]
    }

    fn graphics_state(ctx: &RenderContext, desc: &PipelineDesc<'_>) -> Result<VulkanGraphicsState> {
        let render_pass = ctx.device().render_pass_layout(desc.render_pass)?;
        let resolved = desc.resolve_graphics(&render_pass)?;
        let geometry = desc.geometry.ok_or_else(|| {
            ConfigurationError::Invalid("graphics pipeline requires a geometry".to_string())
        })?;
        let (vertex_bindings, vertex_attributes) =
            vertex_input(geometry.layout(), desc.vertex_input_bindings_filter)?;
        let raster = &desc.rasterization_state;

        let mut dynamic_states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        for state in &desc.dynamic_states {
            let state = state.to_vk()?;
            if !dynamic_states.contains(&state) {
                dynamic_states.push(state);
            }
        }

        Ok(VulkanGraphicsState {
            vertex_bindings,
            vertex_attributes,
            topology: desc.topology.to_vk()?,
            primitive_restart_enable: desc.primitive_restart_enable,
            patch_control_points: patch_control_points(desc.topology),
            polygon_mode: raster.polygon_mode.to_vk()?,
            cull_mode: raster.cull_mode.to_vk()?,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_clamp_enable: raster.depth_clamp_enable,
            rasterizer_discard_enable: raster.rasterizer_discard_enable,
            depth_bias_enable: raster.depth_bias_enable,
            depth_bias_constant_factor: raster.depth_bias_constant_factor,
            depth_bias_clamp: raster.depth_bias_clamp,
            depth_bias_slope_factor: raster.depth_bias_slope_factor,
            line_width: raster.line_width,
            rasterization_samples: sample_count(desc.sample_count)?,
            color_blend_attachments: color_blend_attachments(&resolved.attachments)?,
            depth_stencil: depth_stencil_state(resolved.depth_stencil.as_ref(), desc.stencil_ref)?,
            dynamic_states,
            viewport_count: desc.multi_viewport.max(1),
            render_pass: desc.render_pass,
            subpass: desc.subpass as u32,
        })
    }
}

impl Pipeline for VulkanPipeline {
    fn init(&mut self, ctx: &RenderContext, desc: &PipelineDesc<'_>) -> Result<()> {
        let shader = downcast::<VulkanShader>(desc.shader.as_any(), "VulkanShader")?;
        let layout = shader.pipeline_layout()?;
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
        for stage in Stage::ALL {
            self.bytecode_sizes[stage.index()] = branch.bytecode(stage).map_or(0, <[u8]>::len);
        }
        self.bind_point = desc.bind_point();
        self.layout = Some(layout);
        let kind = if desc.compute { "Compute" } else { "Graphics" };
        self.id = Some(
            self.device
                .resources()
                .create_pipeline(format!("{kind}Pipeline{}", desc.debug_name())),
        );
        log::debug!("Vulkan {kind} pipeline '{}' created", desc.debug_name());
        Ok(())
    }

    fn done(&mut self, ctx: &RenderContext) {
        if let Some(id) = self.id.take() {
            ctx.retire(DeviceResource::Pipeline(id), 0);
        }
        self.layout = None;
        self.graphics = None;
    }

    fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::create_context;
    use approx::assert_relative_eq;
    use verus_core::cgi::api::{
        Attachment, AttachmentRef, BackendKind, CgiSettings, CullMode, DynamicState, Format, GeometryDesc,
        ImageLayout, PrimitiveTopology, RenderPassDesc, ShaderDesc, StencilOps, Subpass, VertexInputAttrDesc,
        ViaType, ViaUsage,
    };

    const SOURCE: &str = "float4 mainVS() : SV_Position { return 0; }\nfloat4 mainFS() : SV_Target { return 1; }\n";

    #[test]
    fn test_graphics_state_flips_front_face_and_merges_dynamic_states() {
        let ctx = create_context(CgiSettings::for_backend(BackendKind::Vulkan)).unwrap();
        let geo = ctx
            .create_geometry(&GeometryDesc {
                name: "Tri".into(),
                vertex_input_attrs: vec![VertexInputAttrDesc::new(0, 0, ViaType::Floats, 3, ViaUsage::Position, 0)],
                strides: vec![12],
                dynamic_bindings_mask: 0,
                thirty_two_bit_indices: false,
            })
            .unwrap();
        let mut shader = ctx
            .create_shader(&ShaderDesc::new("Tri.hlsl", SOURCE).with_branches(["main"]))
            .unwrap();
        shader.create_pipeline_layout(&ctx).unwrap();
        let rp = ctx
            .create_render_pass(&RenderPassDesc {
                attachments: vec![Attachment::new("Color", Format::UnormR8G8B8A8)
                    .layout(ImageLayout::ColorAttachment, ImageLayout::ColorAttachment)],
                subpasses: vec![
                    Subpass::new("Sp0").color([AttachmentRef::new("Color", ImageLayout::ColorAttachment)])
                ],
                dependencies: vec![],
            })
            .unwrap();

        let mut desc = PipelineDesc::new(geo.as_ref(), shader.as_ref(), "main", rp)
            .with_topology(PrimitiveTopology::PatchList3);
        desc.rasterization_state.cull_mode = CullMode::Front;
        desc.dynamic_states.push(DynamicState::Viewport);
        desc.dynamic_states.push(DynamicState::DepthBias);
        let pipeline = ctx.create_pipeline(&desc).unwrap();

        let vulkan = pipeline.as_any().downcast_ref::<VulkanPipeline>().unwrap();
        let state = vulkan.graphics().unwrap();
        assert_eq!(state.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(state.cull_mode, vk::CullModeFlags::FRONT);
        assert_eq!(state.topology, vk::PrimitiveTopology::PATCH_LIST);
        assert_eq!(state.patch_control_points, 3);
        assert_eq!(
            state.dynamic_states,
            vec![
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::SCISSOR,
                vk::DynamicState::BLEND_CONSTANTS,
                vk::DynamicState::DEPTH_BIAS
            ]
        );
        assert_eq!(state.color_blend_attachments.len(), 1);
        assert!(state.depth_stencil.is_none());
        assert_eq!(state.vertex_attributes.len(), 1);
        assert!(vulkan.bytecode_size(Stage::Vs) > 0);
        assert_eq!(vulkan.bytecode_size(Stage::Cs), 0);

        let layout = shader
            .as_any()
            .downcast_ref::<VulkanShader>()
            .unwrap()
            .pipeline_layout()
            .unwrap();
        assert_eq!(vulkan.ids().unwrap().1, layout);
    }

    #[test]
    fn test_builder_state_reaches_the_native_pipeline() {
        let ctx = create_context(CgiSettings::for_backend(BackendKind::Vulkan)).unwrap();
        let mut geo = ctx
            .create_geometry(&GeometryDesc {
                name: "Split".into(),
                vertex_input_attrs: vec![
                    VertexInputAttrDesc::new(0, 0, ViaType::Floats, 3, ViaUsage::Position, 0),
                    VertexInputAttrDesc::new(1, 0, ViaType::Floats, 4, ViaUsage::Color, 0),
                ],
                strides: vec![12, 16],
                dynamic_bindings_mask: 0,
                thirty_two_bit_indices: false,
            })
            .unwrap();
        geo.create_vertex_buffer(&ctx, 3, 0).unwrap();
        let mut shader = ctx
            .create_shader(&ShaderDesc::new("Tri.hlsl", SOURCE).with_branches(["main"]))
            .unwrap();
        shader.create_pipeline_layout(&ctx).unwrap();
        let rp = ctx
            .create_render_pass(&RenderPassDesc {
                attachments: vec![
                    Attachment::new("Color", Format::UnormR8G8B8A8)
                        .layout(ImageLayout::ColorAttachment, ImageLayout::ColorAttachment),
                    Attachment::new("Depth", Format::UnormD24UintS8)
                        .layout(ImageLayout::DepthStencilAttachment, ImageLayout::DepthStencilAttachment),
                ],
                subpasses: vec![Subpass::new("Sp0")
                    .color([AttachmentRef::new("Color", ImageLayout::ColorAttachment)])
                    .depth_stencil(AttachmentRef::new("Depth", ImageLayout::DepthStencilAttachment))],
                dependencies: vec![],
            })
            .unwrap();

        let desc = || {
            PipelineDesc::new(geo.as_ref(), shader.as_ref(), "main", rp)
                .with_subpass(0)
                .set_blend_equations(&["s*(sa)+d*(1-sa)"])
                .set_write_masks(&["rgb"])
                .enable_depth_bias(1.5, 2.0)
                .set_stencil_ops(StencilOps::parse("b", "r", "b", "r==b").unwrap(), 3)
        };
        // Binding 1 has no vertex buffer yet.
        assert!(ctx.create_pipeline(&desc()).err().unwrap().is_configuration());

        let pipeline = ctx.create_pipeline(&desc().with_bindings_filter(0b1)).unwrap();
        let state = pipeline
            .as_any()
            .downcast_ref::<VulkanPipeline>()
            .unwrap()
            .graphics()
            .unwrap()
            .clone();
        let blend = state.color_blend_attachments[0];
        assert!(blend.blend_enable);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.color_blend_op, vk::BlendOp::ADD);
        assert_eq!(
            blend.color_write_mask,
            vk::ColorComponentFlags::R | vk::ColorComponentFlags::G | vk::ColorComponentFlags::B
        );
        assert!(state.depth_bias_enable);
        assert_relative_eq!(state.depth_bias_constant_factor, 1.5);
        assert_relative_eq!(state.depth_bias_slope_factor, 2.0);
        assert_eq!(state.vertex_bindings.len(), 1);
        assert_eq!(state.subpass, 0);
        assert_eq!(
            pipeline.bind_point(),
            PipelineBindPoint::Graphics {
                render_pass: rp,
                subpass: 0
            }
        );

        let depth_stencil = state.depth_stencil.unwrap();
        assert!(depth_stencil.depth_test_enable);
        assert_eq!(depth_stencil.depth_compare_op, vk::CompareOp::LESS);
        assert!(depth_stencil.stencil_test_enable);
        assert_eq!(depth_stencil.front.pass_op, vk::StencilOp::REPLACE);
        assert_eq!(depth_stencil.back.compare_op, vk::CompareOp::EQUAL);
        assert_eq!(depth_stencil.front.reference, 3);
    }

    #[test]
    fn test_compute_pipeline_requires_cs_stage() {
        let ctx = create_context(CgiSettings::for_backend(BackendKind::Vulkan)).unwrap();
        let mut shader = ctx
            .create_shader(&ShaderDesc::new("Tri.hlsl", SOURCE).with_branches(["main"]))
            .unwrap();
        assert!(ctx.create_pipeline(&PipelineDesc::compute(shader.as_ref(), "main")).is_err());
        shader.create_pipeline_layout(&ctx).unwrap();
        let err = ctx
            .create_pipeline(&PipelineDesc::compute(shader.as_ref(), "main"))
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }
}
