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

//! Vulkan native values and the command buffer stream.
//!
//! Enumerations and flags are the `ash::vk` types. A [`VulkanCommand`] is one
//! `vkCmd*` call; command buffers append them and the device executes them
//! when the buffer is submitted to the graphics queue.

use ash::vk;
use verus_core::cgi::api::{
    BlendComponent, BlendFactor, BlendOp, BufferId, ColorAttachmentState, CompareOp, CullMode,
    DepthStencilState, DescriptorSetId, DynamicState, FBHandle, Format, FormatClass,
    GeometryLayout, ImageLayout, LoadOp, PipelineId, PolygonMode, PrimitiveTopology, RPHandle,
    SamplerState, ShaderStageFlags, StencilOp, StencilOps, StoreOp, TextureId, ViaType, ViaUsage,
};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::Rect;

/// Converts an engine value to its Vulkan counterpart.
pub trait ToVk<T> {
    /// Fails with `UnmappedEnum` when Vulkan has no counterpart.
    fn to_vk(self) -> Result<T>;
}

/// The engine layout of a native layout, `None` for layouts the engine never uses.
pub fn engine_layout(layout: vk::ImageLayout) -> Option<ImageLayout> {
    Some(match layout {
        vk::ImageLayout::UNDEFINED => ImageLayout::Undefined,
        vk::ImageLayout::GENERAL => ImageLayout::General,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => ImageLayout::ColorAttachment,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => ImageLayout::DepthStencilAttachment,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => ImageLayout::DepthStencilReadOnly,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => ImageLayout::ShaderReadOnly,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => ImageLayout::TransferSrc,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => ImageLayout::TransferDst,
        vk::ImageLayout::PRESENT_SRC_KHR => ImageLayout::PresentSrc,
        _ => return None,
    })
}

/// Buffers bound with a dynamic offset need one descriptor per set.
pub fn is_dynamic_descriptor(ty: vk::DescriptorType) -> bool {
    ty == vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC || ty == vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
}

impl ToVk<vk::Format> for Format {
    fn to_vk(self) -> Result<vk::Format> {
        Ok(match self {
            Format::UnormB4G4R4A4 => vk::Format::B4G4R4A4_UNORM_PACK16,
            Format::UnormB5G6R5 => vk::Format::B5G6R5_UNORM_PACK16,
            Format::UnormR10G10B10A2 => vk::Format::A2B10G10R10_UNORM_PACK32,
            Format::SintR16 => vk::Format::R16_SINT,
            Format::UnormR8 => vk::Format::R8_UNORM,
            Format::UnormR8G8 => vk::Format::R8G8_UNORM,
            Format::UnormR8G8B8A8 => vk::Format::R8G8B8A8_UNORM,
            Format::UnormB8G8R8A8 => vk::Format::B8G8R8A8_UNORM,
            Format::SrgbR8G8B8A8 => vk::Format::R8G8B8A8_SRGB,
            Format::SrgbB8G8R8A8 => vk::Format::B8G8R8A8_SRGB,
            Format::FloatR16 => vk::Format::R16_SFLOAT,
            Format::FloatR16G16 => vk::Format::R16G16_SFLOAT,
            Format::FloatR16G16B16A16 => vk::Format::R16G16B16A16_SFLOAT,
            Format::FloatR32 => vk::Format::R32_SFLOAT,
            Format::FloatR32G32 => vk::Format::R32G32_SFLOAT,
            Format::FloatR32G32B32A32 => vk::Format::R32G32B32A32_SFLOAT,
            Format::UnormD16 => vk::Format::D16_UNORM,
            Format::UnormD24UintS8 => vk::Format::D24_UNORM_S8_UINT,
            Format::FloatD32 => vk::Format::D32_SFLOAT,
            Format::UnormBc1 => vk::Format::BC1_RGBA_UNORM_BLOCK,
            Format::UnormBc2 => vk::Format::BC2_UNORM_BLOCK,
            Format::UnormBc3 => vk::Format::BC3_UNORM_BLOCK,
            Format::SrgbBc1 => vk::Format::BC1_RGBA_SRGB_BLOCK,
            Format::SrgbBc2 => vk::Format::BC2_SRGB_BLOCK,
            Format::SrgbBc3 => vk::Format::BC3_SRGB_BLOCK,
        })
    }
}

impl ToVk<vk::ImageLayout> for ImageLayout {
    fn to_vk(self) -> Result<vk::ImageLayout> {
        Ok(match self {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::General => vk::ImageLayout::GENERAL,
            ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        })
    }
}

impl ToVk<vk::CompareOp> for CompareOp {
    fn to_vk(self) -> Result<vk::CompareOp> {
        Ok(match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        })
    }
}

impl ToVk<vk::CullModeFlags> for CullMode {
    fn to_vk(self) -> Result<vk::CullModeFlags> {
        Ok(match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        })
    }
}

impl ToVk<vk::PolygonMode> for PolygonMode {
    fn to_vk(self) -> Result<vk::PolygonMode> {
        Ok(match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
        })
    }
}

impl ToVk<vk::PrimitiveTopology> for PrimitiveTopology {
    fn to_vk(self) -> Result<vk::PrimitiveTopology> {
        Ok(match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::PatchList3 | PrimitiveTopology::PatchList4 => vk::PrimitiveTopology::PATCH_LIST,
        })
    }
}

/// Control points per patch, zero for other topologies.
pub fn patch_control_points(topology: PrimitiveTopology) -> u32 {
    match topology {
        PrimitiveTopology::PatchList3 => 3,
        PrimitiveTopology::PatchList4 => 4,
        _ => 0,
    }
}

impl ToVk<vk::BlendFactor> for BlendFactor {
    fn to_vk(self) -> Result<vk::BlendFactor> {
        Ok(match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::InvDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
            BlendFactor::InvDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
            BlendFactor::InvBlendFactor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
            BlendFactor::InvSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::InvSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
            BlendFactor::BlendFactor => vk::BlendFactor::CONSTANT_COLOR,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::SrcAlphaSat => vk::BlendFactor::SRC_ALPHA_SATURATE,
            BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        })
    }
}

impl ToVk<vk::BlendOp> for BlendOp {
    fn to_vk(self) -> Result<vk::BlendOp> {
        Ok(match self {
            BlendOp::Add => vk::BlendOp::ADD,
            BlendOp::Subtract => vk::BlendOp::SUBTRACT,
            BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
            BlendOp::Min => vk::BlendOp::MIN,
            BlendOp::Max => vk::BlendOp::MAX,
        })
    }
}

impl ToVk<vk::StencilOp> for StencilOp {
    fn to_vk(self) -> Result<vk::StencilOp> {
        Ok(match self {
            StencilOp::Keep => vk::StencilOp::KEEP,
            StencilOp::Zero => vk::StencilOp::ZERO,
            StencilOp::Replace => vk::StencilOp::REPLACE,
            StencilOp::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
            StencilOp::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
            StencilOp::Invert => vk::StencilOp::INVERT,
            StencilOp::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
            StencilOp::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
        })
    }
}

impl ToVk<vk::AttachmentLoadOp> for LoadOp {
    fn to_vk(self) -> Result<vk::AttachmentLoadOp> {
        Ok(match self {
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        })
    }
}

impl ToVk<vk::AttachmentStoreOp> for StoreOp {
    fn to_vk(self) -> Result<vk::AttachmentStoreOp> {
        Ok(match self {
            StoreOp::Store => vk::AttachmentStoreOp::STORE,
            StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        })
    }
}

impl ToVk<vk::DynamicState> for DynamicState {
    fn to_vk(self) -> Result<vk::DynamicState> {
        Ok(match self {
            DynamicState::Viewport => vk::DynamicState::VIEWPORT,
            DynamicState::Scissor => vk::DynamicState::SCISSOR,
            DynamicState::BlendConstants => vk::DynamicState::BLEND_CONSTANTS,
            DynamicState::StencilReference => vk::DynamicState::STENCIL_REFERENCE,
            DynamicState::DepthBias => vk::DynamicState::DEPTH_BIAS,
        })
    }
}

impl ToVk<vk::ShaderStageFlags> for ShaderStageFlags {
    fn to_vk(self) -> Result<vk::ShaderStageFlags> {
        const TABLE: [(ShaderStageFlags, vk::ShaderStageFlags); 14] = [
            (ShaderStageFlags::VS, vk::ShaderStageFlags::VERTEX),
            (ShaderStageFlags::HS, vk::ShaderStageFlags::TESSELLATION_CONTROL),
            (ShaderStageFlags::DS, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
            (ShaderStageFlags::GS, vk::ShaderStageFlags::GEOMETRY),
            (ShaderStageFlags::FS, vk::ShaderStageFlags::FRAGMENT),
            (ShaderStageFlags::CS, vk::ShaderStageFlags::COMPUTE),
            (ShaderStageFlags::TS, vk::ShaderStageFlags::TASK_EXT),
            (ShaderStageFlags::MS, vk::ShaderStageFlags::MESH_EXT),
            (ShaderStageFlags::RG, vk::ShaderStageFlags::RAYGEN_KHR),
            (ShaderStageFlags::AH, vk::ShaderStageFlags::ANY_HIT_KHR),
            (ShaderStageFlags::CH, vk::ShaderStageFlags::CLOSEST_HIT_KHR),
            (ShaderStageFlags::MISS, vk::ShaderStageFlags::MISS_KHR),
            (ShaderStageFlags::IS, vk::ShaderStageFlags::INTERSECTION_KHR),
            (ShaderStageFlags::CALL, vk::ShaderStageFlags::CALLABLE_KHR),
        ];
        Ok(TABLE
            .iter()
            .filter(|(engine, _)| self.contains(*engine))
            .fold(vk::ShaderStageFlags::empty(), |acc, &(_, native)| acc | native))
    }
}

/// Sample count bit of a sample count.
pub fn sample_count(count: u32) -> Result<vk::SampleCountFlags> {
    Ok(match count {
        1 => vk::SampleCountFlags::TYPE_1,
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        other => return Err(ConfigurationError::unmapped("ToNativeSampleCount", other).into()),
    })
}

/// Index type of the index buffer.
pub fn index_type(thirty_two_bit: bool) -> vk::IndexType {
    if thirty_two_bit {
        vk::IndexType::UINT32
    } else {
        vk::IndexType::UINT16
    }
}

// --- Vertex input ---

/// Format of a vertex attribute.
pub fn vertex_format(ty: ViaType, components: u32, usage: ViaUsage) -> Result<vk::Format> {
    let format = match (ty, components) {
        (ViaType::Floats, 1) => vk::Format::R32_SFLOAT,
        (ViaType::Floats, 2) => vk::Format::R32G32_SFLOAT,
        (ViaType::Floats, 3) => vk::Format::R32G32B32_SFLOAT,
        (ViaType::Floats, 4) => vk::Format::R32G32B32A32_SFLOAT,
        (ViaType::Halfs, 2) => vk::Format::R16G16_SFLOAT,
        (ViaType::Halfs, 4) => vk::Format::R16G16B16A16_SFLOAT,
        (ViaType::Shorts, 2) => match usage {
            ViaUsage::Tangent | ViaUsage::Binormal => vk::Format::R16G16_SNORM,
            _ => vk::Format::R16G16_SINT,
        },
        (ViaType::Shorts, 4) => match usage {
            ViaUsage::Tangent | ViaUsage::Binormal => vk::Format::R16G16B16A16_SNORM,
            _ => vk::Format::R16G16B16A16_SINT,
        },
        (ViaType::Ubytes, 4) => match usage {
            ViaUsage::Color => vk::Format::R8G8B8A8_UNORM,
            ViaUsage::Normal => vk::Format::R8G8B8A8_SNORM,
            _ => vk::Format::R8G8B8A8_UINT,
        },
        _ => {
            return Err(
                ConfigurationError::unmapped("ToNativeFormat", (ty, components, usage)).into(),
            )
        }
    };
    Ok(format)
}

/// Numeric class of a vertex format.
pub fn classify_vertex_format(format: vk::Format) -> Result<FormatClass> {
    Ok(match format {
        vk::Format::R32_SFLOAT
        | vk::Format::R32G32_SFLOAT
        | vk::Format::R32G32B32_SFLOAT
        | vk::Format::R32G32B32A32_SFLOAT
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R16G16B16A16_SFLOAT => FormatClass::Float,
        vk::Format::R8G8B8A8_UNORM => FormatClass::Unorm,
        vk::Format::R8G8B8A8_SNORM | vk::Format::R16G16_SNORM | vk::Format::R16G16B16A16_SNORM => {
            FormatClass::Snorm
        }
        vk::Format::R8G8B8A8_UINT => FormatClass::Uint,
        vk::Format::R16G16_SINT | vk::Format::R16G16B16A16_SINT => FormatClass::Sint,
        other => return Err(ConfigurationError::unmapped("ClassifyFormat", other).into()),
    })
}

/// Shader input location of a vertex attribute.
pub fn attribute_location(usage: ViaUsage, usage_index: u32) -> u32 {
    match usage {
        ViaUsage::Position => 0,
        ViaUsage::BlendWeights => 1,
        ViaUsage::Normal => 2,
        ViaUsage::Color => 3 + usage_index,
        ViaUsage::BlendIndices => 6,
        ViaUsage::PSize => 7,
        ViaUsage::TexCoord => 8 + usage_index,
        ViaUsage::Tangent => 14,
        ViaUsage::Binormal => 15,
    }
}

/// `VkVertexInputBindingDescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInputBindingDescription {
    /// Compacted binding number.
    pub binding: u32,
    /// Bytes between consecutive elements.
    pub stride: u32,
    /// Per-vertex or per-instance stepping.
    pub input_rate: vk::VertexInputRate,
}

/// `VkVertexInputAttributeDescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInputAttributeDescription {
    /// Shader input location, see [`attribute_location`].
    pub location: u32,
    /// Compacted binding the attribute reads from.
    pub binding: u32,
    /// Element format.
    pub format: vk::Format,
    /// Byte offset inside one element of the binding.
    pub offset: u32,
}

/// Bindings and attributes kept by `filter`, with compacted binding numbers.
pub fn vertex_input(
    layout: &GeometryLayout,
    filter: u32,
) -> Result<(Vec<VertexInputBindingDescription>, Vec<VertexInputAttributeDescription>)> {
    let bindings = layout
        .filtered_bindings(filter)
        .into_iter()
        .enumerate()
        .map(|(slot, binding)| {
            Ok(VertexInputBindingDescription {
                binding: slot as u32,
                stride: layout.stride(binding)?,
                input_rate: if layout.is_per_instance(binding) {
                    vk::VertexInputRate::INSTANCE
                } else {
                    vk::VertexInputRate::VERTEX
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let attributes = layout
        .filtered_attributes(filter)
        .into_iter()
        .map(|(slot, attr)| {
            Ok(VertexInputAttributeDescription {
                location: attribute_location(attr.usage, attr.usage_index),
                binding: slot as u32,
                format: vertex_format(attr.ty, attr.components, attr.usage)?,
                offset: attr.offset as u32,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((bindings, attributes))
}

// --- Fixed-function state ---

/// `VkPipelineColorBlendAttachmentState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorBlendAttachmentState {
    /// `false` writes the source color unchanged.
    pub blend_enable: bool,
    /// Source factor of the color equation.
    pub src_color_blend_factor: vk::BlendFactor,
    /// Destination factor of the color equation.
    pub dst_color_blend_factor: vk::BlendFactor,
    /// Operator of the color equation.
    pub color_blend_op: vk::BlendOp,
    /// Source factor of the alpha equation.
    pub src_alpha_blend_factor: vk::BlendFactor,
    /// Destination factor of the alpha equation.
    pub dst_alpha_blend_factor: vk::BlendFactor,
    /// Operator of the alpha equation.
    pub alpha_blend_op: vk::BlendOp,
    /// Channels written to the attachment.
    pub color_write_mask: vk::ColorComponentFlags,
}

fn blend_component(component: BlendComponent) -> Result<(vk::BlendFactor, vk::BlendFactor, vk::BlendOp)> {
    Ok((
        component.src_factor.to_vk()?,
        component.dst_factor.to_vk()?,
        component.op.to_vk()?,
    ))
}

/// Blend state of every color attachment.
pub fn color_blend_attachments(attachments: &[ColorAttachmentState]) -> Result<Vec<ColorBlendAttachmentState>> {
    attachments
        .iter()
        .map(|state| {
            let (src_color, dst_color, color_op) = blend_component(state.blend.color)?;
            let (src_alpha, dst_alpha, alpha_op) = blend_component(state.blend.alpha)?;
            Ok(ColorBlendAttachmentState {
                blend_enable: state.blend.enabled,
                src_color_blend_factor: src_color,
                dst_color_blend_factor: dst_color,
                color_blend_op: color_op,
                src_alpha_blend_factor: src_alpha,
                dst_alpha_blend_factor: dst_alpha,
                alpha_blend_op: alpha_op,
                // Engine write masks share the R, G, B, A bit layout.
                color_write_mask: vk::ColorComponentFlags::from_raw(u32::from(state.write_mask.bits())),
            })
        })
        .collect()
}

/// `VkStencilOpState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilOpState {
    /// Applied when the stencil test fails.
    pub fail_op: vk::StencilOp,
    /// Applied when both tests pass.
    pub pass_op: vk::StencilOp,
    /// Applied when the stencil test passes and the depth test fails.
    pub depth_fail_op: vk::StencilOp,
    /// Stencil comparison.
    pub compare_op: vk::CompareOp,
    /// Bits read by the comparison.
    pub compare_mask: u32,
    /// Bits written by the update.
    pub write_mask: u32,
    /// Reference value of the comparison.
    pub reference: u32,
}

/// `VkPipelineDepthStencilStateCreateInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilStateInfo {
    /// Depth comparison enabled.
    pub depth_test_enable: bool,
    /// Depth writes enabled.
    pub depth_write_enable: bool,
    /// Depth comparison.
    pub depth_compare_op: vk::CompareOp,
    /// Stencil test enabled.
    pub stencil_test_enable: bool,
    /// Stencil state of front-facing primitives.
    pub front: StencilOpState,
    /// Stencil state of back-facing primitives.
    pub back: StencilOpState,
}

fn stencil_op_state(ops: StencilOps, read_mask: u8, write_mask: u8, reference: u32) -> Result<StencilOpState> {
    Ok(StencilOpState {
        fail_op: ops.fail_op.to_vk()?,
        pass_op: ops.pass_op.to_vk()?,
        depth_fail_op: ops.depth_fail_op.to_vk()?,
        compare_op: ops.compare_op.to_vk()?,
        compare_mask: u32::from(read_mask),
        write_mask: u32::from(write_mask),
        reference,
    })
}

/// Depth-stencil state, `None` when the subpass has no depth attachment.
pub fn depth_stencil_state(state: Option<&DepthStencilState>, reference: u32) -> Result<Option<DepthStencilStateInfo>> {
    state
        .map(|state| {
            Ok(DepthStencilStateInfo {
                depth_test_enable: state.depth_test_enable,
                depth_write_enable: state.depth_write_enable,
                depth_compare_op: state.depth_compare_op.to_vk()?,
                stencil_test_enable: state.stencil_test_enable,
                front: stencil_op_state(state.front, state.read_mask, state.write_mask, reference)?,
                back: stencil_op_state(state.back, state.read_mask, state.write_mask, reference)?,
            })
        })
        .transpose()
}

/// `VkSamplerCreateInfo`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerCreateInfo {
    /// Magnification filter.
    pub mag_filter: vk::Filter,
    /// Minification filter.
    pub min_filter: vk::Filter,
    /// Filter between mip levels.
    pub mipmap_mode: vk::SamplerMipmapMode,
    /// Address mode of the U, V and W coordinates.
    pub address_mode: vk::SamplerAddressMode,
    /// Anisotropic filtering enabled.
    pub anisotropy_enable: bool,
    /// Clamped to the device limit when the sampler is created.
    pub max_anisotropy: f32,
    /// Depth comparison of shadow samplers.
    pub compare_op: Option<vk::CompareOp>,
    /// Highest mip level sampled.
    pub max_lod: f32,
}

/// Sampler description of a sampler state.
pub fn sampler_create_info(state: SamplerState) -> Result<SamplerCreateInfo> {
    let filter = if state.linear || state.anisotropy {
        vk::Filter::LINEAR
    } else {
        vk::Filter::NEAREST
    };
    Ok(SamplerCreateInfo {
        mag_filter: filter,
        min_filter: filter,
        mipmap_mode: if state.linear_mips || state.anisotropy {
            vk::SamplerMipmapMode::LINEAR
        } else {
            vk::SamplerMipmapMode::NEAREST
        },
        address_mode: if state.clamp {
            vk::SamplerAddressMode::CLAMP_TO_EDGE
        } else {
            vk::SamplerAddressMode::REPEAT
        },
        anisotropy_enable: state.anisotropy,
        max_anisotropy: if state.anisotropy { 16.0 } else { 1.0 },
        compare_op: state.compare.map(CompareOp::to_vk).transpose()?,
        max_lod: f32::MAX,
    })
}

// --- Rasterizer rectangles ---

/// `VkViewport`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge.
    pub x: f32,
    /// Origin row, the bottom edge once flipped.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Negative once flipped.
    pub height: f32,
    /// Depth range start.
    pub min_depth: f32,
    /// Depth range end.
    pub max_depth: f32,
}

/// `VkRect2D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Viewports of the engine rectangles, flipped so +Y points up like in Direct3D.
pub fn viewports(rects: &[Rect], min_depth: f32, max_depth: f32) -> Vec<Viewport> {
    rects
        .iter()
        .map(|r| Viewport {
            x: r.x,
            y: r.y + r.height,
            width: r.width,
            height: -r.height,
            min_depth,
            max_depth,
        })
        .collect()
}

/// Scissor rectangles of the engine rectangles.
pub fn scissors(rects: &[Rect]) -> Vec<Rect2D> {
    rects
        .iter()
        .map(|r| Rect2D {
            x: r.x as i32,
            y: r.y as i32,
            width: r.width as u32,
            height: r.height as u32,
        })
        .collect()
}

// --- Barriers ---

/// Stage and access scopes of an image layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierMasks {
    /// Stages that must finish before the transition.
    pub src_stage: vk::PipelineStageFlags,
    /// Writes made available by the transition.
    pub src_access: vk::AccessFlags,
    /// Stages that wait for the transition.
    pub dst_stage: vk::PipelineStageFlags,
    /// Accesses the transition makes visible.
    pub dst_access: vk::AccessFlags,
}

/// Synchronization scopes of the supported layout transitions.
pub fn image_barrier_masks(old: ImageLayout, new: ImageLayout) -> Result<BarrierMasks> {
    use ImageLayout as L;
    type S = vk::PipelineStageFlags;
    type A = vk::AccessFlags;
    let ds_access = A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE;
    let color_access = A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE;
    let (src_stage, src_access, dst_stage, dst_access) = match (old, new) {
        (L::Undefined, L::General) => (S::TOP_OF_PIPE, A::empty(), S::TRANSFER, A::TRANSFER_WRITE),
        (L::Undefined, L::DepthStencilAttachment) => (S::TOP_OF_PIPE, A::empty(), S::EARLY_FRAGMENT_TESTS, ds_access),
        (L::Undefined, L::DepthStencilReadOnly) => (S::TOP_OF_PIPE, A::empty(), S::FRAGMENT_SHADER, A::SHADER_READ),
        (L::Undefined, L::ShaderReadOnly) => (S::TOP_OF_PIPE, A::empty(), S::FRAGMENT_SHADER, A::SHADER_READ),
        (L::Undefined, L::TransferDst) => (S::TOP_OF_PIPE, A::empty(), S::TRANSFER, A::TRANSFER_WRITE),
        (L::Undefined, L::ColorAttachment) => (S::TOP_OF_PIPE, A::empty(), S::COLOR_ATTACHMENT_OUTPUT, color_access),
        (L::General, L::TransferSrc) => (S::TOP_OF_PIPE, A::empty(), S::TRANSFER, A::TRANSFER_READ),
        (L::ShaderReadOnly, L::ShaderReadOnly) => (S::FRAGMENT_SHADER, A::empty(), S::FRAGMENT_SHADER, A::SHADER_READ),
        (L::ShaderReadOnly, L::TransferDst) => (S::FRAGMENT_SHADER, A::empty(), S::TRANSFER, A::TRANSFER_WRITE),
        (L::ShaderReadOnly, L::ColorAttachment) => {
            (S::FRAGMENT_SHADER, A::empty(), S::COLOR_ATTACHMENT_OUTPUT, color_access)
        }
        (L::TransferDst, L::ShaderReadOnly) => (S::TRANSFER, A::TRANSFER_WRITE, S::FRAGMENT_SHADER, A::SHADER_READ),
        (L::TransferDst, L::TransferSrc) => (S::TRANSFER, A::TRANSFER_WRITE, S::TRANSFER, A::TRANSFER_READ),
        (L::TransferSrc, L::ShaderReadOnly) => (S::TRANSFER, A::empty(), S::FRAGMENT_SHADER, A::SHADER_READ),
        (L::ColorAttachment, L::ShaderReadOnly) => {
            (S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE, S::FRAGMENT_SHADER, A::SHADER_READ)
        }
        (L::DepthStencilAttachment, L::ShaderReadOnly | L::DepthStencilReadOnly) => (
            S::LATE_FRAGMENT_TESTS,
            A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
        ),
        (from, to) => {
            return Err(ConfigurationError::UnsupportedTransition {
                from: format!("{from:?}"),
                to: format!("{to:?}"),
            }
            .into())
        }
    };
    Ok(BarrierMasks {
        src_stage,
        src_access,
        dst_stage,
        dst_access,
    })
}

/// Aspects of a texture a barrier into `layout` touches.
pub fn aspect_mask(format: Format, layout: ImageLayout) -> vk::ImageAspectFlags {
    if !format.is_depth() {
        return vk::ImageAspectFlags::COLOR;
    }
    if format.has_stencil() && layout == ImageLayout::DepthStencilAttachment {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// `VkImageMemoryBarrier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMemoryBarrier {
    /// Image being transitioned.
    pub texture: TextureId,
    /// Writes made available.
    pub src_access: vk::AccessFlags,
    /// Accesses made visible.
    pub dst_access: vk::AccessFlags,
    /// Layout the subresources are in.
    pub old_layout: vk::ImageLayout,
    /// Layout the subresources move to.
    pub new_layout: vk::ImageLayout,
    /// Aspects covered.
    pub aspect: vk::ImageAspectFlags,
    /// First mip level covered.
    pub base_mip_level: u32,
    /// Number of mip levels covered.
    pub level_count: u32,
    /// First array layer covered.
    pub base_array_layer: u32,
    /// Number of array layers covered.
    pub layer_count: u32,
}

/// `VkBufferMemoryBarrier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMemoryBarrier {
    /// Buffer the barrier applies to.
    pub buffer: BufferId,
    /// Writes made available.
    pub src_access: vk::AccessFlags,
    /// Accesses made visible.
    pub dst_access: vk::AccessFlags,
    /// First byte covered.
    pub offset: u64,
    /// Bytes covered.
    pub size: u64,
}

/// A layout change a render pass performs on one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentLayoutChange {
    /// Attachment texture.
    pub texture: TextureId,
    /// Mip level the framebuffer renders to.
    pub mip_level: u32,
    /// Layout after the change.
    pub layout: vk::ImageLayout,
}

/// `VkClearValue`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA clear color.
    Color([f32; 4]),
    /// Depth and stencil clear values.
    DepthStencil {
        /// Depth clear value.
        depth: f32,
        /// Stencil clear value.
        stencil: u32,
    },
}

/// One call recorded into a Vulkan command buffer.
///
/// Render pass commands carry the layout changes the pass performs on its
/// attachments, so the device can track image layouts.
#[derive(Debug, Clone, PartialEq)]
pub enum VulkanCommand {
    /// `vkCmdPipelineBarrier`.
    PipelineBarrier {
        /// Stages waited on.
        src_stage: vk::PipelineStageFlags,
        /// Stages that wait.
        dst_stage: vk::PipelineStageFlags,
        /// Image layout transitions.
        image_barriers: Vec<ImageMemoryBarrier>,
        /// Buffer access barriers.
        buffer_barriers: Vec<BufferMemoryBarrier>,
    },
    /// `vkCmdCopyBuffer` with one region.
    CopyBuffer {
        /// Source buffer.
        src: BufferId,
        /// Offset in the source buffer.
        src_offset: u64,
        /// Destination buffer.
        dst: BufferId,
        /// Offset in the destination buffer.
        dst_offset: u64,
        /// Bytes copied.
        size: u64,
    },
    /// `vkCmdBeginRenderPass`.
    BeginRenderPass {
        /// Render pass begun.
        render_pass: RPHandle,
        /// Framebuffer rendered to.
        framebuffer: FBHandle,
        /// Whole framebuffer extent.
        render_area: Rect2D,
        /// One per attachment.
        clear_values: Vec<ClearValue>,
        /// Layouts entering the first subpass.
        layout_changes: Vec<AttachmentLayoutChange>,
    },
    /// `vkCmdNextSubpass`.
    NextSubpass {
        /// Layouts entering the next subpass.
        layout_changes: Vec<AttachmentLayoutChange>,
    },
    /// `vkCmdEndRenderPass`.
    EndRenderPass {
        /// Final layouts of the attachments.
        layout_changes: Vec<AttachmentLayoutChange>,
    },
    /// `vkCmdBindPipeline`.
    BindPipeline {
        /// Compute bind point instead of graphics.
        compute: bool,
        /// Pipeline bound.
        pipeline: PipelineId,
    },
    /// `vkCmdSetViewport` from viewport 0.
    SetViewport(Vec<Viewport>),
    /// `vkCmdSetScissor` from scissor 0.
    SetScissor(Vec<Rect2D>),
    /// `vkCmdSetBlendConstants`.
    SetBlendConstants([f32; 4]),
    /// `vkCmdBindVertexBuffers`.
    BindVertexBuffers {
        /// First compacted binding.
        first_binding: u32,
        /// One buffer per binding.
        buffers: Vec<BufferId>,
        /// Byte offset per buffer.
        offsets: Vec<u64>,
    },
    /// `vkCmdBindIndexBuffer`.
    BindIndexBuffer {
        /// Index buffer.
        buffer: BufferId,
        /// Byte offset of the first index.
        offset: u64,
        /// 16 or 32 bit indices.
        index_type: vk::IndexType,
    },
    /// `vkCmdBindDescriptorSets`.
    BindDescriptorSets {
        /// Compute bind point instead of graphics.
        compute: bool,
        /// Pipeline layout.
        layout: PipelineId,
        /// Set number of the first set.
        first_set: u32,
        /// Sets bound from `first_set`.
        descriptor_sets: Vec<DescriptorSetId>,
        /// One per dynamic uniform buffer.
        dynamic_offsets: Vec<u32>,
    },
    /// `vkCmdPushConstants`.
    PushConstants {
        /// Pipeline layout.
        layout: PipelineId,
        /// Stages that read the range.
        stage_flags: vk::ShaderStageFlags,
        /// In bytes.
        offset: u32,
        /// Bytes written.
        data: Vec<u8>,
    },
    /// `vkCmdDraw`.
    Draw {
        /// Vertices per instance.
        vertex_count: u32,
        /// Instances drawn.
        instance_count: u32,
        /// First vertex.
        first_vertex: u32,
        /// First instance.
        first_instance: u32,
    },
    /// `vkCmdDrawIndexed`.
    DrawIndexed {
        /// Indices per instance.
        index_count: u32,
        /// Instances drawn.
        instance_count: u32,
        /// First index.
        first_index: u32,
        /// Added to each index.
        vertex_offset: i32,
        /// First instance.
        first_instance: u32,
    },
    /// `vkCmdDispatch`.
    Dispatch {
        /// Workgroups along X.
        x: u32,
        /// Workgroups along Y.
        y: u32,
        /// Workgroups along Z.
        z: u32,
    },
    /// `vkCmdDrawMeshTasksEXT`.
    DrawMeshTasks {
        /// Task groups along X.
        x: u32,
        /// Task groups along Y.
        y: u32,
        /// Task groups along Z.
        z: u32,
    },
    /// `vkCmdTraceRaysKHR`.
    TraceRays {
        /// Launch width.
        width: u32,
        /// Launch height.
        height: u32,
        /// Launch depth.
        depth: u32,
    },
}

impl VulkanCommand {
    /// Name of the `vkCmd*` entry point.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PipelineBarrier { .. } => "vkCmdPipelineBarrier",
            Self::CopyBuffer { .. } => "vkCmdCopyBuffer",
            Self::BeginRenderPass { .. } => "vkCmdBeginRenderPass",
            Self::NextSubpass { .. } => "vkCmdNextSubpass",
            Self::EndRenderPass { .. } => "vkCmdEndRenderPass",
            Self::BindPipeline { .. } => "vkCmdBindPipeline",
            Self::SetViewport(_) => "vkCmdSetViewport",
            Self::SetScissor(_) => "vkCmdSetScissor",
            Self::SetBlendConstants(_) => "vkCmdSetBlendConstants",
            Self::BindVertexBuffers { .. } => "vkCmdBindVertexBuffers",
            Self::BindIndexBuffer { .. } => "vkCmdBindIndexBuffer",
            Self::BindDescriptorSets { .. } => "vkCmdBindDescriptorSets",
            Self::PushConstants { .. } => "vkCmdPushConstants",
            Self::Draw { .. } => "vkCmdDraw",
            Self::DrawIndexed { .. } => "vkCmdDrawIndexed",
            Self::Dispatch { .. } => "vkCmdDispatch",
            Self::DrawMeshTasks { .. } => "vkCmdDrawMeshTasksEXT",
            Self::TraceRays { .. } => "vkCmdTraceRaysKHR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use verus_core::cgi::api::{GeometryDesc, VertexInputAttrDesc};

    #[test]
    fn test_every_format_maps() {
        for format in Format::ALL {
            assert!(format.to_vk().is_ok(), "{format:?}");
        }
        assert_eq!(Format::UnormR10G10B10A2.to_vk().unwrap().as_raw(), 64);
        assert_eq!(Format::SrgbBc3.to_vk().unwrap(), vk::Format::BC3_SRGB_BLOCK);
    }

    #[test]
    fn test_layouts_round_trip() {
        for layout in [
            ImageLayout::Undefined,
            ImageLayout::General,
            ImageLayout::ColorAttachment,
            ImageLayout::DepthStencilAttachment,
            ImageLayout::DepthStencilReadOnly,
            ImageLayout::ShaderReadOnly,
            ImageLayout::TransferSrc,
            ImageLayout::TransferDst,
            ImageLayout::PresentSrc,
        ] {
            assert_eq!(engine_layout(layout.to_vk().unwrap()), Some(layout));
        }
        assert_eq!(engine_layout(vk::ImageLayout::from_raw(42)), None);
        assert_eq!(engine_layout(vk::ImageLayout::READ_ONLY_OPTIMAL), None);
    }

    #[test]
    fn test_dynamic_descriptor_types() {
        assert!(is_dynamic_descriptor(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC));
        assert!(is_dynamic_descriptor(vk::DescriptorType::STORAGE_BUFFER_DYNAMIC));
        assert!(!is_dynamic_descriptor(vk::DescriptorType::UNIFORM_BUFFER));
        assert!(!is_dynamic_descriptor(vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
    }

    #[test]
    fn test_viewports_are_flipped() {
        let vp = viewports(&[Rect::new(10.0, 20.0, 640.0, 480.0)], 0.0, 1.0);
        assert_relative_eq!(vp[0].y, 500.0);
        assert_relative_eq!(vp[0].height, -480.0);
        assert_relative_eq!(vp[0].width, 640.0);
        let sc = scissors(&[Rect::new(10.0, 20.0, 640.0, 480.0)]);
        assert_eq!(sc[0], Rect2D { x: 10, y: 20, width: 640, height: 480 });
    }

    #[test]
    fn test_barrier_table() {
        let masks = image_barrier_masks(ImageLayout::TransferDst, ImageLayout::ShaderReadOnly).unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        let masks = image_barrier_masks(ImageLayout::Undefined, ImageLayout::DepthStencilAttachment).unwrap();
        assert_eq!(masks.dst_access.as_raw(), 0x600);
        let err = image_barrier_masks(ImageLayout::PresentSrc, ImageLayout::TransferDst).unwrap_err();
        assert!(err.is_configuration());
        assert!(image_barrier_masks(ImageLayout::General, ImageLayout::Undefined).is_err());
    }

    #[test]
    fn test_aspect_masks() {
        assert_eq!(
            aspect_mask(Format::UnormD24UintS8, ImageLayout::DepthStencilAttachment).as_raw(),
            0x6
        );
        assert_eq!(
            aspect_mask(Format::UnormD24UintS8, ImageLayout::DepthStencilReadOnly),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_mask(Format::UnormR8G8B8A8, ImageLayout::ShaderReadOnly),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_attribute_locations() {
        assert_eq!(attribute_location(ViaUsage::Color, 1), 4);
        assert_eq!(attribute_location(ViaUsage::TexCoord, 3), 11);
        assert_eq!(attribute_location(ViaUsage::BlendIndices, 0), 6);
        assert_eq!(attribute_location(ViaUsage::Binormal, 0), 15);
    }

    #[test]
    fn test_vertex_input_compacts_bindings() {
        let desc = GeometryDesc {
            name: "Grass".to_string(),
            vertex_input_attrs: vec![
                VertexInputAttrDesc::new(0, 0, ViaType::Floats, 3, ViaUsage::Position, 0),
                VertexInputAttrDesc::new(1, 0, ViaType::Halfs, 2, ViaUsage::TexCoord, 0),
                VertexInputAttrDesc::new(-2, 0, ViaType::Floats, 4, ViaUsage::TexCoord, 8),
            ],
            strides: vec![12, 4, 16],
            ..Default::default()
        };
        let layout = GeometryLayout::parse(&desc).unwrap();
        let (bindings, attributes) = vertex_input(&layout, 0b101).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].stride, 16);
        assert_eq!(bindings[1].input_rate, vk::VertexInputRate::INSTANCE);
        assert_eq!(attributes[1].location, 16);
        assert_eq!(attributes[1].binding, 1);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn test_stage_flags_map_bit_by_bit() {
        let flags = (ShaderStageFlags::VS | ShaderStageFlags::FS | ShaderStageFlags::CS).to_vk().unwrap();
        assert_eq!(flags.as_raw(), 0x31);
        assert!(ShaderStageFlags::empty().to_vk().unwrap().is_empty());
        let mesh = (ShaderStageFlags::TS | ShaderStageFlags::MS).to_vk().unwrap();
        assert_eq!(mesh, vk::ShaderStageFlags::TASK_EXT | vk::ShaderStageFlags::MESH_EXT);
        assert_eq!(sample_count(4).unwrap(), vk::SampleCountFlags::TYPE_4);
        assert!(sample_count(3).is_err());
    }
}
