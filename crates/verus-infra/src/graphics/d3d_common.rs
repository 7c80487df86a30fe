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

//! Types and mappings shared by the Direct3D 11 and Direct3D 12 backends.
//!
//! Both APIs speak DXGI formats and use the same numeric values for
//! comparison functions, blend factors, stencil operations, culling and fill
//! modes, sampler filters and primitive topologies, so the engine-to-native
//! mapping lives here once. Values are those of `dxgiformat.h`,
//! `d3dcommon.h` and `d3d11.h`.

use crate::graphics::native::native_enum;
use verus_core::cgi::api::{
    BlendComponent, BlendFactor, BlendOp, ColorAttachmentState, CompareOp,
    CullMode, DepthStencilState, Format, FormatClass, GeometryLayout, PipelineRasterizationState,
    PolygonMode, PrimitiveTopology, SamplerState, StencilOp, StencilOps, ViaType, ViaUsage,
};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::Rect;

/// Converts an engine value to its Direct3D counterpart.
///
/// Fails with `ConfigurationError::UnmappedEnum` when the value has no
/// Direct3D equivalent.
pub trait ToD3D<T> {
    /// Performs the conversion.
    fn to_d3d(self) -> Result<T>;
}

native_enum! {
    /// `DXGI_FORMAT`.
    pub struct DxgiFormat(u32) {
        const UNKNOWN = 0;
        const R32G32B32A32_FLOAT = 2;
        const R32G32B32_FLOAT = 6;
        const R16G16B16A16_FLOAT = 10;
        const R16G16B16A16_SNORM = 13;
        const R16G16B16A16_SINT = 14;
        const R32G32_FLOAT = 16;
        const R10G10B10A2_UNORM = 24;
        const R8G8B8A8_UNORM = 28;
        const R8G8B8A8_UNORM_SRGB = 29;
        const R8G8B8A8_UINT = 30;
        const R8G8B8A8_SNORM = 31;
        const R16G16_FLOAT = 34;
        const R16G16_SNORM = 37;
        const R16G16_SINT = 38;
        const R32_TYPELESS = 39;
        const D32_FLOAT = 40;
        const R32_FLOAT = 41;
        const R32_UINT = 42;
        const R24G8_TYPELESS = 44;
        const D24_UNORM_S8_UINT = 45;
        const R24_UNORM_X8_TYPELESS = 46;
        const R8G8_UNORM = 49;
        const R16_TYPELESS = 53;
        const R16_FLOAT = 54;
        const D16_UNORM = 55;
        const R16_UNORM = 56;
        const R16_UINT = 57;
        const R16_SINT = 59;
        const R8_UNORM = 61;
        const BC1_UNORM = 71;
        const BC1_UNORM_SRGB = 72;
        const BC2_UNORM = 74;
        const BC2_UNORM_SRGB = 75;
        const BC3_UNORM = 77;
        const BC3_UNORM_SRGB = 78;
        const B5G6R5_UNORM = 85;
        const B8G8R8A8_UNORM = 87;
        const B8G8R8A8_UNORM_SRGB = 91;
        const B4G4R4A4_UNORM = 115;
    }
}

native_enum! {
    /// `D3D_PRIMITIVE_TOPOLOGY`.
    pub struct D3DPrimitiveTopology(u32) {
        const UNDEFINED = 0;
        const POINTLIST = 1;
        const LINELIST = 2;
        const LINESTRIP = 3;
        const TRIANGLELIST = 4;
        const TRIANGLESTRIP = 5;
        const CONTROL_POINT_PATCHLIST_3 = 35;
        const CONTROL_POINT_PATCHLIST_4 = 36;
    }
}

native_enum! {
    /// `D3D11_COMPARISON_FUNC` / `D3D12_COMPARISON_FUNC`.
    pub struct ComparisonFunc(u32) {
        const NEVER = 1;
        const LESS = 2;
        const EQUAL = 3;
        const LESS_EQUAL = 4;
        const GREATER = 5;
        const NOT_EQUAL = 6;
        const GREATER_EQUAL = 7;
        const ALWAYS = 8;
    }
}

native_enum! {
    /// `D3D11_CULL_MODE`.
    pub struct D3DCullMode(u32) {
        const NONE = 1;
        const FRONT = 2;
        const BACK = 3;
    }
}

native_enum! {
    /// `D3D11_FILL_MODE`.
    pub struct FillMode(u32) {
        const WIREFRAME = 2;
        const SOLID = 3;
    }
}

native_enum! {
    /// `D3D11_BLEND`.
    pub struct D3DBlend(u32) {
        const ZERO = 1;
        const ONE = 2;
        const SRC_COLOR = 3;
        const INV_SRC_COLOR = 4;
        const SRC_ALPHA = 5;
        const INV_SRC_ALPHA = 6;
        const DEST_ALPHA = 7;
        const INV_DEST_ALPHA = 8;
        const DEST_COLOR = 9;
        const INV_DEST_COLOR = 10;
        const SRC_ALPHA_SAT = 11;
        const BLEND_FACTOR = 14;
        const INV_BLEND_FACTOR = 15;
    }
}

native_enum! {
    /// `D3D11_BLEND_OP`.
    pub struct D3DBlendOp(u32) {
        const ADD = 1;
        const SUBTRACT = 2;
        const REV_SUBTRACT = 3;
        const MIN = 4;
        const MAX = 5;
    }
}

native_enum! {
    /// `D3D11_STENCIL_OP`.
    pub struct D3DStencilOp(u32) {
        const KEEP = 1;
        const ZERO = 2;
        const REPLACE = 3;
        const INCR_SAT = 4;
        const DECR_SAT = 5;
        const INVERT = 6;
        const INCR = 7;
        const DECR = 8;
    }
}

native_enum! {
    /// `D3D11_FILTER`.
    pub struct D3DFilter(u32) {
        const MIN_MAG_MIP_POINT = 0x0;
        const MIN_MAG_POINT_MIP_LINEAR = 0x1;
        const MIN_MAG_LINEAR_MIP_POINT = 0x14;
        const MIN_MAG_MIP_LINEAR = 0x15;
        const ANISOTROPIC = 0x55;
        const COMPARISON_MIN_MAG_LINEAR_MIP_POINT = 0x94;
    }
}

native_enum! {
    /// `D3D11_TEXTURE_ADDRESS_MODE`.
    pub struct TextureAddressMode(u32) {
        const WRAP = 1;
        const MIRROR = 2;
        const CLAMP = 3;
        const BORDER = 4;
    }
}

native_enum! {
    /// `D3D11_INPUT_CLASSIFICATION`.
    pub struct InputClassification(u32) {
        const PER_VERTEX_DATA = 0;
        const PER_INSTANCE_DATA = 1;
    }
}

native_enum! {
    /// `D3D11_DEPTH_WRITE_MASK`.
    pub struct DepthWriteMask(u32) {
        const ZERO = 0;
        const ALL = 1;
    }
}

impl ToD3D<DxgiFormat> for Format {
    fn to_d3d(self) -> Result<DxgiFormat> {
        Ok(match self {
            Format::UnormB4G4R4A4 => DxgiFormat::B4G4R4A4_UNORM,
            Format::UnormB5G6R5 => DxgiFormat::B5G6R5_UNORM,
            Format::UnormR10G10B10A2 => DxgiFormat::R10G10B10A2_UNORM,
            Format::SintR16 => DxgiFormat::R16_SINT,
            Format::UnormR8 => DxgiFormat::R8_UNORM,
            Format::UnormR8G8 => DxgiFormat::R8G8_UNORM,
            Format::UnormR8G8B8A8 => DxgiFormat::R8G8B8A8_UNORM,
            Format::UnormB8G8R8A8 => DxgiFormat::B8G8R8A8_UNORM,
            Format::SrgbR8G8B8A8 => DxgiFormat::R8G8B8A8_UNORM_SRGB,
            Format::SrgbB8G8R8A8 => DxgiFormat::B8G8R8A8_UNORM_SRGB,
            Format::FloatR16 => DxgiFormat::R16_FLOAT,
            Format::FloatR16G16 => DxgiFormat::R16G16_FLOAT,
            Format::FloatR16G16B16A16 => DxgiFormat::R16G16B16A16_FLOAT,
            Format::FloatR32 => DxgiFormat::R32_FLOAT,
            Format::FloatR32G32 => DxgiFormat::R32G32_FLOAT,
            Format::FloatR32G32B32A32 => DxgiFormat::R32G32B32A32_FLOAT,
            Format::UnormD16 => DxgiFormat::D16_UNORM,
            Format::UnormD24UintS8 => DxgiFormat::D24_UNORM_S8_UINT,
            Format::FloatD32 => DxgiFormat::D32_FLOAT,
            Format::UnormBc1 => DxgiFormat::BC1_UNORM,
            Format::UnormBc2 => DxgiFormat::BC2_UNORM,
            Format::UnormBc3 => DxgiFormat::BC3_UNORM,
            Format::SrgbBc1 => DxgiFormat::BC1_UNORM_SRGB,
            Format::SrgbBc2 => DxgiFormat::BC2_UNORM_SRGB,
            Format::SrgbBc3 => DxgiFormat::BC3_UNORM_SRGB,
        })
    }
}

/// Storage format of a texture: depth textures are typeless so they can
/// also be read through a shader resource view.
pub fn resource_format(format: Format) -> Result<DxgiFormat> {
    Ok(match format {
        Format::UnormD16 => DxgiFormat::R16_TYPELESS,
        Format::UnormD24UintS8 => DxgiFormat::R24G8_TYPELESS,
        Format::FloatD32 => DxgiFormat::R32_TYPELESS,
        other => other.to_d3d()?,
    })
}

/// Format of a shader resource view of a texture.
pub fn shader_resource_format(format: Format) -> Result<DxgiFormat> {
    Ok(match format {
        Format::UnormD16 => DxgiFormat::R16_UNORM,
        Format::UnormD24UintS8 => DxgiFormat::R24_UNORM_X8_TYPELESS,
        Format::FloatD32 => DxgiFormat::R32_FLOAT,
        other => other.to_d3d()?,
    })
}

/// Format of the index buffer.
pub fn index_format(thirty_two_bit: bool) -> DxgiFormat {
    if thirty_two_bit {
        DxgiFormat::R32_UINT
    } else {
        DxgiFormat::R16_UINT
    }
}

impl ToD3D<ComparisonFunc> for CompareOp {
    fn to_d3d(self) -> Result<ComparisonFunc> {
        Ok(match self {
            CompareOp::Never => ComparisonFunc::NEVER,
            CompareOp::Less => ComparisonFunc::LESS,
            CompareOp::Equal => ComparisonFunc::EQUAL,
            CompareOp::LessOrEqual => ComparisonFunc::LESS_EQUAL,
            CompareOp::Greater => ComparisonFunc::GREATER,
            CompareOp::NotEqual => ComparisonFunc::NOT_EQUAL,
            CompareOp::GreaterOrEqual => ComparisonFunc::GREATER_EQUAL,
            CompareOp::Always => ComparisonFunc::ALWAYS,
        })
    }
}

impl ToD3D<D3DCullMode> for CullMode {
    fn to_d3d(self) -> Result<D3DCullMode> {
        Ok(match self {
            CullMode::None => D3DCullMode::NONE,
            CullMode::Front => D3DCullMode::FRONT,
            CullMode::Back => D3DCullMode::BACK,
        })
    }
}

impl ToD3D<FillMode> for PolygonMode {
    fn to_d3d(self) -> Result<FillMode> {
        Ok(match self {
            PolygonMode::Fill => FillMode::SOLID,
            PolygonMode::Line => FillMode::WIREFRAME,
        })
    }
}

impl ToD3D<D3DPrimitiveTopology> for PrimitiveTopology {
    fn to_d3d(self) -> Result<D3DPrimitiveTopology> {
        Ok(match self {
            PrimitiveTopology::PointList => D3DPrimitiveTopology::POINTLIST,
            PrimitiveTopology::LineList => D3DPrimitiveTopology::LINELIST,
            PrimitiveTopology::LineStrip => D3DPrimitiveTopology::LINESTRIP,
            PrimitiveTopology::TriangleList => D3DPrimitiveTopology::TRIANGLELIST,
            PrimitiveTopology::TriangleStrip => D3DPrimitiveTopology::TRIANGLESTRIP,
            PrimitiveTopology::PatchList3 => D3DPrimitiveTopology::CONTROL_POINT_PATCHLIST_3,
            PrimitiveTopology::PatchList4 => D3DPrimitiveTopology::CONTROL_POINT_PATCHLIST_4,
        })
    }
}

impl ToD3D<D3DBlend> for BlendFactor {
    fn to_d3d(self) -> Result<D3DBlend> {
        Ok(match self {
            BlendFactor::Zero => D3DBlend::ZERO,
            BlendFactor::One => D3DBlend::ONE,
            BlendFactor::InvDstAlpha => D3DBlend::INV_DEST_ALPHA,
            BlendFactor::InvDstColor => D3DBlend::INV_DEST_COLOR,
            BlendFactor::InvBlendFactor => D3DBlend::INV_BLEND_FACTOR,
            BlendFactor::InvSrcAlpha => D3DBlend::INV_SRC_ALPHA,
            BlendFactor::InvSrcColor => D3DBlend::INV_SRC_COLOR,
            BlendFactor::DstAlpha => D3DBlend::DEST_ALPHA,
            BlendFactor::DstColor => D3DBlend::DEST_COLOR,
            BlendFactor::BlendFactor => D3DBlend::BLEND_FACTOR,
            BlendFactor::SrcAlpha => D3DBlend::SRC_ALPHA,
            BlendFactor::SrcAlphaSat => D3DBlend::SRC_ALPHA_SAT,
            BlendFactor::SrcColor => D3DBlend::SRC_COLOR,
        })
    }
}

impl ToD3D<D3DBlendOp> for BlendOp {
    fn to_d3d(self) -> Result<D3DBlendOp> {
        Ok(match self {
            BlendOp::Add => D3DBlendOp::ADD,
            BlendOp::Subtract => D3DBlendOp::SUBTRACT,
            BlendOp::ReverseSubtract => D3DBlendOp::REV_SUBTRACT,
            BlendOp::Min => D3DBlendOp::MIN,
            BlendOp::Max => D3DBlendOp::MAX,
        })
    }
}

impl ToD3D<D3DStencilOp> for StencilOp {
    fn to_d3d(self) -> Result<D3DStencilOp> {
        Ok(match self {
            StencilOp::Keep => D3DStencilOp::KEEP,
            StencilOp::Zero => D3DStencilOp::ZERO,
            StencilOp::Replace => D3DStencilOp::REPLACE,
            StencilOp::IncrementClamp => D3DStencilOp::INCR_SAT,
            StencilOp::DecrementClamp => D3DStencilOp::DECR_SAT,
            StencilOp::Invert => D3DStencilOp::INVERT,
            StencilOp::IncrementWrap => D3DStencilOp::INCR,
            StencilOp::DecrementWrap => D3DStencilOp::DECR,
        })
    }
}

/// Checks a sample count against the counts Direct3D accepts.
pub fn sample_count(count: u32) -> Result<u32> {
    match count {
        1 | 2 | 4 | 8 | 16 | 32 => Ok(count),
        other => Err(ConfigurationError::unmapped("ToNativeSampleCount", other).into()),
    }
}

// --- Vertex input ---

/// Format of a vertex attribute.
pub fn vertex_format(ty: ViaType, components: u32, usage: ViaUsage) -> Result<DxgiFormat> {
    let format = match (ty, components) {
        (ViaType::Floats, 1) => DxgiFormat::R32_FLOAT,
        (ViaType::Floats, 2) => DxgiFormat::R32G32_FLOAT,
        (ViaType::Floats, 3) => DxgiFormat::R32G32B32_FLOAT,
        (ViaType::Floats, 4) => DxgiFormat::R32G32B32A32_FLOAT,
        (ViaType::Halfs, 2) => DxgiFormat::R16G16_FLOAT,
        (ViaType::Halfs, 4) => DxgiFormat::R16G16B16A16_FLOAT,
        (ViaType::Shorts, 2) => match usage {
            ViaUsage::Tangent | ViaUsage::Binormal => DxgiFormat::R16G16_SNORM,
            _ => DxgiFormat::R16G16_SINT,
        },
        (ViaType::Shorts, 4) => match usage {
            ViaUsage::Tangent | ViaUsage::Binormal => DxgiFormat::R16G16B16A16_SNORM,
            _ => DxgiFormat::R16G16B16A16_SINT,
        },
        (ViaType::Ubytes, 4) => match usage {
            ViaUsage::Color => DxgiFormat::R8G8B8A8_UNORM,
            ViaUsage::Normal => DxgiFormat::R8G8B8A8_SNORM,
            _ => DxgiFormat::R8G8B8A8_UINT,
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
pub fn classify_vertex_format(format: DxgiFormat) -> Result<FormatClass> {
    Ok(match format {
        DxgiFormat::R32_FLOAT
        | DxgiFormat::R32G32_FLOAT
        | DxgiFormat::R32G32B32_FLOAT
        | DxgiFormat::R32G32B32A32_FLOAT
        | DxgiFormat::R16G16_FLOAT
        | DxgiFormat::R16G16B16A16_FLOAT => FormatClass::Float,
        DxgiFormat::R8G8B8A8_UNORM => FormatClass::Unorm,
        DxgiFormat::R8G8B8A8_SNORM | DxgiFormat::R16G16_SNORM | DxgiFormat::R16G16B16A16_SNORM => {
            FormatClass::Snorm
        }
        DxgiFormat::R8G8B8A8_UINT => FormatClass::Uint,
        DxgiFormat::R16G16_SINT | DxgiFormat::R16G16B16A16_SINT => FormatClass::Sint,
        other => return Err(ConfigurationError::unmapped("ClassifyFormat", other).into()),
    })
}

/// HLSL semantic name and index of a vertex attribute.
///
/// Tangents and binormals travel as `TEXCOORD14` and `TEXCOORD15`.
pub fn semantic(usage: ViaUsage, usage_index: u32) -> (&'static str, u32) {
    match usage {
        ViaUsage::Position => ("POSITION", usage_index),
        ViaUsage::BlendWeights => ("BLENDWEIGHT", usage_index),
        ViaUsage::BlendIndices => ("BLENDINDICES", usage_index),
        ViaUsage::Normal => ("NORMAL", usage_index),
        ViaUsage::Tangent => ("TEXCOORD", 14),
        ViaUsage::Binormal => ("TEXCOORD", 15),
        ViaUsage::Color => ("COLOR", usage_index),
        ViaUsage::PSize => ("PSIZE", usage_index),
        ViaUsage::TexCoord => ("TEXCOORD", usage_index),
    }
}

/// `D3D11_INPUT_ELEMENT_DESC` / `D3D12_INPUT_ELEMENT_DESC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputElementDesc {
    /// HLSL semantic, such as `POSITION`.
    pub semantic_name: &'static str,
    /// Index appended to the semantic.
    pub semantic_index: u32,
    /// Attribute format.
    pub format: DxgiFormat,
    /// Vertex buffer slot.
    pub input_slot: u32,
    /// Byte offset in the vertex.
    pub aligned_byte_offset: u32,
    /// Per-vertex or per-instance data.
    pub input_slot_class: InputClassification,
    /// Instances drawn per element step, zero for per-vertex data.
    pub instance_data_step_rate: u32,
}

/// Input layout of the bindings kept by `filter`, with compacted slots.
pub fn input_layout(layout: &GeometryLayout, filter: u32) -> Result<Vec<InputElementDesc>> {
    layout
        .filtered_attributes(filter)
        .into_iter()
        .map(|(slot, attr)| {
            let (semantic_name, semantic_index) = semantic(attr.usage, attr.usage_index);
            let per_instance = attr.is_per_instance();
            Ok(InputElementDesc {
                semantic_name,
                semantic_index,
                format: vertex_format(attr.ty, attr.components, attr.usage)?,
                input_slot: slot as u32,
                aligned_byte_offset: attr.offset as u32,
                input_slot_class: if per_instance {
                    InputClassification::PER_INSTANCE_DATA
                } else {
                    InputClassification::PER_VERTEX_DATA
                },
                instance_data_step_rate: u32::from(per_instance),
            })
        })
        .collect()
}

// --- Fixed-function state ---

/// `D3D11_RENDER_TARGET_BLEND_DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetBlendDesc {
    /// Blending is enabled.
    pub blend_enable: bool,
    /// Color source factor.
    pub src_blend: D3DBlend,
    /// Color destination factor.
    pub dest_blend: D3DBlend,
    /// Color operation.
    pub blend_op: D3DBlendOp,
    /// Alpha source factor.
    pub src_blend_alpha: D3DBlend,
    /// Alpha destination factor.
    pub dest_blend_alpha: D3DBlend,
    /// Alpha operation.
    pub blend_op_alpha: D3DBlendOp,
    /// `D3D11_COLOR_WRITE_ENABLE` bits, same layout as `ColorWriteMask`.
    pub render_target_write_mask: u8,
}

fn blend_component(component: BlendComponent) -> Result<(D3DBlend, D3DBlend, D3DBlendOp)> {
    Ok((
        component.src_factor.to_d3d()?,
        component.dst_factor.to_d3d()?,
        component.op.to_d3d()?,
    ))
}

/// Blend state of every color attachment.
pub fn blend_desc(attachments: &[ColorAttachmentState]) -> Result<Vec<RenderTargetBlendDesc>> {
    attachments
        .iter()
        .map(|state| {
            let (src_blend, dest_blend, blend_op) = blend_component(state.blend.color)?;
            let (src_blend_alpha, dest_blend_alpha, blend_op_alpha) =
                blend_component(state.blend.alpha)?;
            Ok(RenderTargetBlendDesc {
                blend_enable: state.blend.enabled,
                src_blend,
                dest_blend,
                blend_op,
                src_blend_alpha,
                dest_blend_alpha,
                blend_op_alpha,
                render_target_write_mask: state.write_mask.bits(),
            })
        })
        .collect()
}

/// `D3D11_DEPTH_STENCILOP_DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilOpDesc {
    /// Applied when the stencil test fails.
    pub stencil_fail_op: D3DStencilOp,
    /// Applied when the stencil test passes and the depth test fails.
    pub stencil_depth_fail_op: D3DStencilOp,
    /// Applied when both tests pass.
    pub stencil_pass_op: D3DStencilOp,
    /// Stencil comparison.
    pub stencil_func: ComparisonFunc,
}

/// `D3D11_DEPTH_STENCIL_DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    /// Depth testing is enabled.
    pub depth_enable: bool,
    /// Depth writes.
    pub depth_write_mask: DepthWriteMask,
    /// Depth comparison.
    pub depth_func: ComparisonFunc,
    /// Stencil testing is enabled.
    pub stencil_enable: bool,
    /// Bits read by the stencil test.
    pub stencil_read_mask: u8,
    /// Bits written by the stencil operations.
    pub stencil_write_mask: u8,
    /// Stencil operations of front faces.
    pub front_face: DepthStencilOpDesc,
    /// Stencil operations of back faces.
    pub back_face: DepthStencilOpDesc,
}

fn stencil_op_desc(ops: StencilOps) -> Result<DepthStencilOpDesc> {
    Ok(DepthStencilOpDesc {
        stencil_fail_op: ops.fail_op.to_d3d()?,
        stencil_depth_fail_op: ops.depth_fail_op.to_d3d()?,
        stencil_pass_op: ops.pass_op.to_d3d()?,
        stencil_func: ops.compare_op.to_d3d()?,
    })
}

/// Depth-stencil state; everything is disabled when the subpass has no depth attachment.
pub fn depth_stencil_desc(state: Option<&DepthStencilState>) -> Result<DepthStencilDesc> {
    let Some(state) = state else {
        let keep = stencil_op_desc(StencilOps::default())?;
        return Ok(DepthStencilDesc {
            depth_enable: false,
            depth_write_mask: DepthWriteMask::ZERO,
            depth_func: ComparisonFunc::ALWAYS,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front_face: keep,
            back_face: keep,
        });
    };
    Ok(DepthStencilDesc {
        depth_enable: state.depth_test_enable,
        depth_write_mask: if state.depth_write_enable {
            DepthWriteMask::ALL
        } else {
            DepthWriteMask::ZERO
        },
        depth_func: state.depth_compare_op.to_d3d()?,
        stencil_enable: state.stencil_test_enable,
        stencil_read_mask: state.read_mask,
        stencil_write_mask: state.write_mask,
        front_face: stencil_op_desc(state.front)?,
        back_face: stencil_op_desc(state.back)?,
    })
}

/// `D3D11_RASTERIZER_DESC`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    /// Solid or wireframe.
    pub fill_mode: FillMode,
    /// Faces culled.
    pub cull_mode: D3DCullMode,
    /// Counter-clockwise triangles face front.
    pub front_counter_clockwise: bool,
    /// Constant depth bias.
    pub depth_bias: i32,
    /// Largest depth bias.
    pub depth_bias_clamp: f32,
    /// Depth bias scaled by the slope.
    pub slope_scaled_depth_bias: f32,
    /// Clipping against the depth range.
    pub depth_clip_enable: bool,
    /// Scissor testing.
    pub scissor_enable: bool,
    /// Quadrilateral line antialiasing on multisample targets.
    pub multisample_enable: bool,
    /// Line antialiasing.
    pub antialiased_line_enable: bool,
}

/// Rasterizer state. Depth bias is applied only when enabled.
pub fn rasterizer_desc(
    state: &PipelineRasterizationState,
    sample_count: u32,
    antialiased_line: bool,
) -> Result<RasterizerDesc> {
    let (depth_bias, depth_bias_clamp, slope_scaled_depth_bias) = if state.depth_bias_enable {
        (
            state.depth_bias_constant_factor as i32,
            state.depth_bias_clamp,
            state.depth_bias_slope_factor,
        )
    } else {
        (0, 0.0, 0.0)
    };
    Ok(RasterizerDesc {
        fill_mode: state.polygon_mode.to_d3d()?,
        cull_mode: state.cull_mode.to_d3d()?,
        front_counter_clockwise: true,
        depth_bias,
        depth_bias_clamp,
        slope_scaled_depth_bias,
        depth_clip_enable: true,
        scissor_enable: true,
        multisample_enable: sample_count > 1,
        antialiased_line_enable: antialiased_line,
    })
}

/// `D3D11_SAMPLER_DESC`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Minification, magnification and mip filtering.
    pub filter: D3DFilter,
    /// Addressing along U.
    pub address_u: TextureAddressMode,
    /// Addressing along V.
    pub address_v: TextureAddressMode,
    /// Addressing along W.
    pub address_w: TextureAddressMode,
    /// Added to the computed mip level.
    pub mip_lod_bias: f32,
    /// Clamp of anisotropic filtering.
    pub max_anisotropy: u32,
    /// Comparison of comparison filters.
    pub comparison_func: ComparisonFunc,
    /// Lowest mip level sampled.
    pub min_lod: f32,
    /// Highest mip level sampled.
    pub max_lod: f32,
}

/// Sampler description of a sampler state.
pub fn sampler_desc(state: SamplerState) -> Result<SamplerDesc> {
    let filter = match (state.compare, state.anisotropy, state.linear, state.linear_mips) {
        (Some(_), _, _, _) => D3DFilter::COMPARISON_MIN_MAG_LINEAR_MIP_POINT,
        (None, true, _, _) => D3DFilter::ANISOTROPIC,
        (None, false, true, true) => D3DFilter::MIN_MAG_MIP_LINEAR,
        (None, false, true, false) => D3DFilter::MIN_MAG_LINEAR_MIP_POINT,
        (None, false, false, true) => D3DFilter::MIN_MAG_POINT_MIP_LINEAR,
        (None, false, false, false) => D3DFilter::MIN_MAG_MIP_POINT,
    };
    let address = if state.clamp {
        TextureAddressMode::CLAMP
    } else {
        TextureAddressMode::WRAP
    };
    Ok(SamplerDesc {
        filter,
        address_u: address,
        address_v: address,
        address_w: address,
        mip_lod_bias: 0.0,
        max_anisotropy: if state.anisotropy { 16 } else { 1 },
        comparison_func: match state.compare {
            Some(op) => op.to_d3d()?,
            None => ComparisonFunc::NEVER,
        },
        min_lod: 0.0,
        max_lod: f32::MAX,
    })
}

// --- Rasterizer rectangles ---

/// `D3D11_VIEWPORT`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge.
    pub top_left_x: f32,
    /// Top edge.
    pub top_left_y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Depth of the near plane.
    pub min_depth: f32,
    /// Depth of the far plane.
    pub max_depth: f32,
}

/// `D3D11_RECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct D3DRect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Right edge, exclusive.
    pub right: i32,
    /// Bottom edge, exclusive.
    pub bottom: i32,
}

/// Viewports of the engine rectangles; Direct3D needs no flip.
pub fn viewports(rects: &[Rect], min_depth: f32, max_depth: f32) -> Vec<Viewport> {
    rects
        .iter()
        .map(|r| Viewport {
            top_left_x: r.x,
            top_left_y: r.y,
            width: r.width,
            height: r.height,
            min_depth,
            max_depth,
        })
        .collect()
}

/// Scissor rectangles of the engine rectangles.
pub fn scissor_rects(rects: &[Rect]) -> Vec<D3DRect> {
    rects
        .iter()
        .map(|r| D3DRect {
            left: r.x as i32,
            top: r.y as i32,
            right: (r.x + r.width) as i32,
            bottom: (r.y + r.height) as i32,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use verus_core::cgi::api::{GeometryDesc, VertexInputAttrDesc, ALL_BINDINGS};

    #[test]
    fn test_every_format_maps() {
        for format in Format::ALL {
            assert!(format.to_d3d().is_ok(), "{format:?}");
        }
        assert_eq!(Format::UnormD24UintS8.to_d3d().unwrap(), DxgiFormat::D24_UNORM_S8_UINT);
        assert_eq!(Format::SrgbB8G8R8A8.to_d3d().unwrap().raw(), 91);
    }

    #[test]
    fn test_depth_formats_are_typeless_in_storage() {
        assert_eq!(resource_format(Format::UnormD24UintS8).unwrap(), DxgiFormat::R24G8_TYPELESS);
        assert_eq!(
            shader_resource_format(Format::UnormD24UintS8).unwrap(),
            DxgiFormat::R24_UNORM_X8_TYPELESS
        );
        assert_eq!(shader_resource_format(Format::FloatD32).unwrap(), DxgiFormat::R32_FLOAT);
        assert_eq!(resource_format(Format::UnormR8).unwrap(), DxgiFormat::R8_UNORM);
    }

    #[test]
    fn test_vertex_formats_by_usage() {
        let color = vertex_format(ViaType::Ubytes, 4, ViaUsage::Color).unwrap();
        let normal = vertex_format(ViaType::Ubytes, 4, ViaUsage::Normal).unwrap();
        let indices = vertex_format(ViaType::Ubytes, 4, ViaUsage::BlendIndices).unwrap();
        assert_eq!(classify_vertex_format(color).unwrap(), FormatClass::Unorm);
        assert_eq!(classify_vertex_format(normal).unwrap(), FormatClass::Snorm);
        assert_eq!(classify_vertex_format(indices).unwrap(), FormatClass::Uint);

        let tangent = vertex_format(ViaType::Shorts, 4, ViaUsage::Tangent).unwrap();
        let shorts = vertex_format(ViaType::Shorts, 2, ViaUsage::TexCoord).unwrap();
        assert_eq!(tangent, DxgiFormat::R16G16B16A16_SNORM);
        assert_eq!(shorts, DxgiFormat::R16G16_SINT);
        assert!(vertex_format(ViaType::Halfs, 3, ViaUsage::TexCoord).is_err());
    }

    #[test]
    fn test_tangent_semantics() {
        assert_eq!(semantic(ViaUsage::Tangent, 0), ("TEXCOORD", 14));
        assert_eq!(semantic(ViaUsage::Binormal, 3), ("TEXCOORD", 15));
        assert_eq!(semantic(ViaUsage::TexCoord, 2), ("TEXCOORD", 2));
        assert_eq!(semantic(ViaUsage::BlendWeights, 0), ("BLENDWEIGHT", 0));
    }

    #[test]
    fn test_input_layout_compacts_slots() {
        let desc = GeometryDesc {
            name: "Skinned".to_string(),
            vertex_input_attrs: vec![
                VertexInputAttrDesc::new(0, 0, ViaType::Floats, 3, ViaUsage::Position, 0),
                VertexInputAttrDesc::new(1, 0, ViaType::Shorts, 2, ViaUsage::TexCoord, 0),
                VertexInputAttrDesc::new(2, 0, ViaType::Ubytes, 4, ViaUsage::Color, 0),
            ],
            strides: vec![12, 4, 4],
            ..Default::default()
        };
        let layout = GeometryLayout::parse(&desc).unwrap();
        let elements = input_layout(&layout, 0b101).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].input_slot, 0);
        assert_eq!(elements[1].semantic_name, "COLOR");
        assert_eq!(elements[1].input_slot, 1);
        assert_eq!(input_layout(&layout, ALL_BINDINGS).unwrap().len(), 3);
    }

    #[test]
    fn test_sampler_filters() {
        let shadow = sampler_desc(verus_core::cgi::api::Sampler::Shadow.state().unwrap()).unwrap();
        assert_eq!(shadow.filter, D3DFilter::COMPARISON_MIN_MAG_LINEAR_MIP_POINT);
        assert_eq!(shadow.comparison_func, ComparisonFunc::LESS_EQUAL);
        assert_eq!(shadow.address_u, TextureAddressMode::CLAMP);

        let aniso = sampler_desc(verus_core::cgi::api::Sampler::Aniso.state().unwrap()).unwrap();
        assert_eq!(aniso.filter, D3DFilter::ANISOTROPIC);
        assert_eq!(aniso.max_anisotropy, 16);
        assert_eq!(aniso.address_w, TextureAddressMode::WRAP);
    }

    #[test]
    fn test_scissor_rect_edges() {
        let rects = scissor_rects(&[Rect::new(8.0, 4.0, 100.0, 50.0)]);
        assert_eq!(
            rects[0],
            D3DRect {
                left: 8,
                top: 4,
                right: 108,
                bottom: 54
            }
        );
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(sample_count(4).unwrap(), 4);
        assert!(sample_count(3).is_err());
        assert!(sample_count(64).is_err());
    }
}
