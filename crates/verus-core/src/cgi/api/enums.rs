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

//! Engine-level enumerations every backend maps to its native vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The graphics API a [`RenderContext`](crate::cgi::context::RenderContext) drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// Direct3D 11: immediate-context state machine.
    D3D11,
    /// Direct3D 12: command lists, root signatures, descriptor heaps.
    D3D12,
    /// Vulkan: command buffers, descriptor set layouts and pools.
    #[default]
    Vulkan,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::D3D11 => "Direct3D 11",
            BackendKind::D3D12 => "Direct3D 12",
            BackendKind::Vulkan => "Vulkan",
        };
        f.write_str(name)
    }
}

/// Pixel formats of textures and render targets.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    UnormB4G4R4A4,
    UnormB5G6R5,
    UnormR10G10B10A2,
    SintR16,
    UnormR8,
    UnormR8G8,
    #[default]
    UnormR8G8B8A8,
    UnormB8G8R8A8,
    SrgbR8G8B8A8,
    SrgbB8G8R8A8,
    FloatR16,
    FloatR16G16,
    FloatR16G16B16A16,
    FloatR32,
    FloatR32G32,
    FloatR32G32B32A32,
    UnormD16,
    UnormD24UintS8,
    FloatD32,
    UnormBc1,
    UnormBc2,
    UnormBc3,
    SrgbBc1,
    SrgbBc2,
    SrgbBc3,
}

impl Format {
    /// Every format, in declaration order.
    pub const ALL: [Format; 25] = [
        Format::UnormB4G4R4A4,
        Format::UnormB5G6R5,
        Format::UnormR10G10B10A2,
        Format::SintR16,
        Format::UnormR8,
        Format::UnormR8G8,
        Format::UnormR8G8B8A8,
        Format::UnormB8G8R8A8,
        Format::SrgbR8G8B8A8,
        Format::SrgbB8G8R8A8,
        Format::FloatR16,
        Format::FloatR16G16,
        Format::FloatR16G16B16A16,
        Format::FloatR32,
        Format::FloatR32G32,
        Format::FloatR32G32B32A32,
        Format::UnormD16,
        Format::UnormD24UintS8,
        Format::FloatD32,
        Format::UnormBc1,
        Format::UnormBc2,
        Format::UnormBc3,
        Format::SrgbBc1,
        Format::SrgbBc2,
        Format::SrgbBc3,
    ];

    /// Returns `true` for depth (and depth-stencil) formats.
    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            Format::UnormD16 | Format::UnormD24UintS8 | Format::FloatD32
        )
    }

    /// Returns `true` if the format carries a stencil aspect.
    pub const fn has_stencil(self) -> bool {
        matches!(self, Format::UnormD24UintS8)
    }

    /// Returns `true` for block-compressed formats.
    pub const fn is_compressed(self) -> bool {
        matches!(
            self,
            Format::UnormBc1
                | Format::UnormBc2
                | Format::UnormBc3
                | Format::SrgbBc1
                | Format::SrgbBc2
                | Format::SrgbBc3
        )
    }
}

/// Comparison function used by depth, stencil and shadow samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    /// Never passes.
    Never,
    /// Passes if the new value is less than the stored one.
    Less,
    /// Passes if the values are equal.
    Equal,
    /// Passes if the new value is less than or equal to the stored one.
    #[default]
    LessOrEqual,
    /// Passes if the new value is greater than the stored one.
    Greater,
    /// Passes if the values differ.
    NotEqual,
    /// Passes if the new value is greater than or equal to the stored one.
    GreaterOrEqual,
    /// Always passes.
    Always,
}

/// Which triangle faces are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    #[default]
    Back,
}

/// How polygons are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Filled triangles.
    #[default]
    Fill,
    /// Wireframe.
    Line,
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Individual points.
    PointList,
    /// Pairs of vertices form lines.
    LineList,
    /// Connected line segments.
    LineStrip,
    /// Triples of vertices form triangles.
    #[default]
    TriangleList,
    /// Connected triangles sharing edges.
    TriangleStrip,
    /// Patches with three control points, for tessellation.
    PatchList3,
    /// Patches with four control points, for tessellation.
    PatchList4,
}

/// The access pattern an image is prepared for.
///
/// Direct3D 12 maps these to resource states, Vulkan to image layouts and
/// Direct3D 11 ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents are not preserved; no device access.
    #[default]
    Undefined,
    /// Supports every kind of device access.
    General,
    /// Color or resolve attachment.
    ColorAttachment,
    /// Writable depth/stencil attachment.
    DepthStencilAttachment,
    /// Read-only depth/stencil attachment or shader input.
    DepthStencilReadOnly,
    /// Read-only image in a shader.
    ShaderReadOnly,
    /// Source of a transfer command.
    TransferSrc,
    /// Destination of a transfer command.
    TransferDst,
    /// Presentable swap chain image.
    PresentSrc,
}

/// Component type of a vertex input attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViaType {
    /// 32-bit floats.
    Floats,
    /// 16-bit floats.
    Halfs,
    /// 16-bit signed integers.
    Shorts,
    /// 8-bit unsigned integers.
    Ubytes,
}

/// Semantic usage of a vertex input attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViaUsage {
    /// Object-space position.
    Position,
    /// Skinning weights.
    BlendWeights,
    /// Skinning bone indices.
    BlendIndices,
    /// Surface normal.
    Normal,
    /// Surface tangent.
    Tangent,
    /// Surface binormal.
    Binormal,
    /// Vertex color.
    Color,
    /// Point size.
    PSize,
    /// Texture coordinates (or generic per-vertex data).
    TexCoord,
}

/// The numeric interpretation of a native vertex or texel format.
///
/// Used to check that all backends read the same bytes the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatClass {
    /// IEEE float (16 or 32 bit).
    Float,
    /// Unsigned normalized to `[0, 1]`.
    Unorm,
    /// Signed normalized to `[-1, 1]`.
    Snorm,
    /// Unsigned integer.
    Uint,
    /// Signed integer.
    Sint,
}

/// A factor in a blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// `0`
    Zero,
    /// `1`
    One,
    /// `1 - dst.a`
    InvDstAlpha,
    /// `1 - dst.rgb`
    InvDstColor,
    /// `1 - constant`
    InvBlendFactor,
    /// `1 - src.a`
    InvSrcAlpha,
    /// `1 - src.rgb`
    InvSrcColor,
    /// `dst.a`
    DstAlpha,
    /// `dst.rgb`
    DstColor,
    /// `constant`
    BlendFactor,
    /// `src.a`
    SrcAlpha,
    /// `min(src.a, 1 - dst.a)`
    SrcAlphaSat,
    /// `src.rgb`
    SrcColor,
}

impl BlendFactor {
    /// Returns the factor to use on the alpha channel when only a color
    /// equation was given.
    pub const fn to_alpha(self) -> Self {
        match self {
            BlendFactor::SrcColor => BlendFactor::SrcAlpha,
            BlendFactor::InvSrcColor => BlendFactor::InvSrcAlpha,
            BlendFactor::DstColor => BlendFactor::DstAlpha,
            BlendFactor::InvDstColor => BlendFactor::InvDstAlpha,
            other => other,
        }
    }
}

/// How the weighted source and destination are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    /// `src + dst`
    #[default]
    Add,
    /// `src - dst`
    Subtract,
    /// `dst - src`
    ReverseSubtract,
    /// `min(src, dst)`
    Min,
    /// `max(src, dst)`
    Max,
}

/// What happens to the stencil value when a test resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    /// Keep the stored value.
    #[default]
    Keep,
    /// Set it to zero.
    Zero,
    /// Replace it with the reference value.
    Replace,
    /// Increment, clamping at the maximum.
    IncrementClamp,
    /// Decrement, clamping at zero.
    DecrementClamp,
    /// Bitwise invert.
    Invert,
    /// Increment, wrapping to zero.
    IncrementWrap,
    /// Decrement, wrapping to the maximum.
    DecrementWrap,
}

/// A programmable shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Vertex shader.
    Vs,
    /// Tessellation control (hull) shader.
    Hs,
    /// Tessellation evaluation (domain) shader.
    Ds,
    /// Geometry shader.
    Gs,
    /// Fragment (pixel) shader.
    Fs,
    /// Compute shader.
    Cs,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Stage; 6] = [
        Stage::Vs,
        Stage::Hs,
        Stage::Ds,
        Stage::Gs,
        Stage::Fs,
        Stage::Cs,
    ];

    /// Index into per-stage arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The suffix appended to a branch entry to form the stage entry point.
    pub const fn suffix(self) -> &'static str {
        match self {
            Stage::Vs => "VS",
            Stage::Hs => "HS",
            Stage::Ds => "DS",
            Stage::Gs => "GS",
            Stage::Fs => "FS",
            Stage::Cs => "CS",
        }
    }

    /// The letter selecting this stage in a shader description.
    pub const fn letter(self) -> char {
        match self {
            Stage::Vs => 'V',
            Stage::Hs => 'H',
            Stage::Ds => 'D',
            Stage::Gs => 'G',
            Stage::Fs => 'F',
            Stage::Cs => 'C',
        }
    }

    /// Parses a stage letter.
    pub fn from_letter(letter: char) -> Option<Self> {
        Stage::ALL.into_iter().find(|stage| stage.letter() == letter)
    }

    /// Returns `true` for the tessellation and geometry stages, whose entry
    /// points may be legitimately absent.
    pub const fn is_optional(self) -> bool {
        matches!(self, Stage::Hs | Stage::Ds | Stage::Gs)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}
