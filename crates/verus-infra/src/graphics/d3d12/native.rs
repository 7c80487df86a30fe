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

//! Direct3D 12 native values and the command list stream.
//!
//! Values are those of `d3d12.h`. A [`D3D12Command`] is one call on an
//! `ID3D12GraphicsCommandList`; command buffers append them and the device
//! executes the list when it is submitted.

use super::descriptor_heap::D3D12DescriptorHeapType;
use crate::graphics::d3d_common::{
    D3DPrimitiveTopology, D3DRect, DxgiFormat, SamplerDesc, ToD3D, Viewport,
};
use crate::graphics::native::native_enum;
use verus_core::cgi::api::{BufferId, ImageLayout, PipelineId, PrimitiveTopology, TextureId, ViewId};
use verus_core::cgi::error::Result;

verus_core::verus_bitflags! {
    /// `D3D12_RESOURCE_STATES`. `COMMON` and `PRESENT` are the empty set.
    pub struct D3D12ResourceStates: u32 {
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
    }
}

impl D3D12ResourceStates {
    /// `D3D12_RESOURCE_STATE_COMMON`.
    pub const COMMON: Self = Self::empty();
    /// `D3D12_RESOURCE_STATE_PRESENT`.
    pub const PRESENT: Self = Self::empty();
    /// Readable from every shader stage.
    pub const ALL_SHADER_RESOURCE: Self =
        Self::NON_PIXEL_SHADER_RESOURCE.union(Self::PIXEL_SHADER_RESOURCE);
    /// Required state of upload heap resources.
    pub const GENERIC_READ: Self = Self::VERTEX_AND_CONSTANT_BUFFER
        .union(Self::INDEX_BUFFER)
        .union(Self::ALL_SHADER_RESOURCE)
        .union(Self::INDIRECT_ARGUMENT)
        .union(Self::COPY_SOURCE);

    /// The image layout a texture is tracked in after a transition to `self`.
    pub fn tracked_layout(self) -> ImageLayout {
        if self.contains(Self::RENDER_TARGET) {
            ImageLayout::ColorAttachment
        } else if self.contains(Self::DEPTH_WRITE) {
            ImageLayout::DepthStencilAttachment
        } else if self.contains(Self::DEPTH_READ) {
            ImageLayout::DepthStencilReadOnly
        } else if self.intersects(Self::ALL_SHADER_RESOURCE) {
            ImageLayout::ShaderReadOnly
        } else if self.contains(Self::COPY_SOURCE) {
            ImageLayout::TransferSrc
        } else if self.contains(Self::COPY_DEST) {
            ImageLayout::TransferDst
        } else {
            ImageLayout::General
        }
    }
}

impl ToD3D<D3D12ResourceStates> for ImageLayout {
    fn to_d3d(self) -> Result<D3D12ResourceStates> {
        Ok(match self {
            ImageLayout::Undefined | ImageLayout::General => D3D12ResourceStates::COMMON,
            ImageLayout::ColorAttachment => D3D12ResourceStates::RENDER_TARGET,
            ImageLayout::DepthStencilAttachment => D3D12ResourceStates::DEPTH_WRITE,
            ImageLayout::DepthStencilReadOnly => D3D12ResourceStates::DEPTH_READ,
            ImageLayout::ShaderReadOnly => D3D12ResourceStates::ALL_SHADER_RESOURCE,
            ImageLayout::TransferSrc => D3D12ResourceStates::COPY_SOURCE,
            ImageLayout::TransferDst => D3D12ResourceStates::COPY_DEST,
            ImageLayout::PresentSrc => D3D12ResourceStates::PRESENT,
        })
    }
}

native_enum! {
    /// `D3D12_PRIMITIVE_TOPOLOGY_TYPE`.
    pub struct D3D12PrimitiveTopologyType(u32) {
        const UNDEFINED = 0;
        const POINT = 1;
        const LINE = 2;
        const TRIANGLE = 3;
        const PATCH = 4;
    }
}

impl ToD3D<D3D12PrimitiveTopologyType> for PrimitiveTopology {
    fn to_d3d(self) -> Result<D3D12PrimitiveTopologyType> {
        Ok(match self {
            PrimitiveTopology::PointList => D3D12PrimitiveTopologyType::POINT,
            PrimitiveTopology::LineList | PrimitiveTopology::LineStrip => D3D12PrimitiveTopologyType::LINE,
            PrimitiveTopology::TriangleList | PrimitiveTopology::TriangleStrip => {
                D3D12PrimitiveTopologyType::TRIANGLE
            }
            PrimitiveTopology::PatchList3 | PrimitiveTopology::PatchList4 => D3D12PrimitiveTopologyType::PATCH,
        })
    }
}

native_enum! {
    /// `D3D12_HEAP_TYPE`.
    pub struct D3D12HeapType(u32) {
        const DEFAULT = 1;
        const UPLOAD = 2;
        const READBACK = 3;
    }
}

native_enum! {
    /// `D3D12_SHADER_VISIBILITY`.
    pub struct D3D12ShaderVisibility(u32) {
        const ALL = 0;
        const VERTEX = 1;
        const HULL = 2;
        const DOMAIN = 3;
        const GEOMETRY = 4;
        const PIXEL = 5;
    }
}

native_enum! {
    /// `D3D12_DESCRIPTOR_RANGE_TYPE`.
    pub struct D3D12DescriptorRangeType(u32) {
        const SRV = 0;
        const UAV = 1;
        const CBV = 2;
        const SAMPLER = 3;
    }
}

verus_core::verus_bitflags! {
    /// `D3D12_CLEAR_FLAGS`.
    pub struct D3D12ClearFlags: u32 {
        const DEPTH = 0x1;
        const STENCIL = 0x2;
    }
}

/// `D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES`.
pub const ALL_SUBRESOURCES: u32 = 0xffff_ffff;

/// `D3D12CalcSubresource` for single-plane formats.
pub const fn calc_subresource(mip: u32, layer: u32, mip_levels: u32) -> u32 {
    mip + layer * mip_levels
}

/// A resource a barrier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum D3D12Resource {
    /// A committed buffer.
    Buffer(BufferId),
    /// A committed texture.
    Texture(TextureId),
}

/// `D3D12_RESOURCE_TRANSITION_BARRIER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionBarrier {
    /// Transitioned resource.
    pub resource: D3D12Resource,
    /// Subresource index, or [`ALL_SUBRESOURCES`].
    pub subresource: u32,
    /// State before the barrier.
    pub before: D3D12ResourceStates,
    /// State after the barrier.
    pub after: D3D12ResourceStates,
}

/// `D3D12_DESCRIPTOR_RANGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    /// Kind of descriptor in the range.
    pub range_type: D3D12DescriptorRangeType,
    /// Descriptors in the range.
    pub num_descriptors: u32,
    /// Register of the first descriptor.
    pub base_shader_register: u32,
    /// Register space, the descriptor set index.
    pub register_space: u32,
}

/// `D3D12_ROOT_PARAMETER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootParameter {
    /// Root constants read from the signature itself.
    Constants {
        /// `b` register.
        shader_register: u32,
        /// Size in 32-bit values.
        num_32bit_values: u32,
        /// Stages that see the constants.
        visibility: D3D12ShaderVisibility,
    },
    /// Root constant buffer view.
    Cbv {
        /// `b` register.
        shader_register: u32,
        /// Stages that see the buffer.
        visibility: D3D12ShaderVisibility,
    },
    /// Table of descriptors in a shader-visible heap.
    DescriptorTable {
        /// Ranges of the table, in heap order.
        ranges: Vec<DescriptorRange>,
        /// Stages that see the table.
        visibility: D3D12ShaderVisibility,
    },
}

/// `D3D12_STATIC_SAMPLER_DESC`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticSampler {
    /// Filtering and addressing.
    pub desc: SamplerDesc,
    /// `s` register.
    pub shader_register: u32,
    /// Stages that see the sampler.
    pub visibility: D3D12ShaderVisibility,
}

/// `D3D12_ROOT_SIGNATURE_DESC`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RootSignatureDesc {
    /// Root parameters, one or more per descriptor set.
    pub parameters: Vec<RootParameter>,
    /// Samplers baked into the signature.
    pub static_samplers: Vec<StaticSampler>,
}

/// `D3D12_VERTEX_BUFFER_VIEW`, with the buffer and offset kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferView {
    /// Viewed buffer.
    pub buffer: BufferId,
    /// Byte offset of the view.
    pub offset: u64,
    /// Bytes visible through the view.
    pub size_in_bytes: u32,
    /// Vertex stride.
    pub stride_in_bytes: u32,
}

/// `D3D12_INDEX_BUFFER_VIEW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferView {
    /// Viewed buffer.
    pub buffer: BufferId,
    /// Byte offset of the view.
    pub offset: u64,
    /// Bytes visible through the view.
    pub size_in_bytes: u32,
    /// `R16_UINT` or `R32_UINT`.
    pub format: DxgiFormat,
}

/// One call on a graphics command list.
///
/// Root signature calls carry `compute` to select between the
/// `SetGraphicsRoot*` and `SetComputeRoot*` entry points.
#[derive(Debug, Clone, PartialEq)]
pub enum D3D12Command {
    /// `ResourceBarrier` with transition barriers.
    ResourceBarrier(Vec<TransitionBarrier>),
    /// `CopyBufferRegion`.
    CopyBufferRegion {
        /// Destination buffer.
        dst: BufferId,
        /// Byte offset in the destination.
        dst_offset: u64,
        /// Source buffer, usually in the upload heap.
        src: BufferId,
        /// Byte offset in the source.
        src_offset: u64,
        /// Bytes copied.
        num_bytes: u64,
    },
    /// `SetPipelineState`.
    SetPipelineState(PipelineId),
    /// `Set*RootSignature` with the signature of a pipeline.
    SetRootSignature {
        /// Compute entry point.
        compute: bool,
        /// Pipeline owning the signature.
        root_signature: PipelineId,
    },
    /// `SetDescriptorHeaps`.
    SetDescriptorHeaps(Vec<D3D12DescriptorHeapType>),
    /// `Set*RootConstantBufferView`.
    SetRootConstantBufferView {
        /// Compute entry point.
        compute: bool,
        /// Root parameter index.
        root_parameter: u32,
        /// Constant buffer.
        buffer: BufferId,
        /// Byte offset of the bound range.
        offset: u64,
    },
    /// `Set*RootDescriptorTable`.
    SetRootDescriptorTable {
        /// Compute entry point.
        compute: bool,
        /// Root parameter index.
        root_parameter: u32,
        /// Heap index of the first descriptor.
        base_descriptor: u64,
    },
    /// `Set*Root32BitConstants`.
    SetRoot32BitConstants {
        /// Compute entry point.
        compute: bool,
        /// Root parameter index.
        root_parameter: u32,
        /// Constant values.
        values: Vec<u32>,
        /// First 32-bit value written.
        dest_offset: u32,
    },
    /// `IASetPrimitiveTopology`.
    IaSetPrimitiveTopology(D3DPrimitiveTopology),
    /// `IASetVertexBuffers`.
    IaSetVertexBuffers {
        /// First input slot.
        start_slot: u32,
        /// One view per slot.
        views: Vec<VertexBufferView>,
    },
    /// `IASetIndexBuffer`.
    IaSetIndexBuffer(IndexBufferView),
    /// `RSSetViewports`.
    RsSetViewports(Vec<Viewport>),
    /// `RSSetScissorRects`.
    RsSetScissorRects(Vec<D3DRect>),
    /// `OMSetBlendFactor`.
    OmSetBlendFactor([f32; 4]),
    /// `OMSetStencilRef`.
    OmSetStencilRef(u32),
    /// `OMSetRenderTargets`.
    OmSetRenderTargets {
        /// Color views, in attachment order.
        render_targets: Vec<ViewId>,
        /// Depth stencil view, if any.
        depth_stencil: Option<ViewId>,
    },
    /// `ClearRenderTargetView`.
    ClearRenderTargetView {
        /// Cleared view.
        view: ViewId,
        /// Clear color.
        color: [f32; 4],
    },
    /// `ClearDepthStencilView`.
    ClearDepthStencilView {
        /// Cleared view.
        view: ViewId,
        /// Aspects cleared.
        flags: D3D12ClearFlags,
        /// Depth clear value.
        depth: f32,
        /// Stencil clear value.
        stencil: u8,
    },
    /// `DrawInstanced`.
    DrawInstanced {
        /// Vertices per instance.
        vertex_count: u32,
        /// Instances drawn.
        instance_count: u32,
        /// First vertex.
        start_vertex: u32,
        /// First instance.
        start_instance: u32,
    },
    /// `DrawIndexedInstanced`.
    DrawIndexedInstanced {
        /// Indices per instance.
        index_count: u32,
        /// Instances drawn.
        instance_count: u32,
        /// First index.
        start_index: u32,
        /// Added to each index.
        base_vertex: i32,
        /// First instance.
        start_instance: u32,
    },
    /// `Dispatch`.
    Dispatch {
        /// Thread groups along X.
        x: u32,
        /// Thread groups along Y.
        y: u32,
        /// Thread groups along Z.
        z: u32,
    },
    /// `DispatchMesh`.
    DispatchMesh {
        /// Thread groups along X.
        x: u32,
        /// Thread groups along Y.
        y: u32,
        /// Thread groups along Z.
        z: u32,
    },
    /// `DispatchRays`.
    DispatchRays {
        /// Rays along X.
        width: u32,
        /// Rays along Y.
        height: u32,
        /// Rays along Z.
        depth: u32,
    },
}

impl D3D12Command {
    /// Name of the command list method.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResourceBarrier(_) => "ResourceBarrier",
            Self::CopyBufferRegion { .. } => "CopyBufferRegion",
            Self::SetPipelineState(_) => "SetPipelineState",
            Self::SetRootSignature { compute: false, .. } => "SetGraphicsRootSignature",
            Self::SetRootSignature { compute: true, .. } => "SetComputeRootSignature",
            Self::SetDescriptorHeaps(_) => "SetDescriptorHeaps",
            Self::SetRootConstantBufferView { compute: false, .. } => "SetGraphicsRootConstantBufferView",
            Self::SetRootConstantBufferView { compute: true, .. } => "SetComputeRootConstantBufferView",
            Self::SetRootDescriptorTable { compute: false, .. } => "SetGraphicsRootDescriptorTable",
            Self::SetRootDescriptorTable { compute: true, .. } => "SetComputeRootDescriptorTable",
            Self::SetRoot32BitConstants { compute: false, .. } => "SetGraphicsRoot32BitConstants",
            Self::SetRoot32BitConstants { compute: true, .. } => "SetComputeRoot32BitConstants",
            Self::IaSetPrimitiveTopology(_) => "IASetPrimitiveTopology",
            Self::IaSetVertexBuffers { .. } => "IASetVertexBuffers",
            Self::IaSetIndexBuffer(_) => "IASetIndexBuffer",
            Self::RsSetViewports(_) => "RSSetViewports",
            Self::RsSetScissorRects(_) => "RSSetScissorRects",
            Self::OmSetBlendFactor(_) => "OMSetBlendFactor",
            Self::OmSetStencilRef(_) => "OMSetStencilRef",
            Self::OmSetRenderTargets { .. } => "OMSetRenderTargets",
            Self::ClearRenderTargetView { .. } => "ClearRenderTargetView",
            Self::ClearDepthStencilView { .. } => "ClearDepthStencilView",
            Self::DrawInstanced { .. } => "DrawInstanced",
            Self::DrawIndexedInstanced { .. } => "DrawIndexedInstanced",
            Self::Dispatch { .. } => "Dispatch",
            Self::DispatchMesh { .. } => "DispatchMesh",
            Self::DispatchRays { .. } => "DispatchRays",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_map_to_resource_states() {
        assert_eq!(ImageLayout::Undefined.to_d3d().unwrap(), D3D12ResourceStates::COMMON);
        assert_eq!(
            ImageLayout::ShaderReadOnly.to_d3d().unwrap().bits(),
            0x40 | 0x80
        );
        assert_eq!(ImageLayout::TransferDst.to_d3d().unwrap().bits(), 0x400);
        assert_eq!(D3D12ResourceStates::GENERIC_READ.bits(), 0xAC3);
    }

    #[test]
    fn test_tracked_layout_inverts_the_mapping() {
        for layout in [
            ImageLayout::ColorAttachment,
            ImageLayout::DepthStencilAttachment,
            ImageLayout::DepthStencilReadOnly,
            ImageLayout::ShaderReadOnly,
            ImageLayout::TransferSrc,
            ImageLayout::TransferDst,
            ImageLayout::General,
        ] {
            assert_eq!(layout.to_d3d().unwrap().tracked_layout(), layout);
        }
    }

    #[test]
    fn test_command_names() {
        let set = D3D12Command::SetRootSignature {
            compute: true,
            root_signature: PipelineId(0),
        };
        assert_eq!(set.name(), "SetComputeRootSignature");
        assert_eq!(calc_subresource(2, 1, 4), 6);
    }
}
