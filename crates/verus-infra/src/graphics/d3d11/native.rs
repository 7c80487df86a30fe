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

//! Direct3D 11 native values and the immediate-context call log.
//!
//! Values are those of `d3d11.h`. A [`D3D11Call`] is one call on the
//! immediate context; the device executes it as soon as it is issued.

use crate::graphics::d3d_common::{
    D3DPrimitiveTopology, D3DRect, DepthStencilDesc, DxgiFormat, RasterizerDesc,
    RenderTargetBlendDesc, Viewport,
};
use crate::graphics::native::native_enum;
use verus_core::cgi::api::{BufferId, PipelineId, SamplerId, Stage, ViewId};

native_enum! {
    /// `D3D11_MAP`.
    pub struct D3D11Map(u32) {
        const READ = 1;
        const WRITE = 2;
        const READ_WRITE = 3;
        const WRITE_DISCARD = 4;
        const WRITE_NO_OVERWRITE = 5;
    }
}

native_enum! {
    /// `D3D11_USAGE`.
    pub struct D3D11Usage(u32) {
        const DEFAULT = 0;
        const IMMUTABLE = 1;
        const DYNAMIC = 2;
        const STAGING = 3;
    }
}

verus_core::verus_bitflags! {
    /// `D3D11_BIND_FLAG`.
    pub struct D3D11BindFlags: u32 {
        const VERTEX_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const CONSTANT_BUFFER = 0x4;
        const SHADER_RESOURCE = 0x8;
        const RENDER_TARGET = 0x20;
        const DEPTH_STENCIL = 0x40;
        const UNORDERED_ACCESS = 0x80;
    }
}

verus_core::verus_bitflags! {
    /// `D3D11_CLEAR_FLAG`.
    pub struct D3D11ClearFlags: u32 {
        const DEPTH = 0x1;
        const STENCIL = 0x2;
    }
}

/// One call on the immediate context.
#[derive(Debug, Clone, PartialEq)]
pub enum D3D11Call {
    /// `UpdateSubresource` of a default-usage buffer.
    UpdateSubresource {
        /// Destination buffer.
        buffer: BufferId,
        /// Byte offset of the copy in the buffer.
        dst_offset: usize,
        /// Bytes copied.
        data: Vec<u8>,
    },
    /// `Map`, `memcpy` at `offset`, `Unmap`.
    Map {
        /// Mapped buffer.
        buffer: BufferId,
        /// Discard or no-overwrite.
        map_type: D3D11Map,
        /// Byte offset of the copy in the mapping.
        offset: usize,
        /// Bytes copied.
        data: Vec<u8>,
    },
    /// `IASetVertexBuffers`.
    IaSetVertexBuffers {
        /// First input slot.
        start_slot: u32,
        /// One buffer per slot.
        buffers: Vec<BufferId>,
        /// Vertex stride of each buffer, in bytes.
        strides: Vec<u32>,
        /// Byte offset into each buffer.
        offsets: Vec<u32>,
    },
    /// `IASetIndexBuffer`.
    IaSetIndexBuffer {
        /// Index buffer.
        buffer: BufferId,
        /// `R16_UINT` or `R32_UINT`.
        format: DxgiFormat,
        /// Byte offset of the first index.
        offset: u32,
    },
    /// `IASetInputLayout` with the layout of a pipeline.
    IaSetInputLayout(PipelineId),
    /// `IASetPrimitiveTopology`.
    IaSetPrimitiveTopology(D3DPrimitiveTopology),
    /// `VSSetShader`, `PSSetShader`, ... with the stage's shader of a pipeline,
    /// `None` to unbind the stage.
    SetShader {
        /// Pipeline stage.
        stage: Stage,
        /// Pipeline holding the shader.
        pipeline: Option<PipelineId>,
    },
    /// `RSSetState`.
    RsSetState(RasterizerDesc),
    /// `OMSetBlendState`.
    OmSetBlendState {
        /// One entry per render target.
        blend: Vec<RenderTargetBlendDesc>,
        /// Constant blend color.
        blend_factor: [f32; 4],
        /// Coverage mask.
        sample_mask: u32,
    },
    /// `OMSetDepthStencilState`.
    OmSetDepthStencilState {
        /// Depth and stencil tests.
        desc: DepthStencilDesc,
        /// Stencil reference value.
        stencil_ref: u32,
    },
    /// `RSSetViewports`.
    RsSetViewports(Vec<Viewport>),
    /// `RSSetScissorRects`.
    RsSetScissorRects(Vec<D3DRect>),
    /// `*SetConstantBuffers1`; offsets are in 16-byte constants.
    SetConstantBuffers {
        /// Pipeline stage.
        stage: Stage,
        /// Constant buffer slot.
        slot: u32,
        /// Bound buffer.
        buffer: BufferId,
        /// First constant of the range.
        first_constant: u32,
        /// Constants in the range.
        num_constants: u32,
    },
    /// `*SetShaderResources`.
    SetShaderResources {
        /// Pipeline stage.
        stage: Stage,
        /// First texture slot.
        start_slot: u32,
        /// One view per slot.
        views: Vec<ViewId>,
    },
    /// `*SetSamplers`.
    SetSamplers {
        /// Pipeline stage.
        stage: Stage,
        /// First sampler slot.
        start_slot: u32,
        /// One sampler per slot.
        samplers: Vec<SamplerId>,
    },
    /// `CSSetUnorderedAccessViews`. Null entries unbind the slot.
    CsSetUnorderedAccessViews {
        /// First UAV slot.
        start_slot: u32,
        /// One view per slot.
        views: Vec<Option<ViewId>>,
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
        flags: D3D11ClearFlags,
        /// Depth clear value.
        depth: f32,
        /// Stencil clear value.
        stencil: u8,
    },
    /// `OMSetRenderTargets`.
    OmSetRenderTargets {
        /// Color views, in attachment order.
        render_targets: Vec<ViewId>,
        /// Depth stencil view, if any.
        depth_stencil: Option<ViewId>,
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
}

impl D3D11Call {
    /// Name of the native method.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateSubresource { .. } => "UpdateSubresource",
            Self::Map { .. } => "Map",
            Self::IaSetVertexBuffers { .. } => "IASetVertexBuffers",
            Self::IaSetIndexBuffer { .. } => "IASetIndexBuffer",
            Self::IaSetInputLayout(_) => "IASetInputLayout",
            Self::IaSetPrimitiveTopology(_) => "IASetPrimitiveTopology",
            Self::SetShader { .. } => "SetShader",
            Self::RsSetState(_) => "RSSetState",
            Self::OmSetBlendState { .. } => "OMSetBlendState",
            Self::OmSetDepthStencilState { .. } => "OMSetDepthStencilState",
            Self::RsSetViewports(_) => "RSSetViewports",
            Self::RsSetScissorRects(_) => "RSSetScissorRects",
            Self::SetConstantBuffers { .. } => "SetConstantBuffers1",
            Self::SetShaderResources { .. } => "SetShaderResources",
            Self::SetSamplers { .. } => "SetSamplers",
            Self::CsSetUnorderedAccessViews { .. } => "CSSetUnorderedAccessViews",
            Self::ClearRenderTargetView { .. } => "ClearRenderTargetView",
            Self::ClearDepthStencilView { .. } => "ClearDepthStencilView",
            Self::OmSetRenderTargets { .. } => "OMSetRenderTargets",
            Self::DrawInstanced { .. } => "DrawInstanced",
            Self::DrawIndexedInstanced { .. } => "DrawIndexedInstanced",
            Self::Dispatch { .. } => "Dispatch",
        }
    }
}
