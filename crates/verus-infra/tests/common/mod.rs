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

//! Shared fixtures for the backend integration tests.

#![allow(dead_code)]

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use verus_core::cgi::api::{
    Attachment, AttachmentRef, BackendKind, CgiSettings, Dependency, FBHandle, Format, FramebufferDesc,
    GeometryDesc, ImageLayout, RPHandle, RenderPassDesc, Subpass, TextureDesc, TextureId, VertexInputAttrDesc,
    ViaType, ViaUsage,
};
use verus_core::cgi::traits::Geometry;
use verus_core::RenderContext;
use verus_infra::graphics::d3d11::D3D11Device;
use verus_infra::graphics::d3d12::D3D12Device;
use verus_infra::graphics::vulkan::VulkanDevice;
use verus_infra::graphics::DeviceStats;

pub const BACKENDS: [BackendKind; 3] = [BackendKind::D3D11, BackendKind::D3D12, BackendKind::Vulkan];

pub const CUBE_SOURCE: &str = r#"
cbuffer UB_Frame : register(b0) { float4x4 g_matVP; };
cbuffer UB_Object : register(b1) { float4 g_tint; };
Texture2D g_tex : register(t0);

float4 mainVS(float3 pos : POSITION, float4 color : COLOR0) : SV_Position { return mul(float4(pos, 1), g_matVP); }
float4 mainFS() : SV_Target { return g_tint; }
"#;

pub const COMPUTE_SOURCE: &str = "void mainCS() {}\n";

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 4],
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn context(backend: BackendKind) -> Result<RenderContext> {
    init_logging();
    Ok(verus_infra::create_context(CgiSettings::for_backend(backend))?)
}

/// Counters of whichever device backs `ctx`.
pub fn stats(ctx: &RenderContext) -> DeviceStats {
    let any = ctx.device().as_any();
    if let Some(device) = any.downcast_ref::<D3D11Device>() {
        device.stats()
    } else if let Some(device) = any.downcast_ref::<D3D12Device>() {
        device.stats()
    } else if let Some(device) = any.downcast_ref::<VulkanDevice>() {
        device.stats()
    } else {
        panic!("unknown device type")
    }
}

pub fn cube_vertices() -> Vec<Vertex> {
    let mut vertices = Vec::with_capacity(8);
    for i in 0..8u32 {
        let corner = |bit: u32| if i & bit != 0 { 1.0 } else { -1.0 };
        vertices.push(Vertex {
            pos: [corner(1), corner(2), corner(4)],
            color: [corner(1) * 0.5 + 0.5, corner(2) * 0.5 + 0.5, corner(4) * 0.5 + 0.5, 1.0],
        });
    }
    vertices
}

pub fn cube_indices() -> Vec<u16> {
    vec![
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ]
}

pub fn cube_geometry_desc(dynamic_bindings_mask: u32) -> GeometryDesc {
    GeometryDesc {
        name: "Cube".into(),
        vertex_input_attrs: vec![
            VertexInputAttrDesc::new(0, 0, ViaType::Floats, 3, ViaUsage::Position, 0),
            VertexInputAttrDesc::new(0, 12, ViaType::Floats, 4, ViaUsage::Color, 0),
        ],
        strides: vec![std::mem::size_of::<Vertex>() as u32],
        dynamic_bindings_mask,
        thirty_two_bit_indices: false,
    }
}

/// A cube with static buffers, uploaded through one-time submissions.
pub fn cube_geometry(ctx: &RenderContext) -> Result<Box<dyn Geometry>> {
    let mut geo = ctx.create_geometry(&cube_geometry_desc(0))?;
    let vertices = cube_vertices();
    let indices = cube_indices();
    geo.create_vertex_buffer(ctx, vertices.len() as u32, 0)?;
    geo.create_index_buffer(ctx, indices.len() as u32)?;
    geo.update_vertices(ctx, &vertices, 0, None)?;
    geo.update_indices(ctx, &indices, None)?;
    Ok(geo)
}

pub struct Scene {
    pub render_pass: RPHandle,
    pub framebuffer: FBHandle,
    pub color: TextureId,
    pub depth: TextureId,
}

/// One color and one depth attachment, cleared on load, color left readable.
pub fn scene(ctx: &RenderContext, width: u32, height: u32) -> Result<Scene> {
    let render_pass = ctx.create_render_pass(&RenderPassDesc {
        attachments: vec![
            Attachment::new("Color", Format::UnormR8G8B8A8)
                .load_op_clear()
                .layout(ImageLayout::Undefined, ImageLayout::ShaderReadOnly),
            Attachment::new("Depth", Format::UnormD24UintS8)
                .load_op_clear()
                .stencil_load_op_clear()
                .layout(ImageLayout::Undefined, ImageLayout::DepthStencilAttachment),
        ],
        subpasses: vec![Subpass::new("Main")
            .color([AttachmentRef::new("Color", ImageLayout::ColorAttachment)])
            .depth_stencil(AttachmentRef::new("Depth", ImageLayout::DepthStencilAttachment))],
        dependencies: vec![Dependency::new().dst("Main")],
    })?;
    let color = ctx.create_texture(&TextureDesc::attachment("Color", Format::UnormR8G8B8A8, width, height))?;
    let depth = ctx.create_texture(&TextureDesc::attachment("Depth", Format::UnormD24UintS8, width, height))?;
    let framebuffer = ctx.create_framebuffer(&FramebufferDesc {
        render_pass,
        attachments: vec![color, depth],
        width,
        height,
        mip_level: 0,
    })?;
    Ok(Scene {
        render_pass,
        framebuffer,
        color,
        depth,
    })
}
