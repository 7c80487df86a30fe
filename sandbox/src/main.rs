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

// Verus Sandbox
// Draws a spinning cube and a dynamic overlay quad without a window, once per backend.

use std::mem;

use anyhow::Result;
use verus_core::cgi::api::{
    Attachment, AttachmentRef, BackendKind, CSHandle, CgiSettings, Dependency, DescriptorSetDesc, FBHandle,
    Format, FramebufferDesc, GeometryDesc, ImageLayout, PipelineDesc, RPHandle, RenderPassDesc, Sampler,
    ShaderDesc, ShaderStageFlags, Subpass, TextureDesc, VertexInputAttrDesc, ViaType, ViaUsage, ALL_BINDINGS,
};
use verus_core::cgi::dynamic_buffer::DynamicBuffer;
use verus_core::cgi::traits::{CommandBuffer, Geometry, Pipeline, Shader};
use verus_core::RenderContext;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;
const FRAMES: u64 = 8;

const SHADER_SOURCE: &str = r#"
//@main
//@main:Overlay OVERLAY
cbuffer UB_Frame : register(b0) { float4x4 g_matWVP; };
cbuffer UB_Material : register(b1) { float4 g_tint; };
Texture2D g_tex : register(t0);
SamplerState g_sam : register(s0);

float4 mainVS(float3 pos : POSITION, float4 color : COLOR0) : SV_Position { return mul(float4(pos, 1), g_matWVP); }
float4 mainFS() : SV_Target { return g_tint; }
"#;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 4],
}

impl Vertex {
    fn geometry_desc(name: &str) -> GeometryDesc {
        GeometryDesc {
            name: name.to_string(),
            vertex_input_attrs: vec![
                // POSITION
                VertexInputAttrDesc::new(0, 0, ViaType::Floats, 3, ViaUsage::Position, 0),
                // COLOR0
                VertexInputAttrDesc::new(
                    0,
                    mem::size_of::<[f32; 3]>() as i32,
                    ViaType::Floats,
                    4,
                    ViaUsage::Color,
                    0,
                ),
            ],
            strides: vec![mem::size_of::<Vertex>() as u32],
            dynamic_bindings_mask: 0,
            thirty_two_bit_indices: false,
        }
    }
}

fn cube() -> (Vec<Vertex>, Vec<u16>) {
    let vertices = (0..8u32)
        .map(|i| {
            let axis = |bit: u32| if i & bit != 0 { 0.5 } else { -0.5 };
            Vertex {
                position: [axis(1), axis(2), axis(4)],
                color: [axis(1) + 0.5, axis(2) + 0.5, axis(4) + 0.5, 1.0],
            }
        })
        .collect();
    let indices = vec![
        0, 2, 1, 1, 2, 3, 4, 5, 6, 5, 7, 6, 0, 1, 4, 1, 5, 4, 2, 6, 3, 3, 6, 7, 0, 4, 2, 2, 4, 6, 1, 3, 5, 3, 7, 5,
    ];
    (vertices, indices)
}

/// Column-major rotation around Y followed by a fixed pull-back.
fn world_view_projection(angle: f32) -> [f32; 16] {
    let (s, c) = angle.sin_cos();
    [
        c, 0.0, -s, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        s, 0.0, c, 0.0, //
        0.0, 0.0, 2.0, 1.0,
    ]
}

struct SandboxApp {
    render_pass: RPHandle,
    framebuffer: FBHandle,
    cube: Box<dyn Geometry>,
    index_count: u32,
    overlay: DynamicBuffer<Vertex>,
    shader: Box<dyn Shader>,
    material: CSHandle,
    cube_pipeline: Box<dyn Pipeline>,
    overlay_pipeline: Box<dyn Pipeline>,
    cb: Box<dyn CommandBuffer>,
}

impl SandboxApp {
    fn setup(ctx: &RenderContext) -> Result<Self> {
        let render_pass = ctx.create_render_pass(&RenderPassDesc {
            attachments: vec![
                Attachment::new("Color", Format::UnormR8G8B8A8)
                    .load_op_clear()
                    .layout(ImageLayout::Undefined, ImageLayout::ShaderReadOnly),
                Attachment::new("Depth", Format::UnormD24UintS8)
                    .load_op_clear()
                    .layout(ImageLayout::Undefined, ImageLayout::DepthStencilAttachment),
            ],
            subpasses: vec![Subpass::new("Scene")
                .color([AttachmentRef::new("Color", ImageLayout::ColorAttachment)])
                .depth_stencil(AttachmentRef::new("Depth", ImageLayout::DepthStencilAttachment))],
            dependencies: vec![Dependency::new().dst("Scene")],
        })?;
        let color = ctx.create_texture(&TextureDesc::attachment("Color", Format::UnormR8G8B8A8, WIDTH, HEIGHT))?;
        let depth = ctx.create_texture(&TextureDesc::attachment("Depth", Format::UnormD24UintS8, WIDTH, HEIGHT))?;
        let framebuffer = ctx.create_framebuffer(&FramebufferDesc {
            render_pass,
            attachments: vec![color, depth],
            width: WIDTH,
            height: HEIGHT,
            mip_level: 0,
        })?;

        let (vertices, indices) = cube();
        let mut cube = ctx.create_geometry(&Vertex::geometry_desc("Cube"))?;
        cube.create_vertex_buffer(ctx, vertices.len() as u32, 0)?;
        cube.create_index_buffer(ctx, indices.len() as u32)?;
        cube.update_vertices(ctx, &vertices, 0, None)?;
        cube.update_indices(ctx, &indices, None)?;
        let overlay = DynamicBuffer::new(ctx, &Vertex::geometry_desc("Overlay"), 64)?;

        let mut shader = ctx.create_shader(&ShaderDesc::new("Sandbox.hlsl", SHADER_SOURCE))?;
        shader.create_descriptor_set(ctx, DescriptorSetDesc::new(0, 64, 0, [], ShaderStageFlags::VS))?;
        shader.create_descriptor_set(
            ctx,
            DescriptorSetDesc::new(1, 16, 4, [Sampler::Aniso], ShaderStageFlags::VS_FS),
        )?;
        shader.create_pipeline_layout(ctx)?;
        let albedo = ctx.create_texture(&TextureDesc::sampled("Albedo", Format::SrgbR8G8B8A8, 256, 256))?;
        let material = shader.bind_descriptor_set_textures(ctx, 1, &[albedo], None, None)?;

        let cube_pipeline = ctx.create_pipeline(&PipelineDesc::new(cube.as_ref(), shader.as_ref(), "main", render_pass))?;
        let overlay_pipeline = ctx.create_pipeline(
            &PipelineDesc::new(overlay.geometry(), shader.as_ref(), "Overlay", render_pass).disable_depth_test(),
        )?;
        let cb = ctx.create_command_buffer()?;

        Ok(Self {
            render_pass,
            framebuffer,
            cube,
            index_count: indices.len() as u32,
            overlay,
            shader,
            material,
            cube_pipeline,
            overlay_pipeline,
            cb,
        })
    }

    fn render(&mut self, ctx: &mut RenderContext) -> Result<()> {
        ctx.begin_frame()?;
        let frame = ctx.frame_count();
        let cb = self.cb.as_mut();
        cb.begin(ctx)?;
        cb.begin_render_pass(
            ctx,
            self.render_pass,
            self.framebuffer,
            &[[0.05, 0.05, 0.08, 1.0], [1.0, 0.0, 0.0, 0.0]],
        )?;

        self.shader.begin_bind_descriptors(ctx)?;
        cb.bind_pipeline(self.cube_pipeline.as_ref())?;
        cb.bind_vertex_buffers(ctx, self.cube.as_ref(), ALL_BINDINGS)?;
        cb.bind_index_buffer(ctx, self.cube.as_ref())?;
        self.shader.write_uniform(0, &world_view_projection(frame as f32 * 0.25))?;
        cb.bind_descriptors(ctx, self.shader.as_mut(), 0, CSHandle::UNSET)?;
        self.shader.write_uniform(1, &[1.0f32, 1.0, 1.0, 1.0])?;
        if cb.bind_descriptors(ctx, self.shader.as_mut(), 1, self.material)? {
            cb.draw_indexed(self.index_count, 1, 0, 0, 0)?;
        }

        cb.bind_pipeline(self.overlay_pipeline.as_ref())?;
        cb.bind_vertex_buffers(ctx, self.overlay.geometry(), ALL_BINDINGS)?;
        self.shader.write_uniform(0, &world_view_projection(0.0))?;
        cb.bind_descriptors(ctx, self.shader.as_mut(), 0, CSHandle::UNSET)?;
        self.shader.write_uniform(1, &[0.2f32, 0.8, 0.2, 0.5])?;
        if cb.bind_descriptors(ctx, self.shader.as_mut(), 1, self.material)? {
            let corner = |x: f32, y: f32| Vertex {
                position: [x, y, 0.0],
                color: [1.0, 1.0, 1.0, 0.5],
            };
            self.overlay.reset();
            self.overlay.begin();
            self.overlay
                .add_quad(corner(-0.9, 0.9), corner(-0.9, 0.7), corner(-0.5, 0.9), corner(-0.5, 0.7));
            self.overlay.end(ctx, cb)?;
        }
        self.shader.end_bind_descriptors(ctx)?;

        cb.end_render_pass(ctx)?;
        cb.end(ctx)?;
        cb.submit(ctx)?;
        ctx.end_frame()?;
        Ok(())
    }

    fn shutdown(mut self, ctx: &mut RenderContext) -> Result<()> {
        self.shader.free_descriptor_set(ctx, &mut self.material)?;
        self.cb.done(ctx);
        self.overlay_pipeline.done(ctx);
        self.cube_pipeline.done(ctx);
        self.shader.done(ctx);
        self.overlay.done(ctx);
        self.cube.done(ctx);
        ctx.device().delete_framebuffer(self.framebuffer)?;
        ctx.device().delete_render_pass(self.render_pass)?;
        ctx.shutdown()?;
        Ok(())
    }
}

fn settings_from_args() -> Result<Vec<CgiSettings>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            Ok(vec![CgiSettings::from_json_str(&json)?])
        }
        None => Ok([BackendKind::D3D11, BackendKind::D3D12, BackendKind::Vulkan]
            .into_iter()
            .map(CgiSettings::for_backend)
            .collect()),
    }
}

fn run(settings: CgiSettings) -> Result<()> {
    let backend = settings.backend;
    let mut ctx = verus_infra::create_context(settings)?;
    let mut app = SandboxApp::setup(&ctx)?;
    for _ in 0..FRAMES {
        app.render(&mut ctx)?;
    }
    log::info!("{backend}: rendered {FRAMES} frames");
    app.shutdown(&mut ctx)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
    for settings in settings_from_args()? {
        run(settings)?;
    }
    Ok(())
}
