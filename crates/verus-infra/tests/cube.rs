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

//! Draws an indexed cube for a few frames on every backend.

mod common;

use anyhow::Result;
use common::{cube_geometry, cube_indices, scene, stats, BACKENDS, CUBE_SOURCE};
use verus_core::cgi::api::{
    BackendKind, CSHandle, DescriptorSetDesc, Format, ImageLayout, PipelineDesc, Sampler, ShaderDesc,
    ShaderStageFlags, TextureDesc, ALL_BINDINGS,
};
use verus_core::cgi::traits::{CommandBuffer, Geometry, Pipeline, Shader};
use verus_core::RenderContext;
use verus_infra::graphics::d3d12::D3D12Device;
use verus_infra::graphics::vulkan::VulkanDevice;

const FRAMES: u64 = 4;
const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

struct CubeRenderer {
    geometry: Box<dyn Geometry>,
    shader: Box<dyn Shader>,
    pipeline: Box<dyn Pipeline>,
    cb: Box<dyn CommandBuffer>,
    complex_set: CSHandle,
    scene: common::Scene,
}

impl CubeRenderer {
    fn new(ctx: &RenderContext) -> Result<Self> {
        let scene = scene(ctx, 320, 240)?;
        let geometry = cube_geometry(ctx)?;
        let mut shader = ctx.create_shader(&ShaderDesc::new("Cube.hlsl", CUBE_SOURCE).with_branches(["main"]))?;
        shader.create_descriptor_set(ctx, DescriptorSetDesc::new(0, 64, 0, [], ShaderStageFlags::VS))?;
        shader.create_descriptor_set(
            ctx,
            DescriptorSetDesc::new(1, 16, 4, [Sampler::Aniso], ShaderStageFlags::VS_FS),
        )?;
        shader.create_pipeline_layout(ctx)?;

        let albedo = ctx.create_texture(&TextureDesc::sampled("Albedo", Format::UnormR8G8B8A8, 4, 4))?;
        let complex_set = shader.bind_descriptor_set_textures(ctx, 1, &[albedo], None, None)?;
        let pipeline = ctx.create_pipeline(&PipelineDesc::new(
            geometry.as_ref(),
            shader.as_ref(),
            "main",
            scene.render_pass,
        ))?;
        let cb = ctx.create_command_buffer()?;
        Ok(Self {
            geometry,
            shader,
            pipeline,
            cb,
            complex_set,
            scene,
        })
    }

    /// Records and submits one frame; returns what binding the complex set reported.
    fn frame(&mut self, ctx: &mut RenderContext, complex_set: CSHandle) -> Result<bool> {
        ctx.begin_frame()?;
        let cb = self.cb.as_mut();
        cb.begin(ctx)?;
        cb.begin_render_pass(
            ctx,
            self.scene.render_pass,
            self.scene.framebuffer,
            &[[0.1, 0.1, 0.1, 1.0], [1.0, 0.0, 0.0, 0.0]],
        )?;
        cb.bind_pipeline(self.pipeline.as_ref())?;
        cb.bind_vertex_buffers(ctx, self.geometry.as_ref(), ALL_BINDINGS)?;
        cb.bind_index_buffer(ctx, self.geometry.as_ref())?;

        self.shader.begin_bind_descriptors(ctx)?;
        self.shader.write_uniform(0, &IDENTITY)?;
        assert!(cb.bind_descriptors(ctx, self.shader.as_mut(), 0, CSHandle::UNSET)?);
        self.shader.write_uniform(1, &[1.0f32, 0.5, 0.25, 1.0])?;
        let bound = cb.bind_descriptors(ctx, self.shader.as_mut(), 1, complex_set)?;
        self.shader.end_bind_descriptors(ctx)?;

        if bound {
            cb.draw_indexed(cube_indices().len() as u32, 1, 0, 0, 0)?;
        }
        cb.end_render_pass(ctx)?;
        cb.end(ctx)?;
        cb.submit(ctx)?;
        ctx.end_frame()?;
        Ok(bound)
    }

    fn done(mut self, ctx: &RenderContext) {
        self.cb.done(ctx);
        self.pipeline.done(ctx);
        self.shader.done(ctx);
        self.geometry.done(ctx);
    }
}

fn render_cube(backend: BackendKind) -> Result<()> {
    let mut ctx = common::context(backend)?;
    let mut renderer = CubeRenderer::new(&ctx)?;
    assert_eq!(renderer.shader.descriptor_set_count(), 2);
    assert_eq!(renderer.shader.descriptor_set_desc(1)?.capacity, 4);
    assert!(renderer.shader.descriptor_set_desc(2).is_err());
    let complex_set = renderer.complex_set;
    for _ in 0..FRAMES {
        assert!(renderer.frame(&mut ctx, complex_set)?);
    }
    let after_frames = stats(&ctx);
    assert_eq!(after_frames.draw_calls, FRAMES, "{backend}");
    assert!(after_frames.submissions >= FRAMES, "{backend}");

    let mut handle = complex_set;
    renderer.shader.free_descriptor_set(&ctx, &mut handle)?;
    assert!(!handle.is_set());
    assert!(!renderer.frame(&mut ctx, complex_set)?, "{backend}: freed set must not bind");
    assert_eq!(stats(&ctx).draw_calls, FRAMES);

    let (render_pass, framebuffer) = (renderer.scene.render_pass, renderer.scene.framebuffer);
    renderer.done(&ctx);
    ctx.device().delete_framebuffer(framebuffer)?;
    ctx.device().delete_render_pass(render_pass)?;
    assert!(ctx.device().render_pass_layout(render_pass).is_err());
    assert!(ctx.device().delete_render_pass(render_pass).is_err(), "{backend}: deleted twice");
    ctx.shutdown()?;
    assert_eq!(ctx.pending_retirements(), 0);
    assert_eq!(stats(&ctx).live_buffers, 0, "{backend}");
    Ok(())
}

#[test]
fn test_cube_renders_on_every_backend() -> Result<()> {
    for backend in BACKENDS {
        render_cube(backend)?;
    }
    Ok(())
}

#[test]
fn test_render_pass_leaves_color_in_final_layout() -> Result<()> {
    for backend in [BackendKind::D3D12, BackendKind::Vulkan] {
        let mut ctx = common::context(backend)?;
        let mut renderer = CubeRenderer::new(&ctx)?;
        let complex_set = renderer.complex_set;
        renderer.frame(&mut ctx, complex_set)?;

        let (color, depth) = (renderer.scene.color, renderer.scene.depth);
        let layouts = match backend {
            BackendKind::D3D12 => {
                let device = ctx.device().as_any().downcast_ref::<D3D12Device>().expect("D3D12 device");
                (device.texture_layout(color, 0, 0)?, device.texture_layout(depth, 0, 0)?)
            }
            _ => {
                let device = ctx.device().as_any().downcast_ref::<VulkanDevice>().expect("Vulkan device");
                (device.texture_layout(color, 0, 0)?, device.texture_layout(depth, 0, 0)?)
            }
        };
        assert_eq!(layouts, (ImageLayout::ShaderReadOnly, ImageLayout::DepthStencilAttachment));
        renderer.done(&ctx);
        ctx.shutdown()?;
    }
    Ok(())
}
