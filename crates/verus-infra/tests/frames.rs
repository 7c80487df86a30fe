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

//! Frame pacing: ring-buffered dynamic data and delayed resource release.

mod common;

use anyhow::Result;
use common::{cube_geometry_desc, scene, stats, Vertex, BACKENDS, CUBE_SOURCE};
use verus_core::cgi::api::{
    BackendKind, CSHandle, DescriptorSetDesc, DeviceResource, Format, PipelineDesc, ShaderDesc,
    ShaderStageFlags, TextureDesc, ALL_BINDINGS,
};
use verus_core::cgi::context::OneTimeSubmit;
use verus_core::cgi::dynamic_buffer::DynamicBuffer;
use verus_core::cgi::traits::CommandBufferState;
use verus_core::CgiError;

fn frame_vertices(frame: u32) -> Vec<Vertex> {
    (0..8)
        .map(|i| Vertex {
            pos: [frame as f32 * 100.0 + i as f32, 1.0, 2.0],
            color: [1.0, 0.0, frame as f32, 1.0],
        })
        .collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

// ─── Ring buffers ──────────────────────────────────────────────────────

#[test]
fn test_dynamic_updates_do_not_overwrite_previous_frames() -> Result<()> {
    for backend in BACKENDS {
        let mut ctx = common::context(backend)?;
        let mut geo = ctx.create_geometry(&cube_geometry_desc(0x1))?;
        geo.create_vertex_buffer(&ctx, 8, 0)?;
        let mut cb = ctx.create_command_buffer()?;

        let depth = ctx.ring_buffer_depth() as u32;
        for frame in 0..depth {
            ctx.begin_frame()?;
            cb.begin(&ctx)?;
            geo.update_vertices(&ctx, &frame_vertices(frame), 0, Some(cb.as_mut()))?;
            cb.end(&ctx)?;
            cb.submit(&ctx)?;
            ctx.end_frame()?;
        }

        let buffer = geo.vertex_buffer(0).expect("vertex buffer");
        let bytes = ctx.device().read_buffer(buffer)?;
        assert!(bytes.len() >= depth as usize * 8 * std::mem::size_of::<Vertex>());
        for frame in 0..depth {
            let expected = frame_vertices(frame);
            assert!(
                contains(&bytes, bytemuck::cast_slice(&expected)),
                "{backend}: data of frame {frame} was overwritten"
            );
        }

        cb.done(&ctx);
        geo.done(&ctx);
        ctx.shutdown()?;
    }
    Ok(())
}

#[test]
fn test_dynamic_buffer_draws_each_batch_once() -> Result<()> {
    let corner = |x: f32, y: f32| Vertex {
        pos: [x, y, 0.0],
        color: [1.0; 4],
    };
    for backend in BACKENDS {
        let mut ctx = common::context(backend)?;
        let scene = scene(&ctx, 64, 64)?;
        let mut batcher = DynamicBuffer::<Vertex>::new(&ctx, &cube_geometry_desc(0), 12)?;
        assert_eq!(batcher.max_verts(), 12);
        let mut shader = ctx.create_shader(&ShaderDesc::new("Cube.hlsl", CUBE_SOURCE).with_branches(["main"]))?;
        shader.create_pipeline_layout(&ctx)?;
        let mut pipeline = ctx.create_pipeline(
            &PipelineDesc::new(batcher.geometry(), shader.as_ref(), "main", scene.render_pass).disable_depth_test(),
        )?;
        let mut cb = ctx.create_command_buffer()?;

        ctx.begin_frame()?;
        cb.begin(&ctx)?;
        cb.begin_render_pass(&ctx, scene.render_pass, scene.framebuffer, &[[0.0; 4], [1.0, 0.0, 0.0, 0.0]])?;
        cb.bind_pipeline(pipeline.as_ref())?;
        cb.bind_vertex_buffers(&ctx, batcher.geometry(), ALL_BINDINGS)?;
        batcher.reset();
        batcher.begin();
        assert!(batcher.add_quad(corner(0.0, 0.0), corner(0.0, 1.0), corner(1.0, 0.0), corner(1.0, 1.0)));
        assert!(batcher.add_quad(corner(2.0, 0.0), corner(2.0, 1.0), corner(3.0, 0.0), corner(3.0, 1.0)));
        assert!(!batcher.add(corner(9.0, 9.0)), "{backend}: batcher is full");
        batcher.end(&ctx, cb.as_mut())?;
        batcher.begin();
        batcher.end(&ctx, cb.as_mut())?;
        cb.end_render_pass(&ctx)?;
        cb.end(&ctx)?;
        cb.submit(&ctx)?;
        ctx.end_frame()?;

        assert_eq!(batcher.vert_count(), 12);
        assert_eq!(stats(&ctx).draw_calls, 1, "{backend}: empty batches record nothing");

        cb.done(&ctx);
        pipeline.done(&ctx);
        shader.done(&ctx);
        batcher.done(&ctx);
        ctx.shutdown()?;
    }
    Ok(())
}

#[test]
fn test_zero_capacity_uniform_set_holds_one_update_per_frame() -> Result<()> {
    for backend in BACKENDS {
        let mut ctx = common::context(backend)?;
        let scene = scene(&ctx, 64, 64)?;
        let mut geo = common::cube_geometry(&ctx)?;
        let mut shader = ctx.create_shader(&ShaderDesc::new("Cube.hlsl", CUBE_SOURCE).with_branches(["main"]))?;
        // Too large for push constants.
        shader.create_descriptor_set(&ctx, DescriptorSetDesc::new(0, 256, 0, [], ShaderStageFlags::VS))?;
        shader.create_pipeline_layout(&ctx)?;
        let mut pipeline = ctx.create_pipeline(&PipelineDesc::new(
            geo.as_ref(),
            shader.as_ref(),
            "main",
            scene.render_pass,
        ))?;
        let mut cb = ctx.create_command_buffer()?;

        for frame in 0..2 {
            ctx.begin_frame()?;
            cb.begin(&ctx)?;
            cb.begin_render_pass(&ctx, scene.render_pass, scene.framebuffer, &[[0.0; 4], [1.0, 0.0, 0.0, 0.0]])?;
            cb.bind_pipeline(pipeline.as_ref())?;
            shader.write_uniform(0, &[0.5f32; 64])?;
            assert!(cb.bind_descriptors(&ctx, shader.as_mut(), 0, CSHandle::UNSET)?, "{backend}: frame {frame}");
            let second = cb.bind_descriptors(&ctx, shader.as_mut(), 0, CSHandle::UNSET);
            match backend {
                BackendKind::D3D11 => assert!(second?, "D3D11 rewrites the buffer with WRITE_DISCARD"),
                _ => assert!(
                    matches!(second, Err(CgiError::ResourceExhausted { capacity: 1, .. })),
                    "{backend}: second update in frame {frame}"
                ),
            }
            cb.end_render_pass(&ctx)?;
            cb.end(&ctx)?;
            cb.submit(&ctx)?;
            ctx.end_frame()?;
        }

        cb.done(&ctx);
        pipeline.done(&ctx);
        shader.done(&ctx);
        geo.done(&ctx);
        ctx.shutdown()?;
    }
    Ok(())
}

// ─── Retirement ────────────────────────────────────────────────────────

#[test]
fn test_retired_texture_survives_ring_depth_frames() -> Result<()> {
    for backend in BACKENDS {
        let mut ctx = common::context(backend)?;
        let texture = ctx.create_texture(&TextureDesc::sampled("Old", Format::UnormR8G8B8A8, 8, 8))?;
        let live = stats(&ctx).live_textures;

        ctx.retire(DeviceResource::Texture(texture), 1);
        assert_eq!(ctx.pending_retirements(), 1);
        let frames = ctx.ring_buffer_depth() + 1;
        for _ in 0..frames {
            ctx.begin_frame()?;
            assert_eq!(stats(&ctx).live_textures, live, "{backend}: released too early");
            ctx.end_frame()?;
        }
        ctx.begin_frame()?;
        assert_eq!(ctx.pending_retirements(), 0);
        assert_eq!(stats(&ctx).live_textures, live - 1, "{backend}");
        ctx.end_frame()?;
        ctx.shutdown()?;
    }
    Ok(())
}

#[test]
fn test_shutdown_releases_everything_pending() -> Result<()> {
    for backend in BACKENDS {
        let mut ctx = common::context(backend)?;
        let mut geo = common::cube_geometry(&ctx)?;
        geo.done(&ctx);
        assert!(ctx.pending_retirements() >= 2, "{backend}: vertex and index buffers");
        ctx.shutdown()?;
        assert_eq!(ctx.pending_retirements(), 0);
        assert_eq!(stats(&ctx).live_buffers, 0, "{backend}");
    }
    Ok(())
}

// ─── One-time submissions ──────────────────────────────────────────────

#[test]
fn test_one_time_submit_outside_a_frame() -> Result<()> {
    for backend in BACKENDS {
        let ctx = common::context(backend)?;
        assert!(!ctx.is_in_frame());
        let mut ots = OneTimeSubmit::begin(&ctx)?;
        assert_eq!(ots.command_buffer()?.state(), CommandBufferState::Recording);
        ots.finish()?;
        assert!(stats(&ctx).submissions >= 1, "{backend}");
    }
    Ok(())
}
