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

//! Command buffer state machine, checked the same way on every backend.

mod common;

use anyhow::Result;
use common::{cube_geometry, scene, stats, BACKENDS, COMPUTE_SOURCE, CUBE_SOURCE};
use verus_core::cgi::api::{
    Attachment, AttachmentRef, Format, FramebufferDesc, ImageLayout, PipelineDesc, RenderPassDesc,
    ShaderDesc, Subpass, TextureDesc,
};
use verus_core::cgi::traits::CommandBufferState;
use verus_core::CgiError;

const CLEAR: [[f32; 4]; 2] = [[0.0; 4], [1.0, 0.0, 0.0, 0.0]];

fn assert_configuration<T>(result: verus_core::cgi::error::Result<T>, what: &str) {
    match result {
        Err(err) => assert!(err.is_configuration(), "{what}: unexpected error {err}"),
        Ok(_) => panic!("{what}: expected a configuration error"),
    }
}

// ─── Recording ─────────────────────────────────────────────────────────

#[test]
fn test_lifecycle_transitions() -> Result<()> {
    for backend in BACKENDS {
        let mut ctx = common::context(backend)?;
        let scene = scene(&ctx, 64, 64)?;
        let mut cb = ctx.create_command_buffer()?;
        assert_eq!(cb.state(), CommandBufferState::Initial);
        assert_configuration(cb.submit(&ctx), "submit before begin");
        assert_configuration(cb.end(&ctx), "end before begin");

        ctx.begin_frame()?;
        cb.begin(&ctx)?;
        assert_eq!(cb.state(), CommandBufferState::Recording);
        assert_configuration(cb.draw(3, 1, 0, 0), "draw outside a pass");
        assert_configuration(cb.end_render_pass(&ctx), "end_render_pass outside a pass");

        cb.begin_render_pass(&ctx, scene.render_pass, scene.framebuffer, &CLEAR)?;
        assert_eq!(cb.state(), CommandBufferState::RenderPassActive);
        assert_configuration(cb.end(&ctx), "end inside a pass");
        assert_configuration(
            cb.begin_render_pass(&ctx, scene.render_pass, scene.framebuffer, &CLEAR),
            "nested render pass",
        );
        assert_configuration(cb.draw(3, 1, 0, 0), "draw without a pipeline");
        assert_configuration(cb.dispatch(1, 1, 1), "dispatch inside a pass");
        assert_configuration(cb.next_subpass(&ctx), "next_subpass past the last subpass");
        cb.end_render_pass(&ctx)?;
        cb.end(&ctx)?;
        assert_eq!(cb.state(), CommandBufferState::Ended);
        cb.submit(&ctx)?;
        ctx.end_frame()?;

        ctx.begin_frame()?;
        cb.begin(&ctx)?;
        assert_eq!(cb.state(), CommandBufferState::Recording, "{backend}: begin after submit");
        cb.end(&ctx)?;
        cb.submit(&ctx)?;
        ctx.end_frame()?;
        assert_eq!(stats(&ctx).draw_calls, 0);

        cb.done(&ctx);
        ctx.shutdown()?;
    }
    Ok(())
}

#[test]
fn test_render_pass_arguments_are_validated() -> Result<()> {
    for backend in BACKENDS {
        let mut ctx = common::context(backend)?;
        let first = scene(&ctx, 64, 64)?;
        let second = scene(&ctx, 32, 32)?;
        let mut cb = ctx.create_command_buffer()?;
        ctx.begin_frame()?;
        cb.begin(&ctx)?;

        let err = cb
            .begin_render_pass(&ctx, first.render_pass, first.framebuffer, &CLEAR[..1])
            .expect_err("one clear value for two attachments");
        assert!(matches!(err, CgiError::Configuration(_)), "{backend}: {err}");
        assert_configuration(
            cb.begin_render_pass(&ctx, first.render_pass, second.framebuffer, &CLEAR),
            "framebuffer of another render pass",
        );
        assert_eq!(cb.state(), CommandBufferState::Recording);

        cb.begin_render_pass(&ctx, second.render_pass, second.framebuffer, &CLEAR)?;
        cb.end_render_pass(&ctx)?;
        cb.end(&ctx)?;
        cb.submit(&ctx)?;
        ctx.end_frame()?;
        cb.done(&ctx);
        ctx.shutdown()?;
    }
    Ok(())
}

#[test]
fn test_graphics_pipeline_rejected_in_foreign_render_pass() -> Result<()> {
    for backend in BACKENDS {
        let mut ctx = common::context(backend)?;
        let scene = scene(&ctx, 64, 64)?;
        let mut geo = cube_geometry(&ctx)?;
        let mut shader = ctx.create_shader(&ShaderDesc::new("Cube.hlsl", CUBE_SOURCE).with_branches(["main"]))?;
        shader.create_pipeline_layout(&ctx)?;
        let mut pipeline = ctx.create_pipeline(&PipelineDesc::new(
            geo.as_ref(),
            shader.as_ref(),
            "main",
            scene.render_pass,
        ))?;

        let bloom_pass = ctx.create_render_pass(&RenderPassDesc {
            attachments: vec![Attachment::new("Bloom", Format::FloatR16)
                .load_op_clear()
                .layout(ImageLayout::Undefined, ImageLayout::ShaderReadOnly)],
            subpasses: vec![Subpass::new("Blur").color([AttachmentRef::new("Bloom", ImageLayout::ColorAttachment)])],
            dependencies: Vec::new(),
        })?;
        let bloom = ctx.create_texture(&TextureDesc::attachment("Bloom", Format::FloatR16, 64, 64))?;
        let bloom_fb = ctx.create_framebuffer(&FramebufferDesc {
            render_pass: bloom_pass,
            attachments: vec![bloom],
            width: 64,
            height: 64,
            mip_level: 0,
        })?;

        let mut cb = ctx.create_command_buffer()?;
        ctx.begin_frame()?;
        cb.begin(&ctx)?;
        cb.begin_render_pass(&ctx, bloom_pass, bloom_fb, &CLEAR[..1])?;
        assert_configuration(cb.bind_pipeline(pipeline.as_ref()), "pipeline of another render pass");
        assert_configuration(cb.draw(36, 1, 0, 0), "draw after a rejected bind");
        cb.end_render_pass(&ctx)?;

        cb.begin_render_pass(&ctx, scene.render_pass, scene.framebuffer, &CLEAR)?;
        cb.bind_pipeline(pipeline.as_ref())?;
        cb.end_render_pass(&ctx)?;
        cb.end(&ctx)?;
        cb.submit(&ctx)?;
        ctx.end_frame()?;
        assert_eq!(stats(&ctx).draw_calls, 0, "{backend}");

        cb.done(&ctx);
        pipeline.done(&ctx);
        shader.done(&ctx);
        geo.done(&ctx);
        ctx.shutdown()?;
    }
    Ok(())
}

// ─── Compute ───────────────────────────────────────────────────────────

#[test]
fn test_compute_binds_only_outside_passes() -> Result<()> {
    for backend in BACKENDS {
        let mut ctx = common::context(backend)?;
        let scene = scene(&ctx, 16, 16)?;
        let mut shader = ctx.create_shader(
            &ShaderDesc::new("Cull.hlsl", COMPUTE_SOURCE)
                .with_branches(["main"])
                .with_stages("C"),
        )?;
        shader.create_pipeline_layout(&ctx)?;
        let mut pipeline = ctx.create_pipeline(&PipelineDesc::compute(shader.as_ref(), "main"))?;
        assert!(pipeline.is_compute());

        let mut cb = ctx.create_command_buffer()?;
        ctx.begin_frame()?;
        cb.begin(&ctx)?;
        assert_configuration(cb.dispatch(8, 1, 1), "dispatch without a pipeline");

        cb.begin_render_pass(&ctx, scene.render_pass, scene.framebuffer, &CLEAR)?;
        assert_configuration(cb.bind_pipeline(pipeline.as_ref()), "compute bind inside a pass");
        cb.end_render_pass(&ctx)?;

        cb.bind_pipeline(pipeline.as_ref())?;
        cb.dispatch(8, 4, 1)?;
        cb.end(&ctx)?;
        cb.submit(&ctx)?;
        ctx.end_frame()?;
        assert_eq!(stats(&ctx).dispatches, 1, "{backend}");

        cb.done(&ctx);
        pipeline.done(&ctx);
        shader.done(&ctx);
        ctx.shutdown()?;
    }
    Ok(())
}
