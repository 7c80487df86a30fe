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

//! What each backend records for the same frame.

mod common;

use anyhow::Result;
use ash::vk;
use common::{cube_geometry, scene, CUBE_SOURCE};
use verus_core::cgi::api::{
    BackendKind, CSHandle, DescriptorSetDesc, PipelineDesc, ShaderDesc, ShaderStageFlags, Stage, ALL_BINDINGS,
};
use verus_core::cgi::traits::{CommandBuffer, Rect, Shader};
use verus_core::RenderContext;
use verus_infra::graphics::d3d11::native::{D3D11Call, D3D11Map};
use verus_infra::graphics::d3d11::D3D11Device;
use verus_infra::graphics::d3d12::native::D3D12Command;
use verus_infra::graphics::d3d12::D3D12Device;
use verus_infra::graphics::vulkan::native::VulkanCommand;
use verus_infra::graphics::vulkan::VulkanDevice;

const CLEAR: [[f32; 4]; 2] = [[0.0; 4], [1.0, 0.0, 0.0, 0.0]];
const MATRIX: [f32; 16] = [0.5; 16];

/// Records one frame drawing the cube with a 64-byte vertex block in set 0.
///
/// `extra` runs after the set is bound, before the draw.
fn record_frame(
    ctx: &mut RenderContext,
    extra: impl FnOnce(&RenderContext, &mut dyn CommandBuffer, &dyn Shader) -> Result<()>,
) -> Result<()> {
    let scene = scene(ctx, 100, 50)?;
    let mut geo = cube_geometry(ctx)?;
    let mut shader = ctx.create_shader(&ShaderDesc::new("Cube.hlsl", CUBE_SOURCE).with_branches(["main"]))?;
    shader.create_descriptor_set(ctx, DescriptorSetDesc::new(0, 64, 0, [], ShaderStageFlags::VS))?;
    shader.create_pipeline_layout(ctx)?;
    let mut pipeline = ctx.create_pipeline(&PipelineDesc::new(
        geo.as_ref(),
        shader.as_ref(),
        "main",
        scene.render_pass,
    ))?;
    let mut cb = ctx.create_command_buffer()?;

    ctx.begin_frame()?;
    cb.begin(ctx)?;
    cb.begin_render_pass(ctx, scene.render_pass, scene.framebuffer, &CLEAR)?;
    cb.bind_pipeline(pipeline.as_ref())?;
    cb.bind_vertex_buffers(ctx, geo.as_ref(), ALL_BINDINGS)?;
    cb.bind_index_buffer(ctx, geo.as_ref())?;
    shader.write_uniform(0, &MATRIX)?;
    assert!(cb.bind_descriptors(ctx, shader.as_mut(), 0, CSHandle::UNSET)?);
    extra(ctx, cb.as_mut(), shader.as_ref())?;
    cb.draw_indexed(36, 1, 0, 0, 0)?;
    cb.end_render_pass(ctx)?;
    cb.end(ctx)?;
    cb.submit(ctx)?;
    ctx.end_frame()?;

    cb.done(ctx);
    pipeline.done(ctx);
    shader.done(ctx);
    geo.done(ctx);
    Ok(())
}

fn words_as_bytes(words: &[u32]) -> Vec<u8> {
    bytemuck::cast_slice(words).to_vec()
}

// ─── Viewports ─────────────────────────────────────────────────────────

#[test]
fn test_vulkan_viewport_is_flipped() -> Result<()> {
    let mut ctx = common::context(BackendKind::Vulkan)?;
    let device = ctx.device().as_any().downcast_ref::<VulkanDevice>().expect("Vulkan").clone();
    device.enable_command_log(true);
    record_frame(&mut ctx, |_, cb, _| {
        cb.set_viewport(&[Rect::new(10.0, 0.0, 40.0, 20.0)], 0.0, 1.0)?;
        Ok(())
    })?;

    let viewports: Vec<_> = device
        .take_command_log()
        .into_iter()
        .filter_map(|command| match command {
            VulkanCommand::SetViewport(viewports) => Some(viewports[0]),
            _ => None,
        })
        .collect();
    assert_eq!(viewports.len(), 2);
    assert_eq!((viewports[0].y, viewports[0].height), (50.0, -50.0));
    assert_eq!((viewports[1].x, viewports[1].y, viewports[1].height), (10.0, 20.0, -20.0));
    ctx.shutdown()?;
    Ok(())
}

#[test]
fn test_d3d12_viewport_is_not_flipped() -> Result<()> {
    let mut ctx = common::context(BackendKind::D3D12)?;
    let device = ctx.device().as_any().downcast_ref::<D3D12Device>().expect("D3D12").clone();
    device.enable_command_log(true);
    record_frame(&mut ctx, |_, cb, _| {
        cb.set_viewport(&[Rect::new(10.0, 0.0, 40.0, 20.0)], 0.0, 1.0)?;
        Ok(())
    })?;

    let viewports: Vec<_> = device
        .take_command_log()
        .into_iter()
        .filter_map(|command| match command {
            D3D12Command::RsSetViewports(viewports) => Some(viewports[0]),
            _ => None,
        })
        .collect();
    assert_eq!(viewports.len(), 2);
    assert_eq!((viewports[0].top_left_y, viewports[0].height), (0.0, 50.0));
    assert_eq!((viewports[1].top_left_x, viewports[1].height), (10.0, 20.0));
    ctx.shutdown()?;
    Ok(())
}

// ─── Small uniform blocks ──────────────────────────────────────────────

#[test]
fn test_vulkan_small_set_becomes_push_constants() -> Result<()> {
    let mut ctx = common::context(BackendKind::Vulkan)?;
    let device = ctx.device().as_any().downcast_ref::<VulkanDevice>().expect("Vulkan").clone();
    device.enable_command_log(true);
    record_frame(&mut ctx, |ctx, cb, shader| {
        cb.push_constants(ctx, shader, 4, &[7, 8], ShaderStageFlags::VS)?;
        assert!(cb.push_constants(ctx, shader, 15, &[1, 2], ShaderStageFlags::VS).is_err());
        Ok(())
    })?;

    let pushes: Vec<_> = device
        .take_command_log()
        .into_iter()
        .filter_map(|command| match command {
            VulkanCommand::PushConstants {
                stage_flags,
                offset,
                data,
                ..
            } => Some((stage_flags, offset, data)),
            _ => None,
        })
        .collect();
    assert_eq!(pushes.len(), 2);
    assert_eq!(pushes[0].0, vk::ShaderStageFlags::VERTEX);
    assert_eq!(pushes[0].1, 0);
    assert_eq!(pushes[0].2, bytemuck::cast_slice::<f32, u8>(&MATRIX).to_vec());
    assert_eq!((pushes[1].1, &pushes[1].2), (16, &words_as_bytes(&[7, 8])));
    ctx.shutdown()?;
    Ok(())
}

#[test]
fn test_d3d12_small_set_becomes_root_constants() -> Result<()> {
    let mut ctx = common::context(BackendKind::D3D12)?;
    let device = ctx.device().as_any().downcast_ref::<D3D12Device>().expect("D3D12").clone();
    device.enable_command_log(true);
    record_frame(&mut ctx, |ctx, cb, shader| {
        cb.push_constants(ctx, shader, 4, &[7, 8], ShaderStageFlags::VS)?;
        assert!(cb.push_constants(ctx, shader, 15, &[1, 2], ShaderStageFlags::VS).is_err());
        Ok(())
    })?;

    let log = device.take_command_log();
    let constants: Vec<_> = log
        .iter()
        .filter_map(|command| match command {
            D3D12Command::SetRoot32BitConstants {
                compute,
                values,
                dest_offset,
                ..
            } => Some((*compute, values.clone(), *dest_offset)),
            _ => None,
        })
        .collect();
    assert_eq!(constants.len(), 2);
    assert!(!constants[0].0);
    assert_eq!(constants[0].1.len(), 16);
    assert_eq!(constants[0].1[0], 0.5f32.to_bits());
    assert_eq!((constants[1].1.as_slice(), constants[1].2), (&[7u32, 8][..], 4));
    assert!(log.iter().any(|c| c.name() == "SetGraphicsRoot32BitConstants"));
    assert!(log.iter().any(|c| c.name() == "DrawIndexedInstanced"));
    ctx.shutdown()?;
    Ok(())
}

#[test]
fn test_d3d11_small_set_is_a_mapped_constant_buffer() -> Result<()> {
    let mut ctx = common::context(BackendKind::D3D11)?;
    let device = ctx.device().as_any().downcast_ref::<D3D11Device>().expect("D3D11").clone();
    device.enable_call_log(true);
    record_frame(&mut ctx, |ctx, cb, shader| {
        // Push constants have no D3D11 counterpart and are ignored.
        cb.push_constants(ctx, shader, 0, &[1], ShaderStageFlags::VS)?;
        Ok(())
    })?;

    let calls = device.take_call_log();
    let map = calls
        .iter()
        .find_map(|call| match call {
            D3D11Call::Map {
                map_type, offset, data, ..
            } if data.len() == 64 => Some((*map_type, *offset, data.clone())),
            _ => None,
        })
        .expect("uniform upload");
    assert_eq!(map.0, D3D11Map::WRITE_DISCARD);
    assert_eq!(map.1, 0);
    assert_eq!(map.2, bytemuck::cast_slice::<f32, u8>(&MATRIX).to_vec());

    let bound: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            D3D11Call::SetConstantBuffers {
                stage,
                slot,
                first_constant,
                num_constants,
                ..
            } => Some((*stage, *slot, *first_constant, *num_constants)),
            _ => None,
        })
        .collect();
    assert_eq!(bound, vec![(Stage::Vs, 0, 0, 16)]);

    let shaders: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            D3D11Call::SetShader { stage, pipeline } => Some((*stage, pipeline.is_some())),
            _ => None,
        })
        .collect();
    assert!(shaders.contains(&(Stage::Vs, true)));
    assert!(shaders.contains(&(Stage::Fs, true)));
    assert!(shaders.contains(&(Stage::Gs, false)));
    assert_eq!(calls.iter().filter(|c| c.name() == "DrawIndexedInstanced").count(), 1);
    ctx.shutdown()?;
    Ok(())
}
