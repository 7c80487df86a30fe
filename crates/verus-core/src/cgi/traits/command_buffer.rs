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

use crate::cgi::api::{
    CSHandle, FBHandle, ImageLayout, RPHandle, ShaderStageFlags, TextureId,
};
use crate::cgi::context::RenderContext;
use crate::cgi::error::Result;
use crate::cgi::traits::{Geometry, Pipeline, Shader};
use std::any::Any;
use std::fmt;
use std::ops::Range;

/// Where a command buffer is in its recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandBufferState {
    /// Not begun.
    #[default]
    Initial,
    /// Between `begin` and `end`, outside a render pass.
    Recording,
    /// Inside a render pass.
    RenderPassActive,
    /// `end` was called; ready to submit.
    Ended,
}

impl fmt::Display for CommandBufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Initial => "initial",
            Self::Recording => "recording",
            Self::RenderPassActive => "inside a render pass",
            Self::Ended => "ended",
        };
        f.write_str(text)
    }
}

/// A viewport or scissor rectangle in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Rect {
    /// Creates a rectangle.
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle at the origin.
    pub const fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }
}

/// Records GPU work into backend-native form.
///
/// A command buffer owns one native recorder per ring buffer slot and
/// records into the slot current at `begin`. One-time-submit buffers own a
/// single recorder and are driven by
/// [`OneTimeSubmit`](crate::cgi::context::OneTimeSubmit).
///
/// Calls out of order fail with `ConfigurationError::InvalidState`.
pub trait CommandBuffer: Send {
    /// Allocates one native recorder per ring buffer slot.
    fn init(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Releases the native recorders.
    fn done(&mut self, ctx: &RenderContext);

    /// Allocates a single recorder and begins recording.
    fn init_one_time_submit(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Ends, submits, waits for the device to go idle and releases the recorder.
    fn done_one_time_submit(&mut self, ctx: &RenderContext) -> Result<()>;

    /// The current recording state.
    fn state(&self) -> CommandBufferState;

    /// Starts recording into the recorder of the current ring slot.
    fn begin(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Finishes recording.
    fn end(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Hands the recorded commands to the device queue.
    fn submit(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Transitions a texture between layouts outside a render pass.
    fn pipeline_image_memory_barrier(
        &mut self,
        ctx: &RenderContext,
        texture: TextureId,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        mip_levels: Range<u32>,
        array_layers: Range<u32>,
    ) -> Result<()>;

    /// Begins a render pass. `clear_values` holds one entry per attachment.
    fn begin_render_pass(
        &mut self,
        ctx: &RenderContext,
        render_pass: RPHandle,
        framebuffer: FBHandle,
        clear_values: &[[f32; 4]],
    ) -> Result<()>;

    /// Advances to the next subpass, performing its transitions and deferred clears.
    fn next_subpass(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Ends the render pass. Every subpass must have been visited.
    fn end_render_pass(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Binds a pipeline.
    fn bind_pipeline(&mut self, pipeline: &dyn Pipeline) -> Result<()>;

    /// Sets the viewports.
    fn set_viewport(&mut self, viewports: &[Rect], min_depth: f32, max_depth: f32) -> Result<()>;

    /// Sets the scissor rectangles.
    fn set_scissor(&mut self, rects: &[Rect]) -> Result<()>;

    /// Sets the blend constants.
    fn set_blend_constants(&mut self, constants: [f32; 4]) -> Result<()>;

    /// Binds the vertex buffers selected by `bindings_filter`, compacting slots.
    fn bind_vertex_buffers(
        &mut self,
        ctx: &RenderContext,
        geometry: &dyn Geometry,
        bindings_filter: u32,
    ) -> Result<()>;

    /// Binds the index buffer of `geometry`.
    fn bind_index_buffer(&mut self, ctx: &RenderContext, geometry: &dyn Geometry) -> Result<()>;

    /// Uploads the uniform block of `set` and binds it with the textures of `csh`.
    ///
    /// Returns `false` when `csh` refers to a complex set whose texture list
    /// is empty; the caller should skip the draw.
    fn bind_descriptors(
        &mut self,
        ctx: &RenderContext,
        shader: &mut dyn Shader,
        set: i32,
        csh: CSHandle,
    ) -> Result<bool>;

    /// Pushes constants. `offset` is in 32-bit words.
    fn push_constants(
        &mut self,
        ctx: &RenderContext,
        shader: &dyn Shader,
        offset: u32,
        values: &[u32],
        stage_flags: ShaderStageFlags,
    ) -> Result<()>;

    /// Draws non-indexed primitives.
    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()>;

    /// Draws indexed primitives.
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()>;

    /// Dispatches compute work.
    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()>;

    /// Dispatches mesh shader work.
    fn dispatch_mesh(
        &mut self,
        ctx: &RenderContext,
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    ) -> Result<()>;

    /// Traces rays.
    fn trace_rays(&mut self, ctx: &RenderContext, width: u32, height: u32, depth: u32) -> Result<()>;

    /// Returns the command buffer as mutable `Any` for backend down-casts.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
