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

use crate::cgi::api::{BufferId, GeometryDesc, GeometryLayout};
use crate::cgi::context::RenderContext;
use crate::cgi::error::Result;
use crate::cgi::traits::CommandBuffer;
use std::any::Any;

/// Vertex and index buffer storage plus the input layout pipelines are built against.
///
/// Dynamic bindings are allocated `ring_buffer_depth` times; every update
/// writes to the region of the current ring slot. Static bindings are
/// uploaded through a staging path recorded on a command buffer.
pub trait Geometry: Send + Sync {
    /// Parses `desc` and prepares the backend input layout.
    fn init(&mut self, ctx: &RenderContext, desc: &GeometryDesc) -> Result<()>;

    /// Hands every buffer to the retire queue.
    fn done(&mut self, ctx: &RenderContext);

    /// Allocates `count` vertices for `binding`.
    fn create_vertex_buffer(&mut self, ctx: &RenderContext, count: u32, binding: usize) -> Result<()>;

    /// Allocates `count` indices.
    fn create_index_buffer(&mut self, ctx: &RenderContext, count: u32) -> Result<()>;

    /// Writes vertices to `binding`.
    ///
    /// `size` and `offset` are in vertices; a `size` of zero means up to the end
    /// of the buffer. Static bindings record their copy on `cb`, or on an
    /// internal one-time submission when `cb` is `None`.
    fn update_vertex_buffer(
        &mut self,
        ctx: &RenderContext,
        data: &[u8],
        binding: usize,
        cb: Option<&mut dyn CommandBuffer>,
        size: u32,
        offset: u32,
    ) -> Result<()>;

    /// Writes indices. Same conventions as [`update_vertex_buffer`](Self::update_vertex_buffer).
    fn update_index_buffer(
        &mut self,
        ctx: &RenderContext,
        data: &[u8],
        cb: Option<&mut dyn CommandBuffer>,
        size: u32,
        offset: u32,
    ) -> Result<()>;

    /// The parsed description.
    fn layout(&self) -> &GeometryLayout;

    /// The buffer backing `binding`, if it was created.
    fn vertex_buffer(&self, binding: usize) -> Option<BufferId>;

    /// The index buffer, if it was created.
    fn index_buffer(&self) -> Option<BufferId>;

    /// Returns the geometry as `Any` for backend down-casts.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Geometry + '_ {
    /// Writes typed vertices to `binding` covering the whole slice.
    pub fn update_vertices<T: bytemuck::Pod>(
        &mut self,
        ctx: &RenderContext,
        vertices: &[T],
        binding: usize,
        cb: Option<&mut dyn CommandBuffer>,
    ) -> Result<()> {
        let count = u32::try_from(vertices.len()).unwrap_or(u32::MAX);
        self.update_vertex_buffer(ctx, bytemuck::cast_slice(vertices), binding, cb, count, 0)
    }

    /// Writes typed indices covering the whole slice.
    pub fn update_indices<T: bytemuck::Pod>(
        &mut self,
        ctx: &RenderContext,
        indices: &[T],
        cb: Option<&mut dyn CommandBuffer>,
    ) -> Result<()> {
        let count = u32::try_from(indices.len()).unwrap_or(u32::MAX);
        self.update_index_buffer(ctx, bytemuck::cast_slice(indices), cb, count, 0)
    }
}
