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

//! CPU-side vertex batcher streaming into a dynamic geometry binding.

use crate::cgi::api::GeometryDesc;
use crate::cgi::context::RenderContext;
use crate::cgi::error::Result;
use crate::cgi::traits::{CommandBuffer, Geometry};
use bytemuck::Pod;

/// Collects vertices on the CPU and draws them in batches.
///
/// Binding 0 of the geometry is dynamic, so every batch lands in the region
/// of the current ring slot. Call [`reset`](Self::reset) once per frame,
/// then `begin`/`add`/`end` per batch.
pub struct DynamicBuffer<T: Pod> {
    geometry: Box<dyn Geometry>,
    vertices: Vec<T>,
    vert_count: u32,
    first_vertex: u32,
}

impl<T: Pod> DynamicBuffer<T> {
    /// Creates the geometry with binding 0 dynamic and room for `max_verts` vertices.
    pub fn new(ctx: &RenderContext, desc: &GeometryDesc, max_verts: u32) -> Result<Self> {
        let dynamic_desc = GeometryDesc {
            dynamic_bindings_mask: 0x1,
            ..desc.clone()
        };
        let mut geometry = ctx.create_geometry(&dynamic_desc)?;
        geometry.create_vertex_buffer(ctx, max_verts, 0)?;
        Ok(Self {
            geometry,
            vertices: vec![T::zeroed(); max_verts as usize],
            vert_count: 0,
            first_vertex: 0,
        })
    }

    /// The geometry pipelines are built against.
    pub fn geometry(&self) -> &dyn Geometry {
        self.geometry.as_ref()
    }

    /// Capacity in vertices.
    pub fn max_verts(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// Vertices added since the last reset.
    pub fn vert_count(&self) -> u32 {
        self.vert_count
    }

    /// Forgets every vertex. Call at the start of a frame.
    pub fn reset(&mut self) {
        self.vert_count = 0;
        self.first_vertex = 0;
    }

    /// Starts a batch.
    pub fn begin(&mut self) {
        self.first_vertex = self.vert_count;
    }

    /// Uploads the batch and draws it. Empty batches record nothing.
    pub fn end(&mut self, ctx: &RenderContext, cb: &mut dyn CommandBuffer) -> Result<()> {
        let count = self.vert_count - self.first_vertex;
        if count == 0 {
            return Ok(());
        }
        let batch = &self.vertices[self.first_vertex as usize..self.vert_count as usize];
        self.geometry.update_vertex_buffer(
            ctx,
            bytemuck::cast_slice(batch),
            0,
            Some(&mut *cb),
            count,
            self.first_vertex,
        )?;
        cb.draw(count, 1, self.first_vertex, 0)
    }

    /// Adds a vertex. Returns `false` when full.
    pub fn add(&mut self, vertex: T) -> bool {
        if self.vert_count as usize + 1 > self.vertices.len() {
            return false;
        }
        self.vertices[self.vert_count as usize] = vertex;
        self.vert_count += 1;
        true
    }

    /// Adds a quad as two triangles `a0 b0 a1` and `a1 b0 b1`. Returns `false` when full.
    pub fn add_quad(&mut self, a0: T, a1: T, b0: T, b1: T) -> bool {
        if self.vert_count as usize + 6 > self.vertices.len() {
            return false;
        }
        for vertex in [a0, b0, a1, a1, b0, b1] {
            self.vertices[self.vert_count as usize] = vertex;
            self.vert_count += 1;
        }
        true
    }

    /// Releases the geometry.
    pub fn done(&mut self, ctx: &RenderContext) {
        self.geometry.done(ctx);
    }
}
