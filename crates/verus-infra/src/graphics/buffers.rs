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

//! Vertex and index buffer bookkeeping shared by the backends.
//!
//! A dynamic buffer is allocated `ring_buffer_depth` times its logical size
//! and region `k` belongs to ring slot `k`, so the CPU never writes memory a
//! frame in flight still reads.

use crate::graphics::resources::ResourceTables;
use verus_core::cgi::api::{resolve_update_range, BufferId};
use verus_core::cgi::error::{ConfigurationError, Result};

/// One vertex or index buffer of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GeometryBuffer {
    pub id: BufferId,
    /// Elements in one region.
    pub count: u32,
    pub stride: u32,
    pub dynamic: bool,
}

/// Where an update lands and what it copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BufferUpdate<'a> {
    /// Byte offset from the start of the region.
    pub offset: usize,
    pub bytes: &'a [u8],
    /// The update covers the whole region.
    pub whole: bool,
}

impl GeometryBuffer {
    /// Allocates the buffer in the device tables.
    pub fn allocate(
        resources: &ResourceTables,
        name: String,
        count: u32,
        stride: u32,
        dynamic: bool,
        ring_buffer_depth: usize,
        state: u32,
    ) -> Self {
        let regions = if dynamic { ring_buffer_depth } else { 1 };
        let size = count as usize * stride as usize * regions;
        let id = resources.create_buffer(name, size, state);
        Self {
            id,
            count,
            stride,
            dynamic,
        }
    }

    /// Bytes of one region.
    pub fn region_size(&self) -> usize {
        self.count as usize * self.stride as usize
    }

    /// Byte offset of the region used by `ring_index`; zero for static buffers.
    pub fn region_offset(&self, ring_index: usize) -> usize {
        if self.dynamic {
            ring_index * self.region_size()
        } else {
            0
        }
    }

    /// Resolves an element-based update against the buffer.
    ///
    /// `data` must hold at least the resolved element count; extra bytes are ignored.
    pub fn resolve_update<'a>(&self, data: &'a [u8], size: u32, offset: u32) -> Result<BufferUpdate<'a>> {
        let (first, count) = resolve_update_range(self.count, size, offset)?;
        let len = count as usize * self.stride as usize;
        let bytes = data.get(..len).ok_or(ConfigurationError::CountMismatch {
            what: "buffer update bytes",
            expected: len,
            actual: data.len(),
        })?;
        Ok(BufferUpdate {
            offset: first as usize * self.stride as usize,
            bytes,
            whole: first == 0 && count == self.count,
        })
    }
}

/// The buffer created for `binding`.
pub(crate) fn vertex_slot(buffers: &[Option<GeometryBuffer>], binding: usize) -> Result<&GeometryBuffer> {
    buffers
        .get(binding)
        .and_then(Option::as_ref)
        .ok_or_else(|| {
            ConfigurationError::Invalid(format!("vertex binding {binding} has no vertex buffer")).into()
        })
}

/// Places a new buffer at `binding`, returning the one it replaces.
pub(crate) fn replace_slot(
    buffers: &mut Vec<Option<GeometryBuffer>>,
    binding: usize,
    buffer: GeometryBuffer,
) -> Option<GeometryBuffer> {
    if buffers.len() <= binding {
        buffers.resize(binding + 1, None);
    }
    buffers[binding].replace(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(dynamic: bool) -> (ResourceTables, GeometryBuffer) {
        let resources = ResourceTables::default();
        let buffer = GeometryBuffer::allocate(&resources, "vb".into(), 4, 8, dynamic, 3, 0);
        (resources, buffer)
    }

    #[test]
    fn test_dynamic_buffers_hold_one_region_per_slot() {
        let (resources, dynamic) = buffer(true);
        assert_eq!(resources.buffer_size(dynamic.id).unwrap(), 4 * 8 * 3);
        assert_eq!(dynamic.region_offset(2), 64);

        let (resources, fixed) = buffer(false);
        assert_eq!(resources.buffer_size(fixed.id).unwrap(), 32);
        assert_eq!(fixed.region_offset(2), 0);
    }

    #[test]
    fn test_resolve_update() {
        let (_, buffer) = buffer(true);
        let data = [7u8; 32];
        let update = buffer.resolve_update(&data, 0, 0).unwrap();
        assert!(update.whole);
        assert_eq!(update.bytes.len(), 32);

        let update = buffer.resolve_update(&data, 2, 1).unwrap();
        assert!(!update.whole);
        assert_eq!(update.offset, 8);
        assert_eq!(update.bytes.len(), 16);

        assert!(buffer.resolve_update(&data, 4, 1).is_err());
        assert!(buffer.resolve_update(&data[..8], 2, 0).is_err());
    }

    #[test]
    fn test_replace_slot_grows() {
        let (_, buffer) = buffer(false);
        let mut slots = Vec::new();
        assert!(replace_slot(&mut slots, 2, buffer).is_none());
        assert_eq!(slots.len(), 3);
        assert!(vertex_slot(&slots, 0).is_err());
        assert_eq!(vertex_slot(&slots, 2).unwrap().id, buffer.id);
        assert_eq!(replace_slot(&mut slots, 2, buffer), Some(buffer));
    }
}
