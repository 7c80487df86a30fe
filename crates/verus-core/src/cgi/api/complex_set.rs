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

//! Complex sets: concrete texture assignments for a descriptor set.
//!
//! Slots live in a growable vector addressed by [`CSHandle`]. Freeing a slot
//! clears its texture list and stamps the frame it was freed in; the slot is
//! only handed out again once `ring_buffer_depth` frames have passed, so an
//! in-flight frame never sees its descriptors rewritten.

use super::handles::{CSHandle, TextureId};
use crate::cgi::error::{ConfigurationError, Result};

/// One complex set slot.
#[derive(Debug, Clone)]
pub struct ComplexSet<N> {
    /// Descriptor set the textures are bound against.
    pub set_number: usize,
    /// Bound textures; empty once freed.
    pub textures: Vec<TextureId>,
    /// Backend objects (views, descriptor sets, heap handles).
    pub native: Option<N>,
    freed_at: Option<u64>,
}

impl<N> ComplexSet<N> {
    /// Returns `true` if the set holds textures and can be bound.
    pub fn is_ready(&self) -> bool {
        !self.textures.is_empty()
    }
}

/// The complex sets of one shader.
#[derive(Debug, Clone)]
pub struct ComplexSetPool<N> {
    sets: Vec<ComplexSet<N>>,
}

impl<N> Default for ComplexSetPool<N> {
    fn default() -> Self {
        Self { sets: Vec::new() }
    }
}

impl<N> ComplexSetPool<N> {
    /// Stores a new complex set, reusing the first free slot whose free frame
    /// is at least `ring_buffer_depth` frames old.
    pub fn insert(
        &mut self,
        set_number: usize,
        textures: Vec<TextureId>,
        native: N,
        frame_count: u64,
        ring_buffer_depth: usize,
    ) -> CSHandle {
        let reusable = self.sets.iter().position(|cs| {
            cs.textures.is_empty()
                && cs.native.is_none()
                && cs
                    .freed_at
                    .is_some_and(|freed| frame_count >= freed + ring_buffer_depth as u64)
        });

        let entry = ComplexSet {
            set_number,
            textures,
            native: Some(native),
            freed_at: None,
        };
        match reusable {
            Some(index) => {
                self.sets[index] = entry;
                CSHandle::make(index)
            }
            None => {
                self.sets.push(entry);
                CSHandle::make(self.sets.len() - 1)
            }
        }
    }

    /// Returns the slot `handle` refers to.
    pub fn get(&self, handle: CSHandle) -> Result<&ComplexSet<N>> {
        handle
            .get()
            .and_then(|index| self.sets.get(index))
            .ok_or_else(|| {
                ConfigurationError::InvalidHandle {
                    kind: CSHandle::KIND,
                    index: handle.raw() as i64,
                }
                .into()
            })
    }

    /// Frees the slot `handle` refers to and resets the handle.
    ///
    /// Returns the backend objects so the caller can retire them. Freeing an
    /// unset handle is a no-op.
    pub fn free(&mut self, handle: &mut CSHandle, frame_count: u64) -> Result<Option<N>> {
        if !handle.is_set() {
            return Ok(None);
        }
        let index = handle.get().unwrap_or(usize::MAX);
        let slot = self.sets.get_mut(index).ok_or(ConfigurationError::InvalidHandle {
            kind: CSHandle::KIND,
            index: handle.raw() as i64,
        })?;
        slot.textures.clear();
        slot.freed_at = Some(frame_count);
        handle.reset();
        Ok(slot.native.take())
    }

    /// Number of slots, free or not.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns `true` if no slot was ever created.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Number of slots holding textures.
    pub fn live_count(&self) -> usize {
        self.sets.iter().filter(|cs| cs.is_ready()).count()
    }

    /// Removes every slot and returns the backend objects still alive.
    pub fn drain(&mut self) -> Vec<N> {
        self.sets.drain(..).filter_map(|cs| cs.native).collect()
    }
}
