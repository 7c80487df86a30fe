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

//! Render pass and framebuffer tables addressed by index handles.

use crate::cgi::api::{FBHandle, FramebufferDesc, RPHandle, RenderPassLayout};
use crate::cgi::error::{ConfigurationError, Result};
use std::sync::Arc;

/// A registered render pass.
#[derive(Debug, Clone)]
pub struct RenderPassEntry<N> {
    /// Resolved layout shared with command buffers.
    pub layout: Arc<RenderPassLayout>,
    /// Backend data.
    pub native: N,
}

/// A registered framebuffer.
#[derive(Debug, Clone)]
pub struct FramebufferEntry<N> {
    /// The description it was created from.
    pub desc: FramebufferDesc,
    /// Backend data.
    pub native: N,
}

/// Render passes and framebuffers of one device. Deleted slots are reused.
#[derive(Debug)]
pub struct PassRegistry<RP, FB> {
    render_passes: Vec<Option<RenderPassEntry<RP>>>,
    framebuffers: Vec<Option<FramebufferEntry<FB>>>,
}

impl<RP, FB> Default for PassRegistry<RP, FB> {
    fn default() -> Self {
        Self {
            render_passes: Vec::new(),
            framebuffers: Vec::new(),
        }
    }
}

fn insert_slot<T>(slots: &mut Vec<Option<T>>, value: T) -> usize {
    match slots.iter().position(Option::is_none) {
        Some(index) => {
            slots[index] = Some(value);
            index
        }
        None => {
            slots.push(Some(value));
            slots.len() - 1
        }
    }
}

impl<RP, FB> PassRegistry<RP, FB> {
    /// Registers a render pass.
    pub fn insert_render_pass(&mut self, layout: RenderPassLayout, native: RP) -> RPHandle {
        let entry = RenderPassEntry {
            layout: Arc::new(layout),
            native,
        };
        RPHandle::make(insert_slot(&mut self.render_passes, entry))
    }

    /// Looks up a render pass.
    pub fn render_pass(&self, handle: RPHandle) -> Result<&RenderPassEntry<RP>> {
        handle
            .get()
            .and_then(|i| self.render_passes.get(i))
            .and_then(Option::as_ref)
            .ok_or_else(|| invalid(RPHandle::KIND, handle.raw()))
    }

    /// Unregisters a render pass and returns its backend data.
    pub fn remove_render_pass(&mut self, handle: RPHandle) -> Result<RP> {
        handle
            .get()
            .and_then(|i| self.render_passes.get_mut(i))
            .and_then(Option::take)
            .map(|entry| entry.native)
            .ok_or_else(|| invalid(RPHandle::KIND, handle.raw()))
    }

    /// Registers a framebuffer after checking it against its render pass.
    pub fn insert_framebuffer(&mut self, desc: FramebufferDesc, native: FB) -> Result<FBHandle> {
        let render_pass = self.render_pass(desc.render_pass)?;
        let expected = render_pass.layout.attachment_count();
        if desc.attachments.len() != expected {
            return Err(ConfigurationError::CountMismatch {
                what: "framebuffer attachments",
                expected,
                actual: desc.attachments.len(),
            }
            .into());
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(ConfigurationError::Invalid(format!(
                "framebuffer size {}x{} is empty",
                desc.width, desc.height
            ))
            .into());
        }
        let entry = FramebufferEntry { desc, native };
        Ok(FBHandle::make(insert_slot(&mut self.framebuffers, entry)))
    }

    /// Looks up a framebuffer.
    pub fn framebuffer(&self, handle: FBHandle) -> Result<&FramebufferEntry<FB>> {
        handle
            .get()
            .and_then(|i| self.framebuffers.get(i))
            .and_then(Option::as_ref)
            .ok_or_else(|| invalid(FBHandle::KIND, handle.raw()))
    }

    /// Unregisters a framebuffer and returns its backend data.
    pub fn remove_framebuffer(&mut self, handle: FBHandle) -> Result<FB> {
        handle
            .get()
            .and_then(|i| self.framebuffers.get_mut(i))
            .and_then(Option::take)
            .map(|entry| entry.native)
            .ok_or_else(|| invalid(FBHandle::KIND, handle.raw()))
    }
}

fn invalid(kind: &'static str, index: i32) -> crate::cgi::error::CgiError {
    ConfigurationError::InvalidHandle {
        kind,
        index: i64::from(index),
    }
    .into()
}
