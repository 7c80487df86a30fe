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
    BackendKind, BufferId, DeviceResource, FBHandle, FramebufferDesc, RPHandle, RenderPassDesc,
    RenderPassLayout, TextureDesc, TextureId,
};
use crate::cgi::error::Result;
use crate::cgi::traits::{CommandBuffer, Geometry, Pipeline, Shader};
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// The main interface of a graphics backend.
///
/// A device creates the backend flavour of every CGI object, owns textures,
/// render passes and framebuffers, and releases objects handed back by the
/// retire queue. Implementations are cheap to share behind an `Arc` and use
/// interior mutability for their resource tables.
pub trait RenderDevice: Send + Sync + Debug {
    /// The backend this device implements.
    fn backend(&self) -> BackendKind;

    /// Creates a texture the complex sets and framebuffers can reference.
    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId>;

    /// Returns the description a texture was created from.
    fn texture_desc(&self, texture: TextureId) -> Result<TextureDesc>;

    /// Registers a render pass and returns its handle.
    ///
    /// Attachment names are resolved to indices and the clear subpass of
    /// every attachment is computed here.
    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RPHandle>;

    /// Removes a render pass from the registry.
    fn delete_render_pass(&self, render_pass: RPHandle) -> Result<()>;

    /// Registers a framebuffer compatible with `desc.render_pass`.
    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FBHandle>;

    /// Removes a framebuffer from the registry.
    fn delete_framebuffer(&self, framebuffer: FBHandle) -> Result<()>;

    /// Returns the resolved layout of a registered render pass.
    fn render_pass_layout(&self, render_pass: RPHandle) -> Result<Arc<RenderPassLayout>>;

    /// Returns the description of a registered framebuffer.
    fn framebuffer_desc(&self, framebuffer: FBHandle) -> Result<FramebufferDesc>;

    /// Creates an uninitialized geometry object for this backend.
    fn new_geometry(&self) -> Box<dyn Geometry>;

    /// Creates an uninitialized shader object for this backend.
    fn new_shader(&self) -> Box<dyn Shader>;

    /// Creates an uninitialized pipeline object for this backend.
    fn new_pipeline(&self) -> Box<dyn Pipeline>;

    /// Creates an uninitialized command buffer for this backend.
    fn new_command_buffer(&self) -> Box<dyn CommandBuffer>;

    /// Destroys an object whose retire frame has passed.
    fn release(&self, resource: DeviceResource) -> Result<()>;

    /// Blocks until all submitted work has completed.
    fn wait_idle(&self) -> Result<()>;

    /// Copies the current content of a buffer back to the CPU.
    fn read_buffer(&self, buffer: BufferId) -> Result<Vec<u8>>;

    /// Returns the device as `Any` so backend objects can reach their concrete device.
    fn as_any(&self) -> &dyn Any;
}
