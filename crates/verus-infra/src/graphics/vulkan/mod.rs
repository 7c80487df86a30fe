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

//! The Vulkan backend.
//!
//! Command buffers record into one `VkCommandBuffer` per ring slot. Every
//! shader owns a descriptor pool sized for its set layouts and its complex
//! sets, and reads uniform blocks through dynamic offsets. Render passes
//! move their attachments between layouts on their own; explicit barriers
//! are limited to a fixed table of transitions.

mod command_buffer;
pub mod descriptors;
mod device;
mod geometry;
pub mod native;
mod pipeline;
mod shader;

pub use command_buffer::VulkanCommandBuffer;
pub use device::{
    AttachmentDescription, AttachmentReference, RenderPassInfo, SubpassDependency, SubpassDescription,
    VulkanDevice,
};
pub use geometry::VulkanGeometry;
pub use pipeline::{VulkanGraphicsState, VulkanPipeline};
pub use shader::VulkanShader;
