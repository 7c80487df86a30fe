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

//! The Direct3D 12 backend.
//!
//! Command buffers record into per-frame command lists that are executed
//! on `submit`. Descriptors live in two shader-visible heaps, one for views
//! and one for samplers, each split into a static block and one dynamic
//! block per ring slot. Textures change state through explicit resource
//! barriers that the device tracks per subresource.

mod command_buffer;
pub mod descriptor_heap;
mod device;
mod geometry;
pub mod native;
mod pipeline;
mod shader;

pub use command_buffer::D3D12CommandBuffer;
pub use device::{D3D12Device, HeapUsage};
pub use geometry::D3D12Geometry;
pub use pipeline::{D3D12GraphicsState, D3D12Pipeline};
pub use shader::D3D12Shader;
