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

//! The Direct3D 11 backend.
//!
//! Direct3D 11 executes commands on an immediate context, so there is
//! nothing to transition and nothing to submit: geometry writes go through
//! `Map`/`UpdateSubresource` and command buffers issue their calls as they
//! record them.

mod command_buffer;
mod device;
mod geometry;
pub mod native;
mod pipeline;
mod shader;

pub use command_buffer::D3D11CommandBuffer;
pub use device::D3D11Device;
pub use geometry::D3D11Geometry;
pub use pipeline::D3D11Pipeline;
pub use shader::D3D11Shader;
