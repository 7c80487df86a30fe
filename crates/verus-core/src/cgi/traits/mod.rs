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

//! Defines the traits every graphics backend implements.
//!
//! - [`RenderDevice`]: creates and releases backend objects, owns the render
//!   pass and framebuffer registry.
//! - [`Geometry`], [`Shader`], [`Pipeline`]: load-time objects built from
//!   content descriptions.
//! - [`CommandBuffer`]: per-frame command recording.
//! - [`ShaderCompiler`] and [`ShaderDiagnostics`]: the seams towards the
//!   external shader toolchain and the application's message sink.

mod command_buffer;
mod compiler;
mod device;
mod diagnostics;
mod geometry;
mod pipeline;
mod shader;

pub use self::command_buffer::{CommandBuffer, CommandBufferState, Rect};
pub use self::compiler::{CompileOutput, CompileRequest, ShaderCompiler};
pub use self::device::RenderDevice;
pub use self::diagnostics::{LogDiagnostics, ShaderDiagnostics};
pub use self::geometry::Geometry;
pub use self::pipeline::Pipeline;
pub use self::shader::Shader;
