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

//! # Verus Infra
//!
//! Concrete backends of the render command abstraction defined in `verus-core`.
//!
//! Each backend (`d3d11`, `d3d12`, `vulkan`) talks to a software native layer:
//! native enums carry the vendor API values, devices own simulated resources
//! and command buffers record native command streams that the device executes
//! on submit. A real FFI binding plugs in at that layer.

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::{create_context, create_context_with, create_device, EntryPointCompiler};
