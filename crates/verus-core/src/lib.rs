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

//! # Verus Core
//!
//! Foundational crate of the Verus render command abstraction ("CGI").
//!
//! It defines the engine-level vocabulary (formats, layouts, handles, descriptors),
//! the textual mini-languages content files embed, the traits every graphics
//! backend implements, and the per-frame bookkeeping (ring buffer, retire queue)
//! shared by all backends. Concrete Direct3D 11, Direct3D 12 and Vulkan
//! implementations live in the `verus-infra` crate.

#![warn(missing_docs)]

pub mod cgi;

pub use cgi::context::RenderContext;
pub use cgi::error::{CgiError, ConfigurationError, RuntimeError};
