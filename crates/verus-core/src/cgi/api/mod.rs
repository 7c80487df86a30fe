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

//! Engine-level vocabulary of the render command abstraction.
//!
//! Plain data types shared by every backend: enums and flags, index handles,
//! geometry, shader, pipeline and render pass descriptions, the textual
//! mini-languages content files embed, and the bookkeeping tables (descriptor
//! sets, complex sets) each backend fills with its own native objects.

mod branch;
mod complex_set;
mod compile;
mod enums;
mod flags;
mod geometry;
mod handles;
mod parser;
mod pipeline;
mod render_pass;
mod settings;
mod shader;
mod texture;

pub use self::branch::*;
pub use self::complex_set::*;
pub use self::compile::*;
pub use self::enums::*;
pub use self::flags::*;
pub use self::geometry::*;
pub use self::handles::*;
pub use self::parser::*;
pub use self::pipeline::*;
pub use self::render_pass::*;
pub use self::settings::*;
pub use self::shader::*;
pub use self::texture::*;
