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

use crate::cgi::api::Stage;

/// One stage of one branch handed to the shader toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest<'a> {
    /// Full shader source.
    pub source: &'a str,
    /// Name used in diagnostics.
    pub source_name: &'a str,
    /// Entry point, e.g. `mainVS`.
    pub entry_point: &'a str,
    /// Stage being compiled.
    pub stage: Stage,
    /// Target profile, e.g. `vs_5_0`.
    pub target: &'a str,
    /// Preprocessor defines in declaration order.
    pub defines: &'a [(String, String)],
}

/// What the toolchain produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    /// Bytecode, `None` if compilation failed.
    pub bytecode: Option<Vec<u8>>,
    /// Raw compiler messages, one per line.
    pub diagnostics: String,
}

/// Turns shader source into bytecode.
pub trait ShaderCompiler: Send + Sync {
    /// Compiles one stage.
    fn compile(&self, request: &CompileRequest<'_>) -> CompileOutput;
}
