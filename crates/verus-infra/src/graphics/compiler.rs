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

//! A shader toolchain stand-in that resolves entry points.
//!
//! [`EntryPointCompiler`] does what the engine needs from the external
//! compiler without linking one: it checks that the requested entry point is
//! declared, reports `#pragma message` lines as warnings and produces a
//! bytecode blob with the container magic of the target API. Diagnostics use
//! the message format of the real toolchain so the compile driver can tell
//! errors, warnings and missing optional stages apart.

use std::fmt::Write as _;
use verus_core::cgi::api::BackendKind;
use verus_core::cgi::traits::{CompileOutput, CompileRequest, ShaderCompiler};

/// Message dialect and container format of a toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderDialect {
    /// The D3D compiler: DXBC containers, `error X####` messages.
    Hlsl,
    /// glslang: SPIR-V modules, `error :` messages.
    Glslang,
}

/// DXBC container magic.
pub const DXBC_MAGIC: [u8; 4] = *b"DXBC";
/// SPIR-V magic number, little-endian.
pub const SPIRV_MAGIC: [u8; 4] = 0x0723_0203u32.to_le_bytes();

/// Compiles by locating entry points in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPointCompiler {
    dialect: ShaderDialect,
}

impl EntryPointCompiler {
    /// Creates a compiler speaking `dialect`.
    pub fn new(dialect: ShaderDialect) -> Self {
        Self { dialect }
    }

    /// The toolchain a backend uses.
    pub fn for_backend(backend: BackendKind) -> Self {
        match backend {
            BackendKind::D3D11 | BackendKind::D3D12 => Self::new(ShaderDialect::Hlsl),
            BackendKind::Vulkan => Self::new(ShaderDialect::Glslang),
        }
    }

    /// The dialect.
    pub fn dialect(&self) -> ShaderDialect {
        self.dialect
    }

    fn magic(&self) -> [u8; 4] {
        match self.dialect {
            ShaderDialect::Hlsl => DXBC_MAGIC,
            ShaderDialect::Glslang => SPIRV_MAGIC,
        }
    }

    fn missing_entry_point(&self, source_name: &str, entry_point: &str) -> String {
        match self.dialect {
            ShaderDialect::Hlsl => {
                format!("{source_name}: error X3501: '{entry_point}': entrypoint not found")
            }
            ShaderDialect::Glslang => {
                format!("{source_name}: error : entry point '{entry_point}' not found")
            }
        }
    }

    fn warning(&self, source_name: &str, line: usize, message: &str) -> String {
        match self.dialect {
            ShaderDialect::Hlsl => format!("{source_name}({line}): warning X3206: {message}"),
            ShaderDialect::Glslang => format!("{source_name}:{line}: warning : {message}"),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Drops a trailing `//` comment.
fn strip_comment(line: &str) -> &str {
    line.find("//").map_or(line, |at| &line[..at])
}

/// Returns `true` if `entry_point` appears as a function name followed by `(`.
pub fn declares_entry_point(source: &str, entry_point: &str) -> bool {
    if entry_point.is_empty() {
        return false;
    }
    source.lines().map(strip_comment).any(|line| {
        line.match_indices(entry_point).any(|(at, _)| {
            let starts_word = line[..at].chars().next_back().map_or(true, |c| !is_ident_char(c));
            let rest = &line[at + entry_point.len()..];
            starts_word && rest.trim_start().starts_with('(')
        })
    })
}

/// Extracts the text of a `#pragma message("...")` line.
fn pragma_message(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("#pragma")?.trim_start();
    let rest = rest.strip_prefix("message")?.trim_start().strip_prefix('(')?;
    let rest = rest.trim_start().strip_prefix('"')?;
    rest.find('"').map(|end| &rest[..end])
}

impl ShaderCompiler for EntryPointCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> CompileOutput {
        let mut diagnostics = String::new();
        for (number, line) in request.source.lines().enumerate() {
            if let Some(message) = pragma_message(line) {
                let _ = writeln!(
                    diagnostics,
                    "{}",
                    self.warning(request.source_name, number + 1, message)
                );
            }
        }

        if !declares_entry_point(request.source, request.entry_point) {
            log::trace!(
                "{}: no entry point '{}' for {}",
                request.source_name,
                request.entry_point,
                request.target
            );
            let _ = writeln!(
                diagnostics,
                "{}",
                self.missing_entry_point(request.source_name, request.entry_point)
            );
            return CompileOutput {
                bytecode: None,
                diagnostics,
            };
        }

        let defines = request
            .defines
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(";");
        let mut bytecode = self.magic().to_vec();
        bytecode.extend_from_slice(
            format!("{}:{}:{}", request.target, request.entry_point, defines).as_bytes(),
        );
        CompileOutput {
            bytecode: Some(bytecode),
            diagnostics,
        }
    }
}

/// Returns `true` if `bytecode` starts with the container magic of `dialect`.
pub fn has_magic(bytecode: &[u8], dialect: ShaderDialect) -> bool {
    let magic = EntryPointCompiler::new(dialect).magic();
    bytecode.starts_with(&magic)
}
