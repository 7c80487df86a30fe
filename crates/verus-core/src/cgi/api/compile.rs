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

//! Drives the shader toolchain over every branch of a [`ShaderDesc`].
//!
//! Backends differ only in their [`CompileProfile`]: the defines that
//! identify the API, the target profile per stage and the marker that tells
//! errors from warnings in compiler output.

use super::branch::{is_in_ignore_list, Branch};
use super::enums::Stage;
use super::shader::ShaderDesc;
use crate::cgi::context::RenderContext;
use crate::cgi::error::{Result, ShaderError};
use crate::cgi::traits::CompileRequest;
use std::collections::BTreeMap;

/// Backend-specific compile settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileProfile {
    /// Defines identifying the API, each set to `1`.
    pub api_defines: &'static [&'static str],
    /// Target profile per stage, indexed by [`Stage::index`].
    pub targets: [&'static str; 6],
    /// Substring that marks a diagnostic line as an error.
    pub error_marker: &'static str,
}

impl CompileProfile {
    /// Shader model 5.0 through the D3D compiler.
    pub const D3D11: Self = Self {
        api_defines: &["_DIRECT3D", "_DIRECT3D11"],
        targets: ["vs_5_0", "hs_5_0", "ds_5_0", "gs_5_0", "ps_5_0", "cs_5_0"],
        error_marker: "error X",
    };

    /// Shader model 5.1 through the D3D compiler.
    pub const D3D12: Self = Self {
        api_defines: &["_DIRECT3D", "_DIRECT3D12"],
        targets: ["vs_5_1", "hs_5_1", "ds_5_1", "gs_5_1", "ps_5_1", "cs_5_1"],
        error_marker: "error X",
    };

    /// SPIR-V through glslang.
    pub const VULKAN: Self = Self {
        api_defines: &["_VULKAN"],
        targets: ["vert", "tesc", "tese", "geom", "frag", "comp"],
        error_marker: ": error ",
    };

    /// Target profile of `stage`.
    pub fn target(&self, stage: Stage) -> &'static str {
        self.targets[stage.index()]
    }
}

/// Bytecode of one branch, one optional blob per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledBranch {
    /// Entry point prefix.
    pub function: String,
    /// Bytecode indexed by [`Stage::index`].
    pub stages: [Option<Vec<u8>>; 6],
}

impl CompiledBranch {
    /// Returns `true` if `stage` compiled.
    pub fn has_stage(&self, stage: Stage) -> bool {
        self.stages[stage.index()].is_some()
    }

    /// Bytecode of `stage`.
    pub fn bytecode(&self, stage: Stage) -> Option<&[u8]> {
        self.stages[stage.index()].as_deref()
    }

    /// Returns `true` if the branch has a compute stage.
    pub fn is_compute(&self) -> bool {
        self.has_stage(Stage::Cs)
    }
}

/// Branch name to bytecode.
pub type CompiledBranches = BTreeMap<String, CompiledBranch>;

/// Compiles every branch of `desc` with `profile`.
///
/// Diagnostics go to the context's sink. A missing optional stage (hull,
/// domain, geometry) is dropped silently; any other failed stage aborts with
/// [`ShaderError::CompilationFailed`].
pub fn compile_branches(
    ctx: &RenderContext,
    desc: &ShaderDesc,
    profile: &CompileProfile,
) -> Result<CompiledBranches> {
    let stages = desc.stage_list()?;
    let global_defines = ctx.settings().global_shader_defines();
    let mut compiled = CompiledBranches::new();

    for branch_desc in desc.branch_descs() {
        let branch = Branch::parse(&branch_desc, &desc.macro_prefix);
        if is_in_ignore_list(&desc.ignore_list, &branch.name) {
            log::debug!("Shader '{}': skipping ignored branch '{}'", desc.source_name, branch.name);
            continue;
        }

        let mut defines = branch.macros.clone();
        defines.extend(global_defines.iter().cloned());
        defines.extend(
            profile
                .api_defines
                .iter()
                .map(|name| (name.to_string(), "1".to_string())),
        );
        let stage_define = defines.len();
        defines.push((String::new(), "1".to_string()));

        let mut output = CompiledBranch {
            function: branch.function.clone(),
            ..Default::default()
        };
        for &stage in &stages {
            let entry_point = branch.entry_point(stage);
            defines[stage_define].0 = format!("_{}", stage.suffix());
            let result = ctx.compiler().compile(&CompileRequest {
                source: &desc.source,
                source_name: &desc.source_name,
                entry_point: &entry_point,
                stage,
                target: profile.target(stage),
                defines: &defines,
            });

            let missing_optional = report_diagnostics(ctx, profile, stage, &entry_point, &result.diagnostics);
            match result.bytecode {
                Some(bytecode) => output.stages[stage.index()] = Some(bytecode),
                None if missing_optional => {}
                None => {
                    return Err(ShaderError::CompilationFailed {
                        source_name: desc.source_name.clone(),
                        branch: branch.name.clone(),
                        stage: entry_point,
                        details: result.diagnostics.trim().to_string(),
                    }
                    .into())
                }
            }
        }
        compiled.insert(branch.name, output);
    }

    log::info!(
        "Shader '{}' compiled: {} branches, stages {}",
        desc.source_name,
        compiled.len(),
        desc.stages
    );
    Ok(compiled)
}

/// Forwards diagnostics and returns `true` if they only say that an optional
/// stage's entry point is missing.
fn report_diagnostics(
    ctx: &RenderContext,
    profile: &CompileProfile,
    stage: Stage,
    entry_point: &str,
    diagnostics: &str,
) -> bool {
    let quoted = format!("{entry_point}'");
    let mut missing_optional = false;
    for line in diagnostics.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if stage.is_optional() && line.contains(&quoted) && line.contains("not found") {
            missing_optional = true;
            continue;
        }
        if line.contains(profile.error_marker) {
            ctx.diagnostics().on_error(line);
        } else {
            ctx.diagnostics().on_warning(line);
        }
    }
    missing_optional
}
