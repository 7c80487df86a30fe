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

//! Branch compilation and diagnostics through the entry point compiler.

mod common;

use anyhow::Result;
use common::{BACKENDS, CUBE_SOURCE};
use std::sync::Arc;
use verus_core::cgi::api::{BackendKind, CgiSettings, PipelineDesc, ShaderDesc, Stage};
use verus_core::cgi::error::ShaderError;
use verus_core::cgi::traits::LogDiagnostics;
use verus_core::{CgiError, RenderContext};

const BRANCHED_SOURCE: &str = r#"
//@main
//@main:Depth DEPTH
//@mainShadow:Shadow DEPTH SHADOW_QUALITY=2
#pragma message("using fallback lighting")
float4 mainVS() : SV_Position { return 0; }
float4 mainFS() : SV_Target { return 1; }
float4 mainShadowVS() : SV_Position { return 0; }
float4 mainShadowFS() : SV_Target { return 0; }
"#;

fn context_with_diagnostics(backend: BackendKind) -> Result<(RenderContext, Arc<LogDiagnostics>)> {
    common::init_logging();
    let diagnostics = Arc::new(LogDiagnostics::new());
    let ctx = verus_infra::create_context_with(CgiSettings::for_backend(backend), diagnostics.clone())?;
    Ok((ctx, diagnostics))
}

#[test]
fn test_missing_required_stage_fails_compilation() -> Result<()> {
    for backend in BACKENDS {
        let (ctx, diagnostics) = context_with_diagnostics(backend)?;
        let source = "float4 mainVS() : SV_Position { return 0; }\n";
        let err = ctx
            .create_shader(&ShaderDesc::new("Broken.hlsl", source).with_branches(["main"]))
            .err()
            .expect("fragment stage is missing");
        match err {
            CgiError::Shader(ShaderError::CompilationFailed {
                source_name,
                branch,
                stage,
                details,
            }) => {
                assert_eq!(source_name, "Broken.hlsl");
                assert_eq!(branch, "main");
                assert_eq!(stage, "mainFS");
                assert!(details.contains("not found"), "{backend}: {details}");
            }
            other => panic!("{backend}: unexpected error {other}"),
        }
        assert_eq!(diagnostics.error_count(), 1, "{backend}");
        assert!(diagnostics.last_error().is_some_and(|e| e.contains("mainFS")));
    }
    Ok(())
}

#[test]
fn test_missing_optional_stage_is_skipped_silently() -> Result<()> {
    for backend in BACKENDS {
        let (ctx, diagnostics) = context_with_diagnostics(backend)?;
        let shader = ctx.create_shader(
            &ShaderDesc::new("Cube.hlsl", CUBE_SOURCE)
                .with_branches(["main"])
                .with_stages("VGF"),
        )?;
        assert!(shader.has_stage("main", Stage::Vs));
        assert!(!shader.has_stage("main", Stage::Gs));
        assert!(shader.has_stage("main", Stage::Fs));
        assert_eq!(diagnostics.error_count(), 0, "{backend}");
        assert_eq!(diagnostics.warning_count(), 0, "{backend}");
    }
    Ok(())
}

#[test]
fn test_branches_are_scanned_from_source() -> Result<()> {
    let (ctx, diagnostics) = context_with_diagnostics(BackendKind::Vulkan)?;
    let mut shader = ctx.create_shader(&ShaderDesc::new("Lit.hlsl", BRANCHED_SOURCE).with_ignore_list(["Depth"]))?;
    assert!(shader.has_branch("main"));
    assert!(shader.has_branch("Shadow"));
    assert!(!shader.has_branch("Depth"));
    // One pragma per compiled stage of the two branches.
    assert_eq!(diagnostics.warning_count(), 4);
    assert_eq!(diagnostics.error_count(), 0);

    shader.create_pipeline_layout(&ctx)?;
    let err = ctx
        .create_pipeline(&PipelineDesc::compute(shader.as_ref(), "Depth"))
        .err()
        .expect("ignored branch is not compiled");
    assert!(err.is_configuration() || matches!(err, CgiError::Shader(_)));
    shader.done(&ctx);
    Ok(())
}

#[test]
fn test_unknown_stage_letter_is_rejected() -> Result<()> {
    let ctx = common::context(BackendKind::D3D11)?;
    let err = ctx
        .create_shader(&ShaderDesc::new("Cube.hlsl", CUBE_SOURCE).with_stages("VXF"))
        .err()
        .expect("X is not a stage");
    assert!(err.is_configuration());
    Ok(())
}
