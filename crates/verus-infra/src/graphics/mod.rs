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

//! Graphics backends of the render command abstraction.
//!
//! [`create_device`] picks the backend named by the settings;
//! [`create_context`] wires it up with the matching shader toolchain and a
//! diagnostics sink into a ready-to-use [`RenderContext`].

pub mod compiler;
pub mod d3d11;
pub mod d3d12;
pub mod d3d_common;
mod buffers;
mod native;
mod resources;
pub mod vulkan;

pub use compiler::{EntryPointCompiler, ShaderDialect};
pub use resources::{DeviceStats, ViewKind};

use std::any::Any;
use std::sync::Arc;
use verus_core::cgi::api::{BackendKind, CgiSettings};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::{LogDiagnostics, RenderDevice, ShaderDiagnostics};
use verus_core::RenderContext;

/// Creates the device of the backend selected by `settings`.
pub fn create_device(settings: &CgiSettings) -> Arc<dyn RenderDevice> {
    match settings.backend {
        BackendKind::D3D11 => Arc::new(d3d11::D3D11Device::new(settings)),
        BackendKind::D3D12 => Arc::new(d3d12::D3D12Device::new(settings)),
        BackendKind::Vulkan => Arc::new(vulkan::VulkanDevice::new(settings)),
    }
}

/// Creates a render context whose shader diagnostics go to the `log` facade.
pub fn create_context(settings: CgiSettings) -> Result<RenderContext> {
    create_context_with(settings, Arc::new(LogDiagnostics::new()))
}

/// Creates a render context reporting shader diagnostics to `diagnostics`.
pub fn create_context_with(
    settings: CgiSettings,
    diagnostics: Arc<dyn ShaderDiagnostics>,
) -> Result<RenderContext> {
    settings.validate()?;
    let device = create_device(&settings);
    let compiler = Arc::new(EntryPointCompiler::for_backend(settings.backend));
    log::info!("Using the {} backend", settings.backend);
    RenderContext::new(device, compiler, diagnostics, settings)
}

/// Down-casts a CGI object to the concrete type of this backend.
pub(crate) fn downcast<'a, T: 'static>(any: &'a dyn Any, expected: &'static str) -> Result<&'a T> {
    any.downcast_ref::<T>()
        .ok_or_else(|| ConfigurationError::BackendMismatch { expected }.into())
}

/// Mutable flavour of [`downcast`].
pub(crate) fn downcast_mut<'a, T: 'static>(
    any: &'a mut dyn Any,
    expected: &'static str,
) -> Result<&'a mut T> {
    any.downcast_mut::<T>()
        .ok_or_else(|| ConfigurationError::BackendMismatch { expected }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use verus_core::cgi::api::{ViaType, ViaUsage};

    const TYPES: [ViaType; 4] = [ViaType::Floats, ViaType::Halfs, ViaType::Shorts, ViaType::Ubytes];
    const USAGES: [ViaUsage; 9] = [
        ViaUsage::Position,
        ViaUsage::BlendWeights,
        ViaUsage::BlendIndices,
        ViaUsage::Normal,
        ViaUsage::Tangent,
        ViaUsage::Binormal,
        ViaUsage::Color,
        ViaUsage::PSize,
        ViaUsage::TexCoord,
    ];

    #[test]
    fn test_vertex_formats_classify_alike_on_every_backend() {
        let mut mapped = 0;
        for ty in TYPES {
            for components in 1..=4 {
                for usage in USAGES {
                    let d3d = d3d_common::vertex_format(ty, components, usage);
                    let vk = vulkan::native::vertex_format(ty, components, usage);
                    assert_eq!(d3d.is_ok(), vk.is_ok(), "{ty:?} x{components} {usage:?}");
                    let (Ok(d3d), Ok(vk)) = (d3d, vk) else {
                        continue;
                    };
                    assert_eq!(
                        d3d_common::classify_vertex_format(d3d).unwrap(),
                        vulkan::native::classify_vertex_format(vk).unwrap(),
                        "{ty:?} x{components} {usage:?}"
                    );
                    mapped += 1;
                }
            }
        }
        assert!(mapped > 0);
    }

    #[test]
    fn test_context_uses_the_requested_backend() {
        for backend in [BackendKind::D3D11, BackendKind::D3D12, BackendKind::Vulkan] {
            let ctx = create_context(CgiSettings::for_backend(backend)).unwrap();
            assert_eq!(ctx.backend(), backend);
            assert_eq!(ctx.device().backend(), backend);
        }
        let mut settings = CgiSettings::default();
        settings.ring_buffer_depth = 9;
        assert!(create_context(settings).is_err());
    }
}
