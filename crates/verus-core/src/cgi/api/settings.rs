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

//! Settings that influence how the render abstraction creates and binds resources.

use serde::{Deserialize, Serialize};

use super::enums::BackendKind;
use crate::cgi::error::{ConfigurationError, Result};

/// Smallest supported number of frames in flight.
pub const MIN_RING_BUFFER_DEPTH: usize = 2;
/// Largest supported number of frames in flight.
pub const MAX_RING_BUFFER_DEPTH: usize = 4;

/// Device-level settings, loaded from JSON or built in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgiSettings {
    /// Which backend the application wants.
    pub backend: BackendKind,
    /// Number of frames that may be in flight; sizes every dynamic region.
    pub ring_buffer_depth: usize,
    /// Extra preprocessor definitions passed to every shader stage.
    pub shader_defines: Vec<(String, String)>,
    /// Value of the `_SHADOW_QUALITY` shader define.
    pub shadow_quality: u32,
    /// Value of the `_MAX_BONES` shader define.
    pub max_bones: u32,
    /// Enables mesh shader dispatch on backends that support it.
    pub mesh_shaders: bool,
    /// Enables ray tracing dispatch on backends that support it.
    pub ray_tracing: bool,
    /// Per-frame capacity of the shader-visible CBV/SRV/UAV heap (D3D12).
    pub descriptor_heap_capacity: usize,
    /// Per-frame capacity of the shader-visible sampler heap (D3D12).
    pub sampler_heap_capacity: usize,
    /// Complex sets each shader's descriptor pool can hold (Vulkan).
    pub complex_set_capacity: usize,
}

impl Default for CgiSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            ring_buffer_depth: 3,
            shader_defines: Vec::new(),
            shadow_quality: 2,
            max_bones: 128,
            mesh_shaders: false,
            ray_tracing: false,
            descriptor_heap_capacity: 10_000,
            sampler_heap_capacity: 500,
            complex_set_capacity: 500,
        }
    }
}

impl CgiSettings {
    /// Default settings for `backend`.
    pub fn for_backend(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Parses settings from JSON. Missing fields take their default value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serializes the settings to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_RING_BUFFER_DEPTH..=MAX_RING_BUFFER_DEPTH).contains(&self.ring_buffer_depth) {
            return Err(ConfigurationError::Invalid(format!(
                "ring_buffer_depth must be in {MIN_RING_BUFFER_DEPTH}..={MAX_RING_BUFFER_DEPTH}, got {}",
                self.ring_buffer_depth
            ))
            .into());
        }
        if self.descriptor_heap_capacity == 0
            || self.sampler_heap_capacity == 0
            || self.complex_set_capacity == 0
        {
            return Err(ConfigurationError::Invalid(
                "descriptor capacities must be positive".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Defines every shader stage receives, before stage-specific ones.
    pub fn global_shader_defines(&self) -> Vec<(String, String)> {
        let mut defines = vec![
            ("_SHADOW_QUALITY".to_string(), self.shadow_quality.to_string()),
            ("_MAX_BONES".to_string(), self.max_bones.to_string()),
        ];
        defines.extend(self.shader_defines.iter().cloned());
        defines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgi::error::CgiError;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = CgiSettings::default();
        assert_eq!(settings.ring_buffer_depth, 3);
        assert_eq!(settings.backend, BackendKind::Vulkan);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let settings =
            CgiSettings::from_json_str(r#"{ "backend": "D3D12", "ring_buffer_depth": 2 }"#)
                .unwrap();
        assert_eq!(settings.backend, BackendKind::D3D12);
        assert_eq!(settings.ring_buffer_depth, 2);
        assert_eq!(settings.descriptor_heap_capacity, 10_000);
    }

    #[test]
    fn test_ring_depth_out_of_range() {
        let err = CgiSettings::from_json_str(r#"{ "ring_buffer_depth": 1 }"#).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_malformed_json() {
        let err = CgiSettings::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, CgiError::Settings(_)));
    }

    #[test]
    fn test_json_round_trip_keeps_defines() {
        let mut settings = CgiSettings::for_backend(BackendKind::D3D11);
        settings
            .shader_defines
            .push(("USE_FOG".to_string(), "1".to_string()));
        let json = settings.to_json_string().unwrap();
        let back = CgiSettings::from_json_str(&json).unwrap();
        assert_eq!(back, settings);
        let defines = back.global_shader_defines();
        assert_eq!(defines[0].0, "_SHADOW_QUALITY");
        assert_eq!(defines.last().unwrap().0, "USE_FOG");
    }
}
