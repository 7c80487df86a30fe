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

//! Defines the hierarchy of error types for the render command abstraction.
//!
//! Three kinds of failure are kept apart:
//!
//! * [`ConfigurationError`]: a programmer error (mismatched counts, invalid handles,
//!   unmapped enum values, calls in the wrong command buffer state). These are
//!   validated in every build and are never expected to be recovered mid-frame.
//! * [`RuntimeError`]: a native backend call reported failure. It carries the call
//!   name and the source location that issued it.
//! * [`CgiError::ResourceExhausted`]: a fixed-capacity pool or heap is full.
//!
//! Shader compiler diagnostics are not errors; they are forwarded through
//! [`ShaderDiagnostics`](crate::cgi::traits::ShaderDiagnostics).

use std::fmt::Debug;

/// A programmer error detected while building or recording GPU work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// An engine-level value has no counterpart in the selected backend.
    #[error("{mapper}(): no native mapping for {value}")]
    UnmappedEnum {
        /// The mapping function that rejected the value.
        mapper: &'static str,
        /// The rejected value, formatted with `Debug`.
        value: String,
    },
    /// Two counts that must agree did not.
    #[error("{what}: expected {expected}, got {actual}")]
    CountMismatch {
        /// What was being counted.
        what: &'static str,
        /// The count required by the surrounding state.
        expected: usize,
        /// The count that was supplied.
        actual: usize,
    },
    /// A handle or index does not refer to a live object.
    #[error("invalid {kind} handle {index}")]
    InvalidHandle {
        /// The kind of handle (e.g. "render pass").
        kind: &'static str,
        /// The raw index carried by the handle.
        index: i64,
    },
    /// An operation was issued in a state that does not allow it.
    #[error("{operation}() is not allowed while {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// A description of the current state.
        state: String,
    },
    /// A textual mini-language string could not be parsed.
    #[error("cannot parse {what} '{input}': {reason}")]
    Parse {
        /// Which mini-language was being parsed.
        what: &'static str,
        /// The offending input.
        input: String,
        /// Why the parser rejected it.
        reason: String,
    },
    /// An object created by one backend was handed to another backend.
    #[error("expected a {expected} object, got something else")]
    BackendMismatch {
        /// The type name the receiving backend expected.
        expected: &'static str,
    },
    /// No barrier recipe exists for a layout transition.
    #[error("unsupported image layout transition {from} -> {to}")]
    UnsupportedTransition {
        /// The source layout.
        from: String,
        /// The destination layout.
        to: String,
    },
    /// A free-form invariant violation.
    #[error("{0}")]
    Invalid(String),
}

impl ConfigurationError {
    /// Builds an [`ConfigurationError::UnmappedEnum`] from any `Debug` value.
    pub fn unmapped(mapper: &'static str, value: impl Debug) -> Self {
        Self::UnmappedEnum {
            mapper,
            value: format!("{value:?}"),
        }
    }

    /// Builds an [`ConfigurationError::InvalidState`].
    pub fn invalid_state(operation: &'static str, state: impl Into<String>) -> Self {
        Self::InvalidState {
            operation,
            state: state.into(),
        }
    }
}

/// A native backend call failed.
///
/// Use the [`runtime_error!`](crate::runtime_error) macro to construct one; it
/// captures the issuing file and line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{call}; code={code:#x} ({file}:{line})")]
pub struct RuntimeError {
    /// The native call that failed, e.g. `CreateBuffer()`.
    pub call: String,
    /// The native result code (`HRESULT` or `VkResult`), sign-extended.
    pub code: i64,
    /// Source file of the failing call site.
    pub file: &'static str,
    /// Source line of the failing call site.
    pub line: u32,
}

impl RuntimeError {
    /// Creates a new runtime error. Prefer [`runtime_error!`](crate::runtime_error).
    pub fn new(call: impl Into<String>, code: i64, file: &'static str, line: u32) -> Self {
        Self {
            call: call.into(),
            code,
            file,
            line,
        }
    }
}

/// Builds a [`RuntimeError`] tagged with the current file and line.
#[macro_export]
macro_rules! runtime_error {
    ($call:expr, $code:expr) => {
        $crate::cgi::error::RuntimeError::new($call, ($code) as i64, file!(), line!())
    };
}

/// A shader could not be turned into usable bytecode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShaderError {
    /// A required stage of a branch failed to compile.
    #[error("shader '{source_name}' failed to compile branch '{branch}' ({stage}): {details}")]
    CompilationFailed {
        /// The name of the shader source.
        source_name: String,
        /// The branch being compiled.
        branch: String,
        /// The stage entry point that failed.
        stage: String,
        /// Compiler output.
        details: String,
    },
    /// A pipeline asked for a branch the shader never compiled.
    #[error("shader '{source_name}' has no branch '{branch}'")]
    BranchNotFound {
        /// The name of the shader source.
        source_name: String,
        /// The requested branch.
        branch: String,
    },
}

/// The top-level error type of the render command abstraction.
#[derive(Debug, thiserror::Error)]
pub enum CgiError {
    /// A programmer error. See [`ConfigurationError`].
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A native call failed. See [`RuntimeError`].
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// Shader bytecode could not be produced.
    #[error(transparent)]
    Shader(#[from] ShaderError),
    /// A fixed-capacity pool, heap or per-frame region is full.
    #[error("{what} is full (capacity {capacity})")]
    ResourceExhausted {
        /// What ran out.
        what: String,
        /// The capacity that was exceeded.
        capacity: usize,
    },
    /// The device or settings do not enable an optional feature.
    #[error("feature not supported: {0}")]
    FeatureUnsupported(&'static str),
    /// Settings could not be deserialized.
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}

impl CgiError {
    /// Builds a [`CgiError::ResourceExhausted`].
    pub fn exhausted(what: impl Into<String>, capacity: usize) -> Self {
        Self::ResourceExhausted {
            what: what.into(),
            capacity,
        }
    }

    /// Returns `true` if this is a programmer error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = CgiError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_unmapped_enum_display() {
        let err = ConfigurationError::unmapped("ToNativeFormat", 42u32);
        assert_eq!(err.to_string(), "ToNativeFormat(): no native mapping for 42");
    }

    #[test]
    fn test_runtime_error_captures_location() {
        let err = runtime_error!("CreateBuffer()", 0x8007000Eu32);
        assert_eq!(err.call, "CreateBuffer()");
        assert_eq!(err.code, 0x8007000E);
        assert!(err.file.ends_with("error.rs"));
        assert!(err.line > 0);
        assert!(err.to_string().starts_with("CreateBuffer(); code=0x8007000e"));
    }

    #[test]
    fn test_cgi_error_from_configuration() {
        let err: CgiError = ConfigurationError::CountMismatch {
            what: "clear values",
            expected: 2,
            actual: 1,
        }
        .into();
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "clear values: expected 2, got 1");
    }

    #[test]
    fn test_transparent_source_is_forwarded() {
        let err: CgiError = runtime_error!("vkCreateBuffer()", -2).into();
        // `transparent` delegates `source()` to the wrapped error, which has none.
        assert!(err.source().is_none());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_exhausted_display() {
        let err = CgiError::exhausted("DynamicDescriptorHeap", 16);
        assert_eq!(err.to_string(), "DynamicDescriptorHeap is full (capacity 16)");
    }

    #[test]
    fn test_shader_error_display() {
        let err = ShaderError::BranchNotFound {
            source_name: "Quad.hlsl".to_string(),
            branch: "#Blur".to_string(),
        };
        assert_eq!(err.to_string(), "shader 'Quad.hlsl' has no branch '#Blur'");
    }
}
