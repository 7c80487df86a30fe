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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Receives shader compiler messages for the application to report.
pub trait ShaderDiagnostics: Send + Sync {
    /// A compile error.
    fn on_error(&self, message: &str);

    /// A compile warning.
    fn on_warning(&self, message: &str);
}

/// Forwards diagnostics to the `log` facade and remembers the last error.
#[derive(Debug, Default)]
pub struct LogDiagnostics {
    last_error: Mutex<Option<String>>,
    errors: AtomicUsize,
    warnings: AtomicUsize,
}

impl LogDiagnostics {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|guard| guard.clone())
    }

    /// Number of errors received.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Number of warnings received.
    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }
}

impl ShaderDiagnostics for LogDiagnostics {
    fn on_error(&self, message: &str) {
        log::error!("Shader error: {message}");
        self.errors.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(message.to_string());
        }
    }

    fn on_warning(&self, message: &str) {
        log::warn!("Shader warning: {message}");
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_diagnostics_counts() {
        let sink = LogDiagnostics::new();
        assert_eq!(sink.last_error(), None);
        sink.on_warning("implicit truncation");
        sink.on_error("first");
        sink.on_error("second");
        assert_eq!(sink.error_count(), 2);
        assert_eq!(sink.warning_count(), 1);
        assert_eq!(sink.last_error().as_deref(), Some("second"));
    }
}
