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

use crate::cgi::api::{PipelineBindPoint, PipelineDesc};
use crate::cgi::context::RenderContext;
use crate::cgi::error::Result;
use std::any::Any;

/// An immutable pipeline state object.
pub trait Pipeline: Send + Sync {
    /// Builds the native pipeline from `desc`. Graphics or compute is chosen by `desc.compute`.
    fn init(&mut self, ctx: &RenderContext, desc: &PipelineDesc<'_>) -> Result<()>;

    /// Hands the native object to the retire queue.
    fn done(&mut self, ctx: &RenderContext);

    /// Render pass and subpass a graphics pipeline was built for, or `Compute`.
    fn bind_point(&self) -> PipelineBindPoint;

    /// Returns `true` for compute pipelines.
    fn is_compute(&self) -> bool {
        self.bind_point().is_compute()
    }

    /// Returns the pipeline as `Any` for backend down-casts.
    fn as_any(&self) -> &dyn Any;
}
