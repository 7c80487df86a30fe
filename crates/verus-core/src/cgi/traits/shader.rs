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

use crate::cgi::api::{CSHandle, DescriptorSetDesc, ShaderDesc, Stage, TextureId};
use crate::cgi::context::RenderContext;
use crate::cgi::error::{ConfigurationError, Result};
use std::any::Any;

/// Compiled shader branches and the descriptor sets they read.
///
/// Descriptor sets are registered in order after `init` and sealed with
/// [`create_pipeline_layout`](Shader::create_pipeline_layout). Complex sets
/// are created and freed at any time; freed slots are recycled only after
/// the ring buffer has cycled.
pub trait Shader: Send + Sync {
    /// Compiles every branch of `desc`.
    fn init(&mut self, ctx: &RenderContext, desc: &ShaderDesc) -> Result<()>;

    /// Hands every native object to the retire queue.
    fn done(&mut self, ctx: &RenderContext);

    /// Name of the source the shader was compiled from.
    fn source_name(&self) -> &str;

    /// Returns `true` if `branch` was compiled.
    fn has_branch(&self, branch: &str) -> bool;

    /// Returns `true` if `branch` has bytecode for `stage`.
    fn has_stage(&self, branch: &str, stage: Stage) -> bool;

    /// Registers the next descriptor set. `desc.set_number` must equal the
    /// number of sets created so far.
    fn create_descriptor_set(&mut self, ctx: &RenderContext, desc: DescriptorSetDesc) -> Result<()>;

    /// Builds the root signature or pipeline layout from the registered sets.
    fn create_pipeline_layout(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Number of registered descriptor sets.
    fn descriptor_set_count(&self) -> usize;

    /// Description of descriptor set `set`.
    fn descriptor_set_desc(&self, set: usize) -> Result<&DescriptorSetDesc>;

    /// CPU copy of the uniform block of `set`, uploaded by `bind_descriptors`.
    fn uniform_data_mut(&mut self, set: usize) -> Result<&mut [u8]>;

    /// Assigns textures to the sampler slots of `set` and returns the complex set handle.
    ///
    /// `mip_levels` and `array_layers` select a single mip level or array
    /// layer per texture; `-1` (or `None`) means the whole resource.
    fn bind_descriptor_set_textures(
        &mut self,
        ctx: &RenderContext,
        set: usize,
        textures: &[TextureId],
        mip_levels: Option<&[i32]>,
        array_layers: Option<&[i32]>,
    ) -> Result<CSHandle>;

    /// Frees a complex set and resets `csh`. Its views are retired.
    fn free_descriptor_set(&mut self, ctx: &RenderContext, csh: &mut CSHandle) -> Result<()>;

    /// Opens a uniform upload session spanning several `bind_descriptors` calls.
    fn begin_bind_descriptors(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Closes the upload session.
    fn end_bind_descriptors(&mut self, ctx: &RenderContext) -> Result<()>;

    /// Returns the shader as `Any` for backend down-casts.
    fn as_any(&self) -> &dyn Any;

    /// Returns the shader as mutable `Any` for backend down-casts.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Shader + '_ {
    /// Copies `value` into the uniform block of `set`.
    pub fn write_uniform<T: bytemuck::Pod>(&mut self, set: usize, value: &T) -> Result<()> {
        let bytes = bytemuck::bytes_of(value);
        let data = self.uniform_data_mut(set)?;
        if bytes.len() > data.len() {
            return Err(ConfigurationError::CountMismatch {
                what: "uniform block size",
                expected: data.len(),
                actual: bytes.len(),
            }
            .into());
        }
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}
