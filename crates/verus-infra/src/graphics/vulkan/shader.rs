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

//! Vulkan shaders, their pipeline layout and their descriptor pool.
//!
//! Set layout `n` holds the uniform buffer of set `n` at binding 0, read
//! through a dynamic offset, followed by one binding per texture slot. The
//! first push constant candidate gets an empty set layout and a push
//! constant range instead.
//!
//! Sets without textures are allocated once, when the pipeline layout is
//! created. Sets with textures are allocated per complex set, from the same
//! pool.

use super::descriptors::{
    DescriptorPoolId, DescriptorSetLayoutBinding, DescriptorSetLayoutDesc, DescriptorWrite,
    PipelineLayoutDesc, PushConstantRange,
};
use super::device::VulkanDevice;
use super::native::{sampler_create_info, ToVk};
use crate::graphics::resources::{per_texture, single, ViewKind};
use ash::vk;
use std::any::Any;
use verus_core::cgi::api::{
    compile_branches, BufferId, CSHandle, CompileProfile, CompiledBranch, CompiledBranches,
    ComplexSetPool, DescriptorSetDesc, DescriptorSetId, DescriptorSetTable, DeviceResource,
    PipelineId, Sampler, SamplerId, ShaderDesc, Stage, TextureId, ViewId,
};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::{RenderDevice, Shader};
use verus_core::RenderContext;

#[derive(Debug, Default)]
struct VulkanSetNative {
    uniform_buffer: Option<BufferId>,
    push_constants: bool,
    /// Allocated with the pipeline layout for sets without textures.
    descriptor_set: Option<DescriptorSetId>,
}

#[derive(Debug, Clone)]
struct VulkanComplexSet {
    descriptor_set: DescriptorSetId,
    owned_views: Vec<ViewId>,
    owned_samplers: Vec<SamplerId>,
}

#[derive(Debug)]
struct VulkanPipelineLayout {
    id: PipelineId,
    desc: PipelineLayoutDesc,
    pool: DescriptorPoolId,
}

/// What binding one descriptor set records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VulkanSetBinding {
    PushConstants {
        stage_flags: vk::ShaderStageFlags,
        data: Vec<u8>,
    },
    DescriptorSet {
        set: u32,
        descriptor_set: DescriptorSetId,
        dynamic_offsets: Vec<u32>,
    },
}

/// A compiled Vulkan shader.
pub struct VulkanShader {
    device: VulkanDevice,
    source_name: String,
    branches: CompiledBranches,
    sets: DescriptorSetTable<VulkanSetNative>,
    complex_sets: ComplexSetPool<VulkanComplexSet>,
    layout: Option<VulkanPipelineLayout>,
    in_bind_session: bool,
}

fn set_layout(desc: &DescriptorSetDesc, push_constants: bool) -> Result<DescriptorSetLayoutDesc> {
    if push_constants {
        return Ok(DescriptorSetLayoutDesc::default());
    }
    let stage_flags = desc.stage_flags.to_vk()?;
    let mut bindings = Vec::with_capacity(desc.samplers.len() + 1);
    if desc.ub_size > 0 {
        bindings.push(DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            descriptor_count: 1,
            stage_flags,
            immutable_sampler: None,
        });
    }
    for (i, &kind) in desc.samplers.iter().enumerate() {
        let (descriptor_type, immutable_sampler) = if kind.is_storage() {
            (vk::DescriptorType::STORAGE_IMAGE, None)
        } else {
            (
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                kind.state().map(sampler_create_info).transpose()?,
            )
        };
        bindings.push(DescriptorSetLayoutBinding {
            binding: i as u32 + 1,
            descriptor_type,
            descriptor_count: 1,
            stage_flags,
            immutable_sampler,
        });
    }
    Ok(DescriptorSetLayoutDesc {
        bindings,
        capacity: desc.capacity,
    })
}

impl VulkanShader {
    pub(crate) fn new(device: VulkanDevice) -> Self {
        Self {
            device,
            source_name: String::new(),
            branches: CompiledBranches::new(),
            sets: DescriptorSetTable::default(),
            complex_sets: ComplexSetPool::default(),
            layout: None,
            in_bind_session: false,
        }
    }

    pub(crate) fn branch(&self, name: &str) -> Option<&CompiledBranch> {
        self.branches.get(name)
    }

    fn require_layout(&self, operation: &'static str) -> Result<&VulkanPipelineLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| ConfigurationError::invalid_state(operation, "create_pipeline_layout was not called").into())
    }

    /// The `VkPipelineLayout` object.
    pub(crate) fn pipeline_layout(&self) -> Result<PipelineId> {
        self.require_layout("pipeline_layout").map(|layout| layout.id)
    }

    /// The pipeline layout description, once it exists.
    pub fn pipeline_layout_desc(&self) -> Option<&PipelineLayoutDesc> {
        self.layout.as_ref().map(|layout| &layout.desc)
    }

    /// The pool every set of the shader is allocated from.
    pub fn descriptor_pool(&self) -> Option<DescriptorPoolId> {
        self.layout.as_ref().map(|layout| layout.pool)
    }

    pub(crate) fn push_constant_range(&self) -> Option<PushConstantRange> {
        self.layout
            .as_ref()
            .and_then(|layout| layout.desc.push_constant_ranges.first().copied())
    }

    fn uniform_write(entry_desc: &DescriptorSetDesc, buffer: Option<BufferId>) -> Option<DescriptorWrite> {
        buffer.map(|buffer| DescriptorWrite::UniformBufferDynamic {
            binding: 0,
            buffer,
            range: entry_desc.ub_size as u64,
        })
    }

    /// Uploads the uniform block of `set` and returns how to bind it.
    ///
    /// Returns `None` when `csh` refers to a complex set that was freed.
    pub(crate) fn prepare_bind(
        &mut self,
        ctx: &RenderContext,
        set: usize,
        csh: CSHandle,
    ) -> Result<Option<VulkanSetBinding>> {
        let complex = if csh.is_set() {
            let complex_set = self.complex_sets.get(csh)?;
            let Some(native) = complex_set.native.as_ref() else {
                return Ok(None);
            };
            if complex_set.set_number != set {
                return Err(ConfigurationError::Invalid(format!(
                    "{csh:?} was created for set {}, not set {set}",
                    complex_set.set_number
                ))
                .into());
            }
            Some(native.descriptor_set)
        } else {
            None
        };

        let depth = ctx.ring_buffer_depth();
        let entry = self.sets.get_mut(set)?;
        if entry.native.push_constants {
            return Ok(Some(VulkanSetBinding::PushConstants {
                stage_flags: entry.desc.stage_flags.to_vk()?,
                data: entry.uniform_data.clone(),
            }));
        }

        let mut dynamic_offsets = Vec::new();
        if let Some(buffer) = entry.native.uniform_buffer {
            let slot = entry.next_uniform_slot(ctx.frame_count())?;
            let aligned = entry.desc.aligned_ub_size();
            let region = aligned * entry.desc.capacity.max(1);
            let offset = region * (ctx.ring_buffer_index() % depth) + slot * aligned;
            self.device
                .resources()
                .write_buffer(buffer, offset, &entry.uniform_data)?;
            dynamic_offsets.push(offset as u32);
        }

        let descriptor_set = complex.or(entry.native.descriptor_set).ok_or_else(|| {
            ConfigurationError::Invalid(format!(
                "set {set} of shader '{}' has texture slots and needs a complex set",
                self.source_name
            ))
        })?;
        Ok(Some(VulkanSetBinding::DescriptorSet {
            set: set as u32,
            descriptor_set,
            dynamic_offsets,
        }))
    }

    fn retire_complex_set(ctx: &RenderContext, native: VulkanComplexSet) {
        ctx.retire(DeviceResource::DescriptorSet(native.descriptor_set), 0);
        for view in native.owned_views {
            ctx.retire(DeviceResource::View(view), 0);
        }
        for sampler in native.owned_samplers {
            ctx.retire(DeviceResource::Sampler(sampler), 0);
        }
    }

    fn release_now(&self, views: &[ViewId], samplers: &[SamplerId]) {
        let resources = self.device.resources();
        for &view in views {
            if let Err(err) = resources.release_view(view) {
                log::warn!("Failed to release view {view:?}: {err}");
            }
        }
        for &sampler in samplers {
            if let Err(err) = resources.release_sampler(sampler) {
                log::warn!("Failed to release sampler {sampler:?}: {err}");
            }
        }
    }

    /// Allocates the sets that need no texture, rolling back on failure.
    fn allocate_own_sets(&mut self, pool: DescriptorPoolId) -> Result<()> {
        let mut allocated = Vec::new();
        for set in 0..self.sets.len() {
            let entry = self.sets.get(set)?;
            if entry.native.push_constants || entry.desc.has_samplers() {
                continue;
            }
            let Some(write) = Self::uniform_write(&entry.desc, entry.native.uniform_buffer) else {
                continue;
            };
            match self.device.allocate_descriptor_set(pool, vec![write]) {
                Ok(id) => allocated.push((set, id)),
                Err(err) => {
                    for (_, id) in allocated {
                        if let Err(err) = self.device.release(DeviceResource::DescriptorSet(id)) {
                            log::warn!("Failed to free descriptor set {id:?}: {err}");
                        }
                    }
                    return Err(err);
                }
            }
        }
        for (set, id) in allocated {
            self.sets.get_mut(set)?.native.descriptor_set = Some(id);
        }
        Ok(())
    }
}

impl Shader for VulkanShader {
    fn init(&mut self, ctx: &RenderContext, desc: &ShaderDesc) -> Result<()> {
        self.source_name = desc.source_name.clone();
        self.branches = compile_branches(ctx, desc, &CompileProfile::VULKAN)?;
        Ok(())
    }

    fn done(&mut self, ctx: &RenderContext) {
        for entry in self.sets.drain() {
            if let Some(buffer) = entry.native.uniform_buffer {
                ctx.retire(DeviceResource::Buffer(buffer), 0);
            }
            if let Some(set) = entry.native.descriptor_set {
                ctx.retire(DeviceResource::DescriptorSet(set), 0);
            }
        }
        for native in self.complex_sets.drain() {
            Self::retire_complex_set(ctx, native);
        }
        if let Some(layout) = self.layout.take() {
            ctx.retire(DeviceResource::Pipeline(layout.id), 0);
            if let Err(err) = self.device.destroy_descriptor_pool(layout.pool) {
                log::warn!("Failed to destroy the descriptor pool of '{}': {err}", self.source_name);
            }
        }
        self.branches.clear();
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn has_branch(&self, branch: &str) -> bool {
        self.branches.contains_key(branch)
    }

    fn has_stage(&self, branch: &str, stage: Stage) -> bool {
        self.branches.get(branch).is_some_and(|b| b.has_stage(stage))
    }

    fn create_descriptor_set(&mut self, ctx: &RenderContext, desc: DescriptorSetDesc) -> Result<()> {
        if self.layout.is_some() {
            return Err(ConfigurationError::invalid_state(
                "create_descriptor_set",
                "the pipeline layout was already created",
            )
            .into());
        }
        self.sets.validate_next(&desc)?;
        let push_constants =
            desc.is_push_constant_candidate() && !self.sets.iter().any(|e| e.native.push_constants);
        let uniform_buffer = (desc.ub_size > 0 && !push_constants).then(|| {
            let size = desc.aligned_ub_size() * desc.capacity.max(1) * ctx.ring_buffer_depth();
            self.device
                .resources()
                .create_buffer(format!("{} UB{}", self.source_name, desc.set_number), size, 0)
        });
        log::debug!(
            "Vulkan shader '{}' set {}: {} bytes x {}, {} texture slots{}",
            self.source_name,
            desc.set_number,
            desc.ub_size,
            desc.capacity,
            desc.samplers.len(),
            if push_constants { ", push constants" } else { "" }
        );
        let native = VulkanSetNative {
            uniform_buffer,
            push_constants,
            descriptor_set: None,
        };
        self.sets.push(desc, native)
    }

    fn create_pipeline_layout(&mut self, ctx: &RenderContext) -> Result<()> {
        if self.layout.is_some() {
            return Err(ConfigurationError::invalid_state(
                "create_pipeline_layout",
                "the pipeline layout was already created",
            )
            .into());
        }
        let mut desc = PipelineLayoutDesc::default();
        for entry in self.sets.iter() {
            desc.set_layouts.push(set_layout(&entry.desc, entry.native.push_constants)?);
            if entry.native.push_constants {
                desc.push_constant_ranges.push(PushConstantRange {
                    stage_flags: entry.desc.stage_flags.to_vk()?,
                    offset: 0,
                    size: entry.desc.ub_size as u32,
                });
            }
        }
        let pool = self
            .device
            .create_descriptor_pool(desc.pool_desc(ctx.settings().complex_set_capacity));
        if let Err(err) = self.allocate_own_sets(pool) {
            if let Err(destroy) = self.device.destroy_descriptor_pool(pool) {
                log::warn!("Failed to destroy descriptor pool {pool:?}: {destroy}");
            }
            return Err(err);
        }
        log::debug!(
            "Vulkan pipeline layout of '{}': {} set layouts, {} push constant ranges",
            self.source_name,
            desc.set_layouts.len(),
            desc.push_constant_ranges.len()
        );
        let id = self
            .device
            .resources()
            .create_pipeline(format!("PipelineLayout ({})", self.source_name));
        self.layout = Some(VulkanPipelineLayout { id, desc, pool });
        Ok(())
    }

    fn descriptor_set_count(&self) -> usize {
        self.sets.len()
    }

    fn descriptor_set_desc(&self, set: usize) -> Result<&DescriptorSetDesc> {
        Ok(&self.sets.get(set)?.desc)
    }

    fn uniform_data_mut(&mut self, set: usize) -> Result<&mut [u8]> {
        Ok(self.sets.get_mut(set)?.uniform_data.as_mut_slice())
    }

    fn bind_descriptor_set_textures(
        &mut self,
        ctx: &RenderContext,
        set: usize,
        textures: &[TextureId],
        mip_levels: Option<&[i32]>,
        array_layers: Option<&[i32]>,
    ) -> Result<CSHandle> {
        let pool = self.require_layout("bind_descriptor_set_textures")?.pool;
        let entry = self.sets.get(set)?;
        if entry.desc.samplers.len() != textures.len() {
            return Err(ConfigurationError::CountMismatch {
                what: "complex set textures",
                expected: entry.desc.samplers.len(),
                actual: textures.len(),
            }
            .into());
        }
        let mips = per_texture(mip_levels, textures.len(), "complex set mip levels")?;
        let layers = per_texture(array_layers, textures.len(), "complex set array layers")?;

        let resources = self.device.resources();
        let mut writes: Vec<_> = Self::uniform_write(&entry.desc, entry.native.uniform_buffer)
            .into_iter()
            .collect();
        let mut owned_views = Vec::new();
        let mut owned_samplers = Vec::new();
        let built = (|| -> Result<()> {
            for (i, (&texture, &kind)) in textures.iter().zip(&entry.desc.samplers).enumerate() {
                let binding = i as u32 + 1;
                let format = resources.texture_desc(texture)?.format.to_vk()?.as_raw() as u32;
                if kind.is_storage() {
                    let Ok(mip) = u32::try_from(mips[i].unwrap_or(0)) else {
                        continue;
                    };
                    let view = resources.create_view(texture, ViewKind::Image, Some(mip), single(layers[i]), format)?;
                    owned_views.push(view);
                    writes.push(DescriptorWrite::StorageImage { binding, view });
                    continue;
                }
                let view = resources.create_view(texture, ViewKind::Image, single(mips[i]), single(layers[i]), format)?;
                owned_views.push(view);
                let sampler = match kind {
                    Sampler::Custom => {
                        let sampler = resources.create_sampler(resources.texture_sampler(texture)?);
                        owned_samplers.push(sampler);
                        Some(sampler)
                    }
                    _ => None,
                };
                writes.push(DescriptorWrite::CombinedImageSampler {
                    binding,
                    view,
                    sampler,
                    layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                });
            }
            Ok(())
        })();
        let descriptor_set = match built.and_then(|()| self.device.allocate_descriptor_set(pool, writes)) {
            Ok(descriptor_set) => descriptor_set,
            Err(err) => {
                self.release_now(&owned_views, &owned_samplers);
                return Err(err);
            }
        };

        let native = VulkanComplexSet {
            descriptor_set,
            owned_views,
            owned_samplers,
        };
        Ok(self.complex_sets.insert(
            set,
            textures.to_vec(),
            native,
            ctx.frame_count(),
            ctx.ring_buffer_depth(),
        ))
    }

    fn free_descriptor_set(&mut self, ctx: &RenderContext, csh: &mut CSHandle) -> Result<()> {
        if let Some(native) = self.complex_sets.free(csh, ctx.frame_count())? {
            Self::retire_complex_set(ctx, native);
        }
        Ok(())
    }

    fn begin_bind_descriptors(&mut self, _ctx: &RenderContext) -> Result<()> {
        if self.in_bind_session {
            return Err(ConfigurationError::invalid_state(
                "begin_bind_descriptors",
                "a bind session is already open",
            )
            .into());
        }
        self.in_bind_session = true;
        Ok(())
    }

    fn end_bind_descriptors(&mut self, _ctx: &RenderContext) -> Result<()> {
        if !self.in_bind_session {
            return Err(ConfigurationError::invalid_state(
                "end_bind_descriptors",
                "no bind session is open",
            )
            .into());
        }
        self.in_bind_session = false;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
