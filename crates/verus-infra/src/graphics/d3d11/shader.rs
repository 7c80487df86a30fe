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

//! Direct3D 11 shaders: compiled branches, constant buffers and complex sets.
//!
//! Set `n` binds its constant buffer at slot `n` of every stage it is visible
//! to. Shader resource and unordered access slots are handed out as running
//! sums over the earlier sets; a set without a uniform block models a
//! structured buffer and takes one extra shader resource slot.

use super::device::D3D11Device;
use super::native::{D3D11Call, D3D11Map};
use crate::graphics::d3d_common::{shader_resource_format, ToD3D};
use crate::graphics::resources::{per_texture, single, ViewKind};
use std::any::Any;
use verus_core::cgi::api::{
    compile_branches, BufferId, CSHandle, CompileProfile, CompiledBranch, CompiledBranches,
    ComplexSetPool, DescriptorSetDesc, DescriptorSetTable, DeviceResource, Sampler, SamplerId,
    ShaderDesc, ShaderStageFlags, Stage, TextureId, ViewId,
};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::Shader;
use verus_core::RenderContext;

#[derive(Debug)]
struct D3D11SetNative {
    constant_buffer: Option<BufferId>,
    srv_start: u32,
    uav_start: u32,
    /// CPU image of the constant buffer while a bind session is open.
    shadow: Vec<u8>,
    dirty: bool,
}

#[derive(Debug, Clone, Default)]
struct D3D11ComplexSet {
    srvs: Vec<ViewId>,
    uavs: Vec<Option<ViewId>>,
    samplers: Vec<SamplerId>,
    /// Samplers created for `Custom` slots.
    owned_samplers: Vec<SamplerId>,
}

/// What binding one descriptor set sets on the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct D3D11SetBinding {
    pub slot: u32,
    pub stage_flags: ShaderStageFlags,
    /// Buffer, first constant and constant count, in 16-byte constants.
    pub constant_buffer: Option<(BufferId, u32, u32)>,
    pub srv_start: u32,
    pub srvs: Vec<ViewId>,
    pub samplers: Vec<SamplerId>,
    pub uav_start: u32,
    pub uavs: Vec<Option<ViewId>>,
}

/// A compiled Direct3D 11 shader.
pub struct D3D11Shader {
    device: D3D11Device,
    source_name: String,
    branches: CompiledBranches,
    sets: DescriptorSetTable<D3D11SetNative>,
    complex_sets: ComplexSetPool<D3D11ComplexSet>,
    in_bind_session: bool,
}

impl D3D11Shader {
    pub(crate) fn new(device: D3D11Device) -> Self {
        Self {
            device,
            source_name: String::new(),
            branches: CompiledBranches::new(),
            sets: DescriptorSetTable::default(),
            complex_sets: ComplexSetPool::default(),
            in_bind_session: false,
        }
    }

    pub(crate) fn branch(&self, name: &str) -> Option<&CompiledBranch> {
        self.branches.get(name)
    }

    /// Shader resource and unordered access start slots of `set`.
    pub(crate) fn start_slots(&self, set: usize) -> Result<(u32, u32)> {
        let native = &self.sets.get(set)?.native;
        Ok((native.srv_start, native.uav_start))
    }

    /// Uploads the uniform block of `set` and gathers what the command buffer binds.
    ///
    /// Returns `None` when `csh` refers to a complex set that was freed.
    pub(crate) fn prepare_bind(
        &mut self,
        ctx: &RenderContext,
        set: usize,
        csh: CSHandle,
    ) -> Result<Option<D3D11SetBinding>> {
        let textures = if csh.is_set() {
            let complex_set = self.complex_sets.get(csh)?;
            if !complex_set.is_ready() {
                return Ok(None);
            }
            if complex_set.set_number != set {
                return Err(ConfigurationError::Invalid(format!(
                    "{csh:?} was created for set {}, not set {set}",
                    complex_set.set_number
                ))
                .into());
            }
            complex_set.native.clone()
        } else {
            None
        };

        let in_session = self.in_bind_session;
        let entry = self.sets.get_mut(set)?;
        let aligned = entry.desc.aligned_ub_size();
        let buffer = entry.native.constant_buffer;
        let constant_buffer = match buffer {
            // Blocks without ring slots bypass the shadow and are mapped at once.
            Some(buffer) if in_session && entry.desc.capacity > 0 => {
                let slot = entry.next_uniform_slot(ctx.frame_count())?;
                let offset = slot * aligned;
                entry.native.shadow[offset..offset + entry.uniform_data.len()]
                    .copy_from_slice(&entry.uniform_data);
                entry.native.dirty = true;
                Some((buffer, (offset / 16) as u32, (aligned / 16) as u32))
            }
            Some(buffer) => {
                self.device.call(D3D11Call::Map {
                    buffer,
                    map_type: D3D11Map::WRITE_DISCARD,
                    offset: 0,
                    data: entry.uniform_data.clone(),
                })?;
                Some((buffer, 0, (aligned / 16) as u32))
            }
            None => None,
        };

        let textures = textures.unwrap_or_default();
        Ok(Some(D3D11SetBinding {
            slot: set as u32,
            stage_flags: entry.desc.stage_flags,
            constant_buffer,
            srv_start: entry.native.srv_start,
            srvs: textures.srvs,
            samplers: textures.samplers,
            uav_start: entry.native.uav_start,
            uavs: textures.uavs,
        }))
    }

    fn sampler_for(&self, kind: Sampler, texture: TextureId) -> Result<(SamplerId, bool)> {
        let resources = self.device.resources();
        match kind {
            Sampler::Custom => {
                let state = resources.texture_sampler(texture)?;
                Ok((resources.create_sampler(state), true))
            }
            _ => Ok((resources.predefined_sampler(kind)?, false)),
        }
    }

    fn retire_complex_set(ctx: &RenderContext, native: D3D11ComplexSet) {
        for view in native.srvs.into_iter().chain(native.uavs.into_iter().flatten()) {
            ctx.retire(DeviceResource::View(view), 0);
        }
        for sampler in native.owned_samplers {
            ctx.retire(DeviceResource::Sampler(sampler), 0);
        }
    }
}

impl Shader for D3D11Shader {
    fn init(&mut self, ctx: &RenderContext, desc: &ShaderDesc) -> Result<()> {
        self.source_name = desc.source_name.clone();
        self.branches = compile_branches(ctx, desc, &CompileProfile::D3D11)?;
        Ok(())
    }

    fn done(&mut self, ctx: &RenderContext) {
        for entry in self.sets.drain() {
            if let Some(buffer) = entry.native.constant_buffer {
                ctx.retire(DeviceResource::Buffer(buffer), 0);
            }
        }
        for native in self.complex_sets.drain() {
            Self::retire_complex_set(ctx, native);
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

    fn create_descriptor_set(&mut self, _ctx: &RenderContext, desc: DescriptorSetDesc) -> Result<()> {
        self.sets.validate_next(&desc)?;
        let (srv_start, uav_start) = self.sets.iter().fold((0, 0), |(srv, uav), entry| {
            let structured = u32::from(entry.desc.ub_size == 0);
            (
                srv + entry.desc.sampled_count() as u32 + structured,
                uav + entry.desc.storage_count() as u32,
            )
        });

        let size = desc.aligned_ub_size() * desc.capacity.max(1);
        let constant_buffer = (desc.ub_size > 0).then(|| {
            self.device.resources().create_buffer(
                format!("{} CB{}", self.source_name, desc.set_number),
                size,
                0,
            )
        });
        log::debug!(
            "D3D11 shader '{}' set {}: {} bytes x {}, SRV start {srv_start}, UAV start {uav_start}",
            self.source_name,
            desc.set_number,
            desc.ub_size,
            desc.capacity
        );
        let native = D3D11SetNative {
            constant_buffer,
            srv_start,
            uav_start,
            shadow: if constant_buffer.is_some() { vec![0; size] } else { Vec::new() },
            dirty: false,
        };
        self.sets.push(desc, native)
    }

    fn create_pipeline_layout(&mut self, _ctx: &RenderContext) -> Result<()> {
        log::trace!("D3D11 has no pipeline layout object");
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
        let samplers = self.sets.get(set)?.desc.samplers.clone();
        if samplers.len() != textures.len() {
            return Err(ConfigurationError::CountMismatch {
                what: "complex set textures",
                expected: samplers.len(),
                actual: textures.len(),
            }
            .into());
        }
        let mips = per_texture(mip_levels, textures.len(), "complex set mip levels")?;
        let layers = per_texture(array_layers, textures.len(), "complex set array layers")?;

        let resources = self.device.resources();
        let mut native = D3D11ComplexSet::default();
        for (i, (&texture, &kind)) in textures.iter().zip(&samplers).enumerate() {
            let desc = resources.texture_desc(texture)?;
            if kind.is_storage() {
                let mip = mips[i].unwrap_or(0);
                let view = match u32::try_from(mip) {
                    Ok(mip) => Some(resources.create_view(
                        texture,
                        ViewKind::UnorderedAccess,
                        Some(mip),
                        single(layers[i]),
                        desc.format.to_d3d()?.raw(),
                    )?),
                    Err(_) => None,
                };
                native.uavs.push(view);
            } else {
                native.srvs.push(resources.create_view(
                    texture,
                    ViewKind::ShaderResource,
                    single(mips[i]),
                    single(layers[i]),
                    shader_resource_format(desc.format)?.raw(),
                )?);
                let (sampler, owned) = self.sampler_for(kind, texture)?;
                native.samplers.push(sampler);
                if owned {
                    native.owned_samplers.push(sampler);
                }
            }
        }

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
        for set in 0..self.sets.len() {
            let native = &mut self.sets.get_mut(set)?.native;
            if let (Some(buffer), true) = (native.constant_buffer, native.dirty) {
                native.dirty = false;
                self.device.call(D3D11Call::Map {
                    buffer,
                    map_type: D3D11Map::WRITE_DISCARD,
                    offset: 0,
                    data: native.shadow.clone(),
                })?;
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
