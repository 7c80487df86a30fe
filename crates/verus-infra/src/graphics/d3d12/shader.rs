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

//! Direct3D 12 shaders and their root signature.
//!
//! Each descriptor set contributes, in order:
//!
//! * root constants at `b{set}` if it is the first push constant candidate,
//!   otherwise a root CBV at `b{set}` when it has a uniform block;
//! * a descriptor table with one SRV range and one UAV range when it has
//!   texture slots;
//! * a sampler table when a slot uses a `Custom` sampler. Sets with only
//!   predefined samplers use static samplers instead.
//!
//! Constant buffers sit in the upload heap with one region per ring slot,
//! each region holding `capacity` aligned uniform blocks.

use super::descriptor_heap::Descriptor;
use super::device::D3D12Device;
use super::native::{
    D3D12DescriptorRangeType, D3D12ResourceStates, D3D12ShaderVisibility, DescriptorRange,
    RootParameter, RootSignatureDesc, StaticSampler,
};
use crate::graphics::d3d_common::{sampler_desc, shader_resource_format, ToD3D};
use crate::graphics::resources::{per_texture, single, ViewKind};
use std::any::Any;
use verus_core::cgi::api::{
    compile_branches, BufferId, CSHandle, CompileProfile, CompiledBranch, CompiledBranches,
    ComplexSetPool, DescriptorSetDesc, DescriptorSetTable, DeviceResource, PipelineId, Sampler,
    SamplerId, ShaderDesc, ShaderStageFlags, Stage, TextureId, ViewId,
};
use verus_core::cgi::error::{ConfigurationError, Result};
use verus_core::cgi::traits::Shader;
use verus_core::RenderContext;

#[derive(Debug, Default)]
struct D3D12SetNative {
    constant_buffer: Option<BufferId>,
    root_constants: bool,
    srv_start: u32,
    uav_start: u32,
    cbv_parameter: Option<u32>,
    table_parameter: Option<u32>,
    sampler_parameter: Option<u32>,
}

#[derive(Debug, Clone, Default)]
struct D3D12ComplexSet {
    /// SRVs followed by UAVs, in table order.
    views: Vec<Descriptor>,
    samplers: Vec<Descriptor>,
    owned_views: Vec<ViewId>,
    owned_samplers: Vec<SamplerId>,
}

/// Root arguments of one descriptor set, ready to be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct D3D12SetBinding {
    /// Root parameter and values of a root constants set.
    pub root_constants: Option<(u32, Vec<u32>)>,
    /// Root parameter, buffer and byte offset of the uniform block.
    pub constant_buffer: Option<(u32, BufferId, u64)>,
    /// Root parameter and descriptors of the view table.
    pub view_table: Option<(u32, Vec<Descriptor>)>,
    /// Root parameter and descriptors of the sampler table.
    pub sampler_table: Option<(u32, Vec<Descriptor>)>,
}

/// A compiled Direct3D 12 shader.
pub struct D3D12Shader {
    device: D3D12Device,
    source_name: String,
    branches: CompiledBranches,
    sets: DescriptorSetTable<D3D12SetNative>,
    complex_sets: ComplexSetPool<D3D12ComplexSet>,
    root_signature: Option<(PipelineId, RootSignatureDesc)>,
    in_bind_session: bool,
}

/// Visibility of a set seen by `flags`: a single graphics stage, or all.
fn visibility(flags: ShaderStageFlags) -> D3D12ShaderVisibility {
    const SINGLE: [(ShaderStageFlags, D3D12ShaderVisibility); 5] = [
        (ShaderStageFlags::VS, D3D12ShaderVisibility::VERTEX),
        (ShaderStageFlags::HS, D3D12ShaderVisibility::HULL),
        (ShaderStageFlags::DS, D3D12ShaderVisibility::DOMAIN),
        (ShaderStageFlags::GS, D3D12ShaderVisibility::GEOMETRY),
        (ShaderStageFlags::FS, D3D12ShaderVisibility::PIXEL),
    ];
    SINGLE
        .iter()
        .find(|(stage, _)| *stage == flags)
        .map_or(D3D12ShaderVisibility::ALL, |&(_, v)| v)
}

impl D3D12Shader {
    pub(crate) fn new(device: D3D12Device) -> Self {
        Self {
            device,
            source_name: String::new(),
            branches: CompiledBranches::new(),
            sets: DescriptorSetTable::default(),
            complex_sets: ComplexSetPool::default(),
            root_signature: None,
            in_bind_session: false,
        }
    }

    pub(crate) fn branch(&self, name: &str) -> Option<&CompiledBranch> {
        self.branches.get(name)
    }

    /// The root signature object, once the pipeline layout exists.
    pub(crate) fn root_signature(&self) -> Result<PipelineId> {
        self.root_signature.as_ref().map(|(id, _)| *id).ok_or_else(|| {
            ConfigurationError::invalid_state("root_signature", "create_pipeline_layout was not called").into()
        })
    }

    /// The root signature layout, once the pipeline layout exists.
    pub fn root_signature_desc(&self) -> Option<&RootSignatureDesc> {
        self.root_signature.as_ref().map(|(_, desc)| desc)
    }

    /// Root parameter and 32-bit value count of the root constants, if any.
    pub(crate) fn root_constants(&self) -> Option<(u32, u32)> {
        self.sets.iter().find(|e| e.native.root_constants).and_then(|e| {
            e.native
                .cbv_parameter
                .map(|parameter| (parameter, e.desc.ub_size.div_ceil(4) as u32))
        })
    }

    /// Uploads the uniform block of `set` and gathers its root arguments.
    ///
    /// Returns `None` when `csh` refers to a complex set that was freed.
    pub(crate) fn prepare_bind(
        &mut self,
        ctx: &RenderContext,
        set: usize,
        csh: CSHandle,
    ) -> Result<Option<D3D12SetBinding>> {
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

        let depth = ctx.ring_buffer_depth();
        let entry = self.sets.get_mut(set)?;
        let mut binding = D3D12SetBinding::default();
        let buffer = entry.native.constant_buffer;
        if entry.native.root_constants {
            let parameter = entry.native.cbv_parameter.ok_or_else(|| {
                ConfigurationError::invalid_state("bind_descriptors", "create_pipeline_layout was not called")
            })?;
            let words = entry
                .uniform_data
                .chunks(4)
                .map(|chunk| {
                    let mut word = [0u8; 4];
                    word[..chunk.len()].copy_from_slice(chunk);
                    u32::from_le_bytes(word)
                })
                .collect();
            binding.root_constants = Some((parameter, words));
        } else if let (Some(buffer), Some(parameter)) = (buffer, entry.native.cbv_parameter) {
            let slot = entry.next_uniform_slot(ctx.frame_count())?;
            let aligned = entry.desc.aligned_ub_size();
            let region = aligned * entry.desc.capacity.max(1);
            let offset = region * (ctx.ring_buffer_index() % depth) + slot * aligned;
            self.device
                .resources()
                .write_buffer(buffer, offset, &entry.uniform_data)?;
            binding.constant_buffer = Some((parameter, buffer, offset as u64));
        }

        if let Some(textures) = textures {
            if let Some(parameter) = entry.native.table_parameter {
                binding.view_table = Some((parameter, textures.views));
            }
            if let Some(parameter) = entry.native.sampler_parameter {
                binding.sampler_table = Some((parameter, textures.samplers));
            }
        }
        Ok(Some(binding))
    }

    fn retire_complex_set(ctx: &RenderContext, native: D3D12ComplexSet) {
        for view in native.owned_views {
            ctx.retire(DeviceResource::View(view), 0);
        }
        for sampler in native.owned_samplers {
            ctx.retire(DeviceResource::Sampler(sampler), 0);
        }
    }

    fn build_root_signature(&mut self) -> Result<RootSignatureDesc> {
        let mut desc = RootSignatureDesc::default();
        for set in 0..self.sets.len() {
            let entry = self.sets.get_mut(set)?;
            let visibility = visibility(entry.desc.stage_flags);
            let register = entry.desc.set_number as u32;
            if entry.native.root_constants {
                entry.native.cbv_parameter = Some(desc.parameters.len() as u32);
                desc.parameters.push(RootParameter::Constants {
                    shader_register: register,
                    num_32bit_values: entry.desc.ub_size.div_ceil(4) as u32,
                    visibility,
                });
            } else if entry.native.constant_buffer.is_some() {
                entry.native.cbv_parameter = Some(desc.parameters.len() as u32);
                desc.parameters.push(RootParameter::Cbv {
                    shader_register: register,
                    visibility,
                });
            }

            let sampled = entry.desc.sampled_count() as u32;
            let storage = entry.desc.storage_count() as u32;
            if !entry.desc.has_samplers() {
                continue;
            }
            let mut ranges = Vec::new();
            if sampled > 0 {
                ranges.push(DescriptorRange {
                    range_type: D3D12DescriptorRangeType::SRV,
                    num_descriptors: sampled,
                    base_shader_register: entry.native.srv_start,
                    register_space: 0,
                });
            }
            if storage > 0 {
                ranges.push(DescriptorRange {
                    range_type: D3D12DescriptorRangeType::UAV,
                    num_descriptors: storage,
                    base_shader_register: entry.native.uav_start,
                    register_space: 0,
                });
            }
            entry.native.table_parameter = Some(desc.parameters.len() as u32);
            desc.parameters.push(RootParameter::DescriptorTable { ranges, visibility });

            if entry.desc.samplers.contains(&Sampler::Custom) {
                entry.native.sampler_parameter = Some(desc.parameters.len() as u32);
                desc.parameters.push(RootParameter::DescriptorTable {
                    ranges: vec![DescriptorRange {
                        range_type: D3D12DescriptorRangeType::SAMPLER,
                        num_descriptors: sampled,
                        base_shader_register: entry.native.srv_start,
                        register_space: 0,
                    }],
                    visibility,
                });
            } else {
                let sampled_kinds = entry.desc.samplers.iter().filter(|s| !s.is_storage());
                for (i, &kind) in sampled_kinds.enumerate() {
                    let state = kind.state().ok_or_else(|| ConfigurationError::unmapped("static_sampler", kind))?;
                    desc.static_samplers.push(StaticSampler {
                        desc: sampler_desc(state)?,
                        shader_register: entry.native.srv_start + i as u32,
                        visibility,
                    });
                }
            }
        }
        Ok(desc)
    }
}

impl Shader for D3D12Shader {
    fn init(&mut self, ctx: &RenderContext, desc: &ShaderDesc) -> Result<()> {
        self.source_name = desc.source_name.clone();
        self.branches = compile_branches(ctx, desc, &CompileProfile::D3D12)?;
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
        if let Some((id, _)) = self.root_signature.take() {
            ctx.retire(DeviceResource::Pipeline(id), 0);
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
        if self.root_signature.is_some() {
            return Err(ConfigurationError::invalid_state(
                "create_descriptor_set",
                "the root signature was already created",
            )
            .into());
        }
        self.sets.validate_next(&desc)?;
        let (srv_start, uav_start) = self.sets.iter().fold((0, 0), |(srv, uav), entry| {
            (
                srv + entry.desc.sampled_count() as u32,
                uav + entry.desc.storage_count() as u32,
            )
        });
        let root_constants =
            desc.is_push_constant_candidate() && !self.sets.iter().any(|e| e.native.root_constants);

        let constant_buffer = (desc.ub_size > 0 && !root_constants).then(|| {
            let size = desc.aligned_ub_size() * desc.capacity.max(1) * ctx.ring_buffer_depth();
            self.device.resources().create_buffer(
                format!("{} CB{}", self.source_name, desc.set_number),
                size,
                D3D12ResourceStates::GENERIC_READ.bits(),
            )
        });
        log::debug!(
            "D3D12 shader '{}' set {}: {} bytes x {}{}",
            self.source_name,
            desc.set_number,
            desc.ub_size,
            desc.capacity,
            if root_constants { " as root constants" } else { "" }
        );
        let native = D3D12SetNative {
            constant_buffer,
            root_constants,
            srv_start,
            uav_start,
            ..Default::default()
        };
        self.sets.push(desc, native)
    }

    fn create_pipeline_layout(&mut self, _ctx: &RenderContext) -> Result<()> {
        if self.root_signature.is_some() {
            return Err(ConfigurationError::invalid_state(
                "create_pipeline_layout",
                "the root signature was already created",
            )
            .into());
        }
        let desc = self.build_root_signature()?;
        log::debug!(
            "D3D12 root signature of '{}': {} parameters, {} static samplers",
            self.source_name,
            desc.parameters.len(),
            desc.static_samplers.len()
        );
        let id = self
            .device
            .resources()
            .create_pipeline(format!("RootSignature ({})", self.source_name));
        self.root_signature = Some((id, desc));
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
        let entry = self.sets.get(set)?;
        let samplers = entry.desc.samplers.clone();
        let sampler_table = entry.native.sampler_parameter.is_some() || samplers.contains(&Sampler::Custom);
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
        let mut native = D3D12ComplexSet::default();
        let mut uavs = Vec::new();
        for (i, (&texture, &kind)) in textures.iter().zip(&samplers).enumerate() {
            let desc = resources.texture_desc(texture)?;
            if kind.is_storage() {
                let mip = mips[i].unwrap_or(0);
                let descriptor = match u32::try_from(mip) {
                    Ok(mip) => {
                        let view = resources.create_view(
                            texture,
                            ViewKind::UnorderedAccess,
                            Some(mip),
                            single(layers[i]),
                            desc.format.to_d3d()?.raw(),
                        )?;
                        native.owned_views.push(view);
                        Descriptor::Uav(view)
                    }
                    Err(_) => Descriptor::Null,
                };
                uavs.push(descriptor);
                continue;
            }
            let view = resources.create_view(
                texture,
                ViewKind::ShaderResource,
                single(mips[i]),
                single(layers[i]),
                shader_resource_format(desc.format)?.raw(),
            )?;
            native.owned_views.push(view);
            native.views.push(Descriptor::Srv(view));
            if sampler_table {
                let sampler = match kind {
                    Sampler::Custom => {
                        let sampler = resources.create_sampler(resources.texture_sampler(texture)?);
                        native.owned_samplers.push(sampler);
                        sampler
                    }
                    _ => resources.predefined_sampler(kind)?,
                };
                native.samplers.push(Descriptor::Sampler(sampler));
            }
        }
        native.views.extend(uavs);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::create_context;
    use verus_core::cgi::api::{BackendKind, CgiSettings, Format, TextureDesc};
    use verus_core::cgi::error::CgiError;

    const SOURCE: &str = "float4 mainVS() : SV_Position { return 0; }\nfloat4 mainFS() : SV_Target { return 1; }\n";

    fn shader(ctx: &RenderContext) -> Box<dyn Shader> {
        ctx.create_shader(&ShaderDesc::new("Test.hlsl", SOURCE).with_branches(["main"]))
            .unwrap()
    }

    fn d3d12(shader: &mut dyn Shader) -> &mut D3D12Shader {
        shader.as_any_mut().downcast_mut::<D3D12Shader>().unwrap()
    }

    #[test]
    fn test_root_signature_layout() {
        let ctx = create_context(CgiSettings::for_backend(BackendKind::D3D12)).unwrap();
        let mut shader = shader(&ctx);
        shader
            .create_descriptor_set(&ctx, DescriptorSetDesc::new(0, 64, 0, [], ShaderStageFlags::VS))
            .unwrap();
        shader
            .create_descriptor_set(
                &ctx,
                DescriptorSetDesc::new(1, 32, 1, [Sampler::Aniso, Sampler::Storage], ShaderStageFlags::FS),
            )
            .unwrap();
        shader
            .create_descriptor_set(
                &ctx,
                DescriptorSetDesc::new(2, 16, 1, [Sampler::Custom], ShaderStageFlags::VS_FS),
            )
            .unwrap();
        shader.create_pipeline_layout(&ctx).unwrap();

        let d3d12 = d3d12(shader.as_mut());
        assert_eq!(d3d12.root_constants(), Some((0, 16)));
        let desc = d3d12.root_signature_desc().unwrap();
        assert_eq!(desc.parameters.len(), 6);
        assert!(matches!(
            desc.parameters[0],
            RootParameter::Constants { shader_register: 0, num_32bit_values: 16, visibility } if visibility == D3D12ShaderVisibility::VERTEX
        ));
        assert!(matches!(desc.parameters[1], RootParameter::Cbv { shader_register: 1, .. }));
        let RootParameter::DescriptorTable { ranges, visibility } = &desc.parameters[2] else {
            panic!("expected a table, got {:?}", desc.parameters[2]);
        };
        assert_eq!(*visibility, D3D12ShaderVisibility::PIXEL);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].range_type, D3D12DescriptorRangeType::UAV);
        let RootParameter::DescriptorTable { ranges, visibility } = &desc.parameters[5] else {
            panic!("expected a sampler table, got {:?}", desc.parameters[5]);
        };
        assert_eq!(*visibility, D3D12ShaderVisibility::ALL);
        assert_eq!(ranges[0].range_type, D3D12DescriptorRangeType::SAMPLER);
        assert_eq!(ranges[0].base_shader_register, 1);
        assert_eq!(desc.static_samplers.len(), 1);
        assert_eq!(desc.static_samplers[0].shader_register, 0);

        assert!(shader.create_pipeline_layout(&ctx).is_err());
        assert!(shader
            .create_descriptor_set(&ctx, DescriptorSetDesc::new(3, 16, 1, [], ShaderStageFlags::VS))
            .is_err());
    }

    #[test]
    fn test_uniform_slots_follow_ring_and_capacity() {
        let mut ctx = create_context(CgiSettings::for_backend(BackendKind::D3D12)).unwrap();
        let mut shader = shader(&ctx);
        shader
            .create_descriptor_set(&ctx, DescriptorSetDesc::new(0, 16, 2, [], ShaderStageFlags::VS))
            .unwrap();
        shader.create_pipeline_layout(&ctx).unwrap();

        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        ctx.begin_frame().unwrap();
        let d3d12 = d3d12(shader.as_mut());
        d3d12.uniform_data_mut(0).unwrap().fill(3);
        let first = d3d12.prepare_bind(&ctx, 0, CSHandle::UNSET).unwrap().unwrap();
        let second = d3d12.prepare_bind(&ctx, 0, CSHandle::UNSET).unwrap().unwrap();
        let (_, buffer, offset) = first.constant_buffer.unwrap();
        assert_eq!(offset, 512);
        assert_eq!(second.constant_buffer.unwrap().2, 512 + 256);
        let err = d3d12.prepare_bind(&ctx, 0, CSHandle::UNSET).unwrap_err();
        assert!(matches!(err, CgiError::ResourceExhausted { capacity: 2, .. }));
        let data = ctx.device().read_buffer(buffer).unwrap();
        assert_eq!(data.len(), 256 * 2 * 3);
        assert_eq!(&data[512..528], &[3; 16]);
    }

    #[test]
    fn test_complex_set_descriptors() {
        let ctx = create_context(CgiSettings::for_backend(BackendKind::D3D12)).unwrap();
        let mut shader = shader(&ctx);
        shader
            .create_descriptor_set(
                &ctx,
                DescriptorSetDesc::new(
                    0,
                    16,
                    1,
                    [Sampler::Storage, Sampler::Custom, Sampler::Linear2D],
                    ShaderStageFlags::FS | ShaderStageFlags::CS,
                ),
            )
            .unwrap();
        shader.create_pipeline_layout(&ctx).unwrap();
        let tex = ctx
            .create_texture(&TextureDesc::sampled("t", Format::UnormR8G8B8A8, 8, 8).with_storage())
            .unwrap();
        let mut csh = shader
            .bind_descriptor_set_textures(&ctx, 0, &[tex, tex, tex], Some(&[-1, 0, 0]), None)
            .unwrap();

        let binding = d3d12(shader.as_mut()).prepare_bind(&ctx, 0, csh).unwrap().unwrap();
        let (_, views) = binding.view_table.unwrap();
        assert_eq!(views.len(), 3);
        assert!(matches!(views[0], Descriptor::Srv(_)));
        assert_eq!(views[2], Descriptor::Null);
        let (_, samplers) = binding.sampler_table.unwrap();
        assert_eq!(samplers.len(), 2);

        let freed = csh;
        shader.free_descriptor_set(&ctx, &mut csh).unwrap();
        assert!(d3d12(shader.as_mut()).prepare_bind(&ctx, 0, freed).unwrap().is_none());
        assert_eq!(ctx.pending_retirements(), 3);
    }
}
