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

//! Shader descriptions, samplers and descriptor set bookkeeping.

use super::branch::{scan_branches, DEFAULT_MACRO_PREFIX};
use super::enums::{CompareOp, Stage};
use super::flags::ShaderStageFlags;
use crate::cgi::error::{CgiError, ConfigurationError, Result};

/// Largest uniform block a set may have to qualify as push constants.
pub const MAX_PUSH_CONSTANTS_SIZE: usize = 128;

/// Uniform buffer offsets are aligned to this many bytes on D3D12 and Vulkan.
pub const UNIFORM_BUFFER_ALIGNMENT: usize = 256;

/// Describes a shader source and the branches to compile from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDesc {
    /// Name used in diagnostics and debug object names.
    pub source_name: String,
    /// Source text.
    pub source: String,
    /// Branch descriptions. When empty, branches are scanned from the source.
    pub branches: Vec<String>,
    /// Branch names to skip.
    pub ignore_list: Vec<String>,
    /// Stage letters to compile for every branch (`V H D G F C`).
    pub stages: String,
    /// Prefix prepended to every branch macro.
    pub macro_prefix: String,
}

impl ShaderDesc {
    /// Creates a description compiling the vertex and fragment stages.
    pub fn new(source_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            source: source.into(),
            branches: Vec::new(),
            ignore_list: Vec::new(),
            stages: "VF".to_string(),
            macro_prefix: DEFAULT_MACRO_PREFIX.to_string(),
        }
    }

    /// Sets explicit branch descriptions.
    pub fn with_branches<S: Into<String>>(mut self, branches: impl IntoIterator<Item = S>) -> Self {
        self.branches = branches.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the ignore list.
    pub fn with_ignore_list<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.ignore_list = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the stage letters.
    pub fn with_stages(mut self, stages: impl Into<String>) -> Self {
        self.stages = stages.into();
        self
    }

    /// Branch descriptions to compile: the explicit list, or those declared in the source.
    pub fn branch_descs(&self) -> Vec<String> {
        if self.branches.is_empty() {
            scan_branches(&self.source)
        } else {
            self.branches.clone()
        }
    }

    /// Parses the stage letters.
    pub fn stage_list(&self) -> Result<Vec<Stage>> {
        let mut stages = Vec::new();
        for letter in self.stages.chars() {
            let stage = Stage::from_letter(letter).ok_or_else(|| ConfigurationError::Parse {
                what: "shader stages",
                input: self.stages.clone(),
                reason: format!("unknown stage letter '{letter}'"),
            })?;
            if !stages.contains(&stage) {
                stages.push(stage);
            }
        }
        stages.sort();
        Ok(stages)
    }
}

/// A sampler slot of a descriptor set.
///
/// Predefined kinds map to device-wide static/immutable samplers. `Custom`
/// takes the sampler from the bound texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sampler {
    /// Use the texture's own sampler state.
    Custom,
    /// Subpass input attachment.
    InputAttach,
    /// Storage image (UAV), read and written without filtering.
    Storage,
    /// Depth comparison sampler for shadow maps.
    Shadow,
    /// Anisotropic, repeat.
    Aniso,
    /// Trilinear, repeat.
    Linear3D,
    /// Point with point mips, repeat.
    Nearest3D,
    /// Bilinear, repeat.
    Linear2D,
    /// Point, repeat.
    Nearest2D,
    /// Trilinear, clamp.
    LinearClamp3D,
    /// Point with point mips, clamp.
    NearestClamp3D,
    /// Bilinear, clamp.
    LinearClamp2D,
    /// Point, clamp.
    NearestClamp2D,
}

/// Fixed-function state of a predefined sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerState {
    /// Linear min/mag filtering.
    pub linear: bool,
    /// Linear filtering between mips.
    pub linear_mips: bool,
    /// Clamp to edge instead of repeat.
    pub clamp: bool,
    /// Comparison function for depth samplers.
    pub compare: Option<CompareOp>,
    /// Anisotropic filtering.
    pub anisotropy: bool,
}

impl Sampler {
    /// Every predefined sampler, in device table order.
    pub const PREDEFINED: [Sampler; 10] = [
        Sampler::Shadow,
        Sampler::Aniso,
        Sampler::Linear3D,
        Sampler::Nearest3D,
        Sampler::Linear2D,
        Sampler::Nearest2D,
        Sampler::LinearClamp3D,
        Sampler::NearestClamp3D,
        Sampler::LinearClamp2D,
        Sampler::NearestClamp2D,
    ];

    /// Returns `true` for storage image slots.
    pub const fn is_storage(self) -> bool {
        matches!(self, Sampler::Storage)
    }

    /// State of a predefined sampler, `None` for `Custom` and `Storage`.
    ///
    /// Input attachments are read with point sampling.
    pub const fn state(self) -> Option<SamplerState> {
        const fn s(linear: bool, linear_mips: bool, clamp: bool) -> SamplerState {
            SamplerState {
                linear,
                linear_mips,
                clamp,
                compare: None,
                anisotropy: false,
            }
        }
        match self {
            Sampler::Custom | Sampler::Storage => None,
            Sampler::InputAttach => Some(s(false, false, true)),
            Sampler::Shadow => Some(SamplerState {
                linear: true,
                linear_mips: false,
                clamp: true,
                compare: Some(CompareOp::LessOrEqual),
                anisotropy: false,
            }),
            Sampler::Aniso => Some(SamplerState {
                linear: true,
                linear_mips: true,
                clamp: false,
                compare: None,
                anisotropy: true,
            }),
            Sampler::Linear3D => Some(s(true, true, false)),
            Sampler::Nearest3D => Some(s(false, true, false)),
            Sampler::Linear2D => Some(s(true, false, false)),
            Sampler::Nearest2D => Some(s(false, false, false)),
            Sampler::LinearClamp3D => Some(s(true, true, true)),
            Sampler::NearestClamp3D => Some(s(false, true, true)),
            Sampler::LinearClamp2D => Some(s(true, false, true)),
            Sampler::NearestClamp2D => Some(s(false, false, true)),
        }
    }
}

/// Describes one descriptor set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSetDesc {
    /// Set index; must equal the number of sets created before it.
    pub set_number: usize,
    /// Size of the uniform block in bytes. Zero models a structured buffer.
    pub ub_size: usize,
    /// Distinct uniform updates allowed per frame.
    pub capacity: usize,
    /// Texture slots.
    pub samplers: Vec<Sampler>,
    /// Stages that see the set.
    pub stage_flags: ShaderStageFlags,
}

impl DescriptorSetDesc {
    /// Creates a set description.
    pub fn new(
        set_number: usize,
        ub_size: usize,
        capacity: usize,
        samplers: impl IntoIterator<Item = Sampler>,
        stage_flags: ShaderStageFlags,
    ) -> Self {
        Self {
            set_number,
            ub_size,
            capacity,
            samplers: samplers.into_iter().collect(),
            stage_flags,
        }
    }

    /// Returns `true` if the set has texture slots.
    pub fn has_samplers(&self) -> bool {
        !self.samplers.is_empty()
    }

    /// Number of storage image slots.
    pub fn storage_count(&self) -> usize {
        self.samplers.iter().filter(|s| s.is_storage()).count()
    }

    /// Number of sampled texture slots.
    pub fn sampled_count(&self) -> usize {
        self.samplers.len() - self.storage_count()
    }

    /// Uniform block size rounded up to [`UNIFORM_BUFFER_ALIGNMENT`].
    pub fn aligned_ub_size(&self) -> usize {
        self.ub_size.next_multiple_of(UNIFORM_BUFFER_ALIGNMENT)
    }

    /// Returns `true` if the set can be expressed as push constants.
    pub fn is_push_constant_candidate(&self) -> bool {
        self.ub_size > 0
            && self.ub_size <= MAX_PUSH_CONSTANTS_SIZE
            && self.samplers.is_empty()
            && self.capacity == 0
    }
}

/// Per-set CPU state every backend keeps next to its native objects.
#[derive(Debug, Clone)]
pub struct DescriptorSetEntry<N> {
    /// The description the set was created from.
    pub desc: DescriptorSetDesc,
    /// CPU copy of the uniform block, uploaded on `bind_descriptors`.
    pub uniform_data: Vec<u8>,
    /// Backend objects for the set.
    pub native: N,
    frame: u64,
    used: usize,
}

impl<N> DescriptorSetEntry<N> {
    /// Reserves the next uniform slot for the current frame.
    ///
    /// A set created with a capacity of zero owns a single slot per frame.
    /// Fails with `ResourceExhausted` once every slot was used in `frame_count`.
    pub fn next_uniform_slot(&mut self, frame_count: u64) -> Result<usize> {
        if self.frame != frame_count {
            self.frame = frame_count;
            self.used = 0;
        }
        let slots = self.desc.capacity.max(1);
        if self.used >= slots {
            return Err(CgiError::exhausted(
                format!("uniform buffer of descriptor set {}", self.desc.set_number),
                slots,
            ));
        }
        let slot = self.used;
        self.used += 1;
        Ok(slot)
    }

    /// Uniform slots used so far in the current frame.
    pub fn used_slots(&self) -> usize {
        self.used
    }
}

/// The ordered list of descriptor sets of one shader.
#[derive(Debug, Clone)]
pub struct DescriptorSetTable<N> {
    entries: Vec<DescriptorSetEntry<N>>,
}

impl<N> Default for DescriptorSetTable<N> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<N> DescriptorSetTable<N> {
    /// Checks that `desc` is the next set in order.
    pub fn validate_next(&self, desc: &DescriptorSetDesc) -> Result<()> {
        if desc.set_number != self.entries.len() {
            return Err(ConfigurationError::CountMismatch {
                what: "descriptor set number",
                expected: self.entries.len(),
                actual: desc.set_number,
            }
            .into());
        }
        Ok(())
    }

    /// Appends a set. Call [`validate_next`](Self::validate_next) first.
    pub fn push(&mut self, desc: DescriptorSetDesc, native: N) -> Result<()> {
        self.validate_next(&desc)?;
        let uniform_data = vec![0u8; desc.ub_size];
        self.entries.push(DescriptorSetEntry {
            desc,
            uniform_data,
            native,
            frame: u64::MAX,
            used: 0,
        });
        Ok(())
    }

    /// Number of sets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no set was created.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns set `set`.
    pub fn get(&self, set: usize) -> Result<&DescriptorSetEntry<N>> {
        self.entries.get(set).ok_or_else(|| Self::invalid(set))
    }

    /// Returns set `set` mutably.
    pub fn get_mut(&mut self, set: usize) -> Result<&mut DescriptorSetEntry<N>> {
        self.entries.get_mut(set).ok_or_else(|| Self::invalid(set))
    }

    /// Iterates over sets in order.
    pub fn iter(&self) -> impl Iterator<Item = &DescriptorSetEntry<N>> {
        self.entries.iter()
    }

    /// Removes every set.
    pub fn drain(&mut self) -> impl Iterator<Item = DescriptorSetEntry<N>> + '_ {
        self.entries.drain(..)
    }

    fn invalid(set: usize) -> CgiError {
        ConfigurationError::InvalidHandle {
            kind: "descriptor set",
            index: set as i64,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_list_parses_letters() {
        let desc = ShaderDesc::new("Cube", "").with_stages("FVC");
        assert_eq!(desc.stage_list().unwrap(), vec![Stage::Vs, Stage::Fs, Stage::Cs]);
        let bad = ShaderDesc::new("Cube", "").with_stages("VX");
        assert!(bad.stage_list().is_err());
    }

    #[test]
    fn test_branch_descs_fall_back_to_scan() {
        let desc = ShaderDesc::new("Cube", "//@main:#\nvoid mainVS() {}\n");
        assert_eq!(desc.branch_descs(), vec!["main:#"]);
        let explicit = desc.clone().with_branches(["main:#Depth DEPTH"]);
        assert_eq!(explicit.branch_descs(), vec!["main:#Depth DEPTH"]);
    }

    #[test]
    fn test_set_counts_and_alignment() {
        let desc = DescriptorSetDesc::new(
            1,
            80,
            100,
            [Sampler::Aniso, Sampler::Storage],
            ShaderStageFlags::FS,
        );
        assert_eq!(desc.storage_count(), 1);
        assert_eq!(desc.sampled_count(), 1);
        assert_eq!(desc.aligned_ub_size(), 256);
        assert!(!desc.is_push_constant_candidate());

        let push = DescriptorSetDesc::new(0, 64, 0, [], ShaderStageFlags::VS);
        assert!(push.is_push_constant_candidate());
    }

    #[test]
    fn test_table_requires_contiguous_sets() {
        let mut table = DescriptorSetTable::<()>::default();
        let set1 = DescriptorSetDesc::new(1, 16, 1, [], ShaderStageFlags::VS);
        assert!(table.push(set1, ()).is_err());
        let set0 = DescriptorSetDesc::new(0, 16, 1, [], ShaderStageFlags::VS);
        table.push(set0, ()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).unwrap().uniform_data.len(), 16);
        assert!(table.get(1).is_err());
    }

    #[test]
    fn test_uniform_slots_reset_per_frame() {
        let mut table = DescriptorSetTable::<()>::default();
        table
            .push(DescriptorSetDesc::new(0, 16, 2, [], ShaderStageFlags::VS), ())
            .unwrap();
        let entry = table.get_mut(0).unwrap();
        assert_eq!(entry.next_uniform_slot(5).unwrap(), 0);
        assert_eq!(entry.next_uniform_slot(5).unwrap(), 1);
        let err = entry.next_uniform_slot(5).unwrap_err();
        assert!(matches!(err, CgiError::ResourceExhausted { capacity: 2, .. }));
        assert_eq!(entry.used_slots(), 2);
        assert_eq!(entry.next_uniform_slot(6).unwrap(), 0);
        assert_eq!(entry.used_slots(), 1);
    }

    #[test]
    fn test_zero_capacity_owns_one_slot_per_frame() {
        let mut table = DescriptorSetTable::<()>::default();
        table
            .push(DescriptorSetDesc::new(0, 256, 0, [], ShaderStageFlags::VS_FS), ())
            .unwrap();
        let entry = table.get_mut(0).unwrap();
        assert_eq!(entry.next_uniform_slot(3).unwrap(), 0);
        let err = entry.next_uniform_slot(3).unwrap_err();
        assert!(matches!(err, CgiError::ResourceExhausted { capacity: 1, .. }));
        assert_eq!(entry.next_uniform_slot(4).unwrap(), 0);
    }

    #[test]
    fn test_predefined_sampler_states() {
        let shadow = Sampler::Shadow.state().unwrap();
        assert_eq!(shadow.compare, Some(CompareOp::LessOrEqual));
        assert!(shadow.clamp);
        assert!(Sampler::Aniso.state().unwrap().anisotropy);
        assert!(Sampler::Custom.state().is_none());
        assert!(Sampler::Storage.is_storage());
        assert!(Sampler::PREDEFINED.iter().all(|s| s.state().is_some()));
    }
}
