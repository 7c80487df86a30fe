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

//! Descriptor set layouts, pipeline layouts and descriptor pools.
//!
//! Every shader owns one pool sized for all of its sets. A binding read
//! through a dynamic offset needs a single descriptor whatever the number of
//! uniform slots; any other binding needs one descriptor per slot.

use super::native::{is_dynamic_descriptor, SamplerCreateInfo};
use ash::vk;
use std::collections::BTreeMap;
use verus_core::cgi::api::{BufferId, DescriptorSetId, SamplerId, ViewId};
use verus_core::cgi::error::{CgiError, ConfigurationError, Result};

/// `VkDescriptorSetLayoutBinding`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorSetLayoutBinding {
    /// Binding number inside the set.
    pub binding: u32,
    /// Kind of descriptor.
    pub descriptor_type: vk::DescriptorType,
    /// Array size, always 1.
    pub descriptor_count: u32,
    /// Stages that read the binding.
    pub stage_flags: vk::ShaderStageFlags,
    /// Baked into the layout for predefined samplers.
    pub immutable_sampler: Option<SamplerCreateInfo>,
}

/// Bindings of one set layout and the uniform slots of the set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescriptorSetLayoutDesc {
    /// Ordered by binding number.
    pub bindings: Vec<DescriptorSetLayoutBinding>,
    /// Uniform slots per frame of the engine set.
    pub capacity: usize,
}

impl DescriptorSetLayoutDesc {
    /// Type of the descriptor at `binding`.
    pub fn descriptor_type(&self, binding: u32) -> Option<vk::DescriptorType> {
        self.bindings
            .iter()
            .find(|b| b.binding == binding)
            .map(|b| b.descriptor_type)
    }
}

/// `VkPushConstantRange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    /// Stages that read the range.
    pub stage_flags: vk::ShaderStageFlags,
    /// In bytes.
    pub offset: u32,
    /// In bytes.
    pub size: u32,
}

/// `VkPipelineLayoutCreateInfo`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineLayoutDesc {
    /// One per engine set, in set number order.
    pub set_layouts: Vec<DescriptorSetLayoutDesc>,
    /// At most one range.
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// `VkDescriptorPoolSize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolSize {
    /// Kind of descriptor.
    pub ty: vk::DescriptorType,
    /// Descriptors of that kind in the pool.
    pub descriptor_count: u32,
}

/// `VkDescriptorPoolCreateInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorPoolDesc {
    /// Ordered by descriptor type.
    pub pool_sizes: Vec<DescriptorPoolSize>,
    /// Sets the pool can hold at once.
    pub max_sets: u32,
    /// `VK_DESCRIPTOR_POOL_CREATE_FREE_DESCRIPTOR_SET_BIT`.
    pub free_descriptor_set: bool,
}

impl PipelineLayoutDesc {
    /// A pool holding one set per layout with a uniform buffer plus
    /// `complex_capacity` complex sets.
    ///
    /// Complex sets start with the uniform buffer of their set, so the
    /// dynamic uniform buffer count grows with them.
    pub fn pool_desc(&self, complex_capacity: usize) -> DescriptorPoolDesc {
        let mut counts: BTreeMap<vk::DescriptorType, u32> = BTreeMap::new();
        for layout in &self.set_layouts {
            for binding in &layout.bindings {
                let count = if is_dynamic_descriptor(binding.descriptor_type) {
                    1
                } else {
                    layout.capacity as u32
                };
                *counts.entry(binding.descriptor_type).or_default() += count;
            }
        }
        if let Some(count) = counts.get_mut(&vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC) {
            *count += complex_capacity as u32;
        }
        let own_sets = counts
            .get(&vk::DescriptorType::STORAGE_BUFFER_DYNAMIC)
            .copied()
            .unwrap_or(0)
            + self
                .set_layouts
                .iter()
                .filter(|l| l.descriptor_type(0) == Some(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC))
                .count() as u32;
        DescriptorPoolDesc {
            pool_sizes: counts
                .into_iter()
                .filter(|&(_, count)| count > 0)
                .map(|(ty, descriptor_count)| DescriptorPoolSize { ty, descriptor_count })
                .collect(),
            max_sets: own_sets + complex_capacity as u32,
            free_descriptor_set: true,
        }
    }
}

/// One `VkWriteDescriptorSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    /// The uniform buffer at binding 0.
    UniformBufferDynamic {
        /// Binding number.
        binding: u32,
        /// Ring buffer of the set.
        buffer: BufferId,
        /// Bytes visible through one dynamic offset.
        range: u64,
    },
    /// A sampled texture slot.
    CombinedImageSampler {
        /// Binding number.
        binding: u32,
        /// Image view.
        view: ViewId,
        /// `None` when the layout has an immutable sampler.
        sampler: Option<SamplerId>,
        /// Layout the image is in when sampled.
        layout: vk::ImageLayout,
    },
    /// A storage image slot.
    StorageImage {
        /// Binding number.
        binding: u32,
        /// Single-mip image view.
        view: ViewId,
    },
}

impl DescriptorWrite {
    /// Binding number written.
    pub fn binding(&self) -> u32 {
        match *self {
            Self::UniformBufferDynamic { binding, .. }
            | Self::CombinedImageSampler { binding, .. }
            | Self::StorageImage { binding, .. } => binding,
        }
    }
}

/// Index of a descriptor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorPoolId(pub usize);

#[derive(Debug)]
struct PoolRecord {
    desc: DescriptorPoolDesc,
    allocated: usize,
    /// Destroyed by its owner; removed once its last set is freed.
    closed: bool,
}

#[derive(Debug)]
struct SetRecord {
    pool: DescriptorPoolId,
    writes: Vec<DescriptorWrite>,
}

/// Descriptor pools and the sets allocated from them.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    pools: Vec<Option<PoolRecord>>,
    sets: Vec<Option<SetRecord>>,
}

fn vacant_slot<T>(slots: &mut Vec<Option<T>>, value: T) -> usize {
    match slots.iter().position(Option::is_none) {
        Some(index) => {
            slots[index] = Some(value);
            index
        }
        None => {
            slots.push(Some(value));
            slots.len() - 1
        }
    }
}

impl DescriptorRegistry {
    /// `vkCreateDescriptorPool`.
    pub fn create_pool(&mut self, desc: DescriptorPoolDesc) -> DescriptorPoolId {
        DescriptorPoolId(vacant_slot(
            &mut self.pools,
            PoolRecord {
                desc,
                allocated: 0,
                closed: false,
            },
        ))
    }

    fn pool_mut(&mut self, pool: DescriptorPoolId) -> Result<&mut PoolRecord> {
        self.pools
            .get_mut(pool.0)
            .and_then(Option::as_mut)
            .filter(|p| !p.closed)
            .ok_or_else(|| {
                ConfigurationError::InvalidHandle {
                    kind: "descriptor pool",
                    index: pool.0 as i64,
                }
                .into()
            })
    }

    /// `vkAllocateDescriptorSets` followed by `vkUpdateDescriptorSets`.
    pub fn allocate(&mut self, pool: DescriptorPoolId, writes: Vec<DescriptorWrite>) -> Result<DescriptorSetId> {
        let record = self.pool_mut(pool)?;
        if record.allocated >= record.desc.max_sets as usize {
            return Err(CgiError::exhausted("descriptor pool", record.desc.max_sets as usize));
        }
        record.allocated += 1;
        Ok(DescriptorSetId(vacant_slot(&mut self.sets, SetRecord { pool, writes })))
    }

    /// Descriptors written into `set`.
    pub fn writes(&self, set: DescriptorSetId) -> Result<&[DescriptorWrite]> {
        self.sets
            .get(set.0)
            .and_then(Option::as_ref)
            .map(|s| s.writes.as_slice())
            .ok_or_else(|| {
                ConfigurationError::InvalidHandle {
                    kind: "descriptor set",
                    index: set.0 as i64,
                }
                .into()
            })
    }

    /// `vkFreeDescriptorSets`.
    pub fn free(&mut self, set: DescriptorSetId) -> Result<()> {
        let record = self
            .sets
            .get_mut(set.0)
            .and_then(Option::take)
            .ok_or(ConfigurationError::InvalidHandle {
                kind: "descriptor set",
                index: set.0 as i64,
            })?;
        if let Some(slot) = self.pools.get_mut(record.pool.0) {
            if let Some(pool) = slot.as_mut() {
                pool.allocated = pool.allocated.saturating_sub(1);
                if pool.closed && pool.allocated == 0 {
                    *slot = None;
                }
            }
        }
        Ok(())
    }

    /// `vkDestroyDescriptorPool`. Sets still waiting for retirement keep the
    /// pool record alive until they are freed.
    pub fn destroy_pool(&mut self, pool: DescriptorPoolId) -> Result<()> {
        let record = self.pool_mut(pool)?;
        record.closed = true;
        if record.allocated == 0 {
            self.pools[pool.0] = None;
        }
        Ok(())
    }

    /// Sets allocated from `pool` and the most it can hold.
    pub fn pool_usage(&self, pool: DescriptorPoolId) -> Option<(usize, u32)> {
        self.pools
            .get(pool.0)
            .and_then(Option::as_ref)
            .map(|p| (p.allocated, p.desc.max_sets))
    }

    /// Pools not yet removed, closed ones included.
    pub fn live_pools(&self) -> usize {
        self.pools.iter().flatten().count()
    }

    /// Sets not yet freed.
    pub fn live_sets(&self) -> usize {
        self.sets.iter().flatten().count()
    }
}
