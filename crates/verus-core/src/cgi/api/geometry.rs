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

//! Geometry descriptions and the input-layout bookkeeping shared by backends.
//!
//! A [`GeometryDesc`] mirrors the content-layer format: an attribute list
//! terminated by [`VertexInputAttrDesc::END`] and a stride list terminated by
//! `0`. [`GeometryLayout`] is the parsed form every backend builds on `init`.

use super::enums::{ViaType, ViaUsage};
use crate::cgi::error::{ConfigurationError, Result};

/// Bit of `dynamic_bindings_mask` that marks the index buffer as dynamic.
pub const DYNAMIC_INDEX_BUFFER_BIT: u32 = 1 << 31;

/// A bindings filter that keeps every binding.
pub const ALL_BINDINGS: u32 = u32::MAX;

/// One vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInputAttrDesc {
    /// Vertex buffer binding. A negative value `-b` means per-instance data
    /// in binding `b`.
    pub binding: i32,
    /// Byte offset inside the vertex; negative terminates a list.
    pub offset: i32,
    /// Component type.
    pub ty: ViaType,
    /// Component count.
    pub components: u32,
    /// Semantic usage.
    pub usage: ViaUsage,
    /// Semantic index (e.g. texture coordinate set).
    pub usage_index: u32,
}

impl VertexInputAttrDesc {
    /// List terminator.
    pub const END: Self = Self {
        binding: -1,
        offset: -1,
        ty: ViaType::Floats,
        components: 0,
        usage: ViaUsage::Position,
        usage_index: 0,
    };

    /// Creates a per-vertex attribute.
    pub const fn new(
        binding: i32,
        offset: i32,
        ty: ViaType,
        components: u32,
        usage: ViaUsage,
        usage_index: u32,
    ) -> Self {
        Self {
            binding,
            offset,
            ty,
            components,
            usage,
            usage_index,
        }
    }

    /// Returns `true` for the list terminator.
    pub const fn is_end(&self) -> bool {
        self.offset < 0
    }

    /// The binding slot, with the per-instance sign removed.
    pub const fn binding_index(&self) -> usize {
        self.binding.unsigned_abs() as usize
    }

    /// Returns `true` if the attribute is stepped per instance.
    pub const fn is_per_instance(&self) -> bool {
        self.binding < 0
    }
}

/// Describes a geometry object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeometryDesc {
    /// Debug name.
    pub name: String,
    /// Attributes, terminated by [`VertexInputAttrDesc::END`].
    pub vertex_input_attrs: Vec<VertexInputAttrDesc>,
    /// Stride per binding, terminated by `0`.
    pub strides: Vec<u32>,
    /// Bit *i* marks binding *i* dynamic; [`DYNAMIC_INDEX_BUFFER_BIT`] marks
    /// the index buffer.
    pub dynamic_bindings_mask: u32,
    /// 32-bit instead of 16-bit indices.
    pub thirty_two_bit_indices: bool,
}

/// The parsed input layout of a geometry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeometryLayout {
    attributes: Vec<VertexInputAttrDesc>,
    strides: Vec<u32>,
    instance_bindings_mask: u32,
    dynamic_bindings_mask: u32,
    thirty_two_bit_indices: bool,
}

impl GeometryLayout {
    /// Parses a description, stopping at the terminators.
    pub fn parse(desc: &GeometryDesc) -> Result<Self> {
        let attributes: Vec<VertexInputAttrDesc> = desc
            .vertex_input_attrs
            .iter()
            .take_while(|a| !a.is_end())
            .copied()
            .collect();
        let strides: Vec<u32> = desc
            .strides
            .iter()
            .take_while(|&&s| s != 0)
            .copied()
            .collect();

        if strides.len() > 31 {
            return Err(ConfigurationError::CountMismatch {
                what: "vertex bindings",
                expected: 31,
                actual: strides.len(),
            }
            .into());
        }

        let mut instance_bindings_mask = 0u32;
        for attr in &attributes {
            if attr.binding_index() >= strides.len() {
                return Err(ConfigurationError::Invalid(format!(
                    "Geometry '{}': attribute {:?} references binding {} without a stride",
                    desc.name,
                    attr.usage,
                    attr.binding_index()
                ))
                .into());
            }
            if attr.is_per_instance() {
                instance_bindings_mask |= 1 << attr.binding_index();
            }
        }

        // Per-instance bindings are always written every frame.
        let dynamic_bindings_mask = desc.dynamic_bindings_mask | instance_bindings_mask;

        Ok(Self {
            attributes,
            strides,
            instance_bindings_mask,
            dynamic_bindings_mask,
            thirty_two_bit_indices: desc.thirty_two_bit_indices,
        })
    }

    /// Attributes, without the terminator.
    pub fn attributes(&self) -> &[VertexInputAttrDesc] {
        &self.attributes
    }

    /// Number of vertex bindings.
    pub fn binding_count(&self) -> usize {
        self.strides.len()
    }

    /// Stride of `binding`.
    pub fn stride(&self, binding: usize) -> Result<u32> {
        self.strides.get(binding).copied().ok_or_else(|| {
            ConfigurationError::InvalidHandle {
                kind: "vertex binding",
                index: binding as i64,
            }
            .into()
        })
    }

    /// Returns `true` if `binding` is ring-buffered.
    pub fn is_dynamic(&self, binding: usize) -> bool {
        binding < 31 && self.dynamic_bindings_mask & (1 << binding) != 0
    }

    /// Returns `true` if `binding` holds per-instance data.
    pub fn is_per_instance(&self, binding: usize) -> bool {
        binding < 31 && self.instance_bindings_mask & (1 << binding) != 0
    }

    /// Returns `true` if the index buffer is ring-buffered.
    pub fn is_index_dynamic(&self) -> bool {
        self.dynamic_bindings_mask & DYNAMIC_INDEX_BUFFER_BIT != 0
    }

    /// Effective dynamic mask, per-instance bindings included.
    pub fn dynamic_bindings_mask(&self) -> u32 {
        self.dynamic_bindings_mask
    }

    /// Returns `true` for 32-bit indices.
    pub fn thirty_two_bit_indices(&self) -> bool {
        self.thirty_two_bit_indices
    }

    /// Size of one index in bytes.
    pub fn index_stride(&self) -> u32 {
        if self.thirty_two_bit_indices {
            4
        } else {
            2
        }
    }

    /// Returns `true` if `filter` keeps `binding`.
    pub fn filter_keeps(filter: u32, binding: usize) -> bool {
        binding < 32 && filter & (1 << binding) != 0
    }

    /// Native slot of `binding` once the bindings rejected by `filter` are
    /// removed and the remaining ones packed from slot 0.
    pub fn compacted_slot(filter: u32, binding: usize) -> usize {
        let below = if binding >= 32 {
            filter
        } else {
            filter & ((1u32 << binding) - 1)
        };
        below.count_ones() as usize
    }

    /// Attributes whose binding passes `filter`, paired with their compacted slot.
    pub fn filtered_attributes(&self, filter: u32) -> Vec<(usize, VertexInputAttrDesc)> {
        self.attributes
            .iter()
            .filter(|a| Self::filter_keeps(filter, a.binding_index()))
            .map(|a| (Self::compacted_slot(filter, a.binding_index()), *a))
            .collect()
    }

    /// Bindings kept by `filter`, in slot order.
    pub fn filtered_bindings(&self, filter: u32) -> Vec<usize> {
        (0..self.binding_count())
            .filter(|&b| Self::filter_keeps(filter, b))
            .collect()
    }

    /// Checks that every attribute kept by `filter` has a vertex buffer.
    pub fn validate_bindings(&self, filter: u32, has_buffer: impl Fn(usize) -> bool) -> Result<()> {
        for attr in &self.attributes {
            let binding = attr.binding_index();
            if Self::filter_keeps(filter, binding) && !has_buffer(binding) {
                return Err(ConfigurationError::Invalid(format!(
                    "vertex binding {binding} has no vertex buffer (attribute {:?})",
                    attr.usage
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Resolves an element-based `size`/`offset` pair against a buffer holding
/// `count` elements. `size == 0` means "up to the end of the buffer".
///
/// Returns `(first_element, element_count)`.
pub fn resolve_update_range(count: u32, size: u32, offset: u32) -> Result<(u32, u32)> {
    let size = if size == 0 {
        count.saturating_sub(offset)
    } else {
        size
    };
    match offset.checked_add(size) {
        Some(end) if end <= count => Ok((offset, size)),
        _ => Err(ConfigurationError::Invalid(format!(
            "buffer update of {size} elements at {offset} exceeds {count} elements"
        ))
        .into()),
    }
}
