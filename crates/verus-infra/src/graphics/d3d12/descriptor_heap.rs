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

//! Descriptor heaps.
//!
//! A [`DynamicDescriptorHeap`] is split into one block per ring slot plus an
//! optional static tail. Each frame hands out descriptors linearly from the
//! block of the current ring slot and starts over when the frame changes, so
//! tables written for a frame in flight are never overwritten.

use crate::graphics::native::native_enum;
use verus_core::cgi::api::{SamplerId, ViewId};
use verus_core::cgi::error::{CgiError, ConfigurationError, Result};

native_enum! {
    /// `D3D12_DESCRIPTOR_HEAP_TYPE`.
    pub struct D3D12DescriptorHeapType(u32) {
        /// Constant buffer, shader resource and unordered access views.
        const CBV_SRV_UAV = 0;
        /// Samplers.
        const SAMPLER = 1;
        /// Render target views.
        const RTV = 2;
        /// Depth stencil views.
        const DSV = 3;
    }
}

impl D3D12DescriptorHeapType {
    /// `GetDescriptorHandleIncrementSize`.
    pub const fn increment_size(self) -> u64 {
        match self.0 {
            3 => 8,
            _ => 32,
        }
    }
}

/// What a descriptor slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    /// A null descriptor; reads return zero.
    Null,
    /// A shader resource view.
    Srv(ViewId),
    /// An unordered access view.
    Uav(ViewId),
    /// A sampler.
    Sampler(SamplerId),
}

/// A CPU and GPU descriptor handle to the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlePair {
    /// Slot index in the heap.
    pub index: u32,
    /// `D3D12_CPU_DESCRIPTOR_HANDLE`.
    pub cpu: u64,
    /// `D3D12_GPU_DESCRIPTOR_HANDLE`, zero for heaps that are not shader visible.
    pub gpu: u64,
}

/// An `ID3D12DescriptorHeap`.
#[derive(Debug)]
pub struct DescriptorHeap {
    ty: D3D12DescriptorHeapType,
    shader_visible: bool,
    cpu_start: u64,
    gpu_start: u64,
    slots: Vec<Descriptor>,
}

impl DescriptorHeap {
    /// Creates a heap of `count` null descriptors, at least one.
    pub fn new(ty: D3D12DescriptorHeapType, count: usize, shader_visible: bool) -> Self {
        let base = (u64::from(ty.raw()) + 1) << 32;
        Self {
            ty,
            shader_visible,
            cpu_start: base,
            gpu_start: if shader_visible { base << 8 } else { 0 },
            slots: vec![Descriptor::Null; count.max(1)],
        }
    }

    /// The heap type.
    pub fn heap_type(&self) -> D3D12DescriptorHeapType {
        self.ty
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the heap has no descriptors.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// CPU handle of slot `index`.
    pub fn at_cpu(&self, index: u32) -> u64 {
        self.cpu_start + u64::from(index) * self.ty.increment_size()
    }

    /// GPU handle of slot `index`. Only shader-visible heaps have one.
    pub fn at_gpu(&self, index: u32) -> Result<u64> {
        if !self.shader_visible {
            return Err(ConfigurationError::Invalid(format!("{:?} heap is not shader visible", self.ty)).into());
        }
        Ok(self.gpu_start + u64::from(index) * self.ty.increment_size())
    }

    /// Slot addressed by a GPU handle.
    pub fn index_of_gpu(&self, gpu: u64) -> Option<u32> {
        let offset = gpu.checked_sub(self.gpu_start).filter(|_| self.shader_visible)?;
        let increment = self.ty.increment_size();
        let index = u32::try_from(offset / increment).ok()?;
        (offset % increment == 0 && (index as usize) < self.slots.len()).then_some(index)
    }

    /// `CopyDescriptorsSimple` into consecutive slots starting at `index`.
    pub fn write(&mut self, index: u32, descriptors: &[Descriptor]) -> Result<()> {
        let start = index as usize;
        let target = self
            .slots
            .get_mut(start..start + descriptors.len())
            .ok_or(ConfigurationError::InvalidHandle {
                kind: "descriptor heap slot",
                index: i64::from(index),
            })?;
        target.copy_from_slice(descriptors);
        Ok(())
    }

    /// Reads `count` slots starting at `index`.
    pub fn read(&self, index: u32, count: usize) -> Result<&[Descriptor]> {
        let start = index as usize;
        self.slots.get(start..start + count).ok_or_else(|| {
            ConfigurationError::InvalidHandle {
                kind: "descriptor heap slot",
                index: i64::from(index),
            }
            .into()
        })
    }

    fn pair(&self, index: u32) -> HandlePair {
        HandlePair {
            index,
            cpu: self.at_cpu(index),
            gpu: self.at_gpu(index).unwrap_or(0),
        }
    }
}

/// A shader-visible heap with one block of `capacity` descriptors per ring slot.
#[derive(Debug)]
pub struct DynamicDescriptorHeap {
    heap: DescriptorHeap,
    capacity: usize,
    ring_buffer_depth: usize,
    offset: usize,
    current_frame: u64,
    peak_load: usize,
}

impl DynamicDescriptorHeap {
    /// Creates a heap of `capacity × ring_buffer_depth + static_count` descriptors.
    pub fn new(
        ty: D3D12DescriptorHeapType,
        capacity: usize,
        ring_buffer_depth: usize,
        static_count: usize,
        shader_visible: bool,
    ) -> Self {
        let heap = DescriptorHeap::new(ty, capacity * ring_buffer_depth + static_count, shader_visible);
        Self {
            heap,
            capacity,
            ring_buffer_depth,
            offset: 0,
            current_frame: u64::MAX,
            peak_load: 0,
        }
    }

    /// Reserves `count` consecutive descriptors in the block of `ring_index`.
    ///
    /// The block starts over when `frame_count` changes. Fails with
    /// `ResourceExhausted` when the block cannot hold `count` more.
    pub fn next_handle(&mut self, frame_count: u64, ring_index: usize, count: usize) -> Result<HandlePair> {
        if self.current_frame != frame_count {
            self.current_frame = frame_count;
            self.offset = 0;
        }
        if ring_index >= self.ring_buffer_depth {
            return Err(ConfigurationError::InvalidHandle {
                kind: "ring buffer index",
                index: ring_index as i64,
            }
            .into());
        }
        if self.offset + count > self.capacity {
            return Err(CgiError::exhausted(
                format!("{:?} dynamic descriptor heap", self.heap.heap_type()),
                self.capacity,
            ));
        }
        let index = (self.capacity * ring_index + self.offset) as u32;
        self.offset += count;
        self.peak_load = self.peak_load.max(self.offset);
        Ok(self.heap.pair(index))
    }

    /// Handle of static slot `index`, after every per-frame block.
    pub fn static_handle(&self, index: usize) -> Result<HandlePair> {
        let at = self.capacity * self.ring_buffer_depth + index;
        if at >= self.heap.len() {
            return Err(ConfigurationError::InvalidHandle {
                kind: "static descriptor",
                index: index as i64,
            }
            .into());
        }
        Ok(self.heap.pair(at as u32))
    }

    /// Descriptors per ring slot.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Descriptors used in the current frame.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Highest number of descriptors used in one frame.
    pub fn peak_load(&self) -> usize {
        self.peak_load
    }

    /// The underlying heap.
    pub fn heap(&self) -> &DescriptorHeap {
        &self.heap
    }

    /// The underlying heap, for descriptor copies.
    pub fn heap_mut(&mut self) -> &mut DescriptorHeap {
        &mut self.heap
    }
}
