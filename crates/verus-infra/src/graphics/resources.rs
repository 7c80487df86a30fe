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

//! Simulated device memory shared by every backend.
//!
//! Buffers hold real bytes so uploads can be read back; textures track the
//! layout of every subresource; views and samplers are plain records. All
//! tables are keyed by the opaque identifiers of `verus-core`.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use verus_core::cgi::api::{
    BufferId, DeviceResource, Format, ImageLayout, PipelineId, Sampler, SamplerId, SamplerState, TextureDesc,
    TextureId, ViewId,
};
use verus_core::cgi::error::{ConfigurationError, Result};

/// What a view lets the GPU do with its texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Read from shaders through a sampler.
    ShaderResource,
    /// Read and written from shaders without filtering.
    UnorderedAccess,
    /// Written as a color attachment.
    RenderTarget,
    /// Written as a depth/stencil attachment.
    DepthStencil,
    /// A Vulkan image view, usable for any of the above.
    Image,
}

/// Counters and live object counts of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    /// Draw calls executed.
    pub draw_calls: u64,
    /// Compute, mesh and ray dispatches executed.
    pub dispatches: u64,
    /// Resource and image barriers executed.
    pub barriers: u64,
    /// Buffer copies executed.
    pub copies: u64,
    /// Command lists submitted.
    pub submissions: u64,
    /// Buffers alive.
    pub live_buffers: usize,
    /// Textures alive.
    pub live_textures: usize,
    /// Views alive.
    pub live_views: usize,
    /// Samplers alive.
    pub live_samplers: usize,
    /// Pipelines, pipeline layouts and root signatures alive.
    pub live_pipelines: usize,
    /// Bytes of buffer and texture memory currently allocated.
    pub allocated_bytes: usize,
    /// Highest value `allocated_bytes` reached.
    pub peak_bytes: usize,
}

#[derive(Debug)]
pub(crate) struct BufferEntry {
    pub name: String,
    pub data: Vec<u8>,
    /// Backend resource state (D3D12 `D3D12_RESOURCE_STATES`), zero elsewhere.
    pub state: u32,
}

#[derive(Debug)]
struct TextureEntry {
    desc: TextureDesc,
    /// One layout per mip level and array layer, mip-major.
    layouts: Vec<ImageLayout>,
    sampler: SamplerState,
    bytes: usize,
}

/// A view of one texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ViewEntry {
    pub texture: TextureId,
    pub kind: ViewKind,
    /// A single mip level, or every level when `None`.
    pub mip: Option<u32>,
    /// A single array layer, or every layer when `None`.
    pub layer: Option<u32>,
    /// Native format value of the view (DXGI_FORMAT or VkFormat).
    pub format: u32,
}

#[derive(Debug, Default)]
struct Counters {
    draw_calls: AtomicU64,
    dispatches: AtomicU64,
    barriers: AtomicU64,
    copies: AtomicU64,
    submissions: AtomicU64,
}

/// Recovers the guard of a poisoned lock; the tables stay consistent between calls.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn invalid(kind: &'static str, index: usize) -> ConfigurationError {
    ConfigurationError::InvalidHandle {
        kind,
        index: index as i64,
    }
}

/// Expands an optional per-texture mip or layer list to one entry per texture.
pub(crate) fn per_texture(values: Option<&[i32]>, count: usize, what: &'static str) -> Result<Vec<Option<i32>>> {
    match values {
        None => Ok(vec![None; count]),
        Some(values) if values.len() == count => Ok(values.iter().copied().map(Some).collect()),
        Some(values) => Err(ConfigurationError::CountMismatch {
            what,
            expected: count,
            actual: values.len(),
        }
        .into()),
    }
}

/// A single subresource index, or `None` for "all" when negative or absent.
pub(crate) fn single(selection: Option<i32>) -> Option<u32> {
    selection.and_then(|v| u32::try_from(v).ok())
}

/// Sampler state of a texture until the application replaces it.
const DEFAULT_TEXTURE_SAMPLER: SamplerState = SamplerState {
    linear: true,
    linear_mips: true,
    clamp: false,
    compare: None,
    anisotropy: true,
};

/// Approximate bytes per texel, used for memory accounting.
fn texel_size(format: Format) -> usize {
    match format {
        Format::UnormR8 => 1,
        Format::UnormB4G4R4A4
        | Format::UnormB5G6R5
        | Format::SintR16
        | Format::UnormR8G8
        | Format::FloatR16
        | Format::UnormD16 => 2,
        Format::FloatR16G16B16A16 | Format::FloatR32G32 => 8,
        Format::FloatR32G32B32A32 => 16,
        Format::UnormBc1 | Format::SrgbBc1 => 1,
        Format::UnormBc2 | Format::UnormBc3 | Format::SrgbBc2 | Format::SrgbBc3 => 1,
        _ => 4,
    }
}

/// Resource tables of one device.
#[derive(Debug, Default)]
pub(crate) struct ResourceTables {
    buffers: Mutex<HashMap<BufferId, BufferEntry>>,
    textures: Mutex<HashMap<TextureId, TextureEntry>>,
    views: Mutex<HashMap<ViewId, ViewEntry>>,
    samplers: Mutex<HashMap<SamplerId, SamplerState>>,
    predefined_samplers: Mutex<HashMap<Sampler, SamplerId>>,
    pipelines: Mutex<HashMap<PipelineId, String>>,

    next_buffer_id: AtomicUsize,
    next_texture_id: AtomicUsize,
    next_view_id: AtomicUsize,
    next_sampler_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,

    allocated_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    counters: Counters,
}

impl ResourceTables {
    fn track_alloc(&self, bytes: usize) {
        let now = self.allocated_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak_bytes.fetch_max(now, Ordering::Relaxed);
    }

    fn track_free(&self, bytes: usize) {
        self.allocated_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    // --- Buffers ---

    /// Allocates a zero-filled buffer in native state `state`.
    pub fn create_buffer(&self, name: impl Into<String>, size: usize, state: u32) -> BufferId {
        let id = BufferId(self.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        log::trace!("Buffer {id:?} '{name}': {size} bytes");
        lock(&self.buffers).insert(
            id,
            BufferEntry {
                name,
                data: vec![0; size],
                state,
            },
        );
        self.track_alloc(size);
        id
    }

    /// Size of a buffer in bytes.
    pub fn buffer_size(&self, id: BufferId) -> Result<usize> {
        let buffers = lock(&self.buffers);
        let entry = buffers.get(&id).ok_or_else(|| invalid("buffer", id.0))?;
        Ok(entry.data.len())
    }

    /// Writes `data` at byte `offset`.
    pub fn write_buffer(&self, id: BufferId, offset: usize, data: &[u8]) -> Result<()> {
        let mut buffers = lock(&self.buffers);
        let entry = buffers.get_mut(&id).ok_or_else(|| invalid("buffer", id.0))?;
        let end = offset + data.len();
        if end > entry.data.len() {
            return Err(ConfigurationError::Invalid(format!(
                "write of {} bytes at {offset} overflows buffer '{}' ({} bytes)",
                data.len(),
                entry.name,
                entry.data.len()
            ))
            .into());
        }
        entry.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Returns the whole content of a buffer.
    pub fn read_buffer(&self, id: BufferId) -> Result<Vec<u8>> {
        let buffers = lock(&self.buffers);
        let entry = buffers.get(&id).ok_or_else(|| invalid("buffer", id.0))?;
        Ok(entry.data.clone())
    }

    /// Copies `size` bytes between two buffers.
    pub fn copy_buffer(
        &self,
        src: BufferId,
        src_offset: usize,
        dst: BufferId,
        dst_offset: usize,
        size: usize,
    ) -> Result<()> {
        let bytes = {
            let buffers = lock(&self.buffers);
            let entry = buffers.get(&src).ok_or_else(|| invalid("buffer", src.0))?;
            entry
                .data
                .get(src_offset..src_offset + size)
                .ok_or_else(|| {
                    ConfigurationError::Invalid(format!(
                        "copy of {size} bytes at {src_offset} overflows buffer '{}'",
                        entry.name
                    ))
                })?
                .to_vec()
        };
        self.write_buffer(dst, dst_offset, &bytes)?;
        self.counters.copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// The tracked native state of a buffer.
    pub fn buffer_state(&self, id: BufferId) -> Result<u32> {
        let buffers = lock(&self.buffers);
        let entry = buffers.get(&id).ok_or_else(|| invalid("buffer", id.0))?;
        Ok(entry.state)
    }

    /// Updates the tracked native state of a buffer.
    pub fn set_buffer_state(&self, id: BufferId, state: u32) -> Result<()> {
        let mut buffers = lock(&self.buffers);
        let entry = buffers.get_mut(&id).ok_or_else(|| invalid("buffer", id.0))?;
        entry.state = state;
        Ok(())
    }

    /// Destroys a buffer.
    pub fn release_buffer(&self, id: BufferId) -> Result<()> {
        let entry = lock(&self.buffers)
            .remove(&id)
            .ok_or_else(|| invalid("buffer", id.0))?;
        log::trace!("Buffer {id:?} '{}' destroyed", entry.name);
        self.track_free(entry.data.len());
        Ok(())
    }

    // --- Textures ---

    /// Creates a texture with every subresource in `initial_layout`.
    pub fn create_texture(&self, desc: &TextureDesc, initial_layout: ImageLayout) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
            return Err(ConfigurationError::Invalid(format!(
                "texture '{}' has an empty extent {}x{}x{}",
                desc.name, desc.width, desc.height, desc.depth
            ))
            .into());
        }
        if desc.mip_levels == 0 || desc.array_layers == 0 {
            return Err(ConfigurationError::Invalid(format!(
                "texture '{}' needs at least one mip level and one array layer",
                desc.name
            ))
            .into());
        }
        let subresources = (desc.mip_levels * desc.array_layers) as usize;
        let bytes = desc.width as usize
            * desc.height as usize
            * desc.depth as usize
            * desc.array_layers as usize
            * desc.sample_count.max(1) as usize
            * texel_size(desc.format);
        let id = TextureId(self.next_texture_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.textures).insert(
            id,
            TextureEntry {
                desc: desc.clone(),
                layouts: vec![initial_layout; subresources],
                sampler: DEFAULT_TEXTURE_SAMPLER,
                bytes,
            },
        );
        self.track_alloc(bytes);
        log::debug!(
            "Texture {id:?} '{}': {:?} {}x{}, {} mips",
            desc.name,
            desc.format,
            desc.width,
            desc.height,
            desc.mip_levels
        );
        Ok(id)
    }

    /// The description a texture was created from.
    pub fn texture_desc(&self, id: TextureId) -> Result<TextureDesc> {
        let textures = lock(&self.textures);
        let entry = textures.get(&id).ok_or_else(|| invalid("texture", id.0))?;
        Ok(entry.desc.clone())
    }

    /// Layout of one subresource.
    pub fn texture_layout(&self, id: TextureId, mip: u32, layer: u32) -> Result<ImageLayout> {
        let textures = lock(&self.textures);
        let entry = textures.get(&id).ok_or_else(|| invalid("texture", id.0))?;
        let index = (mip * entry.desc.array_layers + layer) as usize;
        if mip >= entry.desc.mip_levels || layer >= entry.desc.array_layers {
            return Err(invalid("subresource", index).into());
        }
        Ok(entry.layouts[index])
    }

    /// Moves a range of subresources to `layout`.
    pub fn set_texture_layout(
        &self,
        id: TextureId,
        mips: Range<u32>,
        layers: Range<u32>,
        layout: ImageLayout,
    ) -> Result<()> {
        let mut textures = lock(&self.textures);
        let entry = textures.get_mut(&id).ok_or_else(|| invalid("texture", id.0))?;
        if mips.end > entry.desc.mip_levels || layers.end > entry.desc.array_layers {
            return Err(ConfigurationError::Invalid(format!(
                "subresource range mips {mips:?} layers {layers:?} exceeds texture '{}'",
                entry.desc.name
            ))
            .into());
        }
        let array_layers = entry.desc.array_layers;
        for mip in mips {
            for layer in layers.clone() {
                entry.layouts[(mip * array_layers + layer) as usize] = layout;
            }
        }
        Ok(())
    }

    /// Sampler state used by `Custom` sampler slots.
    pub fn texture_sampler(&self, id: TextureId) -> Result<SamplerState> {
        let textures = lock(&self.textures);
        let entry = textures.get(&id).ok_or_else(|| invalid("texture", id.0))?;
        Ok(entry.sampler)
    }

    /// Replaces the sampler state of a texture.
    pub fn set_texture_sampler(&self, id: TextureId, state: SamplerState) -> Result<()> {
        let mut textures = lock(&self.textures);
        let entry = textures.get_mut(&id).ok_or_else(|| invalid("texture", id.0))?;
        entry.sampler = state;
        Ok(())
    }

    /// Destroys a texture.
    pub fn release_texture(&self, id: TextureId) -> Result<()> {
        let entry = lock(&self.textures)
            .remove(&id)
            .ok_or_else(|| invalid("texture", id.0))?;
        self.track_free(entry.bytes);
        Ok(())
    }

    // --- Views ---

    /// Creates a view, checking the selected subresource exists.
    pub fn create_view(
        &self,
        texture: TextureId,
        kind: ViewKind,
        mip: Option<u32>,
        layer: Option<u32>,
        format: u32,
    ) -> Result<ViewId> {
        let desc = self.texture_desc(texture)?;
        if let Some(mip) = mip.filter(|&m| m >= desc.mip_levels) {
            return Err(invalid("mip level", mip as usize).into());
        }
        if let Some(layer) = layer.filter(|&l| l >= desc.array_layers) {
            return Err(invalid("array layer", layer as usize).into());
        }
        let id = ViewId(self.next_view_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.views).insert(
            id,
            ViewEntry {
                texture,
                kind,
                mip,
                layer,
                format,
            },
        );
        Ok(id)
    }

    /// Looks up a view.
    pub fn view(&self, id: ViewId) -> Result<ViewEntry> {
        lock(&self.views)
            .get(&id)
            .copied()
            .ok_or_else(|| invalid("view", id.0).into())
    }

    /// Destroys a view.
    pub fn release_view(&self, id: ViewId) -> Result<()> {
        lock(&self.views)
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| invalid("view", id.0).into())
    }

    // --- Samplers ---

    /// Creates a sampler object.
    pub fn create_sampler(&self, state: SamplerState) -> SamplerId {
        let id = SamplerId(self.next_sampler_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.samplers).insert(id, state);
        id
    }

    /// The device-wide sampler of a predefined kind, created on first use.
    pub fn predefined_sampler(&self, sampler: Sampler) -> Result<SamplerId> {
        let state = sampler
            .state()
            .ok_or_else(|| ConfigurationError::unmapped("predefined_sampler", sampler))?;
        let mut cache = lock(&self.predefined_samplers);
        if let Some(&id) = cache.get(&sampler) {
            return Ok(id);
        }
        let id = self.create_sampler(state);
        cache.insert(sampler, id);
        Ok(id)
    }

    /// State of a sampler object.
    pub fn sampler_state(&self, id: SamplerId) -> Result<SamplerState> {
        lock(&self.samplers)
            .get(&id)
            .copied()
            .ok_or_else(|| invalid("sampler", id.0).into())
    }

    /// Destroys a sampler.
    pub fn release_sampler(&self, id: SamplerId) -> Result<()> {
        lock(&self.samplers)
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| invalid("sampler", id.0).into())
    }

    // --- Pipelines ---

    /// Registers a pipeline-like object under `name`.
    pub fn create_pipeline(&self, name: impl Into<String>) -> PipelineId {
        let id = PipelineId(self.next_pipeline_id.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        log::debug!("Pipeline {id:?} '{name}' created");
        lock(&self.pipelines).insert(id, name);
        id
    }

    /// Destroys a pipeline.
    pub fn release_pipeline(&self, id: PipelineId) -> Result<()> {
        lock(&self.pipelines)
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| invalid("pipeline", id.0).into())
    }

    /// Destroys a retired object. Descriptor sets live in backend pools and are rejected.
    pub fn release(&self, resource: DeviceResource) -> Result<()> {
        match resource {
            DeviceResource::Buffer(id) => self.release_buffer(id),
            DeviceResource::View(id) => self.release_view(id),
            DeviceResource::Sampler(id) => self.release_sampler(id),
            DeviceResource::Texture(id) => self.release_texture(id),
            DeviceResource::Pipeline(id) => self.release_pipeline(id),
            DeviceResource::DescriptorSet(id) => Err(invalid("descriptor set", id.0).into()),
        }
    }

    // --- Statistics ---

    pub fn count_draw(&self) {
        self.counters.draw_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_dispatch(&self) {
        self.counters.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_barriers(&self, count: usize) {
        self.counters.barriers.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn count_submission(&self) {
        self.counters.submissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            draw_calls: self.counters.draw_calls.load(Ordering::Relaxed),
            dispatches: self.counters.dispatches.load(Ordering::Relaxed),
            barriers: self.counters.barriers.load(Ordering::Relaxed),
            copies: self.counters.copies.load(Ordering::Relaxed),
            submissions: self.counters.submissions.load(Ordering::Relaxed),
            live_buffers: lock(&self.buffers).len(),
            live_textures: lock(&self.textures).len(),
            live_views: lock(&self.views).len(),
            live_samplers: lock(&self.samplers).len(),
            live_pipelines: lock(&self.pipelines).len(),
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_write_read_and_copy() {
        let tables = ResourceTables::default();
        let a = tables.create_buffer("a", 8, 0);
        let b = tables.create_buffer("b", 8, 0);
        tables.write_buffer(a, 2, &[1, 2, 3]).unwrap();
        tables.copy_buffer(a, 2, b, 4, 3).unwrap();
        assert_eq!(tables.read_buffer(b).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 0]);
        assert_eq!(tables.stats().copies, 1);
        assert!(tables.write_buffer(a, 6, &[0; 3]).is_err());
    }

    #[test]
    fn test_allocation_tracking() {
        let tables = ResourceTables::default();
        let a = tables.create_buffer("a", 100, 0);
        let b = tables.create_buffer("b", 50, 0);
        tables.release_buffer(a).unwrap();
        let stats = tables.stats();
        assert_eq!(stats.allocated_bytes, 50);
        assert_eq!(stats.peak_bytes, 150);
        assert_eq!(stats.live_buffers, 1);
        tables.release_buffer(b).unwrap();
        assert!(tables.release_buffer(b).is_err());
    }

    #[test]
    fn test_texture_layout_ranges() {
        let tables = ResourceTables::default();
        let desc = TextureDesc::sampled("t", Format::UnormR8G8B8A8, 4, 4)
            .with_mip_levels(3)
            .with_array_layers(2);
        let id = tables.create_texture(&desc, ImageLayout::Undefined).unwrap();
        tables
            .set_texture_layout(id, 1..3, 1..2, ImageLayout::ShaderReadOnly)
            .unwrap();
        assert_eq!(tables.texture_layout(id, 0, 1).unwrap(), ImageLayout::Undefined);
        assert_eq!(tables.texture_layout(id, 2, 1).unwrap(), ImageLayout::ShaderReadOnly);
        assert_eq!(tables.texture_layout(id, 2, 0).unwrap(), ImageLayout::Undefined);
        assert!(tables
            .set_texture_layout(id, 0..4, 0..1, ImageLayout::General)
            .is_err());
    }

    #[test]
    fn test_predefined_samplers_are_cached() {
        let tables = ResourceTables::default();
        let a = tables.predefined_sampler(Sampler::Aniso).unwrap();
        let b = tables.predefined_sampler(Sampler::Aniso).unwrap();
        let c = tables.predefined_sampler(Sampler::Shadow).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(tables.predefined_sampler(Sampler::Custom).is_err());
        assert!(tables.sampler_state(c).unwrap().compare.is_some());
    }

    #[test]
    fn test_view_checks_subresource() {
        let tables = ResourceTables::default();
        let desc = TextureDesc::sampled("t", Format::UnormR8G8B8A8, 4, 4).with_mip_levels(2);
        let id = tables.create_texture(&desc, ImageLayout::Undefined).unwrap();
        assert!(tables
            .create_view(id, ViewKind::ShaderResource, Some(1), None, 28)
            .is_ok());
        assert!(tables
            .create_view(id, ViewKind::ShaderResource, Some(2), None, 28)
            .is_err());
    }
}
