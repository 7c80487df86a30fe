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

//! The Direct3D 11 device and its immediate context.

use super::command_buffer::D3D11CommandBuffer;
use super::geometry::D3D11Geometry;
use super::native::D3D11Call;
use super::pipeline::D3D11Pipeline;
use super::shader::D3D11Shader;
use crate::graphics::d3d_common::{resource_format, DxgiFormat, ToD3D};
use crate::graphics::resources::{lock, DeviceStats, ResourceTables, ViewEntry, ViewKind};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use verus_core::cgi::api::{
    BackendKind, BufferId, CgiSettings, DeviceResource, FBHandle, FramebufferDesc, ImageLayout,
    RPHandle, RenderPassDesc, RenderPassLayout, SamplerState, TextureDesc, TextureId, ViewId,
};
use verus_core::cgi::error::Result;
use verus_core::cgi::registry::PassRegistry;
use verus_core::cgi::traits::{CommandBuffer, Geometry, Pipeline, RenderDevice, Shader};

/// Views of one framebuffer: an RTV or DSV per attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct D3D11Framebuffer {
    pub views: Vec<ViewId>,
}

#[derive(Debug)]
struct D3D11DeviceInternal {
    settings: CgiSettings,
    resources: ResourceTables,
    /// Render passes keep the DXGI format of each attachment.
    passes: Mutex<PassRegistry<Vec<DxgiFormat>, D3D11Framebuffer>>,
    call_log: Mutex<Vec<D3D11Call>>,
    call_log_enabled: AtomicBool,
}

/// A clonable handle to the Direct3D 11 device.
///
/// Every object created by the device keeps a clone, which is how geometry,
/// shaders and command buffers reach the immediate context.
#[derive(Clone, Debug)]
pub struct D3D11Device {
    internal: Arc<D3D11DeviceInternal>,
}

impl D3D11Device {
    /// Creates the device.
    pub fn new(settings: &CgiSettings) -> Self {
        log::info!(
            "D3D11 device created, feature level 11_1, {} frames in flight",
            settings.ring_buffer_depth
        );
        Self {
            internal: Arc::new(D3D11DeviceInternal {
                settings: settings.clone(),
                resources: ResourceTables::default(),
                passes: Mutex::new(PassRegistry::default()),
                call_log: Mutex::new(Vec::new()),
                call_log_enabled: AtomicBool::new(false),
            }),
        }
    }

    /// Starts or stops keeping a copy of every immediate-context call.
    pub fn enable_call_log(&self, enabled: bool) {
        self.internal.call_log_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Returns and clears the logged calls.
    pub fn take_call_log(&self) -> Vec<D3D11Call> {
        std::mem::take(&mut *lock(&self.internal.call_log))
    }

    /// Counters and live object counts.
    pub fn stats(&self) -> DeviceStats {
        self.internal.resources.stats()
    }

    /// Replaces the sampler state `Custom` slots use for `texture`.
    pub fn set_texture_sampler(&self, texture: TextureId, state: SamplerState) -> Result<()> {
        self.internal.resources.set_texture_sampler(texture, state)
    }

    pub(crate) fn resources(&self) -> &ResourceTables {
        &self.internal.resources
    }

    pub(crate) fn view(&self, id: ViewId) -> Result<ViewEntry> {
        self.internal.resources.view(id)
    }

    pub(crate) fn framebuffer(&self, handle: FBHandle) -> Result<D3D11Framebuffer> {
        Ok(lock(&self.internal.passes).framebuffer(handle)?.native.clone())
    }

    /// Executes one call on the immediate context.
    pub(crate) fn call(&self, call: D3D11Call) -> Result<()> {
        let resources = &self.internal.resources;
        match &call {
            D3D11Call::UpdateSubresource {
                buffer,
                dst_offset,
                data,
            } => resources.write_buffer(*buffer, *dst_offset, data)?,
            D3D11Call::Map {
                buffer,
                offset,
                data,
                ..
            } => resources.write_buffer(*buffer, *offset, data)?,
            D3D11Call::DrawInstanced { .. } | D3D11Call::DrawIndexedInstanced { .. } => {
                resources.count_draw()
            }
            D3D11Call::Dispatch { .. } => resources.count_dispatch(),
            _ => {}
        }
        log::trace!("ID3D11DeviceContext::{}", call.name());
        if self.internal.call_log_enabled.load(Ordering::Relaxed) {
            lock(&self.internal.call_log).push(call);
        }
        Ok(())
    }

    fn attachment_view(&self, texture: TextureId, format: DxgiFormat, mip: u32) -> Result<ViewId> {
        let desc = self.internal.resources.texture_desc(texture)?;
        let kind = if desc.format.is_depth() {
            ViewKind::DepthStencil
        } else {
            ViewKind::RenderTarget
        };
        self.internal
            .resources
            .create_view(texture, kind, Some(mip), None, format.raw())
    }
}

impl RenderDevice for D3D11Device {
    fn backend(&self) -> BackendKind {
        BackendKind::D3D11
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId> {
        resource_format(desc.format)?;
        self.internal.resources.create_texture(desc, ImageLayout::General)
    }

    fn texture_desc(&self, texture: TextureId) -> Result<TextureDesc> {
        self.internal.resources.texture_desc(texture)
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RPHandle> {
        let layout = RenderPassLayout::resolve(desc)?;
        let formats = layout
            .attachments
            .iter()
            .map(|a| a.desc.format.to_d3d())
            .collect::<Result<Vec<_>>>()?;
        let handle = lock(&self.internal.passes).insert_render_pass(layout, formats);
        log::debug!(
            "D3D11 render pass {handle:?}: {} attachments, {} subpasses",
            desc.attachments.len(),
            desc.subpasses.len()
        );
        Ok(handle)
    }

    fn delete_render_pass(&self, render_pass: RPHandle) -> Result<()> {
        lock(&self.internal.passes).remove_render_pass(render_pass)?;
        Ok(())
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FBHandle> {
        let formats = lock(&self.internal.passes)
            .render_pass(desc.render_pass)?
            .native
            .clone();
        let mut views = Vec::with_capacity(desc.attachments.len());
        for (&texture, &format) in desc.attachments.iter().zip(&formats) {
            match self.attachment_view(texture, format, desc.mip_level) {
                Ok(view) => views.push(view),
                Err(err) => {
                    self.release_views(&views);
                    return Err(err);
                }
            }
        }
        let result = lock(&self.internal.passes)
            .insert_framebuffer(desc.clone(), D3D11Framebuffer { views: views.clone() });
        if result.is_err() {
            self.release_views(&views);
        }
        result
    }

    fn delete_framebuffer(&self, framebuffer: FBHandle) -> Result<()> {
        let native = lock(&self.internal.passes).remove_framebuffer(framebuffer)?;
        self.release_views(&native.views);
        Ok(())
    }

    fn render_pass_layout(&self, render_pass: RPHandle) -> Result<Arc<RenderPassLayout>> {
        Ok(Arc::clone(
            &lock(&self.internal.passes).render_pass(render_pass)?.layout,
        ))
    }

    fn framebuffer_desc(&self, framebuffer: FBHandle) -> Result<FramebufferDesc> {
        Ok(lock(&self.internal.passes).framebuffer(framebuffer)?.desc.clone())
    }

    fn new_geometry(&self) -> Box<dyn Geometry> {
        Box::new(D3D11Geometry::new(self.clone()))
    }

    fn new_shader(&self) -> Box<dyn Shader> {
        Box::new(D3D11Shader::new(self.clone()))
    }

    fn new_pipeline(&self) -> Box<dyn Pipeline> {
        Box::new(D3D11Pipeline::new(self.clone()))
    }

    fn new_command_buffer(&self) -> Box<dyn CommandBuffer> {
        Box::new(D3D11CommandBuffer::new(self.clone()))
    }

    fn release(&self, resource: DeviceResource) -> Result<()> {
        self.internal.resources.release(resource)
    }

    fn wait_idle(&self) -> Result<()> {
        log::trace!("D3D11 wait_idle: immediate context, nothing in flight");
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferId) -> Result<Vec<u8>> {
        self.internal.resources.read_buffer(buffer)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl D3D11Device {
    fn release_views(&self, views: &[ViewId]) {
        for &view in views {
            if let Err(err) = self.internal.resources.release_view(view) {
                log::warn!("Failed to release framebuffer view {view:?}: {err}");
            }
        }
    }

    /// Ring depth the device was created with.
    pub(crate) fn ring_buffer_depth(&self) -> usize {
        self.internal.settings.ring_buffer_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verus_core::cgi::api::{Attachment, AttachmentRef, Format, Subpass};

    fn color_depth_pass() -> RenderPassDesc {
        RenderPassDesc {
            attachments: vec![
                Attachment::new("Color", Format::SrgbB8G8R8A8).load_op_clear(),
                Attachment::new("Depth", Format::UnormD24UintS8).load_op_clear(),
            ],
            subpasses: vec![Subpass::new("Sp0")
                .color([AttachmentRef::new("Color", ImageLayout::ColorAttachment)])
                .depth_stencil(AttachmentRef::new(
                    "Depth",
                    ImageLayout::DepthStencilAttachment,
                ))],
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn test_framebuffer_creates_one_view_per_attachment() {
        let device = D3D11Device::new(&CgiSettings::for_backend(BackendKind::D3D11));
        let rp = device.create_render_pass(&color_depth_pass()).unwrap();
        let color = device
            .create_texture(&TextureDesc::attachment("c", Format::SrgbB8G8R8A8, 64, 64))
            .unwrap();
        let depth = device
            .create_texture(&TextureDesc::attachment("d", Format::UnormD24UintS8, 64, 64))
            .unwrap();
        let fb = device
            .create_framebuffer(&FramebufferDesc {
                render_pass: rp,
                attachments: vec![color, depth],
                width: 64,
                height: 64,
                mip_level: 0,
            })
            .unwrap();

        let views = device.framebuffer(fb).unwrap().views;
        assert_eq!(device.view(views[0]).unwrap().kind, ViewKind::RenderTarget);
        let dsv = device.view(views[1]).unwrap();
        assert_eq!(dsv.kind, ViewKind::DepthStencil);
        assert_eq!(dsv.format, DxgiFormat::D24_UNORM_S8_UINT.raw());

        device.delete_framebuffer(fb).unwrap();
        assert_eq!(device.stats().live_views, 0);
        assert!(device.framebuffer_desc(fb).is_err());
    }

    #[test]
    fn test_framebuffer_count_mismatch_leaks_nothing() {
        let device = D3D11Device::new(&CgiSettings::for_backend(BackendKind::D3D11));
        let rp = device.create_render_pass(&color_depth_pass()).unwrap();
        let color = device
            .create_texture(&TextureDesc::attachment("c", Format::SrgbB8G8R8A8, 8, 8))
            .unwrap();
        let result = device.create_framebuffer(&FramebufferDesc {
            render_pass: rp,
            attachments: vec![color],
            width: 8,
            height: 8,
            mip_level: 0,
        });
        assert!(result.is_err());
        assert_eq!(device.stats().live_views, 0);
    }

    #[test]
    fn test_map_writes_buffer_and_is_logged() {
        let device = D3D11Device::new(&CgiSettings::for_backend(BackendKind::D3D11));
        device.enable_call_log(true);
        let buffer = device.resources().create_buffer("cb", 16, 0);
        device
            .call(D3D11Call::Map {
                buffer,
                map_type: super::super::native::D3D11Map::WRITE_DISCARD,
                offset: 4,
                data: vec![1, 2],
            })
            .unwrap();
        assert_eq!(&device.read_buffer(buffer).unwrap()[4..6], &[1, 2]);
        let log = device.take_call_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].name(), "Map");
        assert!(device.take_call_log().is_empty());
    }
}
