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

//! The render context handed to every CGI object.
//!
//! A [`RenderContext`] owns the backend device, the shader toolchain seams,
//! the settings and the frame bookkeeping: frame counter, ring buffer index
//! and the retire queue. It is created once by the application and passed by
//! reference into every constructor and recording call.

use crate::cgi::api::{
    BackendKind, CgiSettings, DeviceResource, FBHandle, FramebufferDesc, GeometryDesc,
    PipelineDesc, RPHandle, RenderPassDesc, ShaderDesc, TextureDesc, TextureId,
};
use crate::cgi::error::{ConfigurationError, Result};
use crate::cgi::retire_queue::RetireQueue;
use crate::cgi::traits::{
    CommandBuffer, Geometry, Pipeline, RenderDevice, Shader, ShaderCompiler, ShaderDiagnostics,
};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Device, toolchain and frame state shared by all CGI objects.
pub struct RenderContext {
    device: Arc<dyn RenderDevice>,
    compiler: Arc<dyn ShaderCompiler>,
    diagnostics: Arc<dyn ShaderDiagnostics>,
    settings: CgiSettings,
    frame_count: u64,
    ring_buffer_index: usize,
    in_frame: bool,
    retire_queue: Mutex<RetireQueue<DeviceResource>>,
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("backend", &self.device.backend())
            .field("frame_count", &self.frame_count)
            .field("ring_buffer_index", &self.ring_buffer_index)
            .field("in_frame", &self.in_frame)
            .finish_non_exhaustive()
    }
}

impl RenderContext {
    /// Creates a context. Fails if the settings are invalid or name another backend.
    pub fn new(
        device: Arc<dyn RenderDevice>,
        compiler: Arc<dyn ShaderCompiler>,
        diagnostics: Arc<dyn ShaderDiagnostics>,
        settings: CgiSettings,
    ) -> Result<Self> {
        settings.validate()?;
        if settings.backend != device.backend() {
            return Err(ConfigurationError::Invalid(format!(
                "settings select {:?} but the device is {:?}",
                settings.backend,
                device.backend()
            ))
            .into());
        }
        log::info!(
            "Render context created: backend={:?}, ring_buffer_depth={}",
            settings.backend,
            settings.ring_buffer_depth
        );
        Ok(Self {
            device,
            compiler,
            diagnostics,
            settings,
            frame_count: 0,
            ring_buffer_index: 0,
            in_frame: false,
            retire_queue: Mutex::new(RetireQueue::new()),
        })
    }

    /// The backend device.
    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }

    /// The backend of the device.
    pub fn backend(&self) -> BackendKind {
        self.device.backend()
    }

    /// The shader toolchain.
    pub fn compiler(&self) -> &dyn ShaderCompiler {
        self.compiler.as_ref()
    }

    /// The shader message sink.
    pub fn diagnostics(&self) -> &dyn ShaderDiagnostics {
        self.diagnostics.as_ref()
    }

    /// The settings.
    pub fn settings(&self) -> &CgiSettings {
        &self.settings
    }

    /// Frames ended so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// The ring slot of the frame being recorded.
    pub fn ring_buffer_index(&self) -> usize {
        self.ring_buffer_index
    }

    /// Number of frames that may be in flight.
    pub fn ring_buffer_depth(&self) -> usize {
        self.settings.ring_buffer_depth
    }

    /// Returns `true` between `begin_frame` and `end_frame`.
    pub fn is_in_frame(&self) -> bool {
        self.in_frame
    }

    /// Schedules `resource` for release `ring_buffer_depth + extra_frames` frames from now.
    pub fn retire(&self, resource: DeviceResource, extra_frames: u64) {
        let retire_at = self.frame_count + self.ring_buffer_depth() as u64 + extra_frames;
        log::trace!("Retiring {resource:?} at frame {retire_at}");
        self.queue().push(resource, retire_at);
    }

    /// Number of resources waiting in the retire queue.
    pub fn pending_retirements(&self) -> usize {
        self.queue().len()
    }

    /// Starts a frame and releases every resource whose retire frame has come.
    pub fn begin_frame(&mut self) -> Result<()> {
        if self.in_frame {
            return Err(ConfigurationError::invalid_state("begin_frame", "inside a frame").into());
        }
        let ready = self.queue().drain_ready(self.frame_count);
        if !ready.is_empty() {
            log::debug!(
                "Frame {}: releasing {} retired resources",
                self.frame_count,
                ready.len()
            );
        }
        for resource in ready {
            self.device.release(resource)?;
        }
        self.in_frame = true;
        Ok(())
    }

    /// Ends the frame and advances the ring buffer.
    pub fn end_frame(&mut self) -> Result<()> {
        if !self.in_frame {
            return Err(ConfigurationError::invalid_state("end_frame", "outside a frame").into());
        }
        self.in_frame = false;
        self.frame_count += 1;
        self.ring_buffer_index = (self.ring_buffer_index + 1) % self.ring_buffer_depth();
        Ok(())
    }

    /// Waits for the device and releases everything still queued.
    pub fn shutdown(&mut self) -> Result<()> {
        self.device.wait_idle()?;
        let pending = self.queue().drain_all();
        log::info!("Render context shutdown: releasing {} resources", pending.len());
        for resource in pending {
            self.device.release(resource)?;
        }
        Ok(())
    }

    /// Creates a texture.
    pub fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId> {
        self.device.create_texture(desc)
    }

    /// Registers a render pass.
    pub fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RPHandle> {
        self.device.create_render_pass(desc)
    }

    /// Registers a framebuffer.
    pub fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FBHandle> {
        self.device.create_framebuffer(desc)
    }

    /// Creates and initializes a geometry.
    pub fn create_geometry(&self, desc: &GeometryDesc) -> Result<Box<dyn Geometry>> {
        let mut geometry = self.device.new_geometry();
        geometry.init(self, desc)?;
        Ok(geometry)
    }

    /// Creates a shader and compiles its branches.
    pub fn create_shader(&self, desc: &ShaderDesc) -> Result<Box<dyn Shader>> {
        let mut shader = self.device.new_shader();
        shader.init(self, desc)?;
        Ok(shader)
    }

    /// Builds a pipeline.
    pub fn create_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<Box<dyn Pipeline>> {
        let mut pipeline = self.device.new_pipeline();
        pipeline.init(self, desc)?;
        Ok(pipeline)
    }

    /// Creates a ring-buffered command buffer.
    pub fn create_command_buffer(&self) -> Result<Box<dyn CommandBuffer>> {
        let mut cb = self.device.new_command_buffer();
        cb.init(self)?;
        Ok(cb)
    }

    fn queue(&self) -> MutexGuard<'_, RetireQueue<DeviceResource>> {
        self.retire_queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A scoped one-time submission that blocks until the GPU is idle.
///
/// Call [`finish`](Self::finish) to observe submission errors. Dropping
/// without `finish` still submits the work and logs an error.
pub struct OneTimeSubmit<'a> {
    ctx: &'a RenderContext,
    cb: Option<Box<dyn CommandBuffer>>,
}

impl<'a> OneTimeSubmit<'a> {
    /// Allocates a command buffer and begins recording.
    pub fn begin(ctx: &'a RenderContext) -> Result<Self> {
        let mut cb = ctx.device().new_command_buffer();
        cb.init_one_time_submit(ctx)?;
        Ok(Self { ctx, cb: Some(cb) })
    }

    /// The command buffer being recorded.
    pub fn command_buffer(&mut self) -> Result<&mut dyn CommandBuffer> {
        match self.cb.as_deref_mut() {
            Some(cb) => Ok(cb),
            None => Err(ConfigurationError::invalid_state("command_buffer", "already submitted").into()),
        }
    }

    /// Ends, submits and waits for completion.
    pub fn finish(mut self) -> Result<()> {
        match self.cb.take() {
            Some(mut cb) => cb.done_one_time_submit(self.ctx),
            None => Ok(()),
        }
    }
}

impl Drop for OneTimeSubmit<'_> {
    fn drop(&mut self) {
        if let Some(mut cb) = self.cb.take() {
            log::error!("One-time submission dropped without finish(); submitting now");
            if let Err(err) = cb.done_one_time_submit(self.ctx) {
                log::error!("One-time submission failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgi::api::{BufferId, RenderPassLayout};
    use crate::cgi::traits::{CompileOutput, CompileRequest, LogDiagnostics};
    use std::any::Any;

    #[derive(Debug, Default)]
    struct NullDevice {
        released: Mutex<Vec<DeviceResource>>,
    }

    impl RenderDevice for NullDevice {
        fn backend(&self) -> BackendKind {
            BackendKind::Vulkan
        }
        fn create_texture(&self, _: &TextureDesc) -> Result<TextureId> {
            Ok(TextureId(0))
        }
        fn texture_desc(&self, _: TextureId) -> Result<TextureDesc> {
            Ok(TextureDesc::default())
        }
        fn create_render_pass(&self, _: &RenderPassDesc) -> Result<RPHandle> {
            Ok(RPHandle::make(0))
        }
        fn delete_render_pass(&self, _: RPHandle) -> Result<()> {
            Ok(())
        }
        fn create_framebuffer(&self, _: &FramebufferDesc) -> Result<FBHandle> {
            Ok(FBHandle::make(0))
        }
        fn delete_framebuffer(&self, _: FBHandle) -> Result<()> {
            Ok(())
        }
        fn render_pass_layout(&self, _: RPHandle) -> Result<Arc<RenderPassLayout>> {
            unreachable!()
        }
        fn framebuffer_desc(&self, _: FBHandle) -> Result<FramebufferDesc> {
            unreachable!()
        }
        fn new_geometry(&self) -> Box<dyn Geometry> {
            unreachable!()
        }
        fn new_shader(&self) -> Box<dyn Shader> {
            unreachable!()
        }
        fn new_pipeline(&self) -> Box<dyn Pipeline> {
            unreachable!()
        }
        fn new_command_buffer(&self) -> Box<dyn CommandBuffer> {
            unreachable!()
        }
        fn release(&self, resource: DeviceResource) -> Result<()> {
            self.released.lock().unwrap().push(resource);
            Ok(())
        }
        fn wait_idle(&self) -> Result<()> {
            Ok(())
        }
        fn read_buffer(&self, _: BufferId) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct NullCompiler;

    impl ShaderCompiler for NullCompiler {
        fn compile(&self, _: &CompileRequest<'_>) -> CompileOutput {
            CompileOutput::default()
        }
    }

    fn context(device: Arc<NullDevice>) -> RenderContext {
        RenderContext::new(
            device,
            Arc::new(NullCompiler),
            Arc::new(LogDiagnostics::new()),
            CgiSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_ring_index_wraps_with_depth() {
        let mut ctx = context(Arc::new(NullDevice::default()));
        let mut seen = Vec::new();
        for _ in 0..7 {
            ctx.begin_frame().unwrap();
            seen.push(ctx.ring_buffer_index());
            ctx.end_frame().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(ctx.frame_count(), 7);
    }

    #[test]
    fn test_retired_resource_released_after_depth_frames() {
        let device = Arc::new(NullDevice::default());
        let mut ctx = context(Arc::clone(&device));
        ctx.begin_frame().unwrap();
        ctx.retire(DeviceResource::Buffer(BufferId(7)), 0);
        ctx.end_frame().unwrap();

        for _ in 0..2 {
            ctx.begin_frame().unwrap();
            ctx.end_frame().unwrap();
        }
        assert!(device.released.lock().unwrap().is_empty());
        assert_eq!(ctx.pending_retirements(), 1);

        ctx.begin_frame().unwrap();
        assert_eq!(
            *device.released.lock().unwrap(),
            vec![DeviceResource::Buffer(BufferId(7))]
        );
        ctx.end_frame().unwrap();
    }

    #[test]
    fn test_frame_brackets_are_enforced() {
        let mut ctx = context(Arc::new(NullDevice::default()));
        assert!(ctx.end_frame().is_err());
        ctx.begin_frame().unwrap();
        assert!(ctx.begin_frame().is_err());
    }

    #[test]
    fn test_backend_mismatch_is_rejected() {
        let err = RenderContext::new(
            Arc::new(NullDevice::default()),
            Arc::new(NullCompiler),
            Arc::new(LogDiagnostics::new()),
            CgiSettings::for_backend(BackendKind::D3D12),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let device = Arc::new(NullDevice::default());
        let mut ctx = context(Arc::clone(&device));
        ctx.retire(DeviceResource::Buffer(BufferId(1)), 10);
        ctx.shutdown().unwrap();
        assert_eq!(device.released.lock().unwrap().len(), 1);
        assert_eq!(ctx.pending_retirements(), 0);
    }
}
