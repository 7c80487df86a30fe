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

//! Backend-independent bookkeeping of a recording session.
//!
//! Every backend command buffer embeds a [`RecordingState`]. It enforces the
//! `Initial -> Recording -> RenderPassActive -> Recording -> Ended` state
//! machine, keeps the active render pass, framebuffer, subpass and clear
//! values, and computes the layout transitions and clears each backend
//! turns into native calls.

use crate::cgi::api::{
    AttachmentClear, FBHandle, FramebufferDesc, ImageLayout, LayoutTransition, PipelineBindPoint,
    RPHandle, RenderPassLayout,
};
use crate::cgi::error::{ConfigurationError, Result};
use crate::cgi::traits::CommandBufferState;
use std::sync::Arc;

/// The render pass instance a command buffer is inside of.
#[derive(Debug, Clone)]
pub struct ActivePass {
    /// Handle of the render pass.
    pub handle: RPHandle,
    /// Resolved layout of the render pass.
    pub layout: Arc<RenderPassLayout>,
    /// Handle of the framebuffer.
    pub framebuffer: FBHandle,
    /// The framebuffer.
    pub framebuffer_desc: FramebufferDesc,
    /// Current subpass.
    pub subpass: usize,
    /// One clear value per attachment.
    pub clear_values: Vec<[f32; 4]>,
    /// Layout each attachment is in.
    pub layouts: Vec<ImageLayout>,
}

impl ActivePass {
    /// Clears due when the current subpass begins, paired with their clear value.
    pub fn pending_clears(&self) -> Vec<(AttachmentClear, [f32; 4])> {
        self.layout
            .clears_for_subpass(self.subpass)
            .into_iter()
            .map(|clear| (clear, self.clear_values[clear.attachment]))
            .collect()
    }
}

/// Validated state shared by all backend command buffers.
#[derive(Debug, Default)]
pub struct RecordingState {
    state: CommandBufferState,
    pass: Option<ActivePass>,
    pipeline_bound: bool,
    compute_bound: bool,
}

impl RecordingState {
    /// Current state.
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// The active render pass, if any.
    pub fn pass(&self) -> Option<&ActivePass> {
        self.pass.as_ref()
    }

    /// Starts a session. Allowed from `Initial` and `Ended`.
    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            CommandBufferState::Initial | CommandBufferState::Ended => {
                self.state = CommandBufferState::Recording;
                self.pass = None;
                self.pipeline_bound = false;
                self.compute_bound = false;
                Ok(())
            }
            state => Err(ConfigurationError::invalid_state("begin", state.to_string()).into()),
        }
    }

    /// Ends the session. Not allowed inside a render pass.
    pub fn end(&mut self) -> Result<()> {
        self.require_outside_pass("end")?;
        self.state = CommandBufferState::Ended;
        Ok(())
    }

    /// Returns to `Initial` after the recorded work was submitted.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fails unless the session has ended.
    pub fn require_ended(&self, operation: &'static str) -> Result<()> {
        if self.state != CommandBufferState::Ended {
            return Err(ConfigurationError::invalid_state(operation, self.state.to_string()).into());
        }
        Ok(())
    }

    /// Fails unless recording, inside or outside a pass.
    pub fn require_recording(&self, operation: &'static str) -> Result<()> {
        match self.state {
            CommandBufferState::Recording | CommandBufferState::RenderPassActive => Ok(()),
            state => Err(ConfigurationError::invalid_state(operation, state.to_string()).into()),
        }
    }

    /// Fails unless recording outside a render pass.
    pub fn require_outside_pass(&self, operation: &'static str) -> Result<()> {
        if self.state != CommandBufferState::Recording {
            return Err(ConfigurationError::invalid_state(operation, self.state.to_string()).into());
        }
        Ok(())
    }

    /// Fails unless inside a render pass.
    pub fn require_pass(&self, operation: &'static str) -> Result<&ActivePass> {
        match (&self.pass, self.state) {
            (Some(pass), CommandBufferState::RenderPassActive) => Ok(pass),
            (_, state) => Err(ConfigurationError::invalid_state(operation, state.to_string()).into()),
        }
    }

    /// Enters a render pass and returns the transitions into subpass 0.
    ///
    /// Fails if the framebuffer belongs to another render pass or the number
    /// of clear values differs from the number of attachments.
    pub fn begin_render_pass(
        &mut self,
        handle: RPHandle,
        layout: Arc<RenderPassLayout>,
        framebuffer: FBHandle,
        framebuffer_desc: FramebufferDesc,
        clear_values: &[[f32; 4]],
    ) -> Result<Vec<LayoutTransition>> {
        self.require_outside_pass("begin_render_pass")?;
        if framebuffer_desc.render_pass != handle {
            return Err(ConfigurationError::Invalid(format!(
                "{framebuffer:?} was created for {:?}, not {handle:?}",
                framebuffer_desc.render_pass
            ))
            .into());
        }
        if clear_values.len() != layout.attachment_count() {
            return Err(ConfigurationError::CountMismatch {
                what: "clear values",
                expected: layout.attachment_count(),
                actual: clear_values.len(),
            }
            .into());
        }

        let mut layouts = layout.initial_layouts();
        let transitions = layout.transitions_for_subpass(0, &mut layouts);
        self.pass = Some(ActivePass {
            handle,
            layout,
            framebuffer,
            framebuffer_desc,
            subpass: 0,
            clear_values: clear_values.to_vec(),
            layouts,
        });
        self.state = CommandBufferState::RenderPassActive;
        self.pipeline_bound = false;
        Ok(transitions)
    }

    /// Advances the subpass and returns the transitions into it.
    pub fn next_subpass(&mut self) -> Result<Vec<LayoutTransition>> {
        self.require_pass("next_subpass")?;
        let pass = self.active_mut()?;
        let next = pass.subpass + 1;
        if next >= pass.layout.subpass_count() {
            return Err(ConfigurationError::invalid_state(
                "next_subpass",
                format!("already in the last subpass ({})", pass.subpass),
            )
            .into());
        }
        pass.subpass = next;
        let layout = Arc::clone(&pass.layout);
        Ok(layout.transitions_for_subpass(next, &mut pass.layouts))
    }

    /// Leaves the render pass and returns the transitions to the final layouts.
    pub fn end_render_pass(&mut self) -> Result<(ActivePass, Vec<LayoutTransition>)> {
        let pass = self.require_pass("end_render_pass")?;
        let last = pass.layout.subpass_count() - 1;
        if pass.subpass != last {
            return Err(ConfigurationError::invalid_state(
                "end_render_pass",
                format!("in subpass {} of {}", pass.subpass, last + 1),
            )
            .into());
        }
        let mut pass = self.pass.take().ok_or_else(|| {
            ConfigurationError::invalid_state("end_render_pass", "outside a render pass")
        })?;
        let layout = Arc::clone(&pass.layout);
        let transitions = layout.final_transitions(&mut pass.layouts);
        self.state = CommandBufferState::Recording;
        Ok((pass, transitions))
    }

    /// Records that a pipeline was bound.
    ///
    /// Compute pipelines bind outside render passes. Graphics pipelines bind
    /// only inside the render pass and subpass they were built for.
    pub fn bind_pipeline(&mut self, bind_point: PipelineBindPoint) -> Result<()> {
        match bind_point {
            PipelineBindPoint::Compute => self.require_outside_pass("bind_pipeline")?,
            PipelineBindPoint::Graphics { render_pass, subpass } => {
                let pass = self.require_pass("bind_pipeline")?;
                if pass.handle != render_pass || pass.subpass != subpass {
                    return Err(ConfigurationError::Invalid(format!(
                        "pipeline built for {render_pass:?} subpass {subpass} bound in {:?} subpass {}",
                        pass.handle, pass.subpass
                    ))
                    .into());
                }
            }
        }
        let compute = bind_point.is_compute();
        self.pipeline_bound = !compute;
        self.compute_bound = compute;
        Ok(())
    }

    /// Checks a draw call can be issued.
    pub fn require_draw(&self, operation: &'static str) -> Result<()> {
        self.require_pass(operation)?;
        if !self.pipeline_bound {
            return Err(ConfigurationError::invalid_state(operation, "no graphics pipeline bound").into());
        }
        Ok(())
    }

    /// Checks a dispatch can be issued.
    pub fn require_dispatch(&self, operation: &'static str) -> Result<()> {
        self.require_outside_pass(operation)?;
        if !self.compute_bound {
            return Err(ConfigurationError::invalid_state(operation, "no compute pipeline bound").into());
        }
        Ok(())
    }

    fn active_mut(&mut self) -> Result<&mut ActivePass> {
        self.pass.as_mut().ok_or_else(|| {
            ConfigurationError::invalid_state("next_subpass", "outside a render pass").into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgi::api::{
        Attachment, AttachmentRef, Format, RenderPassDesc, Subpass, TextureId,
    };

    fn two_subpass_layout() -> Arc<RenderPassLayout> {
        let desc = RenderPassDesc {
            attachments: vec![
                Attachment::new("Color", Format::UnormR8G8B8A8)
                    .load_op_clear()
                    .layout(ImageLayout::Undefined, ImageLayout::ShaderReadOnly),
                Attachment::new("Extra", Format::FloatR16)
                    .load_op_clear()
                    .layout(ImageLayout::Undefined, ImageLayout::ShaderReadOnly),
            ],
            subpasses: vec![
                Subpass::new("Sp0").color([AttachmentRef::new(
                    "Color",
                    ImageLayout::ColorAttachment,
                )]),
                Subpass::new("Sp1").color([AttachmentRef::new(
                    "Extra",
                    ImageLayout::ColorAttachment,
                )]),
            ],
            dependencies: Vec::new(),
        };
        Arc::new(RenderPassLayout::resolve(&desc).unwrap())
    }

    fn framebuffer(rp: RPHandle) -> FramebufferDesc {
        FramebufferDesc {
            render_pass: rp,
            attachments: vec![TextureId(1), TextureId(2)],
            width: 64,
            height: 64,
            mip_level: 0,
        }
    }

    fn begin_pass(state: &mut RecordingState) -> Vec<LayoutTransition> {
        let rp = RPHandle::make(0);
        state
            .begin_render_pass(
                rp,
                two_subpass_layout(),
                FBHandle::make(0),
                framebuffer(rp),
                &[[0.0; 4], [1.0; 4]],
            )
            .unwrap()
    }

    #[test]
    fn test_state_machine_happy_path() {
        let mut state = RecordingState::default();
        assert_eq!(state.state(), CommandBufferState::Initial);
        state.begin().unwrap();
        let transitions = begin_pass(&mut state);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, ImageLayout::ColorAttachment);
        assert_eq!(state.state(), CommandBufferState::RenderPassActive);

        let transitions = state.next_subpass().unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].attachment, 1);

        let (_, finals) = state.end_render_pass().unwrap();
        assert_eq!(finals.len(), 2);
        assert!(finals.iter().all(|t| t.to == ImageLayout::ShaderReadOnly));
        state.end().unwrap();
        assert_eq!(state.state(), CommandBufferState::Ended);
    }

    #[test]
    fn test_end_render_pass_before_last_subpass_fails() {
        let mut state = RecordingState::default();
        state.begin().unwrap();
        begin_pass(&mut state);
        let err = state.end_render_pass().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("subpass 0 of 2"));
    }

    #[test]
    fn test_draw_outside_pass_fails() {
        let mut state = RecordingState::default();
        state.begin().unwrap();
        assert!(state.require_draw("draw").is_err());
    }

    #[test]
    fn test_end_inside_pass_fails() {
        let mut state = RecordingState::default();
        state.begin().unwrap();
        begin_pass(&mut state);
        assert!(state.end().is_err());
    }

    #[test]
    fn test_clear_value_count_is_validated() {
        let mut state = RecordingState::default();
        state.begin().unwrap();
        let rp = RPHandle::make(0);
        let err = state
            .begin_render_pass(
                rp,
                two_subpass_layout(),
                FBHandle::make(0),
                framebuffer(rp),
                &[[0.0; 4]],
            )
            .unwrap_err();
        assert!(err.to_string().contains("clear values: expected 2, got 1"));
    }

    #[test]
    fn test_deferred_clear_happens_in_later_subpass() {
        let mut state = RecordingState::default();
        state.begin().unwrap();
        begin_pass(&mut state);
        let clears = state.pass().unwrap().pending_clears();
        assert_eq!(clears.len(), 1);
        assert_eq!(clears[0].0.attachment, 0);

        state.next_subpass().unwrap();
        let clears = state.pass().unwrap().pending_clears();
        assert_eq!(clears.len(), 1);
        assert_eq!(clears[0].0.attachment, 1);
        assert_eq!(clears[0].1, [1.0; 4]);
    }

    #[test]
    fn test_next_subpass_past_end_fails() {
        let mut state = RecordingState::default();
        state.begin().unwrap();
        begin_pass(&mut state);
        state.next_subpass().unwrap();
        assert!(state.next_subpass().is_err());
    }

    #[test]
    fn test_graphics_pipeline_binds_only_in_its_subpass() {
        let mut state = RecordingState::default();
        state.begin().unwrap();
        let sp0 = PipelineBindPoint::Graphics {
            render_pass: RPHandle::make(0),
            subpass: 0,
        };
        let sp1 = PipelineBindPoint::Graphics {
            render_pass: RPHandle::make(0),
            subpass: 1,
        };
        let other_pass = PipelineBindPoint::Graphics {
            render_pass: RPHandle::make(1),
            subpass: 0,
        };
        assert!(state.bind_pipeline(sp0).is_err());
        state.bind_pipeline(PipelineBindPoint::Compute).unwrap();

        begin_pass(&mut state);
        assert!(state.bind_pipeline(PipelineBindPoint::Compute).is_err());
        let err = state.bind_pipeline(other_pass).unwrap_err();
        assert!(err.is_configuration());
        assert!(state.require_draw("draw").is_err());
        assert!(state.bind_pipeline(sp1).is_err());
        state.bind_pipeline(sp0).unwrap();
        state.require_draw("draw").unwrap();

        state.next_subpass().unwrap();
        assert!(state.require_draw("draw").is_ok());
        assert!(state.bind_pipeline(sp0).is_err());
        state.bind_pipeline(sp1).unwrap();
    }

    #[test]
    fn test_begin_twice_fails() {
        let mut state = RecordingState::default();
        state.begin().unwrap();
        assert!(state.begin().is_err());
    }
}
