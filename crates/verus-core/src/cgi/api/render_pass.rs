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

//! Render pass and framebuffer descriptions.
//!
//! A [`RenderPassDesc`] names its attachments and references them by name from
//! each [`Subpass`]. Devices resolve it once into a [`RenderPassLayout`], which
//! every backend uses to decide when an attachment is cleared and which layout
//! (or resource state) it must be in during each subpass.

use super::enums::{Format, ImageLayout};
use super::handles::{RPHandle, TextureId};
use crate::cgi::error::{ConfigurationError, Result};

/// What happens to an attachment's contents when the pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    /// Preserve the previous contents.
    #[default]
    Load,
    /// Clear to the value supplied at `begin_render_pass`.
    Clear,
    /// Contents are undefined.
    DontCare,
}

/// What happens to an attachment's contents when the pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Write the contents back to memory.
    #[default]
    Store,
    /// Contents may be discarded.
    DontCare,
}

/// One image used by a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Name subpasses refer to.
    pub name: String,
    /// Pixel format.
    pub format: Format,
    /// MSAA sample count.
    pub sample_count: u32,
    /// Color or depth load operation.
    pub load_op: LoadOp,
    /// Color or depth store operation.
    pub store_op: StoreOp,
    /// Stencil load operation.
    pub stencil_load_op: LoadOp,
    /// Stencil store operation.
    pub stencil_store_op: StoreOp,
    /// Layout the image is in when the pass begins.
    pub initial_layout: ImageLayout,
    /// Layout the image is left in when the pass ends.
    pub final_layout: ImageLayout,
}

impl Attachment {
    /// Creates an attachment that loads and stores its contents.
    pub fn new(name: impl Into<String>, format: Format) -> Self {
        Self {
            name: name.into(),
            format,
            sample_count: 1,
            load_op: LoadOp::Load,
            store_op: StoreOp::Store,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
            initial_layout: ImageLayout::Undefined,
            final_layout: ImageLayout::Undefined,
        }
    }

    /// Sets the MSAA sample count.
    pub fn sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// Clears the attachment on first use.
    pub fn load_op_clear(mut self) -> Self {
        self.load_op = LoadOp::Clear;
        self
    }

    /// Leaves previous contents undefined.
    pub fn load_op_dont_care(mut self) -> Self {
        self.load_op = LoadOp::DontCare;
        self
    }

    /// Allows the contents to be discarded at the end of the pass.
    pub fn store_op_dont_care(mut self) -> Self {
        self.store_op = StoreOp::DontCare;
        self
    }

    /// Clears the stencil aspect on first use.
    pub fn stencil_load_op_clear(mut self) -> Self {
        self.stencil_load_op = LoadOp::Clear;
        self
    }

    /// Preserves the stencil aspect across the pass.
    pub fn stencil_load_store(mut self) -> Self {
        self.stencil_load_op = LoadOp::Load;
        self.stencil_store_op = StoreOp::Store;
        self
    }

    /// Sets the layouts when the pass begins and ends.
    pub fn layout(mut self, when_begins: ImageLayout, when_ends: ImageLayout) -> Self {
        self.initial_layout = when_begins;
        self.final_layout = when_ends;
        self
    }

    /// Sets the same layout for both ends of the pass.
    pub fn layout_both(self, both: ImageLayout) -> Self {
        self.layout(both, both)
    }

    /// Sets only the final layout.
    pub fn final_layout(mut self, when_ends: ImageLayout) -> Self {
        self.final_layout = when_ends;
        self
    }
}

/// A reference from a subpass to a named attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Attachment name.
    pub name: String,
    /// Layout the attachment must be in during the subpass.
    pub layout: ImageLayout,
}

impl AttachmentRef {
    /// Creates a reference.
    pub fn new(name: impl Into<String>, layout: ImageLayout) -> Self {
        Self {
            name: name.into(),
            layout,
        }
    }
}

/// One rendering phase of a render pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subpass {
    /// Debug name.
    pub name: String,
    /// Attachments read as input attachments.
    pub input: Vec<AttachmentRef>,
    /// Color attachments, in output location order.
    pub color: Vec<AttachmentRef>,
    /// MSAA resolve targets, one per color attachment.
    pub resolve: Vec<AttachmentRef>,
    /// Attachments whose contents must survive this subpass untouched.
    pub preserve: Vec<AttachmentRef>,
    /// Depth/stencil attachment.
    pub depth_stencil: Option<AttachmentRef>,
}

impl Subpass {
    /// Creates an empty subpass.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the input attachments.
    pub fn input(mut self, refs: impl IntoIterator<Item = AttachmentRef>) -> Self {
        self.input = refs.into_iter().collect();
        self
    }

    /// Sets the color attachments.
    pub fn color(mut self, refs: impl IntoIterator<Item = AttachmentRef>) -> Self {
        self.color = refs.into_iter().collect();
        self
    }

    /// Sets the resolve attachments.
    pub fn resolve(mut self, refs: impl IntoIterator<Item = AttachmentRef>) -> Self {
        self.resolve = refs.into_iter().collect();
        self
    }

    /// Sets the preserved attachments.
    pub fn preserve(mut self, refs: impl IntoIterator<Item = AttachmentRef>) -> Self {
        self.preserve = refs.into_iter().collect();
        self
    }

    /// Sets the depth/stencil attachment.
    pub fn depth_stencil(mut self, r: AttachmentRef) -> Self {
        self.depth_stencil = Some(r);
        self
    }
}

/// An execution dependency between two subpasses. `None` means outside the pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dependency {
    /// Producing subpass.
    pub src: Option<String>,
    /// Consuming subpass.
    pub dst: Option<String>,
}

impl Dependency {
    /// Creates an external-to-external dependency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the producing subpass.
    pub fn src(mut self, name: impl Into<String>) -> Self {
        self.src = Some(name.into());
        self
    }

    /// Sets the consuming subpass.
    pub fn dst(mut self, name: impl Into<String>) -> Self {
        self.dst = Some(name.into());
        self
    }
}

/// The full description of a render pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderPassDesc {
    /// Attachments, indexed by position.
    pub attachments: Vec<Attachment>,
    /// Subpasses, executed in order.
    pub subpasses: Vec<Subpass>,
    /// Dependencies between subpasses.
    pub dependencies: Vec<Dependency>,
}

/// An attachment reference resolved to an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRef {
    /// Index into [`RenderPassLayout::attachments`].
    pub index: usize,
    /// Required layout during the subpass.
    pub layout: ImageLayout,
}

/// A subpass with all references resolved to indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedSubpass {
    /// Input attachments.
    pub input: Vec<ResolvedRef>,
    /// Color attachments.
    pub color: Vec<ResolvedRef>,
    /// Resolve attachments.
    pub resolve: Vec<ResolvedRef>,
    /// Preserved attachment indices.
    pub preserve: Vec<usize>,
    /// Depth/stencil attachment.
    pub depth_stencil: Option<ResolvedRef>,
    /// `true` when the depth/stencil attachment is only read.
    pub depth_stencil_read_only: bool,
}

/// An attachment together with the subpass that first uses it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttachment {
    /// The declared attachment.
    pub desc: Attachment,
    /// First subpass referencing this attachment as color or depth/stencil.
    /// A `Clear` load op takes effect when that subpass begins.
    pub clear_subpass_index: Option<usize>,
}

/// A subpass dependency resolved to indices; `None` is external.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDependency {
    /// Producing subpass.
    pub src: Option<usize>,
    /// Consuming subpass.
    pub dst: Option<usize>,
}

/// A layout change an attachment needs before it can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Attachment index.
    pub attachment: usize,
    /// Current layout.
    pub from: ImageLayout,
    /// Required layout.
    pub to: ImageLayout,
}

/// A clear that must be performed when a subpass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentClear {
    /// Attachment index, also the index into the clear value array.
    pub attachment: usize,
    /// Clear color (for color attachments) or depth (for depth attachments).
    pub clear_main: bool,
    /// Clear the stencil aspect.
    pub clear_stencil: bool,
    /// `true` if the attachment is a depth/stencil attachment.
    pub is_depth: bool,
}

/// A render pass with every name resolved. Shared by all backends.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderPassLayout {
    /// Resolved attachments.
    pub attachments: Vec<ResolvedAttachment>,
    /// Resolved subpasses.
    pub subpasses: Vec<ResolvedSubpass>,
    /// Resolved dependencies.
    pub dependencies: Vec<ResolvedDependency>,
}

impl RenderPassLayout {
    /// Resolves attachment names and computes each attachment's clear subpass.
    pub fn resolve(desc: &RenderPassDesc) -> Result<Self> {
        if desc.subpasses.is_empty() {
            return Err(ConfigurationError::Invalid(
                "CreateRenderPass(); a render pass needs at least one subpass".to_string(),
            )
            .into());
        }

        let index_of = |name: &str| -> Result<usize> {
            desc.attachments
                .iter()
                .position(|a| a.name == name)
                .ok_or_else(|| {
                    ConfigurationError::Invalid(format!(
                        "CreateRenderPass(); attachment '{name}' not found"
                    ))
                    .into()
                })
        };
        let resolve_ref = |r: &AttachmentRef| -> Result<ResolvedRef> {
            Ok(ResolvedRef {
                index: index_of(&r.name)?,
                layout: r.layout,
            })
        };

        let mut attachments: Vec<ResolvedAttachment> = desc
            .attachments
            .iter()
            .map(|a| ResolvedAttachment {
                desc: a.clone(),
                clear_subpass_index: None,
            })
            .collect();

        let mut subpasses = Vec::with_capacity(desc.subpasses.len());
        for (subpass_index, subpass) in desc.subpasses.iter().enumerate() {
            let mut resolved = ResolvedSubpass {
                input: subpass
                    .input
                    .iter()
                    .map(&resolve_ref)
                    .collect::<Result<_>>()?,
                color: subpass
                    .color
                    .iter()
                    .map(&resolve_ref)
                    .collect::<Result<_>>()?,
                resolve: subpass
                    .resolve
                    .iter()
                    .map(&resolve_ref)
                    .collect::<Result<_>>()?,
                preserve: subpass
                    .preserve
                    .iter()
                    .map(|r| index_of(&r.name))
                    .collect::<Result<_>>()?,
                depth_stencil: None,
                depth_stencil_read_only: false,
            };

            for color in &resolved.color {
                attachments[color.index]
                    .clear_subpass_index
                    .get_or_insert(subpass_index);
            }

            if let Some(ds) = &subpass.depth_stencil {
                let ds = resolve_ref(ds)?;
                resolved.depth_stencil_read_only = ds.layout == ImageLayout::DepthStencilReadOnly;
                attachments[ds.index]
                    .clear_subpass_index
                    .get_or_insert(subpass_index);
                resolved.depth_stencil = Some(ds);
            }

            subpasses.push(resolved);
        }

        let subpass_index_of = |name: &Option<String>| -> Result<Option<usize>> {
            match name {
                None => Ok(None),
                Some(name) => desc
                    .subpasses
                    .iter()
                    .position(|s| &s.name == name)
                    .map(Some)
                    .ok_or_else(|| {
                        ConfigurationError::Invalid(format!(
                            "CreateRenderPass(); subpass '{name}' not found"
                        ))
                        .into()
                    }),
            }
        };
        let dependencies = desc
            .dependencies
            .iter()
            .map(|d| {
                Ok(ResolvedDependency {
                    src: subpass_index_of(&d.src)?,
                    dst: subpass_index_of(&d.dst)?,
                })
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            attachments,
            subpasses,
            dependencies,
        })
    }

    /// Number of attachments (and therefore of clear values).
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Number of subpasses.
    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }

    /// Returns the subpass at `index` or a configuration error.
    pub fn subpass(&self, index: usize) -> Result<&ResolvedSubpass> {
        self.subpasses.get(index).ok_or_else(|| {
            ConfigurationError::InvalidHandle {
                kind: "subpass",
                index: index as i64,
            }
            .into()
        })
    }

    /// Layout `attachment` must be in during `subpass`, or `None` if unused there.
    pub fn layout_in_subpass(&self, subpass: usize, attachment: usize) -> Option<ImageLayout> {
        let sp = self.subpasses.get(subpass)?;
        sp.color
            .iter()
            .chain(sp.input.iter())
            .chain(sp.resolve.iter())
            .chain(sp.depth_stencil.iter())
            .find(|r| r.index == attachment)
            .map(|r| r.layout)
    }

    /// Computes the transitions needed to enter `subpass` and updates `current`.
    ///
    /// `current` holds the layout each attachment is in and must have one entry
    /// per attachment.
    pub fn transitions_for_subpass(
        &self,
        subpass: usize,
        current: &mut [ImageLayout],
    ) -> Vec<LayoutTransition> {
        let mut transitions = Vec::new();
        for (index, layout) in current.iter_mut().enumerate() {
            if let Some(required) = self.layout_in_subpass(subpass, index) {
                if *layout != required {
                    transitions.push(LayoutTransition {
                        attachment: index,
                        from: *layout,
                        to: required,
                    });
                    *layout = required;
                }
            }
        }
        transitions
    }

    /// Computes the transitions to each attachment's final layout and updates `current`.
    pub fn final_transitions(&self, current: &mut [ImageLayout]) -> Vec<LayoutTransition> {
        let mut transitions = Vec::new();
        for (index, layout) in current.iter_mut().enumerate() {
            let target = self.attachments[index].desc.final_layout;
            if target != ImageLayout::Undefined && *layout != target {
                transitions.push(LayoutTransition {
                    attachment: index,
                    from: *layout,
                    to: target,
                });
                *layout = target;
            }
        }
        transitions
    }

    /// Initial layout of every attachment, as declared.
    pub fn initial_layouts(&self) -> Vec<ImageLayout> {
        self.attachments
            .iter()
            .map(|a| a.desc.initial_layout)
            .collect()
    }

    /// Clears that take effect when `subpass` begins.
    pub fn clears_for_subpass(&self, subpass: usize) -> Vec<AttachmentClear> {
        self.attachments
            .iter()
            .enumerate()
            .filter(|(_, a)| a.clear_subpass_index == Some(subpass))
            .filter_map(|(index, a)| {
                let is_depth = a.desc.format.is_depth();
                let clear_main = a.desc.load_op == LoadOp::Clear;
                let clear_stencil =
                    a.desc.format.has_stencil() && a.desc.stencil_load_op == LoadOp::Clear;
                (clear_main || clear_stencil).then_some(AttachmentClear {
                    attachment: index,
                    clear_main,
                    clear_stencil,
                    is_depth,
                })
            })
            .collect()
    }
}

/// Describes the images bound to a render pass instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDesc {
    /// Render pass this framebuffer is compatible with.
    pub render_pass: RPHandle,
    /// One texture per render pass attachment, same order.
    pub attachments: Vec<TextureId>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Mip level rendered to.
    pub mip_level: u32,
}
