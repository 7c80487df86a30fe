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

//! Bit-flag sets used by descriptor sets, pipelines and textures.

use super::enums::Stage;
use crate::verus_bitflags;

verus_bitflags! {
    /// Which shader stages can see a descriptor set or push constant range.
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader.
        const VS = 1 << 0;
        /// Hull (tessellation control) shader.
        const HS = 1 << 1;
        /// Domain (tessellation evaluation) shader.
        const DS = 1 << 2;
        /// Geometry shader.
        const GS = 1 << 3;
        /// Fragment shader.
        const FS = 1 << 4;
        /// Compute shader.
        const CS = 1 << 5;
        /// Task (amplification) shader.
        const TS = 1 << 6;
        /// Mesh shader.
        const MS = 1 << 7;
        /// Ray generation shader.
        const RG = 1 << 8;
        /// Any-hit shader.
        const AH = 1 << 9;
        /// Closest-hit shader.
        const CH = 1 << 10;
        /// Miss shader.
        const MISS = 1 << 11;
        /// Intersection shader.
        const IS = 1 << 12;
        /// Callable shader.
        const CALL = 1 << 13;
    }
}

impl ShaderStageFlags {
    /// Vertex and fragment stages.
    pub const VS_FS: Self = Self::VS.union(Self::FS);
    /// Vertex, hull and domain stages.
    pub const VS_HS_DS: Self = Self::VS.union(Self::HS).union(Self::DS);
    /// Every classic graphics stage.
    pub const VS_HS_DS_GS_FS: Self = Self::VS_HS_DS.union(Self::GS).union(Self::FS);

    /// Returns the flag for a single programmable stage.
    pub const fn from_stage(stage: Stage) -> Self {
        match stage {
            Stage::Vs => Self::VS,
            Stage::Hs => Self::HS,
            Stage::Ds => Self::DS,
            Stage::Gs => Self::GS,
            Stage::Fs => Self::FS,
            Stage::Cs => Self::CS,
        }
    }

    /// Returns `true` if `stage` is visible.
    pub const fn has_stage(&self, stage: Stage) -> bool {
        self.contains(Self::from_stage(stage))
    }
}

verus_bitflags! {
    /// Color channels a pipeline is allowed to write.
    pub struct ColorWriteMask: u8 {
        /// Red channel.
        const R = 1 << 0;
        /// Green channel.
        const G = 1 << 1;
        /// Blue channel.
        const B = 1 << 2;
        /// Alpha channel.
        const A = 1 << 3;
    }
}

impl ColorWriteMask {
    /// Every channel.
    pub const RGBA: Self = Self::all();
}

verus_bitflags! {
    /// How a texture may be used by the GPU.
    pub struct TextureUsage: u32 {
        /// Sampled from shaders.
        const SAMPLED = 1 << 0;
        /// Bound as a color attachment.
        const RENDER_TARGET = 1 << 1;
        /// Bound as a depth/stencil attachment.
        const DEPTH_STENCIL = 1 << 2;
        /// Bound as a storage image (unordered access view).
        const STORAGE = 1 << 3;
        /// Destination of uploads and copies.
        const TRANSFER_DST = 1 << 4;
        /// Source of copies.
        const TRANSFER_SRC = 1 << 5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags_union_and_contains() {
        let flags = ShaderStageFlags::VS | ShaderStageFlags::FS;
        assert_eq!(flags, ShaderStageFlags::VS_FS);
        assert!(flags.has_stage(Stage::Vs));
        assert!(flags.has_stage(Stage::Fs));
        assert!(!flags.has_stage(Stage::Cs));
        assert!(!flags.is_empty());
        assert!(ShaderStageFlags::empty().is_empty());
    }

    #[test]
    fn test_stage_flags_debug_lists_members() {
        let flags = ShaderStageFlags::VS | ShaderStageFlags::CS;
        assert_eq!(format!("{flags:?}"), "ShaderStageFlags(VS | CS)");
        assert_eq!(
            format!("{:?}", ShaderStageFlags::empty()),
            "ShaderStageFlags(empty)"
        );
    }

    #[test]
    fn test_write_mask_all() {
        assert_eq!(ColorWriteMask::RGBA.bits(), 0xF);
        let mut mask = ColorWriteMask::RGBA;
        mask.remove(ColorWriteMask::A);
        assert!(!mask.contains(ColorWriteMask::A));
        assert!(mask.intersects(ColorWriteMask::R));
    }

    #[test]
    fn test_from_bits_truncate_drops_unknown_bits() {
        let mask = ColorWriteMask::from_bits_truncate(0xFF);
        assert_eq!(mask, ColorWriteMask::RGBA);
    }
}
