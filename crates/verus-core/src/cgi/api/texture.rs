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

//! Texture descriptions.
//!
//! Texture content upload is handled outside this layer; the device only
//! needs enough information to create views for complex sets and framebuffers
//! and to track each texture's current layout for barrier generation.

use super::enums::Format;
use super::flags::TextureUsage;

/// Describes a texture to create on a device.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    /// Debug name.
    pub name: String,
    /// Pixel format.
    pub format: Format,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels, `1` for 2D textures.
    pub depth: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Number of array layers.
    pub array_layers: u32,
    /// MSAA sample count.
    pub sample_count: u32,
    /// Allowed usages.
    pub usage: TextureUsage,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            format: Format::UnormR8G8B8A8,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            sample_count: 1,
            usage: TextureUsage::SAMPLED,
        }
    }
}

impl TextureDesc {
    /// A sampled 2D texture.
    pub fn sampled(name: impl Into<String>, format: Format, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            format,
            width,
            height,
            usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
            ..Default::default()
        }
    }

    /// A texture usable as a color or depth attachment, picked from `format`.
    pub fn attachment(name: impl Into<String>, format: Format, width: u32, height: u32) -> Self {
        let usage = if format.is_depth() {
            TextureUsage::DEPTH_STENCIL
        } else {
            TextureUsage::RENDER_TARGET
        };
        Self {
            name: name.into(),
            format,
            width,
            height,
            usage: usage | TextureUsage::SAMPLED,
            ..Default::default()
        }
    }

    /// Adds storage (unordered access) usage.
    pub fn with_storage(mut self) -> Self {
        self.usage.insert(TextureUsage::STORAGE);
        self
    }

    /// Sets the mip level count.
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Sets the array layer count.
    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_usage_follows_format() {
        let depth = TextureDesc::attachment("Depth", Format::UnormD24UintS8, 64, 64);
        assert!(depth.usage.contains(TextureUsage::DEPTH_STENCIL));
        assert!(!depth.usage.contains(TextureUsage::RENDER_TARGET));

        let color = TextureDesc::attachment("Color", Format::SrgbB8G8R8A8, 64, 64);
        assert!(color.usage.contains(TextureUsage::RENDER_TARGET));
    }

    #[test]
    fn test_builders() {
        let desc = TextureDesc::sampled("Albedo", Format::SrgbBc1, 256, 256)
            .with_mip_levels(9)
            .with_storage();
        assert_eq!(desc.mip_levels, 9);
        assert!(desc.usage.contains(TextureUsage::STORAGE));
        assert_eq!(desc.array_layers, 1);
    }
}
