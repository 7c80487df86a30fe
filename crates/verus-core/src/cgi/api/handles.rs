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

//! Index handles and opaque resource identifiers.
//!
//! Handles (`CSHandle`, `RPHandle`, `FBHandle`) are indices into an owner's
//! growable table with a reserved "unset" sentinel. Identifiers (`BufferId`,
//! `TextureId`, ...) are opaque keys into a device's resource maps.

use std::fmt;

macro_rules! index_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(i32);

        impl $name {
            /// The sentinel value of a handle that refers to nothing.
            pub const UNSET: Self = Self(-1);

            /// Creates a handle for `index`.
            pub const fn make(index: usize) -> Self {
                Self(index as i32)
            }

            /// Returns `true` if the handle refers to an entry.
            pub const fn is_set(self) -> bool {
                self.0 >= 0
            }

            /// Returns the index, or `None` for an unset handle.
            pub const fn get(self) -> Option<usize> {
                if self.0 >= 0 {
                    Some(self.0 as usize)
                } else {
                    None
                }
            }

            /// Returns the raw value, `-1` when unset.
            pub const fn raw(self) -> i32 {
                self.0
            }

            /// Makes the handle unset.
            pub fn reset(&mut self) {
                *self = Self::UNSET;
            }

            /// Human-readable kind, used in error messages.
            pub const KIND: &'static str = $kind;
        }

        impl Default for $name {
            fn default() -> Self {
                Self::UNSET
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.get() {
                    Some(index) => write!(f, "{}({})", stringify!($name), index),
                    None => write!(f, "{}(unset)", stringify!($name)),
                }
            }
        }
    };
}

index_handle!(
    /// Refers to a complex set: a concrete texture assignment for one descriptor set.
    CSHandle,
    "complex set"
);
index_handle!(
    /// Refers to a render pass registered with a device.
    RPHandle,
    "render pass"
);
index_handle!(
    /// Refers to a framebuffer registered with a device.
    FBHandle,
    "framebuffer"
);

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);
    };
}

resource_id!(
    /// An opaque handle to a GPU buffer.
    BufferId
);
resource_id!(
    /// An opaque handle to a texture (image) resource.
    TextureId
);
resource_id!(
    /// An opaque handle to a view of a texture (SRV, UAV, RTV, DSV or image view).
    ViewId
);
resource_id!(
    /// An opaque handle to a sampler object.
    SamplerId
);
resource_id!(
    /// An opaque handle to an allocated descriptor set.
    DescriptorSetId
);
resource_id!(
    /// An opaque handle to a compiled pipeline state object or layout.
    PipelineId
);

/// A device object whose release is deferred through the retire queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceResource {
    /// A buffer, typically a staging buffer.
    Buffer(BufferId),
    /// A texture view.
    View(ViewId),
    /// A sampler.
    Sampler(SamplerId),
    /// A descriptor set returned to its pool.
    DescriptorSet(DescriptorSetId),
    /// A pipeline, pipeline layout or root signature.
    Pipeline(PipelineId),
    /// A texture.
    Texture(TextureId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handle_is_unset() {
        let handle = CSHandle::default();
        assert!(!handle.is_set());
        assert_eq!(handle.get(), None);
        assert_eq!(handle.raw(), -1);
        assert_eq!(handle, CSHandle::UNSET);
    }

    #[test]
    fn test_make_and_reset() {
        let mut handle = RPHandle::make(3);
        assert!(handle.is_set());
        assert_eq!(handle.get(), Some(3));
        handle.reset();
        assert!(!handle.is_set());
    }

    #[test]
    fn test_handle_debug() {
        assert_eq!(format!("{:?}", FBHandle::make(2)), "FBHandle(2)");
        assert_eq!(format!("{:?}", FBHandle::UNSET), "FBHandle(unset)");
        assert_eq!(CSHandle::KIND, "complex set");
    }
}
