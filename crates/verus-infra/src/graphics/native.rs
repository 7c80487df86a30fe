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

//! Declares the newtypes that carry Direct3D values. Vulkan uses `ash::vk`.

/// Declares a transparent newtype over a native enum value.
///
/// `Debug` prints the constant name when the value matches one, the raw
/// value otherwise.
macro_rules! native_enum {
    (
        $(#[$outer:meta])*
        $vis:vis struct $name:ident($ty:ty) {
            $(
                $(#[$inner:meta])*
                const $variant:ident = $value:expr;
            )*
        }
    ) => {
        $(#[$outer])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name(pub $ty);

        impl $name {
            $(
                #[doc = concat!("`", stringify!($variant), "`.")]
                $(#[$inner])*
                pub const $variant: Self = Self($value);
            )*

            /// The raw native value.
            pub const fn raw(self) -> $ty {
                self.0
            }

            /// Name of the constant carrying this value, if any.
            pub fn name(self) -> Option<&'static str> {
                $(
                    if self.0 == $value {
                        return Some(stringify!($variant));
                    }
                )*
                None
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self.name() {
                    Some(name) => write!(f, "{}::{}", stringify!($name), name),
                    None => write!(f, "{}({:#x})", stringify!($name), self.0),
                }
            }
        }
    };
}

pub(crate) use native_enum;
