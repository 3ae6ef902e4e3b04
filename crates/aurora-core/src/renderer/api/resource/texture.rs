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

//! Defines data structures related to GPU texture and sampler resources.

use crate::aurora_bitflags;
use crate::math::{Extent3D, Origin3D};
use crate::renderer::api::pipeline::CompareFunction;
use crate::renderer::api::util::{SampleCount, TextureFormat};
use std::borrow::Cow;

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// A one-dimensional texture.
    D1,
    /// A two-dimensional texture.
    D2,
    /// A three-dimensional (volumetric) texture.
    D3,
}

/// The dimensionality of a texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewDimension {
    /// A view of a 2D texture.
    D2,
    /// A view of a 2D texture array.
    D2Array,
    /// A view of a cubemap texture.
    Cube,
    /// A view of a 3D texture.
    D3,
}

/// Defines which aspects of a texture are accessed by a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAspect {
    /// Access all aspects (color, depth, and stencil).
    All,
    /// Access only the stencil component of a depth/stencil texture.
    StencilOnly,
    /// Access only the depth component of a depth/stencil texture.
    DepthOnly,
}

/// Defines how texture coordinates are handled outside the `[0, 1]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// Coordinates wrap around.
    Repeat,
    /// Coordinates are clamped to the edge.
    ClampToEdge,
    /// Coordinates wrap around, mirroring at each integer boundary.
    MirrorRepeat,
}

/// Defines the filtering mode for texture sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Point sampling.
    Nearest,
    /// Linear interpolation.
    Linear,
}

aurora_bitflags! {
    /// A set of flags describing the allowed usages of a [`TextureId`].
    pub struct TextureUsage: u32 {
        /// The texture can be used as the source of a copy operation.
        const COPY_SRC = 1 << 0;
        /// The texture can be used as the destination of a copy operation.
        const COPY_DST = 1 << 1;
        /// The texture can be bound in a shader for sampling.
        const TEXTURE_BINDING = 1 << 2;
        /// The texture can be used as a storage texture.
        const STORAGE_BINDING = 1 << 3;
        /// The texture can be used as a color or depth/stencil attachment.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// A descriptor used to create a [`TextureId`].
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The dimensions of the texture.
    pub size: Extent3D,
    /// The number of mipmap levels.
    pub mip_level_count: u32,
    /// The number of samples per pixel.
    pub sample_count: SampleCount,
    /// The dimensionality of the texture.
    pub dimension: TextureDimension,
    /// The format of the texels.
    pub format: TextureFormat,
    /// How the texture will be used.
    pub usage: TextureUsage,
}

/// A descriptor used to create a [`TextureViewId`].
#[derive(Debug, Clone)]
pub struct TextureViewDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The format of the view, or `None` for the texture's format.
    pub format: Option<TextureFormat>,
    /// The dimensionality of the view.
    pub dimension: Option<TextureViewDimension>,
    /// The aspects of the texture accessed by the view.
    pub aspect: ImageAspect,
    /// The first mipmap level accessed by the view.
    pub base_mip_level: u32,
    /// The number of mipmap levels, or `None` for all remaining levels.
    pub mip_level_count: Option<u32>,
    /// The first array layer accessed by the view.
    pub base_array_layer: u32,
    /// The number of array layers, or `None` for all remaining layers.
    pub array_layer_count: Option<u32>,
}

impl Default for TextureViewDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            format: None,
            dimension: None,
            aspect: ImageAspect::All,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: None,
        }
    }
}

/// A descriptor used to create a [`SamplerId`].
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The address mode for the U texture coordinate.
    pub address_mode_u: AddressMode,
    /// The address mode for the V texture coordinate.
    pub address_mode_v: AddressMode,
    /// The address mode for the W texture coordinate.
    pub address_mode_w: AddressMode,
    /// The filter mode for magnification.
    pub mag_filter: FilterMode,
    /// The filter mode for minification.
    pub min_filter: FilterMode,
    /// The filter mode between mipmap levels.
    pub mipmap_filter: FilterMode,
    /// If `Some`, creates a comparison sampler.
    pub compare: Option<CompareFunction>,
}

impl SamplerDescriptor<'static> {
    /// Linear filtering, clamped to the edge.
    pub const LINEAR_CLAMP: Self = Self {
        label: None,
        address_mode_u: AddressMode::ClampToEdge,
        address_mode_v: AddressMode::ClampToEdge,
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        mipmap_filter: FilterMode::Linear,
        compare: None,
    };

    /// Linear filtering with wrapping, the usual material sampler.
    pub const LINEAR_WRAP: Self = Self {
        label: None,
        address_mode_u: AddressMode::Repeat,
        address_mode_v: AddressMode::Repeat,
        address_mode_w: AddressMode::Repeat,
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        mipmap_filter: FilterMode::Linear,
        compare: None,
    };
}

/// One side of a texture-to-texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelCopyTextureInfo {
    /// The texture to copy from or to.
    pub texture: TextureId,
    /// The mip level to access.
    pub mip_level: u32,
    /// The texel offset of the copy region.
    pub origin: Origin3D,
}

impl TexelCopyTextureInfo {
    /// The top-left corner of mip 0 of `texture`.
    pub const fn whole(texture: TextureId) -> Self {
        Self {
            texture,
            mip_level: 0,
            origin: Origin3D::ZERO,
        }
    }
}

/// An opaque handle to a GPU texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub usize);

/// An opaque handle to a GPU texture view resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewId(pub usize);

/// An opaque handle to a GPU sampler resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(pub usize);
