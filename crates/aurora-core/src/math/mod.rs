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

//! The small set of math primitives needed by the render lanes.
//!
//! Vectors and matrices are `#[repr(C)]` and `Pod` so they can be written into
//! constant buffers as-is. Matrices are column-major.

pub mod color;
pub mod dimension;
pub mod matrix;
pub mod vector;

pub use self::color::LinearRgba;
pub use self::dimension::{Extent2D, Extent3D, Origin3D};
pub use self::matrix::Mat4;
pub use self::vector::{Vec2, Vec4};

/// Returns the number of mip levels of a full chain for a `width` x `height` image.
///
/// A 1x1 image has one level; zero-sized images report zero.
#[inline]
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height);
    if largest == 0 {
        0
    } else {
        u32::BITS - largest.leading_zeros()
    }
}

/// Returns the extent of `extent` at `mip` level, never collapsing below one texel.
#[inline]
pub fn mip_extent(extent: Extent2D, mip: u32) -> Extent2D {
    Extent2D {
        width: (extent.width >> mip).max(1),
        height: (extent.height >> mip).max(1),
    }
}

/// Returns element `index` of the radical-inverse sequence in `base`.
///
/// `halton(i, 2)` and `halton(i, 3)` form the usual 2D Halton low-discrepancy set
/// used for sub-pixel jitter.
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut fraction = 1.0f32;
    let mut result = 0.0f32;
    while index > 0 {
        fraction /= base as f32;
        result += fraction * (index % base) as f32;
        index /= base;
    }
    result
}
