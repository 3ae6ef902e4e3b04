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

//! # Aurora Lanes
//!
//! Hot-path render lanes built on the `aurora-core` device contracts:
//!
//! - [`render_lane::post_fx`]: screen-space post-processing effects (bloom,
//!   depth of field, screen-space reflections, super resolution, temporal
//!   anti-aliasing) and the shared per-frame [`render_lane::post_fx::PostFxContext`].
//! - [`render_lane::gltf_pbr`]: a physically based glTF scene renderer.
//!
//! Each effect owns a [`render_lane::ResourceRegistry`] and a
//! [`render_lane::RenderTechniqueCache`]. The host calls `prepare_resources` then
//! `execute` once per frame and wires one effect's output into the next.

pub mod render_lane;

pub use render_lane::*;
