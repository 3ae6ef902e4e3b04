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

//! Screen-space post-processing effects.
//!
//! Every effect follows the same two-call protocol per frame:
//!
//! 1. `prepare_resources` (re)allocates size-dependent resources when the frame
//!    size or the feature flags change, and is a no-op otherwise.
//! 2. `execute` validates its inputs, uploads its constants when they changed,
//!    lazily builds the pipelines of the active flag combination and records its
//!    sub-passes. While any pipeline is still compiling it records a cheap
//!    placeholder instead, so the frame never stalls.
//!
//! [`PostFxContext`] owns the per-frame data shared by all effects: camera
//! buffers, depth and motion vectors, and the blue-noise textures.

mod bloom;
mod context;
mod depth_of_field;
mod screen_space_reflection;
mod settings;
mod super_resolution;
mod temporal_anti_aliasing;

pub use self::bloom::*;
pub use self::context::*;
pub use self::depth_of_field::*;
pub use self::screen_space_reflection::*;
pub use self::settings::*;
pub use self::super_resolution::*;
pub use self::temporal_anti_aliasing::*;

use super::passes::{render_full_screen, FullScreenPass};
use super::resource_registry::{ResourceRegistry, ResourceSlot};
use super::technique::{
    PipelineResourceLayout, PsoCreateInfo, ShaderResourceBinding, ShaderStageInfo,
};
use super::technique_cache::RenderTechniqueCache;
use aurora_core::math::Extent2D;
use aurora_core::renderer::api::{
    BindingResource, BlendStateDescriptor, BufferId, DepthStencilStateDescriptor, GpuBuffer,
    GpuTexture, PipelineCreateFlags, ShaderMacros, TextureFormat, TextureUsage, TextureViewId,
};
use aurora_core::renderer::{CommandEncoder, GraphicsDevice, RenderError, ResourceError};
use bytemuck::Pod;
use std::hash::Hash;
use std::sync::Arc;

/// Everything that decides whether size-dependent resources must be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PreparedFrame<F> {
    pub extent: Extent2D,
    pub output_extent: Extent2D,
    pub feature_flags: F,
    pub context_flags: PostFxFeatureFlags,
}

impl<F: Copy + Eq> PreparedFrame<F> {
    pub fn new(post_fx: &PostFxContext, feature_flags: F) -> Self {
        let desc = post_fx.frame_desc();
        Self {
            extent: Extent2D::new(desc.width, desc.height),
            output_extent: Extent2D::new(desc.output_width, desc.output_height),
            feature_flags,
            context_flags: post_fx.feature_flags(),
        }
    }

    /// Drops what `next` invalidates and returns `true` if resources must be rebuilt.
    ///
    /// Context flags feed the shader macros of every pipeline, so a change empties
    /// the cache. Any other change only drops the bindings, which reference views
    /// of the old resources.
    pub fn invalidate<T: Copy + Eq + Hash>(
        previous: Option<Self>,
        next: Self,
        cache: &mut RenderTechniqueCache<T, F>,
    ) -> bool
    where
        F: Hash,
    {
        match previous {
            Some(prev) if prev == next => false,
            Some(prev) if prev.context_flags != next.context_flags => {
                cache.clear();
                true
            }
            _ => {
                cache.release_srbs();
                true
            }
        }
    }
}

/// Describes a full-screen pipeline built lazily on first use.
pub(crate) struct FullScreenTechniqueDesc {
    pub name: &'static str,
    pub file: &'static str,
    pub entry_point: &'static str,
    pub layout: PipelineResourceLayout,
    pub color_formats: Vec<TextureFormat>,
    pub depth_stencil: Option<DepthStencilStateDescriptor>,
    pub blend: Option<BlendStateDescriptor>,
}

impl FullScreenTechniqueDesc {
    pub fn new(
        name: &'static str,
        file: &'static str,
        entry_point: &'static str,
        layout: PipelineResourceLayout,
        color_format: TextureFormat,
    ) -> Self {
        Self {
            name,
            file,
            entry_point,
            layout,
            color_formats: vec![color_format],
            depth_stencil: None,
            blend: None,
        }
    }
}

pub(crate) fn pso_flags(asynchronous: bool) -> PipelineCreateFlags {
    if asynchronous {
        PipelineCreateFlags::ASYNCHRONOUS
    } else {
        PipelineCreateFlags::EMPTY
    }
}

/// Builds the technique `(technique, flags)` on first use and returns whether it is ready.
///
/// `statics` are bound at pipeline level before the technique's own binding is
/// created, so they survive binding resets caused by a resize.
pub(crate) fn ensure_technique<T, F>(
    cache: &mut RenderTechniqueCache<T, F>,
    device: &Arc<dyn GraphicsDevice>,
    (technique, flags): (T, F),
    macros: &ShaderMacros,
    create_flags: PipelineCreateFlags,
    statics: &[(&str, BindingResource)],
    describe: impl FnOnce() -> FullScreenTechniqueDesc,
) -> bool
where
    T: Copy + Eq + Hash,
    F: Copy + Eq + Hash,
{
    let tech = cache.get_or_create(technique, flags);
    if !tech.is_initialized_pso() {
        let desc = describe();
        let mut info = PsoCreateInfo::full_screen(
            desc.name,
            macros,
            ShaderStageInfo {
                file: desc.file,
                entry_point: desc.entry_point,
                macros,
            },
            &desc.layout,
            &desc.color_formats,
            create_flags,
        );
        info.depth_stencil = desc.depth_stencil;
        info.blend = desc.blend;
        tech.initialize_pso(device, &info);
    }
    if !tech.is_initialized_srb() && !tech.has_failed() {
        for &(name, resource) in statics {
            tech.set_static_variable(name, resource);
        }
        tech.initialize_srb(true);
    }
    tech.is_ready()
}

/// Binds resources to the technique's own binding and records a full-screen pass with it.
pub(crate) fn run_technique<T, F>(
    cache: &mut RenderTechniqueCache<T, F>,
    (technique, flags): (T, F),
    encoder: &mut dyn CommandEncoder,
    pass: &FullScreenPass<'_>,
    bind: impl FnOnce(&mut ShaderResourceBinding),
) -> Result<(), RenderError>
where
    T: Copy + Eq + Hash + std::fmt::Debug,
    F: Copy + Eq + Hash,
{
    let (pipeline, srb) = cache
        .get_mut(technique, flags)
        .and_then(|t| t.pipeline_and_srb())
        .ok_or_else(|| RenderError::Internal(format!("technique {technique:?} is not built")))?;
    bind(srb);
    render_full_screen(encoder, pipeline, srb, pass)
}

/// Writes `value` into `buffer` unless its bytes equal the last upload.
///
/// Returns `true` if the buffer was written.
pub(crate) fn upload_if_changed<T: Pod>(
    device: &dyn GraphicsDevice,
    buffer: &GpuBuffer,
    last_uploaded: &mut Option<T>,
    value: &T,
) -> Result<bool, ResourceError> {
    let bytes = bytemuck::bytes_of(value);
    if last_uploaded
        .as_ref()
        .is_some_and(|last| bytemuck::bytes_of(last) == bytes)
    {
        return Ok(false);
    }
    device.write_buffer(buffer.id(), 0, bytes)?;
    *last_uploaded = Some(*value);
    Ok(true)
}

/// Checks that `texture` can be sampled and covers `extent`.
pub(crate) fn validate_input(
    name: &str,
    texture: &GpuTexture,
    extent: Extent2D,
) -> Result<(), RenderError> {
    if !texture.info().usage.contains(TextureUsage::TEXTURE_BINDING) {
        return Err(RenderError::invalid_input(format!(
            "{name} '{}' is not a shader resource",
            texture.info().label
        )));
    }
    if texture.extent() != extent {
        return Err(RenderError::invalid_input(format!(
            "{name} is {}x{}, the prepared frame is {}x{}",
            texture.extent().width,
            texture.extent().height,
            extent.width,
            extent.height
        )));
    }
    Ok(())
}

/// Checks that a colour input has the format of the effect output.
pub(crate) fn validate_format(
    name: &str,
    texture: &GpuTexture,
    expected: TextureFormat,
) -> Result<(), RenderError> {
    if texture.format() != expected {
        return Err(RenderError::invalid_input(format!(
            "{name} is {:?}, expected {expected:?}",
            texture.format()
        )));
    }
    Ok(())
}

/// Unwraps a prepared resource or reports that `prepare_resources` did not run.
pub(crate) fn required<'a, T>(
    resource: Option<&'a Arc<T>>,
    what: &str,
) -> Result<&'a Arc<T>, RenderError> {
    resource.ok_or_else(|| {
        log::error!("Missing {what}; prepare_resources must run before execute");
        RenderError::NotInitialized
    })
}

/// Shader-resource view of a texture slot.
pub(crate) fn srv<S: ResourceSlot>(
    registry: &ResourceRegistry<S>,
    slot: S,
) -> Result<TextureViewId, RenderError> {
    registry
        .texture_srv(slot)
        .ok_or_else(|| RenderError::Internal(format!("{slot:?} holds no texture")))
}

/// Render-target view of a texture slot.
pub(crate) fn rtv<S: ResourceSlot>(
    registry: &ResourceRegistry<S>,
    slot: S,
) -> Result<TextureViewId, RenderError> {
    registry
        .texture_rtv(slot)
        .ok_or_else(|| RenderError::Internal(format!("{slot:?} holds no render target")))
}

/// Id of a buffer slot.
pub(crate) fn buffer_id<S: ResourceSlot>(
    registry: &ResourceRegistry<S>,
    slot: S,
) -> Result<BufferId, RenderError> {
    registry
        .buffer(slot)
        .map(|b| b.id())
        .ok_or_else(|| RenderError::Internal(format!("{slot:?} holds no buffer")))
}
