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

//! Stochastic screen-space reflections.
//!
//! The output holds reflection radiance only; compositing it over the scene is
//! left to the host. Pixels rougher than the threshold are masked out by the
//! stencil pass, and every later pass is gated on that stencil.

use super::{
    buffer_id, ensure_technique, pso_flags, required, rtv, run_technique, srv, upload_if_changed,
    validate_input, FullScreenTechniqueDesc, PostFxContext, PreparedFrame,
};
use crate::render_lane::passes::{clear_render_target, FullScreenPass};
use crate::render_lane::resource_registry::{ResourceRegistry, ResourceSlot};
use crate::render_lane::technique::{
    PipelineResourceLayout, ShaderResourceKind, ShaderVariableType,
};
use crate::render_lane::technique_cache::RenderTechniqueCache;
use aurora_core::aurora_bitflags;
use aurora_core::math::{mip_level_count, Extent2D, LinearRgba};
use aurora_core::renderer::api::{
    render_target_descriptor, BufferDescriptor, DepthStencilStateDescriptor, GpuBuffer,
    GpuTexture, Operations, RenderPassDepthStencilAttachment, SamplerDescriptor, ShaderMacros,
    ShaderStageFlags, TextureFormat, TextureViewId,
};
use aurora_core::renderer::{CommandEncoder, GraphicsDevice, RenderError};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound of the hierarchical depth mip chain.
pub const SSR_DEPTH_HIERARCHY_MAX_MIP_COUNT: u32 = 7;

/// Stencil value written for reflective pixels.
const SSR_STENCIL_REF: u32 = 1;

const DEPTH_HIERARCHY_FORMAT: TextureFormat = TextureFormat::R32Float;
const ROUGHNESS_FORMAT: TextureFormat = TextureFormat::R8Unorm;
const STENCIL_MASK_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;
const RADIANCE_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

aurora_bitflags! {
    /// Shader variants of [`ScreenSpaceReflection`].
    pub struct ScreenSpaceReflectionFeatureFlags: u32 {
        /// The colour input is the previous frame and is reprojected.
        const PREVIOUS_FRAME = 1 << 0;
        /// Trace rays at half resolution.
        const HALF_RESOLUTION = 1 << 1;
    }
}

/// Options fixed when a [`ScreenSpaceReflection`] is created.
#[derive(Debug, Clone)]
pub struct ScreenSpaceReflectionCreateInfo {
    /// Compile pipelines in the background.
    pub enable_async_compilation: bool,
    /// Sampler used for colour and G-buffer reads.
    pub sampler: SamplerDescriptor<'static>,
}

impl Default for ScreenSpaceReflectionCreateInfo {
    fn default() -> Self {
        Self {
            enable_async_compilation: false,
            sampler: SamplerDescriptor::LINEAR_CLAMP,
        }
    }
}

/// Tunable parameters of [`ScreenSpaceReflection`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenSpaceReflectionSettings {
    /// Thickness assumed for every depth sample, in view-space units.
    pub depth_buffer_thickness: f32,
    /// Pixels rougher than this get no reflection.
    pub roughness_threshold: f32,
    /// Mip of the depth hierarchy where traversal stops refining.
    pub most_detailed_mip: u32,
    /// Channel of the material texture holding roughness: 0 r, 1 g, 2 b, 3 a.
    pub roughness_channel: u32,
    /// Roughness is stored perceptually (squared when read).
    pub is_roughness_perceptual: bool,
    /// Traversal steps before a ray gives up.
    pub max_traversal_intersections: u32,
    /// Radius of the spatial reconstruction kernel, in pixels.
    pub spatial_reconstruction_radius: f32,
    /// Weight of the radiance history.
    pub temporal_radiance_stability_factor: f32,
    /// Weight of the variance history.
    pub temporal_variance_stability_factor: f32,
    /// Spatial sigma of the bilateral cleanup, relative to roughness.
    pub bilateral_cleanup_spatial_sigma_factor: f32,
}

impl Default for ScreenSpaceReflectionSettings {
    fn default() -> Self {
        Self {
            depth_buffer_thickness: 0.025,
            roughness_threshold: 0.2,
            most_detailed_mip: 0,
            roughness_channel: 0,
            is_roughness_perceptual: true,
            max_traversal_intersections: 128,
            spatial_reconstruction_radius: 4.0,
            temporal_radiance_stability_factor: 1.0,
            temporal_variance_stability_factor: 0.9,
            bilateral_cleanup_spatial_sigma_factor: 0.9,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ScreenSpaceReflectionConstants {
    depth_buffer_thickness: f32,
    roughness_threshold: f32,
    temporal_radiance_stability_factor: f32,
    temporal_variance_stability_factor: f32,
    spatial_reconstruction_radius: f32,
    bilateral_cleanup_spatial_sigma_factor: f32,
    most_detailed_mip: u32,
    max_traversal_intersections: u32,
    roughness_channel: u32,
    is_roughness_perceptual: u32,
    depth_hierarchy_mip_count: u32,
    _padding: u32,
    trace_texel_size: [f32; 2],
    texel_size: [f32; 2],
}

/// Per-frame inputs of [`ScreenSpaceReflection::execute`].
pub struct ScreenSpaceReflectionRenderAttributes<'a> {
    /// Encoder the passes are recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// The prepared and executed frame context.
    pub post_fx: &'a PostFxContext,
    /// Lit scene colour, current or previous frame depending on the flags.
    pub color: &'a Arc<GpuTexture>,
    /// Scene depth.
    pub depth: &'a Arc<GpuTexture>,
    /// World-space normals.
    pub normal: &'a Arc<GpuTexture>,
    /// Material parameters; roughness is read from `settings.roughness_channel`.
    pub material: &'a Arc<GpuTexture>,
    /// Screen-space motion vectors.
    pub motion_vectors: &'a Arc<GpuTexture>,
    /// Effect parameters.
    pub settings: &'a ScreenSpaceReflectionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SsrSlot {
    InputColor,
    InputDepth,
    InputNormal,
    InputMaterial,
    InputMotion,
    Constants,
    DepthHierarchy,
    Roughness,
    StencilMask,
    StencilMaskHalf,
    Radiance,
    RayDirectionPdf,
    ResolvedRadiance,
    RadianceHistory(u32),
    Output,
}

impl ResourceSlot for SsrSlot {
    const COUNT: usize = 16;

    fn index(self) -> usize {
        match self {
            SsrSlot::InputColor => 0,
            SsrSlot::InputDepth => 1,
            SsrSlot::InputNormal => 2,
            SsrSlot::InputMaterial => 3,
            SsrSlot::InputMotion => 4,
            SsrSlot::Constants => 5,
            SsrSlot::DepthHierarchy => 6,
            SsrSlot::Roughness => 7,
            SsrSlot::StencilMask => 8,
            SsrSlot::StencilMaskHalf => 9,
            SsrSlot::Radiance => 10,
            SsrSlot::RayDirectionPdf => 11,
            SsrSlot::ResolvedRadiance => 12,
            SsrSlot::RadianceHistory(i) => 13 + i as usize,
            SsrSlot::Output => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SsrTechnique {
    CopyDepth,
    DownsampleDepth,
    StencilMaskAndExtractRoughness,
    DownsampleStencilMask,
    Intersection,
    SpatialReconstruction,
    TemporalAccumulation,
    BilateralCleanup,
}

impl SsrTechnique {
    const ALL: [SsrTechnique; 8] = [
        SsrTechnique::CopyDepth,
        SsrTechnique::DownsampleDepth,
        SsrTechnique::StencilMaskAndExtractRoughness,
        SsrTechnique::DownsampleStencilMask,
        SsrTechnique::Intersection,
        SsrTechnique::SpatialReconstruction,
        SsrTechnique::TemporalAccumulation,
        SsrTechnique::BilateralCleanup,
    ];
}

/// Screen-space reflection post-processing effect.
#[derive(Debug)]
pub struct ScreenSpaceReflection {
    create_info: ScreenSpaceReflectionCreateInfo,
    device: Option<Arc<dyn GraphicsDevice>>,
    frame: Option<PreparedFrame<ScreenSpaceReflectionFeatureFlags>>,
    depth_hierarchy_mip_count: u32,
    registry: ResourceRegistry<SsrSlot>,
    cache: RenderTechniqueCache<SsrTechnique, ScreenSpaceReflectionFeatureFlags>,
    last_constants: Option<ScreenSpaceReflectionConstants>,
}

impl ScreenSpaceReflection {
    /// Creates an unprepared effect.
    pub fn new(create_info: ScreenSpaceReflectionCreateInfo) -> Self {
        Self {
            create_info,
            device: None,
            frame: None,
            depth_hierarchy_mip_count: 0,
            registry: ResourceRegistry::new(),
            cache: RenderTechniqueCache::new(),
            last_constants: None,
        }
    }

    /// Allocates the intermediate targets for the frame described by `post_fx`.
    ///
    /// The radiance history is cleared to zero through `encoder` when created.
    pub fn prepare_resources(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        encoder: &mut dyn CommandEncoder,
        post_fx: &PostFxContext,
        feature_flags: ScreenSpaceReflectionFeatureFlags,
    ) -> Result<(), RenderError> {
        if !post_fx.is_prepared() {
            return Err(RenderError::NotInitialized);
        }
        self.device = Some(device.clone());

        let next = PreparedFrame::new(post_fx, feature_flags);
        if !PreparedFrame::invalidate(self.frame, next, &mut self.cache) {
            return Ok(());
        }
        self.frame = None;

        if self.registry.is_empty(SsrSlot::Constants) {
            let buffer = GpuBuffer::create(
                device,
                &BufferDescriptor::uniform(
                    "ScreenSpaceReflection.Constants",
                    std::mem::size_of::<ScreenSpaceReflectionConstants>() as u64,
                ),
            )?;
            self.registry.insert(SsrSlot::Constants, buffer);
            self.last_constants = None;
        }

        let full = next.extent;
        let trace = trace_extent(full, feature_flags);
        let target = |label: &str, extent, format, mips| {
            GpuTexture::create(device, &render_target_descriptor(label, extent, format, mips))
        };

        self.depth_hierarchy_mip_count = mip_level_count(full.width, full.height)
            .clamp(1, SSR_DEPTH_HIERARCHY_MAX_MIP_COUNT);
        self.registry.insert(
            SsrSlot::DepthHierarchy,
            target(
                "ScreenSpaceReflection.DepthHierarchy",
                full,
                DEPTH_HIERARCHY_FORMAT,
                self.depth_hierarchy_mip_count,
            )?,
        );
        self.registry.insert(
            SsrSlot::Roughness,
            target("ScreenSpaceReflection.Roughness", full, ROUGHNESS_FORMAT, 1)?,
        );
        self.registry.insert(
            SsrSlot::StencilMask,
            target("ScreenSpaceReflection.StencilMask", full, STENCIL_MASK_FORMAT, 1)?,
        );
        if feature_flags.contains(ScreenSpaceReflectionFeatureFlags::HALF_RESOLUTION) {
            self.registry.insert(
                SsrSlot::StencilMaskHalf,
                target("ScreenSpaceReflection.StencilMaskHalf", trace, STENCIL_MASK_FORMAT, 1)?,
            );
        } else {
            self.registry.release(SsrSlot::StencilMaskHalf);
        }
        self.registry.insert(
            SsrSlot::Radiance,
            target("ScreenSpaceReflection.Radiance", trace, RADIANCE_FORMAT, 1)?,
        );
        self.registry.insert(
            SsrSlot::RayDirectionPdf,
            target("ScreenSpaceReflection.RayDirectionPdf", trace, RADIANCE_FORMAT, 1)?,
        );
        self.registry.insert(
            SsrSlot::ResolvedRadiance,
            target("ScreenSpaceReflection.ResolvedRadiance", full, RADIANCE_FORMAT, 1)?,
        );
        for i in 0..2 {
            let texture = target("ScreenSpaceReflection.RadianceHistory", full, RADIANCE_FORMAT, 1)?;
            if let Some(view) = texture.rtv() {
                clear_render_target(encoder, view, LinearRgba::TRANSPARENT);
            }
            self.registry.insert(SsrSlot::RadianceHistory(i), texture);
        }
        self.registry.insert(
            SsrSlot::Output,
            target("ScreenSpaceReflection.Output", full, RADIANCE_FORMAT, 1)?,
        );

        log::info!(
            "Screen-space reflection resources allocated: {}x{}, tracing at {}x{}",
            full.width,
            full.height,
            trace.width,
            trace.height
        );
        self.frame = Some(next);
        Ok(())
    }

    /// Records the reflection passes, or clears the output while pipelines compile.
    pub fn execute(
        &mut self,
        attribs: ScreenSpaceReflectionRenderAttributes<'_>,
    ) -> Result<(), RenderError> {
        let (device, frame) = match (&self.device, self.frame) {
            (Some(device), Some(frame)) => (device.clone(), frame),
            _ => return Err(RenderError::NotInitialized),
        };
        let inputs = [
            ("reflection color input", attribs.color, SsrSlot::InputColor),
            ("reflection depth input", attribs.depth, SsrSlot::InputDepth),
            ("reflection normal input", attribs.normal, SsrSlot::InputNormal),
            ("reflection material input", attribs.material, SsrSlot::InputMaterial),
            ("reflection motion input", attribs.motion_vectors, SsrSlot::InputMotion),
        ];
        for (name, texture, _) in &inputs {
            validate_input(name, texture, frame.extent)?;
        }
        if !attribs.post_fx.is_executed() || attribs.post_fx.camera().is_none() {
            return Err(RenderError::invalid_input(
                "the post-processing context was not executed this frame",
            ));
        }

        for (_, texture, slot) in &inputs {
            self.registry.insert(*slot, Arc::clone(texture));
        }
        let result = self.render(&device, frame, attribs);
        self.registry
            .release_range(SsrSlot::InputColor, SsrSlot::InputMotion);
        result
    }

    fn render(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        frame: PreparedFrame<ScreenSpaceReflectionFeatureFlags>,
        attribs: ScreenSpaceReflectionRenderAttributes<'_>,
    ) -> Result<(), RenderError> {
        let settings = attribs.settings;
        let trace = trace_extent(frame.extent, frame.feature_flags);
        let constants = ScreenSpaceReflectionConstants {
            depth_buffer_thickness: settings.depth_buffer_thickness,
            roughness_threshold: settings.roughness_threshold,
            temporal_radiance_stability_factor: settings.temporal_radiance_stability_factor,
            temporal_variance_stability_factor: settings.temporal_variance_stability_factor,
            spatial_reconstruction_radius: settings.spatial_reconstruction_radius,
            bilateral_cleanup_spatial_sigma_factor: settings.bilateral_cleanup_spatial_sigma_factor,
            most_detailed_mip: settings
                .most_detailed_mip
                .min(self.depth_hierarchy_mip_count.saturating_sub(1)),
            max_traversal_intersections: settings.max_traversal_intersections,
            roughness_channel: settings.roughness_channel.min(3),
            is_roughness_perceptual: settings.is_roughness_perceptual as u32,
            depth_hierarchy_mip_count: self.depth_hierarchy_mip_count,
            _padding: 0,
            trace_texel_size: [1.0 / trace.width as f32, 1.0 / trace.height as f32],
            texel_size: [
                1.0 / frame.extent.width as f32,
                1.0 / frame.extent.height as f32,
            ],
        };
        let buffer = required(self.registry.buffer(SsrSlot::Constants), "constants")?;
        upload_if_changed(device.as_ref(), buffer, &mut self.last_constants, &constants)?;

        let flags = frame.feature_flags;
        let half = flags.contains(ScreenSpaceReflectionFeatureFlags::HALF_RESOLUTION);
        let macros = Self::shader_macros(attribs.post_fx, flags);
        let cb = buffer_id(&self.registry, SsrSlot::Constants)?;

        let mut all_ready = attribs.post_fx.is_ready();
        for technique in SsrTechnique::ALL {
            if technique == SsrTechnique::DownsampleStencilMask && !half {
                continue;
            }
            all_ready &= ensure_technique(
                &mut self.cache,
                device,
                (technique, flags),
                &macros,
                pso_flags(self.create_info.enable_async_compilation),
                &[("cbScreenSpaceReflectionAttribs", cb.into())],
                || describe(&self.create_info, technique),
            );
        }

        let encoder = attribs.encoder;
        if !all_ready {
            clear_render_target(encoder, rtv(&self.registry, SsrSlot::Output)?, LinearRgba::TRANSPARENT);
            return Ok(());
        }

        let post_fx = attribs.post_fx;
        let registry = &self.registry;
        let cache = &mut self.cache;
        let key = |technique| (technique, flags);

        let camera = required(post_fx.camera(), "camera")?.id();
        let blue_noise = required(post_fx.blue_noise_xy(), "blue noise")?.srv();
        let color = srv(registry, SsrSlot::InputColor)?;
        let depth = srv(registry, SsrSlot::InputDepth)?;
        let normal = srv(registry, SsrSlot::InputNormal)?;
        let material = srv(registry, SsrSlot::InputMaterial)?;
        let motion = srv(registry, SsrSlot::InputMotion)?;
        let roughness = srv(registry, SsrSlot::Roughness)?;

        // Hierarchical depth: mip 0 is a copy of the scene depth, each further mip
        // keeps the closest depth of the 2x2 texels below it.
        let hierarchy = required(registry.texture(SsrSlot::DepthHierarchy), "depth hierarchy")?;
        for mip in 0..self.depth_hierarchy_mip_count {
            let target = [mip_view(hierarchy, mip)?];
            if mip == 0 {
                run_technique(
                    cache,
                    key(SsrTechnique::CopyDepth),
                    encoder,
                    &FullScreenPass::new("ScreenSpaceReflection.CopyDepth", &target),
                    |srb| srb.set("g_TextureDepth", depth),
                )?;
            } else {
                let source = mip_view(hierarchy, mip - 1)?;
                run_technique(
                    cache,
                    key(SsrTechnique::DownsampleDepth),
                    encoder,
                    &FullScreenPass::new("ScreenSpaceReflection.DownsampleDepth", &target),
                    |srb| srb.set("g_TextureLastMip", source),
                )?;
            }
        }
        let hierarchy = hierarchy.srv();

        let stencil = dsv(registry, SsrSlot::StencilMask)?;
        run_technique(
            cache,
            key(SsrTechnique::StencilMaskAndExtractRoughness),
            encoder,
            &FullScreenPass::new(
                "ScreenSpaceReflection.StencilMaskAndExtractRoughness",
                &[rtv(registry, SsrSlot::Roughness)?],
            )
            .with_depth_stencil(
                RenderPassDepthStencilAttachment {
                    view: stencil,
                    depth_ops: None,
                    stencil_ops: Some(Operations::clear(0)),
                },
                SSR_STENCIL_REF,
            ),
            |srb| srb.set("g_TextureMaterialParameters", material),
        )?;

        let trace_stencil = if half {
            let view = dsv(registry, SsrSlot::StencilMaskHalf)?;
            run_technique(
                cache,
                key(SsrTechnique::DownsampleStencilMask),
                encoder,
                &FullScreenPass::new("ScreenSpaceReflection.DownsampleStencilMask", &[])
                    .with_depth_stencil(
                        RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: None,
                            stencil_ops: Some(Operations::clear(0)),
                        },
                        SSR_STENCIL_REF,
                    ),
                |srb| srb.set("g_TextureRoughness", roughness),
            )?;
            view
        } else {
            stencil
        };

        let gated = |view| RenderPassDepthStencilAttachment::read_only(view);

        run_technique(
            cache,
            key(SsrTechnique::Intersection),
            encoder,
            &FullScreenPass::new(
                "ScreenSpaceReflection.Intersection",
                &[
                    rtv(registry, SsrSlot::Radiance)?,
                    rtv(registry, SsrSlot::RayDirectionPdf)?,
                ],
            )
            .with_clear(LinearRgba::TRANSPARENT)
            .with_depth_stencil(gated(trace_stencil), SSR_STENCIL_REF),
            |srb| {
                srb.set("cbCameraAttribs", camera);
                srb.set("g_TextureRadiance", color);
                srb.set("g_TextureDepthHierarchy", hierarchy);
                srb.set("g_TextureNormal", normal);
                srb.set("g_TextureRoughness", roughness);
                srb.set("g_TextureBlueNoise", blue_noise);
                srb.set("g_TextureMotion", motion);
            },
        )?;

        let radiance = srv(registry, SsrSlot::Radiance)?;
        let ray_direction = srv(registry, SsrSlot::RayDirectionPdf)?;
        run_technique(
            cache,
            key(SsrTechnique::SpatialReconstruction),
            encoder,
            &FullScreenPass::new(
                "ScreenSpaceReflection.SpatialReconstruction",
                &[rtv(registry, SsrSlot::ResolvedRadiance)?],
            )
            .with_clear(LinearRgba::TRANSPARENT)
            .with_depth_stencil(gated(stencil), SSR_STENCIL_REF),
            |srb| {
                srb.set("cbCameraAttribs", camera);
                srb.set("g_TextureRadiance", radiance);
                srb.set("g_TextureRayDirectionPDF", ray_direction);
                srb.set("g_TextureNormal", normal);
                srb.set("g_TextureRoughness", roughness);
                srb.set("g_TextureDepth", depth);
            },
        )?;

        let index = post_fx.frame_desc().index;
        let current = SsrSlot::RadianceHistory(index & 1);
        let previous = srv(registry, SsrSlot::RadianceHistory((index & 1) ^ 1))?;
        let resolved = srv(registry, SsrSlot::ResolvedRadiance)?;
        run_technique(
            cache,
            key(SsrTechnique::TemporalAccumulation),
            encoder,
            &FullScreenPass::new(
                "ScreenSpaceReflection.TemporalAccumulation",
                &[rtv(registry, current)?],
            )
            .with_depth_stencil(gated(stencil), SSR_STENCIL_REF),
            |srb| {
                srb.set("g_TextureResolvedRadiance", resolved);
                srb.set("g_TexturePrevRadiance", previous);
                srb.set("g_TextureMotion", motion);
                srb.set("g_TextureDepth", depth);
            },
        )?;

        let accumulated = srv(registry, current)?;
        run_technique(
            cache,
            key(SsrTechnique::BilateralCleanup),
            encoder,
            &FullScreenPass::new(
                "ScreenSpaceReflection.BilateralCleanup",
                &[rtv(registry, SsrSlot::Output)?],
            )
            .with_clear(LinearRgba::TRANSPARENT)
            .with_depth_stencil(gated(stencil), SSR_STENCIL_REF),
            |srb| {
                srb.set("g_TextureRadiance", accumulated);
                srb.set("g_TextureNormal", normal);
                srb.set("g_TextureRoughness", roughness);
                srb.set("g_TextureDepth", depth);
            },
        )
    }

    /// The reflection radiance, once prepared.
    pub fn output(&self) -> Option<&Arc<GpuTexture>> {
        self.registry.texture(SsrSlot::Output)
    }

    /// Mip count of the hierarchical depth buffer.
    pub fn depth_hierarchy_mip_count(&self) -> u32 {
        self.depth_hierarchy_mip_count
    }

    /// Macros of the variant selected by `feature_flags`.
    pub fn shader_macros(
        post_fx: &PostFxContext,
        feature_flags: ScreenSpaceReflectionFeatureFlags,
    ) -> ShaderMacros {
        let mut macros = post_fx.shader_macros();
        macros
            .add_flag(
                "SSR_OPTION_PREVIOUS_FRAME",
                feature_flags.contains(ScreenSpaceReflectionFeatureFlags::PREVIOUS_FRAME),
            )
            .add_flag(
                "SSR_OPTION_HALF_RESOLUTION",
                feature_flags.contains(ScreenSpaceReflectionFeatureFlags::HALF_RESOLUTION),
            );
        macros
    }
}

fn trace_extent(full: Extent2D, flags: ScreenSpaceReflectionFeatureFlags) -> Extent2D {
    if flags.contains(ScreenSpaceReflectionFeatureFlags::HALF_RESOLUTION) {
        Extent2D::new(full.width.div_ceil(2), full.height.div_ceil(2))
    } else {
        full
    }
}

fn mip_view(texture: &GpuTexture, mip: u32) -> Result<TextureViewId, RenderError> {
    texture
        .mip_view(mip)
        .ok_or_else(|| RenderError::Internal(format!("{} has no mip {mip}", texture.info().label)))
}

fn dsv(registry: &ResourceRegistry<SsrSlot>, slot: SsrSlot) -> Result<TextureViewId, RenderError> {
    registry
        .texture_dsv(slot)
        .ok_or_else(|| RenderError::Internal(format!("{slot:?} holds no depth-stencil target")))
}

fn describe(
    create_info: &ScreenSpaceReflectionCreateInfo,
    technique: SsrTechnique,
) -> FullScreenTechniqueDesc {
    let var = |layout: PipelineResourceLayout, name: &str, kind| {
        layout.add_variable(
            ShaderStageFlags::FRAGMENT,
            name,
            kind,
            ShaderVariableType::Dynamic,
        )
    };
    let texture = |layout, name: &str| var(layout, name, ShaderResourceKind::Texture);
    let base = PipelineResourceLayout::new().add_variable(
        ShaderStageFlags::FRAGMENT,
        "cbScreenSpaceReflectionAttribs",
        ShaderResourceKind::ConstantBuffer,
        ShaderVariableType::Static,
    );
    let camera = |layout| var(layout, "cbCameraAttribs", ShaderResourceKind::ConstantBuffer);
    let depth = |layout| var(layout, "g_TextureDepth", ShaderResourceKind::DepthTexture);

    let (name, file, entry_point, layout, formats, depth_stencil) = match technique {
        SsrTechnique::CopyDepth => (
            "ScreenSpaceReflection.CopyDepth",
            "SSR_ComputeHierarchicalDepthBuffer.fx",
            "ComputeCopyDepthPS",
            depth(base),
            vec![DEPTH_HIERARCHY_FORMAT],
            None,
        ),
        SsrTechnique::DownsampleDepth => (
            "ScreenSpaceReflection.DownsampleDepth",
            "SSR_ComputeHierarchicalDepthBuffer.fx",
            "ComputeDownsampledDepthPS",
            var(base, "g_TextureLastMip", ShaderResourceKind::UnfilterableTexture),
            vec![DEPTH_HIERARCHY_FORMAT],
            None,
        ),
        SsrTechnique::StencilMaskAndExtractRoughness => (
            "ScreenSpaceReflection.StencilMaskAndExtractRoughness",
            "SSR_ComputeStencilMaskAndExtractRoughness.fx",
            "ComputeStencilMaskAndExtractRoughnessPS",
            texture(base, "g_TextureMaterialParameters"),
            vec![ROUGHNESS_FORMAT],
            Some(DepthStencilStateDescriptor::stencil_write(STENCIL_MASK_FORMAT)),
        ),
        SsrTechnique::DownsampleStencilMask => (
            "ScreenSpaceReflection.DownsampleStencilMask",
            "SSR_ComputeDownsampledStencilMask.fx",
            "ComputeDownsampledStencilMaskPS",
            texture(base, "g_TextureRoughness"),
            vec![],
            Some(DepthStencilStateDescriptor::stencil_write(STENCIL_MASK_FORMAT)),
        ),
        SsrTechnique::Intersection => (
            "ScreenSpaceReflection.Intersection",
            "SSR_ComputeIntersection.fx",
            "ComputeIntersectionPS",
            texture(
                texture(
                    texture(
                        texture(
                            var(
                                texture(camera(base), "g_TextureRadiance"),
                                "g_TextureDepthHierarchy",
                                ShaderResourceKind::UnfilterableTexture,
                            ),
                            "g_TextureNormal",
                        ),
                        "g_TextureRoughness",
                    ),
                    "g_TextureBlueNoise",
                ),
                "g_TextureMotion",
            ),
            vec![RADIANCE_FORMAT, RADIANCE_FORMAT],
            Some(DepthStencilStateDescriptor::stencil_equal(STENCIL_MASK_FORMAT)),
        ),
        SsrTechnique::SpatialReconstruction => (
            "ScreenSpaceReflection.SpatialReconstruction",
            "SSR_ComputeSpatialReconstruction.fx",
            "ComputeSpatialReconstructionPS",
            depth(texture(
                texture(
                    texture(
                        texture(camera(base), "g_TextureRadiance"),
                        "g_TextureRayDirectionPDF",
                    ),
                    "g_TextureNormal",
                ),
                "g_TextureRoughness",
            )),
            vec![RADIANCE_FORMAT],
            Some(DepthStencilStateDescriptor::stencil_equal(STENCIL_MASK_FORMAT)),
        ),
        SsrTechnique::TemporalAccumulation => (
            "ScreenSpaceReflection.TemporalAccumulation",
            "SSR_ComputeTemporalAccumulation.fx",
            "ComputeTemporalAccumulationPS",
            depth(texture(
                texture(
                    texture(base, "g_TextureResolvedRadiance"),
                    "g_TexturePrevRadiance",
                ),
                "g_TextureMotion",
            )),
            vec![RADIANCE_FORMAT],
            Some(DepthStencilStateDescriptor::stencil_equal(STENCIL_MASK_FORMAT)),
        ),
        SsrTechnique::BilateralCleanup => (
            "ScreenSpaceReflection.BilateralCleanup",
            "SSR_ComputeBilateralCleanup.fx",
            "ComputeBilateralCleanupPS",
            depth(texture(
                texture(texture(base, "g_TextureRadiance"), "g_TextureNormal"),
                "g_TextureRoughness",
            )),
            vec![RADIANCE_FORMAT],
            Some(DepthStencilStateDescriptor::stencil_equal(STENCIL_MASK_FORMAT)),
        ),
    };

    let mut desc = FullScreenTechniqueDesc::new(
        name,
        file,
        entry_point,
        layout.add_immutable_sampler(
            ShaderStageFlags::FRAGMENT,
            "g_LinearClampSampler",
            create_info.sampler.clone(),
        ),
        RADIANCE_FORMAT,
    );
    desc.color_formats = formats;
    desc.depth_stencil = depth_stencil;
    desc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_resolution_rounds_up() {
        let full = Extent2D::new(1279, 720);
        assert_eq!(
            trace_extent(full, ScreenSpaceReflectionFeatureFlags::HALF_RESOLUTION),
            Extent2D::new(640, 360)
        );
        assert_eq!(trace_extent(full, ScreenSpaceReflectionFeatureFlags::EMPTY), full);
    }

    #[test]
    fn stencil_gated_techniques_never_write_stencil() {
        let info = ScreenSpaceReflectionCreateInfo::default();
        for technique in SsrTechnique::ALL {
            let desc = describe(&info, technique);
            match technique {
                SsrTechnique::StencilMaskAndExtractRoughness
                | SsrTechnique::DownsampleStencilMask => {
                    assert!(desc.depth_stencil.is_some_and(|ds| !ds.is_read_only()));
                }
                SsrTechnique::CopyDepth | SsrTechnique::DownsampleDepth => {
                    assert!(desc.depth_stencil.is_none());
                }
                _ => assert!(desc.depth_stencil.is_some_and(|ds| ds.is_read_only())),
            }
        }
    }

    #[test]
    fn slots_are_dense() {
        let slots = [
            SsrSlot::InputColor,
            SsrSlot::InputDepth,
            SsrSlot::InputNormal,
            SsrSlot::InputMaterial,
            SsrSlot::InputMotion,
            SsrSlot::Constants,
            SsrSlot::DepthHierarchy,
            SsrSlot::Roughness,
            SsrSlot::StencilMask,
            SsrSlot::StencilMaskHalf,
            SsrSlot::Radiance,
            SsrSlot::RayDirectionPdf,
            SsrSlot::ResolvedRadiance,
            SsrSlot::RadianceHistory(0),
            SsrSlot::RadianceHistory(1),
            SsrSlot::Output,
        ];
        let mut indices: Vec<_> = slots.iter().map(|s| s.index()).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..SsrSlot::COUNT).collect::<Vec<_>>());
    }
}
