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

//! Gather-based depth of field.
//!
//! Pass order:
//!
//! 1. circle of confusion (CoC) from depth and the camera,
//! 2. temporal CoC smoothing against the previous frame (optional),
//! 3. near/far CoC separation,
//! 4. near-field dilation, one mip at a time,
//! 5. separable CoC blur (X then Y),
//! 6. colour prefilter at half resolution,
//! 7. two bokeh gather passes over a ring kernel,
//! 8. post-filter and full-resolution combine.

use super::{
    buffer_id, ensure_technique, pso_flags, required, rtv, run_technique, srv, upload_if_changed,
    validate_format, validate_input, FullScreenTechniqueDesc, PostFxContext, PreparedFrame,
};
use crate::render_lane::passes::{clear_render_target, copy_texture, FullScreenPass};
use crate::render_lane::resource_registry::{ResourceRegistry, ResourceSlot};
use crate::render_lane::technique::{
    PipelineResourceLayout, ShaderResourceKind, ShaderVariableType,
};
use crate::render_lane::technique_cache::RenderTechniqueCache;
use aurora_core::aurora_bitflags;
use aurora_core::math::{mip_level_count, Extent2D, LinearRgba, Vec4};
use aurora_core::renderer::api::{
    render_target_descriptor, BindingResource, BufferDescriptor, GpuBuffer, GpuTexture,
    SamplerDescriptor, ShaderMacros, ShaderStageFlags, TextureFormat, TextureViewId,
};
use aurora_core::renderer::{CommandEncoder, GraphicsDevice, RenderError};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::sync::Arc;

/// Largest ring count accepted for the bokeh kernel.
pub const DOF_MAX_BOKEH_RING_COUNT: u32 = 8;
/// Largest ring density accepted for the bokeh kernel.
pub const DOF_MAX_BOKEH_RING_DENSITY: u32 = 16;
/// Upper bound of the dilation mip chain.
pub const DOF_MAX_DILATION_MIP_COUNT: u32 = 4;

const COC_FORMAT: TextureFormat = TextureFormat::R16Float;
const SEPARATED_COC_FORMAT: TextureFormat = TextureFormat::Rg16Float;

aurora_bitflags! {
    /// Shader variants of [`DepthOfField`].
    pub struct DepthOfFieldFeatureFlags: u32 {
        /// Blend the CoC with the reprojected CoC of the previous frame.
        const TEMPORAL_SMOOTHING = 1 << 0;
        /// Undo the Karis weighting in the post-filter.
        const KARIS_INVERSE = 1 << 1;
    }
}

/// Options fixed when a [`DepthOfField`] is created.
#[derive(Debug, Clone)]
pub struct DepthOfFieldCreateInfo {
    /// Compile pipelines in the background.
    pub enable_async_compilation: bool,
    /// Format of the colour input and output.
    pub output_format: TextureFormat,
    /// Sampler used by every pass.
    pub sampler: SamplerDescriptor<'static>,
}

impl Default for DepthOfFieldCreateInfo {
    fn default() -> Self {
        Self {
            enable_async_compilation: false,
            output_format: TextureFormat::Rgba16Float,
            sampler: SamplerDescriptor::LINEAR_CLAMP,
        }
    }
}

/// Tunable parameters of [`DepthOfField`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthOfFieldSettings {
    /// Largest CoC radius, as a fraction of the screen width.
    pub max_circle_of_confusion: f32,
    /// Weight of the previous frame in the temporal CoC.
    pub temporal_stability_factor: f32,
    /// Distance to the plane in focus, in world units.
    pub focus_distance: f32,
    /// Depth range around the focus plane that stays sharp.
    pub focus_range: f32,
    /// Number of rings of the bokeh kernel, the centre sample included.
    pub bokeh_kernel_ring_count: u32,
    /// Samples added per ring.
    pub bokeh_kernel_ring_density: u32,
}

impl Default for DepthOfFieldSettings {
    fn default() -> Self {
        Self {
            max_circle_of_confusion: 0.01,
            temporal_stability_factor: 0.9375,
            focus_distance: 10.0,
            focus_range: 5.0,
            bokeh_kernel_ring_count: 3,
            bokeh_kernel_ring_density: 7,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DepthOfFieldConstants {
    max_circle_of_confusion: f32,
    temporal_stability_factor: f32,
    focus_distance: f32,
    focus_range: f32,
    bokeh_kernel_ring_count: u32,
    bokeh_kernel_ring_density: u32,
    bokeh_kernel_sample_count: u32,
    dilation_mip_count: u32,
    texel_size: [f32; 2],
    half_texel_size: [f32; 2],
}

/// Per-frame inputs of [`DepthOfField::execute`].
pub struct DepthOfFieldRenderAttributes<'a> {
    /// Encoder the passes are recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// The prepared and executed frame context.
    pub post_fx: &'a PostFxContext,
    /// HDR scene colour.
    pub color: &'a Arc<GpuTexture>,
    /// Scene depth.
    pub depth: &'a Arc<GpuTexture>,
    /// Effect parameters.
    pub settings: &'a DepthOfFieldSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DofSlot {
    InputColor,
    InputDepth,
    Constants,
    BokehKernel,
    CircleOfConfusion,
    TemporalCircleOfConfusion(u32),
    SeparatedCircleOfConfusion,
    DilationCircleOfConfusion,
    BlurredCircleOfConfusion(u32),
    Prefiltered,
    Bokeh(u32),
    Postfiltered,
    Output,
}

impl ResourceSlot for DofSlot {
    const COUNT: usize = 16;

    fn index(self) -> usize {
        match self {
            DofSlot::InputColor => 0,
            DofSlot::InputDepth => 1,
            DofSlot::Constants => 2,
            DofSlot::BokehKernel => 3,
            DofSlot::CircleOfConfusion => 4,
            DofSlot::TemporalCircleOfConfusion(i) => 5 + i as usize,
            DofSlot::SeparatedCircleOfConfusion => 7,
            DofSlot::DilationCircleOfConfusion => 8,
            DofSlot::BlurredCircleOfConfusion(i) => 9 + i as usize,
            DofSlot::Prefiltered => 11,
            DofSlot::Bokeh(i) => 12 + i as usize,
            DofSlot::Postfiltered => 14,
            DofSlot::Output => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DofTechnique {
    CircleOfConfusion,
    TemporalCircleOfConfusion,
    SeparatedCircleOfConfusion,
    DilationCircleOfConfusion,
    CircleOfConfusionBlurX,
    CircleOfConfusionBlurY,
    PrefilteredTexture,
    BokehFirstPass,
    BokehSecondPass,
    PostfilteredTexture,
    CombinedTexture,
}

impl DofTechnique {
    const ALL: [DofTechnique; 11] = [
        DofTechnique::CircleOfConfusion,
        DofTechnique::TemporalCircleOfConfusion,
        DofTechnique::SeparatedCircleOfConfusion,
        DofTechnique::DilationCircleOfConfusion,
        DofTechnique::CircleOfConfusionBlurX,
        DofTechnique::CircleOfConfusionBlurY,
        DofTechnique::PrefilteredTexture,
        DofTechnique::BokehFirstPass,
        DofTechnique::BokehSecondPass,
        DofTechnique::PostfilteredTexture,
        DofTechnique::CombinedTexture,
    ];
}

/// Depth-of-field post-processing effect.
#[derive(Debug)]
pub struct DepthOfField {
    create_info: DepthOfFieldCreateInfo,
    device: Option<Arc<dyn GraphicsDevice>>,
    frame: Option<PreparedFrame<DepthOfFieldFeatureFlags>>,
    dilation_mip_count: u32,
    registry: ResourceRegistry<DofSlot>,
    cache: RenderTechniqueCache<DofTechnique, DepthOfFieldFeatureFlags>,
    last_constants: Option<DepthOfFieldConstants>,
    kernel: Option<(u32, u32)>,
}

impl DepthOfField {
    /// Creates an unprepared effect.
    pub fn new(create_info: DepthOfFieldCreateInfo) -> Self {
        Self {
            create_info,
            device: None,
            frame: None,
            dilation_mip_count: 0,
            registry: ResourceRegistry::new(),
            cache: RenderTechniqueCache::new(),
            last_constants: None,
            kernel: None,
        }
    }

    /// Allocates the intermediate targets for the frame described by `post_fx`.
    ///
    /// Temporal CoC history is cleared to zero through `encoder` when created.
    pub fn prepare_resources(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        encoder: &mut dyn CommandEncoder,
        post_fx: &PostFxContext,
        feature_flags: DepthOfFieldFeatureFlags,
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

        if self.registry.is_empty(DofSlot::Constants) {
            let buffer = GpuBuffer::create(
                device,
                &BufferDescriptor::uniform(
                    "DepthOfField.Constants",
                    std::mem::size_of::<DepthOfFieldConstants>() as u64,
                ),
            )?;
            self.registry.insert(DofSlot::Constants, buffer);
            self.last_constants = None;
        }
        if self.registry.is_empty(DofSlot::BokehKernel) {
            let max_samples = bokeh_kernel_sample_count(
                DOF_MAX_BOKEH_RING_COUNT,
                DOF_MAX_BOKEH_RING_DENSITY,
            );
            let buffer = GpuBuffer::create(
                device,
                &BufferDescriptor::storage(
                    "DepthOfField.BokehKernel",
                    (max_samples as usize * std::mem::size_of::<Vec4>()) as u64,
                ),
            )?;
            self.registry.insert(DofSlot::BokehKernel, buffer);
            self.kernel = None;
        }

        let full = next.extent;
        let half = Extent2D::new((full.width / 2).max(1), (full.height / 2).max(1));
        let color_format = self.create_info.output_format;
        let target = |label: &str, extent, format, mips| {
            GpuTexture::create(device, &render_target_descriptor(label, extent, format, mips))
        };

        self.registry.insert(
            DofSlot::CircleOfConfusion,
            target("DepthOfField.CoC", full, COC_FORMAT, 1)?,
        );

        self.registry.release_range(
            DofSlot::TemporalCircleOfConfusion(0),
            DofSlot::TemporalCircleOfConfusion(1),
        );
        if feature_flags.contains(DepthOfFieldFeatureFlags::TEMPORAL_SMOOTHING) {
            for i in 0..2 {
                let texture = target("DepthOfField.TemporalCoC", full, COC_FORMAT, 1)?;
                if let Some(view) = texture.rtv() {
                    clear_render_target(encoder, view, LinearRgba::TRANSPARENT);
                }
                self.registry.insert(DofSlot::TemporalCircleOfConfusion(i), texture);
            }
        }

        self.registry.insert(
            DofSlot::SeparatedCircleOfConfusion,
            target("DepthOfField.SeparatedCoC", full, SEPARATED_COC_FORMAT, 1)?,
        );

        self.dilation_mip_count =
            mip_level_count(half.width, half.height).clamp(1, DOF_MAX_DILATION_MIP_COUNT);
        self.registry.insert(
            DofSlot::DilationCircleOfConfusion,
            target(
                "DepthOfField.DilationCoC",
                half,
                SEPARATED_COC_FORMAT,
                self.dilation_mip_count,
            )?,
        );
        for i in 0..2 {
            self.registry.insert(
                DofSlot::BlurredCircleOfConfusion(i),
                target("DepthOfField.BlurredCoC", half, SEPARATED_COC_FORMAT, 1)?,
            );
        }

        self.registry.insert(
            DofSlot::Prefiltered,
            target("DepthOfField.Prefiltered", half, color_format, 1)?,
        );
        for i in 0..2 {
            self.registry
                .insert(DofSlot::Bokeh(i), target("DepthOfField.Bokeh", half, color_format, 1)?);
        }
        self.registry.insert(
            DofSlot::Postfiltered,
            target("DepthOfField.Postfiltered", half, color_format, 1)?,
        );
        self.registry
            .insert(DofSlot::Output, target("DepthOfField.Output", full, color_format, 1)?);

        log::info!(
            "Depth of field resources allocated for {}x{} ({})",
            full.width,
            full.height,
            if feature_flags.contains(DepthOfFieldFeatureFlags::TEMPORAL_SMOOTHING) {
                "temporal"
            } else {
                "no history"
            }
        );
        self.frame = Some(next);
        Ok(())
    }

    /// Records the depth-of-field passes, or a copy of the input while pipelines compile.
    pub fn execute(&mut self, attribs: DepthOfFieldRenderAttributes<'_>) -> Result<(), RenderError> {
        let (device, frame) = match (&self.device, self.frame) {
            (Some(device), Some(frame)) => (device.clone(), frame),
            _ => return Err(RenderError::NotInitialized),
        };
        validate_input("depth of field color input", attribs.color, frame.extent)?;
        validate_format(
            "depth of field color input",
            attribs.color,
            self.create_info.output_format,
        )?;
        validate_input("depth of field depth input", attribs.depth, frame.extent)?;
        let temporal = frame
            .feature_flags
            .contains(DepthOfFieldFeatureFlags::TEMPORAL_SMOOTHING);
        if !attribs.post_fx.is_executed()
            || attribs.post_fx.camera().is_none()
            || (temporal && attribs.post_fx.motion_vectors().is_none())
        {
            return Err(RenderError::invalid_input(
                "the post-processing context was not executed this frame",
            ));
        }

        self.registry.insert(DofSlot::InputColor, attribs.color.clone());
        self.registry.insert(DofSlot::InputDepth, attribs.depth.clone());
        let result = self.render(&device, frame, attribs);
        self.registry
            .release_range(DofSlot::InputColor, DofSlot::InputDepth);
        result
    }

    fn upload(
        &mut self,
        device: &dyn GraphicsDevice,
        frame: PreparedFrame<DepthOfFieldFeatureFlags>,
        settings: &DepthOfFieldSettings,
    ) -> Result<(), RenderError> {
        let ring_count = settings.bokeh_kernel_ring_count.clamp(1, DOF_MAX_BOKEH_RING_COUNT);
        let ring_density = settings
            .bokeh_kernel_ring_density
            .clamp(1, DOF_MAX_BOKEH_RING_DENSITY);

        if self.kernel != Some((ring_count, ring_density)) {
            let kernel = bokeh_kernel(ring_count, ring_density);
            let buffer = required(self.registry.buffer(DofSlot::BokehKernel), "bokeh kernel")?;
            device.write_buffer(buffer.id(), 0, bytemuck::cast_slice(&kernel))?;
            log::debug!(
                "Bokeh kernel rebuilt: {ring_count} rings, density {ring_density}, {} samples",
                kernel.len()
            );
            self.kernel = Some((ring_count, ring_density));
        }

        let constants = DepthOfFieldConstants {
            max_circle_of_confusion: settings.max_circle_of_confusion,
            temporal_stability_factor: settings.temporal_stability_factor,
            focus_distance: settings.focus_distance,
            focus_range: settings.focus_range,
            bokeh_kernel_ring_count: ring_count,
            bokeh_kernel_ring_density: ring_density,
            bokeh_kernel_sample_count: bokeh_kernel_sample_count(ring_count, ring_density),
            dilation_mip_count: self.dilation_mip_count,
            texel_size: [
                1.0 / frame.extent.width as f32,
                1.0 / frame.extent.height as f32,
            ],
            half_texel_size: [
                2.0 / frame.extent.width as f32,
                2.0 / frame.extent.height as f32,
            ],
        };
        let buffer = required(self.registry.buffer(DofSlot::Constants), "constants")?;
        upload_if_changed(device, buffer, &mut self.last_constants, &constants)?;
        Ok(())
    }

    fn render(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        frame: PreparedFrame<DepthOfFieldFeatureFlags>,
        attribs: DepthOfFieldRenderAttributes<'_>,
    ) -> Result<(), RenderError> {
        self.upload(device.as_ref(), frame, attribs.settings)?;

        let flags = frame.feature_flags;
        let temporal = flags.contains(DepthOfFieldFeatureFlags::TEMPORAL_SMOOTHING);
        let macros = Self::shader_macros(attribs.post_fx, flags);
        let cb = buffer_id(&self.registry, DofSlot::Constants)?;
        let kernel = buffer_id(&self.registry, DofSlot::BokehKernel)?;

        let mut all_ready = true;
        for technique in DofTechnique::ALL {
            if technique == DofTechnique::TemporalCircleOfConfusion && !temporal {
                continue;
            }
            let statics: [(&str, BindingResource); 2] = [
                ("cbDepthOfFieldAttribs", cb.into()),
                ("g_BokehKernel", kernel.into()),
            ];
            let statics = if uses_bokeh_kernel(technique) {
                &statics[..]
            } else {
                &statics[..1]
            };
            all_ready &= ensure_technique(
                &mut self.cache,
                device,
                (technique, flags),
                &macros,
                pso_flags(self.create_info.enable_async_compilation),
                statics,
                || describe(&self.create_info, technique),
            );
        }

        let encoder = attribs.encoder;
        if !all_ready {
            let input = required(self.registry.texture(DofSlot::InputColor), "input")?;
            let output = required(self.registry.texture(DofSlot::Output), "output")?;
            copy_texture(encoder, input, output);
            return Ok(());
        }

        let post_fx = attribs.post_fx;
        let camera = required(post_fx.camera(), "camera")?.id();
        let registry = &self.registry;
        let cache = &mut self.cache;
        let key = |technique| (technique, flags);

        let color = srv(registry, DofSlot::InputColor)?;
        let depth = srv(registry, DofSlot::InputDepth)?;

        run_technique(
            cache,
            key(DofTechnique::CircleOfConfusion),
            encoder,
            &FullScreenPass::new(
                "DepthOfField.CircleOfConfusion",
                &[rtv(registry, DofSlot::CircleOfConfusion)?],
            ),
            |srb| {
                srb.set("cbCameraAttribs", camera);
                srb.set("g_TextureDepth", depth);
            },
        )?;

        let coc = if temporal {
            let index = post_fx.frame_desc().index;
            let current = DofSlot::TemporalCircleOfConfusion(index & 1);
            let previous = DofSlot::TemporalCircleOfConfusion((index & 1) ^ 1);
            let raw = srv(registry, DofSlot::CircleOfConfusion)?;
            let history = srv(registry, previous)?;
            let motion = required(post_fx.motion_vectors(), "motion vectors")?.srv();
            run_technique(
                cache,
                key(DofTechnique::TemporalCircleOfConfusion),
                encoder,
                &FullScreenPass::new("DepthOfField.TemporalCircleOfConfusion", &[rtv(registry, current)?]),
                |srb| {
                    srb.set("g_TextureCurrCoC", raw);
                    srb.set("g_TexturePrevCoC", history);
                    srb.set("g_TextureMotion", motion);
                },
            )?;
            srv(registry, current)?
        } else {
            srv(registry, DofSlot::CircleOfConfusion)?
        };

        run_technique(
            cache,
            key(DofTechnique::SeparatedCircleOfConfusion),
            encoder,
            &FullScreenPass::new(
                "DepthOfField.SeparatedCircleOfConfusion",
                &[rtv(registry, DofSlot::SeparatedCircleOfConfusion)?],
            ),
            |srb| srb.set("g_TextureCoC", coc),
        )?;

        let dilation = required(
            registry.texture(DofSlot::DilationCircleOfConfusion),
            "dilation CoC",
        )?;
        for mip in 0..self.dilation_mip_count {
            let source = if mip == 0 {
                srv(registry, DofSlot::SeparatedCircleOfConfusion)?
            } else {
                mip_view(dilation, mip - 1)?
            };
            let target = mip_view(dilation, mip)?;
            run_technique(
                cache,
                key(DofTechnique::DilationCircleOfConfusion),
                encoder,
                &FullScreenPass::new("DepthOfField.DilationCircleOfConfusion", &[target]),
                |srb| srb.set("g_TextureCoC", source),
            )?;
        }

        let blur_passes = [
            (
                DofTechnique::CircleOfConfusionBlurX,
                dilation.srv(),
                DofSlot::BlurredCircleOfConfusion(0),
            ),
            (
                DofTechnique::CircleOfConfusionBlurY,
                srv(registry, DofSlot::BlurredCircleOfConfusion(0))?,
                DofSlot::BlurredCircleOfConfusion(1),
            ),
        ];
        for (technique, source, target) in blur_passes {
            run_technique(
                cache,
                key(technique),
                encoder,
                &FullScreenPass::new("DepthOfField.CircleOfConfusionBlur", &[rtv(registry, target)?]),
                |srb| srb.set("g_TextureCoC", source),
            )?;
        }
        let blurred = srv(registry, DofSlot::BlurredCircleOfConfusion(1))?;

        run_technique(
            cache,
            key(DofTechnique::PrefilteredTexture),
            encoder,
            &FullScreenPass::new("DepthOfField.Prefilter", &[rtv(registry, DofSlot::Prefiltered)?]),
            |srb| {
                srb.set("g_TextureColor", color);
                srb.set("g_TextureCoC", coc);
                srb.set("g_TextureDilationCoC", blurred);
            },
        )?;

        let bokeh_passes = [
            (
                DofTechnique::BokehFirstPass,
                srv(registry, DofSlot::Prefiltered)?,
                DofSlot::Bokeh(0),
            ),
            (
                DofTechnique::BokehSecondPass,
                srv(registry, DofSlot::Bokeh(0))?,
                DofSlot::Bokeh(1),
            ),
        ];
        for (technique, source, target) in bokeh_passes {
            run_technique(
                cache,
                key(technique),
                encoder,
                &FullScreenPass::new("DepthOfField.Bokeh", &[rtv(registry, target)?]),
                |srb| {
                    srb.set("g_TextureColor", source);
                    srb.set("g_TextureDilationCoC", blurred);
                },
            )?;
        }

        let bokeh = srv(registry, DofSlot::Bokeh(1))?;
        run_technique(
            cache,
            key(DofTechnique::PostfilteredTexture),
            encoder,
            &FullScreenPass::new("DepthOfField.Postfilter", &[rtv(registry, DofSlot::Postfiltered)?]),
            |srb| srb.set("g_TextureColor", bokeh),
        )?;

        let postfiltered = srv(registry, DofSlot::Postfiltered)?;
        run_technique(
            cache,
            key(DofTechnique::CombinedTexture),
            encoder,
            &FullScreenPass::new("DepthOfField.Combine", &[rtv(registry, DofSlot::Output)?]),
            |srb| {
                srb.set("g_TextureColor", color);
                srb.set("g_TextureCoC", coc);
                srb.set("g_TextureDoFColor", postfiltered);
            },
        )
    }

    /// The combined output, once prepared.
    pub fn output(&self) -> Option<&Arc<GpuTexture>> {
        self.registry.texture(DofSlot::Output)
    }

    /// Macros of the variant selected by `feature_flags`.
    pub fn shader_macros(
        post_fx: &PostFxContext,
        feature_flags: DepthOfFieldFeatureFlags,
    ) -> ShaderMacros {
        let mut macros = post_fx.shader_macros();
        macros
            .add_flag(
                "DOF_OPTION_TEMPORAL_SMOOTHING",
                feature_flags.contains(DepthOfFieldFeatureFlags::TEMPORAL_SMOOTHING),
            )
            .add_flag(
                "DOF_OPTION_KARIS_INVERSE",
                feature_flags.contains(DepthOfFieldFeatureFlags::KARIS_INVERSE),
            );
        macros
    }
}

fn mip_view(texture: &GpuTexture, mip: u32) -> Result<TextureViewId, RenderError> {
    texture
        .mip_view(mip)
        .ok_or_else(|| RenderError::Internal(format!("{} has no mip {mip}", texture.info().label)))
}

fn uses_bokeh_kernel(technique: DofTechnique) -> bool {
    matches!(
        technique,
        DofTechnique::BokehFirstPass | DofTechnique::BokehSecondPass
    )
}

/// Number of samples in a kernel of `ring_count` rings.
fn bokeh_kernel_sample_count(ring_count: u32, ring_density: u32) -> u32 {
    1 + ring_density * ring_count * ring_count.saturating_sub(1) / 2
}

/// Sample positions of a ring kernel on the unit disk.
///
/// Ring 0 is the centre sample. Ring `i` holds `i * ring_density` samples evenly
/// spread at radius `i / (ring_count - 1)`. Each entry is `(x, y, radius, 0)`.
fn bokeh_kernel(ring_count: u32, ring_density: u32) -> Vec<Vec4> {
    let mut kernel = Vec::with_capacity(bokeh_kernel_sample_count(ring_count, ring_density) as usize);
    kernel.push(Vec4::ZERO);
    for ring in 1..ring_count {
        let radius = ring as f32 / (ring_count - 1) as f32;
        let samples = ring * ring_density;
        for j in 0..samples {
            let angle = TAU * j as f32 / samples as f32;
            kernel.push(Vec4::new(radius * angle.cos(), radius * angle.sin(), radius, 0.0));
        }
    }
    kernel
}

fn describe(create_info: &DepthOfFieldCreateInfo, technique: DofTechnique) -> FullScreenTechniqueDesc {
    let texture = |layout: PipelineResourceLayout, name: &str| {
        layout.add_variable(
            ShaderStageFlags::FRAGMENT,
            name,
            ShaderResourceKind::Texture,
            ShaderVariableType::Dynamic,
        )
    };
    let base = PipelineResourceLayout::new().add_variable(
        ShaderStageFlags::FRAGMENT,
        "cbDepthOfFieldAttribs",
        ShaderResourceKind::ConstantBuffer,
        ShaderVariableType::Static,
    );
    let color = create_info.output_format;
    let (name, file, entry_point, layout, format) = match technique {
        DofTechnique::CircleOfConfusion => (
            "DepthOfField.ComputeCircleOfConfusion",
            "DOF_ComputeCircleOfConfusion.fx",
            "ComputeCircleOfConfusionPS",
            base.add_variable(
                ShaderStageFlags::FRAGMENT,
                "cbCameraAttribs",
                ShaderResourceKind::ConstantBuffer,
                ShaderVariableType::Dynamic,
            )
            .add_variable(
                ShaderStageFlags::FRAGMENT,
                "g_TextureDepth",
                ShaderResourceKind::DepthTexture,
                ShaderVariableType::Dynamic,
            ),
            COC_FORMAT,
        ),
        DofTechnique::TemporalCircleOfConfusion => (
            "DepthOfField.ComputeTemporalCircleOfConfusion",
            "DOF_ComputeTemporalCircleOfConfusion.fx",
            "ComputeTemporalCircleOfConfusionPS",
            texture(
                texture(texture(base, "g_TextureCurrCoC"), "g_TexturePrevCoC"),
                "g_TextureMotion",
            ),
            COC_FORMAT,
        ),
        DofTechnique::SeparatedCircleOfConfusion => (
            "DepthOfField.ComputeSeparatedCircleOfConfusion",
            "DOF_ComputeSeparatedCircleOfConfusion.fx",
            "ComputeSeparatedCircleOfConfusionPS",
            texture(base, "g_TextureCoC"),
            SEPARATED_COC_FORMAT,
        ),
        DofTechnique::DilationCircleOfConfusion => (
            "DepthOfField.ComputeDilationCircleOfConfusion",
            "DOF_ComputeDilationCircleOfConfusion.fx",
            "ComputeDilationCircleOfConfusionPS",
            texture(base, "g_TextureCoC"),
            SEPARATED_COC_FORMAT,
        ),
        DofTechnique::CircleOfConfusionBlurX => (
            "DepthOfField.ComputeCircleOfConfusionBlurX",
            "DOF_ComputeCircleOfConfusionBlur.fx",
            "ComputeCircleOfConfusionBlurXPS",
            texture(base, "g_TextureCoC"),
            SEPARATED_COC_FORMAT,
        ),
        DofTechnique::CircleOfConfusionBlurY => (
            "DepthOfField.ComputeCircleOfConfusionBlurY",
            "DOF_ComputeCircleOfConfusionBlur.fx",
            "ComputeCircleOfConfusionBlurYPS",
            texture(base, "g_TextureCoC"),
            SEPARATED_COC_FORMAT,
        ),
        DofTechnique::PrefilteredTexture => (
            "DepthOfField.ComputePrefilteredTexture",
            "DOF_ComputePrefilteredTexture.fx",
            "ComputePrefilteredTexturePS",
            texture(
                texture(texture(base, "g_TextureColor"), "g_TextureCoC"),
                "g_TextureDilationCoC",
            ),
            color,
        ),
        DofTechnique::BokehFirstPass | DofTechnique::BokehSecondPass => (
            if technique == DofTechnique::BokehFirstPass {
                "DepthOfField.ComputeBokehFirstPass"
            } else {
                "DepthOfField.ComputeBokehSecondPass"
            },
            "DOF_ComputeBokeh.fx",
            if technique == DofTechnique::BokehFirstPass {
                "ComputeBokehFirstPassPS"
            } else {
                "ComputeBokehSecondPassPS"
            },
            texture(texture(base, "g_TextureColor"), "g_TextureDilationCoC").add_variable(
                ShaderStageFlags::FRAGMENT,
                "g_BokehKernel",
                ShaderResourceKind::StructuredBuffer,
                ShaderVariableType::Static,
            ),
            color,
        ),
        DofTechnique::PostfilteredTexture => (
            "DepthOfField.ComputePostfilteredTexture",
            "DOF_ComputePostfilteredTexture.fx",
            "ComputePostfilteredTexturePS",
            texture(base, "g_TextureColor"),
            color,
        ),
        DofTechnique::CombinedTexture => (
            "DepthOfField.ComputeCombinedTexture",
            "DOF_ComputeCombinedTexture.fx",
            "ComputeCombinedTexturePS",
            texture(
                texture(texture(base, "g_TextureColor"), "g_TextureCoC"),
                "g_TextureDoFColor",
            ),
            color,
        ),
    };
    FullScreenTechniqueDesc::new(
        name,
        file,
        entry_point,
        layout.add_immutable_sampler(
            ShaderStageFlags::FRAGMENT,
            "g_LinearClampSampler",
            create_info.sampler.clone(),
        ),
        format,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn kernel_size_matches_ring_layout() {
        assert_eq!(bokeh_kernel_sample_count(1, 7), 1);
        assert_eq!(bokeh_kernel_sample_count(3, 7), 22);
        assert_eq!(bokeh_kernel(3, 7).len(), 22);
        assert_eq!(
            bokeh_kernel(DOF_MAX_BOKEH_RING_COUNT, DOF_MAX_BOKEH_RING_DENSITY).len() as u32,
            bokeh_kernel_sample_count(DOF_MAX_BOKEH_RING_COUNT, DOF_MAX_BOKEH_RING_DENSITY)
        );
    }

    #[test]
    fn kernel_samples_lie_on_their_rings() {
        let kernel = bokeh_kernel(4, 5);
        assert_eq!(kernel[0], Vec4::ZERO);
        for sample in &kernel[1..] {
            let length = (sample.x * sample.x + sample.y * sample.y).sqrt();
            assert_relative_eq!(length, sample.z, epsilon = 1e-5);
            assert!(sample.z > 0.0 && sample.z <= 1.0);
        }
        // The outer ring touches the unit circle.
        assert_relative_eq!(kernel.last().map(|s| s.z).unwrap_or_default(), 1.0);
    }

    #[test]
    fn slots_are_dense() {
        let slots = [
            DofSlot::InputColor,
            DofSlot::InputDepth,
            DofSlot::Constants,
            DofSlot::BokehKernel,
            DofSlot::CircleOfConfusion,
            DofSlot::TemporalCircleOfConfusion(0),
            DofSlot::TemporalCircleOfConfusion(1),
            DofSlot::SeparatedCircleOfConfusion,
            DofSlot::DilationCircleOfConfusion,
            DofSlot::BlurredCircleOfConfusion(0),
            DofSlot::BlurredCircleOfConfusion(1),
            DofSlot::Prefiltered,
            DofSlot::Bokeh(0),
            DofSlot::Bokeh(1),
            DofSlot::Postfiltered,
            DofSlot::Output,
        ];
        let mut indices: Vec<_> = slots.iter().map(|s| s.index()).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..DofSlot::COUNT).collect::<Vec<_>>());
    }
}
