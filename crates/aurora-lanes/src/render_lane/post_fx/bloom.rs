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

//! Physically based bloom.
//!
//! The bright part of the input is extracted at half resolution, blurred down a
//! mip chain, accumulated back up the chain with a tent filter and added to the
//! input at full resolution.

use super::{
    buffer_id, ensure_technique, pso_flags, required, rtv, run_technique, srv, upload_if_changed,
    validate_format, validate_input, FullScreenTechniqueDesc, PostFxContext, PreparedFrame,
};
use crate::render_lane::passes::{copy_texture, FullScreenPass};
use crate::render_lane::resource_registry::{ResourceRegistry, ResourceSlot};
use crate::render_lane::technique::{
    PipelineResourceLayout, ShaderResourceKind, ShaderVariableType,
};
use crate::render_lane::technique_cache::RenderTechniqueCache;
use aurora_core::aurora_bitflags;
use aurora_core::math::{mip_extent, mip_level_count, Extent2D};
use aurora_core::renderer::api::{
    render_target_descriptor, BufferDescriptor, GpuBuffer, GpuTexture, SamplerDescriptor,
    ShaderMacros, ShaderStageFlags, TextureFormat,
};
use aurora_core::renderer::{CommandEncoder, GraphicsDevice, RenderError};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound of the blur chain length.
pub const BLOOM_MAX_MIP_COUNT: u32 = 10;

aurora_bitflags! {
    /// Shader variants of [`Bloom`].
    pub struct BloomFeatureFlags: u32 {
        /// Weight the first downsample by inverse luminance to suppress fireflies.
        const KARIS_AVERAGE = 1 << 0;
    }
}

/// Options fixed when a [`Bloom`] is created.
#[derive(Debug, Clone)]
pub struct BloomCreateInfo {
    /// Compile pipelines in the background.
    pub enable_async_compilation: bool,
    /// Format of the input and of the composited output.
    pub output_format: TextureFormat,
    /// Sampler used to read every intermediate texture.
    pub sampler: SamplerDescriptor<'static>,
}

impl Default for BloomCreateInfo {
    fn default() -> Self {
        Self {
            enable_async_compilation: false,
            output_format: TextureFormat::Rgba16Float,
            sampler: SamplerDescriptor::LINEAR_CLAMP,
        }
    }
}

/// Tunable parameters of [`Bloom`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    /// Strength of the bloom added to the scene.
    pub intensity: f32,
    /// Spread of the upsampling filter, in `[0, 1]`.
    pub radius: f32,
    /// Luminance above which pixels contribute.
    pub threshold: f32,
    /// Width of the soft knee around the threshold, relative to it.
    pub soft_threshold: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            intensity: 0.15,
            radius: 0.75,
            threshold: 1.0,
            soft_threshold: 0.125,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BloomConstants {
    intensity: f32,
    radius: f32,
    threshold: f32,
    soft_threshold: f32,
    input_texel_size: [f32; 2],
    mip_count: u32,
    _padding: u32,
}

/// Per-frame inputs of [`Bloom::execute`].
pub struct BloomRenderAttributes<'a> {
    /// Encoder the passes are recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// The prepared frame context.
    pub post_fx: &'a PostFxContext,
    /// HDR scene colour.
    pub color: &'a Arc<GpuTexture>,
    /// Effect parameters.
    pub settings: &'a BloomSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BloomSlot {
    InputColor,
    Constants,
    Output,
    DownsampledMip(u32),
    UpsampledMip(u32),
}

impl ResourceSlot for BloomSlot {
    const COUNT: usize = 3 + 2 * BLOOM_MAX_MIP_COUNT as usize;

    fn index(self) -> usize {
        const MIPS: usize = BLOOM_MAX_MIP_COUNT as usize;
        match self {
            BloomSlot::InputColor => 0,
            BloomSlot::Constants => 1,
            BloomSlot::Output => 2,
            BloomSlot::DownsampledMip(i) => 3 + i as usize,
            BloomSlot::UpsampledMip(i) => 3 + MIPS + i as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BloomTechnique {
    Prefilter,
    Downsample,
    Upsample,
    Composite,
}

/// Bloom post-processing effect.
#[derive(Debug)]
pub struct Bloom {
    create_info: BloomCreateInfo,
    device: Option<Arc<dyn GraphicsDevice>>,
    frame: Option<PreparedFrame<BloomFeatureFlags>>,
    mip_count: u32,
    registry: ResourceRegistry<BloomSlot>,
    cache: RenderTechniqueCache<BloomTechnique, BloomFeatureFlags>,
    last_constants: Option<BloomConstants>,
}

impl Bloom {
    /// Creates an unprepared effect.
    pub fn new(create_info: BloomCreateInfo) -> Self {
        Self {
            create_info,
            device: None,
            frame: None,
            mip_count: 0,
            registry: ResourceRegistry::new(),
            cache: RenderTechniqueCache::new(),
            last_constants: None,
        }
    }

    /// Allocates the blur chain and the output for the frame described by `post_fx`.
    ///
    /// Does nothing if neither the frame size nor the flags changed since the last call.
    pub fn prepare_resources(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        _encoder: &mut dyn CommandEncoder,
        post_fx: &PostFxContext,
        feature_flags: BloomFeatureFlags,
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

        if self.registry.is_empty(BloomSlot::Constants) {
            let buffer = GpuBuffer::create(
                device,
                &BufferDescriptor::uniform(
                    "Bloom.Constants",
                    std::mem::size_of::<BloomConstants>() as u64,
                ),
            )?;
            self.registry.insert(BloomSlot::Constants, buffer);
            self.last_constants = None;
        }

        let extent = next.extent;
        let format = self.create_info.output_format;
        self.registry.insert(
            BloomSlot::Output,
            GpuTexture::create(
                device,
                &render_target_descriptor("Bloom.Output", extent, format, 1),
            )?,
        );

        let half = Extent2D::new((extent.width / 2).max(1), (extent.height / 2).max(1));
        self.mip_count = mip_level_count(half.width, half.height).clamp(1, BLOOM_MAX_MIP_COUNT);
        self.registry.release_range(
            BloomSlot::DownsampledMip(0),
            BloomSlot::UpsampledMip(BLOOM_MAX_MIP_COUNT - 1),
        );
        for mip in 0..self.mip_count {
            let size = mip_extent(half, mip);
            self.registry.insert(
                BloomSlot::DownsampledMip(mip),
                GpuTexture::create(
                    device,
                    &render_target_descriptor("Bloom.Downsampled", size, format, 1),
                )?,
            );
            if mip + 1 < self.mip_count {
                self.registry.insert(
                    BloomSlot::UpsampledMip(mip),
                    GpuTexture::create(
                        device,
                        &render_target_descriptor("Bloom.Upsampled", size, format, 1),
                    )?,
                );
            }
        }

        log::info!(
            "Bloom resources allocated for {}x{} ({} mips)",
            extent.width,
            extent.height,
            self.mip_count
        );
        self.frame = Some(next);
        Ok(())
    }

    /// Records the bloom passes, or a copy of the input while pipelines compile.
    pub fn execute(&mut self, attribs: BloomRenderAttributes<'_>) -> Result<(), RenderError> {
        let (device, frame) = match (&self.device, self.frame) {
            (Some(device), Some(frame)) => (device.clone(), frame),
            _ => return Err(RenderError::NotInitialized),
        };
        validate_input("bloom color input", attribs.color, frame.extent)?;
        validate_format("bloom color input", attribs.color, self.create_info.output_format)?;

        self.registry.insert(BloomSlot::InputColor, attribs.color.clone());
        let result = self.render(&device, frame, attribs);
        self.registry.release(BloomSlot::InputColor);
        result
    }

    fn render(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        frame: PreparedFrame<BloomFeatureFlags>,
        attribs: BloomRenderAttributes<'_>,
    ) -> Result<(), RenderError> {
        let settings = attribs.settings;
        let constants = BloomConstants {
            intensity: settings.intensity,
            radius: settings.radius,
            threshold: settings.threshold,
            soft_threshold: settings.soft_threshold,
            input_texel_size: [
                1.0 / frame.extent.width as f32,
                1.0 / frame.extent.height as f32,
            ],
            mip_count: self.mip_count,
            _padding: 0,
        };
        let constants_buffer = required(self.registry.buffer(BloomSlot::Constants), "constants")?;
        if !upload_if_changed(
            device.as_ref(),
            constants_buffer,
            &mut self.last_constants,
            &constants,
        )? {
            log::debug!("Bloom constants unchanged, upload skipped");
        }

        let flags = frame.feature_flags;
        let macros = Self::shader_macros(attribs.post_fx, flags);
        let cb = buffer_id(&self.registry, BloomSlot::Constants)?;

        let mut all_ready = true;
        for technique in [
            BloomTechnique::Prefilter,
            BloomTechnique::Downsample,
            BloomTechnique::Upsample,
            BloomTechnique::Composite,
        ] {
            all_ready &= ensure_technique(
                &mut self.cache,
                device,
                (technique, flags),
                &macros,
                pso_flags(self.create_info.enable_async_compilation),
                &[("cbBloomAttribs", cb.into())],
                || describe(&self.create_info, technique),
            );
        }

        let encoder = attribs.encoder;
        if !all_ready {
            let input = required(self.registry.texture(BloomSlot::InputColor), "input")?;
            let output = required(self.registry.texture(BloomSlot::Output), "output")?;
            copy_texture(encoder, input, output);
            return Ok(());
        }

        let registry = &self.registry;
        let cache = &mut self.cache;
        let color = srv(registry, BloomSlot::InputColor)?;

        run_technique(
            cache,
            (BloomTechnique::Prefilter, flags),
            encoder,
            &FullScreenPass::new(
                "Bloom.Prefilter",
                &[rtv(registry, BloomSlot::DownsampledMip(0))?],
            ),
            |srb| srb.set("g_TextureInput", color),
        )?;

        for mip in 1..self.mip_count {
            let source = srv(registry, BloomSlot::DownsampledMip(mip - 1))?;
            let target = rtv(registry, BloomSlot::DownsampledMip(mip))?;
            run_technique(
                cache,
                (BloomTechnique::Downsample, flags),
                encoder,
                &FullScreenPass::new("Bloom.Downsample", &[target]),
                |srb| srb.set("g_TextureInput", source),
            )?;
        }

        // Coarse to fine: each level adds the blurred coarser level to its own downsample.
        for mip in (0..self.mip_count.saturating_sub(1)).rev() {
            let coarser = if mip + 2 == self.mip_count {
                srv(registry, BloomSlot::DownsampledMip(mip + 1))?
            } else {
                srv(registry, BloomSlot::UpsampledMip(mip + 1))?
            };
            let downsampled = srv(registry, BloomSlot::DownsampledMip(mip))?;
            let target = rtv(registry, BloomSlot::UpsampledMip(mip))?;
            run_technique(
                cache,
                (BloomTechnique::Upsample, flags),
                encoder,
                &FullScreenPass::new("Bloom.Upsample", &[target]),
                |srb| {
                    srb.set("g_TextureInput", coarser);
                    srb.set("g_TextureDownsampled", downsampled);
                },
            )?;
        }

        let bloom = if self.mip_count > 1 {
            srv(registry, BloomSlot::UpsampledMip(0))?
        } else {
            srv(registry, BloomSlot::DownsampledMip(0))?
        };
        run_technique(
            cache,
            (BloomTechnique::Composite, flags),
            encoder,
            &FullScreenPass::new("Bloom.Composite", &[rtv(registry, BloomSlot::Output)?]),
            |srb| {
                srb.set("g_TextureInput", bloom);
                srb.set("g_TextureColor", color);
            },
        )
    }

    /// The composited output, once prepared.
    pub fn output(&self) -> Option<&Arc<GpuTexture>> {
        self.registry.texture(BloomSlot::Output)
    }

    /// Length of the blur chain for the prepared frame.
    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    /// Macros of the variant selected by `feature_flags`.
    pub fn shader_macros(post_fx: &PostFxContext, feature_flags: BloomFeatureFlags) -> ShaderMacros {
        let mut macros = post_fx.shader_macros();
        macros.add_flag(
            "BLOOM_OPTION_KARIS_AVERAGE",
            feature_flags.contains(BloomFeatureFlags::KARIS_AVERAGE),
        );
        macros
    }
}

fn describe(create_info: &BloomCreateInfo, technique: BloomTechnique) -> FullScreenTechniqueDesc {
    let sampler = create_info.sampler.clone();
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
        "cbBloomAttribs",
        ShaderResourceKind::ConstantBuffer,
        ShaderVariableType::Static,
    );
    let (name, file, entry_point, layout) = match technique {
        BloomTechnique::Prefilter => (
            "Bloom.ComputePrefilteredTexture",
            "Bloom_ComputePrefilteredTexture.fx",
            "ComputePrefilteredTexturePS",
            texture(base, "g_TextureInput"),
        ),
        BloomTechnique::Downsample => (
            "Bloom.ComputeDownsampledTexture",
            "Bloom_ComputeDownsampledTexture.fx",
            "ComputeDownsampledTexturePS",
            texture(base, "g_TextureInput"),
        ),
        BloomTechnique::Upsample => (
            "Bloom.ComputeUpsampledTexture",
            "Bloom_ComputeUpsampledTexture.fx",
            "ComputeUpsampledTexturePS",
            texture(texture(base, "g_TextureInput"), "g_TextureDownsampled"),
        ),
        BloomTechnique::Composite => (
            "Bloom.ComputeCompositeTexture",
            "Bloom_ComputeCompositeTexture.fx",
            "ComputeCompositeTexturePS",
            texture(texture(base, "g_TextureInput"), "g_TextureColor"),
        ),
    };
    FullScreenTechniqueDesc::new(
        name,
        file,
        entry_point,
        layout.add_immutable_sampler(
            ShaderStageFlags::FRAGMENT,
            "g_TextureInput_sampler",
            sampler,
        ),
        create_info.output_format,
    )
}
