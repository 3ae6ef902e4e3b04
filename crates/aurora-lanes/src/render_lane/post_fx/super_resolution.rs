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

//! Spatial upscaling from render resolution to output resolution.
//!
//! Edge-adaptive upsampling (EASU) followed by contrast-adaptive sharpening
//! (RCAS), both driven by constants computed here on the CPU.

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
use aurora_core::math::{Extent2D, LinearRgba};
use aurora_core::renderer::api::{
    render_target_descriptor, BufferDescriptor, GpuBuffer, GpuTexture, SamplerDescriptor,
    ShaderMacros, ShaderStageFlags, TextureFormat,
};
use aurora_core::renderer::{CommandEncoder, GraphicsDevice, RenderError};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

aurora_bitflags! {
    /// Shader variants of [`SuperResolution`].
    pub struct SuperResolutionFeatureFlags: u32 {
        /// Write the upsampled image directly, without the sharpening pass.
        const SKIP_SHARPENING = 1 << 0;
    }
}

/// Options fixed when a [`SuperResolution`] is created.
#[derive(Debug, Clone)]
pub struct SuperResolutionCreateInfo {
    /// Compile pipelines in the background.
    pub enable_async_compilation: bool,
    /// Format of the colour input and output.
    pub output_format: TextureFormat,
    /// Sampler used by both passes.
    pub sampler: SamplerDescriptor<'static>,
}

impl Default for SuperResolutionCreateInfo {
    fn default() -> Self {
        Self {
            enable_async_compilation: false,
            output_format: TextureFormat::Rgba8Unorm,
            sampler: SamplerDescriptor::LINEAR_CLAMP,
        }
    }
}

/// Tunable parameters of [`SuperResolution`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperResolutionSettings {
    /// Sharpening strength in `[0, 1]`; `1` is the sharpest.
    pub sharpness: f32,
}

impl Default for SuperResolutionSettings {
    fn default() -> Self {
        Self { sharpness: 1.0 }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct SuperResolutionConstants {
    easu_constants0: [f32; 4],
    easu_constants1: [f32; 4],
    easu_constants2: [f32; 4],
    easu_constants3: [f32; 4],
    source_size: [f32; 4],
    rcas_sharpness: f32,
    _padding: [f32; 3],
}

impl SuperResolutionConstants {
    fn compute(input: Extent2D, output: Extent2D, sharpness: f32) -> Self {
        let (in_w, in_h) = (input.width as f32, input.height as f32);
        let (out_w, out_h) = (output.width as f32, output.height as f32);
        let (rcp_w, rcp_h) = (1.0 / in_w, 1.0 / in_h);
        // Attenuation in stops: 0 is the sharpest, 2 almost no sharpening.
        let stops = (1.0 - sharpness.clamp(0.0, 1.0)) * 2.0;
        Self {
            easu_constants0: [
                in_w / out_w,
                in_h / out_h,
                0.5 * in_w / out_w - 0.5,
                0.5 * in_h / out_h - 0.5,
            ],
            easu_constants1: [rcp_w, rcp_h, rcp_w, -rcp_h],
            easu_constants2: [-rcp_w, 2.0 * rcp_h, rcp_w, 2.0 * rcp_h],
            easu_constants3: [0.0, 4.0 * rcp_h, 0.0, 0.0],
            source_size: [in_w, in_h, rcp_w, rcp_h],
            rcas_sharpness: (-stops).exp2(),
            _padding: [0.0; 3],
        }
    }
}

/// Per-frame inputs of [`SuperResolution::execute`].
pub struct SuperResolutionRenderAttributes<'a> {
    /// Encoder the passes are recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// The prepared frame context.
    pub post_fx: &'a PostFxContext,
    /// Colour at render resolution.
    pub color: &'a Arc<GpuTexture>,
    /// Effect parameters.
    pub settings: &'a SuperResolutionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuperResolutionSlot {
    InputColor,
    Constants,
    Upsampled,
    Output,
}

impl ResourceSlot for SuperResolutionSlot {
    const COUNT: usize = 4;

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SuperResolutionTechnique {
    EdgeAdaptiveUpsampling,
    ContrastAdaptiveSharpening,
}

/// Spatial upscaling effect.
#[derive(Debug)]
pub struct SuperResolution {
    create_info: SuperResolutionCreateInfo,
    device: Option<Arc<dyn GraphicsDevice>>,
    frame: Option<PreparedFrame<SuperResolutionFeatureFlags>>,
    registry: ResourceRegistry<SuperResolutionSlot>,
    cache: RenderTechniqueCache<SuperResolutionTechnique, SuperResolutionFeatureFlags>,
    last_constants: Option<SuperResolutionConstants>,
}

impl SuperResolution {
    /// Creates an unprepared effect.
    pub fn new(create_info: SuperResolutionCreateInfo) -> Self {
        Self {
            create_info,
            device: None,
            frame: None,
            registry: ResourceRegistry::new(),
            cache: RenderTechniqueCache::new(),
            last_constants: None,
        }
    }

    /// Allocates the output (and the EASU target unless sharpening is skipped).
    pub fn prepare_resources(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        _encoder: &mut dyn CommandEncoder,
        post_fx: &PostFxContext,
        feature_flags: SuperResolutionFeatureFlags,
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

        if self.registry.is_empty(SuperResolutionSlot::Constants) {
            let buffer = GpuBuffer::create(
                device,
                &BufferDescriptor::uniform(
                    "SuperResolution.Constants",
                    std::mem::size_of::<SuperResolutionConstants>() as u64,
                ),
            )?;
            self.registry.insert(SuperResolutionSlot::Constants, buffer);
        }
        // Sizes feed the constants, so force an upload.
        self.last_constants = None;

        let format = self.create_info.output_format;
        let output = next.output_extent;
        if feature_flags.contains(SuperResolutionFeatureFlags::SKIP_SHARPENING) {
            self.registry.release(SuperResolutionSlot::Upsampled);
        } else {
            let texture = GpuTexture::create(
                device,
                &render_target_descriptor("SuperResolution.Upsampled", output, format, 1),
            )?;
            self.registry.insert(SuperResolutionSlot::Upsampled, texture);
        }
        let texture = GpuTexture::create(
            device,
            &render_target_descriptor("SuperResolution.Output", output, format, 1),
        )?;
        self.registry.insert(SuperResolutionSlot::Output, texture);

        log::info!(
            "Super resolution prepared: {}x{} -> {}x{}",
            next.extent.width,
            next.extent.height,
            output.width,
            output.height
        );
        self.frame = Some(next);
        Ok(())
    }

    /// Records the upscaling passes, or a clear and copy while pipelines compile.
    pub fn execute(
        &mut self,
        attribs: SuperResolutionRenderAttributes<'_>,
    ) -> Result<(), RenderError> {
        let (device, frame) = match (&self.device, self.frame) {
            (Some(device), Some(frame)) => (device.clone(), frame),
            _ => return Err(RenderError::NotInitialized),
        };
        validate_input("super resolution color input", attribs.color, frame.extent)?;
        validate_format(
            "super resolution color input",
            attribs.color,
            self.create_info.output_format,
        )?;

        self.registry
            .insert(SuperResolutionSlot::InputColor, attribs.color.clone());
        let result = self.render(&device, frame, attribs);
        self.registry.release(SuperResolutionSlot::InputColor);
        result
    }

    fn render(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        frame: PreparedFrame<SuperResolutionFeatureFlags>,
        attribs: SuperResolutionRenderAttributes<'_>,
    ) -> Result<(), RenderError> {
        let constants = SuperResolutionConstants::compute(
            frame.extent,
            frame.output_extent,
            attribs.settings.sharpness,
        );
        let buffer = required(self.registry.buffer(SuperResolutionSlot::Constants), "constants")?;
        upload_if_changed(device.as_ref(), buffer, &mut self.last_constants, &constants)?;

        let flags = frame.feature_flags;
        let sharpen = !flags.contains(SuperResolutionFeatureFlags::SKIP_SHARPENING);
        let macros = Self::shader_macros(attribs.post_fx, flags);
        let cb = buffer_id(&self.registry, SuperResolutionSlot::Constants)?;

        let mut all_ready = true;
        for technique in [
            SuperResolutionTechnique::EdgeAdaptiveUpsampling,
            SuperResolutionTechnique::ContrastAdaptiveSharpening,
        ] {
            if technique == SuperResolutionTechnique::ContrastAdaptiveSharpening && !sharpen {
                continue;
            }
            all_ready &= ensure_technique(
                &mut self.cache,
                device,
                (technique, flags),
                &macros,
                pso_flags(self.create_info.enable_async_compilation),
                &[("cbSuperResolutionAttribs", cb.into())],
                || describe(&self.create_info, technique),
            );
        }

        let encoder = attribs.encoder;
        let output = required(self.registry.texture(SuperResolutionSlot::Output), "output")?;
        if !all_ready {
            let input = required(self.registry.texture(SuperResolutionSlot::InputColor), "input")?;
            if let Some(view) = output.rtv() {
                clear_render_target(encoder, view, LinearRgba::TRANSPARENT);
            }
            copy_texture(encoder, input, output);
            return Ok(());
        }

        let registry = &self.registry;
        let cache = &mut self.cache;
        let color = srv(registry, SuperResolutionSlot::InputColor)?;
        let easu_target = if sharpen {
            SuperResolutionSlot::Upsampled
        } else {
            SuperResolutionSlot::Output
        };
        run_technique(
            cache,
            (SuperResolutionTechnique::EdgeAdaptiveUpsampling, flags),
            encoder,
            &FullScreenPass::new(
                "SuperResolution.EdgeAdaptiveUpsampling",
                &[rtv(registry, easu_target)?],
            ),
            |srb| srb.set("g_TextureSource", color),
        )?;

        if sharpen {
            let upsampled = srv(registry, SuperResolutionSlot::Upsampled)?;
            run_technique(
                cache,
                (SuperResolutionTechnique::ContrastAdaptiveSharpening, flags),
                encoder,
                &FullScreenPass::new(
                    "SuperResolution.ContrastAdaptiveSharpening",
                    &[rtv(registry, SuperResolutionSlot::Output)?],
                ),
                |srb| srb.set("g_TextureSource", upsampled),
            )?;
        }
        Ok(())
    }

    /// The upscaled image, once prepared.
    pub fn output(&self) -> Option<&Arc<GpuTexture>> {
        self.registry.texture(SuperResolutionSlot::Output)
    }

    /// Macros of the variant selected by `feature_flags`.
    pub fn shader_macros(
        post_fx: &PostFxContext,
        feature_flags: SuperResolutionFeatureFlags,
    ) -> ShaderMacros {
        let mut macros = post_fx.shader_macros();
        macros.add_flag(
            "SUPER_RESOLUTION_OPTION_SKIP_SHARPENING",
            feature_flags.contains(SuperResolutionFeatureFlags::SKIP_SHARPENING),
        );
        macros
    }
}

fn describe(
    create_info: &SuperResolutionCreateInfo,
    technique: SuperResolutionTechnique,
) -> FullScreenTechniqueDesc {
    let (name, file, entry_point) = match technique {
        SuperResolutionTechnique::EdgeAdaptiveUpsampling => (
            "SuperResolution.EdgeAdaptiveUpsampling",
            "FSR_EdgeAdaptiveUpsampling.fx",
            "ComputeEdgeAdaptiveUpsamplingPS",
        ),
        SuperResolutionTechnique::ContrastAdaptiveSharpening => (
            "SuperResolution.ContrastAdaptiveSharpening",
            "FSR_ContrastAdaptiveSharpening.fx",
            "ComputeContrastAdaptiveSharpeningPS",
        ),
    };
    let layout = PipelineResourceLayout::new()
        .add_variable(
            ShaderStageFlags::FRAGMENT,
            "cbSuperResolutionAttribs",
            ShaderResourceKind::ConstantBuffer,
            ShaderVariableType::Static,
        )
        .add_variable(
            ShaderStageFlags::FRAGMENT,
            "g_TextureSource",
            ShaderResourceKind::Texture,
            ShaderVariableType::Dynamic,
        )
        .add_immutable_sampler(
            ShaderStageFlags::FRAGMENT,
            "g_TextureSource_sampler",
            create_info.sampler.clone(),
        );
    FullScreenTechniqueDesc::new(name, file, entry_point, layout, create_info.output_format)
}
