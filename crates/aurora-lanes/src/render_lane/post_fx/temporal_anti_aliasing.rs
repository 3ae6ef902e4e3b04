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

//! Temporal anti-aliasing with independent accumulation streams.
//!
//! A host rendering several views (split screen, reflection probes, ...) gives
//! each one its own accumulation buffer index. Every stream owns its history
//! pair, its constant buffer and its binding, and tracks its own frame indices.

use super::{
    ensure_technique, pso_flags, upload_if_changed, validate_format, validate_input,
    FullScreenTechniqueDesc, PostFxContext, PostFxFeatureFlags,
};
use crate::render_lane::passes::{
    clear_render_target, copy_texture, render_full_screen, FullScreenPass,
};
use crate::render_lane::technique::{
    PipelineResourceLayout, ShaderResourceBinding, ShaderResourceKind, ShaderVariableType,
    TechniqueState,
};
use crate::render_lane::technique_cache::RenderTechniqueCache;
use ahash::AHashMap;
use aurora_core::aurora_bitflags;
use aurora_core::math::{halton, Extent2D, LinearRgba, Vec2};
use aurora_core::renderer::api::{
    render_target_descriptor, BufferDescriptor, GpuBuffer, GpuTexture, SamplerDescriptor,
    ShaderMacros, ShaderStageFlags, TextureFormat,
};
use aurora_core::renderer::{CommandEncoder, GraphicsDevice, RenderError};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Length of the jitter sequence, in frames.
pub const TAA_JITTER_PERIOD: u32 = 16;

aurora_bitflags! {
    /// Shader variants of [`TemporalAntiAliasing`].
    pub struct TemporalAntiAliasingFeatureFlags: u32 {
        /// Weight neighbourhood samples with a Gaussian instead of a box.
        const GAUSSIAN_WEIGHTING = 1 << 0;
        /// Sample the history with a Catmull-Rom filter.
        const BICUBIC_FILTER = 1 << 1;
    }
}

/// Options fixed when a [`TemporalAntiAliasing`] is created.
#[derive(Debug, Clone)]
pub struct TemporalAntiAliasingCreateInfo {
    /// Compile pipelines in the background.
    pub enable_async_compilation: bool,
    /// Format of the colour input and of the history.
    pub output_format: TextureFormat,
    /// Sampler used for colour and history reads.
    pub sampler: SamplerDescriptor<'static>,
}

impl Default for TemporalAntiAliasingCreateInfo {
    fn default() -> Self {
        Self {
            enable_async_compilation: false,
            output_format: TextureFormat::Rgba16Float,
            sampler: SamplerDescriptor::LINEAR_CLAMP,
        }
    }
}

/// Tunable parameters of [`TemporalAntiAliasing`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalAntiAliasingSettings {
    /// Weight of the history in the blend.
    pub temporal_stability_factor: f32,
    /// Disable history rejection (useful for still-image accumulation).
    pub skip_rejection: bool,
    /// Discard the history of this stream on the next `execute`.
    #[serde(skip)]
    pub reset_accumulation: bool,
}

impl Default for TemporalAntiAliasingSettings {
    fn default() -> Self {
        Self {
            temporal_stability_factor: 0.9375,
            skip_rejection: false,
            reset_accumulation: false,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct TemporalAntiAliasingConstants {
    temporal_stability_factor: f32,
    reset_accumulation: u32,
    skip_rejection: u32,
    _padding: u32,
}

/// Per-frame inputs of [`TemporalAntiAliasing::execute`].
pub struct TemporalAntiAliasingRenderAttributes<'a> {
    /// Encoder the pass is recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// The prepared and executed frame context.
    pub post_fx: &'a PostFxContext,
    /// Jittered colour of the current frame.
    pub color: &'a Arc<GpuTexture>,
    /// Stream to accumulate into.
    pub accumulation_buffer_index: u32,
    /// Effect parameters.
    pub settings: &'a TemporalAntiAliasingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TaaTechnique {
    ComputeTemporalAccumulation,
}

/// History and bookkeeping of one accumulation stream.
#[derive(Debug)]
struct AccumulationBuffer {
    extent: Extent2D,
    constants: Arc<GpuBuffer>,
    history: [Arc<GpuTexture>; 2],
    srb: Option<ShaderResourceBinding>,
    current_frame_index: Option<u32>,
    last_frame_index: Option<u32>,
    last_constants: Option<TemporalAntiAliasingConstants>,
    was_reset: bool,
}

impl AccumulationBuffer {
    fn current_slot(&self) -> usize {
        self.current_frame_index.unwrap_or(0) as usize & 1
    }

    /// History is valid only if the previous frame of this stream was the one
    /// right before the current frame.
    fn history_is_contiguous(&self) -> bool {
        match (self.last_frame_index, self.current_frame_index) {
            (Some(last), Some(current)) => last.wrapping_add(1) == current,
            _ => false,
        }
    }
}

/// Temporal anti-aliasing effect.
#[derive(Debug)]
pub struct TemporalAntiAliasing {
    create_info: TemporalAntiAliasingCreateInfo,
    device: Option<Arc<dyn GraphicsDevice>>,
    feature_flags: TemporalAntiAliasingFeatureFlags,
    context_flags: Option<PostFxFeatureFlags>,
    streams: AHashMap<u32, AccumulationBuffer>,
    cache: RenderTechniqueCache<TaaTechnique, TemporalAntiAliasingFeatureFlags>,
}

impl TemporalAntiAliasing {
    /// Creates an effect with no accumulation stream.
    pub fn new(create_info: TemporalAntiAliasingCreateInfo) -> Self {
        Self {
            create_info,
            device: None,
            feature_flags: TemporalAntiAliasingFeatureFlags::EMPTY,
            context_flags: None,
            streams: AHashMap::new(),
            cache: RenderTechniqueCache::new(),
        }
    }

    /// Advances the frame indices of stream `accumulation_buffer_index` and
    /// (re)allocates its history when the render size changed.
    ///
    /// Newly created history textures are cleared through `encoder`.
    pub fn prepare_resources(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        encoder: &mut dyn CommandEncoder,
        post_fx: &PostFxContext,
        accumulation_buffer_index: u32,
        feature_flags: TemporalAntiAliasingFeatureFlags,
    ) -> Result<(), RenderError> {
        if !post_fx.is_prepared() {
            return Err(RenderError::NotInitialized);
        }
        self.device = Some(device.clone());

        let context_flags = post_fx.feature_flags();
        if self.context_flags != Some(context_flags) || self.feature_flags != feature_flags {
            // Stream bindings were built from the previous variant's layout.
            for stream in self.streams.values_mut() {
                stream.srb = None;
            }
        }
        if self.context_flags.is_some_and(|flags| flags != context_flags) {
            self.cache.clear();
        }
        self.context_flags = Some(context_flags);
        self.feature_flags = feature_flags;

        let desc = post_fx.frame_desc();
        let extent = desc.extent();

        if let Some(stream) = self.streams.get_mut(&accumulation_buffer_index) {
            stream.last_frame_index = stream.current_frame_index;
            stream.current_frame_index = Some(desc.index);
            if stream.extent == extent {
                return Ok(());
            }
        }

        let format = self.create_info.output_format;
        let mut history = Vec::with_capacity(2);
        for _ in 0..2 {
            let texture = GpuTexture::create(
                device,
                &render_target_descriptor("TemporalAntiAliasing.History", extent, format, 1),
            )?;
            if let Some(view) = texture.rtv() {
                clear_render_target(encoder, view, LinearRgba::TRANSPARENT);
            }
            history.push(texture);
        }
        let history: [Arc<GpuTexture>; 2] = history
            .try_into()
            .map_err(|_| RenderError::Internal("history pair".to_string()))?;

        match self.streams.get_mut(&accumulation_buffer_index) {
            Some(stream) => {
                stream.extent = extent;
                stream.history = history;
                stream.srb = None;
                // The cleared history holds nothing to blend with.
                stream.last_frame_index = None;
            }
            None => {
                let constants = GpuBuffer::create(
                    device,
                    &BufferDescriptor::uniform(
                        "TemporalAntiAliasing.Constants",
                        std::mem::size_of::<TemporalAntiAliasingConstants>() as u64,
                    ),
                )?;
                self.streams.insert(
                    accumulation_buffer_index,
                    AccumulationBuffer {
                        extent,
                        constants,
                        history,
                        srb: None,
                        current_frame_index: Some(desc.index),
                        last_frame_index: None,
                        last_constants: None,
                        was_reset: false,
                    },
                );
            }
        }
        log::info!(
            "TAA accumulation buffer {accumulation_buffer_index} allocated at {}x{}",
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// Blends the current frame into the history of its stream.
    ///
    /// While the pipeline compiles the colour is copied into the history unchanged.
    pub fn execute(
        &mut self,
        attribs: TemporalAntiAliasingRenderAttributes<'_>,
    ) -> Result<(), RenderError> {
        let device = self.device.clone().ok_or(RenderError::NotInitialized)?;
        let index = attribs.accumulation_buffer_index;
        let Some(stream) = self.streams.get_mut(&index) else {
            log::error!("TAA accumulation buffer {index} was never prepared");
            return Err(RenderError::NotInitialized);
        };
        validate_input("TAA color input", attribs.color, stream.extent)?;
        validate_format("TAA color input", attribs.color, self.create_info.output_format)?;
        let post_fx = attribs.post_fx;
        let (true, Some(camera), Some(depth), Some(previous_depth), Some(motion)) = (
            post_fx.is_executed(),
            post_fx.camera(),
            post_fx.depth(),
            post_fx.previous_depth(),
            post_fx.motion_vectors(),
        ) else {
            return Err(RenderError::invalid_input(
                "the post-processing context was not executed this frame",
            ));
        };

        let settings = attribs.settings;
        let reset = settings.reset_accumulation || !stream.history_is_contiguous();
        if reset {
            log::debug!("TAA accumulation buffer {index} history reset");
        }
        stream.was_reset = reset;
        let constants = TemporalAntiAliasingConstants {
            temporal_stability_factor: settings.temporal_stability_factor,
            reset_accumulation: reset as u32,
            skip_rejection: settings.skip_rejection as u32,
            _padding: 0,
        };
        upload_if_changed(
            device.as_ref(),
            &stream.constants,
            &mut stream.last_constants,
            &constants,
        )?;

        let flags = self.feature_flags;
        let macros = Self::shader_macros(post_fx, flags);
        let create_info = &self.create_info;
        let ready = ensure_technique(
            &mut self.cache,
            &device,
            (TaaTechnique::ComputeTemporalAccumulation, flags),
            &macros,
            pso_flags(create_info.enable_async_compilation),
            &[],
            || describe(create_info),
        );

        let current = stream.current_slot();
        let encoder = attribs.encoder;
        if !ready {
            copy_texture(encoder, attribs.color, &stream.history[current]);
            return Ok(());
        }

        let technique = self
            .cache
            .get(TaaTechnique::ComputeTemporalAccumulation, flags)
            .ok_or_else(|| RenderError::Internal("TAA technique missing".to_string()))?;
        let pipeline = technique
            .pipeline()
            .ok_or_else(|| RenderError::Internal("TAA pipeline missing".to_string()))?;
        if stream.srb.is_none() {
            stream.srb = technique.create_shader_resource_binding(false);
        }
        let srb = stream
            .srb
            .as_mut()
            .ok_or_else(|| RenderError::Internal("TAA binding missing".to_string()))?;

        srb.set("cbTemporalAntiAliasingAttribs", stream.constants.id());
        srb.set("cbCameraAttribs", camera.id());
        srb.set("g_TextureCurrColor", attribs.color.srv());
        srb.set("g_TexturePrevColor", stream.history[current ^ 1].srv());
        srb.set("g_TextureCurrDepth", depth.srv());
        srb.set("g_TexturePrevDepth", previous_depth.srv());
        srb.set("g_TextureMotion", motion.srv());

        let target = stream.history[current]
            .rtv()
            .ok_or_else(|| RenderError::Internal("TAA history is not a render target".to_string()))?;
        render_full_screen(
            encoder,
            pipeline,
            srb,
            &FullScreenPass::new("TemporalAntiAliasing.ComputeTemporalAccumulation", &[target]),
        )
    }

    /// Sub-pixel jitter, in normalized device coordinates, for the current frame of a stream.
    ///
    /// Zero when the stream is unknown, empty, or the accumulation pipeline is
    /// not ready to consume jittered frames.
    pub fn jitter_offset(&self, accumulation_buffer_index: u32) -> Vec2 {
        let Some(stream) = self.streams.get(&accumulation_buffer_index) else {
            return Vec2::ZERO;
        };
        if stream.extent.is_empty() || !self.is_ready() {
            return Vec2::ZERO;
        }
        let sample = stream.current_frame_index.unwrap_or(0) % TAA_JITTER_PERIOD + 1;
        Vec2::new(
            (halton(sample, 2) - 0.5) / (0.5 * stream.extent.width as f32),
            (halton(sample, 3) - 0.5) / (0.5 * stream.extent.height as f32),
        )
    }

    /// The accumulated image of a stream, or its history from the previous frame.
    pub fn accumulated_frame(
        &self,
        accumulation_buffer_index: u32,
        previous: bool,
    ) -> Option<&Arc<GpuTexture>> {
        let stream = self.streams.get(&accumulation_buffer_index)?;
        let slot = stream.current_slot() ^ previous as usize;
        Some(&stream.history[slot])
    }

    /// Whether the last `execute` of a stream discarded its history.
    pub fn accumulation_was_reset(&self, accumulation_buffer_index: u32) -> bool {
        self.streams
            .get(&accumulation_buffer_index)
            .is_some_and(|stream| stream.was_reset)
    }

    /// Frees the history of a stream. Returns `false` if the stream did not exist.
    pub fn release_accumulation_buffer(&mut self, accumulation_buffer_index: u32) -> bool {
        self.streams.remove(&accumulation_buffer_index).is_some()
    }

    /// Number of live accumulation streams.
    pub fn accumulation_buffer_count(&self) -> usize {
        self.streams.len()
    }

    /// Whether the pipeline of the current variant finished compiling.
    ///
    /// Reflects the last poll made by `execute`.
    pub fn is_ready(&self) -> bool {
        self.cache
            .get(TaaTechnique::ComputeTemporalAccumulation, self.feature_flags)
            .is_some_and(|t| t.state() == TechniqueState::Ready)
    }

    /// Macros of the variant selected by `feature_flags`.
    pub fn shader_macros(
        post_fx: &PostFxContext,
        feature_flags: TemporalAntiAliasingFeatureFlags,
    ) -> ShaderMacros {
        let mut macros = post_fx.shader_macros();
        macros
            .add_flag(
                "TAA_OPTION_GAUSSIAN_WEIGHTING",
                feature_flags.contains(TemporalAntiAliasingFeatureFlags::GAUSSIAN_WEIGHTING),
            )
            .add_flag(
                "TAA_OPTION_BICUBIC_FILTER",
                feature_flags.contains(TemporalAntiAliasingFeatureFlags::BICUBIC_FILTER),
            );
        macros
    }
}

fn describe(create_info: &TemporalAntiAliasingCreateInfo) -> FullScreenTechniqueDesc {
    let mut layout = PipelineResourceLayout::new()
        .add_variable(
            ShaderStageFlags::FRAGMENT,
            "cbTemporalAntiAliasingAttribs",
            ShaderResourceKind::ConstantBuffer,
            ShaderVariableType::Mutable,
        )
        .add_variable(
            ShaderStageFlags::FRAGMENT,
            "cbCameraAttribs",
            ShaderResourceKind::ConstantBuffer,
            ShaderVariableType::Dynamic,
        );
    for name in ["g_TextureCurrColor", "g_TexturePrevColor", "g_TextureMotion"] {
        layout = layout.add_variable(
            ShaderStageFlags::FRAGMENT,
            name,
            ShaderResourceKind::Texture,
            ShaderVariableType::Dynamic,
        );
    }
    for name in ["g_TextureCurrDepth", "g_TexturePrevDepth"] {
        layout = layout.add_variable(
            ShaderStageFlags::FRAGMENT,
            name,
            ShaderResourceKind::DepthTexture,
            ShaderVariableType::Dynamic,
        );
    }
    FullScreenTechniqueDesc::new(
        "TemporalAntiAliasing.ComputeTemporalAccumulation",
        "TAA_ComputeTemporalAccumulation.fx",
        "ComputeTemporalAccumulationPS",
        layout.add_immutable_sampler(
            ShaderStageFlags::FRAGMENT,
            "g_LinearClampSampler",
            create_info.sampler.clone(),
        ),
        create_info.output_format,
    )
}
