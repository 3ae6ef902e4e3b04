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

//! The per-frame state shared by all post-processing effects.

use super::{
    buffer_id, ensure_technique, pso_flags, rtv, run_technique, upload_if_changed, validate_input,
    FullScreenTechniqueDesc,
};
use crate::render_lane::passes::{clear_render_target, FullScreenPass};
use crate::render_lane::resource_registry::{ResourceRegistry, ResourceSlot};
use crate::render_lane::technique::{PipelineResourceLayout, ShaderResourceKind, ShaderVariableType};
use crate::render_lane::technique_cache::RenderTechniqueCache;
use aurora_core::aurora_bitflags;
use aurora_core::math::{Extent2D, LinearRgba};
use aurora_core::renderer::api::{
    render_target_descriptor, BufferDescriptor, GpuBuffer, GpuTexture, ShaderMacros,
    ShaderStageFlags, TextureFormat,
};
use aurora_core::renderer::{CommandEncoder, GraphicsDevice, RenderError};
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

/// Side of the square blue-noise textures.
pub const BLUE_NOISE_DIMENSION: u32 = 128;
/// Number of samples in the Sobol sequence buffer.
pub const SOBOL_SAMPLE_COUNT: usize = 256;
/// Number of Sobol dimensions stored per sample.
pub const SOBOL_DIMENSION_COUNT: usize = 4;

const BLUE_NOISE_FORMAT: TextureFormat = TextureFormat::Rg8Unorm;

aurora_bitflags! {
    /// Frame-wide options that change the shader variants of every effect.
    pub struct PostFxFeatureFlags: u32 {
        /// Depth is stored reversed (near = 1, far = 0).
        const REVERSED_DEPTH = 1 << 0;
        /// Depth inputs use a 16-bit format.
        const HALF_PRECISION_DEPTH = 1 << 1;
    }
}

impl std::fmt::Display for PostFxFeatureFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Size and index of the frame being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameDesc {
    /// Monotonic frame counter.
    pub index: u32,
    /// Render width.
    pub width: u32,
    /// Render height.
    pub height: u32,
    /// Presentation width; zero means the render width.
    pub output_width: u32,
    /// Presentation height; zero means the render height.
    pub output_height: u32,
}

impl FrameDesc {
    /// Render resolution.
    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }

    /// Presentation resolution.
    pub fn output_extent(&self) -> Extent2D {
        Extent2D::new(self.output_width, self.output_height)
    }
}

/// Options fixed when the context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostFxContextCreateInfo {
    /// Compile pipelines in the background.
    pub enable_async_compilation: bool,
}

/// The host's per-frame inputs shared with every effect.
pub struct PostFxRenderAttributes<'a> {
    /// Encoder the blue-noise pass is recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// Camera constants of the current frame.
    pub camera: &'a Arc<GpuBuffer>,
    /// Camera constants of the previous frame.
    pub previous_camera: &'a Arc<GpuBuffer>,
    /// Depth of the current frame.
    pub depth: &'a Arc<GpuTexture>,
    /// Depth of the previous frame.
    pub previous_depth: &'a Arc<GpuTexture>,
    /// Screen-space motion vectors of the current frame.
    pub motion_vectors: &'a Arc<GpuTexture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextSlot {
    Constants,
    SobolBuffer,
    ScramblingTileBuffer,
    BlueNoiseXY,
    BlueNoiseZW,
    Camera,
    PreviousCamera,
    Depth,
    PreviousDepth,
    MotionVectors,
}

impl ResourceSlot for ContextSlot {
    const COUNT: usize = 10;

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ContextTechnique {
    ComputeBlueNoiseTexture,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BlueNoiseConstants {
    frame_index: u32,
    _padding: [u32; 3],
}

/// Per-frame resources shared by the post-processing effects.
///
/// Effects only read from the context. It must be prepared and executed before
/// the effects of the same frame.
#[derive(Debug)]
pub struct PostFxContext {
    create_info: PostFxContextCreateInfo,
    device: Option<Arc<dyn GraphicsDevice>>,
    frame_desc: FrameDesc,
    feature_flags: PostFxFeatureFlags,
    prepared: bool,
    ready: bool,
    executed_index: Option<u32>,
    registry: ResourceRegistry<ContextSlot>,
    cache: RenderTechniqueCache<ContextTechnique, PostFxFeatureFlags>,
    last_constants: Option<BlueNoiseConstants>,
}

impl PostFxContext {
    /// Creates an unprepared context.
    pub fn new(create_info: PostFxContextCreateInfo) -> Self {
        Self {
            create_info,
            device: None,
            frame_desc: FrameDesc::default(),
            feature_flags: PostFxFeatureFlags::EMPTY,
            prepared: false,
            ready: false,
            executed_index: None,
            registry: ResourceRegistry::new(),
            cache: RenderTechniqueCache::new(),
            last_constants: None,
        }
    }

    /// Records the frame description and allocates the noise resources on first use.
    ///
    /// The previous frame's inputs are released; `execute` must run again before
    /// the effects of this frame.
    ///
    /// # Errors
    /// * `RenderError::InvalidInput` - The render size is zero.
    /// * `RenderError::ResourceError` - A resource could not be created.
    pub fn prepare_resources(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        encoder: &mut dyn CommandEncoder,
        frame_desc: FrameDesc,
        feature_flags: PostFxFeatureFlags,
    ) -> Result<(), RenderError> {
        if frame_desc.extent().is_empty() {
            return Err(RenderError::invalid_input("frame render size is zero"));
        }

        let mut frame_desc = frame_desc;
        if frame_desc.output_extent().is_empty() {
            frame_desc.output_width = frame_desc.width;
            frame_desc.output_height = frame_desc.height;
        }

        if self.prepared && self.feature_flags != feature_flags {
            log::info!("Post-processing flags changed to {feature_flags}, dropping pipelines");
            self.cache.clear();
        }
        self.registry
            .release_range(ContextSlot::Camera, ContextSlot::MotionVectors);
        self.executed_index = None;
        self.device = Some(device.clone());
        self.frame_desc = frame_desc;
        self.feature_flags = feature_flags;
        self.prepared = true;

        if self.registry.is_empty(ContextSlot::Constants) {
            let buffer = GpuBuffer::create(
                device,
                &BufferDescriptor::uniform(
                    "PostFxContext.Constants",
                    std::mem::size_of::<BlueNoiseConstants>() as u64,
                ),
            )?;
            self.registry.insert(ContextSlot::Constants, buffer);
            self.last_constants = None;
        }

        if self.registry.is_empty(ContextSlot::SobolBuffer) {
            let data = sobol_sequence(SOBOL_SAMPLE_COUNT, SOBOL_DIMENSION_COUNT);
            let bytes: &[u8] = bytemuck::cast_slice(&data);
            let buffer = GpuBuffer::create_with_data(
                device,
                &BufferDescriptor::storage("PostFxContext.SobolBuffer", bytes.len() as u64),
                bytes,
            )?;
            self.registry.insert(ContextSlot::SobolBuffer, buffer);
        }

        if self.registry.is_empty(ContextSlot::ScramblingTileBuffer) {
            let data = scrambling_tile(BLUE_NOISE_DIMENSION, SOBOL_DIMENSION_COUNT);
            let bytes: &[u8] = bytemuck::cast_slice(&data);
            let buffer = GpuBuffer::create_with_data(
                device,
                &BufferDescriptor::storage("PostFxContext.ScramblingTileBuffer", bytes.len() as u64),
                bytes,
            )?;
            self.registry.insert(ContextSlot::ScramblingTileBuffer, buffer);
        }

        let noise_extent = Extent2D::new(BLUE_NOISE_DIMENSION, BLUE_NOISE_DIMENSION);
        for (slot, label) in [
            (ContextSlot::BlueNoiseXY, "PostFxContext.BlueNoiseXY"),
            (ContextSlot::BlueNoiseZW, "PostFxContext.BlueNoiseZW"),
        ] {
            if !self.registry.is_empty(slot) {
                continue;
            }
            let texture = GpuTexture::create(
                device,
                &render_target_descriptor(label, noise_extent, BLUE_NOISE_FORMAT, 1),
            )?;
            if let Some(view) = texture.rtv() {
                clear_render_target(encoder, view, LinearRgba::TRANSPARENT);
            }
            log::info!("Created {label} ({BLUE_NOISE_DIMENSION}x{BLUE_NOISE_DIMENSION})");
            self.registry.insert(slot, texture);
        }

        Ok(())
    }

    /// Stores the frame inputs and renders this frame's blue-noise textures.
    ///
    /// # Errors
    /// * `RenderError::NotInitialized` - `prepare_resources` was never called.
    /// * `RenderError::InvalidInput` - A depth or motion input does not match the render size.
    pub fn execute(&mut self, attribs: PostFxRenderAttributes<'_>) -> Result<(), RenderError> {
        let device = match (&self.device, self.prepared) {
            (Some(device), true) => device.clone(),
            _ => return Err(RenderError::NotInitialized),
        };
        let extent = self.frame_desc.extent();
        validate_input("depth", attribs.depth, extent)?;
        validate_input("previous depth", attribs.previous_depth, extent)?;
        validate_input("motion vectors", attribs.motion_vectors, extent)?;

        self.registry.insert(ContextSlot::Camera, attribs.camera.clone());
        self.registry.insert(ContextSlot::PreviousCamera, attribs.previous_camera.clone());
        self.registry.insert(ContextSlot::Depth, attribs.depth.clone());
        self.registry.insert(ContextSlot::PreviousDepth, attribs.previous_depth.clone());
        self.registry.insert(ContextSlot::MotionVectors, attribs.motion_vectors.clone());
        self.executed_index = Some(self.frame_desc.index);

        let constants_buffer =
            super::required(self.registry.buffer(ContextSlot::Constants), "constants")?;
        let constants = BlueNoiseConstants {
            frame_index: self.frame_desc.index,
            _padding: [0; 3],
        };
        upload_if_changed(
            device.as_ref(),
            constants_buffer,
            &mut self.last_constants,
            &constants,
        )?;

        let constants = buffer_id(&self.registry, ContextSlot::Constants)?;
        let sobol = buffer_id(&self.registry, ContextSlot::SobolBuffer)?;
        let scrambling = buffer_id(&self.registry, ContextSlot::ScramblingTileBuffer)?;

        let key = (ContextTechnique::ComputeBlueNoiseTexture, self.feature_flags);
        let macros = self.shader_macros();
        self.ready = ensure_technique(
            &mut self.cache,
            &device,
            key,
            &macros,
            pso_flags(self.create_info.enable_async_compilation),
            &[
                ("cbBlueNoiseAttribs", constants.into()),
                ("g_SobolBuffer", sobol.into()),
                ("g_ScramblingTileBuffer", scrambling.into()),
            ],
            || {
                let mut desc = FullScreenTechniqueDesc::new(
                    "PostFxContext.ComputeBlueNoiseTexture",
                    "PostFx_ComputeBlueNoiseTexture.fx",
                    "ComputeBlueNoiseTexturePS",
                    PipelineResourceLayout::new()
                        .add_variable(
                            ShaderStageFlags::FRAGMENT,
                            "cbBlueNoiseAttribs",
                            ShaderResourceKind::ConstantBuffer,
                            ShaderVariableType::Static,
                        )
                        .add_variable(
                            ShaderStageFlags::FRAGMENT,
                            "g_SobolBuffer",
                            ShaderResourceKind::StructuredBuffer,
                            ShaderVariableType::Static,
                        )
                        .add_variable(
                            ShaderStageFlags::FRAGMENT,
                            "g_ScramblingTileBuffer",
                            ShaderResourceKind::StructuredBuffer,
                            ShaderVariableType::Static,
                        ),
                    BLUE_NOISE_FORMAT,
                );
                desc.color_formats.push(BLUE_NOISE_FORMAT);
                desc
            },
        );

        if !self.ready {
            return Ok(());
        }

        let xy = rtv(&self.registry, ContextSlot::BlueNoiseXY)?;
        let zw = rtv(&self.registry, ContextSlot::BlueNoiseZW)?;
        run_technique(
            &mut self.cache,
            key,
            attribs.encoder,
            &FullScreenPass::new("PostFxContext.ComputeBlueNoiseTexture", &[xy, zw]),
            |_| {},
        )
    }

    /// Macros every effect adds to its shader variants.
    pub fn shader_macros(&self) -> ShaderMacros {
        let mut macros = ShaderMacros::new();
        macros
            .add_flag(
                "POSTFX_OPTION_INVERTED_DEPTH",
                self.feature_flags.contains(PostFxFeatureFlags::REVERSED_DEPTH),
            )
            .add_flag(
                "POSTFX_OPTION_HALF_PRECISION_DEPTH",
                self.feature_flags
                    .contains(PostFxFeatureFlags::HALF_PRECISION_DEPTH),
            );
        macros
    }

    /// Returns `true` once the blue-noise pipeline is ready.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns `true` if `execute` ran for the currently prepared frame.
    pub fn is_executed(&self) -> bool {
        self.prepared && self.executed_index == Some(self.frame_desc.index)
    }

    /// Returns `true` once `prepare_resources` has run.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// The frame recorded by the last `prepare_resources`.
    pub fn frame_desc(&self) -> FrameDesc {
        self.frame_desc
    }

    /// The flags recorded by the last `prepare_resources`.
    pub fn feature_flags(&self) -> PostFxFeatureFlags {
        self.feature_flags
    }

    /// Blue noise for the first two sample dimensions.
    pub fn blue_noise_xy(&self) -> Option<&Arc<GpuTexture>> {
        self.registry.texture(ContextSlot::BlueNoiseXY)
    }

    /// Blue noise for the third and fourth sample dimensions.
    pub fn blue_noise_zw(&self) -> Option<&Arc<GpuTexture>> {
        self.registry.texture(ContextSlot::BlueNoiseZW)
    }

    /// Camera constants of the current frame.
    pub fn camera(&self) -> Option<&Arc<GpuBuffer>> {
        self.registry.buffer(ContextSlot::Camera)
    }

    /// Camera constants of the previous frame.
    pub fn previous_camera(&self) -> Option<&Arc<GpuBuffer>> {
        self.registry.buffer(ContextSlot::PreviousCamera)
    }

    /// Depth of the current frame.
    pub fn depth(&self) -> Option<&Arc<GpuTexture>> {
        self.registry.texture(ContextSlot::Depth)
    }

    /// Depth of the previous frame.
    pub fn previous_depth(&self) -> Option<&Arc<GpuTexture>> {
        self.registry.texture(ContextSlot::PreviousDepth)
    }

    /// Motion vectors of the current frame.
    pub fn motion_vectors(&self) -> Option<&Arc<GpuTexture>> {
        self.registry.texture(ContextSlot::MotionVectors)
    }
}

/// Sobol points, `samples` rows of `dimensions` 32-bit fixed-point coordinates.
fn sobol_sequence(samples: usize, dimensions: usize) -> Vec<u32> {
    // (degree, polynomial coefficients, initial direction numbers) per dimension
    // after the first, from the Joe-Kuo tables.
    const PRIMITIVES: [(u32, u32, [u32; 3]); 3] =
        [(1, 0, [1, 0, 0]), (2, 1, [1, 3, 0]), (3, 1, [1, 3, 1])];

    let directions: Vec<[u32; 32]> = (0..dimensions)
        .map(|dim| {
            let mut v = [0u32; 32];
            if dim == 0 {
                for (k, v) in v.iter_mut().enumerate() {
                    *v = 1 << (31 - k);
                }
                return v;
            }
            let (s, a, m) = PRIMITIVES[(dim - 1) % PRIMITIVES.len()];
            let s = s as usize;
            for k in 0..s {
                v[k] = m[k] << (31 - k);
            }
            for k in s..32 {
                let mut value = v[k - s] ^ (v[k - s] >> s);
                for j in 1..s {
                    if (a >> (s - 1 - j)) & 1 == 1 {
                        value ^= v[k - j];
                    }
                }
                v[k] = value;
            }
            v
        })
        .collect();

    let mut out = Vec::with_capacity(samples * dimensions);
    for i in 0..samples {
        for dirs in &directions {
            let mut value = 0u32;
            let mut index = i;
            let mut bit = 0;
            while index != 0 {
                if index & 1 == 1 {
                    value ^= dirs[bit];
                }
                index >>= 1;
                bit += 1;
            }
            out.push(value);
        }
    }
    out
}

/// Per-pixel scrambling and ranking keys, `dimensions` of each for every texel of the tile.
fn scrambling_tile(size: u32, dimensions: usize) -> Vec<u32> {
    let texels = (size * size) as usize;
    let mut out = Vec::with_capacity(texels * dimensions * 2);
    for texel in 0..texels as u32 {
        for d in 0..dimensions as u32 {
            out.push(hash_u32(texel.wrapping_mul(8).wrapping_add(d)));
        }
        for d in 0..dimensions as u32 {
            out.push(hash_u32(texel.wrapping_mul(8).wrapping_add(4 + d)) & 0xFF);
        }
    }
    out
}

fn hash_u32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}
