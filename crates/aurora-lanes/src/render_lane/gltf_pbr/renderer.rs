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

use super::model::{AlphaMode, Material, Model, Primitive, TEXTURE_SEMANTICS};
use crate::render_lane::technique::{
    PipelineResourceLayout, PsoCreateInfo, RenderTechnique, ShaderResourceBinding,
    ShaderResourceKind, ShaderStageInfo, ShaderVariableType,
};
use aurora_core::math::{Extent2D, Extent3D, LinearRgba, Mat4, Origin3D};
use aurora_core::renderer::api::{
    BindGroupId, BlendStateDescriptor, BufferDescriptor, CompareFunction, CullMode,
    DepthStencilStateDescriptor, GpuBuffer, GpuTexture, IndexFormat, LoadOp, Operations,
    PipelineCreateFlags, PrimitiveStateDescriptor, RenderPassColorAttachment,
    RenderPassDepthStencilAttachment, RenderPassDescriptor, RenderPipelineId, SampleCount,
    SamplerDescriptor, ShaderMacros, ShaderStageFlags, StoreOp, TextureDescriptor,
    TextureDimension, TextureFormat, TextureUsage, TextureViewId, VertexAttributeDescriptor,
    VertexBufferLayoutDescriptor, VertexFormat, VertexStepMode,
};
use aurora_core::renderer::{CommandEncoder, GraphicsDevice, RenderError};
use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use std::sync::Arc;

/// Bytes per vertex of the packed vertex buffer: position, normal, uv0.
pub const PBR_VERTEX_STRIDE: u64 = 32;

const PSO_COUNT: usize = 4;
const PBR_SHADER: &str = "GLTF_PBR.fx";

/// Selects one of the four pipelines of [`GltfPbrRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PbrPsoKey {
    /// Alpha mode; only `Blend` changes the pipeline.
    pub alpha_mode: AlphaMode,
    /// Disables back-face culling.
    pub double_sided: bool,
}

impl PbrPsoKey {
    /// The key a material is drawn with.
    pub fn from_material(material: &Material) -> Self {
        Self {
            alpha_mode: material.alpha_mode,
            double_sided: material.double_sided,
        }
    }

    /// Pipeline slot: `is_blend * 2 + double_sided`.
    ///
    /// Opaque and masked materials share a pipeline; masking is done in the shader.
    pub const fn index(self) -> usize {
        (matches!(self.alpha_mode, AlphaMode::Blend) as usize) * 2 + self.double_sided as usize
    }
}

/// Options fixed when a [`GltfPbrRenderer`] is created.
#[derive(Debug, Clone)]
pub struct GltfPbrRendererCreateInfo {
    /// Compile pipelines in the background.
    pub enable_async_compilation: bool,
    /// Format of the colour target.
    pub color_format: TextureFormat,
    /// Format of the depth target.
    pub depth_format: TextureFormat,
    /// Depth is cleared to 0 and closer fragments have larger values.
    pub reversed_depth: bool,
    /// Sampler used for every material texture.
    pub sampler: SamplerDescriptor<'static>,
}

impl Default for GltfPbrRendererCreateInfo {
    fn default() -> Self {
        Self {
            enable_async_compilation: false,
            color_format: TextureFormat::Rgba16Float,
            depth_format: TextureFormat::Depth32Float,
            reversed_depth: false,
            sampler: SamplerDescriptor::LINEAR_WRAP,
        }
    }
}

/// Supplies shared material textures (atlases or arrays) to the renderer.
///
/// The renderer keeps one binding per pipeline and rebuilds it only when
/// [`texture_version`](ResourceCache::texture_version) changes.
pub trait ResourceCache {
    /// Monotonically increasing; bumped whenever a texture handed out changes.
    fn texture_version(&self) -> u64;

    /// The texture holding every material's `semantic` texture, if any.
    fn texture(&self, semantic: &str) -> Option<&Arc<GpuTexture>>;
}

/// One binding per material of a [`Model`], created by
/// [`GltfPbrRenderer::create_resource_bindings`].
#[derive(Debug)]
pub struct ModelResourceBindings {
    material_srbs: Vec<ShaderResourceBinding>,
    // Keeps the bound textures alive.
    _textures: Vec<Arc<GpuTexture>>,
}

impl ModelResourceBindings {
    /// Number of materials covered.
    pub fn material_count(&self) -> usize {
        self.material_srbs.len()
    }
}

/// Where material textures come from for one [`GltfPbrRenderer::render`] call.
pub enum PbrResourceBindings<'a> {
    /// One binding per material.
    Model(&'a mut ModelResourceBindings),
    /// Shared textures from a host cache.
    Cache(&'a dyn ResourceCache),
}

/// Inputs of [`GltfPbrRenderer::render`].
pub struct GltfPbrRenderAttributes<'a> {
    /// Encoder the scene pass is recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// Scene structure.
    pub model: &'a Model,
    /// Material textures.
    pub bindings: PbrResourceBindings<'a>,
    /// Scene to draw; the model's default scene (or 0) when `None`.
    pub scene: Option<usize>,
    /// Camera constants.
    pub camera: &'a Arc<GpuBuffer>,
    /// Packed vertices of the whole model, [`PBR_VERTEX_STRIDE`] bytes each.
    pub vertex_buffer: &'a Arc<GpuBuffer>,
    /// Packed 32-bit indices of the whole model.
    pub index_buffer: Option<&'a Arc<GpuBuffer>>,
    /// Colour target view.
    pub color_target: TextureViewId,
    /// Depth target view.
    pub depth_target: TextureViewId,
    /// What happens to the colour target when the pass begins.
    pub color_load: LoadOp<LinearRgba>,
    /// What happens to the depth target when the pass begins.
    pub depth_load: LoadOp<f32>,
}

/// Counters of the last [`GltfPbrRenderer::render`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PbrRenderStats {
    /// Draw calls recorded.
    pub draw_calls: u32,
    /// Pipeline binds.
    pub pipeline_switches: u32,
    /// Bind group binds.
    pub binding_switches: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PbrMaterialAttribs {
    base_color_factor: [f32; 4],
    emissive_factor: [f32; 3],
    alpha_cutoff: f32,
    metallic_factor: f32,
    roughness_factor: f32,
    normal_scale: f32,
    occlusion_strength: f32,
    alpha_mode: u32,
    base_color_texture: i32,
    normal_texture: i32,
    occlusion_texture: i32,
    metallic_roughness_texture: i32,
    emissive_texture: i32,
    _padding: [u32; 2],
}

impl PbrMaterialAttribs {
    fn new(material: &Material) -> Self {
        let slice = |semantic| material.texture(semantic).map_or(-1, |t| t.texture as i32);
        Self {
            base_color_factor: material.base_color_factor,
            emissive_factor: material.emissive_factor,
            alpha_cutoff: material.alpha_cutoff,
            metallic_factor: material.metallic_factor,
            roughness_factor: material.roughness_factor,
            normal_scale: material.normal_scale,
            occlusion_strength: material.occlusion_strength,
            alpha_mode: material.alpha_mode as u32,
            base_color_texture: slice(TEXTURE_SEMANTICS[0]),
            normal_texture: slice(TEXTURE_SEMANTICS[1]),
            occlusion_texture: slice(TEXTURE_SEMANTICS[2]),
            metallic_roughness_texture: slice(TEXTURE_SEMANTICS[3]),
            emissive_texture: slice(TEXTURE_SEMANTICS[4]),
            _padding: [0; 2],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PbrPrimitiveAttribs {
    world: Mat4,
    material: u32,
    _padding: [u32; 3],
}

#[derive(Debug, Clone, Copy)]
struct DrawItem {
    key: PbrPsoKey,
    primitive: Primitive,
    world: Mat4,
}

impl DrawItem {
    /// Opaque, then masked, then blended. Blended primitives keep scene order;
    /// the others are grouped by pipeline and material.
    fn sort_key(&self) -> (AlphaMode, usize, usize) {
        if self.key.alpha_mode == AlphaMode::Blend {
            (AlphaMode::Blend, 0, 0)
        } else {
            (self.key.alpha_mode, self.key.index(), self.primitive.material)
        }
    }
}

/// A storage buffer that grows on demand and skips identical uploads.
#[derive(Debug, Default)]
struct StreamingBuffer {
    buffer: Option<Arc<GpuBuffer>>,
    last_upload: Vec<u8>,
}

impl StreamingBuffer {
    fn upload(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        label: &str,
        bytes: &[u8],
    ) -> Result<&Arc<GpuBuffer>, RenderError> {
        let needed = (bytes.len() as u64).max(256);
        let buffer = match &self.buffer {
            Some(buffer) if buffer.size() >= needed => buffer.clone(),
            _ => {
                let buffer = GpuBuffer::create(
                    device,
                    &BufferDescriptor::storage(label, needed.next_power_of_two()),
                )?;
                log::debug!("{label} grown to {} bytes", buffer.size());
                self.last_upload.clear();
                self.buffer = Some(buffer.clone());
                buffer
            }
        };
        if self.last_upload != bytes {
            device.write_buffer(buffer.id(), 0, bytes)?;
            self.last_upload.clear();
            self.last_upload.extend_from_slice(bytes);
        }
        self.buffer
            .as_ref()
            .ok_or_else(|| RenderError::Internal(format!("{label} missing")))
    }
}

/// Forward renderer for glTF metallic-roughness materials.
#[derive(Debug)]
pub struct GltfPbrRenderer {
    create_info: GltfPbrRendererCreateInfo,
    device: Arc<dyn GraphicsDevice>,
    techniques: [RenderTechnique; PSO_COUNT],
    white_texture: Arc<GpuTexture>,
    normal_texture: Arc<GpuTexture>,
    materials: StreamingBuffer,
    primitives: StreamingBuffer,
    shared_srbs: [Option<ShaderResourceBinding>; PSO_COUNT],
    shared_version: Option<u64>,
}

impl GltfPbrRenderer {
    /// Creates the renderer and requests its four pipelines.
    pub fn new(
        device: &Arc<dyn GraphicsDevice>,
        create_info: GltfPbrRendererCreateInfo,
    ) -> Result<Self, RenderError> {
        let white_texture = solid_texture(device, "GltfPbr.WhiteTexture", [255, 255, 255, 255])?;
        let normal_texture = solid_texture(device, "GltfPbr.DefaultNormal", [128, 128, 255, 255])?;

        let mut renderer = Self {
            create_info,
            device: device.clone(),
            techniques: std::array::from_fn(|_| RenderTechnique::default()),
            white_texture,
            normal_texture,
            materials: StreamingBuffer::default(),
            primitives: StreamingBuffer::default(),
            shared_srbs: std::array::from_fn(|_| None),
            shared_version: None,
        };
        for alpha_mode in [AlphaMode::Opaque, AlphaMode::Blend] {
            for double_sided in [false, true] {
                renderer.initialize_pso(PbrPsoKey {
                    alpha_mode,
                    double_sided,
                });
            }
        }
        Ok(renderer)
    }

    fn initialize_pso(&mut self, key: PbrPsoKey) {
        let blend = key.alpha_mode == AlphaMode::Blend;
        let info = &self.create_info;

        let mut macros = ShaderMacros::new();
        macros
            .add_flag("GLTF_PBR_OPTION_BLEND", blend)
            .add_flag("GLTF_PBR_OPTION_DOUBLE_SIDED", key.double_sided)
            .add_flag("GLTF_PBR_OPTION_REVERSED_DEPTH", info.reversed_depth);

        let mut layout = PipelineResourceLayout::new()
            .add_variable(
                ShaderStageFlags::VERTEX_FRAGMENT,
                "cbCameraAttribs",
                ShaderResourceKind::ConstantBuffer,
                ShaderVariableType::Mutable,
            )
            .add_variable(
                ShaderStageFlags::VERTEX,
                "g_PrimitiveAttribs",
                ShaderResourceKind::StructuredBuffer,
                ShaderVariableType::Mutable,
            )
            .add_variable(
                ShaderStageFlags::VERTEX_FRAGMENT,
                "g_MaterialAttribs",
                ShaderResourceKind::StructuredBuffer,
                ShaderVariableType::Mutable,
            );
        for semantic in TEXTURE_SEMANTICS {
            layout = layout.add_variable(
                ShaderStageFlags::FRAGMENT,
                semantic,
                ShaderResourceKind::Texture,
                ShaderVariableType::Mutable,
            );
        }
        let layout = layout.add_immutable_sampler(
            ShaderStageFlags::FRAGMENT,
            "g_MaterialSampler",
            info.sampler.clone(),
        );

        let attributes = [
            VertexAttributeDescriptor {
                shader_location: 0,
                format: VertexFormat::Float32x3,
                offset: 0,
            },
            VertexAttributeDescriptor {
                shader_location: 1,
                format: VertexFormat::Float32x3,
                offset: 12,
            },
            VertexAttributeDescriptor {
                shader_location: 2,
                format: VertexFormat::Float32x2,
                offset: 24,
            },
        ];
        let vertex_buffers = [VertexBufferLayoutDescriptor {
            array_stride: PBR_VERTEX_STRIDE,
            step_mode: VertexStepMode::Vertex,
            attributes: Cow::Borrowed(&attributes),
        }];

        let compare = if info.reversed_depth {
            CompareFunction::Greater
        } else {
            CompareFunction::Less
        };
        let mut depth_stencil = DepthStencilStateDescriptor::depth_test(info.depth_format, compare);
        depth_stencil.depth_write_enabled = !blend;

        let name = format!(
            "GltfPbr.{:?}{}",
            key.alpha_mode,
            if key.double_sided { ".DoubleSided" } else { "" }
        );
        let pso = PsoCreateInfo {
            name: &name,
            vertex_shader: ShaderStageInfo {
                file: PBR_SHADER,
                entry_point: "GLTF_PBR_VS",
                macros: &macros,
            },
            pixel_shader: ShaderStageInfo {
                file: PBR_SHADER,
                entry_point: "GLTF_PBR_PS",
                macros: &macros,
            },
            resource_layout: &layout,
            color_formats: std::slice::from_ref(&info.color_format),
            depth_stencil: Some(depth_stencil),
            blend: blend.then_some(BlendStateDescriptor::ALPHA_BLENDING),
            vertex_buffers: &vertex_buffers,
            primitive: PrimitiveStateDescriptor {
                cull_mode: (!key.double_sided).then_some(CullMode::Back),
                ..Default::default()
            },
            flags: if info.enable_async_compilation {
                PipelineCreateFlags::ASYNCHRONOUS
            } else {
                PipelineCreateFlags::EMPTY
            },
        };
        self.techniques[key.index()].initialize_pso(&self.device, &pso);
    }

    /// Whether every pipeline finished compiling.
    pub fn is_ready(&mut self) -> bool {
        self.techniques
            .iter_mut()
            .fold(true, |ready, t| t.is_ready() && ready)
    }

    /// Creates one binding per material of `model`.
    ///
    /// `textures` is indexed like the document's textures; `None` entries and
    /// missing semantics fall back to neutral 1x1 textures.
    pub fn create_resource_bindings(
        &self,
        model: &Model,
        textures: &[Option<Arc<GpuTexture>>],
    ) -> Result<ModelResourceBindings, RenderError> {
        let mut material_srbs = Vec::with_capacity(model.materials.len());
        let mut kept = Vec::new();
        for (index, material) in model.materials.iter().enumerate() {
            let technique = &self.techniques[PbrPsoKey::from_material(material).index()];
            let mut srb = technique.create_shader_resource_binding(false).ok_or_else(|| {
                RenderError::RenderingFailed(format!(
                    "pipeline of material {index} has no resource layout"
                ))
            })?;
            for semantic in TEXTURE_SEMANTICS {
                let texture = match material.texture(semantic) {
                    Some(reference) => match textures.get(reference.texture) {
                        Some(Some(texture)) => texture.clone(),
                        Some(None) => self.default_texture(semantic).clone(),
                        None => {
                            return Err(RenderError::invalid_input(format!(
                                "material {index} {semantic} references texture {} of {}",
                                reference.texture,
                                textures.len()
                            )))
                        }
                    },
                    None => self.default_texture(semantic).clone(),
                };
                srb.set(semantic, texture.srv());
                kept.push(texture);
            }
            material_srbs.push(srb);
        }
        Ok(ModelResourceBindings {
            material_srbs,
            _textures: kept,
        })
    }

    fn default_texture(&self, semantic: &str) -> &Arc<GpuTexture> {
        if semantic == TEXTURE_SEMANTICS[1] {
            &self.normal_texture
        } else {
            &self.white_texture
        }
    }

    /// Draws one scene of `attribs.model` in a single render pass.
    ///
    /// Primitives are drawn opaque first, then masked, then blended. Blended
    /// primitives are not depth sorted. Nothing is recorded while pipelines compile.
    pub fn render(
        &mut self,
        mut attribs: GltfPbrRenderAttributes<'_>,
    ) -> Result<PbrRenderStats, RenderError> {
        let model = attribs.model;
        let scene = attribs.scene.or(model.default_scene).unwrap_or(0);

        let mut draws = Vec::new();
        let mut bad_material = None;
        model
            .visit_scene(scene, |_, mesh, world| {
                for primitive in &mesh.primitives {
                    match model.materials.get(primitive.material) {
                        Some(material) => draws.push(DrawItem {
                            key: PbrPsoKey::from_material(material),
                            primitive: *primitive,
                            world,
                        }),
                        None => bad_material = Some(primitive.material),
                    }
                }
            })
            .ok_or_else(|| {
                RenderError::invalid_input(format!(
                    "scene {scene} out of range ({} scenes)",
                    model.scenes.len()
                ))
            })?;
        if let Some(material) = bad_material {
            return Err(RenderError::invalid_input(format!(
                "material {material} out of range ({} materials)",
                model.materials.len()
            )));
        }
        if let PbrResourceBindings::Model(bindings) = &attribs.bindings {
            if bindings.material_count() != model.materials.len() {
                return Err(RenderError::invalid_input(format!(
                    "bindings cover {} materials, the model has {}",
                    bindings.material_count(),
                    model.materials.len()
                )));
            }
        }
        if attribs.index_buffer.is_none() && draws.iter().any(|d| d.primitive.is_indexed()) {
            return Err(RenderError::invalid_input("indexed primitives need an index buffer"));
        }
        if attribs.vertex_buffer.size() < u64::from(model.vertex_count) * PBR_VERTEX_STRIDE {
            return Err(RenderError::invalid_input(format!(
                "vertex buffer holds {} bytes, the model needs {}",
                attribs.vertex_buffer.size(),
                u64::from(model.vertex_count) * PBR_VERTEX_STRIDE
            )));
        }

        let mut used = [false; PSO_COUNT];
        for draw in &draws {
            used[draw.key.index()] = true;
        }
        let mut pipelines = [None; PSO_COUNT];
        for (index, technique) in self.techniques.iter_mut().enumerate() {
            if used[index] {
                if !technique.is_ready() {
                    log::debug!("glTF PBR pipelines not ready, skipping the scene");
                    return Ok(PbrRenderStats::default());
                }
                pipelines[index] = technique.pipeline();
            }
        }

        draws.sort_by_key(DrawItem::sort_key);

        let material_attribs: Vec<_> = model.materials.iter().map(PbrMaterialAttribs::new).collect();
        let primitive_attribs: Vec<_> = draws
            .iter()
            .map(|d| PbrPrimitiveAttribs {
                world: d.world,
                material: d.primitive.material as u32,
                _padding: [0; 3],
            })
            .collect();
        let material_buffer = self
            .materials
            .upload(&self.device, "GltfPbr.Materials", bytemuck::cast_slice(&material_attribs))?
            .id();
        let primitive_buffer = self
            .primitives
            .upload(&self.device, "GltfPbr.Primitives", bytemuck::cast_slice(&primitive_attribs))?
            .id();
        let camera = attribs.camera.id();

        // Commit every binding the draws need before recording anything.
        let mut groups: Vec<Option<BindGroupId>> = Vec::new();
        match attribs.bindings {
            PbrResourceBindings::Model(ref mut bindings) => {
                groups.resize(bindings.material_srbs.len(), None);
                for draw in &draws {
                    let material = draw.primitive.material;
                    if groups[material].is_none() {
                        let srb = &mut bindings.material_srbs[material];
                        srb.set("cbCameraAttribs", camera);
                        srb.set("g_PrimitiveAttribs", primitive_buffer);
                        srb.set("g_MaterialAttribs", material_buffer);
                        groups[material] = Some(srb.commit()?);
                    }
                }
            }
            PbrResourceBindings::Cache(cache) => {
                let version = cache.texture_version();
                if self.shared_version != Some(version) {
                    log::debug!("glTF PBR texture version {version}, rebuilding shared bindings");
                    self.shared_srbs = std::array::from_fn(|_| None);
                    self.shared_version = Some(version);
                }
                groups.resize(PSO_COUNT, None);
                for index in (0..PSO_COUNT).filter(|&i| used[i]) {
                    if self.shared_srbs[index].is_none() {
                        let mut srb = self.techniques[index]
                            .create_shader_resource_binding(false)
                            .ok_or_else(|| {
                                RenderError::RenderingFailed("PBR pipeline has no layout".to_string())
                            })?;
                        for semantic in TEXTURE_SEMANTICS {
                            let texture = cache
                                .texture(semantic)
                                .unwrap_or_else(|| self.default_texture(semantic));
                            srb.set(semantic, texture.srv());
                        }
                        self.shared_srbs[index] = Some(srb);
                    }
                    if let Some(srb) = self.shared_srbs[index].as_mut() {
                        srb.set("cbCameraAttribs", camera);
                        srb.set("g_PrimitiveAttribs", primitive_buffer);
                        srb.set("g_MaterialAttribs", material_buffer);
                        groups[index] = Some(srb.commit()?);
                    }
                }
            }
        }
        let per_material = matches!(attribs.bindings, PbrResourceBindings::Model(_));

        let color_attachments = [RenderPassColorAttachment {
            view: attribs.color_target,
            resolve_target: None,
            ops: Operations {
                load: attribs.color_load,
                store: StoreOp::Store,
            },
        }];
        let mut pass = attribs.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("GltfPbr.Scene"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: attribs.depth_target,
                depth_ops: Some(Operations {
                    load: attribs.depth_load,
                    store: StoreOp::Store,
                }),
                stencil_ops: None,
            }),
        });
        pass.set_vertex_buffer(0, attribs.vertex_buffer.id(), 0);
        if let Some(index_buffer) = attribs.index_buffer {
            pass.set_index_buffer(index_buffer.id(), 0, IndexFormat::Uint32);
        }

        let mut stats = PbrRenderStats::default();
        let mut current_pso = None;
        let mut current_group = None;
        for (instance, draw) in (0u32..).zip(&draws) {
            let pso = draw.key.index();
            if current_pso != Some(pso) {
                let pipeline: RenderPipelineId = pipelines[pso]
                    .ok_or_else(|| RenderError::Internal(format!("PBR pipeline {pso} missing")))?;
                pass.set_pipeline(pipeline);
                current_pso = Some(pso);
                stats.pipeline_switches += 1;
            }
            let group_index = if per_material { draw.primitive.material } else { pso };
            let group = groups
                .get(group_index)
                .copied()
                .flatten()
                .ok_or_else(|| RenderError::Internal(format!("binding {group_index} missing")))?;
            if current_group != Some(group) {
                pass.set_bind_group(0, group, &[]);
                current_group = Some(group);
                stats.binding_switches += 1;
            }

            let p = &draw.primitive;
            if p.is_indexed() {
                pass.draw_indexed(
                    p.first_index..p.first_index + p.index_count,
                    p.first_vertex as i32,
                    instance..instance + 1,
                );
            } else {
                pass.draw(p.first_vertex..p.first_vertex + p.vertex_count, instance..instance + 1);
            }
            stats.draw_calls += 1;
        }
        Ok(stats)
    }
}

fn solid_texture(
    device: &Arc<dyn GraphicsDevice>,
    label: &str,
    texel: [u8; 4],
) -> Result<Arc<GpuTexture>, RenderError> {
    let extent = Extent2D::new(1, 1);
    let format = TextureFormat::Rgba8Unorm;
    let texture = GpuTexture::create(
        device,
        &TextureDescriptor {
            label: Some(Cow::Borrowed(label)),
            size: Extent3D::from_2d(extent),
            mip_level_count: 1,
            sample_count: SampleCount::X1,
            dimension: TextureDimension::D2,
            format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        },
    )?;
    device.write_texture(
        texture.id(),
        &texel,
        Some(format.bytes_per_pixel()),
        Origin3D::ZERO,
        Extent3D::from_2d(extent),
    )?;
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pso_index_is_injective() {
        let mut seen = [false; PSO_COUNT];
        for alpha_mode in [AlphaMode::Opaque, AlphaMode::Blend] {
            for double_sided in [false, true] {
                let index = PbrPsoKey {
                    alpha_mode,
                    double_sided,
                }
                .index();
                assert!(!seen[index]);
                seen[index] = true;
            }
        }
        assert_eq!(
            PbrPsoKey {
                alpha_mode: AlphaMode::Mask,
                double_sided: true
            }
            .index(),
            1
        );
    }

    #[test]
    fn gpu_structs_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<PbrMaterialAttribs>() % 16, 0);
        assert_eq!(std::mem::size_of::<PbrPrimitiveAttribs>() % 16, 0);
    }

    #[test]
    fn blended_draws_keep_scene_order() {
        let item = |alpha_mode, material| DrawItem {
            key: PbrPsoKey {
                alpha_mode,
                double_sided: false,
            },
            primitive: Primitive {
                first_vertex: 0,
                vertex_count: 3,
                first_index: 0,
                index_count: 0,
                material,
            },
            world: Mat4::IDENTITY,
        };
        let mut draws = vec![
            item(AlphaMode::Blend, 4),
            item(AlphaMode::Opaque, 2),
            item(AlphaMode::Blend, 1),
            item(AlphaMode::Mask, 0),
            item(AlphaMode::Opaque, 1),
        ];
        draws.sort_by_key(DrawItem::sort_key);
        let order: Vec<_> = draws
            .iter()
            .map(|d| (d.key.alpha_mode, d.primitive.material))
            .collect();
        assert_eq!(
            order,
            [
                (AlphaMode::Opaque, 1),
                (AlphaMode::Opaque, 2),
                (AlphaMode::Mask, 0),
                (AlphaMode::Blend, 4),
                (AlphaMode::Blend, 1),
            ]
        );
    }
}
