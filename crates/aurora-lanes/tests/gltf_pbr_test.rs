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

mod common;

use aurora_core::math::{Extent2D, LinearRgba};
use aurora_core::renderer::api::{
    BindGroupId, BindingResource, BufferDescriptor, BufferUsage, GpuBuffer, GpuTexture,
    IndexFormat, LoadOp, PipelineStatus, TextureFormat,
};
use aurora_core::renderer::RenderError;
use aurora_lanes::gltf_pbr::{
    GltfPbrRenderAttributes, GltfPbrRenderer, GltfPbrRendererCreateInfo, Material, Model,
    ModelResourceBindings, PbrRenderStats, PbrResourceBindings, ResourceCache, BASE_COLOR_TEXTURE,
    PBR_VERTEX_STRIDE,
};
use common::{render_target, uniform_buffer, Command, MockDevice, MockEncoder};
use std::borrow::Cow;
use std::sync::Arc;

// Five primitives in scene order: glass (blend), stone (opaque), leaves
// (masked, double sided), tinted glass (blend), stone again.
const GARDEN: &str = r#"{
    "asset": { "version": "2.0" },
    "buffers": [ { "byteLength": 96 } ],
    "bufferViews": [
        { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
        { "buffer": 0, "byteOffset": 36, "byteLength": 48 },
        { "buffer": 0, "byteOffset": 84, "byteLength": 12 }
    ],
    "accessors": [
        { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
          "min": [0, 0, 0], "max": [1, 1, 0] },
        { "bufferView": 1, "componentType": 5126, "count": 4, "type": "VEC3",
          "min": [0, 0, 0], "max": [1, 1, 0] },
        { "bufferView": 2, "componentType": 5125, "count": 3, "type": "SCALAR" }
    ],
    "images": [ { "uri": "stone.png" } ],
    "textures": [ { "source": 0 } ],
    "materials": [
        { "name": "glass", "alphaMode": "BLEND" },
        { "name": "stone", "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } },
        { "name": "leaves", "alphaMode": "MASK", "doubleSided": true },
        { "name": "tinted glass", "alphaMode": "BLEND" }
    ],
    "meshes": [
        { "primitives": [
            { "attributes": { "POSITION": 0 }, "indices": 2, "material": 0 },
            { "attributes": { "POSITION": 1 }, "material": 1 },
            { "attributes": { "POSITION": 0 }, "material": 2 },
            { "attributes": { "POSITION": 1 }, "material": 3 },
            { "attributes": { "POSITION": 0 }, "material": 1 }
        ] }
    ],
    "nodes": [ { "mesh": 0 } ],
    "scenes": [ { "nodes": [0] }, { "nodes": [] } ],
    "scene": 0
}"#;

struct Fixture {
    device: Arc<MockDevice>,
    encoder: MockEncoder,
    model: Model,
    renderer: GltfPbrRenderer,
    camera: Arc<GpuBuffer>,
    vertices: Arc<GpuBuffer>,
    indices: Arc<GpuBuffer>,
    color: Arc<GpuTexture>,
    depth: Arc<GpuTexture>,
}

impl Fixture {
    fn new(device: Arc<MockDevice>, create_info: GltfPbrRendererCreateInfo) -> Self {
        let model = Model::from_slice(GARDEN.as_bytes()).unwrap();
        let renderer = GltfPbrRenderer::new(&device.handle(), create_info).unwrap();
        let vertices = vertex_buffer(&device, u64::from(model.vertex_count) * PBR_VERTEX_STRIDE);
        let indices = GpuBuffer::create(
            &device.handle(),
            &BufferDescriptor {
                label: Some(Cow::Borrowed("Indices")),
                size: u64::from(model.index_count) * 4,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            },
        )
        .unwrap();
        let extent = Extent2D::new(64, 32);
        Self {
            camera: uniform_buffer(&device, "Camera", 256),
            color: render_target(&device, "SceneColor", extent, TextureFormat::Rgba16Float),
            depth: render_target(&device, "SceneDepth", extent, TextureFormat::Depth32Float),
            encoder: MockEncoder::new(),
            device,
            model,
            renderer,
            vertices,
            indices,
        }
    }

    fn render(
        &mut self,
        bindings: PbrResourceBindings<'_>,
        scene: Option<usize>,
    ) -> Result<PbrRenderStats, RenderError> {
        let model = self.model.clone();
        self.render_model(&model, bindings, scene)
    }

    fn render_model(
        &mut self,
        model: &Model,
        bindings: PbrResourceBindings<'_>,
        scene: Option<usize>,
    ) -> Result<PbrRenderStats, RenderError> {
        self.encoder.clear();
        self.renderer.render(GltfPbrRenderAttributes {
            encoder: &mut self.encoder,
            model,
            bindings,
            scene,
            camera: &self.camera,
            vertex_buffer: &self.vertices,
            index_buffer: Some(&self.indices),
            color_target: self.color.rtv().unwrap(),
            depth_target: self.depth.dsv().unwrap(),
            color_load: LoadOp::Clear(LinearRgba::BLACK),
            depth_load: LoadOp::Clear(1.0),
        })
    }

    fn model_bindings(&self) -> ModelResourceBindings {
        self.renderer
            .create_resource_bindings(&self.model, &[None])
            .unwrap()
    }

    fn bound_groups(&self) -> Vec<BindGroupId> {
        self.encoder
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::SetBindGroup(group) => Some(*group),
                _ => None,
            })
            .collect()
    }

    fn bound_pipelines(&self) -> Vec<String> {
        self.encoder
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::SetPipeline(pipeline) => self.device.pipeline_label(*pipeline),
                _ => None,
            })
            .collect()
    }
}

fn vertex_buffer(device: &Arc<MockDevice>, size: u64) -> Arc<GpuBuffer> {
    GpuBuffer::create(
        &device.handle(),
        &BufferDescriptor {
            label: Some(Cow::Borrowed("Vertices")),
            size,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        },
    )
    .unwrap()
}

struct SharedTextures {
    version: u64,
    albedo: Arc<GpuTexture>,
}

impl ResourceCache for SharedTextures {
    fn texture_version(&self) -> u64 {
        self.version
    }

    fn texture(&self, semantic: &str) -> Option<&Arc<GpuTexture>> {
        (semantic == BASE_COLOR_TEXTURE).then_some(&self.albedo)
    }
}

#[test]
fn renderer_requests_four_pipeline_variants() {
    let device = MockDevice::new();
    let _fixture = Fixture::new(device.clone(), Default::default());

    assert_eq!(
        device.pipeline_labels(),
        [
            "GltfPbr.Blend",
            "GltfPbr.Blend.DoubleSided",
            "GltfPbr.Opaque",
            "GltfPbr.Opaque.DoubleSided"
        ]
    );
    let blend = device
        .shaders()
        .into_iter()
        .filter(|s| s.macro_value("GLTF_PBR_OPTION_BLEND") == Some("1"))
        .count();
    // Vertex and pixel stage of the two blend variants.
    assert_eq!(blend, 4);
    assert_eq!(device.textures_labelled("GltfPbr.WhiteTexture").len(), 1);
    assert_eq!(device.texture_writes(), 2);
}

#[test]
fn draws_opaque_then_masked_then_blended_in_scene_order() {
    let mut fixture = Fixture::new(MockDevice::new(), Default::default());
    let mut bindings = fixture.model_bindings();
    let stats = fixture
        .render(PbrResourceBindings::Model(&mut bindings), None)
        .unwrap();

    assert_eq!(fixture.encoder.pass_labels(), ["GltfPbr.Scene"]);
    let draws: Vec<_> = fixture
        .encoder
        .commands
        .iter()
        .filter(|c| matches!(c, Command::Draw { .. } | Command::DrawIndexed { .. }))
        .cloned()
        .collect();
    assert_eq!(
        draws,
        [
            Command::Draw {
                vertices: 3..7,
                instances: 0..1
            },
            Command::Draw {
                vertices: 14..17,
                instances: 1..2
            },
            Command::Draw {
                vertices: 7..10,
                instances: 2..3
            },
            Command::DrawIndexed {
                indices: 0..3,
                base_vertex: 0,
                instances: 3..4
            },
            Command::Draw {
                vertices: 10..14,
                instances: 4..5
            },
        ]
    );
    assert_eq!(
        fixture.bound_pipelines(),
        ["GltfPbr.Opaque", "GltfPbr.Opaque.DoubleSided", "GltfPbr.Blend"]
    );
    assert_eq!(
        stats,
        PbrRenderStats {
            draw_calls: 5,
            pipeline_switches: 3,
            binding_switches: 4,
        }
    );
}

#[test]
fn vertex_and_index_buffers_are_bound_once() {
    let mut fixture = Fixture::new(MockDevice::new(), Default::default());
    let mut bindings = fixture.model_bindings();
    fixture
        .render(PbrResourceBindings::Model(&mut bindings), None)
        .unwrap();

    let vertices = fixture.vertices.id();
    let indices = fixture.indices.id();
    let buffers: Vec<_> = fixture
        .encoder
        .commands
        .iter()
        .filter(|c| matches!(c, Command::SetVertexBuffer(_) | Command::SetIndexBuffer(..)))
        .cloned()
        .collect();
    assert_eq!(
        buffers,
        [
            Command::SetVertexBuffer(vertices),
            Command::SetIndexBuffer(indices, IndexFormat::Uint32),
        ]
    );
}

#[test]
fn material_textures_fall_back_to_neutral_defaults() {
    let mut fixture = Fixture::new(MockDevice::new(), Default::default());
    let albedo = render_target(
        &fixture.device,
        "StoneAlbedo",
        Extent2D::new(4, 4),
        TextureFormat::Rgba8Unorm,
    );
    let mut bindings = fixture
        .renderer
        .create_resource_bindings(&fixture.model, &[Some(albedo.clone())])
        .unwrap();
    assert_eq!(bindings.material_count(), 4);
    fixture
        .render(PbrResourceBindings::Model(&mut bindings), None)
        .unwrap();

    // The first draw is the stone material.
    let stone = fixture.bound_groups()[0];
    let uses_albedo = |group| {
        fixture
            .device
            .bind_group_entries(group)
            .iter()
            .any(|e| e.resource == BindingResource::TextureView(albedo.srv()))
    };
    assert!(uses_albedo(stone));
    assert!(!fixture.bound_groups()[1..].iter().any(|g| uses_albedo(*g)));
}

#[test]
fn texture_index_out_of_range_is_rejected() {
    let fixture = Fixture::new(MockDevice::new(), Default::default());
    let result = fixture.renderer.create_resource_bindings(&fixture.model, &[]);
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));
}

#[test]
fn shared_cache_binds_once_per_pipeline() {
    let mut fixture = Fixture::new(MockDevice::new(), Default::default());
    let mut cache = SharedTextures {
        version: 1,
        albedo: render_target(
            &fixture.device,
            "Atlas",
            Extent2D::new(4, 4),
            TextureFormat::Rgba8Unorm,
        ),
    };

    let stats = fixture.render(PbrResourceBindings::Cache(&cache), None).unwrap();
    assert_eq!(stats.binding_switches, 3);
    let first = fixture.bound_groups();

    fixture.render(PbrResourceBindings::Cache(&cache), None).unwrap();
    assert_eq!(fixture.bound_groups(), first);

    cache.version = 2;
    fixture.render(PbrResourceBindings::Cache(&cache), None).unwrap();
    let rebuilt = fixture.bound_groups();
    assert_eq!(rebuilt.len(), first.len());
    assert!(rebuilt.iter().all(|g| !first.contains(g)));
}

#[test]
fn identical_frames_skip_the_attribute_uploads() {
    let mut fixture = Fixture::new(MockDevice::new(), Default::default());
    let mut bindings = fixture.model_bindings();
    fixture
        .render(PbrResourceBindings::Model(&mut bindings), None)
        .unwrap();
    fixture
        .render(PbrResourceBindings::Model(&mut bindings), None)
        .unwrap();

    let materials = fixture.device.buffer_labelled("GltfPbr.Materials").unwrap();
    let primitives = fixture.device.buffer_labelled("GltfPbr.Primitives").unwrap();
    assert_eq!(fixture.device.buffer_writes(materials), 1);
    assert_eq!(fixture.device.buffer_writes(primitives), 1);
}

#[test]
fn empty_scene_records_a_pass_without_draws() {
    let mut fixture = Fixture::new(MockDevice::new(), Default::default());
    let mut bindings = fixture.model_bindings();
    let stats = fixture
        .render(PbrResourceBindings::Model(&mut bindings), Some(1))
        .unwrap();
    assert_eq!(stats, PbrRenderStats::default());
    assert_eq!(fixture.encoder.pass_labels(), ["GltfPbr.Scene"]);
    assert_eq!(fixture.encoder.draw_count(), 0);
}

#[test]
fn invalid_inputs_are_rejected_before_recording() {
    let mut fixture = Fixture::new(MockDevice::new(), Default::default());
    let mut bindings = fixture.model_bindings();

    let result = fixture.render(PbrResourceBindings::Model(&mut bindings), Some(5));
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));

    let mut bigger = fixture.model.clone();
    bigger.materials.push(Material::default());
    let result = fixture.render_model(&bigger, PbrResourceBindings::Model(&mut bindings), None);
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));

    let mut broken = fixture.model.clone();
    broken.meshes[0].primitives[0].material = 9;
    let result = fixture.render_model(&broken, PbrResourceBindings::Model(&mut bindings), None);
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));

    fixture.vertices = vertex_buffer(&fixture.device, PBR_VERTEX_STRIDE);
    let result = fixture.render(PbrResourceBindings::Model(&mut bindings), None);
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));

    assert!(fixture.encoder.commands.is_empty());
}

#[test]
fn indexed_primitives_need_an_index_buffer() {
    let mut fixture = Fixture::new(MockDevice::new(), Default::default());
    let mut bindings = fixture.model_bindings();
    let result = fixture.renderer.render(GltfPbrRenderAttributes {
        encoder: &mut fixture.encoder,
        model: &fixture.model,
        bindings: PbrResourceBindings::Model(&mut bindings),
        scene: None,
        camera: &fixture.camera,
        vertex_buffer: &fixture.vertices,
        index_buffer: None,
        color_target: fixture.color.rtv().unwrap(),
        depth_target: fixture.depth.dsv().unwrap(),
        color_load: LoadOp::Load,
        depth_load: LoadOp::Load,
    });
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));
}

#[test]
fn nothing_is_drawn_while_pipelines_compile() {
    let device = MockDevice::new();
    device.set_async_status(PipelineStatus::Pending);
    let mut fixture = Fixture::new(
        device.clone(),
        GltfPbrRendererCreateInfo {
            enable_async_compilation: true,
            ..Default::default()
        },
    );
    let mut bindings = fixture.model_bindings();

    assert!(!fixture.renderer.is_ready());
    let stats = fixture
        .render(PbrResourceBindings::Model(&mut bindings), None)
        .unwrap();
    assert_eq!(stats, PbrRenderStats::default());
    assert!(fixture.encoder.commands.is_empty());

    device.finish_pending_pipelines(PipelineStatus::Ready);
    assert!(fixture.renderer.is_ready());
    let stats = fixture
        .render(PbrResourceBindings::Model(&mut bindings), None)
        .unwrap();
    assert_eq!(stats.draw_calls, 5);
}

#[test]
fn failed_shader_leaves_the_renderer_idle() {
    let device = MockDevice::new();
    device.fail_shader("GLTF_PBR.fx");
    let mut fixture = Fixture::new(device.clone(), Default::default());

    assert!(!fixture.renderer.is_ready());
    assert_eq!(device.pipelines_created(), 0);
    let result = fixture.renderer.create_resource_bindings(&fixture.model, &[None]);
    assert!(matches!(result, Err(RenderError::RenderingFailed(_))));

    let cache = SharedTextures {
        version: 1,
        albedo: render_target(&device, "Atlas", Extent2D::new(4, 4), TextureFormat::Rgba8Unorm),
    };
    let stats = fixture.render(PbrResourceBindings::Cache(&cache), None).unwrap();
    assert_eq!(stats, PbrRenderStats::default());
    assert!(fixture.encoder.commands.is_empty());
}

#[test]
fn reversed_depth_is_forwarded_to_the_shaders() {
    let device = MockDevice::new();
    let _fixture = Fixture::new(
        device.clone(),
        GltfPbrRendererCreateInfo {
            reversed_depth: true,
            ..Default::default()
        },
    );
    assert!(device
        .shaders()
        .iter()
        .all(|s| s.macro_value("GLTF_PBR_OPTION_REVERSED_DEPTH") == Some("1")));
}
