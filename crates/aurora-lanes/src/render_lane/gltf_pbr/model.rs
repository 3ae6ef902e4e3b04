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

//! Read-only scene description imported from a glTF document.
//!
//! Only the structure is imported: materials, meshes, the node hierarchy and
//! scenes. Vertex and image data are uploaded by the host, packed in the order
//! [`Primitive::first_vertex`] and [`Primitive::first_index`] describe.

use anyhow::{bail, Context};
use aurora_core::math::Mat4;

/// Semantic name of the base colour texture.
pub const BASE_COLOR_TEXTURE: &str = "baseColorTexture";
/// Semantic name of the tangent-space normal map.
pub const NORMAL_TEXTURE: &str = "normalTexture";
/// Semantic name of the ambient occlusion texture.
pub const OCCLUSION_TEXTURE: &str = "occlusionTexture";
/// Semantic name of the metallic (b) / roughness (g) texture.
pub const METALLIC_ROUGHNESS_TEXTURE: &str = "metallicRoughnessTexture";
/// Semantic name of the emissive texture.
pub const EMISSIVE_TEXTURE: &str = "emissiveTexture";

/// Every texture semantic, in binding order.
pub const TEXTURE_SEMANTICS: [&str; 5] = [
    BASE_COLOR_TEXTURE,
    NORMAL_TEXTURE,
    OCCLUSION_TEXTURE,
    METALLIC_ROUGHNESS_TEXTURE,
    EMISSIVE_TEXTURE,
];

/// How a material's alpha is interpreted. Also the draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AlphaMode {
    /// Alpha is ignored.
    #[default]
    Opaque,
    /// Fragments below the alpha cutoff are discarded.
    Mask,
    /// Alpha-blended over what is behind.
    Blend,
}

impl From<gltf::material::AlphaMode> for AlphaMode {
    fn from(mode: gltf::material::AlphaMode) -> Self {
        match mode {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        }
    }
}

/// A texture referenced by a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRef {
    /// Index into the document's textures.
    pub texture: usize,
    /// Texture coordinate set.
    pub tex_coord: u32,
}

/// A metallic-roughness PBR material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Name from the document, if any.
    pub name: Option<String>,
    /// Alpha interpretation.
    pub alpha_mode: AlphaMode,
    /// Cutoff used by [`AlphaMode::Mask`].
    pub alpha_cutoff: f32,
    /// Back faces are rendered too.
    pub double_sided: bool,
    /// Linear base colour multiplier.
    pub base_color_factor: [f32; 4],
    /// Linear emissive multiplier.
    pub emissive_factor: [f32; 3],
    /// Metalness multiplier.
    pub metallic_factor: f32,
    /// Roughness multiplier.
    pub roughness_factor: f32,
    /// Scale of the normal map.
    pub normal_scale: f32,
    /// Strength of the occlusion map.
    pub occlusion_strength: f32,
    textures: Vec<(&'static str, TextureRef)>,
}

impl Default for Material {
    /// The glTF default material.
    fn default() -> Self {
        Self {
            name: None,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_factor: [1.0; 4],
            emissive_factor: [0.0; 3],
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            textures: Vec::new(),
        }
    }
}

impl Material {
    fn import(material: &gltf::Material<'_>) -> Self {
        let pbr = material.pbr_metallic_roughness();
        let info = |info: Option<gltf::texture::Info<'_>>| {
            info.map(|i| TextureRef {
                texture: i.texture().index(),
                tex_coord: i.tex_coord(),
            })
        };
        let normal = material.normal_texture();
        let occlusion = material.occlusion_texture();

        let mut textures = Vec::new();
        let candidates = [
            (BASE_COLOR_TEXTURE, info(pbr.base_color_texture())),
            (
                NORMAL_TEXTURE,
                normal.as_ref().map(|n| TextureRef {
                    texture: n.texture().index(),
                    tex_coord: n.tex_coord(),
                }),
            ),
            (
                OCCLUSION_TEXTURE,
                occlusion.as_ref().map(|o| TextureRef {
                    texture: o.texture().index(),
                    tex_coord: o.tex_coord(),
                }),
            ),
            (METALLIC_ROUGHNESS_TEXTURE, info(pbr.metallic_roughness_texture())),
            (EMISSIVE_TEXTURE, info(material.emissive_texture())),
        ];
        for (semantic, texture) in candidates {
            if let Some(texture) = texture {
                textures.push((semantic, texture));
            }
        }

        Self {
            name: material.name().map(str::to_owned),
            alpha_mode: material.alpha_mode().into(),
            alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
            double_sided: material.double_sided(),
            base_color_factor: pbr.base_color_factor(),
            emissive_factor: material.emissive_factor(),
            metallic_factor: pbr.metallic_factor(),
            roughness_factor: pbr.roughness_factor(),
            normal_scale: normal.as_ref().map_or(1.0, |n| n.scale()),
            occlusion_strength: occlusion.as_ref().map_or(1.0, |o| o.strength()),
            textures,
        }
    }

    /// The texture bound to `semantic` (one of the `*_TEXTURE` names), if any.
    pub fn texture(&self, semantic: &str) -> Option<TextureRef> {
        self.textures
            .iter()
            .find(|(name, _)| *name == semantic)
            .map(|&(_, texture)| texture)
    }

    /// Every texture of the material with its semantic.
    pub fn textures(&self) -> impl Iterator<Item = (&'static str, TextureRef)> + '_ {
        self.textures.iter().copied()
    }
}

/// A draw range of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    /// First vertex in the model's packed vertex buffer.
    pub first_vertex: u32,
    /// Number of vertices.
    pub vertex_count: u32,
    /// First index in the model's packed index buffer.
    pub first_index: u32,
    /// Number of indices, `0` for non-indexed primitives.
    pub index_count: u32,
    /// Index into [`Model::materials`].
    pub material: usize,
}

impl Primitive {
    /// Whether the primitive is drawn with an index buffer.
    pub fn is_indexed(&self) -> bool {
        self.index_count > 0
    }
}

/// A list of primitives drawn with the same transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Name from the document, if any.
    pub name: Option<String>,
    /// Draw ranges.
    pub primitives: Vec<Primitive>,
}

/// A node of the scene hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Name from the document, if any.
    pub name: Option<String>,
    /// Index into [`Model::meshes`].
    pub mesh: Option<usize>,
    /// Indices into [`Model::nodes`].
    pub children: Vec<usize>,
    /// Transform relative to the parent.
    pub local_transform: Mat4,
}

/// A set of root nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    /// Name from the document, if any.
    pub name: Option<String>,
    /// Indices into [`Model::nodes`].
    pub nodes: Vec<usize>,
}

/// The imported structure of a glTF asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Materials; primitives without a material use the last one, the glTF default.
    pub materials: Vec<Material>,
    /// Meshes.
    pub meshes: Vec<Mesh>,
    /// Node hierarchy.
    pub nodes: Vec<Node>,
    /// Scenes.
    pub scenes: Vec<Scene>,
    /// Scene to render when the host has no preference.
    pub default_scene: Option<usize>,
    /// Number of textures referenced by index from materials.
    pub texture_count: usize,
    /// Total vertices across all primitives.
    pub vertex_count: u32,
    /// Total indices across all primitives.
    pub index_count: u32,
}

impl Model {
    /// Parses a `.gltf` (JSON) or `.glb` file without loading buffers or images.
    pub fn from_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        let gltf = gltf::Gltf::from_slice(bytes).context("Failed to parse glTF")?;
        Self::from_document(&gltf.document)
    }

    /// Imports the structure of `document`.
    ///
    /// Only triangle-list primitives with positions are supported.
    pub fn from_document(document: &gltf::Document) -> anyhow::Result<Self> {
        let mut materials: Vec<Material> = document.materials().map(|m| Material::import(&m)).collect();
        let default_material = materials.len();
        let mut uses_default_material = false;

        let mut vertex_count = 0u32;
        let mut index_count = 0u32;
        let mut meshes = Vec::new();
        for mesh in document.meshes() {
            let mut primitives = Vec::new();
            for (i, primitive) in mesh.primitives().enumerate() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    bail!(
                        "Mesh {} primitive {i}: mode {:?} is not supported",
                        mesh.index(),
                        primitive.mode()
                    );
                }
                let positions = primitive
                    .get(&gltf::Semantic::Positions)
                    .with_context(|| format!("Mesh {} primitive {i} has no positions", mesh.index()))?;
                let vertices = u32::try_from(positions.count())?;
                let indices = match primitive.indices() {
                    Some(accessor) => u32::try_from(accessor.count())?,
                    None => 0,
                };
                let material = match primitive.material().index() {
                    Some(index) => index,
                    None => {
                        uses_default_material = true;
                        default_material
                    }
                };
                primitives.push(Primitive {
                    first_vertex: vertex_count,
                    vertex_count: vertices,
                    first_index: index_count,
                    index_count: indices,
                    material,
                });
                vertex_count = vertex_count
                    .checked_add(vertices)
                    .context("Vertex count overflows u32")?;
                index_count = index_count
                    .checked_add(indices)
                    .context("Index count overflows u32")?;
            }
            meshes.push(Mesh {
                name: mesh.name().map(str::to_owned),
                primitives,
            });
        }
        if uses_default_material {
            materials.push(Material::default());
        }

        let nodes = document
            .nodes()
            .map(|node| Node {
                name: node.name().map(str::to_owned),
                mesh: node.mesh().map(|m| m.index()),
                children: node.children().map(|c| c.index()).collect(),
                local_transform: Mat4::from_cols_array_2d(&node.transform().matrix()),
            })
            .collect();
        let scenes = document
            .scenes()
            .map(|scene| Scene {
                name: scene.name().map(str::to_owned),
                nodes: scene.nodes().map(|n| n.index()).collect(),
            })
            .collect();

        let model = Self {
            materials,
            meshes,
            nodes,
            scenes,
            default_scene: document.default_scene().map(|s| s.index()),
            texture_count: document.textures().count(),
            vertex_count,
            index_count,
        };
        log::info!(
            "Imported glTF model: {} meshes, {} materials, {} nodes, {} vertices",
            model.meshes.len(),
            model.materials.len(),
            model.nodes.len(),
            model.vertex_count
        );
        Ok(model)
    }

    /// Visits every mesh node of scene `scene` with its world transform, depth first.
    ///
    /// Returns `None` if the scene index is out of range.
    pub fn visit_scene(
        &self,
        scene: usize,
        mut visit: impl FnMut(usize, &Mesh, Mat4),
    ) -> Option<()> {
        let scene = self.scenes.get(scene)?;
        let mut stack: Vec<(usize, Mat4)> =
            scene.nodes.iter().rev().map(|&n| (n, Mat4::IDENTITY)).collect();
        while let Some((index, parent)) = stack.pop() {
            // Indices come from a validated document, a bad one is skipped.
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            let world = parent * node.local_transform;
            if let Some(mesh) = node.mesh.and_then(|m| self.meshes.get(m)) {
                visit(index, mesh, world);
            }
            stack.extend(node.children.iter().rev().map(|&c| (c, world)));
        }
        Some(())
    }
}
