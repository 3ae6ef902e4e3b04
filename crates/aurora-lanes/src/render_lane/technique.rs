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

//! Render techniques: one pipeline state object plus the bindings it reads.
//!
//! A [`RenderTechnique`] goes through `Uninitialized -> Compiling -> Ready`. With
//! asynchronous compilation the device hands back a pipeline id immediately and
//! [`RenderTechnique::is_ready`] polls it. A technique whose shaders or pipeline
//! fail to compile ends in [`TechniqueState::Failed`]; the failure is logged once
//! and never retried, so callers keep running their fallback path.
//!
//! Shader variables are declared by name in a [`PipelineResourceLayout`]. The
//! binding index of a variable is its declaration order. A
//! [`ShaderResourceBinding`] holds the concrete resources and turns them into a
//! bind group on [`ShaderResourceBinding::commit`].

use aurora_core::renderer::api::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindGroupLayoutId, BindingResource, BindingType, BlendStateDescriptor,
    BufferBindingType, ColorTargetStateDescriptor, ColorWrites, DepthStencilStateDescriptor,
    MultisampleStateDescriptor, PipelineCreateFlags, PipelineLayoutDescriptor, PipelineLayoutId,
    PipelineStatus, PrimitiveStateDescriptor, RenderPipelineDescriptor, RenderPipelineId,
    SamplerBindingType, SamplerDescriptor, SamplerId, ShaderMacros, ShaderModuleDescriptor,
    ShaderModuleId, ShaderSourceData, ShaderStage, ShaderStageFlags, TextureFormat,
    TextureSampleType, TextureViewDimension, VertexBufferLayoutDescriptor,
};
use aurora_core::renderer::{GraphicsDevice, ResourceError};
use std::borrow::Cow;
use std::sync::Arc;

/// Shader file shared by every full-screen pass.
pub const FULL_SCREEN_TRIANGLE_VS: &str = "FullScreenTriangleVS.fx";

/// One shader stage of a pipeline: a file, its entry point and the macro set of
/// the variant.
#[derive(Debug, Clone, Copy)]
pub struct ShaderStageInfo<'a> {
    /// Shader file name, resolved by the device's shader source factory.
    pub file: &'a str,
    /// Entry point function.
    pub entry_point: &'a str,
    /// Macros of the variant.
    pub macros: &'a ShaderMacros,
}

impl<'a> ShaderStageInfo<'a> {
    /// The full-screen triangle vertex shader.
    pub fn full_screen_triangle(macros: &'a ShaderMacros) -> Self {
        Self {
            file: FULL_SCREEN_TRIANGLE_VS,
            entry_point: "FullScreenTriangleVS",
            macros,
        }
    }
}

/// What kind of resource a shader variable expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderResourceKind {
    /// A uniform buffer.
    ConstantBuffer,
    /// A read-only storage buffer.
    StructuredBuffer,
    /// A filterable 2D float texture.
    Texture,
    /// A 2D float texture read with point sampling or `Load`.
    UnfilterableTexture,
    /// A 2D depth texture.
    DepthTexture,
    /// A 2D unsigned-integer texture.
    UintTexture,
    /// A filtering sampler.
    Sampler,
}

impl ShaderResourceKind {
    fn binding_type(self) -> BindingType {
        let texture = |sample_type| BindingType::Texture {
            sample_type,
            view_dimension: TextureViewDimension::D2,
        };
        match self {
            ShaderResourceKind::ConstantBuffer => BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
            },
            ShaderResourceKind::StructuredBuffer => BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
            },
            ShaderResourceKind::Texture => texture(TextureSampleType::Float { filterable: true }),
            ShaderResourceKind::UnfilterableTexture => {
                texture(TextureSampleType::Float { filterable: false })
            }
            ShaderResourceKind::DepthTexture => texture(TextureSampleType::Depth),
            ShaderResourceKind::UintTexture => texture(TextureSampleType::Uint),
            ShaderResourceKind::Sampler => BindingType::Sampler(SamplerBindingType::Filtering),
        }
    }
}

/// How often a shader variable changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderVariableType {
    /// Set once on the technique and shared by its bindings.
    Static,
    /// Set per binding, rarely changed.
    Mutable,
    /// Set per binding, changed every frame.
    Dynamic,
}

#[derive(Debug, Clone)]
struct VariableDesc {
    stages: ShaderStageFlags,
    name: String,
    kind: ShaderResourceKind,
    var_type: ShaderVariableType,
}

#[derive(Debug, Clone)]
struct ImmutableSamplerDesc {
    stages: ShaderStageFlags,
    name: String,
    desc: SamplerDescriptor<'static>,
}

/// Declares the shader variables of a pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineResourceLayout {
    variables: Vec<VariableDesc>,
    immutable_samplers: Vec<ImmutableSamplerDesc>,
}

impl PipelineResourceLayout {
    /// Creates an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable. Its binding index is the number of declarations before it.
    pub fn add_variable(
        mut self,
        stages: ShaderStageFlags,
        name: &str,
        kind: ShaderResourceKind,
        var_type: ShaderVariableType,
    ) -> Self {
        self.variables.push(VariableDesc {
            stages,
            name: name.to_string(),
            kind,
            var_type,
        });
        self
    }

    /// Declares a sampler owned by the pipeline and bound automatically.
    pub fn add_immutable_sampler(
        mut self,
        stages: ShaderStageFlags,
        name: &str,
        desc: SamplerDescriptor<'static>,
    ) -> Self {
        self.immutable_samplers.push(ImmutableSamplerDesc {
            stages,
            name: name.to_string(),
            desc,
        });
        self
    }

    /// Number of bindings, immutable samplers included.
    pub fn binding_count(&self) -> usize {
        self.variables.len() + self.immutable_samplers.len()
    }
}

/// Everything needed to build one pipeline state object.
#[derive(Debug, Clone)]
pub struct PsoCreateInfo<'a> {
    /// Debug name, also used in log messages.
    pub name: &'a str,
    /// Vertex stage.
    pub vertex_shader: ShaderStageInfo<'a>,
    /// Pixel stage.
    pub pixel_shader: ShaderStageInfo<'a>,
    /// Shader variables.
    pub resource_layout: &'a PipelineResourceLayout,
    /// One format per color target.
    pub color_formats: &'a [TextureFormat],
    /// Depth-stencil state, `None` when no depth-stencil target is bound.
    pub depth_stencil: Option<DepthStencilStateDescriptor>,
    /// Blend state applied to every color target.
    pub blend: Option<BlendStateDescriptor>,
    /// Vertex buffer layouts; empty for full-screen passes.
    pub vertex_buffers: &'a [VertexBufferLayoutDescriptor<'a>],
    /// Rasterizer state.
    pub primitive: PrimitiveStateDescriptor,
    /// Compilation options.
    pub flags: PipelineCreateFlags,
}

impl<'a> PsoCreateInfo<'a> {
    /// A full-screen triangle pass writing `color_formats` with no depth, blending or culling.
    pub fn full_screen(
        name: &'a str,
        vs_macros: &'a ShaderMacros,
        pixel_shader: ShaderStageInfo<'a>,
        resource_layout: &'a PipelineResourceLayout,
        color_formats: &'a [TextureFormat],
        flags: PipelineCreateFlags,
    ) -> Self {
        Self {
            name,
            vertex_shader: ShaderStageInfo::full_screen_triangle(vs_macros),
            pixel_shader,
            resource_layout,
            color_formats,
            depth_stencil: None,
            blend: None,
            vertex_buffers: &[],
            primitive: PrimitiveStateDescriptor::default(),
            flags,
        }
    }
}

/// Lifecycle of a technique's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TechniqueState {
    /// No pipeline requested yet.
    #[default]
    Uninitialized,
    /// The pipeline is compiling in the background.
    Compiling,
    /// The pipeline can be bound.
    Ready,
    /// Shader or pipeline compilation failed; the technique stays unusable.
    Failed,
}

#[derive(Debug)]
struct BindingSlot {
    name: String,
    var_type: ShaderVariableType,
    fixed: Option<SamplerId>,
}

/// Bind group layout shared by a technique and its bindings.
///
/// Released with its immutable samplers when the last holder drops, so no bind
/// group outlives the layout it was created from.
#[derive(Debug)]
struct BindingLayout {
    device: Arc<dyn GraphicsDevice>,
    label: String,
    layout: BindGroupLayoutId,
    slots: Vec<BindingSlot>,
    samplers: Vec<SamplerId>,
}

impl BindingLayout {
    fn find(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }
}

impl Drop for BindingLayout {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_bind_group_layout(self.layout) {
            log::warn!("Failed to destroy bind group layout of '{}': {e}", self.label);
        }
        for sampler in self.samplers.drain(..) {
            if let Err(e) = self.device.destroy_sampler(sampler) {
                log::warn!("Failed to destroy sampler of '{}': {e}", self.label);
            }
        }
    }
}

/// A pipeline state object together with its shader-resource bindings.
#[derive(Debug, Default)]
pub struct RenderTechnique {
    name: String,
    state: TechniqueState,
    // Declared before the device fields so it is dropped first.
    srb: Option<ShaderResourceBinding>,
    device: Option<Arc<dyn GraphicsDevice>>,
    pipeline: Option<RenderPipelineId>,
    pipeline_layout: Option<PipelineLayoutId>,
    binding_layout: Option<Arc<BindingLayout>>,
    samplers: Vec<SamplerId>,
    static_resources: Vec<Option<BindingResource>>,
}

impl RenderTechnique {
    /// Creates an uninitialized technique.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the pipeline described by `info`.
    ///
    /// Compilation failures do not surface as errors: they move the technique to
    /// [`TechniqueState::Failed`] and are logged.
    pub fn initialize_pso(&mut self, device: &Arc<dyn GraphicsDevice>, info: &PsoCreateInfo<'_>) {
        debug_assert!(
            !self.is_initialized_pso(),
            "technique '{}' is already initialized",
            self.name
        );
        if self.is_initialized_pso() {
            return;
        }

        self.name = info.name.to_string();
        self.device = Some(device.clone());
        match self.create_pipeline(device, info) {
            Ok(()) => {
                self.state = if info.flags.contains(PipelineCreateFlags::ASYNCHRONOUS) {
                    TechniqueState::Compiling
                } else {
                    TechniqueState::Ready
                };
                log::info!("Created render technique '{}'", self.name);
            }
            Err(e) => {
                log::error!("Failed to create render technique '{}': {e}", self.name);
                self.state = TechniqueState::Failed;
            }
        }
    }

    fn create_pipeline(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
        info: &PsoCreateInfo<'_>,
    ) -> Result<(), ResourceError> {
        let layout = info.resource_layout;

        let mut entries = Vec::with_capacity(layout.binding_count());
        let mut slots = Vec::with_capacity(layout.binding_count());
        for var in &layout.variables {
            entries.push(BindGroupLayoutEntry {
                binding: entries.len() as u32,
                visibility: var.stages,
                ty: var.kind.binding_type(),
            });
            slots.push(BindingSlot {
                name: var.name.clone(),
                var_type: var.var_type,
                fixed: None,
            });
        }
        for sampler in &layout.immutable_samplers {
            let id = device.create_sampler(&sampler.desc)?;
            self.samplers.push(id);
            entries.push(BindGroupLayoutEntry {
                binding: entries.len() as u32,
                visibility: sampler.stages,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
            });
            slots.push(BindingSlot {
                name: sampler.name.clone(),
                var_type: ShaderVariableType::Static,
                fixed: Some(id),
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some(info.name),
            entries: &entries,
        })?;
        self.static_resources = vec![None; slots.len()];
        self.binding_layout = Some(Arc::new(BindingLayout {
            device: device.clone(),
            label: info.name.to_string(),
            layout: bind_group_layout,
            slots,
            samplers: std::mem::take(&mut self.samplers),
        }));

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(Cow::Borrowed(info.name)),
            bind_group_layouts: &[bind_group_layout],
        })?;
        self.pipeline_layout = Some(pipeline_layout);

        let vs = create_shader(device.as_ref(), &info.vertex_shader, ShaderStage::Vertex)?;
        let ps = match create_shader(device.as_ref(), &info.pixel_shader, ShaderStage::Fragment) {
            Ok(ps) => ps,
            Err(e) => {
                if let Err(e) = device.destroy_shader_module(vs) {
                    log::warn!("Failed to destroy vertex shader of '{}': {e}", info.name);
                }
                return Err(e);
            }
        };

        let color_targets: Vec<_> = info
            .color_formats
            .iter()
            .map(|&format| ColorTargetStateDescriptor {
                format,
                blend: info.blend,
                write_mask: ColorWrites::ALL,
            })
            .collect();

        let result = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(Cow::Borrowed(info.name)),
            vertex_shader_module: vs,
            vertex_entry_point: Cow::Borrowed(info.vertex_shader.entry_point),
            fragment_shader_module: Some(ps),
            fragment_entry_point: Some(Cow::Borrowed(info.pixel_shader.entry_point)),
            vertex_buffers_layout: Cow::Borrowed(info.vertex_buffers),
            layout: Some(pipeline_layout),
            primitive_state: info.primitive,
            depth_stencil_state: info.depth_stencil,
            color_target_states: Cow::Owned(color_targets),
            multisample_state: MultisampleStateDescriptor::default(),
            flags: info.flags,
        });

        // The pipeline keeps what it needs from the modules.
        for module in [vs, ps] {
            if let Err(e) = device.destroy_shader_module(module) {
                log::warn!("Failed to destroy shader module of '{}': {e}", info.name);
            }
        }

        self.pipeline = Some(result?);
        Ok(())
    }

    /// Returns `true` once a pipeline has been requested, whatever its outcome.
    pub fn is_initialized_pso(&self) -> bool {
        self.state != TechniqueState::Uninitialized
    }

    /// Polls the device and returns `true` if the pipeline can be bound.
    pub fn is_ready(&mut self) -> bool {
        if self.state == TechniqueState::Compiling {
            if let (Some(device), Some(pipeline)) = (&self.device, self.pipeline) {
                match device.render_pipeline_status(pipeline) {
                    PipelineStatus::Pending => {}
                    PipelineStatus::Ready => self.state = TechniqueState::Ready,
                    PipelineStatus::Failed => {
                        log::error!("Asynchronous compilation of '{}' failed", self.name);
                        self.state = TechniqueState::Failed;
                    }
                }
            }
        }
        self.state == TechniqueState::Ready
    }

    /// Returns `true` if compilation failed for good.
    pub fn has_failed(&self) -> bool {
        self.state == TechniqueState::Failed
    }

    /// The last observed state, without polling.
    pub fn state(&self) -> TechniqueState {
        self.state
    }

    /// Debug name of the technique.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pipeline id, once requested and not failed.
    pub fn pipeline(&self) -> Option<RenderPipelineId> {
        self.pipeline.filter(|_| !self.has_failed())
    }

    /// Binds a resource to a static variable of the pipeline.
    ///
    /// Bindings created with `bind_static` pick it up.
    pub fn set_static_variable(&mut self, name: &str, resource: impl Into<BindingResource>) {
        let Some(layout) = &self.binding_layout else {
            log::warn!("Static variable '{name}' set before '{}' was initialized", self.name);
            return;
        };
        match layout.find(name) {
            Some(i) if layout.slots[i].var_type == ShaderVariableType::Static => {
                self.static_resources[i] = Some(resource.into());
            }
            Some(_) => log::warn!("Variable '{name}' of '{}' is not static", self.name),
            None => log::warn!("Static variable '{name}' not found in '{}'", self.name),
        }
    }

    /// Creates the technique's own binding.
    pub fn initialize_srb(&mut self, bind_static: bool) {
        if self.srb.is_none() {
            self.srb = self.create_shader_resource_binding(bind_static);
        }
    }

    /// Creates an additional binding, independent of the technique's own.
    ///
    /// Returns `None` when the pipeline was never requested or failed to build.
    pub fn create_shader_resource_binding(&self, bind_static: bool) -> Option<ShaderResourceBinding> {
        if self.has_failed() {
            return None;
        }
        let (device, layout) = match (&self.device, &self.binding_layout) {
            (Some(d), Some(l)) => (d.clone(), l.clone()),
            _ => return None,
        };
        let mut resources = vec![None; layout.slots.len()];
        let mut frozen = vec![false; layout.slots.len()];
        for (i, slot) in layout.slots.iter().enumerate() {
            if let Some(sampler) = slot.fixed {
                resources[i] = Some(BindingResource::Sampler(sampler));
                frozen[i] = true;
            } else if bind_static && slot.var_type == ShaderVariableType::Static {
                if let Some(resource) = self.static_resources[i] {
                    resources[i] = Some(resource);
                    frozen[i] = true;
                }
            }
        }
        Some(ShaderResourceBinding {
            device,
            layout,
            resources,
            frozen,
            bind_group: None,
            dirty: true,
        })
    }

    /// Returns `true` if the technique's own binding exists.
    pub fn is_initialized_srb(&self) -> bool {
        self.srb.is_some()
    }

    /// Drops the technique's own binding, keeping the pipeline.
    pub fn release_srb(&mut self) {
        self.srb = None;
    }

    /// The technique's own binding.
    pub fn srb_mut(&mut self) -> Option<&mut ShaderResourceBinding> {
        self.srb.as_mut()
    }

    /// The pipeline id and the technique's own binding, borrowed together.
    pub fn pipeline_and_srb(&mut self) -> Option<(RenderPipelineId, &mut ShaderResourceBinding)> {
        let pipeline = self.pipeline()?;
        self.srb.as_mut().map(|srb| (pipeline, srb))
    }
}

fn create_shader(
    device: &dyn GraphicsDevice,
    stage_info: &ShaderStageInfo<'_>,
    stage: ShaderStage,
) -> Result<ShaderModuleId, ResourceError> {
    device.create_shader_module(&ShaderModuleDescriptor {
        label: Some(stage_info.file),
        source: ShaderSourceData::File(Cow::Borrowed(stage_info.file)),
        stage,
        entry_point: stage_info.entry_point,
        macros: stage_info.macros.as_slice(),
    })
}

impl Drop for RenderTechnique {
    fn drop(&mut self) {
        self.srb = None;
        let Some(device) = self.device.take() else {
            return;
        };
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = device.destroy_render_pipeline(pipeline) {
                log::warn!("Failed to destroy pipeline '{}': {e}", self.name);
            }
        }
        if let Some(layout) = self.pipeline_layout.take() {
            if let Err(e) = device.destroy_pipeline_layout(layout) {
                log::warn!("Failed to destroy pipeline layout of '{}': {e}", self.name);
            }
        }
        // Bindings still held elsewhere keep the layout alive.
        self.binding_layout = None;
        for sampler in self.samplers.drain(..) {
            if let Err(e) = device.destroy_sampler(sampler) {
                log::warn!("Failed to destroy sampler of '{}': {e}", self.name);
            }
        }
    }
}

/// The resources bound to the variables of one pipeline.
///
/// Bind groups are immutable on the device, so a new one is created on
/// [`commit`](Self::commit) whenever a binding changed since the last commit.
#[derive(Debug)]
pub struct ShaderResourceBinding {
    device: Arc<dyn GraphicsDevice>,
    layout: Arc<BindingLayout>,
    resources: Vec<Option<BindingResource>>,
    frozen: Vec<bool>,
    bind_group: Option<BindGroupId>,
    dirty: bool,
}

impl ShaderResourceBinding {
    /// Binds `resource` to the variable `name`.
    ///
    /// Unknown names and static variables frozen at creation are ignored with a warning.
    pub fn set(&mut self, name: &str, resource: impl Into<BindingResource>) {
        let Some(i) = self.layout.find(name) else {
            log::warn!("Variable '{name}' not found in '{}'", self.layout.label);
            return;
        };
        if self.frozen[i] {
            log::warn!(
                "Variable '{name}' of '{}' is static and bound by the technique",
                self.layout.label
            );
            return;
        }
        let resource = Some(resource.into());
        if self.resources[i] != resource {
            self.resources[i] = resource;
            self.dirty = true;
        }
    }

    /// Returns `true` if `name` has a resource bound.
    pub fn is_bound(&self, name: &str) -> bool {
        self.layout
            .find(name)
            .is_some_and(|i| self.resources[i].is_some())
    }

    /// Returns the bind group reflecting the current bindings, rebuilding it if needed.
    ///
    /// # Errors
    /// * `ResourceError::UnboundVariable` - A variable has no resource.
    /// * Any error from bind group creation.
    pub fn commit(&mut self) -> Result<BindGroupId, ResourceError> {
        if let (false, Some(bind_group)) = (self.dirty, self.bind_group) {
            return Ok(bind_group);
        }

        let entries = self
            .resources
            .iter()
            .zip(&self.layout.slots)
            .enumerate()
            .map(|(binding, (resource, slot))| {
                resource
                    .map(|resource| BindGroupEntry {
                        binding: binding as u32,
                        resource,
                    })
                    .ok_or_else(|| ResourceError::UnboundVariable(slot.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some(self.layout.label.as_str()),
            layout: self.layout.layout,
            entries: &entries,
        })?;
        if let Some(old) = self.bind_group.replace(bind_group) {
            if let Err(e) = self.device.destroy_bind_group(old) {
                log::warn!("Failed to destroy bind group of '{}': {e}", self.layout.label);
            }
        }
        self.dirty = false;
        Ok(bind_group)
    }
}

impl Drop for ShaderResourceBinding {
    fn drop(&mut self) {
        if let Some(bind_group) = self.bind_group.take() {
            if let Err(e) = self.device.destroy_bind_group(bind_group) {
                log::warn!("Failed to destroy bind group of '{}': {e}", self.layout.label);
            }
        }
    }
}
