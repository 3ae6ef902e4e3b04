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

//! A recording graphics device shared by the integration tests.

#![allow(dead_code)]

use aurora_core::math::{Extent2D, Extent3D, Origin3D};
use aurora_core::renderer::api::*;
use aurora_core::renderer::{
    CommandEncoder, GraphicsDevice, RenderPass, ResourceError, ShaderError,
};
use aurora_lanes::post_fx::{
    FrameDesc, PostFxContext, PostFxContextCreateInfo, PostFxFeatureFlags, PostFxRenderAttributes,
};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One command recorded by [`MockEncoder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginPass {
        label: String,
        color_targets: Vec<TextureViewId>,
        cleared: bool,
        depth_stencil: Option<TextureViewId>,
    },
    SetPipeline(RenderPipelineId),
    SetBindGroup(BindGroupId),
    SetVertexBuffer(BufferId),
    SetIndexBuffer(BufferId, IndexFormat),
    SetStencilReference(u32),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    CopyTexture {
        source: TextureId,
        destination: TextureId,
    },
    CopyBuffer {
        source: BufferId,
        destination: BufferId,
    },
}

#[derive(Debug, Clone)]
pub struct ShaderRecord {
    pub file: String,
    pub entry_point: String,
    pub macros: Vec<ShaderMacro>,
}

impl ShaderRecord {
    pub fn macro_value(&self, name: &str) -> Option<&str> {
        self.macros
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.definition.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TextureRecord {
    pub label: String,
    pub extent: Extent2D,
    pub format: TextureFormat,
    pub mip_level_count: u32,
}

#[derive(Debug, Default)]
struct MockState {
    async_status: Option<PipelineStatus>,
    failing_shaders: HashSet<String>,
    shaders: Vec<ShaderRecord>,
    pipelines: HashMap<usize, (String, PipelineStatus)>,
    pipelines_created: usize,
    textures: HashMap<usize, TextureRecord>,
    views: HashMap<usize, usize>,
    buffers: HashMap<usize, (String, u64)>,
    buffer_writes: HashMap<usize, usize>,
    texture_writes: usize,
    bind_group_layouts: HashSet<usize>,
    bind_groups: HashMap<usize, (usize, Vec<BindGroupEntry>)>,
    orphaned_bind_groups: usize,
    failing_layout_destroys: bool,
    failed_destroys: usize,
}

/// A device that hands out increasing ids and records what was created.
#[derive(Debug, Default)]
pub struct MockDevice {
    next_id: AtomicUsize,
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicUsize::new(1),
            state: Mutex::default(),
        })
    }

    /// The same device as the trait object the lanes expect.
    pub fn handle(self: &Arc<Self>) -> Arc<dyn GraphicsDevice> {
        self.clone()
    }

    fn next(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Pipelines created from now on with the async flag start in `status`.
    pub fn set_async_status(&self, status: PipelineStatus) {
        self.state().async_status = Some(status);
    }

    /// Moves every pending pipeline to `status`.
    pub fn finish_pending_pipelines(&self, status: PipelineStatus) {
        for (_, pipeline_status) in self.state().pipelines.values_mut() {
            if *pipeline_status == PipelineStatus::Pending {
                *pipeline_status = status;
            }
        }
    }

    /// Shader modules created from `file` fail to compile.
    pub fn fail_shader(&self, file: &str) {
        self.state().failing_shaders.insert(file.to_string());
    }

    pub fn shaders(&self) -> Vec<ShaderRecord> {
        self.state().shaders.clone()
    }

    pub fn pipeline_label(&self, id: RenderPipelineId) -> Option<String> {
        self.state().pipelines.get(&id.0).map(|(label, _)| label.clone())
    }

    pub fn pipeline_labels(&self) -> Vec<String> {
        let mut labels: Vec<_> = self
            .state()
            .pipelines
            .values()
            .map(|(label, _)| label.clone())
            .collect();
        labels.sort();
        labels
    }

    /// Pipelines created since the device was made, destroyed ones included.
    pub fn pipelines_created(&self) -> usize {
        self.state().pipelines_created
    }

    pub fn live_pipelines(&self) -> usize {
        self.state().pipelines.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state().textures.len()
    }

    pub fn texture(&self, id: TextureId) -> Option<TextureRecord> {
        self.state().textures.get(&id.0).cloned()
    }

    /// The texture a view was created from.
    pub fn texture_of_view(&self, view: TextureViewId) -> Option<TextureRecord> {
        let state = self.state();
        let texture = state.views.get(&view.0)?;
        state.textures.get(texture).cloned()
    }

    pub fn textures_labelled(&self, label: &str) -> Vec<TextureRecord> {
        self.state()
            .textures
            .values()
            .filter(|t| t.label == label)
            .cloned()
            .collect()
    }

    pub fn buffer_writes(&self, id: BufferId) -> usize {
        self.state().buffer_writes.get(&id.0).copied().unwrap_or(0)
    }

    pub fn total_buffer_writes(&self) -> usize {
        self.state().buffer_writes.values().sum()
    }

    pub fn buffer_labelled(&self, label: &str) -> Option<BufferId> {
        self.state()
            .buffers
            .iter()
            .find(|(_, (l, _))| l == label)
            .map(|(&id, _)| BufferId(id))
    }

    pub fn texture_writes(&self) -> usize {
        self.state().texture_writes
    }

    pub fn bind_group_entries(&self, id: BindGroupId) -> Vec<BindGroupEntry> {
        self.state()
            .bind_groups
            .get(&id.0)
            .map(|(_, entries)| entries.clone())
            .unwrap_or_default()
    }

    /// Bind groups destroyed after the layout they were created from.
    pub fn orphaned_bind_groups(&self) -> usize {
        self.state().orphaned_bind_groups
    }

    /// Destroying layouts and samplers fails from now on.
    pub fn fail_layout_destroys(&self) {
        self.state().failing_layout_destroys = true;
    }

    pub fn failed_destroys(&self) -> usize {
        self.state().failed_destroys
    }

    fn layout_destroy(&self) -> Result<(), ResourceError> {
        let mut state = self.state();
        if state.failing_layout_destroys {
            state.failed_destroys += 1;
            return Err(ResourceError::BackendError(String::from("mock failure")));
        }
        Ok(())
    }
}

impl GraphicsDevice for MockDevice {
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let file = match &descriptor.source {
            ShaderSourceData::File(file) => file.to_string(),
            ShaderSourceData::Wgsl(_) => String::from("<inline>"),
        };
        let mut state = self.state();
        if state.failing_shaders.contains(&file) {
            return Err(ResourceError::Shader(ShaderError::CompilationError {
                label: file,
                details: String::from("mock failure"),
            }));
        }
        state.shaders.push(ShaderRecord {
            file,
            entry_point: descriptor.entry_point.to_string(),
            macros: descriptor.macros.to_vec(),
        });
        Ok(ShaderModuleId(self.next()))
    }

    fn destroy_shader_module(&self, _id: ShaderModuleId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let id = self.next();
        let label = descriptor.label.as_deref().unwrap_or_default().to_string();
        let mut state = self.state();
        let status = if descriptor.flags.contains(PipelineCreateFlags::ASYNCHRONOUS) {
            state.async_status.unwrap_or(PipelineStatus::Ready)
        } else {
            PipelineStatus::Ready
        };
        state.pipelines.insert(id, (label, status));
        state.pipelines_created += 1;
        Ok(RenderPipelineId(id))
    }

    fn render_pipeline_status(&self, id: RenderPipelineId) -> PipelineStatus {
        self.state()
            .pipelines
            .get(&id.0)
            .map_or(PipelineStatus::Failed, |(_, status)| *status)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        self.state().pipelines.remove(&id.0);
        Ok(())
    }

    fn create_pipeline_layout(
        &self,
        _descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        Ok(PipelineLayoutId(self.next()))
    }

    fn destroy_pipeline_layout(&self, _id: PipelineLayoutId) -> Result<(), ResourceError> {
        self.layout_destroy()
    }

    fn create_bind_group_layout(
        &self,
        _descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let id = self.next();
        self.state().bind_group_layouts.insert(id);
        Ok(BindGroupLayoutId(id))
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError> {
        self.layout_destroy()?;
        self.state().bind_group_layouts.remove(&id.0);
        Ok(())
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        let id = self.next();
        self.state()
            .bind_groups
            .insert(id, (descriptor.layout.0, descriptor.entries.to_vec()));
        Ok(BindGroupId(id))
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        let mut state = self.state();
        if let Some((layout, _)) = state.bind_groups.remove(&id.0) {
            if !state.bind_group_layouts.contains(&layout) {
                state.orphaned_bind_groups += 1;
            }
        }
        Ok(())
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let id = self.next();
        let label = descriptor.label.as_deref().unwrap_or_default().to_string();
        self.state().buffers.insert(id, (label, descriptor.size));
        Ok(BufferId(id))
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        _data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        self.create_buffer(descriptor)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.state().buffers.remove(&id.0);
        Ok(())
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state();
        let size = state
            .buffers
            .get(&id.0)
            .map(|(_, size)| *size)
            .ok_or(ResourceError::InvalidHandle)?;
        if offset + data.len() as u64 > size {
            return Err(ResourceError::OutOfBounds);
        }
        *state.buffer_writes.entry(id.0).or_default() += 1;
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let id = self.next();
        self.state().textures.insert(
            id,
            TextureRecord {
                label: descriptor.label.as_deref().unwrap_or_default().to_string(),
                extent: descriptor.size.to_2d(),
                format: descriptor.format,
                mip_level_count: descriptor.mip_level_count,
            },
        );
        Ok(TextureId(id))
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        self.state().textures.remove(&id.0);
        Ok(())
    }

    fn write_texture(
        &self,
        _texture_id: TextureId,
        _data: &[u8],
        _bytes_per_row: Option<u32>,
        _offset: Origin3D,
        _size: Extent3D,
    ) -> Result<(), ResourceError> {
        self.state().texture_writes += 1;
        Ok(())
    }

    fn create_texture_view(
        &self,
        texture_id: TextureId,
        _descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        let id = self.next();
        self.state().views.insert(id, texture_id.0);
        Ok(TextureViewId(id))
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        self.state().views.remove(&id.0);
        Ok(())
    }

    fn create_sampler(&self, _descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        Ok(SamplerId(self.next()))
    }

    fn destroy_sampler(&self, _id: SamplerId) -> Result<(), ResourceError> {
        self.layout_destroy()
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(MockEncoder::default())
    }

    fn submit_command_buffer(&self, _command_buffer: CommandBufferId) {}
}

/// Records every command into a flat list.
#[derive(Debug, Default)]
pub struct MockEncoder {
    pub commands: Vec<Command>,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn pass_labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Labels of the passes that drew something.
    pub fn drawn_pass_labels(&self) -> Vec<&str> {
        let mut labels = Vec::new();
        let mut current = None;
        for command in &self.commands {
            match command {
                Command::BeginPass { label, .. } => current = Some(label.as_str()),
                Command::Draw { .. } | Command::DrawIndexed { .. } => {
                    if let Some(label) = current.take() {
                        labels.push(label);
                    }
                }
                _ => {}
            }
        }
        labels
    }

    /// Color targets of every pass labelled `label`, in recording order.
    pub fn pass_targets(&self, label: &str) -> Vec<Vec<TextureViewId>> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass {
                    label: l,
                    color_targets,
                    ..
                } if l == label => Some(color_targets.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. } | Command::DrawIndexed { .. }))
            .count()
    }

    pub fn copies(&self) -> Vec<(TextureId, TextureId)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::CopyTexture {
                    source,
                    destination,
                } => Some((*source, *destination)),
                _ => None,
            })
            .collect()
    }
}

struct MockRenderPass<'a> {
    commands: &'a mut Vec<Command>,
}

impl RenderPass for MockRenderPass<'_> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, _index: u32, bind_group: BindGroupId, _offsets: &[u32]) {
        self.commands.push(Command::SetBindGroup(bind_group));
    }

    fn set_vertex_buffer(&mut self, _slot: u32, buffer: BufferId, _offset: u64) {
        self.commands.push(Command::SetVertexBuffer(buffer));
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _offset: u64, index_format: IndexFormat) {
        self.commands.push(Command::SetIndexBuffer(buffer, index_format));
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.commands.push(Command::SetStencilReference(reference));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands.push(Command::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.commands.push(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }
}

impl CommandEncoder for MockEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder> {
        self.commands.push(Command::BeginPass {
            label: descriptor.label.unwrap_or_default().to_string(),
            color_targets: descriptor.color_attachments.iter().map(|a| a.view).collect(),
            cleared: descriptor
                .color_attachments
                .iter()
                .any(|a| matches!(a.ops.load, LoadOp::Clear(_))),
            depth_stencil: descriptor.depth_stencil_attachment.map(|d| d.view),
        });
        Box::new(MockRenderPass {
            commands: &mut self.commands,
        })
    }

    fn copy_texture_to_texture(
        &mut self,
        source: TexelCopyTextureInfo,
        destination: TexelCopyTextureInfo,
        _size: Extent3D,
    ) {
        self.commands.push(Command::CopyTexture {
            source: source.texture,
            destination: destination.texture,
        });
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        _source_offset: u64,
        destination: BufferId,
        _destination_offset: u64,
        _size: u64,
    ) {
        self.commands.push(Command::CopyBuffer {
            source,
            destination,
        });
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        CommandBufferId(self.commands.len() as u64)
    }
}

/// A sampleable, renderable texture of `extent`.
pub fn render_target(
    device: &Arc<MockDevice>,
    label: &str,
    extent: Extent2D,
    format: TextureFormat,
) -> Arc<GpuTexture> {
    GpuTexture::create(
        &device.handle(),
        &render_target_descriptor(label, extent, format, 1),
    )
    .unwrap()
}

pub fn uniform_buffer(device: &Arc<MockDevice>, label: &str, size: u64) -> Arc<GpuBuffer> {
    GpuBuffer::create(&device.handle(), &BufferDescriptor::uniform(label, size)).unwrap()
}

/// Camera buffers, depth and motion vectors of one frame.
pub struct FrameInputs {
    pub camera: Arc<GpuBuffer>,
    pub previous_camera: Arc<GpuBuffer>,
    pub depth: Arc<GpuTexture>,
    pub previous_depth: Arc<GpuTexture>,
    pub motion_vectors: Arc<GpuTexture>,
}

impl FrameInputs {
    pub fn new(device: &Arc<MockDevice>, extent: Extent2D) -> Self {
        Self {
            camera: uniform_buffer(device, "Camera", 256),
            previous_camera: uniform_buffer(device, "PreviousCamera", 256),
            depth: render_target(device, "Depth", extent, TextureFormat::Depth32Float),
            previous_depth: render_target(device, "PreviousDepth", extent, TextureFormat::Depth32Float),
            motion_vectors: render_target(device, "MotionVectors", extent, TextureFormat::Rg16Float),
        }
    }
}

/// A context prepared and executed for frame `index` at `extent`.
pub fn executed_context(
    device: &Arc<MockDevice>,
    encoder: &mut MockEncoder,
    extent: Extent2D,
    index: u32,
) -> (PostFxContext, FrameInputs) {
    let mut context = PostFxContext::new(PostFxContextCreateInfo::default());
    let inputs = FrameInputs::new(device, extent);
    run_context_frame(device, encoder, &mut context, &inputs, extent, index);
    (context, inputs)
}

pub fn run_context_frame(
    device: &Arc<MockDevice>,
    encoder: &mut MockEncoder,
    context: &mut PostFxContext,
    inputs: &FrameInputs,
    extent: Extent2D,
    index: u32,
) {
    context
        .prepare_resources(
            &device.handle(),
            encoder,
            FrameDesc {
                index,
                width: extent.width,
                height: extent.height,
                ..Default::default()
            },
            PostFxFeatureFlags::EMPTY,
        )
        .unwrap();
    context
        .execute(PostFxRenderAttributes {
            encoder,
            camera: &inputs.camera,
            previous_camera: &inputs.previous_camera,
            depth: &inputs.depth,
            previous_depth: &inputs.previous_depth,
            motion_vectors: &inputs.motion_vectors,
        })
        .unwrap();
}
