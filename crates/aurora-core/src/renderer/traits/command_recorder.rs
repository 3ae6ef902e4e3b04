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

use crate::math::Extent3D;
use crate::renderer::api::command::{BindGroupId, CommandBufferId, RenderPassDescriptor};
use crate::renderer::api::pipeline::RenderPipelineId;
use crate::renderer::api::resource::{BufferId, TexelCopyTextureInfo};
use crate::renderer::api::util::IndexFormat;
use std::ops::Range;

/// An active render pass, used for recording drawing commands.
///
/// Obtained from [`CommandEncoder::begin_render_pass`]. Dropping the pass ends it
/// and unbinds its attachments.
pub trait RenderPass {
    /// Sets the active render pipeline for subsequent draw calls.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId);

    /// Binds a bind group to group `index`.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, offsets: &[u32]);

    /// Binds a vertex buffer to a specific slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer for indexed drawing.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Sets the reference value used by stencil tests.
    fn set_stencil_reference(&mut self, reference: u32);

    /// Records a non-indexed draw call.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Records an indexed draw call.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
}

/// Records a sequence of GPU commands into a command buffer.
///
/// Resource state transitions between passes are handled by the implementation.
pub trait CommandEncoder {
    /// Begins a new render pass.
    ///
    /// The returned pass borrows the encoder mutably, so only one pass can be
    /// active at a time.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder>;

    /// Records a copy of `size` texels between two textures.
    fn copy_texture_to_texture(
        &mut self,
        source: TexelCopyTextureInfo,
        destination: TexelCopyTextureInfo,
        size: Extent3D,
    );

    /// Records a copy between two buffers.
    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    );

    /// Finalizes the recording and returns a handle to the command buffer.
    fn finish(self: Box<Self>) -> CommandBufferId;
}
