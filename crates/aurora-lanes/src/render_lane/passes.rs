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

//! Small recording helpers shared by every effect.

use super::technique::ShaderResourceBinding;
use aurora_core::math::{Extent3D, LinearRgba};
use aurora_core::renderer::api::{
    LoadOp, Operations, RenderPassColorAttachment, RenderPassDepthStencilAttachment,
    RenderPassDescriptor, RenderPipelineId, StoreOp, TexelCopyTextureInfo, TextureViewId,
};
use aurora_core::renderer::{CommandEncoder, GpuTexture, RenderError};

/// Parameters of one full-screen triangle pass.
#[derive(Debug, Clone, Copy)]
pub struct FullScreenPass<'a> {
    /// Debug label of the render pass.
    pub label: &'a str,
    /// Render-target views, in shader output order.
    pub color_targets: &'a [TextureViewId],
    /// What happens to the color targets when the pass begins.
    pub load: LoadOp<LinearRgba>,
    /// Optional depth-stencil attachment, usually read-only for stencil gating.
    pub depth_stencil: Option<RenderPassDepthStencilAttachment>,
    /// Stencil reference value.
    pub stencil_reference: u32,
}

impl<'a> FullScreenPass<'a> {
    /// A pass that draws over `color_targets`, keeping their previous contents.
    pub fn new(label: &'a str, color_targets: &'a [TextureViewId]) -> Self {
        Self {
            label,
            color_targets,
            load: LoadOp::Load,
            depth_stencil: None,
            stencil_reference: 0,
        }
    }

    /// Clears the color targets to `color` first.
    pub fn with_clear(mut self, color: LinearRgba) -> Self {
        self.load = LoadOp::Clear(color);
        self
    }

    /// Binds a depth-stencil attachment and the stencil reference value.
    pub fn with_depth_stencil(
        mut self,
        attachment: RenderPassDepthStencilAttachment,
        stencil_reference: u32,
    ) -> Self {
        self.depth_stencil = Some(attachment);
        self.stencil_reference = stencil_reference;
        self
    }
}

/// Records one full-screen triangle.
///
/// Commits `srb`, begins a render pass on the targets of `desc`, binds the pipeline
/// and group 0, sets the stencil reference, draws three vertices and ends the pass.
pub fn render_full_screen(
    encoder: &mut dyn CommandEncoder,
    pipeline: RenderPipelineId,
    srb: &mut ShaderResourceBinding,
    desc: &FullScreenPass<'_>,
) -> Result<(), RenderError> {
    let bind_group = srb.commit()?;

    let attachments: Vec<_> = desc
        .color_targets
        .iter()
        .map(|&view| RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: Operations {
                load: desc.load,
                store: StoreOp::Store,
            },
        })
        .collect();

    let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
        label: Some(desc.label),
        color_attachments: &attachments,
        depth_stencil_attachment: desc.depth_stencil,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.set_stencil_reference(desc.stencil_reference);
    pass.draw(0..3, 0..1);
    Ok(())
}

/// Copies the overlapping region of mip 0 of `source` into `destination`.
pub fn copy_texture(encoder: &mut dyn CommandEncoder, source: &GpuTexture, destination: &GpuTexture) {
    let extent = source.extent().min(destination.extent());
    if extent.is_empty() {
        return;
    }
    encoder.copy_texture_to_texture(
        TexelCopyTextureInfo::whole(source.id()),
        TexelCopyTextureInfo::whole(destination.id()),
        Extent3D::from_2d(extent),
    );
}

/// Clears a render target with an empty pass.
pub fn clear_render_target(encoder: &mut dyn CommandEncoder, view: TextureViewId, color: LinearRgba) {
    let attachment = [RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: Operations::clear(color),
    }];
    let _pass = encoder.begin_render_pass(&RenderPassDescriptor {
        label: Some("Clear render target"),
        color_attachments: &attachment,
        depth_stencil_attachment: None,
    });
}
