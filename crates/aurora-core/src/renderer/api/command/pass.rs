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

//! Descriptors and types for render passes.

use crate::math::LinearRgba;
use crate::renderer::api::resource::TextureViewId;

/// Describes the operation to perform on an attachment at the start of a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<V> {
    /// The existing contents of the attachment are loaded into the pass.
    Load,
    /// The attachment is cleared to the specified value before the pass begins.
    Clear(V),
}

/// Describes the operation to perform on an attachment at the end of a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// The results of the render pass are stored.
    Store,
    /// The results of the render pass are discarded.
    Discard,
}

/// Defines the load and store operations for a single attachment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operations<V> {
    /// The operation to perform at the beginning of the pass.
    pub load: LoadOp<V>,
    /// The operation to perform at the end of the pass.
    pub store: StoreOp,
}

impl<V> Operations<V> {
    /// Keep the previous contents and store the results.
    pub const fn load() -> Self {
        Self {
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    /// Clear to `value` and store the results.
    pub const fn clear(value: V) -> Self {
        Self {
            load: LoadOp::Clear(value),
            store: StoreOp::Store,
        }
    }
}

/// A color attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassColorAttachment {
    /// The view that will be rendered to.
    pub view: TextureViewId,
    /// The multisample resolve target, if any.
    pub resolve_target: Option<TextureViewId>,
    /// The load and store operations for this attachment.
    pub ops: Operations<LinearRgba>,
}

/// A depth/stencil attachment of a render pass.
///
/// An aspect whose operations are `None` is bound read-only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassDepthStencilAttachment {
    /// The view of the depth/stencil texture.
    pub view: TextureViewId,
    /// The load and store operations for the depth aspect.
    pub depth_ops: Option<Operations<f32>>,
    /// The load and store operations for the stencil aspect.
    pub stencil_ops: Option<Operations<u32>>,
}

impl RenderPassDepthStencilAttachment {
    /// Binds `view` with both aspects read-only.
    pub const fn read_only(view: TextureViewId) -> Self {
        Self {
            view,
            depth_ops: None,
            stencil_ops: None,
        }
    }

    /// Returns `true` if neither aspect is written by the pass.
    pub fn is_read_only(&self) -> bool {
        self.depth_ops.is_none() && self.stencil_ops.is_none()
    }
}

/// A descriptor for a render pass.
#[derive(Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// The color attachments of the pass.
    pub color_attachments: &'a [RenderPassColorAttachment],
    /// An optional depth/stencil attachment for this pass.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment>,
}
