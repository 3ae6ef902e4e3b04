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

//! Reference-counted GPU resource handles.
//!
//! [`GpuTexture`] and [`GpuBuffer`] bundle a raw resource id with a copy of its
//! description and, for textures, the default views that passes bind. They are
//! shared as `Arc<_>`; the last holder destroys the underlying GPU objects.
//! Handles built with `external` wrap resources owned by the host and are never
//! destroyed here.

use super::buffer::{BufferDescriptor, BufferId, BufferUsage};
use super::texture::{
    ImageAspect, TextureDescriptor, TextureDimension, TextureId, TextureUsage,
    TextureViewDescriptor, TextureViewDimension, TextureViewId,
};
use crate::math::{Extent2D, Extent3D};
use crate::renderer::api::util::{SampleCount, TextureFormat};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// An owned copy of the parameters a texture was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    /// Debug label.
    pub label: String,
    /// Texture extent.
    pub size: Extent3D,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Allowed usages.
    pub usage: TextureUsage,
    /// Samples per pixel.
    pub sample_count: SampleCount,
}

impl TextureInfo {
    fn from_descriptor(desc: &TextureDescriptor<'_>) -> Self {
        Self {
            label: desc.label.as_deref().unwrap_or_default().to_string(),
            size: desc.size,
            mip_level_count: desc.mip_level_count.max(1),
            format: desc.format,
            usage: desc.usage,
            sample_count: desc.sample_count,
        }
    }

    /// Width and height of mip 0.
    pub fn extent(&self) -> Extent2D {
        self.size.to_2d()
    }
}

/// A shared texture together with its default views.
pub struct GpuTexture {
    id: TextureId,
    info: TextureInfo,
    srv: TextureViewId,
    attachment: Option<TextureViewId>,
    mip_views: Vec<TextureViewId>,
    owned_views: Vec<TextureViewId>,
    device: Option<Arc<dyn GraphicsDevice>>,
}

impl GpuTexture {
    /// Creates a 2D texture and its default views.
    ///
    /// Views created:
    /// * a shader-resource view over all mips (depth aspect only for depth formats),
    /// * a render-target or depth-stencil view of mip 0 when the texture is renderable,
    /// * one single-mip view per level when the texture has more than one mip.
    pub fn create(
        device: &Arc<dyn GraphicsDevice>,
        desc: &TextureDescriptor<'_>,
    ) -> Result<Arc<Self>, ResourceError> {
        let id = device.create_texture(desc)?;
        let info = TextureInfo::from_descriptor(desc);
        let mut owned_views = Vec::new();

        match Self::create_views(device.as_ref(), id, &info, &mut owned_views) {
            Ok((srv, attachment, mip_views)) => Ok(Arc::new(Self {
                id,
                info,
                srv,
                attachment,
                mip_views,
                owned_views,
                device: Some(device.clone()),
            })),
            Err(e) => {
                for view in owned_views {
                    if let Err(e) = device.destroy_texture_view(view) {
                        log::warn!("Failed to destroy view of '{}': {e}", info.label);
                    }
                }
                if let Err(e) = device.destroy_texture(id) {
                    log::warn!("Failed to destroy texture '{}': {e}", info.label);
                }
                Err(e)
            }
        }
    }

    /// Wraps a texture owned by the host. Nothing is destroyed when the handle drops.
    pub fn external(
        id: TextureId,
        srv: TextureViewId,
        attachment: Option<TextureViewId>,
        info: TextureInfo,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            info,
            srv,
            attachment,
            mip_views: Vec::new(),
            owned_views: Vec::new(),
            device: None,
        })
    }

    fn create_views(
        device: &dyn GraphicsDevice,
        id: TextureId,
        info: &TextureInfo,
        owned: &mut Vec<TextureViewId>,
    ) -> Result<(TextureViewId, Option<TextureViewId>, Vec<TextureViewId>), ResourceError> {
        let mut view = |desc: TextureViewDescriptor<'_>| -> Result<TextureViewId, ResourceError> {
            let v = device.create_texture_view(id, &desc)?;
            owned.push(v);
            Ok(v)
        };

        let srv = view(TextureViewDescriptor {
            label: Some(Cow::Owned(format!("{}.SRV", info.label))),
            dimension: Some(TextureViewDimension::D2),
            aspect: if info.format.is_depth() {
                ImageAspect::DepthOnly
            } else {
                ImageAspect::All
            },
            ..Default::default()
        })?;

        let renderable = info.usage.contains(TextureUsage::RENDER_ATTACHMENT);
        let attachment = if !renderable {
            None
        } else if info.format.is_depth() || info.mip_level_count > 1 {
            Some(view(TextureViewDescriptor {
                label: Some(Cow::Owned(format!(
                    "{}.{}",
                    info.label,
                    if info.format.is_depth() { "DSV" } else { "RTV" }
                ))),
                dimension: Some(TextureViewDimension::D2),
                mip_level_count: Some(1),
                ..Default::default()
            })?)
        } else {
            // A single-mip color texture can be sampled and rendered through one view.
            Some(srv)
        };

        let mut mip_views = Vec::new();
        if info.mip_level_count > 1 {
            for mip in 0..info.mip_level_count {
                mip_views.push(view(TextureViewDescriptor {
                    label: Some(Cow::Owned(format!("{}.Mip{}", info.label, mip))),
                    dimension: Some(TextureViewDimension::D2),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    ..Default::default()
                })?);
            }
        }

        Ok((srv, attachment, mip_views))
    }

    /// The raw texture id.
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// The parameters the texture was created with.
    pub fn info(&self) -> &TextureInfo {
        &self.info
    }

    /// Width and height of mip 0.
    pub fn extent(&self) -> Extent2D {
        self.info.extent()
    }

    /// The texel format.
    pub fn format(&self) -> TextureFormat {
        self.info.format
    }

    /// The default shader-resource view.
    pub fn srv(&self) -> TextureViewId {
        self.srv
    }

    /// The default render-target view, for renderable color textures.
    pub fn rtv(&self) -> Option<TextureViewId> {
        self.attachment.filter(|_| !self.info.format.is_depth())
    }

    /// The default depth-stencil view, for renderable depth textures.
    pub fn dsv(&self) -> Option<TextureViewId> {
        self.attachment.filter(|_| self.info.format.is_depth())
    }

    /// A view restricted to mip `level`, usable as render target and shader resource.
    pub fn mip_view(&self, level: u32) -> Option<TextureViewId> {
        if self.mip_views.is_empty() {
            (level == 0).then_some(self.attachment.unwrap_or(self.srv))
        } else {
            self.mip_views.get(level as usize).copied()
        }
    }

    /// Returns `true` if this handle destroys the texture when dropped.
    pub fn is_owned(&self) -> bool {
        self.device.is_some()
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("id", &self.id)
            .field("label", &self.info.label)
            .field("size", &self.info.size)
            .field("format", &self.info.format)
            .field("owned", &self.device.is_some())
            .finish()
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };
        for view in self.owned_views.drain(..) {
            if let Err(e) = device.destroy_texture_view(view) {
                log::warn!("Failed to destroy view of '{}': {e}", self.info.label);
            }
        }
        if let Err(e) = device.destroy_texture(self.id) {
            log::warn!("Failed to destroy texture '{}': {e}", self.info.label);
        }
    }
}

/// A shared GPU buffer.
pub struct GpuBuffer {
    id: BufferId,
    size: u64,
    usage: BufferUsage,
    label: String,
    device: Option<Arc<dyn GraphicsDevice>>,
}

impl GpuBuffer {
    /// Creates an uninitialized buffer.
    pub fn create(
        device: &Arc<dyn GraphicsDevice>,
        desc: &BufferDescriptor<'_>,
    ) -> Result<Arc<Self>, ResourceError> {
        let id = device.create_buffer(desc)?;
        Ok(Self::owned(device, id, desc))
    }

    /// Creates a buffer filled with `data`.
    pub fn create_with_data(
        device: &Arc<dyn GraphicsDevice>,
        desc: &BufferDescriptor<'_>,
        data: &[u8],
    ) -> Result<Arc<Self>, ResourceError> {
        let id = device.create_buffer_with_data(desc, data)?;
        Ok(Self::owned(device, id, desc))
    }

    fn owned(device: &Arc<dyn GraphicsDevice>, id: BufferId, desc: &BufferDescriptor<'_>) -> Arc<Self> {
        Arc::new(Self {
            id,
            size: desc.size,
            usage: desc.usage,
            label: desc.label.as_deref().unwrap_or_default().to_string(),
            device: Some(device.clone()),
        })
    }

    /// Wraps a buffer owned by the host. Nothing is destroyed when the handle drops.
    pub fn external(id: BufferId, size: u64, usage: BufferUsage) -> Arc<Self> {
        Arc::new(Self {
            id,
            size,
            usage,
            label: String::new(),
            device: None,
        })
    }

    /// The raw buffer id.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Allowed usages.
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("size", &self.size)
            .field("owned", &self.device.is_some())
            .finish()
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Some(device) = self.device.take() {
            if let Err(e) = device.destroy_buffer(self.id) {
                log::warn!("Failed to destroy buffer '{}': {e}", self.label);
            }
        }
    }
}

/// Builds the descriptor of a 2D render target used by post-processing passes.
///
/// The texture is sampleable, renderable and can take part in copies.
pub fn render_target_descriptor(
    label: &str,
    extent: Extent2D,
    format: TextureFormat,
    mip_level_count: u32,
) -> TextureDescriptor<'_> {
    TextureDescriptor {
        label: Some(Cow::Borrowed(label)),
        size: Extent3D::from_2d(extent),
        mip_level_count: mip_level_count.max(1),
        sample_count: SampleCount::X1,
        dimension: TextureDimension::D2,
        format,
        usage: TextureUsage::TEXTURE_BINDING
            | TextureUsage::RENDER_ATTACHMENT
            | TextureUsage::COPY_SRC
            | TextureUsage::COPY_DST,
    }
}
