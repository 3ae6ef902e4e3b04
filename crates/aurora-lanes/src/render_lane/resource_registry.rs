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

//! A fixed-size table of GPU resources addressed by an effect-specific slot enum.
//!
//! Every effect declares one enum whose variants name its logical resources
//! (inputs, constant buffers, intermediate targets, outputs). The enum maps each
//! variant to a dense index, so the registry is a plain vector sized once at
//! construction. Array-like resources (mip chains, history pairs) are variants
//! carrying an index and map to consecutive slots.

use aurora_core::renderer::api::{GpuBuffer, GpuTexture, TextureViewId};
use std::marker::PhantomData;
use std::sync::Arc;

/// An enum naming the resources of one effect.
pub trait ResourceSlot: Copy + std::fmt::Debug {
    /// Number of distinct slots.
    const COUNT: usize;

    /// Dense index of this slot in `0..COUNT`.
    fn index(self) -> usize;
}

/// The content of a registry slot.
#[derive(Debug, Clone, Default)]
pub enum RegistryEntry {
    /// Nothing stored.
    #[default]
    Empty,
    /// A shared texture.
    Texture(Arc<GpuTexture>),
    /// A shared buffer.
    Buffer(Arc<GpuBuffer>),
}

impl RegistryEntry {
    /// Returns `true` if the slot holds nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, RegistryEntry::Empty)
    }
}

impl From<Arc<GpuTexture>> for RegistryEntry {
    fn from(texture: Arc<GpuTexture>) -> Self {
        RegistryEntry::Texture(texture)
    }
}

impl From<Arc<GpuBuffer>> for RegistryEntry {
    fn from(buffer: Arc<GpuBuffer>) -> Self {
        RegistryEntry::Buffer(buffer)
    }
}

/// Owns the GPU resources of one effect instance.
#[derive(Debug)]
pub struct ResourceRegistry<S: ResourceSlot> {
    entries: Vec<RegistryEntry>,
    _slot: PhantomData<S>,
}

impl<S: ResourceSlot> Default for ResourceRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ResourceSlot> ResourceRegistry<S> {
    /// Creates a registry with every slot empty.
    pub fn new() -> Self {
        Self {
            entries: vec![RegistryEntry::Empty; S::COUNT],
            _slot: PhantomData,
        }
    }

    #[inline]
    fn slot_index(slot: S) -> usize {
        let index = slot.index();
        debug_assert!(index < S::COUNT, "slot {slot:?} maps outside the registry");
        index
    }

    /// Stores `entry` in `slot`, replacing what was there.
    pub fn insert(&mut self, slot: S, entry: impl Into<RegistryEntry>) {
        self.entries[Self::slot_index(slot)] = entry.into();
    }

    /// Returns the content of `slot`.
    pub fn get(&self, slot: S) -> &RegistryEntry {
        &self.entries[Self::slot_index(slot)]
    }

    /// Returns `true` if `slot` holds nothing.
    pub fn is_empty(&self, slot: S) -> bool {
        self.get(slot).is_empty()
    }

    /// The texture stored in `slot`, if any.
    pub fn texture(&self, slot: S) -> Option<&Arc<GpuTexture>> {
        match self.get(slot) {
            RegistryEntry::Texture(t) => Some(t),
            _ => None,
        }
    }

    /// The buffer stored in `slot`, if any.
    pub fn buffer(&self, slot: S) -> Option<&Arc<GpuBuffer>> {
        match self.get(slot) {
            RegistryEntry::Buffer(b) => Some(b),
            _ => None,
        }
    }

    /// Default shader-resource view of the texture in `slot`.
    pub fn texture_srv(&self, slot: S) -> Option<TextureViewId> {
        self.texture(slot).map(|t| t.srv())
    }

    /// Default render-target view of the texture in `slot`.
    pub fn texture_rtv(&self, slot: S) -> Option<TextureViewId> {
        self.texture(slot).and_then(|t| t.rtv())
    }

    /// Default depth-stencil view of the texture in `slot`.
    pub fn texture_dsv(&self, slot: S) -> Option<TextureViewId> {
        self.texture(slot).and_then(|t| t.dsv())
    }

    /// Single-mip view of the texture in `slot`.
    pub fn texture_mip_view(&self, slot: S, mip: u32) -> Option<TextureViewId> {
        self.texture(slot).and_then(|t| t.mip_view(mip))
    }

    /// Empties `slot`, dropping this registry's reference to its resource.
    pub fn release(&mut self, slot: S) {
        self.entries[Self::slot_index(slot)] = RegistryEntry::Empty;
    }

    /// Empties every slot from `first` to `last`, both inclusive.
    pub fn release_range(&mut self, first: S, last: S) {
        let (first, last) = (Self::slot_index(first), Self::slot_index(last));
        for entry in &mut self.entries[first..=last] {
            *entry = RegistryEntry::Empty;
        }
    }

    /// Empties every slot.
    pub fn clear(&mut self) {
        self.entries.fill(RegistryEntry::Empty);
    }
}
