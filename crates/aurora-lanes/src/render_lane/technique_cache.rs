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

//! Per-effect cache of render techniques keyed by technique kind and feature flags.

use super::technique::RenderTechnique;
use ahash::AHashMap;
use std::hash::Hash;

/// Identifies one pipeline variant of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTechniqueKey<T, F> {
    /// Which sub-pass the pipeline implements.
    pub technique: T,
    /// The feature flags the variant was compiled with.
    pub feature_flags: F,
}

impl<T, F> RenderTechniqueKey<T, F> {
    /// Creates a key.
    pub const fn new(technique: T, feature_flags: F) -> Self {
        Self {
            technique,
            feature_flags,
        }
    }
}

/// Owns every technique of one effect instance.
///
/// Techniques are boxed so their addresses stay stable while the map grows.
#[derive(Debug)]
pub struct RenderTechniqueCache<T, F> {
    techniques: AHashMap<RenderTechniqueKey<T, F>, Box<RenderTechnique>>,
}

impl<T, F> Default for RenderTechniqueCache<T, F> {
    fn default() -> Self {
        Self {
            techniques: AHashMap::new(),
        }
    }
}

impl<T, F> RenderTechniqueCache<T, F>
where
    T: Copy + Eq + Hash,
    F: Copy + Eq + Hash,
{
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the technique for `(technique, flags)`, inserting an uninitialized one on a miss.
    pub fn get_or_create(&mut self, technique: T, feature_flags: F) -> &mut RenderTechnique {
        self.techniques
            .entry(RenderTechniqueKey::new(technique, feature_flags))
            .or_default()
    }

    /// Returns the technique for `(technique, flags)` if it exists.
    pub fn get(&self, technique: T, feature_flags: F) -> Option<&RenderTechnique> {
        self.techniques
            .get(&RenderTechniqueKey::new(technique, feature_flags))
            .map(|t| t.as_ref())
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, technique: T, feature_flags: F) -> Option<&mut RenderTechnique> {
        self.techniques
            .get_mut(&RenderTechniqueKey::new(technique, feature_flags))
            .map(|t| t.as_mut())
    }

    /// Returns `true` if an entry exists for `(technique, flags)`.
    pub fn contains(&self, technique: T, feature_flags: F) -> bool {
        self.techniques
            .contains_key(&RenderTechniqueKey::new(technique, feature_flags))
    }

    /// Number of cached techniques.
    pub fn len(&self) -> usize {
        self.techniques.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.techniques.is_empty()
    }

    /// Polls every listed technique and returns `true` if all can be bound.
    ///
    /// A key without an entry counts as not ready. Every technique is polled even
    /// after a pending one is found.
    pub fn all_ready(&mut self, keys: &[(T, F)]) -> bool {
        keys.iter().fold(true, |ready, &(technique, flags)| {
            let this = self
                .get_mut(technique, flags)
                .is_some_and(|t| t.is_ready());
            ready && this
        })
    }

    /// Drops the bindings of every technique and keeps their pipelines.
    pub fn release_srbs(&mut self) {
        for technique in self.techniques.values_mut() {
            technique.release_srb();
        }
    }

    /// Drops every technique.
    pub fn clear(&mut self) {
        self.techniques.clear();
    }
}
