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

//! Render lanes and the building blocks they share.

pub mod gltf_pbr;
mod passes;
pub mod post_fx;
mod resource_registry;
mod technique;
mod technique_cache;

pub use self::passes::{copy_texture, clear_render_target, render_full_screen, FullScreenPass};
pub use self::resource_registry::{RegistryEntry, ResourceRegistry, ResourceSlot};
pub use self::technique::{
    PipelineResourceLayout, PsoCreateInfo, RenderTechnique, ShaderResourceBinding,
    ShaderResourceKind, ShaderStageInfo, ShaderVariableType, TechniqueState,
};
pub use self::technique_cache::{RenderTechniqueCache, RenderTechniqueKey};
