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

//! Forward rendering of glTF 2.0 scenes with metallic-roughness materials.
//!
//! [`Model`] flattens a glTF document into materials, packed primitives and a
//! node hierarchy. [`GltfPbrRenderer`] draws one scene of a model in a single
//! render pass, grouping primitives by alpha mode and pipeline.

mod model;
mod renderer;

pub use self::model::*;
pub use self::renderer::*;
