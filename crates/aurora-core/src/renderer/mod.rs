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

//! Backend-agnostic rendering contracts.
//!
//! This module defines the "common language" spoken between the render lanes and a
//! concrete graphics backend: the [`GraphicsDevice`] / [`CommandEncoder`] traits, the
//! descriptors and opaque identifiers they exchange, the reference-counted
//! [`GpuTexture`] / [`GpuBuffer`] handles and the error types.
//!
//! Lanes only ever talk to these traits. A backend (or a recording mock in tests)
//! provides the implementation.

pub mod api;
pub mod error;
pub mod traits;

pub use self::api::*;
pub use self::error::{PipelineError, RenderError, ResourceError, ShaderError};
pub use self::traits::{CommandEncoder, GraphicsDevice, RenderPass};
