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

//! Shader module descriptors and preprocessor macro sets.
//!
//! Shader sources are opaque to the lanes: a module is identified by its file,
//! entry point, stage and macro set. Every distinct macro set is a distinct
//! compiled variant.

use crate::renderer::api::util::ShaderStage;
use std::borrow::Cow;

/// Represents the source of a shader module.
#[derive(Debug, Clone)]
pub enum ShaderSourceData<'a> {
    /// Inline WGSL source.
    Wgsl(Cow<'a, str>),
    /// A shader file resolved by the backend's shader source factory.
    File(Cow<'a, str>),
}

/// A single `#define NAME DEFINITION` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderMacro {
    /// The macro name.
    pub name: String,
    /// The macro definition.
    pub definition: String,
}

/// An ordered set of shader macros.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderMacros {
    macros: Vec<ShaderMacro>,
}

impl ShaderMacros {
    /// Creates an empty macro set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name` with the given definition, replacing any previous definition.
    pub fn add(&mut self, name: &str, definition: impl ToString) -> &mut Self {
        let definition = definition.to_string();
        match self.macros.iter_mut().find(|m| m.name == name) {
            Some(existing) => existing.definition = definition,
            None => self.macros.push(ShaderMacro {
                name: name.to_string(),
                definition,
            }),
        }
        self
    }

    /// Adds a boolean macro defined as `1` or `0`.
    pub fn add_flag(&mut self, name: &str, enabled: bool) -> &mut Self {
        self.add(name, if enabled { 1 } else { 0 })
    }

    /// Appends every macro of `other`.
    pub fn extend(&mut self, other: &ShaderMacros) -> &mut Self {
        for m in &other.macros {
            self.add(&m.name, &m.definition);
        }
        self
    }

    /// Looks up the definition of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.macros
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.definition.as_str())
    }

    /// Returns the macros as a slice, in insertion order.
    pub fn as_slice(&self) -> &[ShaderMacro] {
        &self.macros
    }

    /// Returns `true` if no macro is defined.
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// Describes a shader module to be created by the `GraphicsDevice`.
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    /// Optional debug label.
    pub label: Option<&'a str>,
    /// Where the source comes from.
    pub source: ShaderSourceData<'a>,
    /// The stage the module is compiled for.
    pub stage: ShaderStage,
    /// The entry point function.
    pub entry_point: &'a str,
    /// Preprocessor macros of this variant.
    pub macros: &'a [ShaderMacro],
}

/// An opaque handle representing a compiled shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderModuleId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_replace_existing_definitions() {
        let mut macros = ShaderMacros::new();
        macros
            .add("BLOOM_OPTION_KARIS_AVERAGE", 0)
            .add_flag("POSTFX_OPTION_INVERTED_DEPTH", true)
            .add("BLOOM_OPTION_KARIS_AVERAGE", 1);
        assert_eq!(macros.as_slice().len(), 2);
        assert_eq!(macros.get("BLOOM_OPTION_KARIS_AVERAGE"), Some("1"));
        assert_eq!(macros.get("POSTFX_OPTION_INVERTED_DEPTH"), Some("1"));
    }

    #[test]
    fn distinct_macro_sets_are_distinct_variants() {
        let mut a = ShaderMacros::new();
        a.add_flag("HALF_RES", true);
        let mut b = ShaderMacros::new();
        b.add_flag("HALF_RES", false);
        assert_ne!(a, b);

        let mut merged = ShaderMacros::new();
        merged.extend(&a).add_flag("EXTRA", true);
        assert_eq!(merged.get("HALF_RES"), Some("1"));
        assert_eq!(merged.as_slice().len(), 2);
    }

    #[test]
    fn file_descriptor_keeps_macros() {
        let mut macros = ShaderMacros::new();
        macros.add("TAA_OPTION_GAUSSIAN_WEIGHTING", 1);
        let descriptor = ShaderModuleDescriptor {
            label: Some("TAA.ResolveHistory"),
            source: ShaderSourceData::File(Cow::Borrowed("TAA_ResolveHistory.fx")),
            stage: ShaderStage::Fragment,
            entry_point: "ResolvePS",
            macros: macros.as_slice(),
        };
        assert_eq!(descriptor.macros.len(), 1);
        assert!(matches!(descriptor.source, ShaderSourceData::File(ref f) if f == "TAA_ResolveHistory.fx"));
    }
}
