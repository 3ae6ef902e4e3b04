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

//! Authoring format for the settings of every effect.
//!
//! Settings are plain structs handed to `execute` each frame. [`PostFxSettings`]
//! groups them so a host can keep them in one RON file; every field is optional
//! and falls back to the effect default.

use super::{
    BloomSettings, DepthOfFieldSettings, ScreenSpaceReflectionSettings, SuperResolutionSettings,
    TemporalAntiAliasingSettings,
};
use serde::{Deserialize, Serialize};

/// Errors raised while loading or saving [`PostFxSettings`].
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The text is not valid RON for the settings schema.
    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The settings could not be written out.
    #[error("RON serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// A value is outside its allowed range.
    #[error("Invalid value for {field}: {reason}")]
    OutOfRange {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What the value must satisfy.
        reason: &'static str,
    },
}

/// The settings of every post-processing effect.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostFxSettings {
    /// Bloom.
    pub bloom: BloomSettings,
    /// Depth of field.
    pub depth_of_field: DepthOfFieldSettings,
    /// Screen-space reflections.
    pub screen_space_reflection: ScreenSpaceReflectionSettings,
    /// Upscaling.
    pub super_resolution: SuperResolutionSettings,
    /// Temporal anti-aliasing.
    pub temporal_anti_aliasing: TemporalAntiAliasingSettings,
}

fn check(ok: bool, field: &'static str, reason: &'static str) -> Result<(), SettingsError> {
    if ok {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange { field, reason })
    }
}

fn unit(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

impl PostFxSettings {
    /// Parses and validates settings written in RON.
    pub fn from_ron_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = ron::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Writes the settings as pretty-printed RON.
    pub fn to_ron_string(&self) -> Result<String, SettingsError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let b = &self.bloom;
        check(b.intensity >= 0.0, "bloom.intensity", "must be non-negative")?;
        check(unit(b.radius), "bloom.radius", "must be in [0, 1]")?;
        check(b.threshold >= 0.0, "bloom.threshold", "must be non-negative")?;
        check(unit(b.soft_threshold), "bloom.soft_threshold", "must be in [0, 1]")?;

        let d = &self.depth_of_field;
        check(
            unit(d.temporal_stability_factor),
            "depth_of_field.temporal_stability_factor",
            "must be in [0, 1]",
        )?;
        check(
            d.max_circle_of_confusion > 0.0,
            "depth_of_field.max_circle_of_confusion",
            "must be positive",
        )?;
        check(
            (1..=8).contains(&d.bokeh_kernel_ring_count),
            "depth_of_field.bokeh_kernel_ring_count",
            "must be in [1, 8]",
        )?;
        check(
            (1..=16).contains(&d.bokeh_kernel_ring_density),
            "depth_of_field.bokeh_kernel_ring_density",
            "must be in [1, 16]",
        )?;

        let s = &self.screen_space_reflection;
        check(
            unit(s.roughness_threshold),
            "screen_space_reflection.roughness_threshold",
            "must be in [0, 1]",
        )?;
        check(
            s.depth_buffer_thickness >= 0.0,
            "screen_space_reflection.depth_buffer_thickness",
            "must be non-negative",
        )?;
        check(
            s.roughness_channel < 4,
            "screen_space_reflection.roughness_channel",
            "must be 0 (r), 1 (g), 2 (b) or 3 (a)",
        )?;
        check(
            unit(s.temporal_radiance_stability_factor),
            "screen_space_reflection.temporal_radiance_stability_factor",
            "must be in [0, 1]",
        )?;

        check(
            unit(self.super_resolution.sharpness),
            "super_resolution.sharpness",
            "must be in [0, 1]",
        )?;

        check(
            unit(self.temporal_anti_aliasing.temporal_stability_factor),
            "temporal_anti_aliasing.temporal_stability_factor",
            "must be in [0, 1]",
        )
    }
}
