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

mod common;

use aurora_core::math::Extent2D;
use aurora_core::renderer::api::{GpuTexture, PipelineStatus, TextureFormat};
use aurora_core::renderer::RenderError;
use aurora_lanes::post_fx::{
    DepthOfField, DepthOfFieldCreateInfo, DepthOfFieldFeatureFlags, DepthOfFieldRenderAttributes,
    DepthOfFieldSettings, FrameDesc, PostFxContext, PostFxContextCreateInfo, PostFxFeatureFlags,
};
use common::{executed_context, render_target, run_context_frame, FrameInputs, MockDevice, MockEncoder};
use std::sync::Arc;

const EXTENT: Extent2D = Extent2D::new(64, 32);

struct Fixture {
    device: Arc<MockDevice>,
    encoder: MockEncoder,
    context: PostFxContext,
    inputs: FrameInputs,
    color: Arc<GpuTexture>,
    dof: DepthOfField,
}

impl Fixture {
    fn new(flags: DepthOfFieldFeatureFlags, create_info: DepthOfFieldCreateInfo) -> Self {
        let device = MockDevice::new();
        let mut encoder = MockEncoder::new();
        let (context, inputs) = executed_context(&device, &mut encoder, EXTENT, 0);
        let color = render_target(&device, "Color", EXTENT, TextureFormat::Rgba16Float);
        let mut dof = DepthOfField::new(create_info);
        dof.prepare_resources(&device.handle(), &mut encoder, &context, flags)
            .unwrap();
        Self {
            device,
            encoder,
            context,
            inputs,
            color,
            dof,
        }
    }

    fn execute(&mut self, settings: &DepthOfFieldSettings) -> Result<(), RenderError> {
        self.encoder.clear();
        self.dof.execute(DepthOfFieldRenderAttributes {
            encoder: &mut self.encoder,
            post_fx: &self.context,
            color: &self.color,
            depth: &self.inputs.depth,
            settings,
        })
    }

    fn next_frame(&mut self, index: u32) {
        run_context_frame(
            &self.device,
            &mut self.encoder,
            &mut self.context,
            &self.inputs,
            EXTENT,
            index,
        );
    }
}

#[test]
fn records_the_full_gather_chain() {
    let mut fixture = Fixture::new(DepthOfFieldFeatureFlags::EMPTY, Default::default());
    fixture.execute(&DepthOfFieldSettings::default()).unwrap();

    let passes = fixture.encoder.drawn_pass_labels();
    // CoC, separation, four dilation mips, two blurs, prefilter, two bokeh, postfilter, combine.
    assert_eq!(passes.len(), 13);
    assert_eq!(passes.first(), Some(&"DepthOfField.CircleOfConfusion"));
    assert_eq!(passes.last(), Some(&"DepthOfField.Combine"));
    assert_eq!(
        passes
            .iter()
            .filter(|p| **p == "DepthOfField.DilationCircleOfConfusion")
            .count(),
        4
    );
    assert!(!passes.contains(&"DepthOfField.TemporalCircleOfConfusion"));
    assert!(fixture.device.textures_labelled("DepthOfField.TemporalCoC").is_empty());
}

#[test]
fn dilation_texture_is_half_resolution_with_a_mip_chain() {
    let fixture = Fixture::new(DepthOfFieldFeatureFlags::EMPTY, Default::default());
    let dilation = fixture.device.textures_labelled("DepthOfField.DilationCoC");
    assert_eq!(dilation.len(), 1);
    assert_eq!(dilation[0].extent, Extent2D::new(32, 16));
    assert_eq!(dilation[0].mip_level_count, 4);
    assert_eq!(dilation[0].format, TextureFormat::Rg16Float);
}

#[test]
fn temporal_smoothing_alternates_history_textures() {
    let mut fixture = Fixture::new(
        DepthOfFieldFeatureFlags::TEMPORAL_SMOOTHING,
        Default::default(),
    );
    assert_eq!(
        fixture.device.textures_labelled("DepthOfField.TemporalCoC").len(),
        2
    );

    fixture.execute(&DepthOfFieldSettings::default()).unwrap();
    let even = fixture.encoder.pass_targets("DepthOfField.TemporalCircleOfConfusion");
    fixture.next_frame(1);
    fixture.execute(&DepthOfFieldSettings::default()).unwrap();
    let odd = fixture.encoder.pass_targets("DepthOfField.TemporalCircleOfConfusion");

    assert_eq!(even.len(), 1);
    assert_eq!(odd.len(), 1);
    assert_ne!(even[0], odd[0]);
    assert_eq!(fixture.encoder.drawn_pass_labels().len(), 14);
}

#[test]
fn bokeh_kernel_is_rewritten_only_when_its_shape_changes() {
    let mut fixture = Fixture::new(DepthOfFieldFeatureFlags::EMPTY, Default::default());
    let kernel = fixture
        .device
        .buffer_labelled("DepthOfField.BokehKernel")
        .unwrap();

    let mut settings = DepthOfFieldSettings::default();
    fixture.execute(&settings).unwrap();
    settings.focus_distance = 4.0;
    fixture.execute(&settings).unwrap();
    assert_eq!(fixture.device.buffer_writes(kernel), 1);

    settings.bokeh_kernel_ring_count = 5;
    fixture.execute(&settings).unwrap();
    assert_eq!(fixture.device.buffer_writes(kernel), 2);
}

#[test]
fn context_must_have_been_executed() {
    let device = MockDevice::new();
    let mut encoder = MockEncoder::new();
    let mut context = PostFxContext::new(PostFxContextCreateInfo::default());
    context
        .prepare_resources(
            &device.handle(),
            &mut encoder,
            FrameDesc {
                width: EXTENT.width,
                height: EXTENT.height,
                ..Default::default()
            },
            PostFxFeatureFlags::EMPTY,
        )
        .unwrap();
    let inputs = FrameInputs::new(&device, EXTENT);
    let color = render_target(&device, "Color", EXTENT, TextureFormat::Rgba16Float);
    let mut dof = DepthOfField::new(DepthOfFieldCreateInfo::default());
    dof.prepare_resources(
        &device.handle(),
        &mut encoder,
        &context,
        DepthOfFieldFeatureFlags::EMPTY,
    )
    .unwrap();

    let result = dof.execute(DepthOfFieldRenderAttributes {
        encoder: &mut encoder,
        post_fx: &context,
        color: &color,
        depth: &inputs.depth,
        settings: &DepthOfFieldSettings::default(),
    });
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));
}

#[test]
fn pending_pipelines_copy_the_input() {
    let device = MockDevice::new();
    let mut encoder = MockEncoder::new();
    let (context, inputs) = executed_context(&device, &mut encoder, EXTENT, 0);
    device.set_async_status(PipelineStatus::Pending);
    let color = render_target(&device, "Color", EXTENT, TextureFormat::Rgba16Float);
    let mut dof = DepthOfField::new(DepthOfFieldCreateInfo {
        enable_async_compilation: true,
        ..Default::default()
    });
    dof.prepare_resources(
        &device.handle(),
        &mut encoder,
        &context,
        DepthOfFieldFeatureFlags::EMPTY,
    )
    .unwrap();

    encoder.clear();
    dof.execute(DepthOfFieldRenderAttributes {
        encoder: &mut encoder,
        post_fx: &context,
        color: &color,
        depth: &inputs.depth,
        settings: &DepthOfFieldSettings::default(),
    })
    .unwrap();
    assert_eq!(encoder.draw_count(), 0);
    assert_eq!(encoder.copies(), [(color.id(), dof.output().unwrap().id())]);
}

#[test]
fn temporal_history_is_cleared_on_creation_only() {
    let mut fixture = Fixture::new(
        DepthOfFieldFeatureFlags::TEMPORAL_SMOOTHING,
        Default::default(),
    );
    let cleared: Vec<_> = fixture
        .encoder
        .pass_targets("Clear render target")
        .into_iter()
        .flatten()
        .filter(|view| {
            fixture
                .device
                .texture_of_view(*view)
                .is_some_and(|t| t.label.starts_with("DepthOfField."))
        })
        .collect();
    assert_eq!(cleared.len(), 2);
    assert_ne!(cleared[0], cleared[1]);
    for view in &cleared {
        assert_eq!(
            fixture.device.texture_of_view(*view).unwrap().label,
            "DepthOfField.TemporalCoC"
        );
    }

    fixture.encoder.clear();
    fixture
        .dof
        .prepare_resources(
            &fixture.device.handle(),
            &mut fixture.encoder,
            &fixture.context,
            DepthOfFieldFeatureFlags::TEMPORAL_SMOOTHING,
        )
        .unwrap();
    assert!(fixture.encoder.pass_labels().is_empty());
}

#[test]
fn temporal_history_parity_survives_frame_index_wraparound() {
    let mut fixture = Fixture::new(
        DepthOfFieldFeatureFlags::TEMPORAL_SMOOTHING,
        Default::default(),
    );
    let settings = DepthOfFieldSettings::default();

    fixture.next_frame(u32::MAX);
    fixture.execute(&settings).unwrap();
    let last = fixture.encoder.pass_targets("DepthOfField.TemporalCircleOfConfusion");
    fixture.next_frame(0);
    fixture.execute(&settings).unwrap();
    let wrapped = fixture.encoder.pass_targets("DepthOfField.TemporalCircleOfConfusion");

    assert_eq!(last.len(), 1);
    assert_eq!(wrapped.len(), 1);
    assert_ne!(last[0], wrapped[0]);
}

#[test]
fn context_from_an_earlier_frame_is_rejected() {
    let mut fixture = Fixture::new(DepthOfFieldFeatureFlags::EMPTY, Default::default());
    fixture.execute(&DepthOfFieldSettings::default()).unwrap();

    fixture
        .context
        .prepare_resources(
            &fixture.device.handle(),
            &mut fixture.encoder,
            FrameDesc {
                index: 1,
                width: EXTENT.width,
                height: EXTENT.height,
                ..Default::default()
            },
            PostFxFeatureFlags::EMPTY,
        )
        .unwrap();
    assert!(!fixture.context.is_executed());
    assert!(fixture.context.depth().is_none());

    let result = fixture.execute(&DepthOfFieldSettings::default());
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));
    assert!(fixture.encoder.commands.is_empty());
}
