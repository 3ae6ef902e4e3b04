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

use aurora_core::math::{Extent2D, Vec2};
use aurora_core::renderer::api::{GpuTexture, PipelineStatus, TextureFormat};
use aurora_core::renderer::RenderError;
use aurora_lanes::post_fx::{
    FrameDesc, PostFxContext, PostFxContextCreateInfo, PostFxFeatureFlags, PostFxRenderAttributes,
    TemporalAntiAliasing, TemporalAntiAliasingCreateInfo, TemporalAntiAliasingFeatureFlags,
    TemporalAntiAliasingRenderAttributes, TemporalAntiAliasingSettings,
};
use common::{render_target, run_context_frame, FrameInputs, MockDevice, MockEncoder};
use std::sync::Arc;

const EXTENT: Extent2D = Extent2D::new(64, 32);

struct Fixture {
    device: Arc<MockDevice>,
    encoder: MockEncoder,
    context: PostFxContext,
    inputs: FrameInputs,
    color: Arc<GpuTexture>,
    taa: TemporalAntiAliasing,
}

impl Fixture {
    fn new(create_info: TemporalAntiAliasingCreateInfo) -> Self {
        let device = MockDevice::new();
        let inputs = FrameInputs::new(&device, EXTENT);
        let color = render_target(&device, "Color", EXTENT, TextureFormat::Rgba16Float);
        Self {
            device,
            encoder: MockEncoder::new(),
            context: PostFxContext::new(PostFxContextCreateInfo::default()),
            inputs,
            color,
            taa: TemporalAntiAliasing::new(create_info),
        }
    }

    /// Runs the context for `frame` and prepares `stream` for it.
    fn begin_frame(&mut self, frame: u32, stream: u32) {
        run_context_frame(
            &self.device,
            &mut self.encoder,
            &mut self.context,
            &self.inputs,
            EXTENT,
            frame,
        );
        self.prepare(stream);
        self.encoder.clear();
    }

    fn prepare(&mut self, stream: u32) {
        self.taa
            .prepare_resources(
                &self.device.handle(),
                &mut self.encoder,
                &self.context,
                stream,
                TemporalAntiAliasingFeatureFlags::EMPTY,
            )
            .unwrap();
    }

    /// Prepares the context for `frame` without executing it.
    fn prepare_context(&mut self, frame: u32, flags: PostFxFeatureFlags) {
        self.context
            .prepare_resources(
                &self.device.handle(),
                &mut self.encoder,
                FrameDesc {
                    index: frame,
                    width: EXTENT.width,
                    height: EXTENT.height,
                    ..Default::default()
                },
                flags,
            )
            .unwrap();
    }

    fn execute(
        &mut self,
        stream: u32,
        settings: &TemporalAntiAliasingSettings,
    ) -> Result<(), RenderError> {
        self.taa.execute(TemporalAntiAliasingRenderAttributes {
            encoder: &mut self.encoder,
            post_fx: &self.context,
            color: &self.color,
            accumulation_buffer_index: stream,
            settings,
        })
    }
}

#[test]
fn consecutive_frames_keep_their_history() {
    let mut fixture = Fixture::new(Default::default());
    let settings = TemporalAntiAliasingSettings::default();

    fixture.begin_frame(0, 0);
    fixture.execute(0, &settings).unwrap();
    assert!(fixture.taa.accumulation_was_reset(0));

    fixture.begin_frame(1, 0);
    fixture.execute(0, &settings).unwrap();
    assert!(!fixture.taa.accumulation_was_reset(0));
    assert_eq!(
        fixture.encoder.drawn_pass_labels(),
        ["TemporalAntiAliasing.ComputeTemporalAccumulation"]
    );
}

#[test]
fn skipped_frame_resets_the_history() {
    let mut fixture = Fixture::new(Default::default());
    let settings = TemporalAntiAliasingSettings::default();

    fixture.begin_frame(0, 0);
    fixture.execute(0, &settings).unwrap();
    fixture.begin_frame(1, 0);
    fixture.execute(0, &settings).unwrap();
    fixture.begin_frame(3, 0);
    fixture.execute(0, &settings).unwrap();
    assert!(fixture.taa.accumulation_was_reset(0));
}

#[test]
fn explicit_reset_is_honoured() {
    let mut fixture = Fixture::new(Default::default());
    fixture.begin_frame(0, 0);
    fixture.execute(0, &Default::default()).unwrap();
    fixture.begin_frame(1, 0);
    fixture
        .execute(
            0,
            &TemporalAntiAliasingSettings {
                reset_accumulation: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(fixture.taa.accumulation_was_reset(0));
}

#[test]
fn history_textures_alternate_by_frame_parity() {
    let mut fixture = Fixture::new(Default::default());
    let settings = TemporalAntiAliasingSettings::default();

    fixture.begin_frame(0, 0);
    fixture.execute(0, &settings).unwrap();
    let even = fixture.taa.accumulated_frame(0, false).unwrap().clone();
    assert_eq!(
        fixture
            .encoder
            .pass_targets("TemporalAntiAliasing.ComputeTemporalAccumulation"),
        [vec![even.rtv().unwrap()]]
    );

    fixture.begin_frame(1, 0);
    fixture.execute(0, &settings).unwrap();
    let odd = fixture.taa.accumulated_frame(0, false).unwrap();
    assert_ne!(odd.id(), even.id());
    assert_eq!(
        fixture.taa.accumulated_frame(0, true).unwrap().id(),
        even.id()
    );
}

#[test]
fn streams_are_independent() {
    let mut fixture = Fixture::new(Default::default());
    let settings = TemporalAntiAliasingSettings::default();

    fixture.begin_frame(0, 0);
    fixture.execute(0, &settings).unwrap();
    fixture.begin_frame(1, 0);
    fixture.execute(0, &settings).unwrap();
    fixture
        .taa
        .prepare_resources(
            &fixture.device.handle(),
            &mut fixture.encoder,
            &fixture.context,
            7,
            TemporalAntiAliasingFeatureFlags::EMPTY,
        )
        .unwrap();
    fixture.execute(7, &settings).unwrap();

    assert_eq!(fixture.taa.accumulation_buffer_count(), 2);
    assert!(!fixture.taa.accumulation_was_reset(0));
    assert!(fixture.taa.accumulation_was_reset(7));
    assert_ne!(
        fixture.taa.accumulated_frame(0, false).unwrap().id(),
        fixture.taa.accumulated_frame(7, false).unwrap().id()
    );

    assert!(fixture.taa.release_accumulation_buffer(7));
    assert!(!fixture.taa.release_accumulation_buffer(7));
    assert_eq!(fixture.taa.accumulation_buffer_count(), 1);
}

#[test]
fn unknown_stream_is_rejected() {
    let mut fixture = Fixture::new(Default::default());
    fixture.begin_frame(0, 0);
    let result = fixture.execute(3, &Default::default());
    assert!(matches!(result, Err(RenderError::NotInitialized)));
}

#[test]
fn jitter_is_zero_until_the_pipeline_is_ready() {
    let mut fixture = Fixture::new(Default::default());
    fixture.begin_frame(0, 0);
    assert_eq!(fixture.taa.jitter_offset(0), Vec2::ZERO);

    fixture.execute(0, &Default::default()).unwrap();
    assert!(fixture.taa.is_ready());
    let jitter = fixture.taa.jitter_offset(0);
    assert_ne!(jitter, Vec2::ZERO);
    assert!(jitter.x.abs() <= 1.0 / EXTENT.width as f32);
    assert!(jitter.y.abs() <= 1.0 / EXTENT.height as f32);
    assert_eq!(fixture.taa.jitter_offset(5), Vec2::ZERO);
}

#[test]
fn pending_pipeline_copies_color_into_history() {
    let mut fixture = Fixture::new(TemporalAntiAliasingCreateInfo {
        enable_async_compilation: true,
        ..Default::default()
    });
    fixture.device.set_async_status(PipelineStatus::Pending);
    fixture.begin_frame(0, 0);
    fixture.execute(0, &Default::default()).unwrap();

    assert!(!fixture.taa.is_ready());
    let history = fixture.taa.accumulated_frame(0, false).unwrap();
    assert_eq!(fixture.encoder.copies(), [(fixture.color.id(), history.id())]);
    assert_eq!(fixture.encoder.draw_count(), 0);
}

#[test]
fn resize_reallocates_and_resets_the_stream() {
    let mut fixture = Fixture::new(Default::default());
    fixture.begin_frame(0, 0);
    fixture.execute(0, &Default::default()).unwrap();
    let before = fixture.taa.accumulated_frame(0, false).unwrap().clone();

    let larger = Extent2D::new(128, 64);
    fixture.inputs = FrameInputs::new(&fixture.device, larger);
    fixture.color = render_target(&fixture.device, "Color", larger, TextureFormat::Rgba16Float);
    run_context_frame(
        &fixture.device,
        &mut fixture.encoder,
        &mut fixture.context,
        &fixture.inputs,
        larger,
        1,
    );
    fixture
        .taa
        .prepare_resources(
            &fixture.device.handle(),
            &mut fixture.encoder,
            &fixture.context,
            0,
            TemporalAntiAliasingFeatureFlags::EMPTY,
        )
        .unwrap();
    fixture.execute(0, &Default::default()).unwrap();

    let after = fixture.taa.accumulated_frame(0, false).unwrap();
    assert_eq!(after.extent(), larger);
    assert_ne!(after.id(), before.id());
    assert!(fixture.taa.accumulation_was_reset(0));
}

#[test]
fn new_history_is_cleared_once() {
    let mut fixture = Fixture::new(Default::default());
    run_context_frame(
        &fixture.device,
        &mut fixture.encoder,
        &mut fixture.context,
        &fixture.inputs,
        EXTENT,
        0,
    );
    fixture.encoder.clear();
    fixture.prepare(0);

    let current = fixture.taa.accumulated_frame(0, false).unwrap();
    let previous = fixture.taa.accumulated_frame(0, true).unwrap();
    assert_eq!(
        fixture.encoder.pass_targets("Clear render target"),
        [vec![current.rtv().unwrap()], vec![previous.rtv().unwrap()]]
    );

    fixture.encoder.clear();
    fixture.prepare(0);
    assert!(fixture.encoder.pass_labels().is_empty());
}

#[test]
fn stale_context_is_rejected() {
    let mut fixture = Fixture::new(Default::default());
    fixture.begin_frame(0, 0);
    fixture.execute(0, &Default::default()).unwrap();

    fixture.prepare_context(1, PostFxFeatureFlags::EMPTY);
    fixture.prepare(0);
    fixture.encoder.clear();
    let result = fixture.execute(0, &Default::default());
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));
    assert!(fixture.encoder.commands.is_empty());
    assert!(fixture.context.camera().is_none());
}

#[test]
fn context_flag_change_releases_stream_bindings_with_their_layout() {
    let mut fixture = Fixture::new(Default::default());
    fixture.begin_frame(0, 0);
    fixture.execute(0, &Default::default()).unwrap();
    let pipelines = fixture.device.pipelines_created();

    fixture.prepare_context(1, PostFxFeatureFlags::REVERSED_DEPTH);
    fixture
        .context
        .execute(PostFxRenderAttributes {
            encoder: &mut fixture.encoder,
            camera: &fixture.inputs.camera,
            previous_camera: &fixture.inputs.previous_camera,
            depth: &fixture.inputs.depth,
            previous_depth: &fixture.inputs.previous_depth,
            motion_vectors: &fixture.inputs.motion_vectors,
        })
        .unwrap();
    fixture.prepare(0);
    fixture.execute(0, &Default::default()).unwrap();

    assert_eq!(fixture.device.orphaned_bind_groups(), 0);
    // Blue noise and accumulation are both rebuilt for the new macros.
    assert_eq!(fixture.device.pipelines_created(), pipelines + 2);
}
