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

use aurora_core::math::{Extent2D, LinearRgba};
use aurora_core::renderer::api::{
    BindingResource, LoadOp, PipelineCreateFlags, PipelineStatus, SamplerDescriptor,
    ShaderMacros, ShaderStageFlags, TextureFormat, TextureViewId,
};
use aurora_core::renderer::ResourceError;
use aurora_lanes::{
    clear_render_target, copy_texture, render_full_screen, FullScreenPass, PipelineResourceLayout,
    PsoCreateInfo, RenderTechnique, ShaderResourceKind, ShaderStageInfo, ShaderVariableType,
    TechniqueState,
};
use common::{render_target, uniform_buffer, Command, MockDevice, MockEncoder};
use std::sync::Arc;

const SHADER: &str = "Tonemap.fx";

fn layout() -> PipelineResourceLayout {
    PipelineResourceLayout::new()
        .add_variable(
            ShaderStageFlags::FRAGMENT,
            "cbAttribs",
            ShaderResourceKind::ConstantBuffer,
            ShaderVariableType::Static,
        )
        .add_variable(
            ShaderStageFlags::FRAGMENT,
            "g_Texture",
            ShaderResourceKind::Texture,
            ShaderVariableType::Mutable,
        )
        .add_immutable_sampler(
            ShaderStageFlags::FRAGMENT,
            "g_Sampler",
            SamplerDescriptor::LINEAR_CLAMP,
        )
}

fn technique(device: &Arc<MockDevice>, flags: PipelineCreateFlags) -> RenderTechnique {
    let macros = ShaderMacros::new();
    let layout = layout();
    let formats = [TextureFormat::Rgba8Unorm];
    let mut technique = RenderTechnique::new();
    technique.initialize_pso(
        &device.handle(),
        &PsoCreateInfo::full_screen(
            "Tonemap",
            &macros,
            ShaderStageInfo {
                file: SHADER,
                entry_point: "TonemapPS",
                macros: &macros,
            },
            &layout,
            &formats,
            flags,
        ),
    );
    technique
}

#[test]
fn synchronous_pipeline_is_ready_at_once() {
    let device = MockDevice::new();
    let mut technique = technique(&device, PipelineCreateFlags::EMPTY);
    assert_eq!(technique.state(), TechniqueState::Ready);
    assert!(technique.is_ready());
    assert_eq!(technique.name(), "Tonemap");
    assert_eq!(
        device.pipeline_label(technique.pipeline().unwrap()).as_deref(),
        Some("Tonemap")
    );

    let files: Vec<_> = device.shaders().into_iter().map(|s| s.file).collect();
    assert_eq!(files, ["FullScreenTriangleVS.fx", SHADER]);

    drop(technique);
    assert_eq!(device.live_pipelines(), 0);
}

#[test]
fn failed_releases_do_not_stop_the_teardown() {
    let device = MockDevice::new();
    let technique = technique(&device, PipelineCreateFlags::EMPTY);
    device.fail_layout_destroys();

    drop(technique);
    // Pipeline layout, bind group layout and the immutable sampler.
    assert_eq!(device.failed_destroys(), 3);
    assert_eq!(device.live_pipelines(), 0);
}

#[test]
fn asynchronous_pipeline_is_polled() {
    let device = MockDevice::new();
    device.set_async_status(PipelineStatus::Pending);
    let mut technique = technique(&device, PipelineCreateFlags::ASYNCHRONOUS);

    assert_eq!(technique.state(), TechniqueState::Compiling);
    assert!(!technique.is_ready());
    device.finish_pending_pipelines(PipelineStatus::Ready);
    // The state only moves when polled.
    assert_eq!(technique.state(), TechniqueState::Compiling);
    assert!(technique.is_ready());
    assert_eq!(technique.state(), TechniqueState::Ready);
}

#[test]
fn asynchronous_failure_is_final() {
    let device = MockDevice::new();
    device.set_async_status(PipelineStatus::Pending);
    let mut technique = technique(&device, PipelineCreateFlags::ASYNCHRONOUS);

    device.finish_pending_pipelines(PipelineStatus::Failed);
    assert!(!technique.is_ready());
    assert!(technique.has_failed());
    assert!(technique.pipeline().is_none());
    assert!(technique.create_shader_resource_binding(false).is_none());
}

#[test]
fn shader_compilation_failure_creates_no_pipeline() {
    let device = MockDevice::new();
    device.fail_shader(SHADER);
    let mut technique = technique(&device, PipelineCreateFlags::EMPTY);

    assert_eq!(technique.state(), TechniqueState::Failed);
    assert!(!technique.is_ready());
    assert!(technique.pipeline().is_none());
    assert_eq!(device.pipelines_created(), 0);
    assert!(technique.create_shader_resource_binding(false).is_none());
}

#[test]
fn commit_rebuilds_only_after_a_change() {
    let device = MockDevice::new();
    let mut technique = technique(&device, PipelineCreateFlags::EMPTY);
    let extent = Extent2D::new(8, 8);
    let first = render_target(&device, "First", extent, TextureFormat::Rgba8Unorm);
    let second = render_target(&device, "Second", extent, TextureFormat::Rgba8Unorm);
    let constants = uniform_buffer(&device, "Constants", 64);

    let mut srb = technique.create_shader_resource_binding(false).unwrap();
    assert!(srb.is_bound("g_Sampler"));
    srb.set("g_Texture", first.srv());
    assert!(matches!(
        srb.commit(),
        Err(ResourceError::UnboundVariable(name)) if name == "cbAttribs"
    ));

    srb.set("cbAttribs", constants.id());
    let group = srb.commit().unwrap();
    srb.set("g_Texture", first.srv());
    assert_eq!(srb.commit().unwrap(), group);

    srb.set("g_Texture", second.srv());
    let rebuilt = srb.commit().unwrap();
    assert_ne!(rebuilt, group);
    assert_eq!(device.bind_group_entries(rebuilt).len(), 3);

    srb.set("g_Missing", second.srv());
    assert_eq!(srb.commit().unwrap(), rebuilt);
}

#[test]
fn static_variables_are_shared_on_request() {
    let device = MockDevice::new();
    let mut technique = technique(&device, PipelineCreateFlags::EMPTY);
    let constants = uniform_buffer(&device, "Constants", 64);
    technique.set_static_variable("cbAttribs", constants.id());

    let with_static = technique.create_shader_resource_binding(true).unwrap();
    let without = technique.create_shader_resource_binding(false).unwrap();
    assert!(with_static.is_bound("cbAttribs"));
    assert!(!without.is_bound("cbAttribs"));

    technique.initialize_srb(true);
    assert!(technique.is_initialized_srb());
    let extent = Extent2D::new(8, 8);
    let texture = render_target(&device, "Source", extent, TextureFormat::Rgba8Unorm);
    let other = uniform_buffer(&device, "Other", 64);
    let srb = technique.srb_mut().unwrap();
    srb.set("g_Texture", texture.srv());
    // Static variables bound by the technique ignore rebinding.
    srb.set("cbAttribs", other.id());
    let group = srb.commit().unwrap();
    assert_eq!(
        device.bind_group_entries(group)[0].resource,
        BindingResource::from(constants.id())
    );
    assert!(technique.pipeline_and_srb().is_some());
    technique.release_srb();
    assert!(!technique.is_initialized_srb());
}

#[test]
fn full_screen_pass_draws_one_triangle() {
    let device = MockDevice::new();
    let mut technique = technique(&device, PipelineCreateFlags::EMPTY);
    let extent = Extent2D::new(8, 8);
    let source = render_target(&device, "Source", extent, TextureFormat::Rgba8Unorm);
    let target = render_target(&device, "Target", extent, TextureFormat::Rgba8Unorm);
    let constants = uniform_buffer(&device, "Constants", 64);
    technique.set_static_variable("cbAttribs", constants.id());
    technique.initialize_srb(true);

    let mut encoder = MockEncoder::new();
    let view = target.rtv().unwrap();
    let (pipeline, srb) = technique.pipeline_and_srb().unwrap();
    srb.set("g_Texture", source.srv());
    render_full_screen(
        &mut encoder,
        pipeline,
        srb,
        &FullScreenPass::new("Tonemap", &[view]).with_clear(LinearRgba::BLACK),
    )
    .unwrap();

    assert_eq!(encoder.commands.len(), 5);
    assert_eq!(
        encoder.commands[0],
        Command::BeginPass {
            label: "Tonemap".to_string(),
            color_targets: vec![view],
            cleared: true,
            depth_stencil: None,
        }
    );
    assert_eq!(encoder.commands[1], Command::SetPipeline(pipeline));
    assert_eq!(
        encoder.commands[4],
        Command::Draw {
            vertices: 0..3,
            instances: 0..1
        }
    );
}

#[test]
fn full_screen_pass_keeps_target_contents_by_default() {
    let targets = [TextureViewId(7)];
    let pass = FullScreenPass::new("Composite", &targets);
    assert_eq!(pass.load, LoadOp::Load);
    assert!(pass.depth_stencil.is_none());
    assert_eq!(
        pass.with_clear(LinearRgba::BLACK).load,
        LoadOp::Clear(LinearRgba::BLACK)
    );
}

#[test]
fn clear_and_copy_helpers() {
    let device = MockDevice::new();
    let mut encoder = MockEncoder::new();
    let large = render_target(&device, "Large", Extent2D::new(16, 16), TextureFormat::Rgba8Unorm);
    let small = render_target(&device, "Small", Extent2D::new(8, 8), TextureFormat::Rgba8Unorm);
    let empty = render_target(&device, "Empty", Extent2D::new(0, 0), TextureFormat::Rgba8Unorm);

    clear_render_target(&mut encoder, small.rtv().unwrap(), LinearRgba::TRANSPARENT);
    copy_texture(&mut encoder, &large, &small);
    copy_texture(&mut encoder, &large, &empty);

    assert_eq!(encoder.pass_labels(), ["Clear render target"]);
    assert_eq!(encoder.draw_count(), 0);
    assert_eq!(encoder.copies(), [(large.id(), small.id())]);
}
