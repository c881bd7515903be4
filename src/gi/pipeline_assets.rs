use std::path::Path;

use bevy::asset::io::AssetSourceId;
use bevy::asset::AssetPath;
use bevy::prelude::*;
use bevy::render::render_resource::{DynamicUniformBuffer, UniformBuffer};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bevy::render::Extract;

use crate::gi::constants::{
    SHADER_CASCADE_MERGE,
    SHADER_DOWNSAMPLE,
    SHADER_JUMP_FLOOD,
    SHADER_LIGHT_OCCLUSION,
    SHADER_SEED,
    SHADER_SIGNED_DISTANCE,
    SHADER_TYPES,
};
use crate::gi::lights::{PointLightCollection, PointLightSample, RcPointLight2D};
use crate::gi::outputs::RadianceCascadesOutputs;
use crate::gi::passes::{encode_frame, FrameResult, PassRecording};
use crate::gi::resource::FrameState;
use crate::gi::types_gpu::{GpuPassParams, GpuPointLights, GpuRadianceCascadesParams};

/// Keeps every embedded shader loaded, imports included.
#[rustfmt::skip]
#[derive(Default, Resource)]
pub(crate) struct EmbeddedShaderDependencies {
    loaded_shaders: Vec<Handle<Shader>>,
}

#[rustfmt::skip]
pub(crate) fn system_load_embedded_shader_dependencies(
    mut embedded_shader_deps: ResMut<EmbeddedShaderDependencies>,
        asset_server:         Res<AssetServer>,
) {
    for shader_file in [
        SHADER_TYPES,
        SHADER_SEED,
        SHADER_JUMP_FLOOD,
        SHADER_SIGNED_DISTANCE,
        SHADER_CASCADE_MERGE,
        SHADER_DOWNSAMPLE,
        SHADER_LIGHT_OCCLUSION,
    ] {
        embedded_shader_deps.loaded_shaders.push(load_embedded_shader(&asset_server, shader_file));
    }
}

pub(crate) fn load_embedded_shader(asset_server: &AssetServer, shader_file: &str) -> Handle<Shader>
{
    let source = AssetSourceId::from("embedded");
    let path = Path::new("bevy_radiance_cascades_2d").join("gi/shaders/");
    asset_server.load(AssetPath::from_path(&path.join(shader_file)).with_source(&source))
}

/// Render-world buffers and the pass list of the current frame.
#[rustfmt::skip]
#[derive(Default, Resource)]
pub struct RadianceCascadesPipelineAssets {
    pub params:       UniformBuffer<GpuRadianceCascadesParams>,
    pub point_lights: UniformBuffer<GpuPointLights>,
    pub pass_params:  DynamicUniformBuffer<GpuPassParams>,
    pub recording:    PassRecording,
    /// Dynamic offset into `pass_params` of each full-screen pass, in order.
    pub pass_offsets: Vec<u32>,
    pub result:       Option<FrameResult>,
}

impl RadianceCascadesPipelineAssets
{
    /// Records the passes of `frame` and their per-pass scalars.
    pub fn record(&mut self, frame: &FrameState)
    {
        self.recording.clear();
        self.pass_offsets.clear();
        self.pass_params.clear();
        self.result = None;

        if !frame.active {
            return;
        }

        self.result = encode_frame(&mut self.recording, frame.size, frame.plan.cascade_count);
        for pass in self.recording.fullscreen_passes() {
            let offset = self.pass_params.push(&GpuPassParams::from(pass.uniforms));
            self.pass_offsets.push(offset);
        }
    }

    pub fn write_buffer(&mut self, device: &RenderDevice, queue: &RenderQueue)
    {
        self.params.write_buffer(device, queue);
        self.point_lights.write_buffer(device, queue);
        self.pass_params.write_buffer(device, queue);
    }
}

#[rustfmt::skip]
pub fn system_prepare_pipeline_assets(
        render_device:   Res<RenderDevice>,
        render_queue:    Res<RenderQueue>,
        gpu_frame:       Res<FrameState>,
    mut pipeline_assets: ResMut<RadianceCascadesPipelineAssets>,
) {
    pipeline_assets.record(&gpu_frame);
    pipeline_assets.write_buffer(&render_device, &render_queue);
}

/// Copies the published parameter block and packs the point lights. Lights
/// that are despawned or hidden are skipped.
#[rustfmt::skip]
#[allow(clippy::type_complexity)]
pub fn system_extract_pipeline_assets(
        res_outputs:     Extract<Res<RadianceCascadesOutputs>>,
        res_lights:      Extract<Res<PointLightCollection>>,
        query_lights:    Extract<Query<(&RcPointLight2D, &GlobalTransform, &InheritedVisibility)>>,
    mut pipeline_assets: ResMut<RadianceCascadesPipelineAssets>,
) {
    *pipeline_assets.params.get_mut() = res_outputs.params.clone();

    let packed = res_lights.pack(|entity| {
        let (light, transform, visibility) = query_lights.get(entity).ok()?;
        visibility.get().then(|| PointLightSample::new(light, transform))
    });
    pipeline_assets.point_lights.get_mut().publish(&packed);
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::gi::cascade::CascadePlan;
    use crate::gi::passes::Program;

    fn frame(size: UVec2, cascade_count: u32) -> FrameState
    {
        let mut frame = FrameState {
            active: true,
            size,
            ..default()
        };
        frame.plan = CascadePlan::new(frame.config.ray_range, cascade_count, size);
        frame
    }

    #[test]
    fn recording_has_one_offset_per_fullscreen_pass()
    {
        let mut assets = RadianceCascadesPipelineAssets::default();
        assets.record(&frame(UVec2::new(64, 32), 4));

        let fullscreen = assets.recording.fullscreen_passes().count();
        assert_eq!(assets.pass_offsets.len(), fullscreen);
        assert_eq!(assets.recording.count(Program::CascadeMerge), 3);
        assert_eq!(assets.recording.count(Program::JumpFlood), 6);
        assert!(assets.result.is_some());
    }

    #[test]
    fn inactive_frame_records_nothing()
    {
        let mut assets = RadianceCascadesPipelineAssets::default();
        assets.record(&frame(UVec2::new(64, 32), 4));
        assets.record(&FrameState::default());

        assert!(assets.recording.passes.is_empty());
        assert!(assets.pass_offsets.is_empty());
        assert!(assets.result.is_none());
    }
}
