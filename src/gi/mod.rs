use bevy::asset::embedded_asset;
use bevy::core_pipeline::core_2d::graph::{Core2d, Node2d};
use bevy::prelude::*;
use bevy::render::camera::CameraUpdateSystem;
use bevy::render::extract_resource::ExtractResourcePlugin;
use bevy::render::render_graph::{RenderGraphApp, ViewNodeRunner};
use bevy::render::{Render, RenderApp, RenderSet};
use bevy::sprite::Material2dPlugin;
use bevy::transform::TransformSystem;

use crate::gi::camera::{system_resolve_frame, system_sync_occlusion_camera, RadianceCascadesCamera};
use crate::gi::lights::{system_sync_point_lights, PointLightCollection, RcPointLight2D};
use crate::gi::occlusion::LightOcclusionMaterial;
use crate::gi::outputs::{system_publish_outputs, RadianceCascadesOutputs};
use crate::gi::pipeline::{
    init_pipeline,
    system_prepare_bind_groups,
    RadianceCascadesLabel,
    RadianceCascadesNode,
};
use crate::gi::pipeline_assets::{
    system_extract_pipeline_assets,
    system_load_embedded_shader_dependencies,
    system_prepare_pipeline_assets,
    EmbeddedShaderDependencies,
    RadianceCascadesPipelineAssets,
};
use crate::gi::resource::{FrameState, RadianceCascadesOverride, RadianceCascadesSettings};
use crate::gi::targets::{system_allocate_targets, GiTargetsWrapper, ScreenBufferAllocator};

mod pipeline_assets;
mod types_gpu;

pub mod camera;
pub mod cascade;
pub mod cascade_merge;
pub mod constants;
pub mod jump_flood;
pub mod lights;
pub mod occlusion;
pub mod outputs;
pub mod passes;
pub mod pipeline;
pub mod render_layer;
pub mod resource;
pub mod software;
pub mod targets;

pub use types_gpu::{GpuPassParams, GpuPointLights, GpuRadianceCascadesParams};

/// Systems of the main-world half of the stage, in execution order.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum RadianceCascadesSystems
{
    /// Light registry sync, frame resolution, buffer allocation and occlusion camera sync.
    Prepare,
    /// Runs once cameras have their final projection.
    Publish,
}

pub struct RadianceCascades2DPlugin;

impl Plugin for RadianceCascades2DPlugin
{
    fn build(&self, app: &mut App)
    {
        app.add_plugins((
            ExtractResourcePlugin::<FrameState>::default(),
            ExtractResourcePlugin::<GiTargetsWrapper>::default(),
            ExtractResourcePlugin::<RadianceCascadesOutputs>::default(),
            Material2dPlugin::<LightOcclusionMaterial>::default(),
        ))
        .register_type::<RadianceCascadesSettings>()
        .register_type::<RadianceCascadesOverride>()
        .register_type::<RadianceCascadesCamera>()
        .register_type::<RcPointLight2D>()
        .init_resource::<RadianceCascadesSettings>()
        .init_resource::<FrameState>()
        .init_resource::<ScreenBufferAllocator>()
        .init_resource::<GiTargetsWrapper>()
        .init_resource::<PointLightCollection>()
        .init_resource::<RadianceCascadesOutputs>()
        .init_resource::<EmbeddedShaderDependencies>()
        .configure_sets(
            PostUpdate,
            (
                RadianceCascadesSystems::Prepare.before(CameraUpdateSystem),
                RadianceCascadesSystems::Publish
                    .after(CameraUpdateSystem)
                    .after(TransformSystem::TransformPropagate),
            ),
        )
        .add_systems(Startup, system_load_embedded_shader_dependencies)
        .add_systems(
            PostUpdate,
            (
                (
                    system_sync_point_lights,
                    system_resolve_frame,
                    system_allocate_targets,
                    system_sync_occlusion_camera,
                )
                    .chain()
                    .in_set(RadianceCascadesSystems::Prepare),
                system_publish_outputs.in_set(RadianceCascadesSystems::Publish),
            ),
        );

        embedded_asset!(app, "shaders/rc_types.wgsl");
        embedded_asset!(app, "shaders/rc_seed.wgsl");
        embedded_asset!(app, "shaders/rc_jump_flood.wgsl");
        embedded_asset!(app, "shaders/rc_signed_distance.wgsl");
        embedded_asset!(app, "shaders/rc_cascade_merge.wgsl");
        embedded_asset!(app, "shaders/rc_downsample.wgsl");
        embedded_asset!(app, "shaders/rc_light_occlusion.wgsl");

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .init_resource::<RadianceCascadesPipelineAssets>()
            .add_systems(ExtractSchedule, system_extract_pipeline_assets)
            .add_systems(
                Render,
                (
                    system_prepare_pipeline_assets.in_set(RenderSet::Prepare),
                    system_prepare_bind_groups.in_set(RenderSet::PrepareBindGroups),
                ),
            )
            .add_render_graph_node::<ViewNodeRunner<RadianceCascadesNode>>(Core2d, RadianceCascadesLabel)
            .add_render_graph_edges(
                Core2d,
                (Node2d::StartMainPass, RadianceCascadesLabel, Node2d::MainTransparentPass),
            );
    }

    fn finish(&self, app: &mut App)
    {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };
        init_pipeline(render_app.world_mut());
    }
}
