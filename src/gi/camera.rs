use bevy::core_pipeline::tonemapping::{DebandDither, Tonemapping};
use bevy::prelude::*;
use bevy::render::camera::{RenderTarget, ScalingMode};
use bevy::render::view::RenderLayers;

use crate::gi::cascade::CascadePlan;
use crate::gi::resource::{resolve, FrameState, RadianceCascadesOverride, RadianceCascadesSettings};
use crate::gi::targets::GiTargetsWrapper;

/// Role of a camera. Only game cameras run the pipeline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum CameraKind
{
    #[default]
    Game,
    Preview,
    Reflection,
    SceneView,
}

impl CameraKind
{
    pub fn drives_pipeline(self) -> bool
    {
        self == CameraKind::Game
    }
}

/// Marks a camera whose frame gets global illumination.
#[derive(Component, Reflect, Debug, Default, Clone, Copy)]
#[reflect(Component)]
pub struct RadianceCascadesCamera
{
    pub kind: CameraKind,
}

/// Child camera of the driving camera that rasterizes occluders and emitters
/// into the light-occlusion buffer.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct LightOcclusionCamera;

/// Negates the Y row of a projection.
pub fn flip_projection_y(projection: Mat4) -> Mat4
{
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * projection
}

pub fn view_projection(clip_from_view: Mat4, camera_transform: &GlobalTransform, flip_y: bool) -> Mat4
{
    let projection = if flip_y {
        flip_projection_y(clip_from_view)
    } else {
        clip_from_view
    };
    projection * camera_transform.compute_matrix().inverse()
}

/// Projection covering the same world area as `main` on a buffer scaled by `render_scale`.
pub fn occlusion_projection(main: &OrthographicProjection, render_scale: f32) -> OrthographicProjection
{
    let mut projection = main.clone();
    // only the window-size mode depends on the target's pixel count
    if matches!(main.scaling_mode, ScalingMode::WindowSize(_)) {
        projection.scale = main.scale / render_scale;
    }
    projection
}

/// First active game camera.
pub fn select_driver(cameras: impl IntoIterator<Item = (Entity, bool, CameraKind)>) -> Option<Entity>
{
    cameras
        .into_iter()
        .find(|(_, is_active, kind)| *is_active && kind.drives_pipeline())
        .map(|(entity, ..)| entity)
}

#[rustfmt::skip]
pub(crate) fn system_resolve_frame(
        res_settings:        Res<RadianceCascadesSettings>,
        res_override:        Option<Res<RadianceCascadesOverride>>,
        query_cameras:       Query<(Entity, &Camera, &RadianceCascadesCamera)>,
    mut res_frame:           ResMut<FrameState>,
    mut override_was_active: Local<bool>,
) {
    let override_active = res_override.as_ref().map_or(false, |o| o.is_active());
    if override_active != *override_was_active {
        log::info!("Radiance cascades override {}", if override_active { "activated" } else { "deactivated" });
        *override_was_active = override_active;
    }

    let config = resolve(&res_settings, res_override.as_deref(), override_active);

    let driver = select_driver(query_cameras.iter().map(|(entity, camera, rc)| (entity, camera.is_active, rc.kind)));
    let target_size = driver
        .and_then(|entity| query_cameras.get(entity).ok())
        .and_then(|(_, camera, _)| camera.physical_target_size());

    let Some((driver, target_size)) = driver.zip(target_size) else {
        if res_frame.active {
            debug!("No camera drives radiance cascades, skipping the stage");
        }
        res_frame.active = false;
        res_frame.driver = None;
        return;
    };

    let size = config.scaled_size(target_size);
    *res_frame = FrameState {
        active:      true,
        driver:      Some(driver),
        config,
        plan:        CascadePlan::new(config.ray_range, config.cascade_count, size),
        size,
        target_size,
    };
}

#[rustfmt::skip]
#[allow(clippy::type_complexity)]
pub(crate) fn system_sync_occlusion_camera(
    mut commands:        Commands,
        res_frame:       Res<FrameState>,
        res_settings:    Res<RadianceCascadesSettings>,
        res_targets:     Res<GiTargetsWrapper>,
        query_driver:    Query<&OrthographicProjection, (With<RadianceCascadesCamera>, Without<LightOcclusionCamera>)>,
    mut query_occlusion: Query<
        (Entity, Option<&Parent>, &mut Camera, &mut OrthographicProjection, &mut RenderLayers),
        With<LightOcclusionCamera>,
    >,
) {
    let target = res_targets.targets.as_ref().map(|targets| targets.light_occlusion.clone());
    let driver = res_frame.driver.filter(|_| res_frame.active);

    let (Some(driver), Some(target)) = (driver, target) else {
        for (_, _, mut camera, _, _) in &mut query_occlusion {
            camera.is_active = false;
        }
        return;
    };

    let projection = query_driver
        .get(driver)
        .map(|main| occlusion_projection(main, res_frame.config.render_scale))
        .unwrap_or_default();
    let target = RenderTarget::Image(target);

    let Some((entity, parent, mut camera, mut current_projection, mut layers)) = query_occlusion.iter_mut().next() else {
        let occlusion = commands
            .spawn((
                Camera2dBundle {
                    camera: Camera {
                        order:       -1,
                        hdr:         true,
                        target,
                        clear_color: ClearColorConfig::Custom(Color::NONE),
                        ..default()
                    },
                    projection,
                    transform: Transform::IDENTITY,
                    tonemapping: Tonemapping::None,
                    deband_dither: DebandDither::Disabled,
                    ..default()
                },
                res_settings.occlusion_layers.clone(),
                LightOcclusionCamera,
                Name::new("light_occlusion_camera"),
            ))
            .id();
        commands.entity(driver).add_child(occlusion);
        log::info!("Spawned light occlusion camera under {:?}", driver);
        return;
    };

    camera.is_active = true;
    if camera.target.normalize(None) != target.normalize(None) {
        camera.target = target;
    }
    *current_projection = projection;
    if *layers != res_settings.occlusion_layers {
        *layers = res_settings.occlusion_layers.clone();
    }
    if parent.map(|parent| parent.get()) != Some(driver) {
        commands.entity(driver).add_child(entity);
    }
}

#[cfg(test)]
mod tests
{
    use approx::assert_relative_eq;
    use bevy::ecs::schedule::Schedule;

    use super::*;

    #[test]
    fn only_active_game_cameras_drive()
    {
        let game = Entity::from_raw(3);
        let cameras = [
            (Entity::from_raw(0), true, CameraKind::Preview),
            (Entity::from_raw(1), true, CameraKind::SceneView),
            (Entity::from_raw(2), false, CameraKind::Game),
            (game, true, CameraKind::Game),
            (Entity::from_raw(4), true, CameraKind::Game),
        ];
        assert_eq!(select_driver(cameras), Some(game));
        assert_eq!(select_driver([(game, true, CameraKind::Reflection)]), None);
        assert!(!CameraKind::Reflection.drives_pipeline());
    }

    #[test]
    fn flipped_projection_negates_y()
    {
        let projection = Mat4::orthographic_rh(-2.0, 2.0, -1.0, 1.0, 0.0, 10.0);
        let point = Vec4::new(1.0, 0.5, -1.0, 1.0);
        let straight = projection * point;
        let flipped = flip_projection_y(projection) * point;
        assert_relative_eq!(flipped.x, straight.x);
        assert_relative_eq!(flipped.y, -straight.y);
        assert_relative_eq!(flipped.z, straight.z);
    }

    #[test]
    fn view_projection_undoes_camera_transform()
    {
        let transform = GlobalTransform::from(Transform::from_xyz(10.0, -4.0, 0.0));
        let view_proj = view_projection(Mat4::IDENTITY, &transform, false);
        let clip = view_proj * Vec4::new(10.0, -4.0, 0.0, 1.0);
        assert_relative_eq!(clip.x, 0.0);
        assert_relative_eq!(clip.y, 0.0);

        let flipped = view_projection(Mat4::IDENTITY, &transform, true) * Vec4::new(10.0, -3.0, 0.0, 1.0);
        assert_relative_eq!(flipped.y, -1.0);
    }

    #[test]
    fn occlusion_projection_compensates_window_scaling()
    {
        let main = OrthographicProjection {
            scale: 2.0,
            scaling_mode: ScalingMode::WindowSize(1.0),
            ..default()
        };
        assert_relative_eq!(occlusion_projection(&main, 0.5).scale, 4.0);

        let fixed = OrthographicProjection {
            scale: 2.0,
            scaling_mode: ScalingMode::Fixed {
                width:  100.0,
                height: 50.0,
            },
            ..default()
        };
        assert_relative_eq!(occlusion_projection(&fixed, 0.5).scale, 2.0);
    }

    #[test]
    fn frame_is_inactive_without_a_sized_game_camera()
    {
        let mut world = World::new();
        world.init_resource::<RadianceCascadesSettings>();
        world.insert_resource(FrameState {
            active: true,
            ..default()
        });
        world.spawn((Camera::default(), RadianceCascadesCamera { kind: CameraKind::Preview }));
        // no computed target yet
        world.spawn((Camera::default(), RadianceCascadesCamera::default()));

        let mut schedule = Schedule::default();
        schedule.add_systems(system_resolve_frame);
        schedule.run(&mut world);

        let frame = world.resource::<FrameState>();
        assert!(!frame.active);
        assert_eq!(frame.driver, None);
    }
}
