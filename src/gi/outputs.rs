use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;

use crate::gi::camera::view_projection;
use crate::gi::passes::{frame_result, FrameResult};
use crate::gi::resource::{FrameState, RadianceCascadesSettings};
use crate::gi::targets::{GiTargets, GiTargetsWrapper, PingPongPair};
use crate::gi::types_gpu::GpuRadianceCascadesParams;

/// What downstream shading reads after the stage ran: the parameter block
/// and the final buffers. Images are `None` on frames the stage skipped.
#[rustfmt::skip]
#[derive(Resource, ExtractResource, Clone, Debug, Default)]
pub struct RadianceCascadesOutputs {
    pub params:            GpuRadianceCascadesParams,
    pub global_gi:         Option<Handle<Image>>,
    /// Always the same image as `global_gi`.
    pub four_direction_gi: Option<Handle<Image>>,
    pub distance_field:    Option<Handle<Image>>,
    pub jump_flood:        Option<Handle<Image>>,
    pub result:            Option<FrameResult>,
}

impl RadianceCascadesOutputs
{
    pub fn new(frame: &FrameState, view_proj: Mat4, targets: Option<&GiTargets>) -> Self
    {
        let params = GpuRadianceCascadesParams::new(frame, view_proj);
        let result = frame_result(frame.size, frame.plan.cascade_count);

        let (Some(targets), Some(result)) = (targets, result) else {
            return Self {
                params,
                ..default()
            };
        };

        let global_gi = targets.get(PingPongPair::RADIANCE.get(result.radiance)).clone();
        Self {
            params,
            four_direction_gi: Some(global_gi.clone()),
            global_gi: Some(global_gi),
            distance_field: Some(targets.distance.clone()),
            jump_flood: Some(targets.get(PingPongPair::JUMP_FLOOD.get(result.jump_flood)).clone()),
            result: Some(result),
        }
    }
}

#[rustfmt::skip]
pub(crate) fn system_publish_outputs(
        res_frame:    Res<FrameState>,
        res_settings: Res<RadianceCascadesSettings>,
        res_targets:  Res<GiTargetsWrapper>,
        query_camera: Query<(&Camera, &GlobalTransform)>,
    mut res_outputs:  ResMut<RadianceCascadesOutputs>,
) {
    let driver = res_frame
        .driver
        .filter(|_| res_frame.active)
        .and_then(|entity| query_camera.get(entity).ok());

    let Some((camera, transform)) = driver else {
        res_outputs.global_gi = None;
        res_outputs.four_direction_gi = None;
        res_outputs.distance_field = None;
        res_outputs.jump_flood = None;
        res_outputs.result = None;
        return;
    };

    let view_proj = view_projection(camera.clip_from_view(), transform, res_settings.flip_projection_y);
    *res_outputs = RadianceCascadesOutputs::new(&res_frame, view_proj, res_targets.targets.as_ref());
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::gi::cascade::CascadePlan;
    use crate::gi::targets::PingPong;

    fn targets() -> GiTargets
    {
        GiTargets {
            light_occlusion: Handle::weak_from_u128(1),
            jump_flood:      [Handle::weak_from_u128(2), Handle::weak_from_u128(3)],
            distance:        Handle::weak_from_u128(4),
            radiance:        [Handle::weak_from_u128(5), Handle::weak_from_u128(6)],
        }
    }

    fn frame(size: UVec2, cascade_count: u32) -> FrameState
    {
        let mut frame = FrameState {
            active: true,
            size,
            ..default()
        };
        frame.config.cascade_count = cascade_count;
        frame.plan = CascadePlan::new(frame.config.ray_range, cascade_count, size);
        frame
    }

    #[test]
    fn four_direction_gi_aliases_global_gi()
    {
        let targets = targets();
        let outputs = RadianceCascadesOutputs::new(&frame(UVec2::new(64, 64), 4), Mat4::IDENTITY, Some(&targets));

        assert_eq!(outputs.global_gi, outputs.four_direction_gi);
        assert_eq!(outputs.distance_field, Some(targets.distance.clone()));
        assert_eq!(outputs.params.cascade_count, 4);
    }

    #[test]
    fn published_buffers_follow_the_final_indices()
    {
        let targets = targets();
        // 3 merge passes from B end on A, 64 texels take 6 even rounds and end on A
        let outputs = RadianceCascadesOutputs::new(&frame(UVec2::new(64, 64), 4), Mat4::IDENTITY, Some(&targets));
        let result = outputs.result.unwrap();
        assert_eq!(result.radiance, PingPong::A);
        assert_eq!(result.jump_flood, PingPong::A);
        assert_eq!(outputs.global_gi, Some(targets.radiance[0].clone()));
        assert_eq!(outputs.jump_flood, Some(targets.jump_flood[0].clone()));

        // 2 merge passes stay on B, 8 texels take 3 odd rounds and end on B
        let outputs = RadianceCascadesOutputs::new(&frame(UVec2::new(8, 8), 3), Mat4::IDENTITY, Some(&targets));
        assert_eq!(outputs.global_gi, Some(targets.radiance[1].clone()));
        assert_eq!(outputs.jump_flood, Some(targets.jump_flood[1].clone()));
    }

    #[test]
    fn no_images_without_targets()
    {
        let outputs = RadianceCascadesOutputs::new(&frame(UVec2::new(64, 64), 4), Mat4::IDENTITY, None);
        assert!(outputs.global_gi.is_none());
        assert!(outputs.result.is_none());
        assert_eq!(outputs.params.param, Vec2::new(64.0, 64.0));
    }
}
