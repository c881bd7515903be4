use bevy::prelude::{LinearRgba, Mat4, Vec2, Vec4};
use bevy::render::render_resource::ShaderType;

use crate::gi::constants::{MAX_CASCADE_COUNT, MAX_POINT_LIGHTS};
use crate::gi::lights::PackedPointLights;
use crate::gi::passes::PassUniforms;
use crate::gi::resource::{FrameState, InteriorLightingMode};

/// Stage-wide parameter block shared by every program and by downstream shading.
#[rustfmt::skip]
#[derive(Default, Clone, Debug, PartialEq, ShaderType)]
pub struct GpuRadianceCascadesParams {
    pub curr_view_proj:          Mat4,
    /// Post-scale width and height.
    pub param:                   Vec2,
    pub bounce_intensity:        f32,
    pub sky_radiance:            f32,
    pub sky_color:               Vec4,
    pub sun_color:               Vec4,
    pub sun_angle:               f32,
    pub sun_intensity:           f32,
    pub sun_hardness:            f32,
    pub cascade_count:           u32,
    pub cascade_resolution:      Vec2,
    /// |(width, height)| * ray range.
    pub ray_range:               f32,
    pub use_volumetric_lighting: u32,
    pub use_trick_light:         u32,
    pub trick_light_intensity:   f32,
    pub trick_light_distance:    f32,
    pub _padding:                f32,
    pub cascade_ranges:          [Vec4; MAX_CASCADE_COUNT],
}

impl GpuRadianceCascadesParams
{
    pub fn new(frame: &FrameState, view_proj: Mat4) -> Self
    {
        let config = &frame.config;
        let param = frame.size.as_vec2();
        let volumetric = config.interior_mode == InteriorLightingMode::Volumetric;

        Self {
            curr_view_proj:          view_proj,
            param,
            bounce_intensity:        config.bounce_intensity,
            sky_radiance:            config.sky_intensity,
            sky_color:               linear_to_vec4(config.sky_color),
            sun_color:               linear_to_vec4(config.sun_color),
            sun_angle:               config.sun_angle,
            sun_intensity:           config.sun_intensity,
            sun_hardness:            config.sun_hardness,
            cascade_count:           frame.plan.cascade_count,
            cascade_resolution:      frame.plan.cascade_resolution.as_vec2(),
            ray_range:               param.length() * config.ray_range,
            use_volumetric_lighting: volumetric as u32,
            use_trick_light:         !volumetric as u32,
            trick_light_intensity:   config.trick_light_intensity,
            trick_light_distance:    config.trick_light_distance,
            _padding:                0.0,
            cascade_ranges:          frame.plan.ranges_vec4(),
        }
    }
}

fn linear_to_vec4(color: LinearRgba) -> Vec4
{
    Vec4::new(color.red, color.green, color.blue, color.alpha)
}

#[rustfmt::skip]
#[derive(Default, Clone, Debug, PartialEq, ShaderType)]
pub struct GpuPointLights {
    pub count:           u32,
    pub position_radius: [Vec4; MAX_POINT_LIGHTS],
    pub color_decay:     [Vec4; MAX_POINT_LIGHTS],
    pub direction:       [Vec4; MAX_POINT_LIGHTS],
    pub angles:          [Vec4; MAX_POINT_LIGHTS],
}

impl GpuPointLights
{
    /// The count is always written; the arrays keep their previous contents
    /// when there is no active light.
    pub fn publish(&mut self, packed: &PackedPointLights)
    {
        self.count = packed.count;
        if packed.count > 0 {
            self.position_radius = packed.position_radius;
            self.color_decay = packed.color_decay;
            self.direction = packed.direction;
            self.angles = packed.angles;
        }
    }
}

/// Per-pass scalars, bound with a dynamic offset.
#[rustfmt::skip]
#[derive(Default, Clone, Copy, Debug, PartialEq, ShaderType)]
pub struct GpuPassParams {
    pub step_size:     f32,
    pub offset:        u32,
    pub cascade_level: u32,
}

impl From<PassUniforms> for GpuPassParams
{
    fn from(uniforms: PassUniforms) -> Self
    {
        match uniforms {
            PassUniforms::None => Self::default(),
            PassUniforms::JumpStep { step_size, offset } => Self {
                step_size,
                offset,
                ..Self::default()
            },
            PassUniforms::CascadeLevel { level } => Self {
                cascade_level: level,
                ..Self::default()
            },
        }
    }
}
