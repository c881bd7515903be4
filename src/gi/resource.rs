use std::f32::consts::TAU;

use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::view::RenderLayers;
#[cfg(feature = "egui")]
use bevy_inspector_egui::prelude::*;

use crate::gi::cascade::CascadePlan;
use crate::gi::constants::MAX_CASCADE_COUNT;
use crate::gi::render_layer::LAYER_LIGHT_OCCLUSION_ID;

/// Inclusive bounds of one tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange<T>
{
    pub min: T,
    pub max: T,
}

impl ParamRange<f32>
{
    pub fn clamp(&self, value: f32) -> f32
    {
        value.clamp(self.min, self.max)
    }
}

impl ParamRange<u32>
{
    pub fn clamp(&self, value: u32) -> u32
    {
        value.clamp(self.min, self.max)
    }
}

/// Bounds of the default settings.
#[rustfmt::skip]
pub mod settings_bounds
{
    use super::*;

    pub const RENDER_SCALE:          ParamRange<f32> = ParamRange { min: 0.1, max: 4.0 };
    pub const RAY_RANGE:             ParamRange<f32> = ParamRange { min: 0.1, max: 1.0 };
    pub const CASCADE_COUNT:         ParamRange<u32> = ParamRange { min: 1, max: MAX_CASCADE_COUNT as u32 };
    pub const TRICK_LIGHT_INTENSITY: ParamRange<f32> = ParamRange { min: 0.0, max: 5.0 };
    pub const TRICK_LIGHT_DISTANCE:  ParamRange<f32> = ParamRange { min: 1.0, max: 100.0 };
}

/// Declared bounds of every overridable field. An active override falls back
/// to `min` for each field it leaves unset.
#[rustfmt::skip]
pub mod override_bounds
{
    use super::*;

    pub const RENDER_SCALE:          ParamRange<f32> = ParamRange { min: 0.1, max: 1.0 };
    pub const CASCADE_COUNT:         ParamRange<u32> = ParamRange { min: 1, max: MAX_CASCADE_COUNT as u32 };
    pub const RAY_RANGE:             ParamRange<f32> = ParamRange { min: 0.1, max: 2.0 };
    pub const BOUNCE_INTENSITY:      ParamRange<f32> = ParamRange { min: 0.0, max: 1.2 };
    pub const SKY_INTENSITY:         ParamRange<f32> = ParamRange { min: 0.0, max: f32::MAX };
    pub const SUN_ANGLE:             ParamRange<f32> = ParamRange { min: 0.0, max: TAU };
    pub const SUN_INTENSITY:         ParamRange<f32> = ParamRange { min: 0.0, max: f32::MAX };
    pub const SUN_HARDNESS:          ParamRange<f32> = ParamRange { min: 1.0, max: f32::MAX };
    pub const TRICK_LIGHT_INTENSITY: ParamRange<f32> = ParamRange { min: 0.0, max: 5.0 };
    pub const TRICK_LIGHT_DISTANCE:  ParamRange<f32> = ParamRange { min: 1.0, max: 100.0 };
    pub const COLOR_MIN:             LinearRgba = LinearRgba::BLACK;
    pub const VOLUMETRIC_MIN:        bool = false;
}

/// Plugin-wide defaults. They govern every field of the frame configuration
/// unless an active [`RadianceCascadesOverride`] is present.
#[rustfmt::skip]
#[derive(Resource, Reflect, Clone, Debug)]
#[reflect(Resource)]
#[cfg_attr(feature = "egui", derive(InspectorOptions))]
#[cfg_attr(feature = "egui", reflect(InspectorOptions))]
pub struct RadianceCascadesSettings {
    #[cfg_attr(feature = "egui", inspector(min = 0.1, max = 4.0))]
    pub render_scale:            f32,
    #[cfg_attr(feature = "egui", inspector(min = 0.1, max = 1.0))]
    pub ray_range:               f32,
    #[cfg_attr(feature = "egui", inspector(min = 1, max = 10))]
    pub cascade_count:           u32,
    pub bounce_intensity:        f32,
    pub sky_color:               Color,
    pub sky_intensity:           f32,
    pub sun_color:               Color,
    pub sun_angle:               f32,
    pub sun_intensity:           f32,
    pub sun_hardness:            f32,
    pub use_volumetric_lighting: bool,
    #[cfg_attr(feature = "egui", inspector(min = 0.0, max = 5.0))]
    pub trick_light_intensity:   f32,
    #[cfg_attr(feature = "egui", inspector(min = 1.0, max = 100.0))]
    pub trick_light_distance:    f32,
    /// Negate the projection's Y row before publishing the view-projection matrix.
    pub flip_projection_y:       bool,
    /// Layers drawn into the light-occlusion buffer.
    #[reflect(ignore)]
    pub occlusion_layers:        RenderLayers,
}

impl Default for RadianceCascadesSettings
{
    #[rustfmt::skip]
    fn default() -> Self
    {
        Self {
            render_scale:            1.0,
            ray_range:               1.0,
            cascade_count:           1,
            bounce_intensity:        0.9,
            sky_color:               Color::WHITE,
            sky_intensity:           0.0,
            sun_color:               Color::WHITE,
            sun_angle:               override_bounds::SUN_ANGLE.min,
            sun_intensity:           override_bounds::SUN_INTENSITY.min,
            sun_hardness:            override_bounds::SUN_HARDNESS.min,
            use_volumetric_lighting: true,
            trick_light_intensity:   1.0,
            trick_light_distance:    35.0,
            flip_projection_y:       false,
            occlusion_layers:        RenderLayers::layer(LAYER_LIGHT_OCCLUSION_ID),
        }
    }
}

/// Optional per-frame override. A single `enabled` flag governs the whole
/// object; there is no per-field activity.
#[rustfmt::skip]
#[derive(Resource, Reflect, Clone, Debug)]
#[reflect(Resource)]
pub struct RadianceCascadesOverride {
    pub enabled:                 bool,
    pub render_scale:            Option<f32>,
    pub cascade_count:           Option<u32>,
    pub ray_range:               Option<f32>,
    pub bounce_intensity:        Option<f32>,
    pub sky_color:               Option<Color>,
    pub sky_intensity:           Option<f32>,
    pub sun_color:               Option<Color>,
    pub sun_angle:               Option<f32>,
    pub sun_intensity:           Option<f32>,
    pub sun_hardness:            Option<f32>,
    pub use_volumetric_lighting: Option<bool>,
    pub trick_light_intensity:   Option<f32>,
    pub trick_light_distance:    Option<f32>,
}

impl Default for RadianceCascadesOverride
{
    #[rustfmt::skip]
    fn default() -> Self
    {
        Self {
            enabled:                 true,
            render_scale:            None,
            cascade_count:           None,
            ray_range:               None,
            bounce_intensity:        None,
            sky_color:               None,
            sky_intensity:           None,
            sun_color:               None,
            sun_angle:               None,
            sun_intensity:           None,
            sun_hardness:            None,
            use_volumetric_lighting: None,
            trick_light_intensity:   None,
            trick_light_distance:    None,
        }
    }
}

impl RadianceCascadesOverride
{
    pub fn is_active(&self) -> bool
    {
        self.enabled && self.cascade_count.map_or(true, |count| count > 0)
    }
}

/// How light is resolved behind occluders. The two strategies are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum InteriorLightingMode
{
    /// Step-march the interior of the distance field and attenuate by occlusion.
    Volumetric,
    /// Bleed light in from occluder edges up to a maximum distance; occlusion is ignored.
    TrickLight,
}

impl InteriorLightingMode
{
    pub fn from_volumetric_flag(use_volumetric: bool) -> Self
    {
        if use_volumetric {
            Self::Volumetric
        } else {
            Self::TrickLight
        }
    }
}

/// Immutable configuration for one frame.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameConfig {
    pub render_scale:          f32,
    pub ray_range:             f32,
    pub cascade_count:         u32,
    pub bounce_intensity:      f32,
    pub sky_color:             LinearRgba,
    pub sky_intensity:         f32,
    pub sun_color:             LinearRgba,
    pub sun_angle:             f32,
    pub sun_intensity:         f32,
    pub sun_hardness:          f32,
    pub interior_mode:         InteriorLightingMode,
    pub trick_light_intensity: f32,
    pub trick_light_distance:  f32,
}

impl FrameConfig
{
    #[rustfmt::skip]
    pub fn from_settings(settings: &RadianceCascadesSettings) -> Self
    {
        use settings_bounds as b;
        Self {
            render_scale:          b::RENDER_SCALE.clamp(settings.render_scale),
            ray_range:             b::RAY_RANGE.clamp(settings.ray_range),
            cascade_count:         b::CASCADE_COUNT.clamp(settings.cascade_count),
            bounce_intensity:      settings.bounce_intensity,
            sky_color:             settings.sky_color.to_linear(),
            sky_intensity:         settings.sky_intensity,
            sun_color:             settings.sun_color.to_linear(),
            sun_angle:             settings.sun_angle,
            sun_intensity:         settings.sun_intensity,
            sun_hardness:          settings.sun_hardness,
            interior_mode:         InteriorLightingMode::from_volumetric_flag(settings.use_volumetric_lighting),
            trick_light_intensity: b::TRICK_LIGHT_INTENSITY.clamp(settings.trick_light_intensity),
            trick_light_distance:  b::TRICK_LIGHT_DISTANCE.clamp(settings.trick_light_distance),
        }
    }

    #[rustfmt::skip]
    pub fn from_override(frame_override: &RadianceCascadesOverride) -> Self
    {
        use override_bounds as b;

        let float = |value: Option<f32>, range: ParamRange<f32>| value.map_or(range.min, |v| range.clamp(v));
        let color = |value: Option<Color>| value.map_or(b::COLOR_MIN, |c| c.to_linear());

        Self {
            render_scale:          float(frame_override.render_scale, b::RENDER_SCALE),
            ray_range:             float(frame_override.ray_range, b::RAY_RANGE),
            cascade_count:         frame_override.cascade_count.map_or(b::CASCADE_COUNT.min, |c| b::CASCADE_COUNT.clamp(c)),
            bounce_intensity:      float(frame_override.bounce_intensity, b::BOUNCE_INTENSITY),
            sky_color:             color(frame_override.sky_color),
            sky_intensity:         float(frame_override.sky_intensity, b::SKY_INTENSITY),
            sun_color:             color(frame_override.sun_color),
            sun_angle:             float(frame_override.sun_angle, b::SUN_ANGLE),
            sun_intensity:         float(frame_override.sun_intensity, b::SUN_INTENSITY),
            sun_hardness:          float(frame_override.sun_hardness, b::SUN_HARDNESS),
            interior_mode:         InteriorLightingMode::from_volumetric_flag(
                frame_override.use_volumetric_lighting.unwrap_or(b::VOLUMETRIC_MIN),
            ),
            trick_light_intensity: float(frame_override.trick_light_intensity, b::TRICK_LIGHT_INTENSITY),
            trick_light_distance:  float(frame_override.trick_light_distance, b::TRICK_LIGHT_DISTANCE),
        }
    }

    /// Width and height after render scaling, never below one texel.
    pub fn scaled_size(&self, target_size: UVec2) -> UVec2
    {
        let scale = |v: u32| ((v as f32 * self.render_scale).floor() as u32).max(1);
        UVec2::new(scale(target_size.x), scale(target_size.y))
    }
}

/// Merges defaults with the optional override into the frame's configuration.
pub fn resolve(
    defaults: &RadianceCascadesSettings,
    frame_override: Option<&RadianceCascadesOverride>,
    override_active: bool,
) -> FrameConfig
{
    match frame_override {
        Some(frame_override) if override_active => FrameConfig::from_override(frame_override),
        _ => FrameConfig::from_settings(defaults),
    }
}

/// Everything the render world needs to know about the current frame.
#[rustfmt::skip]
#[derive(Resource, ExtractResource, Clone, Debug)]
pub struct FrameState {
    /// False when no camera drives the pipeline; nothing is recorded then.
    pub active:      bool,
    /// Camera whose view runs the pipeline.
    pub driver:      Option<Entity>,
    pub config:      FrameConfig,
    pub plan:        CascadePlan,
    /// Post-scale width/height of the light-occlusion and distance buffers.
    pub size:        UVec2,
    /// Unscaled size of the driving camera's target.
    pub target_size: UVec2,
}

impl Default for FrameState
{
    fn default() -> Self
    {
        let config = FrameConfig::from_settings(&RadianceCascadesSettings::default());
        Self {
            active: false,
            driver: None,
            plan: CascadePlan::new(config.ray_range, config.cascade_count, UVec2::ONE),
            config,
            size: UVec2::ONE,
            target_size: UVec2::ONE,
        }
    }
}

#[cfg(test)]
mod tests
{
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn inactive_override_keeps_defaults()
    {
        let defaults = RadianceCascadesSettings {
            cascade_count: 6,
            ray_range: 0.5,
            ..default()
        };
        let frame_override = RadianceCascadesOverride {
            cascade_count: Some(2),
            sun_angle: Some(1.0),
            ..default()
        };

        let resolved = resolve(&defaults, Some(&frame_override), false);
        assert_eq!(resolved, FrameConfig::from_settings(&defaults));
        assert_eq!(resolved.cascade_count, 6);
        assert_relative_eq!(resolved.ray_range, 0.5);
        assert_eq!(resolve(&defaults, None, true), FrameConfig::from_settings(&defaults));
    }

    #[test]
    fn default_settings_resolve_field_for_field()
    {
        let resolved = resolve(&RadianceCascadesSettings::default(), None, false);
        assert_relative_eq!(resolved.render_scale, 1.0);
        assert_relative_eq!(resolved.ray_range, 1.0);
        assert_eq!(resolved.cascade_count, 1);
        assert_relative_eq!(resolved.bounce_intensity, 0.9);
        assert_eq!(resolved.sky_color, Color::WHITE.to_linear());
        assert_relative_eq!(resolved.sky_intensity, 0.0);
        assert_eq!(resolved.sun_color, Color::WHITE.to_linear());
        assert_relative_eq!(resolved.sun_angle, 0.0);
        assert_relative_eq!(resolved.sun_intensity, 0.0);
        assert_relative_eq!(resolved.sun_hardness, 1.0);
        assert_eq!(resolved.interior_mode, InteriorLightingMode::Volumetric);
        assert_relative_eq!(resolved.trick_light_intensity, 1.0);
        assert_relative_eq!(resolved.trick_light_distance, 35.0);
    }

    #[test]
    fn active_override_unset_fields_fall_back_to_declared_minimum()
    {
        let frame_override = RadianceCascadesOverride {
            cascade_count: Some(4),
            sun_intensity: Some(2.0),
            ..default()
        };
        assert!(frame_override.is_active());

        let resolved = resolve(&RadianceCascadesSettings::default(), Some(&frame_override), true);
        assert_eq!(resolved.cascade_count, 4);
        assert_relative_eq!(resolved.sun_intensity, 2.0);

        assert_relative_eq!(resolved.sun_angle, override_bounds::SUN_ANGLE.min);
        assert_relative_eq!(resolved.sun_hardness, 1.0);
        assert_relative_eq!(resolved.render_scale, 0.1);
        assert_relative_eq!(resolved.ray_range, 0.1);
        assert_relative_eq!(resolved.trick_light_distance, 1.0);
        assert_eq!(resolved.sky_color, LinearRgba::BLACK);
        assert_eq!(resolved.interior_mode, InteriorLightingMode::TrickLight);
    }

    #[test]
    fn unset_hardness_is_its_minimum_not_zero()
    {
        let resolved = FrameConfig::from_override(&RadianceCascadesOverride::default());
        assert_relative_eq!(resolved.sun_hardness, override_bounds::SUN_HARDNESS.min);
        assert!(resolved.sun_hardness > 0.0);
    }

    #[test]
    fn override_values_are_clamped_to_bounds()
    {
        let frame_override = RadianceCascadesOverride {
            cascade_count: Some(42),
            ray_range: Some(9.0),
            sun_angle: Some(-3.0),
            ..default()
        };
        let resolved = resolve(&RadianceCascadesSettings::default(), Some(&frame_override), true);
        assert_eq!(resolved.cascade_count, 10);
        assert_relative_eq!(resolved.ray_range, 2.0);
        assert_relative_eq!(resolved.sun_angle, 0.0);
    }

    #[test]
    fn disabled_override_is_inactive()
    {
        let frame_override = RadianceCascadesOverride {
            enabled: false,
            ..default()
        };
        assert!(!frame_override.is_active());
        assert!(!RadianceCascadesOverride {
            cascade_count: Some(0),
            ..default()
        }
        .is_active());
    }

    #[test]
    fn scaled_size_never_drops_below_one_texel()
    {
        let config = FrameConfig {
            render_scale: 0.1,
            ..FrameConfig::from_settings(&RadianceCascadesSettings::default())
        };
        assert_eq!(config.scaled_size(UVec2::new(1280, 5)), UVec2::new(128, 1));
        assert_eq!(config.scaled_size(UVec2::new(3, 3)), UVec2::new(1, 1));
    }
}
