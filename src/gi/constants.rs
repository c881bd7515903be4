use bevy::render::render_resource::TextureFormat;

/// Hard upper bound of the cascade hierarchy; the published range array always has this length.
pub const MAX_CASCADE_COUNT: usize = 10;

/// Number of point lights the cascade merge can see in one frame.
pub const MAX_POINT_LIGHTS: usize = 16;

pub const LIGHT_OCCLUSION_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const JUMP_FLOOD_FORMAT:      TextureFormat = TextureFormat::Rg16Float;
pub const DISTANCE_FORMAT:        TextureFormat = TextureFormat::R16Float;
pub const RADIANCE_FORMAT:        TextureFormat = TextureFormat::Rgba16Float;

/// Seed value written by the seed program where there is no occluder boundary.
pub const JUMP_FLOOD_EMPTY_SEED: f32 = -1.0;

/// Distance recorded when the field holds no seed at all (no occluders on screen).
pub const DISTANCE_NO_SEED: f32 = 65504.0;

pub const SHADER_TYPES:            &str = "rc_types.wgsl";
pub const SHADER_SEED:             &str = "rc_seed.wgsl";
pub const SHADER_JUMP_FLOOD:       &str = "rc_jump_flood.wgsl";
pub const SHADER_SIGNED_DISTANCE:  &str = "rc_signed_distance.wgsl";
pub const SHADER_CASCADE_MERGE:    &str = "rc_cascade_merge.wgsl";
pub const SHADER_DOWNSAMPLE:       &str = "rc_downsample.wgsl";
pub const SHADER_LIGHT_OCCLUSION:  &str = "rc_light_occlusion.wgsl";
