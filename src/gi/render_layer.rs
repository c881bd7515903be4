use bevy::render::view::Layer;

/// Layer tagged by occluders and emitters that feed the light-occlusion buffer.
pub const LAYER_LIGHT_OCCLUSION_ID: Layer = 31;
