pub use crate::gi::camera::{CameraKind, RadianceCascadesCamera};
pub use crate::gi::lights::{PointLightCollection, RcPointLight2D};
pub use crate::gi::occlusion::LightOcclusionMaterial;
pub use crate::gi::outputs::RadianceCascadesOutputs;
pub use crate::gi::render_layer::LAYER_LIGHT_OCCLUSION_ID;
pub use crate::gi::resource::{
    resolve,
    FrameConfig,
    FrameState,
    InteriorLightingMode,
    RadianceCascadesOverride,
    RadianceCascadesSettings,
};
pub use crate::gi::{RadianceCascades2DPlugin, RadianceCascadesSystems};
