use bevy::prelude::*;
use bevy::render::mesh::MeshVertexBufferLayoutRef;
use bevy::render::render_asset::RenderAssets;
use bevy::render::render_resource::{
    AsBindGroup,
    AsBindGroupShaderType,
    RenderPipelineDescriptor,
    ShaderRef,
    ShaderType,
    SpecializedMeshPipelineError,
};
use bevy::render::texture::GpuImage;
use bevy::sprite::{Material2d, Material2dKey};

const FLAG_IS_WALL: u32 = 1;
const FLAG_HAS_MASK: u32 = 2;

/// Shading pass of the light-occlusion rasterizer. Writes
/// `(emission.rgb, is_wall ? occlusion : 0)`; texels where the mask's alpha
/// is below one half are discarded.
#[rustfmt::skip]
#[derive(Asset, TypePath, AsBindGroup, Debug, Clone)]
#[uniform(0, GpuLightOcclusionMaterial)]
pub struct LightOcclusionMaterial
{
    pub emission:  LinearRgba,
    pub is_wall:   bool,
    /// Fraction of light blocked, in [0, 1].
    pub occlusion: f32,
    #[texture(1)]
    #[sampler(2)]
    pub mask:      Option<Handle<Image>>,
}

impl Default for LightOcclusionMaterial
{
    #[rustfmt::skip]
    fn default() -> Self
    {
        Self {
            emission:  LinearRgba::BLACK,
            is_wall:   true,
            occlusion: 1.0,
            mask:      None,
        }
    }
}

impl LightOcclusionMaterial
{
    pub fn wall(occlusion: f32) -> Self
    {
        Self {
            occlusion,
            ..default()
        }
    }

    /// Emits light without blocking any.
    pub fn emitter(emission: LinearRgba) -> Self
    {
        Self {
            emission,
            is_wall: false,
            occlusion: 0.0,
            ..default()
        }
    }

    pub fn with_mask(mut self, mask: Handle<Image>) -> Self
    {
        self.mask = Some(mask);
        self
    }

    fn to_gpu(&self) -> GpuLightOcclusionMaterial
    {
        let mut flags = 0;
        if self.is_wall {
            flags |= FLAG_IS_WALL;
        }
        if self.mask.is_some() {
            flags |= FLAG_HAS_MASK;
        }
        GpuLightOcclusionMaterial {
            emission:  Vec4::new(self.emission.red, self.emission.green, self.emission.blue, 1.0),
            occlusion: self.occlusion.clamp(0.0, 1.0),
            flags,
        }
    }
}

#[rustfmt::skip]
#[derive(Clone, Default, Debug, PartialEq, ShaderType)]
pub struct GpuLightOcclusionMaterial {
    pub emission:  Vec4,
    pub occlusion: f32,
    pub flags:     u32,
}

impl AsBindGroupShaderType<GpuLightOcclusionMaterial> for LightOcclusionMaterial
{
    fn as_bind_group_shader_type(&self, _images: &RenderAssets<GpuImage>) -> GpuLightOcclusionMaterial
    {
        self.to_gpu()
    }
}

impl Material2d for LightOcclusionMaterial
{
    fn fragment_shader() -> ShaderRef
    {
        "embedded://bevy_radiance_cascades_2d/gi/shaders/rc_light_occlusion.wgsl".into()
    }

    fn specialize(
        descriptor: &mut RenderPipelineDescriptor,
        _layout: &MeshVertexBufferLayoutRef,
        _key: Material2dKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError>
    {
        // zero-occlusion emitters must overwrite, not blend away
        if let Some(fragment) = descriptor.fragment.as_mut() {
            for target in fragment.targets.iter_mut().flatten() {
                target.blend = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn wall_writes_occlusion()
    {
        let gpu = LightOcclusionMaterial::wall(0.6).to_gpu();
        assert_eq!(gpu.occlusion, 0.6);
        assert_eq!(gpu.flags, FLAG_IS_WALL);
    }

    #[test]
    fn emitter_is_not_a_wall()
    {
        let gpu = LightOcclusionMaterial::emitter(LinearRgba::rgb(3.0, 1.0, 0.5)).to_gpu();
        assert_eq!(gpu.flags & FLAG_IS_WALL, 0);
        assert_eq!(gpu.emission, Vec4::new(3.0, 1.0, 0.5, 1.0));
    }

    #[test]
    fn occlusion_is_clamped_and_mask_flagged()
    {
        let gpu = LightOcclusionMaterial::wall(7.0)
            .with_mask(Handle::default())
            .to_gpu();
        assert_eq!(gpu.occlusion, 1.0);
        assert_eq!(gpu.flags, FLAG_IS_WALL | FLAG_HAS_MASK);
    }
}
