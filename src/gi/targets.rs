use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::{
    AddressMode,
    Extent3d,
    FilterMode,
    TextureDescriptor,
    TextureDimension,
    TextureFormat,
    TextureUsages,
};
use bevy::render::texture::{
    ImageAddressMode,
    ImageFilterMode,
    ImageSampler,
    ImageSamplerDescriptor,
    TextureFormatPixelInfo,
};
use bevy::utils::HashMap;
use thiserror::Error;

use crate::gi::constants::{
    DISTANCE_FORMAT,
    JUMP_FLOOD_FORMAT,
    LIGHT_OCCLUSION_FORMAT,
    RADIANCE_FORMAT,
};
use crate::gi::resource::FrameState;

/// Role of a screen buffer inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferRole
{
    LightOcclusion,
    JumpFloodA,
    JumpFloodB,
    Distance,
    RadianceA,
    RadianceB,
}

impl BufferRole
{
    pub const ALL: [BufferRole; 6] = [
        BufferRole::LightOcclusion,
        BufferRole::JumpFloodA,
        BufferRole::JumpFloodB,
        BufferRole::Distance,
        BufferRole::RadianceA,
        BufferRole::RadianceB,
    ];

    pub fn label(self) -> &'static str
    {
        match self {
            BufferRole::LightOcclusion => "rc_light_occlusion",
            BufferRole::JumpFloodA => "rc_jump_flood_0",
            BufferRole::JumpFloodB => "rc_jump_flood_1",
            BufferRole::Distance => "rc_distance",
            BufferRole::RadianceA => "rc_radiance_0",
            BufferRole::RadianceB => "rc_radiance_1",
        }
    }
}

/// Index into a pair of ping-pong buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PingPong
{
    A,
    B,
}

impl PingPong
{
    pub fn other(self) -> Self
    {
        match self {
            PingPong::A => PingPong::B,
            PingPong::B => PingPong::A,
        }
    }

    pub fn index(self) -> usize
    {
        match self {
            PingPong::A => 0,
            PingPong::B => 1,
        }
    }
}

/// Two buffers alternately used as read source and write target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPongPair
{
    pub a: BufferRole,
    pub b: BufferRole,
}

impl PingPongPair
{
    pub const JUMP_FLOOD: Self = Self {
        a: BufferRole::JumpFloodA,
        b: BufferRole::JumpFloodB,
    };
    pub const RADIANCE: Self = Self {
        a: BufferRole::RadianceA,
        b: BufferRole::RadianceB,
    };

    pub fn get(&self, index: PingPong) -> BufferRole
    {
        match index {
            PingPong::A => self.a,
            PingPong::B => self.b,
        }
    }
}

/// Everything that decides whether a buffer has to be reallocated.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy)]
pub struct ScreenBufferDesc {
    pub size:      UVec2,
    pub format:    TextureFormat,
    pub filter:    ImageFilterMode,
    pub wrap:      ImageAddressMode,
    pub mipmapped: bool,
}

// bevy's sampler enums don't implement `PartialEq`; compare via their wgpu equivalents
impl PartialEq for ScreenBufferDesc
{
    fn eq(&self, other: &Self) -> bool
    {
        self.size == other.size
            && self.format == other.format
            && FilterMode::from(self.filter) == FilterMode::from(other.filter)
            && AddressMode::from(self.wrap) == AddressMode::from(other.wrap)
            && self.mipmapped == other.mipmapped
    }
}

impl Eq for ScreenBufferDesc {}

impl ScreenBufferDesc
{
    /// Fixed format/filter of every role. `size` is the post-scale size,
    /// `cascade_resolution` the radiance buffer size.
    #[rustfmt::skip]
    pub fn for_role(role: BufferRole, size: UVec2, cascade_resolution: UVec2) -> Self
    {
        let (size, format, filter, mipmapped) = match role {
            BufferRole::LightOcclusion => (size, LIGHT_OCCLUSION_FORMAT, ImageFilterMode::Linear, false),
            // distance search must not be smoothed
            BufferRole::JumpFloodA |
            BufferRole::JumpFloodB     => (size, JUMP_FLOOD_FORMAT, ImageFilterMode::Nearest, false),
            BufferRole::Distance       => (size, DISTANCE_FORMAT, ImageFilterMode::Linear, false),
            BufferRole::RadianceA |
            BufferRole::RadianceB      => (cascade_resolution, RADIANCE_FORMAT, ImageFilterMode::Linear, true),
        };
        Self {
            size: size.max(UVec2::ONE),
            format,
            filter,
            wrap: ImageAddressMode::ClampToEdge,
            mipmapped,
        }
    }

    pub fn mip_level_count(&self) -> u32
    {
        if self.mipmapped {
            32 - self.size.x.max(self.size.y).leading_zeros()
        } else {
            1
        }
    }

    fn byte_len(&self) -> usize
    {
        let texel = self.format.pixel_size();
        (0..self.mip_level_count())
            .map(|level| {
                let w = (self.size.x >> level).max(1) as usize;
                let h = (self.size.y >> level).max(1) as usize;
                w * h * texel
            })
            .sum()
    }

    #[rustfmt::skip]
    fn create_image(&self, label: &'static str) -> Image
    {
        Image {
            // every mip level has to be backed, the uploader slices the data per level
            data: vec![0; self.byte_len()],
            texture_descriptor: TextureDescriptor {
                label:           Some(label),
                size:            Extent3d {
                    width:                 self.size.x,
                    height:                self.size.y,
                    depth_or_array_layers: 1,
                },
                dimension:       TextureDimension::D2,
                format:          self.format,
                mip_level_count: self.mip_level_count(),
                sample_count:    1,
                usage:           TextureUsages::TEXTURE_BINDING
                               | TextureUsages::RENDER_ATTACHMENT
                               | TextureUsages::COPY_DST,
                view_formats:    &[],
            },
            sampler: ImageSampler::Descriptor(ImageSamplerDescriptor {
                label:          Some(label.to_owned()),
                mag_filter:     self.filter,
                min_filter:     self.filter,
                mipmap_filter:  self.filter,
                address_mode_u: self.wrap,
                address_mode_v: self.wrap,
                address_mode_w: self.wrap,
                ..default()
            }),
            asset_usage: RenderAssetUsages::default(),
            ..default()
        }
    }
}

/// Reference to the allocation of one role. It goes stale when the role is reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenBufferHandle
{
    pub role:       BufferRole,
    pub generation: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError
{
    #[error("{role:?} buffer handle of generation {held} is stale, current generation is {current}")]
    Stale
    {
        role:    BufferRole,
        held:    u32,
        current: u32,
    },
    #[error("{0:?} buffer has not been allocated")]
    Unallocated(BufferRole),
}

struct Slot
{
    desc:       ScreenBufferDesc,
    image:      Handle<Image>,
    generation: u32,
}

/// Owns every screen buffer of the pipeline, keyed by role.
#[derive(Resource, Default)]
pub struct ScreenBufferAllocator
{
    slots:         HashMap<BufferRole, Slot>,
    reallocations: u64,
}

impl ScreenBufferAllocator
{
    /// No-op when `desc` matches the current allocation of `role`. Otherwise the
    /// old image is released and a new one allocated; handles to the old
    /// allocation become stale. Returns the current handle and whether a
    /// reallocation happened.
    pub fn reallocate_if_needed(
        &mut self,
        images: &mut Assets<Image>,
        role: BufferRole,
        desc: ScreenBufferDesc,
    ) -> (ScreenBufferHandle, bool)
    {
        if let Some(slot) = self.slots.get(&role) {
            if slot.desc == desc {
                return (
                    ScreenBufferHandle {
                        role,
                        generation: slot.generation,
                    },
                    false,
                );
            }
        }

        let generation = match self.slots.remove(&role) {
            Some(old) => {
                images.remove(&old.image);
                old.generation + 1
            }
            None => 0,
        };

        debug!(
            "Allocating {} {}x{} {:?} (generation {})",
            role.label(),
            desc.size.x,
            desc.size.y,
            desc.format,
            generation
        );

        let image = images.add(desc.create_image(role.label()));
        self.slots.insert(
            role,
            Slot {
                desc,
                image,
                generation,
            },
        );
        self.reallocations += 1;

        (ScreenBufferHandle { role, generation }, true)
    }

    /// Resolves a handle to its image, failing when the handle predates a reallocation.
    pub fn image(&self, handle: ScreenBufferHandle) -> Result<&Handle<Image>, BufferError>
    {
        let slot = self
            .slots
            .get(&handle.role)
            .ok_or(BufferError::Unallocated(handle.role))?;
        if slot.generation != handle.generation {
            return Err(BufferError::Stale {
                role:    handle.role,
                held:    handle.generation,
                current: slot.generation,
            });
        }
        Ok(&slot.image)
    }

    pub fn current(&self, role: BufferRole) -> Option<ScreenBufferHandle>
    {
        self.slots.get(&role).map(|slot| ScreenBufferHandle {
            role,
            generation: slot.generation,
        })
    }

    pub fn desc(&self, role: BufferRole) -> Option<&ScreenBufferDesc>
    {
        self.slots.get(&role).map(|slot| &slot.desc)
    }

    /// Total number of allocations performed, initial ones included.
    pub fn allocation_count(&self) -> u64
    {
        self.reallocations
    }

    /// Snapshot of the current images, `None` until every role is allocated.
    pub fn targets(&self) -> Option<GiTargets>
    {
        let image = |role: BufferRole| self.slots.get(&role).map(|slot| slot.image.clone());
        Some(GiTargets {
            light_occlusion: image(BufferRole::LightOcclusion)?,
            jump_flood:      [image(BufferRole::JumpFloodA)?, image(BufferRole::JumpFloodB)?],
            distance:        image(BufferRole::Distance)?,
            radiance:        [image(BufferRole::RadianceA)?, image(BufferRole::RadianceB)?],
        })
    }
}

/// Images of the current allocation, extracted to the render world each frame.
#[rustfmt::skip]
#[derive(Clone, Debug)]
pub struct GiTargets {
    pub light_occlusion: Handle<Image>,
    pub jump_flood:      [Handle<Image>; 2],
    pub distance:        Handle<Image>,
    pub radiance:        [Handle<Image>; 2],
}

impl GiTargets
{
    pub fn get(&self, role: BufferRole) -> &Handle<Image>
    {
        match role {
            BufferRole::LightOcclusion => &self.light_occlusion,
            BufferRole::JumpFloodA => &self.jump_flood[0],
            BufferRole::JumpFloodB => &self.jump_flood[1],
            BufferRole::Distance => &self.distance,
            BufferRole::RadianceA => &self.radiance[0],
            BufferRole::RadianceB => &self.radiance[1],
        }
    }
}

#[derive(Clone, Resource, ExtractResource, Default)]
pub struct GiTargetsWrapper
{
    pub targets: Option<GiTargets>,
}

#[rustfmt::skip]
pub(crate) fn system_allocate_targets(
        res_frame:           Res<FrameState>,
    mut res_allocator:       ResMut<ScreenBufferAllocator>,
    mut res_images:          ResMut<Assets<Image>>,
    mut res_targets_wrapper: ResMut<GiTargetsWrapper>,
) {
    if !res_frame.active {
        return;
    }

    let mut changed = res_targets_wrapper.targets.is_none();
    for role in BufferRole::ALL {
        let desc = ScreenBufferDesc::for_role(role, res_frame.size, res_frame.plan.cascade_resolution);
        let (_, reallocated) = res_allocator.reallocate_if_needed(&mut res_images, role, desc);
        changed |= reallocated;
    }

    if changed {
        res_targets_wrapper.targets = res_allocator.targets();
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn desc(size: UVec2, format: TextureFormat) -> ScreenBufferDesc
    {
        ScreenBufferDesc {
            format,
            ..ScreenBufferDesc::for_role(BufferRole::LightOcclusion, size, size)
        }
    }

    #[test]
    fn identical_requests_do_not_reallocate()
    {
        let mut images = Assets::<Image>::default();
        let mut allocator = ScreenBufferAllocator::default();
        let request = desc(UVec2::new(64, 32), TextureFormat::Rgba16Float);

        let (first, allocated) = allocator.reallocate_if_needed(&mut images, BufferRole::LightOcclusion, request);
        assert!(allocated);
        let count = allocator.allocation_count();

        let (second, allocated) = allocator.reallocate_if_needed(&mut images, BufferRole::LightOcclusion, request);
        let (third, allocated_again) = allocator.reallocate_if_needed(&mut images, BufferRole::LightOcclusion, request);
        assert!(!allocated && !allocated_again);
        assert_eq!(allocator.allocation_count(), count);
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert!(allocator.image(first).is_ok());
    }

    #[test]
    fn changed_format_reallocates_once_and_invalidates_handles()
    {
        let mut images = Assets::<Image>::default();
        let mut allocator = ScreenBufferAllocator::default();
        let size = UVec2::new(64, 32);

        let (old, _) = allocator.reallocate_if_needed(
            &mut images,
            BufferRole::LightOcclusion,
            desc(size, TextureFormat::Rgba16Float),
        );
        let old_image = allocator.image(old).unwrap().clone();
        let before = allocator.allocation_count();

        let (new, reallocated) = allocator.reallocate_if_needed(
            &mut images,
            BufferRole::LightOcclusion,
            desc(size, TextureFormat::Rgba32Float),
        );
        assert!(reallocated);
        assert_eq!(allocator.allocation_count(), before + 1);

        assert_eq!(
            allocator.image(old),
            Err(BufferError::Stale {
                role:    BufferRole::LightOcclusion,
                held:    0,
                current: 1,
            })
        );
        assert!(images.get(&old_image).is_none());

        let new_image = allocator.image(new).unwrap();
        let image = images.get(new_image).unwrap();
        assert_eq!(image.texture_descriptor.format, TextureFormat::Rgba32Float);
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn unallocated_role_is_reported()
    {
        let allocator = ScreenBufferAllocator::default();
        let handle = ScreenBufferHandle {
            role:       BufferRole::Distance,
            generation: 0,
        };
        assert_eq!(allocator.image(handle), Err(BufferError::Unallocated(BufferRole::Distance)));
        assert!(allocator.targets().is_none());
    }

    #[test]
    fn role_formats_and_filters()
    {
        let size = UVec2::new(100, 50);
        let cascades = UVec2::new(112, 64);

        let occlusion = ScreenBufferDesc::for_role(BufferRole::LightOcclusion, size, cascades);
        assert_eq!(occlusion.format, TextureFormat::Rgba16Float);
        assert_eq!(occlusion.size, size);

        let jfa = ScreenBufferDesc::for_role(BufferRole::JumpFloodB, size, cascades);
        assert_eq!(jfa.format, TextureFormat::Rg16Float);
        assert_eq!(jfa.filter, ImageFilterMode::Nearest);

        let distance = ScreenBufferDesc::for_role(BufferRole::Distance, size, cascades);
        assert_eq!(distance.format, TextureFormat::R16Float);
        assert_eq!(distance.filter, ImageFilterMode::Linear);
        assert_eq!(distance.mip_level_count(), 1);

        let radiance = ScreenBufferDesc::for_role(BufferRole::RadianceA, size, cascades);
        assert_eq!(radiance.size, cascades);
        assert_eq!(radiance.format, TextureFormat::Rgba16Float);
        assert_eq!(radiance.mip_level_count(), 7);
    }

    #[test]
    fn mip_chain_is_fully_backed()
    {
        let mut images = Assets::<Image>::default();
        let mut allocator = ScreenBufferAllocator::default();
        let desc = ScreenBufferDesc::for_role(BufferRole::RadianceB, UVec2::ONE, UVec2::new(16, 8));
        let (handle, _) = allocator.reallocate_if_needed(&mut images, BufferRole::RadianceB, desc);

        let image = images.get(allocator.image(handle).unwrap()).unwrap();
        assert_eq!(image.texture_descriptor.mip_level_count, 5);
        // 16x8 + 8x4 + 4x2 + 2x1 + 1x1 texels of 8 bytes
        assert_eq!(image.data.len(), (128 + 32 + 8 + 2 + 1) * 8);
    }

    #[test]
    fn ping_pong_flips()
    {
        assert_eq!(PingPong::A.other(), PingPong::B);
        assert_eq!(PingPong::B.other().other(), PingPong::B);
        assert_eq!(PingPongPair::RADIANCE.get(PingPong::B), BufferRole::RadianceB);
        assert_eq!(PingPongPair::JUMP_FLOOD.get(PingPong::A), BufferRole::JumpFloodA);
    }
}
