//! CPU execution of the distance-transform programs.
//!
//! Mirrors `rc_seed.wgsl`, `rc_jump_flood.wgsl` and `rc_signed_distance.wgsl`
//! texel for texel. Cascade merges and mip regeneration are only counted.

use bevy::prelude::*;
use bevy::utils::HashMap;

use crate::gi::constants::{DISTANCE_NO_SEED, JUMP_FLOOD_EMPTY_SEED};
use crate::gi::jump_flood;
use crate::gi::passes::{FullscreenPass, PassEncoder, PassUniforms, Program};
use crate::gi::targets::{BufferRole, PingPong};

/// A texel is part of a surface when it blocks or emits any light.
pub fn is_surface(texel: Vec4) -> bool
{
    texel.w > 0.0 || texel.xyz().max_element() > 0.0
}

/// Row-major four-channel texel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareBuffer
{
    size:   UVec2,
    texels: Vec<Vec4>,
}

impl SoftwareBuffer
{
    pub fn new(size: UVec2) -> Self
    {
        Self::from_fn(size, |_| Vec4::ZERO)
    }

    pub fn from_fn(size: UVec2, f: impl Fn(UVec2) -> Vec4) -> Self
    {
        let texels = (0..size.y)
            .flat_map(|y| (0..size.x).map(move |x| UVec2::new(x, y)))
            .map(f)
            .collect();
        Self { size, texels }
    }

    pub fn size(&self) -> UVec2
    {
        self.size
    }

    pub fn get(&self, p: UVec2) -> Vec4
    {
        self.texels[(p.y * self.size.x + p.x) as usize]
    }

    pub fn set(&mut self, p: UVec2, value: Vec4)
    {
        let index = (p.y * self.size.x + p.x) as usize;
        self.texels[index] = value;
    }

    /// `None` outside the buffer.
    pub fn load(&self, p: IVec2) -> Option<Vec4>
    {
        let inside = p.cmpge(IVec2::ZERO).all() && p.cmplt(self.size.as_ivec2()).all();
        inside.then(|| self.get(p.as_uvec2()))
    }
}

fn texel_center(p: UVec2) -> Vec2
{
    p.as_vec2() + 0.5
}

fn surface_at(occlusion: &SoftwareBuffer, p: IVec2) -> bool
{
    occlusion.load(p).map_or(false, is_surface)
}

/// Distance in texels from `p` to the seed stored as uv, `None` for an empty seed.
fn seed_distance(seed: Vec4, p: UVec2, size: UVec2) -> Option<f32>
{
    (seed.x >= 0.0).then(|| (seed.xy() * size.as_vec2()).distance(texel_center(p)))
}

fn empty_seed() -> Vec4
{
    Vec4::new(JUMP_FLOOD_EMPTY_SEED, JUMP_FLOOD_EMPTY_SEED, 0.0, 0.0)
}

fn seed(occlusion: &SoftwareBuffer) -> SoftwareBuffer
{
    let size = occlusion.size();
    SoftwareBuffer::from_fn(size, |p| {
        let ip = p.as_ivec2();
        if !surface_at(occlusion, ip) {
            return empty_seed();
        }
        // the border counts as open space
        let boundary = [IVec2::X, IVec2::NEG_X, IVec2::Y, IVec2::NEG_Y]
            .into_iter()
            .any(|d| !surface_at(occlusion, ip + d));
        if boundary {
            let uv = texel_center(p) / size.as_vec2();
            Vec4::new(uv.x, uv.y, 0.0, 0.0)
        } else {
            empty_seed()
        }
    })
}

fn jump_flood_step(source: &SoftwareBuffer, offset: u32) -> SoftwareBuffer
{
    let size = source.size();
    let offset = offset as i32;
    SoftwareBuffer::from_fn(size, |p| {
        let mut best = empty_seed();
        let mut best_distance = f32::MAX;
        for y in -1..=1 {
            for x in -1..=1 {
                let Some(candidate) = source.load(p.as_ivec2() + IVec2::new(x, y) * offset) else {
                    continue;
                };
                if let Some(distance) = seed_distance(candidate, p, size) {
                    if distance < best_distance {
                        best_distance = distance;
                        best = candidate;
                    }
                }
            }
        }
        best
    })
}

fn signed_distance(flood: &SoftwareBuffer, occlusion: &SoftwareBuffer) -> SoftwareBuffer
{
    let size = flood.size();
    SoftwareBuffer::from_fn(size, |p| {
        let distance = match seed_distance(flood.get(p), p, size) {
            Some(d) if surface_at(occlusion, p.as_ivec2()) => -d,
            Some(d) => d,
            None => DISTANCE_NO_SEED,
        };
        Vec4::new(distance, 0.0, 0.0, 0.0)
    })
}

/// Runs passes on the CPU against its own set of buffers.
#[derive(Debug, Clone)]
pub struct SoftwarePassEncoder
{
    buffers:      HashMap<BufferRole, SoftwareBuffer>,
    merge_levels: Vec<u32>,
    mip_passes:   Vec<BufferRole>,
}

impl SoftwarePassEncoder
{
    /// Zeroed buffers of every role; radiance buffers use `cascade_resolution`.
    pub fn new(occlusion: SoftwareBuffer, cascade_resolution: UVec2) -> Self
    {
        let size = occlusion.size();
        let mut buffers: HashMap<BufferRole, SoftwareBuffer> = BufferRole::ALL
            .into_iter()
            .map(|role| {
                let role_size = match role {
                    BufferRole::RadianceA | BufferRole::RadianceB => cascade_resolution,
                    _ => size,
                };
                (role, SoftwareBuffer::new(role_size))
            })
            .collect();
        buffers.insert(BufferRole::LightOcclusion, occlusion);
        Self {
            buffers,
            merge_levels: Vec::new(),
            mip_passes: Vec::new(),
        }
    }

    pub fn buffer(&self, role: BufferRole) -> &SoftwareBuffer
    {
        &self.buffers[&role]
    }

    /// Levels of the merge passes seen so far, in order.
    pub fn merge_levels(&self) -> &[u32]
    {
        &self.merge_levels
    }

    pub fn mip_passes(&self) -> &[BufferRole]
    {
        &self.mip_passes
    }

    /// Builds the distance field of the light-occlusion buffer. Returns the
    /// buffer holding the flood result, `None` for an empty buffer.
    pub fn build_distance_field(&mut self) -> Option<PingPong>
    {
        let size = self.buffer(BufferRole::LightOcclusion).size();
        jump_flood::encode(self, size)
    }
}

impl PassEncoder for SoftwarePassEncoder
{
    fn fullscreen(&mut self, pass: FullscreenPass)
    {
        let source = self.buffer(pass.source);
        let output = match (pass.program, pass.uniforms) {
            (Program::Seed, _) => seed(source),
            (Program::JumpFlood, PassUniforms::JumpStep { offset, .. }) => jump_flood_step(source, offset),
            (Program::SignedDistance, _) => signed_distance(source, self.buffer(BufferRole::LightOcclusion)),
            (Program::CascadeMerge, PassUniforms::CascadeLevel { level }) => {
                self.merge_levels.push(level);
                return;
            }
            (program, uniforms) => {
                warn!("Skipping {:?} pass with mismatched uniforms {:?}", program, uniforms);
                return;
            }
        };
        self.buffers.insert(pass.target, output);
    }

    fn generate_mips(&mut self, role: BufferRole)
    {
        self.mip_passes.push(role);
    }
}
