use bevy::prelude::*;

use crate::gi::constants::MAX_CASCADE_COUNT;

/// Ray interval covered by one cascade, in post-scale texels.
#[rustfmt::skip]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CascadeRange {
    pub start:    f32,
    pub end:      f32,
    pub length:   f32,
    pub reserved: f32,
}

impl CascadeRange
{
    pub fn as_vec4(&self) -> Vec4
    {
        Vec4::new(self.start, self.end, self.length, self.reserved)
    }
}

/// Per-frame geometric plan of the cascade hierarchy.
#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq)]
pub struct CascadePlan {
    pub cascade_count:        u32,
    /// Only the first `cascade_count` entries are meaningful; the rest stay zeroed.
    pub ranges:               [CascadeRange; MAX_CASCADE_COUNT],
    pub radiance_max_length:  f32,
    /// Size of the radiance buffers: the post-scale size rounded up to a multiple of 2^cascade_count.
    pub cascade_resolution:   UVec2,
}

impl CascadePlan
{
    /// Splits `[0, |size| * ray_range]` into `cascade_count` bands, each four
    /// times longer than the previous one.
    pub fn new(ray_range: f32, cascade_count: u32, size: UVec2) -> Self
    {
        let cascade_count = cascade_count.clamp(1, MAX_CASCADE_COUNT as u32);
        let radiance_max_length = radiance_max_length(size, ray_range);

        // 4^n - 1 >= 3 for n >= 1
        let denominator = 4f32.powi(cascade_count as i32) - 1.0;
        let base_length = radiance_max_length * 3.0 / denominator;

        let mut ranges = [CascadeRange::default(); MAX_CASCADE_COUNT];
        let mut start = 0.0;
        for (i, range) in ranges.iter_mut().enumerate().take(cascade_count as usize) {
            let length = base_length * 4f32.powi(i as i32);
            let end = start + length;
            *range = CascadeRange {
                start,
                end,
                length,
                reserved: length,
            };
            start = end;
        }

        Self {
            cascade_count,
            ranges,
            radiance_max_length,
            cascade_resolution: cascade_resolution(size, cascade_count),
        }
    }

    pub fn active_ranges(&self) -> &[CascadeRange]
    {
        &self.ranges[..self.cascade_count as usize]
    }

    pub fn ranges_vec4(&self) -> [Vec4; MAX_CASCADE_COUNT]
    {
        self.ranges.map(|range| range.as_vec4())
    }
}

/// Diagonal of the post-scale buffer times the ray range.
pub fn radiance_max_length(size: UVec2, ray_range: f32) -> f32
{
    size.as_vec2().length() * ray_range
}

/// Rounds `size` up so every halved level of the cascade buffer keeps an integer texel footprint.
pub fn cascade_resolution(size: UVec2, cascade_count: u32) -> UVec2
{
    let block = 1u32 << cascade_count;
    UVec2::new(size.x.div_ceil(block) * block, size.y.div_ceil(block) * block)
}
