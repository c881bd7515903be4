use bevy::prelude::*;
use bevy::render::render_resource::TextureFormat;

use crate::gi::cascade_merge;
use crate::gi::constants::{
    DISTANCE_FORMAT,
    JUMP_FLOOD_FORMAT,
    RADIANCE_FORMAT,
    SHADER_CASCADE_MERGE,
    SHADER_JUMP_FLOOD,
    SHADER_SEED,
    SHADER_SIGNED_DISTANCE,
};
use crate::gi::jump_flood;
use crate::gi::targets::{BufferRole, PingPong};

/// Full-screen programs of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Program
{
    Seed,
    JumpFlood,
    SignedDistance,
    CascadeMerge,
}

impl Program
{
    pub const ALL: [Program; 4] = [
        Program::Seed,
        Program::JumpFlood,
        Program::SignedDistance,
        Program::CascadeMerge,
    ];

    pub fn shader_file(self) -> &'static str
    {
        match self {
            Program::Seed => SHADER_SEED,
            Program::JumpFlood => SHADER_JUMP_FLOOD,
            Program::SignedDistance => SHADER_SIGNED_DISTANCE,
            Program::CascadeMerge => SHADER_CASCADE_MERGE,
        }
    }

    pub fn label(self) -> &'static str
    {
        match self {
            Program::Seed => "rc_seed_pipeline",
            Program::JumpFlood => "rc_jump_flood_pipeline",
            Program::SignedDistance => "rc_signed_distance_pipeline",
            Program::CascadeMerge => "rc_cascade_merge_pipeline",
        }
    }

    pub fn target_format(self) -> TextureFormat
    {
        match self {
            Program::Seed | Program::JumpFlood => JUMP_FLOOD_FORMAT,
            Program::SignedDistance => DISTANCE_FORMAT,
            Program::CascadeMerge => RADIANCE_FORMAT,
        }
    }
}

/// Per-pass scalar inputs. Stage-wide inputs live in the shared parameter block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassUniforms
{
    None,
    /// `offset` is the sampling distance in texels derived from `step_size`.
    JumpStep
    {
        step_size: f32,
        offset:    u32,
    },
    CascadeLevel
    {
        level: u32,
    },
}

/// One invocation of a full-screen program reading `source` and writing `target`.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullscreenPass {
    pub program:  Program,
    pub source:   BufferRole,
    pub target:   BufferRole,
    pub uniforms: PassUniforms,
}

/// Sink for the passes of a frame, in submission order.
pub trait PassEncoder
{
    fn fullscreen(&mut self, pass: FullscreenPass);

    /// Rebuilds the whole mip chain of `role` from its level 0.
    fn generate_mips(&mut self, role: BufferRole);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordedPass
{
    Fullscreen(FullscreenPass),
    Mips(BufferRole),
}

/// Pass list of one frame, replayed by the render node.
#[derive(Resource, Debug, Clone, Default)]
pub struct PassRecording
{
    pub passes: Vec<RecordedPass>,
}

impl PassRecording
{
    pub fn clear(&mut self)
    {
        self.passes.clear();
    }

    pub fn count(&self, program: Program) -> usize
    {
        self.fullscreen_passes()
            .filter(|pass| pass.program == program)
            .count()
    }

    pub fn fullscreen_passes(&self) -> impl Iterator<Item = &FullscreenPass>
    {
        self.passes.iter().filter_map(|pass| match pass {
            RecordedPass::Fullscreen(pass) => Some(pass),
            RecordedPass::Mips(_) => None,
        })
    }

    pub fn mip_passes(&self) -> impl Iterator<Item = BufferRole> + '_
    {
        self.passes.iter().filter_map(|pass| match pass {
            RecordedPass::Mips(role) => Some(*role),
            RecordedPass::Fullscreen(_) => None,
        })
    }
}

impl PassEncoder for PassRecording
{
    fn fullscreen(&mut self, pass: FullscreenPass)
    {
        self.passes.push(RecordedPass::Fullscreen(pass));
    }

    fn generate_mips(&mut self, role: BufferRole)
    {
        self.passes.push(RecordedPass::Mips(role));
    }
}

/// Buffers holding the latest result of each ping-pong stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameResult
{
    pub jump_flood: PingPong,
    pub radiance:   PingPong,
}

/// Encodes the distance transform followed by the cascade merge.
/// `None` when the buffers are empty and nothing was issued.
pub fn encode_frame(encoder: &mut impl PassEncoder, size: UVec2, cascade_count: u32) -> Option<FrameResult>
{
    let jump_flood = jump_flood::encode(encoder, size)?;
    let radiance = cascade_merge::encode(encoder, cascade_count, cascade_merge::FIRST_FINAL);
    Some(FrameResult {
        jump_flood,
        radiance,
    })
}

/// Final buffers of a frame without encoding it.
pub fn frame_result(size: UVec2, cascade_count: u32) -> Option<FrameResult>
{
    if size.x == 0 || size.y == 0 {
        return None;
    }
    Some(FrameResult {
        jump_flood: jump_flood::final_index(size),
        radiance:   cascade_merge::final_index(cascade_count),
    })
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn frame_runs_distance_transform_before_merge()
    {
        let mut recording = PassRecording::default();
        let result = encode_frame(&mut recording, UVec2::new(64, 64), 3).unwrap();

        let programs: Vec<_> = recording.fullscreen_passes().map(|pass| pass.program).collect();
        let merge_start = programs
            .iter()
            .position(|program| *program == Program::CascadeMerge)
            .unwrap();
        assert!(programs[..merge_start].contains(&Program::SignedDistance));
        assert!(programs[merge_start..].iter().all(|p| *p == Program::CascadeMerge));

        assert_eq!(Some(result), frame_result(UVec2::new(64, 64), 3));
    }

    #[test]
    fn predicted_result_matches_encoding()
    {
        for (w, h) in [(1, 1), (2, 1), (16, 16), (17, 5), (300, 200), (1920, 1080)] {
            for cascade_count in 1..=10 {
                let size = UVec2::new(w, h);
                let mut recording = PassRecording::default();
                assert_eq!(
                    encode_frame(&mut recording, size, cascade_count),
                    frame_result(size, cascade_count)
                );
            }
        }
    }

    #[test]
    fn empty_frame_issues_nothing()
    {
        let mut recording = PassRecording::default();
        assert!(encode_frame(&mut recording, UVec2::new(0, 32), 4).is_none());
        assert!(recording.passes.is_empty());
        assert!(frame_result(UVec2::new(32, 0), 4).is_none());
    }
}
