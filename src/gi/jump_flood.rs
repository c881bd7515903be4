use bevy::prelude::*;

use crate::gi::passes::{FullscreenPass, PassEncoder, PassUniforms, Program};
use crate::gi::targets::{BufferRole, PingPong, PingPongPair};

/// One round of the jump flood.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpStep {
    /// Halved from 2.0 before each round.
    pub step_size: f32,
    /// Sampling distance in texels.
    pub offset:    u32,
}

/// Minimum number of rounds that propagates a seed across the longer axis: ceil(log2(max(w, h))).
pub fn step_count(size: UVec2) -> u32
{
    let longest = size.x.max(size.y);
    if longest <= 1 {
        0
    } else {
        32 - (longest - 1).leading_zeros()
    }
}

/// Rounds of a `size` buffer, offsets going from half the longer axis down to one texel.
pub fn jump_steps(size: UVec2) -> impl Iterator<Item = JumpStep>
{
    let steps = step_count(size);
    let span = 2f32.powi(steps as i32 - 1);
    let mut step_size = 2.0_f32;
    (0..steps).map(move |_| {
        step_size *= 0.5;
        JumpStep {
            step_size,
            offset: (step_size * span).round() as u32,
        }
    })
}

/// Buffer holding the flood result of a `size` frame.
pub fn final_index(size: UVec2) -> PingPong
{
    if step_count(size) % 2 == 0 {
        PingPong::A
    } else {
        PingPong::B
    }
}

/// Seeds from the light-occlusion buffer, floods, then resolves the signed
/// distance into the distance buffer. Returns the buffer holding the flood
/// result, or `None` without issuing anything when the buffer is empty.
pub fn encode(encoder: &mut impl PassEncoder, size: UVec2) -> Option<PingPong>
{
    if size.x == 0 || size.y == 0 {
        return None;
    }

    let pair = PingPongPair::JUMP_FLOOD;

    encoder.fullscreen(FullscreenPass {
        program:  Program::Seed,
        source:   BufferRole::LightOcclusion,
        target:   pair.get(PingPong::A),
        uniforms: PassUniforms::None,
    });

    let last = jump_steps(size).fold(PingPong::A, |last, step| encode_step(encoder, last, step));

    encoder.fullscreen(FullscreenPass {
        program:  Program::SignedDistance,
        source:   pair.get(last),
        target:   BufferRole::Distance,
        uniforms: PassUniforms::None,
    });

    Some(last)
}

/// Floods from `last` into the other buffer and returns the new final index.
fn encode_step(encoder: &mut impl PassEncoder, last: PingPong, step: JumpStep) -> PingPong
{
    let pair = PingPongPair::JUMP_FLOOD;
    let next = last.other();
    encoder.fullscreen(FullscreenPass {
        program:  Program::JumpFlood,
        source:   pair.get(last),
        target:   pair.get(next),
        uniforms: PassUniforms::JumpStep {
            step_size: step.step_size,
            offset:    step.offset,
        },
    });
    next
}
