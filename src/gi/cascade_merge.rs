use crate::gi::passes::{FullscreenPass, PassEncoder, PassUniforms, Program};
use crate::gi::targets::{BufferRole, PingPong, PingPongPair};

/// Radiance buffer marked final when the merge stage starts; the first pass reads it.
pub const FIRST_FINAL: PingPong = PingPong::B;

/// Levels merged in order, coarsest first. Level 0 is never merged on its own,
/// so a hierarchy of `cascade_count` levels takes `cascade_count - 1` passes.
pub fn merge_levels(cascade_count: u32) -> impl DoubleEndedIterator<Item = u32>
{
    (1..cascade_count).rev()
}

/// Radiance buffer holding the merged result of a `cascade_count` frame.
pub fn final_index(cascade_count: u32) -> PingPong
{
    if cascade_count.saturating_sub(1) % 2 == 0 {
        FIRST_FINAL
    } else {
        FIRST_FINAL.other()
    }
}

/// Merges the hierarchy coarse to fine, one pass per level, then regenerates
/// the mip chains of both radiance buffers. `start` is the buffer considered
/// final on entry; the returned index is final on exit.
pub fn encode(encoder: &mut impl PassEncoder, cascade_count: u32, start: PingPong) -> PingPong
{
    let pair = PingPongPair::RADIANCE;

    let last = merge_levels(cascade_count).fold(start, |last, level| {
        let next = last.other();
        encoder.fullscreen(FullscreenPass {
            program:  Program::CascadeMerge,
            source:   pair.get(last),
            target:   pair.get(next),
            uniforms: PassUniforms::CascadeLevel { level },
        });
        next
    });

    encoder.generate_mips(BufferRole::RadianceA);
    encoder.generate_mips(BufferRole::RadianceB);

    last
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::gi::passes::PassRecording;

    /// Counts passes without recording them.
    #[derive(Default)]
    struct CountingEncoder
    {
        merges: Vec<u32>,
        mips:   Vec<BufferRole>,
    }

    impl PassEncoder for CountingEncoder
    {
        fn fullscreen(&mut self, pass: FullscreenPass)
        {
            if let PassUniforms::CascadeLevel { level } = pass.uniforms {
                self.merges.push(level);
            }
        }

        fn generate_mips(&mut self, role: BufferRole)
        {
            self.mips.push(role);
        }
    }

    #[test]
    fn four_cascades_take_three_passes()
    {
        let mut counter = CountingEncoder::default();
        encode(&mut counter, 4, FIRST_FINAL);
        assert_eq!(counter.merges, vec![3, 2, 1]);
    }

    #[test]
    fn pass_count_is_one_less_than_cascade_count()
    {
        for cascade_count in 1..=10 {
            let mut counter = CountingEncoder::default();
            let last = encode(&mut counter, cascade_count, FIRST_FINAL);
            assert_eq!(counter.merges.len(), cascade_count as usize - 1);
            assert!(!counter.merges.contains(&0));
            assert_eq!(last, final_index(cascade_count));
        }
    }

    #[test]
    fn both_radiance_buffers_get_mips()
    {
        for cascade_count in [1, 2, 7] {
            let mut counter = CountingEncoder::default();
            encode(&mut counter, cascade_count, FIRST_FINAL);
            assert_eq!(counter.mips, vec![BufferRole::RadianceA, BufferRole::RadianceB]);
        }
    }

    #[test]
    fn each_pass_reads_the_previous_result()
    {
        let mut recording = PassRecording::default();
        let last = encode(&mut recording, 4, PingPong::B);

        let passes: Vec<_> = recording.fullscreen_passes().copied().collect();
        assert_eq!(passes[0].source, BufferRole::RadianceB);
        assert_eq!(passes[0].target, BufferRole::RadianceA);
        for pair in passes.windows(2) {
            assert_eq!(pair[1].source, pair[0].target);
        }
        assert_eq!(last, PingPong::A);
        assert_eq!(PingPongPair::RADIANCE.get(last), passes[2].target);
    }

    #[test]
    fn single_cascade_keeps_start_buffer()
    {
        let mut recording = PassRecording::default();
        assert_eq!(encode(&mut recording, 1, PingPong::A), PingPong::A);
        assert_eq!(recording.count(Program::CascadeMerge), 0);
        assert_eq!(recording.mip_passes().count(), 2);
    }
}
