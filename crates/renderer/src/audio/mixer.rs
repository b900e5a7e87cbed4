use timeline::{AccumulatedState, EngineContext, OperatorError};

/// Samples per mixed block.
pub const BLOCK_SIZE: usize = 512;

/// One mixed block of planar audio starting at `start_sample`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub start_sample: i64,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBlock {
    pub fn silent(start_sample: i64, channels: usize) -> Self {
        Self {
            start_sample,
            channels: vec![vec![0.0; BLOCK_SIZE]; channels.max(1)],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn first_channel(&self) -> &[f32] {
        self.channels.first().map_or(&[], Vec::as_slice)
    }

    /// Frame-major samples as a device or encoder expects them.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(BLOCK_SIZE * self.channels.len());
        for index in 0..BLOCK_SIZE {
            for channel in &self.channels {
                out.push(channel.get(index).copied().unwrap_or(0.0));
            }
        }
        out
    }

    pub fn is_silent(&self) -> bool {
        self.channels.iter().flatten().all(|sample| *sample == 0.0)
    }
}

/// Mixes the audio of every active keyframe into one block.
///
/// Contributions are summed without averaging or clipping. Short
/// contributions are zero-padded, long ones truncated. A mono contribution
/// feeds every output channel; extra source channels are dropped.
pub fn mix_sound_block(
    state: &AccumulatedState,
    absolute_sample: i64,
    ctx: &EngineContext,
) -> Result<AudioBlock, OperatorError> {
    let mut block = AudioBlock::silent(absolute_sample, usize::from(ctx.channels));
    for entry in state {
        let Some(chunk) = entry.keyframe.sound(ctx, absolute_sample, BLOCK_SIZE)? else {
            continue;
        };
        if chunk.channel_count() == 0 {
            continue;
        }
        for (index, output) in block.channels.iter_mut().enumerate() {
            let input = if chunk.channel_count() == 1 {
                &chunk.channels[0]
            } else if let Some(input) = chunk.channels.get(index) {
                input
            } else {
                continue;
            };
            for (out, sample) in output.iter_mut().zip(input.iter()) {
                *out += *sample;
            }
        }
    }
    Ok(block)
}
