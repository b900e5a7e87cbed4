use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::mixer::{AudioBlock, BLOCK_SIZE};

/// Samples kept for analysis.
pub const HISTORY_SIZE: usize = BLOCK_SIZE * 2;

/// Rolling window of the first output channel plus its magnitude spectrum.
///
/// Presentation only; nothing downstream of export reads it.
pub struct SpectrumHistory {
    samples: VecDeque<f32>,
    magnitudes: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumHistory {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            samples: std::iter::repeat(0.0).take(HISTORY_SIZE).collect(),
            magnitudes: vec![0.0; HISTORY_SIZE / 2],
            fft: planner.plan_fft_forward(HISTORY_SIZE),
            scratch: vec![Complex::default(); HISTORY_SIZE],
        }
    }

    /// Appends the block's first channel, dropping the oldest samples, and
    /// recomputes the spectrum.
    pub fn push(&mut self, block: &AudioBlock) {
        for sample in block.first_channel() {
            if self.samples.len() == HISTORY_SIZE {
                self.samples.pop_front();
            }
            self.samples.push_back(*sample);
        }

        for (slot, sample) in self.scratch.iter_mut().zip(&self.samples) {
            *slot = Complex::new(*sample, 0.0);
        }
        self.fft.process(&mut self.scratch);
        for (magnitude, bin) in self.magnitudes.iter_mut().zip(&self.scratch) {
            *magnitude = bin.norm();
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Magnitudes of the first half of the bins.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Mean magnitude, normalised by the window length.
    pub fn level(&self) -> f32 {
        let sum: f32 = self.magnitudes.iter().sum();
        sum / (self.magnitudes.len() as f32 * HISTORY_SIZE as f32 / 2.0)
    }

    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|sample| *sample = 0.0);
        self.magnitudes.iter_mut().for_each(|magnitude| *magnitude = 0.0);
    }
}

impl Default for SpectrumHistory {
    fn default() -> Self {
        Self::new()
    }
}
