//! Randomized stimulus construction for discrimination experiments.
//!
//! All sampling is driven by a seeded [`ChaCha8Rng`], so re-invoking any
//! generator method with an identical seed and identical shape parameters
//! reproduces bit-identical output.
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// A generated stimulus sequence.
///
/// `input` has one row per timestep and one column per neuron; `labels` holds
/// one label per timestep, -1 during rest and otherwise the active class;
/// `classes` lists the class drawn for each episode in order.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusWaveform {
    pub input: DMatrix<f64>,
    pub labels: DVector<f64>,
    pub classes: Vec<usize>,
}

/// Generator of reproducible randomized input waveforms.
///
/// Values are gaussian with the configured mean and standard deviation, gated
/// by a bernoulli mask: each neuron-timestep is zeroed out with probability
/// `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimulusGenerator {
    mean: f64,
    std: f64,
    threshold: f64,
}

impl StimulusGenerator {
    pub fn new(mean: f64, std: f64, threshold: f64) -> Result<Self, SimError> {
        if std < 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "the noise standard deviation must be non-negative, got {}",
                std
            )));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SimError::InvalidParameter(format!(
                "the gating threshold must lie in [0, 1], got {}",
                threshold
            )));
        }
        Ok(StimulusGenerator {
            mean,
            std,
            threshold,
        })
    }

    /// Sample a gate mask and a matching value buffer, both row-major.
    /// The gate is drawn in full before the values, fixing the stream layout
    /// that the reproducibility guarantee relies on.
    fn sample_gated(
        &self,
        rows: usize,
        cols: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<(Vec<bool>, Vec<f64>), SimError> {
        let normal = Normal::new(self.mean, self.std).map_err(|e| {
            SimError::InvalidParameter(format!("invalid noise distribution: {}", e))
        })?;
        let gate: Vec<bool> = (0..rows * cols)
            .map(|_| rng.gen::<f64>() > self.threshold)
            .collect();
        let values: Vec<f64> = (0..rows * cols).map(|_| normal.sample(rng)).collect();
        Ok((gate, values))
    }

    /// Baseline random input: gated gaussian noise.
    pub fn random_input(
        &self,
        population_size: usize,
        duration: usize,
        seed: u64,
    ) -> Result<DMatrix<f64>, SimError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (gate, values) = self.sample_gated(duration, population_size, &mut rng)?;
        Ok(DMatrix::from_fn(duration, population_size, |i, j| {
            let n = i * population_size + j;
            if gate[n] {
                values[n]
            } else {
                0.0
            }
        }))
    }

    /// An all-zero waveform, e.g., for control runs without stimulation.
    pub fn zero_input(&self, population_size: usize, duration: usize) -> DMatrix<f64> {
        DMatrix::zeros(duration, population_size)
    }

    /// The two mutually exclusive trial patterns of one experiment: class 0
    /// keeps the gate-enabled values, class 1 keeps the gated-out complement.
    pub fn signal_pair(
        &self,
        signal_duration: usize,
        population_size: usize,
        seed: u64,
    ) -> Result<[DMatrix<f64>; 2], SimError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.sample_signal_pair(signal_duration, population_size, &mut rng)
    }

    fn sample_signal_pair(
        &self,
        signal_duration: usize,
        population_size: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<[DMatrix<f64>; 2], SimError> {
        let (gate, values) = self.sample_gated(signal_duration, population_size, rng)?;
        let masked = |enabled: bool| {
            DMatrix::from_fn(signal_duration, population_size, |i, j| {
                let n = i * population_size + j;
                if gate[n] == enabled {
                    values[n]
                } else {
                    0.0
                }
            })
        };
        Ok([masked(true), masked(false)])
    }

    /// One episode's worth of presentations: the signal followed by a
    /// zero-valued rest period, repeated `signal_repeat` times.
    pub fn signal_block(
        signal: &DMatrix<f64>,
        signal_repeat: usize,
        rest_duration: usize,
    ) -> DMatrix<f64> {
        let block_rows = signal.nrows() + rest_duration;
        DMatrix::from_fn(block_rows * signal_repeat, signal.ncols(), |i, j| {
            let row = i % block_rows;
            if row < signal.nrows() {
                signal[(row, j)]
            } else {
                0.0
            }
        })
    }

    /// The label sequence matching one episode: the class during each signal
    /// presentation, -1 during every rest period including the trailing
    /// episode rest.
    fn label_block(
        class: usize,
        signal_duration: usize,
        signal_repeat: usize,
        rest_duration: usize,
    ) -> Vec<f64> {
        let mut labels =
            Vec::with_capacity((signal_duration + rest_duration) * signal_repeat + rest_duration);
        for _ in 0..signal_repeat {
            labels.extend(std::iter::repeat(class as f64).take(signal_duration));
            labels.extend(std::iter::repeat(-1.0).take(rest_duration));
        }
        labels.extend(std::iter::repeat(-1.0).take(rest_duration));
        labels
    }

    /// A multi-episode randomized sequence for a discrimination experiment.
    ///
    /// Each of the `episodes` episodes independently draws which of the two
    /// signals plays (unbiased coin flip), plays its signal-plus-rest block,
    /// and ends with one extra rest period. The episode duration is therefore
    /// `(signal_duration + rest_duration) * signal_repeat + rest_duration`.
    pub fn random_signals(
        &self,
        episodes: usize,
        signal_duration: usize,
        signal_repeat: usize,
        rest_duration: usize,
        population_size: usize,
        seed: u64,
    ) -> Result<StimulusWaveform, SimError> {
        let episode_duration = (signal_duration + rest_duration) * signal_repeat + rest_duration;
        let total_duration = episode_duration * episodes;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let signals = self.sample_signal_pair(signal_duration, population_size, &mut rng)?;

        let mut input = DMatrix::zeros(total_duration, population_size);
        let mut labels = DVector::from_element(total_duration, -1.0);
        let mut classes = Vec::with_capacity(episodes);

        for episode in 0..episodes {
            let class = usize::from(rng.gen::<f64>() > 0.5);
            let block = Self::signal_block(&signals[class], signal_repeat, rest_duration);
            let start = episode * episode_duration;
            input
                .view_mut((start, 0), (block.nrows(), population_size))
                .copy_from(&block);
            // the trailing episode rest rows stay zero
            let episode_labels =
                Self::label_block(class, signal_duration, signal_repeat, rest_duration);
            for (offset, label) in episode_labels.into_iter().enumerate() {
                labels[start + offset] = label;
            }
            classes.push(class);
        }

        Ok(StimulusWaveform {
            input,
            labels,
            classes,
        })
    }
}
