//! Behaviors stepping the per-neuron state of a population.
use std::cmp::Ordering;

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::behavior::PopulationBehavior;
use crate::error::SimError;
use crate::network::{Channel, Network};

/// Minimum population size to parallelize the membrane update.
pub const MIN_NEURONS_PAR: usize = 1024;

/// Leaky integrate-and-fire membrane dynamics with threshold reset.
///
/// Per step, spikes are registered for every neuron with `v >= threshold` and
/// those neurons are reset to `v_reset`; the potential of every neuron is then
/// integrated with `v += (v_rest - v + r * i) / tau`, so a just-reset neuron
/// still receives one decay increment toward `v_rest` in the same step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lif;

impl PopulationBehavior for Lif {
    fn initialize(&mut self, net: &mut Network, pop: usize) -> Result<(), SimError> {
        let population = &mut net.populations[pop];
        population.v = DVector::from_element(population.size, population.params.v_rest);
        population.spikes.iter_mut().for_each(|s| *s = false);
        Ok(())
    }

    fn step(&mut self, net: &mut Network, pop: usize) -> Result<(), SimError> {
        let population = &mut net.populations[pop];
        let params = population.params;
        let update = move |(v, spiked): (&mut f64, &mut bool), i: &f64| {
            *spiked = *v >= params.threshold;
            if *spiked {
                *v = params.v_reset;
            }
            *v += (params.v_rest - *v + params.r * i) / params.tau;
        };

        if population.size >= MIN_NEURONS_PAR {
            population
                .v
                .as_mut_slice()
                .par_iter_mut()
                .zip(population.spikes.par_iter_mut())
                .zip(population.current.as_slice().par_iter())
                .for_each(|(pair, i)| update(pair, i));
        } else {
            population
                .v
                .iter_mut()
                .zip(population.spikes.iter_mut())
                .zip(population.current.iter())
                .for_each(|(pair, i)| update(pair, i));
        }
        Ok(())
    }
}

/// K-winners-take-all spike policy.
///
/// Replaces [`Lif`] as the spiking behavior of a population; the two must
/// never be attached together, which the builder enforces through
/// [`crate::builder::SpikePolicy`]. Candidates are the neurons whose raw
/// potential reaches the threshold before any reset. When more than `k`
/// candidates exist, only those at or above the k-th largest margin
/// `v - threshold` keep their spike; all tied candidates at the cutoff are
/// retained, so more than `k` neurons may fire on a tie. Suppressed
/// candidates are reset to `v_reset` without spiking. Winners then fire,
/// reset, and integrate exactly like [`Lif`].
#[derive(Debug, Clone, Copy)]
pub struct Kwta {
    k: usize,
}

impl Kwta {
    pub fn new(k: usize) -> Self {
        Kwta { k }
    }
}

impl PopulationBehavior for Kwta {
    fn initialize(&mut self, net: &mut Network, pop: usize) -> Result<(), SimError> {
        let population = &mut net.populations[pop];
        if self.k == 0 || self.k > population.size {
            return Err(SimError::InvalidParameter(format!(
                "the number of winners must lie in 1..={}, got {}",
                population.size, self.k
            )));
        }
        population.v = DVector::from_element(population.size, population.params.v_rest);
        population.spikes.iter_mut().for_each(|s| *s = false);
        Ok(())
    }

    fn step(&mut self, net: &mut Network, pop: usize) -> Result<(), SimError> {
        let population = &mut net.populations[pop];
        let params = population.params;

        let mut will_fire: Vec<bool> = population
            .v
            .iter()
            .map(|&v| v >= params.threshold)
            .collect();
        let num_candidates = will_fire.iter().filter(|&&f| f).count();

        if num_candidates > self.k {
            let cutoff = population
                .v
                .iter()
                .zip(&will_fire)
                .filter(|(_, &fires)| fires)
                .map(|(&v, _)| v - params.threshold)
                .sorted_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal))
                .nth(self.k - 1)
                .unwrap_or(f64::INFINITY);
            for (i, fires) in will_fire.iter_mut().enumerate() {
                if *fires && population.v[i] - params.threshold < cutoff {
                    population.v[i] = params.v_reset;
                    *fires = false;
                }
            }
        }

        for i in 0..population.size {
            population.spikes[i] = will_fire[i];
            if will_fire[i] {
                population.v[i] = params.v_reset;
            }
            population.v[i] +=
                (params.v_rest - population.v[i] + params.r * population.current[i]) / params.tau;
        }
        Ok(())
    }
}

/// Synaptic current aggregation over afferent synapse groups.
///
/// Adds `W * spikes_src` to the destination current for every incoming
/// excitatory group and subtracts it for every incoming inhibitory group,
/// with no scaling beyond the magnitude of `W`. Runs after the injector has
/// set the baseline current, and reads whatever spike vector each source
/// currently holds: current-iteration spikes for sources stepped earlier in
/// the population order, previous-iteration spikes otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynapticInput;

impl PopulationBehavior for SynapticInput {
    fn initialize(&mut self, _net: &mut Network, _pop: usize) -> Result<(), SimError> {
        Ok(())
    }

    fn step(&mut self, net: &mut Network, pop: usize) -> Result<(), SimError> {
        let size = net.populations[pop].size;
        let mut current = DVector::zeros(size);
        for group in net.synapses.iter().filter(|group| group.dst == pop) {
            let source = &net.populations[group.src];
            if group.weight.nrows() != size || group.weight.ncols() != source.size {
                return Err(SimError::ShapeMismatch(format!(
                    "weight matrix is {}x{} but connects a source of size {} to a destination of size {}",
                    group.weight.nrows(),
                    group.weight.ncols(),
                    source.size,
                    size
                )));
            }
            let contribution = &group.weight * source.spike_vector();
            match group.channel {
                Channel::Excitatory => current += contribution,
                Channel::Inhibitory => current -= contribution,
            }
        }
        net.populations[pop].current += current;
        Ok(())
    }
}

/// External current injection.
///
/// Resets the population current at the start of every step and, when a
/// waveform is present, adds its row `iteration - 1` on top. The waveform is
/// a dense matrix with one row per timestep and one column per neuron; a run
/// must never outlast it.
pub struct ExternalInput {
    waveform: Option<DMatrix<f64>>,
}

impl ExternalInput {
    pub fn new(waveform: DMatrix<f64>) -> Self {
        ExternalInput {
            waveform: Some(waveform),
        }
    }

    /// An injector with no waveform: the population receives synaptic current only.
    pub fn silent() -> Self {
        ExternalInput { waveform: None }
    }
}

impl PopulationBehavior for ExternalInput {
    fn initialize(&mut self, net: &mut Network, pop: usize) -> Result<(), SimError> {
        let population = &mut net.populations[pop];
        if let Some(waveform) = &self.waveform {
            if waveform.ncols() != population.size {
                return Err(SimError::ShapeMismatch(format!(
                    "waveform has {} columns but the population has {} neurons",
                    waveform.ncols(),
                    population.size
                )));
            }
        }
        population.current = DVector::zeros(population.size);
        Ok(())
    }

    fn step(&mut self, net: &mut Network, pop: usize) -> Result<(), SimError> {
        let iteration = net.iteration();
        let population = &mut net.populations[pop];
        population.current.fill(0.0);
        if let Some(waveform) = &self.waveform {
            if iteration > waveform.nrows() {
                return Err(SimError::WaveformExhausted {
                    iteration,
                    duration: waveform.nrows(),
                });
            }
            population.current += waveform.row(iteration - 1).transpose();
        }
        Ok(())
    }

    fn validate_run(&self, num_iterations: usize) -> Result<(), SimError> {
        if let Some(waveform) = &self.waveform {
            if num_iterations > waveform.nrows() {
                return Err(SimError::WaveformExhausted {
                    iteration: num_iterations,
                    duration: waveform.nrows(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::LifParameters;

    fn single_population(size: usize) -> Network {
        let mut network = Network::new();
        network.add_population(size, LifParameters::default(), vec![]);
        network
    }

    #[test]
    fn test_lif_fires_resets_and_forgets() {
        let mut network = single_population(4);
        let mut lif = Lif;
        lif.initialize(&mut network, 0).unwrap();

        // Above threshold (-55), this neuron must fire and land back at rest.
        network.populations[0].v[2] = -50.0;
        lif.step(&mut network, 0).unwrap();
        assert_eq!(network.populations[0].spikes, vec![false, false, true, false]);
        assert_eq!(network.populations[0].v[2], -65.0);

        // The spike is not retained into the next step.
        lif.step(&mut network, 0).unwrap();
        assert_eq!(network.populations[0].num_spikes(), 0);
    }

    #[test]
    fn test_lif_integrates_toward_rest() {
        let mut network = single_population(1);
        let mut lif = Lif;
        lif.initialize(&mut network, 0).unwrap();

        // Start below rest with no input: v must decay monotonically toward -65
        // without ever crossing it.
        network.populations[0].v[0] = -75.0;
        let mut previous = -75.0;
        for _ in 0..50 {
            lif.step(&mut network, 0).unwrap();
            let v = network.populations[0].v[0];
            assert!(v > previous && v <= -65.0);
            previous = v;
        }
    }

    #[test]
    fn test_lif_input_drives_potential() {
        let mut network = single_population(1);
        let mut lif = Lif;
        lif.initialize(&mut network, 0).unwrap();

        network.populations[0].current[0] = 10.0;
        lif.step(&mut network, 0).unwrap();
        // v += (v_rest - v + r * i) / tau = (0 + 2 * 10) / 10 = 2
        assert_eq!(network.populations[0].v[0], -63.0);
    }

    #[test]
    fn test_synaptic_input_signed_channels() {
        let mut network = Network::new();
        let src = network.add_population(2, LifParameters::default(), vec![]);
        let dst = network.add_population(2, LifParameters::default(), vec![]);
        let weight = DMatrix::from_row_slice(2, 2, &[0.5, 0.0, 0.0, 0.25]);
        network.add_synapse_group(crate::network::SynapseGroup::new(
            src,
            dst,
            weight.clone(),
            10.0,
            Channel::Excitatory,
            vec![],
        ));
        network.add_synapse_group(crate::network::SynapseGroup::new(
            src,
            dst,
            weight,
            10.0,
            Channel::Inhibitory,
            vec![],
        ));

        network.populations[src].spikes = vec![true, true];
        let mut aggregator = SynapticInput;
        aggregator.step(&mut network, dst).unwrap();
        // Excitatory and inhibitory contributions cancel exactly.
        assert!(network.populations[dst].current.iter().all(|&i| i == 0.0));

        network.synapses.remove(1);
        network.populations[dst].current.fill(0.0);
        aggregator.step(&mut network, dst).unwrap();
        assert_eq!(
            network.populations[dst].current,
            DVector::from_vec(vec![0.5, 0.25])
        );
    }

    #[test]
    fn test_synaptic_input_shape_mismatch() {
        let mut network = Network::new();
        let src = network.add_population(2, LifParameters::default(), vec![]);
        let dst = network.add_population(2, LifParameters::default(), vec![]);
        network.add_synapse_group(crate::network::SynapseGroup::new(
            src,
            dst,
            DMatrix::zeros(3, 3),
            10.0,
            Channel::Excitatory,
            vec![],
        ));

        let mut aggregator = SynapticInput;
        assert!(matches!(
            aggregator.step(&mut network, dst),
            Err(SimError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_external_input_injects_rows() {
        let mut network = single_population(2);
        let waveform = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        network.populations[0].behaviors = vec![Box::new(ExternalInput::new(waveform))];
        network.initialize().unwrap();

        network.step().unwrap();
        assert_eq!(
            network.populations[0].current,
            DVector::from_vec(vec![1.0, 2.0])
        );
        network.step().unwrap();
        assert_eq!(
            network.populations[0].current,
            DVector::from_vec(vec![3.0, 4.0])
        );

        // The waveform has two rows, so the third iteration must abort.
        assert_eq!(
            network.step(),
            Err(SimError::WaveformExhausted {
                iteration: 3,
                duration: 2
            })
        );
    }

    #[test]
    fn test_external_input_validates_run_length() {
        let injector = ExternalInput::new(DMatrix::zeros(10, 1));
        assert_eq!(injector.validate_run(10), Ok(()));
        assert_eq!(
            injector.validate_run(11),
            Err(SimError::WaveformExhausted {
                iteration: 11,
                duration: 10
            })
        );
        assert_eq!(ExternalInput::silent().validate_run(1_000_000), Ok(()));
    }

    #[test]
    fn test_external_input_wrong_width() {
        let mut network = single_population(2);
        let mut injector = ExternalInput::new(DMatrix::zeros(5, 3));
        assert!(matches!(
            injector.initialize(&mut network, 0),
            Err(SimError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_kwta_caps_winners() {
        let mut network = single_population(5);
        let mut kwta = Kwta::new(2);
        kwta.initialize(&mut network, 0).unwrap();

        network.populations[0].v =
            DVector::from_vec(vec![-54.0, -53.0, -52.0, -55.5, -50.0]);
        kwta.step(&mut network, 0).unwrap();

        // Margins 1, 2, 3, -, 5: only the two largest survive.
        assert_eq!(
            network.populations[0].spikes,
            vec![false, false, true, false, true]
        );
        // Winners and suppressed candidates are all back at rest (v_reset == v_rest).
        for i in [0, 1, 2, 4] {
            assert_eq!(network.populations[0].v[i], -65.0);
        }
    }

    #[test]
    fn test_kwta_keeps_ties_at_cutoff() {
        let mut network = single_population(5);
        let mut kwta = Kwta::new(2);
        kwta.initialize(&mut network, 0).unwrap();

        network.populations[0].v =
            DVector::from_vec(vec![-54.0, -54.0, -54.0, -60.0, -60.0]);
        kwta.step(&mut network, 0).unwrap();
        // Three candidates tie at the cutoff margin, all are retained.
        assert_eq!(network.populations[0].num_spikes(), 3);
    }

    #[test]
    fn test_kwta_no_suppression_below_k() {
        let mut network = single_population(5);
        let mut kwta = Kwta::new(3);
        kwta.initialize(&mut network, 0).unwrap();

        network.populations[0].v =
            DVector::from_vec(vec![-54.0, -70.0, -54.0, -70.0, -70.0]);
        kwta.step(&mut network, 0).unwrap();
        assert_eq!(network.populations[0].num_spikes(), 2);
    }

    #[test]
    fn test_kwta_rejects_invalid_k() {
        let mut network = single_population(5);
        assert!(matches!(
            Kwta::new(0).initialize(&mut network, 0),
            Err(SimError::InvalidParameter(_))
        ));
        assert!(matches!(
            Kwta::new(6).initialize(&mut network, 0),
            Err(SimError::InvalidParameter(_))
        ));
        assert!(Kwta::new(5).initialize(&mut network, 0).is_ok());
    }
}
