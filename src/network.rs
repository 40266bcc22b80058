//! Populations, synapse groups, and the network that drives them.
use std::mem;

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::behavior::{PopulationBehavior, SynapseBehavior};
use crate::error::SimError;

/// The channel of a synapse group, fixed by the polarity of its source population.
/// Excitatory groups add their contribution to the destination current,
/// inhibitory groups subtract it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Excitatory,
    Inhibitory,
}

/// Parameters of the leaky integrate-and-fire dynamics,
/// `tau * dv/dt = v_rest - v + r * i`, with reset to `v_reset` on threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifParameters {
    pub v_rest: f64,
    pub v_reset: f64,
    pub tau: f64,
    pub r: f64,
    pub threshold: f64,
}

impl Default for LifParameters {
    fn default() -> Self {
        LifParameters {
            v_rest: -65.0,
            v_reset: -65.0,
            tau: 10.0,
            r: 2.0,
            threshold: -55.0,
        }
    }
}

/// A population of LIF neurons sharing one parameter set.
///
/// All per-neuron state is dense and fixed-size: the potential vector `v`,
/// the spike vector of the current iteration, and the input current `current`.
/// The population owns an ordered list of behaviors; list position is
/// execution priority within one iteration.
pub struct NeuronPopulation {
    pub id: usize,
    pub size: usize,
    pub v: DVector<f64>,
    pub spikes: Vec<bool>,
    pub current: DVector<f64>,
    pub params: LifParameters,
    pub(crate) behaviors: Vec<Box<dyn PopulationBehavior>>,
}

impl NeuronPopulation {
    pub fn new(
        id: usize,
        size: usize,
        params: LifParameters,
        behaviors: Vec<Box<dyn PopulationBehavior>>,
    ) -> Self {
        NeuronPopulation {
            id,
            size,
            v: DVector::from_element(size, params.v_rest),
            spikes: vec![false; size],
            current: DVector::zeros(size),
            params,
            behaviors,
        }
    }

    /// The spike vector as 0/1 reals, ready for matrix multiplication.
    pub fn spike_vector(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.size,
            self.spikes.iter().map(|&s| if s { 1.0 } else { 0.0 }),
        )
    }

    /// The number of neurons that fired in the current iteration.
    pub fn num_spikes(&self) -> usize {
        self.spikes.iter().filter(|&&s| s).count()
    }
}

/// A directed, weighted many-to-many connection between two populations.
///
/// The weight matrix has shape `dst.size x src.size` and never changes shape
/// after creation. Each group owns its own pre- and post-synaptic trace slots,
/// so two groups with different decay constants never blend their traces
/// through a shared population field.
pub struct SynapseGroup {
    pub src: usize,
    pub dst: usize,
    pub weight: DMatrix<f64>,
    pub tau: f64,
    pub channel: Channel,
    pub src_trace: DVector<f64>,
    pub dst_trace: DVector<f64>,
    pub(crate) behaviors: Vec<Box<dyn SynapseBehavior>>,
}

impl SynapseGroup {
    pub fn new(
        src: usize,
        dst: usize,
        weight: DMatrix<f64>,
        tau: f64,
        channel: Channel,
        behaviors: Vec<Box<dyn SynapseBehavior>>,
    ) -> Self {
        let src_trace = DVector::zeros(weight.ncols());
        let dst_trace = DVector::zeros(weight.nrows());
        SynapseGroup {
            src,
            dst,
            weight,
            tau,
            channel,
            src_trace,
            dst_trace,
            behaviors,
        }
    }
}

/// Randomized sparse weight initialization, a pure function of
/// `(shape, density, coef, seed)`.
///
/// Entries are uniform over `[0, 1)`, zeroed out with probability
/// `1 - density`, and scaled by `coef`. Two calls with identical arguments
/// produce bit-identical matrices.
pub fn init_weights(
    rows: usize,
    cols: usize,
    density: f64,
    coef: f64,
    seed: u64,
) -> Result<DMatrix<f64>, SimError> {
    if !(0.0..=1.0).contains(&density) {
        return Err(SimError::InvalidParameter(format!(
            "connection density must lie in [0, 1], got {}",
            density
        )));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Ok(DMatrix::from_fn(rows, cols, |_, _| {
        let value = rng.gen::<f64>();
        if rng.gen::<f64>() < density {
            value * coef
        } else {
            0.0
        }
    }))
}

/// The complete simulated system: an ordered collection of populations, an
/// ordered collection of synapse groups, and the global iteration counter.
///
/// One iteration steps every population in insertion order, then every
/// synapse group in insertion order. A destination population therefore reads
/// current-iteration spikes from sources stepped earlier in the order, and
/// previous-iteration spikes from itself and later sources, which puts exactly
/// one iteration of transmission delay on recurrent edges.
#[derive(Default)]
pub struct Network {
    pub populations: Vec<NeuronPopulation>,
    pub synapses: Vec<SynapseGroup>,
    iteration: usize,
}

impl Network {
    pub fn new() -> Self {
        Network {
            populations: Vec::new(),
            synapses: Vec::new(),
            iteration: 0,
        }
    }

    /// The iteration counter. It is zero before the run starts and reads `t`
    /// while the behaviors of iteration `t` execute, starting at 1.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Add a population and return its ID.
    pub fn add_population(
        &mut self,
        size: usize,
        params: LifParameters,
        behaviors: Vec<Box<dyn PopulationBehavior>>,
    ) -> usize {
        let id = self.populations.len();
        self.populations
            .push(NeuronPopulation::new(id, size, params, behaviors));
        id
    }

    /// Add a synapse group and return its index.
    pub fn add_synapse_group(&mut self, group: SynapseGroup) -> usize {
        self.synapses.push(group);
        self.synapses.len() - 1
    }

    /// Run every behavior's initialization, in entity order then behavior order,
    /// and rewind the iteration counter.
    pub fn initialize(&mut self) -> Result<(), SimError> {
        self.iteration = 0;
        for p in 0..self.populations.len() {
            let mut behaviors = mem::take(&mut self.populations[p].behaviors);
            let result = behaviors
                .iter_mut()
                .try_for_each(|behavior| behavior.initialize(self, p));
            self.populations[p].behaviors = behaviors;
            result?;
        }
        for g in 0..self.synapses.len() {
            let mut behaviors = mem::take(&mut self.synapses[g].behaviors);
            let result = behaviors
                .iter_mut()
                .try_for_each(|behavior| behavior.initialize(self, g));
            self.synapses[g].behaviors = behaviors;
            result?;
        }
        Ok(())
    }

    /// Advance the whole network by one iteration.
    ///
    /// The behavior list of the entity being stepped is taken off the entity
    /// for the duration of the pass, so each behavior gets full access to the
    /// network while the list order stays the single source of priority.
    pub fn step(&mut self) -> Result<(), SimError> {
        self.iteration += 1;
        for p in 0..self.populations.len() {
            let mut behaviors = mem::take(&mut self.populations[p].behaviors);
            let result = behaviors
                .iter_mut()
                .try_for_each(|behavior| behavior.step(self, p));
            self.populations[p].behaviors = behaviors;
            result?;
        }
        for g in 0..self.synapses.len() {
            let mut behaviors = mem::take(&mut self.synapses[g].behaviors);
            let result = behaviors
                .iter_mut()
                .try_for_each(|behavior| behavior.step(self, g));
            self.synapses[g].behaviors = behaviors;
            result?;
        }
        Ok(())
    }

    /// Initialize every entity and execute a fixed number of iterations.
    ///
    /// Configuration problems that would surface mid-run, like a run longer
    /// than an external input waveform, are rejected before stepping begins.
    pub fn run(&mut self, num_iterations: usize) -> Result<(), SimError> {
        for population in &self.populations {
            for behavior in &population.behaviors {
                behavior.validate_run(num_iterations)?;
            }
        }
        self.initialize()?;

        log::info!("Starting simulation...");
        let log_interval = (num_iterations / 100).max(1);
        for it in 1..=num_iterations {
            self.step()?;
            if it % log_interval == 0 {
                let progress = (it as f64 / num_iterations as f64) * 100.0;
                log::debug!(
                    "Simulation progress: {:.2}% (Iteration: {}/{})",
                    progress,
                    it,
                    num_iterations
                );
            }
        }
        log::info!("Simulation completed successfully!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::neuron::Lif;

    #[test]
    fn test_population_starts_at_rest() {
        let mut network = Network::new();
        let id = network.add_population(50, LifParameters::default(), vec![Box::new(Lif)]);
        network.initialize().unwrap();

        let population = &network.populations[id];
        assert!(population.v.iter().all(|&v| v == -65.0));
        assert!(population.spikes.iter().all(|&s| !s));
        assert!(population.current.iter().all(|&i| i == 0.0));
    }

    #[test]
    fn test_spike_vector_casts_to_reals() {
        let mut network = Network::new();
        let id = network.add_population(3, LifParameters::default(), vec![]);
        network.populations[id].spikes = vec![true, false, true];
        assert_eq!(
            network.populations[id].spike_vector(),
            DVector::from_vec(vec![1.0, 0.0, 1.0])
        );
        assert_eq!(network.populations[id].num_spikes(), 2);
    }

    #[test]
    fn test_init_weights_reproducible() {
        let a = init_weights(20, 30, 0.5, 2.0, 42).unwrap();
        let b = init_weights(20, 30, 0.5, 2.0, 42).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, init_weights(20, 30, 0.5, 2.0, 43).unwrap());
    }

    #[test]
    fn test_init_weights_density_and_scale() {
        let zero = init_weights(10, 10, 0.0, 1.0, 42).unwrap();
        assert!(zero.iter().all(|&w| w == 0.0));

        let full = init_weights(10, 10, 1.0, 2.0, 42).unwrap();
        assert!(full.iter().all(|&w| (0.0..2.0).contains(&w)));

        let sparse = init_weights(50, 50, 0.2, 1.0, 42).unwrap();
        let nonzero = sparse.iter().filter(|&&w| w != 0.0).count();
        assert!(nonzero > 0 && nonzero < 50 * 50 / 2);
    }

    #[test]
    fn test_init_weights_invalid_density() {
        assert_eq!(
            init_weights(5, 5, 1.5, 1.0, 0),
            Err(SimError::InvalidParameter(
                "connection density must lie in [0, 1], got 1.5".to_string()
            ))
        );
    }

    #[test]
    fn test_iteration_counter_starts_at_one() {
        let mut network = Network::new();
        network.add_population(1, LifParameters::default(), vec![Box::new(Lif)]);
        network.initialize().unwrap();
        assert_eq!(network.iteration(), 0);
        network.step().unwrap();
        assert_eq!(network.iteration(), 1);
        network.step().unwrap();
        assert_eq!(network.iteration(), 2);
    }
}
