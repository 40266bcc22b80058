//! Topology construction and the simulation driver.
//!
//! The [`Simulator`] assembles excitatory and inhibitory populations, wires
//! them according to a [`Connectivity`] specification, attaches the fixed
//! plasticity pipeline (trace tracker, learning rule, weight clip) to plastic
//! connections, and runs the step loop.
use std::collections::HashMap;
use std::io::Read;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::behavior::neuron::{ExternalInput, Kwta, Lif, SynapticInput};
use crate::behavior::synapse::{Trace, WeightClip};
use crate::behavior::{PopulationBehavior, SynapseBehavior};
use crate::error::SimError;
use crate::network::{init_weights, Channel, LifParameters, Network, SynapseGroup};

fn default_density() -> f64 {
    1.0
}

fn default_coef() -> f64 {
    1.0
}

fn default_w_max() -> f64 {
    1.0
}

/// Weight bounds of a connection, defaulting to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipParams {
    #[serde(default)]
    pub w_min: f64,
    #[serde(default = "default_w_max")]
    pub w_max: f64,
}

impl Default for ClipParams {
    fn default() -> Self {
        ClipParams {
            w_min: 0.0,
            w_max: 1.0,
        }
    }
}

/// One entry of the connectivity specification.
///
/// `src` and `dst` index into the polarity-specific population lists of the
/// connection group the entry belongs to. A connection with no learning rule
/// is passive: it gets no behaviors and its weight matrix is never mutated
/// after initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub src: usize,
    pub dst: usize,
    #[serde(default)]
    pub learning_rule: Option<String>,
    #[serde(default)]
    pub learning_params: HashMap<String, f64>,
    #[serde(default)]
    pub clip_params: ClipParams,
    #[serde(default = "default_density")]
    pub density: f64,
    #[serde(default = "default_coef")]
    pub coef: f64,
}

impl ConnectionSpec {
    /// A passive connection between the given population indices.
    pub fn passive(src: usize, dst: usize) -> Self {
        ConnectionSpec {
            src,
            dst,
            learning_rule: None,
            learning_params: HashMap::new(),
            clip_params: ClipParams::default(),
            density: 1.0,
            coef: 1.0,
        }
    }
}

/// Connections between populations of equal polarity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SamePolarity {
    #[serde(default)]
    pub inh: Vec<ConnectionSpec>,
    #[serde(default)]
    pub exc: Vec<ConnectionSpec>,
}

/// Connections between populations of opposite polarity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CrossPolarity {
    #[serde(default)]
    pub exc_inh: Vec<ConnectionSpec>,
    #[serde(default)]
    pub inh_exc: Vec<ConnectionSpec>,
}

/// The full connectivity specification: four connection groups keyed by the
/// polarity of their endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Connectivity {
    #[serde(default)]
    pub same: SamePolarity,
    #[serde(default)]
    pub different: CrossPolarity,
}

impl Connectivity {
    /// Parse a connectivity specification from JSON.
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        serde_json::from_str(json).map_err(|e| {
            SimError::InvalidParameter(format!("invalid connectivity specification: {}", e))
        })
    }

    /// Parse a connectivity specification from a reader, e.g., a file.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SimError> {
        serde_json::from_reader(reader).map_err(|e| {
            SimError::InvalidParameter(format!("invalid connectivity specification: {}", e))
        })
    }
}

/// How a population turns potential into spikes: plain LIF threshold reset or
/// k-winners-take-all competition. Exactly one policy governs a population,
/// chosen at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpikePolicy {
    Lif,
    Kwta { k: usize },
}

type LearningRuleFactory = Box<dyn Fn(&HashMap<String, f64>) -> Box<dyn SynapseBehavior>>;

/// Assembles populations and synapse groups per a connectivity specification
/// and drives the step loop.
pub struct Simulator {
    network: Network,
    excitatory: Vec<usize>,
    inhibitory: Vec<usize>,
    trace_tau: f64,
    weight_seed: u64,
    learning_rules: HashMap<String, LearningRuleFactory>,
}

impl Simulator {
    /// Create a simulator. `trace_tau` is the decay constant given to every
    /// plastic synapse group's trace; `weight_seed` is the base seed of the
    /// randomized weight initialization (each group uses the base seed offset
    /// by its creation index).
    pub fn new(trace_tau: f64, weight_seed: u64) -> Self {
        Simulator {
            network: Network::new(),
            excitatory: Vec::new(),
            inhibitory: Vec::new(),
            trace_tau,
            weight_seed,
            learning_rules: HashMap::new(),
        }
    }

    /// Register a learning rule under the identifier used by connection specs.
    pub fn register_learning_rule<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&HashMap<String, f64>) -> Box<dyn SynapseBehavior> + 'static,
    {
        self.learning_rules.insert(name.to_string(), Box::new(factory));
    }

    /// Add an excitatory population; returns its index within the excitatory list.
    pub fn add_excitatory(
        &mut self,
        size: usize,
        params: LifParameters,
        policy: SpikePolicy,
        input: Option<DMatrix<f64>>,
    ) -> usize {
        let id = self.add_population(size, params, policy, input);
        self.excitatory.push(id);
        self.excitatory.len() - 1
    }

    /// Add an inhibitory population; returns its index within the inhibitory list.
    pub fn add_inhibitory(
        &mut self,
        size: usize,
        params: LifParameters,
        policy: SpikePolicy,
        input: Option<DMatrix<f64>>,
    ) -> usize {
        let id = self.add_population(size, params, policy, input);
        self.inhibitory.push(id);
        self.inhibitory.len() - 1
    }

    fn add_population(
        &mut self,
        size: usize,
        params: LifParameters,
        policy: SpikePolicy,
        input: Option<DMatrix<f64>>,
    ) -> usize {
        let injector = match input {
            Some(waveform) => ExternalInput::new(waveform),
            None => ExternalInput::silent(),
        };
        let spiker: Box<dyn PopulationBehavior> = match policy {
            SpikePolicy::Lif => Box::new(Lif),
            SpikePolicy::Kwta { k } => Box::new(Kwta::new(k)),
        };
        let behaviors: Vec<Box<dyn PopulationBehavior>> =
            vec![Box::new(injector), Box::new(SynapticInput), spiker];
        self.network.add_population(size, params, behaviors)
    }

    /// Wire all four connection groups of the specification. The channel of
    /// each synapse group follows the polarity of its source population.
    pub fn connect(&mut self, connectivity: &Connectivity) -> Result<(), SimError> {
        let exc = self.excitatory.clone();
        let inh = self.inhibitory.clone();
        self.add_connections(&inh, &inh, &connectivity.same.inh, Channel::Inhibitory)?;
        self.add_connections(&exc, &exc, &connectivity.same.exc, Channel::Excitatory)?;
        self.add_connections(&exc, &inh, &connectivity.different.exc_inh, Channel::Excitatory)?;
        self.add_connections(&inh, &exc, &connectivity.different.inh_exc, Channel::Inhibitory)?;
        Ok(())
    }

    fn add_connections(
        &mut self,
        sources: &[usize],
        destinations: &[usize],
        specs: &[ConnectionSpec],
        channel: Channel,
    ) -> Result<(), SimError> {
        for spec in specs {
            let &src = sources.get(spec.src).ok_or_else(|| {
                SimError::OutOfBounds(format!("source population {} not found", spec.src))
            })?;
            let &dst = destinations.get(spec.dst).ok_or_else(|| {
                SimError::OutOfBounds(format!("destination population {} not found", spec.dst))
            })?;

            let rows = self.network.populations[dst].size;
            let cols = self.network.populations[src].size;
            let seed = self
                .weight_seed
                .wrapping_add(self.network.synapses.len() as u64);
            let weight = init_weights(rows, cols, spec.density, spec.coef, seed)?;

            let behaviors: Vec<Box<dyn SynapseBehavior>> = match &spec.learning_rule {
                None => Vec::new(),
                Some(name) => {
                    let factory = self.learning_rules.get(name).ok_or_else(|| {
                        SimError::InvalidParameter(format!("unknown learning rule: {}", name))
                    })?;
                    vec![
                        Box::new(Trace),
                        factory(&spec.learning_params),
                        Box::new(WeightClip::new(
                            spec.clip_params.w_min,
                            spec.clip_params.w_max,
                        )?),
                    ]
                }
            };

            self.network.add_synapse_group(SynapseGroup::new(
                src,
                dst,
                weight,
                self.trace_tau,
                channel,
                behaviors,
            ));
        }
        Ok(())
    }

    /// Initialize every entity and execute the fixed number of iterations.
    pub fn run(&mut self, num_iterations: usize) -> Result<(), SimError> {
        self.network.run(num_iterations)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }
}
