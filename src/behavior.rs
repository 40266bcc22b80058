//! The pluggable step modules attached to populations and synapse groups.
//!
//! Every piece of per-step logic is a behavior: a small owned object with an
//! `initialize` and a `step` operation, held by its entity in an ordered list.
//! List position is execution priority, which keeps the per-iteration order
//! deterministic without registry lookup or dispatch by name.
//!
//! The fixed pipelines built by [`crate::builder::Simulator`] are
//! injector -> aggregator -> membrane update (or KWTA) for populations, and
//! trace tracker -> learning rule -> weight clip for synapse groups.

pub mod neuron;
pub mod synapse;

pub use neuron::{ExternalInput, Kwta, Lif, SynapticInput};
pub use synapse::{Trace, WeightClip};

use crate::error::SimError;
use crate::network::Network;

/// A step module owned by a neuron population.
///
/// Behaviors receive the whole network so that, e.g., the synaptic current
/// aggregator can read the spike vectors of source populations. Each behavior
/// must only mutate the state of the entity it is attached to.
pub trait PopulationBehavior {
    /// Set up the population state before the first iteration.
    fn initialize(&mut self, net: &mut Network, pop: usize) -> Result<(), SimError>;

    /// Advance the population by one iteration.
    fn step(&mut self, net: &mut Network, pop: usize) -> Result<(), SimError>;

    /// Check that the behavior can sustain a run of the given length.
    fn validate_run(&self, _num_iterations: usize) -> Result<(), SimError> {
        Ok(())
    }
}

/// A step module owned by a synapse group.
///
/// Learning rules plug in through this trait: the simulator attaches an
/// arbitrary `SynapseBehavior` between the trace tracker and the weight clip,
/// and the rule reads the group's trace slots and mutates its weight matrix.
pub trait SynapseBehavior {
    /// Set up the synapse group state before the first iteration.
    fn initialize(&mut self, net: &mut Network, group: usize) -> Result<(), SimError>;

    /// Advance the synapse group by one iteration.
    fn step(&mut self, net: &mut Network, group: usize) -> Result<(), SimError>;
}
