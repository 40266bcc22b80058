//! Behaviors stepping the state of a synapse group.
use serde::{Deserialize, Serialize};

use crate::behavior::SynapseBehavior;
use crate::error::SimError;
use crate::network::Network;

/// Decaying spike trace on both endpoints of a synapse group.
///
/// Per step, each endpoint trace is advanced by one Euler step of
/// `dx/dt = spikes - x / tau`, with the decay constant taken from the owning
/// group. The trace slots live on the group itself, so a population feeding
/// several plastic groups with different decay constants contributes to
/// several independent traces instead of one implicitly blended value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trace;

impl SynapseBehavior for Trace {
    fn initialize(&mut self, net: &mut Network, group: usize) -> Result<(), SimError> {
        let (src, dst, tau) = {
            let group = &net.synapses[group];
            (group.src, group.dst, group.tau)
        };
        if tau <= 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "the trace decay constant must be positive, got {}",
                tau
            )));
        }
        let src_size = net.populations[src].size;
        let dst_size = net.populations[dst].size;
        let group = &mut net.synapses[group];
        group.src_trace = nalgebra::DVector::zeros(src_size);
        group.dst_trace = nalgebra::DVector::zeros(dst_size);
        Ok(())
    }

    fn step(&mut self, net: &mut Network, group: usize) -> Result<(), SimError> {
        let (src, dst, tau) = {
            let group = &net.synapses[group];
            (group.src, group.dst, group.tau)
        };
        let src_spikes = net.populations[src].spike_vector();
        let dst_spikes = net.populations[dst].spike_vector();

        let group = &mut net.synapses[group];
        let d_src = src_spikes - &group.src_trace / tau;
        group.src_trace += d_src;
        let d_dst = dst_spikes - &group.dst_trace / tau;
        group.dst_trace += d_dst;
        Ok(())
    }
}

/// Elementwise weight bounding into `[w_min, w_max]`.
///
/// Idempotent: re-applying with the same bounds is a no-op on an already
/// bounded matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightClip {
    w_min: f64,
    w_max: f64,
}

impl WeightClip {
    /// Create a clipper, rejecting an empty weight range before any stepping.
    pub fn new(w_min: f64, w_max: f64) -> Result<Self, SimError> {
        if w_min >= w_max {
            return Err(SimError::InvalidParameter(format!(
                "invalid weight range: [{}, {}]",
                w_min, w_max
            )));
        }
        Ok(WeightClip { w_min, w_max })
    }
}

impl Default for WeightClip {
    fn default() -> Self {
        WeightClip {
            w_min: 0.0,
            w_max: 1.0,
        }
    }
}

impl SynapseBehavior for WeightClip {
    fn initialize(&mut self, _net: &mut Network, _group: usize) -> Result<(), SimError> {
        Ok(())
    }

    fn step(&mut self, net: &mut Network, group: usize) -> Result<(), SimError> {
        let (w_min, w_max) = (self.w_min, self.w_max);
        net.synapses[group]
            .weight
            .apply(|w| *w = w.clamp(w_min, w_max));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{init_weights, Channel, LifParameters, SynapseGroup};
    use nalgebra::DVector;

    fn two_populations_one_group(tau: f64) -> Network {
        let mut network = Network::new();
        let src = network.add_population(2, LifParameters::default(), vec![]);
        let dst = network.add_population(3, LifParameters::default(), vec![]);
        let weight = init_weights(3, 2, 1.0, 3.0, 42).unwrap();
        network.add_synapse_group(SynapseGroup::new(
            src,
            dst,
            weight,
            tau,
            Channel::Excitatory,
            vec![],
        ));
        network
    }

    #[test]
    fn test_trace_accumulates_and_decays() {
        let mut network = two_populations_one_group(10.0);
        let mut trace = Trace;
        trace.initialize(&mut network, 0).unwrap();

        network.populations[0].spikes = vec![true, false];
        trace.step(&mut network, 0).unwrap();
        assert_eq!(
            network.synapses[0].src_trace,
            DVector::from_vec(vec![1.0, 0.0])
        );
        assert_eq!(network.synapses[0].dst_trace, DVector::zeros(3));

        // Without further spikes the trace decays by a factor 1 - 1/tau.
        network.populations[0].spikes = vec![false, false];
        trace.step(&mut network, 0).unwrap();
        assert_eq!(
            network.synapses[0].src_trace,
            DVector::from_vec(vec![0.9, 0.0])
        );
    }

    #[test]
    fn test_trace_rejects_non_positive_tau() {
        let mut network = two_populations_one_group(0.0);
        assert!(matches!(
            Trace.initialize(&mut network, 0),
            Err(SimError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_weight_clip_bounds_and_idempotence() {
        let mut network = two_populations_one_group(10.0);
        let mut clip = WeightClip::new(0.0, 1.0).unwrap();
        clip.initialize(&mut network, 0).unwrap();

        clip.step(&mut network, 0).unwrap();
        let once = network.synapses[0].weight.clone();
        assert!(once.iter().all(|&w| (0.0..=1.0).contains(&w)));

        clip.step(&mut network, 0).unwrap();
        assert_eq!(network.synapses[0].weight, once);
    }

    #[test]
    fn test_weight_clip_rejects_empty_range() {
        assert_eq!(
            WeightClip::new(1.0, 1.0),
            Err(SimError::InvalidParameter(
                "invalid weight range: [1, 1]".to_string()
            ))
        );
        assert!(WeightClip::new(2.0, 1.0).is_err());
        assert!(WeightClip::new(-0.5, 0.5).is_ok());
    }
}
