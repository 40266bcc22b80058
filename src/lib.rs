//! This crate provides tools for simulating populations of leaky
//! integrate-and-fire (LIF) spiking neurons in discrete time.
//!
//! Populations are connected by excitatory and inhibitory synapse groups,
//! plasticity plugs in through spike-trace-driven learning rules with weight
//! bounding, spike competition can be capped with k-winners-take-all, and a
//! seeded stimulus generator produces reproducible randomized waveforms for
//! discrimination experiments.
//!
//! # Building and running a network
//!
//! ```rust
//! use lif_snn::builder::{Connectivity, Simulator, SpikePolicy};
//! use lif_snn::network::LifParameters;
//!
//! let mut sim = Simulator::new(10.0, 42);
//! let params = LifParameters::default();
//! sim.add_excitatory(100, params, SpikePolicy::Lif, None);
//! sim.add_inhibitory(25, params, SpikePolicy::Lif, None);
//!
//! let connectivity = Connectivity::from_json(r#"{
//!     "same": {"exc": [{"src": 0, "dst": 0}]},
//!     "different": {"exc_inh": [{"src": 0, "dst": 0}],
//!                   "inh_exc": [{"src": 0, "dst": 0}]}
//! }"#).unwrap();
//! sim.connect(&connectivity).unwrap();
//! sim.run(100).unwrap();
//!
//! assert_eq!(sim.network().populations.len(), 2);
//! assert_eq!(sim.network().synapses.len(), 3);
//! ```
//!
//! # Generating stimuli
//!
//! ```rust
//! use lif_snn::stimulus::StimulusGenerator;
//!
//! let generator = StimulusGenerator::new(50.0, 20.0, 0.6).unwrap();
//! let stimulus = generator.random_signals(5, 10, 3, 5, 100, 42).unwrap();
//!
//! // 5 episodes of 3 signal-plus-rest presentations and a trailing rest each
//! assert_eq!(stimulus.input.nrows(), 5 * ((10 + 5) * 3 + 5));
//! assert_eq!(stimulus.classes.len(), 5);
//! ```

pub mod behavior;
pub mod builder;
pub mod error;
pub mod network;
pub mod stimulus;
