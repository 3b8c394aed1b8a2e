//! Acid–base titration simulation core.
//!
//! Drops fall from a burette ([`DropletSimulator`]), each arrival advances the
//! [`TitrationState`], and a [`ChemistryModel`] turns the added volume into pH.
//! [`Experiment`] bundles one run for a front end to drive.

pub mod chemistry;
pub mod config;
pub mod droplet;
pub mod error;
pub mod experiment;
pub mod indicator;
pub mod state;

pub use chemistry::{
    ChemistryModel, EquilibriumModel, ExperimentParameters, LogisticModel, PhModel, ReactionType,
};
pub use config::{Settings, SimulationConfig};
pub use droplet::{Arrival, Droplet, DropletSimulator, Particle, TickReport};
pub use error::{Result, TitrationError};
pub use experiment::{Command, Experiment};
pub use indicator::{solution_color, SolutionColor, Stage};
pub use state::{Sample, TitrationObserver, TitrationState};
