//! The simulation context handed to both the front end and the core.

use crate::chemistry::{ChemistryModel, ExperimentParameters, ReactionType};
use crate::config::Settings;
use crate::droplet::{DropletSimulator, TickReport};
use crate::error::Result;
use crate::state::{TitrationObserver, TitrationState};
use log::warn;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Inbound commands from a UI.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ToggleValve,
    SetFlowRate(f64),
    AdjustFlow(f64),
    SetParameters(ExperimentParameters),
    SetReactionType(ReactionType),
    SetReactionTypeNamed(String),
    SetModel(ChemistryModel),
    ToggleModel,
    ToggleIndicator,
    Reset,
}

/// One titration run: state, falling drops, and the RNG driving spawns.
#[derive(Debug)]
pub struct Experiment {
    state: TitrationState,
    droplets: DropletSimulator,
    rng: StdRng,
    seed: u64,
}

impl Experiment {
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let mut state = TitrationState::new(
            settings.simulation,
            settings.parameters,
            settings.reaction,
            settings.model,
        )?;
        state.set_indicator(settings.indicator_active);
        let droplets = DropletSimulator::new(settings.simulation)?;
        Ok(Self {
            state,
            droplets,
            rng: StdRng::seed_from_u64(settings.seed),
            seed: settings.seed,
        })
    }

    pub fn tick(&mut self, dt: f64) -> TickReport {
        self.droplets.tick(dt, &mut self.state, &mut self.rng)
    }

    /// Applies a command. Rejected commands leave everything untouched.
    pub fn apply(&mut self, command: Command) -> Result<()> {
        let res = self.dispatch(command.clone());
        if let Err(e) = &res {
            warn!("rejected {command:?}: {e}");
        }
        res
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::ToggleValve => self.state.toggle_valve(),
            Command::SetFlowRate(flow) => self.droplets.set_flow_rate(flow)?,
            Command::AdjustFlow(delta) => {
                self.droplets.adjust_flow(delta);
            }
            Command::SetParameters(p) => {
                self.state
                    .set_parameters(p.acid_molarity, p.base_molarity, p.acid_volume_ml)?;
                self.droplets.clear();
            }
            Command::SetReactionType(reaction) => {
                self.state.set_reaction_type(reaction);
                self.droplets.clear();
            }
            Command::SetReactionTypeNamed(name) => {
                self.state.set_reaction_type_named(&name)?;
                self.droplets.clear();
            }
            Command::SetModel(model) => {
                self.state.set_model(model);
                self.droplets.clear();
            }
            Command::ToggleModel => {
                let model = self.state.model().toggled();
                self.state.set_model(model);
                self.droplets.clear();
            }
            Command::ToggleIndicator => self.state.toggle_indicator(),
            Command::Reset => self.reset(),
        }
        Ok(())
    }

    /// Clears the flask and every drop still in the air.
    pub fn reset(&mut self) {
        self.state.reset();
        self.droplets.clear();
    }

    pub fn subscribe(&mut self, observer: Box<dyn TitrationObserver>) {
        self.state.subscribe(observer);
    }

    pub fn state(&self) -> &TitrationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TitrationState {
        &mut self.state
    }

    pub fn droplets(&self) -> &DropletSimulator {
        &self.droplets
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}
