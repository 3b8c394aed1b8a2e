use anyhow::{Context, Result};
use clap::Parser;
use std::{fs, path::Path, path::PathBuf};
use titration::{ChemistryModel, ExperimentParameters, ReactionType, Settings};

#[derive(Parser, Debug, Clone)]
#[command(name = "titration")]
#[command(about = "Acid-base titration in the terminal: burette, flask and a live pH curve", long_about = None)]
pub(crate) struct Args {
    /// JSON settings file; CLI flags override it
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    /// strong-strong | weak-strong | strong-weak | weak-weak
    #[arg(long, value_parser = parse_reaction)]
    pub(crate) reaction: Option<ReactionType>,

    /// equilibrium | logistic
    #[arg(long, value_parser = parse_model)]
    pub(crate) model: Option<ChemistryModel>,

    /// Acid concentration in the flask [mol/L]
    #[arg(long)]
    pub(crate) acid_molarity: Option<f64>,

    /// Base concentration in the burette [mol/L]
    #[arg(long)]
    pub(crate) base_molarity: Option<f64>,

    /// Acid volume in the flask [mL]
    #[arg(long)]
    pub(crate) acid_volume: Option<f64>,

    /// FPS cap (render rate)
    #[arg(long)]
    pub(crate) fps: Option<u32>,

    /// RNG seed for drop timing
    #[arg(long)]
    pub(crate) seed: Option<u64>,

    /// Start with the indicator switched off
    #[arg(long, default_value_t = false)]
    pub(crate) no_indicator: bool,

    /// Print the titration curve as CSV instead of drawing
    #[arg(long, default_value_t = false)]
    pub(crate) headless: bool,

    /// Headless: stop once this much base has been added [mL]
    #[arg(long, default_value_t = 100.0)]
    pub(crate) until_ml: f64,

    /// Headless: simulation step [s]
    #[arg(long, default_value_t = 1.0 / 60.0)]
    pub(crate) dt: f64,
}

fn parse_reaction(s: &str) -> Result<ReactionType, String> {
    s.parse().map_err(|e: titration::TitrationError| e.to_string())
}

fn parse_model(s: &str) -> Result<ChemistryModel, String> {
    s.parse().map_err(|e: titration::TitrationError| e.to_string())
}

pub(crate) fn load_settings(path: &Path) -> Result<Settings> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("could not read settings {}", path.display()))?;
    let settings = serde_json::from_str::<Settings>(&s)
        .with_context(|| format!("could not parse settings {}", path.display()))?;
    Ok(settings)
}

/// Settings file (or defaults) with CLI overrides applied, validated.
pub(crate) fn build_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };

    if let Some(r) = args.reaction {
        settings.reaction = r;
    }
    if let Some(m) = args.model {
        settings.model = m;
    }
    let p = settings.parameters;
    settings.parameters = ExperimentParameters {
        acid_molarity: args.acid_molarity.unwrap_or(p.acid_molarity),
        base_molarity: args.base_molarity.unwrap_or(p.base_molarity),
        acid_volume_ml: args.acid_volume.unwrap_or(p.acid_volume_ml),
    };
    if let Some(fps) = args.fps {
        settings.fps_cap = fps.clamp(10, 240);
    }
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    if args.no_indicator {
        settings.indicator_active = false;
    }

    settings.validate().context("invalid settings")?;
    Ok(settings)
}
