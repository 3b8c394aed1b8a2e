mod app;
mod cli;
mod headless;
mod input;
mod render;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Args::parse();

    // stderr shares the terminal with the alternate screen, so stay quiet there.
    let default_filter = if args.headless { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let settings = cli::build_settings(&args)?;
    if args.headless {
        headless::run(&settings, &args)
    } else {
        app::run(settings)
    }
}
