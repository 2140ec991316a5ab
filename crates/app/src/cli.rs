use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::control::{
    self, AppConfig, ServeArgs, VolumeArgs,
    actuator::VolumeActuator,
    config::{TelemetryOptions, VolumeBackend},
    telemetry,
};

/// Control system volume with a thumb/index pinch in front of the webcam.
#[derive(Debug, Parser)]
#[command(name = "gesture-volume", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the camera pipeline and the HTTP control surface.
    Serve(ServeArgs),
    /// Print the current output volume and optionally set it.
    Volume(VolumeArgs),
}

pub fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve(args) => {
            let config = AppConfig::try_from(args)?;
            control::run(config)
        }
        Commands::Volume(args) => run_volume(args),
    }
}

fn run_volume(args: VolumeArgs) -> Result<()> {
    let _telemetry_guard = telemetry::install_tracing(&TelemetryOptions::default());
    let backend = args.backend.unwrap_or_else(VolumeBackend::platform_default);
    let mut actuator = VolumeActuator::new(backend.control())
        .with_context(|| format!("Volume backend `{backend}` is unavailable"))?;
    let (min, max) = actuator.range();
    let level = actuator.current_level()?;
    println!("backend: {backend}");
    println!("range:   {min} .. {max}");
    println!("current: {level}");

    if let Some(percent) = args.set {
        actuator.try_apply(percent)?;
        println!("set:     {percent}% ({})", actuator.level_for(percent));
        println!("now:     {}", actuator.current_level()?);
    }
    Ok(())
}
