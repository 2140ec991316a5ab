//! System output volume.
//!
//! [`VolumeControl`] is the raw device capability; [`VolumeActuator`] maps
//! percentages onto the device range probed at startup and keeps steady-state
//! failures out of the frame loop.

use std::{io, process::Command};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: &'static str,
        status: String,
        stderr: String,
    },
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("could not parse volume from `{0}`")]
    Parse(String),
    #[error("volume device unavailable: {0}")]
    Unavailable(String),
}

/// Device-level volume capability.
pub trait VolumeControl: Send {
    fn name(&self) -> &'static str;
    /// Inclusive device level range, e.g. `(0, 65536)` for PulseAudio.
    fn level_range(&self) -> (f64, f64);
    fn current_level(&mut self) -> Result<f64, ActuatorError>;
    fn set_level(&mut self, level: f64) -> Result<(), ActuatorError>;
}

/// Maps `[0, 100]` onto the device range and applies it.
pub struct VolumeActuator {
    control: Box<dyn VolumeControl>,
    range: (f64, f64),
    last_level: Option<i64>,
    failures: u64,
}

impl VolumeActuator {
    /// Probe the device once; failure here is fatal for the caller.
    pub fn new(mut control: Box<dyn VolumeControl>) -> Result<Self, ActuatorError> {
        let range = control.level_range();
        let current = control.current_level()?;
        info!(
            backend = control.name(),
            min = range.0,
            max = range.1,
            current,
            "volume device ready"
        );
        Ok(Self {
            control,
            range,
            last_level: None,
            failures: 0,
        })
    }

    pub fn backend(&self) -> &'static str {
        self.control.name()
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn level_for(&self, volume_percent: u8) -> f64 {
        let pct = f64::from(volume_percent.min(100));
        self.range.0 + (self.range.1 - self.range.0) * pct / 100.0
    }

    pub fn current_level(&mut self) -> Result<f64, ActuatorError> {
        self.control.current_level()
    }

    /// Apply a percentage, returning whether the device was actually touched.
    pub fn try_apply(&mut self, volume_percent: u8) -> Result<bool, ActuatorError> {
        let level = self.level_for(volume_percent);
        let rounded = level.round() as i64;
        if self.last_level == Some(rounded) {
            return Ok(false);
        }
        self.control.set_level(level)?;
        self.last_level = Some(rounded);
        Ok(true)
    }

    /// Apply a percentage, logging device errors instead of returning them.
    pub fn apply(&mut self, volume_percent: u8) {
        match self.try_apply(volume_percent) {
            Ok(true) => {
                metrics::gauge!("gesture_volume_percent").set(f64::from(volume_percent));
            }
            Ok(false) => {}
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                metrics::counter!("gesture_actuator_errors_total").increment(1);
                warn!(
                    backend = self.control.name(),
                    failures = self.failures,
                    "failed to set volume to {volume_percent}%: {err}"
                );
            }
        }
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

fn run_command(program: &'static str, args: &[&str]) -> Result<String, ActuatorError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ActuatorError::Spawn { program, source })?;
    if !output.status.success() {
        return Err(ActuatorError::Command {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// PulseAudio / PipeWire default sink through `pactl`.
pub struct PactlVolume;

/// PulseAudio's nominal 100 % level (`PA_VOLUME_NORM`).
pub const PACTL_VOLUME_NORM: f64 = 65_536.0;

impl VolumeControl for PactlVolume {
    fn name(&self) -> &'static str {
        "pactl"
    }

    fn level_range(&self) -> (f64, f64) {
        (0.0, PACTL_VOLUME_NORM)
    }

    fn current_level(&mut self) -> Result<f64, ActuatorError> {
        let stdout = run_command("pactl", &["get-sink-volume", "@DEFAULT_SINK@"])?;
        parse_pactl_volume(&stdout).ok_or_else(|| ActuatorError::Parse(stdout.trim().to_string()))
    }

    fn set_level(&mut self, level: f64) -> Result<(), ActuatorError> {
        let raw = (level.round() as i64).to_string();
        run_command("pactl", &["set-sink-volume", "@DEFAULT_SINK@", &raw]).map(|_| ())
    }
}

/// First raw channel level in `pactl get-sink-volume` output, e.g.
/// `Volume: front-left: 32768 /  50% / -18.06 dB, ...`.
pub(crate) fn parse_pactl_volume(output: &str) -> Option<f64> {
    let line = output.lines().find(|line| line.trim_start().starts_with("Volume:"))?;
    line.split_whitespace()
        .skip(1)
        .find_map(|token| token.parse::<u32>().ok())
        .map(f64::from)
}

/// macOS output volume through `osascript`.
pub struct OsaScriptVolume;

impl VolumeControl for OsaScriptVolume {
    fn name(&self) -> &'static str {
        "osascript"
    }

    fn level_range(&self) -> (f64, f64) {
        (0.0, 100.0)
    }

    fn current_level(&mut self) -> Result<f64, ActuatorError> {
        let stdout = run_command("osascript", &["-e", "output volume of (get volume settings)"])?;
        stdout
            .trim()
            .parse::<f64>()
            .map_err(|_| ActuatorError::Parse(stdout.trim().to_string()))
    }

    fn set_level(&mut self, level: f64) -> Result<(), ActuatorError> {
        let script = format!("set volume output volume {}", level.round() as i64);
        run_command("osascript", &["-e", &script]).map(|_| ())
    }
}

/// Records levels without touching any device.
#[derive(Debug, Default)]
pub struct NullVolume {
    level: f64,
}

impl VolumeControl for NullVolume {
    fn name(&self) -> &'static str {
        "none"
    }

    fn level_range(&self) -> (f64, f64) {
        (0.0, 100.0)
    }

    fn current_level(&mut self) -> Result<f64, ActuatorError> {
        Ok(self.level)
    }

    fn set_level(&mut self, level: f64) -> Result<(), ActuatorError> {
        debug!(level, "volume change (no device)");
        self.level = level;
        Ok(())
    }
}
