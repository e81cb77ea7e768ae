//! Command line configuration of the sweep.

use std::time::Duration;

use clap::Parser;
use korad_ka3005p::{Delays, SessionConfig, Setpoint};
use seriallink::SerialSettings;

#[cfg(windows)]
const DEFAULT_PORT: &str = "COM1";
#[cfg(not(windows))]
const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Sweep the output voltage of a Korad KA3005P back and forth.
///
/// The supply is identified, initialized to the initial voltage and current limit, swept, and
/// finally set to the shutdown voltage with its output switched off.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Serial port the power supply is connected to.
    #[arg(long, default_value = DEFAULT_PORT)]
    pub port: String,
    /// Baud rate of the serial port.
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// Read timeout in seconds. A response is complete once a read times out.
    #[arg(long, default_value_t = 10.0, value_parser = parse_secs)]
    pub timeout: f64,

    /// First voltage of the sweep.
    #[arg(long, default_value_t = 12.0)]
    pub start: f64,
    /// Exclusive upper bound of the sweep.
    #[arg(long, default_value_t = 12.4)]
    pub stop: f64,
    /// Voltage increment of the sweep.
    #[arg(long, default_value_t = 0.2)]
    pub step: f64,
    /// How often the sweep is walked up and down.
    #[arg(long, default_value_t = 3)]
    pub cycles: usize,

    /// Voltage set before the output is switched on.
    #[arg(long, default_value = "5")]
    pub initial_voltage: Setpoint,
    /// Current limit in amperes.
    #[arg(long, default_value = "0.30")]
    pub current_limit: Setpoint,
    /// Voltage set before the output is switched off at the end.
    #[arg(long, default_value = "0.00")]
    pub shutdown_voltage: Setpoint,

    /// Settling time in seconds after each sweep voltage.
    #[arg(long, default_value_t = 3.0, value_parser = parse_secs)]
    pub step_delay: f64,
    /// Settling time in seconds after the output was switched on.
    #[arg(long, default_value_t = 5.0, value_parser = parse_secs)]
    pub output_on_delay: f64,

    /// How often each command is attempted before giving up.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
    /// Read back each sweep voltage after it settled and abort on a mismatch.
    #[arg(long)]
    pub verify: bool,
}

impl Args {
    /// Serial parameters of the power supply.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud: self.baud,
            timeout: Duration::from_secs_f64(self.timeout),
            ..SerialSettings::new(&self.port)
        }
    }

    /// The session configuration. Delays that have no option keep their defaults.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sweep_start: self.start,
            sweep_bound: self.stop,
            sweep_step: self.step,
            cycles: self.cycles,
            initial_voltage: self.initial_voltage,
            current_limit: self.current_limit,
            shutdown_voltage: self.shutdown_voltage,
            delays: Delays {
                sweep_step: Duration::from_secs_f64(self.step_delay),
                after_output_on: Duration::from_secs_f64(self.output_on_delay),
                ..Delays::default()
            },
            retry_attempts: self.retries,
            verify_setpoints: self.verify,
        }
    }
}

fn parse_secs(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if !secs.is_finite() || secs < 0.0 || secs > 3600.0 {
        return Err(format!("{secs} s is not between 0 and 3600 s"));
    }
    Ok(secs)
}
