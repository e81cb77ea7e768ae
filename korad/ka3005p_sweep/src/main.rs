use clap::Parser;
use log::info;

use korad_ka3005p::{Ka3005p, Session, ThreadSleeper};
use seriallink::{InstrumentError, SerialInterface};

mod config;

use config::Args;

fn main() -> Result<(), InstrumentError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let config = args.session_config();
    let settings = args.serial_settings();
    let session = Session::new(&config)?;

    // The port is closed when `psu` goes out of scope, on success and on error alike.
    let interface = SerialInterface::open(&settings)?;
    let mut psu = Ka3005p::new(interface);

    let (identity, status) = session.identify(&mut psu, &mut ThreadSleeper)?;
    println!("Power Supply ID: {identity}");
    println!("Power Supply Status bits [7:0]: {status}");

    let steps = session.sweep(&mut psu, &mut ThreadSleeper)?;
    info!("Sweep finished after {steps} steps");
    Ok(())
}
