use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

use flight_instruments::sensors::{SimulatedAccelerometer, SimulatedBarometer};
use flight_instruments::{
    AltitudeUnit, DisplayState, FileStore, FlightLog, SamplingSession, SessionConfig,
    UnitPreference, VelocityUnit,
};

#[derive(Parser, Debug)]
#[command(name = "vario")]
#[command(about = "Paraglider vario, altimeter and artificial horizon", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample the (simulated) barometer and accelerometer and log the flight
    Run {
        /// Duration in seconds (0 = until Ctrl-C)
        #[arg(value_name = "SECONDS", default_value = "0")]
        duration: u64,

        /// Directory holding the flight log
        #[arg(long, default_value = "flight_data")]
        data_dir: PathBuf,

        /// Vertical speed unit (m/s or ft/s)
        #[arg(long, default_value = "m/s")]
        velocity_unit: VelocityUnit,

        /// Altitude unit (m or ft)
        #[arg(long, default_value = "m")]
        altitude_unit: AltitudeUnit,

        /// Pressure the simulated barometer oscillates around (hPa)
        #[arg(long, default_value = "950.0")]
        base_pressure: f64,

        /// Seconds between status lines
        #[arg(long, default_value = "1")]
        status_every: u64,
    },

    /// Print the stored flight log
    Logs {
        /// Directory holding the flight log
        #[arg(long, default_value = "flight_data")]
        data_dir: PathBuf,

        /// Only show the most recent N records
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Command::Run {
            duration,
            data_dir,
            velocity_unit,
            altitude_unit,
            base_pressure,
            status_every,
        } => {
            let config = SessionConfig {
                units: UnitPreference::new(velocity_unit, altitude_unit),
                ..SessionConfig::default()
            };
            run(duration, data_dir, config, base_pressure, status_every).await
        }
        Command::Logs { data_dir, limit } => show_logs(data_dir, limit).await,
    }
}

async fn run(
    duration: u64,
    data_dir: PathBuf,
    config: SessionConfig,
    base_pressure: f64,
    status_every: u64,
) -> Result<()> {
    println!("[{}] Vario starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", duration);
    println!("  Data Dir: {}", data_dir.display());
    println!("  Units: {} / {}", config.units.velocity, config.units.altitude);

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let store = Arc::new(FileStore::new(&data_dir));
    let log = Arc::new(FlightLog::with_key(store, config.log_key.clone()));
    let mut session = SamplingSession::new(
        SimulatedBarometer::new(base_pressure),
        SimulatedAccelerometer::new(),
        log,
        config,
    );
    session.start()?;

    let start = Instant::now();
    let status_period = Duration::from_secs(status_every.max(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
            _ = sleep(status_period) => {
                print_status(&session.display()?);
            }
        }

        if duration > 0 && start.elapsed() >= Duration::from_secs(duration) {
            println!("[{}] Duration reached, stopping...", ts_now());
            break;
        }
    }

    session.stop().await;

    let display = session.display()?;
    let records = session.logs().await;
    println!("\n=== Final Stats ===");
    println!("Pressure samples: {}", display.pressure_samples);
    println!("Acceleration samples: {}", display.acceleration_samples);
    println!("Rejected samples: {}", display.rejected_samples);
    println!("Failed log appends: {}", display.failed_appends);
    println!("Records in log: {}", records.len());

    Ok(())
}

fn print_status(display: &DisplayState) {
    let rate = display
        .vertical_rate
        .map(|v| format!("{:+.2}", v))
        .unwrap_or_else(|| "--".to_string());
    let altitude = display
        .altitude
        .map(|a| format!("{:.2}", a))
        .unwrap_or_else(|| "--".to_string());

    println!(
        "[{}] {} {} {} | alt {} {} | pitch {:.2}° roll {:.2}°",
        ts_now(),
        display.direction.arrow(),
        rate,
        display.units.velocity,
        altitude,
        display.units.altitude,
        display.smoothed_attitude.pitch_deg,
        display.smoothed_attitude.roll_deg,
    );
}

async fn show_logs(data_dir: PathBuf, limit: Option<usize>) -> Result<()> {
    let log = FlightLog::new(Arc::new(FileStore::new(&data_dir)));
    let records = log
        .read_all()
        .await
        .with_context(|| format!("reading flight log in {}", data_dir.display()))?;

    if records.is_empty() {
        println!("No records logged.");
        return Ok(());
    }

    let skip = limit.map(|n| records.len().saturating_sub(n)).unwrap_or(0);
    for record in records.iter().skip(skip) {
        println!(
            "{}  speed {} ({})  alt {} ({})",
            record.formatted_time(),
            record.speed,
            record.speed_unit(),
            record.alt,
            record.alt_unit(),
        );
    }
    println!("{} of {} records", records.len() - skip, records.len());

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
