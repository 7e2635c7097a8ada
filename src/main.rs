use anyhow::Context;
use clap::{Parser, Subcommand};
use netft::{load_config, Measurement, NetFtError, Sensor, SensorConfig};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "netft")]
#[command(about = "Read force/torque data from an ATI Net F/T box over RDT")]
struct Args {
    /// IP address of the Net F/T box (falls back to NETFT_IP)
    #[arg(long)]
    ip: Option<String>,

    /// RDT port on the box
    #[arg(long)]
    port: Option<u16>,

    /// Tare with this many samples before running the command
    #[arg(long)]
    tare: Option<usize>,

    /// Print one JSON object per measurement
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Request and print a single measurement
    Read,
    /// Request a fixed number of samples and print each one
    Batch {
        #[arg(short, long, default_value_t = 10)]
        count: u32,
    },
    /// Stream with the background handler and print the latest value periodically
    Stream {
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
    /// Tare and print the resulting offset
    Tare {
        #[arg(short, long)]
        samples: Option<usize>,
    },
}

#[derive(Serialize)]
struct Reading<'a> {
    #[serde(flatten)]
    measurement: &'a Measurement,
    force: [f64; 3],
    torque: [f64; 3],
}

fn resolve_config(args: &Args) -> anyhow::Result<SensorConfig> {
    let mut config = match (&args.ip, SensorConfig::from_env()) {
        (Some(ip), Ok(mut config)) => {
            config.ip = ip.clone();
            config
        }
        (Some(ip), Err(_)) => SensorConfig::new(ip.clone()),
        (None, _) => load_config()?,
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    Ok(config)
}

fn print_measurement(measurement: &Measurement, json: bool) -> anyhow::Result<()> {
    if json {
        let reading = Reading {
            measurement,
            force: measurement.force(),
            torque: measurement.torque(),
        };
        println!("{}", serde_json::to_string(&reading)?);
    } else {
        let f = measurement.force();
        let t = measurement.torque();
        println!(
            "#{:<8} F = [{:>9.4} {:>9.4} {:>9.4}] N   T = [{:>9.4} {:>9.4} {:>9.4}] Nm",
            measurement.sequence, f[0], f[1], f[2], t[0], t[1], t[2]
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    log::info!("🚀 Starting netft with args: {:?}", args);

    let config = resolve_config(&args)?;
    let sensor = Sensor::from_config(config.clone())
        .with_context(|| format!("failed to open socket to {}:{}", config.ip, config.port))?;

    if let Some(samples) = args.tare {
        sensor.tare(samples).context("tare failed")?;
    }

    match args.command {
        Cmd::Read => {
            let measurement = sensor.get_measurement()?;
            print_measurement(&measurement, args.json)?;
        }
        Cmd::Batch { count } => {
            sensor.get_measurements(count)?;
            for _ in 0..count {
                match sensor.receive() {
                    Ok(measurement) => print_measurement(&measurement, args.json)?,
                    Err(NetFtError::MalformedResponse { expected, actual }) => {
                        log::warn!("Skipping malformed response ({} of {} bytes)", actual, expected);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Cmd::Stream {
            seconds,
            interval_ms,
        } => {
            let duration = Duration::from_secs_f64(seconds.max(0.0));
            let interval = Duration::from_millis(interval_ms.max(1));
            sensor.start_streaming(true)?;

            let started = Instant::now();
            let mut outcome = Ok(());
            while started.elapsed() < duration {
                std::thread::sleep(interval);
                match sensor.measurement() {
                    Ok(measurement) => print_measurement(&measurement, args.json)?,
                    // Nothing published yet
                    Err(NetFtError::InvalidState(_)) => continue,
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }

            sensor.stop_streaming()?;
            let stats = sensor.stream_stats();
            log::info!(
                "📊 Streamed {} samples ({} malformed skipped)",
                stats.published,
                stats.skipped
            );
            outcome?;
        }
        Cmd::Tare { samples } => {
            let offset = sensor.tare(samples.unwrap_or(config.tare_samples))?;
            if args.json {
                println!("{}", serde_json::to_string(&offset)?);
            } else {
                println!("offset (counts): {:?}", offset);
            }
        }
    }

    Ok(())
}
