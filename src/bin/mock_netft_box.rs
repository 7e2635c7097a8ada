use clap::Parser;
use log::info;
use netft::{SimulatedBox, SimulatorConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mock_netft_box")]
#[command(about = "Simulated Net F/T box answering RDT requests over UDP")]
struct Args {
    /// Address to bind the UDP socket to
    #[arg(short, long, default_value = "127.0.0.1:49152")]
    address: String,

    /// Milliseconds between streamed samples
    #[arg(long, default_value_t = 1)]
    period_ms: u64,

    /// Counts reported for fx fy fz tx ty tz
    #[arg(
        long,
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_values_t = [0, 0, 1_000_000, 0, 0, 0]
    )]
    counts: Vec<i32>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    info!("🚀 Starting simulated Net F/T box with args: {:?}", args);

    let counts: [i32; 6] = args
        .counts
        .as_slice()
        .try_into()
        .map_err(|_| format!("expected 6 counts, got {}", args.counts.len()))?;

    let mut sim = SimulatedBox::new(SimulatorConfig {
        bind_address: args.address,
        sample_period: Duration::from_millis(args.period_ms.max(1)),
        counts,
        status: 0,
    });

    // Handle Ctrl+C gracefully
    let should_stop = Arc::new(AtomicBool::new(false));
    let should_stop_clone = should_stop.clone();
    ctrlc::set_handler(move || {
        info!("🛑 Received Ctrl+C, shutting down...");
        should_stop_clone.store(true, Ordering::Relaxed);
    })?;

    let addr = sim.start()?;
    info!("🎛️  Simulated box serving RDT on {}", addr);

    while !should_stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    sim.stop();
    Ok(())
}
