//! Entry point for `icom-bench`.
//!
//! Measures single-transfer throughput for pairs of communicator
//! specifications over a geometric range of transfer sizes, then prints one
//! table row per scenario. Every transfer builds a fresh sender/receiver pair
//! so connection setup is part of what gets measured.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use clap::Parser;
use icom::{config, Communicator, ConfigKey};
use rand::RngCore;

const DEFAULT_TX: &str = "socket_tx|default|127.0.0.1:8889";
const DEFAULT_RX: &str = "socket_rx|default|*:8889";

/// Throughput benchmark for icom communicators.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Smallest transfer size in bytes.
    #[arg(long, default_value_t = 4)]
    min_size: usize,

    /// Number of sizes to test; each one doubles the previous.
    #[arg(long, default_value_t = 23)]
    increments: u32,

    /// Transfers averaged per size.
    #[arg(long, default_value_t = 10)]
    runs: u32,

    /// Sender and receiver specification; repeat for more scenarios.
    #[arg(long = "scenario", num_args = 2, value_names = ["TX", "RX"])]
    scenarios: Vec<String>,

    /// Override both configured timeouts (microseconds).
    #[arg(long)]
    timeout_usec: Option<u64>,
}

struct Scenario {
    tx: String,
    rx: String,
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    if cli.min_size == 0 || cli.runs == 0 || cli.increments == 0 {
        bail!("--min-size, --runs and --increments must be non-zero");
    }
    if let Some(usec) = cli.timeout_usec {
        config::set(ConfigKey::TimeoutRcvUsec, usec)?;
        config::set(ConfigKey::TimeoutSndUsec, usec)?;
    }

    let scenarios = scenarios(&cli.scenarios);
    let sizes = transfer_sizes(cli.min_size, cli.increments)?;

    println!("### SCENARIOS ###");
    for (i, s) in scenarios.iter().enumerate() {
        println!("Scenario {i:2} (Tx: {:?}, Rx: {:?})", s.tx, s.rx);
    }

    let mut table = Vec::with_capacity(scenarios.len());
    for (i, scenario) in scenarios.iter().enumerate() {
        let mut row = Vec::with_capacity(sizes.len());
        for &size in &sizes {
            log::info!("scenario {i}: {size} bytes x {}", cli.runs);
            row.push(average(scenario, size, cli.runs)?);
        }
        table.push(row);
    }

    print_table(&sizes, &table);
    Ok(())
}

/// Pair up `--scenario TX RX` values, falling back to the loopback socket pair.
fn scenarios(raw: &[String]) -> Vec<Scenario> {
    if raw.is_empty() {
        return vec![Scenario {
            tx: DEFAULT_TX.to_string(),
            rx: DEFAULT_RX.to_string(),
        }];
    }
    raw.chunks_exact(2)
        .map(|pair| Scenario {
            tx: pair[0].clone(),
            rx: pair[1].clone(),
        })
        .collect()
}

fn transfer_sizes(min: usize, increments: u32) -> Result<Vec<usize>> {
    (0..increments)
        .map(|i| {
            1usize
                .checked_shl(i)
                .and_then(|factor| min.checked_mul(factor))
                .ok_or_else(|| anyhow!("transfer size {min} << {i} overflows"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// Mean time over the successful runs; `None` if every run failed.
fn average(scenario: &Scenario, size: usize, runs: u32) -> Result<Option<Duration>> {
    let mut total = Duration::ZERO;
    let mut ok = 0u32;
    for _ in 0..runs {
        if let Some(elapsed) = transfer(scenario, size)? {
            total += elapsed;
            ok += 1;
        }
    }
    Ok((ok > 0).then(|| total / ok))
}

/// One timed transfer. Setup failures are errors; transfer failures are
/// logged and yield `None`.
///
/// The sender thread is joined on every path. A zero-copy sender revokes
/// its unclaimed buffers when dropped, so it is handed back and dropped
/// only after the receive.
fn transfer(scenario: &Scenario, size: usize) -> Result<Option<Duration>> {
    let mut payload = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut payload);
    let payload = Bytes::from(payload);

    let mut tx = Communicator::init(&scenario.tx)
        .with_context(|| format!("failed to initialise tx communicator {:?}", scenario.tx))?;
    let mut rx = Communicator::init(&scenario.rx)
        .with_context(|| format!("failed to initialise rx communicator {:?}", scenario.rx))?;

    let start = Instant::now();
    let sent = payload.clone();
    let sender = thread::spawn(move || {
        let result = tx.send(&sent).into_result();
        (result, tx)
    });

    let received = match rx.recv_one() {
        Ok(buf) => {
            let elapsed = start.elapsed();
            Ok((intact(&buf, &payload), elapsed))
        }
        Err(e) => Err(e),
    };
    match &received {
        // An autonotify sender is still waiting for this ack.
        Ok(_) => {
            if let Err(e) = rx.notify_send().into_result() {
                log::warn!("ack after {size} bytes failed: {e}");
            }
        }
        Err(e) => {
            log::error!("receive of {size} bytes failed: {e}");
            // Closing the receiver unblocks a sender stuck on its ack.
            drop(rx);
        }
    }

    let sent_ok = match sender.join() {
        Ok((Ok(_), _tx)) => true,
        Ok((Err(e), _tx)) => {
            log::error!("send of {size} bytes failed: {e}");
            false
        }
        Err(_) => {
            log::error!("sender thread panicked");
            false
        }
    };

    Ok(match received {
        Ok((true, elapsed)) if sent_ok => Some(elapsed),
        _ => None,
    })
}

fn intact(received: &[u8], payload: &[u8]) -> bool {
    if received.len() != payload.len() {
        log::error!(
            "received {} bytes, expected {}",
            received.len(),
            payload.len()
        );
        return false;
    }
    if received != payload {
        log::error!("payload of {} bytes arrived corrupted", payload.len());
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Binary units for sizes.
fn size_units(bytes: u64) -> (f64, &'static str) {
    const KIB: u64 = 1024;
    match bytes {
        b if b >= KIB * KIB * KIB => (b as f64 / (KIB * KIB * KIB) as f64, "GB"),
        b if b >= KIB * KIB => (b as f64 / (KIB * KIB) as f64, "MB"),
        b if b >= KIB => (b as f64 / KIB as f64, "KB"),
        b => (b as f64, "B"),
    }
}

/// Decimal units for bit rates.
fn rate_units(bps: f64) -> (f64, &'static str) {
    match bps {
        r if r >= 1e9 => (r / 1e9, "Gbps"),
        r if r >= 1e6 => (r / 1e6, "Mbps"),
        r if r >= 1e3 => (r / 1e3, "Kbps"),
        r => (r, "bps"),
    }
}

fn bits_per_second(bytes: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return f64::INFINITY;
    }
    bytes as f64 * 8.0 / secs
}

fn print_table(sizes: &[usize], table: &[Vec<Option<Duration>>]) {
    println!("### RESULT TABLE ###");
    print!(" S |");
    for &size in sizes {
        let (n, unit) = size_units(size as u64);
        print!("{n:5.1} {unit:<4}|");
    }
    for (s, row) in table.iter().enumerate() {
        print!("\n{s:2}:|");
        for (&size, cell) in sizes.iter().zip(row) {
            match cell {
                Some(elapsed) => {
                    let (n, unit) = rate_units(bits_per_second(size, *elapsed));
                    print!("{n:5.1} {unit:<4}|");
                }
                None => print!("{:>10}|", "failed"),
            }
        }
    }
    println!();
}
