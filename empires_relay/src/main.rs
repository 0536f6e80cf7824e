// CLI entry point for the lockstep input relay.
//
// Starts a standalone relay that game clients connect to. The relay fans
// command snapshots out to every client; it never runs the sim. See
// `server.rs` for the loop and `relay.rs` for the slot table.
//
// Usage:
//   relay [OPTIONS]
//     --config <FILE>            JSON RelayConfig; flags override it
//     --host <HOST>              Listen address (default: 127.0.0.1)
//     --port <PORT>              Listen port (default: 1111)
//     --interval <N>             Flush every N cycles (default: 1)
//     --tick-ms <MS>             Cycle length (default: 10)
//     --service-timeout-ms <MS>  Socket wait per cycle (default: 5)
//     --send-timeout-ms <MS>     Drop a client whose packet write stalls this long (default: 50)
//
// Logging goes through `tracing`; set `RUST_LOG` to change the filter
// (default `info`).

use empires_relay::server::{RelayConfig, start_relay};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = parse_args();
    info!(?config, "starting relay");

    let (handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            error!("failed to start relay: {e}");
            std::process::exit(1);
        }
    };
    println!("Relay listening on {addr}");

    // The loop only ends when the process is killed.
    let stats = handle.join();
    info!(?stats, "relay exited");
}

/// Parse command-line arguments into a `RelayConfig`. Uses simple
/// `std::env::args()` matching. `--config` is applied first wherever it
/// appears, so flags always win over the file.
fn parse_args() -> RelayConfig {
    let args: Vec<String> = std::env::args().collect();

    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).unwrap_or_else(|| fail("--config requires a file"));
            let json = std::fs::read_to_string(path)
                .unwrap_or_else(|e| fail(&format!("cannot read {path}: {e}")));
            RelayConfig::from_json(&json).unwrap_or_else(|e| fail(&e.to_string()))
        }
        None => RelayConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => i += 1,
            "--host" => {
                i += 1;
                config.host = args
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| fail("--host requires a value"));
            }
            "--port" => {
                i += 1;
                config.port = number(&args, i, "--port");
            }
            "--interval" => {
                i += 1;
                config.interval = number(&args, i, "--interval");
            }
            "--tick-ms" => {
                i += 1;
                config.tick_ms = number(&args, i, "--tick-ms");
            }
            "--service-timeout-ms" => {
                i += 1;
                config.service_timeout_ms = number(&args, i, "--service-timeout-ms");
            }
            "--send-timeout-ms" => {
                i += 1;
                config.send_timeout_ms = number(&args, i, "--send-timeout-ms");
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn number<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    args.get(i)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| fail(&format!("{flag} requires a valid number")))
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <FILE>            JSON config; flags override it");
    println!("  --host <HOST>              Listen address (default: 127.0.0.1)");
    println!("  --port <PORT>              Listen port (default: 1111)");
    println!("  --interval <N>             Flush every N cycles (default: 1)");
    println!("  --tick-ms <MS>             Cycle length (default: 10)");
    println!("  --service-timeout-ms <MS>  Socket wait per cycle (default: 5)");
    println!("  --send-timeout-ms <MS>     Drop a client whose packet write stalls this long (default: 50)");
    println!("  --help, -h                 Show this help");
}
