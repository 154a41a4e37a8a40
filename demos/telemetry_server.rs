//! Telemetry server with dashboard endpoints
//!
//! Run with: cargo run --example telemetry_server [BIND_ADDR] [DASHBOARD_ADDR]
//!
//! Examples:
//!   cargo run --example telemetry_server                         # 0.0.0.0:50051, dashboard 0.0.0.0:8080
//!   cargo run --example telemetry_server localhost               # 127.0.0.1:50051
//!   cargo run --example telemetry_server 0.0.0.0:6000 0.0.0.0:9000
//!
//! ## Watching the stream
//!
//!   curl -N http://localhost:8080/stream     # Server-Sent Events
//!   curl http://localhost:8080/data          # latest frame per session

use std::net::SocketAddr;
use std::time::Duration;

use armstream::server::{DEFAULT_DASHBOARD_PORT, DEFAULT_INGEST_PORT};
use armstream::{ServerConfig, TelemetryServer};

/// Parse an address argument.
///
/// Accepts "localhost", "localhost:PORT", "IP" and "IP:PORT"; a missing
/// port falls back to `default_port`.
fn parse_addr(arg: &str, default_port: u16) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    Err(format!(
        "Invalid address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: telemetry_server [BIND_ADDR] [DASHBOARD_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR       Telemetry ingest address (default: 0.0.0.0:50051)");
    eprintln!("  DASHBOARD_ADDR  Dashboard HTTP address (default: 0.0.0.0:8080)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::default();

    if let Some(arg) = args.get(1) {
        match parse_addr(arg, DEFAULT_INGEST_PORT) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }
    if let Some(arg) = args.get(2) {
        match parse_addr(arg, DEFAULT_DASHBOARD_PORT) {
            Ok(addr) => config = config.dashboard(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("armstream=info".parse()?)
                .add_directive("telemetry_server=info".parse()?),
        )
        .init();

    println!("Telemetry ingest on {}", config.bind_addr);
    if let Some(addr) = config.dashboard_addr {
        println!("Dashboard stream:   http://{}/stream", addr);
        println!("Dashboard snapshot: http://{}/data", addr);
    }
    println!();

    let server = TelemetryServer::new(config);

    let report = async {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = server.stats().await;
            tracing::info!(
                sessions = stats.active_sessions,
                connections = stats.active_connections,
                subscribers = stats.active_subscribers,
                applied = stats.frames_applied,
                dropped = stats.frames_dropped,
                rate = %format!("{:.1}", stats.frame_rate()),
                "Server stats"
            );
        }
    };

    tokio::select! {
        result = server.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        }) => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = report => {}
    }

    Ok(())
}
