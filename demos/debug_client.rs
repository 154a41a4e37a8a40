//! Streaming client driven by the debug simulator
//!
//! Run with: cargo run --example debug_client [SERVER_ADDR] [CALIBRATION_JSON] [--joints a,b]
//!
//! Examples:
//!   cargo run --example debug_client                                   # built-in SO-101 calibration
//!   cargo run --example debug_client localhost:50051 robot_unknown.json
//!   cargo run --example debug_client localhost:50051 - --joints gripper,shoulder_pan
//!
//! Joints not listed with `--joints` are held at the middle of their range.

use std::sync::Arc;

use armstream::calibration::{CalibrationFile, CalibrationStore, JsonCalibration};
use armstream::client::config::{DEFAULT_SERVER_ADDR, UNKNOWN_DEVICE};
use armstream::source::DebugSimulator;
use armstream::{ClientConfig, ClientEvent, ClientState, StreamingClient};

/// Calibration of an SO-101 leader arm, used when no file is given
const SO101_CALIBRATION: &str = r#"{
  "shoulder_pan":  { "id": 1, "drive_mode": 0, "homing_offset": -1470, "range_min": 758,  "range_max": 3292 },
  "shoulder_lift": { "id": 2, "drive_mode": 0, "homing_offset": 157,   "range_min": 612,  "range_max": 3401 },
  "elbow_flex":    { "id": 3, "drive_mode": 0, "homing_offset": -1100, "range_min": 1043, "range_max": 3221 },
  "wrist_flex":    { "id": 4, "drive_mode": 0, "homing_offset": 1023,  "range_min": 818,  "range_max": 3206 },
  "wrist_roll":    { "id": 5, "drive_mode": 0, "homing_offset": -390,  "range_min": 0,    "range_max": 4095 },
  "gripper":       { "id": 6, "drive_mode": 0, "homing_offset": 1412,  "range_min": 2029, "range_max": 3265 }
}"#;

fn print_usage() {
    eprintln!("Usage: debug_client [SERVER_ADDR] [CALIBRATION_JSON|-] [--joints a,b,...]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  SERVER_ADDR       Telemetry server (default: {})", DEFAULT_SERVER_ADDR);
    eprintln!("  CALIBRATION_JSON  Calibration artifact ('-' = built-in SO-101)");
    eprintln!("  --joints          Joints to animate (default: all)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let joints_arg = match args.iter().position(|a| a == "--joints") {
        Some(i) if i + 1 < args.len() => {
            let value = args.remove(i + 1);
            args.remove(i);
            Some(value)
        }
        Some(_) => {
            eprintln!("Error: --joints needs a value");
            print_usage();
            std::process::exit(1);
        }
        None => None,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("armstream=info".parse()?)
                .add_directive("debug_client=info".parse()?),
        )
        .init();

    let server_addr = args
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());

    let store = match args.get(1).map(String::as_str) {
        Some(path) if path != "-" => CalibrationStore::load(&CalibrationFile::new(path))?,
        _ => CalibrationStore::load(&JsonCalibration::new(SO101_CALIBRATION))?,
    };
    let store = Arc::new(store);

    let animated: Vec<String> = match joints_arg {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => store.joint_names().map(str::to_string).collect(),
    };
    let source = DebugSimulator::new(&store, &animated)?;

    println!("Streaming to {} (animating: {})", server_addr, animated.join(", "));

    let config = ClientConfig::new(server_addr).device(UNKNOWN_DEVICE, "so101_leader");
    let (client, mut events) = StreamingClient::new(config, store, source);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::StateChanged(ClientState::Streaming) => println!("Connected"),
                ClientEvent::StateChanged(ClientState::Reconnecting) => {
                    println!("Connection lost, reconnecting...")
                }
                ClientEvent::ReconnectScheduled { delay, attempt } => {
                    println!("  retry #{} in {:?}", attempt, delay)
                }
                _ => {}
            }
        }
    });

    let report = client
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    println!(
        "Sent {} frames over {} connection(s), {} ticks skipped",
        report.frames_sent, report.connections, report.ticks_skipped
    );

    Ok(())
}
