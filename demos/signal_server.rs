//! Standalone signaling server example
//!
//! Run with: cargo run --example signal_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example signal_server                    # binds to 0.0.0.0:4000
//!   cargo run --example signal_server localhost          # binds to 127.0.0.1:4000
//!   cargo run --example signal_server 127.0.0.1:4001     # binds to 127.0.0.1:4001
//!
//! The server runs against the stub media engine, so every transport,
//! producer and consumer follows the real lifecycle without any media
//! flowing. Connect with the crate's client:
//!
//!   ws://localhost:4000/?name=alice
//!
//! or run the scripted tour: cargo run --example room_walkthrough

use std::net::SocketAddr;
use std::sync::Arc;

use sfu_signal::{ServerConfig, SignalServer, StubEngine};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:4000
/// - "localhost:4001" -> 127.0.0.1:4001
/// - "127.0.0.1" -> 127.0.0.1:4000
/// - "0.0.0.0:4001" -> 0.0.0.0:4001
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 4000;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: signal_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:4000)");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  signal_server                     # binds to 0.0.0.0:4000");
    eprintln!("  signal_server localhost           # binds to 127.0.0.1:4000");
    eprintln!("  signal_server 127.0.0.1:4001      # binds to 127.0.0.1:4001");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:4000".parse().unwrap(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sfu_signal=debug".parse()?)
                .add_directive("signal_server=debug".parse()?),
        )
        .init();

    let config = ServerConfig {
        bind_addr,
        ..ServerConfig::default()
    };

    println!("Starting signaling server on {}", config.bind_addr);
    println!();
    println!("=== Connect a participant ===");
    println!("URL: ws://{}/?name=alice", config.bind_addr);
    println!("Optional query parameters: id (reconnect), name (display name)");
    println!();
    println!("=== Scripted tour ===");
    println!("cargo run --example room_walkthrough");
    println!();

    let server = Arc::new(SignalServer::new(config, StubEngine::new()));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}
