//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p starfield_server -- [--config starfield.json] [--addr 127.0.0.1:8822]
//!                                    [--batch 60] [--steps 1500000] [--dt 1.0]
//!
//! The server accepts WebSocket viewers and streams simulated body positions
//! to each of them, one batch per request.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use starfield_server::server::FrameServer;
use starfield_shared::config::StarfieldConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<StarfieldConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => StarfieldConfig::load(&PathBuf::from(&args[i + 1]))?,
        _ => StarfieldConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--batch" if i + 1 < args.len() => {
                cfg.server.batch_size = args[i + 1].parse().context("parse --batch")?;
                i += 2;
            }
            "--steps" if i + 1 < args.len() => {
                cfg.sim.max_steps = args[i + 1].parse().context("parse --steps")?;
                i += 2;
            }
            "--dt" if i + 1 < args.len() => {
                cfg.sim.dt = args[i + 1].parse().context("parse --dt")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        batch = cfg.server.batch_size,
        steps = cfg.sim.max_steps,
        dt = cfg.sim.dt,
        "Starting server"
    );

    let server = FrameServer::bind(cfg).await.context("bind server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    server.serve().await
}
