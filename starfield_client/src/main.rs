//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p starfield_client -- [--config starfield.json] [--addr 127.0.0.1:8822]
//!                                    [--timeout 60] [--trails]
//!
//! The client connects to the frame server, replays streamed frames into a
//! headless scene, and prints session statistics once the connection has
//! closed and the queue has drained.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use starfield_client::FrameClient;
use starfield_shared::{config::StarfieldConfig, render::HeadlessScene};
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
            "--timeout" if i + 1 < args.len() => {
                cfg.client.session_timeout_secs =
                    args[i + 1].parse().context("parse --timeout")?;
                i += 2;
            }
            "--trails" => {
                cfg.client.trails = true;
                i += 1;
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
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        url = %cfg.ws_url(),
        timeout_secs = cfg.client.session_timeout_secs,
        trails = cfg.client.trails,
        "Starting client"
    );

    let mut client = FrameClient::connect(&cfg).await.context("connect")?;
    let mut scene = HeadlessScene::new();
    let stats = client.run(&mut scene).await?;

    info!(
        renders = scene.renders,
        nodes = scene.len(),
        entities = client.session().animator().entities().len(),
        "Viewer stopped"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
