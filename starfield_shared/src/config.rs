//! Configuration system.
//!
//! Loads configuration from JSON strings/files. Every field has a default so a
//! partial document (or none at all) is valid.

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StarfieldConfig {
    /// Server listen address, e.g. `127.0.0.1:8822`.
    pub server_addr: String,
    /// WebSocket path the client connects to.
    pub ws_path: String,
    pub client: ClientConfig,
    pub server: ServerConfig,
    pub sim: SimConfig,
}

/// How entity colors are picked from the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    /// Hash of the entity id; stable across churn.
    #[default]
    StableHash,
    /// Entity count at insertion time; colors can shift when entities churn.
    InsertionOrder,
}

/// Viewer-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Period between request polls.
    pub poll_interval_ms: u64,
    /// Animation rate.
    pub frame_hz: u32,
    /// No request is sent while more than this many frames are queued.
    pub queue_throttle: usize,
    /// The connection is closed this long after it opens.
    pub session_timeout_secs: u64,
    pub trails: bool,
    /// Maximum points kept per trail.
    pub trail_len: usize,
    pub color_mode: ColorMode,
    pub palette: Vec<u32>,
    /// Sphere radius used for both rendering and picking.
    pub node_radius: f64,
    /// Per-tick camera translation while a movement key is held.
    pub camera_step: f64,
    pub fov_deg: f64,
    pub aspect: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            frame_hz: 60,
            queue_throttle: 10,
            session_timeout_secs: 60,
            trails: false,
            trail_len: 120,
            color_mode: ColorMode::StableHash,
            palette: vec![
                0x99ee22, 0xee2299, 0x2299ee, 0xeeaa22, 0x22eeaa, 0xaa22ee, 0xeeeeee, 0xee4422,
            ],
            node_radius: 0.5,
            camera_step: 0.5,
            fov_deg: 75.0,
            aspect: 16.0 / 9.0,
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_hz.max(1)))
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

/// Frame server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Frames sent per request.
    pub batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { batch_size: 60 }
    }
}

/// Gravity simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Gravitational constant.
    pub g: f64,
    /// Integration step.
    pub dt: f64,
    /// Steps simulated before the stream ends.
    pub max_steps: u64,
    /// Softening length; keeps coincident bodies finite.
    pub softening: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            g: 6.67e-11,
            dt: 1.0,
            max_steps: 1_500_000,
            softening: 1e-3,
        }
    }
}

impl Default for StarfieldConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8822".to_string(),
            ws_path: "/sim".to_string(),
            client: ClientConfig::default(),
            server: ServerConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl StarfieldConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Full WebSocket URL for the client.
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.server_addr, self.ws_path)
    }
}
