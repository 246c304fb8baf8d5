//! `starfield_server`
//!
//! Server-side systems:
//! - Fixed-step n-body simulation producing position frames
//! - WebSocket frame streaming, one batch per request command
//!
//! Networking model:
//! - One WebSocket per viewer, one simulation per WebSocket
//! - Bounded channel between simulation and socket (producer blocks when full)

pub mod server;
pub mod sim;

pub use server::FrameServer;
pub use sim::Simulation;
