//! `starfield_client`
//!
//! Client-side systems:
//! - Transport (WebSocket request/response polling)
//! - Frame queue with a request throttle
//! - Scene reconciliation (entity nodes and trails)
//! - Session state machine tying them together
//! - Camera and input glue

pub mod animator;
pub mod camera;
pub mod client;
pub mod input;
pub mod queue;
pub mod session;
pub mod transport;

pub use client::FrameClient;
pub use session::{Session, SessionEvent, SessionStats};
