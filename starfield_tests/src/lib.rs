//! Helpers shared by the integration tests.

use starfield_shared::config::StarfieldConfig;

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Config tuned for quick socket tests: small batches, fast clocks, short
/// simulation.
pub fn fast_config(batch_size: usize, max_steps: u64) -> StarfieldConfig {
    let mut cfg = StarfieldConfig::default();
    cfg.server.batch_size = batch_size;
    cfg.sim.max_steps = max_steps;
    cfg.client.poll_interval_ms = 2;
    cfg.client.frame_hz = 1000;
    cfg.client.session_timeout_secs = 30;
    cfg
}
