//! N-body frame producer.
//!
//! A [`Simulation`] owns its bodies and an integrator and turns every step
//! into one [`Frame`]. Ids are assigned in insertion order starting at 1.

use anyhow::Context;
use starfield_shared::{
    config::SimConfig,
    math::Vec3,
    net::{EntityKey, Frame},
    physics::{Body, GravityConfig, Integrator, Leapfrog},
};

pub struct Simulation {
    bodies: Vec<Body>,
    integrator: Box<dyn Integrator>,
    dt: f64,
    max_steps: u64,
    steps: u64,
}

impl Simulation {
    /// Empty simulation using the leapfrog integrator.
    pub fn new(cfg: &SimConfig) -> Self {
        Self::with_integrator(cfg, Box::new(Leapfrog::new(GravityConfig::from(cfg))))
    }

    pub fn with_integrator(cfg: &SimConfig, integrator: Box<dyn Integrator>) -> Self {
        Self {
            bodies: Vec::new(),
            integrator,
            dt: cfg.dt,
            max_steps: cfg.max_steps,
            steps: 0,
        }
    }

    /// The stock scene: a heavy central mass and four orbiters.
    pub fn with_default_bodies(cfg: &SimConfig) -> anyhow::Result<Self> {
        let mut sim = Self::new(cfg);
        sim.add_body(Body::new(500_000_000.0, Vec3::ZERO, Vec3::ZERO))?;
        sim.add_body(Body::new(
            2.0,
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(0.0, -0.03, 0.0),
        ))?;
        sim.add_body(Body::new(
            10_000.0,
            Vec3::new(-12.0, 0.0, 0.0),
            Vec3::new(0.0, 0.015, 0.0),
        ))?;
        sim.add_body(Body::new(
            1_000_000.0,
            Vec3::new(10.0, 0.0, -3.0),
            Vec3::new(0.0, -0.01, -0.01),
        ))?;
        sim.add_body(Body::new(
            10_000_000.0,
            Vec3::new(20.0, 20.0, -12.0),
            Vec3::new(0.0, 0.0, 0.01),
        ))?;
        Ok(sim)
    }

    /// Adds a body and assigns it the next id. Fails once ids no longer fit
    /// in a `u16`.
    pub fn add_body(&mut self, mut body: Body) -> anyhow::Result<u16> {
        let id = u16::try_from(self.bodies.len() + 1)
            .ok()
            .context("body id space exhausted")?;
        body.id = id;
        self.bodies.push(body);
        Ok(id)
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.steps >= self.max_steps
    }

    /// Advances one step and returns the resulting frame, or `None` once the
    /// step budget is spent.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.is_finished() {
            return None;
        }
        self.integrator.step(&mut self.bodies, self.dt);
        self.steps += 1;
        Some(self.frame())
    }

    /// Snapshot of the current body positions.
    pub fn frame(&self) -> Frame {
        Frame::from_entities(
            self.bodies
                .iter()
                .map(|b| (EntityKey::from(b.id), b.position)),
        )
    }
}

impl Iterator for Simulation {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.next_frame()
    }
}
