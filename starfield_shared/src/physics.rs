//! Gravity integration.
//!
//! Bodies interact pairwise through Newtonian gravity. The integrator is a
//! kick-drift-kick leapfrog, which keeps orbits stable over long runs at a
//! fixed step.

use crate::{config::SimConfig, math::Vec3};

/// A point mass.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: u16,
    pub mass: f64,
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

impl Body {
    pub fn new(mass: f64, position: Vec3, velocity: Vec3) -> Self {
        Self {
            id: 0,
            mass,
            position,
            velocity,
            acceleration: Vec3::ZERO,
        }
    }
}

/// Gravity parameters.
#[derive(Debug, Clone, Copy)]
pub struct GravityConfig {
    pub g: f64,
    pub softening: f64,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self::from(&SimConfig::default())
    }
}

impl From<&SimConfig> for GravityConfig {
    fn from(cfg: &SimConfig) -> Self {
        Self {
            g: cfg.g,
            softening: cfg.softening,
        }
    }
}

/// Integrator trait.
pub trait Integrator: Send + Sync {
    fn step(&mut self, bodies: &mut [Body], dt: f64);
}

/// Kick-drift-kick leapfrog.
#[derive(Debug, Clone, Default)]
pub struct Leapfrog {
    pub gravity: GravityConfig,
    primed: bool,
}

impl Leapfrog {
    pub fn new(gravity: GravityConfig) -> Self {
        Self {
            gravity,
            primed: false,
        }
    }
}

impl Integrator for Leapfrog {
    fn step(&mut self, bodies: &mut [Body], dt: f64) {
        if !self.primed {
            accelerate(bodies, self.gravity);
            self.primed = true;
        }
        for b in bodies.iter_mut() {
            b.velocity += b.acceleration * (dt * 0.5);
            b.position += b.velocity * dt;
        }
        accelerate(bodies, self.gravity);
        for b in bodies.iter_mut() {
            b.velocity += b.acceleration * (dt * 0.5);
        }
    }
}

/// Recomputes every body's acceleration from the current positions.
pub fn accelerate(bodies: &mut [Body], gravity: GravityConfig) {
    let eps_sq = gravity.softening * gravity.softening;
    for i in 0..bodies.len() {
        let mut acc = Vec3::ZERO;
        let pi = bodies[i].position;
        for (j, other) in bodies.iter().enumerate() {
            if i == j {
                continue;
            }
            let d = other.position - pi;
            let r_sq = d.len_sq() + eps_sq;
            let inv_r3 = r_sq.powf(-1.5);
            acc += d * (gravity.g * other.mass * inv_r3);
        }
        bodies[i].acceleration = acc;
    }
}

/// Total linear momentum.
pub fn momentum(bodies: &[Body]) -> Vec3 {
    bodies
        .iter()
        .fold(Vec3::ZERO, |acc, b| acc + b.velocity * b.mass)
}
