//! Perspective camera and click-to-look picking.

use starfield_shared::math::Vec3;

/// Perspective camera described by an eye point and a look target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_deg: f64,
    pub aspect: f64,
}

impl Camera {
    pub fn new(fov_deg: f64, aspect: f64) -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 20.0),
            target: Vec3::ZERO,
            fov_deg,
            aspect,
        }
    }

    /// Unit view direction. Falls back to -Z when eye and target coincide.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalized().unwrap_or(-Vec3::Z)
    }

    /// Unit right vector, with world +Y as the up reference.
    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalized().unwrap_or(Vec3::X)
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.forward())
    }

    /// Moves eye and target together.
    pub fn translate(&mut self, delta: Vec3) {
        self.eye += delta;
        self.target += delta;
    }

    pub fn look_at(&mut self, point: Vec3) {
        self.target = point;
    }

    /// Ray through a point in normalized device coordinates (`[-1, 1]` on
    /// both axes, +Y up). Returns `(origin, unit direction)`.
    pub fn ray(&self, ndc_x: f64, ndc_y: f64) -> (Vec3, Vec3) {
        let half = (self.fov_deg.to_radians() * 0.5).tan();
        let dir = self.forward()
            + self.right() * (ndc_x * half * self.aspect)
            + self.up() * (ndc_y * half);
        (self.eye, dir.normalized().unwrap_or_else(|| self.forward()))
    }
}

/// Nearest intersection of a ray with a set of spheres, as a world point.
pub fn pick<I>(origin: Vec3, dir: Vec3, radius: f64, centers: I) -> Option<Vec3>
where
    I: IntoIterator<Item = Vec3>,
{
    centers
        .into_iter()
        .filter_map(|c| ray_sphere(origin, dir, c, radius))
        .min_by(|a, b| a.total_cmp(b))
        .map(|t| origin + dir * t)
}

/// Distance along a unit ray to the first hit on a sphere, if any.
fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f64) -> Option<f64> {
    let oc = origin - center;
    let b = oc.dot(dir);
    let c = oc.len_sq() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let near = -b - sq;
    if near >= 0.0 {
        return Some(near);
    }
    // Origin inside the sphere.
    let far = -b + sq;
    (far >= 0.0).then_some(far)
}
