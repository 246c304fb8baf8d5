//! Scene-graph abstraction.
//!
//! This crate intentionally does not depend on a graphics backend.
//! A renderer binding implements [`SceneBackend`]; the viewer only ever talks
//! to the scene through it.

use std::collections::BTreeMap;

use crate::math::{Color, Vec3};

/// Opaque handle to a node owned by the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(pub u64);

/// Geometry a node is built from.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Sphere { radius: f64 },
    Polyline { points: Vec<Vec3> },
}

/// A minimal scene-graph API.
pub trait SceneBackend: Send {
    /// Adds a node at the origin and returns its handle.
    fn add_node(&mut self, primitive: Primitive, color: Color) -> NodeHandle;
    fn set_position(&mut self, node: NodeHandle, position: Vec3);
    /// Removes a node and releases whatever it owns. Unknown handles are ignored.
    fn remove_node(&mut self, node: NodeHandle);
    fn set_view(&mut self, eye: Vec3, target: Vec3);
    fn render(&mut self);
}

/// Node state as seen by [`HeadlessScene`].
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub primitive: Primitive,
    pub color: Color,
    pub position: Vec3,
}

/// In-memory scene that keeps every live node so callers can inspect it.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    next: u64,
    nodes: BTreeMap<NodeHandle, SceneNode>,
    pub renders: u64,
    pub view: Option<(Vec3, Vec3)>,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&SceneNode> {
        self.nodes.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of live nodes built from a polyline.
    pub fn polyline_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| matches!(n.primitive, Primitive::Polyline { .. }))
            .count()
    }
}

impl SceneBackend for HeadlessScene {
    fn add_node(&mut self, primitive: Primitive, color: Color) -> NodeHandle {
        self.next += 1;
        let handle = NodeHandle(self.next);
        self.nodes.insert(
            handle,
            SceneNode {
                primitive,
                color,
                position: Vec3::ZERO,
            },
        );
        handle
    }

    fn set_position(&mut self, node: NodeHandle, position: Vec3) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.position = position;
        }
    }

    fn remove_node(&mut self, node: NodeHandle) {
        self.nodes.remove(&node);
    }

    fn set_view(&mut self, eye: Vec3, target: Vec3) {
        self.view = Some((eye, target));
    }

    fn render(&mut self) {
        self.renders += 1;
    }
}
