//! Frame reconciliation.
//!
//! Each applied frame is treated as the full truth about which entities exist:
//! - ids seen for the first time get a new sphere node
//! - every listed id gets its position from the frame
//! - known ids missing from the frame are removed (not paused)
//!
//! Optional trails keep a bounded history per entity and are rebuilt as fresh
//! polyline nodes on every step; the previous step's polylines are released
//! first so they never accumulate.

use std::collections::{BTreeMap, HashSet, VecDeque};

use starfield_shared::{
    config::{ClientConfig, ColorMode},
    math::{Color, Vec3},
    net::{EntityKey, Frame},
    render::{NodeHandle, Primitive, SceneBackend},
};
use tracing::debug;

/// Visual state of one tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityVisual {
    pub node: NodeHandle,
    pub color: Color,
    pub position: Vec3,
}

/// What one [`Animator::apply`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

pub struct Animator {
    entities: BTreeMap<EntityKey, EntityVisual>,
    trails: BTreeMap<EntityKey, VecDeque<Vec3>>,
    /// Polyline nodes built during the last step.
    transient: Vec<NodeHandle>,
    trails_enabled: bool,
    trail_len: usize,
    color_mode: ColorMode,
    palette: Vec<Color>,
    node_radius: f64,
}

impl Animator {
    pub fn new(cfg: &ClientConfig) -> Self {
        let mut palette: Vec<Color> = cfg.palette.iter().copied().map(Color).collect();
        if palette.is_empty() {
            palette.push(Color(0xffffff));
        }
        Self {
            entities: BTreeMap::new(),
            trails: BTreeMap::new(),
            transient: Vec::new(),
            trails_enabled: cfg.trails,
            trail_len: cfg.trail_len.max(1),
            color_mode: cfg.color_mode,
            palette,
            node_radius: cfg.node_radius,
        }
    }

    pub fn entities(&self) -> &BTreeMap<EntityKey, EntityVisual> {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&EntityVisual> {
        self.entities.get(&EntityKey::from(id))
    }

    pub fn trail(&self, id: &str) -> Option<&VecDeque<Vec3>> {
        self.trails.get(&EntityKey::from(id))
    }

    pub fn node_radius(&self) -> f64 {
        self.node_radius
    }

    /// Reconciles the scene against one validated frame. Does not render.
    pub fn apply<S: SceneBackend + ?Sized>(&mut self, frame: &Frame, scene: &mut S) -> ApplyReport {
        let mut report = ApplyReport::default();

        for node in self.transient.drain(..) {
            scene.remove_node(node);
        }

        for (id, position) in frame.entities() {
            if !self.entities.contains_key(id) {
                let color = self.pick_color(id);
                let node = scene.add_node(
                    Primitive::Sphere {
                        radius: self.node_radius,
                    },
                    color,
                );
                debug!(id = %id, node = node.0, "Entity appeared");
                self.entities.insert(
                    id.clone(),
                    EntityVisual {
                        node,
                        color,
                        position,
                    },
                );
                report.created += 1;
            } else {
                report.updated += 1;
            }

            let Some(visual) = self.entities.get_mut(id) else {
                continue;
            };
            visual.position = position;
            scene.set_position(visual.node, position);

            if self.trails_enabled {
                let color = visual.color;
                let history = self.trails.entry(id.clone()).or_default();
                if history.len() >= self.trail_len {
                    history.pop_front();
                }
                history.push_back(position);
                if history.len() >= 2 {
                    let points = history.iter().copied().collect();
                    let line = scene.add_node(Primitive::Polyline { points }, color);
                    self.transient.push(line);
                }
            }
        }

        let present: HashSet<&EntityKey> = frame.ids.iter().collect();
        let gone: Vec<EntityKey> = self
            .entities
            .keys()
            .filter(|id| !present.contains(id))
            .cloned()
            .collect();
        for id in gone {
            if let Some(visual) = self.entities.remove(&id) {
                scene.remove_node(visual.node);
            }
            self.trails.remove(&id);
            debug!(id = %id, "Entity gone");
            report.removed += 1;
        }

        report
    }

    fn pick_color(&self, id: &EntityKey) -> Color {
        let n = self.palette.len();
        let index = match self.color_mode {
            ColorMode::StableHash => (fnv1a(id.as_str().as_bytes()) % n as u64) as usize,
            ColorMode::InsertionOrder => self.entities.len() % n,
        };
        self.palette[index]
    }
}

/// 64-bit FNV-1a; stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
