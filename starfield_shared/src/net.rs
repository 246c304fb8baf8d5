//! Frame protocol.
//!
//! The wire is deliberately tiny:
//! - client -> server: the text command [`REQUEST_FRAMES`]
//! - server -> client: a JSON array of [`Frame`] objects
//!
//! Each frame carries ordered entity ids and a flat list of coordinates,
//! three per id, in the same order.

use std::{collections::HashSet, fmt};

use anyhow::Context;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::math::Vec3;

/// Text command asking the server for one more batch of frames.
pub const REQUEST_FRAMES: &str = "frames";

/// Identifies one streamed entity.
///
/// Serialized as a string. Deserialization also accepts unsigned integers,
/// which older backends emit, and normalizes them to their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey(pub String);

impl EntityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        EntityKey(s.to_string())
    }
}

impl From<u16> for EntityKey {
    fn from(id: u16) -> Self {
        EntityKey(id.to_string())
    }
}

impl Serialize for EntityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl de::Visitor<'_> for KeyVisitor {
            type Value = EntityKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or unsigned integer entity id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<EntityKey, E> {
                Ok(EntityKey(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<EntityKey, E> {
                Ok(EntityKey(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<EntityKey, E> {
                Ok(EntityKey(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<EntityKey, E> {
                if v < 0 {
                    return Err(E::invalid_value(de::Unexpected::Signed(v), &self));
                }
                Ok(EntityKey(v.to_string()))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

/// Shape violations that make a frame unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame has {ids} ids but {positions} coordinates (expected {expected})")]
    PositionCountMismatch {
        ids: usize,
        positions: usize,
        expected: usize,
    },
    #[error("frame coordinate {index} is not finite")]
    NonFiniteCoordinate { index: usize },
    #[error("frame lists id {id} more than once")]
    DuplicateId { id: EntityKey },
}

/// One timestep's snapshot of every visible entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Frame {
    pub ids: Vec<EntityKey>,
    pub positions: Vec<f64>,
}

impl Frame {
    /// Builds a frame from `(id, position)` pairs.
    pub fn from_entities<I>(entities: I) -> Self
    where
        I: IntoIterator<Item = (EntityKey, Vec3)>,
    {
        let mut frame = Frame::default();
        for (id, p) in entities {
            frame.ids.push(id);
            frame.positions.extend_from_slice(&[p.x, p.y, p.z]);
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Checks the `positions.len() == 3 * ids.len()` invariant, that every
    /// coordinate is finite and that no id appears twice.
    pub fn validate(&self) -> Result<(), FrameError> {
        let expected = self.ids.len() * 3;
        if self.positions.len() != expected {
            return Err(FrameError::PositionCountMismatch {
                ids: self.ids.len(),
                positions: self.positions.len(),
                expected,
            });
        }
        if let Some(index) = self.positions.iter().position(|c| !c.is_finite()) {
            return Err(FrameError::NonFiniteCoordinate { index });
        }
        let mut seen = HashSet::with_capacity(self.ids.len());
        if let Some(id) = self.ids.iter().find(|id| !seen.insert(*id)) {
            return Err(FrameError::DuplicateId { id: id.clone() });
        }
        Ok(())
    }

    /// Position of the `i`th entity. Only meaningful on a validated frame.
    pub fn position(&self, i: usize) -> Option<Vec3> {
        let c = self.positions.get(i * 3..i * 3 + 3)?;
        Some(Vec3::new(c[0], c[1], c[2]))
    }

    /// Iterates `(id, position)` pairs in frame order.
    pub fn entities(&self) -> impl Iterator<Item = (&EntityKey, Vec3)> + '_ {
        self.ids
            .iter()
            .enumerate()
            .filter_map(|(i, id)| self.position(i).map(|p| (id, p)))
    }
}

/// Encodes a batch of frames as the JSON text sent to clients.
///
/// Non-finite coordinates have no JSON form and come out as `null`, which
/// makes the whole batch undecodable; producers validate frames first.
pub fn encode_batch(frames: &[Frame]) -> anyhow::Result<String> {
    serde_json::to_string(frames).context("serialize frame batch")
}

/// Decodes a batch of frames. Shape is not validated here.
pub fn decode_batch(text: &str) -> anyhow::Result<Vec<Frame>> {
    serde_json::from_str(text).context("decode frame batch")
}
