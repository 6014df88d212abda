//! The event record passed from the collision engine to the pipeline.

use crate::core::collision::{Collision, CollisionKind};
use crate::core::particle::{GasConfig, Particle, Wall};
use crate::core::Gas;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Immutable capture of the gas right after one resolved collision.
///
/// `t0` is the clock before the event and `time` the clock after it, so a
/// contiguous stream satisfies `next.t0 == prev.time`. Entities are referenced
/// by index into `particles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasData {
    particles: Vec<Particle>,
    t0: f64,
    time: f64,
    box_side: f64,
    config: GasConfig,
    collision: CollisionKind,
}

impl GasData {
    /// Capture `gas` after it resolved `collision`, which started at clock `t0`.
    ///
    /// Errors: `Error::InvalidArgument` if the collision references particles
    /// outside the gas, or a pair names the same particle twice.
    pub fn new(gas: &Gas, collision: &Collision, t0: f64) -> Result<Self> {
        Self::from_parts(
            gas.particles().to_vec(),
            t0,
            gas.time(),
            gas.box_side(),
            gas.config(),
            collision.kind,
        )
    }

    /// Rebuild a record from its fields, e.g. from a recorded stream.
    ///
    /// Applies the same checks as [`GasData::new`], plus `t0 <= time`.
    pub fn from_parts(
        particles: Vec<Particle>,
        t0: f64,
        time: f64,
        box_side: f64,
        config: GasConfig,
        collision: CollisionKind,
    ) -> Result<Self> {
        let n = particles.len();
        match collision {
            CollisionKind::Wall { index, .. } => {
                if index >= n {
                    return Err(Error::InvalidArgument(format!(
                        "wall collision references particle {index} of {n}"
                    )));
                }
            }
            CollisionKind::Pair { i, j } => {
                if i >= n || j >= n {
                    return Err(Error::InvalidArgument(format!(
                        "pair collision ({i}, {j}) out of range for {n} particles"
                    )));
                }
                if i == j {
                    return Err(Error::InvalidArgument(format!(
                        "pair collision references particle {i} twice"
                    )));
                }
            }
        }
        if !t0.is_finite() || !time.is_finite() || t0 > time {
            return Err(Error::InvalidArgument(format!(
                "invalid event window [{t0}, {time}]"
            )));
        }
        Ok(Self {
            particles,
            t0,
            time,
            box_side,
            config,
            collision,
        })
    }

    #[inline]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Clock before the collision.
    #[inline]
    pub fn t0(&self) -> f64 {
        self.t0
    }

    /// Clock after the collision.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn box_side(&self) -> f64 {
        self.box_side
    }

    #[inline]
    pub fn config(&self) -> GasConfig {
        self.config
    }

    #[inline]
    pub fn collision(&self) -> CollisionKind {
        self.collision
    }

    #[inline]
    pub fn is_wall_collision(&self) -> bool {
        matches!(self.collision, CollisionKind::Wall { .. })
    }

    /// First (or only) particle involved.
    pub fn p1_index(&self) -> usize {
        match self.collision {
            CollisionKind::Wall { index, .. } => index,
            CollisionKind::Pair { i, .. } => i,
        }
    }

    /// Second particle of a pair collision.
    pub fn p2_index(&self) -> Result<usize> {
        match self.collision {
            CollisionKind::Pair { j, .. } => Ok(j),
            CollisionKind::Wall { .. } => Err(Error::InvalidArgument(
                "a wall collision has no second particle".into(),
            )),
        }
    }

    /// Wall hit by a wall collision.
    pub fn wall(&self) -> Result<Wall> {
        match self.collision {
            CollisionKind::Wall { wall, .. } => Ok(wall),
            CollisionKind::Pair { .. } => Err(Error::InvalidArgument(
                "a pair collision has no wall".into(),
            )),
        }
    }
}

/// Receiver of batched snapshots from [`Gas::simulate`].
pub trait EventSink: Sync {
    /// Preferred number of snapshots per `add_data` call.
    fn batch_size(&self) -> usize;

    /// Append a time-contiguous batch.
    fn add_data(&self, batch: Vec<GasData>) -> Result<()>;

    /// Signal that no more data will arrive.
    fn mark_done(&self);
}
