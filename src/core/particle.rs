use crate::core::vector::Vec3;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Fixed spatial dimension (3D).
pub const DIM: usize = 3;

/// Radius and mass shared by every particle of a run.
///
/// Passed by value into `Gas` and copied into each `GasData`; it cannot change
/// once a gas has been built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasConfig {
    radius: f64,
    mass: f64,
}

impl GasConfig {
    /// Errors: `Error::Construction` if `radius` is negative or `mass` is non-positive.
    pub fn new(radius: f64, mass: f64) -> Result<Self> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(Error::Construction(
                "radius must be finite and >= 0".into(),
            ));
        }
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::Construction("mass must be finite and > 0".into()));
        }
        Ok(Self { radius, mass })
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Contact distance between two centers.
    #[inline]
    pub fn diameter(&self) -> f64 {
        2.0 * self.radius
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            radius: 0.01,
            mass: 1.0,
        }
    }
}

/// A hard-sphere particle. Radius and mass live in [`GasConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Particle {
    /// Center position.
    pub position: Vec3,
    /// Velocity.
    pub speed: Vec3,
}

impl Particle {
    /// Create a new particle after checking that every component is finite.
    pub fn new(position: Vec3, speed: Vec3) -> Result<Self> {
        if !position.to_array().iter().all(|x| x.is_finite()) {
            return Err(Error::Construction("position must be finite".into()));
        }
        if !speed.to_array().iter().all(|x| x.is_finite()) {
            return Err(Error::Construction("speed must be finite".into()));
        }
        Ok(Self { position, speed })
    }

    /// Kinetic energy 1/2 m |v|^2 for the given mass.
    #[inline]
    pub fn kinetic_energy(&self, mass: f64) -> f64 {
        0.5 * mass * self.speed.norm_squared()
    }

    /// Linear ballistic motion over `dt`.
    #[inline]
    pub fn advance(&mut self, dt: f64) {
        self.position += self.speed * dt;
    }

    #[inline]
    pub fn is_stationary(&self) -> bool {
        self.speed.norm_squared() == 0.0
    }
}

/// One of the six faces of the cube `[0, side]^3`.
///
/// Left/Right are x = 0 / x = side, Bottom/Top are y = 0 / y = side and
/// Back/Front are z = 0 / z = side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Wall {
    Left,
    Right,
    Bottom,
    Top,
    Back,
    Front,
}

impl Wall {
    pub const ALL: [Wall; 6] = [
        Wall::Left,
        Wall::Right,
        Wall::Bottom,
        Wall::Top,
        Wall::Back,
        Wall::Front,
    ];

    /// Wall on `axis`, at the far face when `is_max`.
    #[inline]
    pub fn from_axis(axis: usize, is_max: bool) -> Self {
        match (axis, is_max) {
            (0, false) => Wall::Left,
            (0, true) => Wall::Right,
            (1, false) => Wall::Bottom,
            (1, true) => Wall::Top,
            (_, false) => Wall::Back,
            (_, true) => Wall::Front,
        }
    }

    /// Axis normal to this wall.
    #[inline]
    pub fn axis(self) -> usize {
        self.index() / 2
    }

    /// True for the face at `side` (as opposed to the one at 0).
    #[inline]
    pub fn is_max(self) -> bool {
        self.index() % 2 == 1
    }

    /// Stable index in `0..6`, used for the wall-pulse accumulators.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Self> {
        Wall::ALL
            .get(index)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("wall index {index} out of range")))
    }
}
