//! Event-driven hard-sphere engine: vector algebra, particles and walls,
//! closed-form collision times and the `Gas` that resolves them one by one.

pub mod collision;
pub mod gas;
pub mod particle;
pub mod vector;

pub use collision::{Collision, CollisionKind};
pub use gas::Gas;
pub use particle::{GasConfig, Particle, Wall};
pub use vector::{is_negligible, Vec3};
