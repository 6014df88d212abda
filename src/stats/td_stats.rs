use crate::core::gas::temperature_of;
use crate::core::particle::Wall;
use crate::core::vector::{is_negligible, Vec3};
use crate::core::CollisionKind;
use crate::data::GasData;
use crate::error::{Error, Result};
use crate::stats::histogram::{Histogram, SpeedHistogram};

/// Thermodynamic statistics over a contiguous window of snapshots.
///
/// The temperature is sampled once from the first snapshot and treated as a
/// constant of motion; chaining checks that it has not drifted. Momentum
/// transfer per wall and free paths restart with every window, the last
/// collision position of each particle is carried across chained windows.
#[derive(Debug, Clone)]
pub struct TdStats<H: Histogram = SpeedHistogram> {
    mass: f64,
    box_side: f64,
    t0: f64,
    time: f64,
    temperature: f64,
    wall_pulses: [f64; 6],
    free_paths: Vec<f64>,
    last_collision: Vec<Option<Vec3>>,
    histogram: H,
    collisions: usize,
}

impl<H: Histogram> TdStats<H> {
    /// Start a chain from its first snapshot.
    ///
    /// Errors: `Error::Construction` for a snapshot without particles.
    pub fn new(first: &GasData, histogram: H) -> Result<Self> {
        if first.is_empty() {
            return Err(Error::Construction(
                "statistics need at least one particle".into(),
            ));
        }
        let mass = first.config().mass();
        let mut stats = Self {
            mass,
            box_side: first.box_side(),
            t0: first.t0(),
            time: first.t0(),
            temperature: temperature_of(first.particles(), mass),
            wall_pulses: [0.0; 6],
            free_paths: Vec::new(),
            last_collision: vec![None; first.len()],
            histogram,
            collisions: 0,
        };
        stats.add_data(first)?;
        Ok(stats)
    }

    /// Open a new window after `prev`, keeping its per-particle history.
    ///
    /// The histogram continues from `prev` unless a fresh one is supplied.
    ///
    /// Errors: `Error::DataIntegrity` if the particle count or box differ, the
    /// snapshot is older than `prev`, or its temperature differs from `prev`'s
    /// by more than the negligible relative tolerance.
    pub fn chained(prev: &Self, data: &GasData, histogram: Option<H>) -> Result<Self> {
        if data.len() != prev.n_particles() {
            return Err(Error::DataIntegrity(format!(
                "snapshot has {} particles, previous statistics {}",
                data.len(),
                prev.n_particles()
            )));
        }
        if !is_negligible(data.box_side(), prev.box_side) {
            return Err(Error::DataIntegrity(format!(
                "box side changed from {} to {}",
                prev.box_side,
                data.box_side()
            )));
        }
        if data.time() < prev.time {
            return Err(Error::DataIntegrity(format!(
                "snapshot time {} is before previous statistics time {}",
                data.time(),
                prev.time
            )));
        }
        let temperature = temperature_of(data.particles(), prev.mass);
        if !is_negligible(temperature, prev.temperature) {
            return Err(Error::DataIntegrity(format!(
                "temperature drifted from {} to {}",
                prev.temperature, temperature
            )));
        }

        let histogram = match histogram {
            Some(mut fresh) => {
                fresh.reset();
                fresh
            }
            None => prev.histogram.clone(),
        };
        let mut stats = Self {
            mass: prev.mass,
            box_side: prev.box_side,
            t0: data.t0(),
            time: data.t0(),
            temperature: prev.temperature,
            wall_pulses: [0.0; 6],
            free_paths: Vec::new(),
            last_collision: prev.last_collision.clone(),
            histogram,
            collisions: 0,
        };
        stats.add_data(data)?;
        Ok(stats)
    }

    /// Fold one more snapshot into the window.
    pub fn add_data(&mut self, data: &GasData) -> Result<()> {
        if data.len() != self.last_collision.len() {
            return Err(Error::DataIntegrity(format!(
                "snapshot has {} particles, statistics track {}",
                data.len(),
                self.last_collision.len()
            )));
        }
        if data.time() < self.time {
            return Err(Error::DataIntegrity(format!(
                "snapshot time {} goes back from {}",
                data.time(),
                self.time
            )));
        }

        let particles = data.particles();
        match data.collision() {
            CollisionKind::Wall { index, wall } => {
                let normal = particles[index].speed.axis(wall.axis());
                self.wall_pulses[wall.index()] += 2.0 * self.mass * normal.abs();
                self.record_position(index, particles[index].position);
            }
            CollisionKind::Pair { i, j } => {
                self.record_position(i, particles[i].position);
                self.record_position(j, particles[j].position);
            }
        }
        for p in particles {
            self.histogram.fill(p.speed.norm());
        }
        self.time = data.time();
        self.collisions += 1;
        Ok(())
    }

    fn record_position(&mut self, index: usize, position: Vec3) {
        if let Some(last) = self.last_collision[index].replace(position) {
            self.free_paths.push((position - last).norm());
        }
    }

    /// Window start.
    #[inline]
    pub fn t0(&self) -> f64 {
        self.t0
    }

    /// Window end (clock after the last folded snapshot).
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        self.time - self.t0
    }

    #[inline]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    #[inline]
    pub fn box_side(&self) -> f64 {
        self.box_side
    }

    #[inline]
    pub fn volume(&self) -> f64 {
        self.box_side.powi(3)
    }

    #[inline]
    pub fn n_particles(&self) -> usize {
        self.last_collision.len()
    }

    /// Number of snapshots folded into this window.
    #[inline]
    pub fn collision_count(&self) -> usize {
        self.collisions
    }

    /// Momentum transferred to each wall, indexed by [`Wall::index`].
    #[inline]
    pub fn wall_pulses(&self) -> &[f64; 6] {
        &self.wall_pulses
    }

    #[inline]
    pub fn free_paths(&self) -> &[f64] {
        &self.free_paths
    }

    #[inline]
    pub fn histogram(&self) -> &H {
        &self.histogram
    }

    /// Pressure on one wall over the window; zero for a window without duration.
    pub fn pressure_on(&self, wall: Wall) -> f64 {
        let dt = self.duration();
        if dt <= 0.0 {
            return 0.0;
        }
        self.wall_pulses[wall.index()] / (self.box_side * self.box_side * dt)
    }

    /// Pressure averaged over the six walls.
    pub fn pressure(&self) -> f64 {
        let dt = self.duration();
        if dt <= 0.0 {
            return 0.0;
        }
        let total: f64 = self.wall_pulses.iter().sum();
        total / (6.0 * self.box_side * self.box_side * dt)
    }

    /// `N T / V` with k_B = 1, the ideal-gas reference for [`TdStats::pressure`].
    pub fn ideal_gas_pressure(&self) -> f64 {
        self.n_particles() as f64 * self.temperature / self.volume()
    }

    /// Mean distance travelled between successive collisions, if any was recorded.
    pub fn mean_free_path(&self) -> Option<f64> {
        if self.free_paths.is_empty() {
            return None;
        }
        Some(self.free_paths.iter().sum::<f64>() / self.free_paths.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::particle::{GasConfig, Particle};
    use crate::core::Gas;

    fn bouncing_gas() -> Result<Gas> {
        Gas::new(
            vec![Particle::new(
                Vec3::new(5.0, 5.0, 5.0),
                Vec3::new(2.0, 0.0, 0.0),
            )?],
            10.0,
            GasConfig::new(0.5, 1.5)?,
        )
    }

    fn histogram() -> Result<SpeedHistogram> {
        SpeedHistogram::new(8, 4.0)
    }

    #[test]
    fn wall_pulse_and_free_path() -> Result<()> {
        let mut gas = bouncing_gas()?;
        let first = gas.step()?; // hits Right at t = 2.25
        let mut stats = TdStats::new(&first, histogram()?)?;
        assert_eq!(first.wall()?, Wall::Right);
        assert!((stats.wall_pulses()[Wall::Right.index()] - 6.0).abs() < 1e-12);
        assert!(stats.mean_free_path().is_none());

        let second = gas.step()?; // travels 9.0 to Left
        stats.add_data(&second)?;
        assert!((stats.wall_pulses()[Wall::Left.index()] - 6.0).abs() < 1e-12);
        assert_eq!(stats.free_paths().len(), 1);
        assert!((stats.mean_free_path().unwrap_or(-1.0) - 9.0).abs() < 1e-12);
        assert_eq!(stats.collision_count(), 2);
        assert_eq!(stats.histogram().total(), 2);

        // duration 6.75, side^2 = 100
        let expected = 6.0 / (100.0 * stats.duration());
        assert!((stats.pressure_on(Wall::Left) - expected).abs() < 1e-12);
        assert!((stats.pressure() - 12.0 / (600.0 * stats.duration())).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn temperature_from_first_snapshot() -> Result<()> {
        let mut gas = bouncing_gas()?;
        let stats = TdStats::new(&gas.step()?, histogram()?)?;
        // KE = 0.5 * 1.5 * 4 = 3, T = 2/3 * 3
        assert!((stats.temperature() - 2.0).abs() < 1e-12);
        assert!((stats.volume() - 1000.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn chained_keeps_history_and_resets_window() -> Result<()> {
        let mut gas = bouncing_gas()?;
        let prev = TdStats::new(&gas.step()?, histogram()?)?;
        let next = gas.step()?;
        let stats = TdStats::chained(&prev, &next, None)?;
        assert_eq!(stats.free_paths().len(), 1);
        assert_eq!(stats.wall_pulses()[Wall::Right.index()], 0.0);
        assert_eq!(stats.histogram().total(), 2);
        assert_eq!(stats.t0(), prev.time());

        let fresh = TdStats::chained(&prev, &next, Some(histogram()?))?;
        assert_eq!(fresh.histogram().total(), 1);
        Ok(())
    }

    #[test]
    fn add_data_rejects_time_going_back() -> Result<()> {
        let mut gas = bouncing_gas()?;
        let first = gas.step()?;
        let second = gas.step()?;
        let mut stats = TdStats::new(&second, histogram()?)?;
        let err = stats.add_data(&first).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
        Ok(())
    }
}
