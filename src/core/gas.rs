use crate::core::collision::{
    best_pair_in_range, earliest, pair_count, partition, wall_collision, Collision, CollisionKind,
};
use crate::core::particle::{GasConfig, Particle, Wall};
use crate::core::vector::Vec3;
use crate::data::{EventSink, GasData};
use crate::error::{Error, Result};
use rand::{rng, rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, UnitSphere};
use rayon::prelude::*;
use tracing::{debug, info, trace};

/// Small numeric tolerance for time checks.
const EPS_TIME: f64 = 1e-12;

/// Fraction of the box edge covered by the initial lattice.
const LATTICE_FILL: f64 = 0.95;

/// Below this many pairs the search runs on the calling thread only.
const MIN_PARALLEL_PAIRS: usize = 4096;

/// Hard-sphere gas in the cube `[0, box_side]^3`, advanced event by event.
///
/// Invariants: no two centers are closer than `2 * radius`, every center lies in
/// `[radius, box_side - radius]^3`, and particles and clock only change together
/// in [`Gas::resolve`].
#[derive(Debug, Clone)]
pub struct Gas {
    particles: Vec<Particle>,
    box_side: f64,
    time: f64,
    config: GasConfig,
}

impl Gas {
    /// Build a gas from explicit particles.
    ///
    /// Errors: `Error::Construction` if the box side is not positive, a particle
    /// sticks out of the box, or two particles overlap.
    pub fn new(particles: Vec<Particle>, box_side: f64, config: GasConfig) -> Result<Self> {
        validate_box(box_side, &config)?;
        let r = config.radius();
        for (i, p) in particles.iter().enumerate() {
            let inside = p
                .position
                .to_array()
                .iter()
                .all(|&x| x >= r && x <= box_side - r);
            if !inside {
                return Err(Error::Construction(format!(
                    "particle {i} at {:?} lies outside the box [{r}, {}]",
                    p.position,
                    box_side - r
                )));
            }
        }
        if let Some((i, j)) = first_overlap(&particles, config.diameter()) {
            return Err(Error::Construction(format!(
                "particles {i} and {j} overlap"
            )));
        }
        Ok(Self {
            particles,
            box_side,
            time: 0.0,
            config,
        })
    }

    /// Place `n` particles on a cubic lattice filling ~95% of the box and draw
    /// isotropic velocities whose total kinetic energy is exactly `3/2 n T`.
    ///
    /// Energies are random within a factor of three of the mean, so no particle
    /// starts at rest when `temperature > 0`. The last particle takes the
    /// residual energy so the total matches to floating precision.
    pub fn generate(
        n: usize,
        box_side: f64,
        temperature: f64,
        config: GasConfig,
        seed: Option<u64>,
    ) -> Result<Self> {
        validate_box(box_side, &config)?;
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(Error::Construction(
                "temperature must be finite and >= 0".into(),
            ));
        }

        let per_side = lattice_side(n);
        let fill = LATTICE_FILL * box_side;
        let spacing = if per_side == 0 { fill } else { fill / per_side as f64 };
        if spacing < config.diameter() {
            return Err(Error::Construction(format!(
                "{n} particles of radius {} do not fit a {per_side}^3 lattice in a box of side {box_side}",
                config.radius()
            )));
        }
        let offset = 0.5 * (box_side - fill) + 0.5 * spacing;

        let seed = seed.unwrap_or_else(|| rng().random());
        let mut rng = StdRng::seed_from_u64(seed);

        let mass = config.mass();
        let mean_energy = 1.5 * temperature;
        let total = mean_energy * n as f64;
        // The first n - 1 particles share (n - 1) mean energies in random
        // proportions; the last one takes the residual, one mean energy.
        let weights: Vec<f64> = (1..n).map(|_| rng.random_range(0.5..1.5)).collect();
        let weight_sum: f64 = weights.iter().sum();
        let scale = if weight_sum > 0.0 {
            mean_energy * weights.len() as f64 / weight_sum
        } else {
            0.0
        };

        let mut remaining = total;
        let mut particles = Vec::with_capacity(n);
        for idx in 0..n {
            let (ix, iy, iz) = (
                idx % per_side,
                (idx / per_side) % per_side,
                idx / (per_side * per_side),
            );
            let position = Vec3::new(
                offset + spacing * ix as f64,
                offset + spacing * iy as f64,
                offset + spacing * iz as f64,
            );

            let energy = match weights.get(idx) {
                Some(w) => w * scale,
                None => remaining.max(0.0),
            };
            remaining -= energy;
            let direction: [f64; 3] = UnitSphere.sample(&mut rng);
            let speed = Vec3::from(direction) * (2.0 * energy / mass).sqrt();

            particles.push(Particle::new(position, speed)?);
        }

        debug!(n, box_side, temperature, spacing, seed, "generated lattice gas");
        Self::new(particles, box_side, config)
    }

    /// Current simulation clock.
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

    /// Total kinetic energy.
    pub fn kinetic_energy(&self) -> f64 {
        let m = self.config.mass();
        self.particles.iter().map(|p| p.kinetic_energy(m)).sum()
    }

    /// `T = 2/3 * mean kinetic energy` (k_B = 1); zero for an empty gas.
    pub fn temperature(&self) -> f64 {
        temperature_of(&self.particles, self.config.mass())
    }

    /// Find the next event without changing the gas.
    ///
    /// Wall candidates are scanned linearly. Pair candidates are split into
    /// contiguous ranges of the linear pair index, one per rayon worker, and the
    /// per-range minima are reduced under the deterministic collision order.
    pub fn next_collision(&self) -> Result<Collision> {
        if self.particles.is_empty() {
            return Err(Error::SimulationFatal("cannot simulate an empty gas".into()));
        }
        let (side, r) = (self.box_side, self.config.radius());

        let best_wall = self
            .particles
            .iter()
            .enumerate()
            .try_fold(None, |best, (i, p)| {
                Ok::<_, Error>(earliest(best, wall_collision(p, i, side, r)?))
            })?;

        let total = pair_count(self.particles.len());
        let workers = if total < MIN_PARALLEL_PAIRS {
            1
        } else {
            rayon::current_num_threads()
        };
        let best_pair = partition(total, workers)
            .into_par_iter()
            .map(|range| best_pair_in_range(&self.particles, &self.config, range))
            .try_reduce(|| None, |a, b| Ok(earliest(a, b)))?;

        let Some(mut winner) = earliest(best_wall, best_pair) else {
            if self.particles.iter().all(Particle::is_stationary) {
                return Err(Error::SimulationFatal(
                    "all particles are stationary; no further collision will happen".into(),
                ));
            }
            return Err(Error::SimulationFatal(
                "next collision time is infinite although particles are moving".into(),
            ));
        };

        let t = winner.time();
        if t < 0.0 {
            if t < -EPS_TIME {
                return Err(Error::SimulationFatal(format!(
                    "negative collision time {t} for {:?}",
                    winner.kind
                )));
            }
            winner = Collision::new(0.0, winner.kind)?;
        }
        Ok(winner)
    }

    /// Advance all particles ballistically to the event and apply its velocity change.
    pub fn resolve(&mut self, collision: &Collision) -> Result<()> {
        let dt = collision.time();
        if !dt.is_finite() || dt < 0.0 {
            return Err(Error::SimulationFatal(format!(
                "cannot resolve a collision at time {dt}"
            )));
        }
        let n = self.particles.len();
        match collision.kind {
            CollisionKind::Wall { index, .. } if index >= n => {
                return Err(Error::InvalidArgument(format!(
                    "particle index {index} out of range for {n} particles"
                )));
            }
            CollisionKind::Pair { i, j } if i >= n || j >= n || i == j => {
                return Err(Error::InvalidArgument(format!(
                    "invalid particle pair ({i}, {j}) for {n} particles"
                )));
            }
            _ => {}
        }

        for p in &mut self.particles {
            p.advance(dt);
        }
        self.time += dt;

        match collision.kind {
            CollisionKind::Wall { index, wall } => self.reflect(index, wall),
            CollisionKind::Pair { i, j } => self.exchange(i, j)?,
        }
        Ok(())
    }

    /// Find and resolve one event. Returns the event and the clock before it.
    pub fn advance(&mut self) -> Result<(Collision, f64)> {
        let collision = self.next_collision()?;
        let t0 = self.time;
        self.resolve(&collision)?;
        trace!(t = self.time, kind = ?collision.kind, "resolved collision");
        Ok((collision, t0))
    }

    /// Resolve one event and capture it as a [`GasData`] snapshot.
    pub fn step(&mut self) -> Result<GasData> {
        let (collision, t0) = self.advance()?;
        GasData::new(self, &collision, t0)
    }

    /// Run up to `iterations` events, or until `stopper` returns true.
    ///
    /// When a sink is given, snapshots are handed over in batches of the sink's
    /// batch size; the remainder is flushed and the sink marked done on exit,
    /// including when the run fails. Returns the number of resolved events.
    pub fn simulate(
        &mut self,
        iterations: usize,
        sink: Option<&dyn EventSink>,
        stopper: Option<&dyn Fn() -> bool>,
    ) -> Result<usize> {
        info!(
            iterations,
            particles = self.particles.len(),
            t = self.time,
            "simulation started"
        );
        let result = self.run_events(iterations, sink, stopper);
        if let Some(sink) = sink {
            sink.mark_done();
        }
        match &result {
            Ok(done) => info!(events = done, t = self.time, "simulation finished"),
            Err(e) => tracing::error!(error = %e, t = self.time, "simulation aborted"),
        }
        result
    }

    fn run_events(
        &mut self,
        iterations: usize,
        sink: Option<&dyn EventSink>,
        stopper: Option<&dyn Fn() -> bool>,
    ) -> Result<usize> {
        let batch_size = sink.map_or(0, |s| s.batch_size().max(1));
        let mut batch: Vec<GasData> = Vec::with_capacity(batch_size);
        let mut done = 0usize;

        while done < iterations {
            if stopper.is_some_and(|stop| stop()) {
                debug!(events = done, "simulation stopped by caller");
                break;
            }
            let (collision, t0) = match self.advance() {
                Ok(ev) => ev,
                Err(e) => {
                    if let Some(sink) = sink {
                        flush(sink, &mut batch)?;
                    }
                    return Err(e);
                }
            };
            done += 1;

            if let Some(sink) = sink {
                batch.push(GasData::new(self, &collision, t0)?);
                if batch.len() >= batch_size {
                    flush(sink, &mut batch)?;
                }
            }
        }

        if let Some(sink) = sink {
            flush(sink, &mut batch)?;
        }
        Ok(done)
    }

    fn reflect(&mut self, index: usize, wall: Wall) {
        let axis = wall.axis();
        let r = self.config.radius();
        let p = &mut self.particles[index];
        *p.speed.axis_mut(axis) = -p.speed.axis(axis);
        // Snap to the exact contact plane
        *p.position.axis_mut(axis) = if wall.is_max() { self.box_side - r } else { r };
    }

    fn exchange(&mut self, i: usize, j: usize) -> Result<()> {
        let (pi, pj) = (self.particles[i], self.particles[j]);
        let delta = pi.position - pj.position;
        if delta.norm_squared() == 0.0 {
            return Err(Error::SimulationFatal(format!(
                "particles {i} and {j} have coincident centers"
            )));
        }
        let n = delta.normalize();
        let proj = n.dot(&(pi.speed - pj.speed));
        self.particles[i].speed -= n * proj;
        self.particles[j].speed += n * proj;
        Ok(())
    }
}

fn flush(sink: &dyn EventSink, batch: &mut Vec<GasData>) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    sink.add_data(std::mem::take(batch))
}

fn validate_box(box_side: f64, config: &GasConfig) -> Result<()> {
    if !box_side.is_finite() || box_side <= 0.0 {
        return Err(Error::Construction("box side must be finite and > 0".into()));
    }
    if box_side < config.diameter() {
        return Err(Error::Construction(
            "box side must be at least 2 * radius".into(),
        ));
    }
    Ok(())
}

/// Smallest `k` with `k^3 >= n`.
fn lattice_side(n: usize) -> usize {
    let mut k = (n as f64).cbrt().ceil() as usize;
    while k * k * k < n {
        k += 1;
    }
    while k > 0 && (k - 1) * (k - 1) * (k - 1) >= n {
        k -= 1;
    }
    k
}

fn first_overlap(particles: &[Particle], diameter: f64) -> Option<(usize, usize)> {
    let min_sq = diameter * diameter;
    for (i, a) in particles.iter().enumerate() {
        for (j, b) in particles.iter().enumerate().skip(i + 1) {
            if (a.position - b.position).norm_squared() < min_sq {
                return Some((i, j));
            }
        }
    }
    None
}

/// `T = 2/3 * mean(m v^2 / 2)`.
pub(crate) fn temperature_of(particles: &[Particle], mass: f64) -> f64 {
    if particles.is_empty() {
        return 0.0;
    }
    let total: f64 = particles.iter().map(|p| p.kinetic_energy(mass)).sum();
    2.0 / 3.0 * total / particles.len() as f64
}
