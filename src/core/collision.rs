use crate::core::particle::{GasConfig, Particle, Wall};
use crate::error::{Error, Result};
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Which entities take part in a collision. Indices refer to the gas's particle array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionKind {
    /// Particle `index` hits `wall`.
    Wall { index: usize, wall: Wall },
    /// Particles `i` and `j` (with `i < j`) touch.
    Pair { i: usize, j: usize },
}

impl CollisionKind {
    /// Tie-breaking at equal times: pairs before walls, then lexicographic by indices.
    #[inline]
    fn order_key(&self) -> (u8, usize, usize) {
        match *self {
            CollisionKind::Pair { i, j } => (0, i, j),
            CollisionKind::Wall { index, wall } => (1, index, wall.index()),
        }
    }
}

/// A candidate event: `time` is the delay from the gas clock, finite and >= 0.
///
/// Ordered by time, then by [`CollisionKind`] key, so that every reduction
/// over candidates picks the same winner regardless of search order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision {
    time: NotNan<f64>,
    pub kind: CollisionKind,
}

impl Collision {
    /// Errors if `time` is NaN. Infinite or negative times are accepted here and
    /// rejected by the engine, which can tell the cases apart.
    pub fn new(time: f64, kind: CollisionKind) -> Result<Self> {
        let time = NotNan::new(time)
            .map_err(|_| Error::SimulationFatal("collision time cannot be NaN".into()))?;
        Ok(Self { time, kind })
    }

    pub fn wall(index: usize, wall: Wall, time: f64) -> Result<Self> {
        Self::new(time, CollisionKind::Wall { index, wall })
    }

    pub fn pair(i: usize, j: usize, time: f64) -> Result<Self> {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        Self::new(time, CollisionKind::Pair { i, j })
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time.into_inner()
    }
}

impl Ord for Collision {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => self.kind.order_key().cmp(&other.kind.order_key()),
            o => o,
        }
    }
}

impl PartialOrd for Collision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Earlier of two optional candidates under the deterministic order.
#[inline]
pub fn earliest(a: Option<Collision>, b: Option<Collision>) -> Option<Collision> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Time for `p` to reach a face along `axis`, and whether it is the far face.
///
/// Contact happens when the center is `radius` away from the face. A particle
/// at rest along the axis never reaches either face.
#[inline]
pub fn wall_time_on_axis(p: &Particle, axis: usize, side: f64, radius: f64) -> (f64, bool) {
    let pos = p.position.axis(axis);
    let speed = p.speed.axis(axis);
    if speed < 0.0 {
        ((radius - pos) / speed, false)
    } else if speed > 0.0 {
        ((side - radius - pos) / speed, true)
    } else {
        (f64::INFINITY, true)
    }
}

/// Earliest wall contact for particle `index`, or `None` if it is at rest.
pub fn wall_collision(p: &Particle, index: usize, side: f64, radius: f64) -> Result<Option<Collision>> {
    let mut best: Option<(f64, Wall)> = None;
    for axis in 0..3 {
        let (t, is_max) = wall_time_on_axis(p, axis, side, radius);
        if t.is_finite() && best.is_none_or(|(bt, _)| t < bt) {
            best = Some((t, Wall::from_axis(axis, is_max)));
        }
    }
    best.map(|(t, wall)| Collision::wall(index, wall, t)).transpose()
}

/// Closed-form contact time of two approaching spheres, `+inf` if they never touch.
///
/// Solves `|dp + t dv|^2 = (2r)^2`, i.e. `a t^2 + 2 b t + c = 0` with
/// `a = dv.dv`, `b = dp.dv`, `c = dp.dp - (2r)^2`. Separating pairs (`b > 0`)
/// are skipped; an approaching pair already in contact collides at `0`.
pub fn pair_time(p1: &Particle, p2: &Particle, config: &GasConfig) -> f64 {
    let dp = p1.position - p2.position;
    let dv = p1.speed - p2.speed;
    let b = dp.dot(&dv);
    if b > 0.0 {
        return f64::INFINITY;
    }
    let a = dv.dot(&dv);
    if a == 0.0 {
        return f64::INFINITY;
    }
    let d = config.diameter();
    let c = dp.dot(&dp) - d * d;
    if c <= 0.0 {
        // already in contact (or overlapping by rounding): touch now if approaching
        return if b < 0.0 { 0.0 } else { f64::INFINITY };
    }
    let disc = b * b - a * c;
    if disc <= 0.0 {
        return f64::INFINITY;
    }
    let sqrt_disc = disc.sqrt();
    let t1 = (-b - sqrt_disc) / a;
    let t2 = (-b + sqrt_disc) / a;
    if t1 >= 0.0 {
        t1
    } else if t2 >= 0.0 {
        t2
    } else {
        f64::INFINITY
    }
}

/// Number of unordered pairs among `n` particles.
#[inline]
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Inverse of the pair enumeration `k = j (j - 1) / 2 + i` with `i < j`.
///
/// Uses the closed-form triangular-number root and corrects the one-off
/// rounding error `sqrt` can introduce for large `k`.
pub fn pair_from_index(k: usize) -> (usize, usize) {
    let mut j = ((1.0 + (1.0 + 8.0 * k as f64).sqrt()) / 2.0) as usize;
    while j > 1 && j * (j - 1) / 2 > k {
        j -= 1;
    }
    while (j + 1) * j / 2 <= k {
        j += 1;
    }
    let i = k - j * (j - 1) / 2;
    (i, j)
}

/// Linear index of the pair `(i, j)`, `i < j`.
#[inline]
pub fn pair_index(i: usize, j: usize) -> usize {
    j * (j - 1) / 2 + i
}

/// Split `0..total` into at most `parts` contiguous, near-equal ranges.
pub fn partition(total: usize, parts: usize) -> Vec<std::ops::Range<usize>> {
    let parts = parts.max(1).min(total.max(1));
    let base = total / parts;
    let extra = total % parts;
    let mut out = Vec::with_capacity(parts);
    let mut lo = 0;
    for p in 0..parts {
        let len = base + usize::from(p < extra);
        out.push(lo..lo + len);
        lo += len;
    }
    out
}

/// Best pair candidate over the linear pair range `range`.
///
/// The first pair is recovered in closed form; subsequent pairs are walked
/// incrementally along the enumeration.
pub fn best_pair_in_range(
    particles: &[Particle],
    config: &GasConfig,
    range: std::ops::Range<usize>,
) -> Result<Option<Collision>> {
    if range.is_empty() {
        return Ok(None);
    }
    let (mut i, mut j) = pair_from_index(range.start);
    let mut best: Option<(f64, usize, usize)> = None;
    for _ in range {
        let t = pair_time(&particles[i], &particles[j], config);
        if t.is_finite() && best.is_none_or(|(bt, bi, bj)| (t, i, j) < (bt, bi, bj)) {
            best = Some((t, i, j));
        }
        i += 1;
        if i == j {
            j += 1;
            i = 0;
        }
    }
    best.map(|(t, i, j)| Collision::pair(i, j, t)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vector::Vec3;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn particle(p: [f64; 3], v: [f64; 3]) -> Particle {
        Particle {
            position: Vec3::from(p),
            speed: Vec3::from(v),
        }
    }

    #[test]
    fn earlier_event_wins_regardless_of_kind() -> Result<()> {
        let wall = Collision::wall(3, Wall::Top, 0.5)?;
        let pair = Collision::pair(1, 2, 0.75)?;
        assert!(wall < pair);
        assert_eq!(earliest(Some(pair), Some(wall)), Some(wall));
        assert_eq!(earliest(None, Some(pair)), Some(pair));
        assert_eq!(earliest(None, None), None);
        Ok(())
    }

    #[test]
    fn touching_pair_collides_now_only_when_approaching() -> Result<()> {
        let cfg = GasConfig::new(0.5, 1.0)?;
        // centers 1 - 1e-12 apart: overlapping by rounding
        let gap = 1.0 - 1e-12;
        let a = particle([2.0, 2.0, 2.0], [1.0, 0.0, 0.0]);
        let b = particle([2.0 + gap, 2.0, 2.0], [-1.0, 0.0, 0.0]);
        assert_eq!(pair_time(&a, &b, &cfg), 0.0);

        let a = particle([2.0, 2.0, 2.0], [-1.0, 0.0, 0.0]);
        let b = particle([2.0 + gap, 2.0, 2.0], [1.0, 0.0, 0.0]);
        assert!(pair_time(&a, &b, &cfg).is_infinite());
        Ok(())
    }

    #[test]
    fn tie_breaker_prefers_pair_then_lower_indices() -> Result<()> {
        let a = Collision::pair(0, 1, 5.0)?;
        let b = Collision::wall(0, Wall::Right, 5.0)?;
        let c = Collision::pair(0, 2, 5.0)?;
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
        assert_eq!(earliest(Some(b), Some(c)), Some(c));
        Ok(())
    }

    #[test]
    fn nan_time_rejected() {
        assert!(Collision::pair(0, 1, f64::NAN).is_err());
    }

    #[test]
    fn wall_time_basic() -> Result<()> {
        // Heading toward x-min: contact when x reaches radius 0.5 from 1.0 at -1.0 => dt = 0.5
        let p = particle([1.0, 2.5, 2.5], [-1.0, 0.0, 0.0]);
        let c = wall_collision(&p, 0, 5.0, 0.5)?.expect("should hit wall");
        assert_eq!(c.kind, CollisionKind::Wall { index: 0, wall: Wall::Left });
        assert!((c.time() - 0.5).abs() < 1e-12);

        let p = particle([1.0, 2.5, 2.5], [0.0, 0.0, 2.0]);
        let c = wall_collision(&p, 3, 5.0, 0.5)?.expect("should hit wall");
        assert_eq!(c.kind, CollisionKind::Wall { index: 3, wall: Wall::Front });
        assert!((c.time() - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn stationary_particle_has_no_wall_event() -> Result<()> {
        let p = particle([1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);
        assert!(wall_collision(&p, 0, 5.0, 0.1)?.is_none());
        Ok(())
    }

    #[test]
    fn pair_time_head_on() -> Result<()> {
        // Distance 4.0 closing to 0.4 at relative speed 2 => t = 1.8
        let cfg = GasConfig::new(0.2, 1.0)?;
        let a = particle([3.0, 5.0, 5.0], [1.0, 0.0, 0.0]);
        let b = particle([7.0, 5.0, 5.0], [-1.0, 0.0, 0.0]);
        assert!((pair_time(&a, &b, &cfg) - 1.8).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn separating_pair_never_collides() -> Result<()> {
        let cfg = GasConfig::new(0.2, 1.0)?;
        let a = particle([3.0, 5.0, 5.0], [-1.0, 0.0, 0.0]);
        let b = particle([7.0, 5.0, 5.0], [1.0, 0.0, 0.0]);
        assert_eq!(pair_time(&a, &b, &cfg), f64::INFINITY);
        Ok(())
    }

    #[test]
    fn missing_pair_never_collides() -> Result<()> {
        let cfg = GasConfig::new(0.2, 1.0)?;
        let a = particle([3.0, 5.0, 5.0], [1.0, 0.0, 0.0]);
        let b = particle([7.0, 8.0, 5.0], [-1.0, 0.0, 0.0]);
        assert_eq!(pair_time(&a, &b, &cfg), f64::INFINITY);
        Ok(())
    }

    #[test]
    fn pair_index_inverse_covers_every_pair_once() {
        for n in [2usize, 3, 7, 50, 301] {
            let total = pair_count(n);
            let mut seen = HashSet::with_capacity(total);
            for k in 0..total {
                let (i, j) = pair_from_index(k);
                assert!(i < j && j < n, "k={k} -> ({i},{j}) for n={n}");
                assert_eq!(pair_index(i, j), k);
                assert!(seen.insert((i, j)));
            }
            assert_eq!(seen.len(), n * (n - 1) / 2);
        }
    }

    #[test]
    fn partition_is_contiguous_and_complete() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
        assert_eq!(partition(2, 8).len(), 2);
        assert_eq!(partition(0, 4), vec![0..0]);
    }

    proptest! {
        #[test]
        fn pair_from_index_round_trips(k in 0usize..50_000_000_000) {
            let (i, j) = pair_from_index(k);
            prop_assert!(i < j);
            prop_assert_eq!(pair_index(i, j), k);
        }
    }
}
