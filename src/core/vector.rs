use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Relative tolerance used for time and temperature comparisons.
pub const NEGLIGIBLE_REL: f64 = 1e-6;

/// Floating-point scalar usable as a `Vec3` component.
pub trait Real:
    Copy
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    const ZERO: Self;
    fn sqrt(self) -> Self;
}

impl Real for f64 {
    const ZERO: Self = 0.0;
    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}

impl Real for f32 {
    const ZERO: Self = 0.0;
    #[inline]
    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }
}

/// 3-D vector. Equality is exact component comparison; use [`is_negligible`]
/// when a tolerance is needed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3<T = f64> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T: Real> Vec3<T> {
    #[inline]
    pub const fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn zero() -> Self {
        Self::new(T::ZERO, T::ZERO, T::ZERO)
    }

    #[inline]
    pub fn dot(&self, other: &Self) -> T {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    #[inline]
    pub fn norm_squared(&self) -> T {
        self.dot(self)
    }

    #[inline]
    pub fn norm(&self) -> T {
        self.norm_squared().sqrt()
    }

    /// Unit vector along `self`. A zero vector yields NaN components; callers guard.
    #[inline]
    pub fn normalize(&self) -> Self {
        *self / self.norm()
    }

    /// Component along `axis` (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn axis(&self, axis: usize) -> T {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    #[inline]
    pub fn axis_mut(&mut self, axis: usize) -> &mut T {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => &mut self.z,
        }
    }

    #[inline]
    pub fn to_array(&self) -> [T; 3] {
        [self.x, self.y, self.z]
    }
}

impl<T: Real> From<[T; 3]> for Vec3<T> {
    fn from(a: [T; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

impl<T: Real> Add for Vec3<T> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl<T: Real> Sub for Vec3<T> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl<T: Real> AddAssign for Vec3<T> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: Real> SubAssign for Vec3<T> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<T: Real> Neg for Vec3<T> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl<T: Real> Mul<T> for Vec3<T> {
    type Output = Self;
    #[inline]
    fn mul(self, k: T) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

impl<T: Real> Div<T> for Vec3<T> {
    type Output = Self;
    #[inline]
    fn div(self, k: T) -> Self {
        Self::new(self.x / k, self.y / k, self.z / k)
    }
}

/// True when `a` and `b` differ by less than [`NEGLIGIBLE_REL`] relative to the
/// larger magnitude. Two exact zeros compare equal.
#[inline]
pub fn is_negligible(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs());
    (a - b).abs() <= NEGLIGIBLE_REL * scale || (a - b).abs() <= f64::EPSILON
}

/// True when `value` lies on the grid `origin + k * step` (k integer), within tolerance.
pub fn is_on_grid(value: f64, origin: f64, step: f64) -> bool {
    let offset = value - origin;
    let k = (offset / step).round();
    (offset - k * step).abs() <= NEGLIGIBLE_REL * step.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cross_and_dot_basic() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(x.cross(&y), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(x.dot(&y), 0.0);
        assert_eq!((x + y).norm_squared(), 2.0);
    }

    #[test]
    fn normalize_zero_is_nan() {
        let z: Vec3 = Vec3::zero();
        assert!(z.normalize().x.is_nan());
    }

    #[test]
    fn works_for_f32() {
        let v: Vec3<f32> = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(v.norm(), 5.0);
    }

    #[test]
    fn negligible_and_grid() {
        assert!(is_negligible(1.0, 1.0 + 1e-9));
        assert!(!is_negligible(1.0, 1.001));
        assert!(is_negligible(0.0, 0.0));
        assert!(is_on_grid(0.3, 0.0, 0.1));
        assert!(!is_on_grid(0.35, 0.0, 0.1));
        assert!(is_on_grid(10.0 + 7.0 / 30.0, 10.0, 1.0 / 30.0));
    }

    proptest! {
        #[test]
        fn cross_is_orthogonal(
            a in prop::array::uniform3(-100.0f64..100.0),
            b in prop::array::uniform3(-100.0f64..100.0),
        ) {
            let (a, b) = (Vec3::from(a), Vec3::from(b));
            let c = a.cross(&b);
            let scale = a.norm() * b.norm() * c.norm() + 1.0;
            prop_assert!(c.dot(&a).abs() <= 1e-9 * scale);
            prop_assert!(c.dot(&b).abs() <= 1e-9 * scale);
        }

        #[test]
        fn normalize_has_unit_norm(a in prop::array::uniform3(0.1f64..100.0)) {
            let n = Vec3::from(a).normalize();
            prop_assert!((n.norm() - 1.0).abs() < 1e-12);
        }
    }
}
