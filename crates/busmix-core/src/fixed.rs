//! Fixed-point arithmetic for the resampler and gain stage
//!
//! Positions, playback rates and channel gains are stored with 12 fractional
//! bits. Overflow behavior:
//!
//! - `+` and `-` wrap (two's complement)
//! - conversion from `f64` truncates toward zero and saturates; NaN becomes 0
//! - [`Fixed::floor`] is an arithmetic shift, so negative values round down
//! - [`Fixed::mul_sample`] saturates to the `i32` range

use std::ops::{Add, AddAssign, Sub};

/// Number of fractional bits
pub const FRAC_BITS: u32 = 12;

/// Raw value of 1.0
pub const UNIT: i64 = 1 << FRAC_BITS;

/// Mask selecting the fractional bits
pub const FRAC_MASK: i64 = UNIT - 1;

/// A signed fixed-point number with [`FRAC_BITS`] fractional bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(i64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(UNIT);

    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Whole number `n` in fixed point (wraps on overflow)
    #[inline]
    pub const fn from_int(n: i64) -> Self {
        Self(n.wrapping_shl(FRAC_BITS))
    }

    /// Convert from floating point, truncating toward zero
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        // `as` saturates and maps NaN to 0
        Self((value * UNIT as f64) as i64)
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / UNIT as f64
    }

    /// Integer part, rounded toward negative infinity
    #[inline]
    pub const fn floor(self) -> i64 {
        self.0 >> FRAC_BITS
    }

    /// Fractional part in `0..UNIT`
    #[inline]
    pub const fn frac(self) -> i64 {
        self.0 & FRAC_MASK
    }

    /// Scale an integer sample by this value
    #[inline]
    pub fn mul_sample(self, sample: i32) -> i32 {
        let scaled = (sample as i64).saturating_mul(self.0) >> FRAC_BITS;
        scaled.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
}

impl Add for Fixed {
    type Output = Fixed;

    #[inline]
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Fixed {
    #[inline]
    fn add_assign(&mut self, rhs: Fixed) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub for Fixed {
    type Output = Fixed;

    #[inline]
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.wrapping_sub(rhs.0))
    }
}

/// Linear interpolation between two samples
///
/// `frac` is the fractional weight of `b` in `0..UNIT`.
#[inline]
pub fn lerp(a: i32, b: i32, frac: i64) -> i32 {
    let delta = (b as i64 - a as i64) * frac;
    (a as i64 + (delta >> FRAC_BITS)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_and_frac_parts() {
        let x = Fixed::from_int(5) + Fixed::from_raw(UNIT / 4);
        assert_eq!(x.floor(), 5);
        assert_eq!(x.frac(), UNIT / 4);
        assert_eq!(x.to_f64(), 5.25);
    }

    #[test]
    fn test_floor_is_arithmetic_shift() {
        let x = Fixed::from_f64(-0.5);
        assert_eq!(x.raw(), -UNIT / 2);
        assert_eq!(x.floor(), -1);
        assert_eq!(x.frac(), UNIT / 2);
    }

    #[test]
    fn test_from_f64_truncates_and_saturates() {
        // 0.99999 * 4096 = 4095.96 -> 4095
        assert_eq!(Fixed::from_f64(0.99999).raw(), 4095);
        assert_eq!(Fixed::from_f64(-0.99999).raw(), -4095);
        assert_eq!(Fixed::from_f64(f64::NAN), Fixed::ZERO);
        assert_eq!(Fixed::from_f64(f64::INFINITY).raw(), i64::MAX);
        assert_eq!(Fixed::from_f64(1.0), Fixed::ONE);
    }

    #[test]
    fn test_addition_wraps() {
        let max = Fixed::from_raw(i64::MAX);
        assert_eq!((max + Fixed::from_raw(1)).raw(), i64::MIN);
        assert_eq!((Fixed::from_raw(i64::MIN) - Fixed::from_raw(1)).raw(), i64::MAX);
    }

    #[test]
    fn test_mul_sample() {
        assert_eq!(Fixed::ONE.mul_sample(1234), 1234);
        assert_eq!(Fixed::from_f64(0.5).mul_sample(1000), 500);
        assert_eq!(Fixed::ZERO.mul_sample(32767), 0);
        // Arithmetic shift rounds toward negative infinity
        assert_eq!(Fixed::from_f64(0.5).mul_sample(-3), -2);
        assert_eq!(Fixed::from_int(1 << 20).mul_sample(i32::MAX), i32::MAX);
        assert_eq!(Fixed::from_int(1 << 20).mul_sample(i32::MIN), i32::MIN);
    }

    #[test]
    fn test_lerp() {
        assert_eq!(lerp(0, 4096, 0), 0);
        assert_eq!(lerp(0, 4096, UNIT / 2), 2048);
        assert_eq!(lerp(100, 200, UNIT / 4), 125);
        assert_eq!(lerp(-32768, 32767, FRAC_MASK), 32751);
        assert_eq!(lerp(200, 100, UNIT / 2), 150);
    }
}
